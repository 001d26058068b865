//! Inbound payload normalization: fold the nested `system` object into top-level
//! fields, check JSON types, then apply the field rules declared on the typed payload.
//! All problems are collected and keyed by field path.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use tracing::warn;
use validator::{Validate, ValidationError, ValidationErrors, ValidationErrorsKind};

use crate::types::{utc_micros, ProcessEntry, SnapshotView, SystemInfo};

pub const SYSTEM_FIELDS: [&str; 10] = [
    "os",
    "processor",
    "cores",
    "threads",
    "ram_gb",
    "used_ram_gb",
    "free_ram_gb",
    "storage_free_gb",
    "storage_total_gb",
    "storage_used_gb",
];

const REQUIRED: &str = "This field is required.";

/// Field path (`hostname`, `processes[2].pid`, ...) to messages.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn add(&mut self, field: impl Into<String>, msg: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(msg.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Total number of messages across all fields.
    pub fn len(&self) -> usize {
        self.0.values().map(Vec::len).sum()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Whether `path` or one of its parents already has an error.
    fn covers(&self, path: &str) -> bool {
        self.0.keys().any(|k| {
            path.strip_prefix(k.as_str())
                .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
        })
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, msgs) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{field}: {}", msgs.join(" "))?;
        }
        Ok(())
    }
}

/// Request body after type checking. Absent and null fields take their defaults.
#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
struct SnapshotPayload {
    #[validate(custom(function = "not_blank"), length(max = 100))]
    hostname: String,
    #[validate(length(max = 100))]
    os: String,
    #[validate(length(max = 200))]
    processor: String,
    cores: u32,
    threads: u32,
    #[validate(range(min = 0.0))]
    ram_gb: f64,
    #[validate(range(min = 0.0))]
    used_ram_gb: f64,
    #[validate(range(min = 0.0))]
    free_ram_gb: f64,
    #[validate(range(min = 0.0))]
    storage_free_gb: f64,
    #[validate(range(min = 0.0))]
    storage_total_gb: f64,
    #[validate(range(min = 0.0))]
    storage_used_gb: f64,
    #[validate(nested)]
    processes: Vec<ProcessPayload>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(default)]
struct ProcessPayload {
    pid: u32,
    ppid: Option<u32>,
    #[validate(custom(function = "not_blank"), length(max = 255))]
    name: String,
    #[validate(range(min = 0.0))]
    cpu: f64,
    #[validate(range(min = 0.0))]
    memory: f64,
    cmdline: String,
    #[validate(length(max = 150))]
    username: String,
}

fn not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("This field may not be blank.".into());
        return Err(err);
    }
    Ok(())
}

/// Parse, un-flatten and validate a raw request body.
///
/// A missing `timestamp` is filled with `now`. Duplicate pids keep the last entry.
pub fn parse_snapshot(raw: &[u8], now: DateTime<Utc>) -> Result<SnapshotView, FieldErrors> {
    let mut errs = FieldErrors::default();
    let value: Value = match serde_json::from_slice(raw) {
        Ok(v) => v,
        Err(e) => {
            errs.add("non_field_errors", format!("JSON parse error - {e}"));
            return Err(errs);
        }
    };
    let Value::Object(mut obj) = value else {
        errs.add("non_field_errors", "Invalid data. Expected a dictionary.");
        return Err(errs);
    };

    unflatten_system(&mut obj, &mut errs);
    let timestamp = match obj.remove("timestamp") {
        None | Some(Value::Null) => Some(now),
        Some(Value::String(s)) => utc_micros::parse(&s).or_else(|| {
            errs.add(
                "timestamp",
                "Datetime has wrong format. Use RFC 3339, e.g. 2024-05-01T12:30:00.000000Z.",
            );
            None
        }),
        Some(_) => {
            errs.add("timestamp", "Expected an RFC 3339 string.");
            None
        }
    };
    check_snapshot_types(&mut obj, &mut errs);

    let payload: SnapshotPayload = match serde_json::from_value(Value::Object(obj)) {
        Ok(p) => p,
        Err(e) => {
            errs.add("non_field_errors", e.to_string());
            return Err(errs);
        }
    };
    if let Err(rules) = payload.validate() {
        let typed = errs.clone();
        collect_rule_errors(&rules, "", &typed, &mut errs);
    }

    match timestamp {
        Some(timestamp) if errs.is_empty() => Ok(payload.into_view(timestamp)),
        _ => Err(errs),
    }
}

impl SnapshotPayload {
    fn into_view(self, timestamp: DateTime<Utc>) -> SnapshotView {
        let processes = self
            .processes
            .into_iter()
            .map(|p| ProcessEntry {
                pid: p.pid,
                ppid: p.ppid,
                name: p.name,
                cpu: p.cpu,
                memory: p.memory,
                cmdline: p.cmdline,
                username: p.username,
            })
            .collect();
        SnapshotView {
            hostname: self.hostname,
            timestamp,
            system: SystemInfo {
                os: self.os,
                processor: self.processor,
                cores: self.cores,
                threads: self.threads,
                ram_gb: self.ram_gb,
                used_ram_gb: self.used_ram_gb,
                free_ram_gb: self.free_ram_gb,
                storage_free_gb: self.storage_free_gb,
                storage_total_gb: self.storage_total_gb,
                storage_used_gb: self.storage_used_gb,
            },
            processes: dedup_last_wins(processes),
        }
    }
}

/// Keys of a nested `system` object overwrite top-level keys of the same name.
fn unflatten_system(obj: &mut Map<String, Value>, errs: &mut FieldErrors) {
    match obj.remove("system") {
        None | Some(Value::Null) => {}
        Some(Value::Object(system)) => {
            for (k, v) in system {
                if SYSTEM_FIELDS.contains(&k.as_str()) {
                    obj.insert(k, v);
                }
            }
        }
        Some(_) => errs.add("system", "Expected a dictionary of system metrics."),
    }
}

#[derive(Clone, Copy)]
enum Kind {
    Text,
    Number,
    Count,
}

fn check_snapshot_types(obj: &mut Map<String, Value>, errs: &mut FieldErrors) {
    let mut c = TypeCheck {
        obj: &mut *obj,
        prefix: String::new(),
        errs: &mut *errs,
    };
    c.field("hostname", Kind::Text, true);
    c.field("os", Kind::Text, false);
    c.field("processor", Kind::Text, false);
    c.field("cores", Kind::Count, false);
    c.field("threads", Kind::Count, false);
    for key in &SYSTEM_FIELDS[4..] {
        c.field(key, Kind::Number, false);
    }

    match obj.remove("processes") {
        None | Some(Value::Null) => errs.add("processes", REQUIRED),
        Some(Value::Array(mut items)) => {
            for (i, item) in items.iter_mut().enumerate() {
                match item {
                    Value::Object(p) => check_process_types(i, p, errs),
                    _ => {
                        errs.add(format!("processes[{i}]"), "Expected a dictionary.");
                        *item = Value::Object(Map::new());
                    }
                }
            }
            obj.insert("processes".to_string(), Value::Array(items));
        }
        Some(_) => errs.add("processes", "Expected a list of items."),
    }
}

fn check_process_types(i: usize, obj: &mut Map<String, Value>, errs: &mut FieldErrors) {
    let mut c = TypeCheck {
        obj,
        prefix: format!("processes[{i}]."),
        errs,
    };
    c.field("pid", Kind::Count, true);
    c.field("ppid", Kind::Count, false);
    c.field("name", Kind::Text, true);
    c.field("cpu", Kind::Number, true);
    c.field("memory", Kind::Number, true);
    c.field("cmdline", Kind::Text, false);
    c.field("username", Kind::Text, false);
}

struct TypeCheck<'a> {
    obj: &'a mut Map<String, Value>,
    prefix: String,
    errs: &'a mut FieldErrors,
}

impl TypeCheck<'_> {
    /// Nulls and ill-typed values are removed so the field falls back to its default.
    fn field(&mut self, key: &str, kind: Kind, required: bool) {
        let problem = match (self.obj.get(key), kind) {
            (None, _) if required => Some(REQUIRED),
            (None, _) => None,
            (Some(Value::Null), Kind::Text) if required => Some("This field may not be null."),
            (Some(Value::Null), _) if required => Some(REQUIRED),
            (Some(Value::Null), _) => None,
            (Some(Value::String(_)), Kind::Text) => None,
            (Some(_), Kind::Text) => Some("Not a valid string."),
            (Some(Value::Number(_)), Kind::Number) => None,
            (Some(_), Kind::Number) => Some("A valid number is required."),
            (Some(Value::Number(n)), Kind::Count) => {
                match n.as_u64().and_then(|v| u32::try_from(v).ok()) {
                    Some(_) => None,
                    None => Some("A valid non-negative integer is required."),
                }
            }
            (Some(_), Kind::Count) => Some("A valid integer is required."),
        };
        if let Some(msg) = problem {
            self.errs.add(format!("{}{key}", self.prefix), msg);
        }
        if problem.is_some() || self.obj.get(key).is_some_and(Value::is_null) {
            self.obj.remove(key);
        }
    }
}

/// Flatten `validator` output into field paths, skipping fields that already
/// failed the type check.
fn collect_rule_errors(
    rules: &ValidationErrors,
    prefix: &str,
    typed: &FieldErrors,
    out: &mut FieldErrors,
) {
    for (field, kind) in rules.errors() {
        let path = format!("{prefix}{field}");
        match kind {
            ValidationErrorsKind::Field(list) => {
                if typed.covers(&path) {
                    continue;
                }
                for e in list {
                    out.add(path.clone(), rule_message(e));
                }
            }
            ValidationErrorsKind::List(items) => {
                for (i, nested) in items {
                    collect_rule_errors(nested, &format!("{path}[{i}]."), typed, out);
                }
            }
            ValidationErrorsKind::Struct(nested) => {
                collect_rule_errors(nested, &format!("{path}."), typed, out);
            }
        }
    }
}

fn rule_message(e: &ValidationError) -> String {
    if let Some(msg) = &e.message {
        return msg.to_string();
    }
    match &*e.code {
        "length" => {
            let max = rule_param(e, "max");
            format!("Ensure this field has no more than {max} characters.")
        }
        "range" => {
            let min = rule_param(e, "min");
            format!("Ensure this value is greater than or equal to {min}.")
        }
        code => code.to_string(),
    }
}

fn rule_param(e: &ValidationError, name: &str) -> f64 {
    e.params.get(name).and_then(Value::as_f64).unwrap_or(0.0)
}

/// One row per pid; a later entry replaces an earlier one in place.
fn dedup_last_wins(processes: Vec<ProcessEntry>) -> Vec<ProcessEntry> {
    let mut last: HashMap<u32, usize> = HashMap::with_capacity(processes.len());
    for (i, p) in processes.iter().enumerate() {
        last.insert(p.pid, i);
    }
    let dropped = processes.len() - last.len();
    if dropped > 0 {
        warn!(dropped, "duplicate pids, keeping the last of each");
    }
    processes
        .into_iter()
        .enumerate()
        .filter(|(i, p)| last.get(&p.pid) == Some(i))
        .map(|(_, p)| p)
        .collect()
}
