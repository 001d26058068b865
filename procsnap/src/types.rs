//! Wire schema (what agents send and readers receive) and storage schema (what the
//! database holds), plus the one mapping between them.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SystemInfo {
    pub os: String,
    pub processor: String,
    pub cores: u32,
    pub threads: u32,
    pub ram_gb: f64,
    pub used_ram_gb: f64,
    pub free_ram_gb: f64,
    pub storage_free_gb: f64,
    pub storage_total_gb: f64,
    pub storage_used_gb: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessEntry {
    pub pid: u32,
    pub ppid: Option<u32>,
    pub name: String,
    pub cpu: f64,
    /// MB
    pub memory: f64,
    pub cmdline: String,
    pub username: String,
}

/// Nested snapshot as it appears on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotView {
    pub hostname: String,
    #[serde(with = "utc_micros")]
    pub timestamp: DateTime<Utc>,
    pub system: SystemInfo,
    pub processes: Vec<ProcessEntry>,
}

/// Flat parent row of the `snapshots` table.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotRow {
    pub hostname: String,
    pub timestamp: DateTime<Utc>,
    pub os: String,
    pub processor: String,
    pub cores: u32,
    pub threads: u32,
    pub ram_gb: f64,
    pub used_ram_gb: f64,
    pub free_ram_gb: f64,
    pub storage_free_gb: f64,
    pub storage_total_gb: f64,
    pub storage_used_gb: f64,
}

/// Child row of the `processes` table; the owning snapshot id is implied by context.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRow {
    pub pid: u32,
    pub ppid: Option<u32>,
    pub name: String,
    pub cpu: f64,
    pub memory: f64,
    pub cmdline: String,
    pub username: String,
}

pub type SnapshotId = i64;

impl SnapshotView {
    pub fn into_rows(self) -> (SnapshotRow, Vec<ProcessRow>) {
        let s = self.system;
        let row = SnapshotRow {
            hostname: self.hostname,
            timestamp: self.timestamp,
            os: s.os,
            processor: s.processor,
            cores: s.cores,
            threads: s.threads,
            ram_gb: s.ram_gb,
            used_ram_gb: s.used_ram_gb,
            free_ram_gb: s.free_ram_gb,
            storage_free_gb: s.storage_free_gb,
            storage_total_gb: s.storage_total_gb,
            storage_used_gb: s.storage_used_gb,
        };
        let procs = self
            .processes
            .into_iter()
            .map(|p| ProcessRow {
                pid: p.pid,
                ppid: p.ppid,
                name: p.name,
                cpu: p.cpu,
                memory: p.memory,
                cmdline: p.cmdline,
                username: p.username,
            })
            .collect();
        (row, procs)
    }

    pub fn from_rows(row: SnapshotRow, procs: Vec<ProcessRow>) -> Self {
        Self {
            hostname: row.hostname,
            timestamp: row.timestamp,
            system: SystemInfo {
                os: row.os,
                processor: row.processor,
                cores: row.cores,
                threads: row.threads,
                ram_gb: row.ram_gb,
                used_ram_gb: row.used_ram_gb,
                free_ram_gb: row.free_ram_gb,
                storage_free_gb: row.storage_free_gb,
                storage_total_gb: row.storage_total_gb,
                storage_used_gb: row.storage_used_gb,
            },
            processes: procs
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
                .collect(),
        }
    }
}

/// RFC 3339, microsecond precision, `Z` suffix: `2024-05-01T12:30:00.000000Z`.
pub mod utc_micros {
    use super::*;

    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Micros, true)
    }

    /// Accepts any RFC 3339 offset; normalizes to UTC and truncates to microseconds.
    pub fn parse(s: &str) -> Option<DateTime<Utc>> {
        let ts = DateTime::parse_from_rfc3339(s).ok()?.with_timezone(&Utc);
        DateTime::from_timestamp_micros(ts.timestamp_micros())
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(d)?;
        parse(&raw).ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp {raw:?}")))
    }
}
