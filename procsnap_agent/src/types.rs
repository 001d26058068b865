//! Data types sent to the collector over HTTP.
//! Keep this module minimal and stable: it defines the wire format.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Serialize, Serializer};

#[derive(Debug, Serialize, Clone, Default, PartialEq)]
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

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub ppid: Option<u32>,
    pub name: String,
    /// Percent of one core over the sampling window; may exceed 100.
    pub cpu: f64,
    /// Resident set size in MB.
    pub memory: f64,
    pub cmdline: String,
    pub username: String,
}

#[derive(Debug, Serialize, Clone)]
pub struct Snapshot {
    pub hostname: String,
    #[serde(serialize_with = "utc_micros")]
    pub timestamp: DateTime<Utc>,
    pub system: SystemInfo,
    pub processes: Vec<ProcessInfo>,
}

fn utc_micros<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true))
}

// Collector-side length limits, in characters.
pub const HOSTNAME_MAX: usize = 100;
pub const OS_MAX: usize = 100;
pub const PROCESSOR_MAX: usize = 200;
pub const NAME_MAX: usize = 255;
pub const USERNAME_MAX: usize = 150;

/// Truncate to at most `max` characters.
pub fn clip(mut s: String, max: usize) -> String {
    if let Some((at, _)) = s.char_indices().nth(max) {
        s.truncate(at);
    }
    s
}

pub const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
pub const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

pub fn bytes_to_gb(bytes: u64) -> f64 {
    round2(bytes as f64 / BYTES_PER_GB)
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    round2(bytes as f64 / BYTES_PER_MB)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn snapshot_serializes_with_nested_system() {
        let snap = Snapshot {
            hostname: "host-a".into(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap(),
            system: SystemInfo {
                os: "Linux 6.1".into(),
                ram_gb: 16.0,
                ..Default::default()
            },
            processes: vec![ProcessInfo {
                pid: 1,
                ppid: None,
                name: "init".into(),
                cpu: 0.1,
                memory: 2.0,
                cmdline: String::new(),
                username: "root".into(),
            }],
        };
        let v = serde_json::to_value(&snap).unwrap();
        assert_eq!(v["timestamp"], "2024-05-01T12:30:00.000000Z");
        assert_eq!(v["system"]["ram_gb"], 16.0);
        assert_eq!(v["system"]["cores"], 0);
        assert!(v.get("ram_gb").is_none(), "system fields must stay nested");
        assert_eq!(v["processes"][0]["pid"], 1);
        assert!(v["processes"][0]["ppid"].is_null());
    }

    #[test]
    fn unit_conversion_rounds_to_two_decimals() {
        assert_eq!(bytes_to_gb(16 * 1024 * 1024 * 1024), 16.0);
        assert_eq!(bytes_to_gb(1_500_000_000), 1.4);
        assert_eq!(bytes_to_mb(340_430_848), 324.66);
        assert_eq!(round2(0.125_1), 0.13);
    }

    #[test]
    fn clip_counts_characters_not_bytes() {
        assert_eq!(clip("héllo".to_string(), 2), "hé");
        assert_eq!(clip("abc".to_string(), 3), "abc");
        assert_eq!(clip(String::new(), 0), "");
    }
}
