//! Agent configuration, read once from the environment at startup.

use std::time::Duration;
use tracing::warn;

pub const DEFAULT_BACKEND: &str = "http://127.0.0.1:8000/api/process-data/";
pub const DEFAULT_API_KEY: &str = "procsnap-insecure-dev-key";

#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    pub backend_url: String,
    pub api_key: String,
    /// Zero means a single cycle.
    pub interval: Duration,
    pub cpu_sample_delay: Duration,
    // Reference thresholds: reported in logs, never enforced.
    pub high_cpu_percent: f64,
    pub high_mem_mb: f64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            backend_url: DEFAULT_BACKEND.to_string(),
            api_key: DEFAULT_API_KEY.to_string(),
            interval: Duration::from_secs(60),
            cpu_sample_delay: Duration::from_millis(150),
            high_cpu_percent: 50.0,
            high_mem_mb: 500.0,
        }
    }
}

impl AgentConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        // Zero or negative means a single run.
        let interval = match parse_opt::<_, i64>(&lookup, "PROCSNAP_INTERVAL") {
            None => d.interval,
            Some(secs) => Duration::from_secs(secs.max(0).unsigned_abs()),
        };
        let cpu_sample_delay = match parse_opt::<_, f64>(&lookup, "PROCSNAP_CPU_SAMPLE_DELAY") {
            None => d.cpu_sample_delay,
            Some(secs) => Duration::try_from_secs_f64(secs).unwrap_or_else(|_| {
                warn!("PROCSNAP_CPU_SAMPLE_DELAY={secs} out of range, using default");
                d.cpu_sample_delay
            }),
        };
        Self {
            backend_url: lookup("PROCSNAP_BACKEND")
                .filter(|v| !v.is_empty())
                .unwrap_or(d.backend_url),
            api_key: lookup("PROCSNAP_API_KEY")
                .filter(|v| !v.is_empty())
                .unwrap_or(d.api_key),
            interval,
            cpu_sample_delay,
            high_cpu_percent: parse_or(&lookup, "PROCSNAP_HIGH_CPU", d.high_cpu_percent),
            high_mem_mb: parse_or(&lookup, "PROCSNAP_HIGH_MEM_MB", d.high_mem_mb),
        }
    }

    pub fn uses_default_key(&self) -> bool {
        self.api_key == DEFAULT_API_KEY
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> T
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    parse_opt(lookup, key).unwrap_or(default)
}

fn parse_opt<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!("ignoring unparsable {key}={raw:?}");
            None
        }
    }
}
