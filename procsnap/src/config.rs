//! Collector configuration: environment first, then command-line port override.

use std::path::PathBuf;
use tracing::warn;

pub const DEFAULT_API_KEY: &str = "procsnap-insecure-dev-key";
pub const DEFAULT_DB: &str = "procsnap.db";
pub const DEFAULT_PORT: u16 = 8000;

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub api_key: String,
    pub db_path: PathBuf,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            api_key: DEFAULT_API_KEY.to_string(),
            db_path: PathBuf::from(DEFAULT_DB),
            port: DEFAULT_PORT,
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let d = Self::default();
        let port = match lookup("PROCSNAP_PORT") {
            None => d.port,
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!("ignoring unparsable PROCSNAP_PORT={raw:?}");
                d.port
            }),
        };
        Self {
            api_key: lookup("PROCSNAP_API_KEY")
                .filter(|v| !v.is_empty())
                .unwrap_or(d.api_key),
            db_path: lookup("PROCSNAP_DB")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
                .unwrap_or(d.db_path),
            port,
        }
    }

    /// Apply `--port N`, `--port=N` or `-p N` from the process arguments.
    pub fn with_args<I: IntoIterator<Item = String>>(mut self, args: I) -> Self {
        self.port = parse_port(args, self.port);
        self
    }

    pub fn uses_default_key(&self) -> bool {
        self.api_key == DEFAULT_API_KEY
    }
}

/// The long form wins over the short one; anything unparsable keeps `default_port`.
pub fn parse_port<I: IntoIterator<Item = String>>(args: I, default_port: u16) -> u16 {
    let mut it = args.into_iter();
    let _ = it.next(); // program name
    let mut long: Option<String> = None;
    let mut short: Option<String> = None;
    while let Some(a) = it.next() {
        match a.as_str() {
            "--port" => long = it.next(),
            "-p" => short = it.next(),
            _ if a.starts_with("--port=") => {
                if let Some((_, v)) = a.split_once('=') {
                    long = Some(v.to_string());
                }
            }
            _ => {}
        }
    }
    long.or(short)
        .and_then(|s| s.parse::<u16>().ok())
        .unwrap_or(default_port)
}
