use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::auth::TokenTable;

pub const WAL_FILE_NAME: &str = "theatres.wal";

/// Process configuration, read once from `OTS_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub metrics_port: Option<u16>,
    pub compact_threshold: u64,
    pub max_connections: usize,
    pub tokens: TokenTable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub var: &'static str,
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.var, self.message)
    }
}

impl std::error::Error for ConfigError {}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T::Err: fmt::Display,
{
    match lookup(var) {
        None => Ok(None),
        Some(raw) if raw.trim().is_empty() => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|e: T::Err| ConfigError {
            var,
            message: format!("invalid value {raw:?}: {e}"),
        }),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let max_connections: usize = parse_var(&lookup, "OTS_MAX_CONNECTIONS")?.unwrap_or(256);
        if max_connections == 0 {
            return Err(ConfigError {
                var: "OTS_MAX_CONNECTIONS",
                message: "must be at least 1".into(),
            });
        }
        let tokens = TokenTable::parse(&lookup("OTS_TOKENS").unwrap_or_default())
            .map_err(|message| ConfigError { var: "OTS_TOKENS", message })?;

        Ok(Self {
            bind: lookup("OTS_BIND").unwrap_or_else(|| "0.0.0.0".into()),
            port: parse_var(&lookup, "OTS_PORT")?.unwrap_or(3000),
            data_dir: lookup("OTS_DATA_DIR").unwrap_or_else(|| "./data".into()).into(),
            metrics_port: parse_var(&lookup, "OTS_METRICS_PORT")?,
            compact_threshold: parse_var(&lookup, "OTS_COMPACT_THRESHOLD")?.unwrap_or(1000),
            max_connections,
            tokens,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    pub fn wal_path(&self) -> PathBuf {
        self.data_dir.join(WAL_FILE_NAME)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults() {
        let c = config(&[]).unwrap();
        assert_eq!(c.addr(), "0.0.0.0:3000");
        assert_eq!(c.wal_path(), PathBuf::from("./data").join("theatres.wal"));
        assert_eq!(c.metrics_port, None);
        assert_eq!(c.compact_threshold, 1000);
        assert_eq!(c.max_connections, 256);
        assert!(c.tokens.is_empty());
    }

    #[test]
    fn overrides() {
        let c = config(&[
            ("OTS_BIND", "127.0.0.1"),
            ("OTS_PORT", "8080"),
            ("OTS_DATA_DIR", "/var/lib/ots"),
            ("OTS_METRICS_PORT", "9100"),
            ("OTS_COMPACT_THRESHOLD", "50"),
            ("OTS_TOKENS", "admin:root"),
        ])
        .unwrap();
        assert_eq!(c.addr(), "127.0.0.1:8080");
        assert_eq!(c.wal_path(), PathBuf::from("/var/lib/ots/theatres.wal"));
        assert_eq!(c.metrics_port, Some(9100));
        assert_eq!(c.compact_threshold, 50);
        assert_eq!(c.tokens.len(), 1);
    }

    #[test]
    fn bad_values_name_the_variable() {
        let err = config(&[("OTS_PORT", "eighty")]).unwrap_err();
        assert_eq!(err.var, "OTS_PORT");
        let err = config(&[("OTS_MAX_CONNECTIONS", "0")]).unwrap_err();
        assert_eq!(err.var, "OTS_MAX_CONNECTIONS");
        let err = config(&[("OTS_TOKENS", "root")]).unwrap_err();
        assert_eq!(err.var, "OTS_TOKENS");
    }

    #[test]
    fn blank_values_fall_back_to_defaults() {
        let c = config(&[("OTS_PORT", "  "), ("OTS_METRICS_PORT", "")]).unwrap();
        assert_eq!(c.port, 3000);
        assert_eq!(c.metrics_port, None);
    }
}
