//! Configuration layer: typed settings with layered precedence (file → env).
//!
//! The embedding service loads `config/default` and `scorta` TOML files when
//! present, then applies `SCORTA`-prefixed environment variables
//! (`SCORTA_ENDPOINT`, `SCORTA_LOGGING__LEVEL`, ...). Raw values are
//! validated into typed settings before anything connects.

use std::num::NonZeroUsize;
use std::str::FromStr;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;
use url::Url;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "scorta";
const CONFIG_FILE_VAR: &str = "SCORTA_CONFIG_FILE";

pub const DEFAULT_ENDPOINT: &str = "redis://127.0.0.1:6379/0";
const DEFAULT_OP_TIMEOUT_MS: u64 = 250;
const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 1_000;
const DEFAULT_SCAN_BATCH: u64 = 512;

/// Fully-resolved cache settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct CacheSettings {
    /// Backing-store endpoint, `redis://` or `rediss://`.
    pub endpoint: String,
    /// Per-operation bound applied by `CacheStore`.
    pub op_timeout: Duration,
    /// Bound on establishing the shared connection.
    pub connect_timeout: Duration,
    /// Cursor page hint for scans and chunk size for bulk deletes.
    pub scan_batch: NonZeroUsize,
    pub logging: LoggingSettings,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            op_timeout: Duration::from_millis(DEFAULT_OP_TIMEOUT_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            scan_batch: NonZeroUsize::new(DEFAULT_SCAN_BATCH as usize)
                .unwrap_or(NonZeroUsize::MIN),
            logging: LoggingSettings::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: LevelFilter::INFO,
            format: LogFormat::Compact,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (files → environment).
///
/// `SCORTA_CONFIG_FILE` names an additional, required file when set.
pub fn load() -> Result<CacheSettings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Ok(path) = std::env::var(CONFIG_FILE_VAR) {
        builder = builder.add_source(File::with_name(&path).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("SCORTA").separator("__"));

    let raw: RawSettings = builder.build()?.try_deserialize()?;
    CacheSettings::from_raw(raw)
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    endpoint: Option<String>,
    op_timeout_ms: Option<u64>,
    connect_timeout_ms: Option<u64>,
    scan_batch: Option<u64>,
    logging: RawLoggingSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

impl CacheSettings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            endpoint,
            op_timeout_ms,
            connect_timeout_ms,
            scan_batch,
            logging,
        } = raw;

        let endpoint = build_endpoint(endpoint)?;
        let op_timeout = positive_millis(
            op_timeout_ms.unwrap_or(DEFAULT_OP_TIMEOUT_MS),
            "op_timeout_ms",
        )?;
        let connect_timeout = positive_millis(
            connect_timeout_ms.unwrap_or(DEFAULT_CONNECT_TIMEOUT_MS),
            "connect_timeout_ms",
        )?;
        let scan_batch = non_zero_usize(scan_batch.unwrap_or(DEFAULT_SCAN_BATCH), "scan_batch")?;
        let logging = build_logging_settings(logging)?;

        Ok(Self {
            endpoint,
            op_timeout,
            connect_timeout,
            scan_batch,
            logging,
        })
    }
}

fn build_endpoint(endpoint: Option<String>) -> Result<String, LoadError> {
    let endpoint = match endpoint {
        Some(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(LoadError::invalid("endpoint", "must not be empty"));
            }
            trimmed.to_string()
        }
        None => DEFAULT_ENDPOINT.to_string(),
    };

    let url = Url::parse(&endpoint)
        .map_err(|err| LoadError::invalid("endpoint", format!("failed to parse: {err}")))?;
    if !matches!(url.scheme(), "redis" | "rediss") {
        return Err(LoadError::invalid(
            "endpoint",
            format!(
                "unsupported scheme `{}`; expected redis:// or rediss://",
                url.scheme()
            ),
        ));
    }
    Ok(endpoint)
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn positive_millis(value: u64, key: &'static str) -> Result<Duration, LoadError> {
    if value == 0 {
        return Err(LoadError::invalid(key, "must be greater than zero"));
    }
    Ok(Duration::from_millis(value))
}

fn non_zero_usize(value: u64, key: &'static str) -> Result<NonZeroUsize, LoadError> {
    let value = usize::try_from(value)
        .map_err(|_| LoadError::invalid(key, "does not fit in this platform's usize"))?;
    NonZeroUsize::new(value).ok_or_else(|| LoadError::invalid(key, "must be greater than zero"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_applied() {
        let settings = CacheSettings::from_raw(RawSettings::default()).unwrap();
        assert_eq!(settings.endpoint, DEFAULT_ENDPOINT);
        assert_eq!(settings.op_timeout, Duration::from_millis(250));
        assert_eq!(settings.connect_timeout, Duration::from_millis(1_000));
        assert_eq!(settings.scan_batch.get(), 512);
        assert_eq!(settings.logging.level, LevelFilter::INFO);
        assert!(matches!(settings.logging.format, LogFormat::Compact));
    }

    #[test]
    fn endpoint_scheme_is_validated() {
        let raw = RawSettings {
            endpoint: Some("http://127.0.0.1:6379".to_string()),
            ..RawSettings::default()
        };
        assert!(matches!(
            CacheSettings::from_raw(raw),
            Err(LoadError::Invalid {
                key: "endpoint",
                ..
            })
        ));

        let raw = RawSettings {
            endpoint: Some("rediss://cache.internal:6380/1".to_string()),
            ..RawSettings::default()
        };
        assert!(CacheSettings::from_raw(raw).is_ok());
    }

    #[test]
    fn zero_values_are_rejected() {
        let raw = RawSettings {
            op_timeout_ms: Some(0),
            ..RawSettings::default()
        };
        assert!(CacheSettings::from_raw(raw).is_err());

        let raw = RawSettings {
            scan_batch: Some(0),
            ..RawSettings::default()
        };
        assert!(CacheSettings::from_raw(raw).is_err());
    }

    #[test]
    fn logging_level_parses_or_fails_loudly() {
        let raw = RawSettings {
            logging: RawLoggingSettings {
                level: Some("debug".to_string()),
                json: Some(true),
            },
            ..RawSettings::default()
        };
        let settings = CacheSettings::from_raw(raw).unwrap();
        assert_eq!(settings.logging.level, LevelFilter::DEBUG);
        assert!(matches!(settings.logging.format, LogFormat::Json));

        let raw = RawSettings {
            logging: RawLoggingSettings {
                level: Some("shouty".to_string()),
                json: None,
            },
            ..RawSettings::default()
        };
        assert!(matches!(
            CacheSettings::from_raw(raw),
            Err(LoadError::Invalid {
                key: "logging.level",
                ..
            })
        ));
    }

    #[test]
    fn environment_keys_map_onto_raw_settings() {
        let vars = std::collections::HashMap::from([
            ("SCORTA_ENDPOINT".to_string(), "redis://10.0.0.9:6380/2".to_string()),
            ("SCORTA_OP_TIMEOUT_MS".to_string(), "400".to_string()),
            ("SCORTA_LOGGING__LEVEL".to_string(), "warn".to_string()),
        ]);
        let raw: RawSettings = Config::builder()
            .add_source(
                Environment::with_prefix("SCORTA")
                    .separator("__")
                    .source(Some(vars)),
            )
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        let settings = CacheSettings::from_raw(raw).unwrap();
        assert_eq!(settings.endpoint, "redis://10.0.0.9:6380/2");
        assert_eq!(settings.op_timeout, Duration::from_millis(400));
        assert_eq!(settings.logging.level, LevelFilter::WARN);
    }
}
