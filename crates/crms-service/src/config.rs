//! Service configuration.
//!
//! Every dependency the service needs (store location, pool sizing, replay
//! policy, log output) is carried in one [`ServiceConfig`] value that callers
//! construct explicitly or load from the environment.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable, one line per event.
    #[default]
    Pretty,
    /// One JSON object per event.
    Json,
}

impl std::str::FromStr for LogFormat {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            _ => Err(()),
        }
    }
}

/// Logging setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive, e.g. `info` or `crms_service=debug,info`.
    pub filter: String,
    pub format: LogFormat,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Configuration for a [`RulesService`](crate::RulesService).
///
/// Custom `Debug` implementation redacts credentials embedded in
/// `database_url`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// PostgreSQL URL. `None` selects the in-memory store.
    pub database_url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
    /// Reject a reused idempotency key whose request fingerprint differs
    /// from the stored one.
    pub reject_payload_drift: bool,
    pub telemetry: TelemetryConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            database_url: None,
            max_connections: 10,
            acquire_timeout_secs: 5,
            reject_payload_drift: true,
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field(
                "database_url",
                &self.database_url.as_deref().map(redact_credentials),
            )
            .field("max_connections", &self.max_connections)
            .field("acquire_timeout_secs", &self.acquire_timeout_secs)
            .field("reject_payload_drift", &self.reject_payload_drift)
            .field("telemetry", &self.telemetry)
            .finish()
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    ///
    /// Variables:
    /// - `DATABASE_URL` (default: unset, in-memory store)
    /// - `CRMS_DB_MAX_CONNECTIONS` (default: 10)
    /// - `CRMS_DB_ACQUIRE_TIMEOUT_SECS` (default: 5)
    /// - `CRMS_REJECT_PAYLOAD_DRIFT` (default: true)
    /// - `CRMS_LOG` (default: `info`)
    /// - `CRMS_LOG_FORMAT`, `pretty` or `json` (default: `pretty`)
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());

        Ok(Self {
            database_url: get("DATABASE_URL").map(|url| normalize_postgres_url(&url)),
            max_connections: parse_var(&get, "CRMS_DB_MAX_CONNECTIONS")?
                .unwrap_or(defaults.max_connections),
            acquire_timeout_secs: parse_var(&get, "CRMS_DB_ACQUIRE_TIMEOUT_SECS")?
                .unwrap_or(defaults.acquire_timeout_secs),
            reject_payload_drift: match get("CRMS_REJECT_PAYLOAD_DRIFT") {
                Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::Invalid {
                    var: "CRMS_REJECT_PAYLOAD_DRIFT".to_string(),
                    value: raw,
                })?,
                None => defaults.reject_payload_drift,
            },
            telemetry: TelemetryConfig {
                filter: get("CRMS_LOG").unwrap_or(defaults.telemetry.filter),
                format: match get("CRMS_LOG_FORMAT") {
                    Some(raw) => raw.parse().map_err(|()| ConfigError::Invalid {
                        var: "CRMS_LOG_FORMAT".to_string(),
                        value: raw,
                    })?,
                    None => defaults.telemetry.format,
                },
            },
        })
    }

    /// Pool acquire timeout.
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_secs(self.acquire_timeout_secs)
    }
}

fn parse_var<T, G>(get: &G, var: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    G: Fn(&str) -> Option<String>,
{
    get(var)
        .map(|raw| {
            raw.trim().parse().map_err(|_| ConfigError::Invalid {
                var: var.to_string(),
                value: raw,
            })
        })
        .transpose()
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Rewrite driver-qualified URLs (`postgresql+asyncpg://`) and the long
/// `postgresql://` scheme to `postgres://`.
pub fn normalize_postgres_url(url: &str) -> String {
    let url = url.trim();
    match url.split_once("://") {
        Some((scheme, rest)) if scheme == "postgresql" || scheme.starts_with("postgresql+") => {
            format!("postgres://{rest}")
        }
        _ => url.to_string(),
    }
}

fn redact_credentials(url: &str) -> String {
    match (url.split_once("://"), url.rfind('@')) {
        (Some((scheme, _)), Some(at)) => format!("{scheme}://[REDACTED]{}", &url[at..]),
        _ => url.to_string(),
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}")]
    Invalid { var: String, value: String },
}
