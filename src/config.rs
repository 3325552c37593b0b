//! Configuration types.

use std::path::PathBuf;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;

/// Service configuration, read from `CMS_*` environment variables.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// HTTP/WS listen port.
    pub port: u16,
    /// Path to the libSQL database file.
    pub db_path: PathBuf,
    /// Prefix for generated ticket numbers (e.g. "CMP").
    pub ticket_prefix: String,
    /// How often the SLA breach sweep runs.
    pub sla_sweep_interval: Duration,
    /// Allowed CORS origins for the front-end. Empty = allow any.
    pub cors_origins: Vec<String>,
    /// Shared secret the authenticating gateway must present.
    pub gateway_secret: Option<SecretString>,
    /// Directory for daily rolling log files (stderr only when unset).
    pub log_dir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            db_path: PathBuf::from("./data/complaint-desk.db"),
            ticket_prefix: "CMP".to_string(),
            sla_sweep_interval: Duration::from_secs(300), // 5 minutes
            cors_origins: Vec::new(),
            gateway_secret: None,
            log_dir: None,
        }
    }
}

impl ServerConfig {
    /// Build config from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let port = parse_var("CMS_PORT")?.unwrap_or(defaults.port);

        let db_path = std::env::var("CMS_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let ticket_prefix = std::env::var("CMS_TICKET_PREFIX")
            .map(|s| s.trim().to_ascii_uppercase())
            .unwrap_or(defaults.ticket_prefix);
        if ticket_prefix.is_empty() || !ticket_prefix.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(ConfigError::InvalidValue {
                key: "CMS_TICKET_PREFIX".into(),
                message: format!("expected ASCII letters, got {ticket_prefix:?}"),
            });
        }

        let sla_sweep_interval = parse_var::<u64>("CMS_SLA_SWEEP_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.sla_sweep_interval);
        if sla_sweep_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "CMS_SLA_SWEEP_SECS".into(),
                message: "must be at least 1".into(),
            });
        }

        let cors_origins: Vec<String> = std::env::var("CMS_CORS_ORIGINS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let gateway_secret = std::env::var("CMS_GATEWAY_SECRET")
            .ok()
            .filter(|s| !s.is_empty())
            .map(SecretString::from);

        let log_dir = std::env::var("CMS_LOG_DIR").ok().map(PathBuf::from);

        Ok(Self {
            port,
            db_path,
            ticket_prefix,
            sla_sweep_interval,
            cors_origins,
            gateway_secret,
            log_dir,
        })
    }
}

fn parse_var<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| ConfigError::InvalidValue {
                key: key.to_string(),
                message: e.to_string(),
            }),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ServerConfig::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.ticket_prefix, "CMP");
        assert!(config.cors_origins.is_empty());
        assert!(config.gateway_secret.is_none());
    }

    #[test]
    fn parse_var_reports_key_on_bad_value() {
        // Unique key so parallel tests don't interfere.
        unsafe { std::env::set_var("CMS_TEST_BAD_PORT", "not-a-port") };
        let err = parse_var::<u16>("CMS_TEST_BAD_PORT").unwrap_err();
        assert!(err.to_string().contains("CMS_TEST_BAD_PORT"));
        unsafe { std::env::remove_var("CMS_TEST_BAD_PORT") };
    }

    #[test]
    fn parse_var_missing_is_none() {
        let value = parse_var::<u16>("CMS_TEST_UNSET_VARIABLE").unwrap();
        assert!(value.is_none());
    }
}
