//! Daemon settings
//!
//! Defaults overridden by `QUEUELINE_*` environment variables, e.g.
//! `QUEUELINE_DB_PATH`, `QUEUELINE_RPC_PORT`, `QUEUELINE_AVERAGE_SERVICE_MINUTES`.

use config::{Config, ConfigError, Environment};
use queueline_api_rpc::RpcServerConfig;
use queueline_core::application::CoordinatorConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

const ENV_PREFIX: &str = "QUEUELINE";
const DEFAULT_DB_PATH: &str = "~/.queueline/queue.db";

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub db_path: String,
    pub rpc_host: String,
    pub rpc_port: u16,
    pub average_service_minutes: u32,
    pub lock_timeout_ms: u64,
    pub commit_timeout_ms: u64,
    pub sweep_interval_secs: u64,
}

impl Settings {
    /// Load from defaults and the process environment
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_environment(Environment::with_prefix(ENV_PREFIX))
    }

    fn from_environment(env: Environment) -> Result<Self, ConfigError> {
        let coordinator = CoordinatorConfig::default();
        let rpc = RpcServerConfig::default();

        let settings: Settings = Config::builder()
            .set_default("db_path", DEFAULT_DB_PATH)?
            .set_default("rpc_host", rpc.host)?
            .set_default("rpc_port", rpc.port as i64)?
            .set_default("average_service_minutes", coordinator.average_service_minutes as i64)?
            .set_default("lock_timeout_ms", coordinator.lock_timeout.as_millis() as i64)?
            .set_default("commit_timeout_ms", coordinator.commit_timeout.as_millis() as i64)?
            .set_default(
                "sweep_interval_secs",
                queueline_core::application::constants::DEFAULT_SWEEP_INTERVAL.as_secs() as i64,
            )?
            .add_source(env.try_parsing(true))
            .build()?
            .try_deserialize()?;

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.average_service_minutes == 0 {
            return Err(ConfigError::Message(
                "average_service_minutes must be at least 1".to_string(),
            ));
        }
        if self.lock_timeout_ms == 0 || self.commit_timeout_ms == 0 {
            return Err(ConfigError::Message("timeouts must be positive".to_string()));
        }
        if self.sweep_interval_secs == 0 {
            return Err(ConfigError::Message(
                "sweep_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Database file with `~` expanded
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.db_path).into_owned())
    }

    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            average_service_minutes: self.average_service_minutes,
            lock_timeout: Duration::from_millis(self.lock_timeout_ms),
            commit_timeout: Duration::from_millis(self.commit_timeout_ms),
        }
    }

    pub fn rpc(&self) -> RpcServerConfig {
        RpcServerConfig {
            host: self.rpc_host.clone(),
            port: self.rpc_port,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix(ENV_PREFIX).source(Some(map))
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_environment(env(&[])).unwrap();
        assert_eq!(settings.rpc_host, "127.0.0.1");
        assert_eq!(settings.rpc_port, 9630);
        assert_eq!(settings.average_service_minutes, 10);
        assert_eq!(settings.coordinator().lock_timeout, Duration::from_secs(5));
        assert_eq!(settings.sweep_interval(), Duration::from_secs(300));
        assert!(!settings.db_path().to_string_lossy().starts_with('~'));
    }

    #[test]
    fn test_environment_overrides() {
        let settings = Settings::from_environment(env(&[
            ("QUEUELINE_RPC_PORT", "9999"),
            ("QUEUELINE_AVERAGE_SERVICE_MINUTES", "7"),
            ("QUEUELINE_DB_PATH", "/tmp/queue.db"),
        ]))
        .unwrap();
        assert_eq!(settings.rpc().port, 9999);
        assert_eq!(settings.coordinator().average_service_minutes, 7);
        assert_eq!(settings.db_path(), PathBuf::from("/tmp/queue.db"));
    }

    #[test]
    fn test_zero_average_is_rejected() {
        let err = Settings::from_environment(env(&[("QUEUELINE_AVERAGE_SERVICE_MINUTES", "0")]))
            .unwrap_err();
        assert!(err.to_string().contains("average_service_minutes"));
    }
}
