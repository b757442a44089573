use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub network: NetworkConfig,
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NetworkConfig {
    /// `host:port` the connectivity probe dials.
    pub probe_address: String,
    pub probe_interval_secs: u64,
    pub probe_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncConfig {
    /// Remote collection holding the todo documents.
    pub collection: String,
    pub auto_sync_on_reconnect: bool,
    pub push_on_write: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite:data/todos.db".to_string(),
                max_connections: 5,
                connection_timeout: 30,
            },
            network: NetworkConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            probe_address: "1.1.1.1:443".to_string(),
            probe_interval_secs: 5,
            probe_timeout_ms: 3000,
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            collection: "Todo".to_string(),
            auto_sync_on_reconnect: true,
            push_on_write: true,
        }
    }
}

impl DatabaseConfig {
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout)
    }
}

impl NetworkConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = std::env::var("TODO_SYNC_DATABASE_URL") {
            let trimmed = v.trim();
            if !trimmed.is_empty() {
                cfg.database.url = trimmed.to_string();
            }
        }
        if let Some(value) = env_u64("TODO_SYNC_DATABASE_MAX_CONNECTIONS") {
            cfg.database.max_connections = u32::try_from(value).unwrap_or(u32::MAX);
        }
        if let Some(value) = env_u64("TODO_SYNC_DATABASE_TIMEOUT_SECS") {
            cfg.database.connection_timeout = value;
        }

        if let Ok(v) = std::env::var("TODO_SYNC_PROBE_ADDRESS") {
            let trimmed = v.trim();
            if !trimmed.is_empty() {
                cfg.network.probe_address = trimmed.to_string();
            }
        }
        if let Some(value) = env_u64("TODO_SYNC_PROBE_INTERVAL_SECS") {
            cfg.network.probe_interval_secs = value.max(1);
        }
        if let Some(value) = env_u64("TODO_SYNC_PROBE_TIMEOUT_MS") {
            cfg.network.probe_timeout_ms = value.max(1);
        }

        if let Ok(v) = std::env::var("TODO_SYNC_COLLECTION") {
            let trimmed = v.trim();
            if !trimmed.is_empty() {
                cfg.sync.collection = trimmed.to_string();
            }
        }
        if let Ok(v) = std::env::var("TODO_SYNC_AUTO_SYNC") {
            cfg.sync.auto_sync_on_reconnect = parse_bool(&v, cfg.sync.auto_sync_on_reconnect);
        }
        if let Ok(v) = std::env::var("TODO_SYNC_PUSH_ON_WRITE") {
            cfg.sync.push_on_write = parse_bool(&v, cfg.sync.push_on_write);
        }

        cfg
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.database.url.trim().is_empty() {
            return Err("Database url must not be empty".to_string());
        }
        if self.database.max_connections == 0 {
            return Err("Database max_connections must be greater than 0".to_string());
        }
        if self.network.probe_address.trim().is_empty() {
            return Err("Network probe_address must not be empty".to_string());
        }
        if self.network.probe_interval_secs == 0 {
            return Err("Network probe_interval_secs must be greater than 0".to_string());
        }
        if self.network.probe_timeout_ms == 0 {
            return Err("Network probe_timeout_ms must be greater than 0".to_string());
        }
        if self.sync.collection.trim().is_empty() {
            return Err("Sync collection must not be empty".to_string());
        }
        Ok(())
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| parse_u64(&v))
}

fn parse_bool(s: &str, default: bool) -> bool {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => default,
    }
}

fn parse_u64(value: &str) -> Option<u64> {
    value.trim().parse::<u64>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let cfg = AppConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.sync.collection, "Todo");
        assert!(cfg.sync.auto_sync_on_reconnect);
        assert_eq!(cfg.network.probe_timeout(), Duration::from_millis(3000));
    }

    #[test]
    fn test_validate_rejects_zero_connections() {
        let mut cfg = AppConfig::default();
        cfg.database.max_connections = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validation_failure_surfaces_as_app_error() {
        let mut cfg = AppConfig::default();
        cfg.network.probe_timeout_ms = 0;
        let err = cfg
            .validate()
            .map_err(crate::shared::error::AppError::ValidationError)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Validation error: Network probe_timeout_ms must be greater than 0"
        );
    }

    #[test]
    fn test_validate_rejects_blank_collection() {
        let mut cfg = AppConfig::default();
        cfg.sync.collection = "  ".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_parse_bool_falls_back_to_default() {
        assert!(parse_bool("YES", false));
        assert!(!parse_bool("off", true));
        assert!(parse_bool("maybe", true));
        assert!(!parse_bool("maybe", false));
    }

    #[test]
    fn test_parse_u64_trims_and_rejects_garbage() {
        assert_eq!(parse_u64(" 42 "), Some(42));
        assert_eq!(parse_u64("-1"), None);
        assert_eq!(parse_u64("ten"), None);
    }
}
