use hooklog_core::LogStore;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_CONFIG_FILE: &str = "hooklog.toml";

/// Reserved for the server's liveness probe.
pub const HEALTH_PATH: &str = "/health";

pub const ENV_CONFIG: &str = "HOOKLOG_CONFIG";
pub const ENV_BIND: &str = "HOOKLOG_BIND";
pub const ENV_LOG_PATH: &str = "HOOKLOG_LOG_PATH";
pub const ENV_SYNC: &str = "HOOKLOG_SYNC";

// ---------------------------------------------------------------------------
// Config types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HooklogConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    pub callback_path: String,
    pub max_body_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8080)),
            callback_path: "/callback".to_string(),
            max_body_bytes: 64 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub path: PathBuf,
    /// fsync after every entry.
    pub sync: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("log.txt"),
            sync: true,
        }
    }
}

impl StoreConfig {
    pub fn open(&self) -> LogStore {
        LogStore::new(&self.path).with_sync(self.sync)
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid value for {name}: {value}")]
    Env { name: &'static str, value: String },
    #[error("invalid config: {0}")]
    Invalid(String),
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl HooklogConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    /// Reads `path`, `$HOOKLOG_CONFIG`, or `hooklog.toml` in the working
    /// directory when it exists, then applies environment overrides and
    /// validates the result.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let from_env = std::env::var_os(ENV_CONFIG).map(PathBuf::from);
        let default_path = Path::new(DEFAULT_CONFIG_FILE);
        let path = match path.or(from_env.as_deref()) {
            Some(path) => Some(path),
            None if default_path.exists() => Some(default_path),
            None => None,
        };

        let mut config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };

        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate().map_err(ConfigError::Invalid)?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup(ENV_BIND) {
            self.server.bind = value.parse().map_err(|_| ConfigError::Env {
                name: ENV_BIND,
                value,
            })?;
        }
        if let Some(value) = lookup(ENV_LOG_PATH) {
            self.store.path = PathBuf::from(value);
        }
        if let Some(value) = lookup(ENV_SYNC) {
            self.store.sync = parse_flag(&value).ok_or(ConfigError::Env {
                name: ENV_SYNC,
                value,
            })?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.store.path.as_os_str().is_empty() {
            return Err("store.path must not be empty".to_string());
        }

        if !self.server.callback_path.starts_with('/') {
            return Err("server.callback_path must start with '/'".to_string());
        }

        if self.server.callback_path == HEALTH_PATH {
            return Err(format!("server.callback_path must not be {HEALTH_PATH}"));
        }

        if self.server.max_body_bytes == 0 {
            return Err("server.max_body_bytes must be greater than zero".to_string());
        }

        Ok(())
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{ConfigError, HooklogConfig, ENV_BIND, ENV_LOG_PATH, ENV_SYNC};
    use std::collections::HashMap;
    use std::path::PathBuf;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = HooklogConfig::from_toml_str("").unwrap();
        assert_eq!(config, HooklogConfig::default());
        assert_eq!(config.server.bind.to_string(), "127.0.0.1:8080");
        assert_eq!(config.server.callback_path, "/callback");
        assert_eq!(config.store.path, PathBuf::from("log.txt"));
        assert!(config.store.sync);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_partial_sections() {
        let config = HooklogConfig::from_toml_str(
            r#"
            [server]
            bind = "0.0.0.0:9000"

            [store]
            path = "App_Data/log.txt"
            sync = false
            "#,
        )
        .unwrap();

        assert_eq!(config.server.bind.port(), 9000);
        assert_eq!(config.server.max_body_bytes, 64 * 1024);
        assert_eq!(config.store.path, PathBuf::from("App_Data/log.txt"));
        assert!(!config.store.sync);
    }

    #[test]
    fn rejects_unparseable_toml() {
        let err = HooklogConfig::from_toml_str("[server\nbind = 1").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut config = HooklogConfig::default();
        config
            .apply_overrides(env(&[
                (ENV_BIND, "127.0.0.1:3000"),
                (ENV_LOG_PATH, "/var/lib/hooklog/log.txt"),
                (ENV_SYNC, "off"),
            ]))
            .unwrap();

        assert_eq!(config.server.bind.port(), 3000);
        assert_eq!(config.store.path, PathBuf::from("/var/lib/hooklog/log.txt"));
        assert!(!config.store.sync);
    }

    #[test]
    fn invalid_override_is_reported() {
        let mut config = HooklogConfig::default();
        let err = config
            .apply_overrides(env(&[(ENV_SYNC, "sometimes")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { name: ENV_SYNC, .. }));

        let err = config
            .apply_overrides(env(&[(ENV_BIND, "not-an-address")]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Env { name: ENV_BIND, .. }));
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = HooklogConfig::default();
        config.server.callback_path = "callback".to_string();
        assert!(config.validate().is_err());

        let mut config = HooklogConfig::default();
        config.store.path = PathBuf::new();
        assert!(config.validate().is_err());

        let mut config = HooklogConfig::default();
        config.server.max_body_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = HooklogConfig::default();
        config.server.callback_path = "/health".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn file_values_survive_unrelated_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hooklog.toml");
        std::fs::write(&path, "[server]\ncallback_path = \"/adyen/notify\"\n").unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let mut config = HooklogConfig::from_toml_str(&raw).unwrap();
        config
            .apply_overrides(env(&[(ENV_LOG_PATH, "/srv/hooklog/log.txt")]))
            .unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.callback_path, "/adyen/notify");
        assert_eq!(config.server.bind.to_string(), "127.0.0.1:8080");
        assert_eq!(config.store.path, PathBuf::from("/srv/hooklog/log.txt"));
        assert!(config.store.sync);
    }

    #[test]
    fn store_config_opens_configured_path() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = HooklogConfig::default();
        config.store.path = dir.path().join("log.txt");

        let store = config.store.open();
        assert_eq!(store.path(), dir.path().join("log.txt"));
    }
}
