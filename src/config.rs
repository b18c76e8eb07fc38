//! Configuration management for ssh-sandbox.
//!
//! Configuration is loaded with the following priority (highest to lowest):
//! 1. Command-line arguments
//! 2. Environment variables
//! 3. Configuration file (JSON)
//! 4. Default values

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::cli::Args;
use crate::server::{ServerConfig, DEFAULT_HOST_KEY_PATH};

/// Application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listener configuration.
    pub server: ServerSection,
    /// SSH configuration.
    pub ssh: SshSection,
    /// Logging configuration.
    pub logging: LoggingSection,
}

/// Server configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    /// Host address to bind to.
    pub host: String,
    /// Port to listen on.
    pub port: u16,
    /// Seconds active sessions get to finish after a shutdown signal.
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 2222,
            shutdown_timeout_secs: 30,
        }
    }
}

/// SSH configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SshSection {
    /// Path to the host private key.
    pub host_key_path: PathBuf,
}

impl Default for SshSection {
    fn default() -> Self {
        Self {
            host_key_path: PathBuf::from(DEFAULT_HOST_KEY_PATH),
        }
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// Log level (error, warn, info, debug, trace).
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::Io)?;
        serde_json::from_str(&content).map_err(ConfigError::Json)
    }

    /// Apply environment variable overrides.
    pub fn apply_env(&mut self) {
        self.apply_env_from(|name| std::env::var(name).ok());
    }

    /// Apply overrides from an arbitrary variable lookup (for testing).
    ///
    /// Unparseable numeric values are ignored.
    pub fn apply_env_from<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = var("SSH_SANDBOX_HOST") {
            self.server.host = host;
        }

        if let Some(port) = var("SSH_SANDBOX_PORT") {
            if let Ok(port) = port.parse() {
                self.server.port = port;
            }
        }

        if let Some(secs) = var("SSH_SANDBOX_SHUTDOWN_TIMEOUT") {
            if let Ok(secs) = secs.parse() {
                self.server.shutdown_timeout_secs = secs;
            }
        }

        if let Some(path) = var("HOST_KEY_PATH") {
            if !path.is_empty() {
                self.ssh.host_key_path = PathBuf::from(path);
            }
        }

        if let Some(level) = var("SSH_SANDBOX_LOG_LEVEL") {
            self.logging.level = level;
        } else if let Some(level) = var("RUST_LOG") {
            self.logging.level = level;
        }
    }

    /// Apply CLI argument overrides.
    pub fn apply_args(&mut self, args: &Args) {
        if let Some(host) = args.host {
            self.server.host = host.to_string();
        }

        if let Some(port) = args.port {
            self.server.port = port;
        }

        if let Some(secs) = args.shutdown_timeout {
            self.server.shutdown_timeout_secs = secs;
        }

        if let Some(ref path) = args.host_key {
            self.ssh.host_key_path = path.clone();
        }

        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
    }

    /// Load configuration with full priority chain.
    ///
    /// Priority: CLI args > env vars > config file > defaults
    pub fn load(args: &Args) -> Result<Self, ConfigError> {
        let mut config = match args.config {
            Some(ref path) => Config::from_file(path)?,
            None => Config::default(),
        };

        config.apply_env();
        config.apply_args(args);

        Ok(config)
    }

    /// Convert to the listener configuration.
    pub fn to_server_config(&self) -> Result<ServerConfig, ConfigError> {
        let host: IpAddr = self
            .server
            .host
            .parse()
            .map_err(|_| ConfigError::InvalidHost(self.server.host.clone()))?;

        Ok(ServerConfig::new(host.to_string(), self.server.port)
            .with_host_key(&self.ssh.host_key_path)
            .with_shutdown_timeout(Duration::from_secs(self.server.shutdown_timeout_secs)))
    }

    /// Get the log level filter string.
    pub fn log_filter(&self) -> &str {
        &self.logging.level
    }
}

/// Configuration errors.
#[derive(Debug)]
pub enum ConfigError {
    /// IO error reading config file.
    Io(std::io::Error),
    /// JSON parsing error.
    Json(serde_json::Error),
    /// Invalid host address.
    InvalidHost(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "failed to read config file: {}", e),
            Self::Json(e) => write!(f, "failed to parse config file: {}", e),
            Self::InvalidHost(host) => write!(f, "invalid host address: {}", host),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 2222);
        assert_eq!(config.server.shutdown_timeout_secs, 30);
        assert_eq!(config.ssh.host_key_path, PathBuf::from("id_ed25519"));
        assert_eq!(config.log_filter(), "info");
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "server": {
                "host": "127.0.0.1",
                "port": 2022,
                "shutdown_timeout_secs": 5
            },
            "ssh": {
                "host_key_path": "/etc/ssh-sandbox/key"
            },
            "logging": {
                "level": "debug"
            }
        }"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 2022);
        assert_eq!(config.server.shutdown_timeout_secs, 5);
        assert_eq!(config.ssh.host_key_path, PathBuf::from("/etc/ssh-sandbox/key"));
        assert_eq!(config.log_filter(), "debug");
    }

    #[test]
    fn test_config_partial_json() {
        let json = r#"{
            "server": {
                "port": 9000
            }
        }"#;

        let mut file = NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert_eq!(config.server.host, "0.0.0.0"); // Default
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.shutdown_timeout_secs, 30);
    }

    #[test]
    fn test_config_invalid_json() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"{ not json").unwrap();

        let err = Config::from_file(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Json(_)));
    }

    #[test]
    fn test_config_missing_file() {
        let err = Config::from_file(Path::new("/nonexistent/ssh-sandbox.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }

    #[test]
    fn test_apply_env() {
        let mut config = Config::default();
        config.apply_env_from(env(&[
            ("SSH_SANDBOX_HOST", "127.0.0.1"),
            ("SSH_SANDBOX_PORT", "2200"),
            ("SSH_SANDBOX_SHUTDOWN_TIMEOUT", "10"),
            ("HOST_KEY_PATH", "/keys/host"),
            ("RUST_LOG", "trace"),
        ]));

        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 2200);
        assert_eq!(config.server.shutdown_timeout_secs, 10);
        assert_eq!(config.ssh.host_key_path, PathBuf::from("/keys/host"));
        assert_eq!(config.log_filter(), "trace");
    }

    #[test]
    fn test_apply_env_log_level_precedence() {
        let mut config = Config::default();
        config.apply_env_from(env(&[
            ("SSH_SANDBOX_LOG_LEVEL", "warn"),
            ("RUST_LOG", "trace"),
        ]));
        assert_eq!(config.log_filter(), "warn");
    }

    #[test]
    fn test_apply_env_ignores_garbage() {
        let mut config = Config::default();
        config.apply_env_from(env(&[
            ("SSH_SANDBOX_PORT", "not-a-port"),
            ("SSH_SANDBOX_SHUTDOWN_TIMEOUT", "soon"),
            ("HOST_KEY_PATH", ""),
        ]));

        assert_eq!(config.server.port, 2222);
        assert_eq!(config.server.shutdown_timeout_secs, 30);
        assert_eq!(config.ssh.host_key_path, PathBuf::from("id_ed25519"));
    }

    #[test]
    fn test_apply_args() {
        let mut config = Config::default();
        let args = Args {
            host: Some("192.168.1.1".parse().unwrap()),
            port: Some(5000),
            host_key: Some(PathBuf::from("/tmp/key")),
            shutdown_timeout: Some(3),
            ..Args::default()
        };

        config.apply_args(&args);

        assert_eq!(config.server.host, "192.168.1.1");
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.ssh.host_key_path, PathBuf::from("/tmp/key"));
        assert_eq!(config.server.shutdown_timeout_secs, 3);
    }

    #[test]
    fn test_args_override_env() {
        let mut config = Config::default();
        config.apply_env_from(env(&[("SSH_SANDBOX_PORT", "2200")]));
        config.apply_args(&Args {
            port: Some(2300),
            ..Args::default()
        });
        assert_eq!(config.server.port, 2300);
    }

    #[test]
    fn test_unset_args_keep_values() {
        let mut config = Config::default();
        config.server.port = 9999;
        config.apply_args(&Args::default());
        assert_eq!(config.server.port, 9999);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn test_to_server_config() {
        let config = Config::default();
        let server_config = config.to_server_config().unwrap();

        assert_eq!(server_config.host, "0.0.0.0");
        assert_eq!(server_config.port, 2222);
        assert_eq!(server_config.host_key_path, PathBuf::from("id_ed25519"));
        assert_eq!(server_config.shutdown_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_invalid_host() {
        let mut config = Config::default();
        config.server.host = "not-an-ip".to_string();

        let result = config.to_server_config();
        assert!(matches!(result, Err(ConfigError::InvalidHost(_))));
    }

    #[test]
    fn test_config_serialization() {
        let config = Config::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        assert!(json.contains("\"host_key_path\""));
        assert!(json.contains("\"shutdown_timeout_secs\""));
    }
}
