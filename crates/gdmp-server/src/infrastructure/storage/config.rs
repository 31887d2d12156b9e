//! TOML-based configuration for the relay server.
//!
//! The config file is optional.  When it is absent every field takes its
//! default, and individual fields missing from an existing file fall back the
//! same way.  Default location on Linux: `~/.config/gdmp/config.toml`
//! (`$XDG_CONFIG_HOME` is honoured).
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! port = 8080
//! backlog = 5
//! worker_threads = 5
//! max_connections = 1023
//! # poll_timeout_ms = 250   # omit to block until an event arrives
//! log_level = "info"
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent from the TOML file.

use std::net::{IpAddr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// The config could not be serialized to TOML.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// A value parsed but cannot be used.
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
}

/// Listener, worker pool and multiplexer settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// IP address to listen on.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// TCP port to listen on.  `0` lets the OS pick one.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Pending-connection queue length passed to `listen(2)`.
    #[serde(default = "default_backlog")]
    pub backlog: u32,
    /// Number of worker threads executing receive and send tasks.
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
    /// Maximum number of simultaneously open client connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
    /// Upper bound on one readiness wait.  `None` waits indefinitely.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_timeout_ms: Option<u64>,
    /// `tracing` log level used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}
fn default_backlog() -> u32 {
    5
}
fn default_worker_threads() -> usize {
    5
}
fn default_max_connections() -> usize {
    1023
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            backlog: default_backlog(),
            worker_threads: default_worker_threads(),
            max_connections: default_max_connections(),
            poll_timeout_ms: None,
            log_level: default_log_level(),
        }
    }
}

impl ServerConfig {
    /// Checks values that deserialize fine but cannot run a server.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.bind_ip()?;
        if self.worker_threads == 0 {
            return Err(ConfigError::Invalid {
                field: "worker_threads",
                reason: "at least one worker thread is required".to_string(),
            });
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid {
                field: "max_connections",
                reason: "at least one connection must be allowed".to_string(),
            });
        }
        if self.backlog == 0 {
            return Err(ConfigError::Invalid {
                field: "backlog",
                reason: "the accept backlog must be positive".to_string(),
            });
        }
        Ok(())
    }

    /// The address the listener binds to.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if `bind_address` is not an IP address.
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        Ok(SocketAddr::new(self.bind_ip()?, self.port))
    }

    pub fn poll_timeout(&self) -> Option<Duration> {
        self.poll_timeout_ms.map(Duration::from_millis)
    }

    fn bind_ip(&self) -> Result<IpAddr, ConfigError> {
        self.bind_address
            .parse()
            .map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
                field: "bind_address",
                reason: format!("{:?}: {e}", self.bind_address),
            })
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Resolves the default config file path.
///
/// # Errors
///
/// Returns [`ConfigError::NoPlatformConfigDir`] when neither
/// `XDG_CONFIG_HOME` nor `HOME` is set.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let base = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok_or(ConfigError::NoPlatformConfigDir)?;
    Ok(base.join("gdmp").join("config.toml"))
}

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Writes `config` to `path`, creating parent directories as needed.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system failures or
/// [`ConfigError::Serialize`] if serialization fails.
pub fn save_config(config: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }

    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("gdmp_cfg_{name}_{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    // ── Defaults ──────────────────────────────────────────────────────────────

    #[test]
    fn test_server_config_defaults() {
        // Arrange / Act
        let cfg = ServerConfig::default();

        // Assert
        assert_eq!(cfg.bind_address, "0.0.0.0");
        assert_eq!(cfg.port, 8080);
        assert_eq!(cfg.backlog, 5);
        assert_eq!(cfg.worker_threads, 5);
        assert_eq!(cfg.max_connections, 1023);
        assert_eq!(cfg.poll_timeout_ms, None);
        assert_eq!(cfg.log_level, "info");
    }

    #[test]
    fn test_default_config_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_poll_timeout_converts_milliseconds() {
        let cfg = ServerConfig {
            poll_timeout_ms: Some(250),
            ..ServerConfig::default()
        };
        assert_eq!(cfg.poll_timeout(), Some(Duration::from_millis(250)));
        assert_eq!(ServerConfig::default().poll_timeout(), None);
    }

    // ── Validation ────────────────────────────────────────────────────────────

    #[test]
    fn test_validate_rejects_zero_worker_threads() {
        let cfg = ServerConfig {
            worker_threads: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid {
                field: "worker_threads",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_zero_max_connections() {
        let cfg = ServerConfig {
            max_connections: 0,
            ..ServerConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid {
                field: "max_connections",
                ..
            })
        ));
    }

    #[test]
    fn test_validate_rejects_unparsable_bind_address() {
        let cfg = ServerConfig {
            bind_address: "localhost".to_string(),
            ..ServerConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::Invalid {
                field: "bind_address",
                ..
            })
        ));
    }

    #[test]
    fn test_socket_addr_combines_address_and_port() {
        let cfg = ServerConfig {
            bind_address: "127.0.0.1".to_string(),
            port: 9000,
            ..ServerConfig::default()
        };
        assert_eq!(cfg.socket_addr().unwrap(), "127.0.0.1:9000".parse().unwrap());
    }

    // ── TOML parsing ──────────────────────────────────────────────────────────

    #[test]
    fn test_deserialize_empty_toml_uses_defaults() {
        let cfg: AppConfig = toml::from_str("").expect("empty config must parse");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_deserialize_partial_server_section_overrides_defaults() {
        // Arrange
        let toml_str = r#"
            [server]
            port = 9999
            poll_timeout_ms = 100
        "#;

        // Act
        let cfg: AppConfig = toml::from_str(toml_str).expect("deserialize");

        // Assert
        assert_eq!(cfg.server.port, 9999);
        assert_eq!(cfg.server.poll_timeout_ms, Some(100));
        assert_eq!(cfg.server.worker_threads, 5);
        assert_eq!(cfg.server.bind_address, "0.0.0.0");
    }

    #[test]
    fn test_deserialize_invalid_toml_returns_parse_error() {
        let result: Result<AppConfig, _> = toml::from_str("[server\nport = ");
        assert!(result.is_err());
    }

    #[test]
    fn test_serializes_and_deserializes_round_trip() {
        let mut cfg = AppConfig::default();
        cfg.server.port = 7000;
        cfg.server.poll_timeout_ms = Some(50);

        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: AppConfig = toml::from_str(&toml_str).expect("deserialize");

        assert_eq!(cfg, restored);
    }

    // ── File I/O ──────────────────────────────────────────────────────────────

    #[test]
    fn test_load_config_returns_default_when_file_absent() {
        let dir = temp_dir("absent");
        let cfg = load_config(&dir.join("config.toml")).expect("absent file is not an error");
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_save_and_load_config_round_trip_via_temp_dir() {
        // Arrange
        let dir = temp_dir("round_trip");
        let path = dir.join("nested").join("config.toml");
        let mut cfg = AppConfig::default();
        cfg.server.worker_threads = 12;
        cfg.server.log_level = "debug".to_string();

        // Act
        save_config(&cfg, &path).expect("save");
        let loaded = load_config(&path).expect("load");

        // Assert
        assert_eq!(loaded, cfg);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_config_reports_parse_error() {
        let dir = temp_dir("parse_error");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.toml");
        std::fs::write(&path, "[server]\nport = \"not a number\"\n").unwrap();

        let result = load_config(&path);

        assert!(matches!(result, Err(ConfigError::Parse(_))));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_default_config_path_ends_with_gdmp_config_toml() {
        if let Ok(path) = default_config_path() {
            assert!(path.ends_with("gdmp/config.toml"));
        }
    }
}
