//! Storage infrastructure: configuration file persistence.
//!
//! The `config` sub-module reads the optional TOML config file, supplies
//! defaults for anything it does not set, and validates the result before the
//! server is built from it.

pub mod config;

pub use config::{load_config, save_config, AppConfig, ConfigError, ServerConfig};
