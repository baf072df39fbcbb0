//! Configuration management for the translation relay.
//!
//! Supports loading configuration from:
//! - YAML/TOML files
//! - Environment variables (`RELAY__` prefix)
//! - Runtime overrides

pub mod cache;
pub mod pipeline;
pub mod settings;
pub mod speech;
pub mod store;
pub mod transport;

pub use cache::TtsCacheConfig;
pub use pipeline::PipelineConfig;
pub use settings::{AuthConfig, RateLimitConfig, ServerConfig, Settings, load_settings};
pub use speech::SpeechClientConfig;
pub use store::{StoreBackend, StoreConfig};
pub use transport::{HeartbeatConfig, TransportBackend, TransportConfig};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {0}")]
    FileNotFound(String),

    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("Environment error: {0}")]
    Environment(String),
}

impl From<config::ConfigError> for ConfigError {
    fn from(err: config::ConfigError) -> Self {
        ConfigError::ParseError(err.to_string())
    }
}
