//! Top-level settings, loaded from defaults -> file -> environment
//! (`RELAY__`-prefixed), following the same precedence the teacher's
//! `config` crate setup uses.

use serde::{Deserialize, Serialize};

use crate::ConfigError;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub pipeline: crate::pipeline::PipelineConfig,
    #[serde(default)]
    pub speech: crate::speech::SpeechClientConfig,
    #[serde(default)]
    pub cache: crate::cache::TtsCacheConfig,
    #[serde(default)]
    pub transport: crate::transport::TransportConfig,
    #[serde(default)]
    pub store: crate::store::StoreConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default)]
    pub cors_enabled: bool,

    #[serde(default)]
    pub cors_origins: Vec<String>,

    #[serde(default)]
    pub auth: AuthConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub heartbeat: crate::transport::HeartbeatConfig,

    /// Stream-endpoint path prefix, e.g. `/call` for `/call/<session_id>`.
    #[serde(default = "default_stream_endpoint")]
    pub stream_endpoint: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            cors_enabled: false,
            cors_origins: Vec::new(),
            auth: AuthConfig::default(),
            rate_limit: RateLimitConfig::default(),
            heartbeat: crate::transport::HeartbeatConfig::default(),
            stream_endpoint: default_stream_endpoint(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_stream_endpoint() -> String {
    "/call".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub enabled: bool,
    /// Paths that bypass auth regardless of `enabled` (health, metrics).
    #[serde(default = "default_public_paths")]
    pub public_paths: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            public_paths: default_public_paths(),
        }
    }
}

fn default_public_paths() -> Vec<String> {
    vec!["/health".to_string(), "/ready".to_string(), "/metrics".to_string()]
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Max binary frames accepted per session per second, before the
    /// server starts dropping (distinct from Ingest Stream backpressure,
    /// which drops on the stream side; this guards the socket read loop).
    #[serde(default = "default_frames_per_second")]
    pub max_frames_per_second: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_frames_per_second: default_frames_per_second(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_frames_per_second() -> u32 {
    20
}

/// Load settings: built-in defaults, then an optional file, then
/// `RELAY__`-prefixed environment variables (highest precedence).
pub fn load_settings(config_path: Option<&str>) -> Result<Settings, ConfigError> {
    let mut builder = config::Config::builder()
        .add_source(config::Config::try_from(&Settings::default())?);

    if let Some(path) = config_path {
        builder = builder.add_source(config::File::with_name(path).required(false));
    }

    builder = builder.add_source(
        config::Environment::with_prefix("RELAY")
            .separator("__")
            .try_parsing(true),
    );

    let settings: Settings = builder.build()?.try_deserialize()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_a_file() {
        let settings = load_settings(None).expect("defaults must parse");
        assert_eq!(settings.server.bind_addr, "0.0.0.0:8080");
        assert!(!settings.server.auth.enabled);
    }

    #[test]
    fn auth_public_paths_cover_health_and_metrics() {
        let auth = AuthConfig::default();
        assert!(auth.public_paths.contains(&"/health".to_string()));
        assert!(auth.public_paths.contains(&"/metrics".to_string()));
    }
}
