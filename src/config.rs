//! InsightMap configuration management

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Main InsightMap configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InsightMapConfig {
    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Node storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Graph derivation configuration
    #[serde(default)]
    pub graph: GraphConfig,

    /// Generation session configuration
    #[serde(default)]
    pub sessions: SessionsConfig,

    /// Upstream generation provider configuration
    #[serde(default)]
    pub generation: GenerationConfig,
}

impl InsightMapConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Render configuration as TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Allowed CORS origins (empty = any origin)
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 5001,
            cors_origins: Vec::new(),
        }
    }
}

/// Node storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one file per node
    pub nodes_dir: PathBuf,

    /// File extension of node files (without the dot)
    pub extension: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            nodes_dir: PathBuf::from("files"),
            extension: "md".to_string(),
        }
    }
}

/// Graph derivation configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphConfig {
    /// Which node set link targets are validated against
    #[serde(default)]
    pub edge_validation: EdgeValidation,
}

/// Edge validation policy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EdgeValidation {
    /// Validate against every node found by the scan (default)
    #[default]
    Full,

    /// Validate against the nodes read so far, in listing order
    Accumulated,
}

/// Generation session configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionsConfig {
    /// Seconds an unattached session stays claimable
    pub ttl_secs: u64,

    /// Seconds between sweeps of expired sessions
    pub sweep_interval_secs: u64,
}

impl SessionsConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            ttl_secs: 600,
            sweep_interval_secs: 60,
        }
    }
}

/// Upstream generation provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// OpenAI-compatible API base URL
    pub base_url: String,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Model used for every generation kind
    pub model: String,

    /// Output bound for question answering
    pub answer_max_tokens: u32,

    /// Sampling temperature for question answering
    pub answer_temperature: f32,

    /// Request timeout in seconds
    pub timeout_secs: u64,
}

impl GenerationConfig {
    /// Resolve the API key from the configured environment variable.
    ///
    /// Tries the exact name, then its UPPER_CASE form.
    pub fn resolve_api_key(&self) -> Option<String> {
        std::env::var(&self.api_key_env)
            .or_else(|_| std::env::var(self.api_key_env.to_uppercase()))
            .ok()
            .filter(|k| !k.is_empty())
    }
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_KEY".to_string(),
            model: "gpt-4-1106-preview".to_string(),
            answer_max_tokens: 4096,
            answer_temperature: 0.0,
            timeout_secs: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = InsightMapConfig::default();
        assert_eq!(config.server.port, 5001);
        assert_eq!(config.storage.extension, "md");
        assert_eq!(config.graph.edge_validation, EdgeValidation::Full);
        assert_eq!(config.sessions.ttl(), Duration::from_secs(600));
        assert_eq!(config.generation.answer_max_tokens, 4096);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: InsightMapConfig = toml::from_str(
            r#"
            [graph]
            edge_validation = "accumulated"

            [sessions]
            ttl_secs = 30
            sweep_interval_secs = 0
            "#,
        )
        .unwrap();

        assert_eq!(config.graph.edge_validation, EdgeValidation::Accumulated);
        assert_eq!(config.sessions.ttl_secs, 30);
        // Zero interval is clamped so the sweeper never spins
        assert_eq!(config.sessions.sweep_interval(), Duration::from_secs(1));
        assert_eq!(config.server.port, 5001);
    }

    #[test]
    fn test_toml_round_trip() {
        let config = InsightMapConfig::default();
        let rendered = config.to_toml().unwrap();
        let parsed: InsightMapConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.generation.model, config.generation.model);
        assert_eq!(parsed.storage.nodes_dir, config.storage.nodes_dir);
    }

    #[test]
    fn test_load_missing_file() {
        let result = InsightMapConfig::load(Path::new("/nonexistent/insightmap.toml"));
        assert!(matches!(result, Err(Error::Io(_))));
    }

    #[test]
    fn test_resolve_api_key_missing() {
        let config = GenerationConfig {
            api_key_env: "INSIGHTMAP_TEST_KEY_THAT_IS_NOT_SET".to_string(),
            ..Default::default()
        };
        assert!(config.resolve_api_key().is_none());
    }
}
