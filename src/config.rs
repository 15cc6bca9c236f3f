//! Configuration loading: defaults, then a YAML file, then `HIVEMIND_`
//! environment variables, each layer overriding the previous.

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::domain::errors::{CoreError, CoreResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSettings {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
    pub poll_interval_ms: u64,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self { host: "127.0.0.1".to_string(), port: 9444, enable_cors: true, poll_interval_ms: 100 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreConfig {
    /// Root directory for per-project database files. May live under a
    /// temp area; the durable artifacts are in each project's `.hive/`.
    pub state_dir: PathBuf,
    /// When set, connect to a long-running database daemon over this local
    /// socket instead of the embedded in-process driver.
    pub database_socket: Option<String>,
    /// Byte cap for message bodies in inbox summaries.
    pub inbox_preview_bytes: usize,
    /// Byte cap for unexpanded memory search previews.
    pub memory_preview_bytes: usize,
    /// Ollama-style embedder endpoint, consumed by the host that wires in
    /// an `Embedder` implementation.
    pub embedder_url: Option<String>,
    pub stream: StreamSettings,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            state_dir: std::env::temp_dir().join("hivemind"),
            database_socket: None,
            inbox_preview_bytes: crate::services::messaging::DEFAULT_PREVIEW_BYTES,
            memory_preview_bytes: crate::services::memory::DEFAULT_PREVIEW_BYTES,
            embedder_url: None,
            stream: StreamSettings::default(),
        }
    }
}

impl CoreConfig {
    /// Load configuration, optionally from a YAML file. Environment
    /// variables use the `HIVEMIND_` prefix with `__` nesting
    /// (`HIVEMIND_STREAM__PORT=9500`).
    pub fn load(config_path: Option<&Path>) -> CoreResult<Self> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = config_path {
            figment = figment.merge(Yaml::file(path));
        }
        figment
            .merge(Env::prefixed("HIVEMIND_").split("__"))
            .extract()
            .map_err(|e| CoreError::invalid(format!("invalid configuration: {e}")))
    }

    /// SQLite URL for a project's database under `state_dir`.
    pub fn database_url_for(&self, project_path: &Path) -> String {
        let path = crate::adapters::sqlite::project_database_path(&self.state_dir, project_path);
        format!("sqlite://{}", path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CoreConfig::default();
        assert_eq!(config.stream.port, 9444);
        assert_eq!(config.stream.poll_interval_ms, 100);
        assert!(config.database_socket.is_none());
    }

    #[test]
    fn test_yaml_layer_overrides_defaults() {
        let dir = std::env::temp_dir().join("hivemind-config-test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("config.yaml");
        std::fs::write(&path, "stream:\n  port: 9999\ninbox_preview_bytes: 64\n").unwrap();

        let config = CoreConfig::load(Some(&path)).unwrap();
        assert_eq!(config.stream.port, 9999);
        assert_eq!(config.inbox_preview_bytes, 64);
        // Untouched values keep their defaults.
        assert_eq!(config.stream.poll_interval_ms, 100);
    }

    #[test]
    fn test_database_url_embeds_project_hash() {
        let config = CoreConfig::default();
        let url = config.database_url_for(Path::new("/srv/demo"));
        assert!(url.starts_with("sqlite://"));
        assert!(url.ends_with("hive.db"));
    }
}
