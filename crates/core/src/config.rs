//! # Pipeline Configuration
//!
//! Loaded from `<runtime>/config.json`. The runtime directory is
//! `./.signalchain` unless `SIGNALCHAIN_RUNTIME_PATH` points elsewhere.
//! Every field is optional; a missing file means all defaults.
//!
//! ```json
//! {
//!   "batch_limit": 20,
//!   "item_delay_ms": 1000,
//!   "stages": {
//!     "analyst": { "provider": "openai", "model": "gpt-4o" }
//!   }
//! }
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::agents::{StageConfig, StageKind};
use crate::models::{ModelConfig, ModelProvider};
use crate::swarm::bus::DEFAULT_LOG_CAPACITY;
use crate::swarm::worker::WorkerConfig;

/// Environment override for the runtime directory
pub const RUNTIME_PATH_VAR: &str = "SIGNALCHAIN_RUNTIME_PATH";

const CONFIG_FILE: &str = "config.json";
const DB_FILE: &str = "signalchain.db";

/// Get the runtime directory path (.signalchain)
pub fn get_runtime_path() -> PathBuf {
    if let Ok(path) = std::env::var(RUNTIME_PATH_VAR) {
        return PathBuf::from(path);
    }

    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".signalchain")
}

/// Per-stage overrides on top of the built-in stage defaults
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StageOverride {
    pub provider: Option<ModelProvider>,
    pub model: Option<String>,
    /// OpenAI-compatible endpoint for this stage only
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Database file; `<runtime>/signalchain.db` when unset
    pub db_path: Option<PathBuf>,
    /// Items per batch when the caller gives no limit
    pub batch_limit: usize,
    /// Pause between items in a batch
    pub item_delay_ms: u64,
    /// Confidence recorded for outputs that carry none
    pub default_confidence: f64,
    /// Rows returned by the processed listing when the caller gives no limit
    pub processed_limit: usize,
    pub message_log_capacity: usize,
    pub request_timeout_secs: u64,
    pub stages: BTreeMap<StageKind, StageOverride>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            db_path: None,
            batch_limit: 10,
            item_delay_ms: 500,
            default_confidence: 75.0,
            processed_limit: 50,
            message_log_capacity: DEFAULT_LOG_CAPACITY,
            request_timeout_secs: 120,
            stages: BTreeMap::new(),
        }
    }
}

impl PipelineConfig {
    /// Load `<runtime>/config.json`
    pub async fn load() -> Result<Self> {
        Self::load_from(get_runtime_path().join(CONFIG_FILE)).await
    }

    /// Load a config file. Missing means defaults; malformed is an error.
    pub async fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!("No config at {:?}, using defaults", path);
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read config: {:?}", path));
            }
        };

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {:?}", path))?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_path
            .clone()
            .unwrap_or_else(|| get_runtime_path().join(DB_FILE))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            item_delay: Duration::from_millis(self.item_delay_ms),
            default_confidence: self.default_confidence,
            batch_limit: self.batch_limit,
            processed_limit: self.processed_limit,
            start_stage: StageKind::Scout,
        }
    }

    /// Stage configs in chain order with overrides applied
    pub fn stage_configs(&self) -> Vec<StageConfig> {
        StageKind::all()
            .into_iter()
            .map(|kind| {
                let mut config = kind.default_config();
                if let Some(o) = self.stages.get(&kind) {
                    apply_override(&mut config, o);
                }
                config
            })
            .collect()
    }
}

fn apply_override(config: &mut StageConfig, o: &StageOverride) {
    if let Some(provider) = o.provider {
        if provider != config.model.provider {
            // A provider switch without a model falls back to that provider's default
            config.model = ModelConfig::with_provider(provider, provider.default_model());
        }
    }
    if let Some(model) = &o.model {
        config.model.model = model.clone();
    }
    if let Some(url) = &o.base_url {
        config.model = config.model.clone().with_base_url(url.clone());
    }
    if let Some(t) = o.temperature {
        config.temperature = t;
    }
    if let Some(max) = o.max_tokens {
        config.max_tokens = max;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.batch_limit, 10);
        assert_eq!(config.item_delay_ms, 500);
        assert_eq!(config.processed_limit, 50);
        assert_eq!(config.stage_configs().len(), 5);
        assert_eq!(
            config.stage_configs()[1],
            StageKind::Analyst.default_config()
        );
    }

    #[test]
    fn test_partial_json_fills_defaults() {
        let config: PipelineConfig = serde_json::from_str(
            r#"{"item_delay_ms": 0, "stages": {"analyst": {"provider": "openai"}, "auditor": {"max_tokens": 800}}}"#,
        )
        .unwrap();
        assert_eq!(config.item_delay_ms, 0);
        assert_eq!(config.batch_limit, 10);

        let stages = config.stage_configs();
        assert_eq!(stages[1].model.provider, ModelProvider::OpenAI);
        assert_eq!(stages[1].model.model, "gpt-4o-mini");
        assert_eq!(stages[1].max_tokens, 2000);
        assert_eq!(stages[4].max_tokens, 800);
        assert_eq!(stages[4].model.model, "gpt-4o-mini");
    }

    #[test]
    fn test_base_url_override_only_for_openai() {
        let mut config = PipelineConfig::default();
        config.stages.insert(
            StageKind::Scout,
            StageOverride {
                base_url: Some("http://localhost:11434/v1".to_string()),
                ..Default::default()
            },
        );
        config.stages.insert(
            StageKind::Analyst,
            StageOverride {
                base_url: Some("http://localhost:11434/v1".to_string()),
                ..Default::default()
            },
        );

        let stages = config.stage_configs();
        assert!(stages[0].model.base_url.is_some());
        assert!(stages[1].model.base_url.is_none());
    }

    #[tokio::test]
    async fn test_missing_file_is_default() {
        let config = PipelineConfig::load_from("/nonexistent/signalchain/config.json")
            .await
            .unwrap();
        assert_eq!(config, PipelineConfig::default());
    }

    #[tokio::test]
    async fn test_malformed_file_is_error() {
        let dir = std::env::temp_dir().join(format!("signalchain-config-{}", std::process::id()));
        tokio::fs::create_dir_all(&dir).await.unwrap();
        let path = dir.join("config.json");
        tokio::fs::write(&path, "{ not json").await.unwrap();

        let err = PipelineConfig::load_from(&path).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }

    #[test]
    fn test_runtime_path_default() {
        if std::env::var(RUNTIME_PATH_VAR).is_err() {
            assert!(get_runtime_path().ends_with(".signalchain"));
        }
    }
}
