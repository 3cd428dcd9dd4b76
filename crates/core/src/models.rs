//! # Signalchain Models
//!
//! Centralized model-provider configuration shared by the stage runtime and
//! the generator registry.
//!
//! Two providers are supported, each reading its API key from the environment:
//! - OpenAI (chat completions) - `OPENAI_API_KEY` or `AI_INTEGRATIONS_OPENAI_API_KEY`
//! - Gemini (Google) - `GEMINI_API_KEY` or `AI_INTEGRATIONS_GEMINI_API_KEY`

use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported model providers
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    #[default]
    #[serde(rename = "openai")]
    OpenAI,
    Gemini,
}

impl ModelProvider {
    /// Display name for logs and CLI output
    pub fn display_name(&self) -> &'static str {
        match self {
            ModelProvider::OpenAI => "OpenAI",
            ModelProvider::Gemini => "Gemini",
        }
    }

    /// Environment variables checked for an API key, in priority order
    pub fn api_key_vars(&self) -> &'static [&'static str] {
        match self {
            ModelProvider::OpenAI => &["AI_INTEGRATIONS_OPENAI_API_KEY", "OPENAI_API_KEY"],
            ModelProvider::Gemini => &["AI_INTEGRATIONS_GEMINI_API_KEY", "GEMINI_API_KEY"],
        }
    }

    /// Read the API key from the environment, if any variable is set
    pub fn api_key_from_env(&self) -> Option<String> {
        self.api_key_vars()
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|key| !key.trim().is_empty())
    }

    /// Whether this provider supports a custom base URL
    pub fn supports_base_url(&self) -> bool {
        matches!(self, ModelProvider::OpenAI)
    }

    /// Default model when a stage does not name one
    pub fn default_model(&self) -> &'static str {
        match self {
            ModelProvider::OpenAI => "gpt-4o-mini",
            ModelProvider::Gemini => "gemini-1.5-pro",
        }
    }
}

impl fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Configuration for model selection
///
/// ## Example
/// ```rust,ignore
/// use signalchain_core::models::{ModelConfig, ModelProvider};
///
/// let config = ModelConfig::with_provider(ModelProvider::Gemini, "gemini-1.5-pro");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Provider to use
    #[serde(default)]
    pub provider: ModelProvider,
    /// Model name (e.g., "gpt-4o", "gemini-1.5-pro")
    pub model: String,
    /// Optional base URL override for OpenAI-compatible APIs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::with_provider(ModelProvider::OpenAI, ModelProvider::OpenAI.default_model())
    }
}

impl ModelConfig {
    /// Create config for a specific provider
    pub fn with_provider(provider: ModelProvider, model: impl Into<String>) -> Self {
        Self {
            provider,
            model: model.into(),
            base_url: None,
        }
    }

    /// Set base URL (ignored by providers that do not support one)
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        if self.provider.supports_base_url() {
            self.base_url = Some(url.into());
        }
        self
    }
}
