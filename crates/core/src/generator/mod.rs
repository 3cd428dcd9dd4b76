//! # Generators
//!
//! The single capability every stage depends on: turn a system instruction
//! plus a user prompt into raw text.
//!
//! ```text
//! Stage ──GenerateRequest──▶ dyn Generator ──▶ OpenAiGenerator | GeminiGenerator
//! ```
//!
//! The concrete generator for each provider is chosen once, when
//! [`Generators`] is built at startup. Stages never branch on the provider.

mod gemini;
mod openai;

pub use gemini::GeminiGenerator;
pub use openai::OpenAiGenerator;

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::models::ModelProvider;

/// Default per-request HTTP timeout for provider calls
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Longest error body kept in a [`GenerateError::Api`]
const MAX_ERROR_BODY: usize = 512;

/// One generation call
#[derive(Debug, Clone)]
pub struct GenerateRequest<'a> {
    pub system_prompt: &'a str,
    pub user_prompt: &'a str,
    pub model: &'a str,
    pub temperature: f32,
    pub max_tokens: u32,
    /// Per-call endpoint override (OpenAI-compatible only)
    pub base_url: Option<&'a str>,
}

/// Why a generation call produced no text
#[derive(Debug, Error)]
pub enum GenerateError {
    /// No credentials were found for the provider. Recoverable: the calling
    /// stage stalls instead of failing the run.
    #[error("{provider} is not configured (no API key)")]
    NotConfigured { provider: ModelProvider },

    #[error("request to {provider} failed: {source}")]
    Http {
        provider: ModelProvider,
        #[source]
        source: reqwest::Error,
    },

    #[error("{provider} returned HTTP {status}: {body}")]
    Api {
        provider: ModelProvider,
        status: u16,
        body: String,
    },
}

impl GenerateError {
    /// Whether this is the recoverable "no credentials" condition
    pub fn is_not_configured(&self) -> bool {
        matches!(self, GenerateError::NotConfigured { .. })
    }

    pub(crate) fn api(provider: ModelProvider, status: u16, body: String) -> Self {
        let body = if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            format!("{}…", &body[..cut])
        } else {
            body
        };
        GenerateError::Api {
            provider,
            status,
            body,
        }
    }
}

/// Text generation capability
#[async_trait]
pub trait Generator: Send + Sync {
    /// Provider this generator talks to
    fn provider(&self) -> ModelProvider;

    /// Generate raw text for the given prompts
    async fn generate(&self, request: &GenerateRequest<'_>) -> Result<String, GenerateError>;
}

/// One generator per provider, resolved at startup
#[derive(Clone)]
pub struct Generators {
    openai: Arc<dyn Generator>,
    gemini: Arc<dyn Generator>,
}

impl Generators {
    pub fn new(openai: Arc<dyn Generator>, gemini: Arc<dyn Generator>) -> Self {
        Self { openai, gemini }
    }

    /// Build both HTTP generators from environment credentials.
    ///
    /// A provider without a key still gets a generator; it answers every
    /// call with [`GenerateError::NotConfigured`].
    pub fn from_env(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;

        let openai = OpenAiGenerator::from_env(client.clone());
        let gemini = GeminiGenerator::from_env(client);

        for (provider, configured) in [
            (ModelProvider::OpenAI, openai.is_configured()),
            (ModelProvider::Gemini, gemini.is_configured()),
        ] {
            if configured {
                tracing::info!(%provider, "Model provider configured");
            } else {
                tracing::warn!(%provider, "Model provider has no API key; its stages will stall");
            }
        }

        Ok(Self::new(Arc::new(openai), Arc::new(gemini)))
    }

    /// Route every provider to the same generator
    pub fn uniform(generator: Arc<dyn Generator>) -> Self {
        Self::new(Arc::clone(&generator), generator)
    }

    /// Generator for a provider
    pub fn for_provider(&self, provider: ModelProvider) -> Arc<dyn Generator> {
        match provider {
            ModelProvider::OpenAI => Arc::clone(&self.openai),
            ModelProvider::Gemini => Arc::clone(&self.gemini),
        }
    }
}
