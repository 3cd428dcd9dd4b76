//! OpenAI chat-completions generator.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{GenerateError, GenerateRequest, Generator};
use crate::models::ModelProvider;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const BASE_URL_VAR: &str = "AI_INTEGRATIONS_OPENAI_BASE_URL";

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatReply,
}

#[derive(Deserialize)]
struct ChatReply {
    #[serde(default)]
    content: Option<String>,
}

/// Generator backed by an OpenAI-compatible `/chat/completions` endpoint
pub struct OpenAiGenerator {
    api_key: Option<String>,
    base_url: String,
    client: Client,
}

impl OpenAiGenerator {
    pub fn new(api_key: Option<String>, base_url: Option<String>, client: Client) -> Self {
        Self {
            api_key,
            base_url: base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            client,
        }
    }

    /// Read the key and optional base URL from the environment
    pub fn from_env(client: Client) -> Self {
        let api_key = ModelProvider::OpenAI.api_key_from_env();
        let base_url = std::env::var(BASE_URL_VAR)
            .ok()
            .filter(|url| !url.trim().is_empty());
        Self::new(api_key, base_url, client)
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self, override_url: Option<&str>) -> String {
        let base = override_url.unwrap_or(&self.base_url);
        format!("{}/chat/completions", base.trim_end_matches('/'))
    }
}

#[async_trait]
impl Generator for OpenAiGenerator {
    fn provider(&self) -> ModelProvider {
        ModelProvider::OpenAI
    }

    async fn generate(&self, request: &GenerateRequest<'_>) -> Result<String, GenerateError> {
        let provider = self.provider();
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(GenerateError::NotConfigured { provider })?;

        let body = ChatRequest {
            model: request.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: request.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: request.user_prompt,
                },
            ],
            temperature: request.temperature,
            max_tokens: request.max_tokens,
        };

        let response = self
            .client
            .post(self.endpoint(request.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|source| GenerateError::Http { provider, source })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GenerateError::api(provider, status.as_u16(), text));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|source| GenerateError::Http { provider, source })?;

        // An empty reply is not an error here; the stage parser reports it.
        Ok(parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}
