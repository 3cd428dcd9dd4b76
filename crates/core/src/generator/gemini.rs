//! Google Gemini `generateContent` generator.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{GenerateError, GenerateRequest, Generator};
use crate::models::ModelProvider;

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    system_instruction: GeminiContent<'a>,
    contents: [GeminiContent<'a>; 1],
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: [GeminiPart<'a>; 1],
}

#[derive(Serialize)]
struct GeminiPart<'a> {
    text: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: Option<GeminiReplyContent>,
}

#[derive(Deserialize)]
struct GeminiReplyContent {
    #[serde(default)]
    parts: Vec<GeminiReplyPart>,
}

#[derive(Deserialize)]
struct GeminiReplyPart {
    #[serde(default)]
    text: Option<String>,
}

/// Generator backed by the Gemini REST API
pub struct GeminiGenerator {
    api_key: Option<String>,
    base_url: String,
    client: Client,
}

impl GeminiGenerator {
    pub fn new(api_key: Option<String>, client: Client) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            client,
        }
    }

    pub fn from_env(client: Client) -> Self {
        Self::new(ModelProvider::Gemini.api_key_from_env(), client)
    }

    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    fn endpoint(&self, model: &str) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model
        )
    }
}

#[async_trait]
impl Generator for GeminiGenerator {
    fn provider(&self) -> ModelProvider {
        ModelProvider::Gemini
    }

    async fn generate(&self, request: &GenerateRequest<'_>) -> Result<String, GenerateError> {
        let provider = self.provider();
        let api_key = self
            .api_key
            .as_deref()
            .ok_or(GenerateError::NotConfigured { provider })?;

        let body = GeminiRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: [GeminiPart {
                    text: request.system_prompt,
                }],
            },
            contents: [GeminiContent {
                role: Some("user"),
                parts: [GeminiPart {
                    text: request.user_prompt,
                }],
            }],
            generation_config: GenerationConfig {
                temperature: request.temperature,
                max_output_tokens: request.max_tokens,
            },
        };

        // Key travels in a header so it never shows up in URL-bearing errors.
        let response = self
            .client
            .post(self.endpoint(request.model))
            .header("x-goog-api-key", api_key)
            .json(&body)
            .send()
            .await
            .map_err(|source| GenerateError::Http { provider, source })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(GenerateError::api(provider, status.as_u16(), text));
        }

        let parsed: GeminiResponse = response
            .json()
            .await
            .map_err(|source| GenerateError::Http { provider, source })?;

        Ok(parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|p| p.text)
                    .collect::<Vec<_>>()
                    .join("")
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_includes_model() {
        let generator = GeminiGenerator::new(None, Client::new());
        assert_eq!(
            generator.endpoint("gemini-1.5-pro"),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-1.5-pro:generateContent"
        );
    }

    #[test]
    fn test_request_uses_camel_case() {
        let body = GeminiRequest {
            system_instruction: GeminiContent {
                role: None,
                parts: [GeminiPart { text: "sys" }],
            },
            contents: [GeminiContent {
                role: Some("user"),
                parts: [GeminiPart { text: "hello" }],
            }],
            generation_config: GenerationConfig {
                temperature: 0.5,
                max_output_tokens: 2000,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "sys");
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["contents"][0]["role"], "user");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 2000);
    }

    #[test]
    fn test_response_parts_are_joined() {
        let parsed: GeminiResponse = serde_json::from_str(
            r#"{"candidates":[{"content":{"parts":[{"text":"{\"a\":"},{"text":"1}"}]}}]}"#,
        )
        .unwrap();
        let text: String = parsed.candidates[0]
            .content
            .as_ref()
            .unwrap()
            .parts
            .iter()
            .filter_map(|p| p.text.clone())
            .collect();
        assert_eq!(text, "{\"a\":1}");
    }

    #[tokio::test]
    async fn test_missing_key_is_not_configured() {
        let generator = GeminiGenerator::new(None, Client::new());
        let request = GenerateRequest {
            system_prompt: "sys",
            user_prompt: "user",
            model: "gemini-1.5-pro",
            temperature: 0.5,
            max_tokens: 10,
            base_url: None,
        };
        assert!(generator.generate(&request).await.unwrap_err().is_not_configured());
    }
}
