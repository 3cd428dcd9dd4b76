//! # Stage Runtime
//!
//! One generator call wrapped with a stage-specific prompt builder and
//! output parser.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use super::{analyst, auditor, composer, prompts, scout, strategist, ParseError};
use crate::generator::{GenerateError, GenerateRequest, Generator};
use crate::models::{ModelConfig, ModelProvider};
use crate::swarm::{IdSource, Message, MessageKind};

/// The five pipeline stages
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum StageKind {
    Scout,
    Analyst,
    Strategist,
    Composer,
    Auditor,
}

impl StageKind {
    /// All stages in chain order
    pub fn all() -> [StageKind; 5] {
        [
            StageKind::Scout,
            StageKind::Analyst,
            StageKind::Strategist,
            StageKind::Composer,
            StageKind::Auditor,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scout => "scout",
            Self::Analyst => "analyst",
            Self::Strategist => "strategist",
            Self::Composer => "composer",
            Self::Auditor => "auditor",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Scout => "Scout",
            Self::Analyst => "Analyst",
            Self::Strategist => "Strategist",
            Self::Composer => "Composer",
            Self::Auditor => "Auditor",
        }
    }

    /// Fixed successor. The Auditor points back at the Scout as feedback,
    /// but the bus treats it as terminal.
    pub fn successor(&self) -> StageKind {
        match self {
            Self::Scout => Self::Analyst,
            Self::Analyst => Self::Strategist,
            Self::Strategist => Self::Composer,
            Self::Composer => Self::Auditor,
            Self::Auditor => Self::Scout,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Auditor)
    }

    /// Kind of message this stage produces
    pub fn message_kind(&self) -> MessageKind {
        match self {
            Self::Scout => MessageKind::Intel,
            Self::Analyst => MessageKind::Insight,
            Self::Strategist => MessageKind::Action,
            Self::Composer => MessageKind::Content,
            Self::Auditor => MessageKind::Audit,
        }
    }

    /// Build the user prompt for an input payload
    pub fn build_prompt(&self, payload: &Value) -> String {
        match self {
            Self::Scout => scout::build_prompt(payload),
            Self::Analyst => analyst::build_prompt(payload),
            Self::Strategist => strategist::build_prompt(payload),
            Self::Composer => composer::build_prompt(payload),
            Self::Auditor => auditor::build_prompt(payload),
        }
    }

    /// Parse raw generator text into this stage's output shape
    pub fn parse_response(&self, text: &str) -> Result<Value, ParseError> {
        match self {
            Self::Scout => scout::parse_response(text),
            Self::Analyst => analyst::parse_response(text),
            Self::Strategist => strategist::parse_response(text),
            Self::Composer => composer::parse_response(text),
            Self::Auditor => auditor::parse_response(text),
        }
    }

    /// Built-in configuration for this stage
    pub fn default_config(&self) -> StageConfig {
        let (provider, model, temperature, max_tokens, system_prompt) = match self {
            Self::Scout => (ModelProvider::OpenAI, "gpt-4o-mini", 0.3, 1000, prompts::SCOUT),
            Self::Analyst => (ModelProvider::Gemini, "gemini-1.5-pro", 0.5, 2000, prompts::ANALYST),
            Self::Strategist => (ModelProvider::OpenAI, "gpt-4o", 0.4, 1500, prompts::STRATEGIST),
            Self::Composer => (ModelProvider::OpenAI, "gpt-4o", 0.7, 2000, prompts::COMPOSER),
            Self::Auditor => (ModelProvider::OpenAI, "gpt-4o-mini", 0.2, 500, prompts::AUDITOR),
        };

        StageConfig {
            kind: *self,
            display_name: format!("{} Agent", self.display_name()),
            model: ModelConfig::with_provider(provider, model),
            system_prompt: system_prompt.to_string(),
            temperature,
            max_tokens,
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::all()
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown stage: {}", s))
    }
}

/// Static configuration of one stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    pub kind: StageKind,
    pub display_name: String,
    pub model: ModelConfig,
    pub system_prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// A configured stage bound to its generator
pub struct Stage {
    config: StageConfig,
    generator: Arc<dyn Generator>,
    ids: Arc<dyn IdSource>,
}

impl Stage {
    pub fn new(config: StageConfig, generator: Arc<dyn Generator>, ids: Arc<dyn IdSource>) -> Self {
        Self {
            config,
            generator,
            ids,
        }
    }

    pub fn kind(&self) -> StageKind {
        self.config.kind
    }

    pub fn config(&self) -> &StageConfig {
        &self.config
    }

    /// Run this stage on one message.
    ///
    /// Returns `Ok(None)` when the generator is not configured or its reply
    /// holds no usable object; both stall the chain without failing it.
    /// Any other generator error is returned to the caller.
    pub async fn process(&self, message: &Message) -> Result<Option<Message>, GenerateError> {
        let kind = self.kind();
        let user_prompt = kind.build_prompt(&message.payload);

        let request = GenerateRequest {
            system_prompt: &self.config.system_prompt,
            user_prompt: &user_prompt,
            model: &self.config.model.model,
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
            base_url: self.config.model.base_url.as_deref(),
        };

        let text = match self.generator.generate(&request).await {
            Ok(text) => text,
            Err(e) if e.is_not_configured() => {
                tracing::warn!(
                    stage = %kind,
                    agent = %self.config.display_name,
                    trace_id = %message.trace_id,
                    error = %e,
                    "Stage skipped, generator not configured"
                );
                return Ok(None);
            }
            Err(e) => return Err(e),
        };

        let payload = match kind.parse_response(&text) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(
                    stage = %kind,
                    agent = %self.config.display_name,
                    trace_id = %message.trace_id,
                    error = %e,
                    response_len = text.len(),
                    "Stage produced no usable output"
                );
                return Ok(None);
            }
        };

        Ok(Some(message.reply(self.ids.next_id(), kind, payload)))
    }
}
