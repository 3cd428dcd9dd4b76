//! Test doubles shared by the stage, bus and worker tests.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use crate::generator::{GenerateError, GenerateRequest, Generator};
use crate::models::ModelProvider;

/// One scripted generator answer
#[derive(Debug, Clone)]
pub enum Scripted {
    Reply(String),
    NotConfigured,
    /// Fails like an upstream outage (HTTP 503)
    Fail,
}

impl Scripted {
    pub fn reply(text: impl Into<String>) -> Self {
        Scripted::Reply(text.into())
    }
}

/// A recorded generator call
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system_prompt: String,
    pub user_prompt: String,
    pub model: String,
}

/// Generator that replays a fixed script, then a fallback answer
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Scripted>>,
    fallback: Scripted,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback: Scripted::NotConfigured,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_fallback(mut self, fallback: Scripted) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn provider(&self) -> ModelProvider {
        ModelProvider::OpenAI
    }

    async fn generate(&self, request: &GenerateRequest<'_>) -> Result<String, GenerateError> {
        self.calls.lock().unwrap().push(RecordedCall {
            system_prompt: request.system_prompt.to_string(),
            user_prompt: request.user_prompt.to_string(),
            model: request.model.to_string(),
        });

        let next = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| self.fallback.clone());

        match next {
            Scripted::Reply(text) => Ok(text),
            Scripted::NotConfigured => Err(GenerateError::NotConfigured {
                provider: self.provider(),
            }),
            Scripted::Fail => Err(GenerateError::Api {
                provider: self.provider(),
                status: 503,
                body: "upstream unavailable".to_string(),
            }),
        }
    }
}

pub const SCOUT_REPLY: &str = r#"{"title": "County hospital expansion", "summary": "A county hospital plans a new surgical wing.", "category": "opportunity", "relevanceScore": 82, "entities": {"companies": ["County Health"], "locations": ["Albany, NY"], "values": ["$40M"], "deadlines": ["2026-12-01"]}, "actionable": true}"#;

pub const ANALYST_REPLY: &str = r#"{"insights": [{"type": "opportunity", "title": "Healthcare capex rising", "description": "Several regional hospitals are expanding.", "confidence": 70, "relatedItems": [0]}], "marketTrends": ["healthcare expansion"], "weeklyDigest": "Healthcare dominated the week.", "confidence": 64}"#;

pub const STRATEGIST_REPLY: &str = r#"{"summary": "Pursue the hospital RFP.", "fitScore": {"overall": 78, "decision": "go"}, "priorityActions": [{"priority": 1, "action": "Contact facilities director", "reasoning": "Early access to scope"}], "weeklyFocus": "Hospital RFP"}"#;

pub const COMPOSER_REPLY: &str = r#"{"drafts": [{"type": "email", "title": "Surgical wing documentation", "content": "Dear Director, ...", "forAction": 0, "metadata": {"wordCount": 120}}], "draft": "Dear Director, ..."}"#;

pub const AUDITOR_REPLY: &str = r#"{"results": [{"draftIndex": 0, "status": "pass", "issues": [], "overallScore": 91}], "approvedDrafts": [0], "score": 91, "verdict": "pass"}"#;

/// Valid replies for the full chain, in stage order
pub fn full_chain() -> Vec<Scripted> {
    [
        SCOUT_REPLY,
        ANALYST_REPLY,
        STRATEGIST_REPLY,
        COMPOSER_REPLY,
        AUDITOR_REPLY,
    ]
    .into_iter()
    .map(Scripted::reply)
    .collect()
}
