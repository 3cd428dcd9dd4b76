//! # Pipeline Messages
//!
//! The envelope that carries one stage's structured output to the next.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agents::StageKind;

/// Kind of payload a message carries
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// Structured intel (Scout output, or the seed message)
    Intel,
    /// Patterns and insights (Analyst)
    Insight,
    /// Recommended actions (Strategist)
    Action,
    /// Drafted content (Composer)
    Content,
    /// Quality review (Auditor)
    Audit,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Intel => "intel",
            Self::Insight => "insight",
            Self::Action => "action",
            Self::Content => "content",
            Self::Audit => "audit",
        }
    }
}

/// A message routed through the bus
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub from: StageKind,
    pub to: StageKind,
    pub kind: MessageKind,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
    /// Shared by every message of one pipeline run
    pub trace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_message_id: Option<String>,
}

impl Message {
    /// Synthetic first message of a run
    pub fn seed(
        id: String,
        trace_id: String,
        to: StageKind,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id,
            from: StageKind::Scout,
            to,
            kind: MessageKind::Intel,
            payload,
            timestamp: Utc::now(),
            trace_id,
            parent_message_id: None,
        }
    }

    /// Build the reply a stage produces for `self`.
    ///
    /// The reply keeps the trace id, points back at `self`, and is addressed
    /// to the producing stage's successor.
    pub fn reply(&self, id: String, from: StageKind, payload: serde_json::Value) -> Self {
        Self {
            id,
            from,
            to: from.successor(),
            kind: from.message_kind(),
            payload,
            timestamp: Utc::now(),
            trace_id: self.trace_id.clone(),
            parent_message_id: Some(self.id.clone()),
        }
    }
}
