//! # Pipeline Stages
//!
//! The five fixed stages of the intel pipeline and the runtime that drives
//! one generator call per stage.
//!
//! ```text
//! Scout → Analyst → Strategist → Composer → Auditor
//! ```
//!
//! Each concrete stage module owns its typed output shape, a prompt builder
//! and a response parser. [`StageKind`] dispatches to them, so the chain is
//! a closed enum rather than an open set of implementations.

pub mod analyst;
pub mod auditor;
pub mod composer;
pub mod lenient;
pub mod parse;
pub mod prompts;
pub mod scout;
pub mod stage;
pub mod strategist;

pub use parse::{extract_json_object, ParseError};
pub use stage::{Stage, StageConfig, StageKind};

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Pretty JSON schema for `T`, appended to user prompts
pub(crate) fn render_schema<T: JsonSchema>() -> String {
    serde_json::to_string_pretty(&schemars::schema_for!(T)).unwrap_or_default()
}

/// Closing block shared by every user prompt
pub(crate) fn output_instructions(schema: &str) -> String {
    format!(
        "Respond with a single JSON object matching this schema:\n{}\n\nReturn ONLY valid JSON.",
        schema
    )
}

/// Read a stage input leniently.
///
/// Payloads arrive either wrapped (`{"analysis": {...}, ...}`) or as the
/// previous stage's bare output. Anything unreadable becomes `T::default()`.
pub(crate) fn read_input<T>(payload: &Value, key: &str) -> T
where
    T: DeserializeOwned + Default,
{
    let inner = payload.get(key).unwrap_or(payload);
    serde_json::from_value(inner.clone()).unwrap_or_default()
}

/// Optional context object stored next to the stage input
pub(crate) fn read_context<T: DeserializeOwned>(payload: &Value, key: &str) -> Option<T> {
    payload
        .get(key)
        .and_then(|v| serde_json::from_value(v.clone()).ok())
}

/// Comma-joined list, or `fallback` when empty
pub(crate) fn join_or(items: &[String], sep: &str, fallback: &str) -> String {
    if items.is_empty() {
        fallback.to_string()
    } else {
        items.join(sep)
    }
}
