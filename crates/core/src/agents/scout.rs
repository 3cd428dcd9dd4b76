//! # Scout
//!
//! First stage. Turns a raw intel blob into structured data: title,
//! summary, category, a relevance score and the entities mentioned.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;

use super::lenient;
use super::parse::{parse_as, ParseError};
use super::{output_instructions, read_input, render_schema};

/// What the Scout receives
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoutInput {
    pub raw_content: String,
    pub source: String,
    pub source_url: Option<String>,
    pub category: Option<String>,
}

/// Entities mentioned in an intel item
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct Entities {
    #[serde(deserialize_with = "lenient::or_default")]
    pub companies: Vec<String>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub locations: Vec<String>,
    /// Monetary amounts, square footage and similar figures
    #[serde(deserialize_with = "lenient::or_default")]
    pub values: Vec<String>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub deadlines: Vec<String>,
}

/// Structured intel
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct ScoutOutput {
    #[serde(deserialize_with = "lenient::or_default")]
    pub title: String,
    /// Two or three sentence summary
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// opportunity, competitor, policy, technology, partnership, market,
    /// regulation, event or talent
    #[serde(deserialize_with = "lenient::or_default")]
    pub category: String,
    /// 0-100 relevance to the business
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::opt_number")]
    pub relevance_score: Option<f64>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub entities: Entities,
    /// Whether there is something to act on
    #[serde(deserialize_with = "lenient::or_default")]
    pub actionable: bool,
    #[serde(deserialize_with = "lenient::or_default")]
    pub is_duplicate: bool,
    #[serde(deserialize_with = "lenient::or_default")]
    pub metadata: Map<String, Value>,
    #[serde(flatten)]
    #[schemars(skip)]
    pub extra: Map<String, Value>,
}

fn schema() -> &'static str {
    static SCHEMA: OnceLock<String> = OnceLock::new();
    SCHEMA.get_or_init(render_schema::<ScoutOutput>)
}

pub fn build_prompt(payload: &Value) -> String {
    let input: ScoutInput = read_input(payload, "intel");

    format!(
        "Analyze the following raw intel and extract structured data:\n\n\
         SOURCE: {}\n\
         URL: {}\n\
         SUGGESTED CATEGORY: {}\n\n\
         CONTENT:\n{}\n\n{}",
        if input.source.is_empty() { "unknown" } else { input.source.as_str() },
        input.source_url.as_deref().unwrap_or("N/A"),
        input.category.as_deref().unwrap_or("unknown"),
        input.raw_content,
        output_instructions(schema()),
    )
}

pub fn parse_response(text: &str) -> Result<Value, ParseError> {
    parse_as::<ScoutOutput>(text)
}
