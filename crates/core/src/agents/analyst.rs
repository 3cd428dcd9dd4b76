//! # Analyst
//!
//! Reads Scout intel for patterns, market trends and opportunity matches.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;

use super::lenient;
use super::parse::{parse_as, ParseError};
use super::scout::ScoutOutput;
use super::{join_or, output_instructions, read_context, render_schema};

/// Background the Analyst may be given alongside the intel
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct HistoricalContext {
    pub recent_wins: Vec<String>,
    pub active_competitors: Vec<String>,
    pub target_regions: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct Insight {
    /// trend, opportunity, threat or recommendation
    #[serde(rename = "type", deserialize_with = "lenient::or_default")]
    pub kind: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub title: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub description: String,
    /// 0-100
    #[serde(deserialize_with = "lenient::number")]
    pub confidence: f64,
    /// Indices into the intel list
    #[serde(deserialize_with = "lenient::or_default")]
    pub related_items: Vec<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct OpportunityMatch {
    #[serde(deserialize_with = "lenient::integer")]
    pub intel_index: i64,
    /// 0-100
    #[serde(deserialize_with = "lenient::number")]
    pub match_score: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub match_reasons: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct AnalystOutput {
    #[serde(deserialize_with = "lenient::or_default")]
    pub insights: Vec<Insight>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub market_trends: Vec<String>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub competitor_moves: Vec<String>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub opportunity_matches: Vec<OpportunityMatch>,
    /// Short executive summary of the period's intel
    #[serde(deserialize_with = "lenient::or_default")]
    pub weekly_digest: String,
    /// 0-100 confidence in the analysis as a whole
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::opt_number")]
    pub confidence: Option<f64>,
    #[serde(flatten)]
    #[schemars(skip)]
    pub extra: Map<String, Value>,
}

fn schema() -> &'static str {
    static SCHEMA: OnceLock<String> = OnceLock::new();
    SCHEMA.get_or_init(render_schema::<AnalystOutput>)
}

/// Intel items from either `{"intelItems": [...]}` or one bare Scout output
fn intel_items(payload: &Value) -> Vec<ScoutOutput> {
    match payload.get("intelItems") {
        Some(items) => serde_json::from_value(items.clone()).unwrap_or_default(),
        None => serde_json::from_value(payload.clone())
            .map(|item| vec![item])
            .unwrap_or_default(),
    }
}

pub fn build_prompt(payload: &Value) -> String {
    let items = intel_items(payload);
    let history: HistoricalContext = read_context(payload, "historicalContext").unwrap_or_default();

    let items_summary = if items.is_empty() {
        "None".to_string()
    } else {
        items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let relevance = item
                    .relevance_score
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "n/a".to_string());
                let mut line = format!(
                    "[{}] {} ({}, relevance: {})",
                    i, item.title, item.category, relevance
                );
                if let Some(summary) = item.summary.as_deref().filter(|s| !s.is_empty()) {
                    line.push_str(&format!("\n    {}", summary));
                }
                line
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    format!(
        "Analyze the following intel items and provide insights:\n\n\
         INTEL ITEMS:\n{}\n\n\
         HISTORICAL CONTEXT:\n\
         - Recent wins: {}\n\
         - Active competitors: {}\n\
         - Target regions: {}\n\n{}",
        items_summary,
        join_or(&history.recent_wins, ", ", "None available"),
        join_or(&history.active_competitors, ", ", "Unknown"),
        join_or(&history.target_regions, ", ", "Not specified"),
        output_instructions(schema()),
    )
}

pub fn parse_response(text: &str) -> Result<Value, ParseError> {
    parse_as::<AnalystOutput>(text)
}
