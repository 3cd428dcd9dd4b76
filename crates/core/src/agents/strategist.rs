//! # Strategist
//!
//! Turns Analyst insights into prioritized actions, bid decisions and a
//! structured go / no-go fit score.
//!
//! A reply without a `fitScore` still parses: the score falls back to a
//! neutral 50 / "maybe" so downstream stages always see one.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;

use super::analyst::AnalystOutput;
use super::lenient;
use super::parse::{parse_as, ParseError};
use super::{join_or, output_instructions, read_context, read_input, render_schema};

const NEUTRAL_SCORE: f64 = 50.0;

/// Current sales pipeline figures
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PipelineState {
    pub total_value: Option<f64>,
    pub stale_deals: u32,
}

/// What the business does and where
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CompanyContext {
    pub regions: Vec<String>,
    pub building_types: Vec<String>,
    /// low, medium or high
    pub current_capacity: String,
}

impl Default for CompanyContext {
    fn default() -> Self {
        Self {
            regions: Vec::new(),
            building_types: Vec::new(),
            current_capacity: "medium".to_string(),
        }
    }
}

/// Per-criterion fit scores, each 0-100
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct FitBreakdown {
    /// Has the business done this kind of work before
    #[serde(deserialize_with = "lenient::number")]
    pub project_type_match: f64,
    /// Is the location within reach
    #[serde(deserialize_with = "lenient::number")]
    pub geo_fit: f64,
    /// Can it be staffed given current workload
    #[serde(deserialize_with = "lenient::number")]
    pub capacity_fit: f64,
    #[serde(deserialize_with = "lenient::number")]
    pub margin_potential: f64,
    /// Inverse of perceived risk
    #[serde(deserialize_with = "lenient::number")]
    pub comfort_level: f64,
}

impl Default for FitBreakdown {
    fn default() -> Self {
        Self {
            project_type_match: NEUTRAL_SCORE,
            geo_fit: NEUTRAL_SCORE,
            capacity_fit: NEUTRAL_SCORE,
            margin_potential: NEUTRAL_SCORE,
            comfort_level: NEUTRAL_SCORE,
        }
    }
}

/// Structured go / no-go evaluation
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct FitScore {
    /// 0-100
    #[serde(deserialize_with = "lenient::number")]
    pub overall: f64,
    /// go, no-go or maybe
    #[serde(deserialize_with = "lenient::or_default")]
    pub decision: String,
    /// 0-100 confidence in the decision
    #[serde(deserialize_with = "lenient::number")]
    pub confidence: f64,
    #[serde(deserialize_with = "lenient::or_default")]
    pub breakdown: FitBreakdown,
    /// Reasons not to pursue
    #[serde(deserialize_with = "lenient::or_default")]
    pub red_flags: Vec<String>,
    /// Reasons to pursue
    #[serde(deserialize_with = "lenient::or_default")]
    pub green_flags: Vec<String>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub rationale: String,
}

impl Default for FitScore {
    fn default() -> Self {
        Self {
            overall: NEUTRAL_SCORE,
            decision: "maybe".to_string(),
            confidence: NEUTRAL_SCORE,
            breakdown: FitBreakdown::default(),
            red_flags: Vec::new(),
            green_flags: Vec::new(),
            rationale: "Insufficient data for scoring".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct PriorityAction {
    /// 1 is most urgent, 3 least
    #[serde(deserialize_with = "lenient::priority")]
    pub priority: u8,
    #[serde(deserialize_with = "lenient::or_default")]
    pub action: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub reasoning: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Index into the Analyst insights
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::opt_integer")]
    pub related_insight: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct BidDecision {
    #[serde(deserialize_with = "lenient::or_default")]
    pub opportunity_title: String,
    /// bid, no-bid or monitor
    #[serde(deserialize_with = "lenient::or_default")]
    pub decision: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fit_score: Option<FitScore>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing_hint: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct StrategistOutput {
    /// One or two sentence recommendation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub fit_score: FitScore,
    #[serde(deserialize_with = "lenient::or_default")]
    pub priority_actions: Vec<PriorityAction>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub bid_decisions: Vec<BidDecision>,
    /// One sentence on where leadership should focus this week
    #[serde(deserialize_with = "lenient::or_default")]
    pub weekly_focus: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub resource_recommendations: Vec<String>,
    #[serde(flatten)]
    #[schemars(skip)]
    pub extra: Map<String, Value>,
}

fn schema() -> &'static str {
    static SCHEMA: OnceLock<String> = OnceLock::new();
    SCHEMA.get_or_init(render_schema::<StrategistOutput>)
}

pub fn build_prompt(payload: &Value) -> String {
    let analysis: AnalystOutput = read_input(payload, "analysis");
    let pipeline: PipelineState = read_context(payload, "pipelineState").unwrap_or_default();
    let company: CompanyContext = read_context(payload, "companyContext").unwrap_or_default();

    let insights = analysis
        .insights
        .iter()
        .enumerate()
        .map(|(i, insight)| {
            format!(
                "[{}] {}: {} (confidence: {}%)",
                i, insight.kind, insight.title, insight.confidence
            )
        })
        .collect::<Vec<_>>();

    let matches = analysis
        .opportunity_matches
        .iter()
        .map(|m| format!("Score {}: {}", m.match_score, m.match_reasons.join(", ")))
        .collect::<Vec<_>>();

    format!(
        "Based on the following analysis, provide strategic recommendations with a structured fit score.\n\n\
         INSIGHTS:\n{}\n\n\
         MARKET TRENDS:\n{}\n\n\
         OPPORTUNITY MATCHES:\n{}\n\n\
         DIGEST:\n{}\n\n\
         PIPELINE STATE:\n\
         - Total value: {}\n\
         - Stale deals: {}\n\n\
         COMPANY CONTEXT:\n\
         - Target regions: {}\n\
         - Building types: {}\n\
         - Current capacity: {}\n\n\
         FIT CRITERIA:\n\
         - Project type match: is there prior experience with this kind of work?\n\
         - Geo fit: is it inside the coverage area?\n\
         - Capacity fit: can it be staffed given current workload?\n\
         - Margin potential: can it be delivered at a healthy margin?\n\
         - Comfort level: any red flags such as tight timelines or an unknown client?\n\n{}",
        join_or(&insights, "\n", "None"),
        join_or(&analysis.market_trends, ", ", "None"),
        join_or(&matches, "\n", "None"),
        if analysis.weekly_digest.is_empty() { "None" } else { analysis.weekly_digest.as_str() },
        pipeline
            .total_value
            .map(|v| format!("${:.0}", v))
            .unwrap_or_else(|| "Unknown".to_string()),
        pipeline.stale_deals,
        join_or(&company.regions, ", ", "Not specified"),
        join_or(&company.building_types, ", ", "Not specified"),
        company.current_capacity,
        output_instructions(schema()),
    )
}

pub fn parse_response(text: &str) -> Result<Value, ParseError> {
    parse_as::<StrategistOutput>(text)
}
