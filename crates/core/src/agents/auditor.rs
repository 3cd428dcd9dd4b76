//! # Auditor
//!
//! Terminal stage. Reviews Composer drafts for brand, accuracy and tone,
//! and may give an overall score and pass/fail verdict. Both are optional:
//! an audit without them is still a valid audit.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;

use super::composer::ComposerOutput;
use super::lenient;
use super::parse::{parse_as, ParseError};
use super::{join_or, output_instructions, read_context, read_input, render_schema};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BrandRules {
    pub red_lines: Vec<String>,
    pub voice_guidelines: Vec<String>,
    pub fact_checks: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct AuditIssue {
    /// brand, redline, fact, tone or other
    #[serde(rename = "type", deserialize_with = "lenient::or_default")]
    pub kind: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub description: String,
    /// low, medium or high
    #[serde(deserialize_with = "lenient::or_default")]
    pub severity: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct DraftReview {
    #[serde(deserialize_with = "lenient::integer")]
    pub draft_index: i64,
    /// pass, fail or needs-revision
    #[serde(deserialize_with = "lenient::or_default")]
    pub status: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub issues: Vec<AuditIssue>,
    /// 0-100
    #[serde(deserialize_with = "lenient::number")]
    pub overall_score: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct AuditorOutput {
    #[serde(deserialize_with = "lenient::or_default")]
    pub results: Vec<DraftReview>,
    /// What the Scout should look for next time
    #[serde(deserialize_with = "lenient::or_default")]
    pub feedback_for_scout: Vec<String>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub approved_drafts: Vec<i64>,
    /// 0-100 overall quality
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::opt_number")]
    pub score: Option<f64>,
    /// pass or fail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<String>,
    #[serde(flatten)]
    #[schemars(skip)]
    pub extra: Map<String, Value>,
}

impl AuditorOutput {
    /// `score`, else a loose `qualityScore`
    pub fn audit_score(&self) -> Option<f64> {
        self.score
            .or_else(|| self.extra.get("qualityScore").and_then(lenient::as_number))
    }

    /// `verdict`, else a loose `result`
    pub fn audit_verdict(&self) -> Option<&str> {
        self.verdict
            .as_deref()
            .or_else(|| self.extra.get("result").and_then(Value::as_str))
    }
}

fn schema() -> &'static str {
    static SCHEMA: OnceLock<String> = OnceLock::new();
    SCHEMA.get_or_init(render_schema::<AuditorOutput>)
}

pub fn build_prompt(payload: &Value) -> String {
    let composed: ComposerOutput = read_input(payload, "composerOutput");
    let rules: BrandRules = read_context(payload, "brandRules").unwrap_or_default();

    let listing = composed
        .drafts
        .iter()
        .enumerate()
        .map(|(i, d)| {
            format!(
                "[{}] {}: \"{}\" ({} words)",
                i, d.kind, d.title, d.metadata.word_count
            )
        })
        .collect::<Vec<_>>();

    let mut bodies = composed
        .drafts
        .iter()
        .enumerate()
        .map(|(i, d)| format!("--- DRAFT {} ---\n{}", i, d.content))
        .collect::<Vec<_>>();
    if bodies.is_empty() {
        if let Some(primary) = composed.primary_draft() {
            bodies.push(format!("--- DRAFT 0 ---\n{}", primary));
        }
    }

    format!(
        "Review the following content drafts for quality and compliance:\n\n\
         DRAFTS TO REVIEW:\n{}\n\n\
         DRAFT CONTENTS:\n{}\n\n\
         BRAND RULES:\n\
         - Red lines (never do): {}\n\
         - Voice guidelines: {}\n\
         - Fact checks: {}\n\n\
         Give each draft a status and score, then an overall `score` (0-100) \
         and `verdict` (pass or fail).\n\n{}",
        join_or(&listing, "\n", "None"),
        join_or(&bodies, "\n\n", "None"),
        join_or(
            &rules.red_lines,
            "; ",
            "Do not overpromise, be accurate on timelines"
        ),
        join_or(
            &rules.voice_guidelines,
            "; ",
            "Professional, confident, helpful"
        ),
        join_or(&rules.fact_checks, "; ", "Verify claims about capabilities"),
        output_instructions(schema()),
    )
}

pub fn parse_response(text: &str) -> Result<Value, ParseError> {
    parse_as::<AuditorOutput>(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_score_and_verdict_are_optional() {
        let value = parse_response(r#"{"results": [], "approvedDrafts": []}"#).unwrap();
        assert!(value.get("score").is_none());
        assert!(value.get("verdict").is_none());
    }

    #[test]
    fn test_loose_score_fields() {
        let output: AuditorOutput =
            serde_json::from_value(json!({"qualityScore": 72, "result": "fail"})).unwrap();
        assert_eq!(output.audit_score(), Some(72.0));
        assert_eq!(output.audit_verdict(), Some("fail"));

        let output: AuditorOutput =
            serde_json::from_value(json!({"score": 90, "qualityScore": 10})).unwrap();
        assert_eq!(output.audit_score(), Some(90.0));

        let output: AuditorOutput =
            serde_json::from_value(json!({"qualityScore": "64"})).unwrap();
        assert_eq!(output.audit_score(), Some(64.0));
    }

    #[test]
    fn test_parse_reads_quoted_score() {
        let value = parse_response(
            r#"{"results": [{"draftIndex": "0", "status": "pass", "issues": null, "overallScore": "88"}], "approvedDrafts": null, "score": "85", "verdict": "pass"}"#,
        )
        .unwrap();
        assert_eq!(value["score"], 85.0);
        assert_eq!(value["results"][0]["draftIndex"], 0);
        assert_eq!(value["results"][0]["overallScore"], 88.0);
        assert_eq!(value["approvedDrafts"], json!([]));

        let output: AuditorOutput = serde_json::from_value(value).unwrap();
        assert_eq!(output.audit_score(), Some(85.0));
    }

    #[test]
    fn test_prompt_lists_drafts() {
        let prompt = build_prompt(&json!({
            "drafts": [{"type": "email", "title": "Intro", "content": "Hello", "metadata": {"wordCount": 1}}]
        }));
        assert!(prompt.contains("[0] email: \"Intro\" (1 words)"));
        assert!(prompt.contains("--- DRAFT 0 ---\nHello"));
        assert!(prompt.contains("Do not overpromise"));
    }

    #[test]
    fn test_prompt_uses_primary_draft_without_list() {
        let prompt = build_prompt(&json!({"draft": "Standalone text"}));
        assert!(prompt.contains("--- DRAFT 0 ---\nStandalone text"));
    }
}
