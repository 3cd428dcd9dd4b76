//! # Composer
//!
//! Drafts outbound content (emails, proposals, posts) for the Strategist's
//! most urgent actions.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::OnceLock;

use super::lenient;
use super::parse::{parse_as, ParseError};
use super::strategist::StrategistOutput;
use super::{join_or, output_instructions, read_context, read_input, render_schema};

/// Only actions at or above this priority get drafts
const MAX_DRAFTED_PRIORITY: u8 = 2;

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct BrandContext {
    pub persona: String,
    pub voice_tone: String,
    pub red_lines: Vec<String>,
}

impl Default for BrandContext {
    fn default() -> Self {
        Self {
            persona: "Professional domain expert".to_string(),
            voice_tone: "Confident, helpful, expert".to_string(),
            red_lines: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TargetContact {
    pub name: String,
    pub title: String,
    pub company: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct DraftMetadata {
    #[serde(deserialize_with = "lenient::integer")]
    pub word_count: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_persona: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct Draft {
    /// email, proposal, linkedin, case-study or rfp-response
    #[serde(rename = "type", deserialize_with = "lenient::or_default")]
    pub kind: String,
    /// Subject line or title
    #[serde(deserialize_with = "lenient::or_default")]
    pub title: String,
    #[serde(deserialize_with = "lenient::or_default")]
    pub content: String,
    /// Index into the Strategist's priority actions
    #[serde(skip_serializing_if = "Option::is_none", deserialize_with = "lenient::opt_integer")]
    pub for_action: Option<i64>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub metadata: DraftMetadata,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct ProposalSections {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub executive_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope_of_work: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub methodology: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deliverables: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeline: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub why_us: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[serde(default, rename_all = "camelCase")]
pub struct ComposerOutput {
    #[serde(deserialize_with = "lenient::or_default")]
    pub drafts: Vec<Draft>,
    /// The single draft the business should send first
    #[serde(skip_serializing_if = "Option::is_none")]
    pub draft: Option<String>,
    #[serde(deserialize_with = "lenient::or_default")]
    pub content_suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proposal_sections: Option<ProposalSections>,
    #[serde(flatten)]
    #[schemars(skip)]
    pub extra: Map<String, Value>,
}

impl ComposerOutput {
    /// Primary draft text.
    ///
    /// `draft`, then a loose top-level `email` or `content` string, then the
    /// first non-empty entry of `drafts`.
    pub fn primary_draft(&self) -> Option<&str> {
        let loose = |key: &str| self.extra.get(key).and_then(Value::as_str);

        self.draft
            .as_deref()
            .into_iter()
            .chain(loose("email"))
            .chain(loose("content"))
            .chain(self.drafts.iter().map(|d| d.content.as_str()))
            .find(|d| !d.is_empty())
    }
}

fn schema() -> &'static str {
    static SCHEMA: OnceLock<String> = OnceLock::new();
    SCHEMA.get_or_init(render_schema::<ComposerOutput>)
}

pub fn build_prompt(payload: &Value) -> String {
    let strategy: StrategistOutput = read_input(payload, "strategy");
    let brand: BrandContext = read_context(payload, "brandContext").unwrap_or_default();
    let contact: Option<TargetContact> = read_context(payload, "targetContact");

    let actions = strategy
        .priority_actions
        .iter()
        .filter(|a| a.priority <= MAX_DRAFTED_PRIORITY)
        .enumerate()
        .map(|(i, a)| format!("[{}] Priority {}: {}", i, a.priority, a.action))
        .collect::<Vec<_>>();

    let fit = &strategy.fit_score;
    let mut prompt = format!(
        "Create content drafts for the following priority actions:\n\n\
         PRIORITY ACTIONS:\n{}\n\n\
         WEEKLY FOCUS: {}\n\n\
         FIT SCORE: {}/100 ({})\n\
         - Project type match: {}%\n\
         - Geo fit: {}%\n\
         - Margin potential: {}%\n\
         Green flags: {}\n\
         Red flags: {}\n\n\
         BRAND CONTEXT:\n\
         - Persona: {}\n\
         - Tone: {}\n\
         - Red lines: {}\n",
        join_or(&actions, "\n", "None"),
        if strategy.weekly_focus.is_empty() { "Not specified" } else { strategy.weekly_focus.as_str() },
        fit.overall,
        fit.decision.to_uppercase(),
        fit.breakdown.project_type_match,
        fit.breakdown.geo_fit,
        fit.breakdown.margin_potential,
        join_or(&fit.green_flags, ", ", "None"),
        join_or(&fit.red_flags, ", ", "None"),
        brand.persona,
        brand.voice_tone,
        join_or(&brand.red_lines, "; ", "None specified"),
    );

    if let Some(contact) = contact {
        prompt.push_str(&format!(
            "\nTARGET CONTACT:\n- Name: {}\n- Title: {}\n- Company: {}\n",
            contact.name, contact.title, contact.company
        ));
    }

    prompt.push_str(
        "\nPut the draft to send first in `draft` as plain text. \
         For responses to requests for proposal, fill `proposalSections`.\n\n",
    );
    prompt.push_str(&output_instructions(schema()));
    prompt
}

pub fn parse_response(text: &str) -> Result<Value, ParseError> {
    parse_as::<ComposerOutput>(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prompt_drafts_only_urgent_actions() {
        let prompt = build_prompt(&json!({
            "priorityActions": [
                {"priority": 1, "action": "Call the director"},
                {"priority": 3, "action": "Update the CRM"}
            ],
            "fitScore": {"overall": 80, "decision": "go"}
        }));
        assert!(prompt.contains("Priority 1: Call the director"));
        assert!(!prompt.contains("Update the CRM"));
        assert!(prompt.contains("FIT SCORE: 80/100 (GO)"));
        assert!(!prompt.contains("TARGET CONTACT"));
    }

    #[test]
    fn test_prompt_includes_contact() {
        let prompt = build_prompt(&json!({
            "strategy": {},
            "targetContact": {"name": "Dana", "title": "Facilities Director", "company": "County Health"}
        }));
        assert!(prompt.contains("- Name: Dana"));
    }

    #[test]
    fn test_primary_draft_falls_back_to_first_body() {
        let output: ComposerOutput = serde_json::from_value(json!({
            "drafts": [{"content": ""}, {"content": "Hello there"}]
        }))
        .unwrap();
        assert_eq!(output.primary_draft(), Some("Hello there"));

        let output: ComposerOutput =
            serde_json::from_value(json!({"draft": "Explicit", "drafts": [{"content": "x"}]})).unwrap();
        assert_eq!(output.primary_draft(), Some("Explicit"));

        let output: ComposerOutput = serde_json::from_value(json!({"email": "Loose email"})).unwrap();
        assert_eq!(output.primary_draft(), Some("Loose email"));
    }

    #[test]
    fn test_parse_response() {
        let value = parse_response(r#"{"drafts": [{"type": "email", "title": "Hi", "content": "Body"}]}"#)
            .unwrap();
        assert_eq!(value["drafts"][0]["metadata"]["wordCount"], 0);
        assert!(value.get("draft").is_none());
    }

    #[test]
    fn test_empty_draft_does_not_hide_loose_body() {
        let output: ComposerOutput =
            serde_json::from_value(json!({"draft": "", "email": "Hello"})).unwrap();
        assert_eq!(output.primary_draft(), Some("Hello"));

        let output: ComposerOutput = serde_json::from_value(json!({
            "draft": "", "email": "", "content": "Body text", "drafts": [{"content": "Later"}]
        }))
        .unwrap();
        assert_eq!(output.primary_draft(), Some("Body text"));

        let output: ComposerOutput = serde_json::from_value(json!({"draft": ""})).unwrap();
        assert_eq!(output.primary_draft(), None);
    }

    #[test]
    fn test_parse_tolerates_nulls_and_quoted_numbers() {
        let value = parse_response(
            r#"{"drafts": [{"type": null, "title": "Hi", "content": "Body", "forAction": "1", "metadata": {"wordCount": "85"}}], "contentSuggestions": null}"#,
        )
        .unwrap();
        assert_eq!(value["drafts"][0]["type"], "");
        assert_eq!(value["drafts"][0]["forAction"], 1);
        assert_eq!(value["drafts"][0]["metadata"]["wordCount"], 85);
        assert_eq!(value["contentSuggestions"], json!([]));
    }
}
