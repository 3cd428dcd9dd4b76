//! # Pipeline Worker
//!
//! Drives stored intel items through the message bus and persists what
//! comes back.
//!
//! ```text
//! find_unprocessed ─▶ claim run ─▶ bus.run_pipeline ─┬─ Ok(messages) ─▶ outputs + complete
//!                                                    └─ Aborted      ─▶ outputs so far + fail
//! ```
//!
//! A stalled chain still completes the run; only an unexpected stage
//! failure marks it failed. Failed runs are picked up again by the next
//! batch and resumed in place.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use super::bus::MessageBus;
use super::message::Message;
use crate::agents::auditor::AuditorOutput;
use crate::agents::composer::ComposerOutput;
use crate::agents::lenient;
use crate::agents::StageKind;
use crate::state::{
    AgentOutputRecord, IntelDb, NewAgentOutput, PipelineRun, ProcessedItem, ProcessingStats,
    RunManager, RunSummary, WorkItem, WorkItemManager,
};

/// Payload keys checked, in order, for a stage's confidence
const CONFIDENCE_KEYS: [&str; 3] = ["relevanceScore", "confidence", "score"];

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Pause between items of a batch
    pub item_delay: Duration,
    /// Confidence recorded when an output carries none
    pub default_confidence: f64,
    pub batch_limit: usize,
    pub processed_limit: usize,
    pub start_stage: StageKind,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            item_delay: Duration::from_millis(500),
            default_confidence: 75.0,
            batch_limit: 10,
            processed_limit: 50,
            start_stage: StageKind::Scout,
        }
    }
}

/// Result of processing one item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemOutcome {
    pub item_id: i64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub run_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ItemOutcome {
    fn succeeded(item_id: i64, run_id: i64) -> Self {
        Self {
            item_id,
            success: true,
            run_id: Some(run_id),
            error: None,
        }
    }

    fn failed(item_id: i64, run_id: Option<i64>, error: impl Into<String>) -> Self {
        Self {
            item_id,
            success: false,
            run_id,
            error: Some(error.into()),
        }
    }
}

/// Result of one batch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub results: Vec<ItemOutcome>,
}

/// An item's latest run with the outputs of its current attempt
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub run: PipelineRun,
    pub outputs: Vec<AgentOutputRecord>,
}

/// Filter for the processed-items listing
#[derive(Debug, Clone, Default)]
pub struct ProcessedQuery {
    /// Falls back to [`WorkerConfig::processed_limit`]
    pub limit: Option<usize>,
    pub only_unread: bool,
}

pub struct PipelineWorker {
    items: WorkItemManager,
    runs: RunManager,
    bus: Arc<MessageBus>,
    config: WorkerConfig,
}

impl PipelineWorker {
    pub fn new(db: &IntelDb, bus: Arc<MessageBus>, config: WorkerConfig) -> Self {
        Self {
            items: WorkItemManager::new(db),
            runs: RunManager::new(db),
            bus,
            config,
        }
    }

    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    /// Ids of items with no completed or running run, newest first
    pub fn find_unprocessed_items(&self, limit: usize) -> Result<Vec<i64>> {
        self.items.find_unprocessed(limit)
    }

    /// Run one item through the pipeline. Never panics or errors; problems
    /// come back in the outcome.
    pub async fn process_item(&self, item_id: i64) -> ItemOutcome {
        let item = match self.items.load(item_id) {
            Ok(Some(item)) => item,
            Ok(None) => {
                tracing::warn!(item_id, "Intel item not found");
                let error = format!("Intel item {} not found", item_id);
                return ItemOutcome::failed(item_id, None, error);
            }
            Err(e) => return ItemOutcome::failed(item_id, None, format!("{:#}", e)),
        };

        let run = match self.runs.claim(item_id, self.config.start_stage) {
            Ok(run) => run,
            Err(e) => {
                tracing::warn!(item_id, "Could not claim pipeline run: {:#}", e);
                return ItemOutcome::failed(item_id, None, format!("{:#}", e));
            }
        };

        let started = Utc::now();
        match self
            .bus
            .run_pipeline(seed_payload(&item), self.config.start_stage)
            .await
        {
            Ok(messages) => match self.finish(&run, started, &messages) {
                Ok(()) => {
                    tracing::info!(
                        run_id = run.id,
                        item_id,
                        stages = messages.len(),
                        "Pipeline run completed"
                    );
                    ItemOutcome::succeeded(item_id, run.id)
                }
                Err(e) => self.mark_failed(&run, format!("{:#}", e), None),
            },
            Err(aborted) => {
                let outputs = self.output_rows(started, &aborted.produced);
                if let Err(e) = self.runs.record_outputs(run.id, run.retry_count, &outputs) {
                    tracing::error!(run_id = run.id, "Failed to store partial outputs: {:#}", e);
                }
                self.mark_failed(
                    &run,
                    aborted.failure.to_string(),
                    Some(aborted.failure.stage),
                )
            }
        }
    }

    /// Process up to `limit` unprocessed items one after another.
    ///
    /// One item's failure never stops the batch.
    pub async fn process_unprocessed_items(&self, limit: Option<usize>) -> BatchResult {
        let limit = limit.unwrap_or(self.config.batch_limit);
        let ids = match self.items.find_unprocessed(limit) {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!("Failed to find unprocessed items: {:#}", e);
                return BatchResult::default();
            }
        };

        tracing::info!(count = ids.len(), "Processing intel batch");

        let mut batch = BatchResult::default();
        for (index, id) in ids.iter().enumerate() {
            if index > 0 && !self.config.item_delay.is_zero() {
                tokio::time::sleep(self.config.item_delay).await;
            }

            let outcome = self.process_item(*id).await;
            if outcome.success {
                batch.successful += 1;
            } else {
                batch.failed += 1;
            }
            batch.results.push(outcome);
        }
        batch.processed = batch.results.len();

        tracing::info!(
            processed = batch.processed,
            successful = batch.successful,
            failed = batch.failed,
            "Intel batch finished"
        );
        batch
    }

    /// Latest run for an item and its current outputs
    pub fn get_pipeline_result(&self, item_id: i64) -> Result<Option<PipelineResult>> {
        let Some(run) = self.runs.latest_for_item(item_id)? else {
            return Ok(None);
        };
        let outputs = self.runs.outputs_for_run(run.id)?;
        Ok(Some(PipelineResult { run, outputs }))
    }

    /// Completed runs with their items, most recently completed first
    pub fn get_processed_intel_items(&self, query: &ProcessedQuery) -> Result<Vec<ProcessedItem>> {
        let limit = query.limit.unwrap_or(self.config.processed_limit);
        self.runs.list_completed(limit, query.only_unread)
    }

    pub fn mark_pipeline_run_read(&self, run_id: i64) -> Result<()> {
        self.runs.mark_read(run_id)
    }

    pub fn get_processing_stats(&self) -> Result<ProcessingStats> {
        self.runs.stats()
    }

    fn finish(
        &self,
        run: &PipelineRun,
        started: DateTime<Utc>,
        messages: &[Message],
    ) -> Result<()> {
        let outputs = self.output_rows(started, messages);
        self.runs.record_outputs(run.id, run.retry_count, &outputs)?;
        self.runs.complete(run.id, &summarize(messages))
    }

    fn mark_failed(
        &self,
        run: &PipelineRun,
        error: String,
        stage: Option<StageKind>,
    ) -> ItemOutcome {
        tracing::error!(
            run_id = run.id,
            item_id = run.work_item_id,
            "Pipeline run failed: {}",
            error
        );
        if let Err(e) = self.runs.fail(run.id, &error, stage) {
            tracing::error!(run_id = run.id, "Failed to mark run failed: {:#}", e);
        }
        ItemOutcome::failed(run.work_item_id, Some(run.id), error)
    }

    /// One output row per message. Each duration is the gap since the
    /// previous message, or since `started` for the first.
    fn output_rows(&self, started: DateTime<Utc>, messages: &[Message]) -> Vec<NewAgentOutput> {
        let mut previous = started;
        messages
            .iter()
            .map(|message| {
                let elapsed = (message.timestamp - previous).num_milliseconds().max(0);
                previous = message.timestamp;
                NewAgentOutput {
                    stage: message.from,
                    output: message.payload.clone(),
                    duration_ms: elapsed as u64,
                    confidence: confidence_of(&message.payload)
                        .unwrap_or(self.config.default_confidence),
                    message_id: message.id.clone(),
                    trace_id: message.trace_id.clone(),
                }
            })
            .collect()
    }
}

/// Seed payload for the first stage
fn seed_payload(item: &WorkItem) -> Value {
    json!({
        "rawContent": item.to_text_blob(),
        "source": item.source_label(),
    })
}

fn confidence_of(payload: &Value) -> Option<f64> {
    CONFIDENCE_KEYS
        .iter()
        .find_map(|key| payload.get(*key).and_then(lenient::as_number))
}

fn non_empty_str(payload: &Value, key: &str) -> Option<String> {
    payload
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .map(str::to_string)
}

fn non_empty_array(payload: &Value, key: &str) -> Option<Value> {
    payload
        .get(key)
        .filter(|v| v.as_array().is_some_and(|a| !a.is_empty()))
        .cloned()
}

/// Pull the headline fields of a run out of its stage outputs
fn summarize(messages: &[Message]) -> RunSummary {
    let payload_of = |kind: StageKind| {
        messages
            .iter()
            .find(|m| m.from == kind)
            .map(|m| &m.payload)
    };

    let scout = payload_of(StageKind::Scout);
    let strategist = payload_of(StageKind::Strategist);

    let summary = scout
        .and_then(|p| non_empty_str(p, "summary"))
        .or_else(|| strategist.and_then(|p| non_empty_str(p, "summary")));

    let recommended_actions = strategist.and_then(|p| {
        non_empty_array(p, "priorityActions")
            .or_else(|| non_empty_array(p, "actions"))
            .or_else(|| non_empty_array(p, "recommendations"))
    });

    let draft_content = payload_of(StageKind::Composer)
        .and_then(|p| serde_json::from_value::<ComposerOutput>(p.clone()).ok())
        .and_then(|c| c.primary_draft().map(str::to_string));

    let audit = payload_of(StageKind::Auditor)
        .and_then(|p| serde_json::from_value::<AuditorOutput>(p.clone()).ok());

    RunSummary {
        summary,
        recommended_actions,
        draft_content,
        audit_score: audit.as_ref().and_then(AuditorOutput::audit_score),
        audit_verdict: audit
            .as_ref()
            .and_then(|a| a.audit_verdict().map(str::to_string)),
    }
}
