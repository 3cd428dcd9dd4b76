//! # Pipeline Runs
//!
//! Persisted run records and their append-only stage outputs.
//!
//! ## Run lifecycle
//!
//! ```text
//! claim ─▶ running ─┬─▶ completed            (never picked up again)
//!                   └─▶ failed ─▶ claim ─▶ running (same row, retry_count + 1)
//! ```
//!
//! Claims run inside an IMMEDIATE transaction and the schema allows only
//! one `pending`/`running` row per item, so two workers cannot both
//! activate the same item.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, TransactionBehavior};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use super::db::IntelDb;
use super::work_items::{WorkItem, WorkItemManager, ITEM_COLUMNS};
use super::{from_db_time, now_db_time};
use crate::agents::StageKind;

const RUN_COLUMNS: &str = "r.id, r.work_item_id, r.status, r.current_stage, r.started_at, \
     r.completed_at, r.error, r.retry_count, r.summary, r.recommended_actions, r.draft_content, \
     r.audit_score, r.audit_verdict, r.is_read, r.created_at, r.updated_at";
const RUN_COLUMN_COUNT: usize = 16;

/// Status of a pipeline run
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    fn from_str(s: &str) -> Self {
        match s {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "completed" => Self::Completed,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }
}

/// One attempt to push an item through the pipeline
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    pub id: i64,
    pub work_item_id: i64,
    pub status: RunStatus,
    pub current_stage: Option<StageKind>,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub retry_count: u32,
    pub summary: Option<String>,
    pub recommended_actions: Option<serde_json::Value>,
    pub draft_content: Option<String>,
    pub audit_score: Option<f64>,
    pub audit_verdict: Option<String>,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A persisted stage output
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AgentOutputRecord {
    pub id: i64,
    pub run_id: i64,
    /// The run's `retry_count` when this output was written
    pub attempt: u32,
    pub stage: StageKind,
    pub output: serde_json::Value,
    pub status: RunStatus,
    pub duration_ms: u64,
    pub confidence: f64,
    pub message_id: String,
    pub trace_id: String,
    pub created_at: DateTime<Utc>,
}

/// Fields for a new stage output row
#[derive(Debug, Clone)]
pub struct NewAgentOutput {
    pub stage: StageKind,
    pub output: serde_json::Value,
    pub duration_ms: u64,
    pub confidence: f64,
    pub message_id: String,
    pub trace_id: String,
}

/// Fields extracted from stage outputs when a run completes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSummary {
    pub summary: Option<String>,
    pub recommended_actions: Option<serde_json::Value>,
    pub draft_content: Option<String>,
    pub audit_score: Option<f64>,
    pub audit_verdict: Option<String>,
}

/// A completed run with its source item
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedItem {
    pub item: WorkItem,
    pub run: PipelineRun,
}

/// Counts over all runs
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProcessingStats {
    pub total: i64,
    pub pending: i64,
    pub running: i64,
    pub completed: i64,
    pub failed: i64,
    /// Completed runs not yet marked read
    pub unread: i64,
    pub avg_audit_score: Option<f64>,
}

pub struct RunManager {
    conn: Arc<Mutex<Connection>>,
}

impl RunManager {
    pub fn new(db: &IntelDb) -> Self {
        Self {
            conn: db.connection(),
        }
    }

    /// Move an item's run to `running`.
    ///
    /// Reuses the newest `pending` or `failed` run (clearing its error,
    /// bumping `retry_count`, restarting the clock). Otherwise creates a
    /// new run with `retry_count = 0`. Fails if the item already has an
    /// active run.
    pub fn claim(&self, work_item_id: i64, start: StageKind) -> Result<PipelineRun> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let now = now_db_time();

        let resumable: Option<i64> = tx
            .query_row(
                r#"
                SELECT id FROM pipeline_runs
                WHERE work_item_id = ?1 AND status IN ('pending', 'failed')
                ORDER BY created_at DESC, id DESC
                LIMIT 1
                "#,
                params![work_item_id],
                |row| row.get(0),
            )
            .optional()?;

        let result = match resumable {
            Some(run_id) => tx
                .execute(
                    r#"
                    UPDATE pipeline_runs
                    SET status = 'running', error = NULL, retry_count = retry_count + 1,
                        current_stage = ?1, started_at = ?2, completed_at = NULL, updated_at = ?2
                    WHERE id = ?3
                    "#,
                    params![start.as_str(), now, run_id],
                )
                .map(|_| run_id),
            None => tx
                .execute(
                    r#"
                    INSERT INTO pipeline_runs
                    (work_item_id, status, current_stage, started_at, retry_count, created_at, updated_at)
                    VALUES (?1, 'running', ?2, ?3, 0, ?3, ?3)
                    "#,
                    params![work_item_id, start.as_str(), now],
                )
                .map(|_| tx.last_insert_rowid()),
        };

        let run_id = match result {
            Ok(id) => id,
            Err(e) if e.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) => {
                anyhow::bail!("Intel item {} already has an active pipeline run", work_item_id)
            }
            Err(e) => return Err(e).context("Failed to claim pipeline run"),
        };

        let sql = format!("SELECT {} FROM pipeline_runs r WHERE r.id = ?1", RUN_COLUMNS);
        let run = tx.query_row(&sql, params![run_id], |row| Self::row_to_run(row, 0))?;
        tx.commit()?;

        match resumable {
            Some(_) => tracing::info!(
                run_id,
                item_id = work_item_id,
                retry_count = run.retry_count,
                "Resumed pipeline run"
            ),
            None => tracing::info!(run_id, item_id = work_item_id, "Created pipeline run"),
        }

        Ok(run)
    }

    /// Append stage outputs to one attempt of a run
    pub fn record_outputs(
        &self,
        run_id: i64,
        attempt: u32,
        outputs: &[NewAgentOutput],
    ) -> Result<()> {
        if outputs.is_empty() {
            return Ok(());
        }

        let mut conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let tx = conn.transaction()?;
        let now = now_db_time();
        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO agent_outputs
                (run_id, attempt, stage, output, status, duration_ms, confidence,
                 message_id, trace_id, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                "#,
            )?;
            for output in outputs {
                stmt.execute(params![
                    run_id,
                    attempt,
                    output.stage.as_str(),
                    serde_json::to_string(&output.output)?,
                    RunStatus::Completed.as_str(),
                    output.duration_ms as i64,
                    output.confidence,
                    output.message_id,
                    output.trace_id,
                    now,
                ])
                .context("Failed to insert agent output")?;
            }
        }
        tx.commit()?;

        Ok(())
    }

    /// Mark a run completed with its extracted summary
    pub fn complete(&self, run_id: i64, summary: &RunSummary) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let actions = summary
            .recommended_actions
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let now = now_db_time();

        let affected = conn.execute(
            r#"
            UPDATE pipeline_runs
            SET status = 'completed', completed_at = ?1, updated_at = ?1, current_stage = NULL,
                summary = ?2, recommended_actions = ?3, draft_content = ?4,
                audit_score = ?5, audit_verdict = ?6
            WHERE id = ?7
            "#,
            params![
                now,
                summary.summary,
                actions,
                summary.draft_content,
                summary.audit_score,
                summary.audit_verdict,
                run_id,
            ],
        )?;

        if affected == 0 {
            anyhow::bail!("Pipeline run not found: {}", run_id);
        }
        Ok(())
    }

    /// Mark a run failed. `retry_count` is left for the next claim.
    pub fn fail(&self, run_id: i64, error: &str, stage: Option<StageKind>) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let affected = conn.execute(
            r#"
            UPDATE pipeline_runs
            SET status = 'failed', error = ?1, current_stage = ?2, updated_at = ?3
            WHERE id = ?4
            "#,
            params![error, stage.map(|s| s.as_str()), now_db_time(), run_id],
        )?;

        if affected == 0 {
            anyhow::bail!("Pipeline run not found: {}", run_id);
        }
        Ok(())
    }

    pub fn load(&self, run_id: i64) -> Result<Option<PipelineRun>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let sql = format!("SELECT {} FROM pipeline_runs r WHERE r.id = ?1", RUN_COLUMNS);
        conn.query_row(&sql, params![run_id], |row| Self::row_to_run(row, 0))
            .optional()
            .context("Failed to load pipeline run")
    }

    /// Most recently created run for an item
    pub fn latest_for_item(&self, work_item_id: i64) -> Result<Option<PipelineRun>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let sql = format!(
            "SELECT {} FROM pipeline_runs r WHERE r.work_item_id = ?1 \
             ORDER BY r.created_at DESC, r.id DESC LIMIT 1",
            RUN_COLUMNS
        );
        conn.query_row(&sql, params![work_item_id], |row| Self::row_to_run(row, 0))
            .optional()
            .context("Failed to load latest pipeline run")
    }

    /// All runs for an item, oldest first
    pub fn runs_for_item(&self, work_item_id: i64) -> Result<Vec<PipelineRun>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let sql = format!(
            "SELECT {} FROM pipeline_runs r WHERE r.work_item_id = ?1 ORDER BY r.created_at, r.id",
            RUN_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let runs = stmt
            .query_map(params![work_item_id], |row| Self::row_to_run(row, 0))?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list pipeline runs")?;
        Ok(runs)
    }

    /// Stage outputs of the run's current attempt, in the order written
    pub fn outputs_for_run(&self, run_id: i64) -> Result<Vec<AgentOutputRecord>> {
        self.query_outputs(
            "WHERE o.run_id = ?1 AND o.attempt = \
             (SELECT retry_count FROM pipeline_runs WHERE id = ?1)",
            run_id,
        )
    }

    /// Stage outputs of every attempt of a run
    pub fn output_history(&self, run_id: i64) -> Result<Vec<AgentOutputRecord>> {
        self.query_outputs("WHERE o.run_id = ?1", run_id)
    }

    fn query_outputs(&self, filter: &str, run_id: i64) -> Result<Vec<AgentOutputRecord>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let sql = format!(
            "SELECT o.id, o.run_id, o.attempt, o.stage, o.output, o.status, o.duration_ms, \
             o.confidence, o.message_id, o.trace_id, o.created_at \
             FROM agent_outputs o {} ORDER BY o.id",
            filter
        );
        let mut stmt = conn.prepare(&sql)?;
        let outputs = stmt
            .query_map(params![run_id], |row| Self::row_to_output(row))?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list agent outputs")?;
        Ok(outputs)
    }

    /// Completed runs with their items, most recently completed first
    pub fn list_completed(&self, limit: usize, only_unread: bool) -> Result<Vec<ProcessedItem>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let sql = format!(
            r#"
            SELECT {}, {}
            FROM pipeline_runs r
            JOIN intel_items i ON i.id = r.work_item_id
            WHERE r.status = 'completed' AND (?1 = 0 OR r.is_read = 0)
            ORDER BY r.completed_at DESC, r.id DESC
            LIMIT ?2
            "#,
            RUN_COLUMNS, ITEM_COLUMNS
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![only_unread, limit as i64], |row| {
                Ok(ProcessedItem {
                    run: Self::row_to_run(row, 0)?,
                    item: WorkItemManager::row_to_item(row, RUN_COLUMN_COUNT)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list processed items")?;
        Ok(rows)
    }

    /// Mark a completed run as read
    pub fn mark_read(&self, run_id: i64) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let affected = conn.execute(
            "UPDATE pipeline_runs SET is_read = 1, updated_at = ?1 WHERE id = ?2 AND status = 'completed'",
            params![now_db_time(), run_id],
        )?;

        if affected == 0 {
            anyhow::bail!("Completed pipeline run not found: {}", run_id);
        }
        Ok(())
    }

    pub fn stats(&self) -> Result<ProcessingStats> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.query_row(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(status = 'pending'), 0),
                COALESCE(SUM(status = 'running'), 0),
                COALESCE(SUM(status = 'completed'), 0),
                COALESCE(SUM(status = 'failed'), 0),
                COALESCE(SUM(status = 'completed' AND is_read = 0), 0),
                AVG(audit_score)
            FROM pipeline_runs
            "#,
            [],
            |row| {
                Ok(ProcessingStats {
                    total: row.get(0)?,
                    pending: row.get(1)?,
                    running: row.get(2)?,
                    completed: row.get(3)?,
                    failed: row.get(4)?,
                    unread: row.get(5)?,
                    avg_audit_score: row.get(6)?,
                })
            },
        )
        .context("Failed to compute processing stats")
    }

    /// Map [`RUN_COLUMNS`] starting at column `base`
    fn row_to_run(row: &rusqlite::Row, base: usize) -> rusqlite::Result<PipelineRun> {
        let stage: Option<String> = row.get(base + 3)?;
        let started_at: String = row.get(base + 4)?;
        let completed_at: Option<String> = row.get(base + 5)?;
        let actions: Option<String> = row.get(base + 9)?;
        let created_at: String = row.get(base + 14)?;
        let updated_at: String = row.get(base + 15)?;

        Ok(PipelineRun {
            id: row.get(base)?,
            work_item_id: row.get(base + 1)?,
            status: RunStatus::from_str(&row.get::<_, String>(base + 2)?),
            current_stage: stage.and_then(|s| s.parse().ok()),
            started_at: from_db_time(&started_at),
            completed_at: completed_at.as_deref().map(from_db_time),
            error: row.get(base + 6)?,
            retry_count: row.get(base + 7)?,
            summary: row.get(base + 8)?,
            recommended_actions: actions.and_then(|s| serde_json::from_str(&s).ok()),
            draft_content: row.get(base + 10)?,
            audit_score: row.get(base + 11)?,
            audit_verdict: row.get(base + 12)?,
            is_read: row.get(base + 13)?,
            created_at: from_db_time(&created_at),
            updated_at: from_db_time(&updated_at),
        })
    }

    fn row_to_output(row: &rusqlite::Row) -> rusqlite::Result<AgentOutputRecord> {
        let stage: String = row.get(3)?;
        let output: String = row.get(4)?;
        let duration_ms: i64 = row.get(6)?;
        let created_at: String = row.get(10)?;

        Ok(AgentOutputRecord {
            id: row.get(0)?,
            run_id: row.get(1)?,
            attempt: row.get(2)?,
            stage: stage.parse().map_err(|e: anyhow::Error| {
                rusqlite::Error::FromSqlConversionFailure(
                    3,
                    rusqlite::types::Type::Text,
                    e.into(),
                )
            })?,
            output: serde_json::from_str(&output).unwrap_or(serde_json::Value::Null),
            status: RunStatus::from_str(&row.get::<_, String>(5)?),
            duration_ms: duration_ms.max(0) as u64,
            confidence: row.get(7)?,
            message_id: row.get(8)?,
            trace_id: row.get(9)?,
            created_at: from_db_time(&created_at),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::work_items::NewWorkItem;
    use serde_json::json;

    fn setup() -> (IntelDb, i64) {
        let db = IntelDb::open_in_memory().unwrap();
        let item = WorkItemManager::new(&db)
            .insert(&NewWorkItem::titled("Transit hub survey"))
            .unwrap();
        (db, item.id)
    }

    fn output(stage: StageKind) -> NewAgentOutput {
        NewAgentOutput {
            stage,
            output: json!({"stage": stage.as_str()}),
            duration_ms: 12,
            confidence: 75.0,
            message_id: format!("m-{}", stage),
            trace_id: "t-1".to_string(),
        }
    }

    #[test]
    fn test_claim_creates_running_run() {
        let (db, item_id) = setup();
        let runs = RunManager::new(&db);

        let run = runs.claim(item_id, StageKind::Scout).unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert_eq!(run.retry_count, 0);
        assert_eq!(run.current_stage, Some(StageKind::Scout));
        assert!(run.error.is_none());
    }

    #[test]
    fn test_second_active_claim_is_rejected() {
        let (db, item_id) = setup();
        let runs = RunManager::new(&db);

        runs.claim(item_id, StageKind::Scout).unwrap();
        let err = runs.claim(item_id, StageKind::Scout).unwrap_err();
        assert!(err.to_string().contains("already has an active pipeline run"));
        assert_eq!(runs.runs_for_item(item_id).unwrap().len(), 1);
    }

    #[test]
    fn test_claim_resumes_failed_run() {
        let (db, item_id) = setup();
        let runs = RunManager::new(&db);

        let first = runs.claim(item_id, StageKind::Scout).unwrap();
        runs.fail(first.id, "rate limited", Some(StageKind::Analyst)).unwrap();

        let failed = runs.load(first.id).unwrap().unwrap();
        assert_eq!(failed.status, RunStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("rate limited"));
        assert_eq!(failed.current_stage, Some(StageKind::Analyst));

        let resumed = runs.claim(item_id, StageKind::Scout).unwrap();
        assert_eq!(resumed.id, first.id);
        assert_eq!(resumed.status, RunStatus::Running);
        assert_eq!(resumed.retry_count, 1);
        assert!(resumed.error.is_none());
        assert!(resumed.started_at >= first.started_at);
    }

    #[test]
    fn test_complete_and_outputs() {
        let (db, item_id) = setup();
        let runs = RunManager::new(&db);
        let run = runs.claim(item_id, StageKind::Scout).unwrap();

        runs.record_outputs(
            run.id,
            run.retry_count,
            &[output(StageKind::Scout), output(StageKind::Analyst)],
        )
        .unwrap();
        runs.complete(
            run.id,
            &RunSummary {
                summary: Some("Short".to_string()),
                recommended_actions: Some(json!(["call"])),
                ..Default::default()
            },
        )
        .unwrap();

        let done = runs.latest_for_item(item_id).unwrap().unwrap();
        assert_eq!(done.status, RunStatus::Completed);
        assert!(done.completed_at.is_some());
        assert!(done.current_stage.is_none());
        assert_eq!(done.recommended_actions, Some(json!(["call"])));
        assert!(done.audit_score.is_none());

        let outputs = runs.outputs_for_run(run.id).unwrap();
        let stages: Vec<_> = outputs.iter().map(|o| o.stage).collect();
        assert_eq!(stages, vec![StageKind::Scout, StageKind::Analyst]);
        assert!(outputs.iter().all(|o| o.status == RunStatus::Completed));
        assert_eq!(outputs[1].output, json!({"stage": "analyst"}));
    }

    #[test]
    fn test_outputs_are_scoped_to_current_attempt() {
        let (db, item_id) = setup();
        let runs = RunManager::new(&db);

        let first = runs.claim(item_id, StageKind::Scout).unwrap();
        runs.record_outputs(first.id, first.retry_count, &[output(StageKind::Scout)])
            .unwrap();
        runs.fail(first.id, "timeout", Some(StageKind::Analyst)).unwrap();

        let second = runs.claim(item_id, StageKind::Scout).unwrap();
        assert!(runs.outputs_for_run(second.id).unwrap().is_empty());

        runs.record_outputs(second.id, second.retry_count, &[output(StageKind::Scout)])
            .unwrap();
        let current = runs.outputs_for_run(second.id).unwrap();
        assert_eq!(current.len(), 1);
        assert_eq!(current[0].attempt, 1);
        assert_eq!(runs.output_history(second.id).unwrap().len(), 2);
    }

    #[test]
    fn test_completed_run_allows_new_claim() {
        let (db, item_id) = setup();
        let runs = RunManager::new(&db);

        let first = runs.claim(item_id, StageKind::Scout).unwrap();
        runs.complete(first.id, &RunSummary::default()).unwrap();

        let second = runs.claim(item_id, StageKind::Scout).unwrap();
        assert_ne!(second.id, first.id);
        assert_eq!(second.retry_count, 0);
    }

    #[test]
    fn test_list_completed_and_mark_read() {
        let (db, item_id) = setup();
        let runs = RunManager::new(&db);
        let run = runs.claim(item_id, StageKind::Scout).unwrap();

        assert!(runs.mark_read(run.id).is_err());
        assert!(runs.list_completed(10, false).unwrap().is_empty());

        runs.complete(run.id, &RunSummary::default()).unwrap();
        let listed = runs.list_completed(10, true).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].item.id, item_id);
        assert_eq!(listed[0].item.title, "Transit hub survey");

        runs.mark_read(run.id).unwrap();
        assert!(runs.list_completed(10, true).unwrap().is_empty());
        assert_eq!(runs.list_completed(10, false).unwrap().len(), 1);
        assert!(runs.mark_read(run.id + 1).is_err());
    }

    #[test]
    fn test_stats() {
        let (db, item_id) = setup();
        let items = WorkItemManager::new(&db);
        let other = items.insert(&NewWorkItem::titled("Other")).unwrap().id;
        let runs = RunManager::new(&db);

        assert_eq!(runs.stats().unwrap(), ProcessingStats::default());

        let a = runs.claim(item_id, StageKind::Scout).unwrap();
        runs.complete(
            a.id,
            &RunSummary {
                audit_score: Some(80.0),
                ..Default::default()
            },
        )
        .unwrap();
        let b = runs.claim(other, StageKind::Scout).unwrap();
        runs.fail(b.id, "boom", None).unwrap();
        runs.claim(item_id, StageKind::Scout).unwrap();

        let stats = runs.stats().unwrap();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.running, 1);
        assert_eq!(stats.pending, 0);
        assert_eq!(stats.unread, 1);
        assert_eq!(stats.avg_audit_score, Some(80.0));
    }
}
