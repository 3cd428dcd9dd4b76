//! # Persistence
//!
//! SQLite-backed storage for intel items, pipeline runs and stage outputs.
//! All managers share the connection owned by [`IntelDb`].

pub mod db;
pub mod runs;
pub mod work_items;

pub use db::IntelDb;
pub use runs::{
    AgentOutputRecord, NewAgentOutput, PipelineRun, ProcessedItem, ProcessingStats, RunManager,
    RunStatus, RunSummary,
};
pub use work_items::{NewWorkItem, WorkItem, WorkItemManager};

use chrono::{DateTime, SecondsFormat, Utc};

/// Fixed-width RFC 3339 so stored timestamps sort as text
pub(crate) fn to_db_time(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn now_db_time() -> String {
    to_db_time(Utc::now())
}

pub(crate) fn from_db_time(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}
