//! # Work Items
//!
//! Intel items as the pipeline sees them. The collector that normally
//! writes them lives elsewhere; [`WorkItemManager::insert`] stands in for it.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};

use super::db::IntelDb;
use super::{from_db_time, to_db_time};

pub(crate) const ITEM_COLUMNS: &str =
    "i.id, i.title, i.summary, i.source_name, i.source_url, i.region, i.category, i.created_at";

/// A stored intel item
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkItem {
    pub id: i64,
    pub title: String,
    pub summary: Option<String>,
    pub source_name: Option<String>,
    pub source_url: Option<String>,
    pub region: Option<String>,
    pub category: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl WorkItem {
    /// Flatten into the text blob the Scout reads. Blank fields are left out.
    pub fn to_text_blob(&self) -> String {
        let labelled = |label: &str, value: &Option<String>| {
            value
                .as_deref()
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| format!("{}: {}", label, v))
        };

        [
            Some(self.title.trim().to_string()).filter(|t| !t.is_empty()),
            self.summary
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            labelled("Source", &self.source_name),
            labelled("URL", &self.source_url),
            labelled("Region", &self.region),
            labelled("Category", &self.category),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join("\n\n")
    }

    /// Source name for the Scout, or a generic feed label
    pub fn source_label(&self) -> &str {
        self.source_name
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or("intel_feed")
    }
}

/// Fields for a new intel item
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct NewWorkItem {
    pub title: String,
    pub summary: Option<String>,
    pub source_name: Option<String>,
    pub source_url: Option<String>,
    pub region: Option<String>,
    pub category: Option<String>,
    /// Defaults to now
    pub created_at: Option<DateTime<Utc>>,
}

impl NewWorkItem {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

pub struct WorkItemManager {
    conn: Arc<Mutex<Connection>>,
}

impl WorkItemManager {
    pub fn new(db: &IntelDb) -> Self {
        Self {
            conn: db.connection(),
        }
    }

    /// Store a new item and return it
    pub fn insert(&self, item: &NewWorkItem) -> Result<WorkItem> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let created_at = item.created_at.unwrap_or_else(Utc::now);

        conn.execute(
            r#"
            INSERT INTO intel_items
            (title, summary, source_name, source_url, region, category, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                item.title,
                item.summary,
                item.source_name,
                item.source_url,
                item.region,
                item.category,
                to_db_time(created_at),
            ],
        )
        .context("Failed to insert intel item")?;

        let id = conn.last_insert_rowid();
        tracing::debug!(item_id = id, "Inserted intel item");

        Ok(WorkItem {
            id,
            title: item.title.clone(),
            summary: item.summary.clone(),
            source_name: item.source_name.clone(),
            source_url: item.source_url.clone(),
            region: item.region.clone(),
            category: item.category.clone(),
            created_at: from_db_time(&to_db_time(created_at)),
        })
    }

    /// Load an item by id
    pub fn load(&self, id: i64) -> Result<Option<WorkItem>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let sql = format!("SELECT {} FROM intel_items i WHERE i.id = ?1", ITEM_COLUMNS);
        conn.query_row(&sql, params![id], |row| Self::row_to_item(row, 0))
            .optional()
            .context("Failed to load intel item")
    }

    /// Newest items with no completed or running run, newest first
    pub fn find_unprocessed(&self, limit: usize) -> Result<Vec<i64>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare(
            r#"
            SELECT i.id FROM intel_items i
            WHERE NOT EXISTS (
                SELECT 1 FROM pipeline_runs r
                WHERE r.work_item_id = i.id AND r.status IN ('completed', 'running')
            )
            ORDER BY i.created_at DESC, i.id DESC
            LIMIT ?1
            "#,
        )?;

        let ids = stmt
            .query_map(params![limit as i64], |row| row.get(0))?
            .collect::<Result<Vec<i64>, _>>()
            .context("Failed to query unprocessed items")?;

        Ok(ids)
    }

    /// Map [`ITEM_COLUMNS`] starting at column `base`
    pub(crate) fn row_to_item(row: &rusqlite::Row, base: usize) -> rusqlite::Result<WorkItem> {
        let created_at: String = row.get(base + 7)?;
        Ok(WorkItem {
            id: row.get(base)?,
            title: row.get(base + 1)?,
            summary: row.get(base + 2)?,
            source_name: row.get(base + 3)?,
            source_url: row.get(base + 4)?,
            region: row.get(base + 5)?,
            category: row.get(base + 6)?,
            created_at: from_db_time(&created_at),
        })
    }
}
