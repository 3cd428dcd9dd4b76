//! # Signalchain Database
//!
//! Single SQLite database for intel items, pipeline runs, per-stage outputs
//! and the stage prompt templates. Lives at `.signalchain/signalchain.db`
//! unless configured otherwise.

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::agents::{prompts, StageConfig};

/// Schema version for migrations
const SCHEMA_VERSION: i32 = 1;

/// Default database location, relative to the working directory
pub const DEFAULT_DB_PATH: &str = ".signalchain/signalchain.db";

/// Shared database handle for all managers
pub struct IntelDb {
    conn: Arc<Mutex<Connection>>,
}

impl IntelDb {
    /// Open or create the database at [`DEFAULT_DB_PATH`]
    pub fn open() -> Result<Self> {
        Self::open_at(DEFAULT_DB_PATH)
    }

    /// Open database at a specific path
    pub fn open_at<P: AsRef<Path>>(path: P) -> Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let conn = Connection::open(path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", path.as_ref()))?;

        Self::from_connection(conn)
    }

    /// Fresh in-memory database (tests)
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        let db = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        db.run_migrations()?;
        Ok(db)
    }

    /// Get a shared connection for use by other modules
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    fn run_migrations(&self) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
            [],
        )?;

        let current_version: i32 = conn
            .query_row(
                "SELECT COALESCE(MAX(version), 0) FROM schema_version",
                [],
                |row| row.get(0),
            )
            .unwrap_or(0);

        if current_version < 1 {
            Self::migrate_v1(&conn)?;
            conn.execute(
                "INSERT OR REPLACE INTO schema_version (version) VALUES (?1)",
                [1],
            )?;
        }

        Ok(())
    }

    /// Migration to version 1 - complete schema
    fn migrate_v1(conn: &Connection) -> Result<()> {
        // Intel items, written by the upstream collector
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS intel_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                summary TEXT,
                source_name TEXT,
                source_url TEXT,
                region TEXT,
                category TEXT,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        // One row per attempt (or resumed attempt) to run an item
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS pipeline_runs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                work_item_id INTEGER NOT NULL REFERENCES intel_items(id),
                status TEXT NOT NULL DEFAULT 'pending',
                current_stage TEXT,
                started_at TEXT NOT NULL,
                completed_at TEXT,
                error TEXT,
                retry_count INTEGER NOT NULL DEFAULT 0,
                summary TEXT,
                recommended_actions TEXT,
                draft_content TEXT,
                audit_score REAL,
                audit_verdict TEXT,
                is_read INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        // Append-only stage outputs; `attempt` is the run's retry_count when written
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS agent_outputs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                run_id INTEGER NOT NULL REFERENCES pipeline_runs(id),
                attempt INTEGER NOT NULL DEFAULT 0,
                stage TEXT NOT NULL,
                output TEXT NOT NULL,
                status TEXT NOT NULL,
                duration_ms INTEGER NOT NULL,
                confidence REAL NOT NULL,
                message_id TEXT NOT NULL,
                trace_id TEXT NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
            [],
        )?;

        // Stage system prompts, editable at runtime
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS prompt_templates (
                slug TEXT PRIMARY KEY,
                version INTEGER NOT NULL DEFAULT 1,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            )
            "#,
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_intel_items_created ON intel_items(created_at)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_runs_item ON pipeline_runs(work_item_id, created_at)",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_runs_status ON pipeline_runs(status)",
            [],
        )?;
        // At most one active run per item
        conn.execute(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_runs_one_active
            ON pipeline_runs(work_item_id) WHERE status IN ('pending', 'running')
            "#,
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_outputs_run ON agent_outputs(run_id, attempt)",
            [],
        )?;

        tracing::info!(
            "IntelDb initialized with schema version {}",
            SCHEMA_VERSION
        );

        Ok(())
    }

    // =========================================================================
    // Prompt Template Methods
    // =========================================================================

    /// Store the default prompt for every stage that has none yet.
    ///
    /// Returns how many defaults were inserted. Stored prompts are never
    /// overwritten.
    pub fn seed_prompts(&self) -> Result<usize> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut inserted = 0;
        for (slug, content) in prompts::all_defaults() {
            inserted += conn
                .execute(
                    "INSERT OR IGNORE INTO prompt_templates (slug, version, content) VALUES (?1, 1, ?2)",
                    params![slug, content],
                )
                .with_context(|| format!("Failed to seed prompt '{}'", slug))?;
        }

        if inserted > 0 {
            tracing::debug!("Seeded {} default prompts", inserted);
        }
        Ok(inserted)
    }

    /// Get a prompt by slug
    pub fn get_prompt(&self, slug: &str) -> Result<String> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        conn.query_row(
            "SELECT content FROM prompt_templates WHERE slug = ?1",
            params![slug],
            |row| row.get(0),
        )
        .with_context(|| format!("Prompt '{}' not found", slug))
    }

    /// Replace a prompt, bumping its version
    pub fn set_prompt(&self, slug: &str, content: &str) -> Result<i32> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let current_version: i32 = conn
            .query_row(
                "SELECT version FROM prompt_templates WHERE slug = ?1",
                params![slug],
                |row| row.get(0),
            )
            .unwrap_or(0);

        let new_version = current_version + 1;

        conn.execute(
            r#"
            INSERT INTO prompt_templates (slug, version, content, updated_at)
            VALUES (?1, ?2, ?3, datetime('now'))
            ON CONFLICT(slug) DO UPDATE SET
                version = ?2,
                content = ?3,
                updated_at = datetime('now')
            "#,
            params![slug, new_version, content],
        )?;

        tracing::debug!("Updated prompt '{}' to version {}", slug, new_version);
        Ok(new_version)
    }

    /// Swap in the stored system prompt for every stage that has one
    pub fn apply_prompts(&self, configs: &mut [StageConfig]) -> Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare("SELECT content FROM prompt_templates WHERE slug = ?1")?;
        for config in configs.iter_mut() {
            let stored: Option<String> = stmt
                .query_row(params![config.kind.as_str()], |row| row.get(0))
                .optional()?;
            if let Some(content) = stored {
                config.system_prompt = content;
            }
        }
        Ok(())
    }

    /// All prompt slugs with their versions
    pub fn list_prompts(&self) -> Result<Vec<(String, i32)>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut stmt = conn.prepare("SELECT slug, version FROM prompt_templates ORDER BY slug")?;
        let prompts = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to list prompts")?;
        Ok(prompts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_migrations_are_idempotent() {
        let db = IntelDb::open_in_memory().unwrap();
        // Second run sees version 1 and does nothing
        db.run_migrations().unwrap();

        let conn = db.connection();
        let conn = conn.lock().unwrap();
        let version: i32 = conn
            .query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(version, SCHEMA_VERSION);
    }

    #[test]
    fn test_seed_and_override_prompts() {
        let db = IntelDb::open_in_memory().unwrap();
        assert_eq!(db.seed_prompts().unwrap(), 5);
        assert_eq!(db.seed_prompts().unwrap(), 0);

        assert_eq!(db.get_prompt("scout").unwrap(), prompts::SCOUT);
        assert_eq!(db.set_prompt("scout", "Be brief. Output JSON.").unwrap(), 2);
        assert_eq!(db.get_prompt("scout").unwrap(), "Be brief. Output JSON.");

        let listed = db.list_prompts().unwrap();
        assert_eq!(listed.len(), 5);
        assert!(listed.contains(&("scout".to_string(), 2)));
        assert!(db.get_prompt("planner").is_err());
    }

    #[test]
    fn test_seed_fills_missing_prompts_only() {
        let db = IntelDb::open_in_memory().unwrap();
        db.set_prompt("composer", "Write one short email. Output JSON.")
            .unwrap();

        assert_eq!(db.seed_prompts().unwrap(), 4);
        assert_eq!(db.seed_prompts().unwrap(), 0);
        assert_eq!(
            db.get_prompt("composer").unwrap(),
            "Write one short email. Output JSON."
        );
        for (slug, content) in prompts::all_defaults() {
            if slug != "composer" {
                assert_eq!(db.get_prompt(slug).unwrap(), content);
            }
        }
        assert_eq!(db.list_prompts().unwrap().len(), 5);
    }

    #[test]
    fn test_apply_prompts_uses_stored_templates() {
        use crate::agents::StageKind;

        let db = IntelDb::open_in_memory().unwrap();
        db.set_prompt("composer", "Write one short email. Output JSON.")
            .unwrap();

        let mut configs = Vec::from(StageKind::all().map(|k| k.default_config()));
        db.apply_prompts(&mut configs).unwrap();

        assert_eq!(configs[0].system_prompt, prompts::SCOUT);
        assert_eq!(configs[3].system_prompt, "Write one short email. Output JSON.");
    }
}
