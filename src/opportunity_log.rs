//! Ambient SQLite logging of scan opportunities. Not position state: closing
//! this module entirely (or pointing it at an in-memory database) changes
//! nothing about what the scanner evaluates, only what's durably recorded
//! for later review. Schema and open pattern follow the teacher's
//! `signals::db_storage::DbSignalStorage` (WAL mode, a single guarded
//! connection, best-effort inserts), scaled down from its 10M-row design to
//! one row per scan pass that actually cleared the profit floor.

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use tracing::{info, warn};

use crate::scanner::ScanSummary;

const SCHEMA_SQL: &str = r#"
PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;

CREATE TABLE IF NOT EXISTS opportunities (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    detected_at_ms INTEGER NOT NULL,
    path_id TEXT NOT NULL,
    assets_json TEXT NOT NULL,
    delta_final REAL NOT NULL,
    evaluated INTEGER NOT NULL,
    duration_ms REAL NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_opportunities_detected_at
    ON opportunities(detected_at_ms);
"#;

/// A guarded connection to the opportunity log. Cheap to construct per
/// process; the mutex is only ever held across a single synchronous insert,
/// never across an `.await`.
pub struct OpportunityLog {
    conn: Mutex<Connection>,
}

impl OpportunityLog {
    pub fn open(db_path: &str) -> Result<Self> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        let conn = Connection::open_with_flags(db_path, flags)
            .with_context(|| format!("failed to open opportunity log at {db_path}"))?;
        conn.execute_batch(SCHEMA_SQL)
            .context("failed to initialize opportunity log schema")?;
        info!(db_path, "opportunity log ready");
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Opens an in-memory log, useful for `--dry-run` and tests where a file
    /// on disk would just be noise.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory opportunity log")?;
        conn.execute_batch(SCHEMA_SQL)
            .context("failed to initialize opportunity log schema")?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Records a scan pass that found at least one opportunity. Best-effort:
    /// a write failure is logged and swallowed rather than propagated, since
    /// losing a log row must never interrupt scanning.
    pub fn record(&self, summary: &ScanSummary, detected_at_ms: i64) {
        let (Some(path_id), Some(assets), Some(delta_final)) =
            (&summary.best_path_id, &summary.best_assets, summary.best_delta_final)
        else {
            return;
        };
        let assets_json = serde_json::to_string(assets).unwrap_or_else(|_| "[]".to_string());
        let conn = self.conn.lock();
        let result = conn.execute(
            "INSERT INTO opportunities \
                (detected_at_ms, path_id, assets_json, delta_final, evaluated, duration_ms) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                detected_at_ms,
                path_id,
                assets_json,
                delta_final,
                summary.evaluated as i64,
                summary.duration_ms,
            ],
        );
        if let Err(err) = result {
            warn!(error = %err, "failed to write opportunity log row");
        }
    }

    /// Total rows ever recorded, used by tests and startup diagnostics.
    pub fn count(&self) -> i64 {
        self.conn
            .lock()
            .query_row("SELECT COUNT(*) FROM opportunities", [], |row| row.get(0))
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::ScanSummary;

    fn summary_with_opportunity() -> ScanSummary {
        ScanSummary {
            evaluated: 3,
            opportunities: 1,
            duration_ms: 1.5,
            best_path_id: Some("path_1".to_string()),
            best_assets: Some(vec!["USD".to_string(), "BTC".to_string(), "USD".to_string()]),
            best_delta_final: Some(0.01),
        }
    }

    #[test]
    fn records_a_row_when_an_opportunity_was_found() {
        let log = OpportunityLog::open_in_memory().unwrap();
        log.record(&summary_with_opportunity(), 1_700_000_000_000);
        assert_eq!(log.count(), 1);
    }

    #[test]
    fn open_creates_a_usable_file_backed_log() {
        let dir = tempfile::tempdir().expect("create temp dir");
        let db_path = dir.path().join("opportunities.sqlite3");
        let log = OpportunityLog::open(db_path.to_str().unwrap()).expect("open file-backed log");
        log.record(&summary_with_opportunity(), 1_700_000_000_000);
        assert_eq!(log.count(), 1);
        assert!(db_path.exists());
    }

    #[test]
    fn skips_empty_summaries_without_error() {
        let log = OpportunityLog::open_in_memory().unwrap();
        let empty = ScanSummary {
            evaluated: 2,
            opportunities: 0,
            duration_ms: 0.5,
            best_path_id: None,
            best_assets: None,
            best_delta_final: None,
        };
        log.record(&empty, 1_700_000_000_000);
        assert_eq!(log.count(), 0);
    }
}
