//! Usage/telemetry sinks for gateway call attempts.
//!
//! Every attempt the gateway makes (success or failure) is recorded against
//! the operation name. The SQLite sink keeps daily per-operation counters
//! with atomic upserts; reporting is strictly observational.

use chrono::Local;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::debug;

/// Outcome of one gateway attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failure,
}

/// Process-wide sink for gateway attempt telemetry.
pub trait UsageSink: Send + Sync {
    /// Record one attempt. `attempt` is the zero-based retry index.
    fn record_attempt(
        &self,
        op_name: &str,
        outcome: AttemptOutcome,
        attempt: u32,
    ) -> Result<(), String>;
}

/// Discards everything. For callers that do not track usage.
pub struct NullSink;

impl UsageSink for NullSink {
    fn record_attempt(&self, _: &str, _: AttemptOutcome, _: u32) -> Result<(), String> {
        Ok(())
    }
}

/// In-memory counters, used by tests and short-lived runs.
#[derive(Default)]
pub struct MemorySink {
    counts: Mutex<HashMap<String, OpCounters>>,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OpCounters {
    pub attempts: u64,
    pub successes: u64,
    pub failures: u64,
    pub retries: u64,
}

impl MemorySink {
    pub fn attempts(&self, op_name: &str) -> u64 {
        self.counts
            .lock()
            .unwrap()
            .get(op_name)
            .map(|c| c.attempts)
            .unwrap_or(0)
    }

    pub fn counters(&self, op_name: &str) -> OpCounters {
        self.counts
            .lock()
            .unwrap()
            .get(op_name)
            .copied()
            .unwrap_or_default()
    }
}

impl UsageSink for MemorySink {
    fn record_attempt(
        &self,
        op_name: &str,
        outcome: AttemptOutcome,
        attempt: u32,
    ) -> Result<(), String> {
        let mut counts = self.counts.lock().map_err(|e| e.to_string())?;
        let entry = counts.entry(op_name.to_string()).or_default();
        entry.attempts += 1;
        match outcome {
            AttemptOutcome::Success => entry.successes += 1,
            AttemptOutcome::Failure => entry.failures += 1,
        }
        if attempt > 0 {
            entry.retries += 1;
        }
        Ok(())
    }
}

/// SQLite-backed usage tracker with daily per-operation rows.
pub struct SqliteUsageTracker {
    conn: Mutex<Connection>,
}

impl SqliteUsageTracker {
    /// Create or open the usage database at
    /// `~/.config/drivescope/usage.db`.
    pub fn new() -> Result<Self, String> {
        let db_path = Self::default_db_path()?;
        Self::open(&db_path)
    }

    /// Create or open a usage database at an explicit path.
    pub fn open(db_path: &PathBuf) -> Result<Self, String> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("Failed to create config dir: {}", e))?;
        }

        let conn = Connection::open(db_path)
            .map_err(|e| format!("Failed to open usage database: {}", e))?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS gateway_usage (
                date TEXT NOT NULL,
                operation TEXT NOT NULL,
                attempts INTEGER DEFAULT 0,
                successes INTEGER DEFAULT 0,
                failures INTEGER DEFAULT 0,
                retries INTEGER DEFAULT 0,
                PRIMARY KEY (date, operation)
            );

            CREATE INDEX IF NOT EXISTS idx_gateway_usage_date
                ON gateway_usage(date DESC);
        "#,
        )
        .map_err(|e| format!("Failed to create tables: {}", e))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn default_db_path() -> Result<PathBuf, String> {
        dirs::config_dir()
            .map(|d| d.join("drivescope").join("usage.db"))
            .ok_or_else(|| "Could not determine config directory".to_string())
    }

    /// Daily buckets follow the user's local midnight, not UTC.
    fn today_local() -> String {
        Local::now().format("%Y-%m-%d").to_string()
    }

    /// Attempt/success/failure/retry totals for one operation today.
    pub fn today_counters(&self, op_name: &str) -> Result<OpCounters, String> {
        let conn = self.conn.lock().unwrap();
        let today = Self::today_local();

        let result = conn.query_row(
            "SELECT attempts, successes, failures, retries
             FROM gateway_usage WHERE date = ? AND operation = ?",
            params![today, op_name],
            |row| {
                Ok(OpCounters {
                    attempts: row.get::<_, i64>(0)? as u64,
                    successes: row.get::<_, i64>(1)? as u64,
                    failures: row.get::<_, i64>(2)? as u64,
                    retries: row.get::<_, i64>(3)? as u64,
                })
            },
        );

        match result {
            Ok(counters) => Ok(counters),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(OpCounters::default()),
            Err(e) => Err(format!("Database query failed: {}", e)),
        }
    }
}

impl UsageSink for SqliteUsageTracker {
    fn record_attempt(
        &self,
        op_name: &str,
        outcome: AttemptOutcome,
        attempt: u32,
    ) -> Result<(), String> {
        let conn = self.conn.lock().map_err(|e| e.to_string())?;
        let today = Self::today_local();
        let success: i64 = if outcome == AttemptOutcome::Success { 1 } else { 0 };
        let retry: i64 = if attempt > 0 { 1 } else { 0 };

        conn.execute(
            r#"
            INSERT INTO gateway_usage (date, operation, attempts, successes, failures, retries)
            VALUES (?1, ?2, 1, ?3, 1 - ?3, ?4)
            ON CONFLICT(date, operation) DO UPDATE SET
                attempts = attempts + 1,
                successes = successes + ?3,
                failures = failures + (1 - ?3),
                retries = retries + ?4
            "#,
            params![today, op_name, success, retry],
        )
        .map_err(|e| format!("Failed to record attempt: {}", e))?;

        debug!(op = op_name, success = success == 1, "recorded gateway attempt");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_memory_sink_counts() {
        let sink = MemorySink::default();
        sink.record_attempt("list_files", AttemptOutcome::Failure, 0)
            .unwrap();
        sink.record_attempt("list_files", AttemptOutcome::Failure, 1)
            .unwrap();
        sink.record_attempt("list_files", AttemptOutcome::Success, 2)
            .unwrap();

        let counters = sink.counters("list_files");
        assert_eq!(counters.attempts, 3);
        assert_eq!(counters.successes, 1);
        assert_eq!(counters.failures, 2);
        assert_eq!(counters.retries, 2);
    }

    #[test]
    fn test_sqlite_tracker_upserts() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("usage.db");
        let tracker = SqliteUsageTracker::open(&path).unwrap();

        tracker
            .record_attempt("get_file", AttemptOutcome::Success, 0)
            .unwrap();
        tracker
            .record_attempt("get_file", AttemptOutcome::Failure, 0)
            .unwrap();
        tracker
            .record_attempt("get_file", AttemptOutcome::Success, 1)
            .unwrap();

        let counters = tracker.today_counters("get_file").unwrap();
        assert_eq!(counters.attempts, 3);
        assert_eq!(counters.successes, 2);
        assert_eq!(counters.failures, 1);
        assert_eq!(counters.retries, 1);

        // Unknown operation reads as zeroes.
        assert_eq!(tracker.today_counters("other").unwrap().attempts, 0);
    }
}
