use super::ResultStore;
use crate::model::{QueryKind, ResultStatus, RunInfo, RunReport, RunResult};
use anyhow::Context;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Local run history in SQLite. Results are only ever inserted.
#[derive(Clone)]
pub struct SqliteStore {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

pub struct StoreStats {
    pub runs: u64,
    pub results: u64,
    pub last_run_id: Option<String>,
    pub last_run_at: Option<String>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite db {}", path.display()))?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn lock(&self) -> anyhow::Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("sqlite connection mutex poisoned"))
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute_batch(crate::storage::schema::DDL)?;
        Ok(())
    }

    pub fn create_run(&self, run: &RunInfo) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO runs(id, suite, started_at, status, settings_json)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                run.run_id,
                run.suite,
                run.started_at.to_rfc3339(),
                "running",
                serde_json::to_string(&run.settings)?
            ],
        )?;
        Ok(())
    }

    pub fn insert_result(&self, r: &RunResult) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO results(run_id, query_name, attempt, kind, table_name, row_count,
                                 returned_rows, execution_time_ms, planning_time_ms,
                                 server_execution_ms, buffers_hit, buffers_read, recorded_at,
                                 status, error, notes)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)",
            params![
                r.run_id,
                r.query_name,
                r.attempt,
                r.kind.as_str(),
                r.table_name,
                r.row_count,
                r.returned_rows.map(|v| v as i64),
                r.execution_time_ms,
                r.planning_time_ms,
                r.server_execution_ms,
                r.buffers_hit,
                r.buffers_read,
                r.timestamp.to_rfc3339(),
                r.status.as_str(),
                r.error,
                r.notes,
            ],
        )?;
        Ok(())
    }

    pub fn finalize_run(&self, report: &RunReport) -> anyhow::Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE runs SET status=?1, finished_at=?2, fatal=?3 WHERE id=?4",
            params![
                report.status.as_str(),
                report.finished_at.to_rfc3339(),
                report.fatal,
                report.run_id
            ],
        )?;
        Ok(())
    }

    pub fn fetch_run_results(&self, run_id: &str) -> anyhow::Result<Vec<RunResult>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM results WHERE run_id = ?1 ORDER BY id ASC",
            RESULT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![run_id], result_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Every recorded attempt across runs, newest first, optionally for one query.
    pub fn fetch_results(&self, query: Option<&str>) -> anyhow::Result<Vec<RunResult>> {
        let conn = self.lock()?;
        let sql = format!(
            "SELECT {} FROM results WHERE ?1 IS NULL OR query_name = ?1
             ORDER BY recorded_at DESC, id DESC",
            RESULT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![query], result_from_row)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn run_status(&self, run_id: &str) -> anyhow::Result<Option<String>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare("SELECT status FROM runs WHERE id = ?1")?;
        let mut rows = stmt.query(params![run_id])?;
        match rows.next()? {
            Some(row) => Ok(Some(row.get(0)?)),
            None => Ok(None),
        }
    }

    pub fn stats(&self) -> anyhow::Result<StoreStats> {
        let conn = self.lock()?;
        let runs: i64 = conn.query_row("SELECT count(*) FROM runs", [], |r| r.get(0))?;
        let results: i64 = conn.query_row("SELECT count(*) FROM results", [], |r| r.get(0))?;
        let last = conn
            .query_row(
                "SELECT id, started_at FROM runs ORDER BY started_at DESC LIMIT 1",
                [],
                |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)),
            )
            .optional()?;
        Ok(StoreStats {
            runs: runs as u64,
            results: results as u64,
            last_run_id: last.as_ref().map(|l| l.0.clone()),
            last_run_at: last.map(|l| l.1),
        })
    }
}

const RESULT_COLUMNS: &str = "run_id, query_name, attempt, kind, table_name, row_count, \
    returned_rows, execution_time_ms, planning_time_ms, server_execution_ms, buffers_hit, \
    buffers_read, recorded_at, status, error, notes";

fn result_from_row(row: &Row<'_>) -> rusqlite::Result<RunResult> {
    let kind: String = row.get(3)?;
    let recorded_at: String = row.get(12)?;
    let status: String = row.get(13)?;
    Ok(RunResult {
        run_id: row.get(0)?,
        query_name: row.get(1)?,
        attempt: row.get(2)?,
        // not stored; a history row stands alone
        repetitions: 0,
        kind: if kind == "diagnostic" {
            QueryKind::Diagnostic
        } else {
            QueryKind::Benchmark
        },
        table_name: row.get(4)?,
        row_count: row.get(5)?,
        returned_rows: row.get::<_, Option<i64>>(6)?.map(|v| v as u64),
        execution_time_ms: row.get(7)?,
        planning_time_ms: row.get(8)?,
        server_execution_ms: row.get(9)?,
        buffers_hit: row.get(10)?,
        buffers_read: row.get(11)?,
        timestamp: chrono::DateTime::parse_from_rfc3339(&recorded_at)
            .map(|t| t.with_timezone(&chrono::Utc))
            .unwrap_or_default(),
        status: ResultStatus::parse(&status),
        error: row.get(14)?,
        notes: row.get::<_, Option<String>>(15)?.unwrap_or_default(),
        plan: None,
    })
}

#[async_trait]
impl ResultStore for SqliteStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn begin(&self, run: &RunInfo) -> anyhow::Result<()> {
        self.create_run(run)
    }

    async fn append(&self, result: &RunResult) -> anyhow::Result<()> {
        self.insert_result(result)
    }

    async fn finish(&self, report: &RunReport) -> anyhow::Result<()> {
        self.finalize_run(report)
    }
}
