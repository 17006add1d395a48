use super::ResultStore;
use crate::model::RunResult;
use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

/// Flat CSV export, one row per attempt. Plans are not written.
pub struct CsvStore {
    writer: Mutex<csv::Writer<File>>,
}

#[derive(Serialize)]
struct CsvRow<'a> {
    run_id: &'a str,
    query_name: &'a str,
    attempt: u32,
    kind: &'a str,
    table_name: Option<&'a str>,
    row_count: Option<i64>,
    returned_rows: Option<u64>,
    execution_time_ms: f64,
    planning_time_ms: Option<f64>,
    server_execution_ms: Option<f64>,
    buffers_hit: Option<i64>,
    buffers_read: Option<i64>,
    buffer_hit_ratio: Option<f64>,
    timestamp: String,
    status: &'a str,
    error: Option<&'a str>,
    notes: &'a str,
}

impl<'a> From<&'a RunResult> for CsvRow<'a> {
    fn from(r: &'a RunResult) -> Self {
        Self {
            run_id: &r.run_id,
            query_name: &r.query_name,
            attempt: r.attempt,
            kind: r.kind.as_str(),
            table_name: r.table_name.as_deref(),
            row_count: r.row_count,
            returned_rows: r.returned_rows,
            execution_time_ms: round2(r.execution_time_ms),
            planning_time_ms: r.planning_time_ms.map(round2),
            server_execution_ms: r.server_execution_ms.map(round2),
            buffers_hit: r.buffers_hit,
            buffers_read: r.buffers_read,
            buffer_hit_ratio: r.buffer_hit_ratio().map(round2),
            timestamp: r.timestamp.to_rfc3339(),
            status: r.status.as_str(),
            error: r.error.as_deref(),
            notes: &r.notes,
        }
    }
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

impl CsvStore {
    /// Open `path` for appending; the header is written only into an empty file.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open csv output {}", path.display()))?;
        let empty = file.metadata()?.len() == 0;
        let writer = csv::WriterBuilder::new()
            .has_headers(empty)
            .from_writer(file);
        Ok(Self {
            writer: Mutex::new(writer),
        })
    }
}

/// Write `results` into a fresh CSV file at `path`, same columns as [`CsvStore`].
pub fn export_results(path: &Path, results: &[RunResult]) -> anyhow::Result<()> {
    let mut w = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for r in results {
        w.serialize(CsvRow::from(r))?;
    }
    w.flush()?;
    Ok(())
}

#[async_trait]
impl ResultStore for CsvStore {
    fn name(&self) -> &str {
        "csv"
    }

    async fn append(&self, result: &RunResult) -> anyhow::Result<()> {
        let mut w = self
            .writer
            .lock()
            .map_err(|_| anyhow::anyhow!("csv writer mutex poisoned"))?;
        w.serialize(CsvRow::from(result))?;
        w.flush()?;
        Ok(())
    }
}
