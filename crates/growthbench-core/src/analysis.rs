//! Cross-run analysis over the SQLite history.
//!
//! Only successful attempts are aggregated; failed attempts carry wall-clock
//! time up to the error, which would skew every average.

use crate::storage::SqliteStore;
use anyhow::Context;
use rusqlite::params;
use serde::Serialize;
use std::path::Path;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TableAnalysis {
    pub table_name: String,
    pub test_count: u64,
    pub avg_execution_ms: f64,
    pub min_execution_ms: f64,
    pub max_execution_ms: f64,
    pub avg_buffers_hit: Option<f64>,
    pub avg_buffers_read: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QueryAnalysis {
    pub query_name: String,
    pub execution_count: u64,
    pub avg_execution_ms: f64,
    pub min_execution_ms: f64,
    pub max_execution_ms: f64,
    /// Sample standard deviation; `None` below two executions.
    pub stddev_execution_ms: Option<f64>,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct Comparison {
    pub query_name: String,
    pub baseline_avg_ms: f64,
    pub candidate_avg_ms: Option<f64>,
    /// `(baseline - candidate) / baseline * 100`, rounded to two decimals.
    pub improvement_percent: Option<f64>,
}

/// Aggregates per table, slowest first.
pub fn by_table(store: &SqliteStore) -> anyhow::Result<Vec<TableAnalysis>> {
    let conn = store.lock()?;
    let mut stmt = conn.prepare(
        "SELECT table_name, COUNT(*), AVG(execution_time_ms), MIN(execution_time_ms),
                MAX(execution_time_ms), AVG(buffers_hit), AVG(buffers_read)
         FROM results
         WHERE status = 'ok' AND table_name IS NOT NULL
         GROUP BY table_name
         ORDER BY AVG(execution_time_ms) DESC",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(TableAnalysis {
            table_name: row.get(0)?,
            test_count: row.get::<_, i64>(1)? as u64,
            avg_execution_ms: row.get(2)?,
            min_execution_ms: row.get(3)?,
            max_execution_ms: row.get(4)?,
            avg_buffers_hit: row.get(5)?,
            avg_buffers_read: row.get(6)?,
        })
    })?;
    let out = rows.collect::<Result<Vec<_>, _>>()?;
    Ok(out)
}

/// Aggregates per query name, slowest first, optionally limited to one query.
pub fn by_query(store: &SqliteStore, query: Option<&str>) -> anyhow::Result<Vec<QueryAnalysis>> {
    let conn = store.lock()?;
    let mut stmt = conn.prepare(
        "SELECT query_name, COUNT(*), AVG(execution_time_ms), MIN(execution_time_ms),
                MAX(execution_time_ms), SUM(execution_time_ms),
                SUM(execution_time_ms * execution_time_ms)
         FROM results
         WHERE status = 'ok' AND (?1 IS NULL OR query_name = ?1)
         GROUP BY query_name
         ORDER BY AVG(execution_time_ms) DESC",
    )?;
    let rows = stmt.query_map(params![query], |row| {
        let n = row.get::<_, i64>(1)? as u64;
        let sum: f64 = row.get(5)?;
        let sumsq: f64 = row.get(6)?;
        Ok(QueryAnalysis {
            query_name: row.get(0)?,
            execution_count: n,
            avg_execution_ms: row.get(2)?,
            min_execution_ms: row.get(3)?,
            max_execution_ms: row.get(4)?,
            stddev_execution_ms: sample_stddev(n, sum, sumsq),
        })
    })?;
    let out = rows.collect::<Result<Vec<_>, _>>()?;
    Ok(out)
}

/// Per-query comparison of two tables' average timings, best improvement first.
/// Queries with no candidate measurements are listed last with no improvement.
pub fn compare_tables(
    store: &SqliteStore,
    baseline: &str,
    candidate: &str,
) -> anyhow::Result<Vec<Comparison>> {
    let conn = store.lock()?;
    let mut stmt = conn.prepare(
        "WITH avgs AS (
             SELECT query_name, table_name, AVG(execution_time_ms) AS avg_ms
             FROM results
             WHERE status = 'ok' AND table_name IN (?1, ?2)
             GROUP BY query_name, table_name
         )
         SELECT b.query_name, b.avg_ms, c.avg_ms
         FROM avgs b
         LEFT JOIN avgs c ON c.query_name = b.query_name AND c.table_name = ?2
         WHERE b.table_name = ?1
         ORDER BY b.query_name",
    )?;
    let rows = stmt.query_map(params![baseline, candidate], |row| {
        let baseline_avg_ms: f64 = row.get(1)?;
        let candidate_avg_ms: Option<f64> = row.get(2)?;
        Ok(Comparison {
            query_name: row.get(0)?,
            baseline_avg_ms,
            candidate_avg_ms,
            improvement_percent: candidate_avg_ms.and_then(|c| improvement(baseline_avg_ms, c)),
        })
    })?;
    let mut out: Vec<Comparison> = rows.collect::<Result<_, _>>()?;
    out.sort_by(|a, b| {
        let key = |c: &Comparison| c.improvement_percent.unwrap_or(f64::NEG_INFINITY);
        key(b)
            .partial_cmp(&key(a))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    Ok(out)
}

/// Write flat analysis rows to a CSV file with a header row. Nothing is
/// written when `rows` is empty.
pub fn write_csv<T: Serialize>(path: &Path, rows: &[T]) -> anyhow::Result<bool> {
    if rows.is_empty() {
        return Ok(false);
    }
    let mut w = csv::Writer::from_path(path)
        .with_context(|| format!("failed to create {}", path.display()))?;
    for row in rows {
        w.serialize(row)?;
    }
    w.flush()?;
    Ok(true)
}

fn improvement(baseline: f64, candidate: f64) -> Option<f64> {
    if baseline <= 0.0 {
        return None;
    }
    Some(((baseline - candidate) / baseline * 100.0 * 100.0).round() / 100.0)
}

fn sample_stddev(n: u64, sum: f64, sumsq: f64) -> Option<f64> {
    if n < 2 {
        return None;
    }
    let n = n as f64;
    let variance = (sumsq - sum * sum / n) / (n - 1.0);
    Some(variance.max(0.0).sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{QueryKind, ResultStatus, RunInfo, RunResult, RunSettings};
    use chrono::Utc;

    fn seeded() -> anyhow::Result<SqliteStore> {
        let store = SqliteStore::memory()?;
        store.init_schema()?;
        store.create_run(&RunInfo {
            run_id: "r".into(),
            suite: "s".into(),
            started_at: Utc::now(),
            settings: RunSettings::default(),
        })?;
        let rows = [
            ("point_lookup", "events", 10.0, true),
            ("point_lookup", "events", 14.0, true),
            ("point_lookup", "events_partitioned", 6.0, true),
            ("full_scan", "events", 100.0, true),
            ("full_scan", "events", 5000.0, false),
            ("only_baseline", "events", 3.0, true),
        ];
        for (i, (q, t, ms, ok)) in rows.into_iter().enumerate() {
            store.insert_result(&RunResult {
                run_id: "r".into(),
                query_name: q.into(),
                attempt: i as u32 + 1,
                repetitions: 1,
                kind: QueryKind::Benchmark,
                table_name: Some(t.into()),
                row_count: None,
                returned_rows: None,
                execution_time_ms: ms,
                planning_time_ms: None,
                server_execution_ms: None,
                buffers_hit: Some(100),
                buffers_read: Some(0),
                timestamp: Utc::now(),
                status: if ok {
                    ResultStatus::Ok
                } else {
                    ResultStatus::Failed
                },
                error: (!ok).then(|| "canceled".to_string()),
                notes: String::new(),
                plan: None,
            })?;
        }
        Ok(store)
    }

    #[test]
    fn table_analysis_ignores_failed_attempts() -> anyhow::Result<()> {
        let t = by_table(&seeded()?)?;
        assert_eq!(t.len(), 2);
        assert_eq!(t[0].table_name, "events");
        assert_eq!(t[0].test_count, 4);
        assert_eq!(t[0].max_execution_ms, 100.0);
        assert_eq!(t[0].avg_buffers_hit, Some(100.0));
        Ok(())
    }

    #[test]
    fn query_analysis_reports_sample_stddev() -> anyhow::Result<()> {
        let store = seeded()?;
        let q = by_query(&store, Some("point_lookup"))?;
        assert_eq!(q.len(), 1);
        assert_eq!(q[0].execution_count, 3);
        assert_eq!(q[0].avg_execution_ms, 10.0);
        let sd = q[0].stddev_execution_ms.unwrap_or_default();
        assert!((sd - 4.0).abs() < 1e-9, "stddev was {}", sd);

        let all = by_query(&store, None)?;
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].query_name, "full_scan");
        assert!(all[0].stddev_execution_ms.is_none());
        Ok(())
    }

    #[test]
    fn comparison_computes_improvement() -> anyhow::Result<()> {
        let c = compare_tables(&seeded()?, "events", "events_partitioned")?;
        assert_eq!(c.len(), 3);
        assert_eq!(c[0].query_name, "point_lookup");
        assert_eq!(c[0].baseline_avg_ms, 12.0);
        assert_eq!(c[0].candidate_avg_ms, Some(6.0));
        assert_eq!(c[0].improvement_percent, Some(50.0));
        assert!(c[1].improvement_percent.is_none());
        assert!(c[2].candidate_avg_ms.is_none());
        Ok(())
    }

    #[test]
    fn comparison_exports_as_csv() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("comparison.csv");
        let c = compare_tables(&seeded()?, "events", "events_partitioned")?;

        assert!(write_csv(&path, &c)?);
        let content = std::fs::read_to_string(&path)?;
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(
            lines[0],
            "query_name,baseline_avg_ms,candidate_avg_ms,improvement_percent"
        );
        assert!(lines[1].starts_with("point_lookup,12"), "{}", lines[1]);
        assert!(lines[1].ends_with(",50.0") || lines[1].ends_with(",50"));
        assert_eq!(lines.len(), 4);

        let empty: Vec<Comparison> = Vec::new();
        assert!(!write_csv(&dir.path().join("none.csv"), &empty)?);
        assert!(!dir.path().join("none.csv").exists());
        Ok(())
    }
}
