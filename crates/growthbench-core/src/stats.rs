use crate::model::{QueryKind, RunResult};
use serde::Serialize;
use std::collections::HashMap;

/// Per-query aggregate over the attempts of one run.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct QuerySummary {
    pub query_name: String,
    pub kind: QueryKind,
    pub table_name: Option<String>,
    pub row_count: Option<i64>,
    pub attempts: u32,
    pub successes: u32,
    pub failures: u32,
    /// Timing fields cover successful attempts only; `None` when there were none.
    pub mean_ms: Option<f64>,
    pub min_ms: Option<f64>,
    pub max_ms: Option<f64>,
    pub stddev_ms: Option<f64>,
    pub mean_planning_ms: Option<f64>,
    pub avg_buffer_hit_ratio: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Default)]
struct Bucket {
    kind: QueryKind,
    table_name: Option<String>,
    row_count: Option<i64>,
    attempts: u32,
    failures: u32,
    exec: Vec<f64>,
    planning: Vec<f64>,
    hit_ratio: Vec<f64>,
    last_error: Option<String>,
}

/// Summaries in order of first appearance in `results`.
pub fn summarize(results: &[RunResult]) -> Vec<QuerySummary> {
    let mut order: Vec<&str> = Vec::new();
    let mut buckets: HashMap<&str, Bucket> = HashMap::new();

    for r in results {
        let b = buckets.entry(r.query_name.as_str()).or_insert_with(|| {
            order.push(r.query_name.as_str());
            Bucket {
                kind: r.kind,
                table_name: r.table_name.clone(),
                row_count: r.row_count,
                ..Default::default()
            }
        });
        b.attempts += 1;
        if !r.is_ok() {
            b.failures += 1;
            b.last_error = r.error.clone();
            continue;
        }
        b.exec.push(r.execution_time_ms);
        if let Some(p) = r.planning_time_ms {
            b.planning.push(p);
        }
        if let Some(h) = r.buffer_hit_ratio() {
            b.hit_ratio.push(h);
        }
    }

    order
        .into_iter()
        .filter_map(|name| {
            let b = buckets.remove(name)?;
            Some(QuerySummary {
                query_name: name.to_string(),
                kind: b.kind,
                table_name: b.table_name,
                row_count: b.row_count,
                attempts: b.attempts,
                successes: b.attempts - b.failures,
                failures: b.failures,
                mean_ms: mean(&b.exec),
                min_ms: b.exec.iter().copied().reduce(f64::min),
                max_ms: b.exec.iter().copied().reduce(f64::max),
                stddev_ms: stddev(&b.exec),
                mean_planning_ms: mean(&b.planning),
                avg_buffer_hit_ratio: mean(&b.hit_ratio),
                last_error: b.last_error,
            })
        })
        .collect()
}

pub fn mean(vs: &[f64]) -> Option<f64> {
    if vs.is_empty() {
        return None;
    }
    Some(vs.iter().sum::<f64>() / vs.len() as f64)
}

/// Population standard deviation; zero for a single sample.
pub fn stddev(vs: &[f64]) -> Option<f64> {
    let m = mean(vs)?;
    let variance = vs.iter().map(|x| (x - m).powi(2)).sum::<f64>() / vs.len() as f64;
    Some(variance.sqrt())
}
