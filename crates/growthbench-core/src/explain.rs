//! Reading `EXPLAIN (ANALYZE, BUFFERS, FORMAT JSON)` output.

use serde_json::Value;

/// Prefix turning a statement into its plan-capturing variant.
pub const EXPLAIN_PREFIX: &str = "EXPLAIN (ANALYZE, BUFFERS, FORMAT JSON) ";

pub fn explain_sql(sql: &str) -> String {
    format!("{}{}", EXPLAIN_PREFIX, sql.trim().trim_end_matches(';'))
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanStats {
    pub planning_time_ms: f64,
    pub execution_time_ms: f64,
    pub shared_hit_blocks: i64,
    pub shared_read_blocks: i64,
}

impl PlanStats {
    /// Accepts the document as returned by the server (`[{"Plan": ...}]`) or the
    /// bare top-level object.
    pub fn from_explain(doc: &Value) -> Result<Self, String> {
        let top = match doc {
            Value::Array(items) => items
                .first()
                .ok_or_else(|| "empty EXPLAIN output".to_string())?,
            Value::Object(_) => doc,
            other => return Err(format!("unexpected EXPLAIN output: {}", other)),
        };
        let plan = top
            .get("Plan")
            .ok_or_else(|| "EXPLAIN output has no Plan node".to_string())?;

        // Buffer counts on the root node already include every child node.
        Ok(Self {
            planning_time_ms: number(top, "Planning Time"),
            execution_time_ms: number(top, "Execution Time"),
            shared_hit_blocks: count(plan, "Shared Hit Blocks"),
            shared_read_blocks: count(plan, "Shared Read Blocks"),
        })
    }
}

fn number(v: &Value, key: &str) -> f64 {
    v.get(key).and_then(|x| x.as_f64()).unwrap_or(0.0)
}

fn count(v: &Value, key: &str) -> i64 {
    v.get(key).and_then(|x| x.as_i64()).unwrap_or(0)
}

/// Percentage of pages served from shared buffers.
pub fn buffer_hit_ratio(hit: i64, read: i64) -> f64 {
    let total = (hit + read).max(1);
    100.0 * hit as f64 / total as f64
}
