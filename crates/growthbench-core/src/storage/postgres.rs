use super::ResultStore;
use crate::model::{RunInfo, RunResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_postgres::Client;

/// Writes into a `performance_metrics` table in the benchmarked database,
/// over the run's own session.
pub struct PgMetricsStore {
    client: Arc<Client>,
    query_text: HashMap<String, String>,
}

impl PgMetricsStore {
    /// `query_text` maps query names to their SQL so the table keeps the statement.
    pub fn new(client: Arc<Client>, query_text: HashMap<String, String>) -> Self {
        Self { client, query_text }
    }
}

#[async_trait]
impl ResultStore for PgMetricsStore {
    fn name(&self) -> &str {
        "performance_metrics"
    }

    async fn begin(&self, run: &RunInfo) -> anyhow::Result<()> {
        self.client
            .batch_execute(crate::storage::schema::PG_METRICS_DDL)
            .await?;
        tracing::debug!(run_id = %run.run_id, "performance_metrics table ready");
        Ok(())
    }

    async fn append(&self, r: &RunResult) -> anyhow::Result<()> {
        let mut notes = format!("run {} iteration {}", r.run_id, r.attempt);
        if let Some(err) = &r.error {
            notes.push_str(&format!("; failed: {}", err));
        }
        if !r.notes.is_empty() {
            notes.push_str(&format!("; {}", r.notes));
        }

        self.client
            .execute(
                "INSERT INTO performance_metrics (
                    test_name, table_name, row_count, query,
                    execution_time_ms, plan_time_ms,
                    buffers_hit, buffers_read, test_timestamp, notes
                 ) VALUES ($1::text, $2::text, $3::bigint, $4::text, $5::float8, $6::float8,
                         $7::bigint, $8::bigint, $9::timestamptz, $10::text)",
                &[
                    &r.query_name,
                    &r.table_name,
                    &r.row_count,
                    &self.query_text.get(&r.query_name),
                    &r.execution_time_ms,
                    &r.planning_time_ms,
                    &r.buffers_hit,
                    &r.buffers_read,
                    &r.timestamp,
                    &notes,
                ],
            )
            .await?;
        Ok(())
    }
}
