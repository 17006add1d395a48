use crate::model::{RunInfo, RunReport, RunResult};
use async_trait::async_trait;

pub mod csv;
pub mod jsonl;
pub mod postgres;
pub mod schema;
pub mod store;

pub use self::csv::CsvStore;
pub use self::jsonl::JsonlStore;
pub use self::postgres::PgMetricsStore;
pub use self::store::SqliteStore;

/// Append-only sink for run results.
#[async_trait]
pub trait ResultStore: Send + Sync {
    fn name(&self) -> &str;

    async fn begin(&self, _run: &RunInfo) -> anyhow::Result<()> {
        Ok(())
    }

    async fn append(&self, result: &RunResult) -> anyhow::Result<()>;

    async fn finish(&self, _report: &RunReport) -> anyhow::Result<()> {
        Ok(())
    }
}
