mod common;

use common::FakeExecutor;
use growthbench_core::analysis;
use growthbench_core::engine::{Runner, StopSignal};
use growthbench_core::model::{Catalog, QueryDefinition, RunSettings};
use growthbench_core::storage::{CsvStore, JsonlStore, SqliteStore};
use std::sync::Arc;
use tempfile::tempdir;

fn catalog(table: &str) -> Catalog {
    Catalog {
        version: 1,
        suite: "smoke".into(),
        settings: RunSettings {
            repetitions: 2,
            default_table: Some(table.into()),
            ..RunSettings::default()
        },
        queries: vec![
            QueryDefinition::new("point_lookup", "SELECT 1"),
            QueryDefinition::new("full_scan", "SELECT 2"),
        ],
    }
}

#[tokio::test]
async fn history_survives_reopen_and_feeds_analysis() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let db_path = dir.path().join("history.db");
    let csv_path = dir.path().join("results.csv");
    let jsonl_path = dir.path().join("results.jsonl");

    let mut run_ids = Vec::new();
    for table in ["events", "events_partitioned"] {
        // 1. Fresh handles per run, the way separate CLI invocations would open them
        let store = SqliteStore::open(&db_path)?;
        store.init_schema()?;
        let cat = catalog(table);
        let runner = Runner::for_catalog(&cat)
            .with_store(Arc::new(store))
            .with_store(Arc::new(CsvStore::open(&csv_path)?))
            .with_store(Arc::new(JsonlStore::open(&jsonl_path)?));

        let report = runner
            .run(&cat, &FakeExecutor::new(), &StopSignal::never())
            .await;
        assert_eq!(report.persistence_failures, 0);
        run_ids.push(report.run_id);
    }

    // 2. Reopen and inspect
    let store = SqliteStore::open(&db_path)?;
    let stats = store.stats()?;
    assert_eq!(stats.runs, 2);
    assert_eq!(stats.results, 8);
    for id in &run_ids {
        assert_eq!(store.fetch_run_results(id)?.len(), 4);
    }

    let tables = analysis::by_table(&store)?;
    assert_eq!(tables.len(), 2);
    let cmp = analysis::compare_tables(&store, "events", "events_partitioned")?;
    assert_eq!(cmp.len(), 2);
    assert!(cmp.iter().all(|c| c.candidate_avg_ms.is_some()));

    // 3. Flat exports saw every attempt, header once
    let csv = std::fs::read_to_string(&csv_path)?;
    assert_eq!(csv.lines().count(), 1 + 8);
    let jsonl = std::fs::read_to_string(&jsonl_path)?;
    assert_eq!(jsonl.lines().count(), 8);
    Ok(())
}
