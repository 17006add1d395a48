use growthbench_core::catalog::builtin::{builtin_battery, builtin_diagnostics, DEFAULT_TABLE};
use growthbench_core::catalog::{load_catalog, validate};
use growthbench_core::db::PgExecutor;
use growthbench_core::engine::{Runner, StopSignal};
use growthbench_core::errors::{CatalogError, RunError};
use growthbench_core::model::{Catalog, RowCountMode, RunReport, RunStatus};
use growthbench_core::report::{console, json};
use growthbench_core::stats::summarize;
use growthbench_core::storage::{CsvStore, JsonlStore, PgMetricsStore, ResultStore, SqliteStore};
use std::path::Path;
use std::sync::Arc;

use super::{ensure_parent_dir, exit_codes};
use crate::cli::args::RunArgs;

pub async fn run(args: RunArgs) -> anyhow::Result<i32> {
    // 1. Catalog first: a bad catalog never costs a connection
    let catalog = match build_catalog(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("config error: {}", e);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };

    // 2. Local sinks. One that cannot be opened degrades the run instead of failing it.
    let (stores, sink_failures) = open_file_sinks(&args);

    // 3. Connect
    let exec = match PgExecutor::connect(&args.database_url).await {
        Ok(e) => e,
        Err(e) => {
            eprintln!("connection error: {}", e);
            return Ok(exit_codes::CONNECTION_ERROR);
        }
    };
    match exec.server_version().await {
        Ok(v) => tracing::info!(server_version = %v, "connected"),
        Err(e) => tracing::warn!(error = %e, "could not read server version"),
    }

    let mut runner = Runner::for_catalog(&catalog);
    for store in stores {
        runner = runner.with_store(store);
    }
    if args.pg_metrics {
        let texts = catalog
            .queries
            .iter()
            .map(|q| (q.name.clone(), q.sql.clone()))
            .collect();
        runner = runner.with_store(Arc::new(PgMetricsStore::new(exec.client(), texts)));
    }

    // 4. Ctrl-C stops between attempts
    let (stop_tx, stop) = StopSignal::new();
    let signal_task = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nstopping after the current attempt...");
            let _ = stop_tx.send(true);
        }
    });

    eprintln!(
        "Running suite {} ({} queries, {} attempts)",
        catalog.suite,
        catalog.queries.len(),
        catalog.total_attempts()
    );
    let mut report = runner.run(&catalog, &exec, &stop).await;
    signal_task.abort();

    // 5. Report
    report.add_persistence_failures(sink_failures);
    if let Some(out) = &args.output {
        write_report(&mut report, out);
    }
    let summaries = summarize(&report.results);
    console::print_summary(&report, &summaries);

    Ok(exit_code(report.status, args.strict))
}

fn exit_code(status: RunStatus, strict: bool) -> i32 {
    match status {
        RunStatus::Complete => exit_codes::OK,
        RunStatus::Degraded if strict => exit_codes::RUN_DEGRADED,
        RunStatus::Degraded => exit_codes::OK,
        RunStatus::Aborted => exit_codes::CONNECTION_ERROR,
        RunStatus::Interrupted => exit_codes::INTERRUPTED,
        RunStatus::Running => exit_codes::RUN_DEGRADED,
    }
}

/// History, CSV and JSONL sinks that opened, plus how many did not.
fn open_file_sinks(args: &RunArgs) -> (Vec<Arc<dyn ResultStore>>, u32) {
    let candidates = [
        Some(open_sink("sqlite", &args.db, |p| {
            let store = SqliteStore::open(p)?;
            store.init_schema()?;
            Ok(store)
        })),
        args.csv.as_deref().map(|p| open_sink("csv", p, CsvStore::open)),
        args.jsonl.as_deref().map(|p| open_sink("jsonl", p, JsonlStore::open)),
    ];

    let mut failures = 0;
    let stores: Vec<Arc<dyn ResultStore>> = candidates
        .into_iter()
        .flatten()
        .filter_map(|opened| {
            if opened.is_none() {
                failures += 1;
            }
            opened
        })
        .collect();
    (stores, failures)
}

fn open_sink<S, F>(kind: &str, path: &Path, open: F) -> Option<Arc<dyn ResultStore>>
where
    S: ResultStore + 'static,
    F: FnOnce(&Path) -> anyhow::Result<S>,
{
    match ensure_parent_dir(path).and_then(|_| open(path)) {
        Ok(store) => Some(Arc::new(store)),
        Err(e) => {
            tracing::warn!(
                store = kind,
                path = %path.display(),
                error = %e,
                "could not open result store, continuing without it"
            );
            None
        }
    }
}

fn write_report(report: &mut RunReport, out: &Path) {
    match json::write_json(report, out) {
        Ok(()) => eprintln!("report written to {}", out.display()),
        Err(e) => {
            tracing::warn!(path = %out.display(), error = %e, "could not write run report");
            report.add_persistence_failures(1);
        }
    }
}

/// Resolve the catalog and fold the command-line overrides into its settings.
fn build_catalog(args: &RunArgs) -> Result<Catalog, RunError> {
    let mut catalog = match &args.catalog {
        Some(path) => load_catalog(path, args.strict)?,
        None => builtin_battery(args.table.as_deref().unwrap_or(DEFAULT_TABLE))?,
    };

    let settings = &mut catalog.settings;
    if let Some(table) = &args.table {
        settings.default_table = Some(table.clone());
    }
    if let Some(n) = args.repetitions {
        settings.repetitions = n;
    }
    if args.no_plan {
        settings.capture_plan = false;
    }
    if args.keep_plans {
        settings.keep_plans = true;
    }
    if let Some(ms) = args.timeout_ms {
        settings.timeout_ms = Some(ms);
    }
    if let Some(mode) = &args.row_count {
        settings.row_count = RowCountMode::parse(mode).ok_or_else(|| CatalogError::Parse {
            path: "--row-count".into(),
            message: format!("expected exact|estimate|off, got '{}'", mode),
        })?;
    }
    if args.with_diagnostics {
        catalog.queries.extend(builtin_diagnostics());
    }

    validate(&catalog)?;
    Ok(catalog)
}
