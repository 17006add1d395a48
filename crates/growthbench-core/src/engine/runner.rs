use crate::db::QueryExecutor;
use crate::errors::ExecError;
use crate::explain::PlanStats;
use crate::model::{
    Catalog, QueryDefinition, QueryKind, ResultStatus, RunInfo, RunReport, RunResult, RunSettings,
    RunStatus,
};
use crate::storage::ResultStore;
use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tokio::time::{timeout, Duration};

/// Cooperative stop flag. Checked between attempts, never mid-statement.
#[derive(Clone)]
pub struct StopSignal(watch::Receiver<bool>);

impl StopSignal {
    pub fn new() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self(rx))
    }

    /// A signal that never fires.
    pub fn never() -> Self {
        Self::new().1
    }

    pub fn is_stopped(&self) -> bool {
        *self.0.borrow()
    }
}

pub struct Runner {
    pub settings: RunSettings,
    pub stores: Vec<Arc<dyn ResultStore>>,
}

/// Mutable state of one run session; owned by `run` and turned into the report.
struct Session {
    run_id: String,
    results: Vec<RunResult>,
    last_ts: DateTime<Utc>,
    failed_attempts: u32,
    persistence_failures: u32,
}

impl Session {
    /// Completion timestamp, clamped so the sequence never goes backwards.
    fn stamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now().max(self.last_ts);
        self.last_ts = now;
        now
    }
}

/// Everything an attempt needs to know about its query definition.
struct Target<'a> {
    def: &'a QueryDefinition,
    repetitions: u32,
    table: Option<String>,
    row_count: Option<i64>,
    notes: Vec<String>,
}

impl Runner {
    pub fn new(settings: RunSettings) -> Self {
        Self {
            settings,
            stores: Vec::new(),
        }
    }

    /// Runner configured with the catalog's own settings.
    pub fn for_catalog(catalog: &Catalog) -> Self {
        Self::new(catalog.settings.clone())
    }

    pub fn with_store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.stores.push(store);
        self
    }

    /// Execute the whole battery in catalog order, each query's repetitions
    /// back to back. Never fails: fatal conditions end the battery and are
    /// reported in [`RunReport::fatal`] alongside every result collected so far.
    pub async fn run(
        &self,
        catalog: &Catalog,
        exec: &dyn QueryExecutor,
        stop: &StopSignal,
    ) -> RunReport {
        let started_at = Utc::now();
        let info = RunInfo {
            run_id: new_run_id(&catalog.suite, started_at),
            suite: catalog.suite.clone(),
            started_at,
            settings: self.settings.clone(),
        };
        let mut session = Session {
            run_id: info.run_id.clone(),
            results: Vec::with_capacity(catalog.total_attempts() as usize),
            last_ts: started_at,
            failed_attempts: 0,
            persistence_failures: 0,
        };

        tracing::info!(
            run_id = %info.run_id,
            suite = %info.suite,
            queries = catalog.queries.len(),
            capture_plan = self.settings.capture_plan,
            "run started"
        );

        for store in &self.stores {
            if let Err(e) = store.begin(&info).await {
                tracing::warn!(store = store.name(), error = %e, "failed to register run");
                session.persistence_failures += 1;
            }
        }

        let mut fatal: Option<String> = None;
        let mut interrupted = false;

        'battery: for def in &catalog.queries {
            if stop.is_stopped() {
                interrupted = true;
                break;
            }
            if exec.is_closed() {
                fatal = Some(format!("connection closed before query '{}'", def.name));
                break;
            }

            let mut target = Target {
                def,
                repetitions: self.settings.repetitions_for(def),
                // Statistics queries span all tables; don't pin them to the default one.
                table: def.table.clone().or_else(|| match def.kind {
                    QueryKind::Benchmark => self.settings.default_table.clone(),
                    QueryKind::Diagnostic => None,
                }),
                row_count: None,
                notes: def.notes.iter().cloned().collect(),
            };

            if let Some(table) = &target.table {
                match exec.row_count(table, self.settings.row_count).await {
                    Ok(count) => target.row_count = count,
                    Err(e) if e.is_fatal() => {
                        fatal = Some(e.to_string());
                        break;
                    }
                    Err(e) => {
                        tracing::warn!(table = %table, error = %e, "row count unavailable");
                        target.notes.push(format!("row count unavailable: {}", e));
                    }
                }
            }

            for attempt in 1..=target.repetitions {
                if stop.is_stopped() {
                    interrupted = true;
                    break 'battery;
                }
                if exec.is_closed() {
                    fatal = Some(format!(
                        "connection closed before '{}' attempt {}",
                        def.name, attempt
                    ));
                    break 'battery;
                }

                match self.attempt(exec, &target, attempt, &mut session).await {
                    Ok(result) => self.record(result, &mut session).await,
                    Err(e) => {
                        tracing::error!(query = %def.name, attempt, error = %e, "connection lost");
                        fatal = Some(e.to_string());
                        break 'battery;
                    }
                }
            }
        }

        let mut report = RunReport {
            run_id: info.run_id.clone(),
            suite: info.suite.clone(),
            started_at,
            finished_at: Utc::now().max(session.last_ts),
            status: RunStatus::Running,
            results: Vec::new(),
            fatal,
            persistence_failures: session.persistence_failures,
        };
        report.status = decide_status(
            report.fatal.is_some(),
            interrupted,
            session.failed_attempts,
            session.persistence_failures,
        );
        report.results = session.results;

        for store in &self.stores {
            if let Err(e) = store.finish(&report).await {
                tracing::warn!(store = store.name(), error = %e, "failed to finalize run");
                report.add_persistence_failures(1);
            }
        }

        tracing::info!(
            run_id = %report.run_id,
            status = report.status.as_str(),
            results = report.results.len(),
            failed = session.failed_attempts,
            persistence_failures = report.persistence_failures,
            "run finished"
        );
        report
    }

    /// One measured attempt. `Err` only for a lost connection; every other
    /// failure comes back as a failed [`RunResult`].
    async fn attempt(
        &self,
        exec: &dyn QueryExecutor,
        target: &Target<'_>,
        attempt: u32,
        session: &mut Session,
    ) -> Result<RunResult, ExecError> {
        let def = target.def;
        let capture_plan = def.capture_plan.unwrap_or(self.settings.capture_plan);

        let start = Instant::now();
        let executed = self
            .bounded(exec, exec.execute(&def.sql, &def.params))
            .await;
        let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

        let mut notes = target.notes.clone();
        notes.push(format!("iteration {}/{}", attempt, target.repetitions));

        let mut result = RunResult {
            run_id: session.run_id.clone(),
            query_name: def.name.clone(),
            attempt,
            repetitions: target.repetitions,
            kind: def.kind,
            table_name: target.table.clone(),
            row_count: target.row_count,
            returned_rows: None,
            execution_time_ms: elapsed_ms,
            planning_time_ms: None,
            server_execution_ms: None,
            buffers_hit: None,
            buffers_read: None,
            timestamp: session.last_ts,
            status: ResultStatus::Ok,
            error: None,
            notes: String::new(),
            plan: None,
        };

        match executed {
            Ok(execution) => result.returned_rows = Some(execution.returned_rows),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => mark_failed(&mut result, e.to_string()),
        }

        if capture_plan && result.is_ok() {
            match self.bounded(exec, exec.explain(&def.sql, &def.params)).await {
                Ok(doc) => match PlanStats::from_explain(&doc) {
                    Ok(stats) => {
                        result.planning_time_ms = Some(stats.planning_time_ms);
                        result.server_execution_ms = Some(stats.execution_time_ms);
                        result.buffers_hit = Some(stats.shared_hit_blocks);
                        result.buffers_read = Some(stats.shared_read_blocks);
                        if self.settings.keep_plans {
                            result.plan = Some(doc);
                        }
                    }
                    Err(msg) => mark_failed(&mut result, format!("unreadable plan: {}", msg)),
                },
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => mark_failed(&mut result, format!("plan capture failed: {}", e)),
            }
        }

        if !result.is_ok() {
            session.failed_attempts += 1;
        }
        result.notes = notes.join("; ");
        result.timestamp = session.stamp();

        match &result.error {
            None => tracing::info!(
                query = %def.name,
                attempt,
                repetitions = target.repetitions,
                execution_ms = format!("{:.2}", result.execution_time_ms),
                planning_ms = ?result.planning_time_ms,
                buffers_hit = ?result.buffers_hit,
                buffers_read = ?result.buffers_read,
                "attempt finished"
            ),
            Some(err) => tracing::warn!(
                query = %def.name,
                attempt,
                repetitions = target.repetitions,
                error = %err,
                "attempt failed"
            ),
        }

        Ok(result)
    }

    /// Apply the per-query time budget. On overrun the server-side statement
    /// is cancelled and the session settled before the next attempt starts,
    /// so a late cancel cannot hit the following statement.
    async fn bounded<T, F>(&self, exec: &dyn QueryExecutor, fut: F) -> Result<T, ExecError>
    where
        F: Future<Output = Result<T, ExecError>>,
    {
        let Some(ms) = self.settings.timeout_ms else {
            return fut.await;
        };
        let budget = Duration::from_millis(ms);
        match timeout(budget, fut).await {
            Ok(r) => r,
            Err(_) => {
                if let Err(e) = exec.cancel().await {
                    tracing::warn!(error = %e, "failed to cancel timed out statement");
                }
                match timeout(budget, exec.settle()).await {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) if e.is_fatal() => return Err(e),
                    Ok(Err(e)) => tracing::warn!(error = %e, "session did not settle after cancel"),
                    Err(_) => tracing::warn!(timeout_ms = ms, "session still busy after cancel"),
                }
                Err(ExecError::Timeout(ms))
            }
        }
    }

    async fn record(&self, result: RunResult, session: &mut Session) {
        for store in &self.stores {
            if let Err(e) = store.append(&result).await {
                tracing::warn!(
                    store = store.name(),
                    query = %result.query_name,
                    attempt = result.attempt,
                    error = %e,
                    "failed to persist run result"
                );
                session.persistence_failures += 1;
            }
        }
        session.results.push(result);
    }
}

fn mark_failed(result: &mut RunResult, message: String) {
    result.status = ResultStatus::Failed;
    result.error = Some(if message.trim().is_empty() {
        "unknown error".into()
    } else {
        message
    });
}

pub fn decide_status(
    fatal: bool,
    interrupted: bool,
    failed_attempts: u32,
    persistence_failures: u32,
) -> RunStatus {
    if fatal {
        RunStatus::Aborted
    } else if interrupted {
        RunStatus::Interrupted
    } else if failed_attempts > 0 || persistence_failures > 0 {
        RunStatus::Degraded
    } else {
        RunStatus::Complete
    }
}

static RUN_SEQ: AtomicU32 = AtomicU32::new(0);

/// Sortable by start time; the pid and sequence keep ids unique when two
/// runs start within the same millisecond.
fn new_run_id(suite: &str, at: DateTime<Utc>) -> String {
    let slug: String = suite
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect();
    format!(
        "{}-{}-{:x}.{}",
        at.format("%Y%m%dT%H%M%S%.3fZ"),
        slug,
        std::process::id(),
        RUN_SEQ.fetch_add(1, Ordering::Relaxed)
    )
}
