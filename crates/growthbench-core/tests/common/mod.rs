//! Scripted stand-in for a PostgreSQL session.

use async_trait::async_trait;
use growthbench_core::db::{Execution, QueryExecutor};
use growthbench_core::errors::ExecError;
use growthbench_core::model::{BindValue, RowCountMode};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;

#[derive(Clone)]
pub enum Behavior {
    Rows(u64),
    Fail(&'static str),
    Sleep(Duration),
    /// Drops the session while the statement runs.
    Disconnect,
}

#[derive(Default)]
pub struct FakeExecutor {
    behaviors: HashMap<String, Behavior>,
    /// Close the session once this many statements have executed.
    close_after: Option<usize>,
    /// Raise the stop flag while this statement (1-based) is executing.
    stop_during: Option<(usize, watch::Sender<bool>)>,
    executed: AtomicUsize,
    closed: AtomicBool,
    pub cancels: AtomicUsize,
    pub settles: AtomicUsize,
    pub row_counts: Mutex<Vec<String>>,
    pub log: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl FakeExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(mut self, sql: &str, behavior: Behavior) -> Self {
        self.behaviors.insert(sql.to_string(), behavior);
        self
    }

    pub fn close_after(mut self, statements: usize) -> Self {
        self.close_after = Some(statements);
        self
    }

    pub fn stop_during(mut self, statement: usize, tx: watch::Sender<bool>) -> Self {
        self.stop_during = Some((statement, tx));
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }
}

pub fn plan_doc(planning: f64, execution: f64, hit: i64, read: i64) -> serde_json::Value {
    serde_json::json!([{
        "Plan": {
            "Node Type": "Seq Scan",
            "Shared Hit Blocks": hit,
            "Shared Read Blocks": read,
            "Plans": [{"Node Type": "Index Scan", "Shared Hit Blocks": 1, "Shared Read Blocks": 1}]
        },
        "Planning Time": planning,
        "Execution Time": execution
    }])
}

#[async_trait]
impl QueryExecutor for FakeExecutor {
    async fn execute(&self, sql: &str, _params: &[BindValue]) -> Result<Execution, ExecError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ExecError::ConnectionLost("connection closed".into()));
        }
        self.log.lock().unwrap().push(sql.to_string());
        let n = self.executed.fetch_add(1, Ordering::SeqCst) + 1;
        if self.close_after.is_some_and(|limit| n >= limit) {
            self.closed.store(true, Ordering::SeqCst);
        }
        if let Some((at, tx)) = &self.stop_during {
            if *at == n {
                let _ = tx.send(true);
            }
        }

        match self.behaviors.get(sql).cloned().unwrap_or(Behavior::Rows(1)) {
            Behavior::Rows(n) => Ok(Execution { returned_rows: n }),
            Behavior::Fail(msg) => Err(ExecError::Query {
                message: msg.to_string(),
                sqlstate: Some("42601".into()),
            }),
            Behavior::Sleep(d) => {
                tokio::time::sleep(d).await;
                Ok(Execution { returned_rows: 0 })
            }
            Behavior::Disconnect => {
                self.closed.store(true, Ordering::SeqCst);
                Err(ExecError::ConnectionLost("server closed the connection unexpectedly".into()))
            }
        }
    }

    async fn explain(
        &self,
        sql: &str,
        _params: &[BindValue],
    ) -> Result<serde_json::Value, ExecError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ExecError::ConnectionLost("connection closed".into()));
        }
        match self.behaviors.get(sql) {
            Some(Behavior::Sleep(d)) => {
                tokio::time::sleep(*d).await;
                Ok(plan_doc(0.1, 0.1, 0, 0))
            }
            _ => Ok(plan_doc(0.25, 3.5, 90, 10)),
        }
    }

    async fn row_count(&self, table: &str, mode: RowCountMode) -> Result<Option<i64>, ExecError> {
        self.row_counts.lock().unwrap().push(table.to_string());
        Ok(match mode {
            RowCountMode::Off => None,
            _ => Some(1_000),
        })
    }

    async fn cancel(&self) -> Result<(), ExecError> {
        self.cancels.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn settle(&self) -> Result<(), ExecError> {
        self.settles.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}
