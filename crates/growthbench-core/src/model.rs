use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Catalog {
    #[serde(default, rename = "catalogVersion", alias = "version")]
    pub version: u32,
    #[serde(default = "default_suite")]
    pub suite: String,
    #[serde(default, skip_serializing_if = "is_default_settings")]
    pub settings: RunSettings,
    pub queries: Vec<QueryDefinition>,
}

impl Catalog {
    pub fn repetitions_for(&self, q: &QueryDefinition) -> u32 {
        self.settings.repetitions_for(q)
    }

    pub fn total_attempts(&self) -> u64 {
        self.queries
            .iter()
            .map(|q| self.repetitions_for(q) as u64)
            .sum()
    }
}

fn default_suite() -> String {
    "default".into()
}

fn is_default_settings(s: &RunSettings) -> bool {
    s == &RunSettings::default()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunSettings {
    #[serde(default = "default_repetitions")]
    pub repetitions: u32,
    #[serde(default = "default_true")]
    pub capture_plan: bool,
    #[serde(default)]
    pub keep_plans: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(default)]
    pub row_count: RowCountMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_table: Option<String>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            repetitions: default_repetitions(),
            capture_plan: true,
            keep_plans: false,
            timeout_ms: None,
            row_count: RowCountMode::default(),
            default_table: None,
        }
    }
}

impl RunSettings {
    /// Repetitions actually used for `q`: its own value wins over the settings default.
    pub fn repetitions_for(&self, q: &QueryDefinition) -> u32 {
        q.repetitions.unwrap_or(self.repetitions).max(1)
    }
}

fn default_repetitions() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

/// How the "row count at time of run" is obtained for a query's target table.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RowCountMode {
    /// `SELECT count(*)`; exact but a full scan on large tables.
    Exact,
    /// `pg_class.reltuples` as maintained by ANALYZE/autovacuum.
    #[default]
    Estimate,
    Off,
}

impl RowCountMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "exact" => Some(RowCountMode::Exact),
            "estimate" => Some(RowCountMode::Estimate),
            "off" => Some(RowCountMode::Off),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    /// Timed workload query against the data tables.
    #[default]
    Benchmark,
    /// Read-only introspection of the statistics views.
    Diagnostic,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Benchmark => "benchmark",
            QueryKind::Diagnostic => "diagnostic",
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryDefinition {
    pub name: String,
    pub sql: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub params: Vec<BindValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repetitions: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub kind: QueryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture_plan: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

impl QueryDefinition {
    pub fn new(name: impl Into<String>, sql: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sql: sql.into(),
            ..Default::default()
        }
    }

    pub fn with_params(mut self, params: Vec<BindValue>) -> Self {
        self.params = params;
        self
    }

    pub fn with_repetitions(mut self, n: u32) -> Self {
        self.repetitions = Some(n);
        self
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = Some(table.into());
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    pub fn diagnostic(mut self) -> Self {
        self.kind = QueryKind::Diagnostic;
        self.capture_plan = Some(false);
        self
    }
}

/// A bind parameter value. Kept next to the SQL template and handed to the
/// driver as a typed parameter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum BindValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl std::fmt::Display for BindValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BindValue::Null => write!(f, "NULL"),
            BindValue::Bool(b) => write!(f, "{}", b),
            BindValue::Int(i) => write!(f, "{}", i),
            BindValue::Float(x) => write!(f, "{}", x),
            BindValue::Text(s) => write!(f, "'{}'", s),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ResultStatus {
    Ok,
    Failed,
}

impl ResultStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultStatus::Ok => "ok",
            ResultStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "ok" => ResultStatus::Ok,
            _ => ResultStatus::Failed,
        }
    }
}

/// One measured attempt of one query definition. Never mutated once appended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    pub run_id: String,
    pub query_name: String,
    pub attempt: u32,
    pub repetitions: u32,
    pub kind: QueryKind,
    pub table_name: Option<String>,
    pub row_count: Option<i64>,
    pub returned_rows: Option<u64>,
    pub execution_time_ms: f64,
    pub planning_time_ms: Option<f64>,
    pub server_execution_ms: Option<f64>,
    pub buffers_hit: Option<i64>,
    pub buffers_read: Option<i64>,
    pub timestamp: DateTime<Utc>,
    pub status: ResultStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<serde_json::Value>,
}

impl RunResult {
    pub fn is_ok(&self) -> bool {
        self.status == ResultStatus::Ok
    }

    pub fn buffer_hit_ratio(&self) -> Option<f64> {
        match (self.buffers_hit, self.buffers_read) {
            (Some(hit), Some(read)) => Some(crate::explain::buffer_hit_ratio(hit, read)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Running,
    /// Every attempt succeeded and was persisted.
    Complete,
    /// Finished, but with failed attempts or persistence failures.
    Degraded,
    /// The connection was lost; the remaining battery was skipped.
    Aborted,
    /// A stop signal ended the battery early.
    Interrupted,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Complete => "complete",
            RunStatus::Degraded => "degraded",
            RunStatus::Aborted => "aborted",
            RunStatus::Interrupted => "interrupted",
        }
    }
}

/// Identity of a run session, handed to stores before anything executes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunInfo {
    pub run_id: String,
    pub suite: String,
    pub started_at: DateTime<Utc>,
    pub settings: RunSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub suite: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub status: RunStatus,
    pub results: Vec<RunResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fatal: Option<String>,
    pub persistence_failures: u32,
}

impl RunReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &RunResult> {
        self.results.iter().filter(|r| r.is_ok())
    }

    pub fn failed(&self) -> impl Iterator<Item = &RunResult> {
        self.results.iter().filter(|r| !r.is_ok())
    }

    /// Count sink failures that happened outside the runner (opening a store,
    /// writing the report file). A complete run becomes degraded.
    pub fn add_persistence_failures(&mut self, n: u32) {
        self.persistence_failures += n;
        if self.persistence_failures > 0 && self.status == RunStatus::Complete {
            self.status = RunStatus::Degraded;
        }
    }
}
