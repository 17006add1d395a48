pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS runs (
  id TEXT PRIMARY KEY,
  suite TEXT NOT NULL,
  started_at TEXT NOT NULL,
  finished_at TEXT,
  status TEXT NOT NULL,
  fatal TEXT,
  settings_json TEXT
);

CREATE TABLE IF NOT EXISTS results (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  run_id TEXT NOT NULL REFERENCES runs(id),
  query_name TEXT NOT NULL,
  attempt INTEGER NOT NULL,
  kind TEXT NOT NULL,
  table_name TEXT,
  row_count INTEGER,
  returned_rows INTEGER,
  execution_time_ms REAL NOT NULL,
  planning_time_ms REAL,
  server_execution_ms REAL,
  buffers_hit INTEGER,
  buffers_read INTEGER,
  recorded_at TEXT NOT NULL,
  status TEXT NOT NULL,
  error TEXT,
  notes TEXT
);

CREATE INDEX IF NOT EXISTS idx_results_run ON results(run_id);
CREATE INDEX IF NOT EXISTS idx_results_query ON results(query_name, table_name);
"#;

/// Table written by [`super::PgMetricsStore`] in the benchmarked database.
pub const PG_METRICS_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS performance_metrics (
  id BIGSERIAL PRIMARY KEY,
  test_name TEXT NOT NULL,
  table_name TEXT,
  row_count BIGINT,
  query TEXT,
  execution_time_ms NUMERIC(12, 3) NOT NULL,
  plan_time_ms NUMERIC(12, 3),
  buffers_hit BIGINT,
  buffers_read BIGINT,
  test_timestamp TIMESTAMPTZ NOT NULL DEFAULT now(),
  notes TEXT
)
"#;
