use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "growthbench",
    version,
    about = "Benchmark runner for PostgreSQL tables under high growth"
)]
pub struct Cli {
    /// Log output format: text|json (level comes from GROWTHBENCH_LOG)
    #[arg(long, global = true, default_value = "text", env = "GROWTHBENCH_LOG_FORMAT")]
    pub log_format: String,

    #[command(subcommand)]
    pub cmd: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Execute a query battery and record every attempt
    Run(RunArgs),
    /// Check a catalog without connecting to a database
    Validate(ValidateArgs),
    /// Write a sample catalog
    Init(InitArgs),
    /// Aggregate recorded history
    Analyze(AnalyzeArgs),
    Version,
}

#[derive(Parser, Clone, Debug)]
pub struct RunArgs {
    #[arg(long, short = 'd', env = "DATABASE_URL", hide_env_values = true)]
    pub database_url: String,

    /// Catalog file (.yaml or .sql); the built-in battery when omitted
    #[arg(long)]
    pub catalog: Option<PathBuf>,

    /// Target table for the built-in battery and for queries without their own table
    #[arg(long)]
    pub table: Option<String>,

    /// Append the built-in statistics queries
    #[arg(long)]
    pub with_diagnostics: bool,

    /// Default repetitions; queries that set their own keep them
    #[arg(long)]
    pub repetitions: Option<u32>,

    /// Skip EXPLAIN (ANALYZE, BUFFERS) capture
    #[arg(long, conflicts_with = "keep_plans")]
    pub no_plan: bool,

    /// Keep the JSON plan document on each result
    #[arg(long)]
    pub keep_plans: bool,

    #[arg(long)]
    pub timeout_ms: Option<u64>,

    /// exact|estimate|off
    #[arg(long)]
    pub row_count: Option<String>,

    /// Write the run report (results and summaries) as JSON
    #[arg(long)]
    pub output: Option<PathBuf>,

    #[arg(long, default_value = ".growthbench/history.db")]
    pub db: PathBuf,

    #[arg(long)]
    pub csv: Option<PathBuf>,

    #[arg(long)]
    pub jsonl: Option<PathBuf>,

    /// Also write results into performance_metrics in the benchmarked database
    #[arg(long)]
    pub pg_metrics: bool,

    /// Reject unknown catalog keys, and exit 1 on a degraded run
    #[arg(long)]
    pub strict: bool,
}

#[derive(Parser, Clone, Debug)]
pub struct ValidateArgs {
    #[arg(long, default_value = "growthbench.yaml")]
    pub catalog: PathBuf,

    /// Reject unknown catalog keys instead of warning
    #[arg(long)]
    pub strict: bool,

    #[arg(long, default_value = "text")]
    pub format: String, // text|json
}

#[derive(Parser, Clone, Debug)]
pub struct InitArgs {
    #[arg(long, default_value = "growthbench.yaml")]
    pub catalog: PathBuf,
}

#[derive(Parser, Clone, Debug)]
pub struct AnalyzeArgs {
    #[arg(long, default_value = ".growthbench/history.db")]
    pub db: PathBuf,

    #[arg(long, default_value = "events")]
    pub baseline_table: String,

    #[arg(long, default_value = "events_partitioned")]
    pub candidate_table: String,

    /// Limit the per-query section and the raw export to one query
    #[arg(long, alias = "test-name")]
    pub query: Option<String>,

    /// text|json on stdout, csv files in --out-dir, or all of them
    #[arg(long, default_value = "text")]
    pub format: String,

    /// Directory for csv and raw exports
    #[arg(long, default_value = ".growthbench/analysis")]
    pub out_dir: PathBuf,

    /// Also dump every recorded attempt to raw_results.json and raw_results.csv
    #[arg(long)]
    pub export_raw: bool,
}
