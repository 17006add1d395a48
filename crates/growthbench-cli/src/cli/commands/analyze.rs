use growthbench_core::analysis::{
    by_query, by_table, compare_tables, write_csv, Comparison, QueryAnalysis, TableAnalysis,
};
use growthbench_core::storage::csv::export_results;
use growthbench_core::storage::SqliteStore;
use serde_json::json;
use std::path::Path;

use super::exit_codes;
use crate::cli::args::AnalyzeArgs;

pub fn run(args: AnalyzeArgs) -> anyhow::Result<i32> {
    let (text, json_stdout, files) = match args.format.as_str() {
        "text" => (true, false, false),
        "json" => (false, true, false),
        "csv" => (false, false, true),
        "all" => (true, false, true),
        other => {
            eprintln!("config error: unknown format '{}' (text|json|csv|all)", other);
            return Ok(exit_codes::CONFIG_ERROR);
        }
    };
    if !args.db.exists() {
        eprintln!(
            "config error: no history at {} (run `growthbench run` first)",
            args.db.display()
        );
        return Ok(exit_codes::CONFIG_ERROR);
    }
    let store = SqliteStore::open(&args.db)?;
    store.init_schema()?;

    let tables = by_table(&store)?;
    let queries = by_query(&store, args.query.as_deref())?;
    let comparison = compare_tables(&store, &args.baseline_table, &args.candidate_table)?;

    let document = json!({
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "by_table": tables,
        "by_query": queries,
        "comparison": {
            "baseline": args.baseline_table,
            "candidate": args.candidate_table,
            "queries": comparison,
        },
    });

    if json_stdout {
        println!("{}", serde_json::to_string_pretty(&document)?);
    }
    if text {
        print_text(&args, &tables, &queries, &comparison);
    }
    if files || args.export_raw {
        std::fs::create_dir_all(&args.out_dir)?;
    }
    if files {
        let dir = &args.out_dir;
        if args.format == "all" {
            write_json(&dir.join("analysis.json"), &document)?;
        }
        for (name, written) in [
            ("table_analysis.csv", write_csv(&dir.join("table_analysis.csv"), &tables)?),
            ("query_analysis.csv", write_csv(&dir.join("query_analysis.csv"), &queries)?),
            (
                "comparison_analysis.csv",
                write_csv(&dir.join("comparison_analysis.csv"), &comparison)?,
            ),
        ] {
            if written {
                eprintln!("exported {}", dir.join(name).display());
            }
        }
    }
    if args.export_raw {
        let raw = store.fetch_results(args.query.as_deref())?;
        if raw.is_empty() {
            eprintln!("note: no recorded attempts to export");
        } else {
            let json_path = args.out_dir.join("raw_results.json");
            let csv_path = args.out_dir.join("raw_results.csv");
            write_json(&json_path, &serde_json::to_value(&raw)?)?;
            export_results(&csv_path, &raw)?;
            eprintln!(
                "exported {} attempts to {} and {}",
                raw.len(),
                json_path.display(),
                csv_path.display()
            );
        }
    }

    if tables.is_empty() {
        eprintln!("note: history is empty");
    }
    Ok(exit_codes::OK)
}

fn write_json(path: &Path, value: &serde_json::Value) -> anyhow::Result<()> {
    std::fs::write(path, serde_json::to_string_pretty(value)?)?;
    Ok(())
}

fn print_text(
    args: &AnalyzeArgs,
    tables: &[TableAnalysis],
    queries: &[QueryAnalysis],
    comparison: &[Comparison],
) {
    println!("PERFORMANCE BY TABLE");
    println!("{}", "-".repeat(72));
    for t in tables {
        println!("\nTable: {}", t.table_name);
        println!("  Tests Run: {}", t.test_count);
        println!(
            "  Execution: avg {:.2} ms, min {:.2} ms, max {:.2} ms",
            t.avg_execution_ms, t.min_execution_ms, t.max_execution_ms
        );
        if let (Some(hit), Some(read)) = (t.avg_buffers_hit, t.avg_buffers_read) {
            println!("  Buffers: avg {:.0} hit, {:.0} read", hit, read);
        }
    }

    println!("\n\nPERFORMANCE BY QUERY");
    println!("{}", "-".repeat(72));
    for q in queries {
        println!("\nQuery: {}", q.query_name);
        println!("  Executions: {}", q.execution_count);
        println!(
            "  Execution: avg {:.2} ms, min {:.2} ms, max {:.2} ms",
            q.avg_execution_ms, q.min_execution_ms, q.max_execution_ms
        );
        if let Some(sd) = q.stddev_execution_ms {
            println!("  Std Dev: {:.2} ms", sd);
        }
    }

    println!(
        "\n\n{} VS {}",
        args.baseline_table.to_uppercase(),
        args.candidate_table.to_uppercase()
    );
    println!("{}", "-".repeat(72));
    for c in comparison.iter().filter(|c| c.candidate_avg_ms.is_some()) {
        println!("\nQuery: {}", c.query_name);
        println!("  {}: {:.2} ms", args.baseline_table, c.baseline_avg_ms);
        if let Some(cand) = c.candidate_avg_ms {
            println!("  {}: {:.2} ms", args.candidate_table, cand);
        }
        if let Some(pct) = c.improvement_percent {
            println!("  Improvement: {:.2}%", pct);
        }
    }
}
