use crate::model::{QueryKind, RunReport, RunStatus};
use crate::stats::QuerySummary;

pub fn print_summary(report: &RunReport, summaries: &[QuerySummary]) {
    eprintln!(
        "\nRun {} ({}): {} results",
        report.run_id,
        report.suite,
        report.results.len()
    );

    for s in summaries {
        let label = match s.kind {
            QueryKind::Benchmark => s.query_name.clone(),
            QueryKind::Diagnostic => format!("{} [diag]", s.query_name),
        };
        let rows = s
            .row_count
            .map(|n| format!("  rows≈{}", n))
            .unwrap_or_default();

        match (s.failures, s.mean_ms) {
            (0, Some(mean)) => {
                let spread = match (s.min_ms, s.max_ms) {
                    (Some(min), Some(max)) if s.successes > 1 => {
                        let sd = s.stddev_ms.unwrap_or(0.0);
                        format!(" (min {:.2}, max {:.2}, σ {:.2})", min, max, sd)
                    }
                    _ => String::new(),
                };
                let plan = s
                    .mean_planning_ms
                    .map(|p| format!("  plan {:.2} ms", p))
                    .unwrap_or_default();
                let hit = s
                    .avg_buffer_hit_ratio
                    .map(|h| format!("  hit {:.1}%", h))
                    .unwrap_or_default();
                eprintln!(
                    "✅ {:<28} {:>10.2} ms{}{}{}{}",
                    label, mean, spread, plan, hit, rows
                );
            }
            (failures, Some(mean)) => {
                eprintln!(
                    "⚠️  {:<28} {:>10.2} ms  {}/{} attempts failed{}",
                    label, mean, failures, s.attempts, rows
                );
                if let Some(err) = &s.last_error {
                    eprintln!("      → {}", err);
                }
            }
            (_, None) => {
                eprintln!("❌ {:<28} FAILED ({} attempts)", label, s.attempts);
                if let Some(err) = &s.last_error {
                    eprintln!("      → {}", err);
                }
            }
        }
    }

    if let Some(fatal) = &report.fatal {
        eprintln!("💥 run aborted: {}", fatal);
    }
    if report.persistence_failures > 0 {
        eprintln!(
            "⚠️  {} result(s) could not be persisted",
            report.persistence_failures
        );
    }

    let ok = report.succeeded().count();
    let failed = report.failed().count();
    eprintln!("\n{}", "━".repeat(40));
    eprintln!(
        "Summary: {} ok, {} failed, status {}{}",
        ok,
        failed,
        report.status.as_str(),
        match report.status {
            RunStatus::Interrupted => " (stopped by signal)",
            _ => "",
        }
    );
}
