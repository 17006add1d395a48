use growthbench_core::catalog::load_catalog;
use growthbench_core::model::Catalog;
use serde_json::json;

use super::exit_codes;
use crate::cli::args::ValidateArgs;

pub fn run(args: ValidateArgs) -> anyhow::Result<i32> {
    // load_catalog validates as part of loading
    match load_catalog(&args.catalog, args.strict) {
        Ok(cat) => {
            print_ok(&cat, &args.format);
            Ok(exit_codes::OK)
        }
        Err(e) => {
            if args.format == "json" {
                let output = json!({
                    "ok": false,
                    "catalog": args.catalog,
                    "errors": [e.to_string()],
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            } else {
                eprintln!("❌ {}", e);
            }
            Ok(exit_codes::CONFIG_ERROR)
        }
    }
}

fn print_ok(cat: &Catalog, format: &str) {
    if format == "json" {
        let queries: Vec<_> = cat
            .queries
            .iter()
            .map(|q| {
                json!({
                    "name": q.name,
                    "kind": q.kind.as_str(),
                    "repetitions": cat.repetitions_for(q),
                    "params": q.params.len(),
                    "table": q.table.as_ref().or(cat.settings.default_table.as_ref()),
                })
            })
            .collect();
        let output = json!({
            "ok": true,
            "suite": cat.suite,
            "total_attempts": cat.total_attempts(),
            "queries": queries,
            "errors": [],
        });
        println!("{}", serde_json::to_string_pretty(&output).unwrap_or_default());
        return;
    }

    eprintln!(
        "✅ catalog ok: suite {}, {} queries, {} attempts",
        cat.suite,
        cat.queries.len(),
        cat.total_attempts()
    );
    for q in &cat.queries {
        eprintln!(
            "   {:<28} {:<10} x{}",
            q.name,
            q.kind.as_str(),
            cat.repetitions_for(q)
        );
    }
}
