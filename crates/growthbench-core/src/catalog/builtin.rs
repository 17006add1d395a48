//! Query batteries that ship with the binary.

use crate::db::quote_ident;
use crate::errors::CatalogError;
use crate::model::{BindValue, Catalog, QueryDefinition, RunSettings};

pub const DEFAULT_TABLE: &str = "events";

/// The workload battery against an events-shaped table
/// (`user_id`, `event_type`, `event_time`, `product_id`, `revenue`).
pub fn builtin_battery(table: &str) -> Result<Catalog, CatalogError> {
    let t = quote_ident(table)?;

    let queries = vec![
        QueryDefinition::new(
            "recent_user_events",
            format!(
                "SELECT * FROM {t}
WHERE user_id = $1::bigint AND event_time >= NOW() - ($2::bigint * INTERVAL '1 day')
ORDER BY event_time DESC LIMIT 100"
            ),
        )
        .with_params(vec![BindValue::Int(12345), BindValue::Int(7)])
        .with_tags(&["point-lookup"]),
        QueryDefinition::new(
            "hourly_aggregation",
            format!(
                "SELECT event_type, DATE_TRUNC('hour', event_time) AS hour, COUNT(*) AS event_count
FROM {t}
WHERE event_time >= NOW() - ($1::bigint * INTERVAL '1 hour')
GROUP BY event_type, hour
ORDER BY hour DESC"
            ),
        )
        .with_params(vec![BindValue::Int(24)])
        .with_tags(&["aggregation"]),
        QueryDefinition::new(
            "revenue_by_product",
            format!(
                "SELECT product_id, COUNT(*) AS purchase_count, SUM(revenue) AS total_revenue
FROM {t}
WHERE event_type = $1::text AND event_time >= NOW() - ($2::bigint * INTERVAL '1 day')
  AND product_id IS NOT NULL
GROUP BY product_id
ORDER BY total_revenue DESC LIMIT 50"
            ),
        )
        .with_params(vec![BindValue::Text("purchase".into()), BindValue::Int(30)])
        .with_tags(&["aggregation", "top-n"]),
        QueryDefinition::new(
            "count_recent_events",
            format!(
                "SELECT COUNT(*) FROM {t}
WHERE event_time >= NOW() - ($1::bigint * INTERVAL '1 day')"
            ),
        )
        .with_params(vec![BindValue::Int(7)])
        .with_tags(&["range-scan"]),
    ];

    Ok(Catalog {
        version: super::SUPPORTED_CATALOG_VERSION,
        suite: format!("builtin-{}", table),
        settings: RunSettings {
            repetitions: 3,
            default_table: Some(table.to_string()),
            ..Default::default()
        },
        queries,
    })
}

/// Read-only statistics queries. They carry no target table and skip plan capture.
pub fn builtin_diagnostics() -> Vec<QueryDefinition> {
    vec![
        QueryDefinition::new(
            "diag_index_usage",
            "SELECT schemaname, relname, indexrelname, idx_scan, idx_tup_read, idx_tup_fetch,
       pg_size_pretty(pg_relation_size(indexrelid)) AS index_size
FROM pg_stat_user_indexes
ORDER BY idx_scan DESC",
        )
        .with_tags(&["index-usage"])
        .diagnostic(),
        QueryDefinition::new(
            "diag_unused_indexes",
            "SELECT schemaname, relname, indexrelname, pg_relation_size(indexrelid) AS index_bytes
FROM pg_stat_user_indexes
WHERE idx_scan = 0
ORDER BY pg_relation_size(indexrelid) DESC",
        )
        .with_tags(&["index-usage"])
        .diagnostic(),
        QueryDefinition::new(
            "diag_table_activity",
            "SELECT schemaname, relname, seq_scan, seq_tup_read, idx_scan, idx_tup_fetch,
       n_live_tup, n_dead_tup, last_autovacuum, last_autoanalyze
FROM pg_stat_user_tables
ORDER BY n_live_tup DESC",
        )
        .with_tags(&["table-stats", "vacuum"])
        .diagnostic(),
        QueryDefinition::new(
            "diag_cache_hit_ratio",
            "SELECT relname, heap_blks_read, heap_blks_hit,
       ROUND(100.0 * heap_blks_hit / NULLIF(heap_blks_hit + heap_blks_read, 0), 2) AS heap_hit_pct,
       idx_blks_read, idx_blks_hit,
       ROUND(100.0 * idx_blks_hit / NULLIF(idx_blks_hit + idx_blks_read, 0), 2) AS idx_hit_pct
FROM pg_statio_user_tables
ORDER BY heap_blks_read DESC",
        )
        .with_tags(&["cache"])
        .diagnostic(),
        QueryDefinition::new(
            "diag_table_sizes",
            "SELECT c.oid::regclass AS relation,
       pg_total_relation_size(c.oid) AS total_bytes,
       pg_relation_size(c.oid) AS table_bytes,
       pg_indexes_size(c.oid) AS index_bytes
FROM pg_class c
JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE c.relkind IN ('r', 'p') AND n.nspname NOT IN ('pg_catalog', 'information_schema')
ORDER BY pg_total_relation_size(c.oid) DESC",
        )
        .with_tags(&["size"])
        .diagnostic(),
    ]
}
