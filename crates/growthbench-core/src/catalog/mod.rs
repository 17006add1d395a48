use crate::errors::CatalogError;
use crate::model::{Catalog, QueryDefinition};
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use std::sync::OnceLock;

pub mod builtin;
pub mod sql_file;

pub const SUPPORTED_CATALOG_VERSION: u32 = 1;

/// Load a catalog from disk. `.sql` files use the `-- Query <name>` block
/// format; everything else is parsed as a YAML catalog document.
pub fn load_catalog(path: &Path, strict: bool) -> Result<Catalog, CatalogError> {
    let raw = std::fs::read_to_string(path).map_err(|e| CatalogError::Read {
        path: path.display().to_string(),
        source: e,
    })?;

    let is_sql = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("sql"));

    let catalog = if is_sql {
        let suite = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("default")
            .to_string();
        sql_file::parse(&raw, &suite)
    } else {
        parse_yaml(&raw, &path.display().to_string(), strict)?
    };

    validate(&catalog)?;
    tracing::debug!(
        catalog = %path.display(),
        suite = %catalog.suite,
        queries = catalog.queries.len(),
        "catalog loaded"
    );
    Ok(catalog)
}

pub fn parse_yaml(raw: &str, origin: &str, strict: bool) -> Result<Catalog, CatalogError> {
    let mut ignored_keys = Vec::new();
    let deserializer = serde_yaml::Deserializer::from_str(raw);

    let mut cat: Catalog = serde_ignored::deserialize(deserializer, |path| {
        ignored_keys.push(path.to_string());
    })
    .map_err(|e| CatalogError::Parse {
        path: origin.to_string(),
        message: e.to_string(),
    })?;

    // anchors and extension keys are allowed to ride along
    let meaningful: Vec<String> = ignored_keys
        .into_iter()
        .filter(|k| !k.starts_with('_') && !k.starts_with("x-") && k != "definitions")
        .collect();
    if !meaningful.is_empty() {
        if strict {
            return Err(CatalogError::UnknownFields {
                path: origin.to_string(),
                fields: meaningful,
            });
        }
        tracing::warn!(catalog = %origin, fields = ?meaningful, "ignored unknown catalog fields");
    }

    if cat.version == 0 {
        cat.version = SUPPORTED_CATALOG_VERSION;
    }
    if cat.version != SUPPORTED_CATALOG_VERSION {
        return Err(CatalogError::UnsupportedVersion {
            found: cat.version,
            supported: SUPPORTED_CATALOG_VERSION,
        });
    }
    Ok(cat)
}

pub fn validate(cat: &Catalog) -> Result<(), CatalogError> {
    if cat.queries.is_empty() {
        return Err(CatalogError::Empty);
    }
    if cat.settings.repetitions == 0 {
        return Err(CatalogError::InvalidQuery {
            query: "<settings>".into(),
            reason: "repetitions must be at least 1".into(),
        });
    }
    if let Some(t) = &cat.settings.default_table {
        crate::db::quote_ident(t)?;
    }

    let mut seen = HashSet::new();
    for q in &cat.queries {
        validate_query(q)?;
        if !seen.insert(q.name.as_str()) {
            return Err(CatalogError::DuplicateName(q.name.clone()));
        }
    }
    Ok(())
}

fn validate_query(q: &QueryDefinition) -> Result<(), CatalogError> {
    let invalid = |reason: String| CatalogError::InvalidQuery {
        query: if q.name.is_empty() {
            "<unnamed>".into()
        } else {
            q.name.clone()
        },
        reason,
    };

    if q.name.trim().is_empty() {
        return Err(invalid("name is empty".into()));
    }
    if q.sql.trim().is_empty() {
        return Err(invalid("sql is empty".into()));
    }
    if q.repetitions == Some(0) {
        return Err(invalid("repetitions must be at least 1".into()));
    }
    if let Some(t) = &q.table {
        crate::db::quote_ident(t)?;
    }

    let expected = max_placeholder(&q.sql);
    if expected != q.params.len() {
        return Err(invalid(format!(
            "sql references {} parameter(s) but {} bind value(s) given",
            expected,
            q.params.len()
        )));
    }
    Ok(())
}

/// Highest `$N` placeholder referenced by `sql` (0 when none).
pub fn max_placeholder(sql: &str) -> usize {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"\$(\d+)").expect("static regex"));
    re.captures_iter(sql)
        .filter_map(|c| c.get(1)?.as_str().parse::<usize>().ok())
        .max()
        .unwrap_or(0)
}

pub fn write_sample_catalog(path: &Path) -> anyhow::Result<()> {
    std::fs::write(path, SAMPLE_CATALOG)?;
    Ok(())
}

pub const SAMPLE_CATALOG: &str = r#"version: 1
suite: events-growth
settings:
  repetitions: 3
  capture_plan: true
  timeout_ms: 60000
  row_count: estimate
  default_table: events
queries:
  - name: point_lookup
    tags: ["point-lookup"]
    sql: |
      SELECT * FROM events
      WHERE user_id = $1::bigint AND event_time >= NOW() - INTERVAL '7 days'
      ORDER BY event_time DESC LIMIT 100
    params: [12345]
  - name: hourly_aggregation
    tags: ["aggregation"]
    repetitions: 1
    sql: |
      SELECT event_type, DATE_TRUNC('hour', event_time) AS hour, COUNT(*) AS event_count
      FROM events
      WHERE event_time >= NOW() - INTERVAL '24 hours'
      GROUP BY event_type, hour
      ORDER BY hour DESC
  - name: index_usage
    kind: diagnostic
    capture_plan: false
    repetitions: 1
    sql: |
      SELECT relname, indexrelname, idx_scan, idx_tup_read, idx_tup_fetch
      FROM pg_stat_user_indexes
      ORDER BY idx_scan DESC
"#;
