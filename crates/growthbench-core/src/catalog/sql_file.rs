//! Plain SQL catalogs: blocks introduced by a `-- Query <name>` comment line.
//!
//! Other comment lines are skipped, as are `EXPLAIN ...` lines so scripts
//! written for psql can be reused unchanged; the runner adds its own EXPLAIN.

use crate::model::{Catalog, QueryDefinition, RunSettings};

pub fn parse(content: &str, suite: &str) -> Catalog {
    let mut queries = Vec::new();
    let mut name: Option<String> = None;
    let mut body: Vec<&str> = Vec::new();

    for line in content.lines() {
        let line = line.trim();

        if line.starts_with("-- Query") {
            flush(&mut queries, name.take(), &mut body);
            name = Some(line.trim_start_matches("--").trim().to_string());
        } else if !line.is_empty() && !line.starts_with("--") && !starts_with_explain(line) {
            body.push(line);
        }
    }
    flush(&mut queries, name, &mut body);

    Catalog {
        version: super::SUPPORTED_CATALOG_VERSION,
        suite: suite.to_string(),
        settings: RunSettings::default(),
        queries,
    }
}

fn flush(out: &mut Vec<QueryDefinition>, name: Option<String>, body: &mut Vec<&str>) {
    if let Some(name) = name {
        if !body.is_empty() {
            out.push(QueryDefinition::new(name, body.join("\n")));
        }
    }
    body.clear();
}

fn starts_with_explain(line: &str) -> bool {
    line.get(..7)
        .is_some_and(|p| p.eq_ignore_ascii_case("explain"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCRIPT: &str = r#"
-- Diagnostic queries for the events table
-- Query 1: Recent user events
EXPLAIN (ANALYZE, BUFFERS)
SELECT * FROM events
WHERE user_id = 12345
ORDER BY event_time DESC LIMIT 100;

-- Query 2: Count
-- (this one is slow on big tables)
SELECT COUNT(*) FROM events;

-- Query 3: empty block is dropped
"#;

    #[test]
    fn splits_blocks_on_query_markers() {
        let cat = parse(SCRIPT, "events");
        assert_eq!(cat.queries.len(), 2);
        assert_eq!(cat.queries[0].name, "Query 1: Recent user events");
        assert_eq!(
            cat.queries[0].sql,
            "SELECT * FROM events\nWHERE user_id = 12345\nORDER BY event_time DESC LIMIT 100;"
        );
        assert_eq!(cat.queries[1].name, "Query 2: Count");
        assert_eq!(cat.queries[1].sql, "SELECT COUNT(*) FROM events;");
    }

    #[test]
    fn text_before_first_marker_is_ignored() {
        let cat = parse("SELECT 1;\n-- Query A\nSELECT 2;", "s");
        assert_eq!(cat.queries.len(), 1);
        assert_eq!(cat.queries[0].sql, "SELECT 2;");
    }

    #[test]
    fn lowercase_explain_is_dropped() {
        let cat = parse("-- Query A\nexplain analyze\nSELECT 2;", "s");
        assert_eq!(cat.queries[0].sql, "SELECT 2;");
    }
}
