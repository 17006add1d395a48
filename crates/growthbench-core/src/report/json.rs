use crate::model::RunReport;
use crate::stats::{summarize, QuerySummary};
use serde::Serialize;
use std::path::Path;

#[derive(Serialize)]
struct JsonReport<'a> {
    #[serde(flatten)]
    run: &'a RunReport,
    summaries: Vec<QuerySummary>,
}

pub fn write_json(report: &RunReport, out: &Path) -> anyhow::Result<()> {
    if let Some(parent) = out.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let doc = JsonReport {
        run: report,
        summaries: summarize(&report.results),
    };
    std::fs::write(out, serde_json::to_string_pretty(&doc)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RunStatus;
    use chrono::Utc;

    #[test]
    fn writes_report_with_summaries() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let out = dir.path().join("nested/report.json");
        let report = RunReport {
            run_id: "r1".into(),
            suite: "events".into(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            status: RunStatus::Aborted,
            results: vec![],
            fatal: Some("connection lost: reset".into()),
            persistence_failures: 0,
        };
        write_json(&report, &out)?;

        let v: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out)?)?;
        assert_eq!(v["run_id"], "r1");
        assert_eq!(v["status"], "aborted");
        assert_eq!(v["fatal"], "connection lost: reset");
        assert!(v["summaries"].as_array().is_some_and(|a| a.is_empty()));
        Ok(())
    }
}
