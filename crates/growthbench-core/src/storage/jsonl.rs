use super::ResultStore;
use crate::model::RunResult;
use anyhow::Context;
use async_trait::async_trait;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

/// One JSON object per line, including the plan when it was kept.
pub struct JsonlStore {
    file: Mutex<File>,
}

impl JsonlStore {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("failed to open jsonl output {}", path.display()))?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

#[async_trait]
impl ResultStore for JsonlStore {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn append(&self, result: &RunResult) -> anyhow::Result<()> {
        let mut line = serde_json::to_string(result)?;
        line.push('\n');
        let mut f = self
            .file
            .lock()
            .map_err(|_| anyhow::anyhow!("jsonl file mutex poisoned"))?;
        f.write_all(line.as_bytes())?;
        f.flush()?;
        Ok(())
    }
}
