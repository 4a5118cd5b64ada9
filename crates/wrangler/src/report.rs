//! JSON run report

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use wrangler_lib::{LabelSummary, LabelWeights, SourceShape};

#[derive(Debug, Clone, Copy, Serialize)]
pub struct Shape {
    pub rows: usize,
    pub columns: usize,
}

/// Summary of one wrangling run
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub inputs: Vec<SourceShape>,
    pub combined: Shape,
    pub output: PathBuf,
    pub randomize_nodes: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label_weights: Option<LabelWeights>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<LabelSummary>,
}

impl RunReport {
    pub fn write(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context("Failed to create report directory")?;
            }
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize report")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write report {}", path.display()))?;
        Ok(())
    }
}
