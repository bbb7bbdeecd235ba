use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::usage::UsageSnapshot;

/// File written for widgets and scripts that read usage without the engine
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportedSnapshot {
    pub exported_at: String,
    pub usage: UsageSnapshot,
}

pub fn write_snapshot(path: &Path, usage: &UsageSnapshot) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).context("Failed to create snapshot export directory")?;
    }

    let export = ExportedSnapshot {
        exported_at: Utc::now().to_rfc3339(),
        usage: usage.clone(),
    };

    let payload =
        serde_json::to_string_pretty(&export).context("Failed to serialize usage snapshot")?;

    // Write beside the target and rename so readers never see a partial file
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, payload).context("Failed to write usage snapshot")?;
    fs::rename(&tmp_path, path).context("Failed to move usage snapshot into place")?;
    Ok(())
}

pub fn read_snapshot(path: &Path) -> Option<ExportedSnapshot> {
    let contents = fs::read_to_string(path).ok()?;
    serde_json::from_str(&contents).ok()
}
