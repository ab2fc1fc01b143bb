//! Pipeline output directories under the pipelines root.
//!
//! The pipeline tool writes one directory per run, named after the config
//! stem and the launch date (`myRun_2024Jan5`). A run directory holds a
//! `MASTER_*.properties` copy of its config and, once finished, a
//! `biolockjComplete` flag file.

use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::Serialize;
use walkdir::WalkDir;

use crate::document::stem;

pub const COMPLETE_FLAG: &str = "biolockjComplete";
pub const MASTER_PREFIX: &str = "MASTER_";
pub const DESCRIPTION_PARAM: &str = "pipeline.description";
pub const EMPTY_DESCRIPTION: &str = "Project description is empty";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineRun {
    pub name: String,
    pub description: String,
    pub master_config: PathBuf,
    pub complete: bool,
}

/// `<stem>_<YYYY><Mon><D>`, the directory name the tool picks for a run.
pub fn project_dir_name(config_name: &str, date: NaiveDate) -> String {
    format!("{}_{}", stem(config_name), date.format("%Y%b%-d"))
}

pub fn project_dir(root: &Path, config_name: &str, date: NaiveDate) -> PathBuf {
    root.join(project_dir_name(config_name, date))
}

/// Every run directory under `root`, sorted by name. A missing root has no runs.
///
/// Only an unreadable root is an error. A run that cannot be read is skipped.
pub fn list_runs(root: &Path) -> std::io::Result<Vec<PipelineRun>> {
    if !root.exists() {
        return Ok(Vec::new());
    }
    std::fs::read_dir(root)?;

    let mut runs = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(1).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping unreadable pipeline entry");
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }
        match read_run(entry.path()) {
            Ok(Some(run)) => runs.push(run),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(
                    path = %entry.path().display(),
                    error = %e,
                    "Skipping unreadable pipeline run"
                );
            }
        }
    }
    Ok(runs)
}

fn read_run(dir: &Path) -> std::io::Result<Option<PipelineRun>> {
    let mut master = None;
    let mut complete = false;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let file_name = entry.file_name();
        let Some(file_name) = file_name.to_str() else {
            continue;
        };
        if file_name == COMPLETE_FLAG {
            complete = true;
        } else if file_name.starts_with(MASTER_PREFIX) && file_name.ends_with(".properties") {
            master = Some(entry.path());
        }
    }

    let Some(master_config) = master else {
        return Ok(None);
    };
    let bytes = std::fs::read(&master_config)?;
    let text = String::from_utf8_lossy(&bytes);
    let description = text
        .lines()
        .find_map(|line| line.strip_prefix(DESCRIPTION_PARAM)?.strip_prefix('='))
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .unwrap_or(EMPTY_DESCRIPTION)
        .to_string();

    Ok(Some(PipelineRun {
        name: dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default(),
        description,
        master_config,
        complete,
    }))
}
