use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::dataset::Dataset;
use crate::workbook::{read_workbook, write_workbook};

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    saved_at: String,
    dataset: Dataset,
}

/// The persisted dataset: the workbook plus a typed JSON snapshot next to it
/// that spares re-parsing the sheet on the next run.
#[derive(Debug, Clone)]
pub struct DatasetStore {
    workbook_path: PathBuf,
    snapshot_path: PathBuf,
}

impl DatasetStore {
    /// `matches.xlsx` keeps its snapshot in `matches.json`.
    pub fn new(workbook_path: impl Into<PathBuf>) -> Self {
        let workbook_path = workbook_path.into();
        let snapshot_path = workbook_path.with_extension("json");
        Self {
            workbook_path,
            snapshot_path,
        }
    }

    pub fn workbook_path(&self) -> &Path {
        &self.workbook_path
    }

    pub fn snapshot_path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Read the whole stored dataset; nothing stored yet reads as empty.
    ///
    /// The workbook is the dataset. The snapshot is only used while it is at
    /// least as new as the workbook, so a workbook edited by hand or written
    /// by another tool is read directly. An unreadable file is an error rather
    /// than an empty dataset: an upsert on top of it would silently drop every
    /// other event.
    pub fn load(&self) -> Result<Dataset> {
        let workbook = modified_at(&self.workbook_path)?;
        let snapshot = modified_at(&self.snapshot_path)?;
        match (workbook, snapshot) {
            (None, None) => Ok(Dataset::default()),
            (Some(workbook), Some(snapshot)) if snapshot >= workbook => self.load_snapshot(),
            (None, Some(_)) => self.load_snapshot(),
            (Some(_), _) => {
                info!(path = %self.workbook_path.display(), "loading dataset from workbook");
                read_workbook(&self.workbook_path)
            }
        }
    }

    fn load_snapshot(&self) -> Result<Dataset> {
        let raw = fs::read_to_string(&self.snapshot_path)
            .with_context(|| format!("read {}", self.snapshot_path.display()))?;
        let snapshot = serde_json::from_str::<Snapshot>(&raw)
            .with_context(|| format!("parse {}", self.snapshot_path.display()))?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(anyhow!(
                "{} has snapshot version {}, expected {SNAPSHOT_VERSION}",
                self.snapshot_path.display(),
                snapshot.version
            ));
        }
        Ok(snapshot.dataset)
    }

    /// Overwrite the workbook and the snapshot. Both are staged as temporary
    /// siblings and renamed into place, workbook first. Temporaries never
    /// outlive a failed save, and a snapshot that could not be replaced is
    /// removed so the new workbook is what the next load reads.
    pub fn save(&self, dataset: &Dataset) -> Result<()> {
        if let Some(dir) = self.workbook_path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;
        }

        let workbook_tmp = tmp_sibling(&self.workbook_path);
        let snapshot_tmp = tmp_sibling(&self.snapshot_path);
        if let Err(err) = stage(dataset, &workbook_tmp, &snapshot_tmp) {
            remove_quietly(&workbook_tmp);
            remove_quietly(&snapshot_tmp);
            return Err(err);
        }

        if let Err(err) = fs::rename(&workbook_tmp, &self.workbook_path) {
            remove_quietly(&workbook_tmp);
            remove_quietly(&snapshot_tmp);
            return Err(err).with_context(|| format!("swap {}", self.workbook_path.display()));
        }
        if let Err(err) = fs::rename(&snapshot_tmp, &self.snapshot_path) {
            remove_quietly(&snapshot_tmp);
            remove_quietly(&self.snapshot_path);
            warn!(path = %self.snapshot_path.display(), error = %err, "snapshot not replaced");
            return Err(err).with_context(|| format!("swap {}", self.snapshot_path.display()));
        }

        info!(
            path = %self.workbook_path.display(),
            rows = dataset.len(),
            columns = dataset.columns.len(),
            "dataset written"
        );
        Ok(())
    }

    /// Event keys already stored, sorted.
    pub fn event_keys(&self) -> Result<Vec<String>> {
        Ok(self.load()?.event_keys())
    }
}

fn stage(dataset: &Dataset, workbook_tmp: &Path, snapshot_tmp: &Path) -> Result<()> {
    write_workbook(workbook_tmp, dataset)?;
    let snapshot = Snapshot {
        version: SNAPSHOT_VERSION,
        saved_at: Utc::now().to_rfc3339(),
        dataset: dataset.clone(),
    };
    let json = serde_json::to_string(&snapshot).context("serialize dataset snapshot")?;
    fs::write(snapshot_tmp, json).with_context(|| format!("write {}", snapshot_tmp.display()))
}

fn modified_at(path: &Path) -> Result<Option<SystemTime>> {
    match fs::metadata(path) {
        Ok(meta) => meta
            .modified()
            .map(Some)
            .with_context(|| format!("stat {}", path.display())),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err).with_context(|| format!("stat {}", path.display())),
    }
}

fn remove_quietly(path: &Path) {
    if path.is_file() {
        let _ = fs::remove_file(path);
    }
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
