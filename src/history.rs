//! Local analysis history
//!
//! Stores finished analyses in `<data_dir>/tracelens/history.json`, newest
//! first, capped at a configurable number of entries. The pipeline never
//! touches this; the CLI appends after each run.

use crate::diagnose::{AnalysisResult, Language};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use uuid::Uuid;

/// One recorded analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub error_message: String,
    pub language: Language,
    pub analysis: AnalysisResult,
}

impl HistoryEntry {
    pub fn new(error_message: impl Into<String>, language: Language, analysis: AnalysisResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            error_message: error_message.into(),
            language,
            analysis,
        }
    }
}

/// File-backed history list
pub struct HistoryStore {
    path: PathBuf,
    limit: usize,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>, limit: usize) -> Self {
        Self {
            path: path.into(),
            limit: limit.max(1),
        }
    }

    /// History in the platform data directory
    pub fn open_default(limit: usize) -> Result<Self> {
        let dir = dirs::data_dir()
            .map(|p| p.join("tracelens"))
            .context("Could not determine data directory")?;
        Ok(Self::new(dir.join("history.json"), limit))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        self.path.with_extension("lock")
    }

    /// Hold an exclusive advisory lock for a read-modify-write cycle
    fn lock(&self) -> Result<File> {
        if let Some(dir) = self.path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create history directory {}", dir.display()))?;
        }
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(self.lock_path())
            .context("Failed to open history lock file")?;
        lock.lock_exclusive()
            .context("Failed to lock history file")?;
        Ok(lock)
    }

    /// All entries, newest first. A missing file is an empty history; an
    /// unreadable one is set aside.
    pub fn load(&self) -> Result<Vec<HistoryEntry>> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("Failed to read history {}", self.path.display()))
            }
        };
        match serde_json::from_str(&content) {
            Ok(entries) => Ok(entries),
            Err(err) => {
                let corrupt = self.path.with_extension("json.corrupt");
                let _ = fs::rename(&self.path, &corrupt);
                warn!(
                    backup = %corrupt.display(),
                    "history file was corrupted ({}); starting fresh",
                    err
                );
                Ok(Vec::new())
            }
        }
    }

    fn write(&self, entries: &[HistoryEntry]) -> Result<()> {
        let content = serde_json::to_string_pretty(entries).context("Failed to serialize history")?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, content).context("Failed to write history")?;
        fs::rename(&tmp, &self.path).context("Failed to replace history file")?;
        Ok(())
    }

    /// Add an entry at the front, dropping the oldest beyond the limit.
    pub fn append(&self, entry: HistoryEntry) -> Result<()> {
        let lock = self.lock()?;
        let mut entries = self.load()?;
        entries.insert(0, entry);
        entries.truncate(self.limit);
        let result = self.write(&entries);
        let _ = FileExt::unlock(&lock);
        result?;
        info!(path = %self.path.display(), entries = entries.len(), "history updated");
        Ok(())
    }

    pub fn recent(&self, n: usize) -> Result<Vec<HistoryEntry>> {
        let mut entries = self.load()?;
        entries.truncate(n);
        Ok(entries)
    }

    pub fn clear(&self) -> Result<()> {
        let lock = self.lock()?;
        let result = match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).context("Failed to clear history"),
        };
        let _ = FileExt::unlock(&lock);
        result
    }
}
