//! JSON file storage implementation
//!
//! This module provides a file-based implementation of the Storage trait: a JSONL
//! result store, JSON snapshots for the checked set and cursor, and one JSONL snapshot
//! per collected repository.

use crate::config::OutputConfig;
use crate::state::{CheckedSnapshot, CrawlWindow};
use crate::storage::traits::{Storage, StorageError, StorageResult};
use crate::storage::{RecordSummary, RepoRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// File-backed storage rooted at one result directory
#[derive(Debug, Clone)]
pub struct JsonStorage {
    dir: PathBuf,
    results_path: PathBuf,
    checked_path: PathBuf,
    cursor_path: PathBuf,
}

impl JsonStorage {
    /// Opens (creating if needed) the result directory described by `config`
    pub fn open(config: &OutputConfig) -> StorageResult<Self> {
        let dir = PathBuf::from(&config.result_dir);
        fs::create_dir_all(&dir)?;

        let storage = Self {
            results_path: dir.join(&config.results_file),
            checked_path: dir.join(&config.checked_file),
            cursor_path: dir.join(&config.cursor_file),
            dir,
        };

        // Touch the result store so an empty crawl still leaves a valid file behind
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&storage.results_path)?;

        Ok(storage)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn results_path(&self) -> &Path {
        &self.results_path
    }

    /// Path of the standalone snapshot for a repository
    pub fn snapshot_path(&self, owner: &str, name: &str) -> PathBuf {
        let file = format!("{}_{}.jsonl", sanitize(owner), sanitize(name));
        self.dir.join(file)
    }

    fn read_json<T: DeserializeOwned>(path: &Path) -> StorageResult<Option<T>> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content)
            .map(Some)
            .map_err(|e| StorageError::Corrupt {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> StorageResult<()> {
        let mut content = serde_json::to_string_pretty(value)?;
        content.push('\n');
        write_atomic(&self.dir, path, content.as_bytes())
    }
}

/// Writes `content` to `target` through a temp file in `dir` and a rename
fn write_atomic(dir: &Path, target: &Path, content: &[u8]) -> StorageResult<()> {
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(content)?;
    tmp.flush()?;
    tmp.as_file_mut().sync_all()?;
    tmp.persist(target).map_err(|e| StorageError::Io(e.error))?;
    Ok(())
}

fn sanitize(component: &str) -> String {
    component
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect()
}

impl Storage for JsonStorage {
    fn load_record_summaries(&self) -> StorageResult<Vec<RecordSummary>> {
        let file = match fs::File::open(&self.results_path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut summaries = Vec::new();
        for (index, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<RecordSummary>(&line) {
                Ok(summary) => summaries.push(summary),
                Err(e) => tracing::warn!(
                    "Skipping unreadable line {} of {}: {}",
                    index + 1,
                    self.results_path.display(),
                    e
                ),
            }
        }

        Ok(summaries)
    }

    fn append_record(&mut self, record: &RepoRecord) -> StorageResult<()> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.results_path)?;
        file.write_all(line.as_bytes())?;
        file.flush()?;
        Ok(())
    }

    fn write_snapshot(&mut self, record: &RepoRecord) -> StorageResult<PathBuf> {
        let mut content = String::new();

        let info = json!({
            "repo_info": {
                "repo_name": record.name,
                "repo_owner": record.owner,
                "repo_url": record.url,
            }
        });
        content.push_str(&serde_json::to_string(&info)?);
        content.push('\n');

        let files = record
            .test_files
            .iter()
            .map(|f| ("test_file", f))
            .chain(record.source_files.iter().map(|f| ("source_file", f)));
        for (kind, file) in files {
            let line = json!({ "type": kind, "path": file.path, "content": file.content });
            content.push_str(&serde_json::to_string(&line)?);
            content.push('\n');
        }

        let path = self.snapshot_path(&record.owner, &record.name);
        write_atomic(&self.dir, &path, content.as_bytes())?;
        Ok(path)
    }

    fn load_checked(&self) -> StorageResult<Option<CheckedSnapshot>> {
        Self::read_json(&self.checked_path)
    }

    fn save_checked(&mut self, snapshot: &CheckedSnapshot) -> StorageResult<()> {
        let path = self.checked_path.clone();
        self.write_json(&path, snapshot)
    }

    fn load_window(&self) -> StorageResult<Option<CrawlWindow>> {
        Self::read_json(&self.cursor_path)
    }

    fn save_window(&mut self, window: &CrawlWindow) -> StorageResult<()> {
        let path = self.cursor_path.clone();
        self.write_json(&path, window)
    }
}
