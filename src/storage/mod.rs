//! Storage module for persisting crawl data
//!
//! This module handles everything the crawl writes to disk, including:
//! - The append-only result store of collected repositories
//! - Per-repository snapshots
//! - The checked-set and cursor snapshots used to resume a crawl

mod json;
mod traits;

pub use json::JsonStorage;
pub use traits::{Storage, StorageError, StorageResult};

use crate::state::RepoId;
use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

/// Public web location of repositories, used when the API does not supply one
const WEB_BASE: &str = "https://github.com";

/// One collected file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoFile {
    pub path: String,
    pub content: String,
}

impl RepoFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Everything collected from one qualifying repository
///
/// A record is built completely in memory and written once; it is never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoRecord {
    #[serde(rename = "repo_name")]
    pub name: String,

    #[serde(rename = "repo_owner")]
    pub owner: String,

    #[serde(rename = "repo_url")]
    pub url: String,

    pub test_files: Vec<RepoFile>,

    pub source_files: Vec<RepoFile>,
}

impl RepoRecord {
    /// Creates an empty record; `url` falls back to the public web address
    pub fn new(repo: &RepoId, url: Option<&str>) -> Self {
        Self {
            name: repo.name.clone(),
            owner: repo.owner.clone(),
            url: url
                .map(str::to_string)
                .unwrap_or_else(|| format!("{}/{}/{}", WEB_BASE, repo.owner, repo.name)),
            test_files: Vec::new(),
            source_files: Vec::new(),
        }
    }

    pub fn id(&self) -> RepoId {
        RepoId::new(&self.owner, &self.name)
    }
}

/// Identity and file counts of a stored record, read without keeping file contents
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RecordSummary {
    #[serde(rename = "repo_owner")]
    pub owner: String,

    #[serde(rename = "repo_name")]
    pub name: String,

    #[serde(default, deserialize_with = "count_items")]
    pub test_files: usize,

    #[serde(default, deserialize_with = "count_items")]
    pub source_files: usize,
}

impl RecordSummary {
    pub fn id(&self) -> RepoId {
        RepoId::new(&self.owner, &self.name)
    }
}

fn count_items<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let items: Vec<IgnoredAny> = Vec::deserialize(deserializer)?;
    Ok(items.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_serialization_keys() {
        let mut record = RepoRecord::new(&RepoId::new("alice", "api"), None);
        record.test_files.push(RepoFile::new("tests/test_a.py", "x"));

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["repo_owner"], "alice");
        assert_eq!(json["repo_name"], "api");
        assert_eq!(json["repo_url"], "https://github.com/alice/api");
        assert_eq!(json["test_files"][0]["path"], "tests/test_a.py");
        assert_eq!(json["source_files"].as_array().unwrap().len(), 0);
    }

    #[test]
    fn test_record_uses_supplied_url() {
        let record = RepoRecord::new(
            &RepoId::new("alice", "api"),
            Some("https://ghe.example.com/alice/api"),
        );
        assert_eq!(record.url, "https://ghe.example.com/alice/api");
        assert_eq!(record.id(), RepoId::new("alice", "api"));
    }

    #[test]
    fn test_summary_counts_files() {
        let line = r#"{"repo_name":"api","repo_owner":"alice","repo_url":"u",
            "test_files":[{"path":"a","content":"x"},{"path":"b","content":"y"}],
            "source_files":[]}"#;
        let summary: RecordSummary = serde_json::from_str(line).unwrap();
        assert_eq!(summary.id(), RepoId::new("alice", "api"));
        assert_eq!(summary.test_files, 2);
        assert_eq!(summary.source_files, 0);
    }
}
