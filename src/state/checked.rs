use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

/// Identity of a remote repository: `(owner, name)`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// `owner/name`
    pub fn full_name(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

impl FromStr for RepoId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/') => {
                Ok(Self::new(owner, name))
            }
            _ => Err(format!("expected 'owner/name', got '{}'", s)),
        }
    }
}

/// On-disk form of the checked set
///
/// `pytest_fastapi` is the key older result directories used for the qualified list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckedSnapshot {
    #[serde(default)]
    pub checked: Vec<String>,

    #[serde(default, alias = "pytest_fastapi")]
    pub qualified: Vec<String>,
}

/// Repositories already inspected, qualified, or fully collected
///
/// Keeps `processed ⊆ qualified ⊆ checked`. Insertion order of the checked and qualified
/// lists is preserved in snapshots so the store diffs cleanly between saves.
#[derive(Debug, Clone, Default)]
pub struct CheckedSet {
    checked: Vec<RepoId>,
    checked_index: HashSet<RepoId>,
    qualified: Vec<RepoId>,
    qualified_index: HashSet<RepoId>,
    processed: HashSet<RepoId>,
}

impl CheckedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds the set from a persisted snapshot and the identities in the result store
    ///
    /// Entries that do not parse as `owner/name` are dropped with a warning. Every
    /// processed identity is also made qualified and checked.
    pub fn restore(snapshot: CheckedSnapshot, processed: impl IntoIterator<Item = RepoId>) -> Self {
        let mut set = Self::new();

        for raw in &snapshot.checked {
            match raw.parse::<RepoId>() {
                Ok(repo) => set.mark_checked(repo),
                Err(e) => tracing::warn!("Ignoring checked entry: {}", e),
            }
        }
        for raw in &snapshot.qualified {
            match raw.parse::<RepoId>() {
                Ok(repo) => set.mark_qualified(repo),
                Err(e) => tracing::warn!("Ignoring qualified entry: {}", e),
            }
        }
        for repo in processed {
            set.mark_processed(repo);
        }

        set
    }

    /// Returns true if the repository needs no further inspection
    pub fn is_known(&self, repo: &RepoId) -> bool {
        self.checked_index.contains(repo) || self.processed.contains(repo)
    }

    pub fn is_checked(&self, repo: &RepoId) -> bool {
        self.checked_index.contains(repo)
    }

    pub fn is_qualified(&self, repo: &RepoId) -> bool {
        self.qualified_index.contains(repo)
    }

    pub fn is_processed(&self, repo: &RepoId) -> bool {
        self.processed.contains(repo)
    }

    /// Records that a repository was inspected
    pub fn mark_checked(&mut self, repo: RepoId) {
        if self.checked_index.insert(repo.clone()) {
            self.checked.push(repo);
        }
    }

    /// Records that a repository passed the predicate
    pub fn mark_qualified(&mut self, repo: RepoId) {
        self.mark_checked(repo.clone());
        if self.qualified_index.insert(repo.clone()) {
            self.qualified.push(repo);
        }
    }

    /// Records that a repository's record was written
    pub fn mark_processed(&mut self, repo: RepoId) {
        self.mark_qualified(repo.clone());
        self.processed.insert(repo);
    }

    pub fn checked_count(&self) -> usize {
        self.checked.len()
    }

    pub fn qualified_count(&self) -> usize {
        self.qualified.len()
    }

    pub fn processed_count(&self) -> usize {
        self.processed.len()
    }

    /// Serializable view of the checked and qualified lists
    pub fn snapshot(&self) -> CheckedSnapshot {
        CheckedSnapshot {
            checked: self.checked.iter().map(RepoId::full_name).collect(),
            qualified: self.qualified.iter().map(RepoId::full_name).collect(),
        }
    }
}
