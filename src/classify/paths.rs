use crate::config::FilterConfig;
use serde::Deserialize;

/// One entry of a recursive git tree listing
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TreeEntry {
    pub path: String,

    /// `blob` for files, `tree` for directories, `commit` for submodules
    #[serde(rename = "type")]
    pub kind: String,
}

impl TreeEntry {
    pub fn blob(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: "blob".to_string(),
        }
    }

    pub fn is_blob(&self) -> bool {
        self.kind == "blob"
    }
}

/// Which collection a file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileClass {
    Test,
    Source,
}

/// Paths selected for fetching, in tree order, already truncated to the per-class cap
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Partition {
    pub tests: Vec<String>,
    pub sources: Vec<String>,
}

impl Partition {
    pub fn is_empty(&self) -> bool {
        self.tests.is_empty() && self.sources.is_empty()
    }
}

/// Path heuristics that split a repository's files into tests and sources
///
/// With the default rules, a file with the language extension is a test when its path
/// starts with `tests/` or `test_`, or contains `/tests/`. Any other such file is a source
/// file unless its path contains `test` in any letter case, in which case it is excluded
/// from both classes. So `app/test_helpers.py` and `contest_utils.py` are excluded, while
/// `tests/test_foo.py` is a test and `app/models.py` a source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileClassifier {
    extension: String,
    test_prefixes: Vec<String>,
    test_segments: Vec<String>,
    max_per_class: usize,
}

impl FileClassifier {
    pub fn from_config(config: &FilterConfig) -> Self {
        Self {
            extension: config.extension.clone(),
            test_prefixes: config.test_prefixes.clone(),
            test_segments: config.test_segments.clone(),
            max_per_class: config.max_files_per_class,
        }
    }

    pub fn max_per_class(&self) -> usize {
        self.max_per_class
    }

    /// Classifies a single path, or returns `None` when the file is not collected
    pub fn classify(&self, path: &str) -> Option<FileClass> {
        if !path.ends_with(&self.extension) {
            return None;
        }

        let is_test = self.test_prefixes.iter().any(|p| path.starts_with(p.as_str()))
            || self.test_segments.iter().any(|s| path.contains(s.as_str()));

        if is_test {
            Some(FileClass::Test)
        } else if path.to_lowercase().contains("test") {
            None
        } else {
            Some(FileClass::Source)
        }
    }

    /// Splits blob entries into test and source paths, keeping the first
    /// `max_per_class` of each in the order the tree listed them
    pub fn partition<'a, I>(&self, entries: I) -> Partition
    where
        I: IntoIterator<Item = &'a TreeEntry>,
    {
        let mut partition = Partition::default();

        for entry in entries.into_iter().filter(|e| e.is_blob()) {
            match self.classify(&entry.path) {
                Some(FileClass::Test) if partition.tests.len() < self.max_per_class => {
                    partition.tests.push(entry.path.clone());
                }
                Some(FileClass::Source) if partition.sources.len() < self.max_per_class => {
                    partition.sources.push(entry.path.clone());
                }
                _ => {}
            }
        }

        partition
    }
}

impl Default for FileClassifier {
    fn default() -> Self {
        Self::from_config(&FilterConfig::default())
    }
}
