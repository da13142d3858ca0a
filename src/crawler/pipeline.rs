//! Per-repository pipeline
//!
//! Each candidate from a search page runs through the same steps:
//! 1. Skip it outright if it was inspected before
//! 2. Fetch the dependency manifest and decide qualification
//! 3. Record the inspection (and qualification) in the checked set, persisted at once
//! 4. For qualifying repositories, read the default branch and list the file tree
//! 5. Fetch every selected test and source file concurrently
//! 6. Persist the complete record and its standalone snapshot
//!
//! A record is written only once every file fetch has finished. If a fetch is cut
//! short by shutdown the record is dropped.

use crate::classify::{decode_content, DecodePolicy, FileClassifier, ManifestFilter};
use crate::config::FilterConfig;
use crate::crawler::fetcher::{FetchResult, Fetcher};
use crate::crawler::parser::{parse_body, Candidate, ContentFile, RepoInfo, TreeListing};
use crate::crawler::shutdown::ShutdownListener;
use crate::output::CrawlProgress;
use crate::state::{CheckedSet, CrawlWindow, RepoId};
use crate::storage::{RepoFile, RepoRecord, Storage, StorageError, StorageResult};
use futures::future::{join, join_all};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Branch assumed when repository metadata is unavailable
const FALLBACK_BRANCH: &str = "main";

/// State shared by every pipeline of a crawl
///
/// Owned by the coordinator and borrowed by each pipeline. The checked set and the
/// storage backend sit behind mutexes because pipelines of one batch interleave.
/// Writes to disk run on the blocking pool so a batch's pipelines keep fetching while
/// one of them syncs a file. Checked-set snapshots are serialized by `writes`, taken
/// before the checked set is mutated.
pub struct CrawlContext {
    fetcher: Fetcher,
    manifest_path: String,
    manifest: ManifestFilter,
    classifier: FileClassifier,
    decode_policy: DecodePolicy,
    checked: Mutex<CheckedSet>,
    storage: Arc<Mutex<Box<dyn Storage>>>,
    writes: tokio::sync::Mutex<()>,
    shutdown: ShutdownListener,
}

impl CrawlContext {
    pub fn new(
        fetcher: Fetcher,
        filter: &FilterConfig,
        checked: CheckedSet,
        storage: Box<dyn Storage>,
        shutdown: ShutdownListener,
    ) -> Self {
        Self {
            fetcher,
            manifest_path: filter.manifest_path.clone(),
            manifest: ManifestFilter::from_config(filter),
            classifier: FileClassifier::from_config(filter),
            decode_policy: DecodePolicy::default(),
            checked: Mutex::new(checked),
            storage: Arc::new(Mutex::new(storage)),
            writes: tokio::sync::Mutex::new(()),
            shutdown,
        }
    }

    pub fn fetcher(&self) -> &Fetcher {
        &self.fetcher
    }

    pub fn shutdown(&self) -> &ShutdownListener {
        &self.shutdown
    }

    fn checked(&self) -> MutexGuard<'_, CheckedSet> {
        self.checked.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn storage(&self) -> MutexGuard<'_, Box<dyn Storage>> {
        self.storage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// True when the repository was inspected or collected before
    pub fn is_known(&self, repo: &RepoId) -> bool {
        self.checked().is_known(repo)
    }

    /// Counters for progress reporting
    pub fn progress(&self) -> CrawlProgress {
        let checked = self.checked();
        CrawlProgress {
            checked: checked.checked_count(),
            qualified: checked.qualified_count(),
            collected: checked.processed_count(),
        }
    }

    /// Runs a storage operation on the blocking pool
    async fn with_storage<T, F>(&self, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Box<dyn Storage>) -> StorageResult<T> + Send + 'static,
    {
        let storage = Arc::clone(&self.storage);
        tokio::task::spawn_blocking(move || {
            let mut storage = storage.lock().unwrap_or_else(PoisonError::into_inner);
            op(&mut *storage)
        })
        .await
        .map_err(|e| StorageError::Io(std::io::Error::other(e)))?
    }

    /// Marks a repository inspected, and qualified when `qualified`, then persists the set
    pub async fn record_inspection(&self, repo: &RepoId, qualified: bool) -> StorageResult<()> {
        // Held until the write lands so snapshots reach disk in mutation order
        let _writer = self.writes.lock().await;
        let snapshot = {
            let mut checked = self.checked();
            if qualified {
                checked.mark_qualified(repo.clone());
            } else {
                checked.mark_checked(repo.clone());
            }
            checked.snapshot()
        };
        self.with_storage(move |storage| storage.save_checked(&snapshot))
            .await
    }

    /// Appends a complete record, writes its snapshot, and marks it collected
    pub async fn persist_record(&self, record: RepoRecord) -> StorageResult<PathBuf> {
        let id = record.id();
        let path = self
            .with_storage(move |storage| {
                storage.append_record(&record)?;
                storage.write_snapshot(&record)
            })
            .await?;
        self.checked().mark_processed(id);
        Ok(path)
    }

    /// Checkpoints the cursor window
    pub fn save_window(&self, window: &CrawlWindow) -> StorageResult<()> {
        self.storage().save_window(window)
    }
}

impl std::fmt::Debug for CrawlContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrawlContext")
            .field("fetcher", &self.fetcher)
            .field("manifest_path", &self.manifest_path)
            .field("manifest", &self.manifest)
            .field("classifier", &self.classifier)
            .finish_non_exhaustive()
    }
}

/// How one repository's pipeline ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoOutcome {
    /// Inspected in an earlier run or earlier in this one; nothing was fetched
    Skipped,

    /// The manifest could not be read for a transient reason; not yet marked checked
    Deferred,

    /// No manifest, or one that does not name the required frameworks
    Rejected,

    /// Qualified, but the file tree could not be listed
    TreeUnavailable,

    /// Record persisted
    Collected {
        test_files: usize,
        source_files: usize,
    },

    /// Shutdown interrupted a fetch; nothing was persisted for the files
    Abandoned,
}

/// Result of fetching one file's text
#[derive(Debug)]
enum FileText {
    Text(String),
    Missing,
    Undecodable,
    Failed { transient: bool, reason: String },
    Interrupted,
}

async fn fetch_text(ctx: &CrawlContext, repo: &RepoId, path: &str) -> FileText {
    let url = match ctx.fetcher.contents_url(&repo.owner, &repo.name, path) {
        Ok(url) => url,
        Err(e) => {
            return FileText::Failed {
                transient: false,
                reason: e.to_string(),
            }
        }
    };

    match ctx.fetcher.fetch(&url).await {
        FetchResult::Success { body, .. } => {
            let encoded = parse_body::<ContentFile>(&body).and_then(|file| file.content);
            let Some(encoded) = encoded else {
                return FileText::Missing;
            };
            match decode_content(&encoded, ctx.decode_policy) {
                Ok(text) => FileText::Text(text),
                Err(e) => {
                    tracing::warn!("Skipping {} in {}: {}", path, repo, e);
                    FileText::Undecodable
                }
            }
        }
        FetchResult::NoData { .. } => FileText::Missing,
        FetchResult::Interrupted => FileText::Interrupted,
        other => FileText::Failed {
            transient: other.is_transient(),
            reason: other.describe(),
        },
    }
}

/// Runs the full pipeline for one search candidate
///
/// Only persistence failures are returned as errors; every network or decoding problem
/// is logged and folded into the outcome.
pub async fn process_repository(ctx: &CrawlContext, candidate: &Candidate) -> StorageResult<RepoOutcome> {
    let repo = &candidate.id;

    if ctx.is_known(repo) {
        tracing::debug!("Skipping already checked repository {}", repo);
        return Ok(RepoOutcome::Skipped);
    }

    let manifest = match fetch_text(ctx, repo, &ctx.manifest_path).await {
        FileText::Text(text) => Some(text),
        FileText::Missing | FileText::Undecodable => None,
        FileText::Failed { transient: false, reason } => {
            tracing::debug!("No readable manifest in {}: {}", repo, reason);
            None
        }
        FileText::Failed { transient: true, reason } => {
            tracing::warn!("Could not read manifest of {}, deferring: {}", repo, reason);
            return Ok(RepoOutcome::Deferred);
        }
        FileText::Interrupted => return Ok(RepoOutcome::Abandoned),
    };

    let qualified = manifest
        .as_deref()
        .is_some_and(|text| ctx.manifest.qualifies(text));
    ctx.record_inspection(repo, qualified).await?;

    if !qualified {
        tracing::debug!("{} does not qualify", repo);
        return Ok(RepoOutcome::Rejected);
    }
    tracing::info!("Found qualifying repository: {}", repo);

    let Some(branch) = default_branch(ctx, repo).await else {
        return Ok(RepoOutcome::Abandoned);
    };

    let listing = match ctx.fetcher.tree_url(&repo.owner, &repo.name, &branch) {
        Ok(url) => ctx.fetcher.fetch(&url).await,
        Err(e) => FetchResult::NetworkError {
            error: e.to_string(),
        },
    };
    let tree = match listing {
        FetchResult::Success { body, .. } => parse_body::<TreeListing>(&body),
        FetchResult::Interrupted => return Ok(RepoOutcome::Abandoned),
        other => {
            tracing::warn!("Could not list files of {}@{}: {}", repo, branch, other.describe());
            None
        }
    };
    let Some(tree) = tree else {
        return Ok(RepoOutcome::TreeUnavailable);
    };
    if tree.truncated {
        tracing::warn!("File tree of {} was truncated by the API", repo);
    }

    let partition = ctx.classifier.partition(&tree.tree);
    tracing::debug!(
        "{}: {} test files, {} source files selected",
        repo,
        partition.tests.len(),
        partition.sources.len()
    );

    let (tests, sources) = join(
        join_all(partition.tests.iter().map(|p| fetch_text(ctx, repo, p))),
        join_all(partition.sources.iter().map(|p| fetch_text(ctx, repo, p))),
    )
    .await;

    let mut record = RepoRecord::new(repo, candidate.html_url.as_deref());
    let mut interrupted = false;
    for (paths, texts, files) in [
        (&partition.tests, tests, &mut record.test_files),
        (&partition.sources, sources, &mut record.source_files),
    ] {
        for (path, text) in paths.iter().zip(texts) {
            match text {
                FileText::Text(content) => files.push(RepoFile::new(path.as_str(), content)),
                FileText::Interrupted => interrupted = true,
                FileText::Failed { reason, .. } => {
                    tracing::warn!("Failed to fetch {} in {}: {}", path, repo, reason);
                }
                FileText::Missing | FileText::Undecodable => {}
            }
        }
    }

    if interrupted {
        tracing::info!("Discarding partial record for {} after shutdown", repo);
        return Ok(RepoOutcome::Abandoned);
    }

    let (test_files, source_files) = (record.test_files.len(), record.source_files.len());
    let path = ctx.persist_record(record).await?;
    tracing::info!(
        "Saved {} ({} test files, {} source files) to {}",
        repo,
        test_files,
        source_files,
        path.display()
    );

    Ok(RepoOutcome::Collected {
        test_files,
        source_files,
    })
}

/// Reads the default branch; `None` only when shutdown interrupted the request
async fn default_branch(ctx: &CrawlContext, repo: &RepoId) -> Option<String> {
    let result = match ctx.fetcher.repo_url(&repo.owner, &repo.name) {
        Ok(url) => ctx.fetcher.fetch(&url).await,
        Err(e) => FetchResult::NetworkError {
            error: e.to_string(),
        },
    };

    let branch = match result {
        FetchResult::Success { body, .. } => {
            parse_body::<RepoInfo>(&body).and_then(|info| info.default_branch)
        }
        FetchResult::Interrupted => return None,
        other => {
            tracing::debug!("No metadata for {}: {}", repo, other.describe());
            None
        }
    };

    Some(branch.unwrap_or_else(|| FALLBACK_BRANCH.to_string()))
}
