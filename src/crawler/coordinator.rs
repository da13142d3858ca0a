//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the main crawl loop that coordinates all aspects of
//! the crawling process, including:
//! - Loading the persisted stores and restoring the checked set
//! - Walking the cursor one search page at a time
//! - Fanning candidates out to pipelines in barrier-synchronized batches
//! - Checkpointing the cursor after every transition
//! - Stopping cleanly on shutdown or a persistence failure

use crate::config::{resolve_tokens, Config};
use crate::crawler::fetcher::{FetchResult, Fetcher};
use crate::crawler::parser::{parse_search_page, Candidate};
use crate::crawler::pipeline::{process_repository, CrawlContext, RepoOutcome};
use crate::crawler::rate_limit::{RateLimitPolicy, RateLimiter};
use crate::crawler::shutdown::ShutdownListener;
use crate::state::{CheckedSet, CredentialPool, Cursor, PageSummary, RepoId, Transition, SEARCH_RESULT_CAP};
use crate::storage::{JsonStorage, Storage, StorageResult};
use crate::SieveError;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Why a crawl run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The cursor passed the final date
    Finished,

    /// Shutdown was requested
    Interrupted,
}

/// Tallies of one crawl run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub stop: StopReason,
    pub pages: u64,
    pub inspected: u64,
    pub qualified: u64,
    pub collected: u64,

    /// Marked checked after the manifest kept failing through every retry round
    pub deferred: u64,
}

impl RunSummary {
    fn new() -> Self {
        Self {
            stop: StopReason::Finished,
            pages: 0,
            inspected: 0,
            qualified: 0,
            collected: 0,
            deferred: 0,
        }
    }

    fn record(&mut self, outcome: RepoOutcome) {
        match outcome {
            RepoOutcome::Skipped | RepoOutcome::Abandoned => {}
            RepoOutcome::Deferred => {
                self.inspected += 1;
                self.deferred += 1;
            }
            RepoOutcome::Rejected => self.inspected += 1,
            RepoOutcome::TreeUnavailable => {
                self.inspected += 1;
                self.qualified += 1;
            }
            RepoOutcome::Collected { .. } => {
                self.inspected += 1;
                self.qualified += 1;
                self.collected += 1;
            }
        }
    }
}

/// Main crawler coordinator structure
pub struct Coordinator {
    config: Arc<Config>,
    ctx: CrawlContext,
    cursor: Cursor,
    shutdown: ShutdownListener,
}

impl Coordinator {
    /// Creates a coordinator over the configured result directory
    ///
    /// Credentials come from the config file and the environment.
    pub fn new(config: Config, fresh: bool, shutdown: ShutdownListener) -> Result<Self, SieveError> {
        let storage = JsonStorage::open(&config.output)?;
        tracing::info!("Using result directory {}", storage.dir().display());
        let tokens = resolve_tokens(&config.api, |name| std::env::var(name).ok());
        Self::with_storage(config, Box::new(storage), tokens, fresh, shutdown)
    }

    /// Creates a coordinator over an already opened storage backend
    ///
    /// # Arguments
    ///
    /// * `config` - The crawler configuration
    /// * `storage` - Backend holding the result, checked-set, and cursor stores
    /// * `tokens` - API credentials, possibly none
    /// * `fresh` - Ignore the persisted cursor and start at the configured window
    /// * `shutdown` - Graceful stop signal
    pub fn with_storage(
        config: Config,
        mut storage: Box<dyn Storage>,
        tokens: Vec<String>,
        fresh: bool,
        shutdown: ShutdownListener,
    ) -> Result<Self, SieveError> {
        let saved_window = if fresh {
            tracing::info!("Fresh start requested, ignoring saved cursor");
            None
        } else {
            storage.load_window()?
        };
        let cursor = Cursor::resume(saved_window, &config.search)?;

        let summaries = storage.load_record_summaries()?;
        let snapshot = storage.load_checked()?.unwrap_or_default();
        let checked = CheckedSet::restore(snapshot, summaries.iter().map(|s| s.id()));
        tracing::info!(
            "Loaded {} checked, {} qualified, {} collected repositories",
            checked.checked_count(),
            checked.qualified_count(),
            checked.processed_count()
        );

        let pool = Arc::new(CredentialPool::new(tokens));
        if pool.is_empty() {
            tracing::warn!("No API tokens configured; requests are unauthenticated");
        } else {
            tracing::info!("Loaded {} API tokens", pool.len());
        }

        let limiter = Arc::new(RateLimiter::new(
            pool,
            RateLimitPolicy::from(&config.api),
            shutdown.clone(),
        ));
        let fetcher = Fetcher::from_config(&config.api, limiter)?;

        storage.save_window(&cursor.window())?;
        tracing::info!("Starting at {}", cursor.window());

        let ctx = CrawlContext::new(fetcher, &config.filter, checked, storage, shutdown.clone());

        Ok(Self {
            config: Arc::new(config),
            ctx,
            cursor,
            shutdown,
        })
    }

    pub fn cursor(&self) -> &Cursor {
        &self.cursor
    }

    pub fn context(&self) -> &CrawlContext {
        &self.ctx
    }

    /// Runs the main crawl loop
    ///
    /// The cursor is checkpointed before returning, whether the loop finished, was
    /// interrupted, or failed.
    pub async fn run(&mut self) -> Result<RunSummary, SieveError> {
        let started = Instant::now();
        let result = self.crawl_loop().await;
        let saved = self.checkpoint();

        match result {
            Ok(summary) => {
                saved?;
                tracing::info!(
                    "Crawl {} after {:.0?}: {} pages, {} inspected, {} qualified, {} collected, {} deferred",
                    match summary.stop {
                        StopReason::Finished => "finished",
                        StopReason::Interrupted => "interrupted",
                    },
                    started.elapsed(),
                    summary.pages,
                    summary.inspected,
                    summary.qualified,
                    summary.collected,
                    summary.deferred
                );
                Ok(summary)
            }
            Err(e) => {
                if let Err(save_error) = saved {
                    tracing::error!("Could not checkpoint cursor: {}", save_error);
                }
                tracing::error!("Crawl aborted at {}: {}", self.cursor.window(), e);
                Err(e)
            }
        }
    }

    fn checkpoint(&self) -> StorageResult<()> {
        self.ctx.save_window(&self.cursor.window())
    }

    async fn crawl_loop(&mut self) -> Result<RunSummary, SieveError> {
        let mut summary = RunSummary::new();
        let backoff = Duration::from_secs(self.config.crawler.failure_backoff_secs);
        let politeness = Duration::from_millis(self.config.crawler.politeness_delay_ms);

        while !self.cursor.is_terminal() {
            if self.shutdown.is_triggered() {
                summary.stop = StopReason::Interrupted;
                return Ok(summary);
            }

            let search = &self.config.search;
            let url = self.ctx.fetcher().search_url(
                &self.cursor.search_query(&search.language),
                &search.sort,
                search.per_page,
                self.cursor.page(),
            )?;
            tracing::info!("Searching {}", self.cursor.window());

            let (page, has_next) = match self.ctx.fetcher().fetch(&url).await {
                FetchResult::Success { body, next_page } => match parse_search_page(&body) {
                    Some(page) => (page, next_page.is_some()),
                    None => {
                        tracing::warn!("Malformed search response, retrying in {:?}", backoff);
                        self.shutdown.sleep(backoff).await;
                        continue;
                    }
                },
                FetchResult::Interrupted => continue,
                other => {
                    tracing::warn!(
                        "Search request failed ({}), retrying in {:?}",
                        other.describe(),
                        backoff
                    );
                    self.shutdown.sleep(backoff).await;
                    continue;
                }
            };
            summary.pages += 1;

            if self.cursor.page() == 1 && page.total_count > SEARCH_RESULT_CAP {
                tracing::warn!(
                    "{} results in {}, only the first {} are reachable",
                    page.total_count,
                    self.cursor.window(),
                    SEARCH_RESULT_CAP
                );
            }

            let candidates = self.new_candidates(&page.candidates);
            tracing::info!(
                "Page {}: {} results of {}, {} new repositories",
                self.cursor.page(),
                page.item_count,
                page.total_count,
                candidates.len()
            );

            if !self.process_candidates(&candidates, &mut summary).await? {
                tracing::info!(
                    "Stopped before finishing page; will resume at {}",
                    self.cursor.window()
                );
                summary.stop = StopReason::Interrupted;
                return Ok(summary);
            }

            tracing::info!("Progress: {}", self.ctx.progress());

            let transition = self.cursor.advance(PageSummary {
                item_count: page.item_count,
                total_count: page.total_count,
                has_next,
            });
            self.checkpoint()?;
            match transition {
                Transition::NextPage { page } => tracing::info!("Moving to page {}", page),
                Transition::NextWindow { start, end } => {
                    tracing::info!("Moving to date range {} ~ {}", start, end)
                }
                Transition::Finished => tracing::info!("Reached final date"),
            }

            self.shutdown.sleep(politeness).await;
        }

        Ok(summary)
    }

    /// Drops candidates already known or repeated within the page
    fn new_candidates(&self, candidates: &[Candidate]) -> Vec<Candidate> {
        let mut seen: HashSet<&RepoId> = HashSet::new();
        candidates
            .iter()
            .filter(|c| seen.insert(&c.id))
            .filter(|c| !self.ctx.is_known(&c.id))
            .cloned()
            .collect()
    }

    /// Runs pipelines in batches, each awaited in full before the next starts
    ///
    /// Repositories deferred by a transient manifest failure get up to
    /// `deferred_retries` more rounds after the failure backoff. Those still failing are
    /// marked checked without qualifying, so the cursor can move on without losing track
    /// of them. Returns false when shutdown stopped the page from completing.
    async fn process_candidates(
        &self,
        candidates: &[Candidate],
        summary: &mut RunSummary,
    ) -> Result<bool, SieveError> {
        let backoff = Duration::from_secs(self.config.crawler.failure_backoff_secs);
        let mut pending = candidates.to_vec();

        for round in 0..=self.config.crawler.deferred_retries {
            if round > 0 {
                tracing::info!(
                    "Retrying {} deferred repositories in {:?} (round {}/{})",
                    pending.len(),
                    backoff,
                    round,
                    self.config.crawler.deferred_retries
                );
                if self.shutdown.sleep(backoff).await {
                    return Ok(false);
                }
            }

            match self.run_batches(&pending, summary).await? {
                Some(deferred) => pending = deferred,
                None => return Ok(false),
            }
            if pending.is_empty() {
                return Ok(true);
            }
        }

        for candidate in &pending {
            tracing::warn!(
                "Giving up on manifest of {}, marking it checked",
                candidate.id
            );
            self.ctx.record_inspection(&candidate.id, false).await?;
            summary.record(RepoOutcome::Deferred);
        }
        Ok(true)
    }

    /// Runs one pass over `candidates`, returning those deferred
    ///
    /// `None` means shutdown interrupted the pass.
    async fn run_batches(
        &self,
        candidates: &[Candidate],
        summary: &mut RunSummary,
    ) -> Result<Option<Vec<Candidate>>, SieveError> {
        let batch_size = self.config.crawler.batch_size.max(1);
        let mut deferred = Vec::new();
        let mut interrupted = false;

        for batch in candidates.chunks(batch_size) {
            if self.shutdown.is_triggered() {
                return Ok(None);
            }

            let outcomes = join_all(batch.iter().map(|c| process_repository(&self.ctx, c))).await;
            for (candidate, outcome) in batch.iter().zip(outcomes) {
                match outcome? {
                    RepoOutcome::Deferred => deferred.push(candidate.clone()),
                    outcome => {
                        interrupted |= outcome == RepoOutcome::Abandoned;
                        summary.record(outcome);
                    }
                }
            }
        }

        Ok((!interrupted).then_some(deferred))
    }
}

/// Runs a complete crawl against the configured result directory
pub async fn run_crawl(
    config: Config,
    fresh: bool,
    shutdown: ShutdownListener,
) -> Result<RunSummary, SieveError> {
    let mut coordinator = Coordinator::new(config, fresh, shutdown)?;
    coordinator.run().await
}
