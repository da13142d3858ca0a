//! Crawler module for searching and harvesting repositories
//!
//! This module contains the core crawling logic, including:
//! - API requests with credential rotation and rate-limit handling
//! - Response parsing and pagination
//! - The per-repository qualification and collection pipeline
//! - Overall crawl coordination and graceful shutdown

mod coordinator;
mod fetcher;
mod parser;
mod pipeline;
mod rate_limit;
mod shutdown;

pub use coordinator::{run_crawl, Coordinator, RunSummary, StopReason};
pub use fetcher::{build_http_client, FetchResult, Fetcher};
pub use parser::{
    is_rate_limit_message, next_page_link, parse_body, parse_link_header, parse_rate_status,
    parse_search_page, Candidate, ContentFile, RateStatus, RepoInfo, SearchPage, TreeListing,
};
pub use pipeline::{process_repository, CrawlContext, RepoOutcome};
pub use rate_limit::{RateDecision, RateLimitPolicy, RateLimiter};
pub use shutdown::{Shutdown, ShutdownListener};

use crate::config::Config;
use crate::SieveError;

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the result directory and load the persisted stores
/// 2. Resume the cursor, or start at the configured window when `fresh`
/// 3. Build the credential pool, rate limiter, and HTTP client
/// 4. Walk the search windows, collecting qualifying repositories
/// 5. Checkpoint the cursor on completion, shutdown, or failure
pub async fn crawl(
    config: Config,
    fresh: bool,
    shutdown: ShutdownListener,
) -> Result<RunSummary, SieveError> {
    run_crawl(config, fresh, shutdown).await
}
