//! Output module for crawl statistics and progress reporting
//!
//! This module handles:
//! - Summarizing the persisted stores for `--stats`
//! - The running counters logged after each search page

pub mod stats;

pub use stats::{load_statistics, print_statistics, CrawlProgress, CrawlStatistics};
