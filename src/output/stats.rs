//! Statistics from the persisted stores
//!
//! This module provides functionality for extracting and displaying
//! crawl statistics from the storage layer, and the running counters logged after
//! every search page.

use crate::state::CrawlWindow;
use crate::storage::{RecordSummary, Storage};
use crate::SieveError;
use std::fmt;

/// Number of largest collections listed by `print_statistics`
const TOP_REPOSITORIES: usize = 5;

/// Crawl statistics summary
#[derive(Debug, Clone, Default)]
pub struct CrawlStatistics {
    /// Repositories inspected so far
    pub checked: usize,

    /// Inspected repositories whose manifest qualified
    pub qualified: usize,

    /// Records in the result store
    pub records: usize,

    /// Test files across all records
    pub test_files: usize,

    /// Source files across all records
    pub source_files: usize,

    /// Records with the most test files, largest first
    pub largest: Vec<RecordSummary>,

    /// Where a resumed crawl would continue
    pub window: Option<CrawlWindow>,
}

/// Loads statistics from storage
pub fn load_statistics(storage: &dyn Storage) -> Result<CrawlStatistics, SieveError> {
    let mut summaries = storage.load_record_summaries()?;
    let checked = storage.load_checked()?.unwrap_or_default();
    let window = storage.load_window()?;

    let test_files = summaries.iter().map(|s| s.test_files).sum();
    let source_files = summaries.iter().map(|s| s.source_files).sum();
    let records = summaries.len();

    summaries.sort_by(|a, b| b.test_files.cmp(&a.test_files));
    summaries.truncate(TOP_REPOSITORIES);

    Ok(CrawlStatistics {
        checked: checked.checked.len(),
        qualified: checked.qualified.len(),
        records,
        test_files,
        source_files,
        largest: summaries,
        window,
    })
}

/// Prints statistics to stdout in a formatted manner
pub fn print_statistics(stats: &CrawlStatistics) {
    println!("=== Crawl Statistics ===\n");

    println!("Repositories:");
    println!("  Checked: {}", stats.checked);
    println!("  Qualified: {}", stats.qualified);
    println!("  Collected: {}", stats.records);
    println!();

    println!("Files:");
    println!("  Test files: {}", stats.test_files);
    println!("  Source files: {}", stats.source_files);
    if stats.records > 0 {
        println!(
            "  Average per repository: {:.1} test, {:.1} source",
            stats.test_files as f64 / stats.records as f64,
            stats.source_files as f64 / stats.records as f64
        );
    }
    println!();

    if !stats.largest.is_empty() {
        println!("Largest Test Suites:");
        for summary in &stats.largest {
            println!(
                "  - {} ({} test, {} source)",
                summary.id(),
                summary.test_files,
                summary.source_files
            );
        }
        println!();
    }

    match &stats.window {
        Some(window) if window.is_terminal() => {
            println!("Cursor: finished (final date {})", window.final_end_date)
        }
        Some(window) => println!("Cursor: {}", window),
        None => println!("Cursor: not started"),
    }

    println!(
        "Qualification Rate: {:.1}% ({} / {} repositories)",
        stats.qualification_rate(),
        stats.qualified,
        stats.checked
    );
}

impl CrawlStatistics {
    /// Percentage of inspected repositories that qualified
    pub fn qualification_rate(&self) -> f64 {
        if self.checked == 0 {
            0.0
        } else {
            self.qualified as f64 / self.checked as f64 * 100.0
        }
    }
}

/// Running counters of the current crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrawlProgress {
    pub checked: usize,
    pub qualified: usize,
    pub collected: usize,
}

impl fmt::Display for CrawlProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} checked, {} qualified, {} collected",
            self.checked, self.qualified, self.collected
        )
    }
}
