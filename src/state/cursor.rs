//! Crawl cursor: the sliding creation-date window and page within it
//!
//! The search API truncates every query at 1000 results, served in pages of at most 100.
//! To see more than that, the crawl narrows the query to a small window of creation dates
//! and walks windows forward until the final date is passed. The cursor is the only
//! resume point of a crawl, so it is persisted after every transition.

use crate::config::SearchConfig;
use crate::config::parse_date;
use crate::ConfigError;
use chrono::{Duration, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of results the search API will ever return for one query
pub const SEARCH_RESULT_CAP: u64 = 1000;

/// Persisted cursor state
///
/// Field names match the cursor store format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlWindow {
    #[serde(rename = "current_start_date")]
    pub start_date: NaiveDate,

    #[serde(rename = "current_end_date")]
    pub end_date: NaiveDate,

    pub final_end_date: NaiveDate,

    #[serde(rename = "last_page")]
    pub page: u32,
}

impl CrawlWindow {
    /// First window of a crawl starting at `start`
    pub fn initial(start: NaiveDate, final_end_date: NaiveDate, width_days: u32) -> Self {
        Self {
            start_date: start,
            end_date: window_end(start, final_end_date, width_days),
            final_end_date,
            page: 1,
        }
    }

    /// Returns true once the window has moved past the final date
    pub fn is_terminal(&self) -> bool {
        self.start_date > self.final_end_date
    }
}

impl fmt::Display for CrawlWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ~ {} (page {})",
            self.start_date, self.end_date, self.page
        )
    }
}

fn window_end(start: NaiveDate, final_end_date: NaiveDate, width_days: u32) -> NaiveDate {
    let end = start + Duration::days(i64::from(width_days));
    end.min(final_end_date)
}

/// Shape of the window walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowPolicy {
    /// Days added to a window's start to obtain its end
    pub width_days: u32,

    /// Deepest page requested within one window
    pub max_pages: u32,

    /// Results per page
    pub per_page: u32,
}

impl Default for WindowPolicy {
    fn default() -> Self {
        Self {
            width_days: 14,
            max_pages: 10,
            per_page: 100,
        }
    }
}

impl From<&SearchConfig> for WindowPolicy {
    fn from(config: &SearchConfig) -> Self {
        Self {
            width_days: config.window_days,
            max_pages: config.max_pages,
            per_page: config.per_page,
        }
    }
}

/// What a processed search page told the cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSummary {
    /// Number of repositories on the page
    pub item_count: usize,

    /// `total_count` reported by the search endpoint
    pub total_count: u64,

    /// Whether the response advertised a next page
    pub has_next: bool,
}

/// Result of advancing the cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Same window, next page
    NextPage { page: u32 },

    /// Next date window, page 1
    NextWindow { start: NaiveDate, end: NaiveDate },

    /// The window moved past the final date
    Finished,
}

/// Owner of the crawl window
#[derive(Debug, Clone)]
pub struct Cursor {
    window: CrawlWindow,
    policy: WindowPolicy,
}

impl Cursor {
    /// Creates a cursor, repairing a window that breaks its invariants
    ///
    /// A page below 1 becomes 1, and an end date outside `start..=final` is recomputed
    /// from the policy. Terminal windows are kept as they are.
    pub fn new(mut window: CrawlWindow, policy: WindowPolicy) -> Self {
        window.page = window.page.max(1);
        if !window.is_terminal()
            && (window.end_date < window.start_date || window.end_date > window.final_end_date)
        {
            tracing::warn!("Repairing inconsistent crawl window {}", window);
            window.end_date = window_end(window.start_date, window.final_end_date, policy.width_days);
        }
        Self { window, policy }
    }

    /// Builds the starting cursor described by the search configuration
    pub fn from_config(config: &SearchConfig) -> Result<Self, ConfigError> {
        let start = parse_date(&config.start_date)?;
        let final_end = parse_date(&config.end_date)?;
        let policy = WindowPolicy::from(config);
        Ok(Self::new(
            CrawlWindow::initial(start, final_end, policy.width_days),
            policy,
        ))
    }

    /// Resumes from a persisted window, or starts fresh when there is none
    ///
    /// The configured final date replaces the persisted one, so the crawl range can be
    /// extended between runs without losing the position inside it.
    pub fn resume(saved: Option<CrawlWindow>, config: &SearchConfig) -> Result<Self, ConfigError> {
        let Some(mut window) = saved else {
            return Self::from_config(config);
        };

        let final_end = parse_date(&config.end_date)?;
        if window.final_end_date != final_end {
            tracing::info!(
                "Final end date changed from {} to {}",
                window.final_end_date,
                final_end
            );
            window.final_end_date = final_end;
        }

        Ok(Self::new(window, WindowPolicy::from(config)))
    }

    pub fn window(&self) -> CrawlWindow {
        self.window
    }

    pub fn page(&self) -> u32 {
        self.window.page
    }

    pub fn policy(&self) -> WindowPolicy {
        self.policy
    }

    pub fn is_terminal(&self) -> bool {
        self.window.is_terminal()
    }

    /// Search qualifier string for the current window
    pub fn search_query(&self, language: &str) -> String {
        format!(
            "language:{} created:{}..{}",
            language, self.window.start_date, self.window.end_date
        )
    }

    /// Applies the transition for one processed search page
    ///
    /// - An empty page moves to the next window when the window is paged out (page past
    ///   the ceiling, or no further results exist at this page); otherwise it tries the
    ///   next page.
    /// - A non-empty page moves to the next page while a next link exists and the page
    ///   ceiling is not reached; otherwise to the next window.
    pub fn advance(&mut self, summary: PageSummary) -> Transition {
        let page = self.window.page;

        let next_page = if summary.item_count == 0 {
            let paged_out = page > self.policy.max_pages
                || summary.total_count <= u64::from(page) * u64::from(self.policy.per_page);
            !paged_out
        } else {
            summary.has_next && page < self.policy.max_pages
        };

        if next_page {
            self.window.page = page + 1;
            Transition::NextPage {
                page: self.window.page,
            }
        } else {
            self.advance_window()
        }
    }

    /// Moves to the window following the current one
    pub fn advance_window(&mut self) -> Transition {
        let start = self.window.end_date + Duration::days(1);
        self.window.start_date = start;
        self.window.end_date = window_end(start, self.window.final_end_date, self.policy.width_days);
        self.window.page = 1;

        if self.window.is_terminal() {
            Transition::Finished
        } else {
            Transition::NextWindow {
                start: self.window.start_date,
                end: self.window.end_date,
            }
        }
    }
}
