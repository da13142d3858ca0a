//! State module for tracking crawl progress
//!
//! This module provides the in-memory state of a crawl.
//!
//! # Components
//!
//! - `CredentialPool`: API credentials, the active one, and their quota reset times
//! - `Cursor`: the creation-date window and page the crawl resumes from
//! - `CheckedSet`: repositories already inspected, qualified, or collected

mod checked;
mod credentials;
mod cursor;

// Re-export main types
pub use checked::{CheckedSet, CheckedSnapshot, RepoId};
pub use credentials::{Credential, CredentialPool};
pub use cursor::{CrawlWindow, Cursor, PageSummary, Transition, WindowPolicy, SEARCH_RESULT_CAP};
