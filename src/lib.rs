//! Repo-Sieve: a resumable, rate-limit-aware repository harvester
//!
//! This crate searches a paginated repository search API one creation-date window at a
//! time, keeps only repositories whose dependency manifest declares both a test framework
//! and a web framework, and collects their test and source files. Progress is
//! checkpointed after every unit of work so a multi-day crawl can be interrupted and
//! resumed without re-inspecting repositories or exceeding the API's rate budget.

pub mod classify;
pub mod config;
pub mod crawler;
pub mod output;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Repo-Sieve operations
#[derive(Debug, Error)]
pub enum SieveError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Invalid API URL: {0}")]
    InvalidUrl(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),

    #[error("Invalid date in config: {0}")]
    InvalidDate(String),
}

/// Result type alias for Repo-Sieve operations
pub type Result<T> = std::result::Result<T, SieveError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

// Re-export commonly used types
pub use classify::{FileClass, FileClassifier, ManifestFilter};
pub use config::Config;
pub use state::{CheckedSet, CrawlWindow, CredentialPool, Cursor, RepoId};
pub use storage::{JsonStorage, RepoFile, RepoRecord, Storage};
