//! Configuration module for Repo-Sieve
//!
//! This module handles loading, parsing, and validating TOML configuration files,
//! and resolving API credentials from the config file and the environment.
//!
//! # Example
//!
//! ```no_run
//! use repo_sieve::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("sieve.toml")).unwrap();
//! println!("Searching {} repositories", config.search.language);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{ApiConfig, Config, CrawlerConfig, FilterConfig, OutputConfig, SearchConfig};

// Re-export parser functions
pub use parser::{
    compute_config_hash, load_config, load_config_with_hash, parse_date, parse_token_list,
    resolve_tokens,
};
pub use validation::validate;
