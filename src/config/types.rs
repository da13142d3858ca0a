use serde::Deserialize;

/// Main configuration structure for Repo-Sieve
///
/// Every section and key is optional in the TOML file; missing values fall back to the
/// defaults below, so `Config::default()` describes a complete crawl of Python
/// repositories that depend on both pytest and FastAPI.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub crawler: CrawlerConfig,
    pub search: SearchConfig,
    pub api: ApiConfig,
    pub filter: FilterConfig,
    pub output: OutputConfig,
}

/// Crawl loop behavior
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct CrawlerConfig {
    /// Maximum number of repository pipelines in flight at once
    pub batch_size: usize,

    /// Pause between two search pages (milliseconds)
    pub politeness_delay_ms: u64,

    /// Pause before re-polling a search page that failed (seconds)
    pub failure_backoff_secs: u64,

    /// Extra rounds for repositories whose manifest failed transiently, run after the
    /// failure backoff before the cursor leaves the page
    pub deferred_retries: u32,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            batch_size: 100,
            politeness_delay_ms: 1000,
            failure_backoff_secs: 60,
            deferred_retries: 2,
        }
    }
}

/// Search query and date window configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct SearchConfig {
    /// Repository language qualifier
    pub language: String,

    /// Sort key passed to the search endpoint
    pub sort: String,

    /// First creation date searched (YYYY-MM-DD)
    pub start_date: String,

    /// Last creation date searched (YYYY-MM-DD)
    pub end_date: String,

    /// Width of one creation-date window in days
    pub window_days: u32,

    /// Deepest page requested within one window
    pub max_pages: u32,

    /// Results requested per page
    pub per_page: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            language: "Python".to_string(),
            sort: "stars".to_string(),
            start_date: "2008-01-01".to_string(),
            end_date: "2025-03-20".to_string(),
            window_days: 14,
            max_pages: 10,
            per_page: 100,
        }
    }
}

/// Remote API and credential configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ApiConfig {
    /// Root of the REST API
    pub base_url: String,

    /// User-Agent header sent with every request
    pub user_agent: String,

    /// Tokens listed directly in the config file
    pub tokens: Vec<String>,

    /// Environment variable holding a comma-separated token list
    pub tokens_env: String,

    /// Remaining-quota level at which the crawler rotates or waits
    pub rate_limit_threshold: u64,

    /// Seconds added to a reset timestamp before the quota is assumed renewed
    pub reset_margin_secs: u64,

    /// Interval between countdown reports during a rate-limit wait (seconds)
    pub wait_report_secs: u64,

    /// Per-request timeout (seconds)
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.github.com".to_string(),
            user_agent: format!("repo-sieve/{}", env!("CARGO_PKG_VERSION")),
            tokens: Vec::new(),
            tokens_env: "GITHUB_TOKENS".to_string(),
            rate_limit_threshold: 5,
            reset_margin_secs: 10,
            wait_report_secs: 60,
            timeout_secs: 30,
        }
    }
}

/// Qualification predicate and file classification rules
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FilterConfig {
    /// Manifest file inspected to decide qualification
    pub manifest_path: String,

    /// Markers that must all appear in the manifest (case-insensitive)
    pub required_markers: Vec<String>,

    /// Markers of which at least one must appear in the manifest (case-insensitive)
    pub any_markers: Vec<String>,

    /// Extension of the source-language files collected
    pub extension: String,

    /// Path prefixes that mark a file as a test
    pub test_prefixes: Vec<String>,

    /// Path fragments that mark a file as a test wherever they appear
    pub test_segments: Vec<String>,

    /// Maximum files kept per class and repository
    pub max_files_per_class: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            manifest_path: "requirements.txt".to_string(),
            required_markers: vec!["pytest".to_string()],
            any_markers: vec!["fastapi".to_string(), "fast-api".to_string()],
            extension: ".py".to_string(),
            test_prefixes: vec!["tests/".to_string(), "test_".to_string()],
            test_segments: vec!["/tests/".to_string()],
            max_files_per_class: 50,
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct OutputConfig {
    /// Directory holding every persisted store
    pub result_dir: String,

    /// Append-only JSONL file of collected repositories
    pub results_file: String,

    /// Snapshot of checked and qualified repositories
    pub checked_file: String,

    /// Snapshot of the crawl cursor
    pub cursor_file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            result_dir: "result".to_string(),
            results_file: "pytest_fastapi_code_collection.jsonl".to_string(),
            checked_file: "checked_repos.json".to_string(),
            cursor_file: "date_tracking.json".to_string(),
        }
    }
}
