use crate::config::parser::parse_date;
use crate::config::types::{ApiConfig, Config, CrawlerConfig, FilterConfig, OutputConfig, SearchConfig};
use crate::ConfigError;
use url::Url;

/// Hard ceiling the search API places on pagination depth
const API_MAX_PAGES: u32 = 10;

/// Hard ceiling the search API places on page size
const API_MAX_PER_PAGE: u32 = 100;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_search_config(&config.search)?;
    validate_api_config(&config.api)?;
    validate_filter_config(&config.filter)?;
    validate_output_config(&config.output)?;
    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.batch_size < 1 {
        return Err(ConfigError::Validation(format!(
            "batch_size must be >= 1, got {}",
            config.batch_size
        )));
    }

    Ok(())
}

/// Validates the search window configuration
fn validate_search_config(config: &SearchConfig) -> Result<(), ConfigError> {
    if config.language.trim().is_empty() {
        return Err(ConfigError::Validation("language cannot be empty".to_string()));
    }

    let start = parse_date(&config.start_date)?;
    let end = parse_date(&config.end_date)?;
    if start > end {
        return Err(ConfigError::Validation(format!(
            "start_date {} is after end_date {}",
            start, end
        )));
    }

    if config.window_days < 1 {
        return Err(ConfigError::Validation(format!(
            "window_days must be >= 1, got {}",
            config.window_days
        )));
    }

    if config.max_pages < 1 || config.max_pages > API_MAX_PAGES {
        return Err(ConfigError::Validation(format!(
            "max_pages must be between 1 and {}, got {}",
            API_MAX_PAGES, config.max_pages
        )));
    }

    if config.per_page < 1 || config.per_page > API_MAX_PER_PAGE {
        return Err(ConfigError::Validation(format!(
            "per_page must be between 1 and {}, got {}",
            API_MAX_PER_PAGE, config.per_page
        )));
    }

    Ok(())
}

/// Validates API configuration
fn validate_api_config(config: &ApiConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if url.scheme() != "https" && url.scheme() != "http" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' must use http or https",
            config.base_url
        )));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    if config.wait_report_secs < 1 {
        return Err(ConfigError::Validation(
            "wait_report_secs must be >= 1".to_string(),
        ));
    }

    if config.timeout_secs < 1 {
        return Err(ConfigError::Validation(
            "timeout_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates qualification markers and classification rules
fn validate_filter_config(config: &FilterConfig) -> Result<(), ConfigError> {
    if config.manifest_path.trim().is_empty() {
        return Err(ConfigError::Validation(
            "manifest_path cannot be empty".to_string(),
        ));
    }

    if config.required_markers.iter().all(|m| m.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "required_markers must contain at least one marker".to_string(),
        ));
    }

    if config.any_markers.iter().all(|m| m.trim().is_empty()) {
        return Err(ConfigError::Validation(
            "any_markers must contain at least one marker".to_string(),
        ));
    }

    if !config.extension.starts_with('.') || config.extension.len() < 2 {
        return Err(ConfigError::Validation(format!(
            "extension must look like '.py', got '{}'",
            config.extension
        )));
    }

    if config.test_prefixes.is_empty() && config.test_segments.is_empty() {
        return Err(ConfigError::Validation(
            "at least one test prefix or test segment is required".to_string(),
        ));
    }

    if config.max_files_per_class < 1 {
        return Err(ConfigError::Validation(
            "max_files_per_class must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates output configuration
fn validate_output_config(config: &OutputConfig) -> Result<(), ConfigError> {
    for (name, value) in [
        ("result_dir", &config.result_dir),
        ("results_file", &config.results_file),
        ("checked_file", &config.checked_file),
        ("cursor_file", &config.cursor_file),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::Validation(format!("{} cannot be empty", name)));
        }
    }

    Ok(())
}
