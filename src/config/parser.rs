use crate::config::types::{ApiConfig, Config};
use crate::config::validation::validate;
use crate::ConfigError;
use chrono::NaiveDate;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Environment variable consulted when the token list variable is unset or empty
const SINGLE_TOKEN_ENV: &str = "TOKEN";

/// Loads and parses a configuration file from the given path
///
/// # Arguments
///
/// * `path` - Path to the TOML configuration file
///
/// # Returns
///
/// * `Ok(Config)` - Successfully loaded and validated configuration
/// * `Err(ConfigError)` - Failed to load, parse, or validate the configuration
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    validate(&config)?;
    Ok(config)
}

/// Computes a SHA-256 hash of the configuration file content
///
/// Logged at startup so a resumed crawl can be matched to the settings that started it.
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let result = hasher.finalize();
    Ok(hex::encode(result))
}

/// Loads a configuration and returns both the config and its hash
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let config = load_config(path)?;
    let hash = compute_config_hash(path)?;
    Ok((config, hash))
}

/// Parses a `YYYY-MM-DD` date
pub fn parse_date(value: &str) -> Result<NaiveDate, ConfigError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| ConfigError::InvalidDate(format!("'{}': {}", value, e)))
}

/// Splits a comma-separated token list, dropping blanks
pub fn parse_token_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Collects API tokens from the config file and the environment
///
/// Inline `tokens` come first, followed by the comma-separated list in `tokens_env`.
/// When that variable is unset or empty, a single token in `TOKEN` is used instead.
/// Duplicates are dropped so rotation never lands on the same secret twice in a row.
///
/// `lookup` reads an environment variable; pass `|k| std::env::var(k).ok()` in
/// production.
pub fn resolve_tokens<F>(api: &ApiConfig, lookup: F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut tokens: Vec<String> = api
        .tokens
        .iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    let from_env = lookup(&api.tokens_env)
        .map(|raw| parse_token_list(&raw))
        .unwrap_or_default();

    if from_env.is_empty() {
        if let Some(single) = lookup(SINGLE_TOKEN_ENV) {
            let single = single.trim();
            if !single.is_empty() {
                tokens.push(single.to_string());
            }
        }
    } else {
        tokens.extend(from_env);
    }

    let mut seen = std::collections::HashSet::new();
    tokens.retain(|t| seen.insert(t.clone()));
    tokens
}
