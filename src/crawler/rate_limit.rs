//! Rate-limit handling
//!
//! Every response's quota telemetry passes through the `RateLimiter`. While quota
//! remains above the threshold nothing happens. Below it, the limiter rotates to a
//! credential that still has quota, or, when none is left, suspends the calling fetch
//! until the earliest reset time. Rotation and sleep decisions are serialized through
//! one async gate so concurrent fetches that see the same exhaustion act on it once.

use crate::config::ApiConfig;
use crate::crawler::parser::RateStatus;
use crate::crawler::shutdown::ShutdownListener;
use crate::state::CredentialPool;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;

/// What the limiter did with one telemetry sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateDecision {
    /// Quota is fine, or renewed before a wait was needed
    Ok,

    /// Another credential is now active
    Rotated,

    /// The crawl slept until the quota reset
    Waited,

    /// Shutdown arrived during a wait
    Interrupted,
}

/// Thresholds and timing for rate-limit handling
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Remaining-quota level at or below which the limiter acts
    pub threshold: u64,

    /// Added to the reset time before the quota is assumed renewed
    pub reset_margin: Duration,

    /// Interval between countdown reports while waiting
    pub report_interval: Duration,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::from(&ApiConfig::default())
    }
}

impl From<&ApiConfig> for RateLimitPolicy {
    fn from(config: &ApiConfig) -> Self {
        Self {
            threshold: config.rate_limit_threshold,
            reset_margin: Duration::from_secs(config.reset_margin_secs),
            report_interval: Duration::from_secs(config.wait_report_secs.max(1)),
        }
    }
}

pub struct RateLimiter {
    pool: Arc<CredentialPool>,
    policy: RateLimitPolicy,
    gate: AsyncMutex<()>,
    shutdown: ShutdownListener,
}

impl RateLimiter {
    pub fn new(pool: Arc<CredentialPool>, policy: RateLimitPolicy, shutdown: ShutdownListener) -> Self {
        Self {
            pool,
            policy,
            gate: AsyncMutex::new(()),
            shutdown,
        }
    }

    pub fn pool(&self) -> &Arc<CredentialPool> {
        &self.pool
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    /// Acts on the telemetry of a response obtained with credential `used`
    ///
    /// `used` is `None` for unauthenticated requests.
    pub async fn apply(&self, status: RateStatus, used: Option<&str>) -> RateDecision {
        if let Some(secret) = used {
            self.pool.record_reset_time(secret, status.reset_at);
        }

        if status.remaining > self.policy.threshold {
            return RateDecision::Ok;
        }

        tracing::debug!(
            "Quota low: {} requests left, resets at {}",
            status.remaining,
            status.reset_at
        );

        if let Some(secret) = used {
            self.pool.mark_exhausted(secret, status.reset_at);
        }

        let _gate = self.gate.lock().await;

        if self.pool.rotate_away_from(used, Utc::now()) {
            return RateDecision::Rotated;
        }

        let reset_at = match self.pool.earliest_exhausted_reset() {
            Some(earliest) => earliest.min(status.reset_at),
            None => status.reset_at,
        };
        self.wait_until(reset_at).await
    }

    /// Rotates after the API rejected a request for quota reasons without telemetry
    pub async fn rotate_after_rejection(&self, used: Option<&str>) -> bool {
        let _gate = self.gate.lock().await;
        self.pool.rotate_away_from(used, Utc::now())
    }

    /// Sleeps until `reset_at` plus the margin; called with the gate held
    async fn wait_until(&self, reset_at: DateTime<Utc>) -> RateDecision {
        let margin = chrono::Duration::from_std(self.policy.reset_margin)
            .unwrap_or_else(|_| chrono::Duration::zero());
        let deadline = reset_at + margin;

        let mut remaining = match (deadline - Utc::now()).to_std() {
            Ok(wait) if !wait.is_zero() => wait,
            // Reset already passed, typically renewed while another fetch waited
            _ => {
                self.pool.clear_exhaustion();
                return RateDecision::Ok;
            }
        };

        tracing::info!(
            "API rate limit reached for all tokens. Waiting {} until {}",
            format_wait(remaining),
            deadline.format("%Y-%m-%d %H:%M:%S UTC")
        );

        while !remaining.is_zero() {
            let step = remaining.min(self.policy.report_interval);
            if self.shutdown.sleep(step).await {
                tracing::info!("Rate limit wait interrupted by shutdown");
                return RateDecision::Interrupted;
            }
            remaining = remaining.saturating_sub(step);
            if !remaining.is_zero() {
                tracing::info!("Remaining wait time: {}", format_wait(remaining));
            }
        }

        self.pool.clear_exhaustion();
        tracing::info!("Rate limit wait finished, quotas renewed");
        RateDecision::Waited
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("pool", &self.pool)
            .field("policy", &self.policy)
            .finish()
    }
}

fn format_wait(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
}
