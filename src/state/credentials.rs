use chrono::{DateTime, Utc};
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// One interchangeable API credential and what is known about its quota
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    secret: String,

    /// When the quota of this credential is next renewed, as last reported by the API
    reset_at: Option<DateTime<Utc>>,

    /// Whether the API last reported this credential as (nearly) out of quota
    exhausted: bool,
}

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            reset_at: None,
            exhausted: false,
        }
    }

    pub fn secret(&self) -> &str {
        &self.secret
    }

    pub fn reset_at(&self) -> Option<DateTime<Utc>> {
        self.reset_at
    }

    /// Value of the `Authorization` header for this credential
    pub fn authorization(&self) -> String {
        format!("token {}", self.secret)
    }

    /// Returns true while the credential is marked exhausted and its reset is still ahead
    pub fn is_exhausted_at(&self, now: DateTime<Utc>) -> bool {
        self.exhausted && self.reset_at.map_or(true, |reset| reset > now)
    }
}

// Secrets never reach the logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("secret", &"***")
            .field("reset_at", &self.reset_at)
            .field("exhausted", &self.exhausted)
            .finish()
    }
}

struct PoolInner {
    credentials: Vec<Credential>,
    active: usize,
}

/// Round-robin pool of API credentials
///
/// The pool owns every credential for the lifetime of the crawl and tracks which one is
/// active. It is shared by all in-flight fetches, so the active index and the per-credential
/// reset times live behind a mutex. An empty pool is valid: requests then go out
/// unauthenticated under the API's much smaller anonymous quota.
pub struct CredentialPool {
    inner: Mutex<PoolInner>,
}

impl CredentialPool {
    /// Creates a pool from raw secrets; the first secret starts out active
    pub fn new(secrets: Vec<String>) -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                credentials: secrets.into_iter().map(Credential::new).collect(),
                active: 0,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, PoolInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Number of credentials in the pool
    pub fn len(&self) -> usize {
        self.lock().credentials.len()
    }

    /// Returns true when no credentials are configured
    pub fn is_empty(&self) -> bool {
        self.lock().credentials.is_empty()
    }

    /// Returns a copy of the active credential, if any
    pub fn current(&self) -> Option<Credential> {
        let inner = self.lock();
        inner.credentials.get(inner.active).cloned()
    }

    /// Advances to the next credential in round-robin order
    ///
    /// Returns false, without changing anything, when the pool holds fewer than two
    /// credentials.
    pub fn rotate(&self) -> bool {
        let mut inner = self.lock();
        let len = inner.credentials.len();
        if len <= 1 {
            return false;
        }

        inner.active = (inner.active + 1) % len;
        tracing::info!("Rotating to token {}/{}", inner.active + 1, len);
        true
    }

    /// Moves the pool off a credential that was observed to be exhausted
    ///
    /// `observed` is the secret that was active when the exhaustion was seen. If another
    /// fetch already rotated away from it, nothing changes and the call reports success.
    /// Otherwise the next credential not known to be exhausted at `now` becomes active.
    /// Returns false when no such credential exists.
    pub fn rotate_away_from(&self, observed: Option<&str>, now: DateTime<Utc>) -> bool {
        let mut inner = self.lock();
        let len = inner.credentials.len();
        if len <= 1 {
            return false;
        }

        let active_secret = inner.credentials[inner.active].secret.as_str();
        if observed.is_some_and(|secret| secret != active_secret) {
            tracing::debug!("Token already rotated by a concurrent request");
            return true;
        }

        for step in 1..len {
            let candidate = (inner.active + step) % len;
            if !inner.credentials[candidate].is_exhausted_at(now) {
                inner.active = candidate;
                tracing::info!("Rotating to token {}/{}", candidate + 1, len);
                return true;
            }
        }

        false
    }

    /// Records when the quota of `secret` is next renewed
    pub fn record_reset_time(&self, secret: &str, reset_at: DateTime<Utc>) {
        let mut inner = self.lock();
        if let Some(credential) = inner.credentials.iter_mut().find(|c| c.secret == secret) {
            credential.reset_at = Some(reset_at);
        }
    }

    /// Marks `secret` as out of quota until `reset_at`
    pub fn mark_exhausted(&self, secret: &str, reset_at: DateTime<Utc>) {
        let mut inner = self.lock();
        if let Some(credential) = inner.credentials.iter_mut().find(|c| c.secret == secret) {
            credential.reset_at = Some(reset_at);
            credential.exhausted = true;
        }
    }

    /// Earliest reset time among credentials currently marked exhausted
    pub fn earliest_exhausted_reset(&self) -> Option<DateTime<Utc>> {
        self.lock()
            .credentials
            .iter()
            .filter(|c| c.exhausted)
            .filter_map(|c| c.reset_at)
            .min()
    }

    /// Forgets every exhaustion mark, after a wait has renewed all quotas
    pub fn clear_exhaustion(&self) {
        for credential in self.lock().credentials.iter_mut() {
            credential.exhausted = false;
        }
    }
}

impl fmt::Debug for CredentialPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("CredentialPool")
            .field("len", &inner.credentials.len())
            .field("active", &inner.active)
            .finish()
    }
}
