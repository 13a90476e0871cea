//! TTL cache around a single generated value.
//!
//! ```text
//!   get(force) ──► lock ──► stale? ──no──► clone cached value
//!                              │
//!                             yes
//!                              ▼
//!                    strategy.generate()  (guard still held)
//!                              │
//!                 ┌────────────┴────────────┐
//!               Err / ""                   Ok(v)
//!                 │                          │
//!         return error,              store v, stamp now_utc,
//!         state untouched            calls_made += 1
//! ```

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::error::{GenerationError, Result};
use crate::strategy::GenerationStrategy;

/// Default freshness window.
///
/// RDS IAM authentication tokens are valid for 15 minutes; refreshing a minute
/// early leaves room for the connection handshake.
pub const DEFAULT_TTL: Duration = Duration::from_secs(14 * 60);

/// Thread-safe, lazily populated TTL cache for one credential-derived string.
///
/// The guard is held across the whole refresh, including the strategy call,
/// so at most one generation runs per cache. Callers that arrive while a
/// refresh is in flight block until it finishes and then observe its result.
///
/// # Examples
///
/// ```
/// use iamdsn_cache::{CredentialCache, GenerationError};
///
/// let cache = CredentialCache::new(|| Ok::<_, GenerationError>("user:token@tcp(db:3306)/app".to_string()));
///
/// assert_eq!(cache.calls_made(), 0);
/// let dsn = cache.get(false).unwrap();
/// assert_eq!(cache.get(false).unwrap(), dsn);
/// assert_eq!(cache.calls_made(), 1);
/// ```
pub struct CredentialCache<S, C = SystemClock> {
    strategy: S,
    clock: C,
    ttl: Duration,
    ttl_delta: TimeDelta,
    state: Mutex<CacheState>,
}

/// Everything the guard protects; always updated as one unit.
#[derive(Default)]
struct CacheState {
    current: Option<CachedValue>,
    calls_made: u64,
}

struct CachedValue {
    value: String,
    refreshed_at: DateTime<Utc>,
}

impl<S: GenerationStrategy> CredentialCache<S> {
    /// Create an empty cache using the system clock and [`DEFAULT_TTL`].
    pub fn new(strategy: S) -> Self {
        Self::with_clock(strategy, SystemClock)
    }
}

impl<S: GenerationStrategy, C: Clock> CredentialCache<S, C> {
    /// Create an empty cache reading time from `clock`.
    pub fn with_clock(strategy: S, clock: C) -> Self {
        Self {
            strategy,
            clock,
            ttl: DEFAULT_TTL,
            ttl_delta: to_delta(DEFAULT_TTL),
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Set how long a generated value stays fresh.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self.ttl_delta = to_delta(ttl);
        self
    }

    /// Configured freshness window
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Return the cached value, regenerating it first when it is missing,
    /// older than the TTL, or `force` is set.
    ///
    /// On failure the previously cached value, its timestamp and the call
    /// counter are left exactly as they were.
    pub fn get(&self, force: bool) -> Result<String> {
        let mut state = self.state.lock();

        if !force && !self.is_stale_at(&state, self.clock.now()) {
            if let Some(cached) = &state.current {
                tracing::trace!(refreshed_at = %cached.refreshed_at, "credential cache hit");
                return Ok(cached.value.clone());
            }
        }

        let value = self.strategy.generate()?;
        if value.is_empty() {
            return Err(GenerationError::Empty);
        }

        let refreshed_at = self.clock.now();
        state.calls_made += 1;
        state.current = Some(CachedValue {
            value: value.clone(),
            refreshed_at,
        });

        tracing::debug!(
            forced = force,
            calls_made = state.calls_made,
            ttl_secs = self.ttl.as_secs(),
            %refreshed_at,
            "refreshed cached credential"
        );

        Ok(value)
    }

    /// Number of successful generations since the cache was created.
    pub fn calls_made(&self) -> u64 {
        self.state.lock().calls_made
    }

    /// Whether the next unforced [`get`](Self::get) would regenerate.
    pub fn is_stale(&self) -> bool {
        let state = self.state.lock();
        self.is_stale_at(&state, self.clock.now())
    }

    /// Consistent copy of the cached state, or `None` if nothing was ever
    /// generated (or the cache was [invalidated](Self::invalidate)).
    pub fn snapshot(&self) -> Option<CacheSnapshot> {
        let state = self.state.lock();
        state.current.as_ref().map(|cached| CacheSnapshot {
            value: cached.value.clone(),
            refreshed_at: cached.refreshed_at,
            expires_at: cached.refreshed_at.checked_add_signed(self.ttl_delta),
            calls_made: state.calls_made,
        })
    }

    /// Drop the cached value so the next `get` regenerates. The call counter
    /// is kept.
    pub fn invalidate(&self) {
        self.state.lock().current = None;
    }

    fn is_stale_at(&self, state: &CacheState, now: DateTime<Utc>) -> bool {
        match &state.current {
            None => true,
            // an expiry past the representable range never arrives
            Some(cached) => cached
                .refreshed_at
                .checked_add_signed(self.ttl_delta)
                .is_some_and(|expires_at| now > expires_at),
        }
    }
}

impl<S, C> fmt::Debug for CredentialCache<S, C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("CredentialCache")
            .field("ttl", &self.ttl)
            .field("populated", &state.current.is_some())
            .field("calls_made", &state.calls_made)
            .finish()
    }
}

fn to_delta(ttl: Duration) -> TimeDelta {
    TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX)
}

/// Point-in-time copy of a cache's state.
#[derive(Clone, PartialEq, Eq)]
pub struct CacheSnapshot {
    /// Cached value
    pub value: String,

    /// When the value was generated (UTC)
    pub refreshed_at: DateTime<Utc>,

    /// When the value stops being served without regeneration
    pub expires_at: Option<DateTime<Utc>>,

    /// Successful generations so far
    pub calls_made: u64,
}

impl fmt::Debug for CacheSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheSnapshot")
            .field("value", &"[REDACTED]")
            .field("refreshed_at", &self.refreshed_at)
            .field("expires_at", &self.expires_at)
            .field("calls_made", &self.calls_made)
            .finish()
    }
}
