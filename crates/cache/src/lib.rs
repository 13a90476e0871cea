//! iamdsn cache - time-to-live cache around a single credential-derived value
//!
//! Issuing a fresh short-lived secret (an IAM authentication token, say) is
//! slow and rate-limited. [`CredentialCache`] keeps the last generated value
//! and only calls its [`GenerationStrategy`] again when the value is missing,
//! older than its TTL, or the caller forces a refresh.
//!
//! # Guarantees
//!
//! - **At most one generation in flight** per cache; concurrent callers wait
//!   for it and share its result
//! - **No partial updates** - value, timestamp and call counter change together
//! - **Failures never poison** - a failed refresh leaves the previous state intact
//! - **Empty is an error** - a strategy that returns `""` is reported, not cached
#![forbid(unsafe_code)]

/// The TTL cache itself
pub mod cache;
/// Wall-clock abstraction (system and manual clocks)
pub mod clock;
/// Generation error taxonomy
pub mod error;
/// Generation strategy capability
pub mod strategy;

pub use crate::cache::{CacheSnapshot, CredentialCache, DEFAULT_TTL};
pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::error::{BoxError, GenerationError, Result};
pub use crate::strategy::GenerationStrategy;
