//! Freshness behaviour of `CredentialCache` over simulated time.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use iamdsn_cache::{CredentialCache, GenerationError, ManualClock};
use pretty_assertions::assert_eq;

/// Strategy yielding "dsnA", "dsnB", ... and counting its invocations.
fn lettered() -> (impl Fn() -> Result<String, GenerationError>, Arc<AtomicU64>) {
    let calls = Arc::new(AtomicU64::new(0));
    let counter = Arc::clone(&calls);
    let strategy = move || {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        let letter = char::from(b'A' + u8::try_from(n % 26).unwrap_or(0));
        Ok(format!("dsn{letter}"))
    };
    (strategy, calls)
}

fn minutes(n: u64) -> Duration {
    Duration::from_secs(n * 60)
}

#[test]
fn five_minute_ttl_walkthrough() {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap());
    let (strategy, _) = lettered();
    let cache = CredentialCache::with_clock(strategy, clock.clone()).with_ttl(minutes(5));

    // t = 0
    assert_eq!(cache.get(false).unwrap(), "dsnA");
    assert_eq!(cache.calls_made(), 1);

    // t = 4min
    clock.advance(minutes(4));
    assert_eq!(cache.get(false).unwrap(), "dsnA");
    assert_eq!(cache.calls_made(), 1);

    // t = 6min
    clock.advance(minutes(2));
    assert_eq!(cache.get(false).unwrap(), "dsnB");
    assert_eq!(cache.calls_made(), 2);
}

#[test]
fn forced_get_inside_window_generates_once_each_time() {
    let clock = ManualClock::starting_now();
    let (strategy, calls) = lettered();
    let cache = CredentialCache::with_clock(strategy, clock).with_ttl(minutes(5));

    cache.get(false).unwrap();
    assert_eq!(cache.get(true).unwrap(), "dsnB");
    assert_eq!(cache.get(false).unwrap(), "dsnB");

    assert_eq!(cache.calls_made(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn calls_made_is_monotonic_across_failures() {
    let clock = ManualClock::starting_now();
    let attempts = AtomicU64::new(0);
    let cache = CredentialCache::with_clock(
        move || {
            let n = attempts.fetch_add(1, Ordering::SeqCst);
            if n % 2 == 1 {
                Err(GenerationError::issuance("provider throttled"))
            } else {
                Ok(format!("dsn-{n}"))
            }
        },
        clock,
    );

    let mut observed = Vec::new();
    for _ in 0..6 {
        let _ = cache.get(true);
        observed.push(cache.calls_made());
    }

    assert_eq!(observed, vec![1, 1, 2, 2, 3, 3]);
}

#[test]
fn stale_value_is_not_served_after_failed_refresh() {
    let clock = ManualClock::starting_now();
    let fail = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let switch = Arc::clone(&fail);
    let cache = CredentialCache::with_clock(
        move || {
            if switch.load(Ordering::SeqCst) {
                Err(GenerationError::build("signer rejected credentials"))
            } else {
                Ok("dsn-good".to_string())
            }
        },
        clock.clone(),
    )
    .with_ttl(minutes(5));

    cache.get(false).unwrap();
    let before = cache.snapshot().unwrap();

    fail.store(true, Ordering::SeqCst);
    clock.advance(minutes(6));

    assert!(matches!(cache.get(false), Err(GenerationError::Build { .. })));
    // Still stale, so the next unforced call retries rather than serving the old value.
    assert!(cache.is_stale());
    assert!(cache.get(false).is_err());
    assert_eq!(cache.snapshot().unwrap(), before);

    fail.store(false, Ordering::SeqCst);
    assert_eq!(cache.get(false).unwrap(), "dsn-good");
    assert_eq!(cache.calls_made(), 2);
}
