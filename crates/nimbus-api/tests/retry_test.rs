// Backoff timing for `retry_with_backoff`, on a paused clock.
#![allow(clippy::unwrap_used)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::time::Instant;

use nimbus_api::{Error, RetryPolicy, retry_with_backoff};

fn unavailable() -> Error {
    Error::Status {
        status: 503,
        url: "http://nimbus.test/api".into(),
        body: String::new(),
    }
}

fn assert_within(actual: Duration, expected: Duration) {
    assert!(
        actual >= expected && actual < expected + Duration::from_millis(50),
        "expected ~{expected:?}, got {actual:?}"
    );
}

#[tokio::test(start_paused = true)]
async fn test_waits_double_between_attempts() {
    let policy = RetryPolicy::default();
    let calls = AtomicU32::new(0);
    let started = Instant::now();
    let mut seen = Vec::new();

    let result: Result<(), Error> = retry_with_backoff(&policy, |attempt| {
        calls.fetch_add(1, Ordering::SeqCst);
        seen.push((attempt, started.elapsed()));
        async { Err(unavailable()) }
    })
    .await;

    assert_eq!(result.unwrap_err().status(), Some(503));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
    let attempts: Vec<u32> = seen.iter().map(|(attempt, _)| *attempt).collect();
    assert_eq!(attempts, vec![0, 1, 2]);
    for ((_, at), expected) in seen.iter().zip([0, 1, 3]) {
        assert_within(*at, Duration::from_secs(expected));
    }
    // No sleep after the final attempt.
    assert_within(started.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_success_stops_retrying() {
    let policy = RetryPolicy {
        max_attempts: 5,
        base_delay: Duration::from_secs(1),
    };
    let started = Instant::now();

    let value = retry_with_backoff(&policy, |attempt| async move {
        if attempt < 2 { Err(unavailable()) } else { Ok(attempt) }
    })
    .await
    .unwrap();

    assert_eq!(value, 2);
    assert_within(started.elapsed(), Duration::from_secs(3));
}

#[tokio::test(start_paused = true)]
async fn test_bad_request_returns_immediately() {
    let policy = RetryPolicy::default();
    let calls = AtomicU32::new(0);
    let started = Instant::now();

    let err = retry_with_backoff(&policy, |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        async {
            Err::<(), _>(Error::Status {
                status: 400,
                url: "http://nimbus.test/api".into(),
                body: "bad".into(),
            })
        }
    })
    .await
    .unwrap_err();

    assert_eq!(err.status(), Some(400));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(started.elapsed(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_zero_attempts_still_tries_once() {
    let policy = RetryPolicy {
        max_attempts: 0,
        base_delay: Duration::from_secs(1),
    };
    let calls = AtomicU32::new(0);

    let _ = retry_with_backoff(&policy, |_| {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err::<(), _>(unavailable()) }
    })
    .await;

    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
