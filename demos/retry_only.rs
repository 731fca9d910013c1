//! Retrying a flaky operation: capped exponential delays, a jittered custom schedule, and a
//! deadline that cuts the run short.
use rand::Rng;
use retrier::prelude::*;
use std::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

#[derive(Debug, Clone, PartialEq, Eq)]
enum FetchError {
    Unavailable(usize),
    NotFound,
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::Unavailable(n) => write!(f, "service unavailable (call {})", n),
            FetchError::NotFound => write!(f, "not found"),
        }
    }
}

impl std::error::Error for FetchError {}

// Retryable for the first `failures` calls, then succeeds.
fn flaky(calls: &AtomicUsize, failures: usize) -> WorkOutcome<FetchError> {
    let n = calls.fetch_add(1, Ordering::SeqCst);
    if n < failures {
        WorkOutcome::retry(FetchError::Unavailable(n))
    } else {
        WorkOutcome::success()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();
    println!("=== retrier: retry-only example ===\n");

    // 1) Capped exponential: 50ms, 100ms, 200ms, then 250ms forever.
    let retrier = Retrier::builder()
        .max_retries(5)
        .schedule(Delay::capped_exponential(
            Duration::from_millis(50),
            2,
            Duration::from_millis(250),
        ))
        .build();
    let calls = AtomicUsize::new(0);
    retrier
        .run(|| {
            let outcome = flaky(&calls, 3);
            async move { outcome }
        })
        .await?;
    println!("succeeded after {} calls", calls.load(Ordering::SeqCst));

    // 2) Jitter is the caller's business: wrap a schedule in a closure.
    let base = Delay::linear(Duration::from_millis(20));
    let jittered = move |attempt: usize| {
        let delay = base.delay(attempt);
        let spread = rand::rng().random_range(0..=delay.as_millis() as u64 / 2);
        delay + Duration::from_millis(spread)
    };
    let retrier = Retrier::builder().max_retries(2).schedule(jittered).build();
    let result = retrier.run(|| async { WorkOutcome::retry(FetchError::Unavailable(0)) }).await;
    match result {
        Err(err @ RetryError::Exhausted { .. }) => println!("gave up: {}", err),
        other => println!("unexpected: {:?}", other),
    }

    // 3) Non-retryable errors come back untouched.
    let result = retrier.run(|| async { WorkOutcome::fatal(FetchError::NotFound) }).await;
    assert_eq!(result, Err(RetryError::Work(FetchError::NotFound)));

    // 4) A deadline beats an unlimited budget.
    let retrier = Retrier::new(RetryLimit::Unlimited, Delay::constant(Duration::from_millis(40)));
    let token = CancelToken::with_timeout(Duration::from_millis(150));
    let result = retrier
        .run_with_cancellation(&token, |_token| async {
            WorkOutcome::retry(FetchError::Unavailable(0))
        })
        .await;
    println!("deadline run ended with: {}", result.unwrap_err());

    Ok(())
}
