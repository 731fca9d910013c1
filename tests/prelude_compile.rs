//! Compile-time prelude coverage test.
use retrier::prelude::*;
use std::time::Duration;

#[tokio::test]
async fn prelude_reexports_core_types() {
    let retrier = Retrier::builder()
        .max_retries(RetryLimit::Max(1))
        .schedule(Delay::none())
        .build();
    let token = CancelToken::new();

    let result: Result<(), RetryError<std::io::Error>> = retrier
        .run_with_cancellation(&token, |_token: CancelToken| async { WorkOutcome::success() })
        .await;
    result.expect("work succeeds");

    assert_eq!(Background.error(), None::<CancelError>);
    assert_eq!(Delay::constant(Duration::from_millis(1)).delay(9), Duration::from_millis(1));
}
