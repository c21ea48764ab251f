//! Retry executor behavior under a paused clock
//!
//! Time is paused, so backoff sleeps complete instantly while the recorded
//! delays still show what a real run would have waited.

use m365ops::M365Error;
use m365ops::retry::{
    AttemptResult, BackoffKind, ClassificationRule, Classifier, ErrorCategory, RetryExecutor,
    RetryPolicy,
};
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

fn executor(max_attempts: u32, base_secs: u64) -> RetryExecutor {
    RetryExecutor::new(
        RetryPolicy::new(max_attempts, Duration::from_secs(base_secs)),
        Classifier::default(),
    )
}

fn secs(delays: &[Duration]) -> Vec<u64> {
    delays.iter().map(Duration::as_secs).collect()
}

#[tokio::test(start_paused = true)]
async fn test_always_failing_runs_exactly_max_attempts() {
    let calls = AtomicU32::new(0);
    let counter = &calls;
    let result: AttemptResult<(), String> = executor(4, 1)
        .run("always fails", move |_| async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err("HTTP 503 Service Unavailable".to_string())
        })
        .await;

    assert!(!result.success());
    assert_eq!(result.attempts, 4);
    assert_eq!(calls.load(Ordering::SeqCst), 4);
    assert_eq!(result.category, Some(ErrorCategory::ServiceUnavailable));
    // Extended backoff: base * 3 * attempt, one sleep between each pair of attempts
    assert_eq!(secs(&result.delays), vec![3, 6, 9]);
}

#[tokio::test(start_paused = true)]
async fn test_success_on_attempt_k() {
    let result = executor(5, 2)
        .run("flaky", |attempt| async move {
            if attempt < 3 {
                Err("connection reset by peer (network)".to_string())
            } else {
                Ok(attempt * 10)
            }
        })
        .await;

    assert!(result.success());
    assert_eq!(result.attempts, 3);
    assert_eq!(result.category, Some(ErrorCategory::NetworkError));
    assert_eq!(result.into_result().unwrap(), 30);
}

#[tokio::test(start_paused = true)]
async fn test_first_attempt_success_has_no_category() {
    let result: AttemptResult<&str, String> =
        executor(3, 2).run("ok", |_| async { Ok("done") }).await;
    assert_eq!(result.attempts, 1);
    assert_eq!(result.category, None);
    assert_eq!(result.total_delay(), Duration::ZERO);
}

#[tokio::test(start_paused = true)]
async fn test_exponential_sequence_for_rate_limits() {
    let result: AttemptResult<(), String> = executor(5, 2)
        .run("throttled", |_| async {
            Err("HTTP 429 Too Many Requests".to_string())
        })
        .await;

    assert_eq!(result.attempts, 5);
    assert_eq!(secs(&result.delays), vec![2, 4, 8, 16]);
}

#[tokio::test(start_paused = true)]
async fn test_forbidden_stops_after_one_attempt() {
    for max_attempts in [1, 3, 10] {
        let result: AttemptResult<(), String> = executor(max_attempts, 2)
            .run("forbidden", |_| async { Err("403 Forbidden".to_string()) })
            .await;

        assert_eq!(result.attempts, 1);
        assert_eq!(result.category, Some(ErrorCategory::Permission));
        assert!(result.delays.is_empty());
    }
}

#[tokio::test(start_paused = true)]
async fn test_retry_after_overrides_backoff() {
    let result = executor(3, 2)
        .run("graph", |attempt| async move {
            if attempt == 1 {
                Err(M365Error::GraphApiError {
                    status: 429,
                    message: "TooManyRequests".into(),
                    retry_after: Some(Duration::from_secs(17)),
                })
            } else {
                Ok(())
            }
        })
        .await;

    assert!(result.success());
    assert_eq!(secs(&result.delays), vec![17]);
}

#[tokio::test(start_paused = true)]
async fn test_delays_never_decrease() {
    let policy = RetryPolicy::new(8, Duration::from_secs(1))
        .with_network_cap(Duration::from_secs(4))
        .with_max_delay(Duration::from_secs(60));

    for pattern in ["HTTP 429", "HTTP 503", "request timed out", "network unreachable"] {
        let executor = RetryExecutor::new(policy.clone(), Classifier::default());
        let result: AttemptResult<(), String> = executor
            .run("monotonic", |_| async move { Err(pattern.to_string()) })
            .await;

        assert_eq!(result.attempts, 8, "{}", pattern);
        assert!(
            result.delays.windows(2).all(|w| w[0] <= w[1]),
            "{}: {:?}",
            pattern,
            result.delays
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_custom_rule_takes_precedence() {
    // Treat a specific AADSTS code as transient
    let custom = ClassificationRule::new(
        ErrorCategory::ServiceUnavailable,
        r"AADSTS90033",
        true,
        BackoffKind::Linear,
    )
    .unwrap();
    let executor = RetryExecutor::new(
        RetryPolicy::new(3, Duration::from_secs(1)),
        Classifier::with_custom_rules(vec![custom]),
    );

    let result: AttemptResult<(), String> = executor
        .run("token", |_| async {
            Err("AADSTS90033: A transient error has occurred".to_string())
        })
        .await;
    assert_eq!(result.attempts, 3);
    assert_eq!(secs(&result.delays), vec![1, 2]);

    // Other AADSTS codes still fail fast
    let result: AttemptResult<(), String> = executor
        .run("token", |_| async {
            Err("AADSTS7000215: Invalid client secret provided".to_string())
        })
        .await;
    assert_eq!(result.attempts, 1);
    assert_eq!(result.category, Some(ErrorCategory::Authentication));
}

#[test]
fn test_classification_is_order_dependent() {
    let message = "HTTP 404 while throttled";
    let rate_first = Classifier::new(vec![
        ClassificationRule::new(ErrorCategory::RateLimit, "throttl", true, BackoffKind::Exponential)
            .unwrap(),
        ClassificationRule::new(ErrorCategory::NotFound, "404", false, BackoffKind::None).unwrap(),
    ]);
    let not_found_first = Classifier::new(rate_first.rules().iter().rev().cloned().collect());

    assert_eq!(rate_first.classify(message).category, ErrorCategory::RateLimit);
    assert_eq!(not_found_first.classify(message).category, ErrorCategory::NotFound);
    // Deterministic for a fixed rule set
    assert_eq!(rate_first.classify(message), rate_first.classify(message));
}
