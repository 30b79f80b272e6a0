use std::time::Duration;

use aemet_harvester::fetcher::retry_formatter::{FailureCause, FailureKind, RetryContext};

fn sample_context(kind: FailureKind) -> RetryContext {
    RetryContext::new(
        2,
        5,
        FailureCause::new(kind, "upstream said no"),
        Duration::from_secs(4),
        "3195,3196",
        "https://opendata.aemet.es/opendata/api/valores/climatologicos/diarios/datos",
    )
}

#[test]
fn format_retry_captures_attempt_and_wait() {
    let message = sample_context(FailureKind::Timeout).format_retry();
    assert!(message.contains("attempt 3/5"));
    assert!(message.contains("timeout"));
    assert!(message.contains("4.0 seconds"));
    assert!(message.contains("3195,3196"));
}

#[test]
fn format_success_includes_unit() {
    let message = sample_context(FailureKind::RateLimit).format_success();
    assert!(message.contains("Retry attempt 2/5 succeeded"));
    assert!(message.contains("3195,3196"));
}

#[test]
fn unauthorized_failure_points_at_the_api_key() {
    let output = sample_context(FailureKind::ClientError(401)).format_failure();
    assert!(output.contains("unauthorized"));
    assert!(output.contains("AEMET_API_KEY"));
    assert!(!output.contains("--max-attempts"), "not retryable, no attempt advice");
}

#[test]
fn failure_without_unit_says_unknown() {
    let ctx = RetryContext::new(
        1,
        1,
        FailureCause::new(FailureKind::Dns, ""),
        Duration::ZERO,
        "",
        "https://opendata.aemet.es",
    );
    let output = ctx.format_failure();
    assert!(output.contains("Unit: unknown"));
    assert!(output.contains("Last error: DNS failure"));
}
