//! Retry utilities for transient download failures.
//!
//! Provides classification of retryable errors and exponential backoff.

use crate::error::PipelineError;
use std::time::Duration;

/// Determine whether a pipeline error is worth retrying.
///
/// Retryable: transport failures (no HTTP status), rate limits (429) and
/// server errors (5xx). Everything else, including decode failures, is final.
pub fn is_retryable(error: &PipelineError) -> bool {
    match error {
        PipelineError::Download {
            status_code: Some(code),
            ..
        } => *code == 429 || (500..=599).contains(code),
        PipelineError::Download {
            status_code: None, ..
        } => true,
        _ => false,
    }
}

/// Calculate exponential backoff duration for a given attempt.
///
/// Uses `base_delay * 2^attempt` with a cap at 30 seconds.
pub fn backoff_duration(attempt: u32, base_delay_ms: u64) -> Duration {
    let delay = base_delay_ms.saturating_mul(2u64.saturating_pow(attempt));
    Duration::from_millis(delay.min(30_000))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn download(status_code: Option<u16>) -> PipelineError {
        PipelineError::Download {
            index: 1,
            url: "http://img/1.png".to_string(),
            message: "failed".to_string(),
            status_code,
        }
    }

    #[test]
    fn test_transport_error_is_retryable() {
        assert!(is_retryable(&download(None)));
    }

    #[test]
    fn test_rate_limit_is_retryable() {
        assert!(is_retryable(&download(Some(429))));
    }

    #[test]
    fn test_server_error_is_retryable() {
        assert!(is_retryable(&download(Some(503))));
    }

    #[test]
    fn test_not_found_not_retryable() {
        assert!(!is_retryable(&download(Some(404))));
    }

    #[test]
    fn test_decode_error_not_retryable() {
        let err = PipelineError::Decode {
            index: 1,
            url: "http://img/1.png".to_string(),
            message: "invalid header".to_string(),
        };
        assert!(!is_retryable(&err));
    }

    #[test]
    fn test_backoff_exponential() {
        assert_eq!(backoff_duration(0, 1000), Duration::from_millis(1000));
        assert_eq!(backoff_duration(1, 1000), Duration::from_millis(2000));
        assert_eq!(backoff_duration(2, 1000), Duration::from_millis(4000));
    }

    #[test]
    fn test_backoff_capped_at_30s() {
        assert_eq!(backoff_duration(10, 1000), Duration::from_millis(30_000));
    }
}
