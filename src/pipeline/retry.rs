//! Bounded retry with exponential backoff.
//!
//! One explicit policy object shared by every external call site. Transient
//! failures (network, 5xx, rate limits) are retried; rate-limit responses
//! honor a server-specified wait when present; anything else surfaces
//! immediately and is handled at the stage boundary.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pipeline::llm::{CompletionClient, LlmError};

/// Retry policy for completion calls.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl RetryPolicy {
    /// Zero-delay policy for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay_ms: 0,
            max_delay_ms: 0,
        }
    }

    /// Exponential backoff delay before retry number `attempt` (0-based),
    /// capped at the maximum delay.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = self
            .initial_delay_ms
            .saturating_mul(1u64 << attempt.min(16));
        Duration::from_millis(exp.min(self.max_delay_ms))
    }
}

/// Run one completion call under the policy.
pub fn call_with_retry(
    policy: &RetryPolicy,
    client: &dyn CompletionClient,
    system: &str,
    prompt: &str,
) -> Result<String, LlmError> {
    let mut last_error: Option<LlmError> = None;

    for attempt in 0..policy.max_attempts {
        match client.complete(system, prompt) {
            Ok(response) => return Ok(response),
            Err(e) if e.is_transient() && attempt + 1 < policy.max_attempts => {
                let delay = match &e {
                    LlmError::RateLimited {
                        retry_after_secs: Some(secs),
                    } => Duration::from_secs(*secs),
                    _ => policy.backoff_delay(attempt),
                };
                tracing::warn!(
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Completion call failed, retrying"
                );
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
                last_error = Some(e);
            }
            Err(e) => return Err(e),
        }
    }

    Err(last_error
        .unwrap_or_else(|| LlmError::MalformedResponse("Retry budget exhausted".into())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails with a configurable error N times, then succeeds.
    struct FailThenSucceed {
        failures: usize,
        calls: AtomicUsize,
        transient: bool,
    }

    impl FailThenSucceed {
        fn new(failures: usize, transient: bool) -> Self {
            Self {
                failures,
                calls: AtomicUsize::new(0),
                transient,
            }
        }
    }

    impl CompletionClient for FailThenSucceed {
        fn complete(&self, _system: &str, _prompt: &str) -> Result<String, LlmError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                if self.transient {
                    Err(LlmError::Status {
                        status: 503,
                        body: "unavailable".into(),
                    })
                } else {
                    Err(LlmError::Status {
                        status: 400,
                        body: "bad request".into(),
                    })
                }
            } else {
                Ok("ok".into())
            }
        }
    }

    /// Fails the first call with a rate limit carrying a server-specified
    /// wait, then succeeds.
    struct RateLimitedOnce {
        retry_after_secs: u64,
        calls: AtomicUsize,
    }

    impl CompletionClient for RateLimitedOnce {
        fn complete(&self, _system: &str, _prompt: &str) -> Result<String, LlmError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                Err(LlmError::RateLimited {
                    retry_after_secs: Some(self.retry_after_secs),
                })
            } else {
                Ok("ok".into())
            }
        }
    }

    #[test]
    fn rate_limit_wait_comes_from_the_server_not_the_backoff() {
        let client = RateLimitedOnce {
            retry_after_secs: 0,
            calls: AtomicUsize::new(0),
        };
        // The backoff delay is deliberately long; a zero-second retry-after
        // must win over it.
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_delay_ms: 5_000,
            max_delay_ms: 5_000,
        };
        let started = std::time::Instant::now();
        let result = call_with_retry(&policy, &client, "s", "p");
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(client.calls.load(Ordering::SeqCst), 2);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn succeeds_after_transient_failures() {
        let client = FailThenSucceed::new(2, true);
        let result = call_with_retry(&RetryPolicy::immediate(3), &client, "s", "p");
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn exhausts_budget_on_persistent_transient_failure() {
        let client = FailThenSucceed::new(10, true);
        let result = call_with_retry(&RetryPolicy::immediate(3), &client, "s", "p");
        assert!(matches!(result, Err(LlmError::Status { status: 503, .. })));
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn non_transient_failure_is_not_retried() {
        let client = FailThenSucceed::new(10, false);
        let result = call_with_retry(&RetryPolicy::immediate(3), &client, "s", "p");
        assert!(matches!(result, Err(LlmError::Status { status: 400, .. })));
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay_ms: 500,
            max_delay_ms: 3_000,
        };
        assert_eq!(policy.backoff_delay(0), Duration::from_millis(500));
        assert_eq!(policy.backoff_delay(1), Duration::from_millis(1_000));
        assert_eq!(policy.backoff_delay(2), Duration::from_millis(2_000));
        assert_eq!(policy.backoff_delay(3), Duration::from_millis(3_000));
        assert_eq!(policy.backoff_delay(10), Duration::from_millis(3_000));
    }
}
