//! Bounded retries around the text generation service.

use aether_llm_sdk::LlmError;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{ReasonerError, Result};
use crate::prompt::PromptContext;

/// Text in, text out. The only seam between the pipeline and a model.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn generate(&self, prompt: &PromptContext) -> std::result::Result<String, LlmError>;

    /// Short name reported in output metadata
    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub request_timeout: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            request_timeout: Duration::from_secs(30),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(8),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (1-based).
    /// A server retry-after hint can lengthen the delay up to `max_backoff`.
    fn backoff(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let delay = self
            .initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff);
        match hint {
            Some(hint) => delay.max(hint.min(self.max_backoff)),
            None => delay,
        }
    }
}

/// Raw model reply and the number of attempts it took
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Exchange {
    pub text: String,
    pub attempts: u32,
}

#[derive(Clone)]
pub struct ReasoningClient {
    generator: Arc<dyn TextGenerator>,
    policy: RetryPolicy,
}

impl ReasoningClient {
    pub fn new(generator: Arc<dyn TextGenerator>, policy: RetryPolicy) -> Self {
        Self { generator, policy }
    }

    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Send the prompt, retrying transient failures.
    ///
    /// Each attempt is bounded by the request timeout and by the deadline.
    /// Non-transient failures stop immediately.
    pub async fn send(&self, prompt: &PromptContext, deadline: Option<Instant>) -> Result<Exchange> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempts = 0;
        let mut last_error = String::from("no attempt was made");

        while attempts < max_attempts {
            let mut timeout = self.policy.request_timeout;
            if let Some(deadline) = deadline {
                let remaining = deadline.saturating_duration_since(Instant::now());
                if remaining.is_zero() {
                    last_error = "deadline exceeded".to_string();
                    break;
                }
                timeout = timeout.min(remaining);
            }

            attempts += 1;
            debug!(attempt = attempts, generator = self.generator.name(), "sending prompt");

            let hint = match tokio::time::timeout(timeout, self.generator.generate(prompt)).await {
                Ok(Ok(text)) => return Ok(Exchange { text, attempts }),
                Ok(Err(e)) if !e.is_transient() => {
                    return Err(ReasonerError::unavailable(attempts, e.to_string()));
                }
                Ok(Err(e)) => {
                    warn!(attempt = attempts, error = %e, "transient generation failure");
                    last_error = e.to_string();
                    e.retry_after().map(Duration::from_secs)
                }
                Err(_) => {
                    warn!(attempt = attempts, timeout_ms = timeout.as_millis() as u64, "generation timed out");
                    last_error = format!("timed out after {}ms", timeout.as_millis());
                    None
                }
            };

            if attempts >= max_attempts {
                break;
            }

            let delay = self.policy.backoff(attempts, hint);
            if let Some(deadline) = deadline {
                if Instant::now() + delay >= deadline {
                    last_error = format!("{} (deadline reached before next retry)", last_error);
                    break;
                }
            }
            tokio::time::sleep(delay).await;
        }

        Err(ReasonerError::unavailable(attempts, last_error))
    }
}
