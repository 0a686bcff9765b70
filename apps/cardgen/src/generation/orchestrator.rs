//! Retry Orchestrator: drives one card generation to success or a terminal error.
//!
//! Flow per attempt: build prompt → provider call → parse (which validates and
//! normalizes). A retryable failure waits `backoff_step × attempt` and tries
//! again until `max_retries` retries have been spent.

use std::time::Duration;

use tracing::{info, warn};

use crate::content::{parse, GenerationResult};
use crate::errors::CardError;
use crate::generation::progress::{GenerationEvent, ProgressSink};
use crate::generation::GenerationRequest;
use crate::llm_client::prompts::{card_user_prompt, CARD_SYSTEM};
use crate::llm_client::{CompletionProvider, CompletionRequest, DEFAULT_MAX_TOKENS};

// ────────────────────────────────────────────────────────────────────────────
// Policy and state
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    pub max_retries: u32,
    pub backoff_step: Duration,
    pub base_max_tokens: u32,
    /// Added to `max_tokens` on every retry so truncated replies get more room.
    pub retry_token_step: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_step: Duration::from_millis(500),
            base_max_tokens: DEFAULT_MAX_TOKENS,
            retry_token_step: 500,
        }
    }
}

impl RetryPolicy {
    /// Wait before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_step * attempt
    }

    pub fn max_tokens_for(&self, attempt: u32) -> u32 {
        self.base_max_tokens
            .saturating_add(self.retry_token_step.saturating_mul(attempt))
    }
}

/// Where a generation stands. `attempt` counts retries already started.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryState {
    pub attempt: u32,
    pub max: u32,
    pub last_reason: Option<String>,
}

impl RetryState {
    pub fn new(max: u32) -> Self {
        Self {
            attempt: 0,
            max,
            last_reason: None,
        }
    }

    pub fn can_retry(&self) -> bool {
        self.attempt < self.max
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Entry point
// ────────────────────────────────────────────────────────────────────────────

pub async fn generate(
    provider: &dyn CompletionProvider,
    request: &GenerationRequest,
    policy: &RetryPolicy,
    sink: &dyn ProgressSink,
) -> Result<GenerationResult, CardError> {
    let user = card_user_prompt(&request.topic, &request.keyword);
    let mut state = RetryState::new(policy.max_retries);

    loop {
        let completion = CompletionRequest {
            system: CARD_SYSTEM.to_string(),
            user: user.clone(),
            max_tokens: policy.max_tokens_for(state.attempt),
        };

        let outcome = match provider.complete(&completion).await {
            Ok(raw) => parse(&raw),
            Err(e) => Err(e),
        };

        let err = match outcome {
            Ok(result) => {
                info!(
                    attempts = state.attempt + 1,
                    title = %result.title,
                    content_chars = result.content.chars().count(),
                    "card generated"
                );
                return Ok(result);
            }
            Err(e) => e,
        };

        if !err.is_retryable() {
            warn!(kind = ?err.kind(), error = %err, "generation failed with terminal error");
            return Err(err);
        }

        let reason = err.to_string();
        state.last_reason = Some(reason.clone());

        if !state.can_retry() {
            warn!(attempts = state.attempt + 1, reason = %reason, "generation retries exhausted");
            return Err(CardError::RetryExhausted {
                attempts: state.attempt + 1,
                last_reason: reason,
            });
        }

        state.attempt += 1;
        warn!(
            "Generation attempt {}/{} failed: {}, retrying",
            state.attempt,
            state.max + 1,
            reason
        );
        sink.notify(GenerationEvent::Retry {
            count: state.attempt,
            max: state.max,
            reason,
        });
        tokio::time::sleep(policy.backoff(state.attempt)).await;
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────
