//! Bounded retry for outbound upstream calls.
//!
//! Each call reports an [`Attempt`]; the loop only decides between
//! returning, sleeping, or giving up. A 401 is never retried.

use std::{future::Future, time::Duration};

use thiserror::Error;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Fixed pause between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(2),
        }
    }
}

/// Outcome of a single upstream call
#[derive(Debug)]
pub enum Attempt<T, E> {
    Success(T),
    AuthFailure(E),
    TransientFailure(E),
}

/// Errors that can say whether the upstream rejected our credentials
pub trait UpstreamFailure {
    fn is_auth_failure(&self) -> bool;
}

impl UpstreamFailure for stt_core::SttError {
    fn is_auth_failure(&self) -> bool {
        self.is_unauthorized()
    }
}

impl UpstreamFailure for llm_core::LlmError {
    fn is_auth_failure(&self) -> bool {
        self.is_unauthorized()
    }
}

impl UpstreamFailure for tts_core::TtsError {
    fn is_auth_failure(&self) -> bool {
        self.is_unauthorized()
    }
}

impl<T, E: UpstreamFailure> From<Result<T, E>> for Attempt<T, E> {
    fn from(result: Result<T, E>) -> Self {
        match result {
            Ok(value) => Attempt::Success(value),
            Err(e) if e.is_auth_failure() => Attempt::AuthFailure(e),
            Err(e) => Attempt::TransientFailure(e),
        }
    }
}

#[derive(Debug, Error)]
pub enum RetryError<E: std::error::Error + 'static> {
    #[error("upstream rejected credentials: {0}")]
    Unauthorized(#[source] E),

    #[error("retry budget exceeded after {attempts} attempts: {last}")]
    Exhausted {
        attempts: u32,
        #[source]
        last: E,
    },
}

impl<E: std::error::Error + 'static> RetryError<E> {
    /// The error from the final attempt
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Unauthorized(e) => e,
            RetryError::Exhausted { last, .. } => last,
        }
    }
}

/// What to do after an attempt has failed
#[derive(Debug, PartialEq, Eq)]
enum Step {
    Retry,
    GiveUp,
}

fn next_step(policy: &RetryPolicy, attempt: u32) -> Step {
    if attempt >= policy.max_attempts {
        Step::GiveUp
    } else {
        Step::Retry
    }
}

/// Run `call` until it succeeds, fails with an auth error, or the policy
/// runs out of attempts.
pub async fn with_retry<T, E, F, Fut>(policy: &RetryPolicy, mut call: F) -> Result<T, RetryError<E>>
where
    E: std::error::Error + 'static,
    F: FnMut() -> Fut,
    Fut: Future<Output = Attempt<T, E>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match call().await {
            Attempt::Success(value) => return Ok(value),
            Attempt::AuthFailure(e) => {
                warn!(attempt, "unauthorized upstream response, not retrying");
                return Err(RetryError::Unauthorized(e));
            }
            Attempt::TransientFailure(e) => match next_step(policy, attempt) {
                Step::GiveUp => {
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: e,
                    })
                }
                Step::Retry => {
                    warn!(
                        attempt,
                        max_attempts = policy.max_attempts,
                        error = %e,
                        "upstream call failed, retrying in {:?}",
                        policy.delay
                    );
                    tokio::time::sleep(policy.delay).await;
                }
            },
        }
    }
}
