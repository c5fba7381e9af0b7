use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Settings;
use crate::extract::{extract_json_array, ExtractStrategy};
use crate::generation::{GenerationError, Generator};
use crate::pacing::Sleeper;
use crate::targets::Target;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub rate_limit_backoff: Duration,
    pub strategy: ExtractStrategy,
}

impl RetryPolicy {
    pub fn from_settings(settings: &Settings) -> Self {
        RetryPolicy {
            max_attempts: settings.max_attempts.max(1),
            rate_limit_backoff: settings.rate_limit_backoff(),
            strategy: settings.extract_strategy,
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 3,
            rate_limit_backoff: Duration::from_secs(60),
            strategy: ExtractStrategy::Greedy,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    RateLimited,
    MalformedOutput,
    Fatal,
}

#[derive(Debug, Error)]
enum AttemptError {
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error("AI returned invalid JSON format.")]
    InvalidFormat,
}

impl AttemptError {
    fn kind(&self) -> FailureKind {
        match self {
            AttemptError::Generation(GenerationError::RateLimited(_)) => FailureKind::RateLimited,
            AttemptError::Generation(GenerationError::MalformedOutput(_))
            | AttemptError::InvalidFormat => FailureKind::MalformedOutput,
            AttemptError::Generation(GenerationError::Fatal(_)) => FailureKind::Fatal,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Attempting,
    RateLimitBackoff,
    Succeeded,
    Abandoned,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AbandonReason {
    Fatal(String),
    BudgetExhausted,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetryOutcome {
    Succeeded { questions: Vec<Value>, attempts: u32 },
    Abandoned { reason: AbandonReason, attempts: u32 },
}

impl RetryOutcome {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryOutcome::Succeeded { attempts, .. } | RetryOutcome::Abandoned { attempts, .. } => {
                *attempts
            }
        }
    }
}

/// Bounded retry around one scrape-and-generate cycle. Rate limits back off
/// and retry, malformed output retries at once, anything else abandons the
/// target. Both retrying kinds draw from the same attempt budget.
pub struct RetryController<'a, G, S> {
    generator: &'a G,
    sleeper: &'a S,
    policy: RetryPolicy,
}

impl<'a, G: Generator, S: Sleeper> RetryController<'a, G, S> {
    pub fn new(generator: &'a G, sleeper: &'a S, policy: RetryPolicy) -> Self {
        RetryController {
            generator,
            sleeper,
            policy,
        }
    }

    /// Drive one target to `Succeeded` or `Abandoned`. Never fails outward.
    pub async fn run(&self, target: &Target) -> RetryOutcome {
        let mut state = State::Idle;
        let mut attempts = 0u32;
        let mut questions = Vec::new();
        let mut reason = AbandonReason::BudgetExhausted;

        loop {
            let next = match state {
                State::Idle => State::Attempting,
                State::Attempting => {
                    attempts += 1;
                    match self.attempt(target).await {
                        Ok(found) => {
                            questions = found;
                            State::Succeeded
                        }
                        Err(e) => match e.kind() {
                            FailureKind::RateLimited => {
                                println!(
                                    "Rate limit hit. Waiting {}s...",
                                    self.policy.rate_limit_backoff.as_secs()
                                );
                                warn!(company = %target.company, attempt = attempts, error = %e, "rate limited");
                                State::RateLimitBackoff
                            }
                            FailureKind::MalformedOutput => {
                                println!("JSON parse error on attempt {}. Retrying...", attempts);
                                warn!(company = %target.company, attempt = attempts, error = %e, "malformed output");
                                self.after_failure(attempts)
                            }
                            FailureKind::Fatal => {
                                println!("Error on {}: {}", target.company, e);
                                reason = AbandonReason::Fatal(e.to_string());
                                State::Abandoned
                            }
                        },
                    }
                }
                State::RateLimitBackoff => {
                    self.sleeper
                        .sleep(self.policy.rate_limit_backoff, "Rate limit backoff")
                        .await;
                    self.after_failure(attempts)
                }
                State::Succeeded => {
                    info!(company = %target.company, attempts, count = questions.len(), "target succeeded");
                    return RetryOutcome::Succeeded {
                        questions,
                        attempts,
                    };
                }
                State::Abandoned => {
                    info!(company = %target.company, attempts, reason = ?reason, "target abandoned");
                    return RetryOutcome::Abandoned { reason, attempts };
                }
            };
            debug!(from = ?state, to = ?next, attempts, "retry transition");
            state = next;
        }
    }

    fn after_failure(&self, attempts: u32) -> State {
        if attempts < self.policy.max_attempts {
            State::Attempting
        } else {
            State::Abandoned
        }
    }

    async fn attempt(&self, target: &Target) -> Result<Vec<Value>, AttemptError> {
        let raw = self.generator.generate(target).await?;
        match extract_json_array(&raw, self.policy.strategy) {
            Some(Value::Array(items)) if !items.is_empty() => Ok(items),
            other => {
                debug!(recovered = other.is_some(), chars = raw.len(), "model output is not a non-empty list");
                Err(AttemptError::InvalidFormat)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{one_question_json, RecordingSleeper, ScriptedGenerator};

    fn target() -> Target {
        Target::new("Meta", "Frontend Engineer", "https://example.com/meta")
    }

    async fn run(gen: &ScriptedGenerator, sleeper: &RecordingSleeper) -> RetryOutcome {
        RetryController::new(gen, sleeper, RetryPolicy::default())
            .run(&target())
            .await
    }

    #[tokio::test]
    async fn succeeds_first_try() {
        let gen = ScriptedGenerator::new(vec![Ok(one_question_json())]);
        let sleeper = RecordingSleeper::default();
        let outcome = run(&gen, &sleeper).await;
        assert!(matches!(outcome, RetryOutcome::Succeeded { ref questions, attempts: 1 } if questions.len() == 1));
        assert_eq!(sleeper.total(), Duration::ZERO);
    }

    #[tokio::test]
    async fn two_rate_limits_then_success_backs_off_twice() {
        let gen = ScriptedGenerator::new(vec![
            Err(GenerationError::RateLimited("429".into())),
            Err(GenerationError::RateLimited("429".into())),
            Ok(one_question_json()),
        ]);
        let sleeper = RecordingSleeper::default();
        let outcome = run(&gen, &sleeper).await;
        assert_eq!(outcome.attempts(), 3);
        assert!(matches!(outcome, RetryOutcome::Succeeded { .. }));
        assert_eq!(sleeper.total(), Duration::from_secs(120));
        assert_eq!(gen.calls(), 3);
    }

    #[tokio::test]
    async fn fatal_error_abandons_after_one_attempt() {
        let gen = ScriptedGenerator::repeating(|| Err(GenerationError::Fatal("DNS failure".into())));
        let sleeper = RecordingSleeper::default();
        let outcome = run(&gen, &sleeper).await;
        assert_eq!(
            outcome,
            RetryOutcome::Abandoned {
                reason: AbandonReason::Fatal("DNS failure".into()),
                attempts: 1
            }
        );
        assert_eq!(gen.calls(), 1);
        assert_eq!(sleeper.total(), Duration::ZERO);
    }

    #[tokio::test]
    async fn empty_list_exhausts_budget() {
        let gen = ScriptedGenerator::repeating(|| Ok("[]".to_string()));
        let sleeper = RecordingSleeper::default();
        let outcome = run(&gen, &sleeper).await;
        assert_eq!(
            outcome,
            RetryOutcome::Abandoned {
                reason: AbandonReason::BudgetExhausted,
                attempts: 3
            }
        );
        assert_eq!(gen.calls(), 3);
        assert_eq!(sleeper.total(), Duration::ZERO);
    }

    #[tokio::test]
    async fn prose_without_json_retries_as_malformed() {
        let gen = ScriptedGenerator::new(vec![
            Ok("I could not find any questions.".into()),
            Ok(format!("Here is your JSON: {}", one_question_json())),
        ]);
        let sleeper = RecordingSleeper::default();
        let outcome = run(&gen, &sleeper).await;
        assert!(matches!(outcome, RetryOutcome::Succeeded { attempts: 2, .. }));
    }

    #[tokio::test]
    async fn object_instead_of_list_is_invalid_format() {
        let gen = ScriptedGenerator::repeating(|| Ok(r#"{"question":"Q"}"#.to_string()));
        let sleeper = RecordingSleeper::default();
        let outcome = run(&gen, &sleeper).await;
        assert_eq!(outcome.attempts(), 3);
        assert!(matches!(outcome, RetryOutcome::Abandoned { reason: AbandonReason::BudgetExhausted, .. }));
    }

    #[tokio::test]
    async fn rate_limit_and_malformed_share_one_budget() {
        let gen = ScriptedGenerator::new(vec![
            Err(GenerationError::RateLimited("quota".into())),
            Err(GenerationError::MalformedOutput("bad body".into())),
            Err(GenerationError::RateLimited("quota".into())),
            Ok(one_question_json()),
        ]);
        let sleeper = RecordingSleeper::default();
        let outcome = run(&gen, &sleeper).await;
        assert_eq!(
            outcome,
            RetryOutcome::Abandoned {
                reason: AbandonReason::BudgetExhausted,
                attempts: 3
            }
        );
        assert_eq!(gen.calls(), 3);
        // The final rate limit still waits before the budget check.
        assert_eq!(sleeper.total(), Duration::from_secs(120));
    }

    #[tokio::test]
    async fn classified_messages_follow_the_same_policy() {
        let gen = ScriptedGenerator::new(vec![
            Err(GenerationError::classify_message("Expecting value: line 1 column 1")),
            Err(GenerationError::classify_message("socket closed")),
        ]);
        let sleeper = RecordingSleeper::default();
        let outcome = run(&gen, &sleeper).await;
        assert!(matches!(outcome, RetryOutcome::Abandoned { reason: AbandonReason::Fatal(_), attempts: 2 }));
    }

    #[test]
    fn policy_never_allows_zero_attempts() {
        let mut settings = crate::testing::settings();
        settings.max_attempts = 0;
        assert_eq!(RetryPolicy::from_settings(&settings).max_attempts, 1);
    }
}
