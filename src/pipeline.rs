use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::db::{PersistenceSink, ResultRecord, SaveOutcome};
use crate::extract::Question;
use crate::generation::Generator;
use crate::pacing::Sleeper;
use crate::retry::{RetryController, RetryOutcome, RetryPolicy};
use crate::targets::Target;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Per-run tallies, for the closing line only.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub total: usize,
    pub succeeded: usize,
    pub skipped: usize,
}

/// Process targets strictly in order, pausing between them.
pub struct TargetLoop<'a, G, S> {
    controller: RetryController<'a, G, S>,
    sleeper: &'a S,
    sink: &'a PersistenceSink,
    pause: Duration,
}

impl<'a, G: Generator, S: Sleeper> TargetLoop<'a, G, S> {
    pub fn new(
        generator: &'a G,
        sleeper: &'a S,
        sink: &'a PersistenceSink,
        policy: RetryPolicy,
        pause: Duration,
    ) -> Self {
        TargetLoop {
            controller: RetryController::new(generator, sleeper, policy),
            sleeper,
            sink,
            pause,
        }
    }

    pub async fn run(&self, targets: &[Target]) -> RunStats {
        let mut stats = RunStats {
            total: targets.len(),
            ..Default::default()
        };

        for (i, target) in targets.iter().enumerate() {
            println!("\n------------------------------------------------");
            println!("[{}/{}] Processing: {}...", i + 1, targets.len(), target.company);

            if self.process(target).await {
                stats.succeeded += 1;
            } else {
                stats.skipped += 1;
            }

            if i + 1 < targets.len() {
                println!("Pausing {}s...", self.pause.as_secs());
                self.sleeper.sleep(self.pause, "Pausing between targets").await;
            }
        }

        info!(total = stats.total, succeeded = stats.succeeded, skipped = stats.skipped, "run complete");
        stats
    }

    async fn process(&self, target: &Target) -> bool {
        let outcome = self.controller.run(target).await;
        let attempts = outcome.attempts();
        let questions = match outcome {
            RetryOutcome::Succeeded { questions, .. } => questions,
            RetryOutcome::Abandoned { reason, .. } => {
                warn!(company = %target.company, attempts, reason = ?reason, "skipping target");
                return false;
            }
        };

        let malformed = count_malformed(&questions);
        if malformed > 0 {
            warn!(company = %target.company, malformed, total = questions.len(), attempts, "some items do not match the question shape");
        }

        let record = ResultRecord {
            company: target.company.clone(),
            profile: target.profile.clone(),
            source: target.url.clone(),
            scraped_at: chrono::Local::now().format(TIMESTAMP_FORMAT).to_string(),
            questions,
        };

        match self.sink.save(&record) {
            Ok(SaveOutcome::Saved) => {
                println!("Success! Saved {} questions to DB.", record.questions.len());
                true
            }
            Ok(SaveOutcome::Disabled) => {
                println!("Extracted {} questions (DB mode off).", record.questions.len());
                true
            }
            Err(e) => {
                println!("Error on {}: {}", target.company, e);
                false
            }
        }
    }
}

fn count_malformed(items: &[Value]) -> usize {
    items
        .iter()
        .filter(|v| Question::from_value(v).is_none())
        .count()
}
