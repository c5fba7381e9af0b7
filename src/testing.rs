use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use crate::config::Settings;
use crate::extract::ExtractStrategy;
use crate::generation::{GenerationError, Generator};
use crate::pacing::Sleeper;
use crate::targets::Target;

type Reply = Result<String, GenerationError>;

/// Replays canned replies in order, then falls back to `repeat` if set.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Reply>>,
    repeat: Option<fn() -> Reply>,
    calls: AtomicU32,
}

impl ScriptedGenerator {
    pub fn new(replies: Vec<Reply>) -> Self {
        ScriptedGenerator {
            script: Mutex::new(replies.into()),
            repeat: None,
            calls: AtomicU32::new(0),
        }
    }

    pub fn repeating(reply: fn() -> Reply) -> Self {
        ScriptedGenerator {
            script: Mutex::new(VecDeque::new()),
            repeat: Some(reply),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Generator for ScriptedGenerator {
    async fn generate(&self, _target: &Target) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.script.lock().unwrap().pop_front();
        match (next, self.repeat) {
            (Some(reply), _) => reply,
            (None, Some(repeat)) => repeat(),
            (None, None) => panic!("generator called more times than scripted"),
        }
    }
}

/// Records requested waits instead of sleeping.
#[derive(Default)]
pub struct RecordingSleeper {
    waits: Mutex<Vec<(Duration, String)>>,
}

impl RecordingSleeper {
    pub fn total(&self) -> Duration {
        self.waits.lock().unwrap().iter().map(|(d, _)| *d).sum()
    }

    pub fn labels(&self) -> Vec<String> {
        self.waits.lock().unwrap().iter().map(|(_, l)| l.clone()).collect()
    }
}

impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration, label: &str) {
        self.waits.lock().unwrap().push((duration, label.to_string()));
    }
}

pub fn one_question_json() -> String {
    r#"[{"question":"Q","options":["A","B","C","D"],"answer":"A"}]"#.to_string()
}

pub fn settings() -> Settings {
    Settings {
        google_api_key: Some("test-key".into()),
        db_path: None,
        model: "test-model".into(),
        api_base: "http://127.0.0.1:9".into(),
        max_attempts: 3,
        rate_limit_backoff_secs: 60,
        target_pause_secs: 15,
        question_count: 15,
        request_timeout_secs: 5,
        max_page_chars: 1000,
        extract_strategy: ExtractStrategy::Greedy,
    }
}
