use std::io::IsTerminal;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};

/// Blocking waits between network calls. Tests swap in a recorder.
pub trait Sleeper {
    async fn sleep(&self, duration: Duration, label: &str);
}

/// Real sleeper; shows a countdown spinner when attached to a terminal.
pub struct SpinnerSleeper {
    interactive: bool,
}

impl SpinnerSleeper {
    pub fn new() -> Self {
        SpinnerSleeper {
            interactive: std::io::stdout().is_terminal(),
        }
    }
}

impl Sleeper for SpinnerSleeper {
    async fn sleep(&self, duration: Duration, label: &str) {
        if !self.interactive || duration.is_zero() {
            tokio::time::sleep(duration).await;
            return;
        }

        let pb = ProgressBar::new_spinner();
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            pb.set_style(style);
        }
        pb.enable_steady_tick(Duration::from_millis(120));

        let deadline = tokio::time::Instant::now() + duration;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            if remaining.is_zero() {
                break;
            }
            pb.set_message(format!("{} ({}s left)", label, ceil_secs(remaining)));
            tokio::time::sleep(remaining.min(Duration::from_secs(1))).await;
        }
        pb.finish_and_clear();
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}
