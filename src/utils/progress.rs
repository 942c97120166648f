use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

use crate::models::Mode;

const TICK: Duration = Duration::from_millis(100);

/// Terminal feedback for preparation stages and batch streaming. A hidden reporter still
/// counts, so callers can read the totals back either way.
pub struct ProgressReporter {
    bar: ProgressBar,
    samples: u64,
}

impl ProgressReporter {
    /// Bar over the batches of one mode's stream
    pub fn batches(mode: Mode, batch_count: usize, visible: bool) -> Self {
        let bar = if visible {
            ProgressBar::new(batch_count as u64)
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::default_bar()
            .template("{prefix:>16} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} batches {msg}")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        bar.set_prefix(mode.as_str().to_string());
        bar.enable_steady_tick(TICK);

        Self { bar, samples: 0 }
    }

    /// Spinner for a stage of unknown length, such as preparing the splits
    pub fn stage(message: &str, visible: bool) -> Self {
        let bar = if visible {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        };
        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            bar.set_style(style);
        }
        bar.set_message(message.to_string());
        bar.enable_steady_tick(TICK);

        Self { bar, samples: 0 }
    }

    /// Count one streamed batch holding `samples` samples
    pub fn record_batch(&mut self, samples: usize) {
        self.samples += samples as u64;
        self.bar.inc(1);
        self.bar.set_message(format!("({} samples)", self.samples));
    }

    pub fn batches_seen(&self) -> u64 {
        self.bar.position()
    }

    pub fn samples_seen(&self) -> u64 {
        self.samples
    }

    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        // Interrupted by an error: leave the bar where it stopped
        if !self.bar.is_finished() {
            self.bar.abandon();
        }
    }
}
