// src/dev_utils.rs

use std::time::{Duration, Instant};

/// Stages slower than this are reported at `debug` instead of `trace`.
const SLOW_STAGE: Duration = Duration::from_millis(50);

/// Times one pipeline stage (search, preparation, invocation) until it is dropped.
///
/// Bind it to a named variable (`let _timer = ...`); binding to `_` drops it at once.
pub(crate) struct StageTimer {
    stage: &'static str,
    subject: String,
    start: Instant,
}

impl StageTimer {
    pub(crate) fn new(stage: &'static str, subject: impl Into<String>) -> Self {
        Self {
            stage,
            subject: subject.into(),
            start: Instant::now(),
        }
    }
}

impl Drop for StageTimer {
    fn drop(&mut self) {
        let elapsed = self.start.elapsed();
        if elapsed >= SLOW_STAGE {
            log::debug!(
                "PROFILE [{} '{}']: {} µs (slow)",
                self.stage,
                self.subject,
                elapsed.as_micros()
            );
        } else {
            log::trace!(
                "PROFILE [{} '{}']: {} µs",
                self.stage,
                self.subject,
                elapsed.as_micros()
            );
        }
    }
}
