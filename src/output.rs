use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard, PoisonError};

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::debug;

use crate::app::{
    DatasetsResult, ExecuteResult, PlanResult, ProgressEvent, ProgressSink, RunResult,
    ValidateResult,
};

/// Machine-readable results on stdout; progress is swallowed.
pub struct JsonOutput;

impl JsonOutput {
    pub fn print_datasets(result: &DatasetsResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_plan(result: &PlanResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_execute(result: &ExecuteResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_validate(result: &ValidateResult) -> io::Result<()> {
        Self::print_json(result)
    }

    pub fn print_run(result: &RunResult) -> io::Result<()> {
        Self::print_json(result)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

const BAR_TEMPLATE: &str = "{msg} [{bar:40.cyan/blue}] {pos}/{len} entries ({percent}%) {eta}";

/// Human-readable progress on stderr: phase lines, plus a bar while a counted
/// phase runs.
#[derive(Default)]
pub struct TextProgress {
    bar: Mutex<Option<ProgressBar>>,
}

impl TextProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn current(&self) -> MutexGuard<'_, Option<ProgressBar>> {
        self.bar.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ProgressSink for TextProgress {
    fn event(&self, event: ProgressEvent) {
        let line = match event.elapsed {
            Some(elapsed) => format!("{} ({:.1}s)", event.message, elapsed.as_secs_f64()),
            None => event.message,
        };
        match self.current().as_ref() {
            Some(bar) => bar.println(line),
            None => eprintln!("{line}"),
        }
    }

    fn begin(&self, phase: &str, total: u64) {
        let bar = ProgressBar::new(total);
        match ProgressStyle::with_template(BAR_TEMPLATE) {
            Ok(style) => bar.set_style(style.progress_chars("=> ")),
            Err(err) => debug!(error = %err, "progress template rejected"),
        }
        bar.set_message(phase.to_string());
        if let Some(previous) = self.current().replace(bar) {
            previous.finish_and_clear();
        }
    }

    fn advance(&self) {
        if let Some(bar) = self.current().as_ref() {
            bar.inc(1);
        }
    }

    fn finish(&self) {
        if let Some(bar) = self.current().take() {
            bar.finish();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counted_phase_tracks_position() {
        let progress = TextProgress::new();
        progress.begin("Execute", 3);
        progress.advance();
        progress.advance();
        let bar = progress.current().clone().unwrap();
        assert_eq!(bar.length(), Some(3));
        assert_eq!(bar.position(), 2);

        progress.finish();
        assert!(progress.current().is_none());
        assert!(bar.is_finished());
        // Ticks outside a phase are dropped.
        progress.advance();
    }

    #[test]
    fn new_phase_replaces_unfinished_bar() {
        let progress = TextProgress::new();
        progress.begin("Validate", 5);
        let first = progress.current().clone().unwrap();
        progress.begin("Execute", 2);
        assert!(first.is_finished());
        assert_eq!(progress.current().as_ref().and_then(|bar| bar.length()), Some(2));
    }
}
