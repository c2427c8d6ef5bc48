// src/console.rs
//
// Terminal presentation layer: an indicatif progress bar, error
// notifications printed above it, and a completion line.

use image_batch::{BatchSummary, Presenter};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

pub struct ConsolePresenter {
    bar: Option<ProgressBar>,
    quiet: bool,
    errors: usize,
}

impl ConsolePresenter {
    /// `quiet` suppresses everything but errors; `show_bar` controls the bar itself.
    pub fn new(quiet: bool, show_bar: bool) -> Self {
        let bar = if show_bar && !quiet {
            let bar = ProgressBar::with_draw_target(Some(0), ProgressDrawTarget::stderr());
            if let Ok(style) = ProgressStyle::default_bar().template(
                "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {wide_msg}",
            ) {
                bar.set_style(style.progress_chars("#>-"));
            }
            Some(bar)
        } else {
            None
        };

        Self {
            bar,
            quiet,
            errors: 0,
        }
    }

    pub fn error_count(&self) -> usize {
        self.errors
    }

    fn print(&self, line: &str) {
        match &self.bar {
            Some(bar) => bar.println(line),
            None => eprintln!("{line}"),
        }
    }
}

impl Presenter for ConsolePresenter {
    fn set_maximum(&mut self, maximum: u64) {
        if let Some(bar) = &self.bar {
            bar.set_length(maximum);
        }
    }

    fn set_value(&mut self, value: u64) {
        // Keep the final count on screen after the completion line
        if let Some(bar) = self.bar.as_ref().filter(|bar| !bar.is_finished()) {
            bar.set_position(value);
        }
    }

    fn log(&mut self, message: &str) {
        match &self.bar {
            Some(bar) => bar.set_message(message.to_string()),
            None if !self.quiet => eprintln!("{message}"),
            None => {}
        }
    }

    fn show_error(&mut self, message: &str) {
        self.errors += 1;
        self.print(&format!("error: {message}"));
    }

    fn show_info(&mut self, message: &str) {
        if !self.quiet {
            self.print(message);
        }
    }

    fn show_completion(&mut self, summary: &BatchSummary) {
        let line = format!(
            "Done: {} processed, {} failed, {} skipped (of {})",
            summary.succeeded, summary.failed, summary.skipped, summary.submitted
        );
        match &self.bar {
            Some(bar) => bar.finish_with_message(line),
            None if !self.quiet => eprintln!("{line}"),
            None => {}
        }
    }

    // A single run per process; there is no start control to toggle
    fn set_start_enabled(&mut self, _enabled: bool) {}
}
