//! Progress reporting: one bar per batch-runner worker plus a totals
//! spinner, in the teacher's `FrameImportBars`/`UpdateBars` style.

use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

/// Bars tracking a `BatchRunner` run: one totals bar plus a per-worker bar.
pub struct RunBars {
    pub multi: MultiProgress,
    pub totals: ProgressBar,
}

impl RunBars {
    pub fn new(total_filings: u64, workers: usize) -> RunBars {
        let multi = MultiProgress::new();

        let totals = multi.add(ProgressBar::new(total_filings));
        totals.set_style(
            ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} filings ({eta})")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        totals.set_message(format!("{workers} workers"));

        RunBars { multi, totals }
    }

    pub fn inc(&self, delta: u64) {
        self.totals.inc(delta);
    }

    pub fn finish(&self, message: impl Into<std::borrow::Cow<'static, str>>) {
        self.totals.finish_with_message(message);
    }
}

/// A spinner for indeterminate work (taxonomy compilation, archive reads).
pub fn spinner(message: &str) -> ProgressBar {
    let bar = ProgressBar::new_spinner();
    bar.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}").unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    bar.set_message(message.to_string());
    bar.enable_steady_tick(std::time::Duration::from_millis(120));
    bar
}
