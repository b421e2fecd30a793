//! `RunSummary`: the non-fatal counters and sample identifiers surfaced at
//! the end of a run, in the same spirit as the teacher's `FrameImportBars`/
//! `UpdateBars` running totals -- except this one is serialized to stderr
//! as a machine-readable block rather than rendered as a progress bar.

use serde::Serialize;

const MAX_SAMPLES: usize = 10;

#[derive(Debug, Clone, Default, Serialize)]
struct Counter {
    count: usize,
    samples: Vec<String>,
}

impl Counter {
    fn bump(&mut self, identifier: impl Into<String>) {
        self.count += 1;
        if self.samples.len() < MAX_SAMPLES {
            self.samples.push(identifier.into());
        }
    }

    fn bump_silent(&mut self) {
        self.count += 1;
    }
}

/// Accumulates per-kind failure/skip counters across an entire run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    type_coercion_skipped: Counter,
    duplicate_fact_dropped: Counter,
    skipped_concept: Counter,
    filing_failed: Counter,
}

impl RunSummary {
    pub fn new() -> RunSummary {
        RunSummary::default()
    }

    pub fn record_type_coercion_skipped(&mut self, n: usize) {
        for _ in 0..n {
            self.type_coercion_skipped.bump_silent();
        }
    }

    pub fn record_duplicate_fact_dropped(&mut self, n: usize) {
        for _ in 0..n {
            self.duplicate_fact_dropped.bump_silent();
        }
    }

    pub fn record_skipped_concept(&mut self, n: usize) {
        for _ in 0..n {
            self.skipped_concept.bump_silent();
        }
    }

    pub fn record_filing_failed(&mut self, filing_name: &str) {
        self.filing_failed.bump(filing_name.to_string());
    }

    pub fn merge(&mut self, other: RunSummary) {
        self.type_coercion_skipped.count += other.type_coercion_skipped.count;
        self.duplicate_fact_dropped.count += other.duplicate_fact_dropped.count;
        self.skipped_concept.count += other.skipped_concept.count;
        self.filing_failed.count += other.filing_failed.count;

        for kind in [
            (&mut self.type_coercion_skipped, other.type_coercion_skipped.samples),
            (&mut self.duplicate_fact_dropped, other.duplicate_fact_dropped.samples),
            (&mut self.skipped_concept, other.skipped_concept.samples),
            (&mut self.filing_failed, other.filing_failed.samples),
        ] {
            let (counter, samples) = kind;
            for sample in samples {
                if counter.samples.len() >= MAX_SAMPLES {
                    break;
                }
                counter.samples.push(sample);
            }
        }
    }

    pub fn has_failures(&self) -> bool {
        self.filing_failed.count > 0
    }

    /// Renders the machine-readable summary block written to stderr on
    /// partial success, per SPEC_FULL.md §7.
    pub fn render(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|_| "{}".to_string())
    }
}
