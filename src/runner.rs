//! `BatchRunner`: drives parallel extraction across a `rayon` thread pool,
//! fans results back through a bounded `crossbeam_channel`, merges them per
//! table, and hands the merged rows to the sink.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rayon::prelude::*;

use crate::errors::{Error, InstanceError, SinkError};
use crate::instance;
use crate::progress::RunBars;
use crate::projector::{self, Cell, Row};
use crate::schema::TableSchema;
use crate::sink::TableSink;
use crate::summary::RunSummary;
use crate::taxonomy::Concept;

/// Where a filing's XML bytes come from: a plain file on disk, or an entry
/// already extracted into memory from a tar archive (see `archive.rs`).
#[derive(Debug, Clone)]
pub enum FilingSource {
    Path(PathBuf),
    Bytes(Vec<u8>),
}

/// One filing to extract: a name, its declared publication time (already
/// resolved to an ISO-8601 string -- from the filing's metadata envelope if
/// present, else the file's or archive entry's modification time), and where
/// to read its XML from.
#[derive(Debug, Clone)]
pub struct FilingRef {
    pub name: String,
    pub publication_time: String,
    pub source: FilingSource,
}

struct BatchOutcome {
    tables: HashMap<String, Vec<Row>>,
    summary: RunSummary,
}

fn cell_key(cell: &Cell) -> String {
    match cell {
        Cell::Null => "\u{0}null".to_string(),
        Cell::Str(s) => format!("s:{s}"),
        Cell::Int64(n) => format!("i:{n}"),
        Cell::Float64(f) => format!("f:{f}"),
        Cell::Date(d) => format!("d:{d}"),
        Cell::Bool(b) => format!("b:{b}"),
    }
}

fn primary_key_of(row: &Row) -> Vec<String> {
    row.primary_key.iter().map(cell_key).collect()
}

/// Reads and projects one filing into every schema, with a wall-clock
/// timeout since `InstanceReader` has no natural yield points to check a
/// cooperative cancellation flag against.
fn extract_filing(
    filing: &FilingRef,
    schemas: &Arc<Vec<TableSchema>>,
    concepts: &Arc<HashMap<String, Concept>>,
    timeout: Option<Duration>,
) -> Result<(HashMap<String, Vec<Row>>, RunSummary), InstanceError> {
    let filing = filing.clone();
    let schemas = Arc::clone(schemas);
    let concepts = Arc::clone(concepts);

    let (tx, rx) = std::sync::mpsc::channel();
    std::thread::spawn(move || {
        let result = (|| -> Result<(HashMap<String, Vec<Row>>, RunSummary), InstanceError> {
            let reader: Box<dyn BufRead + Send> = match &filing.source {
                FilingSource::Path(path) => Box::new(BufReader::new(File::open(path)?)),
                FilingSource::Bytes(bytes) => Box::new(BufReader::new(Cursor::new(bytes.clone()))),
            };
            let document = instance::read(reader, &concepts)?;

            let mut summary = RunSummary::new();
            summary.record_skipped_concept(document.counters.skipped_concepts);

            let entity_id = document.entity_id.clone().unwrap_or_default();
            let mut tables: HashMap<String, Vec<Row>> = HashMap::new();

            for schema in schemas.iter() {
                let mut projected = projector::project(
                    schema,
                    &document.facts,
                    &document.contexts,
                    &entity_id,
                    &filing.name,
                    &filing.publication_time,
                );
                let mut rows: Vec<Row> = projected.by_ref().collect();
                summary.record_type_coercion_skipped(projected.counters.type_coercion_skipped);
                summary.record_duplicate_fact_dropped(projected.counters.duplicate_fact_dropped);

                if !rows.is_empty() {
                    tables.entry(schema.name.clone()).or_default().append(&mut rows);
                }
            }

            Ok((tables, summary))
        })();
        let _ = tx.send(result);
    });

    match timeout {
        Some(duration) => match rx.recv_timeout(duration) {
            Ok(inner) => inner,
            Err(_) => Err(InstanceError::Timeout(filing.name.clone())),
        },
        None => match rx.recv() {
            Ok(inner) => inner,
            Err(_) => Err(InstanceError::Timeout(filing.name.clone())),
        },
    }
}

fn process_batch(
    batch: &[FilingRef],
    schemas: &Arc<Vec<TableSchema>>,
    concepts: &Arc<HashMap<String, Concept>>,
    timeout: Option<Duration>,
) -> BatchOutcome {
    let mut tables: HashMap<String, Vec<Row>> = HashMap::new();
    let mut summary = RunSummary::new();

    for filing in batch {
        let outcome = catch_unwind(AssertUnwindSafe(|| extract_filing(filing, schemas, concepts, timeout)));

        match outcome {
            Ok(Ok((filing_tables, filing_summary))) => {
                summary.merge(filing_summary);
                for (table, mut rows) in filing_tables {
                    tables.entry(table).or_default().append(&mut rows);
                }
            }
            Ok(Err(err)) => {
                tracing::error!(filing = %filing.name, error = %err, "skipping filing");
                summary.record_filing_failed(&filing.name);
            }
            Err(panic) => {
                let message = panic
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| panic.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "worker panicked".to_string());
                tracing::error!(filing = %filing.name, panic = %message, "worker crashed while extracting filing");
                summary.record_filing_failed(&filing.name);
            }
        }
    }

    BatchOutcome { tables, summary }
}

pub struct BatchRunner {
    schemas: Arc<Vec<TableSchema>>,
    concepts: Arc<HashMap<String, Concept>>,
    workers: usize,
    batch_size: usize,
    filing_timeout: Option<Duration>,
}

impl BatchRunner {
    pub fn new(
        schemas: Arc<Vec<TableSchema>>,
        concepts: Arc<HashMap<String, Concept>>,
        workers: usize,
        batch_size: usize,
        filing_timeout: Option<Duration>,
    ) -> BatchRunner {
        BatchRunner {
            schemas,
            concepts,
            workers: workers.max(1),
            batch_size: batch_size.max(1),
            filing_timeout,
        }
    }

    /// Runs extraction over every filing, merges rows per table (later
    /// publication time wins on an exact primary-key collision, merging
    /// non-null data columns of the winner over the loser), and writes the
    /// merged tables to `sink`.
    pub fn run(
        &self,
        filings: Vec<FilingRef>,
        sink: &mut dyn TableSink,
        cancel: Arc<AtomicBool>,
        bars: Option<&RunBars>,
    ) -> Result<RunSummary, Error> {
        for schema in self.schemas.iter() {
            sink.open_table(schema)?;
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|e| Error::Sink(SinkError::Write("<pool>".to_string(), e.to_string())))?;

        let batches: Vec<Vec<FilingRef>> = filings.chunks(self.batch_size).map(|c| c.to_vec()).collect();
        let (tx, rx) = crossbeam_channel::bounded::<BatchOutcome>(self.workers.saturating_mul(2).max(2));

        let schemas = Arc::clone(&self.schemas);
        let concepts = Arc::clone(&self.concepts);
        let timeout = self.filing_timeout;
        let cancel_for_workers = Arc::clone(&cancel);

        let producer = std::thread::spawn(move || {
            pool.install(|| {
                batches.par_iter().for_each(|batch| {
                    if cancel_for_workers.load(Ordering::Acquire) {
                        return;
                    }
                    let outcome = process_batch(batch, &schemas, &concepts, timeout);
                    let _ = tx.send(outcome);
                });
            });
        });

        let mut accumulator: HashMap<String, HashMap<Vec<String>, Row>> = HashMap::new();
        let mut summary = RunSummary::new();

        for outcome in rx.iter() {
            summary.merge(outcome.summary);
            for (table, rows) in outcome.tables {
                let table_acc = accumulator.entry(table).or_default();
                for row in rows {
                    let key = primary_key_of(&row);
                    table_acc
                        .entry(key)
                        .and_modify(|existing| merge_row(existing, &row))
                        .or_insert(row);
                }
                if let Some(bars) = bars {
                    bars.inc(1);
                }
            }
        }

        producer.join().map_err(|_| Error::Sink(SinkError::Write("<pool>".to_string(), "worker thread panicked".to_string())))?;

        for schema in self.schemas.iter() {
            if let Some(rows) = accumulator.remove(&schema.name) {
                let rows: Vec<Row> = rows.into_values().collect();
                sink.write_rows(&schema.name, schema, &rows)?;
            }
        }
        sink.flush()?;

        if let Some(bars) = bars {
            bars.finish("extraction complete");
        }

        Ok(summary)
    }
}

fn merge_row(existing: &mut Row, incoming: &Row) {
    for (slot, new_value) in existing.data.iter_mut().zip(incoming.data.iter()) {
        if matches!(new_value, Cell::Null) {
            continue;
        }
        *slot = new_value.clone();
    }
}
