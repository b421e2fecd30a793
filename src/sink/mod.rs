//! The tabular-database collaborator: a thin `TableSink` trait plus two
//! adapters (`rusqlite`, `duckdb`). Neither adapter retries internally --
//! `SinkError::Write` is fatal per SPEC_FULL.md §7.

pub mod duckdb_sink;
pub mod sqlite;

use crate::errors::SinkError;
use crate::projector::Row;
use crate::schema::TableSchema;

/// Opaque tabular-database writer. One `open_table` call per `TableSchema`
/// before any `write_rows` calls for that table.
pub trait TableSink {
    fn open_table(&mut self, schema: &TableSchema) -> Result<(), SinkError>;
    fn write_rows(&mut self, table: &str, schema: &TableSchema, rows: &[Row]) -> Result<(), SinkError>;
    fn flush(&mut self) -> Result<(), SinkError>;
}

/// Fans writes out to more than one sink (e.g. SQLite and DuckDB in the
/// same run, per §6's "at least one of sqlite_path/duckdb_path").
#[derive(Default)]
pub struct MultiSink {
    sinks: Vec<Box<dyn TableSink>>,
}

impl MultiSink {
    pub fn new(sinks: Vec<Box<dyn TableSink>>) -> MultiSink {
        MultiSink { sinks }
    }
}

impl TableSink for MultiSink {
    fn open_table(&mut self, schema: &TableSchema) -> Result<(), SinkError> {
        for sink in &mut self.sinks {
            sink.open_table(schema)?;
        }
        Ok(())
    }

    fn write_rows(&mut self, table: &str, schema: &TableSchema, rows: &[Row]) -> Result<(), SinkError> {
        for sink in &mut self.sinks {
            sink.write_rows(table, schema, rows)?;
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        for sink in &mut self.sinks {
            sink.flush()?;
        }
        Ok(())
    }
}
