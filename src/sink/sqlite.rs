//! `SqliteSink`: writes `TableSchema`/`Row` pairs into a SQLite database via
//! `rusqlite`, one transaction per `write_rows` call.

use rusqlite::types::Value as SqlValue;
use rusqlite::Connection;

use crate::errors::SinkError;
use crate::projector::{Cell, Row};
use crate::schema::{ColumnType, TableSchema};
use crate::sink::TableSink;

pub struct SqliteSink {
    conn: Connection,
}

impl SqliteSink {
    pub fn open(path: &std::path::Path) -> Result<SqliteSink, SinkError> {
        let conn = Connection::open(path).map_err(|e| SinkError::Write(path.display().to_string(), e.to_string()))?;
        Ok(SqliteSink { conn })
    }
}

fn sql_type(column_type: ColumnType) -> &'static str {
    match column_type {
        ColumnType::String | ColumnType::DateText | ColumnType::BoolText => "TEXT",
        ColumnType::Int64 => "INTEGER",
        ColumnType::Float64 => "REAL",
    }
}

fn cell_to_sql(cell: &Cell) -> SqlValue {
    match cell {
        Cell::Null => SqlValue::Null,
        Cell::Str(s) => SqlValue::Text(s.clone()),
        Cell::Int64(n) => SqlValue::Integer(*n),
        Cell::Float64(f) => SqlValue::Real(*f),
        Cell::Date(d) => SqlValue::Text(d.format("%Y-%m-%d").to_string()),
        Cell::Bool(b) => SqlValue::Text(if *b { "true".to_string() } else { "false".to_string() }),
    }
}

impl TableSink for SqliteSink {
    fn open_table(&mut self, schema: &TableSchema) -> Result<(), SinkError> {
        let mut columns: Vec<String> = Vec::new();
        for column in &schema.primary_key {
            columns.push(format!("\"{}\" {} NOT NULL", column.name, sql_type(column.column_type)));
        }
        for column in &schema.data_columns {
            columns.push(format!("\"{}\" {}", column.name, sql_type(column.column_type)));
        }
        let pk_names: Vec<String> = schema.primary_key.iter().map(|c| format!("\"{}\"", c.name)).collect();

        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({}, PRIMARY KEY ({}))",
            schema.name,
            columns.join(", "),
            pk_names.join(", ")
        );

        self.conn
            .execute(&ddl, [])
            .map_err(|e| SinkError::Write(schema.name.clone(), e.to_string()))?;
        Ok(())
    }

    fn write_rows(&mut self, table: &str, schema: &TableSchema, rows: &[Row]) -> Result<(), SinkError> {
        if rows.is_empty() {
            return Ok(());
        }

        let all_columns: Vec<&str> = schema
            .primary_key
            .iter()
            .chain(schema.data_columns.iter())
            .map(|c| c.name.as_str())
            .collect();
        let placeholders: Vec<String> = (1..=all_columns.len()).map(|i| format!("?{i}")).collect();
        let quoted: Vec<String> = all_columns.iter().map(|c| format!("\"{c}\"")).collect();
        let sql = format!(
            "INSERT OR REPLACE INTO \"{table}\" ({}) VALUES ({})",
            quoted.join(", "),
            placeholders.join(", ")
        );

        let tx = self.conn.transaction().map_err(|e| SinkError::Write(table.to_string(), e.to_string()))?;
        {
            let mut stmt = tx.prepare(&sql).map_err(|e| SinkError::Write(table.to_string(), e.to_string()))?;
            for row in rows {
                let values: Vec<SqlValue> = row.primary_key.iter().chain(row.data.iter()).map(cell_to_sql).collect();
                stmt.execute(rusqlite::params_from_iter(values))
                    .map_err(|e| SinkError::Write(table.to_string(), e.to_string()))?;
            }
        }
        tx.commit().map_err(|e| SinkError::Write(table.to_string(), e.to_string()))?;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), SinkError> {
        Ok(())
    }
}
