//! `FactProjector`: matches a `TableSchema`'s required axis set against a
//! filing's `FactIndex` and yields typed rows.

use std::collections::{BTreeSet, HashMap};

use chrono::NaiveDate;

use crate::instance::{Context, ContextIndex, Fact, FactIndex, Period};
use crate::schema::{column_name_for_axis, ColumnType, PeriodKind, TableSchema};

/// A single typed cell. Parse failures degrade to `Null`, never panic.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Str(String),
    Int64(i64),
    Float64(f64),
    Date(NaiveDate),
    Bool(bool),
}

impl Cell {
    fn parse(raw: &str, column_type: ColumnType) -> Option<Cell> {
        match column_type {
            ColumnType::String => Some(Cell::Str(raw.to_string())),
            ColumnType::Int64 => raw.trim().parse::<i64>().ok().map(Cell::Int64),
            ColumnType::Float64 => raw.trim().parse::<f64>().ok().map(Cell::Float64),
            ColumnType::DateText => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok().map(Cell::Date),
            ColumnType::BoolText => match raw.trim() {
                "true" | "1" => Some(Cell::Bool(true)),
                "false" | "0" => Some(Cell::Bool(false)),
                _ => None,
            },
        }
    }
}

/// A row conforming to a `TableSchema`: cells line up positionally with
/// `schema.primary_key` and `schema.data_columns`.
#[derive(Debug, Clone)]
pub struct Row {
    pub primary_key: Vec<Cell>,
    pub data: Vec<Cell>,
}

/// Non-fatal counters accumulated while projecting one filing into one table.
#[derive(Debug, Clone, Default)]
pub struct ProjectionCounters {
    pub type_coercion_skipped: usize,
    pub duplicate_fact_dropped: usize,
}

fn period_kind_of(period: &Period) -> PeriodKind {
    match period {
        Period::Instant(_) => PeriodKind::Instant,
        Period::Duration(_, _) => PeriodKind::Duration,
    }
}

fn axis_value<'a>(signature: &'a [(String, String)], axis_name: &str) -> Option<&'a str> {
    signature.iter().find(|(name, _)| name == axis_name).map(|(_, value)| value.as_str())
}

fn primary_key_cells(schema: &TableSchema, entity_id: &str, filing_name: &str, publication_time: &str, ctx: &Context) -> Vec<Cell> {
    let mut cells = vec![
        Cell::Str(entity_id.to_string()),
        Cell::Str(filing_name.to_string()),
        Cell::Str(publication_time.to_string()),
    ];

    match &ctx.period {
        Period::Instant(date) => cells.push(Cell::Date(*date)),
        Period::Duration(start, end) => {
            cells.push(Cell::Date(*start));
            cells.push(Cell::Date(*end));
        }
    }

    let fixed_len = cells.len();
    for (offset, axis_name) in schema.axis_columns.iter().enumerate() {
        let column = &schema.primary_key[fixed_len + offset];
        debug_assert_eq!(column.name, column_name_for_axis(axis_name));
        let cell = match axis_value(&ctx.signature, axis_name) {
            Some(value) => Cell::parse(value, column.column_type).unwrap_or(Cell::Str(value.to_string())),
            None => Cell::Null,
        };
        cells.push(cell);
    }

    cells
}

/// Projects one filing's facts into rows conforming to `schema`. Lazily
/// parses cell values as it is iterated; grouping (the cheap pass) happens
/// up front so the expensive per-cell lexical coercion stays lazy.
pub struct ProjectedRows<'a> {
    schema: &'a TableSchema,
    contexts: &'a ContextIndex,
    entity_id: &'a str,
    filing_name: &'a str,
    publication_time: &'a str,
    groups: std::vec::IntoIter<(String, Vec<&'a Fact>)>,
    pub counters: ProjectionCounters,
}

impl<'a> Iterator for ProjectedRows<'a> {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        let (context_id, facts) = self.groups.next()?;
        let ctx = self.contexts.get(&context_id)?;

        // Last fact in document order wins for a repeated concept; earlier
        // ones are dropped and counted.
        let mut by_concept: HashMap<&str, &Fact> = HashMap::new();
        for fact in &facts {
            match by_concept.get(fact.concept.as_str()) {
                Some(existing) if existing.document_order > fact.document_order => {
                    self.counters.duplicate_fact_dropped += 1;
                }
                Some(_) => {
                    self.counters.duplicate_fact_dropped += 1;
                    by_concept.insert(&fact.concept, fact);
                }
                None => {
                    by_concept.insert(&fact.concept, fact);
                }
            }
        }

        let data = self
            .schema
            .data_columns
            .iter()
            .map(|column| match by_concept.get(column.name.as_str()) {
                Some(fact) => Cell::parse(&fact.raw_value, column.column_type).unwrap_or_else(|| {
                    self.counters.type_coercion_skipped += 1;
                    Cell::Null
                }),
                None => Cell::Null,
            })
            .collect();

        let primary_key = primary_key_cells(self.schema, self.entity_id, self.filing_name, self.publication_time, ctx);

        Some(Row { primary_key, data })
    }
}

/// Builds the lazy row sequence for one `(schema, facts, contexts)` triple.
pub fn project<'a>(
    schema: &'a TableSchema,
    facts: &'a FactIndex,
    contexts: &'a ContextIndex,
    entity_id: &'a str,
    filing_name: &'a str,
    publication_time: &'a str,
) -> ProjectedRows<'a> {
    let required_axes: BTreeSet<&str> = schema.required_axes();

    let mut order: Vec<String> = Vec::new();
    let mut by_context: HashMap<String, Vec<&'a Fact>> = HashMap::new();

    for (signature, facts_for_signature) in facts.iter() {
        let axis_names: BTreeSet<&str> = signature.iter().map(|(name, _)| name.as_str()).collect();
        if axis_names != required_axes {
            continue;
        }

        for fact in facts_for_signature {
            if !schema.column_names().contains(fact.concept.as_str()) {
                continue;
            }
            let Some(ctx) = contexts.get(&fact.context_id) else {
                continue;
            };
            if period_kind_of(&ctx.period) != schema.period_kind {
                continue;
            }
            if !by_context.contains_key(&fact.context_id) {
                order.push(fact.context_id.clone());
            }
            by_context.entry(fact.context_id.clone()).or_default().push(fact);
        }
    }

    let groups: Vec<(String, Vec<&'a Fact>)> = order
        .into_iter()
        .map(|context_id| {
            let facts = by_context.remove(&context_id).unwrap_or_default();
            (context_id, facts)
        })
        .collect();

    ProjectedRows {
        schema,
        contexts,
        entity_id,
        filing_name,
        publication_time,
        groups: groups.into_iter(),
        counters: ProjectionCounters::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::{Context, Period};
    use crate::schema::{Column, ColumnType};

    fn schema(axis_columns: Vec<String>, period_kind: PeriodKind) -> TableSchema {
        let mut primary_key = vec![
            Column { name: "entity_id".into(), column_type: ColumnType::String, unit_hint: None, description: None },
            Column { name: "filing_name".into(), column_type: ColumnType::String, unit_hint: None, description: None },
            Column { name: "publication_time".into(), column_type: ColumnType::String, unit_hint: None, description: None },
        ];
        match period_kind {
            PeriodKind::Instant => primary_key.push(Column { name: "date".into(), column_type: ColumnType::DateText, unit_hint: None, description: None }),
            PeriodKind::Duration => {
                primary_key.push(Column { name: "start_date".into(), column_type: ColumnType::DateText, unit_hint: None, description: None });
                primary_key.push(Column { name: "end_date".into(), column_type: ColumnType::DateText, unit_hint: None, description: None });
            }
        }
        for axis in &axis_columns {
            primary_key.push(Column { name: column_name_for_axis(axis), column_type: ColumnType::String, unit_hint: None, description: None });
        }

        TableSchema {
            name: "t_instant".into(),
            role_uri: "urn:role".into(),
            period_kind,
            primary_key,
            data_columns: vec![Column { name: "x:Assets".into(), column_type: ColumnType::Float64, unit_hint: None, description: None }],
            axis_columns,
        }
    }

    #[test]
    fn matches_exact_axis_set_only() {
        let schema = schema(vec!["PlantName".into()], PeriodKind::Instant);

        let mut contexts = ContextIndex::new();
        contexts.insert(
            "c1".into(),
            Context {
                id: "c1".into(),
                entity_id: "E1".into(),
                period: Period::Instant(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()),
                signature: vec![("PlantName".into(), "Alpha".into())],
            },
        );
        contexts.insert(
            "c2".into(),
            Context {
                id: "c2".into(),
                entity_id: "E1".into(),
                period: Period::Instant(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()),
                signature: vec![("PlantName".into(), "Alpha".into()), ("OtherAxis".into(), "Z".into())],
            },
        );

        let mut facts = FactIndex::new();
        facts.insert(
            vec![("PlantName".into(), "Alpha".into())],
            vec![Fact { concept: "x:Assets".into(), context_id: "c1".into(), raw_value: "100".into(), data_type: crate::taxonomy::PrimitiveType::Monetary, document_order: 0 }],
        );
        facts.insert(
            vec![("OtherAxis".into(), "Z".into()), ("PlantName".into(), "Alpha".into())],
            vec![Fact { concept: "x:Assets".into(), context_id: "c2".into(), raw_value: "200".into(), data_type: crate::taxonomy::PrimitiveType::Monetary, document_order: 1 }],
        );

        let rows: Vec<Row> = project(&schema, &facts, &contexts, "E1", "f1", "2023-02-01T00:00:00Z").collect();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].data, vec![Cell::Float64(100.0)]);
    }

    #[test]
    fn duplicate_fact_keeps_last_in_document_order() {
        let schema = schema(vec![], PeriodKind::Instant);

        let mut contexts = ContextIndex::new();
        contexts.insert(
            "c1".into(),
            Context {
                id: "c1".into(),
                entity_id: "E1".into(),
                period: Period::Instant(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()),
                signature: vec![],
            },
        );

        let mut facts = FactIndex::new();
        facts.insert(
            vec![],
            vec![
                Fact { concept: "x:Assets".into(), context_id: "c1".into(), raw_value: "1".into(), data_type: crate::taxonomy::PrimitiveType::Monetary, document_order: 0 },
                Fact { concept: "x:Assets".into(), context_id: "c1".into(), raw_value: "2".into(), data_type: crate::taxonomy::PrimitiveType::Monetary, document_order: 1 },
            ],
        );

        let mut rows = project(&schema, &facts, &contexts, "E1", "f1", "2023-02-01T00:00:00Z");
        let row = rows.next().unwrap();
        assert_eq!(row.data, vec![Cell::Float64(2.0)]);
        assert_eq!(rows.counters.duplicate_fact_dropped, 1);
    }

    #[test]
    fn unparseable_value_becomes_null_and_is_counted() {
        let schema = schema(vec![], PeriodKind::Instant);

        let mut contexts = ContextIndex::new();
        contexts.insert(
            "c1".into(),
            Context {
                id: "c1".into(),
                entity_id: "E1".into(),
                period: Period::Instant(NaiveDate::from_ymd_opt(2023, 1, 1).unwrap()),
                signature: vec![],
            },
        );

        let mut facts = FactIndex::new();
        facts.insert(
            vec![],
            vec![Fact { concept: "x:Assets".into(), context_id: "c1".into(), raw_value: "not-a-number".into(), data_type: crate::taxonomy::PrimitiveType::Monetary, document_order: 0 }],
        );

        let mut rows = project(&schema, &facts, &contexts, "E1", "f1", "2023-02-01T00:00:00Z");
        let row = rows.next().unwrap();
        assert_eq!(row.data, vec![Cell::Null]);
        assert_eq!(rows.counters.type_coercion_skipped, 1);
    }
}
