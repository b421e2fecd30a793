//! `SchemaCompiler`: walks each link role's concept tree and produces the
//! relational `TableSchema` pair (instant + duration) plus the global
//! `Datapackage` descriptor.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::Serialize;
use xxhash_rust::xxh3::Xxh3;

use crate::errors::SchemaError;
use crate::taxonomy::{stem_for, Axis, PeriodType, PrimitiveType, TaxonomyModel};

/// The discriminator between a table built from `instant` leaves and one
/// built from `duration` leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodKind {
    Instant,
    Duration,
}

impl PeriodKind {
    fn suffix(self) -> &'static str {
        match self {
            PeriodKind::Instant => "instant",
            PeriodKind::Duration => "duration",
        }
    }

    fn from_concept_period(period: PeriodType) -> PeriodKind {
        match period {
            PeriodType::Instant => PeriodKind::Instant,
            PeriodType::Duration => PeriodKind::Duration,
        }
    }
}

/// The relational type a column is rendered as. Rationale for the mapping
/// lives in SPEC_FULL.md §4.2: the sink is expected to be permissive, so
/// monetary/decimal/percent all collapse to a 64-bit float, dates and
/// booleans collapse to text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    String,
    Int64,
    Float64,
    DateText,
    BoolText,
}

impl ColumnType {
    pub fn from_primitive(primitive: PrimitiveType) -> ColumnType {
        match primitive {
            PrimitiveType::String => ColumnType::String,
            PrimitiveType::Integer => ColumnType::Int64,
            PrimitiveType::Decimal | PrimitiveType::Monetary | PrimitiveType::Percent => ColumnType::Float64,
            PrimitiveType::Date => ColumnType::DateText,
            PrimitiveType::Boolean => ColumnType::BoolText,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    /// Present for data columns whose concept carries a unit hint (monetary
    /// facts in particular). Kept as metadata, never a column of its own.
    pub unit_hint: Option<String>,
    pub description: Option<String>,
}

/// A single compiled relational table, one of the (up to) two tables a link
/// role yields.
#[derive(Debug, Clone, Serialize)]
pub struct TableSchema {
    pub name: String,
    pub role_uri: String,
    pub period_kind: PeriodKind,
    pub primary_key: Vec<Column>,
    pub data_columns: Vec<Column>,
    pub axis_columns: Vec<String>,
}

impl TableSchema {
    /// Concept names eligible to populate a data cell in this table.
    pub fn column_names(&self) -> HashSet<&str> {
        self.data_columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// The axis set this table requires a fact's context signature to equal
    /// exactly (§4.4 set-equality boundary).
    pub fn required_axes(&self) -> BTreeSet<&str> {
        self.axis_columns.iter().map(|s| s.as_str()).collect()
    }
}

/// Mechanical transcription of all compiled tables into a portable,
/// frictionless-style descriptor. Serialization to JSON is a thin
/// `serde_json` call; no generator library is built around this type.
#[derive(Debug, Clone, Serialize)]
pub struct Datapackage {
    pub tables: Vec<DatapackageTable>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatapackageTable {
    pub name: String,
    pub fields: Vec<DatapackageField>,
    pub primary_key: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatapackageField {
    pub name: String,
    pub field_type: ColumnType,
    pub description: Option<String>,
    pub unit: Option<String>,
}

fn hash_suffix(uri: &str) -> String {
    let mut hasher = Xxh3::new();
    hasher.update(uri.as_bytes());
    format!("{:08x}", hasher.digest() as u32)
}

fn period_primary_key(kind: PeriodKind, axis_columns: &[String], axes: &HashMap<String, Axis>) -> Vec<Column> {
    let mut pk = vec![
        Column {
            name: "entity_id".into(),
            column_type: ColumnType::String,
            unit_hint: None,
            description: None,
        },
        Column {
            name: "filing_name".into(),
            column_type: ColumnType::String,
            unit_hint: None,
            description: None,
        },
        Column {
            name: "publication_time".into(),
            column_type: ColumnType::String,
            unit_hint: None,
            description: None,
        },
    ];

    match kind {
        PeriodKind::Instant => pk.push(Column {
            name: "date".into(),
            column_type: ColumnType::DateText,
            unit_hint: None,
            description: None,
        }),
        PeriodKind::Duration => {
            pk.push(Column {
                name: "start_date".into(),
                column_type: ColumnType::DateText,
                unit_hint: None,
                description: None,
            });
            pk.push(Column {
                name: "end_date".into(),
                column_type: ColumnType::DateText,
                unit_hint: None,
                description: None,
            });
        }
    }

    for axis_name in axis_columns {
        let column_type = axes
            .get(axis_name)
            .map(|axis| axis.column_type())
            .map(ColumnType::from_primitive)
            .unwrap_or(ColumnType::String);
        pk.push(Column {
            name: column_name_for_axis(axis_name),
            column_type,
            unit_hint: None,
            description: None,
        });
    }

    pk
}

/// Axis columns are suffixed `_axis` and snake_cased, matching the scenario
/// in SPEC_FULL.md/§8 ("plant_name_axis").
pub fn column_name_for_axis(axis_name: &str) -> String {
    use heck::ToSnakeCase;
    format!("{}_axis", axis_name.to_snake_case())
}

/// Compiles every link role of a `TaxonomyModel` into its `TableSchema` pair
/// and the resulting `Datapackage`.
pub struct SchemaCompiler;

impl SchemaCompiler {
    pub fn compile(model: &TaxonomyModel) -> Result<(Vec<TableSchema>, Datapackage), SchemaError> {
        let mut tables: Vec<TableSchema> = Vec::new();
        let mut used_names: HashMap<String, String> = HashMap::new();

        // Deterministic iteration order: sort roles by URI so that compiling
        // the same taxonomy twice always yields the same table order.
        let mut role_uris: Vec<&String> = model.roles.keys().collect();
        role_uris.sort();

        for uri in role_uris {
            let role = &model.roles[uri];
            let stem = stem_for(&role.name);

            let mut by_kind: HashMap<PeriodKind, Vec<&str>> = HashMap::new();
            for leaf in role.leaves_in_traversal_order() {
                let concept = model
                    .concepts
                    .get(leaf)
                    .ok_or_else(|| SchemaError::MissingPeriodType(leaf.to_string()))?;
                let kind = PeriodKind::from_concept_period(concept.period_type);
                by_kind.entry(kind).or_default().push(leaf);
            }

            // axis columns: union of axes in scope for the role, shared
            // between the instant and duration tables (§9 open question).
            let mut axis_columns = role.axes_in_scope.clone();
            axis_columns.sort();
            axis_columns.dedup();

            for (kind, leaves) in by_kind {
                if leaves.is_empty() {
                    continue;
                }
                // `leaves` is already in stable arc-traversal order (depth-first
                // from the root, children in declared order); only collapse a
                // concept reached twice through different arcs, keeping its
                // first-visited position.
                let mut seen: HashSet<&str> = HashSet::new();
                let leaves: Vec<&str> = leaves.into_iter().filter(|name| seen.insert(name)).collect();

                let data_columns: Vec<Column> = leaves
                    .iter()
                    .map(|name| {
                        let concept = &model.concepts[*name];
                        Column {
                            name: concept.name.clone(),
                            column_type: ColumnType::from_primitive(concept.data_type),
                            unit_hint: concept.unit_hint.clone(),
                            description: concept.description.clone(),
                        }
                    })
                    .collect();

                let mut name = format!("{stem}_{}", kind.suffix());
                if let Some(existing_uri) = used_names.get(&name) {
                    if existing_uri != uri {
                        name = format!("{stem}_{}_{}", kind.suffix(), hash_suffix(uri));
                    }
                }

                if let Some(existing_uri) = used_names.get(&name) {
                    if existing_uri != uri {
                        return Err(SchemaError::Conflict(name));
                    }
                }
                used_names.insert(name.clone(), uri.clone());

                tables.push(TableSchema {
                    name,
                    role_uri: uri.clone(),
                    period_kind: kind,
                    primary_key: period_primary_key(kind, &axis_columns, &model.axes),
                    data_columns,
                    axis_columns: axis_columns.clone(),
                });
            }
        }

        tables.sort_by(|a, b| a.name.cmp(&b.name));

        let datapackage = Datapackage {
            tables: tables
                .iter()
                .map(|table| DatapackageTable {
                    name: table.name.clone(),
                    primary_key: table.primary_key.iter().map(|c| c.name.clone()).collect(),
                    fields: table
                        .primary_key
                        .iter()
                        .chain(table.data_columns.iter())
                        .map(|c| DatapackageField {
                            name: c.name.clone(),
                            field_type: c.column_type,
                            description: c.description.clone(),
                            unit: c.unit_hint.clone(),
                        })
                        .collect(),
                })
                .collect(),
        };

        Ok((tables, datapackage))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::taxonomy::provider::{AxisDto, ConceptDto, LinkRoleDto};

    fn minimal_model() -> TaxonomyModel {
        let mut arcs = HashMap::new();
        arcs.insert("root".to_string(), vec!["c_i".to_string(), "c_d".to_string()]);

        let concepts = vec![
            ConceptDto {
                name: "root".into(),
                data_type: PrimitiveType::String,
                period_type: PeriodType::Instant,
                unit_hint: None,
                label: None,
                description: None,
            },
            ConceptDto {
                name: "c_i".into(),
                data_type: PrimitiveType::Integer,
                period_type: PeriodType::Instant,
                unit_hint: None,
                label: None,
                description: None,
            },
            ConceptDto {
                name: "c_d".into(),
                data_type: PrimitiveType::Decimal,
                period_type: PeriodType::Duration,
                unit_hint: Some("USD".into()),
                label: None,
                description: None,
            },
        ];

        let roles = vec![LinkRoleDto {
            uri: "urn:role".into(),
            name: "R".into(),
            root: "root".into(),
            arcs,
            axes_in_scope: vec![],
        }];

        TaxonomyModel::compile(concepts, roles, Vec::<AxisDto>::new()).unwrap()
    }

    #[test]
    fn compiles_instant_and_duration_tables() {
        let model = minimal_model();
        let (tables, _) = SchemaCompiler::compile(&model).unwrap();
        assert_eq!(tables.len(), 2);

        let instant = tables.iter().find(|t| t.name == "r_instant").unwrap();
        assert_eq!(instant.data_columns.len(), 1);
        assert_eq!(instant.data_columns[0].name, "c_i");
        assert!(instant.primary_key.iter().any(|c| c.name == "date"));

        let duration = tables.iter().find(|t| t.name == "r_duration").unwrap();
        assert_eq!(duration.data_columns[0].name, "c_d");
        assert!(duration.primary_key.iter().any(|c| c.name == "start_date"));
        assert!(duration.primary_key.iter().any(|c| c.name == "end_date"));
    }

    #[test]
    fn data_columns_keep_declared_arc_order_not_alphabetical() {
        let mut arcs = HashMap::new();
        arcs.insert("root".to_string(), vec!["Zebra".to_string(), "Apple".to_string()]);

        let concepts = vec![
            ConceptDto {
                name: "root".into(),
                data_type: PrimitiveType::String,
                period_type: PeriodType::Instant,
                unit_hint: None,
                label: None,
                description: None,
            },
            ConceptDto {
                name: "Zebra".into(),
                data_type: PrimitiveType::Integer,
                period_type: PeriodType::Instant,
                unit_hint: None,
                label: None,
                description: None,
            },
            ConceptDto {
                name: "Apple".into(),
                data_type: PrimitiveType::Integer,
                period_type: PeriodType::Instant,
                unit_hint: None,
                label: None,
                description: None,
            },
        ];

        let roles = vec![LinkRoleDto {
            uri: "urn:role".into(),
            name: "R".into(),
            root: "root".into(),
            arcs,
            axes_in_scope: vec![],
        }];

        let model = TaxonomyModel::compile(concepts, roles, Vec::<AxisDto>::new()).unwrap();
        let (tables, _) = SchemaCompiler::compile(&model).unwrap();

        let instant = tables.iter().find(|t| t.name == "r_instant").unwrap();
        let names: Vec<&str> = instant.data_columns.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Zebra", "Apple"]);
    }

    #[test]
    fn compiling_twice_is_deterministic() {
        let model = minimal_model();
        let (tables_a, _) = SchemaCompiler::compile(&model).unwrap();
        let (tables_b, _) = SchemaCompiler::compile(&model).unwrap();

        let names_a: Vec<&str> = tables_a.iter().map(|t| t.name.as_str()).collect();
        let names_b: Vec<&str> = tables_b.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names_a, names_b);

        for (a, b) in tables_a.iter().zip(tables_b.iter()) {
            let cols_a: Vec<&str> = a.data_columns.iter().map(|c| c.name.as_str()).collect();
            let cols_b: Vec<&str> = b.data_columns.iter().map(|c| c.name.as_str()).collect();
            assert_eq!(cols_a, cols_b);
        }
    }

    #[test]
    fn axis_scoped_table_gets_axis_primary_key_column() {
        let mut arcs = HashMap::new();
        arcs.insert("root".to_string(), vec!["c_i".to_string()]);
        let concepts = vec![
            ConceptDto {
                name: "root".into(),
                data_type: PrimitiveType::String,
                period_type: PeriodType::Instant,
                unit_hint: None,
                label: None,
                description: None,
            },
            ConceptDto {
                name: "c_i".into(),
                data_type: PrimitiveType::Integer,
                period_type: PeriodType::Instant,
                unit_hint: None,
                label: None,
                description: None,
            },
        ];
        let roles = vec![LinkRoleDto {
            uri: "urn:role".into(),
            name: "R".into(),
            root: "root".into(),
            arcs,
            axes_in_scope: vec!["PlantName".into()],
        }];
        let axes = vec![AxisDto::Explicit {
            name: "PlantName".into(),
            domain: vec!["Alpha".into()],
        }];

        let model = TaxonomyModel::compile(concepts, roles, axes).unwrap();
        let (tables, _) = SchemaCompiler::compile(&model).unwrap();
        let instant = tables.iter().find(|t| t.name == "r_instant").unwrap();
        assert!(instant.primary_key.iter().any(|c| c.name == "plant_name_axis"));
    }
}
