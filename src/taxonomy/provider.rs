//! The taxonomy-provider collaborator: an opaque source of concept,
//! link-role, and axis data. A full XBRL DTS resolver (schema + presentation
//! and definition linkbases) is out of scope here; `FileTaxonomyProvider`
//! reads a small declarative TOML manifest instead, mirroring the teacher's
//! TOML-manifest pattern in `readers/meta.rs`.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::errors::TaxonomyError;
use crate::taxonomy::{PeriodType, PrimitiveType};

#[derive(Debug, Clone)]
pub struct ConceptDto {
    pub name: String,
    pub data_type: PrimitiveType,
    pub period_type: PeriodType,
    pub unit_hint: Option<String>,
    pub label: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LinkRoleDto {
    pub uri: String,
    pub name: String,
    pub root: String,
    pub arcs: HashMap<String, Vec<String>>,
    pub axes_in_scope: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum AxisDto {
    Explicit { name: String, domain: Vec<String> },
    Typed { name: String, data_type: PrimitiveType },
}

/// Yields the raw concept/relationship/axis data a `TaxonomyModel` is built
/// from. The taxonomy loader's internal parsing complexity is treated as an
/// external collaborator concern; only this interface is consumed.
pub trait TaxonomyProvider {
    fn concepts(&self) -> Result<Vec<ConceptDto>, TaxonomyError>;
    fn link_roles(&self) -> Result<Vec<LinkRoleDto>, TaxonomyError>;
    fn axes(&self) -> Result<Vec<AxisDto>, TaxonomyError>;
}

#[derive(Debug, Clone, Deserialize)]
struct Manifest {
    concept: Vec<ManifestConcept>,
    #[serde(default)]
    role: Vec<ManifestRole>,
    #[serde(default)]
    axis: Vec<ManifestAxis>,
}

#[derive(Debug, Clone, Deserialize)]
struct ManifestConcept {
    name: String,
    data_type: String,
    period_type: String,
    #[serde(default)]
    unit_hint: Option<String>,
    #[serde(default)]
    label: Option<String>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ManifestRole {
    uri: String,
    name: String,
    root: String,
    /// Flattened (parent, child) arc pairs; grouped into an adjacency list
    /// when converted to a `LinkRoleDto`.
    #[serde(default)]
    arcs: Vec<ManifestArc>,
    #[serde(default)]
    axes_in_scope: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ManifestArc {
    parent: String,
    child: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ManifestAxis {
    Explicit { name: String, domain: Vec<String> },
    Typed { name: String, data_type: String },
}

fn parse_primitive_type(value: &str) -> Result<PrimitiveType, TaxonomyError> {
    match value {
        "string" => Ok(PrimitiveType::String),
        "integer" => Ok(PrimitiveType::Integer),
        "decimal" => Ok(PrimitiveType::Decimal),
        "monetary" => Ok(PrimitiveType::Monetary),
        "percent" => Ok(PrimitiveType::Percent),
        "date" => Ok(PrimitiveType::Date),
        "boolean" => Ok(PrimitiveType::Boolean),
        other => Err(TaxonomyError::Incomplete(format!("unknown primitive type '{other}'"))),
    }
}

fn parse_period_type(value: &str) -> Result<PeriodType, TaxonomyError> {
    match value {
        "instant" => Ok(PeriodType::Instant),
        "duration" => Ok(PeriodType::Duration),
        other => Err(TaxonomyError::Incomplete(format!("unknown period type '{other}'"))),
    }
}

/// Reads a taxonomy manifest from a single TOML file on disk.
pub struct FileTaxonomyProvider {
    manifest: Manifest,
}

impl FileTaxonomyProvider {
    pub fn from_path(path: &Path) -> Result<FileTaxonomyProvider, TaxonomyError> {
        let mut file = File::open(path)?;
        let mut contents = String::new();
        file.read_to_string(&mut contents)?;
        Self::from_str(&contents)
    }

    pub fn from_str(contents: &str) -> Result<FileTaxonomyProvider, TaxonomyError> {
        let manifest: Manifest = toml::from_str(contents)?;
        Ok(FileTaxonomyProvider { manifest })
    }
}

impl TaxonomyProvider for FileTaxonomyProvider {
    fn concepts(&self) -> Result<Vec<ConceptDto>, TaxonomyError> {
        self.manifest
            .concept
            .iter()
            .map(|c| {
                Ok(ConceptDto {
                    name: c.name.clone(),
                    data_type: parse_primitive_type(&c.data_type)?,
                    period_type: parse_period_type(&c.period_type)?,
                    unit_hint: c.unit_hint.clone(),
                    label: c.label.clone(),
                    description: c.description.clone(),
                })
            })
            .collect()
    }

    fn link_roles(&self) -> Result<Vec<LinkRoleDto>, TaxonomyError> {
        self.manifest
            .role
            .iter()
            .map(|r| {
                let mut arcs: HashMap<String, Vec<String>> = HashMap::new();
                for arc in &r.arcs {
                    arcs.entry(arc.parent.clone()).or_default().push(arc.child.clone());
                }
                Ok(LinkRoleDto {
                    uri: r.uri.clone(),
                    name: r.name.clone(),
                    root: r.root.clone(),
                    arcs,
                    axes_in_scope: r.axes_in_scope.clone(),
                })
            })
            .collect()
    }

    fn axes(&self) -> Result<Vec<AxisDto>, TaxonomyError> {
        self.manifest
            .axis
            .iter()
            .map(|a| match a {
                ManifestAxis::Explicit { name, domain } => Ok(AxisDto::Explicit {
                    name: name.clone(),
                    domain: domain.clone(),
                }),
                ManifestAxis::Typed { name, data_type } => Ok(AxisDto::Typed {
                    name: name.clone(),
                    data_type: parse_primitive_type(data_type)?,
                }),
            })
            .collect()
    }
}
