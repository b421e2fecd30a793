//! In-memory representation of a compiled taxonomy: concepts, link roles, and axes.
//!
//! Populated once per run from the `provider` collaborator and never mutated
//! afterwards, so it can be shared across workers behind an `Arc` without
//! synchronization.

pub mod provider;

use std::collections::{HashMap, HashSet};

use heck::ToSnakeCase;

use crate::errors::TaxonomyError;
use provider::{AxisDto, ConceptDto, LinkRoleDto};

/// The primitive data type a concept's lexical value is expected to parse as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    String,
    Integer,
    Decimal,
    Monetary,
    Percent,
    Date,
    Boolean,
}

/// Whether a concept's facts describe a single moment or a span of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeriodType {
    Instant,
    Duration,
}

/// A named data element defined by the taxonomy.
#[derive(Debug, Clone, PartialEq)]
pub struct Concept {
    pub name: String,
    pub data_type: PrimitiveType,
    pub period_type: PeriodType,
    pub unit_hint: Option<String>,
    pub label: Option<String>,
    pub description: Option<String>,
}

/// An enumerated-domain or filer-typed dimension that can augment a context.
#[derive(Debug, Clone, PartialEq)]
pub enum Axis {
    Explicit { name: String, domain: Vec<String> },
    Typed { name: String, data_type: PrimitiveType },
}

impl Axis {
    pub fn name(&self) -> &str {
        match self {
            Axis::Explicit { name, .. } => name,
            Axis::Typed { name, .. } => name,
        }
    }

    /// The column type this axis contributes when used as a primary-key column.
    pub fn column_type(&self) -> PrimitiveType {
        match self {
            Axis::Explicit { .. } => PrimitiveType::String,
            Axis::Typed { data_type, .. } => *data_type,
        }
    }
}

/// A named grouping that roots a concept DAG and the set of axes in scope for it.
#[derive(Debug, Clone)]
pub struct LinkRole {
    pub uri: String,
    pub name: String,
    pub root: String,
    /// Adjacency list: concept name -> ordered children, in declared arc order.
    pub arcs: HashMap<String, Vec<String>>,
    pub axes_in_scope: Vec<String>,
}

impl LinkRole {
    /// Nodes with no outgoing arcs inside this role.
    pub fn leaves(&self) -> Vec<&str> {
        let mut leaves: Vec<&str> = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut stack = vec![self.root.as_str()];

        while let Some(node) = stack.pop() {
            if !visited.insert(node) {
                continue;
            }
            match self.arcs.get(node) {
                Some(children) if !children.is_empty() => {
                    for child in children.iter().rev() {
                        stack.push(child);
                    }
                }
                _ => leaves.push(node),
            }
        }

        leaves
    }

    /// Depth-first traversal order from the root, children in declared order,
    /// restricted to leaves. Ties between equal names are broken lexicographically
    /// by the caller once leaves have been collected in this stable order.
    pub fn leaves_in_traversal_order(&self) -> Vec<&str> {
        let mut order: Vec<&str> = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        self.visit(&self.root, &mut visited, &mut order);
        order
    }

    fn visit<'a>(&'a self, node: &'a str, visited: &mut HashSet<&'a str>, order: &mut Vec<&'a str>) {
        if !visited.insert(node) {
            return;
        }
        match self.arcs.get(node) {
            Some(children) if !children.is_empty() => {
                for child in children {
                    self.visit(child, visited, order);
                }
            }
            _ => order.push(node),
        }
    }

    /// Rejects cycles using an iterative DFS with an explicit recursion-stack
    /// set, rather than native recursion, since taxonomies are untrusted
    /// external input and a pathologically deep or cyclic graph should not be
    /// able to blow the call stack.
    fn check_acyclic(&self) -> Result<(), TaxonomyError> {
        #[derive(Clone, Copy, PartialEq)]
        enum Mark {
            InProgress,
            Done,
        }

        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut stack: Vec<(&str, usize)> = vec![(self.root.as_str(), 0)];
        marks.insert(self.root.as_str(), Mark::InProgress);

        while let Some((node, child_idx)) = stack.pop() {
            let children = self.arcs.get(node).map(|v| v.as_slice()).unwrap_or(&[]);

            if child_idx >= children.len() {
                marks.insert(node, Mark::Done);
                continue;
            }

            stack.push((node, child_idx + 1));
            let child = children[child_idx].as_str();

            match marks.get(child) {
                Some(Mark::InProgress) => return Err(TaxonomyError::Cyclic(self.uri.clone())),
                Some(Mark::Done) => {}
                None => {
                    marks.insert(child, Mark::InProgress);
                    stack.push((child, 0));
                }
            }
        }

        Ok(())
    }
}

/// Normalizes a human-readable link role name into an ASCII snake_case table
/// stem, mirroring the teacher's use of `heck` for case normalization.
pub fn stem_for(name: &str) -> String {
    let ascii: String = name.chars().filter(|c| c.is_ascii()).collect();
    let stem = ascii.to_snake_case();
    if stem.is_empty() {
        "role".to_string()
    }
    else {
        stem
    }
}

/// The immutable, shared, in-memory taxonomy.
#[derive(Debug, Clone)]
pub struct TaxonomyModel {
    pub concepts: HashMap<String, Concept>,
    pub roles: HashMap<String, LinkRole>,
    pub axes: HashMap<String, Axis>,
}

impl TaxonomyModel {
    /// Builds the model from the raw DTOs handed over by the taxonomy
    /// provider collaborator, validating that every cross-reference resolves
    /// and that no role's concept DAG contains a cycle.
    pub fn compile(
        concepts: Vec<ConceptDto>,
        roles: Vec<LinkRoleDto>,
        axes: Vec<AxisDto>,
    ) -> Result<TaxonomyModel, TaxonomyError> {
        let axes: HashMap<String, Axis> = axes
            .into_iter()
            .map(|dto| {
                let axis = match dto {
                    AxisDto::Explicit { name, domain } => Axis::Explicit { name, domain },
                    AxisDto::Typed { name, data_type } => Axis::Typed { name, data_type },
                };
                (axis.name().to_string(), axis)
            })
            .collect();

        let concepts: HashMap<String, Concept> = concepts
            .into_iter()
            .map(|dto| {
                (
                    dto.name.clone(),
                    Concept {
                        name: dto.name,
                        data_type: dto.data_type,
                        period_type: dto.period_type,
                        unit_hint: dto.unit_hint,
                        label: dto.label,
                        description: dto.description,
                    },
                )
            })
            .collect();

        let mut compiled_roles: HashMap<String, LinkRole> = HashMap::new();

        for dto in roles {
            for axis_name in &dto.axes_in_scope {
                if !axes.contains_key(axis_name) {
                    return Err(TaxonomyError::Incomplete(format!(
                        "role '{}' references unknown axis '{}'",
                        dto.uri, axis_name
                    )));
                }
            }

            let mut referenced: HashSet<&str> = HashSet::new();
            referenced.insert(dto.root.as_str());
            for (parent, children) in &dto.arcs {
                if !concepts.contains_key(parent) {
                    return Err(TaxonomyError::Incomplete(format!(
                        "role '{}' arc references unknown concept '{}'",
                        dto.uri, parent
                    )));
                }
                referenced.insert(parent.as_str());
                for child in children {
                    if !concepts.contains_key(child) {
                        return Err(TaxonomyError::Incomplete(format!(
                            "role '{}' arc references unknown concept '{}'",
                            dto.uri, child
                        )));
                    }
                    referenced.insert(child.as_str());
                }
            }
            if !concepts.contains_key(&dto.root) {
                return Err(TaxonomyError::Incomplete(format!(
                    "role '{}' root '{}' is not a known concept",
                    dto.uri, dto.root
                )));
            }

            let role = LinkRole {
                uri: dto.uri.clone(),
                name: dto.name,
                root: dto.root,
                arcs: dto.arcs,
                axes_in_scope: dto.axes_in_scope,
            };
            role.check_acyclic()?;

            compiled_roles.insert(dto.uri, role);
        }

        Ok(TaxonomyModel {
            concepts,
            roles: compiled_roles,
            axes,
        })
    }
}
