//! Projection members, slots, orderings, and the projection mapping.
//!
//! Until a query's projection is finalized, the *projection mapping* is the
//! authoritative description of its output shape: each entry binds an
//! abstract member path of the source query's result to either a scalar
//! expression or a whole entity. Finalization replaces every entry with
//! slot indices into the concrete projection list.

use std::sync::Arc;

use sqlbridge_core::{EntityType, Error, InternalErrorKind, Result};

use crate::expr::SqlExpr;

/// An abstract path identifying a part of a query's logical output shape.
///
/// Steps are opaque name tokens; the root (empty) member describes the whole
/// result. Merging two queries under a join re-keys both sides below an
/// `outer` / `inner` prefix, mirroring how the source query pairs them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct ProjectionMember {
    steps: Vec<String>,
}

impl ProjectionMember {
    /// The root member (the whole query result).
    pub fn root() -> Self {
        Self::default()
    }

    /// A single-step member.
    pub fn of(step: impl Into<String>) -> Self {
        Self {
            steps: vec![step.into()],
        }
    }

    /// Append a member-access step.
    pub fn append(&self, step: impl Into<String>) -> Self {
        let mut steps = self.steps.clone();
        steps.push(step.into());
        Self { steps }
    }

    /// Shift this member under a prefix step (used when merging mappings).
    pub fn shift(&self, prefix: impl Into<String>) -> Self {
        let mut steps = Vec::with_capacity(self.steps.len() + 1);
        steps.push(prefix.into());
        steps.extend(self.steps.iter().cloned());
        Self { steps }
    }

    /// The last step, if any.
    pub fn last(&self) -> Option<&str> {
        self.steps.last().map(String::as_str)
    }

    /// The steps making up this path.
    pub fn steps(&self) -> &[String] {
        &self.steps
    }
}

impl std::fmt::Display for ProjectionMember {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.steps.is_empty() {
            write!(f, "(root)")
        } else {
            write!(f, "{}", self.steps.join("."))
        }
    }
}

/// A named projection slot in a SELECT list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Projection {
    /// The projected expression
    pub expr: SqlExpr,
    /// Output alias; empty when the column name already names the output
    pub alias: String,
}

impl Projection {
    /// Create a projection slot.
    pub fn new(expr: SqlExpr, alias: impl Into<String>) -> Self {
        Self {
            expr,
            alias: alias.into(),
        }
    }

    /// The name this slot exposes to an enclosing query: the alias when one
    /// is set, otherwise the projected column's own name.
    pub fn output_name(&self) -> Option<&str> {
        if self.alias.is_empty() {
            self.expr.column_name()
        } else {
            Some(&self.alias)
        }
    }
}

/// An ordering slot (ORDER BY element).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Ordering {
    pub expr: SqlExpr,
    pub ascending: bool,
}

impl Ordering {
    /// Create an ascending ordering.
    pub fn asc(expr: SqlExpr) -> Self {
        Self {
            expr: expr.convert_to_value(true),
            ascending: true,
        }
    }

    /// Create a descending ordering.
    pub fn desc(expr: SqlExpr) -> Self {
        Self {
            expr: expr.convert_to_value(true),
            ascending: false,
        }
    }

    /// The same ordering key with the direction flipped.
    pub fn reversed(&self) -> Self {
        Self {
            expr: self.expr.clone(),
            ascending: !self.ascending,
        }
    }
}

/// A whole-entity mapping entry: one concrete column per declared property
/// of the entity type, in declaration order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EntityProjection {
    entity: Arc<EntityType>,
    columns: Vec<SqlExpr>,
}

impl EntityProjection {
    /// Project every declared property of `entity` out of the table source
    /// with the given alias.
    pub fn new(entity: Arc<EntityType>, table_alias: &str) -> Self {
        let columns = entity
            .properties()
            .iter()
            .map(|p| SqlExpr::column_for_property(table_alias, p))
            .collect();
        Self { entity, columns }
    }

    /// Rebind the entity to an explicit column per property.
    ///
    /// `columns` must be parallel to the entity's declared properties.
    pub fn from_columns(entity: Arc<EntityType>, columns: Vec<SqlExpr>) -> Self {
        debug_assert_eq!(entity.properties().len(), columns.len());
        Self { entity, columns }
    }

    /// The entity type this projection binds.
    pub fn entity_type(&self) -> &Arc<EntityType> {
        &self.entity
    }

    /// The bound columns, parallel to the declared properties.
    pub fn columns(&self) -> &[SqlExpr] {
        &self.columns
    }

    /// The column bound for a declared property.
    pub fn column_for(&self, property: &str) -> Result<&SqlExpr> {
        self.entity
            .properties()
            .iter()
            .position(|p| p.name == property)
            .map(|i| &self.columns[i])
            .ok_or_else(|| {
                Error::internal(
                    InternalErrorKind::UnknownProperty,
                    format!(
                        "entity {} declares no property {property}",
                        self.entity.name
                    ),
                )
            })
    }

    /// A copy with every column marked nullable (the optional side of a
    /// left outer join yields NULLs for the entire projection).
    pub fn make_nullable(&self) -> Self {
        Self {
            entity: Arc::clone(&self.entity),
            columns: self.columns.iter().map(SqlExpr::make_nullable).collect(),
        }
    }
}

/// The value side of a projection-mapping entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MappedProjection {
    /// A scalar expression (pre-finalization)
    Expr(SqlExpr),
    /// A whole entity (pre-finalization)
    Entity(EntityProjection),
    /// A finalized scalar: index into the projection list
    Slot(usize),
    /// A finalized entity: per-property indices into the projection list
    EntitySlots(Arc<EntityType>, Vec<usize>),
}

/// An insertion-ordered map from projection members to mapping entries.
///
/// Keys are unique; inserting an existing key replaces its entry in place.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct ProjectionMapping {
    entries: Vec<(ProjectionMember, MappedProjection)>,
}

impl ProjectionMapping {
    /// An empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the entry for `member`.
    pub fn insert(&mut self, member: ProjectionMember, value: MappedProjection) {
        if let Some(entry) = self.entries.iter_mut().find(|(m, _)| *m == member) {
            entry.1 = value;
        } else {
            self.entries.push((member, value));
        }
    }

    /// Look up the entry for `member`.
    pub fn get(&self, member: &ProjectionMember) -> Option<&MappedProjection> {
        self.entries.iter().find(|(m, _)| m == member).map(|(_, v)| v)
    }

    /// Iterate entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&ProjectionMember, &MappedProjection)> {
        self.entries.iter().map(|(m, v)| (m, v))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the mapping is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Consume the mapping, yielding entries in insertion order.
    pub fn into_entries(self) -> Vec<(ProjectionMember, MappedProjection)> {
        self.entries
    }
}
