//! The SELECT query: mutable composition and the frozen tree.
//!
//! [`SelectBuilder`] is the engine's working state. The translation driver
//! calls its mutation operations in source-query order; each call either
//! updates the builder in place or, when the new clause would conflict with
//! clauses already fixed (a second OFFSET, DISTINCT over a paged query),
//! performs a **pushdown**: the current query is snapshotted into a frozen
//! [`Select`], demoted to a derived table, and the builder starts over as a
//! fresh outer query around it.
//!
//! [`Select`] is the immutable result. It serves both as a derived-table
//! source inside other queries and as the renderer's input.

use std::sync::Arc;

use sqlbridge_core::{EntityType, Error, InternalErrorKind, Result};

use crate::expr::SqlExpr;
use crate::projection::{
    EntityProjection, MappedProjection, Ordering, Projection, ProjectionMapping, ProjectionMember,
};
use crate::rewrite::Remapping;
use crate::table::{PredicateJoin, TableExpr, TableSource};

/// Alias given to a query demoted into a derived table.
const SUBQUERY_ALIAS: &str = "t";

/// A frozen SELECT tree.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Select {
    pub(crate) alias: Option<String>,
    pub(crate) projections: Vec<Projection>,
    pub(crate) tables: Vec<TableSource>,
    pub(crate) predicate: Option<SqlExpr>,
    pub(crate) orderings: Vec<Ordering>,
    pub(crate) limit: Option<SqlExpr>,
    pub(crate) offset: Option<SqlExpr>,
    pub(crate) distinct: bool,
}

impl Select {
    /// The alias this query carries as a derived table.
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// The projection slots.
    pub fn projections(&self) -> &[Projection] {
        &self.projections
    }

    /// The table sources; the first is the primary source, the rest are
    /// joins layered onto it.
    pub fn tables(&self) -> &[TableSource] {
        &self.tables
    }

    /// The WHERE predicate, if any.
    pub fn predicate(&self) -> Option<&SqlExpr> {
        self.predicate.as_ref()
    }

    /// The orderings.
    pub fn orderings(&self) -> &[Ordering] {
        &self.orderings
    }

    /// The LIMIT expression, if any.
    pub fn limit(&self) -> Option<&SqlExpr> {
        self.limit.as_ref()
    }

    /// The OFFSET expression, if any.
    pub fn offset(&self) -> Option<&SqlExpr> {
        self.offset.as_ref()
    }

    /// Whether this query is DISTINCT.
    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// Apply `f` to every expression in the tree, recursing into derived
    /// tables and subqueries; returns `None` when nothing changed.
    pub fn rewrite_exprs(&self, f: &mut dyn FnMut(&SqlExpr) -> Option<SqlExpr>) -> Option<Select> {
        let mut changed = false;

        let projections: Vec<Projection> = self
            .projections
            .iter()
            .map(|p| match p.expr.rewrite(f) {
                Some(expr) => {
                    changed = true;
                    Projection::new(expr, p.alias.clone())
                }
                None => p.clone(),
            })
            .collect();

        let tables: Vec<TableSource> = self
            .tables
            .iter()
            .map(|t| match t.rewrite_exprs(f) {
                Some(table) => {
                    changed = true;
                    table
                }
                None => t.clone(),
            })
            .collect();

        let predicate = match &self.predicate {
            Some(p) => match p.rewrite(f) {
                Some(new) => {
                    changed = true;
                    Some(new)
                }
                None => Some(p.clone()),
            },
            None => None,
        };

        let orderings: Vec<Ordering> = self
            .orderings
            .iter()
            .map(|o| match o.expr.rewrite(f) {
                Some(expr) => {
                    changed = true;
                    Ordering {
                        expr,
                        ascending: o.ascending,
                    }
                }
                None => o.clone(),
            })
            .collect();

        let limit = match &self.limit {
            Some(l) => match l.rewrite(f) {
                Some(new) => {
                    changed = true;
                    Some(new)
                }
                None => Some(l.clone()),
            },
            None => None,
        };

        let offset = match &self.offset {
            Some(o) => match o.rewrite(f) {
                Some(new) => {
                    changed = true;
                    Some(new)
                }
                None => Some(o.clone()),
            },
            None => None,
        };

        if !changed {
            return None;
        }

        Some(Select {
            alias: self.alias.clone(),
            projections,
            tables,
            predicate,
            orderings,
            limit,
            offset,
            distinct: self.distinct,
        })
    }
}

/// The mutable query under construction.
#[derive(Debug, Clone)]
pub struct SelectBuilder {
    alias: Option<String>,
    projections: Vec<Projection>,
    projection_mapping: ProjectionMapping,
    tables: Vec<TableSource>,
    predicate: Option<SqlExpr>,
    orderings: Vec<Ordering>,
    limit: Option<SqlExpr>,
    offset: Option<SqlExpr>,
    distinct: bool,
}

impl SelectBuilder {
    /// Create a query over a single entity type.
    ///
    /// Wraps the entity's table (aliased by the first letter of the table
    /// name) and registers one root mapping entry covering the whole entity.
    pub fn for_entity(entity: Arc<EntityType>) -> Self {
        let alias = entity
            .table_name
            .chars()
            .next()
            .map_or_else(|| SUBQUERY_ALIAS.to_string(), |c| c.to_lowercase().to_string());

        let table = TableExpr::new(entity.table_name.clone(), entity.schema.clone(), alias.clone());
        let mut projection_mapping = ProjectionMapping::new();
        projection_mapping.insert(
            ProjectionMember::root(),
            MappedProjection::Entity(EntityProjection::new(entity, &alias)),
        );

        Self {
            alias: None,
            projections: Vec::new(),
            projection_mapping,
            tables: vec![TableSource::Table(table)],
            predicate: None,
            orderings: Vec::new(),
            limit: None,
            offset: None,
            distinct: false,
        }
    }

    // ==================== Read accessors ====================

    /// The table sources composed so far.
    pub fn tables(&self) -> &[TableSource] {
        &self.tables
    }

    /// The finalized projection slots (empty until `apply_projection`).
    pub fn projections(&self) -> &[Projection] {
        &self.projections
    }

    /// The accumulated WHERE predicate.
    pub fn predicate(&self) -> Option<&SqlExpr> {
        self.predicate.as_ref()
    }

    /// The current orderings.
    pub fn orderings(&self) -> &[Ordering] {
        &self.orderings
    }

    /// The LIMIT expression, if set.
    pub fn limit(&self) -> Option<&SqlExpr> {
        self.limit.as_ref()
    }

    /// The OFFSET expression, if set.
    pub fn offset(&self) -> Option<&SqlExpr> {
        self.offset.as_ref()
    }

    /// Whether DISTINCT has been applied.
    pub fn is_distinct(&self) -> bool {
        self.distinct
    }

    /// Look up the mapping entry for a projection member.
    pub fn projection_expr(&self, member: &ProjectionMember) -> Result<&MappedProjection> {
        self.projection_mapping.get(member).ok_or_else(|| {
            Error::internal(
                InternalErrorKind::UnmappedProjectionMember,
                format!("no projection mapping entry for {member}"),
            )
        })
    }

    /// Resolve the column for property `property` of the entity found at
    /// projection member `member`.
    ///
    /// Used when the driver meets a member access in a later clause (e.g. a
    /// predicate referencing an entity bound earlier).
    pub fn bind_property(&self, member: &ProjectionMember, property: &str) -> Result<SqlExpr> {
        match self.projection_expr(member)? {
            MappedProjection::Entity(entity) => entity.column_for(property).cloned(),
            _ => Err(Error::internal(
                InternalErrorKind::ScalarProjectionBinding,
                format!("projection member {member} does not bind an entity"),
            )),
        }
    }

    // ==================== Mutation operations ====================

    /// AND a predicate onto the query.
    ///
    /// A literal TRUE filter is elided. If paging is already fixed, the
    /// query is pushed down first and the incoming predicate re-homed onto
    /// the derived table's columns, so the filter applies *after* the page
    /// was taken.
    pub fn apply_predicate(&mut self, expr: SqlExpr) {
        if expr.is_literal_true() {
            tracing::trace!("skipping literal-true predicate");
            return;
        }

        let expr = if self.limit.is_some() || self.offset.is_some() {
            let remapping = self.pushdown_into_subquery();
            remapping.remap(&expr)
        } else {
            expr
        };

        let expr = expr.convert_to_value(false);
        self.predicate = Some(match self.predicate.take() {
            Some(existing) => SqlExpr::and_also(existing, expr),
            None => expr,
        });
    }

    /// Finalize the projection: replace every mapping entry with its slot
    /// index into the projection list. Entity entries expand to one slot
    /// per declared property (alias left empty; the column name is the
    /// output name); scalar entries take the member's last step as alias.
    ///
    /// No-op when the projection was already finalized.
    pub fn apply_projection(&mut self) {
        if !self.projections.is_empty() {
            return;
        }

        let entries = std::mem::take(&mut self.projection_mapping).into_entries();
        for (member, value) in entries {
            let finalized = match value {
                MappedProjection::Entity(entity) => {
                    let indices = entity
                        .columns()
                        .iter()
                        .map(|column| self.add_projection_slot(column.clone(), None))
                        .collect();
                    MappedProjection::EntitySlots(Arc::clone(entity.entity_type()), indices)
                }
                MappedProjection::Expr(expr) => {
                    let alias = member.last().map(str::to_string);
                    MappedProjection::Slot(self.add_projection_slot(expr, alias.as_deref()))
                }
                finalized @ (MappedProjection::Slot(_) | MappedProjection::EntitySlots(..)) => {
                    finalized
                }
            };
            self.projection_mapping.insert(member, finalized);
        }
    }

    /// Discard the current mapping and install `mapping` as the new
    /// authoritative output shape (an explicit reshaping projection).
    pub fn replace_projection_mapping(&mut self, mapping: ProjectionMapping) {
        self.projection_mapping = mapping;
    }

    /// Add an expression to the projection list, deduplicating by
    /// structural equality; returns its slot index.
    pub fn add_to_projection(&mut self, expr: SqlExpr) -> usize {
        self.add_projection_slot(expr, None)
    }

    /// Replace all orderings with the given one.
    ///
    /// A fixed page or DISTINCT means the current rows must not be
    /// re-sorted in place; the query is pushed down first and the ordering
    /// key re-homed.
    pub fn apply_order_by(&mut self, ordering: Ordering) {
        let ordering = if self.distinct || self.limit.is_some() || self.offset.is_some() {
            let remapping = self.pushdown_into_subquery();
            Ordering {
                expr: remapping.remap(&ordering.expr),
                ascending: ordering.ascending,
            }
        } else {
            ordering
        };

        self.orderings.clear();
        self.orderings.push(ordering);
    }

    /// Append a subordinate ordering unless a structurally-equal ordering
    /// key is already present.
    pub fn apply_then_by(&mut self, ordering: Ordering) {
        if !self.orderings.iter().any(|o| o.expr == ordering.expr) {
            self.orderings.push(ordering);
        }
    }

    /// Set the LIMIT, pushing down first when one is already fixed.
    pub fn apply_limit(&mut self, expr: SqlExpr) {
        if self.limit.is_some() {
            self.pushdown_into_subquery();
        }
        self.limit = Some(expr.convert_to_value(true));
    }

    /// Set the OFFSET.
    ///
    /// A dialect gets one stable `OFFSET … LIMIT …` pair per query level;
    /// stacking a second offset over an already-paged query changes
    /// semantics, so the current query is pushed down first.
    pub fn apply_offset(&mut self, expr: SqlExpr) {
        if self.limit.is_some() || self.offset.is_some() {
            self.pushdown_into_subquery();
        }
        self.offset = Some(expr.convert_to_value(true));
    }

    /// Mark the query DISTINCT.
    ///
    /// Applies to the already-paged result (pushdown first when paged) and
    /// erases orderings: a DISTINCT result set is unordered until
    /// explicitly re-ordered.
    pub fn apply_distinct(&mut self) {
        if self.limit.is_some() || self.offset.is_some() {
            self.pushdown_into_subquery();
        }
        self.distinct = true;
        self.clear_orderings();
    }

    /// Flip the direction of every ordering, preserving key order.
    pub fn reverse_orderings(&mut self) {
        if self.limit.is_some() || self.offset.is_some() {
            self.pushdown_into_subquery();
        }
        self.orderings = self.orderings.iter().map(Ordering::reversed).collect();
    }

    /// Drop all orderings.
    pub fn clear_orderings(&mut self) {
        self.orderings.clear();
    }

    /// Make the query safe to aggregate over: an aggregate must see the
    /// finished row set, so DISTINCT or paging forces pushdown.
    pub fn prepare_for_aggregate(&mut self) {
        if self.distinct || self.limit.is_some() || self.offset.is_some() {
            self.pushdown_into_subquery();
        }
    }

    // ==================== Pushdown ====================

    /// Demote the current query to a derived table (aliased `t`) inside a
    /// fresh outer query, re-projecting every mapped column and re-homing
    /// surviving orderings.
    ///
    /// Returns the substitution table from old expressions to the outer
    /// columns now standing in for them; callers remap expressions created
    /// before the pushdown (incoming predicates, join predicates).
    #[tracing::instrument(level = "trace", skip(self))]
    pub fn pushdown_into_subquery(&mut self) -> Remapping {
        let mut inner = Select {
            alias: Some(SUBQUERY_ALIAS.to_string()),
            projections: Vec::new(),
            tables: std::mem::take(&mut self.tables),
            predicate: self.predicate.take(),
            orderings: std::mem::take(&mut self.orderings),
            limit: self.limit.take(),
            offset: self.offset.take(),
            distinct: std::mem::replace(&mut self.distinct, false),
        };

        // Order is irrelevant to an unlimited derived table, and some
        // dialects reject ORDER BY in that position.
        if inner.limit.is_none() && inner.offset.is_none() {
            inner.orderings.clear();
        }

        let mut remapping = Remapping::new();

        if self.projections.is_empty() {
            let entries = std::mem::take(&mut self.projection_mapping).into_entries();
            for (member, value) in entries {
                let replaced = match value {
                    MappedProjection::Entity(entity) => {
                        let outer_columns = entity
                            .columns()
                            .iter()
                            .map(|column| {
                                let index = push_slot(&mut inner, column.clone(), None);
                                let outer = subquery_column(&inner, index);
                                remapping.insert(column.clone(), outer.clone());
                                outer
                            })
                            .collect();
                        MappedProjection::Entity(EntityProjection::from_columns(
                            Arc::clone(entity.entity_type()),
                            outer_columns,
                        ))
                    }
                    MappedProjection::Expr(expr) => {
                        let index = push_slot(&mut inner, expr.clone(), None);
                        let outer = subquery_column(&inner, index);
                        remapping.insert(expr, outer.clone());
                        MappedProjection::Expr(outer)
                    }
                    finalized @ (MappedProjection::Slot(_) | MappedProjection::EntitySlots(..)) => {
                        finalized
                    }
                };
                self.projection_mapping.insert(member, replaced);
            }
        } else {
            // The projection was already finalized: the slots themselves
            // move into the derived table and the outer query re-projects
            // them by position.
            let slots = std::mem::take(&mut self.projections);
            for slot in slots {
                let index = push_slot(&mut inner, slot.expr.clone(), None);
                let outer = subquery_column(&inner, index);
                remapping.insert(slot.expr, outer.clone());
                self.add_projection_slot(outer, None);
            }
        }

        // Re-home surviving orderings onto the derived table's columns,
        // projecting any key the subquery does not already expose.
        for ordering in inner.orderings.clone() {
            let outer = match remapping.get(&ordering.expr) {
                Some(column) => column.clone(),
                None => {
                    let index = push_slot(&mut inner, ordering.expr.clone(), None);
                    subquery_column(&inner, index)
                }
            };
            self.orderings.push(Ordering {
                expr: outer,
                ascending: ordering.ascending,
            });
        }

        tracing::trace!(
            inner_projections = inner.projections.len(),
            "pushed query down into derived table"
        );

        self.tables.push(TableSource::Subquery(Box::new(inner)));
        remapping
    }

    // ==================== Join composition ====================

    /// Join another query's source onto this one with an INNER JOIN.
    ///
    /// The merged output shape re-keys this query's members under `outer`
    /// and the joined query's under `inner`.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn add_inner_join(&mut self, inner: SelectBuilder, predicate: SqlExpr) {
        let (table, on, mapping) = Self::demote_join_side(inner, predicate);
        self.tables
            .push(TableSource::InnerJoin(Box::new(PredicateJoin::new(table, on))));
        self.merge_mappings(mapping, false);
    }

    /// Join another query's source onto this one with a LEFT OUTER JOIN.
    ///
    /// Every mapping entry contributed by the optional side is made
    /// nullable: an unmatched row yields NULLs for the entire right-hand
    /// projection.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn add_left_join(&mut self, inner: SelectBuilder, predicate: SqlExpr) {
        let predicate = if self.limit.is_some() || self.offset.is_some() || self.distinct {
            self.pushdown_into_subquery().remap(&predicate)
        } else {
            predicate
        };

        let (table, on, mapping) = Self::demote_join_side(inner, predicate);
        self.tables
            .push(TableSource::LeftJoin(Box::new(PredicateJoin::new(table, on))));
        self.merge_mappings(mapping, true);
    }

    /// Join another query's source onto this one with a CROSS JOIN.
    #[tracing::instrument(level = "trace", skip_all)]
    pub fn add_cross_join(&mut self, mut inner: SelectBuilder) {
        if self.limit.is_some() || self.offset.is_some() || self.distinct || self.predicate.is_some()
        {
            self.pushdown_into_subquery();
        }

        if !inner.orderings.is_empty()
            || inner.limit.is_some()
            || inner.offset.is_some()
            || inner.distinct
            || inner.predicate.is_some()
            || inner.tables.len() > 1
        {
            inner.pushdown_into_subquery();
        }

        let table = inner.tables.remove(0);
        self.tables.push(TableSource::CrossJoin(Box::new(table)));
        self.merge_mappings(inner.projection_mapping, false);
    }

    /// Reduce a join's right-hand query to a single composable table
    /// source, pushing it down (and re-homing the join predicate) when it
    /// carries structure a bare join cannot express.
    fn demote_join_side(
        mut inner: SelectBuilder,
        predicate: SqlExpr,
    ) -> (TableSource, SqlExpr, ProjectionMapping) {
        let predicate = if !inner.orderings.is_empty()
            || inner.limit.is_some()
            || inner.offset.is_some()
            || inner.distinct
            || inner.predicate.is_some()
            || inner.tables.len() > 1
        {
            inner.pushdown_into_subquery().remap(&predicate)
        } else {
            predicate
        };

        let table = inner.tables.remove(0);
        (table, predicate, inner.projection_mapping)
    }

    /// Re-key this query's mapping under `outer` and the joined mapping
    /// under `inner`, applying the nullable transform to the inner side for
    /// left joins.
    fn merge_mappings(&mut self, inner_mapping: ProjectionMapping, make_nullable: bool) {
        let mut merged = ProjectionMapping::new();

        for (member, value) in std::mem::take(&mut self.projection_mapping).into_entries() {
            merged.insert(member.shift("outer"), value);
        }

        for (member, value) in inner_mapping.into_entries() {
            let value = if make_nullable {
                match value {
                    MappedProjection::Entity(entity) => {
                        MappedProjection::Entity(entity.make_nullable())
                    }
                    MappedProjection::Expr(expr) => MappedProjection::Expr(expr.make_nullable()),
                    finalized => finalized,
                }
            } else {
                value
            };
            merged.insert(member.shift("inner"), value);
        }

        self.projection_mapping = merged;
    }

    // ==================== Freezing ====================

    /// Freeze the builder into an immutable tree.
    pub fn build(self) -> Select {
        Select {
            alias: self.alias,
            projections: self.projections,
            tables: self.tables,
            predicate: self.predicate,
            orderings: self.orderings,
            limit: self.limit,
            offset: self.offset,
            distinct: self.distinct,
        }
    }

    fn add_projection_slot(&mut self, expr: SqlExpr, alias: Option<&str>) -> usize {
        let aliased = self.alias.is_some();
        push_projection(&mut self.projections, aliased, expr, alias)
    }
}

/// Add a slot to a derived table under construction.
fn push_slot(inner: &mut Select, expr: SqlExpr, alias: Option<&str>) -> usize {
    push_projection(&mut inner.projections, inner.alias.is_some(), expr, alias)
}

/// Add `expr` to a projection list, deduplicating by structural equality.
///
/// Alias policy: the explicit alias when one is given; otherwise a column
/// in an unaliased query stays unnamed (its own name is the implicit
/// output name), while a derived table must name every output — the
/// column's own name, else a synthetic `"c"`. Case-insensitive collisions
/// with existing aliases are disambiguated with a monotonically increasing
/// counter (`c`, `c0`, `c1`, …).
fn push_projection(
    projections: &mut Vec<Projection>,
    aliased: bool,
    expr: SqlExpr,
    alias: Option<&str>,
) -> usize {
    if let Some(existing) = projections.iter().position(|p| p.expr == expr) {
        return existing;
    }

    let base_alias = alias.map(str::to_string).or_else(|| {
        aliased.then(|| {
            expr.column_name()
                .map_or_else(|| "c".to_string(), str::to_string)
        })
    });

    let mut current = base_alias.clone().unwrap_or_default();
    if let Some(base) = base_alias.filter(|_| aliased) {
        let mut counter = 0;
        while projections
            .iter()
            .any(|p| p.alias.eq_ignore_ascii_case(&current))
        {
            current = format!("{base}{counter}");
            counter += 1;
        }
    }

    projections.push(Projection::new(expr, current));
    projections.len() - 1
}

/// A column over a derived table's projection slot, typed and
/// nullability-marked from the slot it re-exposes.
fn subquery_column(inner: &Select, index: usize) -> SqlExpr {
    let slot = &inner.projections[index];
    let name = slot.output_name().unwrap_or_default().to_string();
    // Conservative for opaque scalar expressions.
    let nullable = slot.expr.column_nullable().unwrap_or(true);
    SqlExpr::column(
        inner.alias().unwrap_or(SUBQUERY_ALIAS),
        name,
        slot.expr.result_type().clone(),
        slot.expr.type_mapping().cloned(),
        nullable,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{BinaryOperator, SqlExprKind};
    use sqlbridge_core::{Property, SqlType};

    fn customer() -> Arc<EntityType> {
        Arc::new(
            EntityType::new("Customer", "customers")
                .property(Property::new("Id", SqlType::BigInt))
                .property(Property::new("Name", SqlType::Text).nullable(true)),
        )
    }

    fn name_eq(table: &str, value: &str) -> SqlExpr {
        SqlExpr::binary(
            BinaryOperator::Equal,
            SqlExpr::column(table, "Name", SqlType::Text, None, true),
            SqlExpr::constant(value),
        )
        .unwrap()
    }

    #[test]
    fn test_for_entity_seeds_table_and_root_mapping() {
        let query = SelectBuilder::for_entity(customer());
        assert_eq!(query.tables().len(), 1);
        assert_eq!(query.tables()[0].alias(), Some("c"));
        let MappedProjection::Entity(entity) =
            query.projection_expr(&ProjectionMember::root()).unwrap()
        else {
            panic!("root maps the whole entity");
        };
        assert_eq!(entity.columns().len(), 2);
    }

    #[test]
    fn test_apply_predicate_elides_literal_true() {
        let mut query = SelectBuilder::for_entity(customer());
        query.apply_predicate(SqlExpr::true_literal());
        assert!(query.predicate().is_none());
    }

    #[test]
    fn test_apply_predicate_accumulates_with_and() {
        let mut query = SelectBuilder::for_entity(customer());
        query.apply_predicate(name_eq("c", "X"));
        query.apply_predicate(name_eq("c", "Y"));

        let predicate = query.predicate().unwrap();
        let SqlExprKind::Binary { op, left, .. } = predicate.kind() else {
            panic!("expected AND accumulation");
        };
        assert_eq!(*op, BinaryOperator::AndAlso);
        // The earlier predicate becomes the left operand.
        assert_eq!(**left, name_eq("c", "X").convert_to_value(false));
    }

    #[test]
    fn test_apply_then_by_dedupes_structurally_equal_keys() {
        let mut query = SelectBuilder::for_entity(customer());
        let key = SqlExpr::column("c", "Name", SqlType::Text, None, true);
        query.apply_order_by(Ordering::asc(key.clone()));
        query.apply_then_by(Ordering::asc(key.clone()));
        query.apply_then_by(Ordering::desc(key));
        assert_eq!(query.orderings().len(), 1);
    }

    #[test]
    fn test_apply_order_by_resets_all_orderings() {
        let mut query = SelectBuilder::for_entity(customer());
        query.apply_order_by(Ordering::asc(SqlExpr::column(
            "c",
            "Id",
            SqlType::BigInt,
            None,
            false,
        )));
        query.apply_then_by(Ordering::asc(SqlExpr::column(
            "c",
            "Name",
            SqlType::Text,
            None,
            true,
        )));
        query.apply_order_by(Ordering::desc(SqlExpr::column(
            "c",
            "Id",
            SqlType::BigInt,
            None,
            false,
        )));
        assert_eq!(query.orderings().len(), 1);
        assert!(!query.orderings()[0].ascending);
    }

    #[test]
    fn test_reverse_orderings_flips_directions_in_place() {
        let mut query = SelectBuilder::for_entity(customer());
        query.apply_order_by(Ordering::asc(SqlExpr::column(
            "c",
            "Id",
            SqlType::BigInt,
            None,
            false,
        )));
        query.apply_then_by(Ordering::desc(SqlExpr::column(
            "c",
            "Name",
            SqlType::Text,
            None,
            true,
        )));
        query.reverse_orderings();
        assert!(!query.orderings()[0].ascending);
        assert!(query.orderings()[1].ascending);
    }

    #[test]
    fn test_pushdown_preserves_row_shape() {
        let mut query = SelectBuilder::for_entity(customer());
        query.pushdown_into_subquery();

        // Single derived table, k projections inside, one column per
        // property resolvable through the outer mapping.
        assert_eq!(query.tables().len(), 1);
        let TableSource::Subquery(inner) = &query.tables()[0] else {
            panic!("expected derived table");
        };
        assert_eq!(inner.projections().len(), 2);
        assert_eq!(inner.alias(), Some("t"));

        let MappedProjection::Entity(entity) =
            query.projection_expr(&ProjectionMember::root()).unwrap()
        else {
            panic!("root still maps the entity");
        };
        for (column, name) in entity.columns().iter().zip(["Id", "Name"]) {
            let SqlExprKind::Column { table, name: col, .. } = column.kind() else {
                panic!("expected plain column");
            };
            assert_eq!(table, "t");
            assert_eq!(col, name);
        }
    }

    #[test]
    fn test_pushdown_discards_orderings_of_unlimited_subquery() {
        let mut query = SelectBuilder::for_entity(customer());
        query.apply_order_by(Ordering::asc(SqlExpr::column(
            "c",
            "Name",
            SqlType::Text,
            None,
            true,
        )));
        query.pushdown_into_subquery();

        let TableSource::Subquery(inner) = &query.tables()[0] else {
            panic!("expected derived table");
        };
        assert!(inner.orderings().is_empty());
        assert!(query.orderings().is_empty());
    }

    #[test]
    fn test_pushdown_rehomes_orderings_of_limited_subquery() {
        let mut query = SelectBuilder::for_entity(customer());
        query.apply_order_by(Ordering::asc(SqlExpr::column(
            "c",
            "Name",
            SqlType::Text,
            None,
            true,
        )));
        query.apply_limit(SqlExpr::constant(10));
        query.apply_offset(SqlExpr::constant(5)); // limit already set: pushdown

        // The inner query keeps its ordering (it is limited); the outer
        // ordering points at the derived table.
        let TableSource::Subquery(inner) = &query.tables()[0] else {
            panic!("expected derived table");
        };
        assert_eq!(inner.orderings().len(), 1);
        assert_eq!(query.orderings().len(), 1);
        let SqlExprKind::Column { table, .. } = query.orderings()[0].expr.kind() else {
            panic!("expected re-homed column");
        };
        assert_eq!(table, "t");
    }

    #[test]
    fn test_repeated_pushdowns_nest_strictly() {
        let mut query = SelectBuilder::for_entity(customer());
        query.pushdown_into_subquery();
        query.pushdown_into_subquery();

        let TableSource::Subquery(level1) = &query.tables()[0] else {
            panic!("expected derived table");
        };
        let TableSource::Subquery(level2) = &level1.tables()[0] else {
            panic!("expected nested derived table");
        };
        assert!(matches!(level2.tables()[0], TableSource::Table(_)));
    }

    #[test]
    fn test_scenario_a_offset_after_limit_pushes_down() {
        let mut query = SelectBuilder::for_entity(customer());
        query.apply_predicate(name_eq("c", "X"));
        query.apply_limit(SqlExpr::constant(10));
        query.apply_offset(SqlExpr::constant(5));

        // Inner query holds the predicate and limit; outer holds the offset
        // over a plain pass-through projection of Id, Name.
        assert!(query.predicate().is_none());
        assert!(query.limit().is_none());
        assert_eq!(query.offset(), Some(&SqlExpr::constant(5)));

        let TableSource::Subquery(inner) = &query.tables()[0] else {
            panic!("expected derived table");
        };
        assert!(inner.predicate().is_some());
        assert_eq!(inner.limit(), Some(&SqlExpr::constant(10)));
        assert!(inner.offset().is_none());
        let names: Vec<_> = inner
            .projections()
            .iter()
            .map(|p| p.output_name().unwrap().to_string())
            .collect();
        assert_eq!(names, ["Id", "Name"]);
    }

    #[test]
    fn test_scenario_b_distinct_over_limited_query_pushes_down() {
        let mut query = SelectBuilder::for_entity(customer());
        query.apply_limit(SqlExpr::constant(5));
        query.apply_distinct();

        assert!(query.is_distinct());
        assert!(query.orderings().is_empty());
        assert!(query.limit().is_none());

        let TableSource::Subquery(inner) = &query.tables()[0] else {
            panic!("expected derived table");
        };
        assert_eq!(inner.limit(), Some(&SqlExpr::constant(5)));
        assert!(!inner.is_distinct());
        // Nesting depth 2: outer over one derived table over the base table.
        assert!(matches!(inner.tables()[0], TableSource::Table(_)));
    }

    #[test]
    fn test_apply_projection_expands_entity_to_slots() {
        let mut query = SelectBuilder::for_entity(customer());
        query.apply_projection();

        assert_eq!(query.projections().len(), 2);
        // Unaliased slots: column names are the implicit output names.
        assert!(query.projections().iter().all(|p| p.alias.is_empty()));

        let MappedProjection::EntitySlots(entity, indices) =
            query.projection_expr(&ProjectionMember::root()).unwrap()
        else {
            panic!("expected finalized entity entry");
        };
        assert_eq!(entity.name, "Customer");
        assert_eq!(indices, &[0, 1]);

        // Finalization is idempotent.
        query.apply_projection();
        assert_eq!(query.projections().len(), 2);
    }

    #[test]
    fn test_apply_projection_scalar_takes_member_name_as_alias() {
        let mut query = SelectBuilder::for_entity(customer());
        let total = SqlExpr::column("c", "Id", SqlType::BigInt, None, false);
        let mut mapping = ProjectionMapping::new();
        mapping.insert(ProjectionMember::of("Total"), MappedProjection::Expr(total));
        query.replace_projection_mapping(mapping);
        query.apply_projection();

        assert_eq!(query.projections().len(), 1);
        assert_eq!(query.projections()[0].alias, "Total");
        assert_eq!(
            query.projection_expr(&ProjectionMember::of("Total")).unwrap(),
            &MappedProjection::Slot(0)
        );
    }

    #[test]
    fn test_bind_property_resolves_column() {
        let query = SelectBuilder::for_entity(customer());
        let column = query
            .bind_property(&ProjectionMember::root(), "Name")
            .unwrap();
        assert_eq!(column.column_name(), Some("Name"));

        let err = query
            .bind_property(&ProjectionMember::of("missing"), "Name")
            .unwrap_err();
        assert!(!err.is_translation());
    }

    #[test]
    fn test_unmapped_member_lookup_is_internal_error() {
        let query = SelectBuilder::for_entity(customer());
        let err = query
            .projection_expr(&ProjectionMember::of("nope"))
            .unwrap_err();
        assert!(!err.is_translation());
    }

    #[test]
    fn test_prepare_for_aggregate_flattens_paged_state() {
        let mut query = SelectBuilder::for_entity(customer());
        query.apply_limit(SqlExpr::constant(5));
        query.prepare_for_aggregate();

        // The aggregate will run over the derived table's finished rows.
        assert!(query.limit().is_none());
        assert!(matches!(query.tables()[0], TableSource::Subquery(_)));

        // Nothing to flatten is a no-op.
        let mut plain = SelectBuilder::for_entity(customer());
        plain.prepare_for_aggregate();
        assert!(matches!(plain.tables()[0], TableSource::Table(_)));
    }

    #[test]
    fn test_build_freezes_state() {
        let mut query = SelectBuilder::for_entity(customer());
        query.apply_predicate(name_eq("c", "X"));
        query.apply_limit(SqlExpr::constant(3));
        let select = query.build();
        assert!(select.predicate().is_some());
        assert_eq!(select.limit(), Some(&SqlExpr::constant(3)));
        assert!(select.alias().is_none());
    }
}
