//! Whole-tree substitution passes over immutable nodes.
//!
//! All passes share the generic rewrite contract: a rewriter is applied
//! pre-order, nodes rebuild only when a child actually changed, and an
//! identity rewriter returns the original tree untouched.

use std::collections::HashMap;

use sqlbridge_core::Value;

use crate::expr::{SqlExpr, SqlExprKind};
use crate::select::Select;

/// A structural substitution table from old expressions to the columns now
/// standing in for them.
///
/// Produced by pushdown: expressions that referenced the demoted query's
/// tables are replaced by columns over the derived table. Lookup is by
/// structural equality, so any equal expression is re-homed no matter where
/// or when it was built.
#[derive(Debug, Clone, Default)]
pub struct Remapping {
    map: HashMap<SqlExpr, SqlExpr>,
}

impl Remapping {
    /// An empty substitution table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `from` is now exposed as `to`.
    pub fn insert(&mut self, from: SqlExpr, to: SqlExpr) {
        self.map.insert(from, to);
    }

    /// The replacement for `expr`, when one was recorded.
    pub fn get(&self, expr: &SqlExpr) -> Option<&SqlExpr> {
        self.map.get(expr)
    }

    /// Whether any substitution was recorded.
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Apply the substitution across a whole expression tree.
    pub fn remap(&self, expr: &SqlExpr) -> SqlExpr {
        expr.rewrite(&mut |node| self.map.get(node).cloned())
            .unwrap_or_else(|| expr.clone())
    }
}

/// Replace every named parameter with a constant from `values`, preserving
/// the parameter's type mapping. Parameters without a value stay in place.
pub fn inline_parameters(expr: &SqlExpr, values: &HashMap<String, Value>) -> SqlExpr {
    expr.rewrite(&mut |node| inline_one(node, values))
        .unwrap_or_else(|| expr.clone())
}

/// Parameter inlining over a whole frozen query, derived tables included.
pub fn inline_parameters_in_select(select: &Select, values: &HashMap<String, Value>) -> Select {
    select
        .rewrite_exprs(&mut |node| inline_one(node, values))
        .unwrap_or_else(|| select.clone())
}

fn inline_one(node: &SqlExpr, values: &HashMap<String, Value>) -> Option<SqlExpr> {
    let SqlExprKind::Parameter { name } = node.kind() else {
        return None;
    };
    let value = values.get(name)?.clone();
    Some(match node.type_mapping() {
        Some(mapping) => SqlExpr::constant_with_mapping(value, mapping.clone()),
        None => SqlExpr::constant(value),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::BinaryOperator;
    use sqlbridge_core::{SqlType, TypeMapping};

    fn age_filter() -> SqlExpr {
        SqlExpr::binary(
            BinaryOperator::GreaterThan,
            SqlExpr::column("c", "Age", SqlType::Integer, None, false),
            SqlExpr::parameter("min_age", SqlType::Integer, Some(TypeMapping::new("int"))),
        )
        .unwrap()
    }

    #[test]
    fn test_remap_replaces_structurally_equal_nodes() {
        let old_column = SqlExpr::column("c", "Age", SqlType::Integer, None, false);
        let new_column = SqlExpr::column("t", "Age", SqlType::Integer, None, false);

        let mut remapping = Remapping::new();
        remapping.insert(old_column.clone(), new_column.clone());

        let remapped = remapping.remap(&age_filter());
        let mut found = false;
        remapped.rewrite(&mut |node| {
            if *node == new_column {
                found = true;
            }
            None
        });
        assert!(found);
    }

    #[test]
    fn test_empty_remapping_returns_equal_tree() {
        let filter = age_filter();
        assert_eq!(Remapping::new().remap(&filter), filter);
    }

    #[test]
    fn test_inline_parameters_substitutes_constant() {
        let mut values = HashMap::new();
        values.insert("min_age".to_string(), Value::Int(21));

        let inlined = inline_parameters(&age_filter(), &values);
        let mut constant = None;
        inlined.rewrite(&mut |node| {
            if let SqlExprKind::Constant(v) = node.kind() {
                constant = Some(v.clone());
            }
            None
        });
        assert_eq!(constant, Some(Value::Int(21)));

        // The parameter's type mapping carries over to the constant.
        let mut mapping = None;
        inlined.rewrite(&mut |node| {
            if matches!(node.kind(), SqlExprKind::Constant(_)) {
                mapping = node.type_mapping().cloned();
            }
            None
        });
        assert_eq!(mapping, Some(TypeMapping::new("int")));
    }

    #[test]
    fn test_inline_parameters_without_values_is_identity() {
        let filter = age_filter();
        assert_eq!(inline_parameters(&filter, &HashMap::new()), filter);
    }
}
