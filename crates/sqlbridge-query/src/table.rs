//! Table sources: base tables, derived tables, and joins.

use crate::expr::SqlExpr;
use crate::select::Select;

/// A base table reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableExpr {
    /// Table name
    pub name: String,
    /// Optional schema
    pub schema: Option<String>,
    /// Alias the rest of the query refers to this table by
    pub alias: String,
}

impl TableExpr {
    /// Create a table reference.
    pub fn new(
        name: impl Into<String>,
        schema: Option<String>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            schema,
            alias: alias.into(),
        }
    }
}

/// The shared base of predicate-carrying joins (INNER and LEFT).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PredicateJoin {
    /// The joined table source
    pub table: TableSource,
    /// Join predicate, held in condition position
    pub on: SqlExpr,
}

impl PredicateJoin {
    /// Create a predicate join, coercing the predicate to condition position.
    pub fn new(table: TableSource, on: SqlExpr) -> Self {
        Self {
            table,
            on: on.convert_to_value(false),
        }
    }
}

/// A source in a query's FROM list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TableSource {
    /// Base table
    Table(TableExpr),
    /// Derived table (a frozen subquery used as a source)
    Subquery(Box<Select>),
    /// INNER JOIN with a predicate
    InnerJoin(Box<PredicateJoin>),
    /// LEFT OUTER JOIN with a predicate
    LeftJoin(Box<PredicateJoin>),
    /// CROSS JOIN (no predicate)
    CrossJoin(Box<TableSource>),
}

impl TableSource {
    /// The alias this source is referred to by.
    ///
    /// Joins delegate to the source they wrap.
    pub fn alias(&self) -> Option<&str> {
        match self {
            TableSource::Table(table) => Some(&table.alias),
            TableSource::Subquery(select) => select.alias(),
            TableSource::InnerJoin(join) | TableSource::LeftJoin(join) => join.table.alias(),
            TableSource::CrossJoin(table) => table.alias(),
        }
    }

    /// Apply `f` to the expressions under this source, rebuilding only on
    /// change. Base tables are leaves; joins revisit their wrapped source
    /// and predicate, which is how outer rewrites reach nested subqueries.
    pub fn rewrite_exprs(&self, f: &mut dyn FnMut(&SqlExpr) -> Option<SqlExpr>) -> Option<TableSource> {
        match self {
            TableSource::Table(_) => None,

            TableSource::Subquery(select) => select
                .rewrite_exprs(f)
                .map(|s| TableSource::Subquery(Box::new(s))),

            TableSource::InnerJoin(join) => {
                Self::rewrite_join(join, f).map(|j| TableSource::InnerJoin(Box::new(j)))
            }

            TableSource::LeftJoin(join) => {
                Self::rewrite_join(join, f).map(|j| TableSource::LeftJoin(Box::new(j)))
            }

            TableSource::CrossJoin(table) => table
                .rewrite_exprs(f)
                .map(|t| TableSource::CrossJoin(Box::new(t))),
        }
    }

    fn rewrite_join(
        join: &PredicateJoin,
        f: &mut dyn FnMut(&SqlExpr) -> Option<SqlExpr>,
    ) -> Option<PredicateJoin> {
        let new_table = join.table.rewrite_exprs(f);
        let new_on = join.on.rewrite(f);
        if new_table.is_none() && new_on.is_none() {
            return None;
        }
        Some(PredicateJoin {
            table: new_table.unwrap_or_else(|| join.table.clone()),
            on: new_on.unwrap_or_else(|| join.on.clone()),
        })
    }
}
