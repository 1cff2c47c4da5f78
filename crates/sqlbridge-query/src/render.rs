//! SQL text generation from a frozen tree.
//!
//! Rendering never mutates the tree. Constants are collected into an
//! ordered parameter list and emitted as dialect placeholders; named
//! parameters — whose values live outside this layer — render as `:name`.

use serde::Serialize;
use sqlbridge_core::Value;

use crate::expr::{BinaryOperator, InSet, SqlExpr, SqlExprKind, UnaryOperator};
use crate::projection::Projection;
use crate::select::Select;
use crate::table::TableSource;

/// SQL dialect for generating dialect-specific text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dialect {
    /// PostgreSQL dialect (uses $1, $2 placeholders)
    #[default]
    Postgres,
    /// SQLite dialect (uses ?1, ?2 placeholders)
    Sqlite,
    /// MySQL dialect (uses ? placeholders)
    Mysql,
}

impl Dialect {
    /// Generate a placeholder for the given parameter index (1-based).
    pub fn placeholder(self, index: usize) -> String {
        match self {
            Dialect::Postgres => format!("${index}"),
            Dialect::Sqlite => format!("?{index}"),
            Dialect::Mysql => "?".to_string(),
        }
    }

    /// Quote an identifier for this dialect.
    ///
    /// Embedded quote characters are escaped by doubling them.
    pub fn quote_identifier(self, name: &str) -> String {
        match self {
            Dialect::Postgres | Dialect::Sqlite => {
                format!("\"{}\"", name.replace('"', "\"\""))
            }
            Dialect::Mysql => {
                format!("`{}`", name.replace('`', "``"))
            }
        }
    }
}

/// The rendered SQL text plus its ordered parameters.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RenderedQuery {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Render a frozen query for the given dialect.
pub fn render(select: &Select, dialect: Dialect) -> RenderedQuery {
    let mut renderer = Renderer {
        dialect,
        params: Vec::new(),
    };
    let sql = renderer.select(select);
    RenderedQuery {
        sql,
        params: renderer.params,
    }
}

struct Renderer {
    dialect: Dialect,
    params: Vec<Value>,
}

impl Renderer {
    fn select(&mut self, select: &Select) -> String {
        let mut sql = String::from("SELECT ");
        if select.is_distinct() {
            sql.push_str("DISTINCT ");
        }

        if select.projections().is_empty() {
            sql.push('1');
        } else {
            let slots: Vec<String> = select
                .projections()
                .iter()
                .map(|p| self.projection(p))
                .collect();
            sql.push_str(&slots.join(", "));
        }

        if !select.tables().is_empty() {
            sql.push_str(" FROM ");
            for (i, table) in select.tables().iter().enumerate() {
                let rendered = self.table(table);
                if i == 0 {
                    sql.push_str(&rendered);
                } else {
                    sql.push(' ');
                    sql.push_str(&rendered);
                }
            }
        }

        if let Some(predicate) = select.predicate() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.condition_position(predicate));
        }

        if !select.orderings().is_empty() {
            sql.push_str(" ORDER BY ");
            let keys: Vec<String> = select
                .orderings()
                .iter()
                .map(|o| {
                    let direction = if o.ascending { "ASC" } else { "DESC" };
                    format!("{} {}", self.value_position(&o.expr), direction)
                })
                .collect();
            sql.push_str(&keys.join(", "));
        }

        if let Some(limit) = select.limit() {
            sql.push_str(" LIMIT ");
            sql.push_str(&self.value_position(limit));
        }

        if let Some(offset) = select.offset() {
            sql.push_str(" OFFSET ");
            sql.push_str(&self.value_position(offset));
        }

        sql
    }

    fn projection(&mut self, projection: &Projection) -> String {
        let expr = self.value_position(&projection.expr);
        // AS is redundant when the alias repeats the column's own name.
        if projection.alias.is_empty()
            || projection.expr.column_name() == Some(projection.alias.as_str())
        {
            expr
        } else {
            format!(
                "{expr} AS {}",
                self.dialect.quote_identifier(&projection.alias)
            )
        }
    }

    fn table(&mut self, table: &TableSource) -> String {
        match table {
            TableSource::Table(t) => {
                let name = match &t.schema {
                    Some(schema) => format!(
                        "{}.{}",
                        self.dialect.quote_identifier(schema),
                        self.dialect.quote_identifier(&t.name)
                    ),
                    None => self.dialect.quote_identifier(&t.name),
                };
                format!("{name} AS {}", self.dialect.quote_identifier(&t.alias))
            }
            TableSource::Subquery(select) => {
                let inner = self.select(select);
                let alias = select.alias().unwrap_or("t");
                format!("({inner}) AS {}", self.dialect.quote_identifier(alias))
            }
            TableSource::InnerJoin(join) => {
                let table = self.table(&join.table);
                let on = self.condition_position(&join.on);
                format!("INNER JOIN {table} ON {on}")
            }
            TableSource::LeftJoin(join) => {
                let table = self.table(&join.table);
                let on = self.condition_position(&join.on);
                format!("LEFT JOIN {table} ON {on}")
            }
            TableSource::CrossJoin(table) => {
                format!("CROSS JOIN {}", self.table(table))
            }
        }
    }

    /// Render in value position: a condition node gets its CASE wrapper.
    fn value_position(&mut self, expr: &SqlExpr) -> String {
        if expr.is_condition() {
            format!("CASE WHEN {} THEN TRUE ELSE FALSE END", self.expr(expr))
        } else {
            self.expr(expr)
        }
    }

    /// Render in condition position. Value-kind booleans (a bare boolean
    /// column) are legal predicates in the supported dialects and render
    /// as-is.
    fn condition_position(&mut self, expr: &SqlExpr) -> String {
        self.expr(expr)
    }

    fn expr(&mut self, expr: &SqlExpr) -> String {
        match expr.kind() {
            SqlExprKind::Column { table, name, .. } => format!(
                "{}.{}",
                self.dialect.quote_identifier(table),
                self.dialect.quote_identifier(name)
            ),

            SqlExprKind::Constant(value) => {
                self.params.push(value.clone());
                self.dialect.placeholder(self.params.len())
            }

            SqlExprKind::Parameter { name } => format!(":{name}"),

            SqlExprKind::Fragment { sql } => sql.clone(),

            SqlExprKind::Unary { op, operand } => match op {
                UnaryOperator::Equal => format!("{} IS NULL", self.value_position(operand)),
                UnaryOperator::NotEqual => {
                    format!("{} IS NOT NULL", self.value_position(operand))
                }
                UnaryOperator::Not => format!("NOT ({})", self.condition_position(operand)),
                UnaryOperator::Negate => format!("-{}", self.operand(operand)),
                UnaryOperator::Convert => {
                    let target = expr
                        .type_mapping()
                        .map_or_else(|| expr.result_type().sql_name(), |m| m.store_type.clone());
                    format!("CAST({} AS {target})", self.value_position(operand))
                }
                UnaryOperator::OnesComplement | UnaryOperator::UnaryPlus => {
                    unreachable!("rejected at construction")
                }
            },

            SqlExprKind::Binary { op, left, right } => match op {
                BinaryOperator::Coalesce => format!(
                    "COALESCE({}, {})",
                    self.value_position(left),
                    self.value_position(right)
                ),
                op if op.is_logical() => format!(
                    "{} {} {}",
                    self.logical_operand(left),
                    op.as_str(),
                    self.logical_operand(right)
                ),
                op => format!(
                    "{} {} {}",
                    self.operand(left),
                    op.as_str(),
                    self.operand(right)
                ),
            },

            SqlExprKind::Case {
                operand,
                whens,
                else_result,
            } => {
                let mut sql = String::from("CASE");
                if let Some(operand) = operand {
                    sql.push(' ');
                    sql.push_str(&self.value_position(operand));
                }
                for arm in whens {
                    let test = if operand.is_some() {
                        self.value_position(&arm.test)
                    } else {
                        self.condition_position(&arm.test)
                    };
                    sql.push_str(&format!(
                        " WHEN {test} THEN {}",
                        self.value_position(&arm.result)
                    ));
                }
                if let Some(else_result) = else_result {
                    sql.push_str(&format!(" ELSE {}", self.value_position(else_result)));
                }
                sql.push_str(" END");
                sql
            }

            SqlExprKind::Exists { subquery, negated } => {
                let not = if *negated { "NOT " } else { "" };
                format!("{not}EXISTS ({})", self.select(subquery))
            }

            SqlExprKind::In { item, set, negated } => {
                let not = if *negated { "NOT " } else { "" };
                let set_sql = match set {
                    InSet::Values(values) => {
                        let rendered: Vec<String> =
                            values.iter().map(|v| self.value_position(v)).collect();
                        rendered.join(", ")
                    }
                    InSet::Subquery(subquery) => self.select(subquery),
                };
                format!("{} {not}IN ({set_sql})", self.value_position(item))
            }

            SqlExprKind::Like {
                matched,
                pattern,
                escape,
            } => {
                let mut sql = format!(
                    "{} LIKE {}",
                    self.value_position(matched),
                    self.value_position(pattern)
                );
                if let Some(escape) = escape {
                    sql.push_str(&format!(" ESCAPE {}", self.value_position(escape)));
                }
                sql
            }

            SqlExprKind::Negate { operand } => format!("-{}", self.operand(operand)),

            SqlExprKind::Not { operand } => {
                format!("NOT ({})", self.condition_position(operand))
            }

            SqlExprKind::IsNull { operand, negated } => {
                let not = if *negated { " NOT" } else { "" };
                format!("{} IS{not} NULL", self.value_position(operand))
            }

            SqlExprKind::Cast { operand } => {
                let target = expr
                    .type_mapping()
                    .map_or_else(|| expr.result_type().sql_name(), |m| m.store_type.clone());
                format!("CAST({} AS {target})", self.value_position(operand))
            }

            SqlExprKind::Function {
                instance,
                schema,
                name,
                niladic,
                args,
                ..
            } => {
                if *niladic {
                    return name.clone();
                }
                let rendered: Vec<String> = args.iter().map(|a| self.value_position(a)).collect();
                let call = format!("{name}({})", rendered.join(", "));
                match (instance, schema) {
                    (Some(instance), _) => {
                        format!("{}.{call}", self.value_position(instance))
                    }
                    (None, Some(schema)) => {
                        format!("{}.{call}", self.dialect.quote_identifier(schema))
                    }
                    (None, None) => call,
                }
            }
        }
    }

    /// A comparison or arithmetic operand, parenthesized when it is itself
    /// a binary expression.
    fn operand(&mut self, expr: &SqlExpr) -> String {
        let rendered = self.value_position(expr);
        if matches!(expr.kind(), SqlExprKind::Binary { .. }) && !expr.is_condition() {
            format!("({rendered})")
        } else {
            rendered
        }
    }

    /// A logical-connective operand, parenthesized when it is itself a
    /// logical connective (so `(a OR b) AND c` keeps its shape).
    fn logical_operand(&mut self, expr: &SqlExpr) -> String {
        let rendered = self.condition_position(expr);
        if matches!(expr.kind(), SqlExprKind::Binary { op, .. } if op.is_logical()) {
            format!("({rendered})")
        } else {
            rendered
        }
    }
}
