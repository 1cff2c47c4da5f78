//! SQL scalar expression nodes.
//!
//! Every node is immutable after construction and compared structurally:
//! two nodes that would render to the same SQL text are equal regardless of
//! identity. Each node carries a shared header (result type, optional
//! dialect type mapping, value-position flag) and a closed [`SqlExprKind`]
//! union, so the supported SQL constructs are exhaustiveness-checked at
//! every `match`.
//!
//! # Value and condition positions
//!
//! SQL distinguishes where a boolean may appear: a comparison is legal in
//! WHERE but needs a CASE wrapper in a SELECT list. Nodes whose native form
//! is a predicate report `is_condition() == true`; `convert_to_value`
//! records which position the node currently occupies. Constructors coerce
//! every operand into the position the operator requires, so a finished
//! tree is coherent by construction.

use sqlbridge_core::{
    Error, Property, Result, SqlType, TranslationErrorKind, TypeMapping, Value,
};

use crate::select::Select;

/// Binary operators accepted from the source query.
///
/// Construction validates against the supported subset; the bitwise, shift,
/// and power members exist so the front-end can hand them over, but they
/// fail with a translation error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,

    // Logical connectives. The source language has eager and short-circuit
    // forms; both render as SQL AND / OR.
    And,
    AndAlso,
    Or,
    OrElse,

    // Comparison
    Equal,
    NotEqual,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,

    // First non-NULL operand
    Coalesce,

    // Unsupported in SQL translation
    BitwiseAnd,
    BitwiseOr,
    BitwiseXor,
    LeftShift,
    RightShift,
    Power,
}

impl BinaryOperator {
    /// Whether this operator has a SQL translation at all.
    pub const fn is_supported(self) -> bool {
        !matches!(
            self,
            BinaryOperator::BitwiseAnd
                | BinaryOperator::BitwiseOr
                | BinaryOperator::BitwiseXor
                | BinaryOperator::LeftShift
                | BinaryOperator::RightShift
                | BinaryOperator::Power
        )
    }

    /// Is this a boolean connective (operands are conditions)?
    pub const fn is_logical(self) -> bool {
        matches!(
            self,
            BinaryOperator::And
                | BinaryOperator::AndAlso
                | BinaryOperator::Or
                | BinaryOperator::OrElse
        )
    }

    /// Is this a comparison (boolean result over value operands)?
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOperator::Equal
                | BinaryOperator::NotEqual
                | BinaryOperator::GreaterThan
                | BinaryOperator::GreaterThanOrEqual
                | BinaryOperator::LessThan
                | BinaryOperator::LessThanOrEqual
        )
    }

    /// Get the SQL representation of this operator.
    pub const fn as_str(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Subtract => "-",
            BinaryOperator::Multiply => "*",
            BinaryOperator::Divide => "/",
            BinaryOperator::Modulo => "%",
            BinaryOperator::And | BinaryOperator::AndAlso => "AND",
            BinaryOperator::Or | BinaryOperator::OrElse => "OR",
            BinaryOperator::Equal => "=",
            BinaryOperator::NotEqual => "<>",
            BinaryOperator::GreaterThan => ">",
            BinaryOperator::GreaterThanOrEqual => ">=",
            BinaryOperator::LessThan => "<",
            BinaryOperator::LessThanOrEqual => "<=",
            BinaryOperator::Coalesce => "COALESCE",
            BinaryOperator::BitwiseAnd => "&",
            BinaryOperator::BitwiseOr => "|",
            BinaryOperator::BitwiseXor => "^",
            BinaryOperator::LeftShift => "<<",
            BinaryOperator::RightShift => ">>",
            BinaryOperator::Power => "**",
        }
    }
}

impl std::fmt::Display for BinaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Unary operators accepted from the source query.
///
/// `Equal` and `NotEqual` are the null tests (`IS NULL` / `IS NOT NULL`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOperator {
    Equal,
    NotEqual,
    Convert,
    Not,
    Negate,

    // Unsupported in SQL translation
    OnesComplement,
    UnaryPlus,
}

impl UnaryOperator {
    /// Whether this operator has a SQL translation at all.
    pub const fn is_supported(self) -> bool {
        matches!(
            self,
            UnaryOperator::Equal
                | UnaryOperator::NotEqual
                | UnaryOperator::Convert
                | UnaryOperator::Not
                | UnaryOperator::Negate
        )
    }
}

impl std::fmt::Display for UnaryOperator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// One WHEN/THEN arm of a CASE expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CaseWhen {
    pub test: SqlExpr,
    pub result: SqlExpr,
}

/// The right-hand side of an IN expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum InSet {
    /// Explicit value list
    Values(Vec<SqlExpr>),
    /// Derived-table membership test
    Subquery(Box<Select>),
}

/// The closed set of SQL scalar constructs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SqlExprKind {
    /// Reference to a column of a table source, by the source's alias
    Column {
        table: String,
        name: String,
        nullable: bool,
    },
    /// Literal value
    Constant(Value),
    /// Named external value supplied at execution time
    Parameter { name: String },
    /// Opaque literal SQL text
    Fragment { sql: String },
    Unary {
        op: UnaryOperator,
        operand: Box<SqlExpr>,
    },
    Binary {
        op: BinaryOperator,
        left: Box<SqlExpr>,
        right: Box<SqlExpr>,
    },
    Case {
        operand: Option<Box<SqlExpr>>,
        whens: Vec<CaseWhen>,
        else_result: Option<Box<SqlExpr>>,
    },
    Exists {
        subquery: Box<Select>,
        negated: bool,
    },
    In {
        item: Box<SqlExpr>,
        set: InSet,
        negated: bool,
    },
    Like {
        matched: Box<SqlExpr>,
        pattern: Box<SqlExpr>,
        escape: Option<Box<SqlExpr>>,
    },
    Negate { operand: Box<SqlExpr> },
    Not { operand: Box<SqlExpr> },
    IsNull {
        operand: Box<SqlExpr>,
        negated: bool,
    },
    Cast { operand: Box<SqlExpr> },
    Function {
        instance: Option<Box<SqlExpr>>,
        schema: Option<String>,
        name: String,
        niladic: bool,
        args: Vec<SqlExpr>,
        condition: bool,
    },
}

/// An immutable SQL scalar expression node.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SqlExpr {
    result_type: SqlType,
    type_mapping: Option<TypeMapping>,
    should_be_value: bool,
    kind: SqlExprKind,
}

impl SqlExpr {
    fn value_node(result_type: SqlType, type_mapping: Option<TypeMapping>, kind: SqlExprKind) -> Self {
        Self {
            result_type,
            type_mapping,
            should_be_value: true,
            kind,
        }
    }

    fn condition_node(type_mapping: Option<TypeMapping>, kind: SqlExprKind) -> Self {
        Self {
            result_type: SqlType::Boolean,
            type_mapping,
            should_be_value: false,
            kind,
        }
    }

    // ==================== Leaf constructors ====================

    /// Create a column reference.
    pub fn column(
        table: impl Into<String>,
        name: impl Into<String>,
        sql_type: SqlType,
        type_mapping: Option<TypeMapping>,
        nullable: bool,
    ) -> Self {
        Self::value_node(
            sql_type,
            type_mapping,
            SqlExprKind::Column {
                table: table.into(),
                name: name.into(),
                nullable,
            },
        )
    }

    /// Create a column reference for a declared property of a table source.
    pub fn column_for_property(table_alias: &str, property: &Property) -> Self {
        Self::column(
            table_alias,
            property.column_name.clone(),
            property.sql_type.clone(),
            property.type_mapping.clone(),
            property.nullable,
        )
    }

    /// Create a constant from a literal value.
    pub fn constant(value: impl Into<Value>) -> Self {
        let value = value.into();
        Self::value_node(value.sql_type(), None, SqlExprKind::Constant(value))
    }

    /// Create a constant with an explicit type mapping.
    pub fn constant_with_mapping(value: impl Into<Value>, type_mapping: TypeMapping) -> Self {
        let value = value.into();
        Self::value_node(
            value.sql_type(),
            Some(type_mapping),
            SqlExprKind::Constant(value),
        )
    }

    /// The literal TRUE constant.
    pub fn true_literal() -> Self {
        Self::constant(true)
    }

    /// Create a named parameter reference.
    pub fn parameter(
        name: impl Into<String>,
        sql_type: SqlType,
        type_mapping: Option<TypeMapping>,
    ) -> Self {
        Self::value_node(
            sql_type,
            type_mapping,
            SqlExprKind::Parameter { name: name.into() },
        )
    }

    /// Create an opaque SQL fragment.
    pub fn fragment(sql: impl Into<String>) -> Self {
        Self::value_node(SqlType::Text, None, SqlExprKind::Fragment { sql: sql.into() })
    }

    // ==================== Composite constructors ====================

    /// Create a binary expression.
    ///
    /// The operator is validated against the supported set; logical
    /// connectives coerce both operands to condition position, every other
    /// operator coerces them to value position. Comparisons and connectives
    /// produce a boolean; arithmetic and COALESCE inherit the left operand's
    /// type and the first available type mapping.
    pub fn binary(op: BinaryOperator, left: SqlExpr, right: SqlExpr) -> Result<Self> {
        if !op.is_supported() {
            return Err(Error::unsupported_operator(
                TranslationErrorKind::UnsupportedBinaryOperator,
                op,
            ));
        }

        let (left, right) = if op.is_logical() {
            (left.convert_to_value(false), right.convert_to_value(false))
        } else {
            (left.convert_to_value(true), right.convert_to_value(true))
        };

        let node = if op.is_logical() || op.is_comparison() {
            Self::condition_node(
                None,
                SqlExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            )
        } else {
            let result_type = left.result_type.clone();
            let type_mapping = left.type_mapping.clone().or_else(|| right.type_mapping.clone());
            Self::value_node(
                result_type,
                type_mapping,
                SqlExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
            )
        };

        Ok(node)
    }

    /// Boolean AND of two predicates (internal; the operator is always in
    /// the supported set).
    pub(crate) fn and_also(left: SqlExpr, right: SqlExpr) -> SqlExpr {
        match Self::binary(BinaryOperator::AndAlso, left, right) {
            Ok(node) => node,
            Err(_) => unreachable!("AND is a supported operator"),
        }
    }

    /// Create a unary expression.
    ///
    /// `Equal`/`NotEqual` are the null tests and `Not` the boolean negation,
    /// all conditions; `Negate` keeps the operand's type; `Convert` keeps it
    /// too unless overridden via [`SqlExpr::convert`].
    pub fn unary(op: UnaryOperator, operand: SqlExpr) -> Result<Self> {
        if !op.is_supported() {
            return Err(Error::unsupported_operator(
                TranslationErrorKind::UnsupportedUnaryOperator,
                op,
            ));
        }

        let node = match op {
            UnaryOperator::Not => Self::condition_node(
                None,
                SqlExprKind::Unary {
                    op,
                    operand: Box::new(operand.convert_to_value(false)),
                },
            ),
            UnaryOperator::Equal | UnaryOperator::NotEqual => Self::condition_node(
                None,
                SqlExprKind::Unary {
                    op,
                    operand: Box::new(operand.convert_to_value(true)),
                },
            ),
            UnaryOperator::Convert | UnaryOperator::Negate => {
                let operand = operand.convert_to_value(true);
                let result_type = operand.result_type.clone();
                let type_mapping = operand.type_mapping.clone();
                Self::value_node(
                    result_type,
                    type_mapping,
                    SqlExprKind::Unary {
                        op,
                        operand: Box::new(operand),
                    },
                )
            }
            UnaryOperator::OnesComplement | UnaryOperator::UnaryPlus => unreachable!(),
        };

        Ok(node)
    }

    /// Create a `Convert` unary with an explicit result type.
    pub fn convert(operand: SqlExpr, result_type: SqlType, type_mapping: Option<TypeMapping>) -> Self {
        Self::value_node(
            result_type,
            type_mapping,
            SqlExprKind::Unary {
                op: UnaryOperator::Convert,
                operand: Box::new(operand.convert_to_value(true)),
            },
        )
    }

    /// Create a searched CASE expression (`CASE WHEN … THEN … END`).
    ///
    /// Result type and mapping come from the first arm's result; every test
    /// is coerced to condition position and every result to value position.
    pub fn case(whens: Vec<CaseWhen>, else_result: Option<SqlExpr>) -> Self {
        Self::case_with_operand(None, whens, else_result)
    }

    /// Create a simple CASE expression with a switch operand
    /// (`CASE x WHEN … THEN … END`).
    ///
    /// The operand is a value; the implied comparison with each test makes
    /// the tests values as well.
    pub fn case_with_operand(
        operand: Option<SqlExpr>,
        whens: Vec<CaseWhen>,
        else_result: Option<SqlExpr>,
    ) -> Self {
        let has_operand = operand.is_some();
        let whens: Vec<CaseWhen> = whens
            .into_iter()
            .map(|arm| CaseWhen {
                test: arm.test.convert_to_value(has_operand),
                result: arm.result.convert_to_value(true),
            })
            .collect();
        let else_result = else_result.map(|e| e.convert_to_value(true));

        let (result_type, type_mapping) = whens
            .first()
            .map(|arm| (arm.result.result_type.clone(), arm.result.type_mapping.clone()))
            .or_else(|| {
                else_result
                    .as_ref()
                    .map(|e| (e.result_type.clone(), e.type_mapping.clone()))
            })
            .unwrap_or((SqlType::Boolean, None));

        Self::value_node(
            result_type,
            type_mapping,
            SqlExprKind::Case {
                operand: operand.map(|o| Box::new(o.convert_to_value(true))),
                whens,
                else_result: else_result.map(Box::new),
            },
        )
    }

    /// Create an EXISTS test over a subquery.
    pub fn exists(subquery: Select, negated: bool) -> Self {
        Self::condition_node(
            None,
            SqlExprKind::Exists {
                subquery: Box::new(subquery),
                negated,
            },
        )
    }

    /// Create an IN test against an explicit value list.
    pub fn in_values(item: SqlExpr, values: Vec<SqlExpr>, negated: bool) -> Self {
        Self::condition_node(
            None,
            SqlExprKind::In {
                item: Box::new(item.convert_to_value(true)),
                set: InSet::Values(values.into_iter().map(|v| v.convert_to_value(true)).collect()),
                negated,
            },
        )
    }

    /// Create an IN test against a subquery.
    pub fn in_subquery(item: SqlExpr, subquery: Select, negated: bool) -> Self {
        Self::condition_node(
            None,
            SqlExprKind::In {
                item: Box::new(item.convert_to_value(true)),
                set: InSet::Subquery(Box::new(subquery)),
                negated,
            },
        )
    }

    /// Create a LIKE pattern test.
    pub fn like(matched: SqlExpr, pattern: SqlExpr, escape: Option<SqlExpr>) -> Self {
        Self::condition_node(
            None,
            SqlExprKind::Like {
                matched: Box::new(matched.convert_to_value(true)),
                pattern: Box::new(pattern.convert_to_value(true)),
                escape: escape.map(|e| Box::new(e.convert_to_value(true))),
            },
        )
    }

    /// Create an arithmetic negation.
    pub fn negate(operand: SqlExpr) -> Self {
        let operand = operand.convert_to_value(true);
        let result_type = operand.result_type.clone();
        let type_mapping = operand.type_mapping.clone();
        Self::value_node(
            result_type,
            type_mapping,
            SqlExprKind::Negate {
                operand: Box::new(operand),
            },
        )
    }

    /// Create a boolean negation.
    pub fn not(operand: SqlExpr) -> Self {
        Self::condition_node(
            None,
            SqlExprKind::Not {
                operand: Box::new(operand.convert_to_value(false)),
            },
        )
    }

    /// Create a null test (`IS NULL`, or `IS NOT NULL` when negated).
    pub fn is_null(operand: SqlExpr, negated: bool) -> Self {
        Self::condition_node(
            None,
            SqlExprKind::IsNull {
                operand: Box::new(operand.convert_to_value(true)),
                negated,
            },
        )
    }

    /// Create a CAST to the target type.
    pub fn cast(operand: SqlExpr, target: SqlType, type_mapping: Option<TypeMapping>) -> Self {
        Self::value_node(
            target,
            type_mapping,
            SqlExprKind::Cast {
                operand: Box::new(operand.convert_to_value(true)),
            },
        )
    }

    /// Create a function call.
    ///
    /// `condition` marks functions that return a boolean usable directly in
    /// predicate position; everything else is a value.
    pub fn function(
        name: impl Into<String>,
        args: Vec<SqlExpr>,
        result_type: SqlType,
        type_mapping: Option<TypeMapping>,
        condition: bool,
    ) -> Self {
        let kind = SqlExprKind::Function {
            instance: None,
            schema: None,
            name: name.into(),
            niladic: false,
            args: args.into_iter().map(|a| a.convert_to_value(true)).collect(),
            condition,
        };
        if condition {
            Self::condition_node(type_mapping, kind)
        } else {
            Self::value_node(result_type, type_mapping, kind)
        }
    }

    /// Create a schema-qualified function call.
    pub fn schema_function(
        schema: impl Into<String>,
        name: impl Into<String>,
        args: Vec<SqlExpr>,
        result_type: SqlType,
        type_mapping: Option<TypeMapping>,
    ) -> Self {
        let mut node = Self::function(name, args, result_type, type_mapping, false);
        if let SqlExprKind::Function { schema: s, .. } = &mut node.kind {
            *s = Some(schema.into());
        }
        node
    }

    /// Create an instance function call (`instance.name(args)`).
    pub fn instance_function(
        instance: SqlExpr,
        name: impl Into<String>,
        args: Vec<SqlExpr>,
        result_type: SqlType,
        type_mapping: Option<TypeMapping>,
    ) -> Self {
        let mut node = Self::function(name, args, result_type, type_mapping, false);
        if let SqlExprKind::Function { instance: i, .. } = &mut node.kind {
            *i = Some(Box::new(instance.convert_to_value(true)));
        }
        node
    }

    /// Create a no-argument ("niladic") function reference, rendered
    /// without parentheses (e.g. `CURRENT_TIMESTAMP`).
    pub fn niladic_function(
        name: impl Into<String>,
        result_type: SqlType,
        type_mapping: Option<TypeMapping>,
    ) -> Self {
        Self::value_node(
            result_type,
            type_mapping,
            SqlExprKind::Function {
                instance: None,
                schema: None,
                name: name.into(),
                niladic: true,
                args: Vec::new(),
                condition: false,
            },
        )
    }

    // ==================== Accessors ====================

    /// The node kind and children.
    pub fn kind(&self) -> &SqlExprKind {
        &self.kind
    }

    /// The semantic scalar type this expression produces.
    pub fn result_type(&self) -> &SqlType {
        &self.result_type
    }

    /// The dialect type mapping, when one is attached.
    pub fn type_mapping(&self) -> Option<&TypeMapping> {
        self.type_mapping.as_ref()
    }

    /// Whether this node is currently used where a scalar value is required.
    pub fn should_be_value(&self) -> bool {
        self.should_be_value
    }

    /// Whether this node's native SQL position is a predicate.
    pub fn is_condition(&self) -> bool {
        match &self.kind {
            SqlExprKind::Binary { op, .. } => op.is_logical() || op.is_comparison(),
            SqlExprKind::Unary { op, .. } => matches!(
                op,
                UnaryOperator::Equal | UnaryOperator::NotEqual | UnaryOperator::Not
            ),
            SqlExprKind::Exists { .. }
            | SqlExprKind::In { .. }
            | SqlExprKind::Like { .. }
            | SqlExprKind::Not { .. }
            | SqlExprKind::IsNull { .. } => true,
            SqlExprKind::Function { condition, .. } => *condition,
            _ => false,
        }
    }

    /// Is this the literal TRUE constant?
    pub fn is_literal_true(&self) -> bool {
        matches!(&self.kind, SqlExprKind::Constant(Value::Bool(true)))
    }

    /// The column name, when this node is a column reference.
    pub fn column_name(&self) -> Option<&str> {
        match &self.kind {
            SqlExprKind::Column { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Whether a column reference is nullable; `None` for other kinds.
    pub fn column_nullable(&self) -> Option<bool> {
        match &self.kind {
            SqlExprKind::Column { nullable, .. } => Some(*nullable),
            _ => None,
        }
    }

    // ==================== Position conversion ====================

    /// Return a node coherent with the requested position.
    ///
    /// Identity for value-kind nodes and for condition nodes already in the
    /// requested position; idempotent and reversible.
    pub fn convert_to_value(mut self, as_value: bool) -> Self {
        if self.is_condition() {
            self.should_be_value = as_value;
        }
        self
    }

    /// A nullable copy of a column reference; identity for other kinds.
    pub fn make_nullable(&self) -> Self {
        let mut copy = self.clone();
        if let SqlExprKind::Column { nullable, .. } = &mut copy.kind {
            *nullable = true;
        }
        copy
    }

    // ==================== Rewriting ====================

    /// Apply `f` to this node first, then to its children (pre-order).
    ///
    /// Returns `None` when nothing changed, so an identity rewriter never
    /// reallocates any part of the tree.
    pub fn rewrite(&self, f: &mut dyn FnMut(&SqlExpr) -> Option<SqlExpr>) -> Option<SqlExpr> {
        if let Some(replaced) = f(self) {
            return Some(replaced);
        }
        self.visit_children(f)
    }

    /// Apply `f` recursively to every child, rebuilding this node (with
    /// identical header flags) only if some child changed.
    pub fn visit_children(&self, f: &mut dyn FnMut(&SqlExpr) -> Option<SqlExpr>) -> Option<SqlExpr> {
        let rebuild = |kind: SqlExprKind| SqlExpr {
            result_type: self.result_type.clone(),
            type_mapping: self.type_mapping.clone(),
            should_be_value: self.should_be_value,
            kind,
        };

        match &self.kind {
            SqlExprKind::Column { .. }
            | SqlExprKind::Constant(_)
            | SqlExprKind::Parameter { .. }
            | SqlExprKind::Fragment { .. } => None,

            SqlExprKind::Unary { op, operand } => operand.rewrite(f).map(|operand| {
                rebuild(SqlExprKind::Unary {
                    op: *op,
                    operand: Box::new(operand),
                })
            }),

            SqlExprKind::Binary { op, left, right } => {
                let new_left = left.rewrite(f);
                let new_right = right.rewrite(f);
                if new_left.is_none() && new_right.is_none() {
                    return None;
                }
                Some(rebuild(SqlExprKind::Binary {
                    op: *op,
                    left: Box::new(new_left.unwrap_or_else(|| (**left).clone())),
                    right: Box::new(new_right.unwrap_or_else(|| (**right).clone())),
                }))
            }

            SqlExprKind::Case {
                operand,
                whens,
                else_result,
            } => {
                let new_operand = operand.as_ref().map(|o| o.rewrite(f));
                let new_whens: Vec<(Option<SqlExpr>, Option<SqlExpr>)> = whens
                    .iter()
                    .map(|arm| (arm.test.rewrite(f), arm.result.rewrite(f)))
                    .collect();
                let new_else = else_result.as_ref().map(|e| e.rewrite(f));

                let changed = new_operand.as_ref().is_some_and(|o| o.is_some())
                    || new_whens.iter().any(|(t, r)| t.is_some() || r.is_some())
                    || new_else.as_ref().is_some_and(|e| e.is_some());
                if !changed {
                    return None;
                }

                let whens = whens
                    .iter()
                    .zip(new_whens)
                    .map(|(arm, (test, result))| CaseWhen {
                        test: test.unwrap_or_else(|| arm.test.clone()),
                        result: result.unwrap_or_else(|| arm.result.clone()),
                    })
                    .collect();
                Some(rebuild(SqlExprKind::Case {
                    operand: operand.as_ref().zip(new_operand).map(|(old, new)| {
                        Box::new(new.unwrap_or_else(|| (**old).clone()))
                    }),
                    whens,
                    else_result: else_result.as_ref().zip(new_else).map(|(old, new)| {
                        Box::new(new.unwrap_or_else(|| (**old).clone()))
                    }),
                }))
            }

            SqlExprKind::Exists { subquery, negated } => {
                subquery.rewrite_exprs(f).map(|subquery| {
                    rebuild(SqlExprKind::Exists {
                        subquery: Box::new(subquery),
                        negated: *negated,
                    })
                })
            }

            SqlExprKind::In { item, set, negated } => {
                let new_item = item.rewrite(f);
                let new_set = match set {
                    InSet::Values(values) => {
                        let rewritten: Vec<Option<SqlExpr>> =
                            values.iter().map(|v| v.rewrite(f)).collect();
                        if rewritten.iter().any(Option::is_some) {
                            Some(InSet::Values(
                                values
                                    .iter()
                                    .zip(rewritten)
                                    .map(|(old, new)| new.unwrap_or_else(|| old.clone()))
                                    .collect(),
                            ))
                        } else {
                            None
                        }
                    }
                    InSet::Subquery(subquery) => subquery
                        .rewrite_exprs(f)
                        .map(|s| InSet::Subquery(Box::new(s))),
                };
                if new_item.is_none() && new_set.is_none() {
                    return None;
                }
                Some(rebuild(SqlExprKind::In {
                    item: Box::new(new_item.unwrap_or_else(|| (**item).clone())),
                    set: new_set.unwrap_or_else(|| set.clone()),
                    negated: *negated,
                }))
            }

            SqlExprKind::Like {
                matched,
                pattern,
                escape,
            } => {
                let new_matched = matched.rewrite(f);
                let new_pattern = pattern.rewrite(f);
                let new_escape = escape.as_ref().map(|e| e.rewrite(f));
                let changed = new_matched.is_some()
                    || new_pattern.is_some()
                    || new_escape.as_ref().is_some_and(|e| e.is_some());
                if !changed {
                    return None;
                }
                Some(rebuild(SqlExprKind::Like {
                    matched: Box::new(new_matched.unwrap_or_else(|| (**matched).clone())),
                    pattern: Box::new(new_pattern.unwrap_or_else(|| (**pattern).clone())),
                    escape: escape.as_ref().zip(new_escape).map(|(old, new)| {
                        Box::new(new.unwrap_or_else(|| (**old).clone()))
                    }),
                }))
            }

            SqlExprKind::Negate { operand } => operand.rewrite(f).map(|operand| {
                rebuild(SqlExprKind::Negate {
                    operand: Box::new(operand),
                })
            }),

            SqlExprKind::Not { operand } => operand.rewrite(f).map(|operand| {
                rebuild(SqlExprKind::Not {
                    operand: Box::new(operand),
                })
            }),

            SqlExprKind::IsNull { operand, negated } => operand.rewrite(f).map(|operand| {
                rebuild(SqlExprKind::IsNull {
                    operand: Box::new(operand),
                    negated: *negated,
                })
            }),

            SqlExprKind::Cast { operand } => operand.rewrite(f).map(|operand| {
                rebuild(SqlExprKind::Cast {
                    operand: Box::new(operand),
                })
            }),

            SqlExprKind::Function {
                instance,
                schema,
                name,
                niladic,
                args,
                condition,
            } => {
                let new_instance = instance.as_ref().map(|i| i.rewrite(f));
                let rewritten: Vec<Option<SqlExpr>> = args.iter().map(|a| a.rewrite(f)).collect();
                let changed = new_instance.as_ref().is_some_and(|i| i.is_some())
                    || rewritten.iter().any(Option::is_some);
                if !changed {
                    return None;
                }
                Some(rebuild(SqlExprKind::Function {
                    instance: instance.as_ref().zip(new_instance).map(|(old, new)| {
                        Box::new(new.unwrap_or_else(|| (**old).clone()))
                    }),
                    schema: schema.clone(),
                    name: name.clone(),
                    niladic: *niladic,
                    args: args
                        .iter()
                        .zip(rewritten)
                        .map(|(old, new)| new.unwrap_or_else(|| old.clone()))
                        .collect(),
                    condition: *condition,
                }))
            }
        }
    }
}
