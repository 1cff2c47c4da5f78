//! End-to-end composition scenarios: an external driver applying clauses in
//! source-query order, including the pushdowns that keep the tree legal.

use std::collections::HashMap;
use std::sync::Arc;

use sqlbridge_core::{EntityType, Property, SqlType, Value};
use sqlbridge_query::{
    BinaryOperator, Dialect, MappedProjection, Ordering, ProjectionMember, SelectBuilder, SqlExpr,
    SqlExprKind, TableSource, inline_parameters_in_select, render,
};

fn customer() -> Arc<EntityType> {
    Arc::new(
        EntityType::new("Customer", "customers")
            .property(Property::new("Id", SqlType::BigInt))
            .property(Property::new("Name", SqlType::Text)),
    )
}

fn order() -> Arc<EntityType> {
    Arc::new(
        EntityType::new("Order", "orders")
            .property(Property::new("Id", SqlType::BigInt))
            .property(Property::new("Total", SqlType::Decimal { precision: 10, scale: 2 }))
            .property(Property::new("CustomerId", SqlType::BigInt)),
    )
}

fn column(table: &str, name: &str, sql_type: SqlType) -> SqlExpr {
    SqlExpr::column(table, name, sql_type, None, false)
}

fn join_predicate() -> SqlExpr {
    SqlExpr::binary(
        BinaryOperator::Equal,
        column("c", "Id", SqlType::BigInt),
        column("o", "CustomerId", SqlType::BigInt),
    )
    .unwrap()
}

#[test]
fn offset_after_limit_pushes_the_paged_query_down() {
    let mut query = SelectBuilder::for_entity(customer());
    query.apply_predicate(
        SqlExpr::binary(
            BinaryOperator::Equal,
            column("c", "Name", SqlType::Text),
            SqlExpr::constant("X"),
        )
        .unwrap(),
    );
    query.apply_limit(SqlExpr::constant(10));
    query.apply_offset(SqlExpr::constant(5));

    // The inner query keeps the predicate and the limit; the outer query
    // carries only the offset over a pass-through projection.
    assert_eq!(query.tables().len(), 1);
    let TableSource::Subquery(inner) = &query.tables()[0] else {
        panic!("expected a derived table after pushdown");
    };
    assert!(inner.predicate().is_some());
    assert_eq!(inner.limit(), Some(&SqlExpr::constant(10)));
    assert!(query.predicate().is_none());
    assert!(query.limit().is_none());
    assert_eq!(query.offset(), Some(&SqlExpr::constant(5)));

    let names: Vec<_> = inner
        .projections()
        .iter()
        .filter_map(|p| p.output_name())
        .collect();
    assert_eq!(names, ["Id", "Name"]);

    for property in ["Id", "Name"] {
        let bound = query
            .bind_property(&ProjectionMember::root(), property)
            .unwrap();
        let SqlExprKind::Column { table, .. } = bound.kind() else {
            panic!("expected a column over the derived table");
        };
        assert_eq!(table, "t");
    }
}

#[test]
fn distinct_over_a_limited_query_pushes_down_first() {
    let mut query = SelectBuilder::for_entity(customer());
    query.apply_order_by(Ordering::asc(column("c", "Name", SqlType::Text)));
    query.apply_limit(SqlExpr::constant(5));
    query.apply_distinct();

    assert!(query.is_distinct());
    assert!(query.limit().is_none());
    // Distinct erased the outer orderings.
    assert!(query.orderings().is_empty());

    let TableSource::Subquery(inner) = &query.tables()[0] else {
        panic!("expected a derived table after pushdown");
    };
    assert_eq!(inner.limit(), Some(&SqlExpr::constant(5)));
    assert!(!inner.is_distinct());
    // The limited inner query keeps its ordering.
    assert_eq!(inner.orderings().len(), 1);
    // Nesting depth 2: base table inside the derived table.
    assert!(matches!(inner.tables()[0], TableSource::Table(_)));
}

#[test]
fn inner_join_merges_mappings_under_outer_and_inner() {
    let mut query = SelectBuilder::for_entity(customer());
    query.add_inner_join(SelectBuilder::for_entity(order()), join_predicate());

    assert_eq!(query.tables().len(), 2);
    assert!(matches!(query.tables()[1], TableSource::InnerJoin(_)));

    let name = query
        .bind_property(&ProjectionMember::of("outer"), "Name")
        .unwrap();
    let SqlExprKind::Column { table, nullable, .. } = name.kind() else {
        panic!("expected a column");
    };
    assert_eq!(table, "c");
    assert!(!nullable);

    let total = query
        .bind_property(&ProjectionMember::of("inner"), "Total")
        .unwrap();
    let SqlExprKind::Column { table, nullable, .. } = total.kind() else {
        panic!("expected a column");
    };
    assert_eq!(table, "o");
    // An inner join applies no nullability transform.
    assert!(!nullable);
}

#[test]
fn left_join_marks_every_inner_side_column_nullable() {
    let mut query = SelectBuilder::for_entity(customer());
    query.add_left_join(SelectBuilder::for_entity(order()), join_predicate());

    assert!(matches!(query.tables()[1], TableSource::LeftJoin(_)));

    let MappedProjection::Entity(orders) = query
        .projection_expr(&ProjectionMember::of("inner"))
        .unwrap()
    else {
        panic!("inner side maps the order entity");
    };
    for bound in orders.columns() {
        assert_eq!(bound.column_nullable(), Some(true));
    }

    // The outer side keeps its declared nullability.
    let name = query
        .bind_property(&ProjectionMember::of("outer"), "Name")
        .unwrap();
    assert_eq!(name.column_nullable(), Some(false));
}

#[test]
fn joining_a_filtered_query_demotes_it_and_rehomes_the_predicate() {
    let mut orders = SelectBuilder::for_entity(order());
    orders.apply_predicate(
        SqlExpr::binary(
            BinaryOperator::GreaterThan,
            column("o", "Total", SqlType::Decimal { precision: 10, scale: 2 }),
            SqlExpr::constant(100),
        )
        .unwrap(),
    );

    let mut query = SelectBuilder::for_entity(customer());
    query.add_inner_join(orders, join_predicate());

    let TableSource::InnerJoin(join) = &query.tables()[1] else {
        panic!("expected an inner join");
    };
    // The filtered side became a derived table...
    let TableSource::Subquery(inner) = &join.table else {
        panic!("expected the join source to be a derived table");
    };
    assert!(inner.predicate().is_some());

    // ...and the join predicate now references it instead of the original
    // table.
    let mut tables = Vec::new();
    join.on.rewrite(&mut |node| {
        if let SqlExprKind::Column { table, .. } = node.kind() {
            tables.push(table.clone());
        }
        None
    });
    assert!(tables.contains(&"c".to_string()));
    assert!(tables.contains(&"t".to_string()));
    assert!(!tables.contains(&"o".to_string()));
}

#[test]
fn predicate_arriving_after_paging_applies_to_the_page() {
    let mut query = SelectBuilder::for_entity(customer());
    query.apply_limit(SqlExpr::constant(10));
    query.apply_predicate(
        SqlExpr::binary(
            BinaryOperator::Equal,
            column("c", "Name", SqlType::Text),
            SqlExpr::constant("X"),
        )
        .unwrap(),
    );

    // The filter landed on the outer query, re-homed onto the derived
    // table's columns; the limit stayed inside.
    let predicate = query.predicate().expect("outer predicate");
    let mut referenced = Vec::new();
    predicate.rewrite(&mut |node| {
        if let SqlExprKind::Column { table, .. } = node.kind() {
            referenced.push(table.clone());
        }
        None
    });
    assert_eq!(referenced, ["t"]);

    let TableSource::Subquery(inner) = &query.tables()[0] else {
        panic!("expected a derived table");
    };
    assert!(inner.predicate().is_none());
    assert_eq!(inner.limit(), Some(&SqlExpr::constant(10)));
}

#[test]
fn reverse_after_paging_pushes_down_before_flipping() {
    let mut query = SelectBuilder::for_entity(customer());
    query.apply_order_by(Ordering::asc(column("c", "Name", SqlType::Text)));
    query.apply_limit(SqlExpr::constant(3));
    query.reverse_orderings();

    // The re-homed outer ordering is the one that flipped; the inner
    // query's ordering backs its limit and keeps its direction.
    assert_eq!(query.orderings().len(), 1);
    assert!(!query.orderings()[0].ascending);
    let TableSource::Subquery(inner) = &query.tables()[0] else {
        panic!("expected a derived table");
    };
    assert!(inner.orderings()[0].ascending);
}

#[test]
fn parameter_inlining_reaches_into_derived_tables() {
    let mut query = SelectBuilder::for_entity(customer());
    query.apply_predicate(
        SqlExpr::binary(
            BinaryOperator::Equal,
            column("c", "Name", SqlType::Text),
            SqlExpr::parameter("name", SqlType::Text, None),
        )
        .unwrap(),
    );
    query.apply_limit(SqlExpr::constant(10));
    query.apply_offset(SqlExpr::constant(5)); // pushes the predicate inside

    let select = query.build();
    let mut values = HashMap::new();
    values.insert("name".to_string(), Value::Text("X".to_string()));
    let inlined = inline_parameters_in_select(&select, &values);

    let mut saw_constant = false;
    let TableSource::Subquery(inner) = &inlined.tables()[0] else {
        panic!("expected a derived table");
    };
    inner
        .predicate()
        .expect("inner predicate")
        .rewrite(&mut |node| {
            if matches!(node.kind(), SqlExprKind::Constant(Value::Text(t)) if t == "X") {
                saw_constant = true;
            }
            None
        });
    assert!(saw_constant);

    // Nothing to inline leaves the tree untouched.
    assert_eq!(inline_parameters_in_select(&select, &HashMap::new()), select);
}

#[test]
fn joined_and_paged_query_renders_as_one_statement() {
    let mut query = SelectBuilder::for_entity(customer());
    query.add_inner_join(SelectBuilder::for_entity(order()), join_predicate());
    query.apply_predicate(
        SqlExpr::binary(
            BinaryOperator::GreaterThan,
            column("o", "Total", SqlType::Decimal { precision: 10, scale: 2 }),
            SqlExpr::constant(50),
        )
        .unwrap(),
    );
    query.apply_order_by(Ordering::desc(column(
        "o",
        "Total",
        SqlType::Decimal { precision: 10, scale: 2 },
    )));
    query.apply_limit(SqlExpr::constant(20));
    query.apply_projection();

    let rendered = render(&query.build(), Dialect::Postgres);
    assert_eq!(
        rendered.sql,
        "SELECT \"c\".\"Id\", \"c\".\"Name\", \"o\".\"Id\", \"o\".\"Total\", \"o\".\"CustomerId\" \
         FROM \"customers\" AS \"c\" \
         INNER JOIN \"orders\" AS \"o\" ON \"c\".\"Id\" = \"o\".\"CustomerId\" \
         WHERE \"o\".\"Total\" > $1 ORDER BY \"o\".\"Total\" DESC LIMIT $2"
    );
    assert_eq!(rendered.params, vec![Value::Int(50), Value::Int(20)]);
}
