//! # Aggregate & groupBy compiler
//!
//! `count`, `aggregate`, and `groupBy` share one emission path: aggregate
//! expressions are aliased with their dotted output path (`"_sum.position"`),
//! which the shaper folds back into nested objects. `having` reuses the leaf
//! condition renderer of the where compiler over aggregate calls.

use sqlweave_schema::catalog::{Catalog, Model};
use sqlweave_values::scalar::ScalarType;

use crate::ast::{AggregateSpec, Having, ParsedQuery};
use crate::context::CompileCtx;
use crate::error::Result;
use crate::filter::{compile_filter, render_cond};
use crate::ordering::order_clause;
use crate::plan::{PlannedAggregate, PlannedColumn, ResultPlan, Unwrap};

/// `count`: a single `COUNT(*)` cell.
pub fn build_count(
    catalog: &Catalog,
    model_idx: usize,
    query: &ParsedQuery,
    ctx: &mut CompileCtx,
) -> Result<(String, ResultPlan)> {
    let dialect = ctx.dialect();
    let model = catalog.model_at(model_idx);
    let qualifier = ctx.push_scope(&model.table);

    let mut plan = ResultPlan::new(Unwrap::ScalarCount);
    plan.aggregates.push(PlannedAggregate {
        name: "_count._all".to_string(),
        scalar: ScalarType::BigInt,
    });

    let where_clause = compile_where(catalog, model_idx, query, &qualifier, ctx)?;
    let sql = format!(
        "SELECT COUNT(*) AS {} FROM {}{}",
        dialect.quote("_count._all"),
        dialect.from_item(model, &qualifier),
        where_clause,
    );
    ctx.pop_scope();
    Ok((sql, plan))
}

/// `aggregate`: one row of aggregate cells, folded into a nested object.
pub fn build_aggregate(
    catalog: &Catalog,
    model_idx: usize,
    query: &ParsedQuery,
    ctx: &mut CompileCtx,
) -> Result<(String, ResultPlan)> {
    let dialect = ctx.dialect();
    let model = catalog.model_at(model_idx);
    let qualifier = ctx.push_scope(&model.table);

    let mut plan = ResultPlan::new(Unwrap::SingleObject);
    let items = aggregate_items(model, &query.aggregate, &qualifier, ctx, &mut plan);

    let where_clause = compile_where(catalog, model_idx, query, &qualifier, ctx)?;
    let sql = format!(
        "SELECT {} FROM {}{}",
        items.join(", "),
        dialect.from_item(model, &qualifier),
        where_clause,
    );
    ctx.pop_scope();
    Ok((sql, plan))
}

/// `groupBy`: grouping keys plus aggregates per group, `HAVING` over
/// translated aggregate predicates.
pub fn build_group_by(
    catalog: &Catalog,
    model_idx: usize,
    query: &ParsedQuery,
    ctx: &mut CompileCtx,
) -> Result<(String, ResultPlan)> {
    let dialect = ctx.dialect();
    let model = catalog.model_at(model_idx);
    let qualifier = ctx.push_scope(&model.table);

    let mut plan = ResultPlan::new(Unwrap::Array);
    let mut items = Vec::new();
    let mut group_cols = Vec::new();
    for &field_idx in &query.by {
        let field = &model.fields[field_idx];
        let expr = dialect.column(&qualifier, &field.column);
        items.push(format!("{expr} AS {}", dialect.quote(&field.name)));
        group_cols.push(expr);
        plan.columns.push(PlannedColumn {
            name: field.name.clone(),
            scalar: field.scalar,
            list: field.list,
        });
        plan.group_keys.push(field.name.clone());
    }
    items.extend(aggregate_items(model, &query.aggregate, &qualifier, ctx, &mut plan));

    let where_clause = compile_where(catalog, model_idx, query, &qualifier, ctx)?;

    let having_clause = match &query.having {
        Some(having) => format!(
            " HAVING {}",
            compile_having(model, having, &qualifier, ctx)?
        ),
        None => String::new(),
    };

    // Group output stays deterministic without a caller ordering.
    let order = if query.order_by.is_empty() {
        query
            .by
            .iter()
            .map(|&field| crate::ast::OrderSpec {
                field,
                direction: crate::ast::Direction::Asc,
            })
            .collect()
    } else {
        query.order_by.clone()
    };

    let sql = format!(
        "SELECT {} FROM {}{} GROUP BY {}{}{}{}",
        items.join(", "),
        dialect.from_item(model, &qualifier),
        where_clause,
        group_cols.join(", "),
        having_clause,
        order_clause(model, &order, &qualifier, dialect),
        dialect.limit_clause(query.take, query.skip),
    );
    ctx.pop_scope();
    Ok((sql, plan))
}

fn compile_where(
    catalog: &Catalog,
    model_idx: usize,
    query: &ParsedQuery,
    qualifier: &str,
    ctx: &mut CompileCtx,
) -> Result<String> {
    match &query.filter {
        Some(filter) => Ok(format!(
            " WHERE {}",
            compile_filter(catalog, model_idx, filter, qualifier, ctx)?
        )),
        None => Ok(String::new()),
    }
}

/// Renders the selected aggregate expressions, dotted-aliased, and records
/// their coercion types. `COUNT` is 64-bit; `AVG` stays lossless as Decimal;
/// `SUM` widens integers.
fn aggregate_items(
    model: &Model,
    spec: &AggregateSpec,
    qualifier: &str,
    ctx: &CompileCtx,
    plan: &mut ResultPlan,
) -> Vec<String> {
    let dialect = ctx.dialect();
    let mut items = Vec::new();
    let mut push = |items: &mut Vec<String>, expr: String, name: String, scalar: ScalarType| {
        items.push(format!("{expr} AS {}", dialect.quote(&name)));
        plan.aggregates.push(PlannedAggregate { name, scalar });
    };

    if spec.count_all {
        push(
            &mut items,
            "COUNT(*)".to_string(),
            "_count._all".to_string(),
            ScalarType::BigInt,
        );
    }
    for &field_idx in &spec.count_fields {
        let field = &model.fields[field_idx];
        push(
            &mut items,
            format!("COUNT({})", dialect.column(qualifier, &field.column)),
            format!("_count.{}", field.name),
            ScalarType::BigInt,
        );
    }
    for &field_idx in &spec.sum {
        let field = &model.fields[field_idx];
        push(
            &mut items,
            format!("SUM({})", dialect.column(qualifier, &field.column)),
            format!("_sum.{}", field.name),
            field.scalar.sum_type(),
        );
    }
    for &field_idx in &spec.avg {
        let field = &model.fields[field_idx];
        push(
            &mut items,
            format!("AVG({})", dialect.column(qualifier, &field.column)),
            format!("_avg.{}", field.name),
            ScalarType::Decimal,
        );
    }
    for &field_idx in &spec.min {
        let field = &model.fields[field_idx];
        push(
            &mut items,
            format!("MIN({})", dialect.column(qualifier, &field.column)),
            format!("_min.{}", field.name),
            field.scalar,
        );
    }
    for &field_idx in &spec.max {
        let field = &model.fields[field_idx];
        push(
            &mut items,
            format!("MAX({})", dialect.column(qualifier, &field.column)),
            format!("_max.{}", field.name),
            field.scalar,
        );
    }
    items
}

fn compile_having(
    model: &Model,
    having: &Having,
    qualifier: &str,
    ctx: &mut CompileCtx,
) -> Result<String> {
    match having {
        Having::And(items) => compile_having_group(model, items, " AND ", true, qualifier, ctx),
        Having::Or(items) => compile_having_group(model, items, " OR ", false, qualifier, ctx),
        Having::Not(inner) => {
            let body = compile_having(model, inner, qualifier, ctx)?;
            Ok(format!("NOT ({body})"))
        }
        Having::Agg { field, func, cond } => {
            let expr = match field {
                Some(field_idx) => {
                    let column = ctx
                        .dialect()
                        .column(qualifier, &model.fields[*field_idx].column);
                    format!("{}({column})", func.sql_name())
                }
                None => "COUNT(*)".to_string(),
            };
            Ok(render_cond(&expr, cond, ctx))
        }
    }
}

fn compile_having_group(
    model: &Model,
    items: &[Having],
    joiner: &str,
    empty_value: bool,
    qualifier: &str,
    ctx: &mut CompileCtx,
) -> Result<String> {
    if items.is_empty() {
        return Ok(ctx.dialect().bool_literal(empty_value).to_string());
    }
    let parts = items
        .iter()
        .map(|item| compile_having(model, item, qualifier, ctx))
        .collect::<Result<Vec<_>>>()?;
    if parts.len() == 1 {
        Ok(parts.into_iter().next().expect("one part"))
    } else {
        Ok(format!("({})", parts.join(joiner)))
    }
}
