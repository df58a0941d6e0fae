//! # Projection planner & relation embedding
//!
//! Builds the column list for the find-shaped methods and, for every included
//! relation, a correlated subquery that JSON-aggregates the child rows into a
//! single column of the parent row. Each level recursively carries its own
//! select, filter, ordering, and limit, so a query of any nesting depth stays
//! one round trip.
//!
//! Parameter pushes follow SQL text order (projection, then WHERE, then
//! cursor): SQLite placeholders are purely positional.

use sqlweave_schema::catalog::{Catalog, Model, RelationKeys};
use sqlweave_values::scalar::ScalarType;

use crate::ast::{ParsedQuery, RelationSelect, Selection};
use crate::context::CompileCtx;
use crate::dialect::Dialect;
use crate::error::{QueryError, Result};
use crate::filter::compile_filter;
use crate::ordering::{cursor_condition, default_order, order_clause, order_exprs};
use crate::plan::{PlannedColumn, PlannedRelation, ResultPlan, Unwrap};

/// Marker alias for the per-row JSON expression inside relation subqueries.
const DATA_IDENT: &str = "__data";
/// Alias of the derived table feeding a JSON aggregation.
const SUB_IDENT: &str = "__q";
/// Alias of the row-number column in the SQLite distinct fallback.
const ROW_NUMBER_IDENT: &str = "__rn";

/// Compiles `findMany`/`findFirst`/`findUnique` into a single statement.
pub fn build_find(
    catalog: &Catalog,
    model_idx: usize,
    query: &ParsedQuery,
    unwrap: Unwrap,
    ctx: &mut CompileCtx,
) -> Result<(String, ResultPlan)> {
    let dialect = ctx.dialect();
    let model = catalog.model_at(model_idx);
    let qualifier = ctx.push_scope(&model.table);

    let mut plan = ResultPlan::new(unwrap);
    let items = projection(catalog, model_idx, &query.selection, &qualifier, ctx, &mut plan)?;

    let mut conditions = Vec::new();
    if let Some(filter) = &query.filter {
        conditions.push(compile_filter(catalog, model_idx, filter, &qualifier, ctx)?);
    }
    if !query.cursor.is_empty() {
        conditions.push(cursor_condition(
            model,
            &query.cursor,
            &query.order_by,
            &qualifier,
            ctx,
        )?);
    }
    let where_clause = if conditions.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", conditions.join(" AND "))
    };

    let order = resolve_order(model, query);
    let take = match unwrap {
        Unwrap::FirstOrNull => Some(1),
        _ => query.take,
    };
    let skip = query.skip + u64::from(!query.cursor.is_empty());

    let sql = if query.distinct.is_empty() {
        format!(
            "SELECT {} FROM {}{}{}{}",
            items.join(", "),
            dialect.from_item(model, &qualifier),
            where_clause,
            order_clause(model, &order, &qualifier, dialect),
            dialect.limit_clause(take, skip),
        )
    } else {
        build_distinct(
            catalog.model_at(model_idx),
            query,
            &items,
            &where_clause,
            &order,
            take,
            skip,
            &qualifier,
            dialect,
        )?
    };
    ctx.pop_scope();
    Ok((sql, plan))
}

/// Ordering to apply: the caller's, or a deterministic default. `DISTINCT`
/// must lead with its own fields, everything else falls back to the primary
/// key ascending.
fn resolve_order(model: &Model, query: &ParsedQuery) -> Vec<crate::ast::OrderSpec> {
    if !query.order_by.is_empty() {
        return query.order_by.clone();
    }
    if !query.distinct.is_empty() {
        return query
            .distinct
            .iter()
            .map(|&field| crate::ast::OrderSpec {
                field,
                direction: crate::ast::Direction::Asc,
            })
            .collect();
    }
    default_order(model)
}

/// `DISTINCT ON` where the dialect has it, a `ROW_NUMBER()` window fallback
/// where it does not.
#[allow(clippy::too_many_arguments)]
fn build_distinct(
    model: &Model,
    query: &ParsedQuery,
    items: &[String],
    where_clause: &str,
    order: &[crate::ast::OrderSpec],
    take: Option<u64>,
    skip: u64,
    qualifier: &str,
    dialect: Dialect,
) -> Result<String> {
    // Both strategies need the ordering to lead with the distinct fields.
    if order.len() < query.distinct.len()
        || order
            .iter()
            .zip(&query.distinct)
            .any(|(spec, &field)| spec.field != field)
    {
        return Err(QueryError::InvalidArgument(
            "`orderBy` must start with the `distinct` fields".to_string(),
        ));
    }
    let distinct_cols: Vec<String> = query
        .distinct
        .iter()
        .map(|&field| dialect.column(qualifier, &model.fields[field].column))
        .collect();

    match dialect {
        Dialect::Postgres => Ok(format!(
            "SELECT DISTINCT ON ({}) {} FROM {}{}{}{}",
            distinct_cols.join(", "),
            items.join(", "),
            dialect.from_item(model, qualifier),
            where_clause,
            order_clause(model, order, qualifier, dialect),
            dialect.limit_clause(take, skip),
        )),
        Dialect::Sqlite => {
            let window_order = order_exprs(model, order, qualifier, dialect)
                .into_iter()
                .map(|(expr, dir)| format!("{expr} {}", dir.as_sql()))
                .collect::<Vec<_>>()
                .join(", ");
            let window = if window_order.is_empty() {
                format!("PARTITION BY {}", distinct_cols.join(", "))
            } else {
                format!(
                    "PARTITION BY {} ORDER BY {}",
                    distinct_cols.join(", "),
                    window_order
                )
            };
            let inner = format!(
                "SELECT *, ROW_NUMBER() OVER ({window}) AS {} FROM {}{}",
                dialect.quote(ROW_NUMBER_IDENT),
                dialect.from_item(model, qualifier),
                where_clause,
            );
            Ok(format!(
                "SELECT {} FROM ({inner}) AS {} WHERE {} = 1{}{}",
                items.join(", "),
                dialect.quote(qualifier),
                dialect.column(qualifier, ROW_NUMBER_IDENT),
                order_clause(model, order, qualifier, dialect),
                dialect.limit_clause(take, skip),
            ))
        }
    }
}

/// Top-level column list: scalars by alias, relations as embedded subqueries,
/// `_count` pseudo-fields as scalar count subqueries.
pub(crate) fn projection(
    catalog: &Catalog,
    model_idx: usize,
    selection: &Selection,
    qualifier: &str,
    ctx: &mut CompileCtx,
    plan: &mut ResultPlan,
) -> Result<Vec<String>> {
    let dialect = ctx.dialect();
    let model = catalog.model_at(model_idx);
    let mut items = Vec::new();

    for &field_idx in &selection.scalars {
        let field = &model.fields[field_idx];
        let expr = dialect.column(qualifier, &field.column);
        items.push(format!("{expr} AS {}", dialect.quote(&field.name)));
        plan.columns.push(PlannedColumn {
            name: field.name.clone(),
            scalar: field.scalar,
            list: field.list,
        });
    }

    for rs in &selection.relations {
        let name = model.relations[rs.relation].name.clone();
        let (sub, array, sub_plan) = relation_subquery(catalog, model_idx, rs, qualifier, ctx)?;
        items.push(format!("({sub}) AS {}", dialect.quote(&name)));
        plan.relations.push(PlannedRelation {
            name,
            array,
            plan: sub_plan,
        });
    }

    for &rel_idx in &selection.counts {
        let name = model.relations[rel_idx].name.clone();
        let sub = count_subquery(catalog, model_idx, rel_idx, qualifier, ctx);
        items.push(format!(
            "({sub}) AS {}",
            dialect.quote(&format!("_count.{name}"))
        ));
        plan.relation_counts.push(name);
    }

    Ok(items)
}

/// Column list variant used inside JSON builders: `('name', expr)` pairs.
/// Decimals are cast to text so they survive the JSON hop losslessly.
fn json_pairs(
    catalog: &Catalog,
    model_idx: usize,
    selection: &Selection,
    qualifier: &str,
    ctx: &mut CompileCtx,
    plan: &mut ResultPlan,
) -> Result<Vec<(String, String)>> {
    let dialect = ctx.dialect();
    let model = catalog.model_at(model_idx);
    let mut pairs = Vec::new();

    for &field_idx in &selection.scalars {
        let field = &model.fields[field_idx];
        let mut expr = dialect.column(qualifier, &field.column);
        if field.scalar == ScalarType::Decimal {
            expr = dialect.cast_text(&expr);
        }
        pairs.push((field.name.clone(), expr));
        plan.columns.push(PlannedColumn {
            name: field.name.clone(),
            scalar: field.scalar,
            list: field.list,
        });
    }

    for rs in &selection.relations {
        let name = model.relations[rs.relation].name.clone();
        let (sub, array, sub_plan) = relation_subquery(catalog, model_idx, rs, qualifier, ctx)?;
        pairs.push((name.clone(), dialect.json_embed(&format!("({sub})"))));
        plan.relations.push(PlannedRelation {
            name,
            array,
            plan: sub_plan,
        });
    }

    if !selection.counts.is_empty() {
        let mut count_pairs = Vec::new();
        for &rel_idx in &selection.counts {
            let name = model.relations[rel_idx].name.clone();
            let sub = count_subquery(catalog, model_idx, rel_idx, qualifier, ctx);
            count_pairs.push((name.clone(), format!("({sub})")));
            plan.relation_counts.push(name);
        }
        pairs.push(("_count".to_string(), dialect.json_object(&count_pairs)));
    }

    Ok(pairs)
}

/// Emits the correlated subquery embedding one relation, and its nested plan.
///
/// To-one edges produce a JSON object or NULL via `LIMIT 1`; a nested
/// `take: 0` or `skip` past the single row empties them to NULL. To-many
/// edges aggregate a derived table into a JSON array, empty array when no
/// child matches.
fn relation_subquery(
    catalog: &Catalog,
    parent_idx: usize,
    rs: &RelationSelect,
    parent_qualifier: &str,
    ctx: &mut CompileCtx,
) -> Result<(String, bool, ResultPlan)> {
    let dialect = ctx.dialect();
    let relation = &catalog.model_at(parent_idx).relations[rs.relation];
    let target_idx = relation.target;
    let target = catalog.model_at(target_idx);
    let array = relation.kind.is_list();

    let (from, correlation, child) = match &relation.keys {
        RelationKeys::Direct { local, foreign } => {
            let child = ctx.push_scope(&target.table);
            let from = dialect.from_item(target, &child);
            let correlation = format!(
                "{} = {}",
                dialect.column(&child, foreign),
                dialect.column(parent_qualifier, local)
            );
            (from, correlation, child)
        }
        RelationKeys::JoinTable {
            join_model,
            source_column,
            target_column,
            source_key,
            target_key,
        } => {
            let join_table = catalog.model_at(*join_model);
            let jq = ctx.push_scope(&join_table.table);
            let child = ctx.push_scope(&target.table);
            let from = format!(
                "{} INNER JOIN {} ON {} = {}",
                dialect.from_item(join_table, &jq),
                dialect.from_item(target, &child),
                dialect.column(&child, target_key),
                dialect.column(&jq, target_column)
            );
            let correlation = format!(
                "{} = {}",
                dialect.column(&jq, source_column),
                dialect.column(parent_qualifier, source_key)
            );
            (from, correlation, child)
        }
    };

    let unwrap = if array {
        Unwrap::Array
    } else {
        Unwrap::FirstOrNull
    };
    let mut plan = ResultPlan::new(unwrap);
    let pairs = json_pairs(catalog, target_idx, &rs.args.selection, &child, ctx, &mut plan)?;
    let object = dialect.json_object(&pairs);

    let mut conditions = vec![correlation];
    if let Some(filter) = &rs.args.filter {
        conditions.push(compile_filter(catalog, target_idx, filter, &child, ctx)?);
    }
    let where_clause = conditions.join(" AND ");

    let sql = if array {
        let order = if rs.args.order_by.is_empty() {
            default_order(target)
        } else {
            rs.args.order_by.clone()
        };
        let mut inner_items = vec![format!("{object} AS {}", dialect.quote(DATA_IDENT))];
        // PostgreSQL re-orders inside JSON_AGG; export the keys it needs.
        let agg_order = match dialect {
            Dialect::Postgres if !order.is_empty() => {
                let mut rendered = Vec::new();
                for (i, (expr, dir)) in order_exprs(target, &order, &child, dialect)
                    .into_iter()
                    .enumerate()
                {
                    let alias = format!("__ord_{i}");
                    inner_items.push(format!("{expr} AS {}", dialect.quote(&alias)));
                    rendered.push(format!(
                        "{} {}",
                        dialect.column(SUB_IDENT, &alias),
                        dir.as_sql()
                    ));
                }
                Some(rendered.join(", "))
            }
            _ => None,
        };
        let inner = format!(
            "SELECT {} FROM {from} WHERE {where_clause}{}{}",
            inner_items.join(", "),
            order_clause(target, &order, &child, dialect),
            dialect.limit_clause(rs.args.take, rs.args.skip),
        );
        let aggregate = dialect.json_agg(
            &dialect.column(SUB_IDENT, DATA_IDENT),
            agg_order.as_deref(),
        );
        format!(
            "SELECT {aggregate} FROM ({inner}) AS {}",
            dialect.quote(SUB_IDENT)
        )
    } else {
        // At most one row either way; take/skip can only empty the result.
        let take = rs.args.take.unwrap_or(1).min(1);
        format!(
            "SELECT {object} FROM {from} WHERE {where_clause}{}",
            dialect.limit_clause(Some(take), rs.args.skip)
        )
    };

    ctx.pop_scope();
    if matches!(relation.keys, RelationKeys::JoinTable { .. }) {
        ctx.pop_scope();
    }
    Ok((sql, array, plan))
}

/// Scalar `COUNT(*)` subquery for a `_count` pseudo-field. Many-to-many counts
/// the join rows directly.
pub(crate) fn count_subquery(
    catalog: &Catalog,
    parent_idx: usize,
    rel_idx: usize,
    parent_qualifier: &str,
    ctx: &mut CompileCtx,
) -> String {
    let dialect = ctx.dialect();
    let relation = &catalog.model_at(parent_idx).relations[rel_idx];
    let target = catalog.model_at(relation.target);
    match &relation.keys {
        RelationKeys::Direct { local, foreign } => {
            let child = ctx.push_scope(&target.table);
            let sql = format!(
                "SELECT COUNT(*) FROM {} WHERE {} = {}",
                dialect.from_item(target, &child),
                dialect.column(&child, foreign),
                dialect.column(parent_qualifier, local)
            );
            ctx.pop_scope();
            sql
        }
        RelationKeys::JoinTable {
            join_model,
            source_column,
            source_key,
            ..
        } => {
            let join_table = catalog.model_at(*join_model);
            let jq = ctx.push_scope(&join_table.table);
            let sql = format!(
                "SELECT COUNT(*) FROM {} WHERE {} = {}",
                dialect.from_item(join_table, &jq),
                dialect.column(&jq, source_column),
                dialect.column(parent_qualifier, source_key)
            );
            ctx.pop_scope();
            sql
        }
    }
}
