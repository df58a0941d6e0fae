//! # Where compiler
//!
//! Lowers a [`Filter`] tree to a SQL boolean expression, appending parameters
//! to the context as it goes. Relation quantifiers become correlated
//! `EXISTS(SELECT 1 ...)` subqueries joined through the catalog's key info;
//! many-to-many edges go through their join table.

use sqlweave_schema::catalog::{Catalog, RelationKeys};
use sqlweave_values::values::Value;

use crate::ast::{Filter, Quantifier, ScalarCond};
use crate::context::CompileCtx;
use crate::error::Result;

/// Compiles a filter against `model_idx`, with the model's rows visible under
/// `qualifier`.
pub fn compile_filter(
    catalog: &Catalog,
    model_idx: usize,
    filter: &Filter,
    qualifier: &str,
    ctx: &mut CompileCtx,
) -> Result<String> {
    match filter {
        Filter::And(items) => compile_group(catalog, model_idx, items, " AND ", true, qualifier, ctx),
        Filter::Or(items) => compile_group(catalog, model_idx, items, " OR ", false, qualifier, ctx),
        Filter::Not(inner) => {
            let body = compile_filter(catalog, model_idx, inner, qualifier, ctx)?;
            Ok(format!("NOT ({body})"))
        }
        Filter::Scalar { field, cond } => {
            let column = &catalog.model_at(model_idx).fields[*field].column;
            let expr = ctx.dialect().column(qualifier, column);
            Ok(render_cond(&expr, cond, ctx))
        }
        Filter::Relation {
            relation,
            quantifier,
            filter,
        } => compile_relation(
            catalog,
            model_idx,
            *relation,
            *quantifier,
            filter.as_deref(),
            qualifier,
            ctx,
        ),
    }
}

/// An empty `AND` is neutrally true, an empty `OR` neutrally false.
fn compile_group(
    catalog: &Catalog,
    model_idx: usize,
    items: &[Filter],
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
        .map(|item| compile_filter(catalog, model_idx, item, qualifier, ctx))
        .collect::<Result<Vec<_>>>()?;
    if parts.len() == 1 {
        Ok(parts.into_iter().next().expect("one part"))
    } else {
        Ok(format!("({})", parts.join(joiner)))
    }
}

/// Escapes LIKE metacharacters; patterns are emitted with an explicit
/// `ESCAPE '\'` since SQLite has no default escape character.
fn escape_like(text: &str) -> String {
    text.replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_")
}

/// Renders one leaf condition over an arbitrary left-hand expression. Shared
/// with the `HAVING` compiler, where `expr` is an aggregate call.
pub(crate) fn render_cond(expr: &str, cond: &ScalarCond, ctx: &mut CompileCtx) -> String {
    let dialect = ctx.dialect();
    match cond {
        ScalarCond::Equals(value) => format!("{expr} = {}", ctx.push(value.clone())),
        ScalarCond::NotEquals(value) => format!("{expr} <> {}", ctx.push(value.clone())),
        ScalarCond::In(values) => {
            if values.is_empty() {
                return dialect.bool_literal(false).to_string();
            }
            let placeholders: Vec<String> =
                values.iter().map(|v| ctx.push(v.clone())).collect();
            format!("{expr} IN ({})", placeholders.join(", "))
        }
        ScalarCond::NotIn(values) => {
            if values.is_empty() {
                return dialect.bool_literal(true).to_string();
            }
            let placeholders: Vec<String> =
                values.iter().map(|v| ctx.push(v.clone())).collect();
            format!("{expr} NOT IN ({})", placeholders.join(", "))
        }
        ScalarCond::Lt(value) => format!("{expr} < {}", ctx.push(value.clone())),
        ScalarCond::Lte(value) => format!("{expr} <= {}", ctx.push(value.clone())),
        ScalarCond::Gt(value) => format!("{expr} > {}", ctx.push(value.clone())),
        ScalarCond::Gte(value) => format!("{expr} >= {}", ctx.push(value.clone())),
        ScalarCond::Contains { value, insensitive } => {
            let placeholder = ctx.push(Value::String(format!("%{}%", escape_like(value))));
            dialect.like(expr, &placeholder, *insensitive)
        }
        ScalarCond::StartsWith { value, insensitive } => {
            let placeholder = ctx.push(Value::String(format!("{}%", escape_like(value))));
            dialect.like(expr, &placeholder, *insensitive)
        }
        ScalarCond::EndsWith { value, insensitive } => {
            let placeholder = ctx.push(Value::String(format!("%{}", escape_like(value))));
            dialect.like(expr, &placeholder, *insensitive)
        }
        ScalarCond::IsNull => format!("{expr} IS NULL"),
        ScalarCond::IsNotNull => format!("{expr} IS NOT NULL"),
    }
}

fn compile_relation(
    catalog: &Catalog,
    model_idx: usize,
    rel_idx: usize,
    quantifier: Quantifier,
    inner: Option<&Filter>,
    qualifier: &str,
    ctx: &mut CompileCtx,
) -> Result<String> {
    let dialect = ctx.dialect();
    let relation = &catalog.model_at(model_idx).relations[rel_idx];
    let target = catalog.model_at(relation.target);

    // `every {}` is trivially true; no row can violate an empty condition.
    if inner.is_none() && quantifier == Quantifier::Every {
        return Ok(dialect.bool_literal(true).to_string());
    }

    let (from, join) = match &relation.keys {
        RelationKeys::Direct { local, foreign } => {
            let child = ctx.push_scope(&target.table);
            let from = dialect.from_item(target, &child);
            let join = format!(
                "{} = {}",
                dialect.column(&child, foreign),
                dialect.column(qualifier, local)
            );
            let body = inner
                .map(|f| compile_filter(catalog, relation.target, f, &child, ctx))
                .transpose()?;
            ctx.pop_scope();
            (from, (join, body))
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
            let join = format!(
                "{} = {}",
                dialect.column(&jq, source_column),
                dialect.column(qualifier, source_key)
            );
            let body = inner
                .map(|f| compile_filter(catalog, relation.target, f, &child, ctx))
                .transpose()?;
            ctx.pop_scope();
            ctx.pop_scope();
            (from, (join, body))
        }
    };
    let (join, body) = join;

    let condition = match (quantifier, body) {
        (Quantifier::Every, Some(body)) => format!("{join} AND NOT ({body})"),
        (_, Some(body)) => format!("{join} AND {body}"),
        (_, None) => join,
    };
    let exists = format!("EXISTS(SELECT 1 FROM {from} WHERE {condition})");
    Ok(match quantifier {
        Quantifier::Some => exists,
        Quantifier::Every | Quantifier::None => format!("NOT {exists}"),
    })
}
