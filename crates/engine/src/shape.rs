//! # Result shaper
//!
//! Post-processes driver rows by the plan: scalar columns are coerced to
//! their catalog types, JSON-embedded relation columns are decoded and shaped
//! recursively, dotted aggregate aliases are folded into nested objects, and
//! the unwrap mode collapses the row set into what the caller expects.

use serde_json::Value as Json;

use sqlweave_values::coerce::{coerce, coerce_list};
use sqlweave_values::scalar::ScalarType;
use sqlweave_values::values::{Row, Value};

use crate::error::{QueryError, Result};
use crate::plan::{PlannedRelation, ResultPlan, Unwrap};

/// Shapes a statement's row set per its plan.
pub fn shape_rows(plan: &ResultPlan, rows: &[Row]) -> Result<Json> {
    match plan.unwrap {
        Unwrap::Array => {
            let shaped = rows
                .iter()
                .map(|row| shape_row(plan, row))
                .collect::<Result<Vec<_>>>()?;
            Ok(Json::Array(shaped))
        }
        Unwrap::FirstOrNull => match rows.first() {
            Some(row) => shape_row(plan, row),
            None => Ok(Json::Null),
        },
        Unwrap::ScalarCount => {
            let name = &plan
                .aggregates
                .first()
                .ok_or_else(|| QueryError::shape("count plan has no aggregate"))?
                .name;
            let row = rows
                .first()
                .ok_or_else(|| QueryError::shape("count returned no rows"))?;
            let value = column(row, name)?;
            coerce(value, ScalarType::BigInt).map_err(|e| QueryError::shape(e.to_string()))
        }
        Unwrap::SingleObject => {
            let row = rows
                .first()
                .ok_or_else(|| QueryError::shape("aggregate returned no rows"))?;
            shape_row(plan, row)
        }
    }
}

fn column<'a>(row: &'a Row, name: &str) -> Result<&'a Value> {
    row.get(name)
        .ok_or_else(|| QueryError::shape(format!("column `{name}` missing from row")))
}

fn shape_row(plan: &ResultPlan, row: &Row) -> Result<Json> {
    let mut out = serde_json::Map::new();

    for col in &plan.columns {
        let value = column(row, &col.name)?;
        let shaped = if col.list {
            coerce_list(value, col.scalar)
        } else {
            coerce(value, col.scalar)
        }
        .map_err(|e| QueryError::shape(format!("column `{}`: {e}", col.name)))?;
        out.insert(col.name.clone(), shaped);
    }

    for relation in &plan.relations {
        let value = column(row, &relation.name)?;
        out.insert(relation.name.clone(), shape_relation(relation, value)?);
    }

    if !plan.relation_counts.is_empty() {
        let mut counts = serde_json::Map::new();
        for name in &plan.relation_counts {
            counts.insert(name.clone(), relation_count(row, name)?);
        }
        out.insert("_count".to_string(), Json::Object(counts));
    }

    for aggregate in &plan.aggregates {
        let value = column(row, &aggregate.name)?;
        let shaped = coerce(value, aggregate.scalar)
            .map_err(|e| QueryError::shape(format!("column `{}`: {e}", aggregate.name)))?;
        insert_dotted(&mut out, &aggregate.name, shaped);
    }

    Ok(Json::Object(out))
}

/// A `_count` cell arrives either as a dotted top-level column
/// (`"_count.tasks"`, driver rows) or nested under a `_count` object
/// (JSON-decoded rows).
fn relation_count(row: &Row, name: &str) -> Result<Json> {
    if let Some(value) = row.get(&format!("_count.{name}")) {
        return coerce(value, ScalarType::BigInt).map_err(|e| QueryError::shape(e.to_string()));
    }
    if let Some(Value::Json(Json::Object(counts))) = row.get("_count") {
        if let Some(value) = counts.get(name) {
            return coerce(&Value::from_json(value), ScalarType::BigInt)
                .map_err(|e| QueryError::shape(e.to_string()));
        }
    }
    Err(QueryError::shape(format!(
        "relation count `{name}` missing from row"
    )))
}

/// Splits a dotted alias (`_sum.position`) into its nested home.
fn insert_dotted(out: &mut serde_json::Map<String, Json>, name: &str, value: Json) {
    let Some((head, rest)) = name.split_once('.') else {
        out.insert(name.to_string(), value);
        return;
    };
    let slot = out
        .entry(head.to_string())
        .or_insert_with(|| Json::Object(serde_json::Map::new()));
    if let Json::Object(inner) = slot {
        inner.insert(rest.to_string(), value);
    }
}

/// Decodes a JSON relation column and recurses into the nested plan.
fn shape_relation(relation: &PlannedRelation, value: &Value) -> Result<Json> {
    let decoded = match value {
        Value::Null => Json::Null,
        Value::Json(v) => v.clone(),
        Value::String(s) => serde_json::from_str(s).map_err(|e| {
            QueryError::shape(format!("relation `{}` holds malformed JSON: {e}", relation.name))
        })?,
        other => {
            return Err(QueryError::shape(format!(
                "relation `{}` holds a non-JSON value: {other:?}",
                relation.name
            )));
        }
    };

    if relation.array {
        let items = match decoded {
            Json::Null => Vec::new(),
            Json::Array(items) => items,
            other => {
                return Err(QueryError::shape(format!(
                    "relation `{}` expected a JSON array, got {other}",
                    relation.name
                )));
            }
        };
        let shaped = items
            .into_iter()
            .map(|item| shape_decoded_object(&relation.plan, &relation.name, item))
            .collect::<Result<Vec<_>>>()?;
        Ok(Json::Array(shaped))
    } else {
        match decoded {
            Json::Null => Ok(Json::Null),
            object => shape_decoded_object(&relation.plan, &relation.name, object),
        }
    }
}

/// Shapes one JSON-decoded child row by converting it back into a [`Row`] and
/// reusing the row path.
fn shape_decoded_object(plan: &ResultPlan, relation: &str, object: Json) -> Result<Json> {
    let Json::Object(fields) = object else {
        return Err(QueryError::shape(format!(
            "relation `{relation}` expected JSON objects, got {object}"
        )));
    };
    let row: Row = fields
        .iter()
        .map(|(key, value)| (key.clone(), Value::from_json(value)))
        .collect();
    shape_row(plan, &row)
}
