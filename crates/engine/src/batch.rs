//! # Batch combinator
//!
//! Fuses independently compiled queries into one PostgreSQL statement: each
//! query becomes a CTE, each CTE is aggregated to a single JSON value, and
//! one final row carries every named slot. Parameters stay globally unique
//! because each sub-compilation starts at the running offset. The
//! demultiplexer reverses the trip, routing every slot through the regular
//! shaper with the slot name attached to any failure.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use sqlweave_schema::catalog::Catalog;
use sqlweave_values::values::{Row, Value};

use crate::ast::{self, Method};
use crate::context::CompileCtx;
use crate::dialect::Dialect;
use crate::error::{QueryError, Result};
use crate::plan::{ResultPlan, Unwrap};
use crate::shape::shape_rows;
use crate::sql::build_statement;

/// One named entry of a batch.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Request {
    pub model: String,
    pub method: Method,
    pub args: Json,
}

/// A fused batch statement with per-slot plans for demultiplexing.
#[derive(Debug)]
pub struct BatchQuery {
    pub sql: String,
    pub params: Vec<Value>,
    pub plans: IndexMap<String, ResultPlan>,
}

/// Compiles every request and fuses them into one `WITH ... SELECT`.
pub fn combine(
    catalog: &Catalog,
    dialect: Dialect,
    requests: &IndexMap<String, Request>,
) -> Result<BatchQuery> {
    if dialect != Dialect::Postgres {
        return Err(QueryError::Unsupported(
            "batch requires the PostgreSQL dialect".to_string(),
        ));
    }
    if requests.is_empty() {
        return Err(QueryError::InvalidArgument(
            "batch requires at least one query".to_string(),
        ));
    }

    let mut ctes = Vec::new();
    let mut slots = Vec::new();
    let mut froms = Vec::new();
    let mut params = Vec::new();
    let mut plans = IndexMap::new();

    for (index, (name, request)) in requests.iter().enumerate() {
        let (model_idx, _) = catalog
            .model(&request.model)
            .ok_or_else(|| QueryError::unknown_model(&request.model))?;
        let parsed = ast::parse_query(catalog, model_idx, request.method, &request.args)?;
        let mut ctx = CompileCtx::with_offset(dialect, params.len());
        let (sub_sql, plan) = build_statement(catalog, model_idx, request.method, &parsed, &mut ctx)?;
        params.extend(ctx.into_params());

        let query_cte = dialect.quote(&format!("__q_{index}"));
        let result_cte = dialect.quote(&format!("__r_{index}"));
        ctes.push(format!("{query_cte} AS ({sub_sql})"));

        // Array unwraps keep row order via ARRAY(subquery); single-row
        // unwraps collapse to one JSON object or NULL.
        let aggregated = match plan.unwrap {
            Unwrap::Array => format!(
                "TO_JSONB(ARRAY(SELECT ROW_TO_JSON({query_cte}) FROM {query_cte}))"
            ),
            _ => format!(
                "TO_JSONB((SELECT ROW_TO_JSON({query_cte}) FROM {query_cte} LIMIT 1))"
            ),
        };
        ctes.push(format!(
            "{result_cte} AS (SELECT {aggregated} AS {})",
            dialect.quote("v")
        ));
        slots.push(format!(
            "{result_cte}.{} AS {}",
            dialect.quote("v"),
            dialect.quote(name)
        ));
        froms.push(result_cte);
        plans.insert(name.clone(), plan);
    }

    let sql = format!(
        "WITH {} SELECT {} FROM {}",
        ctes.join(", "),
        slots.join(", "),
        froms.join(", ")
    );
    Ok(BatchQuery { sql, params, plans })
}

/// Splits the single batch row back into named shaped results.
pub fn demultiplex(
    plans: &IndexMap<String, ResultPlan>,
    rows: &[Row],
) -> Result<IndexMap<String, Json>> {
    let row = rows
        .first()
        .ok_or_else(|| QueryError::shape("batch statement returned no rows"))?;

    let mut out = IndexMap::new();
    for (name, plan) in plans {
        let value = row
            .get(name.as_str())
            .ok_or_else(|| QueryError::shape("slot column missing").in_slot(name))?;
        let decoded = decode_slot(value).map_err(|e| e.in_slot(name))?;
        let rows = slot_rows(plan, decoded).map_err(|e| e.in_slot(name))?;
        let shaped = shape_rows(plan, &rows).map_err(|e| e.in_slot(name))?;
        out.insert(name.clone(), shaped);
    }
    Ok(out)
}

fn decode_slot(value: &Value) -> Result<Json> {
    match value {
        Value::Json(v) => Ok(v.clone()),
        Value::String(s) => {
            serde_json::from_str(s).map_err(|e| QueryError::shape(format!("malformed JSON: {e}")))
        }
        Value::Null => Ok(Json::Null),
        other => Err(QueryError::shape(format!(
            "slot holds a non-JSON value: {other:?}"
        ))),
    }
}

/// Re-materializes driver-shaped rows from a slot's JSON payload.
fn slot_rows(plan: &ResultPlan, decoded: Json) -> Result<Vec<Row>> {
    match (plan.unwrap, decoded) {
        (Unwrap::Array, Json::Array(items)) => items.into_iter().map(object_to_row).collect(),
        (_, Json::Null) => Ok(Vec::new()),
        (Unwrap::Array, other) => Err(QueryError::shape(format!(
            "slot payload should be a JSON array, got {other}"
        ))),
        (_, object @ Json::Object(_)) => Ok(vec![object_to_row(object)?]),
        (_, other) => Err(QueryError::shape(format!(
            "slot payload has the wrong shape: {other}"
        ))),
    }
}

fn object_to_row(value: Json) -> Result<Row> {
    let Json::Object(fields) = value else {
        return Err(QueryError::shape(format!(
            "expected a JSON object row, got {value}"
        )));
    };
    Ok(fields
        .iter()
        .map(|(key, value)| (key.clone(), Value::from_json(value)))
        .collect())
}
