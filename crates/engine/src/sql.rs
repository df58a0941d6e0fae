//! # Statement assembly
//!
//! Dispatches a parsed query to the emitter for its method. Every method
//! produces exactly one statement plus the plan the shaper will follow.

use sqlweave_schema::catalog::Catalog;

use crate::aggregates::{build_aggregate, build_count, build_group_by};
use crate::ast::{Method, ParsedQuery};
use crate::context::CompileCtx;
use crate::error::Result;
use crate::plan::{ResultPlan, Unwrap};
use crate::select::build_find;

pub fn build_statement(
    catalog: &Catalog,
    model_idx: usize,
    method: Method,
    query: &ParsedQuery,
    ctx: &mut CompileCtx,
) -> Result<(String, ResultPlan)> {
    match method {
        Method::FindMany => build_find(catalog, model_idx, query, Unwrap::Array, ctx),
        Method::FindFirst | Method::FindUnique => {
            build_find(catalog, model_idx, query, Unwrap::FirstOrNull, ctx)
        }
        Method::Count => build_count(catalog, model_idx, query, ctx),
        Method::Aggregate => build_aggregate(catalog, model_idx, query, ctx),
        Method::GroupBy => build_group_by(catalog, model_idx, query, ctx),
    }
}
