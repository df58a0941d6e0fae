//! # Engine façade
//!
//! Ties the pipeline together: parse + compile (pure), execute through the
//! adapter (the only suspension point), shape. One engine owns one dialect
//! and one shared catalog; both are immutable per query, so an engine is
//! freely shareable across tasks.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value as Json;
use tracing::{event, Level};

use sqlweave_schema::catalog::Catalog;
use sqlweave_values::values::Value;

use crate::adapter::Adapter;
use crate::ast::{self, Method};
use crate::batch::{self, BatchQuery, Request};
use crate::context::CompileCtx;
use crate::dialect::Dialect;
use crate::error::{QueryError, Result};
use crate::plan::ResultPlan;
use crate::shape::shape_rows;
use crate::sql::build_statement;

/// Everything the driver and the shaper need for one statement.
#[derive(Debug)]
pub struct CompiledQuery {
    pub sql: String,
    pub params: Vec<Value>,
    pub plan: ResultPlan,
}

pub struct Engine {
    catalog: Arc<Catalog>,
    dialect: Dialect,
}

impl Engine {
    pub fn new(catalog: Arc<Catalog>, dialect: Dialect) -> Engine {
        Engine { catalog, dialect }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Switches this engine's dialect. Per-instance state, never global.
    pub fn set_dialect(&mut self, dialect: Dialect) {
        self.dialect = dialect;
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Lowers `(model, method, args)` into a single statement, its parameter
    /// vector, and the shaping plan. Pure and deterministic: equal inputs
    /// produce byte-identical output.
    #[tracing::instrument(skip(self, args), level = Level::DEBUG)]
    pub fn compile(&self, model: &str, method: Method, args: &Json) -> Result<CompiledQuery> {
        let (model_idx, _) = self
            .catalog
            .model(model)
            .ok_or_else(|| QueryError::unknown_model(model))?;
        let parsed = ast::parse_query(&self.catalog, model_idx, method, args)?;
        let mut ctx = CompileCtx::new(self.dialect);
        let (sql, plan) = build_statement(&self.catalog, model_idx, method, &parsed, &mut ctx)?;
        event!(
            Level::INFO,
            model,
            method = method.as_str(),
            params = ctx.param_count(),
            message = format!("generated query {sql}")
        );
        Ok(CompiledQuery {
            sql,
            params: ctx.into_params(),
            plan,
        })
    }

    /// Compile, execute, shape.
    pub async fn query(
        &self,
        adapter: &dyn Adapter,
        model: &str,
        method: Method,
        args: &Json,
    ) -> Result<Json> {
        let compiled = self.compile(model, method, args)?;
        let rows = adapter.execute(&compiled.sql, &compiled.params).await?;
        shape_rows(&compiled.plan, &rows)
    }

    /// Fuses the named requests into one statement (PostgreSQL only).
    pub fn compile_batch(&self, requests: &IndexMap<String, Request>) -> Result<BatchQuery> {
        batch::combine(&self.catalog, self.dialect, requests)
    }

    /// One round trip for any number of independent queries.
    pub async fn batch(
        &self,
        adapter: &dyn Adapter,
        requests: &IndexMap<String, Request>,
    ) -> Result<IndexMap<String, Json>> {
        let combined = self.compile_batch(requests)?;
        let rows = adapter.execute(&combined.sql, &combined.params).await?;
        batch::demultiplex(&combined.plans, &rows)
    }
}
