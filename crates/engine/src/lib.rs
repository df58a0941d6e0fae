//! # sqlweave
//!
//! Compiles ORM-style query trees into single parameterized SQL statements for
//! PostgreSQL and SQLite, and weaves the flat driver rows back into the nested
//! object tree the caller asked for.
//!
//! The pipeline is `compile -> execute -> shape`:
//!
//! - [`query::Engine::compile`] lowers `(model, method, args)` against the
//!   catalog into `{sql, params, plan}`. Compilation is pure and
//!   deterministic; relations are embedded as correlated JSON subqueries so a
//!   query is always one round trip.
//! - An [`adapter::Adapter`] runs the statement. The adapter is the only
//!   suspension point; sqlweave performs no I/O of its own.
//! - [`shape::shape_rows`] rebuilds nested objects from the rows using the
//!   plan: JSON relation columns are decoded, values coerced to their catalog
//!   types, and the unwrap mode applied.
//!
//! On PostgreSQL, [`query::Engine::batch`] fuses any number of compiled
//! queries into one `WITH ... SELECT` whose single row carries one
//! JSON-aggregated column per named slot.

pub mod adapter;
pub mod aggregates;
pub mod ast;
pub mod batch;
pub mod context;
pub mod dialect;
pub mod error;
pub mod filter;
pub mod ordering;
pub mod plan;
pub mod query;
pub mod select;
pub mod shape;
pub mod sql;
