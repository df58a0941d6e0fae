//! # Schema Catalog
//!
//! The read-only registry of models, fields, and relations the compiler
//! consults. A catalog is parsed from a JSON document, linked into an
//! index-based graph (relations point at their target and inverse by model
//! index, never by owning reference), validated once, and then shared
//! immutably for the life of the process.

pub mod catalog;
pub mod document;
pub mod error;
