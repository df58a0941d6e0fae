//! # Shared value types
//!
//! The driver-facing value union, the row type returned by adapters, and the
//! coercions the result shaper applies when rebuilding caller-visible objects.

pub mod coerce;
pub mod scalar;
pub mod values;
