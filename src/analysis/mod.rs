//! SQL aggregation over the loaded tables.
//!
//! Builds the derived summary tables and provides the typed reads the
//! renderer and run report consume.

pub mod aggregator;

pub use aggregator::*;
