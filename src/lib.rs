#![forbid(unsafe_code)]

//! Media Influence Topology Detection System: the ingestion, graph-write,
//! entity-resolution, detection and scoring core. Everything that turns
//! raw filings, registries, and ad archives into a typed, evidence-backed
//! influence graph, and the algorithms that find clusters, coordination,
//! and shared infrastructure within it.

pub mod config;
pub mod error;
pub mod logger;
pub mod types;

pub mod database;
pub mod provenance;

pub mod graph;
pub mod resolver;

pub mod ingestion;

pub mod detection;

/// Test-only helpers, exposed unconditionally (rather than behind
/// `#[cfg(test)]`) because the integration tests under `tests/` compile
/// this crate as an ordinary dependency and need `test_pool` from there.
pub mod test_util;

pub use self::config::Config;
pub use self::error::{MitdsError, Result};
