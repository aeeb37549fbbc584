#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Classification and enrichment of fetched buildings.
//!
//! [`classify`] assigns a semantic category from the raw `building` tag and
//! structural heuristics. [`enrich`] derives height, roof area, population
//! and floor metrics from a record's source fields and the global
//! estimation parameters. Both are pure.

pub mod classify;
pub mod enrich;

pub use classify::{Classification, StructuralSignals, classify, classify_building};
pub use enrich::{EnrichParams, PitchOverrides, build_record, enrich, enrich_collection};

/// Errors from enrichment configuration.
#[derive(Debug, thiserror::Error)]
pub enum EnrichError {
    /// Estimation parameters are out of range.
    #[error("Invalid estimation parameters: {message}")]
    InvalidParams {
        /// Description of the problem.
        message: String,
    },
}
