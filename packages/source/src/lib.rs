#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Building footprint fetching and normalization.
//!
//! A [`BuildingSource`] turns a polygon boundary into the raw buildings
//! whose geometry intersects it. The production implementation is
//! [`overpass::OverpassSource`], which queries the `OpenStreetMap`
//! Overpass API using the endpoints in the embedded [`registry`].

pub mod normalize;
pub mod overpass;
pub mod registry;
pub mod retry;
pub mod tags;

use async_trait::async_trait;
use footprints_geometry::ClosedRing;
use footprints_source_models::FetchedBuildings;

/// Errors that can occur while fetching building data.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    /// The upstream service answered, but not with usable data.
    #[error("Upstream error: {message}")]
    Upstream {
        /// Description of what went wrong.
        message: String,
    },

    /// A single building element could not be normalized.
    #[error("Skipping {element}: {message}")]
    PartialRecord {
        /// Element reference (e.g. `"way/123"`).
        element: String,
        /// Description of what is wrong with it.
        message: String,
    },

    /// Every configured endpoint failed.
    #[error("All {attempted} data source endpoints failed: {message}")]
    Exhausted {
        /// Number of endpoints tried.
        attempted: usize,
        /// The individual failures, joined.
        message: String,
    },
}

/// A provider of raw building footprints.
///
/// Implementations must be `Send + Sync` so one instance can be shared by
/// every in-flight pipeline.
#[async_trait]
pub trait BuildingSource: Send + Sync {
    /// Name of the data source as it appears in collection metadata.
    fn name(&self) -> &str;

    /// Fetches every building whose geometry intersects `boundary`.
    ///
    /// An area without buildings yields an empty result, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] if the upstream service is unreachable,
    /// times out, or returns an unparseable top-level response.
    async fn fetch(&self, boundary: &ClosedRing) -> Result<FetchedBuildings, SourceError>;
}
