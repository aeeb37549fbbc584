//! `OpenStreetMap` Overpass API fetcher.
//!
//! Sends one Overpass QL query per polygon, selecting every node, way and
//! relation tagged `building` inside the polygon (`poly:` filter, which
//! matches anything intersecting it), then resolves member geometry with
//! `>;` recursion. Endpoints from the [`crate::registry`] are tried in
//! priority order; each gets a capped number of retries.

use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use footprints_building_models::OSM_DATA_SOURCE;
use footprints_geometry::ClosedRing;
use footprints_source_models::{FetchedBuildings, OverpassEndpoint};

use crate::retry::{self, RetryPolicy};
use crate::{BuildingSource, SourceError, normalize, registry};

/// Extra client-side time allowed on top of the server-side query timeout
/// for queueing and transfer.
const CLIENT_TIMEOUT_SLACK: Duration = Duration::from_secs(15);

/// Settings for [`OverpassSource`].
#[derive(Debug, Clone)]
pub struct OverpassConfig {
    /// Endpoints to try, in order.
    pub endpoints: Vec<OverpassEndpoint>,
    /// Server-side query timeout (`[timeout:N]`).
    pub query_timeout: Duration,
    /// Retry policy applied to each endpoint.
    pub retry: RetryPolicy,
}

impl Default for OverpassConfig {
    fn default() -> Self {
        Self {
            endpoints: registry::enabled_endpoints(),
            query_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
        }
    }
}

/// [`BuildingSource`] backed by the Overpass API.
pub struct OverpassSource {
    client: reqwest::Client,
    config: OverpassConfig,
}

impl OverpassSource {
    /// Creates a source with its own HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Http`] if the HTTP client cannot be built.
    pub fn new(config: OverpassConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .timeout(config.query_timeout + CLIENT_TIMEOUT_SLACK)
            .user_agent(concat!("footprints/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, config })
    }

    async fn fetch_from(
        &self,
        endpoint: &OverpassEndpoint,
        query: &str,
        boundary: &ClosedRing,
    ) -> Result<FetchedBuildings, SourceError> {
        let body = retry::send_json(
            || {
                self.client
                    .post(&endpoint.url)
                    .form(&[("data", query)])
            },
            &self.config.retry,
        )
        .await?;
        normalize::normalize_response(&body, boundary, OSM_DATA_SOURCE)
    }
}

#[async_trait]
impl BuildingSource for OverpassSource {
    fn name(&self) -> &str {
        OSM_DATA_SOURCE
    }

    async fn fetch(&self, boundary: &ClosedRing) -> Result<FetchedBuildings, SourceError> {
        let query = build_query(boundary, self.config.query_timeout);
        let bounds = boundary.bounds();
        log::info!(
            "Fetching OSM buildings for bounds W{:.6} S{:.6} E{:.6} N{:.6}",
            bounds.west,
            bounds.south,
            bounds.east,
            bounds.north
        );

        let mut failures = Vec::new();

        for (i, endpoint) in self.config.endpoints.iter().enumerate() {
            log::debug!(
                "Trying Overpass endpoint {}/{}: {}",
                i + 1,
                self.config.endpoints.len(),
                endpoint.url
            );
            match self.fetch_from(endpoint, &query, boundary).await {
                Ok(fetched) => {
                    log::info!(
                        "Fetched {} buildings from {}",
                        fetched.buildings.len(),
                        endpoint.name
                    );
                    return Ok(fetched);
                }
                Err(e) => {
                    log::warn!("Overpass endpoint {} failed: {e}", endpoint.id);
                    failures.push(format!("{}: {e}", endpoint.id));
                }
            }
        }

        Err(SourceError::Exhausted {
            attempted: failures.len(),
            message: if failures.is_empty() {
                "no Overpass endpoints configured".to_string()
            } else {
                failures.join("; ")
            },
        })
    }
}

/// Builds the Overpass QL query for a boundary.
///
/// The `poly:` filter takes `"lat lon lat lon ..."` over the open ring.
#[must_use]
pub fn build_query(boundary: &ClosedRing, timeout: Duration) -> String {
    let mut poly = String::new();
    for (i, [lng, lat]) in boundary.open_points().iter().enumerate() {
        if i > 0 {
            poly.push(' ');
        }
        let _ = write!(poly, "{lat} {lng}");
    }
    let filter = format!("[\"building\"](poly:\"{poly}\")");

    format!(
        "[out:json][timeout:{timeout}];\n\
         (\n  \
           node{filter};\n  \
           way{filter};\n  \
           relation{filter};\n\
         );\n\
         out body;\n\
         >;\n\
         out skel qt;",
        timeout = timeout.as_secs(),
    )
}
