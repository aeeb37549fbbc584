//! Overpass endpoint registry, loaded from embedded TOML configs.
//!
//! Each `.toml` file in `packages/source/servers/` is baked into the binary
//! at compile time via [`include_str!`]. Endpoints are tried in priority
//! order until one answers.

use footprints_source_models::OverpassEndpoint;

/// TOML configs embedded at compile time.
const SERVER_TOMLS: &[(&str, &str)] = &[
    ("overpass_de", include_str!("../servers/overpass_de.toml")),
    (
        "openstreetmap_fr",
        include_str!("../servers/openstreetmap_fr.toml"),
    ),
    ("kumi_systems", include_str!("../servers/kumi_systems.toml")),
    (
        "lz4_overpass_de",
        include_str!("../servers/lz4_overpass_de.toml"),
    ),
    ("z_overpass_de", include_str!("../servers/z_overpass_de.toml")),
];

#[cfg(test)]
const EXPECTED_SERVER_COUNT: usize = 5;

/// Returns all configured endpoints (enabled and disabled).
///
/// # Panics
///
/// Panics if any TOML config is malformed (this is a compile-time guarantee
/// since the configs are embedded).
#[must_use]
pub fn all_endpoints() -> Vec<OverpassEndpoint> {
    SERVER_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse Overpass endpoint '{name}': {e}"))
        })
        .collect()
}

/// Returns only enabled endpoints, sorted by priority (ascending).
#[must_use]
pub fn enabled_endpoints() -> Vec<OverpassEndpoint> {
    let mut endpoints: Vec<OverpassEndpoint> =
        all_endpoints().into_iter().filter(|e| e.enabled).collect();
    endpoints.sort_by_key(|e| e.priority);
    endpoints
}
