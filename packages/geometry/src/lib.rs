#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Polygon validation, geodesic footprint area, and roof area derivation.
//!
//! Pure functions with no I/O. Coordinates are `[longitude, latitude]`
//! pairs in WGS84 degrees, matching `GeoJSON` ordering.

use geo::orient::{Direction, Orient};
use geo::{Coord, GeodesicArea, LineString, MultiPolygon, Polygon};
use serde::Serialize;
use thiserror::Error;

/// Two points closer than this (in degrees) are considered the same point.
pub const POINT_EPSILON_DEG: f64 = 1e-8;

/// Upper bound for roof pitch angles accepted by [`clamp_pitch`].
pub const MAX_PITCH_DEG: f64 = 45.0;

/// Errors produced while validating geometry.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    /// The polygon cannot be used as a query boundary.
    #[error("Invalid geometry: {message}")]
    InvalidGeometry {
        /// Description of what is wrong with the polygon.
        message: String,
    },
}

impl GeometryError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidGeometry {
            message: message.into(),
        }
    }
}

/// A validated ring whose last point repeats the first.
///
/// Only constructible through [`normalize_ring`], so every instance holds
/// at least three distinct points plus the closing point.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ClosedRing(Vec<[f64; 2]>);

impl ClosedRing {
    /// All points, including the closing point.
    #[must_use]
    pub fn points(&self) -> &[[f64; 2]] {
        &self.0
    }

    /// The distinct points, without the closing point.
    #[must_use]
    pub fn open_points(&self) -> &[[f64; 2]] {
        &self.0[..self.0.len() - 1]
    }

    /// Converts the ring into a `geo` polygon without holes.
    #[must_use]
    pub fn to_polygon(&self) -> Polygon<f64> {
        let coords: Vec<Coord<f64>> = self.0.iter().map(|[x, y]| Coord { x: *x, y: *y }).collect();
        Polygon::new(LineString::new(coords), vec![])
    }

    /// Bounding box of the ring.
    #[must_use]
    pub fn bounds(&self) -> Bounds {
        let mut bounds = Bounds {
            west: f64::INFINITY,
            south: f64::INFINITY,
            east: f64::NEG_INFINITY,
            north: f64::NEG_INFINITY,
        };
        for [lng, lat] in &self.0 {
            bounds.west = bounds.west.min(*lng);
            bounds.east = bounds.east.max(*lng);
            bounds.south = bounds.south.min(*lat);
            bounds.north = bounds.north.max(*lat);
        }
        bounds
    }
}

/// Axis-aligned bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    /// Minimum longitude.
    pub west: f64,
    /// Minimum latitude.
    pub south: f64,
    /// Maximum longitude.
    pub east: f64,
    /// Maximum latitude.
    pub north: f64,
}

/// Validates a polygon boundary and returns it as a closed ring.
///
/// Consecutive points closer than [`POINT_EPSILON_DEG`] are collapsed and
/// any trailing points that duplicate the first point are stripped before
/// the ring is closed again. Normalizing an already normalized ring returns
/// the same ring.
///
/// # Errors
///
/// Returns [`GeometryError::InvalidGeometry`] if a coordinate is not a
/// finite longitude/latitude or fewer than three distinct points remain.
pub fn normalize_ring(points: &[[f64; 2]]) -> Result<ClosedRing, GeometryError> {
    let mut ring: Vec<[f64; 2]> = Vec::with_capacity(points.len() + 1);

    for (i, &[lng, lat]) in points.iter().enumerate() {
        if !lng.is_finite() || !lat.is_finite() {
            return Err(GeometryError::invalid(format!(
                "point {i} has a non-finite coordinate"
            )));
        }
        if !(-180.0..=180.0).contains(&lng) || !(-90.0..=90.0).contains(&lat) {
            return Err(GeometryError::invalid(format!(
                "point {i} ({lng}, {lat}) is outside the valid longitude/latitude range"
            )));
        }
        if ring.last().is_some_and(|prev| same_point(*prev, [lng, lat])) {
            continue;
        }
        ring.push([lng, lat]);
    }

    while ring.len() > 1 && same_point(ring[0], ring[ring.len() - 1]) {
        ring.pop();
    }

    if ring.len() < 3 {
        return Err(GeometryError::invalid(format!(
            "polygon needs at least 3 distinct points, found {}",
            ring.len()
        )));
    }

    ring.push(ring[0]);
    Ok(ClosedRing(ring))
}

fn same_point(a: [f64; 2], b: [f64; 2]) -> bool {
    (a[0] - b[0]).hypot(a[1] - b[1]) < POINT_EPSILON_DEG
}

/// Geodesic area of a closed ring in square meters.
///
/// Winding order does not matter; the result is never negative.
#[must_use]
pub fn footprint_area(ring: &ClosedRing) -> f64 {
    polygon_area(&ring.to_polygon())
}

/// Geodesic area of a polygon (holes subtracted) in square meters.
///
/// The polygon is oriented first: the geodesic formula measures the
/// region to the left of the exterior ring, which for a clockwise ring is
/// the rest of the globe.
#[must_use]
pub fn polygon_area(polygon: &Polygon<f64>) -> f64 {
    polygon.orient(Direction::Default).geodesic_area_unsigned()
}

/// Geodesic area of a multi-part footprint in square meters.
#[must_use]
pub fn multi_polygon_area(multi: &MultiPolygon<f64>) -> f64 {
    multi.0.iter().map(polygon_area).sum()
}

/// Roof surface area for a footprint and pitch angle, rounded to two
/// decimals.
///
/// `footprint * (1 + 0.15 * tan(pitch))`. The pitch must already be in
/// `[0, 45]` degrees (see [`clamp_pitch`]); this function does not clamp.
#[must_use]
pub fn roof_area(footprint_area_m2: f64, pitch_deg: f64) -> f64 {
    round2(footprint_area_m2 * 0.15f64.mul_add(pitch_deg.to_radians().tan(), 1.0))
}

/// Clamps a pitch angle to `[0, 45]` degrees. `NaN` becomes `0`.
#[must_use]
pub fn clamp_pitch(pitch_deg: f64) -> f64 {
    if pitch_deg.is_nan() {
        0.0
    } else {
        pitch_deg.clamp(0.0, MAX_PITCH_DEG)
    }
}

/// Rounds to two decimal places.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
