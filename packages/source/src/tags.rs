//! Parsing of free-form OSM tag values.
//!
//! OSM tag values are strings typed by hand, so heights arrive as `"12"`,
//! `"12 m"`, `"40ft"` or `"12,5"`, and dates as `"1923"`, `"1923-05-01"`
//! or `"~1900"`. Roof pitches come as `"30"`, `"30°"` or, for slopes,
//! `"58%"`. Values that cannot be interpreted are treated as absent.

use std::collections::BTreeMap;

const FEET_TO_METERS: f64 = 0.3048;

/// Plausible construction years. Anything outside is treated as noise.
const YEAR_RANGE: std::ops::RangeInclusive<i32> = 1800..=2100;

/// Tags that may carry a construction date, in lookup order.
const YEAR_TAGS: &[&str] = &[
    "start_date",
    "building:year",
    "year_built",
    "built_year",
    "year",
];

/// Floor counts above this are treated as data errors.
const MAX_FLOORS: f64 = 500.0;

fn parse_decimal(s: &str) -> Option<f64> {
    let value = s.trim().replace(',', ".").parse::<f64>().ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

/// Parses a height value in meters, accepting `m`, `ft` and `'` suffixes.
#[must_use]
pub fn parse_height(raw: &str) -> Option<f64> {
    let s = raw.trim().to_lowercase();
    if s.is_empty() {
        return None;
    }

    if let Some(feet) = s
        .strip_suffix("ft")
        .or_else(|| s.strip_suffix("feet"))
        .or_else(|| s.strip_suffix('\''))
    {
        return parse_decimal(feet).map(|f| f * FEET_TO_METERS);
    }

    let meters = s
        .strip_suffix("meters")
        .or_else(|| s.strip_suffix('m'))
        .unwrap_or(&s);
    parse_decimal(meters)
}

/// Parses a `building:levels` value. Fractional levels are rounded.
#[must_use]
pub fn parse_floors(raw: &str) -> Option<u32> {
    let value = parse_decimal(raw)?;
    if value > MAX_FLOORS {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    Some(value.round() as u32)
}

/// Parses a year out of a date-like value (`"1923"`, `"1923-05-01"`,
/// `"~1900"`).
#[must_use]
pub fn parse_year(raw: &str) -> Option<i32> {
    let s = raw.trim().trim_start_matches('~');
    let year_part = s.split('-').next()?.trim();
    if year_part.len() != 4 || !year_part.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let year = year_part.parse::<i32>().ok()?;
    YEAR_RANGE.contains(&year).then_some(year)
}

/// First parseable construction year among the date-like tags.
#[must_use]
pub fn construction_year(tags: &BTreeMap<String, String>) -> Option<i32> {
    YEAR_TAGS
        .iter()
        .filter_map(|key| tags.get(*key))
        .find_map(|value| parse_year(value))
}

/// Parses an angle in degrees (`"30"`, `"30°"`, `"30 deg"`).
#[must_use]
pub fn parse_angle(raw: &str) -> Option<f64> {
    let s = raw.trim().to_lowercase();
    let degrees = s
        .strip_suffix("degrees")
        .or_else(|| s.strip_suffix("deg"))
        .or_else(|| s.strip_suffix('°'))
        .unwrap_or(&s);
    parse_decimal(degrees)
}

/// Parses a `roof:slope` value. A percentage is a gradient and is
/// converted to degrees; a bare number is already an angle.
#[must_use]
pub fn parse_slope(raw: &str) -> Option<f64> {
    match raw.trim().strip_suffix('%') {
        Some(percent) => parse_decimal(percent).map(|p| (p / 100.0).atan().to_degrees()),
        None => parse_angle(raw),
    }
}

/// Roof pitch in degrees from the roof tags, unclamped.
///
/// `roof:angle` wins over `roof:slope`. Without either, the pitch is
/// derived from `roof:height` over half the width of a square with the
/// given footprint, provided the building has levels.
#[must_use]
pub fn roof_pitch(tags: &BTreeMap<String, String>, footprint_area_m2: Option<f64>) -> Option<f64> {
    if let Some(angle) = non_empty(tags, "roof:angle").and_then(parse_angle) {
        return Some(angle);
    }
    if let Some(slope) = non_empty(tags, "roof:slope").and_then(parse_slope) {
        return Some(slope);
    }

    let roof_height = non_empty(tags, "roof:height").and_then(parse_height)?;
    non_empty(tags, "building:levels")
        .and_then(parse_floors)
        .filter(|&levels| levels > 0)?;
    let half_width = footprint_area_m2.filter(|&area| area > 0.0)?.sqrt() / 2.0;
    Some((roof_height / half_width).atan().to_degrees())
}

/// Returns the trimmed tag value, or `None` when missing or blank.
#[must_use]
pub fn non_empty<'a>(tags: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    tags.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_suffixed_heights() {
        assert_eq!(parse_height("12"), Some(12.0));
        assert_eq!(parse_height("12 m"), Some(12.0));
        assert_eq!(parse_height("12.5m"), Some(12.5));
        assert_eq!(parse_height("12,5"), Some(12.5));
        assert!((parse_height("50ft").unwrap() - 15.24).abs() < 1e-9);
        assert!((parse_height("10'").unwrap() - 3.048).abs() < 1e-9);
    }

    #[test]
    fn rejects_garbage_heights() {
        assert_eq!(parse_height(""), None);
        assert_eq!(parse_height("tall"), None);
        assert_eq!(parse_height("-3"), None);
    }

    #[test]
    fn parses_floors() {
        assert_eq!(parse_floors("4"), Some(4));
        assert_eq!(parse_floors(" 2.6 "), Some(3));
        assert_eq!(parse_floors("0"), Some(0));
        assert_eq!(parse_floors("many"), None);
        assert_eq!(parse_floors("9999"), None);
    }

    #[test]
    fn parses_years() {
        assert_eq!(parse_year("1923"), Some(1923));
        assert_eq!(parse_year("1923-05-01"), Some(1923));
        assert_eq!(parse_year("~1900"), Some(1900));
        assert_eq!(parse_year("1500"), None);
        assert_eq!(parse_year("C19"), None);
    }

    #[test]
    fn construction_year_prefers_start_date() {
        let mut tags = BTreeMap::new();
        tags.insert("year".to_string(), "1970".to_string());
        tags.insert("start_date".to_string(), "1965-03".to_string());
        assert_eq!(construction_year(&tags), Some(1965));

        tags.insert("start_date".to_string(), "unknown".to_string());
        assert_eq!(construction_year(&tags), Some(1970));
    }

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn parses_angles_and_slopes() {
        assert_eq!(parse_angle("30"), Some(30.0));
        assert_eq!(parse_angle("22,5°"), Some(22.5));
        assert_eq!(parse_angle("40 deg"), Some(40.0));
        assert_eq!(parse_angle("steep"), None);
        assert_eq!(parse_slope("35"), Some(35.0));
        assert!((parse_slope("100%").unwrap() - 45.0).abs() < 1e-9);
    }

    #[test]
    fn roof_angle_beats_slope() {
        let both = tags(&[("roof:angle", "30"), ("roof:slope", "10")]);
        assert_eq!(roof_pitch(&both, Some(100.0)), Some(30.0));

        let slope_only = tags(&[("roof:angle", "n/a"), ("roof:slope", "10")]);
        assert_eq!(roof_pitch(&slope_only, Some(100.0)), Some(10.0));
    }

    #[test]
    fn roof_pitch_from_roof_height() {
        // 100 m2 square: half width 5 m, rise 5 m.
        let derived = tags(&[("roof:height", "5"), ("building:levels", "2")]);
        assert!((roof_pitch(&derived, Some(100.0)).unwrap() - 45.0).abs() < 1e-9);

        let no_levels = tags(&[("roof:height", "5")]);
        assert_eq!(roof_pitch(&no_levels, Some(100.0)), None);
        assert_eq!(roof_pitch(&derived, None), None);
        assert_eq!(roof_pitch(&tags(&[]), Some(100.0)), None);
    }

    #[test]
    fn non_empty_skips_blank_values() {
        let mut tags = BTreeMap::new();
        tags.insert("name".to_string(), "  ".to_string());
        tags.insert("roof:shape".to_string(), " flat ".to_string());
        assert_eq!(non_empty(&tags, "name"), None);
        assert_eq!(non_empty(&tags, "roof:shape"), Some("flat"));
        assert_eq!(non_empty(&tags, "missing"), None);
    }
}
