//! Parsing and re-scaling of free-text ingredient quantities.
//!
//! Quantities are always stored as the original free-text string ("1 1/2 cup",
//! "a pinch"); scaling re-derives the number every time so repeated scaling is
//! lossless.

use regex::Regex;
use std::sync::LazyLock;

static PLAIN_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\d+(?:\.\d+)?|\.\d+)$").expect("valid regex"));
static SIMPLE_FRACTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)\s*/\s*(\d+)$").expect("valid regex"));
static MIXED_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d+)[\s-]+(\d+)\s*/\s*(\d+)$").expect("valid regex"));

/// Fraction glyphs we snap to when rendering scaled values. Rendered in ASCII
/// so that the output of `format_quantity` parses again with `parse_quantity`.
const SNAP_FRACTIONS: &[(f32, &str)] = &[
    (0.25, "1/4"),
    (1.0 / 3.0, "1/3"),
    (0.5, "1/2"),
    (2.0 / 3.0, "2/3"),
    (0.75, "3/4"),
];

const SNAP_TOLERANCE: f32 = 0.05;

/// Parses a bare numeric quantity: integers, decimals, simple fractions
/// ("1/2") and mixed numbers ("1 1/2", "1-1/2"). Anything else (units,
/// ranges, words) is `None`, never an error; callers treat `None` as
/// "unscalable, pass through verbatim".
pub fn parse_quantity(text: &str) -> Option<f32> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if PLAIN_NUMBER.is_match(text) {
        return text.parse::<f32>().ok();
    }
    if let Some(caps) = SIMPLE_FRACTION.captures(text) {
        let num: f32 = caps[1].parse().ok()?;
        let den: f32 = caps[2].parse().ok()?;
        if den == 0.0 {
            return None;
        }
        return Some(num / den);
    }
    if let Some(caps) = MIXED_NUMBER.captures(text) {
        let whole: f32 = caps[1].parse().ok()?;
        let num: f32 = caps[2].parse().ok()?;
        let den: f32 = caps[3].parse().ok()?;
        if den == 0.0 {
            return None;
        }
        return Some(whole + num / den);
    }
    None
}

/// Renders a numeric quantity back to cook-friendly text. Integers render
/// bare; fractional parts snap to the nearest common fraction within a small
/// tolerance, otherwise fall back to one decimal place.
pub fn format_quantity(value: f32) -> String {
    let whole = value.floor();
    let frac = value - whole;

    if frac == 0.0 {
        return format!("{}", whole as i64);
    }

    let nearest = SNAP_FRACTIONS
        .iter()
        .min_by(|a, b| {
            (a.0 - frac)
                .abs()
                .partial_cmp(&(b.0 - frac).abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
        .expect("snap table is non-empty");

    if (nearest.0 - frac).abs() <= SNAP_TOLERANCE {
        if whole == 0.0 {
            nearest.1.to_string()
        } else {
            format!("{} {}", whole as i64, nearest.1)
        }
    } else {
        format!("{:.1}", value)
    }
}

/// Splits the leading numeric-ish portion of a quantity string from the
/// trailing unit/descriptor text. The leading portion may still fail to
/// parse (e.g. a range like "2-3").
pub(crate) fn split_leading_number(raw: &str) -> (&str, &str) {
    let split_at = raw
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || matches!(c, ' ' | '.' | '/' | '-')))
        .map(|(i, _)| i)
        .unwrap_or(raw.len());
    raw.split_at(split_at)
}

/// Re-renders a free-text quantity scaled by a serving multiplier.
///
/// If the leading numeric portion parses, it is multiplied and reformatted
/// with the trailing text kept verbatim; otherwise the multiplier is appended
/// as a suffix so no information is silently dropped. `servings == 1` is an
/// identity passthrough.
pub fn get_scaled_quantity(raw: &str, servings: f32) -> String {
    if servings == 1.0 {
        return raw.to_string();
    }

    let (numeric_part, rest) = split_leading_number(raw);
    if let Some(value) = parse_quantity(numeric_part) {
        let trailing_ws = &numeric_part[numeric_part.trim_end().len()..];
        format!("{}{}{}", format_quantity(value * servings), trailing_ws, rest)
    } else {
        format!("{} (x{})", raw, format_quantity(servings))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_integers_decimals_and_fractions() {
        assert_eq!(parse_quantity("2"), Some(2.0));
        assert_eq!(parse_quantity("0.75"), Some(0.75));
        assert_eq!(parse_quantity(".5"), Some(0.5));
        assert_eq!(parse_quantity("1/2"), Some(0.5));
        assert_eq!(parse_quantity("1 1/2"), Some(1.5));
        assert_eq!(parse_quantity("1-1/2"), Some(1.5));
        assert_eq!(parse_quantity("  3/4  "), Some(0.75));
    }

    #[test]
    fn rejects_units_ranges_and_words() {
        assert_eq!(parse_quantity("2 cups"), None);
        assert_eq!(parse_quantity("2-3"), None);
        assert_eq!(parse_quantity("a pinch"), None);
        assert_eq!(parse_quantity("to taste"), None);
        assert_eq!(parse_quantity(""), None);
        assert_eq!(parse_quantity("1/0"), None);
    }

    #[test]
    fn formats_integers_bare() {
        assert_eq!(format_quantity(2.0), "2");
        assert_eq!(format_quantity(12.0), "12");
    }

    #[test]
    fn snaps_to_common_fractions() {
        assert_eq!(format_quantity(0.5), "1/2");
        assert_eq!(format_quantity(0.26), "1/4");
        assert_eq!(format_quantity(1.5), "1 1/2");
        assert_eq!(format_quantity(2.75), "2 3/4");
        assert_eq!(format_quantity(1.0 / 3.0), "1/3");
    }

    #[test]
    fn falls_back_to_one_decimal_outside_tolerance() {
        assert_eq!(format_quantity(0.1), "0.1");
        assert_eq!(format_quantity(2.1), "2.1");
    }

    #[test]
    fn scaling_identity_law() {
        for q in ["1/2 cup", "2-3 cloves", "a pinch", "1 1/2 tsp", ""] {
            assert_eq!(get_scaled_quantity(q, 1.0), q);
        }
    }

    #[test]
    fn scaling_round_trips() {
        assert_eq!(get_scaled_quantity("1/2 cup", 4.0), "2 cup");
        assert_eq!(get_scaled_quantity("1 1/2 tsp", 2.0), "3 tsp");
        assert_eq!(get_scaled_quantity("2 cups", 2.0), "4 cups");
        assert_eq!(get_scaled_quantity("3", 2.0), "6");
    }

    #[test]
    fn unscalable_quantities_keep_original_text() {
        assert_eq!(get_scaled_quantity("a pinch", 2.0), "a pinch (x2)");
        assert_eq!(get_scaled_quantity("2-3 cloves", 4.0), "2-3 cloves (x4)");
        assert_eq!(get_scaled_quantity("to taste", 3.0), "to taste (x3)");
    }

    #[test]
    fn scaled_output_reparses() {
        let scaled = get_scaled_quantity("1/2 cup", 3.0); // "1 1/2 cup"
        let (num, _) = split_leading_number(&scaled);
        assert_eq!(parse_quantity(num), Some(1.5));
    }
}
