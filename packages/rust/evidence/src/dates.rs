//! Free-text genealogy date normalization.
//!
//! Source pages write dates as "about 1817", "abt. 1817", "between 1800 and
//! 1810", "12 Mar 1817", ISO `1817-00-00`, or "[date unknown]". Everything is
//! reduced to a single year plus approximate/unknown flags.

use std::sync::LazyLock;

use regex::Regex;
use tracing::trace;

/// Normalized result of [`parse_date`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParsedDate {
    pub year: Option<i32>,
    pub is_approximate: bool,
    pub is_unknown: bool,
}

impl ParsedDate {
    fn exact(year: i32) -> Self {
        Self {
            year: Some(year),
            is_approximate: false,
            is_unknown: false,
        }
    }

    fn approximate(year: i32) -> Self {
        Self {
            year: Some(year),
            is_approximate: true,
            is_unknown: false,
        }
    }

    fn unknown() -> Self {
        Self {
            year: None,
            is_approximate: false,
            is_unknown: true,
        }
    }
}

/// Parse a raw date string into a year with approximate/unknown flags.
pub fn parse_date(raw: &str) -> ParsedDate {
    static BETWEEN_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?i)\b(?:between|bet)\b\.?\s+(?:.*?\b)?(\d{4})\b.*?\band\s+(?:.*?\b)?(\d{4})\b")
            .expect("valid regex")
    });
    static APPROX_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"(?i)^(?:about|abt|circa|ca|c|est|estimated|before|bef|after|aft)\b\.?\s*(?:.*?\b)?(\d{4})\b",
        )
        .expect("valid regex")
    });
    static YEAR_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\b(\d{4})\b").expect("valid regex"));

    let text = raw.trim();
    if text.is_empty() || is_unknown_marker(text) {
        return ParsedDate::unknown();
    }

    if let Some(caps) = BETWEEN_RE.captures(text) {
        if let (Some(a), Some(b)) = (parse_year(&caps[1]), parse_year(&caps[2])) {
            return ParsedDate::approximate((a + b).div_euclid(2));
        }
    }

    if let Some(caps) = APPROX_RE.captures(text) {
        if let Some(year) = parse_year(&caps[1]) {
            return ParsedDate::approximate(year);
        }
    }

    match YEAR_RE.captures(text).and_then(|caps| parse_year(&caps[1])) {
        Some(year) => ParsedDate::exact(year),
        None => {
            trace!(raw, "no year in date text");
            ParsedDate::unknown()
        }
    }
}

fn parse_year(digits: &str) -> Option<i32> {
    digits.parse::<i32>().ok().filter(|y| *y > 0)
}

/// Whole-value markers only; "1817 (day unknown)" still carries a year.
fn is_unknown_marker(text: &str) -> bool {
    let lower = text.to_lowercase();
    matches!(
        lower.trim_matches(|c: char| c == '[' || c == ']' || c == '(' || c == ')').trim(),
        "unknown" | "date unknown" | "unknown date" | "?" | "-" | "n/a"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn about_prefix_is_approximate() {
        let parsed = parse_date("about 1817");
        assert_eq!(parsed.year, Some(1817));
        assert!(parsed.is_approximate);
        assert!(!parsed.is_unknown);

        assert_eq!(parse_date("abt 1817"), parsed);
        assert_eq!(parse_date("Abt. 1817"), parsed);
        assert_eq!(parse_date("circa 1817"), parsed);
    }

    #[test]
    fn approximate_prefix_with_full_date() {
        let parsed = parse_date("abt 12 Mar 1817");
        assert_eq!(parsed.year, Some(1817));
        assert!(parsed.is_approximate);
    }

    #[test]
    fn between_takes_floor_of_midpoint() {
        let parsed = parse_date("between 1800 and 1810");
        assert_eq!(parsed.year, Some(1805));
        assert!(parsed.is_approximate);

        assert_eq!(parse_date("between 1800 and 1805").year, Some(1802));
        assert_eq!(parse_date("Between Jan 1800 and Dec 1803").year, Some(1801));
    }

    #[test]
    fn bare_year_is_exact() {
        assert_eq!(parse_date("1817"), ParsedDate::exact(1817));
        assert_eq!(parse_date("  1817 "), ParsedDate::exact(1817));
    }

    #[test]
    fn full_and_iso_dates_are_exact() {
        assert_eq!(parse_date("12 Mar 1817"), ParsedDate::exact(1817));
        assert_eq!(parse_date("1817-00-00"), ParsedDate::exact(1817));
        assert_eq!(parse_date("1817-03-12"), ParsedDate::exact(1817));
    }

    #[test]
    fn before_and_after_are_approximate() {
        assert_eq!(parse_date("before 1850"), ParsedDate::approximate(1850));
        assert_eq!(parse_date("aft 1850"), ParsedDate::approximate(1850));
    }

    #[test]
    fn unknown_markers() {
        let parsed = parse_date("[date unknown]");
        assert!(parsed.is_unknown);
        assert_eq!(parsed.year, None);

        assert!(parse_date("Unknown").is_unknown);
        assert!(parse_date("?").is_unknown);
        assert!(parse_date("").is_unknown);
    }

    #[test]
    fn no_four_digit_year_is_unknown() {
        let parsed = parse_date("in the spring");
        assert!(parsed.is_unknown);
        assert_eq!(parsed.year, None);

        assert!(parse_date("12 Mar 18").is_unknown);
    }

    #[test]
    fn partial_unknown_keeps_the_year() {
        let parsed = parse_date("1817 (day unknown)");
        assert_eq!(parsed.year, Some(1817));
        assert!(!parsed.is_unknown);

        assert!(parse_date("[date unknown]").is_unknown);
        assert!(parse_date("Unknown").is_unknown);
        assert!(parse_date("(unknown)").is_unknown);
    }
}
