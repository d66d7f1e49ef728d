//! Scalar value decoding: decimals, dates, booleans, integers.

use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Exclusive bound on the magnitude of any decimal in a SAF-T file.
///
/// The schema caps monetary values at 18 total digits. Keeping every value
/// below this bound leaves room to sum billions of lines without overflow.
pub const MAX_MAGNITUDE: Decimal = dec!(1000000000000000000);

/// Outcome of decoding a decimal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Parsed<T> {
    /// The text was in canonical `xs:decimal` form.
    Canonical(T),
    /// The text was accepted only after normalization.
    Normalized(T),
}

impl<T> Parsed<T> {
    pub fn value(self) -> T {
        match self {
            Self::Canonical(v) | Self::Normalized(v) => v,
        }
    }
}

/// Parse a decimal, accepting Norwegian formatting as a fallback.
///
/// `1000.50` is canonical. `1 000,50`, `1.000,50` and `1,000.50` are
/// normalized. Returns `None` when the text is not a number either way.
pub fn parse_decimal(text: &str) -> Option<Parsed<Decimal>> {
    let trimmed = text.trim();
    if let Ok(d) = Decimal::from_str(trimmed) {
        return Some(Parsed::Canonical(d));
    }
    let normalized = normalize_number(trimmed);
    Decimal::from_str(&normalized).ok().map(Parsed::Normalized)
}

/// Whether `d` fits the schema's 18-digit decimal range.
pub fn in_range(d: Decimal) -> bool {
    d.abs() < MAX_MAGNITUDE
}

fn normalize_number(text: &str) -> String {
    let s: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect();
    let has_comma = s.contains(',');
    let has_dot = s.contains('.');
    if has_comma && has_dot {
        // Whichever separator comes last is the decimal separator.
        if s.rfind(',') > s.rfind('.') {
            s.replace('.', "").replace(',', ".")
        } else {
            s.replace(',', "")
        }
    } else if has_comma {
        s.replace(',', ".")
    } else if s.matches('.').count() > 1 {
        s.replace('.', "")
    } else {
        s
    }
}

/// Parse an `xs:date`; an `xs:dateTime` contributes its date part.
pub fn parse_date(text: &str) -> Option<NaiveDate> {
    let t = text.trim();
    let date_part = t.get(..10).unwrap_or(t);
    NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

pub fn parse_bool(text: &str) -> Option<bool> {
    match text.trim() {
        "true" | "1" => Some(true),
        "false" | "0" => Some(false),
        _ => None,
    }
}

pub fn parse_u32(text: &str) -> Option<u32> {
    text.trim().parse().ok()
}

pub fn parse_i32(text: &str) -> Option<i32> {
    text.trim().parse().ok()
}

pub fn parse_u64(text: &str) -> Option<u64> {
    text.trim().parse().ok()
}

/// Format a Decimal for messages: at least 2 decimal places, trailing zeros
/// beyond that stripped.
pub fn format_decimal(d: Decimal) -> String {
    let s = d.normalize().to_string();
    if let Some(dot_pos) = s.find('.') {
        let decimals = s.len() - dot_pos - 1;
        if decimals < 2 {
            format!("{s}{}", "0".repeat(2 - decimals))
        } else {
            s
        }
    } else {
        format!("{s}.00")
    }
}
