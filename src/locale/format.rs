//! Number formatting that follows each locale's separator conventions.
//!
//! Vietnamese writes `1.234.567,89`: period for thousands, comma for decimals.

use super::Locale;

/// Fractional digits kept by [`format_decimal`] before trailing zeros are trimmed.
const DECIMAL_PLACES: usize = 2;

fn separators(locale: Locale) -> (char, char) {
    match locale {
        Locale::Vietnamese => ('.', ','),
        Locale::English => (',', '.'),
    }
}

fn group_thousands(digits: &str, sep: char) -> String {
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(sep);
        }
        out.push(c);
    }
    out
}

/// Format an integer with the locale's thousands separator.
pub fn format_integer(n: i64, locale: Locale) -> String {
    let (thousands, _) = separators(locale);
    let grouped = group_thousands(&n.unsigned_abs().to_string(), thousands);
    if n < 0 {
        format!("-{grouped}")
    } else {
        grouped
    }
}

/// Format a real number with at most two fractional digits.
///
/// Trailing fractional zeros are dropped, so `18.5` renders as `18,5` and
/// `3.0` as `3` under [`Locale::Vietnamese`].
pub fn format_decimal(x: f64, locale: Locale) -> String {
    if !x.is_finite() {
        return x.to_string();
    }

    let (thousands, decimal) = separators(locale);
    let fixed = format!("{:.*}", DECIMAL_PLACES, x.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), ""));
    let frac_part = frac_part.trim_end_matches('0');

    let mut out = String::new();
    if x < 0.0 && (int_part != "0" || !frac_part.is_empty()) {
        out.push('-');
    }
    out.push_str(&group_thousands(int_part, thousands));
    if !frac_part.is_empty() {
        out.push(decimal);
        out.push_str(frac_part);
    }
    out
}
