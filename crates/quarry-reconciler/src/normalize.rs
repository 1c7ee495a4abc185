//! Value normalization and numeric clustering

use crate::ReconcilerConfig;

const CURRENCY_SYMBOLS: &[char] = &['$', '€', '£', '¥'];

/// Comparison form of a raw value: trimmed, inner whitespace collapsed, lowercased
pub fn normalize_value(raw: &str) -> String {
    raw.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Parse a money-style number
///
/// Accepts currency symbols, thousands separators, a leading minus and
/// accounting-style parentheses for negatives. Returns `None` for anything else,
/// including exponents and non-finite values.
///
/// ```
/// use quarry_reconciler::parse_numeric;
///
/// assert_eq!(parse_numeric("$1,234.50"), Some(1234.5));
/// assert_eq!(parse_numeric("($200)"), Some(-200.0));
/// assert_eq!(parse_numeric("n/a"), None);
/// ```
pub fn parse_numeric(raw: &str) -> Option<f64> {
    let mut text = raw.trim();
    let mut negative = false;
    if let Some(inner) = text.strip_prefix('(').and_then(|rest| rest.strip_suffix(')')) {
        negative = true;
        text = inner;
    }

    let cleaned: String = text
        .chars()
        .filter(|c| !CURRENCY_SYMBOLS.contains(c) && *c != ',' && !c.is_whitespace())
        .collect();

    let digits = match cleaned.strip_prefix('-') {
        Some(rest) => {
            negative = true;
            rest
        }
        None => cleaned.as_str(),
    };

    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }

    let value: f64 = digits.parse().ok()?;
    if !value.is_finite() {
        return None;
    }
    Some(if negative { -value } else { value })
}

/// Number of clusters formed by single-linkage over sorted values
///
/// Neighbours closer than [`ReconcilerConfig::within_tolerance`] share a cluster.
pub fn count_clusters(values: &[f64], config: &ReconcilerConfig) -> usize {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if sorted.is_empty() {
        return 0;
    }
    sorted.sort_by(f64::total_cmp);

    1 + sorted
        .windows(2)
        .filter(|pair| !config.within_tolerance(pair[0], pair[1]))
        .count()
}
