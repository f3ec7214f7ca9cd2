// src/utils/numbers.rs
//! Cell-level parsing helpers shared by every extractor: numbers, currencies and ISINs.

use once_cell::sync::Lazy;
use regex::Regex;

// --- Regex Patterns (Lazy Static) ---
static LEADING_NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+-]?(?:\d+\.?\d*|\.\d+)(?:[eE][+-]?\d+)?")
        .expect("Failed to compile LEADING_NUMBER_RE")
});

static ISIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Z]{2}[A-Z0-9]{9}[0-9]$").expect("Failed to compile ISIN_RE")
});

// Unanchored variant for scanning free text and arbitrary cells
static ISIN_SCAN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b[A-Z]{2}[A-Z0-9]{9}[0-9]\b").expect("Failed to compile ISIN_SCAN_RE")
});

static ISO_CODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(USD|EUR|GBP|CHF|JPY|CAD|AUD|NZD|SEK|NOK|DKK|HKD|SGD|CNY|INR|ZAR)\b")
        .expect("Failed to compile ISO_CODE_RE")
});

/// ISO-4217 codes recognised in cells and free text.
pub const KNOWN_CURRENCIES: [&str; 16] = [
    "USD", "EUR", "GBP", "CHF", "JPY", "CAD", "AUD", "NZD", "SEK", "NOK", "DKK", "HKD", "SGD",
    "CNY", "INR", "ZAR",
];

pub const DEFAULT_CURRENCY: &str = "USD";

/// Parses a numeric cell the lenient way statements print them.
///
/// Strips currency symbols, ISO codes, thousands separators (`,` `'` and
/// spaces), percent signs and a trailing `-`/`+` sign marker. Parenthesised
/// amounts are negative. Like `parseFloat`, trailing garbage after a valid
/// numeric prefix is ignored. Returns `None` instead of failing.
pub fn parse_number(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let negative_parens = trimmed.starts_with('(') && trimmed.ends_with(')');
    // ISO codes first, while word boundaries are still intact
    let without_codes = ISO_CODE_RE.replace_all(trimmed, "");
    let cleaned: String = without_codes
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | '¥' | ',' | '\'' | '%' | '(' | ')' | ' ' | '\u{a0}'))
        // Unicode minus used by some PDF exports
        .map(|c| if c == '\u{2212}' { '-' } else { c })
        .collect();

    let matched = match LEADING_NUMBER_RE.find(&cleaned) {
        Some(m) => m.as_str(),
        None => {
            tracing::debug!("Numeric parse failed for cell '{}'", raw);
            return None;
        }
    };

    match matched.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(if negative_parens { -value.abs() } else { value }),
        _ => {
            tracing::debug!("Numeric parse failed for cell '{}' (prefix '{}')", raw, matched);
            None
        }
    }
}

/// True if the cell holds a number and nothing that looks like a word.
pub fn is_numeric_cell(raw: &str) -> bool {
    let has_letters = raw
        .chars()
        .filter(|c| c.is_alphabetic())
        .count()
        > 3; // tolerate an ISO code like "USD"
    !has_letters && parse_number(raw).is_some()
}

/// Structural ISIN check: two letters, nine alphanumerics, one check digit.
pub fn is_valid_isin(candidate: &str) -> bool {
    ISIN_RE.is_match(candidate)
}

/// Finds the first ISIN-shaped token inside a cell or line of text.
pub fn find_isin(text: &str) -> Option<&str> {
    ISIN_SCAN_RE.find(text).map(|m| m.as_str())
}

/// Maps a currency symbol to its ISO code.
pub fn currency_from_symbol(symbol: char) -> Option<&'static str> {
    match symbol {
        '$' => Some("USD"),
        '€' => Some("EUR"),
        '£' => Some("GBP"),
        '¥' => Some("JPY"),
        _ => None,
    }
}

/// Detects a currency in a cell: an explicit ISO code wins over a symbol.
pub fn detect_currency(text: &str) -> Option<String> {
    if let Some(m) = ISO_CODE_RE.find(&text.to_uppercase()) {
        return Some(m.as_str().to_string());
    }
    text.chars().find_map(currency_from_symbol).map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_formatted_amounts() {
        assert_eq!(parse_number("19,050.00"), Some(19050.0));
        assert_eq!(parse_number("$1,250,000"), Some(1_250_000.0));
        assert_eq!(parse_number("€ 75.5"), Some(75.5));
        assert_eq!(parse_number("60%"), Some(60.0));
        assert_eq!(parse_number("1'234.50"), Some(1234.5));
        assert_eq!(parse_number("USD 500"), Some(500.0));
        assert_eq!(parse_number("+5.2%"), Some(5.2));
        assert_eq!(parse_number("-3.1"), Some(-3.1));
    }

    #[test]
    fn parenthesised_amounts_are_negative() {
        assert_eq!(parse_number("(1,234.50)"), Some(-1234.5));
    }

    #[test]
    fn unparseable_cells_yield_none() {
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("n/a"), None);
        assert_eq!(parse_number("Apple Inc."), None);
        assert_eq!(parse_number("-"), None);
    }

    #[test]
    fn trailing_garbage_is_ignored_like_parse_float() {
        assert_eq!(parse_number("190.50abc"), Some(190.5));
    }

    #[test]
    fn numeric_cell_rejects_words() {
        assert!(is_numeric_cell("1,000"));
        assert!(is_numeric_cell("USD 1,000"));
        assert!(!is_numeric_cell("3M Company"));
        assert!(!is_numeric_cell("Cash"));
    }

    #[test]
    fn isin_validation() {
        assert!(is_valid_isin("US0378331005"));
        assert!(is_valid_isin("DE000BASF111"));
        assert!(!is_valid_isin("XX12345"));
        assert!(!is_valid_isin("us0378331005"));
        assert_eq!(find_isin("Apple US0378331005 100"), Some("US0378331005"));
        assert_eq!(find_isin("no identifier here"), None);
    }

    #[test]
    fn currency_detection() {
        assert_eq!(detect_currency("$ 1,000").as_deref(), Some("USD"));
        assert_eq!(detect_currency("1,000 €").as_deref(), Some("EUR"));
        assert_eq!(detect_currency("chf").as_deref(), Some("CHF"));
        assert_eq!(detect_currency("1,000"), None);
    }
}
