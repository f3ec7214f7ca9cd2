// src/extractors/performance.rs

// --- Imports ---
use crate::document::{PerformanceMetrics, Period, Table};
use crate::extractors::EntityExtractor;
use crate::utils::numbers::{is_numeric_cell, parse_number};
use once_cell::sync::Lazy;
use regex::Regex;

// --- Period Labels ---
// Checked in this order; "10 years" must not be read as a one-year label
const PERIOD_LABELS: &[(Period, &str)] = &[
    (Period::Ytd, r"ytd|year[\s-]+to[\s-]+date"),
    (Period::SinceInception, r"since\s+inception|inception|itd|since\s+start"),
    (Period::TenYear, r"(?:10|ten)[\s-]*(?:y|yr|yrs|years?)"),
    (Period::OneMonth, r"(?:1|one)[\s-]*(?:m|mo|mth|months?)"),
    (Period::ThreeMonth, r"(?:3|three)[\s-]*(?:m|mo|mth|months?)"),
    (Period::SixMonth, r"(?:6|six)[\s-]*(?:m|mo|mth|months?)"),
    (Period::OneYear, r"(?:1|one)[\s-]*(?:y|yr|years?)|12[\s-]*months?"),
    (Period::ThreeYear, r"(?:3|three)[\s-]*(?:y|yr|yrs|years?)"),
    (Period::FiveYear, r"(?:5|five)[\s-]*(?:y|yr|yrs|years?)"),
];

const TABLE_KEYWORDS: &[&str] = &["performance", "return", "ytd", "period"];
const RETURN_KEYWORDS: &[&str] = &["portfolio", "return", "performance", "twr", "mwr", "%"];
// Comparison columns and rows are never the portfolio's own figure
const COMPARISON_WORDS: &[&str] = &["benchmark", "index", "excess", "relative", "difference", "active"];

// --- Regex Patterns (Lazy Static) ---
static PERIOD_RES: Lazy<Vec<(Period, Regex)>> = Lazy::new(|| {
    PERIOD_LABELS
        .iter()
        .filter_map(|(period, label)| {
            Regex::new(&format!(r"(?i)\b(?:{})\b", label))
                .ok()
                .map(|re| (*period, re))
        })
        .collect()
});

// Per period, patterns in priority order
static TEXT_RES: Lazy<Vec<(Period, Vec<Regex>)>> = Lazy::new(|| {
    PERIOD_LABELS
        .iter()
        .map(|(period, label)| {
            let patterns = [
                // Pattern 1: "YTD return 4.2%" / "1 Year (annualised): -1.5 %"
                format!(r"(?im)\b(?:{})\b[^\n\d%+\-−]{{0,40}}?(?P<num>[+\-−]?\d+(?:\.\d+)?)[ \t]*%", label),
                // Pattern 2: "Since inception: 12.3"
                format!(r"(?im)\b(?:{})\b[ \t]*(?:return|performance)?[ \t]*:[ \t]*(?P<num>[+\-−]?\d+(?:\.\d+)?)\b", label),
            ];
            let compiled = patterns
                .iter()
                .filter_map(|pat| Regex::new(pat).ok())
                .collect();
            (*period, compiled)
        })
        .collect()
});

/// Reporting period named by a header or row label, if any.
pub fn classify_period(label: &str) -> Option<Period> {
    let label = label.trim();
    if label.is_empty() {
        return None;
    }
    PERIOD_RES
        .iter()
        .find_map(|(period, re)| re.is_match(label).then_some(*period))
}

fn is_comparison(label: &str) -> bool {
    let lower = label.to_lowercase();
    COMPARISON_WORDS.iter().any(|w| lower.contains(w))
}

// --- Main Extractor Structure ---

/// Finds portfolio returns per reporting period.
#[derive(Default)]
pub struct PerformanceExtractor;

impl PerformanceExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Periods as headers, one row per series ("Portfolio", "Benchmark").
    fn from_period_headers(table: &Table) -> Option<PerformanceMetrics> {
        let period_cols: Vec<(usize, Period)> = table
            .headers
            .iter()
            .enumerate()
            .filter_map(|(idx, h)| classify_period(h).map(|p| (idx, p)))
            .collect();
        if period_cols.len() < 2 {
            return None;
        }

        // First row that is not a comparison series and carries a figure
        let row = table.rows.iter().find(|row| {
            let label_is_comparison = row
                .iter()
                .find(|c| !c.trim().is_empty() && !is_numeric_cell(c))
                .is_some_and(|label| is_comparison(label));
            !label_is_comparison && period_cols.iter().any(|(idx, _)| parse_number(&row[*idx]).is_some())
        })?;

        let mut metrics = PerformanceMetrics::default();
        for (idx, period) in &period_cols {
            if let Some(value) = parse_number(&row[*idx]) {
                metrics.set_if_empty(*period, value);
            }
        }
        (!metrics.is_empty()).then_some(metrics)
    }

    /// Periods as rows: a label column plus the portfolio's return column.
    fn from_period_rows(table: &Table) -> Option<PerformanceMetrics> {
        let width = table.headers.len();
        let (label_col, labelled_rows) = (0..width)
            .map(|idx| {
                let hits = table
                    .rows
                    .iter()
                    .filter(|r| classify_period(&r[idx]).is_some())
                    .count();
                (idx, hits)
            })
            .max_by_key(|(idx, hits)| (*hits, std::cmp::Reverse(*idx)))?;

        let hinted = TABLE_KEYWORDS
            .iter()
            .any(|k| table.headers_contain(k) || table.title_contains(k));
        if labelled_rows == 0 || (labelled_rows < 2 && !hinted) {
            return None;
        }

        let candidate = |idx: &usize| *idx != label_col && !is_comparison(&table.headers[*idx]);
        let return_col = RETURN_KEYWORDS
            .iter()
            .find_map(|k| {
                (0..width)
                    .filter(candidate)
                    .find(|idx| table.headers[*idx].to_lowercase().contains(k))
            })
            .or_else(|| {
                (0..width)
                    .filter(candidate)
                    .find(|idx| table.rows.iter().any(|r| parse_number(&r[*idx]).is_some()))
            })?;

        tracing::trace!(
            "Performance rows in '{}': label column {}, return column {}",
            table.title,
            label_col,
            return_col
        );

        let mut metrics = PerformanceMetrics::default();
        for row in &table.rows {
            let Some(period) = classify_period(&row[label_col]) else {
                continue;
            };
            if let Some(value) = parse_number(&row[return_col]) {
                metrics.set_if_empty(period, value);
            }
        }
        (!metrics.is_empty()).then_some(metrics)
    }
}

impl EntityExtractor for PerformanceExtractor {
    type Output = PerformanceMetrics;

    fn category(&self) -> &'static str {
        "performance"
    }

    fn from_tables(&self, tables: &[Table]) -> Option<PerformanceMetrics> {
        tables.iter().find_map(|table| {
            Self::from_period_headers(table).or_else(|| Self::from_period_rows(table))
        })
    }

    fn from_text(&self, text: &str) -> Option<PerformanceMetrics> {
        let mut metrics = PerformanceMetrics::default();
        for (period, patterns) in TEXT_RES.iter() {
            let value = patterns.iter().find_map(|re| {
                re.captures(text)
                    .and_then(|caps| caps.name("num"))
                    .and_then(|m| parse_number(m.as_str()))
            });
            if let Some(value) = value {
                metrics.set_if_empty(*period, value);
            }
        }
        (!metrics.is_empty()).then_some(metrics)
    }
}
