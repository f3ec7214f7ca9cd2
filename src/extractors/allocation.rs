// src/extractors/allocation.rs

// --- Imports ---
use crate::document::{AllocationCategory, AssetAllocation, Table};
use crate::extractors::{is_total_label, EntityExtractor};
use crate::utils::numbers::{is_numeric_cell, parse_number};
use once_cell::sync::Lazy;
use regex::Regex;

// --- Column Keywords ---
// Order is priority order for `Table::find_column`
const TABLE_KEYWORDS: &[&str] = &["asset class", "allocation", "weight", "asset mix"];
const NAME_KEYWORDS: &[&str] = &["asset class", "category", "class", "asset", "sector", "type", "name"];
const PERCENT_KEYWORDS: &[&str] = &["%", "percent", "allocation", "weight", "share"];
const VALUE_KEYWORDS: &[&str] = &["market value", "value", "amount", "total"];
// Headers that mark a holdings table even when it carries a weight column
const HOLDINGS_KEYWORDS: &[&str] = &["isin", "quantity", "qty", "price", "units"];

// Asset class words the free-text pass accepts as category names
const ASSET_CLASS_WORDS: &[&str] = &[
    "equities", "equity", "stocks", "shares", "bonds", "fixed income", "cash", "money market",
    "liquidity", "real estate", "property", "commodities", "gold", "precious metals",
    "alternatives", "alternative investments", "hedge funds", "private equity", "infrastructure",
    "crypto", "mixed", "balanced", "other",
];

// --- Regex Patterns for Text Matching (Lazy Static) ---
static ALLOCATION_LINE_RES: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        // Pattern 1: "Equities: 60% ($750,000)" / "Bonds - 30% 375,000"
        r"(?m)^[ \t]*(?P<name>[A-Za-z][A-Za-z &/\-]{1,40}?)[ \t]*[:\-–]?[ \t]+(?P<pct>\d{1,3}(?:\.\d+)?)[ \t]*%(?:[ \t(:\-–]*[$€£¥]?[ \t]*(?P<value>\d[\d,']*(?:\.\d+)?))?",
        // Pattern 2: "60% Equities"
        r"(?m)^[ \t]*(?P<pct>\d{1,3}(?:\.\d+)?)[ \t]*%[ \t]+(?:in[ \t]+)?(?P<name>[A-Za-z][A-Za-z &/\-]{1,40}?)[ \t]*$",
    ]
    .iter()
    .filter_map(|pat| Regex::new(pat).ok())
    .collect()
});

fn is_asset_class_name(name: &str) -> bool {
    let lower = name.trim().to_lowercase();
    ASSET_CLASS_WORDS
        .iter()
        .any(|word| lower == *word || lower.starts_with(&format!("{} ", word)) || lower.ends_with(&format!(" {}", word)))
}

/// Fills missing percentages from category values when every percentage is missing.
fn derive_percentages(categories: &mut [AllocationCategory]) {
    if categories.iter().any(|c| c.percentage.is_some()) {
        return;
    }
    let total: f64 = categories.iter().filter_map(|c| c.value).sum();
    if total <= 0.0 {
        return;
    }
    tracing::debug!("Deriving allocation percentages from values (total {})", total);
    for category in categories.iter_mut() {
        category.percentage = category.value.map(|v| v / total * 100.0);
    }
}

// --- Main Extractor Structure ---

/// Finds the breakdown of the portfolio by asset class.
#[derive(Default)]
pub struct AssetAllocationExtractor;

impl AssetAllocationExtractor {
    pub fn new() -> Self {
        Self
    }

    fn is_allocation_table(table: &Table) -> bool {
        if HOLDINGS_KEYWORDS.iter().any(|k| table.headers_contain(k)) {
            return false;
        }
        TABLE_KEYWORDS
            .iter()
            .any(|k| table.headers_contain(k) || table.title_contains(k))
    }

    /// Column whose cells mostly carry a percent sign.
    fn percent_sign_column(table: &Table, claimed: &[usize]) -> Option<usize> {
        (0..table.headers.len())
            .filter(|idx| !claimed.contains(idx))
            .find(|&idx| {
                let with_sign = table
                    .rows
                    .iter()
                    .filter(|r| r.get(idx).is_some_and(|c| c.contains('%')))
                    .count();
                with_sign * 2 > table.rows.len()
            })
    }

    fn categories_from_table(table: &Table) -> Vec<AllocationCategory> {
        if table.headers.is_empty() {
            return Vec::new();
        }
        let name_col = table
            .find_column(NAME_KEYWORDS, &[])
            .or_else(|| {
                // First column holding words rather than numbers
                (0..table.headers.len()).find(|&idx| {
                    table
                        .rows
                        .iter()
                        .filter_map(|r| r.get(idx))
                        .any(|c| !c.is_empty() && !is_numeric_cell(c))
                })
            })
            .unwrap_or(0);
        let pct_col = table
            .find_column(PERCENT_KEYWORDS, &[name_col])
            .or_else(|| Self::percent_sign_column(table, &[name_col]));
        let mut claimed = vec![name_col];
        claimed.extend(pct_col);
        let value_col = table.find_column(VALUE_KEYWORDS, &claimed);

        tracing::trace!(
            "Allocation columns in '{}': name={} pct={:?} value={:?}",
            table.title,
            name_col,
            pct_col,
            value_col
        );

        let mut categories: Vec<AllocationCategory> = table
            .rows
            .iter()
            .filter_map(|row| {
                let name = row.get(name_col)?.trim();
                if name.is_empty() || is_total_label(name) {
                    return None;
                }
                let percentage = pct_col.and_then(|idx| parse_number(row.get(idx)?));
                let value = value_col.and_then(|idx| parse_number(row.get(idx)?));
                if percentage.is_none() && value.is_none() {
                    return None;
                }
                Some(AllocationCategory {
                    name: name.to_string(),
                    percentage,
                    value,
                })
            })
            .collect();

        derive_percentages(&mut categories);
        categories
    }
}

impl EntityExtractor for AssetAllocationExtractor {
    type Output = AssetAllocation;

    fn category(&self) -> &'static str {
        "asset allocation"
    }

    fn from_tables(&self, tables: &[Table]) -> Option<AssetAllocation> {
        tables
            .iter()
            .filter(|t| Self::is_allocation_table(t))
            .map(Self::categories_from_table)
            .find(|categories| !categories.is_empty())
            .map(AssetAllocation::new)
    }

    fn from_text(&self, text: &str) -> Option<AssetAllocation> {
        // Patterns in priority order; the first one yielding categories wins
        ALLOCATION_LINE_RES.iter().find_map(|re| {
            let mut categories: Vec<AllocationCategory> = Vec::new();
            for caps in re.captures_iter(text) {
                let Some(name) = caps.name("name").map(|m| m.as_str().trim()) else {
                    continue;
                };
                if !is_asset_class_name(name)
                    || categories.iter().any(|c| c.name.eq_ignore_ascii_case(name))
                {
                    continue;
                }
                categories.push(AllocationCategory {
                    name: name.to_string(),
                    percentage: caps.name("pct").and_then(|m| parse_number(m.as_str())),
                    value: caps.name("value").and_then(|m| parse_number(m.as_str())),
                });
            }
            (!categories.is_empty()).then(|| AssetAllocation::new(categories))
        })
    }
}
