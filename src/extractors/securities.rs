// src/extractors/securities.rs

// --- Imports ---
use crate::document::{Security, Table};
use crate::extractors::{is_total_label, EntityExtractor};
use crate::utils::numbers::{
    detect_currency, find_isin, is_numeric_cell, is_valid_isin, parse_number, KNOWN_CURRENCIES,
};
use once_cell::sync::Lazy;
use regex::Regex;

// --- Column Keywords ---
const ISIN_KEYWORDS: &[&str] = &["isin"];
const CURRENCY_KEYWORDS: &[&str] = &["currency", "ccy", "curr"];
const QUANTITY_KEYWORDS: &[&str] = &["quantity", "qty", "units", "shares", "nominal"];
const PRICE_KEYWORDS: &[&str] = &["price", "rate"];
const VALUE_KEYWORDS: &[&str] = &["market value", "value", "amount", "total"];
const NAME_KEYWORDS: &[&str] = &["name", "security", "description", "instrument", "holding", "asset", "title"];
const TITLE_KEYWORDS: &[&str] = &["holdings", "securities", "positions"];

// Amounts on a holdings line; a trailing % marks a weight or return, not an amount
static NUMBER_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?P<num>\(?[-+]?[$€£¥]?\d[\d,']*(?:\.\d+)?\)?)(?P<pct>[ \t]*%)?")
        .expect("Failed to compile NUMBER_TOKEN_RE")
});

/// Column indices claimed for one securities table.
#[derive(Debug)]
struct Columns {
    isin: Option<usize>,
    currency: Option<usize>,
    quantity: Option<usize>,
    price: Option<usize>,
    value: Option<usize>,
    name: Option<usize>,
}

impl Columns {
    /// Claims columns one field at a time so two fields never share a column.
    fn locate(table: &Table) -> Self {
        let mut claimed: Vec<usize> = Vec::new();
        let mut claim = |keywords: &[&str]| {
            let idx = table.find_column(keywords, &claimed);
            claimed.extend(idx);
            idx
        };
        let isin = claim(ISIN_KEYWORDS);
        let currency = claim(CURRENCY_KEYWORDS);
        let quantity = claim(QUANTITY_KEYWORDS);
        let price = claim(PRICE_KEYWORDS);
        let value = claim(VALUE_KEYWORDS);
        let name = claim(NAME_KEYWORDS);
        Self {
            isin,
            currency,
            quantity,
            price,
            value,
            name,
        }
    }
}

fn cell(row: &[String], idx: Option<usize>) -> Option<&str> {
    idx.map(|i| row[i].trim()).filter(|c| !c.is_empty())
}

fn is_currency_code(text: &str) -> bool {
    KNOWN_CURRENCIES.contains(&text.trim().to_uppercase().as_str())
}

/// Trims table debris and list markers around a name taken from free text.
fn clean_name(raw: &str) -> Option<String> {
    let name = raw
        .trim()
        .trim_matches(|c: char| matches!(c, '|' | '-' | ':' | ';' | ',' | '(' | ')') || c.is_whitespace())
        .trim();
    (!name.is_empty() && !is_numeric_cell(name)).then(|| name.to_string())
}

// --- Main Extractor Structure ---

/// Finds individual holdings, keyed by ISIN where one is printed.
pub struct SecuritiesExtractor {
    default_currency: String,
}

impl SecuritiesExtractor {
    pub fn new(default_currency: impl Into<String>) -> Self {
        Self {
            default_currency: default_currency.into(),
        }
    }

    fn is_securities_table(table: &Table) -> bool {
        if table.headers_contain("isin") {
            return true;
        }
        let cols = Columns::locate(table);
        if cols.name.is_none() {
            return false;
        }
        let titled = TITLE_KEYWORDS.iter().any(|k| table.title_contains(k));
        (titled && cols.value.is_some()) || cols.quantity.is_some() || cols.price.is_some()
    }

    fn security_from_row(&self, row: &[String], cols: &Columns) -> Option<Security> {
        let label = cell(row, cols.name).or_else(|| row.first().map(|c| c.trim()));
        if label.is_some_and(is_total_label) {
            return None;
        }

        // Dedicated column first, then every cell of the row
        let isin = cell(row, cols.isin)
            .map(|c| find_isin(c).unwrap_or(c))
            .or_else(|| row.iter().find_map(|c| find_isin(c)));

        let name = cell(row, cols.name).or_else(|| {
            row.iter().enumerate().find_map(|(idx, c)| {
                let c = c.trim();
                let usable = Some(idx) != cols.isin
                    && !c.is_empty()
                    && Some(c) != isin
                    && !is_currency_code(c)
                    && !is_numeric_cell(c);
                usable.then_some(c)
            })
        });

        if name.is_none() && !isin.is_some_and(is_valid_isin) {
            tracing::trace!("Skipping row without name or valid ISIN: {:?}", row);
            return None;
        }

        let value_cell = cell(row, cols.value);
        let currency = cell(row, cols.currency)
            .and_then(detect_currency)
            .or_else(|| value_cell.and_then(detect_currency))
            .or_else(|| cell(row, cols.price).and_then(detect_currency))
            .unwrap_or_else(|| self.default_currency.clone());

        let mut security = Security::new(isin.map(str::to_string), name.map(str::to_string), currency);
        security.quantity = cell(row, cols.quantity).and_then(parse_number);
        security.price = cell(row, cols.price).and_then(parse_number);
        security.value = value_cell.and_then(parse_number);
        Some(security)
    }

    fn securities_from_table(&self, table: &Table) -> Vec<Security> {
        let cols = Columns::locate(table);
        tracing::trace!("Securities columns in '{}': {:?}", table.title, cols);
        table
            .rows
            .iter()
            .filter_map(|row| self.security_from_row(row, &cols))
            .collect()
    }

    /// One holdings line: name around the ISIN, then quantity, price and value.
    fn security_from_line(&self, line: &str, isin: &str) -> Option<Security> {
        let isin_start = line.find(isin)?;
        let before = &line[..isin_start];
        let after = &line[isin_start + isin.len()..];

        let (name, figures) = match clean_name(before) {
            Some(name) => (Some(name), after),
            None => {
                // Name follows the ISIN and runs up to the first figure
                let split = after.find(|c: char| c.is_ascii_digit()).unwrap_or(after.len());
                (clean_name(&after[..split]), &after[split..])
            }
        };

        let amounts: Vec<f64> = NUMBER_TOKEN_RE
            .captures_iter(figures)
            .filter(|caps| caps.name("pct").is_none())
            .filter_map(|caps| parse_number(caps.name("num")?.as_str()))
            .collect();

        let currency = detect_currency(figures).unwrap_or_else(|| self.default_currency.clone());
        let mut security = Security::new(Some(isin.to_string()), name, currency);
        match amounts.as_slice() {
            [] => {}
            [value] => security.value = Some(*value),
            [quantity, value] => {
                security.quantity = Some(*quantity);
                security.value = Some(*value);
            }
            [quantity, price, .., value] => {
                security.quantity = Some(*quantity);
                security.price = Some(*price);
                security.value = Some(*value);
            }
        }
        Some(security)
    }
}

impl EntityExtractor for SecuritiesExtractor {
    type Output = Vec<Security>;

    fn category(&self) -> &'static str {
        "securities"
    }

    fn from_tables(&self, tables: &[Table]) -> Option<Vec<Security>> {
        let securities: Vec<Security> = tables
            .iter()
            .filter(|t| Self::is_securities_table(t))
            .flat_map(|t| self.securities_from_table(t))
            .collect();
        (!securities.is_empty()).then_some(securities)
    }

    fn from_text(&self, text: &str) -> Option<Vec<Security>> {
        let mut securities: Vec<Security> = Vec::new();
        for line in text.lines() {
            let Some(isin) = find_isin(line) else {
                continue;
            };
            if securities.iter().any(|s| s.isin.as_deref() == Some(isin)) {
                tracing::trace!("Duplicate ISIN {} in text, keeping first occurrence", isin);
                continue;
            }
            securities.extend(self.security_from_line(line, isin));
        }
        (!securities.is_empty()).then_some(securities)
    }
}
