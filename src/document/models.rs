// src/document/models.rs
use serde::{Deserialize, Serialize};

use crate::utils::numbers::{is_valid_isin, DEFAULT_CURRENCY};

/// Input document: extracted text plus any tables an upstream OCR/table tool produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDocument {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub tables: Vec<Table>,
}

impl RawDocument {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tables: Vec::new(),
        }
    }

    /// True when there is nothing to extract from at all.
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty() && self.tables.is_empty()
    }
}

/// A typed table. Every row has exactly `headers.len()` cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Table {
    pub title: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    /// Builds a table, padding short rows with empty cells and truncating long ones.
    pub fn new(title: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        let width = headers.len();
        let rows = rows
            .into_iter()
            .map(|mut row| {
                row.resize(width, String::new());
                row
            })
            .collect();
        Self {
            title: title.into(),
            headers,
            rows,
        }
    }

    /// Index of the first header containing any of `keywords` (case-insensitive),
    /// skipping columns already claimed by another field.
    pub fn find_column(&self, keywords: &[&str], claimed: &[usize]) -> Option<usize> {
        // Keyword order is priority order: "market value" before "value"
        keywords.iter().find_map(|keyword| {
            self.headers.iter().enumerate().find_map(|(idx, header)| {
                let header = header.to_lowercase();
                (!claimed.contains(&idx) && header.contains(keyword)).then_some(idx)
            })
        })
    }

    pub fn headers_contain(&self, keyword: &str) -> bool {
        self.headers
            .iter()
            .any(|h| h.to_lowercase().contains(keyword))
    }

    pub fn title_contains(&self, keyword: &str) -> bool {
        self.title.to_lowercase().contains(keyword)
    }
}

// Supplied tables are trusted, but the row-width invariant is cheap to keep.
impl<'de> Deserialize<'de> for Table {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct RawTable {
            #[serde(default)]
            title: String,
            headers: Vec<String>,
            #[serde(default)]
            rows: Vec<Vec<String>>,
        }

        let raw = RawTable::deserialize(deserializer)?;
        Ok(Table::new(raw.title, raw.headers, raw.rows))
    }
}

/// Candidate table location inside the document text (0-based, inclusive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRegion {
    pub start_line: usize,
    pub end_line: usize,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortfolioInfo {
    pub title: String,
    pub date: String,
    pub total_value: Option<f64>,
    pub currency: String,
    pub owner: String,
    pub manager: String,
    pub account_number: String,
    pub custodian: String,
    pub benchmark: String,
    pub strategy: String,
}

impl Default for PortfolioInfo {
    fn default() -> Self {
        Self {
            title: String::new(),
            date: String::new(),
            total_value: None,
            currency: DEFAULT_CURRENCY.to_string(),
            owner: String::new(),
            manager: String::new(),
            account_number: String::new(),
            custodian: String::new(),
            benchmark: String::new(),
            strategy: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllocationCategory {
    pub name: String,
    pub percentage: Option<f64>,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetAllocation {
    pub categories: Vec<AllocationCategory>,
    /// Sum of the known category values.
    pub total: f64,
}

impl AssetAllocation {
    pub fn new(categories: Vec<AllocationCategory>) -> Self {
        let total = categories.iter().filter_map(|c| c.value).sum();
        Self { categories, total }
    }

    pub fn percentage_sum(&self) -> f64 {
        self.categories.iter().filter_map(|c| c.percentage).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Security {
    pub isin: Option<String>,
    /// False when `isin` is present but not ISIN-shaped. Such entries are kept.
    pub isin_valid: bool,
    pub name: Option<String>,
    pub quantity: Option<f64>,
    pub price: Option<f64>,
    pub value: Option<f64>,
    pub currency: String,
}

impl Security {
    pub fn new(isin: Option<String>, name: Option<String>, currency: impl Into<String>) -> Self {
        let isin = isin
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        let isin_valid = isin.as_deref().map(is_valid_isin).unwrap_or(false);
        if let Some(code) = isin.as_deref().filter(|_| !isin_valid) {
            tracing::debug!("Retaining security with malformed ISIN '{}'", code);
        }
        Self {
            isin,
            isin_valid,
            name: name.map(|s| s.trim().to_string()).filter(|s| !s.is_empty()),
            quantity: None,
            price: None,
            value: None,
            currency: currency.into(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceMetrics {
    pub ytd: Option<f64>,
    pub one_month: Option<f64>,
    pub three_month: Option<f64>,
    pub six_month: Option<f64>,
    pub one_year: Option<f64>,
    pub three_year: Option<f64>,
    pub five_year: Option<f64>,
    pub ten_year: Option<f64>,
    pub since_inception: Option<f64>,
}

/// Reporting periods a performance figure can belong to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Period {
    Ytd,
    OneMonth,
    ThreeMonth,
    SixMonth,
    OneYear,
    ThreeYear,
    FiveYear,
    TenYear,
    SinceInception,
}

impl PerformanceMetrics {
    pub fn get(&self, period: Period) -> Option<f64> {
        match period {
            Period::Ytd => self.ytd,
            Period::OneMonth => self.one_month,
            Period::ThreeMonth => self.three_month,
            Period::SixMonth => self.six_month,
            Period::OneYear => self.one_year,
            Period::ThreeYear => self.three_year,
            Period::FiveYear => self.five_year,
            Period::TenYear => self.ten_year,
            Period::SinceInception => self.since_inception,
        }
    }

    fn slot(&mut self, period: Period) -> &mut Option<f64> {
        match period {
            Period::Ytd => &mut self.ytd,
            Period::OneMonth => &mut self.one_month,
            Period::ThreeMonth => &mut self.three_month,
            Period::SixMonth => &mut self.six_month,
            Period::OneYear => &mut self.one_year,
            Period::ThreeYear => &mut self.three_year,
            Period::FiveYear => &mut self.five_year,
            Period::TenYear => &mut self.ten_year,
            Period::SinceInception => &mut self.since_inception,
        }
    }

    /// Sets a period only once; the first figure found wins.
    pub fn set_if_empty(&mut self, period: Period, value: f64) {
        let slot = self.slot(period);
        if slot.is_none() {
            *slot = Some(value);
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Which pass produced a category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionSource {
    Table,
    Text,
    External,
    #[default]
    None,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionSources {
    pub portfolio_info: ExtractionSource,
    pub asset_allocation: ExtractionSource,
    pub securities: ExtractionSource,
    pub performance: ExtractionSource,
}

/// Raw figures behind the reconciliation decisions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciliationAnalysis {
    pub securities_total: f64,
    pub securities_with_value_count: usize,
    pub allocation_total: f64,
    pub stated_total_value: Option<f64>,
    pub relative_difference: Option<f64>,
    pub total_value_overridden: bool,
    pub allocation_normalized: bool,
    pub invalid_isin_count: usize,
}

/// Final, cross-validated record for one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconciledResult {
    pub portfolio_info: PortfolioInfo,
    pub asset_allocation: AssetAllocation,
    pub securities: Vec<Security>,
    pub performance: PerformanceMetrics,
    pub analysis: ReconciliationAnalysis,
    pub sources: ExtractionSources,
}
