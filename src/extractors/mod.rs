// src/extractors/mod.rs
//! Entity extractors. Every category is found table-first, text-second;
//! the external fallback (see `crate::fallback`) is layered on by the pipeline.

pub mod allocation;
pub mod performance;
pub mod portfolio;
pub mod securities;

use crate::document::{ExtractionSource, Table};
use once_cell::sync::Lazy;
use regex::Regex;

static TOTAL_LABEL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\s*(?:grand\s+|sub-?)?total\b").expect("Failed to compile TOTAL_LABEL_RE")
});

pub use allocation::AssetAllocationExtractor;
pub use performance::PerformanceExtractor;
pub use portfolio::PortfolioInfoExtractor;
pub use securities::SecuritiesExtractor;

/// A category value together with the pass that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Extracted<T> {
    pub value: T,
    pub source: ExtractionSource,
}

impl<T: Default> Extracted<T> {
    pub fn missing() -> Self {
        Self {
            value: T::default(),
            source: ExtractionSource::None,
        }
    }

    pub fn is_found(&self) -> bool {
        self.source != ExtractionSource::None
    }
}

/// Shared shape of the four extractors: ordered passes, each either finding
/// the category or handing over to the next one.
pub trait EntityExtractor {
    type Output: Default;

    fn category(&self) -> &'static str;

    fn from_tables(&self, tables: &[Table]) -> Option<Self::Output>;

    fn from_text(&self, text: &str) -> Option<Self::Output>;

    /// Runs the passes in priority order and stops at the first hit.
    fn extract(&self, text: &str, tables: &[Table]) -> Extracted<Self::Output> {
        if let Some(value) = self.from_tables(tables) {
            tracing::debug!("{} found in tables", self.category());
            return Extracted {
                value,
                source: ExtractionSource::Table,
            };
        }
        if let Some(value) = self.from_text(text) {
            tracing::debug!("{} found in text", self.category());
            return Extracted {
                value,
                source: ExtractionSource::Text,
            };
        }
        tracing::debug!("{} not found by structural passes", self.category());
        Extracted::missing()
    }
}

/// "Total", "Subtotal", "Grand total" rows summarise other rows.
pub(crate) fn is_total_label(label: &str) -> bool {
    TOTAL_LABEL_RE.is_match(label)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        table: Option<u32>,
        text: Option<u32>,
    }

    impl EntityExtractor for Fixed {
        type Output = u32;

        fn category(&self) -> &'static str {
            "fixed"
        }

        fn from_tables(&self, _tables: &[Table]) -> Option<u32> {
            self.table
        }

        fn from_text(&self, _text: &str) -> Option<u32> {
            self.text
        }
    }

    #[test]
    fn table_pass_short_circuits_text_pass() {
        let hit = Fixed { table: Some(1), text: Some(2) }.extract("", &[]);
        assert_eq!(hit.value, 1);
        assert_eq!(hit.source, ExtractionSource::Table);
    }

    #[test]
    fn text_pass_runs_when_tables_find_nothing() {
        let hit = Fixed { table: None, text: Some(2) }.extract("", &[]);
        assert_eq!(hit.value, 2);
        assert_eq!(hit.source, ExtractionSource::Text);
    }

    #[test]
    fn nothing_found_yields_default() {
        let miss = Fixed { table: None, text: None }.extract("", &[]);
        assert_eq!(miss.value, 0);
        assert!(!miss.is_found());
    }

    #[test]
    fn total_rows_are_recognised() {
        assert!(is_total_label("Total"));
        assert!(is_total_label("  Subtotal equities"));
        assert!(!is_total_label("TotalEnergies SE"));
        assert!(!is_total_label("Apple Inc."));
    }
}
