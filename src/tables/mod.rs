// src/tables/mod.rs
pub mod region;
pub mod structure;

use crate::document::{Table, TableRegion};

pub use region::TableRegionDetector;
pub use structure::{
    AggressiveStrategy, DelimitedStrategy, ExtractionStrategy, FixedWidthStrategy,
    SpaceSeparatedStrategy, TableStructureExtractor,
};

/// Detects regions in `text` and turns each one into a table where a strategy succeeds.
/// Regions no strategy can split are skipped.
pub fn detect_tables(text: &str, extractor: &TableStructureExtractor) -> Vec<(TableRegion, Table)> {
    let detector = TableRegionDetector::new(text);
    detector
        .regions()
        .filter_map(|region| {
            let lines = detector.region_lines(&region);
            extractor
                .extract(&region.title, lines)
                .map(|table| (region, table))
        })
        .collect()
}
