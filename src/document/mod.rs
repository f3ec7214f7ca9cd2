// src/document/mod.rs
pub mod models;

pub use models::{
    AllocationCategory, AssetAllocation, ExtractionSource, ExtractionSources, PerformanceMetrics,
    Period, PortfolioInfo, RawDocument, ReconciledResult, ReconciliationAnalysis, Security, Table,
    TableRegion,
};
