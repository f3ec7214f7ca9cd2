// src/lib.rs
//! Extraction of structured facts from financial portfolio statements.
//!
//! Raw statement text (plus any tables an upstream tool already produced)
//! goes through table detection, four entity extractors and a
//! reconciliation step that cross-checks the extracted figures. See
//! [`Pipeline`] for the entry point.

pub mod document;
pub mod extractors;
pub mod fallback;
pub mod pipeline;
pub mod reconcile;
pub mod storage;
pub mod tables;
pub mod utils;

pub use document::{RawDocument, ReconciledResult, Table, TableRegion};
pub use fallback::{FallbackConfig, HttpTextGenerator, TextGenerator};
pub use pipeline::{Pipeline, PipelineConfig};
pub use reconcile::{ReconcileConfig, ReconciliationEngine};
