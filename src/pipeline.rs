// src/pipeline.rs
//! Per-document orchestration: tables → entity extractors → reconciliation.
//!
//! A `Pipeline` owns no per-document state, so one instance can serve any
//! number of documents concurrently and the same input always yields the
//! same result.

use crate::document::{
    AssetAllocation, ExtractionSource, ExtractionSources, PerformanceMetrics, PortfolioInfo,
    RawDocument, ReconciledResult, Security, Table,
};
use crate::extractors::{
    AssetAllocationExtractor, EntityExtractor, Extracted, PerformanceExtractor,
    PortfolioInfoExtractor, SecuritiesExtractor,
};
use crate::fallback::{ExternalFallbackExtractor, FallbackConfig, TextGenerator};
use crate::reconcile::{ReconcileConfig, ReconciliationEngine};
use crate::tables::{detect_tables, TableStructureExtractor};
use crate::utils::error::ExtractError;
use crate::utils::numbers::DEFAULT_CURRENCY;

/// Everything a pipeline run can be tuned with. Passed in, never global.
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineConfig {
    pub reconcile: ReconcileConfig,
    pub fallback: FallbackConfig,
    /// Currency assumed when the document never states one.
    pub default_currency: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            reconcile: ReconcileConfig::default(),
            fallback: FallbackConfig::default(),
            default_currency: DEFAULT_CURRENCY.to_string(),
        }
    }
}

/// Category results before reconciliation.
struct Categories {
    info: Extracted<PortfolioInfo>,
    allocation: Extracted<AssetAllocation>,
    securities: Extracted<Vec<Security>>,
    performance: Extracted<PerformanceMetrics>,
}

pub struct Pipeline {
    config: PipelineConfig,
    structure: TableStructureExtractor,
    engine: ReconciliationEngine,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let engine = ReconciliationEngine::new(config.reconcile.clone());
        Self {
            config,
            structure: TableStructureExtractor::new(),
            engine,
        }
    }

    /// Supplied tables are trusted as-is; otherwise tables are detected in the text.
    pub fn structural_tables(&self, doc: &RawDocument) -> Vec<Table> {
        if !doc.tables.is_empty() {
            tracing::debug!("Using {} supplied table(s)", doc.tables.len());
            return doc.tables.clone();
        }
        let tables: Vec<Table> = detect_tables(&doc.text, &self.structure)
            .into_iter()
            .map(|(_, table)| table)
            .collect();
        tracing::debug!("Detected {} table(s) in text", tables.len());
        tables
    }

    /// Structural extraction only: table and text passes, then reconciliation.
    pub fn run(&self, doc: &RawDocument) -> Result<ReconciledResult, ExtractError> {
        if doc.is_empty() {
            return Err(ExtractError::NoData);
        }
        let tables = self.structural_tables(doc);
        let categories = self.extract_categories(&doc.text, &tables, false);
        Ok(self.finish(categories))
    }

    /// Like `run`, with the external generator as a third pass when enabled.
    ///
    /// The generator is asked for tables only when none were supplied or
    /// detected, and for securities only when no structural pass found any.
    pub async fn run_with_fallback<G: TextGenerator>(
        &self,
        doc: &RawDocument,
        generator: &G,
    ) -> Result<ReconciledResult, ExtractError> {
        if !self.config.fallback.enabled || doc.text.trim().is_empty() {
            return self.run(doc);
        }

        let fallback = ExternalFallbackExtractor::new(
            generator,
            &self.config.fallback,
            self.config.default_currency.clone(),
        );

        let mut tables = self.structural_tables(doc);
        let mut tables_external = false;
        if tables.is_empty() {
            tracing::info!("No tables found structurally, asking external generator");
            let generated = fallback.extract_tables(&doc.text).await;
            if !generated.is_empty() {
                tables = generated;
                tables_external = true;
            }
        }

        let mut categories = self.extract_categories(&doc.text, &tables, tables_external);

        if !categories.securities.is_found() {
            tracing::info!("No securities found structurally, asking external generator");
            let securities = fallback.extract_securities(&doc.text).await;
            if !securities.is_empty() {
                categories.securities = Extracted {
                    value: securities,
                    source: ExtractionSource::External,
                };
            }
        }

        Ok(self.finish(categories))
    }

    fn extract_categories(&self, text: &str, tables: &[Table], tables_external: bool) -> Categories {
        // Portfolio info first: its currency is the default for holdings
        let info = PortfolioInfoExtractor::new(self.config.default_currency.clone()).extract(text, tables);
        let allocation = AssetAllocationExtractor::new().extract(text, tables);
        let securities = SecuritiesExtractor::new(info.value.currency.clone()).extract(text, tables);
        let performance = PerformanceExtractor::new().extract(text, tables);

        let mut categories = Categories {
            info,
            allocation,
            securities,
            performance,
        };
        if tables_external {
            retag_external(&mut categories.info.source);
            retag_external(&mut categories.allocation.source);
            retag_external(&mut categories.securities.source);
            retag_external(&mut categories.performance.source);
        }
        categories
    }

    fn finish(&self, categories: Categories) -> ReconciledResult {
        let sources = ExtractionSources {
            portfolio_info: categories.info.source,
            asset_allocation: categories.allocation.source,
            securities: categories.securities.source,
            performance: categories.performance.source,
        };
        tracing::info!(
            "Extracted {} securities, {} allocation categories (sources: {:?})",
            categories.securities.value.len(),
            categories.allocation.value.categories.len(),
            sources
        );
        self.engine.reconcile(
            categories.info.value,
            categories.allocation.value,
            categories.securities.value,
            categories.performance.value,
            sources,
        )
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new(PipelineConfig::default())
    }
}

/// Categories read from generated tables are credited to the generator.
fn retag_external(source: &mut ExtractionSource) {
    if *source == ExtractionSource::Table {
        *source = ExtractionSource::External;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::error::FallbackError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const STATEMENT: &str = "\
Quarterly Portfolio Statement
Client: Jane Doe
Valuation Date: 2024-03-31
Total Portfolio Value: $1,250,000

Asset Allocation
Asset Class   | Allocation | Value
Stocks        | 60%        | 750,000
Bonds         | 30%        | 375,000
Cash          | 10%        | 125,000

Holdings
ISIN          | Name           | Quantity | Price    | Value     | Currency
US0378331005  | Apple Inc.     | 100      | 190.50   | 19,050.00 | USD
";

    /// Answers table prompts and securities prompts with fixed replies.
    struct Scripted {
        tables: String,
        securities: String,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn new(tables: &str, securities: &str) -> Self {
            Self {
                tables: tables.to_string(),
                securities: securities.to_string(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl TextGenerator for Scripted {
        async fn generate(&self, prompt: &str) -> Result<String, FallbackError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if prompt.contains("\"securities\"") {
                Ok(self.securities.clone())
            } else {
                Ok(self.tables.clone())
            }
        }
    }

    fn fallback_pipeline() -> Pipeline {
        Pipeline::new(PipelineConfig {
            fallback: FallbackConfig {
                enabled: true,
                ..FallbackConfig::default()
            },
            ..PipelineConfig::default()
        })
    }

    #[test]
    fn empty_document_is_no_data() {
        let result = Pipeline::default().run(&RawDocument::from_text("   \n"));
        assert!(matches!(result, Err(ExtractError::NoData)));
    }

    #[test]
    fn extracts_full_statement() {
        let result = Pipeline::default()
            .run(&RawDocument::from_text(STATEMENT))
            .unwrap();

        assert_eq!(result.portfolio_info.title, "Quarterly Portfolio Statement");
        assert_eq!(result.portfolio_info.owner, "Jane Doe");
        assert_eq!(result.portfolio_info.total_value, Some(1_250_000.0));
        assert_eq!(result.portfolio_info.currency, "USD");

        assert_eq!(result.securities.len(), 1);
        let apple = &result.securities[0];
        assert_eq!(apple.isin.as_deref(), Some("US0378331005"));
        assert_eq!(apple.name.as_deref(), Some("Apple Inc."));
        assert_eq!(apple.quantity, Some(100.0));
        assert_eq!(apple.price, Some(190.50));
        assert_eq!(apple.value, Some(19_050.0));
        assert_eq!(apple.currency, "USD");

        let names: Vec<&str> = result
            .asset_allocation
            .categories
            .iter()
            .map(|c| c.name.as_str())
            .collect();
        assert_eq!(names, vec!["Stocks", "Bonds", "Cash"]);
        assert!(!result.analysis.allocation_normalized);
        assert!((result.asset_allocation.percentage_sum() - 100.0).abs() < 1e-9);

        assert_eq!(result.sources.securities, ExtractionSource::Table);
        assert_eq!(result.sources.asset_allocation, ExtractionSource::Table);
        assert_eq!(result.sources.performance, ExtractionSource::None);
        // Only one valued holding: no comparison against the stated total
        assert!(!result.analysis.total_value_overridden);
    }

    #[test]
    fn running_twice_gives_identical_results() {
        let pipeline = Pipeline::default();
        let doc = RawDocument::from_text(STATEMENT);
        assert_eq!(pipeline.run(&doc).unwrap(), pipeline.run(&doc).unwrap());
    }

    #[test]
    fn supplied_tables_are_used_instead_of_detection() {
        let doc = RawDocument {
            text: STATEMENT.to_string(),
            tables: vec![Table::new(
                "Positions",
                vec!["ISIN".into(), "Name".into(), "Value".into()],
                vec![vec!["DE0007164600".into(), "SAP SE".into(), "1,800".into()]],
            )],
        };
        let result = Pipeline::default().run(&doc).unwrap();
        assert_eq!(result.securities.len(), 1);
        assert_eq!(result.securities[0].name.as_deref(), Some("SAP SE"));
        // Allocation is no longer in any table; the text pass cannot read the pipe rows
        assert_eq!(result.sources.asset_allocation, ExtractionSource::None);
    }

    #[test]
    fn disabled_fallback_never_calls_generator() {
        let generator = Scripted::new("{\"tables\": []}", "{\"securities\": []}");
        let doc = RawDocument::from_text("nothing tabular here\njust prose about markets");
        let result = tokio_test::block_on(Pipeline::default().run_with_fallback(&doc, &generator)).unwrap();
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
        assert!(result.securities.is_empty());
    }

    #[test]
    fn fallback_supplies_missing_securities() {
        let generator = Scripted::new(
            "{\"tables\": []}",
            "{\"securities\": [{\"isin\": \"US0378331005\", \"name\": \"Apple Inc.\", \"value\": 19050}]}",
        );
        let doc = RawDocument::from_text("nothing tabular here\njust prose about markets");
        let result = tokio_test::block_on(fallback_pipeline().run_with_fallback(&doc, &generator)).unwrap();
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
        assert_eq!(result.securities.len(), 1);
        assert_eq!(result.securities[0].value, Some(19_050.0));
        assert_eq!(result.sources.securities, ExtractionSource::External);
    }

    #[test]
    fn generated_tables_feed_the_extractors() {
        let generator = Scripted::new(
            r#"{"tables": [{"title": "Holdings", "headers": ["ISIN", "Name", "Value"], "rows": [["US0378331005", "Apple Inc.", "19050"]]}]}"#,
            "{\"securities\": []}",
        );
        let doc = RawDocument::from_text("nothing tabular here\njust prose about markets");
        let result = tokio_test::block_on(fallback_pipeline().run_with_fallback(&doc, &generator)).unwrap();
        // Securities came from the generated table, so no second call
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.securities[0].name.as_deref(), Some("Apple Inc."));
        assert_eq!(result.sources.securities, ExtractionSource::External);
    }

    #[test]
    fn malformed_generator_replies_leave_categories_empty() {
        let generator = Scripted::new("not json at all", "```json\n{\"securities\": \n```");
        let doc = RawDocument::from_text("nothing tabular here\njust prose about markets");
        let result = tokio_test::block_on(fallback_pipeline().run_with_fallback(&doc, &generator)).unwrap();
        assert!(result.securities.is_empty());
        assert_eq!(result.sources.securities, ExtractionSource::None);
        assert_eq!(result.portfolio_info.currency, "USD");
    }

    #[test]
    fn structural_hits_skip_the_generator() {
        let generator = Scripted::new("{\"tables\": []}", "{\"securities\": []}");
        let doc = RawDocument::from_text(STATEMENT);
        let result = tokio_test::block_on(fallback_pipeline().run_with_fallback(&doc, &generator)).unwrap();
        assert_eq!(generator.calls.load(Ordering::SeqCst), 0);
        assert_eq!(result, Pipeline::default().run(&doc).unwrap());
    }
}
