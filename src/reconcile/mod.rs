// src/reconcile/mod.rs
//! Cross-checks the extracted categories against each other.
//!
//! Two adjustments are made, both recorded in `ReconciliationAnalysis`:
//! the stated total value may be replaced by the securities sum when that
//! sum is well supported, and allocation percentages are rescaled to 100
//! when they drift outside the tolerance. Securities are never removed.
//!
//! The adjustments are not symmetric: a securities sum may
//! override the stated total, but allocation values are never used to
//! correct it, and an unknown stated total is not filled in from the sum.

use crate::document::{
    AssetAllocation, ExtractionSources, PerformanceMetrics, PortfolioInfo, ReconciledResult,
    ReconciliationAnalysis, Security,
};

/// Thresholds for the trust policy. The defaults are the long-standing values.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileConfig {
    /// Securities with a value needed before the sum is compared at all.
    pub min_securities_for_comparison: usize,
    /// Relative difference above which the stated total is distrusted.
    pub override_relative_difference: f64,
    /// Securities with a value needed before the sum may replace the stated total.
    pub override_min_securities: usize,
    /// Share of all securities that must carry a value for an override.
    pub override_min_coverage: f64,
    /// Allowed distance, in percentage points, of the allocation sum from 100.
    pub allocation_tolerance: f64,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            min_securities_for_comparison: 3,
            override_relative_difference: 0.5,
            override_min_securities: 5,
            override_min_coverage: 0.3,
            allocation_tolerance: 5.0,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReconciliationEngine {
    config: ReconcileConfig,
}

impl ReconciliationEngine {
    pub fn new(config: ReconcileConfig) -> Self {
        Self { config }
    }

    pub fn reconcile(
        &self,
        mut portfolio_info: PortfolioInfo,
        mut asset_allocation: AssetAllocation,
        securities: Vec<Security>,
        performance: PerformanceMetrics,
        sources: ExtractionSources,
    ) -> ReconciledResult {
        let mut analysis = ReconciliationAnalysis {
            stated_total_value: portfolio_info.total_value,
            invalid_isin_count: securities
                .iter()
                .filter(|s| s.isin.is_some() && !s.isin_valid)
                .count(),
            ..ReconciliationAnalysis::default()
        };

        // --- Step 1: securities total ---
        let values: Vec<f64> = securities.iter().filter_map(|s| s.value).collect();
        analysis.securities_total = values.iter().sum();
        analysis.securities_with_value_count = values.len();

        // --- Step 2: stated total vs securities total ---
        self.check_total_value(&mut portfolio_info, securities.len(), &mut analysis);

        // --- Step 3: allocation percentages ---
        analysis.allocation_total = asset_allocation.percentage_sum();
        analysis.allocation_normalized = self.normalize_allocation(&mut asset_allocation, analysis.allocation_total);

        tracing::debug!(
            "Reconciled: securities_total={} ({} valued), allocation_total={}, overridden={}, normalized={}",
            analysis.securities_total,
            analysis.securities_with_value_count,
            analysis.allocation_total,
            analysis.total_value_overridden,
            analysis.allocation_normalized
        );

        ReconciledResult {
            portfolio_info,
            asset_allocation,
            securities,
            performance,
            analysis,
            sources,
        }
    }

    fn check_total_value(
        &self,
        info: &mut PortfolioInfo,
        securities_count: usize,
        analysis: &mut ReconciliationAnalysis,
    ) {
        let valued = analysis.securities_with_value_count;
        if valued < self.config.min_securities_for_comparison {
            return;
        }
        let Some(stated) = info.total_value else {
            return;
        };

        let difference = (analysis.securities_total - stated).abs();
        // A stated total of zero disagrees with any non-zero sum
        let relative = if stated == 0.0 {
            if difference == 0.0 { 0.0 } else { f64::INFINITY }
        } else {
            difference / stated.abs()
        };
        analysis.relative_difference = relative.is_finite().then_some(relative);

        let well_supported = valued >= self.config.override_min_securities
            && valued as f64 >= self.config.override_min_coverage * securities_count as f64;

        if relative > self.config.override_relative_difference && well_supported {
            tracing::info!(
                "Stated total {} differs from securities total {} by {:.1}%, using securities total",
                stated,
                analysis.securities_total,
                relative * 100.0
            );
            info.total_value = Some(analysis.securities_total);
            analysis.total_value_overridden = true;
        } else if relative > self.config.override_relative_difference {
            tracing::debug!(
                "Stated total {} disagrees with securities total {} but only {} of {} securities are valued, keeping stated total",
                stated,
                analysis.securities_total,
                valued,
                securities_count
            );
        }
    }

    /// Rescales percentages to sum to exactly 100 when outside the tolerance.
    fn normalize_allocation(&self, allocation: &mut AssetAllocation, total: f64) -> bool {
        if allocation.categories.is_empty() || total <= 0.0 {
            return false;
        }
        if (total - 100.0).abs() <= self.config.allocation_tolerance {
            return false;
        }
        let factor = 100.0 / total;
        tracing::info!("Allocation percentages sum to {:.2}, rescaling by {:.4}", total, factor);
        for category in allocation.categories.iter_mut() {
            if let Some(pct) = category.percentage.as_mut() {
                *pct *= factor;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::AllocationCategory;

    fn info_with_total(total: Option<f64>) -> PortfolioInfo {
        PortfolioInfo {
            total_value: total,
            ..PortfolioInfo::default()
        }
    }

    fn securities(values: &[Option<f64>]) -> Vec<Security> {
        values
            .iter()
            .enumerate()
            .map(|(i, value)| {
                let mut s = Security::new(None, Some(format!("Security {}", i)), "USD");
                s.value = *value;
                s
            })
            .collect()
    }

    fn allocation(percentages: &[f64]) -> AssetAllocation {
        AssetAllocation::new(
            percentages
                .iter()
                .enumerate()
                .map(|(i, p)| AllocationCategory {
                    name: format!("Class {}", i),
                    percentage: Some(*p),
                    value: None,
                })
                .collect(),
        )
    }

    fn reconcile(info: PortfolioInfo, alloc: AssetAllocation, secs: Vec<Security>) -> ReconciledResult {
        ReconciliationEngine::default().reconcile(
            info,
            alloc,
            secs,
            PerformanceMetrics::default(),
            ExtractionSources::default(),
        )
    }

    #[test]
    fn well_supported_securities_total_overrides_stated_total() {
        let secs = securities(&[Some(20_000.0); 5]);
        let result = reconcile(info_with_total(Some(10_000.0)), AssetAllocation::default(), secs);
        assert_eq!(result.portfolio_info.total_value, Some(100_000.0));
        assert_eq!(result.analysis.securities_total, 100_000.0);
        assert_eq!(result.analysis.securities_with_value_count, 5);
        assert_eq!(result.analysis.stated_total_value, Some(10_000.0));
        assert_eq!(result.analysis.relative_difference, Some(9.0));
        assert!(result.analysis.total_value_overridden);
    }

    #[test]
    fn sparse_securities_do_not_override() {
        let mut values = vec![Some(50_000.0), Some(50_000.0)];
        values.extend(std::iter::repeat(None).take(8));
        let result = reconcile(info_with_total(Some(10_000.0)), AssetAllocation::default(), securities(&values));
        assert_eq!(result.portfolio_info.total_value, Some(10_000.0));
        assert_eq!(result.analysis.securities_with_value_count, 2);
        assert_eq!(result.analysis.relative_difference, None);
        assert!(!result.analysis.total_value_overridden);
        assert_eq!(result.securities.len(), 10);
    }

    #[test]
    fn low_coverage_blocks_override() {
        // 5 valued out of 20 is below the 30% coverage threshold
        let mut values = vec![Some(20_000.0); 5];
        values.extend(std::iter::repeat(None).take(15));
        let result = reconcile(info_with_total(Some(10_000.0)), AssetAllocation::default(), securities(&values));
        assert_eq!(result.portfolio_info.total_value, Some(10_000.0));
        assert!(!result.analysis.total_value_overridden);
        assert_eq!(result.analysis.relative_difference, Some(9.0));
    }

    #[test]
    fn agreeing_totals_are_kept() {
        let secs = securities(&[Some(20_000.0), Some(20_000.0), Some(20_000.0), Some(20_000.0), Some(21_000.0)]);
        let result = reconcile(info_with_total(Some(100_000.0)), AssetAllocation::default(), secs);
        assert_eq!(result.portfolio_info.total_value, Some(100_000.0));
        assert!(!result.analysis.total_value_overridden);
    }

    #[test]
    fn unknown_stated_total_is_not_filled_in() {
        let secs = securities(&[Some(1_000.0); 6]);
        let result = reconcile(info_with_total(None), AssetAllocation::default(), secs);
        assert_eq!(result.portfolio_info.total_value, None);
        assert_eq!(result.analysis.securities_total, 6_000.0);
    }

    #[test]
    fn zero_stated_total_is_overridden() {
        let secs = securities(&[Some(1_000.0); 5]);
        let result = reconcile(info_with_total(Some(0.0)), AssetAllocation::default(), secs);
        assert_eq!(result.portfolio_info.total_value, Some(5_000.0));
        assert_eq!(result.analysis.relative_difference, None);
    }

    #[test]
    fn allocation_within_tolerance_is_unchanged() {
        let result = reconcile(PortfolioInfo::default(), allocation(&[60.0, 30.0, 10.0]), Vec::new());
        let pcts: Vec<f64> = result
            .asset_allocation
            .categories
            .iter()
            .filter_map(|c| c.percentage)
            .collect();
        assert_eq!(pcts, vec![60.0, 30.0, 10.0]);
        assert!(!result.analysis.allocation_normalized);

        let near = reconcile(PortfolioInfo::default(), allocation(&[60.0, 30.0, 13.0]), Vec::new());
        assert!(!near.analysis.allocation_normalized);
        assert_eq!(near.analysis.allocation_total, 103.0);
    }

    #[test]
    fn allocation_outside_tolerance_is_rescaled() {
        let result = reconcile(PortfolioInfo::default(), allocation(&[60.0, 30.0, 30.0]), Vec::new());
        assert!(result.analysis.allocation_normalized);
        assert_eq!(result.analysis.allocation_total, 120.0);
        assert!((result.asset_allocation.percentage_sum() - 100.0).abs() < 0.01);
        assert!((result.asset_allocation.categories[0].percentage.unwrap() - 50.0).abs() < 1e-9);

        let low = reconcile(PortfolioInfo::default(), allocation(&[0.6, 0.3, 0.1]), Vec::new());
        assert!((low.asset_allocation.percentage_sum() - 100.0).abs() < 0.01);
    }

    #[test]
    fn empty_input_degrades_to_defaults() {
        let result = reconcile(PortfolioInfo::default(), AssetAllocation::default(), Vec::new());
        assert_eq!(result.portfolio_info.currency, "USD");
        assert_eq!(result.portfolio_info.total_value, None);
        assert!(result.securities.is_empty());
        assert!(result.asset_allocation.categories.is_empty());
        assert_eq!(result.analysis.securities_total, 0.0);
        assert!(!result.analysis.allocation_normalized);
    }

    #[test]
    fn invalid_isins_are_counted_not_dropped() {
        let mut secs = securities(&[Some(1.0)]);
        secs.push(Security::new(Some("XX12345".into()), Some("Bad Corp".into()), "USD"));
        let result = reconcile(PortfolioInfo::default(), AssetAllocation::default(), secs);
        assert_eq!(result.securities.len(), 2);
        assert_eq!(result.analysis.invalid_isin_count, 1);
    }
}
