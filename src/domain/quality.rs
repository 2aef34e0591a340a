//! Data-quality eligibility: per-asset coverage checks and the
//! portfolio-level breadth hard gate.

use crate::domain::assets::AssetUniverse;
use crate::domain::config::StrategyConfig;
use crate::domain::timeseries::Panel;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use std::collections::BTreeMap;

/// Consumed by the engine before a run. The hard gate is portfolio-level
/// breadth integrity; ineligible names are excluded from trading either way.
#[derive(Debug, Clone, Serialize)]
pub struct QualityReport {
    pub hard_pass: bool,
    pub eligible_assets: Vec<String>,
    pub eligible_categories: usize,
    pub max_category_share: f64,
    /// Excluded assets with the failing measurement.
    pub exclusions: BTreeMap<String, String>,
}

impl QualityReport {
    /// Reason string used when strict mode refuses to run.
    pub fn gate_reason(&self) -> String {
        format!(
            "breadth gate: {} eligible assets in {} categories, max share {:.2}",
            self.eligible_assets.len(),
            self.eligible_categories,
            self.max_category_share
        )
    }
}

/// Measure per-asset coverage on both panels and apply the breadth gate.
pub fn build_quality_report(
    daily_closes: &Panel<NaiveDate>,
    intraday_closes: &Panel<NaiveDateTime>,
    universe: &AssetUniverse,
    cfg: &StrategyConfig,
) -> QualityReport {
    let mut eligible_assets: Vec<String> = Vec::new();
    let mut exclusions: BTreeMap<String, String> = BTreeMap::new();

    for (col, asset) in daily_closes.assets().iter().enumerate() {
        if !universe.contains(asset) {
            exclusions.insert(asset.clone(), "not in universe".to_string());
            continue;
        }
        let daily_cov = daily_closes.coverage(col);
        if daily_cov < cfg.quality_min_coverage {
            exclusions.insert(asset.clone(), format!("daily_coverage={daily_cov:.3}"));
            continue;
        }
        if let Some(intraday_col) = intraday_closes.col_of(asset) {
            let intraday_cov = intraday_closes.coverage(intraday_col);
            if intraday_cov < cfg.quality_min_coverage {
                exclusions.insert(asset.clone(), format!("intraday_coverage={intraday_cov:.3}"));
                continue;
            }
        } else {
            exclusions.insert(asset.clone(), "no intraday bars".to_string());
            continue;
        }
        eligible_assets.push(asset.clone());
    }

    let mut class_counts: BTreeMap<&str, usize> = BTreeMap::new();
    for asset in &eligible_assets {
        *class_counts.entry(universe.category(asset)).or_insert(0) += 1;
    }
    let eligible_total = eligible_assets.len();
    let max_category_share = if eligible_total == 0 {
        1.0
    } else {
        class_counts.values().copied().max().unwrap_or(0) as f64 / eligible_total as f64
    };

    let hard_pass = eligible_total >= cfg.breadth_min_active_assets
        && class_counts.len() >= cfg.breadth_min_categories
        && max_category_share <= cfg.breadth_max_category_share;

    QualityReport {
        hard_pass,
        eligible_assets,
        eligible_categories: class_counts.len(),
        max_category_share,
        exclusions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn cfg() -> StrategyConfig {
        StrategyConfig::default()
    }

    fn daily_panel(assets: &[&str], nrows: usize) -> Panel<NaiveDate> {
        let index: Vec<NaiveDate> = (0..nrows)
            .map(|i| NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64))
            .collect();
        let mut p = Panel::new(index, assets.iter().map(|s| s.to_string()).collect());
        for row in 0..nrows {
            for col in 0..assets.len() {
                p.set(row, col, 100.0);
            }
        }
        p
    }

    fn intraday_panel(assets: &[&str], nrows: usize) -> Panel<NaiveDateTime> {
        let base = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let index: Vec<NaiveDateTime> = (0..nrows)
            .map(|i| base + chrono::Duration::hours(4 * i as i64))
            .collect();
        let mut p = Panel::new(index, assets.iter().map(|s| s.to_string()).collect());
        for row in 0..nrows {
            for col in 0..assets.len() {
                p.set(row, col, 100.0);
            }
        }
        p
    }

    const FULL: [&str; 8] = [
        "TSLA", "NVDA", "GOOG", "EURUSD", "AUDUSD", "GOLD", "SILVER", "BTC",
    ];

    #[test]
    fn full_coverage_passes_the_gate() {
        let universe = AssetUniverse::default_universe();
        let daily = daily_panel(&FULL, 50);
        let intraday = intraday_panel(&FULL, 100);
        let report = build_quality_report(&daily, &intraday, &universe, &cfg());
        assert!(report.hard_pass);
        assert_eq!(report.eligible_assets.len(), 8);
        assert!(report.exclusions.is_empty());
        assert!(report.eligible_categories >= 2);
    }

    #[test]
    fn sparse_asset_is_excluded_with_reason() {
        let universe = AssetUniverse::default_universe();
        let mut daily = daily_panel(&FULL, 50);
        let col = daily.col_of("BTC").unwrap();
        for row in 0..20 {
            daily.set(row, col, f64::NAN); // 60% coverage < 90% threshold
        }
        let intraday = intraday_panel(&FULL, 100);
        let report = build_quality_report(&daily, &intraday, &universe, &cfg());
        assert!(!report.eligible_assets.contains(&"BTC".to_string()));
        assert!(report.exclusions.get("BTC").unwrap().starts_with("daily_coverage"));
    }

    #[test]
    fn missing_intraday_bars_exclude_the_asset() {
        let universe = AssetUniverse::default_universe();
        let daily = daily_panel(&FULL, 50);
        let intraday = intraday_panel(&FULL[..7], 100); // BTC has no intraday
        let report = build_quality_report(&daily, &intraday, &universe, &cfg());
        assert_eq!(
            report.exclusions.get("BTC").map(String::as_str),
            Some("no intraday bars")
        );
    }

    #[test]
    fn concentrated_universe_fails_breadth() {
        let universe = AssetUniverse::default_universe();
        let stocks = ["TSLA", "NVDA", "GOOG", "MCD", "SPY", "EURUSD"];
        let daily = daily_panel(&stocks, 50);
        let intraday = intraday_panel(&stocks, 100);
        let report = build_quality_report(&daily, &intraday, &universe, &cfg());
        // five of six eligible names are stocks: share over 0.60
        assert!(!report.hard_pass);
        assert!(report.max_category_share > cfg().breadth_max_category_share);
    }

    #[test]
    fn too_few_assets_fail_breadth() {
        let universe = AssetUniverse::default_universe();
        let few = ["TSLA", "GOLD", "BTC"];
        let daily = daily_panel(&few, 50);
        let intraday = intraday_panel(&few, 100);
        let report = build_quality_report(&daily, &intraday, &universe, &cfg());
        assert!(!report.hard_pass);
        assert_eq!(report.eligible_assets.len(), 3);
    }
}
