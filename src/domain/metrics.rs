//! Performance summaries over daily net-return series.

use serde::Serialize;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Headline statistics for one return stream (a full run or a regime
/// slice). Undefined values (no bars, zero vol) serialize as null.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryStats {
    pub bars: usize,
    pub total_return_pct: Option<f64>,
    pub annualized_return_pct: Option<f64>,
    pub annualized_vol_pct: Option<f64>,
    pub sharpe: Option<f64>,
    pub max_drawdown_pct: Option<f64>,
}

impl SummaryStats {
    pub fn empty() -> Self {
        SummaryStats {
            bars: 0,
            total_return_pct: None,
            annualized_return_pct: None,
            annualized_vol_pct: None,
            sharpe: None,
            max_drawdown_pct: None,
        }
    }
}

/// Compound a daily return stream into summary statistics. Non-finite
/// entries are skipped rather than poisoning the compounding.
pub fn summarize_returns(returns: &[f64]) -> SummaryStats {
    let clean: Vec<f64> = returns.iter().copied().filter(|r| r.is_finite()).collect();
    if clean.is_empty() {
        return SummaryStats::empty();
    }

    let n = clean.len() as f64;
    let total = clean.iter().fold(1.0, |acc, r| acc * (1.0 + r)) - 1.0;
    let annualized = if total > -1.0 {
        Some(((1.0 + total).powf(TRADING_DAYS_PER_YEAR / n) - 1.0) * 100.0)
    } else {
        None
    };

    let mean = clean.iter().sum::<f64>() / n;
    let variance = clean.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n;
    let stddev = variance.sqrt();
    let ann_vol = stddev * TRADING_DAYS_PER_YEAR.sqrt();
    let sharpe = if stddev > 0.0 {
        Some(mean / stddev * TRADING_DAYS_PER_YEAR.sqrt())
    } else {
        None
    };

    SummaryStats {
        bars: clean.len(),
        total_return_pct: Some(total * 100.0),
        annualized_return_pct: annualized,
        annualized_vol_pct: Some(ann_vol * 100.0),
        sharpe,
        max_drawdown_pct: Some(max_drawdown(&clean) * 100.0),
    }
}

/// Worst peak-to-trough loss of the compounded curve, as a negative
/// fraction (0.0 for a curve that never retreats).
pub fn max_drawdown(returns: &[f64]) -> f64 {
    let mut equity = 1.0;
    let mut peak = 1.0;
    let mut worst = 0.0_f64;
    for r in returns {
        if !r.is_finite() {
            continue;
        }
        equity *= 1.0 + r;
        if equity > peak {
            peak = equity;
        } else if peak > 0.0 {
            worst = worst.min(equity / peak - 1.0);
        }
    }
    worst
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn empty_series_yields_no_stats() {
        let stats = summarize_returns(&[]);
        assert_eq!(stats.bars, 0);
        assert!(stats.total_return_pct.is_none());
        assert!(stats.sharpe.is_none());
    }

    #[test]
    fn total_return_compounds() {
        let stats = summarize_returns(&[0.10, -0.05]);
        assert_eq!(stats.bars, 2);
        assert_relative_eq!(stats.total_return_pct.unwrap(), 4.5, max_relative = 1e-9);
    }

    #[test]
    fn constant_returns_have_no_sharpe() {
        let stats = summarize_returns(&[0.001; 30]);
        assert!(stats.sharpe.is_none());
        assert_relative_eq!(stats.annualized_vol_pct.unwrap(), 0.0);
    }

    #[test]
    fn annualization_inverts_a_full_year() {
        // 252 bars of 0.1% compound to the annualized figure exactly
        let stats = summarize_returns(&[0.001; 252]);
        let total = 1.001_f64.powi(252) - 1.0;
        assert_relative_eq!(
            stats.annualized_return_pct.unwrap(),
            total * 100.0,
            max_relative = 1e-9
        );
    }

    #[test]
    fn sharpe_sign_follows_the_mean() {
        let up = summarize_returns(&[0.002, 0.001, 0.003, 0.001]);
        assert!(up.sharpe.unwrap() > 0.0);
        let down = summarize_returns(&[-0.002, -0.001, -0.003, -0.001]);
        assert!(down.sharpe.unwrap() < 0.0);
    }

    #[test]
    fn drawdown_finds_the_worst_trough() {
        // 1.0 -> 1.10 -> 0.88 -> 0.924
        let dd = max_drawdown(&[0.10, -0.20, 0.05]);
        assert_relative_eq!(dd, -0.20, max_relative = 1e-9);
    }

    #[test]
    fn monotone_curve_has_zero_drawdown() {
        assert_eq!(max_drawdown(&[0.01, 0.02, 0.0, 0.005]), 0.0);
    }

    #[test]
    fn nan_entries_are_skipped() {
        let stats = summarize_returns(&[0.01, f64::NAN, 0.01]);
        assert_eq!(stats.bars, 2);
        assert_relative_eq!(
            stats.total_return_pct.unwrap(),
            (1.01_f64 * 1.01 - 1.0) * 100.0,
            max_relative = 1e-9
        );
    }

    #[test]
    fn stats_serialize_null_for_undefined_fields() {
        let json = serde_json::to_string(&SummaryStats::empty()).unwrap();
        assert!(json.contains("\"sharpe\":null"));
    }
}
