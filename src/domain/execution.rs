//! Staged intraday execution simulator.
//!
//! Each requested weight delta is worked across the first few intraday bars
//! of its execution day. Per bar the local microstructure (EMA trend
//! alignment, pullback proximity, one-bar liquidity) is scored into a
//! quality bucket that sets the fill ratio and slippage charge.

use crate::domain::config::StrategyConfig;
use crate::domain::timeseries::Panel;
use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;

/// Fill-quality bucket for one execution window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityBucket {
    High,
    Medium,
    Low,
}

impl QualityBucket {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityBucket::High => "high",
            QualityBucket::Medium => "medium",
            QualityBucket::Low => "low",
        }
    }

    fn fill_ratio(&self) -> f64 {
        match self {
            QualityBucket::High => 1.0,
            QualityBucket::Medium => 0.5,
            QualityBucket::Low => 0.0,
        }
    }

    fn slippage_bps(&self, cfg: &StrategyConfig) -> f64 {
        match self {
            QualityBucket::High => cfg.slippage_bps_high,
            QualityBucket::Medium => cfg.slippage_bps_medium,
            QualityBucket::Low => cfg.slippage_bps_low,
        }
    }
}

/// Final classification of one order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDecision {
    Execute,
    Defer,
    Cancel,
}

/// Why an order ended the way it did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderReason {
    Filled,
    PartialFill,
    QualityReject,
    NetEdge,
    NoWindow,
}

/// One order's audit record.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionLog {
    pub asset: String,
    pub decision: OrderDecision,
    pub reason: OrderReason,
    pub requested_delta: f64,
    pub filled_delta: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<f64>,
}

/// Aggregated counts and slippage samples for one slice.
#[derive(Debug, Clone, Default)]
pub struct ExecutionStats {
    pub executed: usize,
    pub deferred: usize,
    pub canceled: usize,
    pub bucket_counts: [usize; 3], // high, medium, low
    pub slippage_samples: [Vec<f64>; 3],
}

impl ExecutionStats {
    pub fn merge(&mut self, other: &ExecutionStats) {
        self.executed += other.executed;
        self.deferred += other.deferred;
        self.canceled += other.canceled;
        for i in 0..3 {
            self.bucket_counts[i] += other.bucket_counts[i];
            self.slippage_samples[i].extend_from_slice(&other.slippage_samples[i]);
        }
    }

    fn bucket_index(bucket: QualityBucket) -> usize {
        match bucket {
            QualityBucket::High => 0,
            QualityBucket::Medium => 1,
            QualityBucket::Low => 2,
        }
    }
}

/// Intraday EMA and one-bar return panels used by the quality score.
#[derive(Debug, Clone)]
pub struct ExecutionFeatures {
    pub ema_fast: Panel<NaiveDateTime>,
    pub ema_slow: Panel<NaiveDateTime>,
    pub ret1: Panel<NaiveDateTime>,
}

fn ema(closes: &Panel<NaiveDateTime>, span: usize) -> Panel<NaiveDateTime> {
    let alpha = 2.0 / (span as f64 + 1.0);
    let mut out = Panel::new(closes.index().to_vec(), closes.assets().to_vec());
    for col in 0..closes.ncols() {
        let mut state = f64::NAN;
        let mut count = 0usize;
        for row in 0..closes.nrows() {
            let x = closes.get(row, col);
            if !x.is_finite() {
                continue;
            }
            state = if count == 0 {
                x
            } else {
                alpha * x + (1.0 - alpha) * state
            };
            count += 1;
            if count >= span {
                out.set(row, col, state);
            }
        }
    }
    out
}

/// Build the EMA/return feature panels over the full intraday history.
pub fn build_execution_features(
    closes: &Panel<NaiveDateTime>,
    cfg: &StrategyConfig,
) -> ExecutionFeatures {
    let ema_fast = ema(closes, cfg.exec_ema_fast);
    let ema_slow = ema(closes, cfg.exec_ema_slow);

    let mut ret1 = Panel::new(closes.index().to_vec(), closes.assets().to_vec());
    for col in 0..closes.ncols() {
        for row in 1..closes.nrows() {
            let prev = closes.get(row - 1, col);
            let cur = closes.get(row, col);
            if prev.is_finite() && prev != 0.0 && cur.is_finite() {
                ret1.set(row, col, cur / prev - 1.0);
            }
        }
    }

    ExecutionFeatures {
        ema_fast,
        ema_slow,
        ret1,
    }
}

/// Window quality in [0, 1]: 0.5 trend alignment + 0.3 pullback proximity +
/// 0.2 one-bar liquidity. Missing price or EMAs score zero.
fn quality_score(side: f64, price: f64, ema_fast: f64, ema_slow: f64, ret1: f64) -> f64 {
    if !price.is_finite() || !ema_fast.is_finite() || !ema_slow.is_finite() {
        return 0.0;
    }

    let trend = if side >= 0.0 {
        if ema_fast > ema_slow { 1.0 } else { 0.0 }
    } else if ema_fast < ema_slow {
        1.0
    } else {
        0.0
    };

    let pullback = 1.0 - (((price - ema_fast) / ema_fast.abs().max(1e-8)).abs() * 25.0).min(1.0);
    let liquidity = if ret1.is_finite() {
        1.0 - (ret1.abs() * 30.0).min(1.0)
    } else {
        0.0
    };

    (0.5 * trend + 0.3 * pullback + 0.2 * liquidity).clamp(0.0, 1.0)
}

fn bucket_of(quality: f64, cfg: &StrategyConfig) -> QualityBucket {
    if quality >= cfg.exec_quality_full_threshold {
        QualityBucket::High
    } else if quality >= cfg.exec_quality_half_threshold {
        QualityBucket::Medium
    } else {
        QualityBucket::Low
    }
}

/// Rows of the first `windows_per_day` intraday bars on `exec_day`.
fn execution_windows(
    closes: &Panel<NaiveDateTime>,
    exec_day: NaiveDate,
    windows_per_day: usize,
) -> std::ops::Range<usize> {
    let index = closes.index();
    let start = index.partition_point(|t| t.date() < exec_day);
    let end = index.partition_point(|t| t.date() <= exec_day);
    start..end.min(start + windows_per_day)
}

/// Work one day's order slice through the intraday windows.
///
/// Per order: the net-edge gate cancels trades whose expected edge does not
/// clear a multiple of the round-trip cost; a day with no intraday bars
/// cancels with `no_window`; otherwise each window's bucket fills a ratio of
/// the remainder (scaled by the liquidity haircut), zero-fill windows defer,
/// and `max_defers` deferrals abandon the rest.
#[allow(clippy::too_many_arguments)]
pub fn execute_order_slice(
    assets: &[String],
    deltas: &[f64],
    exec_day: NaiveDate,
    closes: &Panel<NaiveDateTime>,
    features: &ExecutionFeatures,
    score_row: &[f64],
    cost_bps_by_asset: &[f64],
    liquidity_haircut: f64,
    cfg: &StrategyConfig,
) -> (Vec<f64>, ExecutionStats, Vec<ExecutionLog>) {
    let windows = execution_windows(closes, exec_day, cfg.exec_windows_per_day);
    let mut filled = vec![0.0; assets.len()];
    let mut stats = ExecutionStats::default();
    let mut logs = Vec::new();

    for (j, asset) in assets.iter().enumerate() {
        let delta = deltas[j];
        if !delta.is_finite() || delta == 0.0 {
            continue;
        }

        let expected_edge = score_row[j].abs();
        let round_trip_cost = 2.0 * cost_bps_by_asset[j] / 10_000.0;
        if !expected_edge.is_finite()
            || expected_edge <= cfg.net_edge_cost_multiple * round_trip_cost
        {
            stats.canceled += 1;
            logs.push(ExecutionLog {
                asset: asset.clone(),
                decision: OrderDecision::Cancel,
                reason: OrderReason::NetEdge,
                requested_delta: delta,
                filled_delta: 0.0,
                quality: None,
            });
            continue;
        }

        if windows.is_empty() {
            stats.canceled += 1;
            logs.push(ExecutionLog {
                asset: asset.clone(),
                decision: OrderDecision::Cancel,
                reason: OrderReason::NoWindow,
                requested_delta: delta,
                filled_delta: 0.0,
                quality: None,
            });
            continue;
        }

        let col = closes.col_of(asset);
        let mut remaining = delta;
        let mut defers = 0u32;
        let mut last_quality = None;

        for row in windows.clone() {
            let (px, ema_fast, ema_slow, ret1) = match col {
                Some(c) => (
                    closes.get(row, c),
                    features.ema_fast.get(row, c),
                    features.ema_slow.get(row, c),
                    features.ret1.get(row, c),
                ),
                None => (f64::NAN, f64::NAN, f64::NAN, f64::NAN),
            };

            let quality = quality_score(delta.signum(), px, ema_fast, ema_slow, ret1);
            let bucket = bucket_of(quality, cfg);
            last_quality = Some(quality);
            let idx = ExecutionStats::bucket_index(bucket);
            stats.bucket_counts[idx] += 1;
            stats.slippage_samples[idx].push(bucket.slippage_bps(cfg));

            let fill_ratio = (bucket.fill_ratio() * liquidity_haircut).clamp(0.0, 1.0);
            if fill_ratio <= 0.0 {
                defers += 1;
                if defers >= cfg.exec_max_defers {
                    break;
                }
                continue;
            }

            let fill = remaining * fill_ratio;
            filled[j] += fill;
            remaining -= fill;
            if remaining.abs() <= 1e-6 {
                break;
            }
        }

        let (decision, reason) = if filled[j].abs() > 1e-6 && remaining.abs() <= 1e-6 {
            stats.executed += 1;
            (OrderDecision::Execute, OrderReason::Filled)
        } else if filled[j].abs() > 1e-6 {
            stats.deferred += 1;
            (OrderDecision::Defer, OrderReason::PartialFill)
        } else {
            stats.canceled += 1;
            (OrderDecision::Cancel, OrderReason::QualityReject)
        };

        logs.push(ExecutionLog {
            asset: asset.clone(),
            decision,
            reason,
            requested_delta: delta,
            filled_delta: filled[j],
            quality: last_quality,
        });
    }

    (filled, stats, logs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cfg() -> StrategyConfig {
        StrategyConfig::default()
    }

    fn dt(day: u32, hour: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(hour, 0, 0)
            .unwrap()
    }

    /// One asset with enough flat history for both EMAs, then two bars on
    /// the execution day at the given prices.
    fn intraday_fixture(day_prices: [f64; 2]) -> Panel<NaiveDateTime> {
        let mut index = Vec::new();
        let mut values = Vec::new();
        for day in 1..=15 {
            for hour in [8, 10, 12, 14] {
                index.push(dt(day, hour));
                values.push(100.0);
            }
        }
        index.push(dt(20, 10));
        values.push(day_prices[0]);
        index.push(dt(20, 14));
        values.push(day_prices[1]);
        Panel::from_values(index, vec!["A".to_string()], values).unwrap()
    }

    fn run_single(
        deltas: &[f64],
        score: f64,
        haircut: f64,
        closes: &Panel<NaiveDateTime>,
        config: &StrategyConfig,
    ) -> (Vec<f64>, ExecutionStats, Vec<ExecutionLog>) {
        let features = build_execution_features(closes, config);
        execute_order_slice(
            &["A".to_string()],
            deltas,
            NaiveDate::from_ymd_opt(2024, 3, 20).unwrap(),
            closes,
            &features,
            &[score],
            &[2.0],
            haircut,
            config,
        )
    }

    #[test]
    fn flat_tape_at_the_ema_fills_half_per_window() {
        let closes = intraday_fixture([100.0, 100.0]);
        let config = cfg();
        // flat EMAs mean no trend credit for a long, so quality is
        // 0.3 + 0.2 = 0.5: medium bucket, half fill per window
        let (filled, stats, logs) = run_single(&[0.10], 2.0, 1.0, &closes, &config);
        assert_relative_eq!(filled[0], 0.075);
        assert_eq!(stats.deferred, 1);
        assert_eq!(stats.executed, 0);
        assert_eq!(logs[0].reason, OrderReason::PartialFill);
        assert_eq!(stats.bucket_counts, [0, 2, 0]);
    }

    #[test]
    fn rising_tape_gives_a_long_high_quality_full_fill() {
        // drift the late warm-up bars up so ema_fast > ema_slow on exec day
        let mut closes = intraday_fixture([100.0, 100.0]);
        let rows = closes.nrows();
        for row in 30..rows - 2 {
            let px = 100.0 + (row as f64 - 30.0) * 0.01;
            closes.set(row, 0, px);
        }
        let (filled, stats, logs) = run_single(&[0.10], 2.0, 1.0, &closes, &cfg());
        assert_relative_eq!(filled[0], 0.10, max_relative = 1e-9);
        assert_eq!(stats.executed, 1);
        assert_eq!(logs[0].decision, OrderDecision::Execute);
        assert_eq!(logs[0].reason, OrderReason::Filled);
        assert!(stats.bucket_counts[0] >= 1);
    }

    #[test]
    fn weak_edge_cancels_exactly_at_the_cost_multiple() {
        let closes = intraday_fixture([100.0, 100.0]);
        // round trip = 2 * 2bps = 4bps; gate at 2x means 0.0008
        let (filled, stats, logs) = run_single(&[0.10], 0.0008, 1.0, &closes, &cfg());
        assert_eq!(filled[0], 0.0);
        assert_eq!(stats.canceled, 1);
        assert_eq!(logs[0].reason, OrderReason::NetEdge);
        assert_eq!(stats.bucket_counts, [0, 0, 0]);

        // just above the gate the order trades
        let (filled, _, _) = run_single(&[0.10], 0.00081, 1.0, &closes, &cfg());
        assert!(filled[0] > 0.0);
    }

    #[test]
    fn nan_score_cancels_net_edge() {
        let closes = intraday_fixture([100.0, 100.0]);
        let (filled, _, logs) = run_single(&[0.10], f64::NAN, 1.0, &closes, &cfg());
        assert_eq!(filled[0], 0.0);
        assert_eq!(logs[0].reason, OrderReason::NetEdge);
    }

    #[test]
    fn missing_bars_on_exec_day_cancel_no_window() {
        let closes = intraday_fixture([100.0, 100.0]);
        let features = build_execution_features(&closes, &cfg());
        let (filled, stats, logs) = execute_order_slice(
            &["A".to_string()],
            &[0.10],
            NaiveDate::from_ymd_opt(2024, 3, 21).unwrap(),
            &closes,
            &features,
            &[2.0],
            &[2.0],
            1.0,
            &cfg(),
        );
        assert_eq!(filled[0], 0.0);
        assert_eq!(stats.canceled, 1);
        assert_eq!(logs[0].reason, OrderReason::NoWindow);
    }

    #[test]
    fn zero_haircut_defers_until_abandoned() {
        let closes = intraday_fixture([100.0, 100.0]);
        let (filled, stats, logs) = run_single(&[0.10], 2.0, 0.0, &closes, &cfg());
        assert_eq!(filled[0], 0.0);
        assert_eq!(stats.canceled, 1);
        assert_eq!(logs[0].reason, OrderReason::QualityReject);
    }

    #[test]
    fn half_haircut_halves_the_fill_ratio() {
        let closes = intraday_fixture([100.0, 100.0]);
        // medium bucket 0.5 scaled by the 0.5 haircut: 0.25 per window
        let (filled, _, _) = run_single(&[0.10], 2.0, 0.5, &closes, &cfg());
        let expected = 0.10 * 0.25 + 0.10 * 0.75 * 0.25;
        assert_relative_eq!(filled[0], expected, max_relative = 1e-9);
    }

    #[test]
    fn far_from_ema_prices_reject_on_quality() {
        // execution-day bars 10% away from the EMA: no pullback credit and
        // a violent one-bar move kills the liquidity term
        let closes = intraday_fixture([110.0, 90.0]);
        let (filled, stats, logs) = run_single(&[0.10], 2.0, 1.0, &closes, &cfg());
        assert_eq!(filled[0], 0.0);
        assert_eq!(stats.canceled, 1);
        assert_eq!(logs[0].reason, OrderReason::QualityReject);
        assert_eq!(stats.bucket_counts[2], 2);
    }

    #[test]
    fn zero_deltas_produce_no_orders() {
        let closes = intraday_fixture([100.0, 100.0]);
        let (filled, stats, logs) = run_single(&[0.0], 2.0, 1.0, &closes, &cfg());
        assert_eq!(filled[0], 0.0);
        assert_eq!(stats.executed + stats.deferred + stats.canceled, 0);
        assert!(logs.is_empty());
    }

    #[test]
    fn stats_merge_accumulates() {
        let mut a = ExecutionStats {
            executed: 1,
            deferred: 2,
            canceled: 3,
            bucket_counts: [1, 0, 1],
            slippage_samples: [vec![1.0], vec![], vec![6.0]],
        };
        let b = ExecutionStats {
            executed: 1,
            deferred: 0,
            canceled: 0,
            bucket_counts: [0, 2, 0],
            slippage_samples: [vec![], vec![3.0, 3.0], vec![]],
        };
        a.merge(&b);
        assert_eq!(a.executed, 2);
        assert_eq!(a.bucket_counts, [1, 2, 1]);
        assert_eq!(a.slippage_samples[1], vec![3.0, 3.0]);
    }
}
