//! Turnover controller: no-trade band plus turnover-cap throttling.

use crate::domain::config::StrategyConfig;

/// Per-day turnover accounting, recorded for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TurnoverDiagnostics {
    pub raw_turnover: f64,
    pub turnover_after_band: f64,
    pub throttled_turnover: f64,
    pub step: f64,
}

/// Move `current` toward `target` subject to the no-trade band and the daily
/// turnover cap. Both slices are weight vectors over the same asset order;
/// non-finite entries count as zero.
///
/// Band: per-asset deltas with `|delta| < no_trade_band` are dropped. Cap:
/// pressure is after-band turnover over the cap; at pressure ≤ 1 the step is
/// `step_max`, above it the step is `1 / pressure` clamped to
/// `[step_min, step_max]`. A non-positive cap degenerates to `step_min`.
pub fn apply_turnover_controls(
    current: &[f64],
    target: &[f64],
    cfg: &StrategyConfig,
) -> (Vec<f64>, TurnoverDiagnostics) {
    let n = current.len().min(target.len());
    let cur = |j: usize| {
        let w = current[j];
        if w.is_finite() { w } else { 0.0 }
    };
    let tgt = |j: usize| {
        let w = target[j];
        if w.is_finite() { w } else { 0.0 }
    };

    let mut raw_turnover = 0.0;
    let mut delta_after_band = vec![0.0; n];
    let mut turnover_after_band = 0.0;
    for j in 0..n {
        let delta = tgt(j) - cur(j);
        raw_turnover += delta.abs();
        if delta.abs() >= cfg.no_trade_band {
            delta_after_band[j] = delta;
            turnover_after_band += delta.abs();
        }
    }

    if turnover_after_band <= 0.0 {
        let controlled = (0..n).map(cur).collect();
        return (
            controlled,
            TurnoverDiagnostics {
                raw_turnover,
                turnover_after_band,
                throttled_turnover: 0.0,
                step: 0.0,
            },
        );
    }

    let step = if cfg.daily_turnover_cap <= 0.0 {
        cfg.step_min
    } else {
        let pressure = turnover_after_band / cfg.daily_turnover_cap;
        if pressure <= 1.0 {
            cfg.step_max
        } else {
            (1.0 / pressure).clamp(cfg.step_min, cfg.step_max)
        }
    };

    let mut controlled = vec![0.0; n];
    let mut throttled_turnover = 0.0;
    for j in 0..n {
        controlled[j] = cur(j) + delta_after_band[j] * step;
        throttled_turnover += (delta_after_band[j] * step).abs();
    }

    (
        controlled,
        TurnoverDiagnostics {
            raw_turnover,
            turnover_after_band,
            throttled_turnover,
            step,
        },
    )
}
