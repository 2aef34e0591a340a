//! Daily signal stack: momentum z-scores, EWMA volatility, ATR, shrunk
//! covariance, and average pairwise correlation.
//!
//! All functions are NaN-aware: a missing input produces a missing output for
//! that cell and never poisons its neighbours.

use crate::domain::config::StrategyConfig;
use crate::domain::timeseries::Panel;
use chrono::NaiveDate;

const RET_5D: usize = 5;
const RET_20D: usize = 20;
const RET_60D: usize = 60;
const RET_120D: usize = 120;

/// Score/vol/returns/ATR panels over one daily index.
#[derive(Debug, Clone)]
pub struct SignalBundle {
    pub score: Panel<NaiveDate>,
    pub vol: Panel<NaiveDate>,
    pub returns: Panel<NaiveDate>,
    pub atr: Panel<NaiveDate>,
}

/// Dense symmetric covariance over the asset order of the source panel.
#[derive(Debug, Clone)]
pub struct Covariance {
    n: usize,
    values: Vec<f64>,
}

impl Covariance {
    pub fn n(&self) -> usize {
        self.n
    }

    pub fn at(&self, i: usize, j: usize) -> f64 {
        self.values[i * self.n + j]
    }
}

fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else if x == 0.0 {
        0.0
    } else {
        f64::NAN
    }
}

/// Simple one-period returns; NaN when either endpoint is missing.
pub fn simple_returns(closes: &Panel<NaiveDate>) -> Panel<NaiveDate> {
    let mut out = Panel::new(closes.index().to_vec(), closes.assets().to_vec());
    for col in 0..closes.ncols() {
        for row in 1..closes.nrows() {
            let prev = closes.get(row - 1, col);
            let cur = closes.get(row, col);
            if prev.is_finite() && prev != 0.0 && cur.is_finite() {
                out.set(row, col, cur / prev - 1.0);
            }
        }
    }
    out
}

/// True-range rolling mean; NaN until a full `lookback` window of finite
/// true ranges is available.
pub fn atr(
    highs: &Panel<NaiveDate>,
    lows: &Panel<NaiveDate>,
    closes: &Panel<NaiveDate>,
    lookback: usize,
) -> Panel<NaiveDate> {
    let mut tr = Panel::new(closes.index().to_vec(), closes.assets().to_vec());
    for col in 0..closes.ncols() {
        for row in 0..closes.nrows() {
            let high = highs.get(row, col);
            let low = lows.get(row, col);
            let mut range = high - low;
            if row > 0 {
                let prev_close = closes.get(row - 1, col);
                range = range
                    .max((high - prev_close).abs())
                    .max((low - prev_close).abs());
            }
            tr.set(row, col, range);
        }
    }
    rolling_mean(&tr, lookback, lookback)
}

/// Rolling mean over the trailing `window` rows, requiring `min_periods`
/// finite observations inside the window.
pub fn rolling_mean(
    panel: &Panel<NaiveDate>,
    window: usize,
    min_periods: usize,
) -> Panel<NaiveDate> {
    let mut out = Panel::new(panel.index().to_vec(), panel.assets().to_vec());
    for col in 0..panel.ncols() {
        for row in 0..panel.nrows() {
            let start = (row + 1).saturating_sub(window);
            let mut sum = 0.0;
            let mut count = 0usize;
            for r in start..=row {
                let v = panel.get(r, col);
                if v.is_finite() {
                    sum += v;
                    count += 1;
                }
            }
            if count >= min_periods && count > 0 {
                out.set(row, col, sum / count as f64);
            }
        }
    }
    out
}

/// Per-row z-scores across assets; sample standard deviation, NaN when
/// fewer than two assets have values or the spread is zero.
pub fn cross_sectional_zscores(panel: &Panel<NaiveDate>) -> Panel<NaiveDate> {
    let mut out = Panel::new(panel.index().to_vec(), panel.assets().to_vec());
    for row in 0..panel.nrows() {
        let values: Vec<f64> = panel.row(row).iter().copied().filter(|v| v.is_finite()).collect();
        if values.len() < 2 {
            continue;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>()
            / (values.len() - 1) as f64;
        let std = var.sqrt();
        if std == 0.0 || !std.is_finite() {
            continue;
        }
        for col in 0..panel.ncols() {
            let v = panel.get(row, col);
            if v.is_finite() {
                out.set(row, col, (v - mean) / std);
            }
        }
    }
    out
}

/// Exponentially weighted volatility of `returns` with the given halflife;
/// NaN until `min_periods` observations have been absorbed, and zero spread
/// maps to NaN.
pub fn ewma_volatility(
    returns: &Panel<NaiveDate>,
    halflife: f64,
    min_periods: usize,
) -> Panel<NaiveDate> {
    let alpha = 1.0 - (-std::f64::consts::LN_2 / halflife).exp();
    let mut out = Panel::new(returns.index().to_vec(), returns.assets().to_vec());
    for col in 0..returns.ncols() {
        let mut mean = 0.0;
        let mut var = 0.0;
        let mut count = 0usize;
        for row in 0..returns.nrows() {
            let x = returns.get(row, col);
            if !x.is_finite() {
                continue;
            }
            if count == 0 {
                mean = x;
                var = 0.0;
            } else {
                let delta = x - mean;
                mean += alpha * delta;
                var = (1.0 - alpha) * (var + alpha * delta * delta);
            }
            count += 1;
            if count >= min_periods {
                let vol = var.sqrt();
                if vol > 0.0 {
                    out.set(row, col, vol);
                }
            }
        }
    }
    out
}

fn log_return_span(log_price: &Panel<NaiveDate>, span: usize) -> Panel<NaiveDate> {
    let mut out = Panel::new(log_price.index().to_vec(), log_price.assets().to_vec());
    for col in 0..log_price.ncols() {
        for row in span..log_price.nrows() {
            let past = log_price.get(row - span, col);
            let cur = log_price.get(row, col);
            if past.is_finite() && cur.is_finite() {
                out.set(row, col, cur - past);
            }
        }
    }
    out
}

/// The daily momentum stack. The weekly score panel must share the daily
/// index (already forward-filled).
///
/// Trend is 0.5/0.3/0.2 over 20/60/120-day cross-sectional z-scores, blended
/// 75/25 with a 5-day reversal, scaled by a weekly-alignment factor of
/// 1 ± 0.25, divided by EWMA volatility, and clipped at `score_clip`.
pub fn build_signal_bundle(
    closes: &Panel<NaiveDate>,
    highs: &Panel<NaiveDate>,
    lows: &Panel<NaiveDate>,
    weekly_score_daily: &Panel<NaiveDate>,
    cfg: &StrategyConfig,
) -> SignalBundle {
    let mut log_price = Panel::new(closes.index().to_vec(), closes.assets().to_vec());
    for col in 0..closes.ncols() {
        for row in 0..closes.nrows() {
            let px = closes.get(row, col);
            if px.is_finite() && px > 0.0 {
                log_price.set(row, col, px.ln());
            }
        }
    }

    let z20 = cross_sectional_zscores(&log_return_span(&log_price, RET_20D));
    let z60 = cross_sectional_zscores(&log_return_span(&log_price, RET_60D));
    let z120 = cross_sectional_zscores(&log_return_span(&log_price, RET_120D));
    let z5 = cross_sectional_zscores(&log_return_span(&log_price, RET_5D));

    let returns = simple_returns(closes);
    let vol = ewma_volatility(&returns, cfg.vol_halflife, 20);

    let mut score = Panel::new(closes.index().to_vec(), closes.assets().to_vec());
    for col in 0..closes.ncols() {
        for row in 0..closes.nrows() {
            let trend =
                0.50 * z20.get(row, col) + 0.30 * z60.get(row, col) + 0.20 * z120.get(row, col);
            let reversal = -z5.get(row, col);
            let s_raw = 0.75 * trend + 0.25 * reversal;
            let weekly = weekly_score_daily.get(row, col);
            let align = 1.0 + 0.25 * sign(s_raw) * sign(weekly);
            let s_align = s_raw * align;

            let v = vol.get(row, col);
            if !s_align.is_finite() || !v.is_finite() {
                continue;
            }
            let scaled = s_align / v.max(1e-4);
            if scaled.is_finite() {
                score.set(row, col, scaled.clamp(-cfg.score_clip, cfg.score_clip));
            }
        }
    }

    let atr = atr(highs, lows, closes, cfg.atr_lookback);

    SignalBundle {
        score,
        vol,
        returns,
        atr,
    }
}

/// Pairwise covariance over the trailing `window` rows ending at `end_row`
/// (inclusive), shrunk toward its diagonal. Pairs with fewer than
/// `max(20, window_len / 4)` common observations contribute zero. `None`
/// when the window is empty.
pub fn shrunk_covariance(
    returns: &Panel<NaiveDate>,
    end_row: usize,
    window: usize,
    shrink: f64,
) -> Option<Covariance> {
    let start = (end_row + 1).saturating_sub(window);
    let rows: Vec<usize> = (start..=end_row).collect();
    if rows.is_empty() {
        return None;
    }
    let min_periods = (rows.len() / 4).max(20);
    let n = returns.ncols();

    let mut cov = vec![0.0; n * n];
    for i in 0..n {
        for j in i..n {
            let mut xs = Vec::new();
            let mut ys = Vec::new();
            for &r in &rows {
                let x = returns.get(r, i);
                let y = returns.get(r, j);
                if x.is_finite() && y.is_finite() {
                    xs.push(x);
                    ys.push(y);
                }
            }
            let c = if xs.len() >= min_periods && xs.len() >= 2 {
                let mx = xs.iter().sum::<f64>() / xs.len() as f64;
                let my = ys.iter().sum::<f64>() / ys.len() as f64;
                let cov_xy: f64 = xs
                    .iter()
                    .zip(&ys)
                    .map(|(x, y)| (x - mx) * (y - my))
                    .sum::<f64>()
                    / (xs.len() - 1) as f64;
                cov_xy
            } else {
                0.0 // missing pairs contribute no cross-risk
            };
            cov[i * n + j] = c;
            cov[j * n + i] = c;
        }
    }

    let mut values = vec![0.0; n * n];
    for i in 0..n {
        for j in 0..n {
            let base = (1.0 - shrink) * cov[i * n + j];
            values[i * n + j] = if i == j {
                base + shrink * cov[i * n + i]
            } else {
                base
            };
        }
    }
    Some(Covariance { n, values })
}

/// Mean of the off-diagonal pairwise correlations over the trailing window.
/// NaN with fewer than two assets or when no pair has enough common
/// observations (`max(10, window_len / 4)`).
pub fn average_pairwise_correlation(
    returns: &Panel<NaiveDate>,
    end_row: usize,
    window: usize,
) -> f64 {
    let n = returns.ncols();
    if n < 2 {
        return f64::NAN;
    }
    let start = (end_row + 1).saturating_sub(window);
    let rows: Vec<usize> = (start..=end_row).collect();
    if rows.is_empty() {
        return f64::NAN;
    }
    let min_periods = (rows.len() / 4).max(10);

    let mut sum = 0.0;
    let mut count = 0usize;
    for i in 0..n {
        for j in (i + 1)..n {
            let mut xs = Vec::new();
            let mut ys = Vec::new();
            for &r in &rows {
                let x = returns.get(r, i);
                let y = returns.get(r, j);
                if x.is_finite() && y.is_finite() {
                    xs.push(x);
                    ys.push(y);
                }
            }
            if xs.len() < min_periods || xs.len() < 2 {
                continue;
            }
            let mx = xs.iter().sum::<f64>() / xs.len() as f64;
            let my = ys.iter().sum::<f64>() / ys.len() as f64;
            let mut cov_xy = 0.0;
            let mut var_x = 0.0;
            let mut var_y = 0.0;
            for (x, y) in xs.iter().zip(&ys) {
                cov_xy += (x - mx) * (y - my);
                var_x += (x - mx) * (x - mx);
                var_y += (y - my) * (y - my);
            }
            if var_x > 0.0 && var_y > 0.0 {
                let corr = cov_xy / (var_x.sqrt() * var_y.sqrt());
                if corr.is_finite() {
                    // each pair counts twice in a full matrix; the mean is
                    // unchanged, so accumulate once
                    sum += corr;
                    count += 1;
                }
            }
        }
    }
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn d(i: usize) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64)
    }

    fn panel_from_cols(cols: &[(&str, Vec<f64>)]) -> Panel<NaiveDate> {
        let nrows = cols[0].1.len();
        let assets: Vec<String> = cols.iter().map(|(n, _)| n.to_string()).collect();
        let index: Vec<NaiveDate> = (0..nrows).map(d).collect();
        let mut p = Panel::new(index, assets);
        for (c, (_, vals)) in cols.iter().enumerate() {
            for (r, v) in vals.iter().enumerate() {
                p.set(r, c, *v);
            }
        }
        p
    }

    #[test]
    fn simple_returns_skip_missing_endpoints() {
        let closes = panel_from_cols(&[("A", vec![100.0, 110.0, f64::NAN, 121.0])]);
        let r = simple_returns(&closes);
        assert!(r.get(0, 0).is_nan());
        assert_relative_eq!(r.get(1, 0), 0.10);
        assert!(r.get(2, 0).is_nan());
        assert!(r.get(3, 0).is_nan()); // previous close missing
    }

    #[test]
    fn atr_uses_true_range_against_prior_close() {
        // gap day: high-low is small but the gap to prior close is large
        let highs = panel_from_cols(&[("A", vec![10.0, 16.0, 15.5])]);
        let lows = panel_from_cols(&[("A", vec![9.0, 15.0, 14.5])]);
        let closes = panel_from_cols(&[("A", vec![9.5, 15.5, 15.0])]);
        let a = atr(&highs, &lows, &closes, 2);
        assert!(a.get(0, 0).is_nan()); // min_periods not met
        // TR day0 = 1.0, day1 = max(1.0, |16-9.5|, |15-9.5|) = 6.5
        assert_relative_eq!(a.get(1, 0), (1.0 + 6.5) / 2.0);
        // TR day2 = max(1.0, 0.0, 1.0) = 1.0
        assert_relative_eq!(a.get(2, 0), (6.5 + 1.0) / 2.0);
    }

    #[test]
    fn zscores_center_each_row() {
        let p = panel_from_cols(&[
            ("A", vec![1.0]),
            ("B", vec![2.0]),
            ("C", vec![3.0]),
        ]);
        let z = cross_sectional_zscores(&p);
        assert_relative_eq!(z.get(0, 1), 0.0);
        assert_relative_eq!(z.get(0, 0), -z.get(0, 2));
        assert_relative_eq!(z.get(0, 2), 1.0); // sample std is exactly 1
    }

    #[test]
    fn zscores_need_spread_and_two_assets() {
        let flat = panel_from_cols(&[("A", vec![2.0]), ("B", vec![2.0])]);
        assert!(cross_sectional_zscores(&flat).get(0, 0).is_nan());

        let lone = panel_from_cols(&[("A", vec![2.0]), ("B", vec![f64::NAN])]);
        assert!(cross_sectional_zscores(&lone).get(0, 0).is_nan());
    }

    #[test]
    fn ewma_volatility_gates_on_min_periods() {
        let vals: Vec<f64> = (0..30).map(|i| if i % 2 == 0 { 0.01 } else { -0.01 }).collect();
        let returns = panel_from_cols(&[("A", vals)]);
        let vol = ewma_volatility(&returns, 20.0, 20);
        assert!(vol.get(18, 0).is_nan());
        assert!(vol.get(19, 0).is_finite());
        assert!(vol.get(29, 0) > 0.0);
    }

    #[test]
    fn covariance_diagonal_survives_shrinkage() {
        let n = 40;
        let a: Vec<f64> = (0..n).map(|i| if i % 2 == 0 { 0.01 } else { -0.01 }).collect();
        let b: Vec<f64> = a.iter().map(|v| -v).collect();
        let returns = panel_from_cols(&[("A", a), ("B", b)]);
        let cov = shrunk_covariance(&returns, n - 1, n, 0.30).unwrap();
        assert_eq!(cov.n(), 2);
        // variance unchanged by diagonal shrinkage
        assert_relative_eq!(cov.at(0, 0), cov.at(1, 1), max_relative = 1e-12);
        // perfectly anti-correlated off-diagonal, scaled by (1 - shrink)
        assert_relative_eq!(cov.at(0, 1), -0.7 * cov.at(0, 0), max_relative = 1e-9);
    }

    #[test]
    fn covariance_short_window_is_zero_filled() {
        let returns = panel_from_cols(&[("A", vec![0.01; 10]), ("B", vec![0.02; 10])]);
        let cov = shrunk_covariance(&returns, 9, 10, 0.30).unwrap();
        assert_eq!(cov.at(0, 1), 0.0);
        assert_eq!(cov.at(0, 0), 0.0);
    }

    #[test]
    fn average_correlation_of_identical_series_is_one() {
        let vals: Vec<f64> = (0..60).map(|i| ((i * 7919) % 13) as f64 / 100.0 - 0.06).collect();
        let returns = panel_from_cols(&[("A", vals.clone()), ("B", vals)]);
        let corr = average_pairwise_correlation(&returns, 59, 60);
        assert_relative_eq!(corr, 1.0, max_relative = 1e-9);
    }

    #[test]
    fn average_correlation_needs_two_assets() {
        let returns = panel_from_cols(&[("A", vec![0.01; 60])]);
        assert!(average_pairwise_correlation(&returns, 59, 60).is_nan());
    }

    #[test]
    fn score_respects_clip_and_alignment() {
        // constant uptrend for A, downtrend for B, wobble for C so that
        // spreads stay non-degenerate
        let n = 160;
        let a: Vec<f64> = (0..n).map(|i| 100.0 * 1.01f64.powi(i as i32)).collect();
        let b: Vec<f64> = (0..n).map(|i| 100.0 * 0.99f64.powi(i as i32)).collect();
        let c: Vec<f64> = (0..n)
            .map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0)
            .collect();
        let closes = panel_from_cols(&[("A", a), ("B", b), ("C", c)]);
        let highs = closes.clone();
        let lows = closes.clone();
        let weekly = Panel::new(closes.index().to_vec(), closes.assets().to_vec());

        let cfg = StrategyConfig::default();
        let bundle = build_signal_bundle(&closes, &highs, &lows, &weekly, &cfg);
        let last = bundle.score.nrows() - 1;
        for col in 0..3 {
            let s = bundle.score.get(last, col);
            if s.is_finite() {
                assert!(s.abs() <= cfg.score_clip + 1e-12);
            }
        }
        // a NaN weekly score makes the alignment factor undefined
        assert!(bundle.score.get(last, 0).is_nan());
    }
}
