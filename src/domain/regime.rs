//! Market regime: weekly momentum score, risk state, panic flag, and the
//! per-state leverage caps and side tilts.

use crate::domain::config::StrategyConfig;
use crate::domain::signals::cross_sectional_zscores;
use crate::domain::timeseries::Panel;
use chrono::{Datelike, Duration, NaiveDate, Weekday};
use serde::Serialize;

const RET_26W: usize = 26;
const RET_52W: usize = 52;
const MA_FAST_MAX: usize = 20;
const MA_SLOW_MAX: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegimeLabel {
    RiskOn,
    Neutral,
    RiskOff,
}

impl RegimeLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegimeLabel::RiskOn => "RISK_ON",
            RegimeLabel::Neutral => "NEUTRAL",
            RegimeLabel::RiskOff => "RISK_OFF",
        }
    }
}

/// Per-day regime vectors, aligned to the daily close index.
#[derive(Debug, Clone)]
pub struct RegimeContext {
    pub state: Vec<RegimeLabel>,
    pub leverage_cap: Vec<f64>,
    pub side_tilt: Vec<f64>,
    pub panic: Vec<bool>,
    pub market_vol_z: Vec<f64>,
    pub regime_score: Vec<f64>,
}

/// The Friday ending the week containing `date`.
fn week_end(date: NaiveDate) -> NaiveDate {
    let days_ahead = (Weekday::Fri.num_days_from_monday() + 7
        - date.weekday().num_days_from_monday())
        % 7;
    date + Duration::days(days_ahead as i64)
}

/// Collapse daily closes to weekly (week-ending-Friday) closes, taking the
/// last available value per asset per week and dropping all-missing weeks.
fn resample_weekly(closes: &Panel<NaiveDate>) -> Panel<NaiveDate> {
    let mut week_index: Vec<NaiveDate> = Vec::new();
    let mut rows: Vec<Vec<f64>> = Vec::new();
    for row in 0..closes.nrows() {
        let w = week_end(closes.index()[row]);
        if week_index.last() != Some(&w) {
            week_index.push(w);
            rows.push(vec![f64::NAN; closes.ncols()]);
        }
        let last = rows.len() - 1;
        for col in 0..closes.ncols() {
            let v = closes.get(row, col);
            if v.is_finite() {
                rows[last][col] = v;
            }
        }
    }

    let keep: Vec<usize> = (0..week_index.len())
        .filter(|&i| rows[i].iter().any(|v| v.is_finite()))
        .collect();
    let mut out = Panel::new(
        keep.iter().map(|&i| week_index[i]).collect(),
        closes.assets().to_vec(),
    );
    for (new_row, &old_row) in keep.iter().enumerate() {
        for col in 0..closes.ncols() {
            out.set(new_row, col, rows[old_row][col]);
        }
    }
    out
}

fn weekly_rolling_mean(panel: &Panel<NaiveDate>, window: usize, min_periods: usize) -> Panel<NaiveDate> {
    crate::domain::signals::rolling_mean(panel, window, min_periods)
}

/// Weekly momentum score: 26/52-week log returns plus a moving-average trend
/// term, each cross-sectionally z-scored and combined with availability
/// weighting (0.45/0.35/0.20).
pub fn compute_weekly_score(closes: &Panel<NaiveDate>) -> Panel<NaiveDate> {
    let weekly = resample_weekly(closes);
    let weekly_len = weekly.nrows();

    // adaptive MA windows so short histories still produce a trend term
    let fast_window = MA_FAST_MAX.min((weekly_len / 2).max(6));
    let slow_window = MA_SLOW_MAX.min((2 * weekly_len / 3).max(fast_window + 4));

    let mut log_price = Panel::new(weekly.index().to_vec(), weekly.assets().to_vec());
    for col in 0..weekly.ncols() {
        for row in 0..weekly.nrows() {
            let px = weekly.get(row, col);
            if px.is_finite() && px > 0.0 {
                log_price.set(row, col, px.ln());
            }
        }
    }

    let mut ret26 = Panel::new(weekly.index().to_vec(), weekly.assets().to_vec());
    let mut ret52 = Panel::new(weekly.index().to_vec(), weekly.assets().to_vec());
    for col in 0..weekly.ncols() {
        for row in 0..weekly.nrows() {
            if row >= RET_26W {
                let (a, b) = (log_price.get(row, col), log_price.get(row - RET_26W, col));
                if a.is_finite() && b.is_finite() {
                    ret26.set(row, col, a - b);
                }
            }
            if row >= RET_52W {
                let (a, b) = (log_price.get(row, col), log_price.get(row - RET_52W, col));
                if a.is_finite() && b.is_finite() {
                    ret52.set(row, col, a - b);
                }
            }
        }
    }

    let ma_fast = weekly_rolling_mean(&weekly, fast_window, (fast_window / 2).max(4));
    let ma_slow = weekly_rolling_mean(&weekly, slow_window, (slow_window / 2).max(6));
    let mut trend = Panel::new(weekly.index().to_vec(), weekly.assets().to_vec());
    for col in 0..weekly.ncols() {
        for row in 0..weekly.nrows() {
            let f = ma_fast.get(row, col);
            let s = ma_slow.get(row, col);
            if f.is_finite() && s.is_finite() && s != 0.0 {
                trend.set(row, col, f / s - 1.0);
            }
        }
    }

    let z26 = cross_sectional_zscores(&ret26);
    let z52 = cross_sectional_zscores(&ret52);
    let ztrend = cross_sectional_zscores(&trend);

    let mut score = Panel::new(weekly.index().to_vec(), weekly.assets().to_vec());
    for col in 0..weekly.ncols() {
        for row in 0..weekly.nrows() {
            let mut weighted = 0.0;
            let mut available = 0.0;
            for (weight, z) in [(0.45, &z26), (0.35, &z52), (0.20, &ztrend)] {
                let v = z.get(row, col);
                if v.is_finite() {
                    weighted += weight * v;
                    available += weight;
                }
            }
            if available > 0.0 {
                let s = weighted / available;
                if s.is_finite() {
                    score.set(row, col, s);
                }
            }
        }
    }
    score
}

/// Forward-fill a weekly panel onto a daily index: each day takes the most
/// recent weekly row whose label is at or before it.
fn reindex_ffill(weekly: &Panel<NaiveDate>, daily_index: &[NaiveDate]) -> Panel<NaiveDate> {
    let mut out = Panel::new(daily_index.to_vec(), weekly.assets().to_vec());
    for (row, date) in daily_index.iter().enumerate() {
        let pos = weekly.first_row_after(date);
        if pos == 0 {
            continue;
        }
        let src = pos - 1;
        for col in 0..weekly.ncols() {
            out.set(row, col, weekly.get(src, col));
        }
    }
    out
}

fn rolling_std(values: &[f64], row: usize, window: usize, min_periods: usize) -> f64 {
    let start = (row + 1).saturating_sub(window);
    let xs: Vec<f64> = values[start..=row]
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .collect();
    if xs.len() < min_periods.max(2) {
        return f64::NAN;
    }
    let mean = xs.iter().sum::<f64>() / xs.len() as f64;
    let var = xs.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (xs.len() - 1) as f64;
    var.sqrt()
}

fn rolling_mean_slice(values: &[f64], row: usize, window: usize, min_periods: usize) -> f64 {
    let start = (row + 1).saturating_sub(window);
    let xs: Vec<f64> = values[start..=row]
        .iter()
        .copied()
        .filter(|v| v.is_finite())
        .collect();
    if xs.len() < min_periods.max(1) {
        return f64::NAN;
    }
    xs.iter().sum::<f64>() / xs.len() as f64
}

/// Build the regime context plus the daily-aligned weekly score panel.
pub fn build_regime_context(
    closes: &Panel<NaiveDate>,
    cfg: &StrategyConfig,
) -> (RegimeContext, Panel<NaiveDate>) {
    let n = closes.nrows();
    let weekly_score = compute_weekly_score(closes);
    let weekly_score_daily = reindex_ffill(&weekly_score, closes.index());

    // market proxy series for vol and panic
    let proxy_col = closes.col_of(&cfg.market_proxy);
    let mut market_returns = vec![f64::NAN; n];
    let mut market_ret_lb = vec![f64::NAN; n];
    if let Some(col) = proxy_col {
        for row in 1..n {
            let prev = closes.get(row - 1, col);
            let cur = closes.get(row, col);
            if prev.is_finite() && prev != 0.0 && cur.is_finite() {
                market_returns[row] = cur / prev - 1.0;
            }
        }
        for row in cfg.panic_return_lookback..n {
            let past = closes.get(row - cfg.panic_return_lookback, col);
            let cur = closes.get(row, col);
            if past.is_finite() && past != 0.0 && cur.is_finite() {
                market_ret_lb[row] = cur / past - 1.0;
            }
        }
    }

    let mut vol20 = vec![f64::NAN; n];
    for row in 0..n {
        vol20[row] = rolling_std(&market_returns, row, 20, 20);
    }
    let mut market_vol_z = vec![f64::NAN; n];
    for row in 0..n {
        let mean = rolling_mean_slice(&vol20, row, 252, 60);
        let std = rolling_std(&vol20, row, 252, 60);
        if mean.is_finite() && std.is_finite() && std != 0.0 {
            market_vol_z[row] = (vol20[row] - mean) / std;
        }
    }

    let mut panic = vec![false; n];
    for row in 0..n {
        panic[row] = market_ret_lb[row].is_finite()
            && market_ret_lb[row] < 0.0
            && market_vol_z[row].is_finite()
            && market_vol_z[row] > cfg.panic_vol_z_threshold;
    }

    // cross-asset median of the weekly score
    let mut regime_score = vec![f64::NAN; n];
    for row in 0..n {
        let mut xs: Vec<f64> = weekly_score_daily
            .row(row)
            .iter()
            .copied()
            .filter(|v| v.is_finite())
            .collect();
        if xs.is_empty() {
            continue;
        }
        xs.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let mid = xs.len() / 2;
        regime_score[row] = if xs.len() % 2 == 1 {
            xs[mid]
        } else {
            (xs[mid - 1] + xs[mid]) / 2.0
        };
    }

    let mut state = vec![RegimeLabel::Neutral; n];
    for row in 0..n {
        let score = regime_score[row];
        if score.is_finite() && score > cfg.regime_risk_on_threshold && !panic[row] {
            state[row] = RegimeLabel::RiskOn;
        }
        if (score.is_finite() && score < cfg.regime_risk_off_threshold) || panic[row] {
            state[row] = RegimeLabel::RiskOff;
        }
    }

    let leverage_cap = state
        .iter()
        .map(|s| match s {
            RegimeLabel::RiskOn => cfg.risk_on_cap,
            RegimeLabel::Neutral => cfg.neutral_cap,
            RegimeLabel::RiskOff => cfg.risk_off_cap,
        })
        .collect();
    let side_tilt = state
        .iter()
        .map(|s| match s {
            RegimeLabel::RiskOn => cfg.risk_on_tilt,
            RegimeLabel::Neutral => 0.0,
            RegimeLabel::RiskOff => cfg.risk_off_tilt,
        })
        .collect();

    (
        RegimeContext {
            state,
            leverage_cap,
            side_tilt,
            panic,
            market_vol_z,
            regime_score,
        },
        weekly_score_daily,
    )
}
