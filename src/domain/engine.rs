//! Daily simulation driver: wires signals, regime, targets, turnover,
//! execution, lifecycle, and the risk overlay into one equity path.

use crate::domain::assets::AssetUniverse;
use crate::domain::config::{ScenarioParams, StrategyConfig};
use crate::domain::error::NeutronError;
use crate::domain::execution::{
    build_execution_features, execute_order_slice, ExecutionFeatures, ExecutionLog, ExecutionStats,
};
use crate::domain::lifecycle::{Position, PositionBook, Side};
use crate::domain::metrics::{summarize_returns, SummaryStats};
use crate::domain::quality::{build_quality_report, QualityReport};
use crate::domain::regime::{build_regime_context, RegimeContext, RegimeLabel};
use crate::domain::risk::{RiskEvent, RiskEventKind, RiskState};
use crate::domain::signals::{
    average_pairwise_correlation, build_signal_bundle, shrunk_covariance, SignalBundle,
};
use crate::domain::timeseries::Panel;
use crate::domain::turnover::apply_turnover_controls;
use crate::domain::weights::{
    breadth_of, build_daily_target_weights, enforce_weight_constraints, min_hold_target,
};
use chrono::{NaiveDate, NaiveDateTime};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::BTreeMap;

/// Price history for one run: daily OHLC panels plus the intraday closes
/// the execution simulator works from. All panels share asset naming.
#[derive(Debug, Clone)]
pub struct MarketData {
    pub daily_closes: Panel<NaiveDate>,
    pub daily_highs: Panel<NaiveDate>,
    pub daily_lows: Panel<NaiveDate>,
    pub intraday_closes: Panel<NaiveDateTime>,
}

/// Everything the daily loop needs, already sliced to the trading window
/// and restricted to eligible assets.
pub struct PreparedInputs<'a> {
    pub daily_closes: &'a Panel<NaiveDate>,
    pub daily_highs: &'a Panel<NaiveDate>,
    pub daily_lows: &'a Panel<NaiveDate>,
    pub intraday_closes: &'a Panel<NaiveDateTime>,
    pub features: &'a ExecutionFeatures,
    pub bundle: &'a SignalBundle,
    pub regime: &'a RegimeContext,
    pub universe: &'a AssetUniverse,
    pub quality: &'a QualityReport,
}

#[derive(Debug, Clone, Serialize)]
pub struct TurnoverSummary {
    pub avg_raw_turnover: Option<f64>,
    pub avg_turnover_after_band: Option<f64>,
    pub avg_throttled_turnover: Option<f64>,
    pub median_daily_turnover_pct: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionSummary {
    pub executed: usize,
    pub deferred: usize,
    pub canceled: usize,
    pub bucket_counts: BTreeMap<String, usize>,
    pub avg_slippage_bps_by_bucket: BTreeMap<String, Option<f64>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CostDragSummary {
    pub total_cost_drag: f64,
    pub cost_drag_pct_of_starting_capital: f64,
    pub by_category: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BreadthSummary {
    pub average_active_assets: Option<f64>,
    pub average_active_categories: Option<f64>,
    pub average_max_category_share: Option<f64>,
}

/// Run-level diagnostics bundled into the report.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostics {
    pub turnover: TurnoverSummary,
    pub execution: ExecutionSummary,
    pub cost_drag: CostDragSummary,
    pub breadth: BreadthSummary,
    pub risk_events_by_kind: BTreeMap<String, usize>,
    pub regime_attribution: BTreeMap<String, SummaryStats>,
}

/// One scenario's full output.
#[derive(Debug, Clone)]
pub struct ScenarioResult {
    pub scenario: String,
    pub dates: Vec<NaiveDate>,
    pub equity: Vec<f64>,
    pub net_returns: Vec<f64>,
    pub weights: Panel<NaiveDate>,
    pub risk_events: Vec<RiskEvent>,
    pub execution_logs: Vec<ExecutionLog>,
    pub summary: SummaryStats,
    pub diagnostics: Diagnostics,
    pub quality: QualityReport,
}

/// Knock out a fraction of bars at random, sparing the warm-up rows so the
/// signal stack still has history to stand on. Draw order is row-major and
/// fixed, so equal seeds give identical masks.
pub fn apply_missing_data_stress(
    data: &mut MarketData,
    ratio: f64,
    seed: u64,
    cfg: &StrategyConfig,
) {
    if ratio <= 0.0 {
        return;
    }
    let mut rng = StdRng::seed_from_u64(seed);

    for row in cfg.stress_warmup_daily..data.daily_closes.nrows() {
        for col in 0..data.daily_closes.ncols() {
            if rng.gen_range(0.0..1.0) < ratio {
                data.daily_closes.set(row, col, f64::NAN);
                data.daily_highs.set(row, col, f64::NAN);
                data.daily_lows.set(row, col, f64::NAN);
            }
        }
    }
    for row in cfg.stress_warmup_intraday..data.intraday_closes.nrows() {
        for col in 0..data.intraday_closes.ncols() {
            if rng.gen_range(0.0..1.0) < ratio {
                data.intraday_closes.set(row, col, f64::NAN);
            }
        }
    }
}

/// The daily loop. Day zero seeds the books; each following day settles
/// P&L, runs forced exits, updates the risk overlay, rebuilds the target,
/// throttles turnover, works the orders intraday, and refreshes the
/// position registry.
pub fn run_prepared(
    inputs: &PreparedInputs<'_>,
    cfg: &StrategyConfig,
    scenario: &ScenarioParams,
) -> Result<ScenarioResult, NeutronError> {
    let closes = inputs.daily_closes;
    let n_days = closes.nrows();
    let assets = closes.assets().to_vec();
    let n = assets.len();
    if n_days == 0 {
        return Err(NeutronError::EmptyPriceSeries);
    }
    if n == 0 {
        return Err(NeutronError::EmptyUniverse);
    }

    let categories: Vec<&str> = assets.iter().map(|a| inputs.universe.category(a)).collect();
    let cost_bps: Vec<f64> = assets
        .iter()
        .map(|a| inputs.universe.cost_bps(a) * scenario.cost_multiplier)
        .collect();
    let delay = if scenario.one_day_delay { 1 } else { 0 };

    let mut weights = vec![0.0; n];
    let mut book = PositionBook::new();
    let mut risk = RiskState::new();

    let mut equity = cfg.capital;
    let mut dates = vec![closes.index()[0]];
    let mut equity_values = vec![equity];
    let mut net_returns = vec![0.0];
    let mut weights_panel = Panel::new(closes.index().to_vec(), assets.clone());
    for j in 0..n {
        weights_panel.set(0, j, 0.0);
    }

    let mut raw_turnovers = Vec::new();
    let mut after_band_turnovers = Vec::new();
    let mut throttled_turnovers = Vec::new();
    let mut exec_stats = ExecutionStats::default();
    let mut exec_logs: Vec<ExecutionLog> = Vec::new();
    let mut cost_drag_by_category: BTreeMap<String, f64> = BTreeMap::new();
    let mut breadth_active = Vec::new();
    let mut breadth_categories = Vec::new();
    let mut breadth_shares = Vec::new();

    for i in 1..n_days {
        let ts = closes.index()[i];
        let prev_equity = equity;

        // settle yesterday's book against today's returns, plus any
        // short-borrow funding
        let gross_short: f64 = -weights.iter().filter(|w| **w < 0.0).sum::<f64>();
        let borrow = gross_short * scenario.short_borrow_bps_per_day / 10_000.0;
        let mut pnl = -borrow;
        for j in 0..n {
            let r = inputs.bundle.returns.get(i, j);
            if r.is_finite() {
                pnl += weights[j] * r;
            }
        }
        equity *= (1.0 + pnl).max(0.0);

        // position lifecycle and forced exits
        let mut forced: Vec<(String, RiskEventKind)> = Vec::new();
        for asset in book.assets() {
            let j = match closes.col_of(&asset) {
                Some(j) => j,
                None => continue,
            };
            if weights[j].abs() <= 1e-10 {
                book.remove(&asset);
                continue;
            }
            let high = inputs.daily_highs.get(i, j);
            let low = inputs.daily_lows.get(i, j);
            let atr = inputs.bundle.atr.get(i, j);
            let score = inputs.bundle.score.get(i, j);
            if let Some(pos) = book.get_mut(&asset) {
                if let Some(reason) = pos.update(high, low, atr, score, cfg) {
                    let kind = match reason {
                        crate::domain::lifecycle::ExitReason::StopLoss => RiskEventKind::StopLoss,
                        crate::domain::lifecycle::ExitReason::TimeStop => RiskEventKind::TimeStop,
                    };
                    forced.push((asset, kind));
                }
            }
        }
        for (asset, kind) in forced {
            let j = match closes.col_of(&asset) {
                Some(j) => j,
                None => continue,
            };
            let exposure = weights[j].abs();
            if exposure <= 1e-10 {
                continue;
            }
            let cost = exposure * equity * cost_bps[j] / 10_000.0;
            equity -= cost;
            *cost_drag_by_category
                .entry(categories[j].to_string())
                .or_insert(0.0) += cost;
            weights[j] = 0.0;
            book.remove(&asset);
            risk.record(RiskEvent {
                date: ts,
                kind,
                asset: Some(asset),
                value: None,
            });
        }

        risk.update_drawdown_triggers(&equity_values, equity, ts, cfg);

        // regime cap and tilt, panic damping, then the overlay caps
        let mut base_cap = inputs.regime.leverage_cap[i];
        let tilt = inputs.regime.side_tilt[i];
        let mut score_row: Vec<f64> = (0..n).map(|j| inputs.bundle.score.get(i, j)).collect();
        if inputs.regime.panic[i] {
            for s in score_row.iter_mut() {
                *s *= cfg.panic_momentum_multiplier;
            }
            base_cap = base_cap.min(cfg.panic_gross_cap);
        }

        let avg_corr =
            average_pairwise_correlation(&inputs.bundle.returns, i, cfg.corr_lookback_days);
        let effective_cap = risk.apply_caps(
            base_cap,
            avg_corr,
            inputs.regime.market_vol_z[i],
            ts,
            cfg,
        );

        let cov = shrunk_covariance(
            &inputs.bundle.returns,
            i,
            cfg.covariance_window,
            cfg.covariance_shrink,
        );

        let vol_row: Vec<f64> = (0..n).map(|j| inputs.bundle.vol.get(i, j)).collect();
        let (mut target, diag) = build_daily_target_weights(
            &score_row,
            &vol_row,
            &weights,
            cov.as_ref(),
            effective_cap,
            tilt,
            &categories,
            cfg,
        );

        if diag.active_assets < cfg.breadth_min_active_assets
            || diag.active_categories < cfg.breadth_min_categories
            || diag.max_category_share > cfg.breadth_max_category_share
        {
            target = vec![0.0; n];
            risk.record(RiskEvent {
                date: ts,
                kind: RiskEventKind::BreadthGateBlock,
                asset: None,
                value: Some(diag.active_assets as f64),
            });
        }

        // min-hold clamp for young positions
        for (asset, pos) in book.iter() {
            if pos.hold_days >= cfg.min_hold_days {
                continue;
            }
            if let Some(j) = closes.col_of(asset) {
                target[j] = min_hold_target(weights[j], target[j]);
            }
        }

        let target =
            enforce_weight_constraints(target, effective_cap.max(0.0), &categories, cfg);

        let (controlled, turn_diag) = apply_turnover_controls(&weights, &target, cfg);
        raw_turnovers.push(turn_diag.raw_turnover);
        after_band_turnovers.push(turn_diag.turnover_after_band);
        throttled_turnovers.push(turn_diag.throttled_turnover);

        let deltas: Vec<f64> = (0..n).map(|j| controlled[j] - weights[j]).collect();

        let exec_row = i + delay;
        let mut filled = vec![0.0; n];
        if exec_row < n_days {
            let exec_day = closes.index()[exec_row];
            let (day_filled, day_stats, day_logs) = execute_order_slice(
                &assets,
                &deltas,
                exec_day,
                inputs.intraday_closes,
                inputs.features,
                &score_row,
                &cost_bps,
                scenario.liquidity_haircut,
                cfg,
            );
            filled = day_filled;
            exec_stats.merge(&day_stats);
            exec_logs.extend(day_logs);
        }

        for j in 0..n {
            weights[j] += filled[j];
        }
        weights = enforce_weight_constraints(weights, effective_cap.max(0.0), &categories, cfg);

        let mut daily_trade_cost = 0.0;
        for j in 0..n {
            if filled[j].abs() <= 1e-10 {
                continue;
            }
            let cost = filled[j].abs() * equity * cost_bps[j] / 10_000.0;
            daily_trade_cost += cost;
            *cost_drag_by_category
                .entry(categories[j].to_string())
                .or_insert(0.0) += cost;
        }
        equity -= daily_trade_cost;

        // position registry against the realized book
        for j in 0..n {
            let w = weights[j];
            if w.abs() <= 1e-10 {
                book.remove(&assets[j]);
                continue;
            }
            let close = closes.get(i, j);
            if !close.is_finite() || close <= 0.0 {
                continue;
            }
            let side = Side::from_weight(w);
            let reopen = match book.get(&assets[j]) {
                Some(pos) => pos.side != side,
                None => true,
            };
            if reopen {
                let atr = inputs.bundle.atr.get(i, j);
                book.insert(assets[j].clone(), Position::open(side, ts, close, atr, cfg));
            }
        }

        let (active, active_cats, max_share) = breadth_of(&weights, &categories);
        breadth_active.push(active as f64);
        breadth_categories.push(active_cats as f64);
        breadth_shares.push(max_share);

        risk.tick();

        dates.push(ts);
        equity_values.push(equity);
        for j in 0..n {
            weights_panel.set(i, j, weights[j]);
        }
        let net_ret = if prev_equity > 0.0 {
            equity / prev_equity - 1.0
        } else {
            0.0
        };
        net_returns.push(net_ret);
    }

    // regime attribution over the recorded return stream
    let mut regime_attribution = BTreeMap::new();
    for label in [RegimeLabel::RiskOn, RegimeLabel::Neutral, RegimeLabel::RiskOff] {
        let slice: Vec<f64> = (0..n_days)
            .filter(|&i| inputs.regime.state[i] == label)
            .map(|i| net_returns[i])
            .collect();
        regime_attribution.insert(label.as_str().to_string(), summarize_returns(&slice));
    }

    let mut risk_events_by_kind: BTreeMap<String, usize> = BTreeMap::new();
    for event in &risk.events {
        *risk_events_by_kind
            .entry(event.kind.as_str().to_string())
            .or_insert(0) += 1;
    }

    let total_cost_drag: f64 = cost_drag_by_category.values().sum();
    let mean = |xs: &[f64]| {
        if xs.is_empty() {
            None
        } else {
            Some(xs.iter().sum::<f64>() / xs.len() as f64)
        }
    };
    let median = |xs: &[f64]| {
        if xs.is_empty() {
            return None;
        }
        let mut sorted = xs.to_vec();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let mid = sorted.len() / 2;
        Some(if sorted.len() % 2 == 1 {
            sorted[mid]
        } else {
            (sorted[mid - 1] + sorted[mid]) / 2.0
        })
    };

    let bucket_names = ["high", "medium", "low"];
    let mut bucket_counts = BTreeMap::new();
    let mut avg_slippage = BTreeMap::new();
    for (k, name) in bucket_names.iter().enumerate() {
        bucket_counts.insert(name.to_string(), exec_stats.bucket_counts[k]);
        avg_slippage.insert(name.to_string(), mean(&exec_stats.slippage_samples[k]));
    }

    let diagnostics = Diagnostics {
        turnover: TurnoverSummary {
            avg_raw_turnover: mean(&raw_turnovers),
            avg_turnover_after_band: mean(&after_band_turnovers),
            avg_throttled_turnover: mean(&throttled_turnovers),
            median_daily_turnover_pct: median(&throttled_turnovers).map(|m| m * 100.0),
        },
        execution: ExecutionSummary {
            executed: exec_stats.executed,
            deferred: exec_stats.deferred,
            canceled: exec_stats.canceled,
            bucket_counts,
            avg_slippage_bps_by_bucket: avg_slippage,
        },
        cost_drag: CostDragSummary {
            total_cost_drag,
            cost_drag_pct_of_starting_capital: total_cost_drag / cfg.capital * 100.0,
            by_category: cost_drag_by_category,
        },
        breadth: BreadthSummary {
            average_active_assets: mean(&breadth_active),
            average_active_categories: mean(&breadth_categories),
            average_max_category_share: mean(&breadth_shares),
        },
        risk_events_by_kind,
        regime_attribution,
    };

    Ok(ScenarioResult {
        scenario: scenario.name.clone(),
        dates,
        equity: equity_values,
        net_returns: net_returns.clone(),
        weights: weights_panel,
        risk_events: risk.events,
        execution_logs: exec_logs,
        summary: summarize_returns(&net_returns),
        diagnostics,
        quality: inputs.quality.clone(),
    })
}

/// Full pipeline for one scenario: stress the data, slice the window,
/// gate on quality, build signals and regime, then run the daily loop.
pub fn run_backtest(
    data: &MarketData,
    universe: &AssetUniverse,
    cfg: &StrategyConfig,
    scenario: &ScenarioParams,
) -> Result<ScenarioResult, NeutronError> {
    if data.daily_closes.nrows() == 0 {
        return Err(NeutronError::EmptyPriceSeries);
    }
    if data.daily_closes.ncols() == 0 {
        return Err(NeutronError::EmptyUniverse);
    }

    let mut data = data.clone();
    apply_missing_data_stress(&mut data, scenario.missing_data_ratio, scenario.seed, cfg);

    let start_row = match cfg.start_date {
        Some(d) => data.daily_closes.first_row_at_or_after(&d),
        None => 0,
    };
    let end_row = match cfg.end_date {
        Some(d) => data.daily_closes.first_row_after(&d),
        None => data.daily_closes.nrows(),
    };
    if start_row >= end_row {
        return Err(NeutronError::EmptyPriceSeries);
    }
    let bars = end_row - start_row;
    if bars < cfg.min_history_days {
        return Err(NeutronError::InsufficientHistory {
            bars,
            minimum: cfg.min_history_days,
        });
    }

    let daily_closes = data.daily_closes.slice_rows(start_row..end_row);
    let daily_highs = data.daily_highs.slice_rows(start_row..end_row);
    let daily_lows = data.daily_lows.slice_rows(start_row..end_row);

    let quality = build_quality_report(&daily_closes, &data.intraday_closes, universe, cfg);
    if cfg.strict_quality && !quality.hard_pass {
        return Err(NeutronError::QualityGate {
            reason: quality.gate_reason(),
        });
    }
    if quality.eligible_assets.is_empty() {
        return Err(NeutronError::EmptyUniverse);
    }

    let daily_closes = daily_closes.select_columns(&quality.eligible_assets);
    let daily_highs = daily_highs.select_columns(&quality.eligible_assets);
    let daily_lows = daily_lows.select_columns(&quality.eligible_assets);
    let intraday_closes = data.intraday_closes.select_columns(&quality.eligible_assets);

    let (regime, weekly_score_daily) = build_regime_context(&daily_closes, cfg);
    let bundle = build_signal_bundle(
        &daily_closes,
        &daily_highs,
        &daily_lows,
        &weekly_score_daily,
        cfg,
    );
    let features = build_execution_features(&intraday_closes, cfg);

    let inputs = PreparedInputs {
        daily_closes: &daily_closes,
        daily_highs: &daily_highs,
        daily_lows: &daily_lows,
        intraday_closes: &intraday_closes,
        features: &features,
        bundle: &bundle,
        regime: &regime,
        universe,
        quality: &quality,
    };
    run_prepared(&inputs, cfg, scenario)
}

/// Run every scenario of the standard stress matrix.
pub fn run_scenario_matrix(
    data: &MarketData,
    universe: &AssetUniverse,
    cfg: &StrategyConfig,
) -> Result<Vec<ScenarioResult>, NeutronError> {
    let mut results = Vec::new();
    for scenario in ScenarioParams::standard_matrix() {
        results.push(run_backtest(data, universe, cfg, &scenario)?);
    }
    Ok(results)
}
