//! Strategy configuration and per-run scenario parameters.

use crate::domain::error::NeutronError;
use crate::ports::config_port::ConfigPort;
use chrono::NaiveDate;

/// Every threshold and window of the strategy, immutable for a run.
///
/// `Default` carries the reference constants; the INI loader only overrides
/// what the file names.
#[derive(Debug, Clone)]
pub struct StrategyConfig {
    // backtest window
    pub capital: f64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub min_history_days: usize,
    pub strict_quality: bool,
    pub market_proxy: String,

    // position lifecycle
    pub atr_lookback: usize,
    pub initial_stop_atr: f64,
    pub trail_activation_r: f64,
    pub trail_atr: f64,
    pub time_stop_days: u32,
    pub time_stop_score_floor: f64,
    pub min_hold_days: u32,

    // turnover control
    pub no_trade_band: f64,
    pub daily_turnover_cap: f64,
    pub step_min: f64,
    pub step_max: f64,

    // drawdown / correlation overlay
    pub dd5_trigger: f64,
    pub dd5_cooldown_days: u32,
    pub dd5_gross_reduction: f64,
    pub dd20_trigger: f64,
    pub dd20_flat_days: u32,
    pub corr_lookback_days: usize,
    pub corr_trigger: f64,
    pub high_vol_z_trigger: f64,
    pub corr_gross_cap: f64,

    // panic overlay
    pub panic_momentum_multiplier: f64,
    pub panic_gross_cap: f64,
    pub panic_vol_z_threshold: f64,
    pub panic_return_lookback: usize,

    // weight construction and hard constraints
    pub name_weight_cap: f64,
    pub category_gross_cap: f64,
    pub dollar_neutral_tolerance: f64,
    pub gross_leverage_floor: f64,
    pub risk_load_factor: f64,
    pub long_quantile: f64,
    pub short_quantile: f64,
    pub min_per_side: usize,
    pub min_valid_assets: usize,

    // breadth gate
    pub breadth_min_active_assets: usize,
    pub breadth_min_categories: usize,
    pub breadth_max_category_share: f64,

    // execution simulator
    pub net_edge_cost_multiple: f64,
    pub exec_windows_per_day: usize,
    pub exec_max_defers: u32,
    pub exec_quality_full_threshold: f64,
    pub exec_quality_half_threshold: f64,
    pub slippage_bps_high: f64,
    pub slippage_bps_medium: f64,
    pub slippage_bps_low: f64,
    pub exec_ema_fast: usize,
    pub exec_ema_slow: usize,

    // signal stack
    pub vol_halflife: f64,
    pub score_clip: f64,
    pub covariance_window: usize,
    pub covariance_shrink: f64,

    // regime
    pub risk_on_cap: f64,
    pub neutral_cap: f64,
    pub risk_off_cap: f64,
    pub risk_on_tilt: f64,
    pub risk_off_tilt: f64,
    pub regime_risk_on_threshold: f64,
    pub regime_risk_off_threshold: f64,

    // data quality
    pub quality_min_coverage: f64,

    // missing-data stress warm-up exemption (rows left untouched)
    pub stress_warmup_daily: usize,
    pub stress_warmup_intraday: usize,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            capital: 1_000_000.0,
            start_date: None,
            end_date: None,
            min_history_days: 200,
            strict_quality: true,
            market_proxy: "SPY".to_string(),

            atr_lookback: 14,
            initial_stop_atr: 2.5,
            trail_activation_r: 1.0,
            trail_atr: 2.0,
            time_stop_days: 15,
            time_stop_score_floor: 0.25,
            min_hold_days: 3,

            no_trade_band: 0.005,
            daily_turnover_cap: 0.30,
            step_min: 0.25,
            step_max: 1.0,

            dd5_trigger: -0.05,
            dd5_cooldown_days: 5,
            dd5_gross_reduction: 0.50,
            dd20_trigger: -0.10,
            dd20_flat_days: 5,
            corr_lookback_days: 60,
            corr_trigger: 0.60,
            high_vol_z_trigger: 1.5,
            corr_gross_cap: 0.50,

            panic_momentum_multiplier: 0.5,
            panic_gross_cap: 0.6,
            panic_vol_z_threshold: 2.0,
            panic_return_lookback: 20,

            name_weight_cap: 0.20,
            category_gross_cap: 0.50,
            dollar_neutral_tolerance: 0.05,
            gross_leverage_floor: 0.50,
            risk_load_factor: 0.15,
            long_quantile: 0.70,
            short_quantile: 0.30,
            min_per_side: 4,
            min_valid_assets: 8,

            breadth_min_active_assets: 6,
            breadth_min_categories: 2,
            breadth_max_category_share: 0.60,

            net_edge_cost_multiple: 2.0,
            exec_windows_per_day: 2,
            exec_max_defers: 2,
            exec_quality_full_threshold: 0.65,
            exec_quality_half_threshold: 0.35,
            slippage_bps_high: 1.0,
            slippage_bps_medium: 3.0,
            slippage_bps_low: 6.0,
            exec_ema_fast: 20,
            exec_ema_slow: 50,

            vol_halflife: 20.0,
            score_clip: 3.0,
            covariance_window: 120,
            covariance_shrink: 0.30,

            risk_on_cap: 1.0,
            neutral_cap: 0.7,
            risk_off_cap: 0.4,
            risk_on_tilt: 0.10,
            risk_off_tilt: -0.10,
            regime_risk_on_threshold: 0.15,
            regime_risk_off_threshold: -0.15,

            quality_min_coverage: 0.90,

            stress_warmup_daily: 130,
            stress_warmup_intraday: 260,
        }
    }
}

fn parse_date(
    adapter: &dyn ConfigPort,
    section: &str,
    key: &str,
) -> Result<Option<NaiveDate>, NeutronError> {
    match adapter.get_string(section, key) {
        None => Ok(None),
        Some(raw) => NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
            .map(Some)
            .map_err(|e| NeutronError::ConfigInvalid {
                section: section.to_string(),
                key: key.to_string(),
                reason: format!("expected YYYY-MM-DD: {e}"),
            }),
    }
}

impl StrategyConfig {
    /// Build a config from an INI adapter, starting from the defaults.
    /// Unknown keys are ignored; listed keys override the default.
    pub fn from_config(adapter: &dyn ConfigPort) -> Result<Self, NeutronError> {
        let d = Self::default();
        let cfg = Self {
            capital: adapter.get_double("backtest", "capital", d.capital),
            start_date: parse_date(adapter, "backtest", "start_date")?,
            end_date: parse_date(adapter, "backtest", "end_date")?,
            min_history_days: adapter.get_int(
                "backtest",
                "min_history_days",
                d.min_history_days as i64,
            ) as usize,
            strict_quality: adapter.get_bool("backtest", "strict_quality", d.strict_quality),
            market_proxy: adapter
                .get_string("backtest", "market_proxy")
                .unwrap_or(d.market_proxy),

            atr_lookback: adapter.get_int("risk", "atr_lookback", d.atr_lookback as i64) as usize,
            initial_stop_atr: adapter.get_double("risk", "initial_stop_atr", d.initial_stop_atr),
            trail_activation_r: adapter.get_double("risk", "trail_activation_r", d.trail_activation_r),
            trail_atr: adapter.get_double("risk", "trail_atr", d.trail_atr),
            time_stop_days: adapter.get_int("risk", "time_stop_days", d.time_stop_days as i64)
                as u32,
            time_stop_score_floor: adapter.get_double(
                "risk",
                "time_stop_score_floor",
                d.time_stop_score_floor,
            ),
            min_hold_days: adapter.get_int("risk", "min_hold_days", d.min_hold_days as i64) as u32,

            no_trade_band: adapter.get_double("turnover", "no_trade_band", d.no_trade_band),
            daily_turnover_cap: adapter.get_double(
                "turnover",
                "daily_turnover_cap",
                d.daily_turnover_cap,
            ),
            step_min: adapter.get_double("turnover", "step_min", d.step_min),
            step_max: adapter.get_double("turnover", "step_max", d.step_max),

            dd5_trigger: adapter.get_double("risk", "dd5_trigger", d.dd5_trigger),
            dd5_cooldown_days: adapter.get_int("risk", "dd5_cooldown_days", d.dd5_cooldown_days as i64)
                as u32,
            dd5_gross_reduction: adapter.get_double(
                "risk",
                "dd5_gross_reduction",
                d.dd5_gross_reduction,
            ),
            dd20_trigger: adapter.get_double("risk", "dd20_trigger", d.dd20_trigger),
            dd20_flat_days: adapter.get_int("risk", "dd20_flat_days", d.dd20_flat_days as i64)
                as u32,
            corr_lookback_days: adapter.get_int(
                "risk",
                "corr_lookback_days",
                d.corr_lookback_days as i64,
            ) as usize,
            corr_trigger: adapter.get_double("risk", "corr_trigger", d.corr_trigger),
            high_vol_z_trigger: adapter.get_double("risk", "high_vol_z_trigger", d.high_vol_z_trigger),
            corr_gross_cap: adapter.get_double("risk", "corr_gross_cap", d.corr_gross_cap),

            panic_momentum_multiplier: adapter.get_double(
                "risk",
                "panic_momentum_multiplier",
                d.panic_momentum_multiplier,
            ),
            panic_gross_cap: adapter.get_double("risk", "panic_gross_cap", d.panic_gross_cap),
            panic_vol_z_threshold: adapter.get_double(
                "risk",
                "panic_vol_z_threshold",
                d.panic_vol_z_threshold,
            ),
            panic_return_lookback: adapter.get_int(
                "risk",
                "panic_return_lookback",
                d.panic_return_lookback as i64,
            ) as usize,

            name_weight_cap: adapter.get_double("weights", "name_weight_cap", d.name_weight_cap),
            category_gross_cap: adapter.get_double(
                "weights",
                "category_gross_cap",
                d.category_gross_cap,
            ),
            dollar_neutral_tolerance: adapter.get_double(
                "weights",
                "dollar_neutral_tolerance",
                d.dollar_neutral_tolerance,
            ),
            gross_leverage_floor: adapter.get_double(
                "weights",
                "gross_leverage_floor",
                d.gross_leverage_floor,
            ),
            risk_load_factor: adapter.get_double("weights", "risk_load_factor", d.risk_load_factor),
            long_quantile: adapter.get_double("weights", "long_quantile", d.long_quantile),
            short_quantile: adapter.get_double("weights", "short_quantile", d.short_quantile),
            min_per_side: adapter.get_int("weights", "min_per_side", d.min_per_side as i64) as usize,
            min_valid_assets: adapter.get_int(
                "weights",
                "min_valid_assets",
                d.min_valid_assets as i64,
            ) as usize,

            breadth_min_active_assets: adapter.get_int(
                "weights",
                "breadth_min_active_assets",
                d.breadth_min_active_assets as i64,
            ) as usize,
            breadth_min_categories: adapter.get_int(
                "weights",
                "breadth_min_categories",
                d.breadth_min_categories as i64,
            ) as usize,
            breadth_max_category_share: adapter.get_double(
                "weights",
                "breadth_max_category_share",
                d.breadth_max_category_share,
            ),

            net_edge_cost_multiple: adapter.get_double(
                "execution",
                "net_edge_cost_multiple",
                d.net_edge_cost_multiple,
            ),
            exec_windows_per_day: adapter.get_int(
                "execution",
                "windows_per_day",
                d.exec_windows_per_day as i64,
            ) as usize,
            exec_max_defers: adapter.get_int("execution", "max_defers", d.exec_max_defers as i64)
                as u32,
            exec_quality_full_threshold: adapter.get_double(
                "execution",
                "quality_full_threshold",
                d.exec_quality_full_threshold,
            ),
            exec_quality_half_threshold: adapter.get_double(
                "execution",
                "quality_half_threshold",
                d.exec_quality_half_threshold,
            ),
            slippage_bps_high: adapter.get_double(
                "execution",
                "slippage_bps_high",
                d.slippage_bps_high,
            ),
            slippage_bps_medium: adapter.get_double(
                "execution",
                "slippage_bps_medium",
                d.slippage_bps_medium,
            ),
            slippage_bps_low: adapter.get_double("execution", "slippage_bps_low", d.slippage_bps_low),
            exec_ema_fast: adapter.get_int("execution", "ema_fast", d.exec_ema_fast as i64) as usize,
            exec_ema_slow: adapter.get_int("execution", "ema_slow", d.exec_ema_slow as i64) as usize,

            vol_halflife: adapter.get_double("signals", "vol_halflife", d.vol_halflife),
            score_clip: adapter.get_double("signals", "score_clip", d.score_clip),
            covariance_window: adapter.get_int(
                "signals",
                "covariance_window",
                d.covariance_window as i64,
            ) as usize,
            covariance_shrink: adapter.get_double(
                "signals",
                "covariance_shrink",
                d.covariance_shrink,
            ),

            risk_on_cap: adapter.get_double("regime", "risk_on_cap", d.risk_on_cap),
            neutral_cap: adapter.get_double("regime", "neutral_cap", d.neutral_cap),
            risk_off_cap: adapter.get_double("regime", "risk_off_cap", d.risk_off_cap),
            risk_on_tilt: adapter.get_double("regime", "risk_on_tilt", d.risk_on_tilt),
            risk_off_tilt: adapter.get_double("regime", "risk_off_tilt", d.risk_off_tilt),
            regime_risk_on_threshold: adapter.get_double(
                "regime",
                "risk_on_threshold",
                d.regime_risk_on_threshold,
            ),
            regime_risk_off_threshold: adapter.get_double(
                "regime",
                "risk_off_threshold",
                d.regime_risk_off_threshold,
            ),

            quality_min_coverage: adapter.get_double(
                "quality",
                "min_coverage",
                d.quality_min_coverage,
            ),

            stress_warmup_daily: adapter.get_int(
                "quality",
                "stress_warmup_daily",
                d.stress_warmup_daily as i64,
            ) as usize,
            stress_warmup_intraday: adapter.get_int(
                "quality",
                "stress_warmup_intraday",
                d.stress_warmup_intraday as i64,
            ) as usize,
        };
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the simulation cannot run with.
    pub fn validate(&self) -> Result<(), NeutronError> {
        fn invalid(section: &str, key: &str, reason: &str) -> NeutronError {
            NeutronError::ConfigInvalid {
                section: section.to_string(),
                key: key.to_string(),
                reason: reason.to_string(),
            }
        }

        if !(self.capital > 0.0) {
            return Err(invalid("backtest", "capital", "must be positive"));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if end < start {
                return Err(invalid("backtest", "end_date", "must not precede start_date"));
            }
        }
        if self.atr_lookback == 0 {
            return Err(invalid("risk", "atr_lookback", "must be at least 1"));
        }
        if !(self.initial_stop_atr > 0.0) {
            return Err(invalid("risk", "initial_stop_atr", "must be positive"));
        }
        if !(self.trail_atr > 0.0) {
            return Err(invalid("risk", "trail_atr", "must be positive"));
        }
        if !(self.dd5_trigger < 0.0) {
            return Err(invalid("risk", "dd5_trigger", "must be negative"));
        }
        if !(self.dd20_trigger < 0.0) {
            return Err(invalid("risk", "dd20_trigger", "must be negative"));
        }
        if !(0.0..=1.0).contains(&self.dd5_gross_reduction) {
            return Err(invalid("risk", "dd5_gross_reduction", "must be in [0, 1]"));
        }
        if !(self.no_trade_band >= 0.0) {
            return Err(invalid("turnover", "no_trade_band", "must be non-negative"));
        }
        if !(self.step_min > 0.0 && self.step_min <= self.step_max) {
            return Err(invalid(
                "turnover",
                "step_min",
                "must be positive and not exceed step_max",
            ));
        }
        if !(self.step_max <= 1.0) {
            return Err(invalid("turnover", "step_max", "must not exceed 1"));
        }
        if !(self.name_weight_cap > 0.0) {
            return Err(invalid("weights", "name_weight_cap", "must be positive"));
        }
        if !(self.category_gross_cap > 0.0) {
            return Err(invalid("weights", "category_gross_cap", "must be positive"));
        }
        if !(self.dollar_neutral_tolerance >= 0.0) {
            return Err(invalid(
                "weights",
                "dollar_neutral_tolerance",
                "must be non-negative",
            ));
        }
        if !(0.0 < self.short_quantile
            && self.short_quantile < self.long_quantile
            && self.long_quantile < 1.0)
        {
            return Err(invalid(
                "weights",
                "long_quantile",
                "quantiles must satisfy 0 < short < long < 1",
            ));
        }
        if self.exec_windows_per_day == 0 {
            return Err(invalid("execution", "windows_per_day", "must be at least 1"));
        }
        if !(self.exec_quality_half_threshold <= self.exec_quality_full_threshold) {
            return Err(invalid(
                "execution",
                "quality_half_threshold",
                "must not exceed quality_full_threshold",
            ));
        }
        if !(self.vol_halflife > 0.0) {
            return Err(invalid("signals", "vol_halflife", "must be positive"));
        }
        if self.covariance_window < 2 {
            return Err(invalid("signals", "covariance_window", "must be at least 2"));
        }
        if !(0.0..=1.0).contains(&self.covariance_shrink) {
            return Err(invalid("signals", "covariance_shrink", "must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.quality_min_coverage) {
            return Err(invalid("quality", "min_coverage", "must be in [0, 1]"));
        }
        Ok(())
    }
}

/// Per-run stress knobs. `Default` is the base scenario.
#[derive(Debug, Clone)]
pub struct ScenarioParams {
    pub name: String,
    pub cost_multiplier: f64,
    pub one_day_delay: bool,
    pub missing_data_ratio: f64,
    pub liquidity_haircut: f64,
    pub short_borrow_bps_per_day: f64,
    pub seed: u64,
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self {
            name: "base".to_string(),
            cost_multiplier: 1.0,
            one_day_delay: false,
            missing_data_ratio: 0.0,
            liquidity_haircut: 1.0,
            short_borrow_bps_per_day: 0.0,
            seed: 42,
        }
    }
}

impl ScenarioParams {
    /// The canned stress matrix run by the `scenarios` subcommand.
    pub fn standard_matrix() -> Vec<ScenarioParams> {
        let base = ScenarioParams::default();
        vec![
            base.clone(),
            ScenarioParams {
                name: "stress_1p5x".to_string(),
                cost_multiplier: 1.5,
                ..base.clone()
            },
            ScenarioParams {
                name: "stress_2p0x_delay".to_string(),
                cost_multiplier: 2.0,
                one_day_delay: true,
                ..base.clone()
            },
            ScenarioParams {
                name: "stress_missing_data".to_string(),
                missing_data_ratio: 0.05,
                ..base.clone()
            },
            ScenarioParams {
                name: "stress_liquidity".to_string(),
                liquidity_haircut: 0.5,
                ..base.clone()
            },
            ScenarioParams {
                name: "stress_borrow_funding".to_string(),
                short_borrow_bps_per_day: 2.0,
                ..base
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::file_config_adapter::FileConfigAdapter;

    #[test]
    fn defaults_pass_validation() {
        StrategyConfig::default().validate().unwrap();
    }

    #[test]
    fn from_config_overrides_listed_keys_only() {
        let adapter = FileConfigAdapter::from_string(
            "[backtest]\ncapital = 250000\nstart_date = 2024-03-01\n\n[turnover]\ndaily_turnover_cap = 0.2\n",
        )
        .unwrap();
        let cfg = StrategyConfig::from_config(&adapter).unwrap();
        assert_eq!(cfg.capital, 250_000.0);
        assert_eq!(
            cfg.start_date,
            Some(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
        );
        assert_eq!(cfg.daily_turnover_cap, 0.2);
        // untouched keys keep the defaults
        assert_eq!(cfg.no_trade_band, 0.005);
        assert_eq!(cfg.min_history_days, 200);
    }

    #[test]
    fn from_config_rejects_bad_date() {
        let adapter =
            FileConfigAdapter::from_string("[backtest]\nstart_date = 03/01/2024\n").unwrap();
        let err = StrategyConfig::from_config(&adapter).unwrap_err();
        assert!(matches!(err, NeutronError::ConfigInvalid { .. }));
    }

    #[test]
    fn validate_rejects_inverted_quantiles() {
        let cfg = StrategyConfig {
            long_quantile: 0.3,
            short_quantile: 0.7,
            ..StrategyConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_inverted_date_range() {
        let cfg = StrategyConfig {
            start_date: NaiveDate::from_ymd_opt(2024, 6, 1),
            end_date: NaiveDate::from_ymd_opt(2024, 1, 1),
            ..StrategyConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_positive_drawdown_trigger() {
        let cfg = StrategyConfig {
            dd5_trigger: 0.05,
            ..StrategyConfig::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn standard_matrix_has_independent_scenarios() {
        let matrix = ScenarioParams::standard_matrix();
        assert_eq!(matrix.len(), 6);
        assert_eq!(matrix[0].name, "base");
        assert!(matrix.iter().all(|s| s.seed == 42));
        let delayed = matrix.iter().find(|s| s.one_day_delay).unwrap();
        assert_eq!(delayed.cost_multiplier, 2.0);
    }
}
