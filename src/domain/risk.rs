//! Portfolio risk overlay: drawdown cooldowns, correlation/vol gross cap,
//! and the risk-event ledger.

use crate::domain::config::StrategyConfig;
use chrono::NaiveDate;
use serde::Serialize;

/// What tripped. Serialized with the reference event names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskEventKind {
    StopLoss,
    TimeStop,
    PortfolioDd5Cut,
    PortfolioDd20Flat,
    CorrVolGrossCap,
    BreadthGateBlock,
}

impl RiskEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RiskEventKind::StopLoss => "stop_loss",
            RiskEventKind::TimeStop => "time_stop",
            RiskEventKind::PortfolioDd5Cut => "portfolio_dd5_cut",
            RiskEventKind::PortfolioDd20Flat => "portfolio_dd20_flat",
            RiskEventKind::CorrVolGrossCap => "corr_vol_gross_cap",
            RiskEventKind::BreadthGateBlock => "breadth_gate_block",
        }
    }
}

/// One ledger entry. `asset` is set for per-position exits, `value` carries
/// the trigger magnitude where one exists.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RiskEvent {
    pub date: NaiveDate,
    pub kind: RiskEventKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
}

/// Per-run overlay state. Counters tick down once per simulated day.
#[derive(Debug, Clone, Default)]
pub struct RiskState {
    dd5_cooldown: u32,
    dd20_flat: u32,
    corr_cap_active: bool,
    pub events: Vec<RiskEvent>,
}

impl RiskState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dd5_active(&self) -> bool {
        self.dd5_cooldown > 0
    }

    pub fn dd20_active(&self) -> bool {
        self.dd20_flat > 0
    }

    pub fn record(&mut self, event: RiskEvent) {
        self.events.push(event);
    }

    /// Compare today's equity against the trailing 5- and 20-day windows and
    /// arm the corresponding cooldowns. `history` is the equity series
    /// recorded so far, excluding today.
    pub fn update_drawdown_triggers(
        &mut self,
        history: &[f64],
        equity_now: f64,
        date: NaiveDate,
        cfg: &StrategyConfig,
    ) {
        if history.len() >= 5 {
            let peak = history[history.len() - 5..]
                .iter()
                .copied()
                .fold(equity_now, f64::max);
            let dd5 = equity_now / peak - 1.0;
            if dd5 <= cfg.dd5_trigger && self.dd5_cooldown == 0 {
                self.dd5_cooldown = cfg.dd5_cooldown_days;
                self.record(RiskEvent {
                    date,
                    kind: RiskEventKind::PortfolioDd5Cut,
                    asset: None,
                    value: Some(dd5),
                });
            }
        }

        if history.len() >= 20 {
            let peak = history[history.len() - 20..]
                .iter()
                .copied()
                .fold(equity_now, f64::max);
            let dd20 = equity_now / peak - 1.0;
            if dd20 <= cfg.dd20_trigger && self.dd20_flat == 0 {
                self.dd20_flat = cfg.dd20_flat_days;
                self.record(RiskEvent {
                    date,
                    kind: RiskEventKind::PortfolioDd20Flat,
                    asset: None,
                    value: Some(dd20),
                });
            }
        }
    }

    /// Compose the effective gross cap from a base cap: multiplicative dd5
    /// cut, dd20 flat (cap forced to zero), and the joint correlation/vol
    /// ceiling. The correlation event is logged on the rising edge only.
    pub fn apply_caps(
        &mut self,
        base_cap: f64,
        avg_corr: f64,
        market_vol_z: f64,
        date: NaiveDate,
        cfg: &StrategyConfig,
    ) -> f64 {
        let mut cap = base_cap;

        if self.dd5_cooldown > 0 {
            cap *= (1.0 - cfg.dd5_gross_reduction).max(0.0);
        }
        if self.dd20_flat > 0 {
            cap = 0.0;
        }

        let corr_condition = avg_corr.is_finite()
            && avg_corr > cfg.corr_trigger
            && market_vol_z.is_finite()
            && market_vol_z > cfg.high_vol_z_trigger;

        if corr_condition {
            cap = cap.min(cfg.corr_gross_cap);
            if !self.corr_cap_active {
                self.record(RiskEvent {
                    date,
                    kind: RiskEventKind::CorrVolGrossCap,
                    asset: None,
                    value: Some(avg_corr),
                });
                self.corr_cap_active = true;
            }
        } else {
            self.corr_cap_active = false;
        }

        cap.max(0.0)
    }

    /// End-of-day counter decrement.
    pub fn tick(&mut self) {
        if self.dd5_cooldown > 0 {
            self.dd5_cooldown -= 1;
        }
        if self.dd20_flat > 0 {
            self.dd20_flat -= 1;
        }
    }
}
