//! Position lifecycle: entry state, trailing stops, time stops, min-hold.

use crate::domain::config::StrategyConfig;
use chrono::NaiveDate;
use std::collections::BTreeMap;

/// Direction of an open position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Long,
    Short,
}

impl Side {
    pub fn sign(&self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }

    /// Side implied by a non-zero weight.
    pub fn from_weight(weight: f64) -> Side {
        if weight > 0.0 { Side::Long } else { Side::Short }
    }
}

/// Why a position was force-closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitReason {
    StopLoss,
    TimeStop,
}

/// Stop and holding state for one open position.
#[derive(Debug, Clone, PartialEq)]
pub struct Position {
    pub side: Side,
    pub entry_date: NaiveDate,
    pub entry_price: f64,
    pub stop_price: f64,
    /// Entry-to-stop distance at entry; the unit for trailing activation.
    pub initial_risk: f64,
    pub trailing_active: bool,
    pub extreme_price: f64,
    pub hold_days: u32,
}

impl Position {
    /// Open at the close with a stop `initial_stop_atr * atr` away.
    /// A missing or non-positive ATR falls back to 2% of price.
    pub fn open(
        side: Side,
        entry_date: NaiveDate,
        entry_price: f64,
        atr: f64,
        cfg: &StrategyConfig,
    ) -> Self {
        let atr = if atr.is_finite() && atr > 0.0 {
            atr
        } else {
            (0.001 * entry_price).max(0.02 * entry_price)
        };
        let initial_risk = cfg.initial_stop_atr * atr;
        let stop_price = entry_price - side.sign() * initial_risk;
        Self {
            side,
            entry_date,
            entry_price,
            stop_price,
            initial_risk,
            trailing_active: false,
            extreme_price: entry_price,
            hold_days: 0,
        }
    }

    /// One daily update: age the position, track the favorable extreme,
    /// activate and ratchet the trailing stop, then test the forced exits.
    ///
    /// Any of `high`, `low`, `atr`, `score` may be NaN; the corresponding
    /// step is skipped (a NaN score counts as a faded signal for the time
    /// stop).
    pub fn update(
        &mut self,
        high: f64,
        low: f64,
        atr: f64,
        score: f64,
        cfg: &StrategyConfig,
    ) -> Option<ExitReason> {
        self.hold_days += 1;

        match self.side {
            Side::Long => {
                if high.is_finite() {
                    self.extreme_price = self.extreme_price.max(high);
                }
                if self.initial_risk > 0.0 && !self.trailing_active {
                    let run_up = (self.extreme_price - self.entry_price) / self.initial_risk;
                    if run_up >= cfg.trail_activation_r {
                        self.trailing_active = true;
                    }
                }
                if self.trailing_active && atr.is_finite() {
                    // ratchet: the stop only rises
                    self.stop_price = self
                        .stop_price
                        .max(self.extreme_price - cfg.trail_atr * atr);
                }
                if low.is_finite() && low <= self.stop_price {
                    return Some(ExitReason::StopLoss);
                }
            }
            Side::Short => {
                if low.is_finite() {
                    self.extreme_price = self.extreme_price.min(low);
                }
                if self.initial_risk > 0.0 && !self.trailing_active {
                    let run_up = (self.entry_price - self.extreme_price) / self.initial_risk;
                    if run_up >= cfg.trail_activation_r {
                        self.trailing_active = true;
                    }
                }
                if self.trailing_active && atr.is_finite() {
                    self.stop_price = self
                        .stop_price
                        .min(self.extreme_price + cfg.trail_atr * atr);
                }
                if high.is_finite() && high >= self.stop_price {
                    return Some(ExitReason::StopLoss);
                }
            }
        }

        if self.hold_days >= cfg.time_stop_days
            && (!score.is_finite() || score.abs() < cfg.time_stop_score_floor)
        {
            return Some(ExitReason::TimeStop);
        }

        None
    }
}

/// Open positions keyed by asset. `BTreeMap` keeps iteration order stable
/// across runs.
#[derive(Debug, Clone, Default)]
pub struct PositionBook {
    positions: BTreeMap<String, Position>,
}

impl PositionBook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn get(&self, asset: &str) -> Option<&Position> {
        self.positions.get(asset)
    }

    pub fn get_mut(&mut self, asset: &str) -> Option<&mut Position> {
        self.positions.get_mut(asset)
    }

    pub fn insert(&mut self, asset: String, position: Position) {
        self.positions.insert(asset, position);
    }

    pub fn remove(&mut self, asset: &str) {
        self.positions.remove(asset);
    }

    pub fn assets(&self) -> Vec<String> {
        self.positions.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Position)> {
        self.positions.iter()
    }
}

/// Sign in the numpy sense: zero maps to zero.
pub fn sign(x: f64) -> f64 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

/// Min-hold clamp: a position younger than `min_hold_days` may grow on the
/// same side but may not shrink or flip; otherwise the target passes through.
pub fn min_hold_target(current: f64, target: f64) -> f64 {
    if sign(current) != sign(target) || target.abs() < current.abs() {
        current
    } else {
        target
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn cfg() -> StrategyConfig {
        StrategyConfig::default()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    fn long_position() -> Position {
        // entry 100, ATR 2 => initial risk 5, stop 95
        Position::open(Side::Long, day(1), 100.0, 2.0, &cfg())
    }

    #[test]
    fn open_places_initial_stop_by_atr() {
        let p = long_position();
        assert_relative_eq!(p.initial_risk, 5.0);
        assert_relative_eq!(p.stop_price, 95.0);
        assert!(!p.trailing_active);
        assert_eq!(p.hold_days, 0);

        let s = Position::open(Side::Short, day(1), 100.0, 2.0, &cfg());
        assert_relative_eq!(s.stop_price, 105.0);
    }

    #[test]
    fn open_falls_back_to_two_percent_atr() {
        let p = Position::open(Side::Long, day(1), 50.0, f64::NAN, &cfg());
        assert_relative_eq!(p.initial_risk, 2.5 * 1.0); // 2% of 50
        let q = Position::open(Side::Long, day(1), 50.0, -1.0, &cfg());
        assert_relative_eq!(q.initial_risk, p.initial_risk);
    }

    #[test]
    fn trailing_activates_after_one_r_run_up() {
        let mut p = long_position();
        // high 104 => run-up 4/5 < 1R, no activation
        assert_eq!(p.update(104.0, 100.0, 2.0, 1.0, &cfg()), None);
        assert!(!p.trailing_active);
        // high 105 => run-up exactly 1R
        assert_eq!(p.update(105.0, 100.0, 2.0, 1.0, &cfg()), None);
        assert!(p.trailing_active);
        // trailing stop = extreme 105 - 2*ATR 2 = 101 > initial 95
        assert_relative_eq!(p.stop_price, 101.0);
    }

    #[test]
    fn trailing_stop_only_ratchets_toward_profit() {
        let mut p = long_position();
        assert_eq!(p.update(110.0, 107.0, 2.0, 1.0, &cfg()), None);
        assert_relative_eq!(p.stop_price, 106.0);
        // a wider ATR later would lower the stop; the ratchet holds it
        assert_eq!(p.update(110.0, 107.0, 6.0, 1.0, &cfg()), None);
        assert_relative_eq!(p.stop_price, 106.0);
        // new extreme lifts it again
        p.update(114.0, 111.0, 2.0, 1.0, &cfg());
        assert_relative_eq!(p.stop_price, 110.0);
    }

    #[test]
    fn intrabar_breach_forces_stop_loss() {
        let mut p = long_position();
        assert_eq!(
            p.update(100.0, 94.0, 2.0, 1.0, &cfg()),
            Some(ExitReason::StopLoss)
        );

        let mut s = Position::open(Side::Short, day(1), 100.0, 2.0, &cfg());
        assert_eq!(
            s.update(106.0, 99.0, 2.0, -1.0, &cfg()),
            Some(ExitReason::StopLoss)
        );
    }

    #[test]
    fn short_extreme_tracks_the_low() {
        let mut s = Position::open(Side::Short, day(1), 100.0, 2.0, &cfg());
        assert_eq!(s.update(98.5, 95.0, 2.0, -1.0, &cfg()), None);
        assert!(s.trailing_active); // 5-point run-down is 1R
        assert_relative_eq!(s.stop_price, 99.0); // 95 + 2*2
    }

    #[test]
    fn time_stop_requires_age_and_faded_score() {
        let config = cfg();
        let mut p = long_position();
        for _ in 0..14 {
            assert_eq!(p.update(100.0, 99.0, 2.0, 1.0, &config), None);
        }
        // day 15 with a strong score: stays open
        assert_eq!(p.update(100.0, 99.0, 2.0, 1.0, &config), None);
        // faded score triggers
        assert_eq!(
            p.update(100.0, 99.0, 2.0, 0.1, &config),
            Some(ExitReason::TimeStop)
        );
    }

    #[test]
    fn nan_score_counts_as_faded() {
        let mut p = long_position();
        p.hold_days = 15;
        assert_eq!(
            p.update(100.0, 99.0, 2.0, f64::NAN, &cfg()),
            Some(ExitReason::TimeStop)
        );
    }

    #[test]
    fn nan_bars_skip_extreme_and_stop_checks() {
        let mut p = long_position();
        assert_eq!(p.update(f64::NAN, f64::NAN, f64::NAN, 1.0, &cfg()), None);
        assert_relative_eq!(p.extreme_price, 100.0);
        assert_relative_eq!(p.stop_price, 95.0);
        assert_eq!(p.hold_days, 1);
    }

    #[test]
    fn min_hold_blocks_shrink_and_flip() {
        assert_eq!(min_hold_target(0.10, 0.05), 0.10);
        assert_eq!(min_hold_target(0.10, -0.10), 0.10);
        assert_eq!(min_hold_target(0.10, 0.15), 0.15);
        assert_eq!(min_hold_target(-0.10, -0.20), -0.20);
        assert_eq!(min_hold_target(-0.10, 0.0), -0.10);
    }

    #[test]
    fn book_iterates_in_asset_order() {
        let mut book = PositionBook::new();
        book.insert("ZZZ".to_string(), long_position());
        book.insert("AAA".to_string(), long_position());
        assert_eq!(book.assets(), vec!["AAA", "ZZZ"]);
        book.remove("AAA");
        assert_eq!(book.len(), 1);
    }
}
