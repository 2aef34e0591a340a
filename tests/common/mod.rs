#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use neutron::domain::assets::AssetUniverse;
use neutron::domain::config::StrategyConfig;
use neutron::domain::engine::MarketData;
use neutron::domain::timeseries::Panel;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn trading_day(i: usize) -> NaiveDate {
    date(2023, 1, 2) + chrono::Duration::days(i as i64)
}

/// Deterministic per-asset price path: a base level, a small persistent
/// drift, and two slow sine components so momentum ranks stay stable but
/// cross-sectional dispersion never collapses.
pub fn synthetic_close(col: usize, row: usize) -> f64 {
    let base = 50.0 * (col as f64 + 1.0);
    let drift = 0.0008 * (col as f64 - 6.5) / 6.5;
    let mut price = base;
    for t in 0..row {
        let r = drift
            + 0.004 * ((t as f64 / 17.0) + col as f64).sin()
            + 0.002 * ((t as f64 / 41.0) + 2.0 * col as f64).sin();
        price *= 1.0 + r;
    }
    price
}

/// Full default universe over `n_days` trading days with two intraday
/// bars per day. Passes the coverage and breadth gates as-is.
pub fn synthetic_market(n_days: usize) -> (MarketData, AssetUniverse) {
    let universe = AssetUniverse::default_universe();
    let names = universe.names();
    let index: Vec<NaiveDate> = (0..n_days).map(trading_day).collect();

    let mut closes = Panel::new(index.clone(), names.clone());
    let mut highs = Panel::new(index.clone(), names.clone());
    let mut lows = Panel::new(index.clone(), names.clone());
    for row in 0..n_days {
        for col in 0..names.len() {
            let close = synthetic_close(col, row);
            closes.set(row, col, close);
            highs.set(row, col, close * 1.012);
            lows.set(row, col, close * 0.988);
        }
    }

    let intraday_index: Vec<NaiveDateTime> = index
        .iter()
        .flat_map(|day| {
            [10, 14]
                .into_iter()
                .map(|h| day.and_hms_opt(h, 0, 0).unwrap())
        })
        .collect();
    let mut intraday = Panel::new(intraday_index, names.clone());
    for row in 0..intraday.nrows() {
        let day = row / 2;
        let half = if row % 2 == 0 { -0.002 } else { 0.001 };
        for col in 0..names.len() {
            intraday.set(row, col, synthetic_close(col, day) * (1.0 + half));
        }
    }

    (
        MarketData {
            daily_closes: closes,
            daily_highs: highs,
            daily_lows: lows,
            intraday_closes: intraday,
        },
        universe,
    )
}

/// Defaults with the per-side minimum relaxed so a fourteen-asset
/// universe reliably populates both books.
pub fn test_config() -> StrategyConfig {
    StrategyConfig {
        min_per_side: 3,
        breadth_min_active_assets: 4,
        ..StrategyConfig::default()
    }
}
