//! CSV file data adapter.
//!
//! Expects one pair of files per asset under the base directory:
//! `{ASSET}_daily.csv` with `date,open,high,low,close` rows and
//! `{ASSET}_intraday.csv` with `datetime,close` rows. Assets without a
//! daily file are skipped; assets without an intraday file simply get no
//! intraday column and fall to the quality gate.

use crate::domain::assets::AssetUniverse;
use crate::domain::engine::MarketData;
use crate::domain::error::NeutronError;
use crate::domain::timeseries::Panel;
use crate::ports::data_port::DataPort;
use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

pub struct CsvDataAdapter {
    base_path: PathBuf,
}

struct DailyRow {
    high: f64,
    low: f64,
    close: f64,
}

impl CsvDataAdapter {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn daily_path(&self, asset: &str) -> PathBuf {
        self.base_path.join(format!("{asset}_daily.csv"))
    }

    fn intraday_path(&self, asset: &str) -> PathBuf {
        self.base_path.join(format!("{asset}_intraday.csv"))
    }

    fn read_daily(&self, asset: &str) -> Result<BTreeMap<NaiveDate, DailyRow>, NeutronError> {
        let path = self.daily_path(asset);
        let mut reader = csv::Reader::from_path(&path).map_err(|e| NeutronError::Data {
            reason: format!("failed to open {}: {e}", path.display()),
        })?;

        let mut rows = BTreeMap::new();
        for record in reader.records() {
            let record = record.map_err(|e| csv_error(&path, &e.to_string()))?;
            let date_str = field(&record, 0, "date", &path)?;
            let date = NaiveDate::parse_from_str(date_str.trim(), "%Y-%m-%d")
                .map_err(|e| csv_error(&path, &format!("invalid date {date_str:?}: {e}")))?;
            // open is carried in the file format but unused downstream
            let high = numeric(&record, 2, "high", &path)?;
            let low = numeric(&record, 3, "low", &path)?;
            let close = numeric(&record, 4, "close", &path)?;
            rows.insert(date, DailyRow { high, low, close });
        }
        Ok(rows)
    }

    fn read_intraday(&self, asset: &str) -> Result<BTreeMap<NaiveDateTime, f64>, NeutronError> {
        let path = self.intraday_path(asset);
        let mut reader = csv::Reader::from_path(&path).map_err(|e| NeutronError::Data {
            reason: format!("failed to open {}: {e}", path.display()),
        })?;

        let mut rows = BTreeMap::new();
        for record in reader.records() {
            let record = record.map_err(|e| csv_error(&path, &e.to_string()))?;
            let ts_str = field(&record, 0, "datetime", &path)?;
            let ts = NaiveDateTime::parse_from_str(ts_str.trim(), "%Y-%m-%d %H:%M:%S")
                .map_err(|e| csv_error(&path, &format!("invalid datetime {ts_str:?}: {e}")))?;
            let close = numeric(&record, 1, "close", &path)?;
            rows.insert(ts, close);
        }
        Ok(rows)
    }
}

fn csv_error(path: &Path, reason: &str) -> NeutronError {
    NeutronError::Data {
        reason: format!("{}: {reason}", path.display()),
    }
}

fn field<'r>(
    record: &'r csv::StringRecord,
    idx: usize,
    name: &str,
    path: &Path,
) -> Result<&'r str, NeutronError> {
    record
        .get(idx)
        .ok_or_else(|| csv_error(path, &format!("missing {name} column")))
}

fn numeric(
    record: &csv::StringRecord,
    idx: usize,
    name: &str,
    path: &Path,
) -> Result<f64, NeutronError> {
    let raw = field(record, idx, name, path)?.trim();
    if raw.is_empty() {
        return Ok(f64::NAN);
    }
    raw.parse()
        .map_err(|e| csv_error(path, &format!("invalid {name} value {raw:?}: {e}")))
}

impl DataPort for CsvDataAdapter {
    fn load_market_data(&self, universe: &AssetUniverse) -> Result<MarketData, NeutronError> {
        let mut daily: Vec<(String, BTreeMap<NaiveDate, DailyRow>)> = Vec::new();
        let mut intraday: Vec<(String, BTreeMap<NaiveDateTime, f64>)> = Vec::new();

        for asset in universe.names() {
            if !self.daily_path(&asset).exists() {
                continue;
            }
            let rows = self.read_daily(&asset)?;
            if rows.is_empty() {
                continue;
            }
            if self.intraday_path(&asset).exists() {
                intraday.push((asset.clone(), self.read_intraday(&asset)?));
            }
            daily.push((asset, rows));
        }

        if daily.is_empty() {
            return Err(NeutronError::EmptyUniverse);
        }

        let date_index: Vec<NaiveDate> = daily
            .iter()
            .flat_map(|(_, rows)| rows.keys().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let assets: Vec<String> = daily.iter().map(|(a, _)| a.clone()).collect();

        let mut closes = Panel::new(date_index.clone(), assets.clone());
        let mut highs = Panel::new(date_index.clone(), assets.clone());
        let mut lows = Panel::new(date_index.clone(), assets.clone());
        for (col, (_, rows)) in daily.iter().enumerate() {
            for (date, bar) in rows {
                if let Some(row) = closes.row_of(date) {
                    closes.set(row, col, bar.close);
                    highs.set(row, col, bar.high);
                    lows.set(row, col, bar.low);
                }
            }
        }

        let ts_index: Vec<NaiveDateTime> = intraday
            .iter()
            .flat_map(|(_, rows)| rows.keys().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let intraday_assets: Vec<String> = intraday.iter().map(|(a, _)| a.clone()).collect();
        let mut intraday_closes = Panel::new(ts_index, intraday_assets);
        for (col, (_, rows)) in intraday.iter().enumerate() {
            for (ts, close) in rows {
                if let Some(row) = intraday_closes.row_of(ts) {
                    intraday_closes.set(row, col, *close);
                }
            }
        }

        Ok(MarketData {
            daily_closes: closes,
            daily_highs: highs,
            daily_lows: lows,
            intraday_closes,
        })
    }
}
