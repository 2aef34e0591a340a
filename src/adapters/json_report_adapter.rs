//! JSON/CSV report adapter.
//!
//! One directory per scenario under the output root: `report.json` with the
//! summary, diagnostics, quality report, and event ledgers, plus flat
//! `equity.csv` and `weights.csv` series for downstream tooling. The matrix
//! writer adds a top-level `summary.json` comparing scenarios.

use crate::domain::engine::{Diagnostics, ScenarioResult};
use crate::domain::error::NeutronError;
use crate::domain::execution::ExecutionLog;
use crate::domain::metrics::SummaryStats;
use crate::domain::quality::QualityReport;
use crate::domain::risk::RiskEvent;
use crate::ports::report_port::ReportPort;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub struct JsonReportAdapter;

#[derive(Serialize)]
struct Report<'a> {
    scenario: &'a str,
    summary: &'a SummaryStats,
    diagnostics: &'a Diagnostics,
    quality: &'a QualityReport,
    risk_events: &'a [RiskEvent],
    execution_logs: &'a [ExecutionLog],
}

impl JsonReportAdapter {
    pub fn new() -> Self {
        Self
    }

    fn scenario_dir(output_dir: &str, scenario: &str) -> PathBuf {
        Path::new(output_dir).join(scenario)
    }

    fn write_equity_csv(result: &ScenarioResult, dir: &Path) -> Result<(), NeutronError> {
        let mut writer = csv::Writer::from_path(dir.join("equity.csv"))
            .map_err(|e| io_error("equity.csv", &e.to_string()))?;
        writer
            .write_record(["date", "equity", "net_return"])
            .map_err(|e| io_error("equity.csv", &e.to_string()))?;
        for i in 0..result.dates.len() {
            writer
                .write_record([
                    result.dates[i].format("%Y-%m-%d").to_string(),
                    format!("{:.6}", result.equity[i]),
                    format!("{:.8}", result.net_returns[i]),
                ])
                .map_err(|e| io_error("equity.csv", &e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| io_error("equity.csv", &e.to_string()))?;
        Ok(())
    }

    fn write_weights_csv(result: &ScenarioResult, dir: &Path) -> Result<(), NeutronError> {
        let mut writer = csv::Writer::from_path(dir.join("weights.csv"))
            .map_err(|e| io_error("weights.csv", &e.to_string()))?;
        let mut header = vec!["date".to_string()];
        header.extend(result.weights.assets().iter().cloned());
        writer
            .write_record(&header)
            .map_err(|e| io_error("weights.csv", &e.to_string()))?;
        for row in 0..result.weights.nrows() {
            let mut record = vec![result.weights.index()[row].format("%Y-%m-%d").to_string()];
            for value in result.weights.row(row) {
                record.push(format!("{value:.8}"));
            }
            writer
                .write_record(&record)
                .map_err(|e| io_error("weights.csv", &e.to_string()))?;
        }
        writer
            .flush()
            .map_err(|e| io_error("weights.csv", &e.to_string()))?;
        Ok(())
    }
}

impl Default for JsonReportAdapter {
    fn default() -> Self {
        Self::new()
    }
}

fn io_error(file: &str, reason: &str) -> NeutronError {
    NeutronError::Data {
        reason: format!("failed to write {file}: {reason}"),
    }
}

impl ReportPort for JsonReportAdapter {
    fn write(&self, result: &ScenarioResult, output_dir: &str) -> Result<(), NeutronError> {
        let dir = Self::scenario_dir(output_dir, &result.scenario);
        fs::create_dir_all(&dir)?;

        let report = Report {
            scenario: &result.scenario,
            summary: &result.summary,
            diagnostics: &result.diagnostics,
            quality: &result.quality,
            risk_events: &result.risk_events,
            execution_logs: &result.execution_logs,
        };
        let json = serde_json::to_string_pretty(&report).map_err(|e| NeutronError::Data {
            reason: format!("failed to serialize report: {e}"),
        })?;
        fs::write(dir.join("report.json"), json)?;

        Self::write_equity_csv(result, &dir)?;
        Self::write_weights_csv(result, &dir)?;
        Ok(())
    }

    fn write_matrix(
        &self,
        results: &[ScenarioResult],
        output_dir: &str,
    ) -> Result<(), NeutronError> {
        for result in results {
            self.write(result, output_dir)?;
        }
        let comparison: BTreeMap<&str, &SummaryStats> = results
            .iter()
            .map(|r| (r.scenario.as_str(), &r.summary))
            .collect();
        let json = serde_json::to_string_pretty(&comparison).map_err(|e| NeutronError::Data {
            reason: format!("failed to serialize scenario summary: {e}"),
        })?;
        fs::create_dir_all(output_dir)?;
        fs::write(Path::new(output_dir).join("summary.json"), json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::summarize_returns;
    use crate::domain::timeseries::Panel;
    use chrono::NaiveDate;
    use tempfile::TempDir;

    fn sample_result(name: &str) -> ScenarioResult {
        let dates: Vec<NaiveDate> = (0..3)
            .map(|i| NaiveDate::from_ymd_opt(2024, 1, 2).unwrap() + chrono::Duration::days(i))
            .collect();
        let mut weights = Panel::new(dates.clone(), vec!["GOLD".to_string(), "BTC".to_string()]);
        for row in 0..3 {
            weights.set(row, 0, 0.1);
            weights.set(row, 1, -0.1);
        }
        let net_returns = vec![0.0, 0.001, -0.0005];
        ScenarioResult {
            scenario: name.to_string(),
            dates,
            equity: vec![1_000_000.0, 1_001_000.0, 1_000_499.5],
            net_returns: net_returns.clone(),
            weights,
            risk_events: vec![],
            execution_logs: vec![],
            summary: summarize_returns(&net_returns),
            diagnostics: Diagnostics {
                turnover: crate::domain::engine::TurnoverSummary {
                    avg_raw_turnover: Some(0.1),
                    avg_turnover_after_band: Some(0.08),
                    avg_throttled_turnover: Some(0.08),
                    median_daily_turnover_pct: Some(8.0),
                },
                execution: crate::domain::engine::ExecutionSummary {
                    executed: 2,
                    deferred: 1,
                    canceled: 0,
                    bucket_counts: BTreeMap::new(),
                    avg_slippage_bps_by_bucket: BTreeMap::new(),
                },
                cost_drag: crate::domain::engine::CostDragSummary {
                    total_cost_drag: 12.0,
                    cost_drag_pct_of_starting_capital: 0.0012,
                    by_category: BTreeMap::new(),
                },
                breadth: crate::domain::engine::BreadthSummary {
                    average_active_assets: Some(2.0),
                    average_active_categories: Some(2.0),
                    average_max_category_share: Some(0.5),
                },
                risk_events_by_kind: BTreeMap::new(),
                regime_attribution: BTreeMap::new(),
            },
            quality: crate::domain::quality::QualityReport {
                hard_pass: true,
                eligible_assets: vec!["GOLD".to_string(), "BTC".to_string()],
                eligible_categories: 2,
                max_category_share: 0.5,
                exclusions: BTreeMap::new(),
            },
        }
    }

    #[test]
    fn write_emits_report_and_series() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().to_str().unwrap();
        JsonReportAdapter::new()
            .write(&sample_result("base"), out)
            .unwrap();

        let report = std::fs::read_to_string(dir.path().join("base/report.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&report).unwrap();
        assert_eq!(parsed["scenario"], "base");
        assert!(parsed["summary"]["total_return_pct"].is_number());

        let equity = std::fs::read_to_string(dir.path().join("base/equity.csv")).unwrap();
        assert!(equity.starts_with("date,equity,net_return"));
        assert_eq!(equity.lines().count(), 4);

        let weights = std::fs::read_to_string(dir.path().join("base/weights.csv")).unwrap();
        assert!(weights.starts_with("date,GOLD,BTC"));
    }

    #[test]
    fn write_matrix_adds_the_comparison_summary() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().to_str().unwrap();
        let results = vec![sample_result("base"), sample_result("stress_1p5x")];
        JsonReportAdapter::new().write_matrix(&results, out).unwrap();

        let summary = std::fs::read_to_string(dir.path().join("summary.json")).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&summary).unwrap();
        assert!(parsed.get("base").is_some());
        assert!(parsed.get("stress_1p5x").is_some());
        assert!(dir.path().join("stress_1p5x/report.json").exists());
    }
}
