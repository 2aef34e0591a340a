//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::adapters::csv_adapter::CsvDataAdapter;
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::json_report_adapter::JsonReportAdapter;
use crate::domain::assets::AssetUniverse;
use crate::domain::config::{ScenarioParams, StrategyConfig};
use crate::domain::engine::{run_backtest, run_scenario_matrix, MarketData, ScenarioResult};
use crate::domain::error::NeutronError;
use crate::ports::data_port::DataPort;
use crate::ports::report_port::ReportPort;

#[derive(Parser, Debug)]
#[command(name = "neutron", about = "Dollar-neutral long/short backtester")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the base scenario
    Run {
        #[arg(short, long)]
        config: PathBuf,
        /// Price data directory; overrides [backtest] data_dir
        #[arg(short, long)]
        data: Option<PathBuf>,
        #[arg(short, long, default_value = "reports")]
        output: PathBuf,
    },
    /// Run the full stress-scenario matrix
    Scenarios {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data: Option<PathBuf>,
        #[arg(short, long, default_value = "reports")]
        output: PathBuf,
    },
    /// Validate a configuration file
    Validate {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Show universe and data coverage
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(short, long)]
        data: Option<PathBuf>,
    },
}

pub fn run(cli: Cli) -> ExitCode {
    match cli.command {
        Command::Run {
            config,
            data,
            output,
        } => run_single(&config, data.as_ref(), &output),
        Command::Scenarios {
            config,
            data,
            output,
        } => run_scenarios(&config, data.as_ref(), &output),
        Command::Validate { config } => run_validate(&config),
        Command::Info { config, data } => run_info(&config, data.as_ref()),
    }
}

pub fn load_config(path: &PathBuf) -> Result<FileConfigAdapter, ExitCode> {
    FileConfigAdapter::from_file(path).map_err(|e| {
        let err = NeutronError::ConfigParse {
            file: path.display().to_string(),
            reason: e.to_string(),
        };
        eprintln!("error: {err}");
        ExitCode::from(&err)
    })
}

fn build_universe(adapter: &FileConfigAdapter) -> Result<AssetUniverse, NeutronError> {
    use crate::ports::config_port::ConfigPort;
    match adapter.get_string("universe", "assets") {
        Some(spec) => AssetUniverse::parse(&spec, "universe", "assets"),
        None => Ok(AssetUniverse::default_universe()),
    }
}

fn resolve_data_dir(
    adapter: &FileConfigAdapter,
    data_override: Option<&PathBuf>,
) -> Result<PathBuf, NeutronError> {
    use crate::ports::config_port::ConfigPort;
    if let Some(dir) = data_override {
        return Ok(dir.clone());
    }
    adapter
        .get_string("backtest", "data_dir")
        .map(PathBuf::from)
        .ok_or_else(|| NeutronError::ConfigMissing {
            section: "backtest".to_string(),
            key: "data_dir".to_string(),
        })
}

struct LoadedInputs {
    cfg: StrategyConfig,
    universe: AssetUniverse,
    data: MarketData,
}

fn load_inputs(config_path: &PathBuf, data_override: Option<&PathBuf>) -> Result<LoadedInputs, ExitCode> {
    eprintln!("Loading config from {}", config_path.display());
    let adapter = load_config(config_path)?;

    let stage = |e: NeutronError| {
        eprintln!("error: {e}");
        ExitCode::from(&e)
    };

    let cfg = StrategyConfig::from_config(&adapter).map_err(stage)?;
    let universe = build_universe(&adapter).map_err(stage)?;
    let data_dir = resolve_data_dir(&adapter, data_override).map_err(stage)?;

    eprintln!(
        "Loading market data for {} assets from {}",
        universe.len(),
        data_dir.display()
    );
    let data = CsvDataAdapter::new(data_dir)
        .load_market_data(&universe)
        .map_err(stage)?;
    eprintln!(
        "Loaded {} daily bars, {} intraday bars across {} assets",
        data.daily_closes.nrows(),
        data.intraday_closes.nrows(),
        data.daily_closes.ncols()
    );

    Ok(LoadedInputs {
        cfg,
        universe,
        data,
    })
}

fn print_result_line(result: &ScenarioResult) {
    let pct = |v: Option<f64>| v.map_or("n/a".to_string(), |x| format!("{x:.2}%"));
    let num = |v: Option<f64>| v.map_or("n/a".to_string(), |x| format!("{x:.2}"));
    eprintln!(
        "{}: total {} | ann {} | vol {} | sharpe {} | max dd {}",
        result.scenario,
        pct(result.summary.total_return_pct),
        pct(result.summary.annualized_return_pct),
        pct(result.summary.annualized_vol_pct),
        num(result.summary.sharpe),
        pct(result.summary.max_drawdown_pct),
    );
}

fn run_single(config_path: &PathBuf, data_override: Option<&PathBuf>, output: &PathBuf) -> ExitCode {
    let inputs = match load_inputs(config_path, data_override) {
        Ok(i) => i,
        Err(code) => return code,
    };

    eprintln!("Running base scenario...");
    let result = match run_backtest(
        &inputs.data,
        &inputs.universe,
        &inputs.cfg,
        &ScenarioParams::default(),
    ) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    print_result_line(&result);

    let out = output.display().to_string();
    eprintln!("Writing report to {out}");
    if let Err(e) = JsonReportAdapter::new().write(&result, &out) {
        eprintln!("error: {e}");
        return (&e).into();
    }
    ExitCode::SUCCESS
}

fn run_scenarios(
    config_path: &PathBuf,
    data_override: Option<&PathBuf>,
    output: &PathBuf,
) -> ExitCode {
    let inputs = match load_inputs(config_path, data_override) {
        Ok(i) => i,
        Err(code) => return code,
    };

    eprintln!(
        "Running {} scenarios...",
        ScenarioParams::standard_matrix().len()
    );
    let results = match run_scenario_matrix(&inputs.data, &inputs.universe, &inputs.cfg) {
        Ok(r) => r,
        Err(e) => {
            eprintln!("error: {e}");
            return (&e).into();
        }
    };
    for result in &results {
        print_result_line(result);
    }

    let out = output.display().to_string();
    eprintln!("Writing reports to {out}");
    if let Err(e) = JsonReportAdapter::new().write_matrix(&results, &out) {
        eprintln!("error: {e}");
        return (&e).into();
    }
    ExitCode::SUCCESS
}

fn run_validate(config_path: &PathBuf) -> ExitCode {
    let adapter = match load_config(config_path) {
        Ok(a) => a,
        Err(code) => return code,
    };
    match StrategyConfig::from_config(&adapter).and_then(|_| build_universe(&adapter)) {
        Ok(universe) => {
            eprintln!(
                "Config OK: {} assets across the universe",
                universe.len()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

fn run_info(config_path: &PathBuf, data_override: Option<&PathBuf>) -> ExitCode {
    let inputs = match load_inputs(config_path, data_override) {
        Ok(i) => i,
        Err(code) => return code,
    };

    let closes = &inputs.data.daily_closes;
    if let (Some(first), Some(last)) = (closes.index().first(), closes.index().last()) {
        println!("date range: {first} .. {last} ({} bars)", closes.nrows());
    }
    for (col, asset) in closes.assets().iter().enumerate() {
        let intraday = inputs
            .data
            .intraday_closes
            .col_of(asset)
            .map(|c| inputs.data.intraday_closes.coverage(c));
        println!(
            "{asset:>8}  {:>6}  cost {:>4.1} bps  daily coverage {:.1}%  intraday {}",
            inputs.universe.category(asset),
            inputs.universe.cost_bps(asset),
            closes.coverage(col) * 100.0,
            intraday.map_or("none".to_string(), |c| format!("{:.1}%", c * 100.0)),
        );
    }
    ExitCode::SUCCESS
}
