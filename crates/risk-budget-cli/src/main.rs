mod commands;
mod input;
mod output;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use std::process;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use commands::analytics::{DrawdownArgs, StressArgs, WorstPeriodArgs};
use commands::backtest::BacktestArgs;
use commands::estimation::{CovarianceArgs, ReturnsArgs};
use commands::risk_budgeting::{ErcArgs, EsArgs, RiskContributionArgs};

/// Risk-budgeting optimisers and rolling backtests
#[derive(Parser)]
#[command(
    name = "rbt",
    version,
    about = "Risk-budgeting portfolio optimisation and backtesting",
    long_about = "A CLI for risk-budgeted portfolio construction. Estimates returns and \
                  covariances, solves Equal Risk Contribution and Gaussian Expected \
                  Shortfall budgets, runs rolling-rebalance backtests with dividends and \
                  transaction costs, and stress-tests volatility shocks."
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output format
    #[arg(long, default_value = "json", global = true)]
    output: OutputFormat,

    /// Log optimiser and backtest diagnostics to stderr
    #[arg(long, short, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Daily (total) returns from a price series
    Returns(ReturnsArgs),
    /// Annualised covariance and correlation of return series
    Covariance(CovarianceArgs),
    /// Equal Risk Contribution / variance risk budgeting
    Erc(ErcArgs),
    /// Gaussian Expected Shortfall risk budgeting
    Es(EsArgs),
    /// Risk-contribution breakdown of a weight vector
    RiskContributions(RiskContributionArgs),
    /// Rolling-rebalance backtest
    Backtest(BacktestArgs),
    /// Maximum drawdown of a value series
    Drawdown(DrawdownArgs),
    /// Worst fixed-length window of a value series
    WorstPeriod(WorstPeriodArgs),
    /// Re-optimise under a volatility shock
    Stress(StressArgs),
    /// Print version information
    Version,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum OutputFormat {
    Json,
    Table,
    Csv,
    Minimal,
}

fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result: Result<serde_json::Value, Box<dyn std::error::Error>> = match cli.command {
        Commands::Returns(args) => commands::estimation::run_returns(args),
        Commands::Covariance(args) => commands::estimation::run_covariance(args),
        Commands::Erc(args) => commands::risk_budgeting::run_erc(args),
        Commands::Es(args) => commands::risk_budgeting::run_es(args),
        Commands::RiskContributions(args) => commands::risk_budgeting::run_risk_contributions(args),
        Commands::Backtest(args) => commands::backtest::run_backtest(args),
        Commands::Drawdown(args) => commands::analytics::run_drawdown(args),
        Commands::WorstPeriod(args) => commands::analytics::run_worst_period(args),
        Commands::Stress(args) => commands::analytics::run_stress(args),
        Commands::Version => {
            println!("rbt {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    match result {
        Ok(value) => {
            output::format_output(&cli.output, &value);
            process::exit(0);
        }
        Err(e) => {
            eprintln!("{}: {}", "error".red().bold(), e);
            process::exit(1);
        }
    }
}
