use clap::Args;
use serde_json::Value;

use risk_budget_core::estimation::covariance::{self, CovarianceInput};
use risk_budget_core::estimation::returns::{self, ReturnsInput};

use crate::input;

/// Arguments for daily return calculation
#[derive(Args)]
pub struct ReturnsArgs {
    /// Path to JSON/YAML file with `prices` (and optional `dividends`)
    #[arg(long)]
    pub input: Option<String>,

    /// Comma-separated close prices (e.g. "100,101.5,99.8")
    #[arg(long, value_delimiter = ',')]
    pub prices: Option<Vec<f64>>,
}

/// Arguments for covariance estimation
#[derive(Args)]
pub struct CovarianceArgs {
    /// Path to JSON/YAML file with per-asset `returns`
    #[arg(long)]
    pub input: Option<String>,

    /// Shrinkage intensity toward the diagonal (0 to 1), overrides the file
    #[arg(long)]
    pub shrinkage: Option<f64>,
}

pub fn run_returns(args: ReturnsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let returns_input: ReturnsInput = match args.prices {
        Some(prices) => ReturnsInput {
            prices,
            dividends: None,
        },
        None => input::load(args.input.as_deref(), "returns")?,
    };
    let result = returns::calculate_returns_from_input(&returns_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_covariance(args: CovarianceArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut cov_input: CovarianceInput = input::load(args.input.as_deref(), "covariance")?;
    if args.shrinkage.is_some() {
        cov_input.shrinkage = args.shrinkage;
    }
    let result = covariance::estimate_covariance(&cov_input)?;
    Ok(serde_json::to_value(result)?)
}
