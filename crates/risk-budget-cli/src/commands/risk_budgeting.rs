use clap::Args;
use serde_json::Value;

use risk_budget_core::risk_budgeting::contributions::{self, RiskContributionInput};
use risk_budget_core::risk_budgeting::erc::{self, ErcInput};
use risk_budget_core::risk_budgeting::expected_shortfall::{self, EsInput};

use crate::input;

/// Arguments for Equal Risk Contribution optimisation
#[derive(Args)]
pub struct ErcArgs {
    /// Path to JSON/YAML file with `covariance_matrix` and optional `budgets`
    #[arg(long)]
    pub input: Option<String>,

    /// Scale the solution to this annualised volatility
    #[arg(long)]
    pub target_volatility: Option<f64>,
}

/// Arguments for Gaussian Expected Shortfall optimisation
#[derive(Args)]
pub struct EsArgs {
    /// Path to JSON/YAML file with `mu`, `sigma` and optional settings
    #[arg(long)]
    pub input: Option<String>,

    /// Tail confidence level (e.g. 0.975), overrides the file
    #[arg(long)]
    pub confidence: Option<f64>,
}

/// Arguments for a risk-contribution breakdown
#[derive(Args)]
pub struct RiskContributionArgs {
    /// Path to JSON/YAML file with `weights` and `covariance_matrix`
    #[arg(long)]
    pub input: Option<String>,
}

pub fn run_erc(args: ErcArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut erc_input: ErcInput = input::load(args.input.as_deref(), "ERC optimisation")?;
    if args.target_volatility.is_some() {
        erc_input.target_volatility = args.target_volatility;
    }
    let result = erc::optimize_erc(&erc_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_es(args: EsArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut es_input: EsInput = input::load(args.input.as_deref(), "ES optimisation")?;
    if let Some(alpha) = args.confidence {
        es_input.confidence_level = alpha;
    }
    let result = expected_shortfall::optimize_expected_shortfall(&es_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_risk_contributions(
    args: RiskContributionArgs,
) -> Result<Value, Box<dyn std::error::Error>> {
    let rc_input: RiskContributionInput =
        input::load(args.input.as_deref(), "risk contributions")?;
    let result =
        contributions::analyze_risk_contributions(&rc_input.weights, &rc_input.covariance_matrix)?;
    Ok(serde_json::to_value(result)?)
}
