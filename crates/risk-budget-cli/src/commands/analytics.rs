use clap::Args;
use serde_json::Value;

use risk_budget_core::analytics::metrics::{self, DrawdownInput, WorstPeriodInput};
use risk_budget_core::analytics::stress::{self, StressInput};

use crate::input;

/// Arguments for maximum drawdown
#[derive(Args)]
pub struct DrawdownArgs {
    /// Path to JSON/YAML file with `values`
    #[arg(long)]
    pub input: Option<String>,

    /// Comma-separated portfolio values (e.g. "100,110,105,90,95,120")
    #[arg(long, value_delimiter = ',')]
    pub values: Option<Vec<f64>>,
}

/// Arguments for the worst-window scan
#[derive(Args)]
pub struct WorstPeriodArgs {
    /// Path to JSON/YAML file with `values` and `dates`
    #[arg(long)]
    pub input: Option<String>,

    /// Window length in observations, overrides the file
    #[arg(long)]
    pub window_days: Option<usize>,
}

/// Arguments for a volatility-shock stress test
#[derive(Args)]
pub struct StressArgs {
    /// Path to JSON/YAML file with `covariance_matrix` and `scale_factor`
    #[arg(long)]
    pub input: Option<String>,

    /// Covariance multiplier, overrides the file
    #[arg(long)]
    pub scale: Option<f64>,
}

pub fn run_drawdown(args: DrawdownArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let dd_input: DrawdownInput = match args.values {
        Some(values) => DrawdownInput { values },
        None => input::load(args.input.as_deref(), "drawdown")?,
    };
    if dd_input.values.is_empty() {
        return Err("At least one value required for drawdown".into());
    }
    let result = metrics::calculate_max_drawdown(&dd_input.values);
    Ok(serde_json::to_value(result)?)
}

pub fn run_worst_period(args: WorstPeriodArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut wp_input: WorstPeriodInput = input::load(args.input.as_deref(), "worst period")?;
    if let Some(w) = args.window_days {
        wp_input.window_days = w;
    }
    let result = metrics::find_worst_period_from_input(&wp_input)?;
    Ok(serde_json::to_value(result)?)
}

pub fn run_stress(args: StressArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut stress_input: StressInput = input::load(args.input.as_deref(), "stress test")?;
    if let Some(scale) = args.scale {
        stress_input.scale_factor = scale;
    }
    let result = stress::run_volatility_stress(&stress_input)?;
    Ok(serde_json::to_value(result)?)
}
