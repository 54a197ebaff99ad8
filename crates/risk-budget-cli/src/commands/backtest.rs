use clap::{Args, ValueEnum};
use serde_json::Value;

use risk_budget_core::backtest::{self, BacktestInput, RebalanceFrequency};
use risk_budget_core::risk_budgeting::OptimizerKind;

use crate::input;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum FrequencyArg {
    Daily,
    Weekly,
    Monthly,
    Quarterly,
    Annually,
}

impl From<FrequencyArg> for RebalanceFrequency {
    fn from(f: FrequencyArg) -> Self {
        match f {
            FrequencyArg::Daily => RebalanceFrequency::Daily,
            FrequencyArg::Weekly => RebalanceFrequency::Weekly,
            FrequencyArg::Monthly => RebalanceFrequency::Monthly,
            FrequencyArg::Quarterly => RebalanceFrequency::Quarterly,
            FrequencyArg::Annually => RebalanceFrequency::Annually,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OptimizerArg {
    Erc,
    Es,
}

impl From<OptimizerArg> for OptimizerKind {
    fn from(o: OptimizerArg) -> Self {
        match o {
            OptimizerArg::Erc => OptimizerKind::Erc,
            OptimizerArg::Es => OptimizerKind::Es,
        }
    }
}

/// Arguments for a rolling-rebalance backtest. Flags override the file.
#[derive(Args)]
pub struct BacktestArgs {
    /// Path to JSON/YAML file with prices, dates, tickers and weights
    #[arg(long)]
    pub input: Option<String>,

    /// Rebalance frequency
    #[arg(long, value_enum)]
    pub frequency: Option<FrequencyArg>,

    /// Optimiser used at each rebalance
    #[arg(long, value_enum)]
    pub optimizer: Option<OptimizerArg>,

    /// Transaction cost as a fraction of traded notional
    #[arg(long)]
    pub transaction_cost: Option<f64>,

    /// Date index where reported output starts (burn-in)
    #[arg(long)]
    pub output_start_idx: Option<usize>,

    /// Rebalance back to the initial weights instead of optimising
    #[arg(long)]
    pub fixed_weights: bool,

    /// Keep dividends as cash instead of reinvesting
    #[arg(long)]
    pub no_reinvest: bool,
}

pub fn run_backtest(args: BacktestArgs) -> Result<Value, Box<dyn std::error::Error>> {
    let mut bt_input: BacktestInput = input::load(args.input.as_deref(), "backtest")?;
    if let Some(f) = args.frequency {
        bt_input.rebalance.frequency = f.into();
    }
    if let Some(o) = args.optimizer {
        bt_input.optimizer = o.into();
    }
    if let Some(cost) = args.transaction_cost {
        bt_input.rebalance.transaction_cost = cost;
    }
    if let Some(idx) = args.output_start_idx {
        bt_input.output_start_idx = idx;
    }
    if args.fixed_weights {
        bt_input.maintain_fixed_weights = true;
    }
    if args.no_reinvest {
        bt_input.reinvest_dividends = false;
    }
    let result = backtest::run_backtest(&bt_input)?;
    Ok(serde_json::to_value(result)?)
}
