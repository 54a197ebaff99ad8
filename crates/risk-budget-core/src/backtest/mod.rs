pub mod config;
pub mod schedule;
pub mod simulator;
pub mod state;

pub use config::{BacktestInput, RebalanceConfig, RebalanceFrequency};
pub use simulator::{run_backtest, BacktestResult, RebalanceEvent};
