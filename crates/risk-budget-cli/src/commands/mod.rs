pub mod analytics;
pub mod backtest;
pub mod estimation;
pub mod risk_budgeting;
