pub mod error;
pub mod linalg;
pub mod types;

#[cfg(feature = "estimation")]
pub mod estimation;

#[cfg(feature = "risk_budgeting")]
pub mod risk_budgeting;

#[cfg(feature = "analytics")]
pub mod analytics;

#[cfg(feature = "backtest")]
pub mod backtest;

pub use error::RiskBudgetError;
pub use types::*;

/// Standard result type for all risk-budget operations
pub type RiskBudgetResult<T> = Result<T, RiskBudgetError>;
