use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::RiskBudgetError;
use crate::linalg::validate_simplex_vector;
use crate::risk_budgeting::OptimizerKind;
use crate::types::{Money, Rate, DEFAULT_TAIL_CONFIDENCE, TRADING_DAYS_PER_YEAR};
use crate::RiskBudgetResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceFrequency {
    Daily,
    Weekly,
    #[default]
    Monthly,
    Quarterly,
    Annually,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RebalanceConfig {
    #[serde(default)]
    pub frequency: RebalanceFrequency,
    /// Cost as a fraction of traded notional (0.001 = 10 bps)
    #[serde(default = "default_transaction_cost")]
    pub transaction_cost: Rate,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            frequency: RebalanceFrequency::default(),
            transaction_cost: default_transaction_cost(),
        }
    }
}

/// Input for a rolling-rebalance backtest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestInput {
    /// Close prices by ticker, aligned to `dates`
    pub prices: BTreeMap<String, Vec<f64>>,
    /// Per-share cash dividends by ticker; a missing ticker pays nothing
    #[serde(default)]
    pub dividends: BTreeMap<String, Vec<f64>>,
    /// ISO dates (YYYY-MM-DD), one per price row
    pub dates: Vec<String>,
    /// Asset order used for weights and every per-asset output
    pub tickers: Vec<String>,
    pub initial_weights: Vec<f64>,
    #[serde(default)]
    pub rebalance: RebalanceConfig,
    #[serde(default = "default_initial_capital")]
    pub initial_capital: Money,
    #[serde(default = "default_reinvest_dividends")]
    pub reinvest_dividends: bool,
    /// Risk budgets passed to the optimiser (default equal risk)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_budgets: Option<Vec<f64>>,
    /// Trailing estimation window in years of 252 trading days; `None`
    /// estimates over all history up to the rebalance date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lookback_years: Option<f64>,
    /// Rebalance back to `initial_weights` instead of optimising
    #[serde(default)]
    pub maintain_fixed_weights: bool,
    #[serde(default)]
    pub optimizer: OptimizerKind,
    /// Tail confidence for the ES optimiser
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
    /// Burn-in: output starts at this date index, rebased to initial capital
    #[serde(default)]
    pub output_start_idx: usize,
}

fn default_transaction_cost() -> Rate {
    0.001
}

fn default_initial_capital() -> Money {
    10_000.0
}

fn default_reinvest_dividends() -> bool {
    true
}

fn default_confidence_level() -> f64 {
    DEFAULT_TAIL_CONFIDENCE
}

impl BacktestInput {
    /// Input with every optional setting at its default.
    pub fn new(
        tickers: Vec<String>,
        dates: Vec<String>,
        prices: BTreeMap<String, Vec<f64>>,
        initial_weights: Vec<f64>,
    ) -> Self {
        Self {
            prices,
            dividends: BTreeMap::new(),
            dates,
            tickers,
            initial_weights,
            rebalance: RebalanceConfig::default(),
            initial_capital: default_initial_capital(),
            reinvest_dividends: default_reinvest_dividends(),
            target_budgets: None,
            lookback_years: None,
            maintain_fixed_weights: false,
            optimizer: OptimizerKind::default(),
            confidence_level: default_confidence_level(),
            output_start_idx: 0,
        }
    }

    /// Trailing window length in trading days (at least one), or `None`
    /// for an expanding window.
    pub fn lookback_days(&self) -> Option<usize> {
        self.lookback_years
            .map(|years| ((years * TRADING_DAYS_PER_YEAR).round() as usize).max(1))
    }

    /// Check shapes and ranges, returning prices and dividends in ticker order.
    pub(crate) fn aligned_series(&self) -> RiskBudgetResult<(Vec<&[f64]>, Vec<Vec<f64>>)> {
        let n = self.tickers.len();
        let m = self.dates.len();
        if n == 0 {
            return Err(RiskBudgetError::InsufficientData(
                "At least one ticker required".into(),
            ));
        }
        validate_simplex_vector("initial_weights", &self.initial_weights, n)?;
        if let Some(ref b) = self.target_budgets {
            validate_simplex_vector("target_budgets", b, n)?;
        }
        if !(self.initial_capital > 0.0 && self.initial_capital.is_finite()) {
            return Err(RiskBudgetError::invalid("initial_capital", "Must be positive"));
        }
        let cost = self.rebalance.transaction_cost;
        if !(0.0..1.0).contains(&cost) {
            return Err(RiskBudgetError::invalid(
                "rebalance.transaction_cost",
                "Must lie in [0, 1)",
            ));
        }
        if let Some(years) = self.lookback_years {
            if !(years > 0.0 && years.is_finite()) {
                return Err(RiskBudgetError::invalid("lookback_years", "Must be positive"));
            }
        }

        let mut prices = Vec::with_capacity(n);
        let mut dividends = Vec::with_capacity(n);
        for ticker in &self.tickers {
            let series = self.prices.get(ticker).ok_or_else(|| {
                RiskBudgetError::invalid(format!("prices.{}", ticker), "Missing price series")
            })?;
            if series.len() != m {
                return Err(RiskBudgetError::mismatch(
                    format!("prices.{}", ticker),
                    m,
                    series.len(),
                ));
            }
            if series.iter().any(|p| !p.is_finite() || *p < 0.0) {
                return Err(RiskBudgetError::invalid(
                    format!("prices.{}", ticker),
                    "Prices must be finite and non-negative",
                ));
            }
            prices.push(series.as_slice());

            match self.dividends.get(ticker) {
                Some(d) if d.len() != m => {
                    return Err(RiskBudgetError::mismatch(
                        format!("dividends.{}", ticker),
                        m,
                        d.len(),
                    ));
                }
                Some(d) => dividends.push(d.clone()),
                None => dividends.push(vec![0.0; m]),
            }
        }
        Ok((prices, dividends))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> BacktestInput {
        let mut prices = BTreeMap::new();
        prices.insert("A".to_string(), vec![10.0, 11.0, 12.0]);
        prices.insert("B".to_string(), vec![20.0, 19.0, 21.0]);
        BacktestInput::new(
            vec!["A".into(), "B".into()],
            vec!["2024-01-02".into(), "2024-01-03".into(), "2024-01-04".into()],
            prices,
            vec![0.5, 0.5],
        )
    }

    #[test]
    fn test_defaults_from_minimal_json() {
        let json = r#"{
            "prices": {"A": [1.0, 2.0]},
            "dates": ["2024-01-02", "2024-01-03"],
            "tickers": ["A"],
            "initial_weights": [1.0]
        }"#;
        let parsed: BacktestInput = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.initial_capital, 10_000.0);
        assert!(parsed.reinvest_dividends);
        assert_eq!(parsed.rebalance.frequency, RebalanceFrequency::Monthly);
        assert_eq!(parsed.optimizer, OptimizerKind::Erc);
        assert_eq!(parsed.lookback_years, None);
        assert_eq!(parsed.lookback_days(), None);
    }

    #[test]
    fn test_missing_dividends_are_zero() {
        let (_, dividends) = input().aligned_series().unwrap();
        assert_eq!(dividends, vec![vec![0.0; 3], vec![0.0; 3]]);
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let mut bad = input();
        bad.prices.insert("B".to_string(), vec![20.0, 19.0]);
        assert!(matches!(
            bad.aligned_series(),
            Err(RiskBudgetError::DimensionMismatch { .. })
        ));

        let mut bad_div = input();
        bad_div.dividends.insert("A".to_string(), vec![0.0]);
        assert!(bad_div.aligned_series().is_err());
    }

    #[test]
    fn test_weights_and_costs_validated() {
        let mut bad = input();
        bad.initial_weights = vec![1.0];
        assert!(bad.aligned_series().is_err());

        let mut bad_cost = input();
        bad_cost.rebalance.transaction_cost = 1.5;
        assert!(bad_cost.aligned_series().is_err());
    }

    #[test]
    fn test_lookback_years_to_days() {
        let mut one_year = input();
        one_year.lookback_years = Some(1.0);
        assert_eq!(one_year.lookback_days(), Some(252));

        let mut tiny = input();
        tiny.lookback_years = Some(0.001);
        assert_eq!(tiny.lookback_days(), Some(1));

        let mut bad = input();
        bad.lookback_years = Some(0.0);
        assert!(bad.aligned_series().is_err());
        bad.lookback_years = Some(f64::NAN);
        assert!(bad.aligned_series().is_err());
    }
}
