use serde::{Deserialize, Serialize};

use crate::error::RiskBudgetError;
use crate::types::TRADING_DAYS_PER_YEAR;
use crate::RiskBudgetResult;

/// Input for the returns calculator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnsInput {
    /// Ordered closing prices
    pub prices: Vec<f64>,
    /// Per-period cash dividends aligned 1:1 with `prices`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dividends: Option<Vec<f64>>,
}

/// Per-period returns derived from a price series.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnsOutput {
    pub returns: Vec<f64>,
    /// `true` when dividends were folded in (total return)
    pub total_return: bool,
}

/// Price or total returns.
///
/// Price return at t is `(P_t - P_{t-1}) / P_{t-1}`. With dividends the
/// dividend paid on day t is added to the numerator. The output has one fewer
/// element than `prices`. A non-positive previous price yields a zero return
/// for that period.
pub fn calculate_returns(prices: &[f64], dividends: Option<&[f64]>) -> RiskBudgetResult<Vec<f64>> {
    if prices.len() < 2 {
        return Err(RiskBudgetError::InsufficientData(format!(
            "At least 2 prices required to compute a return, got {}",
            prices.len()
        )));
    }
    if let Some(divs) = dividends {
        if divs.len() != prices.len() {
            return Err(RiskBudgetError::mismatch(
                "dividends",
                prices.len(),
                divs.len(),
            ));
        }
    }

    let returns = prices
        .windows(2)
        .enumerate()
        .map(|(i, pair)| {
            let (prev, curr) = (pair[0], pair[1]);
            if prev <= 0.0 {
                return 0.0;
            }
            let dividend = dividends.map_or(0.0, |d| d[i + 1]);
            (curr - prev + dividend) / prev
        })
        .collect();

    Ok(returns)
}

/// Convenience wrapper over [`calculate_returns`] for serialised inputs.
pub fn calculate_returns_from_input(input: &ReturnsInput) -> RiskBudgetResult<ReturnsOutput> {
    let returns = calculate_returns(&input.prices, input.dividends.as_deref())?;
    Ok(ReturnsOutput {
        returns,
        total_return: input.dividends.is_some(),
    })
}

/// Arithmetic mean of each return series. Empty series have a zero mean.
pub fn mean_returns(returns_per_asset: &[Vec<f64>]) -> Vec<f64> {
    returns_per_asset
        .iter()
        .map(|r| {
            if r.is_empty() {
                0.0
            } else {
                r.iter().sum::<f64>() / r.len() as f64
            }
        })
        .collect()
}

/// Mean daily returns scaled to a yearly horizon, matching the scale of an
/// annualised covariance matrix.
pub fn annualized_mean_returns(returns_per_asset: &[Vec<f64>]) -> Vec<f64> {
    mean_returns(returns_per_asset)
        .into_iter()
        .map(|m| m * TRADING_DAYS_PER_YEAR)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_returns() {
        let r = calculate_returns(&[100.0, 110.0, 99.0], None).unwrap();
        assert_eq!(r.len(), 2);
        assert!((r[0] - 0.10).abs() < 1e-12);
        assert!((r[1] + 0.10).abs() < 1e-12);
    }

    #[test]
    fn test_total_returns_include_dividend() {
        let r = calculate_returns(&[100.0, 100.0, 102.0], Some(&[0.0, 1.0, 0.0])).unwrap();
        assert!((r[0] - 0.01).abs() < 1e-12);
        assert!((r[1] - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_single_price_rejected() {
        let err = calculate_returns(&[100.0], None).unwrap_err();
        assert!(err.is_data_error());
    }

    #[test]
    fn test_dividend_length_mismatch_rejected() {
        assert!(calculate_returns(&[100.0, 101.0], Some(&[0.0])).is_err());
    }

    #[test]
    fn test_zero_previous_price_guarded() {
        let r = calculate_returns(&[0.0, 10.0, 11.0], None).unwrap();
        assert_eq!(r[0], 0.0);
        assert!((r[1] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_annualized_mean_returns() {
        let m = annualized_mean_returns(&[vec![0.001, 0.003], vec![]]);
        assert!((m[0] - 0.002 * 252.0).abs() < 1e-12);
        assert_eq!(m[1], 0.0);
    }
}
