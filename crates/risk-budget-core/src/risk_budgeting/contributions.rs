use serde::{Deserialize, Serialize};

use crate::error::RiskBudgetError;
use crate::linalg::{mat_vec_multiply, portfolio_variance, validate_covariance_matrix, vec_dot};
use crate::types::EPSILON;
use crate::RiskBudgetResult;

/// Input for a standalone risk-contribution breakdown.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskContributionInput {
    pub weights: Vec<f64>,
    /// NxN covariance matrix (row-major)
    pub covariance_matrix: Vec<Vec<f64>>,
}

/// Variance-based (Euler) decomposition of portfolio volatility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskContributionReport {
    /// Sigma * w
    pub sigma_w: Vec<f64>,
    pub portfolio_volatility: f64,
    /// Marginal risk contribution = (Sigma * w)_i / sigma_p
    pub marginal_contributions: Vec<f64>,
    /// Total risk contribution = w_i * marginal_risk
    pub risk_contributions: Vec<f64>,
    /// Fraction of total portfolio risk, sums to 1
    pub risk_pct: Vec<f64>,
}

/// Portfolio volatility sqrt(w' Sigma w). Never negative: rounding noise that
/// pushes the quadratic form below zero is floored at zero.
pub fn calculate_portfolio_volatility(weights: &[f64], cov: &[Vec<f64>]) -> f64 {
    portfolio_variance(weights, cov).max(0.0).sqrt()
}

/// Validated risk-contribution breakdown for any weight vector, including
/// drifted (non-target) holdings.
pub fn analyze_risk_contributions(
    weights: &[f64],
    cov: &[Vec<f64>],
) -> RiskBudgetResult<RiskContributionReport> {
    let n = weights.len();
    if n == 0 {
        return Err(RiskBudgetError::InsufficientData(
            "At least one weight required".into(),
        ));
    }
    validate_covariance_matrix(cov, n)?;
    Ok(decompose(weights, cov))
}

/// Decomposition without dimension checks, for callers that already validated.
/// Zero volatility yields all-zero contributions.
pub(crate) fn decompose(weights: &[f64], cov: &[Vec<f64>]) -> RiskContributionReport {
    let sigma_w = mat_vec_multiply(cov, weights);
    let portfolio_volatility = vec_dot(weights, &sigma_w).max(0.0).sqrt();
    let n = weights.len();

    if portfolio_volatility < EPSILON {
        return RiskContributionReport {
            sigma_w,
            portfolio_volatility,
            marginal_contributions: vec![0.0; n],
            risk_contributions: vec![0.0; n],
            risk_pct: vec![0.0; n],
        };
    }

    let marginal_contributions: Vec<f64> =
        sigma_w.iter().map(|s| s / portfolio_volatility).collect();
    let risk_contributions: Vec<f64> = weights
        .iter()
        .zip(marginal_contributions.iter())
        .map(|(w, m)| w * m)
        .collect();
    let risk_pct = risk_contributions
        .iter()
        .map(|rc| rc / portfolio_volatility)
        .collect();

    RiskContributionReport {
        sigma_w,
        portfolio_volatility,
        marginal_contributions,
        risk_contributions,
        risk_pct,
    }
}

/// Risk shares of `weights` under `cov`, or `weights` themselves when the
/// covariance cannot be used (wrong size or zero volatility).
pub fn risk_shares_or_weights(weights: &[f64], cov: &[Vec<f64>]) -> Vec<f64> {
    match analyze_risk_contributions(weights, cov) {
        Ok(report) if report.portfolio_volatility >= EPSILON => report.risk_pct,
        _ => weights.to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_asset_cov() -> Vec<Vec<f64>> {
        let (v1, v2, v3) = (0.15, 0.20, 0.25);
        vec![
            vec![v1 * v1, 0.3 * v1 * v2, 0.1 * v1 * v3],
            vec![0.3 * v1 * v2, v2 * v2, 0.5 * v2 * v3],
            vec![0.1 * v1 * v3, 0.5 * v2 * v3, v3 * v3],
        ]
    }

    #[test]
    fn test_contributions_sum_to_volatility() {
        let cov = three_asset_cov();
        let report = analyze_risk_contributions(&[0.5, 0.3, 0.2], &cov).unwrap();
        let total: f64 = report.risk_contributions.iter().sum();
        assert!((total - report.portfolio_volatility).abs() < 1e-12);
        let pct: f64 = report.risk_pct.iter().sum();
        assert!((pct - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_volatility_gives_zero_contributions() {
        let cov = vec![vec![0.0, 0.0], vec![0.0, 0.0]];
        let report = analyze_risk_contributions(&[0.5, 0.5], &cov).unwrap();
        assert_eq!(report.portfolio_volatility, 0.0);
        assert_eq!(report.risk_pct, vec![0.0, 0.0]);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let cov = three_asset_cov();
        assert!(analyze_risk_contributions(&[0.5, 0.5], &cov).is_err());
    }

    #[test]
    fn test_volatility_never_negative() {
        // Slightly indefinite matrix from rounding
        let cov = vec![vec![1e-20, -2e-20], vec![-2e-20, 1e-20]];
        assert!(calculate_portfolio_volatility(&[0.5, 0.5], &cov) >= 0.0);
    }

    #[test]
    fn test_shares_fall_back_to_weights() {
        let w = vec![0.7, 0.3];
        assert_eq!(risk_shares_or_weights(&w, &[vec![0.0; 2], vec![0.0; 2]]), w);
        assert_eq!(risk_shares_or_weights(&w, &[vec![0.04]]), w);
    }
}
