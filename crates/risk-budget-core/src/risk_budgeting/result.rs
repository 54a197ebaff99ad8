use serde::{Deserialize, Serialize};

use crate::types::EPSILON;

/// Which risk-budgeting optimiser to run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizerKind {
    /// Equal (or budgeted) risk contribution on variance
    #[default]
    Erc,
    /// Gaussian Expected Shortfall with optional budget penalty
    Es,
}

/// Output shared by the ERC and Expected-Shortfall optimisers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// Long-only weights summing to 1 (unless volatility-target scaled)
    pub weights: Vec<f64>,
    /// Absolute risk contribution per asset (w_i * marginal_i)
    pub risk_contributions: Vec<f64>,
    /// Share of total risk per asset, summing to 1
    pub risk_contribution_shares: Vec<f64>,
    /// Portfolio volatility for ERC, penalised ES objective for ES
    pub objective_value: f64,
    /// Annualised portfolio volatility sqrt(w' Sigma w)
    pub portfolio_volatility: f64,
    pub converged: bool,
    /// Iterations actually completed
    pub iterations: u32,
    /// Weighted-average vol / portfolio vol
    pub diversification_ratio: f64,
    /// Herfindahl-based effective number of assets: 1 / sum(w_i^2)
    pub effective_num_assets: f64,
    /// Unpenalised Gaussian Expected Shortfall (ES optimiser only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_shortfall: Option<f64>,
    /// Weight entropy -sum(w ln w) (ES optimiser only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entropy: Option<f64>,
    /// exp(entropy) (ES optimiser only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diversification: Option<f64>,
}

/// Diversification ratio and effective number of assets for a weight vector.
pub(crate) fn diversification_stats(
    weights: &[f64],
    cov: &[Vec<f64>],
    portfolio_volatility: f64,
) -> (f64, f64) {
    let weighted_avg_vol: f64 = weights
        .iter()
        .enumerate()
        .map(|(i, w)| w * cov[i][i].max(0.0).sqrt())
        .sum();
    let diversification_ratio = if portfolio_volatility < EPSILON {
        1.0
    } else {
        weighted_avg_vol / portfolio_volatility
    };

    let hhi: f64 = weights.iter().map(|w| w * w).sum();
    let effective_num_assets = if hhi < EPSILON { 0.0 } else { 1.0 / hhi };

    (diversification_ratio, effective_num_assets)
}

/// Warnings attached to every optimiser envelope.
pub(crate) fn optimizer_warnings(result: &OptimizationResult, max_iterations: u32) -> Vec<String> {
    let mut warnings = Vec::new();
    if !result.converged {
        warnings.push(format!(
            "Optimiser did not converge after {} of {} iterations; returning best iterate",
            result.iterations, max_iterations
        ));
    }
    if result.portfolio_volatility < EPSILON {
        warnings.push("Portfolio volatility is zero; risk contributions are undefined".into());
    }
    for (i, w) in result.weights.iter().enumerate() {
        if *w > 0.50 {
            warnings.push(format!(
                "Concentrated position: asset {} has weight {:.2}%",
                i,
                w * 100.0
            ));
        }
    }
    warnings
}
