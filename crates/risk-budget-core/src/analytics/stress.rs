use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::RiskBudgetError;
use crate::linalg::{validate_covariance_matrix, vec_dot};
use crate::risk_budgeting::contributions::calculate_portfolio_volatility;
use crate::risk_budgeting::erc::{solve_erc, ErcSettings};
use crate::risk_budgeting::expected_shortfall::{solve_es, EsInput};
use crate::risk_budgeting::normal::es_multiplier;
use crate::risk_budgeting::{OptimizationResult, OptimizerKind};
use crate::types::{with_metadata, ComputationOutput, DEFAULT_TAIL_CONFIDENCE};
use crate::RiskBudgetResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Volatility-shock scenario: scale the covariance and re-optimise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressInput {
    pub covariance_matrix: Vec<Vec<f64>>,
    /// Multiplier applied to every covariance entry (2.0 doubles variances)
    pub scale_factor: f64,
    #[serde(default)]
    pub optimizer: OptimizerKind,
    /// Expected returns for the ES optimiser (default zero)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_returns: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budgets: Option<Vec<f64>>,
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
}

fn default_confidence_level() -> f64 {
    DEFAULT_TAIL_CONFIDENCE
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StressOutput {
    pub stressed_covariance: Vec<Vec<f64>>,
    pub base: OptimizationResult,
    pub stressed: OptimizationResult,
    /// stressed weight - base weight, per asset
    pub weight_changes: Vec<f64>,
    /// Volatility of the unchanged base weights under the shocked covariance
    pub base_weights_stressed_volatility: f64,
    /// Gaussian ES of the unchanged base weights under the shocked covariance
    pub base_weights_stressed_es: f64,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Multiply every covariance entry by `scale`. Correlations are unchanged and
/// volatilities scale by sqrt(scale).
pub fn stress_test_volatility(cov: &[Vec<f64>], scale: f64) -> RiskBudgetResult<Vec<Vec<f64>>> {
    if !scale.is_finite() || scale < 0.0 {
        return Err(RiskBudgetError::invalid(
            "scale_factor",
            format!("Must be a non-negative number, got {}", scale),
        ));
    }
    validate_covariance_matrix(cov, cov.len())?;
    Ok(cov
        .iter()
        .map(|row| row.iter().map(|c| c * scale).collect())
        .collect())
}

/// Re-optimise under a volatility shock and compare with the unshocked
/// solution.
pub fn run_volatility_stress(input: &StressInput) -> RiskBudgetResult<ComputationOutput<StressOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let n = input.covariance_matrix.len();
    let stressed_covariance = stress_test_volatility(&input.covariance_matrix, input.scale_factor)?;
    let mu = match input.expected_returns {
        Some(ref m) if m.len() != n => {
            return Err(RiskBudgetError::mismatch("expected_returns", n, m.len()));
        }
        Some(ref m) => m.clone(),
        None => vec![0.0; n],
    };

    let base = optimize_for(input, &input.covariance_matrix, &mu)?;
    let stressed = optimize_for(input, &stressed_covariance, &mu)?;
    if !base.converged || !stressed.converged {
        warnings.push("At least one optimisation did not converge".into());
    }

    let weight_changes: Vec<f64> = stressed
        .weights
        .iter()
        .zip(base.weights.iter())
        .map(|(s, b)| s - b)
        .collect();
    let base_weights_stressed_volatility =
        calculate_portfolio_volatility(&base.weights, &stressed_covariance);
    let k = es_multiplier(input.confidence_level)?;
    let base_weights_stressed_es = -vec_dot(&mu, &base.weights) + k * base_weights_stressed_volatility;

    tracing::debug!(
        scale = input.scale_factor,
        base_vol = base.portfolio_volatility,
        stressed_vol = stressed.portfolio_volatility,
        "volatility stress complete"
    );

    let output = StressOutput {
        stressed_covariance,
        base,
        stressed,
        weight_changes,
        base_weights_stressed_volatility,
        base_weights_stressed_es,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Volatility shock: uniform covariance scaling with re-optimisation",
        &serde_json::json!({
            "num_assets": n,
            "scale_factor": input.scale_factor,
            "optimizer": input.optimizer,
            "confidence_level": input.confidence_level,
        }),
        warnings,
        elapsed,
        output,
    ))
}

fn optimize_for(
    input: &StressInput,
    cov: &[Vec<f64>],
    mu: &[f64],
) -> RiskBudgetResult<OptimizationResult> {
    match input.optimizer {
        OptimizerKind::Erc => solve_erc(cov, input.budgets.as_deref(), &ErcSettings::default()),
        OptimizerKind::Es => {
            let mut es = EsInput::new(mu.to_vec(), cov.to_vec());
            es.budgets = input.budgets.clone();
            es.confidence_level = input.confidence_level;
            solve_es(&es)
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn cov() -> Vec<Vec<f64>> {
        vec![vec![0.04, 0.006], vec![0.006, 0.09]]
    }

    #[test]
    fn test_scaling_multiplies_every_entry() {
        let stressed = stress_test_volatility(&cov(), 2.0).unwrap();
        assert_eq!(stressed, vec![vec![0.08, 0.012], vec![0.012, 0.18]]);
    }

    #[test]
    fn test_negative_scale_rejected() {
        assert!(stress_test_volatility(&cov(), -1.0).is_err());
        assert!(stress_test_volatility(&cov(), f64::NAN).is_err());
    }

    #[test]
    fn test_erc_weights_invariant_to_uniform_shock() {
        let input = StressInput {
            covariance_matrix: cov(),
            scale_factor: 4.0,
            optimizer: OptimizerKind::Erc,
            expected_returns: None,
            budgets: None,
            confidence_level: DEFAULT_TAIL_CONFIDENCE,
        };
        let out = run_volatility_stress(&input).unwrap().result;
        for change in &out.weight_changes {
            assert!(change.abs() < 1e-6, "weight change {}", change);
        }
        assert!((out.stressed.portfolio_volatility - 2.0 * out.base.portfolio_volatility).abs() < 1e-6);
        assert!((out.base_weights_stressed_volatility - 2.0 * out.base.portfolio_volatility).abs() < 1e-12);
    }

    #[test]
    fn test_es_stress_raises_shortfall() {
        let input = StressInput {
            covariance_matrix: cov(),
            scale_factor: 2.0,
            optimizer: OptimizerKind::Es,
            expected_returns: Some(vec![0.05, 0.07]),
            budgets: None,
            confidence_level: DEFAULT_TAIL_CONFIDENCE,
        };
        let out = run_volatility_stress(&input).unwrap().result;
        let base_es = out.base.expected_shortfall.unwrap();
        assert!(out.base_weights_stressed_es > base_es);
        assert!(out.stressed.expected_shortfall.unwrap() > base_es);
    }

    #[test]
    fn test_expected_returns_length_checked() {
        let input = StressInput {
            covariance_matrix: cov(),
            scale_factor: 2.0,
            optimizer: OptimizerKind::Es,
            expected_returns: Some(vec![0.05]),
            budgets: None,
            confidence_level: DEFAULT_TAIL_CONFIDENCE,
        };
        assert!(run_volatility_stress(&input).is_err());
    }
}
