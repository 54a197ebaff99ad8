use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::RiskBudgetError;
use crate::linalg::{
    mat_vec_multiply, normalize, validate_covariance_matrix, validate_simplex_vector, vec_dot,
};
use crate::types::{with_metadata, ComputationOutput, EPSILON};
use crate::RiskBudgetResult;

use super::contributions::decompose;
use super::result::{diversification_stats, optimizer_warnings, OptimizationResult};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Exponent applied to the target/actual risk ratio in each update.
const DAMPING_EXPONENT: f64 = 0.5;

/// Iteration limits for the coordinate-descent solver.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ErcSettings {
    pub max_iterations: u32,
    /// Max absolute deviation of risk shares from budget, in percentage points
    pub tolerance: f64,
}

impl Default for ErcSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
        }
    }
}

/// Input for the ERC / risk-budgeting optimiser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErcInput {
    /// NxN annualised covariance matrix (row-major)
    pub covariance_matrix: Vec<Vec<f64>>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Target risk shares (sum to 1); equal risk when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budgets: Option<Vec<f64>>,
    /// Optional target portfolio volatility -- weights are scaled post-hoc
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_volatility: Option<f64>,
}

fn default_max_iterations() -> u32 {
    1000
}

fn default_tolerance() -> f64 {
    1e-6
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Variance risk-budgeting weights via damped cyclical coordinate descent.
pub fn optimize_erc(input: &ErcInput) -> RiskBudgetResult<ComputationOutput<OptimizationResult>> {
    let start = Instant::now();

    let settings = ErcSettings {
        max_iterations: input.max_iterations,
        tolerance: input.tolerance,
    };
    let mut result = solve_erc(&input.covariance_matrix, input.budgets.as_deref(), &settings)?;

    if let Some(target_vol) = input.target_volatility {
        if target_vol <= 0.0 {
            return Err(RiskBudgetError::invalid(
                "target_volatility",
                "Must be positive",
            ));
        }
        scale_to_target_volatility(&mut result, &input.covariance_matrix, target_vol);
    }

    let mut warnings = optimizer_warnings(&result, settings.max_iterations);
    if input.target_volatility.is_some() {
        warnings.push(format!(
            "Weights scaled to target volatility; gross exposure is {:.4}",
            result.weights.iter().sum::<f64>()
        ));
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Equal Risk Contribution (damped cyclical coordinate descent)",
        &serde_json::json!({
            "num_assets": input.covariance_matrix.len(),
            "max_iterations": settings.max_iterations,
            "tolerance_pct_points": settings.tolerance,
            "budgets": input.budgets.as_ref().map_or("equal", |_| "custom"),
            "target_volatility": input.target_volatility,
        }),
        warnings,
        elapsed,
        result,
    ))
}

/// Envelope-free solver, called directly by the backtest on every rebalance.
///
/// Never fails on non-convergence: the last iterate is returned with
/// `converged = false`. Zero portfolio volatility stops the iteration and
/// returns the current (uniform) weights.
pub fn solve_erc(
    cov: &[Vec<f64>],
    budgets: Option<&[f64]>,
    settings: &ErcSettings,
) -> RiskBudgetResult<OptimizationResult> {
    let n = cov.len();
    validate_covariance_matrix(cov, n)?;
    if let Some(b) = budgets {
        validate_simplex_vector("budgets", b, n)?;
    }

    let targets: Vec<f64> = match budgets {
        Some(b) => b.to_vec(),
        None => vec![1.0 / n as f64; n],
    };

    let mut weights = vec![1.0 / n as f64; n];
    let mut converged = false;
    let mut iterations = 0u32;

    for _ in 0..settings.max_iterations {
        let sigma_w = mat_vec_multiply(cov, &weights);
        let port_vol = vec_dot(&weights, &sigma_w).max(0.0).sqrt();
        if port_vol < EPSILON {
            break;
        }

        for i in 0..n {
            let marginal = sigma_w[i] / port_vol;
            if marginal > 0.0 {
                let rc = weights[i] * marginal;
                if rc > 0.0 {
                    let target_rc = targets[i] * port_vol;
                    weights[i] *= (target_rc / rc).powf(DAMPING_EXPONENT);
                }
            }
        }
        normalize(&mut weights);
        iterations += 1;

        let shares = decompose(&weights, cov).risk_pct;
        let max_deviation = shares
            .iter()
            .zip(targets.iter())
            .map(|(s, t)| (s - t).abs() * 100.0)
            .fold(0.0_f64, f64::max);
        if max_deviation < settings.tolerance {
            converged = true;
            break;
        }
    }

    if !converged {
        tracing::warn!(
            iterations,
            max_iterations = settings.max_iterations,
            "ERC optimiser did not converge"
        );
    } else {
        tracing::debug!(iterations, "ERC optimiser converged");
    }

    Ok(build_result(weights, cov, converged, iterations))
}

/// Scale weights so the portfolio hits `target_vol`. Risk shares are
/// unchanged; the weights no longer sum to one.
pub fn scale_to_target_volatility(result: &mut OptimizationResult, cov: &[Vec<f64>], target_vol: f64) {
    if result.portfolio_volatility < EPSILON {
        return;
    }
    let scale = target_vol / result.portfolio_volatility;
    for w in &mut result.weights {
        *w *= scale;
    }
    let report = decompose(&result.weights, cov);
    result.risk_contributions = report.risk_contributions;
    result.portfolio_volatility = report.portfolio_volatility;
    result.objective_value = report.portfolio_volatility;
}

fn build_result(
    weights: Vec<f64>,
    cov: &[Vec<f64>],
    converged: bool,
    iterations: u32,
) -> OptimizationResult {
    let report = decompose(&weights, cov);
    let (diversification_ratio, effective_num_assets) =
        diversification_stats(&weights, cov, report.portfolio_volatility);
    OptimizationResult {
        risk_contributions: report.risk_contributions,
        risk_contribution_shares: report.risk_pct,
        objective_value: report.portfolio_volatility,
        portfolio_volatility: report.portfolio_volatility,
        converged,
        iterations,
        diversification_ratio,
        effective_num_assets,
        expected_shortfall: None,
        entropy: None,
        diversification: None,
        weights,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
