use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::RiskBudgetError;
use crate::linalg::{
    mat_vec_multiply, validate_covariance_matrix, validate_simplex_vector, vec_dot, vec_norm,
};
use crate::types::{with_metadata, ComputationOutput, DEFAULT_TAIL_CONFIDENCE, EPSILON};
use crate::RiskBudgetResult;

use super::normal::es_multiplier;
use super::projection::{project_capped_simplex, resolve_caps};
use super::result::{diversification_stats, optimizer_warnings, OptimizationResult};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

const MAX_BACKTRACKS: usize = 50;
const DEFAULT_BUDGET_STRENGTH: f64 = 0.5;
/// Projected-gradient residual below which a stalled line search counts as
/// convergence.
const STATIONARITY_TOLERANCE: f64 = 1e-6;

/// Input for the Gaussian Expected-Shortfall risk-budgeting optimiser.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EsInput {
    /// Annualised expected returns (N-vector)
    pub mu: Vec<f64>,
    /// NxN annualised covariance matrix
    pub sigma: Vec<Vec<f64>>,
    /// Target tail-risk shares (sum to 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budgets: Option<Vec<f64>>,
    /// Penalty weight on budget deviations; 0.5 when budgets are given
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget_strength: Option<f64>,
    /// Per-asset upper bounds (default 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caps: Option<Vec<f64>>,
    /// Starting point, projected onto the feasible set (default uniform)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_weights: Option<Vec<f64>>,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
    /// Tail confidence alpha
    #[serde(default = "default_confidence_level")]
    pub confidence_level: f64,
    /// Step shrink factor for backtracking
    #[serde(default = "default_armijo_beta")]
    pub armijo_beta: f64,
    /// Sufficient-decrease constant
    #[serde(default = "default_armijo_sigma")]
    pub armijo_sigma: f64,
}

fn default_max_iterations() -> u32 {
    500
}

fn default_tolerance() -> f64 {
    1e-8
}

fn default_confidence_level() -> f64 {
    DEFAULT_TAIL_CONFIDENCE
}

fn default_armijo_beta() -> f64 {
    0.5
}

fn default_armijo_sigma() -> f64 {
    1e-4
}

impl EsInput {
    /// Input with every optional setting at its default.
    pub fn new(mu: Vec<f64>, sigma: Vec<Vec<f64>>) -> Self {
        Self {
            mu,
            sigma,
            budgets: None,
            budget_strength: None,
            caps: None,
            initial_weights: None,
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
            confidence_level: default_confidence_level(),
            armijo_beta: default_armijo_beta(),
            armijo_sigma: default_armijo_sigma(),
        }
    }
}

/// Tail-only risk decomposition: the `-mu` term is excluded so contributions
/// are Euler allocations of `k * sigma_p`.
#[derive(Debug, Clone)]
struct TailDecomposition {
    volatility: f64,
    marginal: Vec<f64>,
    contributions: Vec<f64>,
    total: f64,
    shares: Vec<f64>,
}

/// Penalised Gaussian ES objective.
struct TailObjective<'a> {
    mu: &'a [f64],
    sigma: &'a [Vec<f64>],
    k: f64,
    budgets: Option<&'a [f64]>,
    strength: f64,
}

impl TailObjective<'_> {
    fn decompose(&self, w: &[f64]) -> (Vec<f64>, TailDecomposition) {
        let sigma_w = mat_vec_multiply(self.sigma, w);
        let volatility = vec_dot(w, &sigma_w).max(0.0).sqrt();
        let n = w.len();
        if volatility < EPSILON {
            let decomposition = TailDecomposition {
                volatility,
                marginal: vec![0.0; n],
                contributions: vec![0.0; n],
                total: 0.0,
                shares: vec![0.0; n],
            };
            return (sigma_w, decomposition);
        }
        let marginal: Vec<f64> = sigma_w.iter().map(|s| self.k * s / volatility).collect();
        let contributions: Vec<f64> = w.iter().zip(marginal.iter()).map(|(wi, m)| wi * m).collect();
        let total: f64 = contributions.iter().sum();
        let shares = if total.abs() < EPSILON {
            vec![0.0; n]
        } else {
            contributions.iter().map(|rc| rc / total).collect()
        };
        let decomposition = TailDecomposition {
            volatility,
            marginal,
            contributions,
            total,
            shares,
        };
        (sigma_w, decomposition)
    }

    fn expected_shortfall(&self, w: &[f64], volatility: f64) -> f64 {
        -vec_dot(self.mu, w) + self.k * volatility
    }

    fn penalty(&self, shares: &[f64]) -> f64 {
        match self.budgets {
            Some(b) => {
                self.strength
                    * shares
                        .iter()
                        .zip(b.iter())
                        .map(|(s, t)| (s - t) * (s - t))
                        .sum::<f64>()
            }
            None => 0.0,
        }
    }

    fn value(&self, w: &[f64]) -> f64 {
        let (_, d) = self.decompose(w);
        self.expected_shortfall(w, d.volatility) + self.penalty(&d.shares)
    }

    fn gradient(&self, w: &[f64]) -> Vec<f64> {
        let (sigma_w, d) = self.decompose(w);
        let mut grad: Vec<f64> = if d.volatility < EPSILON {
            self.mu.iter().map(|m| -m).collect()
        } else {
            self.mu
                .iter()
                .zip(sigma_w.iter())
                .map(|(m, s)| -m + self.k * s / d.volatility)
                .collect()
        };

        // Heuristic: d(share_i)/d(w_i) is taken as marginal_i / total_rc, which
        // drops the cross terms and the normalisation of the exact Jacobian.
        if let Some(b) = self.budgets {
            if d.total.abs() >= EPSILON {
                for i in 0..w.len() {
                    grad[i] += 2.0 * self.strength * (d.shares[i] - b[i]) * d.marginal[i] / d.total;
                }
            }
        }
        grad
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Gaussian Expected-Shortfall risk budgeting by projected gradient descent.
pub fn optimize_expected_shortfall(
    input: &EsInput,
) -> RiskBudgetResult<ComputationOutput<OptimizationResult>> {
    let start = Instant::now();
    let result = solve_es(input)?;
    let warnings = optimizer_warnings(&result, input.max_iterations);

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Gaussian Expected Shortfall risk budgeting (projected gradient, Armijo backtracking)",
        &serde_json::json!({
            "num_assets": input.mu.len(),
            "confidence_level": input.confidence_level,
            "budgets": input.budgets.as_ref().map_or("none", |_| "custom"),
            "budget_strength": input.budget_strength,
            "capped": input.caps.is_some(),
            "max_iterations": input.max_iterations,
            "tolerance": input.tolerance,
        }),
        warnings,
        elapsed,
        result,
    ))
}

/// Envelope-free solver, called directly by the backtest.
pub fn solve_es(input: &EsInput) -> RiskBudgetResult<OptimizationResult> {
    let n = input.mu.len();
    if n == 0 || input.sigma.is_empty() {
        return Err(RiskBudgetError::InsufficientData(
            "mu and sigma must be non-empty".into(),
        ));
    }
    validate_covariance_matrix(&input.sigma, n)?;
    if input.mu.iter().any(|m| !m.is_finite()) {
        return Err(RiskBudgetError::invalid("mu", "Must contain finite numbers"));
    }
    if let Some(ref b) = input.budgets {
        validate_simplex_vector("budgets", b, n)?;
    }
    let strength = match (input.budgets.as_ref(), input.budget_strength) {
        (Some(_), Some(s)) if s < 0.0 || !s.is_finite() => {
            return Err(RiskBudgetError::invalid(
                "budget_strength",
                "Must be a non-negative number",
            ));
        }
        (Some(_), Some(s)) => s,
        (Some(_), None) => DEFAULT_BUDGET_STRENGTH,
        (None, _) => 0.0,
    };
    if !(input.armijo_beta > 0.0 && input.armijo_beta < 1.0) {
        return Err(RiskBudgetError::invalid("armijo_beta", "Must lie in (0, 1)"));
    }
    if !(input.armijo_sigma > 0.0 && input.armijo_sigma < 1.0) {
        return Err(RiskBudgetError::invalid("armijo_sigma", "Must lie in (0, 1)"));
    }
    let caps = resolve_caps(input.caps.as_deref(), n)?;

    let start_point = match input.initial_weights {
        Some(ref w) if w.len() != n => {
            return Err(RiskBudgetError::mismatch("initial_weights", n, w.len()));
        }
        Some(ref w) => w.clone(),
        None => vec![1.0 / n as f64; n],
    };

    let objective = TailObjective {
        mu: &input.mu,
        sigma: &input.sigma,
        k: es_multiplier(input.confidence_level)?,
        budgets: input.budgets.as_deref(),
        strength,
    };

    let mut x = project_capped_simplex(&start_point, &caps);
    let mut fx = objective.value(&x);
    let mut converged = false;
    let mut iterations = 0u32;

    for _ in 0..input.max_iterations {
        let grad = objective.gradient(&x);
        let grad_norm = vec_norm(&grad);
        if grad_norm < input.tolerance {
            converged = true;
            break;
        }
        let grad_norm_sq = grad_norm * grad_norm;

        let mut step = 1.0;
        let mut accepted = None;
        for _ in 0..MAX_BACKTRACKS {
            let trial: Vec<f64> = x.iter().zip(grad.iter()).map(|(xi, g)| xi - step * g).collect();
            let candidate = project_capped_simplex(&trial, &caps);
            let f_candidate = objective.value(&candidate);
            if f_candidate <= fx - input.armijo_sigma * step * grad_norm_sq {
                accepted = Some((candidate, f_candidate));
                break;
            }
            step *= input.armijo_beta;
        }

        match accepted {
            Some((candidate, f_candidate)) => {
                x = candidate;
                fx = f_candidate;
                iterations += 1;
            }
            None => {
                converged = stationarity_residual(&x, &grad, &caps) < STATIONARITY_TOLERANCE;
                break;
            }
        }
    }

    if converged {
        tracing::debug!(iterations, objective = fx, "ES optimiser converged");
    } else {
        tracing::warn!(
            iterations,
            max_iterations = input.max_iterations,
            "ES optimiser stopped before convergence"
        );
    }

    let (_, d) = objective.decompose(&x);
    let expected_shortfall = objective.expected_shortfall(&x, d.volatility);
    let entropy: f64 = -x.iter().filter(|w| **w > 0.0).map(|w| w * w.ln()).sum::<f64>();
    let (diversification_ratio, effective_num_assets) =
        diversification_stats(&x, &input.sigma, d.volatility);

    Ok(OptimizationResult {
        weights: x,
        risk_contributions: d.contributions,
        risk_contribution_shares: d.shares,
        objective_value: fx,
        portfolio_volatility: d.volatility,
        converged,
        iterations,
        diversification_ratio,
        effective_num_assets,
        expected_shortfall: Some(expected_shortfall),
        entropy: Some(entropy),
        diversification: Some(entropy.exp()),
    })
}

/// ||x - P(x - g)||: zero exactly at a KKT point of the capped simplex.
fn stationarity_residual(x: &[f64], grad: &[f64], caps: &[f64]) -> f64 {
    let trial: Vec<f64> = x.iter().zip(grad.iter()).map(|(xi, g)| xi - g).collect();
    let projected = project_capped_simplex(&trial, caps);
    x.iter()
        .zip(projected.iter())
        .map(|(a, b)| (a - b) * (a - b))
        .sum::<f64>()
        .sqrt()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
