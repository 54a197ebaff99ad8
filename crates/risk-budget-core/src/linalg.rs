//! Dense helpers for the small (n ≤ ~15) matrices the engine works with.
//!
//! Matrices are row-major `Vec<Vec<f64>>`; nothing here allocates more than a
//! single output vector.

use crate::error::RiskBudgetError;
use crate::types::SUM_TOLERANCE;
use crate::RiskBudgetResult;

/// Matrix-vector multiplication: result_i = sum_j(mat[i][j] * vec[j]).
pub fn mat_vec_multiply(mat: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    mat.iter().map(|row| vec_dot(row, v)).collect()
}

/// Dot product of two vectors.
pub fn vec_dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Euclidean norm.
pub fn vec_norm(v: &[f64]) -> f64 {
    vec_dot(v, v).sqrt()
}

/// Portfolio variance: w' * Sigma * w.
pub fn portfolio_variance(weights: &[f64], cov: &[Vec<f64>]) -> f64 {
    let sigma_w = mat_vec_multiply(cov, weights);
    vec_dot(weights, &sigma_w)
}

/// Rescale a non-negative vector so it sums to one. A zero vector is returned
/// unchanged.
pub fn normalize(weights: &mut [f64]) {
    let total: f64 = weights.iter().sum();
    if total > 0.0 {
        for w in weights.iter_mut() {
            *w /= total;
        }
    }
}

pub fn validate_covariance_matrix(cov: &[Vec<f64>], n: usize) -> RiskBudgetResult<()> {
    if n == 0 {
        return Err(RiskBudgetError::InsufficientData(
            "Covariance matrix must cover at least one asset".into(),
        ));
    }
    if cov.len() != n {
        return Err(RiskBudgetError::InvalidInput {
            field: "covariance_matrix".into(),
            reason: format!("Expected {}x{} matrix but got {} rows", n, n, cov.len()),
        });
    }
    for (i, row) in cov.iter().enumerate() {
        if row.len() != n {
            return Err(RiskBudgetError::InvalidInput {
                field: "covariance_matrix".into(),
                reason: format!("Row {} has {} columns, expected {}", i, row.len(), n),
            });
        }
        if row.iter().any(|v| !v.is_finite()) {
            return Err(RiskBudgetError::InvalidInput {
                field: "covariance_matrix".into(),
                reason: format!("Row {} contains a non-finite entry", i),
            });
        }
    }
    // Symmetry check
    let tolerance = 1e-9;
    for i in 0..n {
        for j in (i + 1)..n {
            let scale = cov[i][j].abs().max(cov[j][i].abs()).max(1.0);
            if (cov[i][j] - cov[j][i]).abs() > tolerance * scale {
                return Err(RiskBudgetError::InvalidInput {
                    field: "covariance_matrix".into(),
                    reason: format!(
                        "Matrix is not symmetric: cov[{}][{}]={} != cov[{}][{}]={}",
                        i, j, cov[i][j], j, i, cov[j][i]
                    ),
                });
            }
        }
    }
    Ok(())
}

/// A budget (or weight) vector must have length `n`, non-negative entries and
/// sum to one.
pub fn validate_simplex_vector(field: &str, values: &[f64], n: usize) -> RiskBudgetResult<()> {
    if values.len() != n {
        return Err(RiskBudgetError::mismatch(field, n, values.len()));
    }
    if let Some((i, v)) = values
        .iter()
        .enumerate()
        .find(|(_, v)| !v.is_finite() || **v < 0.0)
    {
        return Err(RiskBudgetError::invalid(
            format!("{}[{}]", field, i),
            format!("Must be a non-negative number, got {}", v),
        ));
    }
    let total: f64 = values.iter().sum();
    if (total - 1.0).abs() > SUM_TOLERANCE {
        return Err(RiskBudgetError::invalid(
            field,
            format!("Must sum to 1, got {:.8}", total),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mat_vec_multiply_identity() {
        let identity = vec![vec![1.0, 0.0], vec![0.0, 1.0]];
        let v = vec![3.0, 5.0];
        assert_eq!(mat_vec_multiply(&identity, &v), v);
    }

    #[test]
    fn test_portfolio_variance_diagonal() {
        let cov = vec![vec![0.04, 0.0], vec![0.0, 0.09]];
        let var = portfolio_variance(&[0.5, 0.5], &cov);
        assert!((var - 0.0325).abs() < 1e-12);
    }

    #[test]
    fn test_normalize_zero_vector_untouched() {
        let mut w = vec![0.0, 0.0];
        normalize(&mut w);
        assert_eq!(w, vec![0.0, 0.0]);
    }

    #[test]
    fn test_validate_asymmetric_covariance() {
        let cov = vec![vec![0.0225, 0.005], vec![0.010, 0.01]];
        assert!(validate_covariance_matrix(&cov, 2).is_err());
    }

    #[test]
    fn test_validate_non_square_covariance() {
        let cov = vec![vec![0.0225, 0.005, 0.001], vec![0.005, 0.01]];
        assert!(validate_covariance_matrix(&cov, 2).is_err());
    }

    #[test]
    fn test_validate_simplex_vector_rejects_bad_sum() {
        assert!(validate_simplex_vector("budgets", &[0.5, 0.4], 2).is_err());
        assert!(validate_simplex_vector("budgets", &[0.5, 0.5], 3).is_err());
        assert!(validate_simplex_vector("budgets", &[1.2, -0.2], 2).is_err());
        assert!(validate_simplex_vector("budgets", &[0.25, 0.75], 2).is_ok());
    }
}
