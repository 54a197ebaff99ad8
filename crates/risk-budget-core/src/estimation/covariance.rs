use serde::{Deserialize, Serialize};

use crate::error::RiskBudgetError;
use crate::types::TRADING_DAYS_PER_YEAR;
use crate::RiskBudgetResult;

/// Input for the covariance estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CovarianceInput {
    /// One daily return series per asset, all of equal length
    pub returns: Vec<Vec<f64>>,
    /// Optional diagonal shrinkage intensity in [0, 1]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shrinkage: Option<f64>,
}

/// Annualised covariance with the correlation matrix it implies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CovarianceOutput {
    pub covariance_matrix: Vec<Vec<f64>>,
    pub correlation_matrix: Vec<Vec<f64>>,
    pub volatilities: Vec<f64>,
    pub observations: usize,
}

/// Annualised sample covariance (T - 1 denominator, ×252).
pub fn calculate_covariance_matrix(returns_per_asset: &[Vec<f64>]) -> RiskBudgetResult<Vec<Vec<f64>>> {
    let n = returns_per_asset.len();
    if n == 0 {
        return Err(RiskBudgetError::InsufficientData(
            "At least one return series required".into(),
        ));
    }
    let t = returns_per_asset[0].len();
    if t < 2 {
        return Err(RiskBudgetError::InsufficientData(format!(
            "At least 2 return observations required, got {}",
            t
        )));
    }
    for (i, series) in returns_per_asset.iter().enumerate() {
        if series.len() != t {
            return Err(RiskBudgetError::mismatch(format!("returns[{}]", i), t, series.len()));
        }
    }

    let means: Vec<f64> = returns_per_asset
        .iter()
        .map(|r| r.iter().sum::<f64>() / t as f64)
        .collect();
    let denom = (t - 1) as f64;

    let mut cov = vec![vec![0.0; n]; n];
    for i in 0..n {
        for j in i..n {
            let s: f64 = returns_per_asset[i]
                .iter()
                .zip(returns_per_asset[j].iter())
                .map(|(ri, rj)| (ri - means[i]) * (rj - means[j]))
                .sum();
            let c = s / denom * TRADING_DAYS_PER_YEAR;
            cov[i][j] = c;
            cov[j][i] = c;
        }
    }
    Ok(cov)
}

/// Diagonal shrinkage: `(1 - lambda) * S + lambda * diag(S)`.
///
/// Variances are unchanged; off-diagonal terms are pulled toward zero.
pub fn shrink_covariance(cov: &[Vec<f64>], lambda: f64) -> RiskBudgetResult<Vec<Vec<f64>>> {
    if !(0.0..=1.0).contains(&lambda) {
        return Err(RiskBudgetError::invalid(
            "shrinkage",
            format!("Must lie in [0, 1], got {}", lambda),
        ));
    }
    Ok(cov
        .iter()
        .enumerate()
        .map(|(i, row)| {
            row.iter()
                .enumerate()
                .map(|(j, v)| if i == j { *v } else { (1.0 - lambda) * v })
                .collect()
        })
        .collect())
}

/// Correlation implied by a covariance matrix. Zero-variance assets get zero
/// correlation with everything (one on their own diagonal).
pub fn correlation_matrix(cov: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let vols: Vec<f64> = (0..cov.len()).map(|i| cov[i][i].max(0.0).sqrt()).collect();
    cov.iter()
        .enumerate()
        .map(|(i, row)| {
            row.iter()
                .enumerate()
                .map(|(j, v)| {
                    if i == j {
                        1.0
                    } else if vols[i] > 0.0 && vols[j] > 0.0 {
                        v / (vols[i] * vols[j])
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect()
}

/// Estimate covariance (optionally shrunk) and its correlation matrix.
pub fn estimate_covariance(input: &CovarianceInput) -> RiskBudgetResult<CovarianceOutput> {
    let mut cov = calculate_covariance_matrix(&input.returns)?;
    if let Some(lambda) = input.shrinkage {
        cov = shrink_covariance(&cov, lambda)?;
    }
    let volatilities = (0..cov.len()).map(|i| cov[i][i].max(0.0).sqrt()).collect();
    Ok(CovarianceOutput {
        correlation_matrix: correlation_matrix(&cov),
        volatilities,
        observations: input.returns[0].len(),
        covariance_matrix: cov,
    })
}
