use crate::error::RiskBudgetError;
use crate::types::SUM_TOLERANCE;
use crate::RiskBudgetResult;

const MAX_PASSES: usize = 1000;
const RESIDUAL_TOLERANCE: f64 = 1e-12;

/// Map `v` onto `{w : 0 <= w_i <= cap_i, sum(w) = 1}` by iterative
/// water-filling.
///
/// Each pass clamps to the box, then spreads the sum residual equally over
/// the coordinates that can still move in the required direction. Stops when
/// the residual is negligible or every coordinate is pinned.
pub fn project_capped_simplex(v: &[f64], caps: &[f64]) -> Vec<f64> {
    let caps: Vec<f64> = caps
        .iter()
        .map(|c| if c.is_nan() { 0.0 } else { c.max(0.0) })
        .collect();
    let mut w: Vec<f64> = v
        .iter()
        .zip(caps.iter())
        .map(|(x, cap)| clamp_finite(*x, *cap))
        .collect();

    for _ in 0..MAX_PASSES {
        let residual = w.iter().sum::<f64>() - 1.0;
        if residual.abs() < RESIDUAL_TOLERANCE {
            break;
        }

        let adjustable: Vec<usize> = (0..w.len())
            .filter(|&i| {
                if residual > 0.0 {
                    w[i] > 0.0
                } else {
                    w[i] < caps[i]
                }
            })
            .collect();
        if adjustable.is_empty() {
            break;
        }

        let shift = residual / adjustable.len() as f64;
        for i in adjustable {
            w[i] = (w[i] - shift).clamp(0.0, caps[i]);
        }
    }
    w
}

fn clamp_finite(x: f64, cap: f64) -> f64 {
    if x.is_nan() {
        0.0
    } else {
        x.clamp(0.0, cap)
    }
}

/// Caps default to 1 (plain simplex). Supplied caps must be non-negative and
/// leave room for a fully invested portfolio.
pub fn resolve_caps(caps: Option<&[f64]>, n: usize) -> RiskBudgetResult<Vec<f64>> {
    let caps = match caps {
        None => return Ok(vec![1.0; n]),
        Some(c) => c,
    };
    if caps.len() != n {
        return Err(RiskBudgetError::mismatch("caps", n, caps.len()));
    }
    if let Some((i, c)) = caps
        .iter()
        .enumerate()
        .find(|(_, c)| !c.is_finite() || **c < 0.0)
    {
        return Err(RiskBudgetError::invalid(
            format!("caps[{}]", i),
            format!("Must be a non-negative number, got {}", c),
        ));
    }
    let total: f64 = caps.iter().sum();
    if total < 1.0 - SUM_TOLERANCE {
        return Err(RiskBudgetError::invalid(
            "caps",
            format!("Caps sum to {:.6}; a fully invested portfolio needs at least 1", total),
        ));
    }
    Ok(caps.to_vec())
}
