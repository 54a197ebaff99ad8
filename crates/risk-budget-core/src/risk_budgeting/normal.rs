//! Standard normal helpers for the Gaussian Expected-Shortfall model.

use statrs::distribution::{Continuous, Normal};

use crate::error::RiskBudgetError;
use crate::RiskBudgetResult;

// Acklam's rational approximation coefficients (relative error < 1.15e-9).
const A: [f64; 6] = [
    -3.969_683_028_665_376e1,
    2.209_460_984_245_205e2,
    -2.759_285_104_469_687e2,
    1.383_577_518_672_690e2,
    -3.066_479_806_614_716e1,
    2.506_628_277_459_239,
];
const B: [f64; 5] = [
    -5.447_609_879_822_406e1,
    1.615_858_368_580_409e2,
    -1.556_989_798_598_866e2,
    6.680_131_188_771_972e1,
    -1.328_068_155_288_572e1,
];
const C: [f64; 6] = [
    -7.784_894_002_430_293e-3,
    -3.223_964_580_411_365e-1,
    -2.400_758_277_161_838,
    -2.549_732_539_343_734,
    4.374_664_141_464_968,
    2.938_163_982_698_783,
];
const D: [f64; 4] = [
    7.784_695_709_041_462e-3,
    3.224_671_290_700_398e-1,
    2.445_134_137_142_996,
    3.754_408_661_907_416,
];
const P_LOW: f64 = 0.02425;

/// Standard normal density.
pub fn norm_pdf(x: f64) -> RiskBudgetResult<f64> {
    let standard = Normal::new(0.0, 1.0)
        .map_err(|e| RiskBudgetError::invalid("normal_distribution", e.to_string()))?;
    Ok(standard.pdf(x))
}

/// Inverse standard normal CDF (quantile function), valid for p in (0, 1).
pub fn norm_inv(p: f64) -> RiskBudgetResult<f64> {
    if !(p > 0.0 && p < 1.0) {
        return Err(RiskBudgetError::invalid(
            "probability",
            format!("Must lie strictly between 0 and 1, got {}", p),
        ));
    }

    let x = if p < P_LOW {
        let q = (-2.0 * p.ln()).sqrt();
        tail_ratio(q)
    } else if p <= 1.0 - P_LOW {
        let q = p - 0.5;
        let r = q * q;
        (((((A[0] * r + A[1]) * r + A[2]) * r + A[3]) * r + A[4]) * r + A[5]) * q
            / (((((B[0] * r + B[1]) * r + B[2]) * r + B[3]) * r + B[4]) * r + 1.0)
    } else {
        let q = (-2.0 * (1.0 - p).ln()).sqrt();
        -tail_ratio(q)
    };
    Ok(x)
}

fn tail_ratio(q: f64) -> f64 {
    (((((C[0] * q + C[1]) * q + C[2]) * q + C[3]) * q + C[4]) * q + C[5])
        / ((((D[0] * q + D[1]) * q + D[2]) * q + D[3]) * q + 1.0)
}

/// Gaussian ES multiplier k = phi(z_alpha) / (1 - alpha), so that
/// ES = -mu + k * sigma.
pub fn es_multiplier(alpha: f64) -> RiskBudgetResult<f64> {
    let z = norm_inv(alpha)?;
    Ok(norm_pdf(z)? / (1.0 - alpha))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_norm_inv_known_quantiles() {
        assert!(norm_inv(0.5).unwrap().abs() < 1e-9);
        assert!((norm_inv(0.975).unwrap() - 1.959_963_985).abs() < 1e-8);
        assert!((norm_inv(0.95).unwrap() - 1.644_853_627).abs() < 1e-8);
        assert!((norm_inv(0.01).unwrap() + 2.326_347_874).abs() < 1e-8);
    }

    #[test]
    fn test_norm_inv_symmetry() {
        for p in [0.001, 0.02, 0.2, 0.4] {
            let lo = norm_inv(p).unwrap();
            let hi = norm_inv(1.0 - p).unwrap();
            assert!((lo + hi).abs() < 1e-8, "p={} lo={} hi={}", p, lo, hi);
        }
    }

    #[test]
    fn test_norm_inv_out_of_range() {
        assert!(norm_inv(0.0).is_err());
        assert!(norm_inv(1.0).is_err());
        assert!(norm_inv(f64::NAN).is_err());
    }

    #[test]
    fn test_es_multiplier_both_conventions() {
        // Both tail levels appear in practice; the optimiser defaults to 0.975.
        assert!((es_multiplier(0.975).unwrap() - 2.337_802).abs() < 1e-5);
        assert!((es_multiplier(0.95).unwrap() - 2.062_713).abs() < 1e-5);
    }
}
