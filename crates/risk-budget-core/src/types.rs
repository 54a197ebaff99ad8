use serde::{Deserialize, Serialize};

/// Monetary amounts (portfolio values, trade sizes, costs).
pub type Money = f64;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = f64;

/// Trading days used to annualise daily statistics.
pub const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Floor applied to denominators (portfolio volatility, values) before dividing.
pub const EPSILON: f64 = 1e-16;

/// Tail confidence level used by the Expected-Shortfall optimiser unless the
/// caller overrides it.
pub const DEFAULT_TAIL_CONFIDENCE: f64 = 0.975;

/// Tolerance when checking that a weight or budget vector sums to one.
pub const SUM_TOLERANCE: f64 = 1e-6;

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "ieee754_f64".to_string(),
        },
    }
}
