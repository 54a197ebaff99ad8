pub mod contributions;
pub mod erc;
pub mod expected_shortfall;
pub mod normal;
pub mod projection;
pub mod result;

pub use result::{OptimizationResult, OptimizerKind};
