pub mod metrics;
pub mod stress;
