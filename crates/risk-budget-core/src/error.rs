use thiserror::Error;

#[derive(Debug, Error)]
pub enum RiskBudgetError {
    #[error("Invalid input: {field} - {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Dimension mismatch: {field} expected length {expected}, got {actual}")]
    DimensionMismatch {
        field: String,
        expected: usize,
        actual: usize,
    },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Date error: {0}")]
    DateError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl RiskBudgetError {
    /// Every variant describes malformed caller data; numeric degeneracy and
    /// non-convergence are reported through results, never through errors.
    pub fn is_data_error(&self) -> bool {
        !matches!(self, RiskBudgetError::SerializationError(_))
    }

    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        RiskBudgetError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn mismatch(field: impl Into<String>, expected: usize, actual: usize) -> Self {
        RiskBudgetError::DimensionMismatch {
            field: field.into(),
            expected,
            actual,
        }
    }
}

impl From<serde_json::Error> for RiskBudgetError {
    fn from(e: serde_json::Error) -> Self {
        RiskBudgetError::SerializationError(e.to_string())
    }
}
