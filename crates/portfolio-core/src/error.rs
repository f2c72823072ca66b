use thiserror::Error;

#[derive(Debug, Error)]
pub enum PortfolioError {
    #[error("Invalid input: {field} — {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Infeasible: target return {target_return} exceeds the maximum attainable return {max_attainable} for long-only, fully-invested weights")]
    Infeasible {
        target_return: f64,
        max_attainable: f64,
    },

    #[error("Solver failure: {function} stopped after {iterations} iterations ({reason})")]
    SolverFailure {
        function: String,
        iterations: u32,
        reason: String,
    },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<serde_json::Error> for PortfolioError {
    fn from(e: serde_json::Error) -> Self {
        PortfolioError::SerializationError(e.to_string())
    }
}
