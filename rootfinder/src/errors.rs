use aad::utils::errors::AadError;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum SolverError {
    #[error("Zero derivative at x = {x} (iteration {iteration})")]
    ZeroDerivative { x: f64, iteration: usize },
    #[error("No convergence after {iterations} iterations, last x = {last}")]
    NoConvergence { iterations: usize, last: f64 },
    #[error("Non-finite iterate {x} at iteration {iteration}")]
    NonFinite { x: f64, iteration: usize },
    #[error("Invalid tolerance: {0}")]
    InvalidTolerance(f64),
    #[error("AadError: {0}")]
    Aad(#[from] AadError),
}

pub type Result<T> = std::result::Result<T, SolverError>;

impl From<SolverError> for String {
    fn from(e: SolverError) -> Self {
        e.to_string()
    }
}
