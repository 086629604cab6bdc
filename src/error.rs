use ndarray::Array2;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, LleError>;

/// Failures raised by the embedding pipeline.
///
/// Every variant carries enough state for a caller to decide whether to retry
/// with adjusted parameters (larger `reg`, larger iteration budget, a new seed).
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LleError {
    #[error(
        "local Gram matrix of sample {sample} is not positive definite after regularization \
         (reg = {reg}); increase reg"
    )]
    SingularSystem { sample: usize, reg: f64 },
    #[error("eigensolver did not converge within {iterations} iterations (best residual {residual:e})")]
    EigensolverNonConvergence { iterations: usize, residual: f64 },
    #[error(
        "constrained optimizer stopped after {iterations} outer iterations with objective \
         {objective} and constraint violation {constraint_violation:e}"
    )]
    OptimizerFailure {
        iterations: usize,
        objective: f64,
        constraint_violation: f64,
        embedding: Array2<f64>,
    },
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),
    #[error("sparse matrix construction failed: {0}")]
    Sparse(String),
    #[error("optimizer backend error: {0}")]
    Backend(String),
}
