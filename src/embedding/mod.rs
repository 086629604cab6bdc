//! Embedding extraction from the cost matrix `M`.
//!
//! [`NullSpaceEmbedder`] reads the embedding off the bottom of the spectrum of `M`.
//! [`ConstrainedEmbeddingOptimizer`] minimizes `trace(Yᵀ M Y)` under centering and
//! decorrelation constraints instead.

pub mod null_space;
pub mod optimizer;

pub use null_space::{EigenMethod, NullSpaceEmbedder, NullSpaceEmbedding};
pub use optimizer::{
    Centering, ConstrainedEmbeddingOptimizer, GradientMode, OptimizeResult, OptimizerConfig,
};
