//! # Riemannian locally linear embedding
//!
//! End-to-end pipeline:
//!
//! ```text
//! data + metric -> neighbors -> barycenter weights -> (W, M) -> embedding
//! ```
//!
//! The embedding is read either from the null space of `M` ([`RiemannianLLE::fit_null_space`])
//! or from a constrained minimization of `trace(Yᵀ M Y)` ([`RiemannianLLE::fit_optimized`]).
//!
//! # Example Usage
//! ```ignore
//! let lle = RiemannianLLEBuilder::new()
//!     .n_neighbors(10)
//!     .n_components(2)
//!     .build()?;
//! let embedding = lle.fit_null_space(data.view(), &Hypersphere)?.ensure_converged()?;
//! ```

use std::time::Instant;

use log::{debug, info};
use ndarray::{Array1, ArrayView2};

use crate::embedding::{
    ConstrainedEmbeddingOptimizer, EigenMethod, NullSpaceEmbedder, NullSpaceEmbedding,
    OptimizeResult, OptimizerConfig,
};
use crate::error::{LleError, Result};
use crate::metric::Metric;
use crate::neighbors::{NeighborGraphBuilder, NeighborIndex, SelfInclusion};
use crate::sparse::{assemble, CostMatrix, WeightMatrix};
use crate::utils::all_finite;
use crate::weights::{reconstruction_errors, BarycenterWeightSolver, BarycenterWeights, Weighting};

/// Intermediate products of a fit, up to and including the cost matrix.
#[derive(Debug, Clone)]
pub struct LleFit {
    pub neighbors: NeighborIndex,
    pub weights: BarycenterWeights,
    pub weight_matrix: WeightMatrix,
    pub cost: CostMatrix,
}

impl LleFit {
    /// Per-sample tangent-space reconstruction error of the fitted weights.
    pub fn reconstruction_errors<M: Metric + ?Sized>(
        &self,
        data: ArrayView2<f64>,
        metric: &M,
    ) -> Result<Array1<f64>> {
        reconstruction_errors(metric, data, &self.neighbors, &self.weights)
    }
}

/// A validated LLE configuration. Create it with [`RiemannianLLEBuilder`].
#[derive(Debug, Clone)]
pub struct RiemannianLLE {
    n_neighbors: usize,
    n_components: usize,
    reg: f64,
    eigen_tol: f64,
    eigen_max_iter: usize,
    eigen_method: EigenMethod,
    sigma: f64,
    self_inclusion: SelfInclusion,
    weighting: Weighting,
    parallel: bool,
    random_seed: u64,
    optimizer: OptimizerConfig,
}

impl RiemannianLLE {
    pub fn n_neighbors(&self) -> usize {
        self.n_neighbors
    }

    pub fn n_components(&self) -> usize {
        self.n_components
    }

    pub fn is_parallel(&self) -> bool {
        self.parallel
    }

    /// Runs the pipeline up to the cost matrix.
    ///
    /// # Errors
    /// - `InvalidParameter` for non-finite data, or when `n_neighbors` or `n_components` do not
    ///   fit the number of samples
    /// - `SingularSystem` from the barycenter solve
    pub fn fit<M: Metric + ?Sized>(&self, data: ArrayView2<f64>, metric: &M) -> Result<LleFit> {
        let (n_samples, n_features) = data.dim();
        if !all_finite(data) {
            return Err(LleError::InvalidParameter(
                "input data contains NaN or infinite values".to_string(),
            ));
        }
        if self.n_components >= n_samples {
            return Err(LleError::InvalidParameter(format!(
                "n_components ({}) must be smaller than the number of samples ({})",
                self.n_components, n_samples
            )));
        }
        debug!(
            "Fitting LLE: {} samples x {} features, {} neighbors, {} components",
            n_samples, n_features, self.n_neighbors, self.n_components
        );

        let started = Instant::now();
        let neighbors = NeighborGraphBuilder::new(self.n_neighbors)
            .self_inclusion(self.self_inclusion)
            .parallel(self.parallel)
            .build(data, metric)?;
        debug!("Neighbor search took {} ms", started.elapsed().as_millis());

        let started = Instant::now();
        let weights = BarycenterWeightSolver::new(self.reg)
            .weighting(self.weighting)
            .parallel(self.parallel)
            .solve(metric, data, &neighbors)?;
        debug!("Barycenter weights took {} ms", started.elapsed().as_millis());

        let started = Instant::now();
        let (weight_matrix, cost) = assemble(&weights, &neighbors)?;
        debug!("Matrix assembly took {} ms", started.elapsed().as_millis());

        Ok(LleFit {
            neighbors,
            weights,
            weight_matrix,
            cost,
        })
    }

    /// Eigenvector embedding of an existing fit.
    pub fn embed_null_space(&self, fit: &LleFit) -> Result<NullSpaceEmbedding> {
        let started = Instant::now();
        let embedding = NullSpaceEmbedder::new(self.n_components)
            .tol(self.eigen_tol)
            .max_iter(self.eigen_max_iter)
            .sigma(self.sigma)
            .method(self.eigen_method)
            .random_seed(self.random_seed)
            .embed(&fit.cost)?;
        info!(
            "Null space embedding finished in {} ms (converged = {})",
            started.elapsed().as_millis(),
            embedding.converged()
        );
        Ok(embedding)
    }

    /// Constrained-optimization embedding of an existing fit, seeded with `random_seed`.
    pub fn embed_optimized(&self, fit: &LleFit) -> Result<OptimizeResult> {
        let config = OptimizerConfig {
            random_seed: self.random_seed,
            ..self.optimizer.clone()
        };
        let started = Instant::now();
        let result = ConstrainedEmbeddingOptimizer::new(self.n_components)
            .config(config)
            .optimize(&fit.cost)?;
        info!(
            "Optimized embedding finished in {} ms (success = {})",
            started.elapsed().as_millis(),
            result.success
        );
        Ok(result)
    }

    pub fn fit_null_space<M: Metric + ?Sized>(
        &self,
        data: ArrayView2<f64>,
        metric: &M,
    ) -> Result<NullSpaceEmbedding> {
        let fit = self.fit(data, metric)?;
        self.embed_null_space(&fit)
    }

    pub fn fit_optimized<M: Metric + ?Sized>(
        &self,
        data: ArrayView2<f64>,
        metric: &M,
    ) -> Result<OptimizeResult> {
        let fit = self.fit(data, metric)?;
        self.embed_optimized(&fit)
    }
}

/// Builder for configuring and creating [`RiemannianLLE`] instances.
///
/// Use `RiemannianLLEBuilder::new()` to start from the defaults and `build()` to validate them.
#[derive(Debug, Clone)]
pub struct RiemannianLLEBuilder {
    n_neighbors: usize,
    n_components: usize,
    reg: f64,
    eigen_tol: f64,
    eigen_max_iter: usize,
    eigen_method: EigenMethod,
    sigma: f64,
    self_inclusion: SelfInclusion,
    weighting: Weighting,
    parallel: bool,
    random_seed: u64,
    optimizer: OptimizerConfig,
}

impl Default for RiemannianLLEBuilder {
    fn default() -> Self {
        Self {
            n_neighbors: 5,
            n_components: 2,
            reg: crate::weights::DEFAULT_REG,
            eigen_tol: crate::embedding::null_space::DEFAULT_EIGEN_TOL,
            eigen_max_iter: crate::embedding::null_space::DEFAULT_EIGEN_MAX_ITER,
            eigen_method: EigenMethod::default(),
            sigma: 0.0,
            self_inclusion: SelfInclusion::default(),
            weighting: Weighting::default(),
            parallel: false,
            random_seed: 42,
            optimizer: OptimizerConfig::default(),
        }
    }
}

impl RiemannianLLEBuilder {
    /// Creates a new builder with default parameters.
    ///
    /// Default values:
    /// - `n_neighbors`: 5
    /// - `n_components`: 2
    /// - `reg`: 1e-3
    /// - `eigen_tol`: 1e-6
    /// - `eigen_max_iter`: 100
    /// - `eigen_method`: ShiftInvert
    /// - `sigma`: 0.0
    /// - `self_inclusion`: Exclude
    /// - `weighting`: Ambient
    /// - `parallel`: false
    /// - `random_seed`: 42
    pub fn new() -> Self {
        Self::default()
    }

    pub fn n_neighbors(mut self, n_neighbors: usize) -> Self {
        self.n_neighbors = n_neighbors;
        self
    }

    pub fn n_components(mut self, n_components: usize) -> Self {
        self.n_components = n_components;
        self
    }

    /// Sets the Tikhonov regularization, applied as `reg · trace(G)` to each local Gram matrix.
    ///
    /// Needed whenever `n_neighbors` exceeds the intrinsic dimension of the data.
    pub fn reg(mut self, reg: f64) -> Self {
        self.reg = reg;
        self
    }

    pub fn eigen_tol(mut self, eigen_tol: f64) -> Self {
        self.eigen_tol = eigen_tol;
        self
    }

    pub fn eigen_max_iter(mut self, eigen_max_iter: usize) -> Self {
        self.eigen_max_iter = eigen_max_iter;
        self
    }

    /// - `EigenMethod::ShiftInvert`: iterative, only factors `M - σI` once
    /// - `EigenMethod::Dense`: full decomposition, exact
    pub fn eigen_method(mut self, eigen_method: EigenMethod) -> Self {
        self.eigen_method = eigen_method;
        self
    }

    pub fn sigma(mut self, sigma: f64) -> Self {
        self.sigma = sigma;
        self
    }

    pub fn self_inclusion(mut self, self_inclusion: SelfInclusion) -> Self {
        self.self_inclusion = self_inclusion;
        self
    }

    pub fn weighting(mut self, weighting: Weighting) -> Self {
        self.weighting = weighting;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Seed for the eigensolver start block and the optimizer's initial embedding.
    pub fn random_seed(mut self, random_seed: u64) -> Self {
        self.random_seed = random_seed;
        self
    }

    /// Optimizer settings. Its `random_seed` is replaced by the builder's.
    pub fn optimizer(mut self, optimizer: OptimizerConfig) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn build(self) -> Result<RiemannianLLE> {
        if self.n_neighbors == 0 {
            return Err(LleError::InvalidParameter(
                "n_neighbors must be at least 1".to_string(),
            ));
        }
        if self.n_components == 0 {
            return Err(LleError::InvalidParameter(
                "n_components must be at least 1".to_string(),
            ));
        }
        if !self.reg.is_finite() || self.reg < 0.0 {
            return Err(LleError::InvalidParameter(format!(
                "reg must be finite and non-negative, got {}",
                self.reg
            )));
        }
        if !self.eigen_tol.is_finite() || self.eigen_tol <= 0.0 || self.eigen_max_iter == 0 {
            return Err(LleError::InvalidParameter(format!(
                "eigen_tol ({}) and eigen_max_iter ({}) must be positive",
                self.eigen_tol, self.eigen_max_iter
            )));
        }
        if !self.sigma.is_finite() {
            return Err(LleError::InvalidParameter(format!(
                "sigma must be finite, got {}",
                self.sigma
            )));
        }
        self.optimizer.validate()?;

        Ok(RiemannianLLE {
            n_neighbors: self.n_neighbors,
            n_components: self.n_components,
            reg: self.reg,
            eigen_tol: self.eigen_tol,
            eigen_max_iter: self.eigen_max_iter,
            eigen_method: self.eigen_method,
            sigma: self.sigma,
            self_inclusion: self.self_inclusion,
            weighting: self.weighting,
            parallel: self.parallel,
            random_seed: self.random_seed,
            optimizer: self.optimizer,
        })
    }
}
