//! # Constrained embedding optimizer
//!
//! Finds an embedding by minimizing `trace(Yᵀ M Y)` directly, subject to a centering constraint
//! and the decorrelation constraint `(1/n) YᵀY = I`.
//!
//! The equality constrained problem is solved with an augmented Lagrangian outer loop. Each
//! subproblem is an unconstrained minimization handled by argmin's L-BFGS with a More-Thuente
//! line search. The problem is non-convex, so only a local optimum is found and the result depends
//! on the seeded starting point.

use argmin::core::{CostFunction, Executor, Gradient, State};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use log::{debug, info, warn};
use ndarray::{Array2, ArrayView2, Axis};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{LleError, Result};
use crate::sparse::CostMatrix;
use crate::utils::max_abs;

const LBFGS_MEMORY: usize = 10;
const INNER_GRAD_TOL: f64 = 1e-10;
const MAX_INNER_FAILURES: usize = 3;

/// Which sums of `Y` are pinned to zero.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Centering {
    /// Every embedding coordinate has zero mean over the samples.
    #[default]
    PerComponent,
    /// Every sample's coordinates sum to zero. Together with `(1/n) YᵀY = I` this is
    /// infeasible, so runs in this mode end with `success == false`.
    PerSample,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum GradientMode {
    /// Central differences on the augmented Lagrangian. Costs `2 n k` evaluations per gradient.
    #[default]
    FiniteDifference,
    Analytic,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimizerConfig {
    pub max_outer_iter: usize,
    pub max_inner_iter: usize,
    pub constraint_tol: f64,
    pub initial_penalty: f64,
    pub penalty_growth: f64,
    pub max_penalty: f64,
    pub gradient: GradientMode,
    pub centering: Centering,
    pub random_seed: u64,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            max_outer_iter: 50,
            max_inner_iter: 200,
            constraint_tol: 1e-6,
            initial_penalty: 10.0,
            penalty_growth: 10.0,
            max_penalty: 1e12,
            gradient: GradientMode::default(),
            centering: Centering::default(),
            random_seed: 42,
        }
    }
}

impl OptimizerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_outer_iter == 0 || self.max_inner_iter == 0 {
            return Err(LleError::InvalidParameter(
                "optimizer iteration limits must be positive".to_string(),
            ));
        }
        if !self.constraint_tol.is_finite() || self.constraint_tol <= 0.0 {
            return Err(LleError::InvalidParameter(format!(
                "constraint_tol must be positive, got {}",
                self.constraint_tol
            )));
        }
        if !self.initial_penalty.is_finite() || self.initial_penalty <= 0.0 {
            return Err(LleError::InvalidParameter(format!(
                "initial_penalty must be positive, got {}",
                self.initial_penalty
            )));
        }
        if !self.penalty_growth.is_finite() || self.penalty_growth <= 1.0 {
            return Err(LleError::InvalidParameter(format!(
                "penalty_growth must exceed 1, got {}",
                self.penalty_growth
            )));
        }
        if self.max_penalty < self.initial_penalty {
            return Err(LleError::InvalidParameter(format!(
                "max_penalty ({}) is below initial_penalty ({})",
                self.max_penalty, self.initial_penalty
            )));
        }
        Ok(())
    }
}

/// Outcome of a constrained run: `{success, objective, embedding}` plus diagnostics.
#[derive(Debug, Clone)]
pub struct OptimizeResult {
    pub success: bool,
    /// `trace(Yᵀ M Y)` at the returned embedding.
    pub objective: f64,
    pub embedding: Array2<f64>,
    /// Largest absolute constraint residual.
    pub constraint_violation: f64,
    pub iterations: usize,
}

impl OptimizeResult {
    pub fn ensure_success(self) -> Result<Self> {
        if self.success {
            Ok(self)
        } else {
            Err(LleError::OptimizerFailure {
                iterations: self.iterations,
                objective: self.objective,
                constraint_violation: self.constraint_violation,
                embedding: self.embedding,
            })
        }
    }
}

#[derive(Debug, Clone)]
pub struct ConstrainedEmbeddingOptimizer {
    n_components: usize,
    config: OptimizerConfig,
}

impl ConstrainedEmbeddingOptimizer {
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            config: OptimizerConfig::default(),
        }
    }

    pub fn config(mut self, config: OptimizerConfig) -> Self {
        self.config = config;
        self
    }

    /// Starts from `Y₀ ~ U[0, 1)` drawn from the configured seed.
    pub fn optimize(&self, cost: &CostMatrix) -> Result<OptimizeResult> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.config.random_seed);
        let initial = Array2::from_shape_fn((cost.n_samples(), self.n_components), |_| {
            rng.random::<f64>()
        });
        self.optimize_from(cost, initial)
    }

    /// Runs the augmented Lagrangian iteration from a caller-supplied starting embedding.
    pub fn optimize_from(&self, cost: &CostMatrix, initial: Array2<f64>) -> Result<OptimizeResult> {
        self.config.validate()?;
        let n_samples = cost.n_samples();
        let n_components = self.n_components;
        if n_components == 0 || n_components >= n_samples {
            return Err(LleError::InvalidParameter(format!(
                "n_components must be in 1..{}, got {}",
                n_samples, n_components
            )));
        }
        if initial.dim() != (n_samples, n_components) {
            return Err(LleError::ShapeMismatch(format!(
                "initial embedding is {:?}, expected ({}, {})",
                initial.dim(),
                n_samples,
                n_components
            )));
        }

        let m = cost.view();
        let centering = self.config.centering;
        let n_constraints =
            centering.n_constraints(n_samples, n_components) + n_components * n_components;
        debug!(
            "Augmented Lagrangian: {} variables, {} equality constraints, {:?} centering",
            n_samples * n_components,
            n_constraints,
            centering
        );

        let mut y: Vec<f64> = initial.iter().copied().collect();
        let mut multipliers = vec![0.0; n_constraints];
        let mut penalty = self.config.initial_penalty;
        let mut previous_violation = f64::INFINITY;
        let mut violation = f64::INFINITY;
        let mut failures = 0;
        let mut iterations = 0;

        for outer in 1..=self.config.max_outer_iter {
            iterations = outer;
            let problem = AugmentedLagrangian {
                cost: cost.view(),
                n_components,
                centering,
                mode: self.config.gradient,
                multipliers: &multipliers,
                penalty,
            };

            match self.minimize(problem, y.clone()) {
                Ok(next) => {
                    y = next;
                    failures = 0;
                }
                Err(e) => {
                    failures += 1;
                    warn!("Inner solve {} failed: {}", outer, e);
                    if failures >= MAX_INNER_FAILURES {
                        break;
                    }
                    penalty = (penalty * self.config.penalty_growth).min(self.config.max_penalty);
                    continue;
                }
            }

            let embedding = as_embedding(&y, n_components)?;
            let residuals = constraint_values(embedding, centering);
            violation = max_abs(&residuals);
            debug!(
                "Outer iteration {}: objective {:.6e}, violation {:.3e}, penalty {:.1e}",
                outer,
                objective(m, embedding),
                violation,
                penalty
            );
            if violation <= self.config.constraint_tol {
                break;
            }

            for (lambda, c) in multipliers.iter_mut().zip(residuals.iter()) {
                *lambda += penalty * c;
            }
            if violation > 0.25 * previous_violation {
                penalty = (penalty * self.config.penalty_growth).min(self.config.max_penalty);
            }
            previous_violation = violation;
        }

        let embedding = Array2::from_shape_vec((n_samples, n_components), y)
            .map_err(|e| LleError::ShapeMismatch(e.to_string()))?;
        let objective = objective(m, embedding.view());
        if violation.is_infinite() {
            violation = max_abs(&constraint_values(embedding.view(), centering));
        }
        let success = violation <= self.config.constraint_tol;

        if success {
            info!(
                "Constrained optimizer converged after {} outer iterations, objective {:.6e}",
                iterations, objective
            );
        } else {
            warn!(
                "Constrained optimizer stopped after {} outer iterations with violation {:.3e}",
                iterations, violation
            );
        }

        Ok(OptimizeResult {
            success,
            objective,
            embedding,
            constraint_violation: violation,
            iterations,
        })
    }

    fn minimize(&self, problem: AugmentedLagrangian<'_>, start: Vec<f64>) -> Result<Vec<f64>> {
        let linesearch = MoreThuenteLineSearch::new();
        let solver = LBFGS::new(linesearch, LBFGS_MEMORY)
            .with_tolerance_grad(INNER_GRAD_TOL)
            .map_err(backend)?;

        let result = Executor::new(problem, solver)
            .configure(|state| state.param(start).max_iters(self.config.max_inner_iter as u64))
            .run()
            .map_err(backend)?;

        result
            .state()
            .get_best_param()
            .cloned()
            .ok_or_else(|| LleError::Backend("L-BFGS returned no parameter".to_string()))
    }
}

impl Centering {
    fn n_constraints(self, n_samples: usize, n_components: usize) -> usize {
        match self {
            Centering::PerComponent => n_components,
            Centering::PerSample => n_samples,
        }
    }
}

fn backend(e: argmin::core::Error) -> LleError {
    LleError::Backend(e.to_string())
}

fn as_embedding(y: &[f64], n_components: usize) -> Result<ArrayView2<'_, f64>> {
    ArrayView2::from_shape((y.len() / n_components, n_components), y)
        .map_err(|e| LleError::ShapeMismatch(e.to_string()))
}

fn objective(m: ArrayView2<f64>, y: ArrayView2<f64>) -> f64 {
    (&y * &m.dot(&y)).sum()
}

/// Centering residuals followed by the row-major entries of `(1/n) YᵀY - I`.
fn constraint_values(y: ArrayView2<f64>, centering: Centering) -> Vec<f64> {
    let (n_samples, n_components) = y.dim();
    let sums = match centering {
        Centering::PerComponent => y.sum_axis(Axis(0)),
        Centering::PerSample => y.sum_axis(Axis(1)),
    };
    let mut covariance = y.t().dot(&y) / n_samples as f64;
    for d in 0..n_components {
        covariance[[d, d]] -= 1.0;
    }
    sums.iter().chain(covariance.iter()).copied().collect()
}

/// `f(Y) + λᵀc(Y) + (μ/2) ‖c(Y)‖²` over a flattened row-major `Y`.
struct AugmentedLagrangian<'a> {
    cost: ArrayView2<'a, f64>,
    n_components: usize,
    centering: Centering,
    mode: GradientMode,
    multipliers: &'a [f64],
    penalty: f64,
}

impl AugmentedLagrangian<'_> {
    fn value(&self, y: &[f64]) -> Result<f64> {
        let y = as_embedding(y, self.n_components)?;
        let residuals = constraint_values(y, self.centering);
        let linear: f64 = self.multipliers.iter().zip(&residuals).map(|(l, c)| l * c).sum();
        let quadratic: f64 = residuals.iter().map(|c| c * c).sum();
        Ok(objective(self.cost, y) + linear + 0.5 * self.penalty * quadratic)
    }

    fn analytic_gradient(&self, y: &[f64]) -> Result<Vec<f64>> {
        let y = as_embedding(y, self.n_components)?;
        let (n_samples, n_components) = y.dim();
        let residuals = constraint_values(y, self.centering);
        // η = λ + μ c is the multiplier estimate after this step
        let eta: Vec<f64> = self
            .multipliers
            .iter()
            .zip(&residuals)
            .map(|(l, c)| l + self.penalty * c)
            .collect();
        let split = self.centering.n_constraints(n_samples, n_components);

        let mut grad = self.cost.dot(&y) * 2.0;
        for ((i, l), g) in grad.indexed_iter_mut() {
            *g += match self.centering {
                Centering::PerComponent => eta[l],
                Centering::PerSample => eta[i],
            };
        }

        let h = ArrayView2::from_shape((n_components, n_components), &eta[split..])
            .map_err(|e| LleError::ShapeMismatch(e.to_string()))?;
        let symmetric = &h + &h.t();
        grad.scaled_add(1.0 / n_samples as f64, &y.dot(&symmetric));

        Ok(grad.into_iter().collect())
    }

    fn finite_difference_gradient(&self, y: &[f64]) -> Result<Vec<f64>> {
        let step_scale = f64::EPSILON.cbrt();
        let mut probe = y.to_vec();
        let mut grad = Vec::with_capacity(y.len());
        for j in 0..y.len() {
            let h = step_scale * y[j].abs().max(1.0);
            probe[j] = y[j] + h;
            let forward = self.value(&probe)?;
            probe[j] = y[j] - h;
            let backward = self.value(&probe)?;
            probe[j] = y[j];
            grad.push((forward - backward) / (2.0 * h));
        }
        Ok(grad)
    }
}

impl CostFunction for AugmentedLagrangian<'_> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, p: &Self::Param) -> std::result::Result<Self::Output, argmin::core::Error> {
        Ok(self.value(p)?)
    }
}

impl Gradient for AugmentedLagrangian<'_> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, p: &Self::Param) -> std::result::Result<Self::Gradient, argmin::core::Error> {
        let grad = match self.mode {
            GradientMode::Analytic => self.analytic_gradient(p)?,
            GradientMode::FiniteDifference => self.finite_difference_gradient(p)?,
        };
        Ok(grad)
    }
}
