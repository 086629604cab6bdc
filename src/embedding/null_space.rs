//! # Null space embedding
//!
//! The embedding coordinates are the eigenvectors of the cost matrix `M` with the smallest
//! eigenvalues, skipping the first one: `M 1 = 0` for every valid weight matrix, so the constant
//! vector always sits at the bottom of the spectrum and carries no information.
//!
//! Two methods are available:
//! - [`EigenMethod::ShiftInvert`]: block inverse iteration on `(M - σI)⁻¹` with Rayleigh-Ritz
//!   extraction, bounded by `max_iter` and stopped once every wanted Ritz pair has a residual
//!   below `tol · max(1, ‖M‖_F)`
//! - [`EigenMethod::Dense`]: full symmetric eigendecomposition, exact but `O(n³)`

use log::{debug, info, warn};
use nalgebra::{DMatrix, DVector, Dyn, SymmetricEigen, LU};
use ndarray::{Array1, Array2, ArrayView2};
use nshare::{IntoNalgebra, IntoNdarray2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::{LleError, Result};
use crate::sparse::CostMatrix;

pub const DEFAULT_EIGEN_TOL: f64 = 1e-6;
pub const DEFAULT_EIGEN_MAX_ITER: usize = 100;

/// Number of leading eigenpairs dropped from the embedding.
const K_SKIP: usize = 1;

/// How often the shift is pushed away from the spectrum before giving up on the factorization.
const MAX_SHIFT_RETRIES: usize = 6;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum EigenMethod {
    #[default]
    ShiftInvert,
    Dense,
}

/// Embedding extracted from the bottom of the spectrum of `M`.
#[derive(Debug, Clone)]
pub struct NullSpaceEmbedding {
    embedding: Array2<f64>,
    eigenvalues: Array1<f64>,
    discarded_eigenvalue: f64,
    discarded_eigenvector: Array1<f64>,
    converged: bool,
    iterations: usize,
    residual: f64,
}

impl NullSpaceEmbedding {
    /// `n_samples × n_components` embedding, one eigenvector per column.
    pub fn embedding(&self) -> &Array2<f64> {
        &self.embedding
    }

    /// Eigenvalues belonging to the embedding columns, ascending.
    pub fn eigenvalues(&self) -> &Array1<f64> {
        &self.eigenvalues
    }

    /// Sum of the kept eigenvalues, the reconstruction cost of the embedding.
    pub fn reconstruction_cost(&self) -> f64 {
        self.eigenvalues.sum()
    }

    pub fn discarded_eigenvalue(&self) -> f64 {
        self.discarded_eigenvalue
    }

    pub fn discarded_eigenvector(&self) -> &Array1<f64> {
        &self.discarded_eigenvector
    }

    pub fn converged(&self) -> bool {
        self.converged
    }

    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Largest eigenpair residual `‖M v - λ v‖` among the returned pairs.
    pub fn residual(&self) -> f64 {
        self.residual
    }

    /// Promotes a non-converged run into `EigensolverNonConvergence`.
    pub fn ensure_converged(self) -> Result<Self> {
        if self.converged {
            Ok(self)
        } else {
            Err(LleError::EigensolverNonConvergence {
                iterations: self.iterations,
                residual: self.residual,
            })
        }
    }

    pub fn into_embedding(self) -> Array2<f64> {
        self.embedding
    }
}

#[derive(Debug, Clone)]
pub struct NullSpaceEmbedder {
    n_components: usize,
    tol: f64,
    max_iter: usize,
    sigma: f64,
    method: EigenMethod,
    random_seed: u64,
}

impl NullSpaceEmbedder {
    pub fn new(n_components: usize) -> Self {
        Self {
            n_components,
            tol: DEFAULT_EIGEN_TOL,
            max_iter: DEFAULT_EIGEN_MAX_ITER,
            sigma: 0.0,
            method: EigenMethod::default(),
            random_seed: 42,
        }
    }

    pub fn tol(mut self, tol: f64) -> Self {
        self.tol = tol;
        self
    }

    pub fn max_iter(mut self, max_iter: usize) -> Self {
        self.max_iter = max_iter;
        self
    }

    pub fn sigma(mut self, sigma: f64) -> Self {
        self.sigma = sigma;
        self
    }

    pub fn method(mut self, method: EigenMethod) -> Self {
        self.method = method;
        self
    }

    pub fn random_seed(mut self, random_seed: u64) -> Self {
        self.random_seed = random_seed;
        self
    }

    /// Computes the `n_components + 1` eigenpairs of `M` closest to the shift and drops the first.
    ///
    /// Running out of iterations is not an error here: the best iterate is returned with
    /// `converged() == false`. Use [`NullSpaceEmbedding::ensure_converged`] to make it one.
    pub fn embed(&self, cost: &CostMatrix) -> Result<NullSpaceEmbedding> {
        let n_samples = cost.n_samples();
        let n_eigen = self.n_components + K_SKIP;

        if self.n_components == 0 {
            return Err(LleError::InvalidParameter(
                "n_components must be at least 1".to_string(),
            ));
        }
        if n_eigen > n_samples {
            return Err(LleError::InvalidParameter(format!(
                "n_components ({}) must be smaller than the number of samples ({})",
                self.n_components, n_samples
            )));
        }
        if !self.tol.is_finite() || self.tol <= 0.0 || self.max_iter == 0 {
            return Err(LleError::InvalidParameter(format!(
                "eigensolver needs tol > 0 and max_iter > 0, got tol = {} and max_iter = {}",
                self.tol, self.max_iter
            )));
        }

        let m = to_nalgebra(cost.view());
        let pairs = match self.method {
            EigenMethod::Dense => self.dense(&m, n_eigen),
            EigenMethod::ShiftInvert => self.shift_invert(&m, n_eigen)?,
        };

        if !pairs.converged {
            warn!(
                "Eigensolver stopped after {} iterations with residual {:e} (tol {:e})",
                pairs.iterations, pairs.residual, self.tol
            );
        }
        debug!("Bottom eigenvalues of the cost matrix: {:?}", pairs.values.as_slice());

        let vectors = pairs.vectors.into_ndarray2().into_owned();
        let values = Array1::from_iter(pairs.values.iter().copied());

        info!(
            "Null space embedding: {} components, discarded eigenvalue {:e}",
            self.n_components, values[0]
        );

        Ok(NullSpaceEmbedding {
            embedding: vectors.slice(ndarray::s![.., K_SKIP..]).to_owned(),
            eigenvalues: values.slice(ndarray::s![K_SKIP..]).to_owned(),
            discarded_eigenvalue: values[0],
            discarded_eigenvector: vectors.column(0).to_owned(),
            converged: pairs.converged,
            iterations: pairs.iterations,
            residual: pairs.residual,
        })
    }

    fn dense(&self, m: &DMatrix<f64>, n_eigen: usize) -> EigenPairs {
        let eigen = SymmetricEigen::new(m.clone());
        let (values, mut vectors) =
            select_nearest(&eigen.eigenvalues, &eigen.eigenvectors, self.sigma, n_eigen);
        flip_signs(&mut vectors);
        let residual = max_residual(m, &values, &vectors);
        EigenPairs {
            values,
            vectors,
            converged: true,
            iterations: 1,
            residual,
        }
    }

    fn shift_invert(&self, m: &DMatrix<f64>, n_eigen: usize) -> Result<EigenPairs> {
        let n_samples = m.nrows();
        // ARPACK's default number of Lanczos vectors for symmetric problems
        let block = n_samples.min((2 * n_eigen + 1).max(20));
        let scale = m.norm().max(1.0);
        let threshold = self.tol * scale;

        let (lu, sigma) = factorize_shifted(m, self.sigma, scale)?;
        debug!(
            "Shift-invert iteration: n = {}, block = {}, sigma = {:e}, threshold = {:e}",
            n_samples, block, sigma, threshold
        );

        let mut rng = ChaCha8Rng::seed_from_u64(self.random_seed);
        let start = DMatrix::<f64>::from_fn(n_samples, block, |_, _| rng.random_range(-1.0..1.0));
        let mut basis = start.qr().q();

        let mut best: Option<EigenPairs> = None;
        for iteration in 1..=self.max_iter {
            let solved = lu.solve(&basis).ok_or(LleError::EigensolverNonConvergence {
                iterations: iteration,
                residual: f64::INFINITY,
            })?;
            if solved.iter().any(|v| !v.is_finite()) {
                return Err(LleError::EigensolverNonConvergence {
                    iterations: iteration,
                    residual: f64::INFINITY,
                });
            }
            let q = solved.qr().q();

            // Rayleigh-Ritz on the current subspace
            let projected = q.transpose() * m * &q;
            let projected = (&projected + projected.transpose()) * 0.5;
            let ritz = SymmetricEigen::new(projected);
            let width = ritz.eigenvalues.len();
            let (ritz_values, rotation) =
                select_nearest(&ritz.eigenvalues, &ritz.eigenvectors, sigma, width);
            basis = &q * rotation;

            let values = ritz_values.rows(0, n_eigen).into_owned();
            let mut vectors = basis.columns(0, n_eigen).into_owned();
            flip_signs(&mut vectors);
            let residual = max_residual(m, &values, &vectors);

            let improved = best.as_ref().map_or(true, |b| residual < b.residual);
            if improved {
                best = Some(EigenPairs {
                    values,
                    vectors,
                    converged: residual <= threshold,
                    iterations: iteration,
                    residual,
                });
            }
            if residual <= threshold {
                debug!("Shift-invert converged after {} iterations", iteration);
                break;
            }
        }

        let mut pairs = best.ok_or(LleError::EigensolverNonConvergence {
            iterations: self.max_iter,
            residual: f64::INFINITY,
        })?;
        if !pairs.converged {
            pairs.iterations = self.max_iter;
        }
        Ok(pairs)
    }
}

struct EigenPairs {
    values: DVector<f64>,
    vectors: DMatrix<f64>,
    converged: bool,
    iterations: usize,
    residual: f64,
}

fn to_nalgebra(view: ArrayView2<f64>) -> DMatrix<f64> {
    let standard = view.as_standard_layout();
    standard.view().into_nalgebra().clone_owned()
}

/// LU factorization of `M - σI`, moving σ below the spectrum until the factors are usable.
fn factorize_shifted(m: &DMatrix<f64>, sigma: f64, scale: f64) -> Result<(LU<f64, Dyn, Dyn>, f64)> {
    let n = m.nrows();
    let mut shift = sigma;
    let mut nudge = 1e-10 * scale;
    for _ in 0..=MAX_SHIFT_RETRIES {
        let shifted = m - DMatrix::<f64>::identity(n, n) * shift;
        let lu = shifted.lu();
        let probe = lu.solve(&DVector::from_element(n, 1.0));
        let usable = lu.is_invertible() && probe.is_some_and(|p| p.iter().all(|v| v.is_finite()));
        if usable {
            return Ok((lu, shift));
        }
        warn!(
            "M - {:e} I is numerically singular, retrying with sigma = {:e}",
            shift,
            sigma - nudge
        );
        shift = sigma - nudge;
        nudge *= 100.0;
    }
    Err(LleError::EigensolverNonConvergence {
        iterations: 0,
        residual: f64::INFINITY,
    })
}

/// Picks the `count` eigenpairs whose eigenvalues are closest to `sigma`, ordered by that distance.
fn select_nearest(
    values: &DVector<f64>,
    vectors: &DMatrix<f64>,
    sigma: f64,
    count: usize,
) -> (DVector<f64>, DMatrix<f64>) {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| {
        (values[a] - sigma)
            .abs()
            .total_cmp(&(values[b] - sigma).abs())
            .then(values[a].total_cmp(&values[b]))
    });
    order.truncate(count);

    let selected_values = DVector::from_iterator(count, order.iter().map(|&i| values[i]));
    let columns: Vec<DVector<f64>> = order.iter().map(|&i| vectors.column(i).into_owned()).collect();
    (selected_values, DMatrix::from_columns(&columns))
}

fn max_residual(m: &DMatrix<f64>, values: &DVector<f64>, vectors: &DMatrix<f64>) -> f64 {
    (0..values.len())
        .map(|j| {
            let v = vectors.column(j).into_owned();
            (m * &v - &v * values[j]).norm()
        })
        .fold(0.0, f64::max)
}

/// Makes the largest-magnitude entry of every eigenvector positive.
fn flip_signs(vectors: &mut DMatrix<f64>) {
    for mut column in vectors.column_iter_mut() {
        let pivot = column.iamax();
        if column[pivot] < 0.0 {
            column.neg_mut();
        }
    }
}
