//! # Barycenter weights
//!
//! For every sample `x_i` with neighbors `N(i)`, the solver maps the neighbors into the tangent
//! space at `x_i` with the metric's logarithmic map, forms the local Gram matrix of those tangent
//! vectors and solves the regularized system `G w = 1`. Normalizing `w` to unit sum yields the
//! affine reconstruction weights of `x_i` from its neighbors.
//!
//! Rows are independent: each one reads only the shared dataset, metric and neighbor index and
//! writes its own slot of the output, so the loop is a plain parallel map over sample indices.

use log::{debug, info};
use nalgebra::{Cholesky, DVector};
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, ArrayViewMut1, Axis};
use nshare::IntoNalgebra;
use rayon::prelude::*;

use crate::dense::Normalize;
use crate::error::{LleError, Result};
use crate::metric::Metric;
use crate::neighbors::NeighborIndex;
use crate::utils::Direction;

pub const DEFAULT_REG: f64 = 1e-3;

/// Inner product used to build the local Gram matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Weighting {
    /// `G = C Cᵀ`, the ambient inner product of the tangent vectors.
    #[default]
    Ambient,
    /// `G = C g(x_i) Cᵀ` with `g` the metric tensor at the base point.
    MetricAware,
}

/// `n_samples × n_neighbors` reconstruction weights; every row sums to one.
#[derive(Debug, Clone, PartialEq)]
pub struct BarycenterWeights {
    weights: Array2<f64>,
}

impl BarycenterWeights {
    pub fn n_samples(&self) -> usize {
        self.weights.nrows()
    }

    pub fn n_neighbors(&self) -> usize {
        self.weights.ncols()
    }

    pub fn row(&self, sample: usize) -> ArrayView1<f64> {
        self.weights.row(sample)
    }

    pub fn view(&self) -> ArrayView2<f64> {
        self.weights.view()
    }

    pub fn row_sums(&self) -> Array1<f64> {
        self.weights.sum_axis(Axis(1))
    }

    pub fn into_inner(self) -> Array2<f64> {
        self.weights
    }
}

#[derive(Debug, Clone)]
pub struct BarycenterWeightSolver {
    reg: f64,
    weighting: Weighting,
    parallel: bool,
}

impl Default for BarycenterWeightSolver {
    fn default() -> Self {
        Self {
            reg: DEFAULT_REG,
            weighting: Weighting::default(),
            parallel: false,
        }
    }
}

impl BarycenterWeightSolver {
    pub fn new(reg: f64) -> Self {
        Self {
            reg,
            ..Self::default()
        }
    }

    pub fn weighting(mut self, weighting: Weighting) -> Self {
        self.weighting = weighting;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn reg(&self) -> f64 {
        self.reg
    }

    /// Computes the barycenter weights of every sample from its neighbors.
    ///
    /// # Errors
    /// - `ShapeMismatch` if the neighbor index does not describe `data`
    /// - `InvalidParameter` if `reg` is negative or not finite
    /// - `SingularSystem` for the first sample whose regularized Gram matrix is not positive definite
    pub fn solve<M: Metric + ?Sized>(
        &self,
        metric: &M,
        data: ArrayView2<f64>,
        neighbors: &NeighborIndex,
    ) -> Result<BarycenterWeights> {
        self.check_inputs(data, neighbors)?;

        let n_samples = neighbors.n_samples();
        let n_neighbors = neighbors.n_neighbors();
        debug!(
            "Solving barycenter weights for {} samples with {} neighbors (reg = {}, {:?})",
            n_samples, n_neighbors, self.reg, self.weighting
        );

        let mut weights = Array2::<f64>::zeros((n_samples, n_neighbors));
        let solve_row = |(i, mut row): (usize, ArrayViewMut1<f64>)| -> Result<()> {
            let w = self.local_weights(metric, data, neighbors.row(i), i)?;
            row.assign(&w);
            Ok(())
        };

        if self.parallel {
            weights
                .axis_iter_mut(Axis(0))
                .into_par_iter()
                .enumerate()
                .try_for_each(solve_row)?;
        } else {
            weights
                .axis_iter_mut(Axis(0))
                .enumerate()
                .try_for_each(solve_row)?;
        }

        let sums = weights.sum_axis(Axis(1)).to_vec();
        if let Err(e) = weights.normalize(&sums, 1.0, &Direction::ROW) {
            debug!("Row normalization failed: {}", e);
            let sample = sums
                .iter()
                .position(|s| *s == 0.0 || !s.is_finite())
                .unwrap_or_default();
            return Err(LleError::SingularSystem {
                sample,
                reg: self.reg,
            });
        }

        info!("Barycenter weights computed for {} samples", n_samples);
        Ok(BarycenterWeights { weights })
    }

    /// Raw (unnormalized) solution of `G w = 1` for one sample.
    pub fn solve_sample<M: Metric + ?Sized>(
        &self,
        metric: &M,
        data: ArrayView2<f64>,
        neighbors: &NeighborIndex,
        sample: usize,
    ) -> Result<Array1<f64>> {
        self.check_inputs(data, neighbors)?;
        if sample >= neighbors.n_samples() {
            return Err(LleError::ShapeMismatch(format!(
                "sample {} is out of range for {} samples",
                sample,
                neighbors.n_samples()
            )));
        }
        self.local_weights(metric, data, neighbors.row(sample), sample)
    }

    fn check_inputs(&self, data: ArrayView2<f64>, neighbors: &NeighborIndex) -> Result<()> {
        if !self.reg.is_finite() || self.reg < 0.0 {
            return Err(LleError::InvalidParameter(format!(
                "reg must be a finite non-negative number, got {}",
                self.reg
            )));
        }
        if neighbors.n_samples() != data.nrows() {
            return Err(LleError::ShapeMismatch(format!(
                "neighbor index covers {} samples but the dataset has {}",
                neighbors.n_samples(),
                data.nrows()
            )));
        }
        if neighbors.view().iter().any(|&j| j >= data.nrows()) {
            return Err(LleError::ShapeMismatch(
                "neighbor index refers to samples outside the dataset".to_string(),
            ));
        }
        Ok(())
    }

    fn local_weights<M: Metric + ?Sized>(
        &self,
        metric: &M,
        data: ArrayView2<f64>,
        neighbors: ArrayView1<usize>,
        sample: usize,
    ) -> Result<Array1<f64>> {
        let n_neighbors = neighbors.len();
        let base = data.row(sample);
        let indices = neighbors.to_vec();
        let points = data.select(Axis(0), &indices);
        let tangents = metric.log_many(base, points.view());

        let mut gram = match self.weighting {
            Weighting::Ambient => tangents.dot(&tangents.t()),
            Weighting::MetricAware => {
                let tensor = metric.metric_matrix(base);
                tangents.dot(&tensor).dot(&tangents.t())
            }
        };

        // G is rank deficient whenever n_neighbors exceeds the local dimension
        let trace = gram.diag().sum();
        let shift = if trace > 0.0 { self.reg * trace } else { self.reg };
        gram.diag_mut().mapv_inplace(|d| d + shift);

        let gram = gram.view().into_nalgebra().clone_owned();
        let singular = LleError::SingularSystem {
            sample,
            reg: self.reg,
        };
        let cholesky = Cholesky::new(gram).ok_or(singular)?;
        let w = cholesky.solve(&DVector::from_element(n_neighbors, 1.0));

        if w.iter().any(|v| !v.is_finite()) {
            return Err(LleError::SingularSystem {
                sample,
                reg: self.reg,
            });
        }
        Ok(Array1::from_iter(w.iter().copied()))
    }
}

/// Norm of the tangent-space residual `Σ_j B_ij · log_{x_i}(x_j)` for every sample.
///
/// Zero means `x_i` is reproduced exactly by its weighted neighbors.
pub fn reconstruction_errors<M: Metric + ?Sized>(
    metric: &M,
    data: ArrayView2<f64>,
    neighbors: &NeighborIndex,
    weights: &BarycenterWeights,
) -> Result<Array1<f64>> {
    if weights.n_samples() != neighbors.n_samples()
        || weights.n_neighbors() != neighbors.n_neighbors()
        || data.nrows() != neighbors.n_samples()
    {
        return Err(LleError::ShapeMismatch(format!(
            "weights {:?}, neighbors {:?} and data {:?} disagree",
            weights.view().dim(),
            neighbors.view().dim(),
            data.dim()
        )));
    }

    let errors = (0..neighbors.n_samples())
        .map(|i| {
            let indices = neighbors.row(i).to_vec();
            let tangents = metric.log_many(data.row(i), data.select(Axis(0), &indices).view());
            let residual = weights.row(i).dot(&tangents);
            residual.dot(&residual).sqrt()
        })
        .collect::<Vec<f64>>();
    Ok(Array1::from(errors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::{Euclidean, Hypersphere};
    use crate::neighbors::{NeighborGraphBuilder, SelfInclusion};
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn right_triangle() -> Array2<f64> {
        array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0]]
    }

    #[test]
    fn test_right_triangle_weights() {
        let data = right_triangle();
        let neighbors = NeighborGraphBuilder::new(2).build(data.view(), &Euclidean).unwrap();
        assert_eq!(neighbors.row(0).to_vec(), vec![1, 2]);
        assert_eq!(neighbors.row(1).to_vec(), vec![0, 2]);
        assert_eq!(neighbors.row(2).to_vec(), vec![0, 1]);

        let weights = BarycenterWeightSolver::default()
            .solve(&Euclidean, data.view(), &neighbors)
            .unwrap();

        // G = I at the right angle, so both legs weigh the same
        assert_abs_diff_eq!(weights.row(0)[0], 0.5, epsilon = 1e-12);
        assert_abs_diff_eq!(weights.row(0)[1], 0.5, epsilon = 1e-12);

        // G = [[1, 1], [1, 2]] + 3e-3 I at the acute corners
        let near = 1.003 / 1.006;
        let far = 0.003 / 1.006;
        for i in [1, 2] {
            assert_abs_diff_eq!(weights.row(i)[0], near, epsilon = 1e-12);
            assert_abs_diff_eq!(weights.row(i)[1], far, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_rows_sum_to_one() {
        let data = array![
            [0.1, 0.2, 0.3],
            [1.0, 0.1, -0.2],
            [0.4, 1.2, 0.0],
            [-0.5, 0.3, 0.9],
            [0.8, 0.8, 0.8],
            [0.0, -1.0, 0.5],
            [1.5, 0.5, 0.2]
        ];
        let neighbors = NeighborGraphBuilder::new(4).build(data.view(), &Euclidean).unwrap();
        let weights = BarycenterWeightSolver::default()
            .solve(&Euclidean, data.view(), &neighbors)
            .unwrap();

        for s in weights.row_sums().iter() {
            assert_abs_diff_eq!(*s, 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_more_neighbors_than_intrinsic_dimension() {
        // collinear samples: every local Gram matrix has rank one
        let data = Array2::from_shape_fn((8, 2), |(i, j)| if j == 0 { i as f64 } else { 2.0 * i as f64 });
        let neighbors = NeighborGraphBuilder::new(4).build(data.view(), &Euclidean).unwrap();
        let weights = BarycenterWeightSolver::default()
            .solve(&Euclidean, data.view(), &neighbors)
            .unwrap();

        for s in weights.row_sums().iter() {
            assert_abs_diff_eq!(*s, 1.0, epsilon = 1e-9);
        }
        let errors = reconstruction_errors(&Euclidean, data.view(), &neighbors, &weights).unwrap();
        // interior samples sit between their neighbors and are reproduced almost exactly
        assert!(errors[4] < 1e-2);
    }

    #[test]
    fn test_zero_regularization_on_duplicates_is_singular() {
        let data = array![[1.0, 1.0], [1.0, 1.0], [1.0, 1.0]];
        let neighbors = NeighborGraphBuilder::new(2).build(data.view(), &Euclidean).unwrap();

        let result = BarycenterWeightSolver::new(0.0).solve(&Euclidean, data.view(), &neighbors);
        assert!(matches!(result, Err(LleError::SingularSystem { reg, .. }) if reg == 0.0));

        // trace(G) = 0 falls back to adding reg itself
        let weights = BarycenterWeightSolver::default()
            .solve(&Euclidean, data.view(), &neighbors)
            .unwrap();
        assert_abs_diff_eq!(weights.row(0)[0], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_negative_reg_rejected() {
        let data = right_triangle();
        let neighbors = NeighborGraphBuilder::new(2).build(data.view(), &Euclidean).unwrap();
        assert!(matches!(
            BarycenterWeightSolver::new(-1.0).solve(&Euclidean, data.view(), &neighbors),
            Err(LleError::InvalidParameter(_))
        ));
    }

    #[test]
    fn test_shape_mismatch() {
        let data = right_triangle();
        let neighbors = NeighborIndex::from_array(array![[1, 2], [0, 2], [0, 1], [0, 1]], 4).unwrap();
        assert!(matches!(
            BarycenterWeightSolver::default().solve(&Euclidean, data.view(), &neighbors),
            Err(LleError::ShapeMismatch(_))
        ));
    }

    #[test]
    fn test_repeated_solves_are_identical() {
        let data = array![
            [0.0, 0.0, 0.1],
            [1.0, 0.2, 0.0],
            [0.3, 1.1, 0.4],
            [1.2, 1.0, -0.3],
            [0.5, 0.5, 0.9],
            [2.0, 0.1, 0.2]
        ];
        let neighbors = NeighborGraphBuilder::new(3).build(data.view(), &Euclidean).unwrap();

        let parallel = BarycenterWeightSolver::default().parallel(true);
        let first = parallel.solve(&Euclidean, data.view(), &neighbors).unwrap();
        let second = parallel.solve(&Euclidean, data.view(), &neighbors).unwrap();
        let sequential = BarycenterWeightSolver::default()
            .solve(&Euclidean, data.view(), &neighbors)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(first, sequential);
    }

    #[test]
    fn test_sequential_by_default() {
        assert!(!BarycenterWeightSolver::default().parallel);
        assert!(!BarycenterWeightSolver::new(0.1).parallel);
        assert!(BarycenterWeightSolver::default().parallel(true).parallel);
    }

    #[test]
    fn test_self_inclusion_gets_weight() {
        let data = right_triangle();
        let neighbors = NeighborGraphBuilder::new(2)
            .self_inclusion(SelfInclusion::Include)
            .build(data.view(), &Euclidean)
            .unwrap();
        let weights = BarycenterWeightSolver::default()
            .solve(&Euclidean, data.view(), &neighbors)
            .unwrap();

        // the zero tangent of the point itself makes it the best reconstruction of itself
        for i in 0..3 {
            assert_eq!(neighbors.row(i)[0], i);
            assert!(weights.row(i)[0] > 0.99);
            assert_abs_diff_eq!(weights.row_sums()[i], 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_metric_aware_matches_ambient_for_euclidean() {
        let data = array![[0.0, 0.0], [1.0, 0.1], [0.2, 1.0], [1.1, 1.2], [0.5, 0.4]];
        let neighbors = NeighborGraphBuilder::new(3).build(data.view(), &Euclidean).unwrap();

        let ambient = BarycenterWeightSolver::default()
            .solve(&Euclidean, data.view(), &neighbors)
            .unwrap();
        let aware = BarycenterWeightSolver::default()
            .weighting(Weighting::MetricAware)
            .solve(&Euclidean, data.view(), &neighbors)
            .unwrap();

        assert_abs_diff_eq!(ambient.view(), aware.view(), epsilon = 1e-12);
    }

    #[test]
    fn test_sphere_weights() {
        let angles: [f64; 6] = [0.0, 0.1, 0.2, 0.3, 0.4, 0.5];
        let mut data = Array2::<f64>::zeros((angles.len(), 3));
        for (mut row, &a) in data.rows_mut().into_iter().zip(angles.iter()) {
            row.assign(&array![a.sin(), 0.0, a.cos()]);
        }
        let neighbors = NeighborGraphBuilder::new(2).build(data.view(), &Hypersphere).unwrap();
        let weights = BarycenterWeightSolver::default()
            .solve(&Hypersphere, data.view(), &neighbors)
            .unwrap();

        // samples spaced evenly along a great circle are midpoints of their two neighbors
        assert_abs_diff_eq!(weights.row(2)[0], 0.5, epsilon = 1e-9);
        assert_abs_diff_eq!(weights.row(2)[1], 0.5, epsilon = 1e-9);
        let errors = reconstruction_errors(&Hypersphere, data.view(), &neighbors, &weights).unwrap();
        assert!(errors[2] < 1e-9);
    }
}
