use log::debug;
use nalgebra_sparse::convert::serial::convert_csr_dense;
use nalgebra_sparse::{CooMatrix, CsrMatrix};
use ndarray::{Array1, Array2, ArrayView2, Axis};
use nshare::IntoNdarray2;

use super::{MatrixNonZero, MatrixSum};
use crate::error::{LleError, Result};
use crate::neighbors::NeighborIndex;
use crate::weights::BarycenterWeights;

/// Sparse `n_samples × n_samples` reconstruction matrix.
///
/// Row `i` stores the barycenter weights of sample `i` at the columns of its neighbors.
#[derive(Debug, Clone)]
pub struct WeightMatrix {
    csr: CsrMatrix<f64>,
}

impl WeightMatrix {
    pub fn n_samples(&self) -> usize {
        self.csr.nrows()
    }

    pub fn as_csr(&self) -> &CsrMatrix<f64> {
        &self.csr
    }

    /// Stored column indices of row `i`, in ascending order.
    pub fn row_columns(&self, row: usize) -> Vec<usize> {
        self.csr.row(row).col_indices().to_vec()
    }

    pub fn row_sums(&self) -> anyhow::Result<Vec<f64>> {
        self.csr.sum_row()
    }

    pub fn nonzero_per_row(&self) -> anyhow::Result<Vec<usize>> {
        self.csr.nonzero_row()
    }

    /// Number of samples that use each sample as a neighbor.
    pub fn in_degree(&self) -> anyhow::Result<Vec<usize>> {
        self.csr.nonzero_col()
    }

    /// Total weight each sample contributes to the reconstruction of others.
    pub fn column_sums(&self) -> anyhow::Result<Vec<f64>> {
        self.csr.sum_col()
    }

    pub fn to_dense(&self) -> Array2<f64> {
        convert_csr_dense(&self.csr).into_ndarray2().into_owned()
    }

    pub fn into_inner(self) -> CsrMatrix<f64> {
        self.csr
    }
}

/// Dense symmetric positive semi-definite cost matrix `M = (I - W)ᵀ(I - W)`.
#[derive(Debug, Clone, PartialEq)]
pub struct CostMatrix {
    matrix: Array2<f64>,
}

impl CostMatrix {
    /// Wraps a precomputed square matrix. Symmetry is not enforced here.
    pub fn from_array(matrix: Array2<f64>) -> Result<Self> {
        if matrix.nrows() != matrix.ncols() {
            return Err(LleError::ShapeMismatch(format!(
                "cost matrix must be square, got {:?}",
                matrix.dim()
            )));
        }
        Ok(Self { matrix })
    }

    pub fn n_samples(&self) -> usize {
        self.matrix.nrows()
    }

    pub fn view(&self) -> ArrayView2<f64> {
        self.matrix.view()
    }

    /// Largest absolute difference between `M` and `Mᵀ`.
    pub fn symmetry_error(&self) -> f64 {
        self.matrix
            .iter()
            .zip(self.matrix.t().iter())
            .fold(0.0f64, |acc, (a, b)| acc.max((a - b).abs()))
    }

    /// `trace(Yᵀ M Y)` for an `n_samples × n_components` embedding.
    pub fn quadratic_form(&self, embedding: ArrayView2<f64>) -> Result<f64> {
        if embedding.nrows() != self.n_samples() {
            return Err(LleError::ShapeMismatch(format!(
                "embedding has {} rows but the cost matrix covers {} samples",
                embedding.nrows(),
                self.n_samples()
            )));
        }
        let my = self.matrix.dot(&embedding);
        Ok((&embedding * &my).sum())
    }

    /// `M 1`, which vanishes whenever every row of `W` sums to one.
    pub fn row_sums(&self) -> Array1<f64> {
        self.matrix.sum_axis(Axis(1))
    }

    pub fn into_inner(self) -> Array2<f64> {
        self.matrix
    }
}

/// Packs the barycenter weights into a CSR matrix, row `i` nonzero exactly at `neighbors[i]`.
pub fn weight_matrix(weights: &BarycenterWeights, neighbors: &NeighborIndex) -> Result<WeightMatrix> {
    let n_samples = neighbors.n_samples();
    let n_neighbors = neighbors.n_neighbors();
    if weights.n_samples() != n_samples || weights.n_neighbors() != n_neighbors {
        return Err(LleError::ShapeMismatch(format!(
            "weights are {}x{} but the neighbor index is {}x{}",
            weights.n_samples(),
            weights.n_neighbors(),
            n_samples,
            n_neighbors
        )));
    }

    let capacity = n_samples * n_neighbors;
    let mut rows = Vec::with_capacity(capacity);
    let mut cols = Vec::with_capacity(capacity);
    let mut values = Vec::with_capacity(capacity);
    for i in 0..n_samples {
        for (&j, &w) in neighbors.row(i).iter().zip(weights.row(i).iter()) {
            rows.push(i);
            cols.push(j);
            values.push(w);
        }
    }

    let coo = CooMatrix::try_from_triplets(n_samples, n_samples, rows, cols, values)
        .map_err(|e| LleError::Sparse(format!("Failed to create COO matrix: {}", e)))?;
    let csr = CsrMatrix::from(&coo);
    debug!(
        "Assembled weight matrix {}x{} with {} stored entries",
        n_samples,
        n_samples,
        csr.nnz()
    );

    Ok(WeightMatrix { csr })
}

/// Computes `M = (I - W)ᵀ(I - W)` as a dense, exactly symmetric matrix.
pub fn cost_matrix(weights: &WeightMatrix) -> Result<CostMatrix> {
    let n_samples = weights.n_samples();
    let identity = CsrMatrix::<f64>::identity(n_samples);
    let residual = &identity - weights.as_csr();
    let product = &residual.transpose() * &residual;

    let mut matrix = convert_csr_dense(&product).into_ndarray2().into_owned();
    // summation order differs between (i, j) and (j, i)
    let transposed = matrix.t().to_owned();
    matrix += &transposed;
    matrix.mapv_inplace(|v| 0.5 * v);

    debug!("Cost matrix assembled from {} nonzeros", product.nnz());
    Ok(CostMatrix { matrix })
}

/// Builds both the sparse weight matrix and the dense cost matrix.
pub fn assemble(
    weights: &BarycenterWeights,
    neighbors: &NeighborIndex,
) -> Result<(WeightMatrix, CostMatrix)> {
    let w = weight_matrix(weights, neighbors)?;
    let m = cost_matrix(&w)?;
    Ok((w, m))
}
