//! # Sparse weight matrices
//!
//! Assembly of the global reconstruction matrix `W` from per-sample barycenter weights, the
//! derived cost matrix `M = (I - W)ᵀ(I - W)`, and row/column reductions over CSR matrices used to
//! check the structural invariants of `W`.

use std::ops::AddAssign;

use num_traits::{Float, NumCast, PrimInt, Unsigned, Zero};

pub mod csr;
mod weight_matrix;

pub use weight_matrix::{assemble, cost_matrix, weight_matrix, CostMatrix, WeightMatrix};

pub trait MatrixNonZero {
    fn nonzero_col<T>(&self) -> anyhow::Result<Vec<T>>
    where
        T: PrimInt + Unsigned + Zero + AddAssign;

    fn nonzero_row<T>(&self) -> anyhow::Result<Vec<T>>
    where
        T: PrimInt + Unsigned + Zero + AddAssign;
}

pub trait MatrixSum {
    type Item: NumCast;

    fn sum_col<T>(&self) -> anyhow::Result<Vec<T>>
    where
        T: Float + NumCast + AddAssign + std::iter::Sum;

    fn sum_row<T>(&self) -> anyhow::Result<Vec<T>>
    where
        T: Float + NumCast + AddAssign + std::iter::Sum;
}
