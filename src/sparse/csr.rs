use std::ops::AddAssign;

use anyhow::anyhow;
use nalgebra_sparse::CsrMatrix;
use num_traits::{Float, NumCast, PrimInt, Unsigned, Zero};

use super::{MatrixNonZero, MatrixSum};

impl<M> MatrixNonZero for CsrMatrix<M> {
    fn nonzero_col<T>(&self) -> anyhow::Result<Vec<T>>
    where
        T: PrimInt + Unsigned + Zero + AddAssign,
    {
        let mut result = vec![T::zero(); self.ncols()];
        for &col_index in self.col_indices() {
            result[col_index] += T::one();
        }
        Ok(result)
    }

    fn nonzero_row<T>(&self) -> anyhow::Result<Vec<T>>
    where
        T: PrimInt + Unsigned + Zero + AddAssign,
    {
        self.row_offsets()
            .windows(2)
            .map(|window| {
                let diff = window[1]
                    .checked_sub(window[0])
                    .ok_or_else(|| anyhow!("Subtraction overflow"))?;
                T::from(diff).ok_or_else(|| anyhow!("Failed to convert to target type"))
            })
            .collect()
    }
}

impl<M: NumCast + Copy> MatrixSum for CsrMatrix<M> {
    type Item = M;

    fn sum_col<T>(&self) -> anyhow::Result<Vec<T>>
    where
        T: Float + NumCast + AddAssign + std::iter::Sum,
    {
        let mut result = vec![T::zero(); self.ncols()];
        for (&col_index, &value) in self.col_indices().iter().zip(self.values().iter()) {
            result[col_index] +=
                T::from(value).ok_or_else(|| anyhow!("Failed to convert to target type"))?;
        }
        Ok(result)
    }

    fn sum_row<T>(&self) -> anyhow::Result<Vec<T>>
    where
        T: Float + NumCast + AddAssign + std::iter::Sum,
    {
        let mut result = vec![T::zero(); self.nrows()];
        for (row, row_vec) in self.row_iter().enumerate() {
            for &value in row_vec.values() {
                result[row] +=
                    T::from(value).ok_or_else(|| anyhow!("Failed to convert to target type"))?;
            }
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use nalgebra_sparse::CooMatrix;

    fn create_test_matrix() -> CsrMatrix<f64> {
        // [1 0 2]
        // [0 0 0]
        // [3 4 0]
        // [0 5 6]
        let mut coo = CooMatrix::new(4, 3);
        coo.push(0, 0, 1.0);
        coo.push(2, 0, 3.0);
        coo.push(2, 1, 4.0);
        coo.push(3, 1, 5.0);
        coo.push(0, 2, 2.0);
        coo.push(3, 2, 6.0);

        CsrMatrix::from(&coo)
    }

    #[test]
    fn test_nonzero_counts() {
        let matrix = create_test_matrix();
        let cols: Vec<u32> = matrix.nonzero_col().unwrap();
        let rows: Vec<u32> = matrix.nonzero_row().unwrap();

        assert_eq!(cols, vec![2, 2, 2]);
        assert_eq!(rows, vec![2, 0, 2, 2]);
    }

    #[test]
    fn test_sums() {
        let matrix = create_test_matrix();
        let cols: Vec<f64> = matrix.sum_col().unwrap();
        let rows: Vec<f64> = matrix.sum_row().unwrap();

        assert_eq!(cols, vec![4.0, 9.0, 8.0]);
        assert_eq!(rows, vec![3.0, 0.0, 7.0, 11.0]);
    }

    #[test]
    fn test_sums_with_negative_values() {
        let coo = CooMatrix::try_from_triplets(
            2,
            3,
            vec![0, 0, 0, 1],
            vec![0, 1, 2, 2],
            vec![1.5, -0.75, 0.25, -2.0],
        )
        .unwrap();
        let matrix = CsrMatrix::from(&coo);

        let rows: Vec<f64> = matrix.sum_row().unwrap();
        assert_abs_diff_eq!(rows[0], 1.0, epsilon = 1e-15);
        assert_abs_diff_eq!(rows[1], -2.0, epsilon = 1e-15);
    }

    #[test]
    fn test_zero_matrix() {
        let matrix: CsrMatrix<f64> = CsrMatrix::zeros(5, 4);

        let col_result: Vec<u32> = matrix.nonzero_col().unwrap();
        let row_result: Vec<u64> = matrix.nonzero_row().unwrap();
        let row_sums: Vec<f64> = matrix.sum_row().unwrap();

        assert_eq!(col_result, vec![0, 0, 0, 0]);
        assert_eq!(row_result, vec![0, 0, 0, 0, 0]);
        assert_eq!(row_sums, vec![0.0; 5]);
    }
}
