use anyhow::bail;
use ndarray::Array2;
use num_traits::Float;

use crate::utils::Direction;

pub trait Normalize<T: Float> {
    /// Rescales every row (or column) so that it sums to `target`, given its current `sums`.
    fn normalize(&mut self, sums: &[T], target: T, direction: &Direction) -> anyhow::Result<()>;
}

impl<T: Float> Normalize<T> for Array2<T> {
    fn normalize(&mut self, sums: &[T], target: T, direction: &Direction) -> anyhow::Result<()> {
        match direction {
            Direction::ROW => {
                if sums.len() != self.nrows() {
                    bail!(
                        "Length of sums ({}) does not match number of rows ({})",
                        sums.len(),
                        self.nrows()
                    );
                }

                for (i, mut row) in self.rows_mut().into_iter().enumerate() {
                    if sums[i] == T::zero() || !sums[i].is_finite() {
                        bail!("Row {} has a zero or non-finite sum and cannot be normalized", i);
                    }
                    let scale = target / sums[i];
                    row.mapv_inplace(|v| v * scale);
                }
            }
            Direction::COLUMN => {
                if sums.len() != self.ncols() {
                    bail!(
                        "Length of sums ({}) does not match number of columns ({})",
                        sums.len(),
                        self.ncols()
                    );
                }

                for (j, mut col) in self.columns_mut().into_iter().enumerate() {
                    if sums[j] == T::zero() || !sums[j].is_finite() {
                        bail!("Column {} has a zero or non-finite sum and cannot be normalized", j);
                    }
                    let scale = target / sums[j];
                    col.mapv_inplace(|v| v * scale);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array2};

    #[test]
    fn test_normalize() {
        let mut arr = array![[1.0, 2.0], [3.0, 4.0]];
        let row_sums = vec![3.0, 7.0];
        let target = 1.0;

        arr.normalize(&row_sums, target, &Direction::ROW).unwrap();

        assert_relative_eq!(arr.row(0).sum(), target);
        assert_relative_eq!(arr.row(1).sum(), target);
        assert_relative_eq!(arr[[0, 0]], 1.0 / 3.0);
        assert_relative_eq!(arr[[0, 1]], 2.0 / 3.0);
        assert_relative_eq!(arr[[1, 0]], 3.0 / 7.0);
        assert_relative_eq!(arr[[1, 1]], 4.0 / 7.0);

        let mut arr = array![[1.0, 2.0], [3.0, 4.0]];
        let col_sums = vec![4.0, 6.0];

        arr.normalize(&col_sums, target, &Direction::COLUMN).unwrap();

        assert_relative_eq!(arr.column(0).sum(), target);
        assert_relative_eq!(arr.column(1).sum(), target);
        assert_relative_eq!(arr[[0, 0]], 1.0 / 4.0);
        assert_relative_eq!(arr[[1, 0]], 3.0 / 4.0);
        assert_relative_eq!(arr[[0, 1]], 2.0 / 6.0);
        assert_relative_eq!(arr[[1, 1]], 4.0 / 6.0);
    }

    #[test]
    fn test_normalize_negative_entries() {
        // barycentric weights may be negative, only the sum matters
        let mut arr = array![[1.5, -0.5]];
        arr.normalize(&[1.0], 1.0, &Direction::ROW).unwrap();
        assert_relative_eq!(arr[[0, 0]], 1.5);
        assert_relative_eq!(arr[[0, 1]], -0.5);
    }

    #[test]
    fn test_normalize_errors() {
        let mut arr = Array2::<f64>::ones((2, 2));

        assert!(arr.normalize(&[1.0], 1.0, &Direction::ROW).is_err());
        assert!(arr.normalize(&[1.0], 1.0, &Direction::COLUMN).is_err());
        assert!(arr.normalize(&[0.0, 1.0], 1.0, &Direction::ROW).is_err());
    }
}
