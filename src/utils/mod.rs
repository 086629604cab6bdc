use ndarray::ArrayView2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    ROW,
    COLUMN,
}

/// Largest absolute entry of a slice, `0.0` when empty.
pub(crate) fn max_abs(values: &[f64]) -> f64 {
    values.iter().fold(0.0f64, |acc, v| acc.max(v.abs()))
}

pub(crate) fn all_finite(data: ArrayView2<f64>) -> bool {
    data.iter().all(|v| v.is_finite())
}
