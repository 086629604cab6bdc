use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

use super::Metric;

/// Flat Euclidean metric on ℝ^d.
#[derive(Debug, Clone, Copy, Default)]
pub struct Euclidean;

impl Metric for Euclidean {
    fn dist(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(&x, &y)| (x - y) * (x - y))
            .sum::<f64>()
            .sqrt()
    }

    fn log(&self, base: ArrayView1<f64>, point: ArrayView1<f64>) -> Array1<f64> {
        &point - &base
    }

    fn log_many(&self, base: ArrayView1<f64>, points: ArrayView2<f64>) -> Array2<f64> {
        &points - &base
    }

    fn metric_matrix(&self, base: ArrayView1<f64>) -> Array2<f64> {
        Array2::eye(base.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_distance() {
        let a = array![0.0, 0.0];
        let b = array![3.0, 4.0];
        assert_abs_diff_eq!(Euclidean.dist(a.view(), b.view()), 5.0, epsilon = 1e-12);
        assert_abs_diff_eq!(Euclidean.dist(a.view(), a.view()), 0.0);
    }

    #[test]
    fn test_log_many_matches_log() {
        let base = array![1.0, -1.0, 0.5];
        let points = array![[2.0, 0.0, 0.5], [1.0, -1.0, 0.5], [-1.0, 3.0, 2.0]];

        let tangents = Euclidean.log_many(base.view(), points.view());
        for (row, point) in tangents.rows().into_iter().zip(points.rows()) {
            let single = Euclidean.log(base.view(), point);
            assert_eq!(row.to_owned(), single);
        }
        assert_eq!(tangents.row(1).to_vec(), vec![0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_metric_matrix_is_identity() {
        let base = array![4.0, 5.0, 6.0];
        assert_eq!(Euclidean.metric_matrix(base.view()), Array2::<f64>::eye(3));
    }
}
