use ndarray::{Array1, Array2, ArrayView1, Axis};

use super::Metric;

/// Below this angle the log map falls back to the (first order exact) chordal difference.
const SMALL_ANGLE: f64 = 1e-9;

/// Round metric of the unit sphere S^{d-1}, with points given in ambient ℝ^d coordinates.
///
/// Points are expected to have unit norm. Antipodal pairs have no unique geodesic, and
/// their log map is reported as the zero vector.
#[derive(Debug, Clone, Copy, Default)]
pub struct Hypersphere;

impl Hypersphere {
    fn cos_angle(a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        a.dot(&b).clamp(-1.0, 1.0)
    }
}

impl Metric for Hypersphere {
    fn dist(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        Self::cos_angle(a, b).acos()
    }

    fn log(&self, base: ArrayView1<f64>, point: ArrayView1<f64>) -> Array1<f64> {
        let cos_theta = Self::cos_angle(base, point);
        let theta = cos_theta.acos();
        let direction = &point - &(&base * cos_theta);

        if theta < SMALL_ANGLE {
            return direction;
        }
        let sin_theta = theta.sin();
        if sin_theta < SMALL_ANGLE {
            return Array1::zeros(base.len());
        }
        direction * (theta / sin_theta)
    }

    /// Projector onto the tangent space at `base`, `I - b bᵀ`.
    fn metric_matrix(&self, base: ArrayView1<f64>) -> Array2<f64> {
        let d = base.len();
        let column = base.insert_axis(Axis(1));
        let row = base.insert_axis(Axis(0));
        Array2::eye(d) - column.dot(&row)
    }
}
