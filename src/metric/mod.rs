//! # Metrics
//!
//! The embedding pipeline never looks at the concrete geometry of the data. It only needs a
//! capability that can measure distances, map neighbors into the tangent space of a base point,
//! and evaluate the local metric tensor. [`Metric`] is that capability.
//!
//! Two implementations ship with the crate:
//! - [`Euclidean`]: flat space, `log_b(p) = p - b`
//! - [`Hypersphere`]: the unit sphere embedded in its ambient space

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};

mod euclidean;
mod hypersphere;

pub use euclidean::Euclidean;
pub use hypersphere::Hypersphere;

/// A (pseudo-)Riemannian metric consumed by the embedding pipeline.
///
/// Implementations are shared read-only across worker threads, hence the `Send + Sync` bound.
pub trait Metric: Send + Sync {
    /// Geodesic distance between `a` and `b`.
    fn dist(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64;

    /// Logarithmic map: the tangent vector at `base` pointing towards `point`.
    fn log(&self, base: ArrayView1<f64>, point: ArrayView1<f64>) -> Array1<f64>;

    /// Logarithmic map of every row of `points`, one tangent vector per row.
    fn log_many(&self, base: ArrayView1<f64>, points: ArrayView2<f64>) -> Array2<f64> {
        let mut tangents = Array2::zeros(points.raw_dim());
        for (mut row, point) in tangents.rows_mut().into_iter().zip(points.rows()) {
            row.assign(&self.log(base, point));
        }
        tangents
    }

    /// Metric tensor at `base`, expressed in ambient coordinates.
    fn metric_matrix(&self, base: ArrayView1<f64>) -> Array2<f64>;
}

impl<M: Metric + ?Sized> Metric for &M {
    fn dist(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        (**self).dist(a, b)
    }

    fn log(&self, base: ArrayView1<f64>, point: ArrayView1<f64>) -> Array1<f64> {
        (**self).log(base, point)
    }

    fn log_many(&self, base: ArrayView1<f64>, points: ArrayView2<f64>) -> Array2<f64> {
        (**self).log_many(base, points)
    }

    fn metric_matrix(&self, base: ArrayView1<f64>) -> Array2<f64> {
        (**self).metric_matrix(base)
    }
}
