//! Synthetic samples from low-dimensional manifolds, for tests and benchmarks.
//!
//! Generators take the random source explicitly so a seeded `ChaCha8Rng` reproduces a dataset.

use std::f64::consts::PI;

use ndarray::{Array1, Array2};
use rand::Rng;

/// Samples `n_samples` points from a swiss roll in R³.
///
/// Returns the points and the position `t` of each point along the roll. With `noise > 0` every
/// coordinate is jittered uniformly in `[-noise, noise)`.
pub fn swiss_roll(n_samples: usize, noise: f64, rng: &mut impl Rng) -> (Array2<f64>, Array1<f64>) {
    let mut points = Array2::zeros((n_samples, 3));
    let mut t = Array1::zeros(n_samples);
    for i in 0..n_samples {
        let ti = 1.5 * PI * (1.0 + 2.0 * rng.random::<f64>());
        let height = 21.0 * rng.random::<f64>();
        points[[i, 0]] = ti * ti.cos();
        points[[i, 1]] = height;
        points[[i, 2]] = ti * ti.sin();
        t[i] = ti;
    }
    jitter(&mut points, noise, rng);
    (points, t)
}

/// Samples `n_samples` points from an S-shaped surface in R³.
pub fn s_curve(n_samples: usize, noise: f64, rng: &mut impl Rng) -> (Array2<f64>, Array1<f64>) {
    let mut points = Array2::zeros((n_samples, 3));
    let mut t = Array1::zeros(n_samples);
    for i in 0..n_samples {
        let ti = 3.0 * PI * (rng.random::<f64>() - 0.5);
        points[[i, 0]] = ti.sin();
        points[[i, 1]] = 2.0 * rng.random::<f64>();
        points[[i, 2]] = ti.signum() * (ti.cos() - 1.0);
        t[i] = ti;
    }
    jitter(&mut points, noise, rng);
    (points, t)
}

/// Samples points uniformly (by area) from the spherical cap of the unit sphere in R³ within
/// `max_angle` radians of the north pole.
///
/// Noisy points are projected back onto the sphere, so the result is always valid input for
/// [`Hypersphere`](crate::metric::Hypersphere).
pub fn sphere_patch(n_samples: usize, max_angle: f64, noise: f64, rng: &mut impl Rng) -> Array2<f64> {
    let max_angle = max_angle.clamp(0.0, PI);
    let height = 1.0 - max_angle.cos();
    let mut points = Array2::zeros((n_samples, 3));
    for i in 0..n_samples {
        let polar = (1.0 - height * rng.random::<f64>()).acos();
        let azimuth = 2.0 * PI * rng.random::<f64>();
        points[[i, 0]] = polar.sin() * azimuth.cos();
        points[[i, 1]] = polar.sin() * azimuth.sin();
        points[[i, 2]] = polar.cos();
    }

    if noise > 0.0 {
        jitter(&mut points, noise, rng);
        for mut row in points.rows_mut() {
            let norm = row.dot(&row).sqrt();
            if norm > 0.0 {
                row /= norm;
            }
        }
    }
    points
}

fn jitter(points: &mut Array2<f64>, noise: f64, rng: &mut impl Rng) {
    if noise > 0.0 {
        points.mapv_inplace(|v| v + rng.random_range(-noise..noise));
    }
}
