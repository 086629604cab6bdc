//! # Neighbor graph construction
//!
//! Brute force k-nearest-neighbor search under an arbitrary [`Metric`]. Every point is ranked
//! against every candidate, so the cost is `O(n² · cost(dist))`; the per-query loop runs on the
//! rayon pool when `parallel` is enabled.

use std::collections::HashSet;

use log::debug;
use ndarray::{Array2, ArrayView1, ArrayView2, ArrayViewMut1, Axis};
use rayon::prelude::*;

use crate::error::{LleError, Result};
use crate::metric::Metric;

/// Whether a point may appear in its own neighbor list.
///
/// LLE proper excludes the query point; `Include` reproduces a search whose query set equals its
/// reference set, where every point finds itself at distance zero first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SelfInclusion {
    #[default]
    Exclude,
    Include,
}

/// `n_samples × n_neighbors` matrix of indices into the dataset, nearest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NeighborIndex {
    indices: Array2<usize>,
}

impl NeighborIndex {
    /// Wraps a precomputed index matrix, checking that every entry addresses one of
    /// `n_samples` points and that no row repeats an index.
    pub fn from_array(indices: Array2<usize>, n_samples: usize) -> Result<Self> {
        if indices.nrows() != n_samples {
            return Err(LleError::ShapeMismatch(format!(
                "neighbor index has {} rows but the dataset has {} samples",
                indices.nrows(),
                n_samples
            )));
        }
        for (i, row) in indices.rows().into_iter().enumerate() {
            let mut seen = HashSet::with_capacity(row.len());
            for &j in row.iter() {
                if j >= n_samples {
                    return Err(LleError::ShapeMismatch(format!(
                        "neighbor {} of sample {} is out of range for {} samples",
                        j, i, n_samples
                    )));
                }
                if !seen.insert(j) {
                    return Err(LleError::ShapeMismatch(format!(
                        "sample {} lists neighbor {} more than once",
                        i, j
                    )));
                }
            }
        }
        Ok(Self { indices })
    }

    pub fn n_samples(&self) -> usize {
        self.indices.nrows()
    }

    pub fn n_neighbors(&self) -> usize {
        self.indices.ncols()
    }

    pub fn row(&self, sample: usize) -> ArrayView1<usize> {
        self.indices.row(sample)
    }

    pub fn view(&self) -> ArrayView2<usize> {
        self.indices.view()
    }

    pub fn into_inner(self) -> Array2<usize> {
        self.indices
    }
}

/// Finds the `n_neighbors` closest points of every sample.
#[derive(Debug, Clone)]
pub struct NeighborGraphBuilder {
    n_neighbors: usize,
    self_inclusion: SelfInclusion,
    parallel: bool,
}

impl NeighborGraphBuilder {
    pub fn new(n_neighbors: usize) -> Self {
        Self {
            n_neighbors,
            self_inclusion: SelfInclusion::default(),
            parallel: false,
        }
    }

    pub fn self_inclusion(mut self, self_inclusion: SelfInclusion) -> Self {
        self.self_inclusion = self_inclusion;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Builds the neighbor index of `data` (one point per row).
    ///
    /// Ties in distance are broken by the smaller sample index, so the result is deterministic.
    ///
    /// # Errors
    /// - `InvalidParameter` if `n_neighbors` is zero or not smaller than the number of samples
    pub fn build<M: Metric + ?Sized>(&self, data: ArrayView2<f64>, metric: &M) -> Result<NeighborIndex> {
        let n_samples = data.nrows();
        let k = self.n_neighbors;

        if k == 0 {
            return Err(LleError::InvalidParameter(
                "n_neighbors must be at least 1".to_string(),
            ));
        }
        if k >= n_samples {
            return Err(LleError::InvalidParameter(format!(
                "n_neighbors ({}) must be smaller than the number of samples ({})",
                k, n_samples
            )));
        }

        debug!(
            "Searching {} nearest neighbors for {} samples ({:?}, parallel = {})",
            k, n_samples, self.self_inclusion, self.parallel
        );

        let mut indices = Array2::<usize>::zeros((n_samples, k));
        let fill_row = |(i, mut row): (usize, ArrayViewMut1<usize>)| {
            let nearest = rank_neighbors(data, metric, i, k, self.self_inclusion);
            for (slot, j) in row.iter_mut().zip(nearest) {
                *slot = j;
            }
        };

        if self.parallel {
            indices
                .axis_iter_mut(Axis(0))
                .into_par_iter()
                .enumerate()
                .for_each(fill_row);
        } else {
            indices
                .axis_iter_mut(Axis(0))
                .enumerate()
                .for_each(fill_row);
        }

        Ok(NeighborIndex { indices })
    }
}

fn rank_neighbors<M: Metric + ?Sized>(
    data: ArrayView2<f64>,
    metric: &M,
    query: usize,
    k: usize,
    self_inclusion: SelfInclusion,
) -> Vec<usize> {
    let point = data.row(query);
    let mut candidates: Vec<(f64, usize)> = data
        .rows()
        .into_iter()
        .enumerate()
        .filter(|(j, _)| self_inclusion == SelfInclusion::Include || *j != query)
        .map(|(j, other)| (metric.dist(point, other), j))
        .collect();

    let by_distance =
        |a: &(f64, usize), b: &(f64, usize)| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1));

    if candidates.len() > k {
        candidates.select_nth_unstable_by(k - 1, by_distance);
        candidates.truncate(k);
    }
    candidates.sort_unstable_by(by_distance);
    candidates.into_iter().map(|(_, j)| j).collect()
}
