use criterion::measurement::Measurement;
use criterion::{criterion_group, criterion_main, BenchmarkGroup, BenchmarkId, Criterion};
use ndarray::Array2;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use single_lle::datasets::swiss_roll;
use single_lle::embedding::{EigenMethod, NullSpaceEmbedder};
use single_lle::metric::Euclidean;
use single_lle::neighbors::NeighborGraphBuilder;
use single_lle::sparse::assemble;
use single_lle::weights::BarycenterWeightSolver;
use std::time::Duration;

#[derive(Clone)]
pub struct LleBenchConfig {
    seed: u64,
    sample_sizes: Vec<usize>,
    n_neighbors: Vec<usize>,
    measurement_time: u64,
    sample_size: usize,
}

impl Default for LleBenchConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            sample_sizes: vec![200, 500, 1000],
            n_neighbors: vec![10, 20],
            measurement_time: 10,
            sample_size: 10,
        }
    }
}

fn create_dataset(n_samples: usize, seed: u64) -> Array2<f64> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    swiss_roll(n_samples, 0.05, &mut rng).0
}

fn configure_group<'a, M: Measurement>(
    c: &'a mut Criterion<M>,
    name: &str,
    config: &LleBenchConfig,
) -> BenchmarkGroup<'a, M> {
    let mut group = c.benchmark_group(name);
    group.measurement_time(Duration::from_secs(config.measurement_time));
    group.sample_size(config.sample_size);
    group
}

pub fn bench_local_stages(c: &mut Criterion) {
    let config = LleBenchConfig::default();
    let mut group = configure_group(c, "LLE_Local_Stages", &config);

    for &n_samples in config.sample_sizes.iter() {
        let data = create_dataset(n_samples, config.seed + n_samples as u64);
        for &k in config.n_neighbors.iter() {
            let label = format!("n{}_k{}", n_samples, k);
            let neighbors = NeighborGraphBuilder::new(k).build(data.view(), &Euclidean).unwrap();

            group.bench_with_input(BenchmarkId::new("neighbors", &label), &k, |b, &k| {
                b.iter(|| NeighborGraphBuilder::new(k).build(data.view(), &Euclidean).unwrap());
            });

            group.bench_with_input(BenchmarkId::new("weights", &label), &k, |b, _| {
                b.iter(|| {
                    BarycenterWeightSolver::default()
                        .solve(&Euclidean, data.view(), &neighbors)
                        .unwrap()
                });
            });

            let weights = BarycenterWeightSolver::default()
                .solve(&Euclidean, data.view(), &neighbors)
                .unwrap();
            group.bench_with_input(BenchmarkId::new("assemble", &label), &k, |b, _| {
                b.iter(|| assemble(&weights, &neighbors).unwrap());
            });
        }
    }
    group.finish();
}

pub fn bench_null_space(c: &mut Criterion) {
    let config = LleBenchConfig::default();
    let mut group = configure_group(c, "LLE_Null_Space", &config);

    for &n_samples in config.sample_sizes.iter() {
        let data = create_dataset(n_samples, config.seed + n_samples as u64);
        let neighbors = NeighborGraphBuilder::new(10).build(data.view(), &Euclidean).unwrap();
        let weights = BarycenterWeightSolver::default()
            .solve(&Euclidean, data.view(), &neighbors)
            .unwrap();
        let (_, cost) = assemble(&weights, &neighbors).unwrap();

        for (name, method) in [("shift_invert", EigenMethod::ShiftInvert), ("dense", EigenMethod::Dense)] {
            group.bench_with_input(BenchmarkId::new(name, n_samples), &method, |b, &method| {
                b.iter(|| NullSpaceEmbedder::new(2).method(method).embed(&cost).unwrap());
            });
        }
    }
    group.finish();
}

criterion_group!(lle_benches, bench_local_stages, bench_null_space);
criterion_main!(lle_benches);
