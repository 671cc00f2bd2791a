use criterion::{criterion_group, criterion_main, Criterion};
use linfa::prelude::{Dataset, Fit};
use ndarray::{Array1, Array2};
use ndarray_rand::rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use seqgp_gp::{mean_models::ZeroMean, GpRegressor, Objective};
use seqgp_kernels::IdentityKernel;

const ALPHABET: &[u8] = b"ACDEFGHIKLMNPQRSTVWY";

/// Random sequences and an additive fitness per position and residue
fn dataset(n: usize, len: usize) -> (Array2<u8>, Array1<f64>) {
    let mut rng = Xoshiro256Plus::seed_from_u64(42);
    let seqs = Array2::from_shape_fn((n, len), |_| ALPHABET[rng.gen_range(0..ALPHABET.len())]);
    let fitness = seqs
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(i, &r)| ((i + 1) as f64 * r as f64).sin())
                .sum::<f64>()
        })
        .collect();
    (seqs, fitness)
}

fn criterion_gp(c: &mut Criterion) {
    let sizes = [(50, 20), (100, 50), (200, 50)];

    let mut group = c.benchmark_group("gp");
    group.sample_size(10);
    for (n, len) in sizes {
        let (xt, yt) = dataset(n, len);
        for objective in [Objective::MarginalLikelihood, Objective::LeaveOneOut] {
            group.bench_function(format!("gp {objective} {n}x{len}"), |b| {
                b.iter(|| {
                    std::hint::black_box(
                        GpRegressor::params(ZeroMean(), IdentityKernel::new())
                            .objective(objective)
                            .fit(&Dataset::new(xt.clone(), yt.clone()))
                            .expect("GP fit error"),
                    )
                })
            });
        }
    }
    group.finish();
}

criterion_group!(benches, criterion_gp);
criterion_main!(benches);
