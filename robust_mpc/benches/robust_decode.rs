use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ff::Field;
use rand::{rngs::SmallRng, SeedableRng};
use robust_mpc::{fields::Bls12Scalar, polynomial::EvalPoints, reed_solomon::RobustDecoder};

type Fp = Bls12Scalar;

/// Codeword of random degree-t polynomial over n = 3t+1 points with t corrupted symbols.
fn corrupted_codeword(t: usize, rng: &mut SmallRng) -> (RobustDecoder<Fp>, Vec<Option<Fp>>) {
    let n = 3 * t + 1;
    let points = EvalPoints::<Fp>::sequential(n);
    let decoder = RobustDecoder::new(points.as_slice(), t + 1);

    let message: Vec<_> = (0..=t).map(|_| Fp::random(&mut *rng)).collect();
    let mut codeword: Vec<_> = decoder.encode(&message).into_iter().map(Some).collect();
    for symbol in codeword.iter_mut().step_by(3).take(t) {
        *symbol = symbol.map(|x| x + Fp::one());
    }
    (decoder, codeword)
}

pub fn bench_robust_decode(c: &mut Criterion) {
    let mut rng = SmallRng::seed_from_u64(0);
    let mut group = c.benchmark_group("gao decode, t errors");
    for t in [1, 3, 5, 10, 25] {
        let (decoder, codeword) = corrupted_codeword(t, &mut rng);
        group.bench_with_input(BenchmarkId::from_parameter(t), &codeword, |b, codeword| {
            b.iter(|| decoder.decode(black_box(codeword)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_robust_decode);
criterion_main!(benches);
