use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::{
    polynomial::{EvalPoints, Polynomial},
    share::Share,
    MpcContext, MpcField,
};

use super::{DealerError, MpcDealer};

/// Insecure dealer that can be used for tests.
/// Dealers of all parties created with the same seed sample the same sharing polynomials,
/// each party takes its own evaluation.
pub struct FakeDealer<F> {
    points: EvalPoints<F>,
    party_id: usize,
    threshold: usize,
    beaver_triple_gen: FakeShareGenerator,
    random_gen: FakeShareGenerator,
    zero_gen: FakeShareGenerator,
    bits_gen: FakeShareGenerator,
}

impl<F: MpcField> FakeDealer<F> {
    /// Create new instance.
    pub fn new(points: EvalPoints<F>, threshold: usize, party_id: usize, seed: u64) -> Self {
        let mut rng = SmallRng::seed_from_u64(seed);
        Self {
            points,
            party_id,
            threshold,
            beaver_triple_gen: FakeShareGenerator::new(rng.gen()),
            random_gen: FakeShareGenerator::new(rng.gen()),
            zero_gen: FakeShareGenerator::new(rng.gen()),
            bits_gen: FakeShareGenerator::new(rng.gen()),
        }
    }

    /// Evaluation point of current party.
    fn own_point(&self) -> F {
        self.points.get(self.party_id)
    }
}

impl<F: MpcField> MpcContext for FakeDealer<F> {
    type Field = F;

    fn num_parties(&self) -> usize {
        self.points.len()
    }

    fn party_id(&self) -> usize {
        self.party_id
    }

    fn threshold(&self) -> usize {
        self.threshold
    }
}

impl<F: MpcField> MpcDealer for FakeDealer<F> {
    fn next_beaver_triple(&mut self) -> Result<(Share<F>, Share<F>, Share<F>), DealerError> {
        let (point, t) = (self.own_point(), self.threshold);
        let gen = &mut self.beaver_triple_gen;
        let a = F::random(&mut gen.rng);
        let b = F::random(&mut gen.rng);
        Ok((
            gen.gen_share(t, point, a),
            gen.gen_share(t, point, b),
            gen.gen_share(t, point, a * b),
        ))
    }

    fn next_random(&mut self) -> Result<Share<F>, DealerError> {
        let (point, t) = (self.own_point(), self.threshold);
        let gen = &mut self.random_gen;
        let value = F::random(&mut gen.rng);
        Ok(gen.gen_share(t, point, value))
    }

    fn next_zero(&mut self) -> Result<Share<F>, DealerError> {
        let (point, t) = (self.own_point(), self.threshold);
        Ok(self.zero_gen.gen_share(t, point, F::zero()))
    }

    fn next_bit(&mut self) -> Result<Share<F>, DealerError> {
        let (point, t) = (self.own_point(), self.threshold);
        let gen = &mut self.bits_gen;
        let value = if gen.rng.gen() { F::one() } else { F::zero() };
        Ok(gen.gen_share(t, point, value))
    }
}

/// Insecure generator of sharing polynomials.
struct FakeShareGenerator {
    rng: SmallRng,
}

impl FakeShareGenerator {
    /// Create new generator.
    fn new(seed: [u8; 32]) -> Self {
        Self {
            rng: SmallRng::from_seed(seed),
        }
    }

    /// Sample random degree-t sharing polynomial of `value` and evaluate it at `point`.
    fn gen_share<F: MpcField>(&mut self, t: usize, point: F, value: F) -> Share<F> {
        Share::from_raw(Polynomial::random(t, value, &mut self.rng).evaluate(point))
    }
}

#[cfg(test)]
mod tests {
    use ff::Field;

    use super::*;
    use crate::fields::Mersenne61;

    type Fp = Mersenne61;

    fn dealers(n: usize, t: usize) -> Vec<FakeDealer<Fp>> {
        (0..n)
            .map(|id| FakeDealer::new(EvalPoints::sequential(n), t, id, 42))
            .collect()
    }

    fn reveal(shares: &[Share<Fp>], t: usize) -> Fp {
        let points = EvalPoints::<Fp>::sequential(shares.len());
        let pairs: Vec<_> = shares
            .iter()
            .enumerate()
            .take(t + 1)
            .map(|(i, s)| (points.get(i), s.value()))
            .collect();
        Polynomial::interpolate_at(&pairs, Fp::zero())
    }

    #[test]
    fn test_beaver_triples_are_consistent() {
        let mut dealers = dealers(4, 1);
        for _ in 0..3 {
            let triples: Vec<_> = dealers
                .iter_mut()
                .map(|d| d.next_beaver_triple().unwrap())
                .collect();
            let a = reveal(&triples.iter().map(|x| x.0).collect::<Vec<_>>(), 1);
            let b = reveal(&triples.iter().map(|x| x.1).collect::<Vec<_>>(), 1);
            let c = reveal(&triples.iter().map(|x| x.2).collect::<Vec<_>>(), 1);
            assert_eq!(a * b, c);
        }
    }

    #[test]
    fn test_zero_and_bits() {
        let mut dealers = dealers(7, 2);
        let zeros: Vec<_> = dealers.iter_mut().map(|d| d.next_zero().unwrap()).collect();
        assert_eq!(reveal(&zeros, 2), Fp::zero());

        for _ in 0..10 {
            let bits: Vec<_> = dealers.iter_mut().map(|d| d.next_bit().unwrap()).collect();
            let bit = reveal(&bits, 2);
            assert!(bit == Fp::zero() || bit == Fp::one());
        }
    }

    #[test]
    fn test_random_is_degree_t() {
        let mut dealers = dealers(4, 1);
        let shares: Vec<_> = dealers.iter_mut().map(|d| d.next_random().unwrap()).collect();
        let from_first = reveal(&shares, 1);
        let pairs: Vec<_> = (1..4)
            .map(|i| (Fp::from(i as u64 + 1), shares[i].value()))
            .take(2)
            .collect();
        assert_eq!(Polynomial::interpolate_at(&pairs, Fp::zero()), from_first);
    }
}
