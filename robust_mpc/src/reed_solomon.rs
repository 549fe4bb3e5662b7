use ff::PrimeField;
use thiserror::Error;

use crate::polynomial::Polynomial;

/// Error while decoding Reed-Solomon codeword.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("codeword has {actual} symbols, decoder expects {expected}")]
    LengthMismatch { expected: usize, actual: usize },
    #[error("only {available} symbols available, at least {required} required")]
    NotEnoughPoints { available: usize, required: usize },
    #[error("no divisors found, too many errors")]
    NoDivisor,
}

/// Reed-Solomon decoder correcting errors and erasures with Gao's algorithm.
/// Recovers polynomials of degree < k from codewords over fixed evaluation points.
/// With m non-erased symbols it corrects up to (m - k) / 2 errors.
#[derive(Clone, Debug)]
pub struct RobustDecoder<F> {
    points: Vec<F>,
    k: usize,
}

impl<F: PrimeField> RobustDecoder<F> {
    /// Create decoder for codewords evaluated at `points` (distinct) carrying `k` coefficients.
    pub fn new(points: &[F], k: usize) -> Self {
        Self {
            points: points.to_vec(),
            k,
        }
    }

    /// Codeword length.
    pub fn n(&self) -> usize {
        self.points.len()
    }

    /// Message length, i.e. degree bound plus one.
    pub fn k(&self) -> usize {
        self.k
    }

    pub fn points(&self) -> &[F] {
        &self.points
    }

    /// Evaluate message polynomial at all points.
    pub fn encode(&self, message: &[F]) -> Vec<F> {
        let poly = Polynomial::new(message.to_vec());
        self.points.iter().map(|&x| poly.evaluate(x)).collect()
    }

    /// Decode codeword in which `None` marks erased symbols.
    pub fn decode(&self, encoded: &[Option<F>]) -> Result<Polynomial<F>, DecodeError> {
        if encoded.len() != self.points.len() {
            return Err(DecodeError::LengthMismatch {
                expected: self.points.len(),
                actual: encoded.len(),
            });
        }

        let available: Vec<(F, F)> = self
            .points
            .iter()
            .zip(encoded)
            .filter_map(|(&x, y)| y.map(|y| (x, y)))
            .collect();

        let m = available.len();
        if m < self.k {
            return Err(DecodeError::NotEnoughPoints {
                available: m,
                required: self.k,
            });
        }

        let xs: Vec<F> = available.iter().map(|&(x, _)| x).collect();
        let g0 = Polynomial::from_roots(&xs);
        let g1 = Polynomial::interpolate(&available);

        // Partial extended Euclid on (g0, g1), tracking only the g1 cofactor,
        // until remainder degree drops below (m + k) / 2.
        let (mut r_prev, mut r) = (g0, g1);
        let (mut v_prev, mut v) = (Polynomial::zero(), Polynomial::constant(F::one()));

        while !r.is_zero() && 2 * r.degree() >= m + self.k {
            let (q, rem) = r_prev.div_rem(&r).ok_or(DecodeError::NoDivisor)?;
            let v_next = &v_prev - &(&q * &v);
            r_prev = std::mem::replace(&mut r, rem);
            v_prev = std::mem::replace(&mut v, v_next);
        }

        // Error locator v must divide g exactly.
        let (message, rem) = r.div_rem(&v).ok_or(DecodeError::NoDivisor)?;
        if !rem.is_zero() || message.degree() >= self.k {
            return Err(DecodeError::NoDivisor);
        }

        Ok(message)
    }
}
