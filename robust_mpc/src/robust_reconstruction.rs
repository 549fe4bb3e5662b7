use std::{collections::BTreeSet, future::Future};

use ff::PrimeField;
use futures::{stream::FuturesUnordered, FutureExt, StreamExt};
use thiserror::Error;
use tracing::{debug, trace};

use crate::{
    polynomial::{EvalPoints, Polynomial},
    reed_solomon::{DecodeError, RobustDecoder},
};

/// Indices of sources whose values disagreed with the reconstructed polynomial.
pub type FaultySet = BTreeSet<usize>;

/// Reconstruction attempt failure. Expected while not enough honest values have arrived yet.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum AttemptError {
    #[error("decoded polynomial has degree {degree}, expected at most {max}")]
    WrongDegree { degree: usize, max: usize },
    #[error("only {coincides} points coincide with decoded polynomial, {required} required")]
    InsufficientAgreement { coincides: usize, required: usize },
    #[error("decoding failed: {0}")]
    Decode(#[from] DecodeError),
}

/// Fatal robust reconstruction failure.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ReconstructionError {
    #[error("cannot reconstruct from {sources} sources with n={n} and t={t}")]
    InvalidParameters { n: usize, t: usize, sources: usize },
    /// All sources were consumed without 2t+1 agreeing values,
    /// so more than t of them were faulty.
    #[error("more than {t} of {n} sources are faulty")]
    FaultBoundExceeded { n: usize, t: usize },
}

/// Attempt reconstruction of degree-t polynomial from currently resolved values.
/// `resolved[i]` holds value of source i evaluated at the decoder's i-th point, if already known.
/// Succeeds only if at least 2t+1 resolved values agree with decoded polynomial.
pub fn attempt_reconstruct<F: PrimeField>(
    decoder: &RobustDecoder<F>,
    resolved: &[Option<F>],
    t: usize,
) -> Result<(Polynomial<F>, FaultySet), AttemptError> {
    let poly = decoder.decode(resolved)?;
    if poly.degree() > t {
        return Err(AttemptError::WrongDegree {
            degree: poly.degree(),
            max: t,
        });
    }

    let mut coincides = 0;
    let mut faulty = FaultySet::new();
    for (i, (&x, value)) in decoder.points().iter().zip(resolved).enumerate() {
        match value {
            Some(y) if poly.evaluate(x) == *y => coincides += 1,
            Some(_) => {
                faulty.insert(i);
            }
            None => {}
        }
    }

    if coincides >= 2 * t + 1 {
        Ok((poly, faulty))
    } else {
        Err(AttemptError::InsufficientAgreement {
            coincides,
            required: 2 * t + 1,
        })
    }
}

/// Robustly reconstruct degree-t polynomial from `n` asynchronous sources,
/// where source i provides evaluation at `points.get(i)` and at most `t` sources are faulty.
///
/// Sources resolve in any order. A source yielding `None` will never deliver a value.
/// Reconstruction is attempted each time a new value arrives once at least 2t+1 are known,
/// so the result never depends on fewer than 2t+1 values. Returns the polynomial and
/// the sources detected as faulty. Does not time out: if fewer than 2t+1 honest sources
/// ever resolve, the returned future never completes.
pub async fn robust_reconstruct<F, I, Fut>(
    sources: I,
    points: &EvalPoints<F>,
    n: usize,
    t: usize,
) -> Result<(Polynomial<F>, FaultySet), ReconstructionError>
where
    F: PrimeField,
    I: IntoIterator<Item = Fut>,
    Fut: Future<Output = Option<F>>,
{
    let mut pending: FuturesUnordered<_> = sources
        .into_iter()
        .enumerate()
        .map(|(i, source)| source.map(move |value| (i, value)))
        .collect();

    if 2 * t >= n || pending.len() != n || points.len() != n {
        return Err(ReconstructionError::InvalidParameters {
            n,
            t,
            sources: pending.len(),
        });
    }

    let decoder = RobustDecoder::new(points.as_slice(), t + 1);
    let mut resolved = vec![None; n];
    let mut available = 0;

    while let Some((i, value)) = pending.next().await {
        let value = match value {
            Some(value) => value,
            None => continue,
        };
        resolved[i] = Some(value);
        available += 1;

        if available < 2 * t + 1 {
            continue;
        }

        match attempt_reconstruct(&decoder, &resolved, t) {
            Ok((poly, faulty)) => {
                if !faulty.is_empty() {
                    debug!(?faulty, available, "Detected faulty sources");
                }
                return Ok((poly, faulty));
            }
            Err(err) => trace!(%err, available, "Reconstruction attempt failed"),
        }
    }

    Err(ReconstructionError::FaultBoundExceeded { n, t })
}

#[cfg(test)]
mod tests {
    use futures::future;
    use rand::{rngs::SmallRng, SeedableRng};

    use super::*;
    use crate::fields::Mersenne61;

    type Fp = Mersenne61;

    fn honest_values(n: usize, t: usize, seed: u64) -> (Polynomial<Fp>, EvalPoints<Fp>, Vec<Fp>) {
        let mut rng = SmallRng::seed_from_u64(seed);
        let points = EvalPoints::sequential(n);
        let poly = Polynomial::random(t, Fp::from(seed), &mut rng);
        let values = points.as_slice().iter().map(|&x| poly.evaluate(x)).collect();
        (poly, points, values)
    }

    #[test]
    fn test_attempt_needs_2t_plus_1_agreement() {
        let (_, points, values) = honest_values(4, 1, 3);
        let decoder = RobustDecoder::new(points.as_slice(), 2);
        // Three values, one of them wrong: decoder finds a polynomial but it only matches two.
        let resolved = vec![Some(values[0]), Some(values[1]), Some(Fp::from(77)), None];
        assert!(matches!(
            attempt_reconstruct(&decoder, &resolved, 1),
            Err(AttemptError::InsufficientAgreement { .. }) | Err(AttemptError::Decode(_))
        ));
    }

    #[test]
    fn test_attempt_reports_faulty() {
        let (poly, points, values) = honest_values(4, 1, 5);
        let decoder = RobustDecoder::new(points.as_slice(), 2);
        let resolved = vec![Some(values[0]), Some(Fp::from(1)), Some(values[2]), Some(values[3])];
        let (decoded, faulty) = attempt_reconstruct(&decoder, &resolved, 1).unwrap();
        assert_eq!(decoded, poly);
        assert_eq!(faulty, FaultySet::from([1]));
    }

    #[tokio::test]
    async fn test_reconstruct_all_ready() {
        let (poly, points, values) = honest_values(7, 2, 11);
        let sources = values.into_iter().map(|v| future::ready(Some(v)));
        let (decoded, faulty) = robust_reconstruct(sources, &points, 7, 2).await.unwrap();
        assert_eq!(decoded, poly);
        assert!(faulty.is_empty());
    }

    #[tokio::test]
    async fn test_reconstruct_with_silent_sources() {
        let (poly, points, values) = honest_values(7, 2, 13);
        let sources: Vec<_> = values
            .into_iter()
            .enumerate()
            .map(|(i, v)| {
                if i < 2 {
                    future::pending().left_future()
                } else {
                    future::ready(Some(v)).right_future()
                }
            })
            .collect();
        let (decoded, _) = robust_reconstruct(sources, &points, 7, 2).await.unwrap();
        assert_eq!(decoded, poly);
    }

    #[tokio::test]
    async fn test_fault_bound_exceeded() {
        let (_, points, mut values) = honest_values(4, 1, 17);
        values[0] = Fp::from(1);
        values[3] = Fp::from(2);
        let sources = values.into_iter().map(|v| future::ready(Some(v)));
        assert_eq!(
            robust_reconstruct(sources, &points, 4, 1).await,
            Err(ReconstructionError::FaultBoundExceeded { n: 4, t: 1 })
        );
    }

    #[tokio::test]
    async fn test_invalid_parameters() {
        let (_, points, values) = honest_values(4, 1, 19);
        let sources = values.into_iter().map(|v| future::ready(Some(v)));
        assert!(matches!(
            robust_reconstruct(sources, &points, 4, 2).await,
            Err(ReconstructionError::InvalidParameters { .. })
        ));
    }
}
