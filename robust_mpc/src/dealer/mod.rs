mod fake_dealer;
pub use fake_dealer::FakeDealer;

mod precomp_dealer;
pub use precomp_dealer::{PrecomputedData, PrecomputedDealer};

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{share::Share, MpcContext};

/// Kind of preprocessed value.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PreprocessingKind {
    BeaverTriple,
    Random,
    Zero,
    Bit,
}

impl fmt::Display for PreprocessingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::BeaverTriple => write!(f, "Beaver triples"),
            Self::Random => write!(f, "random values"),
            Self::Zero => write!(f, "zero sharings"),
            Self::Bit => write!(f, "random bits"),
        }
    }
}

/// Error while serving preprocessed values.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DealerError {
    #[error("dealer ran out of {0}")]
    Exhausted(PreprocessingKind),
    #[error("dealer prepared for {expected}, used as {actual}")]
    ContextMismatch { expected: String, actual: String },
}

/// Dealer of precomputed parameters for MPC computation.
/// All parties must consume values of each kind in the same order.
pub trait MpcDealer: MpcContext {
    /// Random sharing of a secret random triple (a, b, c) that satisfies ab = c.
    fn next_beaver_triple(
        &mut self,
    ) -> Result<(Share<Self::Field>, Share<Self::Field>, Share<Self::Field>), DealerError>;

    /// Random sharing of a secret uniformly random value.
    fn next_random(&mut self) -> Result<Share<Self::Field>, DealerError>;

    /// Random sharing of zero.
    fn next_zero(&mut self) -> Result<Share<Self::Field>, DealerError>;

    /// Random sharing of a secret random bit.
    fn next_bit(&mut self) -> Result<Share<Self::Field>, DealerError>;
}

/// Check that dealer serves shares for given party and sharing parameters.
pub(crate) fn check_context<D>(
    dealer: &D,
    num_parties: usize,
    party_id: usize,
    threshold: usize,
) -> Result<(), DealerError>
where
    D: MpcContext + ?Sized,
{
    let describe = |n, id, t| format!("party {id} of {n} with threshold {t}");
    if (dealer.num_parties(), dealer.party_id(), dealer.threshold()) != (num_parties, party_id, threshold)
    {
        return Err(DealerError::ContextMismatch {
            expected: describe(dealer.num_parties(), dealer.party_id(), dealer.threshold()),
            actual: describe(num_parties, party_id, threshold),
        });
    }
    Ok(())
}
