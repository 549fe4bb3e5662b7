use std::ops::{Add, Mul, Neg, Sub};

use futures::future::LocalBoxFuture;
use serde::{Deserialize, Serialize};

use crate::{
    executor::{MpcError, MpcExecutor, Opening},
    MpcField,
};

/// Local Shamir share of a secret field element.
/// Linear operations are computed locally; revealing or multiplying requires communication.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Share<F> {
    value: F,
}

impl<F: MpcField> Share<F> {
    /// Wrap raw local share value.
    pub fn from_raw(value: F) -> Self {
        Self { value }
    }

    /// Sharing of a public value: constant polynomial, so every party holds the value itself.
    pub fn from_plain(value: F) -> Self {
        Self { value }
    }

    /// Raw local share value.
    pub fn value(&self) -> F {
        self.value
    }

    /// Reveal shared value to all parties. Share ID is assigned at call time.
    pub fn open(self, ctx: &MpcExecutor<F>) -> Opening<F> {
        ctx.open(self)
    }

    /// Multiply shared values using executor's multiplication protocol.
    pub async fn mul(self, ctx: &MpcExecutor<F>, other: Self) -> Result<Self, MpcError> {
        ctx.multiply(self, other).await
    }
}

impl<F: MpcField> Add for Share<F> {
    type Output = Share<F>;
    fn add(self, rhs: Self) -> Self::Output {
        Share {
            value: self.value + rhs.value,
        }
    }
}

impl<F: MpcField> Sub for Share<F> {
    type Output = Share<F>;
    fn sub(self, rhs: Self) -> Self::Output {
        Share {
            value: self.value - rhs.value,
        }
    }
}

impl<F: MpcField> Neg for Share<F> {
    type Output = Share<F>;
    fn neg(self) -> Self::Output {
        Share { value: -self.value }
    }
}

impl<F: MpcField> Add<F> for Share<F> {
    type Output = Share<F>;
    fn add(self, rhs: F) -> Self::Output {
        Share {
            value: self.value + rhs,
        }
    }
}

impl<F: MpcField> Sub<F> for Share<F> {
    type Output = Share<F>;
    fn sub(self, rhs: F) -> Self::Output {
        Share {
            value: self.value - rhs,
        }
    }
}

impl<F: MpcField> Mul<F> for Share<F> {
    type Output = Share<F>;
    fn mul(self, rhs: F) -> Self::Output {
        Share {
            value: self.value * rhs,
        }
    }
}

/// Ordered sequence of shares, opened together with batch reconstruction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ShareArray<F> {
    shares: Vec<Share<F>>,
}

impl<F: MpcField> ShareArray<F> {
    pub fn new(shares: Vec<Share<F>>) -> Self {
        Self { shares }
    }

    /// Sharing of public values.
    pub fn from_plain(values: impl IntoIterator<Item = F>) -> Self {
        values.into_iter().map(Share::from_plain).collect()
    }

    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Share<F>> {
        self.shares.get(index).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = Share<F>> + '_ {
        self.shares.iter().copied()
    }

    pub fn as_slice(&self) -> &[Share<F>] {
        &self.shares
    }

    pub fn into_vec(self) -> Vec<Share<F>> {
        self.shares
    }

    /// Element-wise sum of equal-length arrays.
    pub fn try_add(&self, other: &Self) -> Result<Self, MpcError> {
        self.zip_with(other, |x, y| x + y)
    }

    /// Element-wise difference of equal-length arrays.
    pub fn try_sub(&self, other: &Self) -> Result<Self, MpcError> {
        self.zip_with(other, |x, y| x - y)
    }

    fn zip_with(
        &self,
        other: &Self,
        f: impl Fn(Share<F>, Share<F>) -> Share<F>,
    ) -> Result<Self, MpcError> {
        if self.len() != other.len() {
            return Err(MpcError::LengthMismatch {
                left: self.len(),
                right: other.len(),
            });
        }
        Ok(self.iter().zip(other.iter()).map(|(x, y)| f(x, y)).collect())
    }

    /// Reveal all values with batch reconstruction.
    ///
    /// Fails with [`MpcError::NotEnoughShares`] before any communication if the array holds
    /// fewer than t+1 shares. Otherwise the array is padded by repeating its last element
    /// up to a multiple of t+1, and every group of t+1 shares is reconstructed in its own batch.
    /// Batch IDs are assigned at call time. The resolved list covers the padded array,
    /// so it may be longer than the array itself.
    pub fn open<'a>(
        &self,
        ctx: &'a MpcExecutor<F>,
    ) -> Result<LocalBoxFuture<'a, Result<Vec<F>, MpcError>>, MpcError> {
        ctx.open_batch(self.iter().map(|x| x.value()).collect())
    }

    /// Element-wise product of equal-length arrays using executor's multiplication protocol.
    pub async fn mul(&self, ctx: &MpcExecutor<F>, other: &Self) -> Result<Self, MpcError> {
        ctx.multiply_arrays(self, other).await
    }
}

impl<F> FromIterator<Share<F>> for ShareArray<F> {
    fn from_iter<I: IntoIterator<Item = Share<F>>>(iter: I) -> Self {
        Self {
            shares: iter.into_iter().collect(),
        }
    }
}

impl<F> IntoIterator for ShareArray<F> {
    type Item = Share<F>;
    type IntoIter = std::vec::IntoIter<Share<F>>;

    fn into_iter(self) -> Self::IntoIter {
        self.shares.into_iter()
    }
}

impl<F: MpcField> Neg for ShareArray<F> {
    type Output = ShareArray<F>;
    fn neg(self) -> Self::Output {
        self.into_iter().map(|x| -x).collect()
    }
}

impl<F: MpcField> Add<F> for ShareArray<F> {
    type Output = ShareArray<F>;
    fn add(self, rhs: F) -> Self::Output {
        self.into_iter().map(|x| x + rhs).collect()
    }
}

impl<F: MpcField> Sub<F> for ShareArray<F> {
    type Output = ShareArray<F>;
    fn sub(self, rhs: F) -> Self::Output {
        self.into_iter().map(|x| x - rhs).collect()
    }
}

impl<F: MpcField> Mul<F> for ShareArray<F> {
    type Output = ShareArray<F>;
    fn mul(self, rhs: F) -> Self::Output {
        self.into_iter().map(|x| x * rhs).collect()
    }
}

/// Raw share values received from a single party, indexed by share ID.
/// Values must arrive in share ID order.
#[derive(Clone, Debug)]
pub struct ShareBuffer<F> {
    values: Vec<F>,
}

impl<F: Copy> ShareBuffer<F> {
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    /// Share ID expected next.
    pub fn next_id(&self) -> u64 {
        self.values.len() as u64
    }

    /// Append value of given share. On out-of-order ID returns the expected one.
    pub fn push(&mut self, share_id: u64, value: F) -> Result<(), u64> {
        if share_id != self.next_id() {
            return Err(self.next_id());
        }
        self.values.push(value);
        Ok(())
    }

    pub fn get(&self, share_id: u64) -> Option<F> {
        usize::try_from(share_id)
            .ok()
            .and_then(|i| self.values.get(i))
            .copied()
    }
}

impl<F: Copy> Default for ShareBuffer<F> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use ff::Field;

    use super::*;
    use crate::fields::Mersenne61;

    type Fp = Mersenne61;

    #[test]
    fn test_local_algebra() {
        let x = Share::from_raw(Fp::from(10));
        let y = Share::from_raw(Fp::from(3));
        assert_eq!((x + y).value(), Fp::from(13));
        assert_eq!((x - y).value(), Fp::from(7));
        assert_eq!((-x).value(), -Fp::from(10));
        assert_eq!((x + Fp::from(5)).value(), Fp::from(15));
        assert_eq!((x - Fp::from(5)).value(), Fp::from(5));
        assert_eq!((x * Fp::from(4)).value(), Fp::from(40));
    }

    #[test]
    fn test_array_algebra() {
        let a = ShareArray::from_plain([1, 2, 3].map(Fp::from));
        let b = ShareArray::from_plain([10, 20, 30].map(Fp::from));
        assert_eq!(
            a.try_add(&b).unwrap(),
            ShareArray::from_plain([11, 22, 33].map(Fp::from))
        );
        assert_eq!(
            b.try_sub(&a).unwrap(),
            ShareArray::from_plain([9, 18, 27].map(Fp::from))
        );
        assert_eq!(
            (a.clone() * Fp::from(2) + Fp::one()).iter().map(|x| x.value()).collect::<Vec<_>>(),
            [3, 5, 7].map(Fp::from)
        );
        assert_eq!(
            a.try_add(&ShareArray::from_plain([Fp::one()])),
            Err(MpcError::LengthMismatch { left: 3, right: 1 })
        );
    }

    #[test]
    fn test_share_buffer_order() {
        let mut buffer = ShareBuffer::new();
        assert_eq!(buffer.push(0, Fp::from(5)), Ok(()));
        assert_eq!(buffer.push(2, Fp::from(6)), Err(1));
        assert_eq!(buffer.push(0, Fp::from(6)), Err(1));
        assert_eq!(buffer.push(1, Fp::from(7)), Ok(()));
        assert_eq!(buffer.get(1), Some(Fp::from(7)));
        assert_eq!(buffer.get(2), None);
    }
}
