use ff::PrimeField;
use serde::{de::DeserializeOwned, Serialize};

/// Prime field usable by the MPC runtime: arithmetic from `ff`, wire encoding from serde.
/// `Unpin` lets messages carrying field elements travel over framed byte streams.
pub trait MpcField: PrimeField + Serialize + DeserializeOwned + Unpin {}

impl<T: PrimeField + Serialize + DeserializeOwned + Unpin> MpcField for T {}

/// Implements serde for a derived prime field through its canonical representation.
/// Must be invoked in the module that derives the field, since the repr's inner array is private.
macro_rules! serde_via_repr {
    ($field:ident, $repr:ident) => {
        impl serde::Serialize for $field {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serde::Serialize::serialize(&self.to_repr().0, serializer)
            }
        }

        impl<'de> serde::Deserialize<'de> for $field {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let repr = $repr(serde::Deserialize::deserialize(deserializer)?);
                Self::from_repr_vartime(repr)
                    .ok_or_else(|| serde::de::Error::custom("Invalid field element"))
            }
        }
    };
}

mod bls12_scalar {
    use ff::PrimeField;

    /// Scalar field of the BLS12-381 curve. Has 2-adicity 32, so power-of-two roots of unity exist.
    #[derive(PrimeField)]
    #[PrimeFieldModulus = "52435875175126190479447740508185965837690552500527637822603658699938581184513"]
    #[PrimeFieldGenerator = "7"]
    #[PrimeFieldReprEndianness = "little"]
    pub struct Bls12Scalar([u64; 4]);

    serde_via_repr!(Bls12Scalar, Bls12ScalarRepr);
}

mod mersenne_61 {
    use ff::PrimeField;

    /// Finite field mod 2^61-1.
    #[derive(PrimeField)]
    #[PrimeFieldModulus = "2305843009213693951"]
    #[PrimeFieldGenerator = "37"]
    #[PrimeFieldReprEndianness = "little"]
    pub struct Mersenne61([u64; 1]);

    serde_via_repr!(Mersenne61, Mersenne61Repr);
}

mod mersenne_127 {
    use ff::PrimeField;

    /// Finite field mod 2^127-1.
    #[derive(PrimeField)]
    #[PrimeFieldModulus = "170141183460469231731687303715884105727"]
    #[PrimeFieldGenerator = "43"]
    #[PrimeFieldReprEndianness = "little"]
    pub struct Mersenne127([u64; 2]);

    serde_via_repr!(Mersenne127, Mersenne127Repr);
}

pub use bls12_scalar::{Bls12Scalar, Bls12ScalarRepr};
pub use mersenne_127::{Mersenne127, Mersenne127Repr};
pub use mersenne_61::{Mersenne61, Mersenne61Repr};
