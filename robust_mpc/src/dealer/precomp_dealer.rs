use std::{
    collections::VecDeque,
    fs::File,
    io::{self, BufReader, BufWriter},
    path::Path,
};

use serde::{Deserialize, Serialize};

use crate::{share::Share, MpcContext, MpcField};

use super::{DealerError, MpcDealer, PreprocessingKind};

/// Precomputed preprocessing values of a single party.
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct PrecomputedData<F> {
    pub num_parties: usize,
    pub party_id: usize,
    pub threshold: usize,
    pub beaver_triples: VecDeque<(Share<F>, Share<F>, Share<F>)>,
    pub randoms: VecDeque<Share<F>>,
    pub zeros: VecDeque<Share<F>>,
    pub bits: VecDeque<Share<F>>,
}

impl<F> PrecomputedData<F>
where
    F: Serialize + for<'a> Deserialize<'a>,
{
    /// Load precomputed data from file.
    pub fn load_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        bincode::deserialize_from(reader).map_err(|err| io::Error::new(io::ErrorKind::Other, err))
    }

    /// Save precomputed data to file.
    pub fn save_file(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        bincode::serialize_into(writer, self)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))
    }
}

impl<F: MpcField> PrecomputedData<F> {
    /// Draw given amounts of every preprocessing kind from another dealer.
    pub fn from_dealer<D>(
        dealer: &mut D,
        triples: usize,
        randoms: usize,
        zeros: usize,
        bits: usize,
    ) -> Result<Self, DealerError>
    where
        D: MpcDealer<Field = F> + ?Sized,
    {
        Ok(Self {
            num_parties: dealer.num_parties(),
            party_id: dealer.party_id(),
            threshold: dealer.threshold(),
            beaver_triples: (0..triples)
                .map(|_| dealer.next_beaver_triple())
                .collect::<Result<_, _>>()?,
            randoms: (0..randoms)
                .map(|_| dealer.next_random())
                .collect::<Result<_, _>>()?,
            zeros: (0..zeros)
                .map(|_| dealer.next_zero())
                .collect::<Result<_, _>>()?,
            bits: (0..bits).map(|_| dealer.next_bit()).collect::<Result<_, _>>()?,
        })
    }
}

/// Dealer that serves precomputed data in the order it was generated.
pub struct PrecomputedDealer<F> {
    data: PrecomputedData<F>,
}

impl<F> PrecomputedDealer<F>
where
    F: Serialize + for<'a> Deserialize<'a>,
{
    /// Create new dealer given precomputed data.
    pub fn new(data: PrecomputedData<F>) -> Self {
        Self { data }
    }

    /// Create new dealer from file with precomputed data.
    pub fn from_file(path: impl AsRef<Path>) -> io::Result<Self> {
        Ok(Self::new(PrecomputedData::load_file(path)?))
    }

    /// Remaining amount of values of given kind.
    pub fn remaining(&self, kind: PreprocessingKind) -> usize {
        match kind {
            PreprocessingKind::BeaverTriple => self.data.beaver_triples.len(),
            PreprocessingKind::Random => self.data.randoms.len(),
            PreprocessingKind::Zero => self.data.zeros.len(),
            PreprocessingKind::Bit => self.data.bits.len(),
        }
    }
}

/// Pop next value of given kind.
fn next<T>(queue: &mut VecDeque<T>, kind: PreprocessingKind) -> Result<T, DealerError> {
    queue.pop_front().ok_or(DealerError::Exhausted(kind))
}

impl<F: MpcField> MpcContext for PrecomputedDealer<F> {
    type Field = F;

    fn num_parties(&self) -> usize {
        self.data.num_parties
    }

    fn party_id(&self) -> usize {
        self.data.party_id
    }

    fn threshold(&self) -> usize {
        self.data.threshold
    }
}

impl<F: MpcField> MpcDealer for PrecomputedDealer<F> {
    fn next_beaver_triple(&mut self) -> Result<(Share<F>, Share<F>, Share<F>), DealerError> {
        next(&mut self.data.beaver_triples, PreprocessingKind::BeaverTriple)
    }

    fn next_random(&mut self) -> Result<Share<F>, DealerError> {
        next(&mut self.data.randoms, PreprocessingKind::Random)
    }

    fn next_zero(&mut self) -> Result<Share<F>, DealerError> {
        next(&mut self.data.zeros, PreprocessingKind::Zero)
    }

    fn next_bit(&mut self) -> Result<Share<F>, DealerError> {
        next(&mut self.data.bits, PreprocessingKind::Bit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{dealer::FakeDealer, fields::Mersenne61, polynomial::EvalPoints};

    type Fp = Mersenne61;

    #[test]
    fn test_serves_in_generation_order() {
        let mut fake = FakeDealer::<Fp>::new(EvalPoints::sequential(4), 1, 2, 7);
        let data = PrecomputedData::from_dealer(&mut fake, 2, 1, 0, 0).unwrap();
        let expected_triples = data.beaver_triples.clone();
        let expected_random = data.randoms[0];

        let mut dealer = PrecomputedDealer::new(data);
        assert_eq!(dealer.party_id(), 2);
        assert_eq!(dealer.next_beaver_triple().unwrap(), expected_triples[0]);
        assert_eq!(dealer.next_beaver_triple().unwrap(), expected_triples[1]);
        assert_eq!(dealer.next_random().unwrap(), expected_random);
        assert_eq!(dealer.remaining(PreprocessingKind::BeaverTriple), 0);
    }

    #[test]
    fn test_exhausted() {
        let mut dealer = PrecomputedDealer::<Fp>::new(Default::default());
        assert_eq!(
            dealer.next_bit(),
            Err(DealerError::Exhausted(PreprocessingKind::Bit))
        );
        assert_eq!(
            dealer.next_zero(),
            Err(DealerError::Exhausted(PreprocessingKind::Zero))
        );
    }

    #[test]
    fn test_file_roundtrip() {
        let mut fake = FakeDealer::<Fp>::new(EvalPoints::sequential(4), 1, 0, 9);
        let data = PrecomputedData::from_dealer(&mut fake, 3, 0, 2, 4).unwrap();
        let path = std::env::temp_dir().join(format!("robust_mpc_precomp_{}.bin", std::process::id()));
        data.save_file(&path).unwrap();

        let mut dealer = PrecomputedDealer::<Fp>::from_file(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert_eq!(dealer.remaining(PreprocessingKind::Bit), 4);
        assert_eq!(dealer.next_zero().unwrap(), data.zeros[0]);
    }
}
