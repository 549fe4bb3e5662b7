use std::{convert::Infallible, fmt};

use ff::PrimeField;
use futures::{
    channel::oneshot,
    future::{self, Either},
    FutureExt, Stream, StreamExt,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument};

use crate::{
    polynomial::{EvalPoints, Polynomial},
    robust_reconstruction::{robust_reconstruct, ReconstructionError},
};

/// Round of batch reconstruction protocol.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Round {
    R1,
    R2,
}

impl fmt::Display for Round {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Self::R1 => write!(f, "R1"),
            Self::R2 => write!(f, "R2"),
        }
    }
}

/// Batch reconstruction protocol message, tagged with its round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchMessage<F> {
    R1(F),
    R2(F),
}

/// Received message contradicts the agreed program order.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DesyncError {
    #[error("party {sender} sent share {share_id}, expected share {expected}")]
    DuplicateShare {
        sender: usize,
        share_id: u64,
        expected: u64,
    },
    #[error("party {sender} sent second {round} message")]
    DuplicateRound { sender: usize, round: Round },
    #[error("message from unknown party {0}")]
    UnknownSender(usize),
    #[error("party {sender} sent message of batch job {job}, only jobs below {limit} may be ahead")]
    JobOutOfWindow { sender: usize, job: u64, limit: u64 },
    #[error("party {sender} sent more than one message per round for batch job {job}")]
    JobFlooded { sender: usize, job: u64 },
}

/// Error during batch reconstruction.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum BatchReconstructionError {
    #[error("batch has {actual} secrets, expected {expected}")]
    InvalidBatchSize { expected: usize, actual: usize },
    #[error("protocol desync: {0}")]
    ProtocolDesync(#[from] DesyncError),
    #[error("receive stream closed before reconstruction completed")]
    TransportClosed,
    #[error("batch reconstruction failed in round {round}: {source}")]
    ReconstructionFailed {
        round: Round,
        #[source]
        source: ReconstructionError,
    },
}

/// Per-sender slots of a single round. Each slot is filled at most once.
struct RoundSlots<F> {
    round: Round,
    senders: Vec<Option<oneshot::Sender<F>>>,
}

impl<F> RoundSlots<F> {
    fn new(round: Round, n: usize) -> (Self, Vec<oneshot::Receiver<F>>) {
        let (senders, receivers) = (0..n)
            .map(|_| {
                let (tx, rx) = oneshot::channel();
                (Some(tx), rx)
            })
            .unzip();
        (Self { round, senders }, receivers)
    }

    fn fill(&mut self, sender: usize, value: F) -> Result<(), DesyncError> {
        let slot = self
            .senders
            .get_mut(sender)
            .ok_or(DesyncError::UnknownSender(sender))?
            .take()
            .ok_or(DesyncError::DuplicateRound {
                sender,
                round: self.round,
            })?;
        // Reconstruction may have finished without this value; it is not needed then.
        let _ = slot.send(value);
        Ok(())
    }
}

/// Demultiplex incoming messages into round slots until an error occurs.
async fn receive_rounds<F, R>(
    mut recv: R,
    mut round1: RoundSlots<F>,
    mut round2: RoundSlots<F>,
) -> Result<Infallible, BatchReconstructionError>
where
    R: Stream<Item = (usize, BatchMessage<F>)> + Unpin,
{
    loop {
        match recv.next().await {
            Some((sender, BatchMessage::R1(value))) => round1.fill(sender, value)?,
            Some((sender, BatchMessage::R2(value))) => round2.fill(sender, value)?,
            None => return Err(BatchReconstructionError::TransportClosed),
        }
    }
}

/// Reconstruct a batch of exactly t+1 secrets in two rounds of communication.
///
/// `secrets` are this party's shares of the t+1 secrets, shared at `points`.
/// `send(j, msg)` delivers to party j (including this party) without blocking,
/// `recv` yields `(sender, msg)` pairs of this batch only.
/// Tolerates up to t corrupted parties; blocks until 2t+1 agreeing responses arrive in each round.
#[instrument(skip_all, fields(party = my_id))]
pub async fn batch_reconstruct<F, S, R>(
    secrets: &[F],
    points: &EvalPoints<F>,
    t: usize,
    n: usize,
    my_id: usize,
    send: S,
    recv: R,
) -> Result<Vec<F>, BatchReconstructionError>
where
    F: PrimeField,
    S: Fn(usize, BatchMessage<F>),
    R: Stream<Item = (usize, BatchMessage<F>)> + Unpin,
{
    if secrets.len() != t + 1 {
        return Err(BatchReconstructionError::InvalidBatchSize {
            expected: t + 1,
            actual: secrets.len(),
        });
    }

    let (round1, round1_values) = RoundSlots::new(Round::R1, n);
    let (round2, round2_values) = RoundSlots::new(Round::R2, n);
    let receive = receive_rounds(recv, round1, round2);

    let protocol = async {
        // Round 1: our shares are coefficients of f, party j gets f(point(j)).
        let f = Polynomial::new(secrets.to_vec());
        for j in 0..n {
            send(j, BatchMessage::R1(f.evaluate(points.get(j))));
        }

        let (p1, faulty) = robust_reconstruct(to_sources(round1_values), points, n, t)
            .await
            .map_err(|source| BatchReconstructionError::ReconstructionFailed {
                round: Round::R1,
                source,
            })?;
        debug!(?faulty, "Round 1 reconstructed");

        // Round 2: P1(0) is our share of the polynomial with secrets as coefficients.
        let column = p1.evaluate(F::zero());
        for j in 0..n {
            send(j, BatchMessage::R2(column));
        }

        let (p2, faulty) = robust_reconstruct(to_sources(round2_values), points, n, t)
            .await
            .map_err(|source| BatchReconstructionError::ReconstructionFailed {
                round: Round::R2,
                source,
            })?;
        debug!(?faulty, "Round 2 reconstructed");

        let mut result = p2.into_coefficients();
        result.resize(t + 1, F::zero());
        Ok::<_, BatchReconstructionError>(result)
    };

    futures::pin_mut!(receive, protocol);

    // Receive loop is dropped on every exit path once protocol completes.
    match future::select(protocol, receive).await {
        Either::Left((result, _)) => result,
        Either::Right((Err(err), _)) => Err(err),
        Either::Right((Ok(never), _)) => match never {},
    }
}

/// Turn round slots into reconstruction sources. A dropped slot never delivers.
fn to_sources<F>(
    receivers: Vec<oneshot::Receiver<F>>,
) -> impl Iterator<Item = impl std::future::Future<Output = Option<F>>> {
    receivers.into_iter().map(|rx| rx.map(Result::ok))
}
