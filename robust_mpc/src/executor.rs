use std::{
    cell::{Cell, RefCell},
    collections::HashMap,
    convert::Infallible,
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

use futures::{
    channel::{
        mpsc::{self, UnboundedReceiver, UnboundedSender},
        oneshot,
    },
    future::{self, Either, LocalBoxFuture},
    FutureExt, StreamExt,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

use crate::{
    batch_reconstruction::{batch_reconstruct, BatchMessage, BatchReconstructionError, DesyncError},
    dealer::{self, DealerError, MpcDealer},
    mixins::{BeaverMultiply, MultiplicationMixin},
    polynomial::{EvalPoints, Polynomial},
    share::{Share, ShareArray, ShareBuffer},
    transport::{Inbox, Outbox, PartyChannels, TransportError},
    MpcContext, MpcField,
};

/// Default number of batch jobs other parties may run ahead of this one.
pub const DEFAULT_JOB_WINDOW: u64 = 1 << 16;

/// Message exchanged between executors.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MpcMessage<F> {
    /// Sender's share of the value opened with given share ID.
    Open { share_id: u64, value: F },
    /// Message of batch reconstruction job.
    Batch { job: u64, message: BatchMessage<F> },
}

/// Error during execution of MPC program.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum MpcError {
    #[error("cannot batch open {len} shares, at least {required} required")]
    NotEnoughShares { len: usize, required: usize },
    #[error("share arrays have different lengths {left} and {right}")]
    LengthMismatch { left: usize, right: usize },
    #[error("protocol desync: {0}")]
    ProtocolDesync(#[from] DesyncError),
    #[error("batch reconstruction failed: {0}")]
    BatchReconstructionFailed(#[source] BatchReconstructionError),
    #[error("preprocessing failed: {0}")]
    Dealer(#[from] DealerError),
    #[error("transport failed: {0}")]
    Transport(#[from] TransportError),
    #[error("{points} evaluation points given for {parties} parties")]
    PointsMismatch { points: usize, parties: usize },
    #[error("executor stopped before value was revealed")]
    Cancelled,
}

impl From<BatchReconstructionError> for MpcError {
    fn from(err: BatchReconstructionError) -> Self {
        match err {
            BatchReconstructionError::ProtocolDesync(err) => Self::ProtocolDesync(err),
            err => Self::BatchReconstructionFailed(err),
        }
    }
}

/// Per-party MPC program executor.
///
/// Executor state is single-threaded: the program, the receive loop and all pending
/// reconstructions run as futures on one task. Share IDs and batch job IDs are assigned
/// in program order, so all parties must issue openings in the same order.
pub struct MpcExecutor<F: MpcField> {
    threshold: usize,
    points: EvalPoints<F>,
    outbox: Outbox<MpcMessage<F>>,
    inbox: Inbox<MpcMessage<F>>,
    dealer: RefCell<Box<dyn MpcDealer<Field = F>>>,
    mixin: Box<dyn MultiplicationMixin<F>>,
    next_share_id: Cell<u64>,
    buffers: RefCell<Vec<ShareBuffer<F>>>,
    waiters: RefCell<HashMap<u64, oneshot::Sender<F>>>,
    batches: RefCell<BatchRegistry<F>>,
}

impl<F: MpcField> MpcExecutor<F> {
    /// Create executor for party owning `channels`, sharing with degree `threshold` at `points`.
    pub fn new(
        threshold: usize,
        points: EvalPoints<F>,
        channels: PartyChannels<MpcMessage<F>>,
        dealer: Box<dyn MpcDealer<Field = F>>,
    ) -> Result<Self, MpcError> {
        let PartyChannels { outbox, inbox } = channels;
        let num_parties = outbox.num_parties();
        if points.len() != num_parties {
            return Err(MpcError::PointsMismatch {
                points: points.len(),
                parties: num_parties,
            });
        }
        dealer::check_context(dealer.as_ref(), num_parties, outbox.party_id(), threshold)?;

        Ok(Self {
            threshold,
            points,
            outbox,
            inbox,
            dealer: RefCell::new(dealer),
            mixin: Box::new(BeaverMultiply),
            next_share_id: Cell::new(0),
            buffers: RefCell::new((0..num_parties).map(|_| ShareBuffer::new()).collect()),
            waiters: RefCell::new(HashMap::new()),
            batches: RefCell::new(BatchRegistry::new(num_parties, DEFAULT_JOB_WINDOW)),
        })
    }

    /// Replace multiplication protocol.
    pub fn with_mixin(mut self, mixin: Box<dyn MultiplicationMixin<F>>) -> Self {
        self.mixin = mixin;
        self
    }

    /// Accept batch messages for at most `window` jobs past the last one started here.
    /// Messages beyond the window are a protocol desync. Programs opening arrays of more
    /// than `window * (t+1)` shares at once need a larger window.
    pub fn with_job_window(mut self, window: u64) -> Self {
        self.batches.get_mut().window = window;
        self
    }

    /// Public evaluation points of all parties.
    pub fn points(&self) -> &EvalPoints<F> {
        &self.points
    }

    /// Reveal shared value. Requires communication.
    ///
    /// Assigns the next share ID and broadcasts this party's share immediately;
    /// the returned future resolves once t+1 parties delivered their shares of this ID.
    pub fn open(&self, share: Share<F>) -> Opening<F> {
        let share_id = self.next_share_id.get();
        self.next_share_id.set(share_id + 1);

        let (sender, receiver) = oneshot::channel();
        self.waiters.borrow_mut().insert(share_id, sender);

        let msg = MpcMessage::Open {
            share_id,
            value: share.value(),
        };
        if let Err(err) = self.outbox.send_to_all(msg) {
            warn!(%err, share_id, "Failed to broadcast share");
        }

        self.try_resolve(share_id);
        Opening { share_id, receiver }
    }

    /// Reveal values with batch reconstruction, see [`ShareArray::open`].
    pub fn open_batch(
        &self,
        mut values: Vec<F>,
    ) -> Result<LocalBoxFuture<'_, Result<Vec<F>, MpcError>>, MpcError> {
        let batch_size = self.threshold + 1;
        if values.len() < batch_size {
            return Err(MpcError::NotEnoughShares {
                len: values.len(),
                required: batch_size,
            });
        }

        if let Some(&last) = values.last() {
            let padded_len = (values.len() + batch_size - 1) / batch_size * batch_size;
            values.resize(padded_len, last);
        }

        let jobs: Vec<_> = values
            .chunks(batch_size)
            .map(|secrets| self.batch_job(secrets.to_vec()))
            .collect();

        Ok(async move {
            let results = future::try_join_all(jobs).await?;
            Ok::<_, MpcError>(results.into_iter().flatten().collect())
        }
        .boxed_local())
    }

    /// Register batch job and return future running it.
    fn batch_job(&self, secrets: Vec<F>) -> impl Future<Output = Result<Vec<F>, MpcError>> + '_ {
        let (job, inbox) = self.batches.borrow_mut().start();
        debug!(job, "Batch job started");
        let guard = JobGuard {
            registry: &self.batches,
            job,
        };

        async move {
            let _guard = guard;
            let send = |to, message| {
                if let Err(err) = self.outbox.send(to, MpcMessage::Batch { job, message }) {
                    warn!(%err, job, "Failed to send batch message");
                }
            };
            let result = batch_reconstruct(
                &secrets,
                &self.points,
                self.threshold,
                self.num_parties(),
                self.party_id(),
                send,
                inbox,
            )
            .await;
            debug!(job, success = result.is_ok(), "Batch job finished");
            result.map_err(MpcError::from)
        }
    }

    /// Multiply shared values. Requires communication.
    pub async fn multiply(&self, x: Share<F>, y: Share<F>) -> Result<Share<F>, MpcError> {
        self.mixin.multiply(self, x, y).await
    }

    /// Multiply arrays of shared values element-wise. Requires communication.
    pub async fn multiply_arrays(
        &self,
        x: &ShareArray<F>,
        y: &ShareArray<F>,
    ) -> Result<ShareArray<F>, MpcError> {
        self.mixin.multiply_arrays(self, x, y).await
    }

    /// Random sharing of a secret random triple (a, b, c) that satisfies ab = c.
    pub fn get_triple(&self) -> Result<(Share<F>, Share<F>, Share<F>), MpcError> {
        Ok(self.dealer.borrow_mut().next_beaver_triple()?)
    }

    /// Random sharing of a secret random value.
    pub fn get_rand(&self) -> Result<Share<F>, MpcError> {
        Ok(self.dealer.borrow_mut().next_random()?)
    }

    /// Random sharing of zero.
    pub fn get_zero(&self) -> Result<Share<F>, MpcError> {
        Ok(self.dealer.borrow_mut().next_zero()?)
    }

    /// Random sharing of a secret random bit.
    pub fn get_bit(&self) -> Result<Share<F>, MpcError> {
        Ok(self.dealer.borrow_mut().next_bit()?)
    }

    /// Execute program while processing incoming messages.
    /// Fails as soon as either the program or the receive loop fails.
    #[instrument(skip_all, fields(party = self.party_id()))]
    pub async fn run<T, P>(mut self, program: P) -> Result<T, MpcError>
    where
        P: for<'a> FnOnce(&'a MpcExecutor<F>) -> LocalBoxFuture<'a, Result<T, MpcError>>,
    {
        // Only the receive loop reads the inbox; a closed one stays behind.
        let (_, closed) = mpsc::unbounded();
        let inbox = std::mem::replace(&mut self.inbox, closed);
        let receive = self.receive_loop(inbox);
        futures::pin_mut!(receive);

        let outcome = future::select(program(&self), receive).await;
        match outcome {
            Either::Left((result, _)) => result,
            Either::Right((Err(err), _)) => Err(err),
            Either::Right((Ok(never), _)) => match never {},
        }
    }

    /// Demultiplex incoming messages until inbox closes or a protocol violation occurs.
    async fn receive_loop(&self, mut inbox: Inbox<MpcMessage<F>>) -> Result<Infallible, MpcError> {
        while let Some((sender, msg)) = inbox.next().await {
            match msg {
                MpcMessage::Open { share_id, value } => self.handle_share(sender, share_id, value)?,
                MpcMessage::Batch { job, message } => {
                    self.batches.borrow_mut().route(sender, job, message)?
                }
            }
        }
        Err(TransportError::Closed.into())
    }

    /// Store received share and resolve its opening if requested.
    fn handle_share(&self, sender: usize, share_id: u64, value: F) -> Result<(), MpcError> {
        self.buffers
            .borrow_mut()
            .get_mut(sender)
            .ok_or(DesyncError::UnknownSender(sender))?
            .push(share_id, value)
            .map_err(|expected| DesyncError::DuplicateShare {
                sender,
                share_id,
                expected,
            })?;

        if self.waiters.borrow().contains_key(&share_id) {
            self.try_resolve(share_id);
        }
        Ok(())
    }

    /// Resolve opening of given share ID if t+1 parties delivered their shares.
    /// Interpolates through the lowest t+1 party IDs holding the share.
    fn try_resolve(&self, share_id: u64) {
        let points: Vec<_> = self
            .buffers
            .borrow()
            .iter()
            .enumerate()
            .filter_map(|(i, buffer)| buffer.get(share_id).map(|value| (self.points.get(i), value)))
            .take(self.threshold + 1)
            .collect();
        if points.len() <= self.threshold {
            return;
        }

        if let Some(waiter) = self.waiters.borrow_mut().remove(&share_id) {
            let value = Polynomial::interpolate_at(&points, F::zero());
            trace!(share_id, "Share opened");
            // Opening may have been dropped by the program.
            let _ = waiter.send(value);
        }
    }
}

impl<F: MpcField> MpcContext for MpcExecutor<F> {
    type Field = F;

    fn num_parties(&self) -> usize {
        self.outbox.num_parties()
    }

    fn party_id(&self) -> usize {
        self.outbox.party_id()
    }

    fn threshold(&self) -> usize {
        self.threshold
    }
}

/// Pending reveal of a single share, see [`MpcExecutor::open`].
#[must_use = "futures do nothing unless you `.await` or poll them"]
pub struct Opening<F> {
    share_id: u64,
    receiver: oneshot::Receiver<F>,
}

impl<F> Opening<F> {
    /// Share ID assigned to this opening.
    pub fn share_id(&self) -> u64 {
        self.share_id
    }
}

impl<F> Future for Opening<F> {
    type Output = Result<F, MpcError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.receiver
            .poll_unpin(cx)
            .map(|result| result.map_err(|_| MpcError::Cancelled))
    }
}

type BatchSender<F> = UnboundedSender<(usize, BatchMessage<F>)>;
type BatchReceiver<F> = UnboundedReceiver<(usize, BatchMessage<F>)>;

/// Messages of a job other parties already started, but we did not.
struct UnclaimedJob<F> {
    sender: BatchSender<F>,
    receiver: BatchReceiver<F>,
    /// Buffered messages per party. An honest party sends one per round.
    counts: Vec<u8>,
}

impl<F> UnclaimedJob<F> {
    fn new(num_parties: usize) -> Self {
        let (sender, receiver) = mpsc::unbounded();
        Self {
            sender,
            receiver,
            counts: vec![0; num_parties],
        }
    }
}

/// Routes batch messages to running jobs by job ID.
struct BatchRegistry<F> {
    next_job: u64,
    num_parties: usize,
    /// How far past `next_job` other parties' jobs are buffered.
    window: u64,
    routes: HashMap<u64, BatchSender<F>>,
    unclaimed: HashMap<u64, UnclaimedJob<F>>,
}

impl<F> BatchRegistry<F> {
    fn new(num_parties: usize, window: u64) -> Self {
        Self {
            next_job: 0,
            num_parties,
            window,
            routes: HashMap::new(),
            unclaimed: HashMap::new(),
        }
    }

    /// Assign next job ID and take its incoming messages.
    fn start(&mut self) -> (u64, BatchReceiver<F>) {
        let job = self.next_job;
        self.next_job += 1;
        let (sender, receiver) = match self.unclaimed.remove(&job) {
            Some(unclaimed) => (unclaimed.sender, unclaimed.receiver),
            None => mpsc::unbounded(),
        };
        self.routes.insert(job, sender);
        (job, receiver)
    }

    fn route(&mut self, sender: usize, job: u64, message: BatchMessage<F>) -> Result<(), DesyncError> {
        if let Some(route) = self.routes.get(&job) {
            // Job may finish without this message.
            let _ = route.unbounded_send((sender, message));
            return Ok(());
        }
        if job < self.next_job {
            trace!(job, sender, "Dropping message of finished batch job");
            return Ok(());
        }

        let limit = self.next_job.saturating_add(self.window);
        if job >= limit {
            return Err(DesyncError::JobOutOfWindow { sender, job, limit });
        }
        if sender >= self.num_parties {
            return Err(DesyncError::UnknownSender(sender));
        }

        let num_parties = self.num_parties;
        let unclaimed = self
            .unclaimed
            .entry(job)
            .or_insert_with(|| UnclaimedJob::new(num_parties));
        let count = &mut unclaimed.counts[sender];
        if *count >= 2 {
            return Err(DesyncError::JobFlooded { sender, job });
        }
        *count += 1;
        let _ = unclaimed.sender.unbounded_send((sender, message));
        Ok(())
    }
}

/// Deregisters batch job when it completes, fails or is dropped.
struct JobGuard<'a, F> {
    registry: &'a RefCell<BatchRegistry<F>>,
    job: u64,
}

impl<F> Drop for JobGuard<'_, F> {
    fn drop(&mut self) {
        self.registry.borrow_mut().routes.remove(&self.job);
    }
}
