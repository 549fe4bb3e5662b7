use std::{collections::BTreeSet, time::Duration};

use futures::future::{self, LocalBoxFuture};
use tracing::debug;

use crate::{
    config::{ConfigError, MpcConfig},
    dealer::FakeDealer,
    executor::{MpcError, MpcExecutor, MpcMessage},
    transport::{self, PartyChannels},
    MpcField,
};

/// Default capacity of in-memory byte streams used by [`TransportKind::Bincode`].
const DEFAULT_MAX_BUF_SIZE: usize = 1 << 16;

/// In-process transport connecting parties.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TransportKind {
    /// Direct delivery.
    Local,
    /// Constant per-message latency.
    Delayed(Duration),
    /// Messages serialized over length-framed byte streams.
    Bincode { max_buf_size: usize },
}

impl TransportKind {
    pub fn bincode() -> Self {
        Self::Bincode {
            max_buf_size: DEFAULT_MAX_BUF_SIZE,
        }
    }

    fn connect<F: MpcField>(self, num_parties: usize) -> Vec<PartyChannels<MpcMessage<F>>> {
        match self {
            Self::Local => transport::local_router(num_parties),
            Self::Delayed(latency) => transport::delayed_router(num_parties, latency),
            Self::Bincode { max_buf_size } => transport::bincode_router(num_parties, max_buf_size),
        }
    }
}

/// Runs the same program on all parties of an in-process computation.
/// Every party gets its own executor and a [`FakeDealer`] seeded identically.
#[derive(Clone, Debug)]
pub struct ProgramRunner {
    config: MpcConfig,
    transport: TransportKind,
    seed: u64,
    crashed: BTreeSet<usize>,
}

impl ProgramRunner {
    /// Create runner for validated configuration.
    pub fn new(config: MpcConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            transport: TransportKind::Local,
            seed: 0,
            crashed: BTreeSet::new(),
        })
    }

    pub fn config(&self) -> &MpcConfig {
        &self.config
    }

    /// Deliver every message after given latency.
    pub fn with_latency(self, latency: Duration) -> Self {
        self.with_transport(TransportKind::Delayed(latency))
    }

    pub fn with_transport(mut self, transport: TransportKind) -> Self {
        self.transport = transport;
        self
    }

    /// Seed of dealers' randomness.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Parties that never start. Their messages are never sent.
    pub fn with_crashed(mut self, crashed: impl IntoIterator<Item = usize>) -> Self {
        self.crashed = crashed.into_iter().collect();
        self
    }

    /// Run program on every party that did not crash, concurrently on the current task.
    /// Returns `(party_id, result)` of those parties in ID order.
    ///
    /// Requires tokio runtime for delayed and bincode transports. Never completes if a party
    /// waits for values that too many crashed parties never sent; wrap in a timeout then.
    pub async fn run<F, T, P>(&self, program: P) -> Result<Vec<(usize, Result<T, MpcError>)>, ConfigError>
    where
        F: MpcField,
        P: for<'a> Fn(&'a MpcExecutor<F>) -> LocalBoxFuture<'a, Result<T, MpcError>>,
    {
        let points = self.config.points::<F>()?;
        let threshold = self.config.threshold;

        let executors: Vec<_> = self
            .transport
            .connect::<F>(self.config.num_parties)
            .into_iter()
            .enumerate()
            .filter(|(party_id, _)| !self.crashed.contains(party_id))
            .map(|(party_id, channels)| {
                let dealer = FakeDealer::new(points.clone(), threshold, party_id, self.seed);
                let executor = MpcExecutor::new(threshold, points.clone(), channels, Box::new(dealer));
                (party_id, executor)
            })
            .collect();
        debug!(
            parties = executors.len(),
            crashed = ?self.crashed,
            "Starting parties"
        );

        let program = &program;
        Ok(future::join_all(executors.into_iter().map(|(party_id, executor)| async move {
            let result = match executor {
                Ok(executor) => executor.run(|ctx| program(ctx)).await,
                Err(err) => Err(err),
            };
            (party_id, result)
        }))
        .await)
    }
}
