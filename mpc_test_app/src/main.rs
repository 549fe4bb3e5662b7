use std::{collections::BTreeSet, path::PathBuf, str::FromStr, time::Duration};

use anyhow::{bail, ensure, Context};
use argh::FromArgs;
use itertools::Itertools;
use robust_mpc::{
    config::MpcConfig,
    fields::Mersenne127,
    runner::{ProgramRunner, TransportKind},
    MpcContext,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod circuits;

use circuits::{demo_circuit, DemoOutput};

type Fp = Mersenne127;

/// Transport connecting parties.
enum TransportOption {
    Local,
    Bincode,
}

impl FromStr for TransportOption {
    type Err = &'static str;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "local" => Ok(TransportOption::Local),
            "bincode" => Ok(TransportOption::Bincode),
            _ => Err("Unsupported transport. Available options: local, bincode"),
        }
    }
}

#[derive(FromArgs)]
/// Runs demo computation on in-process parties, optionally with crashed and corrupt ones.
struct Options {
    /// number of parties participating in protocol
    #[argh(option, default = "4")]
    parties: usize,

    /// maximum number of faulty parties (defaults to largest one tolerated)
    #[argh(option)]
    threshold: Option<usize>,

    /// JSON configuration file, overrides --parties and --threshold
    #[argh(option)]
    config: Option<PathBuf>,

    /// length of input vectors
    #[argh(option, default = "8")]
    size: usize,

    /// delay of every message in milliseconds (local transport only)
    #[argh(option, default = "0")]
    latency_ms: u64,

    /// seed of preprocessing randomness
    #[argh(option, default = "123")]
    seed: u64,

    /// ID of party that never starts (repeatable)
    #[argh(option)]
    crashed: Vec<usize>,

    /// ID of party that sends garbage shares (repeatable)
    #[argh(option)]
    corrupt: Vec<usize>,

    /// abort computation after given number of milliseconds
    #[argh(option, default = "10000")]
    timeout_ms: u64,

    /// transport between parties: local or bincode
    #[argh(option, default = "TransportOption::Local")]
    transport: TransportOption,
}

impl Options {
    fn mpc_config(&self) -> anyhow::Result<MpcConfig> {
        match &self.config {
            Some(path) => MpcConfig::load(path)
                .with_context(|| format!("Cannot load configuration from {}", path.display())),
            None => {
                let threshold = self
                    .threshold
                    .unwrap_or_else(|| MpcConfig::max_threshold(self.parties));
                Ok(MpcConfig::new(self.parties, threshold))
            }
        }
    }

    fn transport(&self) -> anyhow::Result<TransportKind> {
        match (&self.transport, self.latency_ms) {
            (TransportOption::Local, 0) => Ok(TransportKind::Local),
            (TransportOption::Local, ms) => Ok(TransportKind::Delayed(Duration::from_millis(ms))),
            (TransportOption::Bincode, 0) => Ok(TransportKind::bincode()),
            (TransportOption::Bincode, _) => bail!("--latency-ms is not supported by bincode transport"),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let options: Options = argh::from_env();
    let config = options.mpc_config()?;
    ensure!(
        options.size > config.threshold,
        "Input size {} cannot fill a batch of {} shares",
        options.size,
        config.threshold + 1
    );

    let crashed: BTreeSet<_> = options.crashed.iter().copied().collect();
    let corrupt: BTreeSet<_> = options.corrupt.iter().copied().collect();
    let faulty = crashed.union(&corrupt).count();
    if faulty > config.threshold {
        warn!(
            faulty,
            threshold = config.threshold,
            "More faulty parties than tolerated, computation may not finish"
        );
    }

    info!(
        parties = config.num_parties,
        threshold = config.threshold,
        ?crashed,
        ?corrupt,
        "Running demo circuit"
    );
    let runner = ProgramRunner::new(config)?
        .with_transport(options.transport()?)
        .with_seed(options.seed)
        .with_crashed(crashed.iter().copied());

    let size = options.size;
    let computation = runner.run::<Fp, _, _>(|ctx| {
        let is_corrupt = corrupt.contains(&ctx.party_id());
        Box::pin(demo_circuit(ctx, size, is_corrupt))
    });
    let results = tokio::time::timeout(Duration::from_millis(options.timeout_ms), computation)
        .await
        .context("Computation timed out")??;

    let mut outputs = Vec::new();
    for (party_id, result) in results {
        if corrupt.contains(&party_id) {
            continue;
        }
        let output = result.with_context(|| format!("Party {party_id} failed"))?;
        outputs.push(output);
    }

    ensure!(outputs.iter().all_equal(), "Honest parties disagree on output");
    let expected = DemoOutput::<Fp>::expected(size);
    match outputs.first() {
        Some(output) if *output == expected => println!("{output:?}"),
        Some(output) => bail!("Wrong output {output:?}, expected {expected:?}"),
        None => bail!("No honest party finished"),
    }
    Ok(())
}
