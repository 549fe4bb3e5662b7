use std::time::Duration;

use futures::future;
use robust_mpc::{
    batch_reconstruction::{BatchReconstructionError, DesyncError, Round},
    circuits::{dot_product, product},
    config::MpcConfig,
    dealer::FakeDealer,
    executor::{MpcError, MpcExecutor, MpcMessage},
    fields::{Bls12Scalar, Mersenne61},
    polynomial::{EvalPointScheme, EvalPoints},
    runner::{ProgramRunner, TransportKind},
    robust_reconstruction::ReconstructionError,
    share::{Share, ShareArray},
    transport::local_router,
    MpcContext,
};

type Fp = Mersenne61;

fn plain_array(values: &[u64]) -> ShareArray<Fp> {
    ShareArray::from_plain(values.iter().map(|&x| Fp::from(x)))
}

fn expect_all<T: PartialEq + std::fmt::Debug>(results: Vec<(usize, Result<T, MpcError>)>, expected: T) {
    assert!(!results.is_empty());
    for (id, result) in results {
        assert_eq!(result.as_ref(), Ok(&expected), "party {}", id);
    }
}

#[tokio::test]
async fn test_open_waits_for_threshold_plus_one_senders() {
    let n = 4;
    let mut channels = local_router(n);
    let points = EvalPoints::<Fp>::sequential(n);
    let dealer = FakeDealer::new(points.clone(), 1, 0, 0);
    let others = channels.split_off(1);
    let executor = MpcExecutor::new(1, points, channels.remove(0), Box::new(dealer)).unwrap();

    // Shares of 10 + 3x: party 0 holds 13, party 1 holds 16.
    others[0]
        .outbox
        .send(
            0,
            MpcMessage::Open {
                share_id: 0,
                value: Fp::from(16),
            },
        )
        .unwrap();

    let result = executor
        .run(|ctx| {
            Box::pin(async move {
                let mut opening = ctx.open(Share::from_raw(Fp::from(13)));
                assert_eq!(opening.share_id(), 0);
                assert!(futures::poll!(&mut opening).is_pending());
                opening.await
            })
        })
        .await;
    assert_eq!(result, Ok(Fp::from(10)));
}

#[tokio::test]
async fn test_duplicate_share_is_desync() {
    let n = 4;
    let mut channels = local_router(n);
    let points = EvalPoints::<Fp>::sequential(n);
    let dealer = FakeDealer::new(points.clone(), 1, 0, 0);
    let others = channels.split_off(1);
    let executor = MpcExecutor::new(1, points, channels.remove(0), Box::new(dealer)).unwrap();

    for _ in 0..2 {
        let msg = MpcMessage::Open {
            share_id: 0,
            value: Fp::from(1),
        };
        others[1].outbox.send(0, msg).unwrap();
    }

    let result = executor
        .run(|_| Box::pin(future::pending::<Result<(), MpcError>>()))
        .await;
    assert_eq!(
        result,
        Err(MpcError::ProtocolDesync(DesyncError::DuplicateShare {
            sender: 2,
            share_id: 0,
            expected: 1,
        }))
    );
}

#[tokio::test]
async fn test_batch_open_pads_with_last_element() {
    let runner = ProgramRunner::new(MpcConfig::new(4, 1)).unwrap();
    let results = runner
        .run(|ctx| Box::pin(async move { plain_array(&[5, 6, 7]).open(ctx)?.await }))
        .await
        .unwrap();
    expect_all(results, [5, 6, 7, 7].map(Fp::from).to_vec());
}

#[tokio::test]
async fn test_batch_open_too_short_fails_before_sending() {
    let runner = ProgramRunner::new(MpcConfig::new(7, 2)).unwrap();
    let results = runner
        .run(|ctx| {
            Box::pin(async move {
                let opened = plain_array(&[1, 2]).open(ctx).map(|_| ());
                // Nothing was sent, so the next batch is still job 0 on every party.
                let next = plain_array(&[3, 4, 5]).open(ctx)?.await?;
                Ok::<_, MpcError>((opened, next))
            })
        })
        .await
        .unwrap();
    expect_all(
        results,
        (
            Err(MpcError::NotEnoughShares { len: 2, required: 3 }),
            [3, 4, 5].map(Fp::from).to_vec(),
        ),
    );
}

#[tokio::test]
async fn test_beaver_multiplication() {
    let runner = ProgramRunner::new(MpcConfig::new(4, 1)).unwrap().with_seed(3);
    let results = runner
        .run(|ctx| {
            Box::pin(async move {
                let x = Share::from_plain(Fp::from(6));
                let r = ctx.get_rand()?;
                let z = x.mul(ctx, r).await?;
                let z2 = r.mul(ctx, r).await?;
                let (r, z, z2) = futures::try_join!(ctx.open(r), ctx.open(z), ctx.open(z2))?;
                Ok::<_, MpcError>(z == r * Fp::from(6) && z2 == r * r)
            })
        })
        .await
        .unwrap();
    expect_all(results, true);
}

#[tokio::test]
async fn test_array_multiplication_individual_openings() {
    // 2 masked values do not fill a batch of t+1 = 3, so they are opened one by one.
    let runner = ProgramRunner::new(MpcConfig::new(7, 2)).unwrap();
    let results = runner
        .run(|ctx| {
            Box::pin(async move {
                let z = plain_array(&[9]).mul(ctx, &plain_array(&[11])).await?;
                ctx.open(z.as_slice()[0]).await
            })
        })
        .await
        .unwrap();
    expect_all(results, Fp::from(99));
}

#[tokio::test]
async fn test_circuits() {
    let runner = ProgramRunner::new(MpcConfig::new(4, 1))
        .unwrap()
        .with_latency(Duration::from_millis(1));
    let results = runner
        .run(|ctx| {
            Box::pin(async move {
                let a = plain_array(&[1, 2, 3]);
                let b = plain_array(&[4, 5, 6]);
                let dot = dot_product(ctx, &a, &b).await?;
                let prod = product(ctx, plain_array(&[2, 3, 4, 5, 6])).await?;
                let (dot, prod) = future::try_join(ctx.open(dot), ctx.open(prod)).await?;
                Ok::<_, MpcError>((dot, prod))
            })
        })
        .await
        .unwrap();
    expect_all(results, (Fp::from(32), Fp::from(720)));
}

#[tokio::test]
async fn test_corrupt_party_over_bincode_transport() {
    let runner = ProgramRunner::new(MpcConfig::new(4, 1))
        .unwrap()
        .with_transport(TransportKind::bincode());
    let results = runner
        .run(|ctx| {
            Box::pin(async move {
                let mut values = plain_array(&[10, 20, 30, 40]);
                if ctx.party_id() == 2 {
                    values = values + Fp::from(1000);
                }
                values.open(ctx)?.await
            })
        })
        .await
        .unwrap();

    for (id, result) in results {
        if id != 2 {
            assert_eq!(result, Ok([10, 20, 30, 40].map(Fp::from).to_vec()));
        }
    }
}

#[tokio::test]
async fn test_two_corrupt_parties_fail_batch_open() {
    let runner = ProgramRunner::new(MpcConfig::new(4, 1))
        .unwrap()
        .with_transport(TransportKind::bincode());
    let results = runner
        .run(|ctx| {
            Box::pin(async move {
                let mut values = plain_array(&[10, 20]);
                match ctx.party_id() {
                    2 => values = values + Fp::from(1000),
                    3 => values = values + Fp::from(5000),
                    _ => {}
                }
                values.open(ctx)?.await
            })
        })
        .await
        .unwrap();

    let expected = MpcError::BatchReconstructionFailed(BatchReconstructionError::ReconstructionFailed {
        round: Round::R1,
        source: ReconstructionError::FaultBoundExceeded { n: 4, t: 1 },
    });
    for (id, result) in results {
        if id < 2 {
            assert_eq!(result, Err(expected.clone()), "party {}", id);
        }
    }
}

#[tokio::test]
async fn test_crashed_party_with_latency() {
    let runner = ProgramRunner::new(MpcConfig::new(4, 1))
        .unwrap()
        .with_latency(Duration::from_millis(2))
        .with_crashed([1]);
    let results = runner
        .run(|ctx: &MpcExecutor<Fp>| {
            Box::pin(async move {
                let x = ctx.get_rand()?;
                let y = ctx.get_rand()?;
                let values = ShareArray::new(vec![x, y, x + y]);
                let opened = values.open(ctx)?.await?;
                Ok::<_, MpcError>(opened[0] + opened[1] == opened[2])
            })
        })
        .await
        .unwrap();
    assert_eq!(results.len(), 3);
    expect_all(results, true);
}

#[tokio::test]
async fn test_roots_of_unity_points() {
    let config = MpcConfig::new(4, 1).with_eval_points(EvalPointScheme::RootsOfUnity);
    let runner = ProgramRunner::new(config).unwrap().with_seed(11);
    let results = runner
        .run(|ctx: &MpcExecutor<Bls12Scalar>| {
            Box::pin(async move {
                let values = ShareArray::new(vec![ctx.get_bit()?, ctx.get_zero()?]);
                values.open(ctx)?.await
            })
        })
        .await
        .unwrap();

    let (_, first) = &results[0];
    let opened = first.clone().unwrap();
    assert!(opened[0] == Bls12Scalar::from(0) || opened[0] == Bls12Scalar::from(1));
    assert_eq!(opened[1], Bls12Scalar::from(0));
    expect_all(results, opened);
}
