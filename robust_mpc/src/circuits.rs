use std::{future::Future, task::Poll};

use futures::future;
use itertools::Itertools;

use crate::{
    executor::{MpcError, MpcExecutor},
    share::{Share, ShareArray},
    MpcField,
};

pub use futures; // Reexport futures crate for join_circuits! macro.

/// Wait on multiple concurrent branches, returning when **all** branches complete.
/// Branches are polled in the order they are listed, so openings issued by them get
/// the same share IDs on every party.
#[macro_export]
macro_rules! join_circuits {
    ($($tokens:tt)*) => {{
        $crate::circuits::futures::join!($( $tokens )*)
    }}
}

/// Wait on all futures, polling them in iteration order on every wakeup.
/// Returns outputs in the same order.
pub async fn join_circuits_all<I>(iter: I) -> Vec<<I::Item as Future>::Output>
where
    I: IntoIterator,
    I::Item: Future,
{
    let mut pending: Vec<_> = iter.into_iter().map(|fut| Some(Box::pin(fut))).collect();
    let mut outputs: Vec<_> = pending.iter().map(|_| None).collect();

    future::poll_fn(|cx| {
        let mut done = true;
        for (slot, output) in pending.iter_mut().zip(outputs.iter_mut()) {
            if let Some(fut) = slot {
                match fut.as_mut().poll(cx) {
                    Poll::Ready(value) => {
                        *output = Some(value);
                        *slot = None;
                    }
                    Poll::Pending => done = false,
                }
            }
        }
        if done {
            Poll::Ready(())
        } else {
            Poll::Pending
        }
    })
    .await;

    outputs.into_iter().flatten().collect()
}

/// Like [`join_circuits_all`], but fails as soon as any future fails.
pub async fn try_join_circuits_all<I, T, E>(iter: I) -> Result<Vec<T>, E>
where
    I: IntoIterator,
    I::Item: Future<Output = Result<T, E>>,
{
    let mut pending: Vec<_> = iter.into_iter().map(|fut| Some(Box::pin(fut))).collect();
    let mut outputs: Vec<_> = pending.iter().map(|_| None).collect();

    future::poll_fn(|cx| {
        let mut done = true;
        for (slot, output) in pending.iter_mut().zip(outputs.iter_mut()) {
            if let Some(fut) = slot {
                match fut.as_mut().poll(cx) {
                    Poll::Ready(Ok(value)) => {
                        *output = Some(value);
                        *slot = None;
                    }
                    Poll::Ready(Err(err)) => return Poll::Ready(Err(err)),
                    Poll::Pending => done = false,
                }
            }
        }
        if done {
            Poll::Ready(Ok(()))
        } else {
            Poll::Pending
        }
    })
    .await?;

    Ok(outputs.into_iter().flatten().collect())
}

/// Single element or pair of elements of the same type.
enum SingleOrPair<T> {
    Single(T),
    Pair(T, T),
}

/// Batch iterator into pairs and maybe a leftover single element.
fn batch_pairs<T>(it: impl IntoIterator<Item = T>) -> impl Iterator<Item = SingleOrPair<T>> {
    it.into_iter().batching(|it| {
        it.next().map(|first| match it.next() {
            Some(second) => SingleOrPair::Pair(first, second),
            None => SingleOrPair::Single(first),
        })
    })
}

/// Aggregate elements by combining distinct pairs in log_2(n) rounds.
pub async fn fold_tree<T, E, F, Fut>(
    iter: impl IntoIterator<Item = T>,
    default: T,
    combine_fn: F,
) -> Result<T, E>
where
    F: Copy + Fn(T, T) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut elems: Vec<_> = iter.into_iter().collect();

    while elems.len() > 1 {
        elems = try_join_circuits_all(batch_pairs(elems).map(|p| async move {
            match p {
                SingleOrPair::Single(value) => Ok(value),
                SingleOrPair::Pair(first, second) => combine_fn(first, second).await,
            }
        }))
        .await?;
    }

    Ok(elems.into_iter().next().unwrap_or(default))
}

/// Compute product of given sequence of shares.
/// Cost: n-1 multiplications, log_2(n) communication rounds, where n is sequence length.
pub async fn product<F: MpcField>(
    ctx: &MpcExecutor<F>,
    elems: impl IntoIterator<Item = Share<F>>,
) -> Result<Share<F>, MpcError> {
    fold_tree(elems, Share::from_plain(F::one()), |a, b| a.mul(ctx, b)).await
}

/// Compute inner product of equal-length share arrays.
/// Cost: n multiplications, 1 communication round.
pub async fn dot_product<F: MpcField>(
    ctx: &MpcExecutor<F>,
    a: &ShareArray<F>,
    b: &ShareArray<F>,
) -> Result<Share<F>, MpcError> {
    let products = a.mul(ctx, b).await?;
    Ok(products
        .into_iter()
        .fold(Share::from_plain(F::zero()), |acc, x| acc + x))
}
