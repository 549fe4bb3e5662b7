use async_trait::async_trait;
use futures::future;
use itertools::Itertools;

use crate::{
    executor::{MpcError, MpcExecutor},
    share::{Share, ShareArray},
    MpcContext, MpcField,
};

/// Pluggable multiplication protocol of the executor.
#[async_trait(?Send)]
pub trait MultiplicationMixin<F: MpcField> {
    /// Multiply two shared values.
    async fn multiply(
        &self,
        ctx: &MpcExecutor<F>,
        x: Share<F>,
        y: Share<F>,
    ) -> Result<Share<F>, MpcError>;

    /// Multiply equal-length arrays of shared values element-wise.
    async fn multiply_arrays(
        &self,
        ctx: &MpcExecutor<F>,
        x: &ShareArray<F>,
        y: &ShareArray<F>,
    ) -> Result<ShareArray<F>, MpcError>;
}

/// Multiplication with Beaver triples.
/// Cost: 1 Beaver triple and 2 openings per product, 1 communication round.
#[derive(Copy, Clone, Debug, Default)]
pub struct BeaverMultiply;

/// Combine triple (a, b, ab) with opened d = x - a and e = y - b into share of xy.
fn beaver_product<F: MpcField>(triple: (Share<F>, Share<F>, Share<F>), d: F, e: F) -> Share<F> {
    let (a, b, ab) = triple;
    ab + b * d + a * e + d * e
}

#[async_trait(?Send)]
impl<F: MpcField> MultiplicationMixin<F> for BeaverMultiply {
    async fn multiply(
        &self,
        ctx: &MpcExecutor<F>,
        x: Share<F>,
        y: Share<F>,
    ) -> Result<Share<F>, MpcError> {
        let triple = ctx.get_triple()?;
        let (a, b, _) = triple;
        let (d, e) = future::try_join(ctx.open(x - a), ctx.open(y - b)).await?;
        Ok(beaver_product(triple, d, e))
    }

    async fn multiply_arrays(
        &self,
        ctx: &MpcExecutor<F>,
        x: &ShareArray<F>,
        y: &ShareArray<F>,
    ) -> Result<ShareArray<F>, MpcError> {
        if x.len() != y.len() {
            return Err(MpcError::LengthMismatch {
                left: x.len(),
                right: y.len(),
            });
        }

        let triples: Vec<_> = (0..x.len())
            .map(|_| ctx.get_triple())
            .collect::<Result<_, _>>()?;
        let (ds, es): (Vec<_>, Vec<_>) = triples
            .iter()
            .zip(x.iter().zip(y.iter()))
            .map(|(&(a, b, _), (xi, yi))| (xi - a, yi - b))
            .unzip();
        let masked: ShareArray<F> = ds.into_iter().chain(es).collect();

        // Small batches cannot fill a batch reconstruction, open them one by one.
        let opened = if masked.len() > ctx.threshold() {
            masked.open(ctx)?.await?
        } else {
            let openings: Vec<_> = masked.iter().map(|share| ctx.open(share)).collect();
            future::try_join_all(openings).await?
        };

        let (ds, es) = opened[..2 * x.len()].split_at(x.len());
        Ok(triples
            .into_iter()
            .zip_eq(ds.iter().zip(es))
            .map(|(triple, (&d, &e))| beaver_product(triple, d, e))
            .collect())
    }
}
