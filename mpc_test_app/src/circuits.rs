use robust_mpc::{
    circuits::{dot_product, product},
    executor::{MpcError, MpcExecutor},
    join_circuits,
    share::ShareArray,
    MpcContext, MpcField,
};

/// Values revealed by [`demo_circuit`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DemoOutput<F> {
    /// Element-wise products, opened with batch reconstruction.
    pub products: Vec<F>,
    pub dot_product: F,
    pub factorial: F,
}

impl<F: MpcField> DemoOutput<F> {
    /// Output computed in the clear for inputs of given size.
    pub fn expected(size: usize) -> Self {
        let (a, b) = inputs::<F>(size);
        let products: Vec<_> = a.iter().zip(&b).map(|(&x, &y)| x * y).collect();
        Self {
            dot_product: products.iter().fold(F::zero(), |acc, &x| acc + x),
            factorial: a.iter().fold(F::one(), |acc, &x| acc * x),
            products,
        }
    }
}

/// Public inputs [1, ..., size] and [size, ..., 1].
fn inputs<F: MpcField>(size: usize) -> (Vec<F>, Vec<F>) {
    let a = (1..=size as u64).map(F::from).collect();
    let b = (1..=size as u64).rev().map(F::from).collect();
    (a, b)
}

/// Multiply, reduce and reveal shared vectors.
/// A corrupt party adds garbage to every share it contributes to the batch opening,
/// which honest parties must correct.
pub async fn demo_circuit<F: MpcField>(
    ctx: &MpcExecutor<F>,
    size: usize,
    corrupt: bool,
) -> Result<DemoOutput<F>, MpcError> {
    let (a, b) = inputs(size);
    let a = ShareArray::from_plain(a);
    let b = ShareArray::from_plain(b);

    // Randomize sharings, so that every party holds a distinct share.
    let masks: ShareArray<F> = (0..size)
        .map(|_| ctx.get_zero())
        .collect::<Result<Vec<_>, _>>()
        .map(ShareArray::new)?;
    let a = a.try_add(&masks)?;

    let (products, dot, factorial) = join_circuits!(
        a.mul(ctx, &b),
        dot_product(ctx, &a, &b),
        product(ctx, a.clone()),
    );
    let mut products = products?;
    if corrupt {
        products = products + F::from(ctx.party_id() as u64 + 1);
    }

    let (products, dot_product, factorial) =
        join_circuits!(products.open(ctx)?, ctx.open(dot?), ctx.open(factorial?));
    let mut products = products?;
    products.truncate(size);

    Ok(DemoOutput {
        products,
        dot_product: dot_product?,
        factorial: factorial?,
    })
}
