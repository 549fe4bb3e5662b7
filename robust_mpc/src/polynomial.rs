use std::{
    fmt,
    ops::{Add, Mul, Neg, Sub},
};

use ff::PrimeField;
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Dense univariate polynomial, coefficients stored lowest degree first.
/// Trailing zero coefficients are always trimmed, so the zero polynomial has no coefficients.
#[derive(Clone, PartialEq, Eq)]
pub struct Polynomial<F> {
    coeffs: Vec<F>,
}

impl<F: PrimeField> Polynomial<F> {
    /// Create polynomial from coefficients, lowest degree first.
    pub fn new(coeffs: Vec<F>) -> Self {
        let mut poly = Self { coeffs };
        poly.trim();
        poly
    }

    /// The zero polynomial.
    pub fn zero() -> Self {
        Self { coeffs: Vec::new() }
    }

    /// Constant polynomial.
    pub fn constant(c: F) -> Self {
        Self::new(vec![c])
    }

    /// Monic polynomial with given roots, i.e. (x - r_1)(x - r_2)...(x - r_m).
    pub fn from_roots(roots: &[F]) -> Self {
        let mut coeffs = vec![F::one()];
        for &root in roots {
            // Multiply by (x - root) in place.
            coeffs.push(F::zero());
            for i in (1..coeffs.len()).rev() {
                coeffs[i] = coeffs[i - 1] - coeffs[i] * root;
            }
            coeffs[0] = -(coeffs[0] * root);
        }
        Self::new(coeffs)
    }

    /// Random polynomial of given degree with fixed constant term.
    pub fn random(degree: usize, constant: F, rng: &mut impl Rng) -> Self {
        let coeffs = std::iter::once(constant)
            .chain((0..degree).map(|_| F::random(&mut *rng)))
            .collect();
        Self::new(coeffs)
    }

    fn trim(&mut self) {
        while matches!(self.coeffs.last(), Some(c) if bool::from(c.is_zero())) {
            self.coeffs.pop();
        }
    }

    /// Whether this is the zero polynomial.
    pub fn is_zero(&self) -> bool {
        self.coeffs.is_empty()
    }

    /// Degree of polynomial. The zero polynomial reports degree 0; use `is_zero` to tell it apart.
    pub fn degree(&self) -> usize {
        self.coeffs.len().saturating_sub(1)
    }

    /// Coefficients, lowest degree first, without trailing zeros.
    pub fn coefficients(&self) -> &[F] {
        &self.coeffs
    }

    pub fn into_coefficients(self) -> Vec<F> {
        self.coeffs
    }

    fn leading_coefficient(&self) -> Option<F> {
        self.coeffs.last().copied()
    }

    /// Evaluate at given point.
    pub fn evaluate(&self, x: F) -> F {
        self.coeffs
            .iter()
            .rev()
            .fold(F::zero(), |acc, &coeff| acc * x + coeff)
    }

    /// Unique polynomial of degree < m passing through m points with distinct x coordinates.
    /// Callers pass points drawn from [`EvalPoints`], which are distinct.
    pub fn interpolate(points: &[(F, F)]) -> Self {
        let xs: Vec<F> = points.iter().map(|&(x, _)| x).collect();
        let master = Self::from_roots(&xs);
        let mut coeffs = vec![F::zero(); points.len()];

        for &(xi, yi) in points {
            // Lagrange basis numerator: master / (x - xi).
            let basis = master.div_by_linear(xi);
            let denominator = basis.evaluate(xi);
            let scale = yi * Option::<F>::from(denominator.invert()).unwrap_or_else(F::zero);
            for (acc, &c) in coeffs.iter_mut().zip(basis.coeffs.iter()) {
                *acc += c * scale;
            }
        }

        Self::new(coeffs)
    }

    /// Value at `at` of the polynomial passing through given points, without building it.
    pub fn interpolate_at(points: &[(F, F)], at: F) -> F {
        points
            .iter()
            .enumerate()
            .fold(F::zero(), |acc, (i, &(xi, yi))| {
                let (num, den) = points.iter().enumerate().filter(|&(j, _)| j != i).fold(
                    (F::one(), F::one()),
                    |(num, den), (_, &(xj, _))| (num * (at - xj), den * (xi - xj)),
                );
                let inv = Option::<F>::from(den.invert()).unwrap_or_else(F::zero);
                acc + yi * num * inv
            })
    }

    /// Synthetic division by (x - root), discarding the remainder.
    fn div_by_linear(&self, root: F) -> Self {
        if self.coeffs.len() < 2 {
            return Self::zero();
        }
        let mut quotient = vec![F::zero(); self.coeffs.len() - 1];
        let mut carry = F::zero();
        for i in (1..self.coeffs.len()).rev() {
            carry = self.coeffs[i] + carry * root;
            quotient[i - 1] = carry;
        }
        Self::new(quotient)
    }

    /// Polynomial long division. Returns None if divisor is zero.
    pub fn div_rem(&self, divisor: &Self) -> Option<(Self, Self)> {
        let lead_inv = Option::<F>::from(divisor.leading_coefficient()?.invert())?;

        if self.coeffs.len() < divisor.coeffs.len() {
            return Some((Self::zero(), self.clone()));
        }

        let shift = self.coeffs.len() - divisor.coeffs.len();
        let mut remainder = self.coeffs.clone();
        let mut quotient = vec![F::zero(); shift + 1];

        for i in (0..=shift).rev() {
            let factor = remainder[i + divisor.coeffs.len() - 1] * lead_inv;
            quotient[i] = factor;
            for (j, &d) in divisor.coeffs.iter().enumerate() {
                remainder[i + j] -= factor * d;
            }
        }

        remainder.truncate(divisor.coeffs.len() - 1);
        Some((Self::new(quotient), Self::new(remainder)))
    }
}

impl<F: PrimeField> fmt::Debug for Polynomial<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Polynomial").field(&self.coeffs).finish()
    }
}

impl<'a, F: PrimeField> Add<&'a Polynomial<F>> for &'a Polynomial<F> {
    type Output = Polynomial<F>;
    fn add(self, rhs: &'a Polynomial<F>) -> Self::Output {
        let len = self.coeffs.len().max(rhs.coeffs.len());
        let coeffs = (0..len)
            .map(|i| {
                let a = self.coeffs.get(i).copied().unwrap_or_else(F::zero);
                let b = rhs.coeffs.get(i).copied().unwrap_or_else(F::zero);
                a + b
            })
            .collect();
        Polynomial::new(coeffs)
    }
}

impl<'a, F: PrimeField> Neg for &'a Polynomial<F> {
    type Output = Polynomial<F>;
    fn neg(self) -> Self::Output {
        Polynomial::new(self.coeffs.iter().map(|&c| -c).collect())
    }
}

impl<'a, F: PrimeField> Sub<&'a Polynomial<F>> for &'a Polynomial<F> {
    type Output = Polynomial<F>;
    fn sub(self, rhs: &'a Polynomial<F>) -> Self::Output {
        self + &(-rhs)
    }
}

impl<'a, F: PrimeField> Mul<&'a Polynomial<F>> for &'a Polynomial<F> {
    type Output = Polynomial<F>;
    fn mul(self, rhs: &'a Polynomial<F>) -> Self::Output {
        if self.is_zero() || rhs.is_zero() {
            return Polynomial::zero();
        }
        let mut coeffs = vec![F::zero(); self.coeffs.len() + rhs.coeffs.len() - 1];
        for (i, &a) in self.coeffs.iter().enumerate() {
            for (j, &b) in rhs.coeffs.iter().enumerate() {
                coeffs[i + j] += a * b;
            }
        }
        Polynomial::new(coeffs)
    }
}

impl<'a, F: PrimeField> Mul<F> for &'a Polynomial<F> {
    type Output = Polynomial<F>;
    fn mul(self, rhs: F) -> Self::Output {
        Polynomial::new(self.coeffs.iter().map(|&c| c * rhs).collect())
    }
}

/// Error while building evaluation points.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EvalPointsError {
    #[error("field has no primitive root of unity of order {0}")]
    NoRootOfUnity(usize),
    #[error("evaluation point of party {0} repeats an earlier one")]
    DuplicatePoint(usize),
}

/// Scheme assigning public evaluation points to parties.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvalPointScheme {
    /// Party i evaluates at i+1.
    #[default]
    Sequential,
    /// Party i evaluates at w^i, where w is a primitive n-th root of unity.
    RootsOfUnity,
}

/// Public evaluation points of all n parties.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EvalPoints<F> {
    points: Vec<F>,
}

impl<F: PrimeField> EvalPoints<F> {
    /// Build evaluation points for `n` parties according to scheme.
    pub fn new(scheme: EvalPointScheme, n: usize) -> Result<Self, EvalPointsError> {
        match scheme {
            EvalPointScheme::Sequential => Ok(Self::sequential(n)),
            EvalPointScheme::RootsOfUnity => Self::roots_of_unity(n),
        }
    }

    /// Points 1, 2, ..., n.
    pub fn sequential(n: usize) -> Self {
        Self {
            points: (1..=n as u64).map(F::from).collect(),
        }
    }

    /// Points w^0, w^1, ..., w^(n-1) for a primitive n-th root of unity w.
    /// Requires n to be a power of two not exceeding the field's 2-adic order.
    pub fn roots_of_unity(n: usize) -> Result<Self, EvalPointsError> {
        let omega = primitive_root_of_unity::<F>(n).ok_or(EvalPointsError::NoRootOfUnity(n))?;
        let points = std::iter::successors(Some(F::one()), |&p| Some(p * omega))
            .take(n)
            .collect();
        Ok(Self { points })
    }

    /// Use explicitly given points. Fails if two parties share a point,
    /// since interpolation through them would be undefined.
    pub fn from_points(points: Vec<F>) -> Result<Self, EvalPointsError> {
        for (i, x) in points.iter().enumerate() {
            if points[..i].contains(x) {
                return Err(EvalPointsError::DuplicatePoint(i));
            }
        }
        Ok(Self { points })
    }

    /// Evaluation point of party `i`.
    pub fn get(&self, i: usize) -> F {
        self.points[i]
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn as_slice(&self) -> &[F] {
        &self.points
    }
}

/// Primitive root of unity of order `n`, for `n` a power of two up to 2^S.
pub fn primitive_root_of_unity<F: PrimeField>(n: usize) -> Option<F> {
    if n == 0 || !n.is_power_of_two() {
        return None;
    }
    let log_n = n.trailing_zeros();
    if log_n > F::S {
        return None;
    }
    // root_of_unity() has order 2^S; squaring S - log_n times leaves order n.
    Some((log_n..F::S).fold(F::root_of_unity(), |acc, _| acc.square()))
}
