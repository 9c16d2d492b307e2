//! Log-sum-exp semiring.

use super::semiring::{Semiring, SemiringKind};
use super::Scalar;

/// Log-sum-exp semiring `(logsumexp, +)`.
///
/// Operations:
/// - Addition (⊕): `log(exp(a) + exp(b))`, evaluated stably
/// - Multiplication (⊗): `a + b`
/// - Zero: `-∞`
/// - One: `0`
///
/// Values are log-domain weights; `sum` over a slice is the log of the
/// total probability mass, and `dsum` is its softmax.
///
/// # Example
///
/// ```rust
/// use seqring::algebra::{Log, Semiring};
///
/// let half = Log(0.5f64.ln());
/// // log(0.5 + 0.5) = 0
/// assert!(half.add(half).to_scalar().abs() < 1e-12);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
#[repr(transparent)]
pub struct Log<T: Scalar>(pub T);

impl<T: Scalar> Semiring for Log<T> {
    type Scalar = T;

    #[inline]
    fn zero() -> Self {
        Log(T::neg_infinity())
    }

    #[inline]
    fn one() -> Self {
        Log(T::zero())
    }

    #[inline]
    fn add(self, rhs: Self) -> Self {
        // logsumexp of two values; the -∞ guards keep zero an identity
        // instead of poisoning the result with NaN.
        if self.0 == T::neg_infinity() {
            return rhs;
        }
        if rhs.0 == T::neg_infinity() {
            return self;
        }
        let (hi, lo) = if self.0 >= rhs.0 {
            (self.0, rhs.0)
        } else {
            (rhs.0, self.0)
        };
        Log(hi + (lo - hi).exp().ln_1p())
    }

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Log(self.0 + rhs.0)
    }

    #[inline]
    fn div(self, rhs: Self) -> Self {
        Log(self.0 - rhs.0)
    }

    fn sum(xs: &[Self]) -> Self {
        let mut hi = T::neg_infinity();
        for x in xs {
            if x.0 > hi {
                hi = x.0;
            }
        }
        if hi == T::neg_infinity() {
            return Self::zero();
        }
        let mut acc = T::zero();
        for x in xs {
            acc = acc + (x.0 - hi).exp();
        }
        Log(hi + acc.ln())
    }

    fn dsum(xs: &[Self], dst: &mut [T]) {
        debug_assert_eq!(xs.len(), dst.len());
        let mut hi = T::neg_infinity();
        for x in xs {
            if x.0 > hi {
                hi = x.0;
            }
        }
        if hi == T::neg_infinity() {
            for d in dst.iter_mut() {
                *d = T::zero();
            }
            return;
        }
        let mut denom = T::zero();
        for (x, d) in xs.iter().zip(dst.iter_mut()) {
            let e = (x.0 - hi).exp();
            *d = e;
            denom = denom + e;
        }
        for d in dst.iter_mut() {
            *d = *d / denom;
        }
    }

    #[inline]
    fn from_scalar(s: T) -> Self {
        Log(s)
    }

    #[inline]
    fn to_scalar(self) -> T {
        self.0
    }

    #[inline]
    fn is_zero(&self) -> bool {
        self.0 == T::neg_infinity()
    }

    #[inline]
    fn kind() -> SemiringKind {
        SemiringKind::Log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_identities() {
        let a = Log(-1.3f64);
        assert_eq!(a.add(Log::zero()), a);
        assert_eq!(Log::<f64>::zero().add(a), a);
        assert_eq!(a.mul(Log::one()), a);
        assert!(a.mul(Log::zero()).is_zero());
    }

    #[test]
    fn test_log_add_matches_naive() {
        let a = Log(-0.5f64);
        let b = Log(-2.0f64);
        let naive = ((-0.5f64).exp() + (-2.0f64).exp()).ln();
        assert!((a.add(b).to_scalar() - naive).abs() < 1e-12);
        // commutes
        assert!((b.add(a).to_scalar() - naive).abs() < 1e-12);
    }

    #[test]
    fn test_log_sum_matches_naive() {
        let xs: Vec<Log<f64>> = [-0.3, -1.7, -4.2, -0.9].iter().map(|&v| Log(v)).collect();
        let naive = xs
            .iter()
            .map(|x| x.0.exp())
            .sum::<f64>()
            .ln();
        assert!((Log::sum(&xs).to_scalar() - naive).abs() < 1e-12);
    }

    #[test]
    fn test_log_sum_large_magnitudes() {
        // max-shifted evaluation survives values a naive exp would not
        let xs = [Log(-1000.0f64), Log(-1001.0)];
        let got = Log::sum(&xs).to_scalar();
        assert!((got - (-1000.0 + (1.0f64 + (-1.0f64).exp()).ln())).abs() < 1e-9);
    }

    #[test]
    fn test_log_dsum_is_softmax() {
        let xs: Vec<Log<f64>> = [-0.3, -1.7, -4.2].iter().map(|&v| Log(v)).collect();
        let mut d = [0.0f64; 3];
        Log::dsum(&xs, &mut d);
        let total: f64 = d.iter().sum();
        assert!((total - 1.0).abs() < 1e-12);
        // agrees with the direct softmax
        let z: f64 = xs.iter().map(|x| x.0.exp()).sum();
        for (x, got) in xs.iter().zip(d.iter()) {
            assert!((got - x.0.exp() / z).abs() < 1e-12);
        }
    }

    #[test]
    fn test_log_dsum_all_zero() {
        let xs = [Log::<f64>::zero(); 4];
        let mut d = [1.0f64; 4];
        Log::dsum(&xs, &mut d);
        assert_eq!(d, [0.0; 4]);
    }

    #[test]
    fn test_log_div_inverts_mul() {
        let a = Log(-0.7f64);
        let z = Log(-2.5f64);
        assert!((a.div(z).mul(z).to_scalar() - a.to_scalar()).abs() < 1e-12);
    }
}
