use std::ops::{Add, Div, Mul, Neg, Sub};

use crate::math::ad::Number;
use crate::math::gaussians;

/// Trait implemented by numeric types generic calculations run on, so the
/// same code works on plain `f64` and on recorded [`Number`]s.
pub trait Real:
    Copy
    + PartialEq
    + PartialOrd
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + Add<f64, Output = Self>
    + Sub<f64, Output = Self>
    + Mul<f64, Output = Self>
    + Div<f64, Output = Self>
    + From<f64>
{
    fn ln(self) -> Self;
    fn exp(self) -> Self;
    fn powf(self, rhs: Self) -> Self;
    fn sqrt(self) -> Self;
    fn sin(self) -> Self;
    fn cos(self) -> Self;
    fn abs(self) -> Self;
    fn normal_dens(self) -> Self;
    fn normal_cdf(self) -> Self;
    fn max(self, other: Self) -> Self;
    fn min(self, other: Self) -> Self;
}

impl Real for f64 {
    fn ln(self) -> Self {
        f64::ln(self)
    }

    fn exp(self) -> Self {
        f64::exp(self)
    }

    fn powf(self, rhs: Self) -> Self {
        f64::powf(self, rhs)
    }

    fn sqrt(self) -> Self {
        f64::sqrt(self)
    }

    fn sin(self) -> Self {
        f64::sin(self)
    }

    fn cos(self) -> Self {
        f64::cos(self)
    }

    fn abs(self) -> Self {
        f64::abs(self)
    }

    fn normal_dens(self) -> Self {
        gaussians::normal_dens(self)
    }

    fn normal_cdf(self) -> Self {
        gaussians::normal_cdf(self)
    }

    fn max(self, other: Self) -> Self {
        if self >= other {
            self
        } else {
            other
        }
    }

    fn min(self, other: Self) -> Self {
        if self <= other {
            self
        } else {
            other
        }
    }
}

impl Real for Number {
    fn ln(self) -> Self {
        Number::ln(self)
    }

    fn exp(self) -> Self {
        Number::exp(self)
    }

    fn powf(self, rhs: Self) -> Self {
        Number::powf(self, rhs)
    }

    fn sqrt(self) -> Self {
        Number::sqrt(self)
    }

    fn sin(self) -> Self {
        Number::sin(self)
    }

    fn cos(self) -> Self {
        Number::cos(self)
    }

    fn abs(self) -> Self {
        Number::abs(self)
    }

    fn normal_dens(self) -> Self {
        Number::normal_dens(self)
    }

    fn normal_cdf(self) -> Self {
        Number::normal_cdf(self)
    }

    fn max(self, other: Self) -> Self {
        Number::max(self, other)
    }

    fn min(self, other: Self) -> Self {
        Number::min(self, other)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quadratic<T: Real>(x: T) -> T {
        x * x * 0.5_f64 - x + 3.0_f64
    }

    #[test]
    fn test_same_code_on_both_types() {
        let plain = quadratic(4.0);
        let x = Number::new(4.0);
        let y = quadratic(x);
        assert_eq!(y.value(), plain);
        y.propagate_to_start().unwrap();
        assert_eq!(x.adjoint(), Ok(3.0));
    }

    #[test]
    fn test_max_ties_go_left() {
        assert_eq!(Real::max(1.0_f64, 1.0), 1.0);
        let a = Number::new(1.0);
        let b = Number::new(1.0);
        let m = Real::max(a, b);
        m.propagate_to_start().unwrap();
        assert_eq!(a.adjoint(), Ok(1.0));
        assert_eq!(b.adjoint(), Ok(0.0));
    }
}
