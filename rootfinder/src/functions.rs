use aad::utils::num::Real;
use clap::ValueEnum;

/// Reference problems for the solver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum TestFunction {
    /// x^2 - 100
    Square,
    /// cos(x) - x^3
    CosCubic,
    /// x / sqrt(1 + x^2)
    Ratio,
    /// x^3 - x^2 + 2
    Cubic,
}

impl TestFunction {
    pub fn eval<T: Real>(self, x: T) -> T {
        match self {
            TestFunction::Square => x * x - 100.0_f64,
            TestFunction::CosCubic => x.cos() - x * x * x,
            TestFunction::Ratio => x * (x * x + 1.0_f64).powf(T::from(-0.5_f64)),
            TestFunction::Cubic => x * x * x - x * x + 2.0_f64,
        }
    }

    pub fn derivative(self, x: f64) -> f64 {
        match self {
            TestFunction::Square => 2.0 * x,
            TestFunction::CosCubic => -x.sin() - 3.0 * x * x,
            TestFunction::Ratio => (1.0 + x * x).powf(-1.5),
            TestFunction::Cubic => 3.0 * x * x - 2.0 * x,
        }
    }

    pub fn default_start(self) -> f64 {
        match self {
            TestFunction::Square => 100.0,
            TestFunction::CosCubic => 10.0,
            TestFunction::Ratio => 0.5,
            TestFunction::Cubic => -20.0,
        }
    }

    pub fn expected_root(self) -> f64 {
        match self {
            TestFunction::Square => 10.0,
            TestFunction::CosCubic => 0.865474,
            TestFunction::Ratio => 0.0,
            TestFunction::Cubic => -1.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aad::math::ad::Number;

    #[test]
    fn test_derivatives_match_tape() {
        for f in [
            TestFunction::Square,
            TestFunction::CosCubic,
            TestFunction::Ratio,
            TestFunction::Cubic,
        ] {
            let x = Number::new(0.7);
            let y = f.eval(x);
            assert!((y.value() - f.eval(0.7)).abs() < 1e-14);
            y.propagate_to_start().unwrap();
            assert!(
                (x.adjoint().unwrap() - f.derivative(0.7)).abs() < 1e-12,
                "{:?}",
                f
            );
        }
    }
}
