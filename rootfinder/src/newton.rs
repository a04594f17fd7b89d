use aad::math::ad::{Number, Tape};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::errors::{Result, SolverError};

pub const DEFAULT_TOLERANCE: f64 = 1e-4;
pub const DEFAULT_MAX_ITERATIONS: usize = 100;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Solution {
    pub root: f64,
    pub iterations: usize,
    pub last_step: f64,
}

/// # Newton-Raphson solver
/// Iterates `x <- x - f(x) / f'(x)` until the step falls below the
/// tolerance. Derivatives come from the active tape unless supplied.
#[derive(Clone, Copy, Debug)]
pub struct NewtonSolver {
    tolerance: f64,
    max_iterations: usize,
}

impl Default for NewtonSolver {
    fn default() -> Self {
        NewtonSolver::new()
    }
}

impl NewtonSolver {
    pub fn new() -> Self {
        NewtonSolver {
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    pub fn with_tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = tolerance;
        self
    }

    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn max_iterations(&self) -> usize {
        self.max_iterations
    }

    /// `f(x)` and `f'(x)` from one recording. The tape is rewound to where it
    /// was before the call, whatever the outcome.
    pub fn value_and_derivative<F>(f: &F, x: f64) -> Result<(f64, f64)>
    where
        F: Fn(Number) -> Number,
    {
        let cp = Tape::with_active(Tape::checkpoint);
        let out: Result<(f64, f64)> = (|| {
            let input = Number::new(x);
            let y = f(input);
            y.propagate_adjoints(cp.position())?;
            Ok((y.value(), input.adjoint()?))
        })();
        Tape::rewind_active_to(cp);
        out
    }

    pub fn solve<F>(&self, f: F, x0: f64) -> Result<Solution>
    where
        F: Fn(Number) -> Number,
    {
        self.iterate(x0, |x| Self::value_and_derivative(&f, x))
    }

    pub fn solve_with_derivative<F, D>(&self, f: F, df: D, x0: f64) -> Result<Solution>
    where
        F: Fn(f64) -> f64,
        D: Fn(f64) -> f64,
    {
        self.iterate(x0, |x| Ok((f(x), df(x))))
    }

    /// Solve from every starting point in parallel. Each worker records on
    /// its own thread's tape.
    pub fn solve_many<F>(&self, f: F, starts: &[f64]) -> Vec<Result<Solution>>
    where
        F: Fn(Number) -> Number + Sync,
    {
        starts.par_iter().map(|&x0| self.solve(&f, x0)).collect()
    }

    fn iterate<E>(&self, x0: f64, mut eval: E) -> Result<Solution>
    where
        E: FnMut(f64) -> Result<(f64, f64)>,
    {
        if !(self.tolerance > 0.0 && self.tolerance.is_finite()) {
            return Err(SolverError::InvalidTolerance(self.tolerance));
        }
        let mut x = x0;
        for iteration in 1..=self.max_iterations {
            let (fx, dfx) = eval(x)?;
            debug!(iteration, x, fx, dfx, "newton step");
            // straddle: the tangent never crosses zero
            if dfx == 0.0 {
                warn!(iteration, x, "zero derivative");
                return Err(SolverError::ZeroDerivative { x, iteration });
            }
            let h = fx / dfx;
            x -= h;
            if !x.is_finite() {
                warn!(iteration, x, "non-finite iterate");
                return Err(SolverError::NonFinite { x, iteration });
            }
            if h.abs() < self.tolerance {
                info!(root = x, iterations = iteration, "converged");
                return Ok(Solution {
                    root: x,
                    iterations: iteration,
                    last_step: h,
                });
            }
        }
        warn!(iterations = self.max_iterations, last = x, "no convergence");
        Err(SolverError::NoConvergence {
            iterations: self.max_iterations,
            last: x,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions::TestFunction;

    #[test]
    fn test_cubic_from_minus_twenty() {
        let solver = NewtonSolver::new();
        let s = solver.solve(|x| x * x * x - x * x + 2.0, -20.0).unwrap();
        assert!((s.root + 1.0).abs() < 1e-4);
        assert_eq!(Tape::active_len(), 0);
    }

    #[test]
    fn test_builtin_functions() {
        let solver = NewtonSolver::new().with_tolerance(1e-8);
        for f in [TestFunction::Square, TestFunction::CosCubic, TestFunction::Cubic] {
            let s = solver.solve(|x| f.eval(x), f.default_start()).unwrap();
            assert!(
                (s.root - f.expected_root()).abs() < 1e-4,
                "{:?} converged to {}",
                f,
                s.root
            );
        }
    }

    #[test]
    fn test_ratio_converges_from_half_and_fails_from_one() {
        let solver = NewtonSolver::new();
        let f = TestFunction::Ratio;
        let s = solver.solve(|x| f.eval(x), 0.5).unwrap();
        assert!(s.root.abs() < 1e-4);
        assert!(solver.solve(|x| f.eval(x), 1.0).is_err());
    }

    #[test]
    fn test_analytic_matches_tape() {
        let solver = NewtonSolver::new().with_tolerance(1e-10);
        let f = TestFunction::CosCubic;
        let tape = solver.solve(|x| f.eval(x), 10.0).unwrap();
        let analytic = solver
            .solve_with_derivative(|x| f.eval(x), |x| f.derivative(x), 10.0)
            .unwrap();
        assert!((tape.root - analytic.root).abs() < 1e-12);
    }

    #[test]
    fn test_zero_derivative_is_reported() {
        let solver = NewtonSolver::new();
        let err = solver.solve(|x| x * x - 4.0, 0.0).unwrap_err();
        assert_eq!(
            err,
            SolverError::ZeroDerivative {
                x: 0.0,
                iteration: 1
            }
        );
        assert_eq!(Tape::active_len(), 0);
    }

    #[test]
    fn test_invalid_tolerance() {
        let solver = NewtonSolver::new().with_tolerance(0.0);
        assert_eq!(
            solver.solve(|x| x, 1.0),
            Err(SolverError::InvalidTolerance(0.0))
        );
    }

    #[test]
    fn test_no_convergence() {
        let solver = NewtonSolver::new().with_max_iterations(2);
        assert!(matches!(
            solver.solve(|x| x * x * x - x * x + 2.0, -20.0),
            Err(SolverError::NoConvergence { iterations: 2, .. })
        ));
    }

    #[test]
    fn test_solve_does_not_touch_the_caller_mark() {
        let keep = Number::new(1.0);
        let mark = Tape::set_mark();
        let solver = NewtonSolver::new();
        solver.solve(|x| x * x - 100.0, 100.0).unwrap();
        assert_eq!(Tape::with_active(|t| t.mark_checkpoint()), mark);
        assert_eq!(keep.adjoint(), Ok(0.0));
    }

    #[test]
    fn test_solve_many() {
        let solver = NewtonSolver::new();
        let starts = [-20.0, -5.0, -2.0, -1.5];
        let results = solver.solve_many(|x| x * x * x - x * x + 2.0, &starts);
        assert_eq!(results.len(), starts.len());
        for r in results {
            assert!((r.unwrap().root + 1.0).abs() < 1e-4);
        }
    }
}
