//! Newton-Raphson root finding on top of the `aad` tape.
//!
//! ```
//! use rootfinder::newton::NewtonSolver;
//!
//! let s = NewtonSolver::new().solve(|x| x * x - 100.0, 100.0).unwrap();
//! assert!((s.root - 10.0).abs() < 1e-4);
//! ```

pub mod errors;
pub mod functions;
pub mod newton;

pub use errors::{Result, SolverError};
pub use functions::TestFunction;
pub use newton::{NewtonSolver, Solution, DEFAULT_MAX_ITERATIONS, DEFAULT_TOLERANCE};
