//! Tape-based reverse-mode algorithmic differentiation.
//!
//! Build expressions from [`Number`](math::ad::Number) handles, propagate
//! from the result, read derivatives back from the inputs:
//!
//! ```
//! use aad::prelude::*;
//!
//! let x = Number::new(10.0);
//! let y = x * x - 100.0;
//! y.propagate_to_start().unwrap();
//! assert_eq!(x.adjoint().unwrap(), 20.0);
//! ```

pub mod math;
pub mod prelude;
pub mod utils;
