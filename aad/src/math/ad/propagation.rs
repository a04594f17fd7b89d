use tracing::trace;

use super::number::Number;
use super::tape::{Checkpoint, Tape};
use crate::utils::errors::{AadError, Result};

fn check_range(tape: &Tape, from: usize, to: usize) -> Result<()> {
    if from < to || from >= tape.len() {
        return Err(AadError::InvalidRange { from, to });
    }
    Ok(())
}

/// Reverse sweep over `from..=to` (newest first), single adjoint.
fn sweep(tape: &mut Tape, from: usize, to: usize) -> Result<()> {
    check_range(tape, from, to)?;
    trace!(from, to, "propagating adjoints");
    for p in (to..=from).rev() {
        if let Some(node) = tape.node(p).copied() {
            node.propagate_one(tape);
        }
    }
    Ok(())
}

fn sweep_multi(tape: &mut Tape, from: usize, to: usize) -> Result<()> {
    check_range(tape, from, to)?;
    trace!(from, to, "propagating adjoints, multi-output");
    for p in (to..=from).rev() {
        if let Some(node) = tape.node(p).copied() {
            node.propagate_all(tape)?;
        }
    }
    Ok(())
}

/// Propagate adjoints already seeded on the active tape from `from` down to
/// `to`, both inclusive.
pub fn propagate_adjoints(from: usize, to: usize) -> Result<()> {
    Tape::with_active_mut(|t| sweep(t, from, to))
}

/// Multi-output version of [`propagate_adjoints`].
pub fn propagate_adjoints_multi(from: usize, to: usize) -> Result<()> {
    Tape::with_active_mut(|t| sweep_multi(t, from, to))
}

/// Multi-output sweep over the whole active tape. Seed the targets with
/// [`Number::set_adjoint_at`] first.
pub fn propagate_multi_to_start() -> Result<()> {
    Tape::with_active_mut(|t| match t.len() {
        0 => Ok(()),
        len => sweep_multi(t, len - 1, 0),
    })
}

/// Continue a sweep through the part of the tape recorded before the mark,
/// without seeding anything.
pub fn propagate_mark_to_start() -> Result<()> {
    Tape::with_active_mut(|t| match t.mark_checkpoint().position() {
        0 => Ok(()),
        mark => sweep(t, mark - 1, 0),
    })
}

impl Number {
    /// Set this number's adjoint to 1 and propagate down to position `to`.
    pub fn propagate_adjoints(&self, to: usize) -> Result<()> {
        Tape::with_active_mut(|t| {
            let from = t.resolve(self.node())?;
            check_range(t, from, to)?;
            *t.adjoint_of_mut(self.node())? = 1.0;
            sweep(t, from, to)
        })
    }

    /// Derivatives with respect to every leaf on the tape.
    pub fn propagate_to_start(&self) -> Result<()> {
        self.propagate_adjoints(Checkpoint::START.position())
    }

    /// Derivatives with respect to leaves recorded since the last mark.
    ///
    /// Nodes recorded before the mark are not swept, but one that is a
    /// direct argument of a node recorded after it still receives its
    /// adjoint. [`propagate_mark_to_start`] carries that on to the start.
    pub fn propagate_to_mark(&self) -> Result<()> {
        let to = Tape::with_active(|t| t.mark_checkpoint().position());
        self.propagate_adjoints(to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::ad::mode::set_num_outputs;

    #[test]
    fn test_propagation() {
        let x = Number::new(10.0);
        let y = x * x - 100.0;
        y.propagate_to_start().unwrap();
        assert_eq!(y.value(), 0.0);
        assert_eq!(y.adjoint(), Ok(1.0));
        assert_eq!(x.adjoint(), Ok(20.0));
    }

    #[test]
    fn test_shared_subexpression_accumulates() {
        let x = Number::new(3.0);
        let s = x * 2.0;
        let y = s * s + s;
        y.propagate_to_start().unwrap();
        // y = 4x² + 2x
        assert_eq!(x.adjoint(), Ok(8.0 * 3.0 + 2.0));
    }

    #[test]
    fn test_unreachable_node_keeps_zero_adjoint() {
        let x = Number::new(2.0);
        let unused = x.exp();
        let y = x * 3.0;
        y.propagate_to_start().unwrap();
        assert_eq!(unused.adjoint(), Ok(0.0));
        assert_eq!(x.adjoint(), Ok(3.0));
    }

    #[test]
    fn test_propagate_to_mark_stops_at_mark() {
        let a = Number::new(2.0);
        let c = a * 3.0;
        Tape::set_mark();
        let b = Number::new(5.0);
        let y = c * b;
        y.propagate_to_mark().unwrap();
        assert_eq!(b.adjoint(), Ok(6.0));
        // direct arguments from before the mark are written, but not swept
        assert_eq!(c.adjoint(), Ok(5.0));
        assert_eq!(a.adjoint(), Ok(0.0));

        propagate_mark_to_start().unwrap();
        assert_eq!(a.adjoint(), Ok(15.0));
    }

    #[test]
    fn test_invalid_range() {
        let x = Number::new(1.0);
        let _y = x + 1.0;
        assert_eq!(
            propagate_adjoints(0, 1),
            Err(AadError::InvalidRange { from: 0, to: 1 })
        );
        assert!(propagate_adjoints(5, 0).is_err());
    }

    #[test]
    fn test_rejected_range_leaves_no_seed() {
        let x = Number::new(2.0);
        let y = x * 3.0;
        Tape::set_mark();
        let z = Number::new(1.0);
        assert_eq!(
            y.propagate_to_mark(),
            Err(AadError::InvalidRange { from: 1, to: 2 })
        );
        assert_eq!(y.adjoint(), Ok(0.0));

        let w = y * z;
        w.propagate_to_start().unwrap();
        assert_eq!(x.adjoint(), Ok(3.0));
    }

    #[test]
    fn test_stale_handle_is_reported() {
        let cp = Tape::set_mark();
        let x = Number::new(1.0);
        let y = x * 2.0;
        Tape::rewind_active_to(cp);
        let _z = Number::new(4.0);
        assert!(matches!(
            y.propagate_to_start(),
            Err(AadError::StaleNode { .. })
        ));
        assert!(x.adjoint().is_err());
    }

    #[test]
    fn test_multi_output() {
        let _guard = set_num_outputs(true, 2).unwrap();
        let x = Number::new(3.0);
        let y0 = x * x;
        let y1 = x * 5.0;
        y0.set_adjoint_at(0, 1.0).unwrap();
        y1.set_adjoint_at(1, 1.0).unwrap();
        propagate_multi_to_start().unwrap();
        assert_eq!(x.adjoint_at(0), Ok(6.0));
        assert_eq!(x.adjoint_at(1), Ok(5.0));
        assert_eq!(y0.adjoint_at(1), Ok(0.0));
    }
}
