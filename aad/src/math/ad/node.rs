use std::ops::Range;

use crate::utils::errors::{AadError, Result};

pub const MAX_ARITY: usize = 2;

/// Placeholder position for argument slots a node does not use.
pub const ID_NONE: usize = usize::MAX;

/// Location of a node's per-output adjoints in the tape's output pool.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OutputSlots {
    pub offset: usize,
    pub width: usize,
}

impl OutputSlots {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.width
    }
}

/// Where propagation writes: the scalar adjoints of earlier nodes and the
/// pool holding per-output adjoints.
pub trait AdjointSink {
    fn adjoint_mut(&mut self, position: usize) -> &mut f64;
    fn output_slots(&self, position: usize) -> Option<OutputSlots>;
    fn output_pool(&self) -> &[f64];
    fn output_pool_mut(&mut self) -> &mut [f64];
}

/// One recorded operation.
///
/// `args[i]` is the position of the i-th argument on the same tape, always
/// strictly below the node's own position. `partials[i]` is the derivative
/// of this node's value with respect to that argument.
#[derive(Clone, Copy, Debug)]
pub struct Node {
    arity: u8,
    partials: [f64; MAX_ARITY],
    args: [usize; MAX_ARITY],
    adj: f64,
    slots: Option<OutputSlots>,
    stamp: u64,
}

impl Node {
    pub(crate) fn new(arity: usize, stamp: u64, slots: Option<OutputSlots>) -> Self {
        assert!(arity <= MAX_ARITY, "node arity {} exceeds {}", arity, MAX_ARITY);
        Node {
            arity: arity as u8,
            partials: [0.0; MAX_ARITY],
            args: [ID_NONE; MAX_ARITY],
            adj: 0.0,
            slots,
            stamp,
        }
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.arity as usize
    }

    #[inline]
    pub fn partials(&self) -> &[f64] {
        &self.partials[..self.arity()]
    }

    #[inline]
    pub fn args(&self) -> &[usize] {
        &self.args[..self.arity()]
    }

    #[inline]
    pub fn adjoint(&self) -> f64 {
        self.adj
    }

    #[inline]
    pub fn adjoint_mut(&mut self) -> &mut f64 {
        &mut self.adj
    }

    /// Per-output adjoint slots, present only for nodes recorded in
    /// multi-output mode.
    #[inline]
    pub fn slots(&self) -> Option<OutputSlots> {
        self.slots
    }

    #[inline]
    pub(crate) fn stamp(&self) -> u64 {
        self.stamp
    }

    #[inline]
    pub(crate) fn set_argument(&mut self, i: usize, position: usize, partial: f64) {
        self.args[i] = position;
        self.partials[i] = partial;
    }

    /// Push this node's adjoint into its arguments. Leaves and nodes with a
    /// zero adjoint are skipped.
    #[inline]
    pub fn propagate_one<S: AdjointSink>(&self, sink: &mut S) {
        if self.arity == 0 || self.adj == 0.0 {
            return;
        }
        let a = self.adj;
        for (&arg, &d) in self.args().iter().zip(self.partials()) {
            *sink.adjoint_mut(arg) += d * a;
        }
    }

    /// Multi-output version of [`Node::propagate_one`]: every output `j` of
    /// every argument receives `partial * adjoint(j)`.
    pub fn propagate_all<S: AdjointSink>(&self, sink: &mut S) -> Result<()> {
        // recorded in single-output mode, nothing to push
        let Some(own) = self.slots else {
            return Ok(());
        };
        if self.arity == 0 || sink.output_pool()[own.range()].iter().all(|a| *a == 0.0) {
            return Ok(());
        }
        for (&arg, &d) in self.args().iter().zip(self.partials()) {
            let target = sink.output_slots(arg).ok_or(AadError::NoOutputSlots(arg))?;
            if target.width != own.width {
                return Err(AadError::OutputWidthMismatch {
                    position: arg,
                    expected: own.width,
                    found: target.width,
                });
            }
            let pool = sink.output_pool_mut();
            for j in 0..own.width {
                let a = pool[own.offset + j];
                pool[target.offset + j] += d * a;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct VecSink {
        nodes: Vec<Node>,
        pool: Vec<f64>,
    }

    impl AdjointSink for VecSink {
        fn adjoint_mut(&mut self, position: usize) -> &mut f64 {
            self.nodes[position].adjoint_mut()
        }
        fn output_slots(&self, position: usize) -> Option<OutputSlots> {
            self.nodes[position].slots()
        }
        fn output_pool(&self) -> &[f64] {
            &self.pool
        }
        fn output_pool_mut(&mut self) -> &mut [f64] {
            &mut self.pool
        }
    }

    #[test]
    fn test_propagate_one() {
        let mut sink = VecSink {
            nodes: vec![Node::new(0, 0, None), Node::new(0, 1, None)],
            pool: vec![],
        };
        let mut n = Node::new(2, 2, None);
        n.set_argument(0, 0, 3.0);
        n.set_argument(1, 1, -2.0);
        *n.adjoint_mut() = 0.5;
        n.propagate_one(&mut sink);
        assert_eq!(sink.nodes[0].adjoint(), 1.5);
        assert_eq!(sink.nodes[1].adjoint(), -1.0);
    }

    #[test]
    fn test_zero_adjoint_is_pruned() {
        let mut sink = VecSink {
            nodes: vec![Node::new(0, 0, None)],
            pool: vec![],
        };
        let mut n = Node::new(1, 1, None);
        // dangling argument is never touched while the adjoint is zero
        n.set_argument(0, 42, 1.0);
        n.propagate_one(&mut sink);
        assert_eq!(sink.nodes[0].adjoint(), 0.0);
    }

    #[test]
    fn test_propagate_all() {
        let leaf = OutputSlots { offset: 0, width: 2 };
        let own = OutputSlots { offset: 2, width: 2 };
        let mut sink = VecSink {
            nodes: vec![Node::new(0, 0, Some(leaf))],
            pool: vec![0.0, 0.0, 1.0, 2.0],
        };
        let mut n = Node::new(1, 1, Some(own));
        n.set_argument(0, 0, 4.0);
        n.propagate_all(&mut sink).unwrap();
        assert_eq!(sink.pool[..2], [4.0, 8.0]);
    }

    #[test]
    fn test_propagate_all_requires_slots() {
        let own = OutputSlots { offset: 0, width: 1 };
        let mut sink = VecSink {
            nodes: vec![Node::new(0, 0, None)],
            pool: vec![1.0],
        };
        let mut n = Node::new(1, 1, Some(own));
        n.set_argument(0, 0, 1.0);
        assert_eq!(
            n.propagate_all(&mut sink),
            Err(AadError::NoOutputSlots(0))
        );
    }

    #[test]
    fn test_propagate_all_rejects_width_mismatch() {
        let leaf = OutputSlots { offset: 0, width: 1 };
        let own = OutputSlots { offset: 1, width: 2 };
        let mut sink = VecSink {
            nodes: vec![Node::new(0, 0, Some(leaf))],
            pool: vec![0.0, 1.0, 1.0],
        };
        let mut n = Node::new(1, 1, Some(own));
        n.set_argument(0, 0, 1.0);
        assert_eq!(
            n.propagate_all(&mut sink),
            Err(AadError::OutputWidthMismatch {
                position: 0,
                expected: 2,
                found: 1
            })
        );
        assert_eq!(sink.pool[0], 0.0);
    }
}
