use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use super::mode::output_mode;
use super::node::{AdjointSink, Node, OutputSlots};
use crate::utils::errors::{AadError, Result};

/// Nodes per storage block.
pub const DEFAULT_BLOCK_SIZE: usize = 16_384;

static NEXT_TAPE_ID: AtomicU64 = AtomicU64::new(0);

/// Reference to a node: the tape it was recorded on, its position there, and
/// the stamp the node received at creation. Positions are reused after a
/// rewind, stamps are not.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NodeRef {
    tape: u64,
    position: usize,
    stamp: u64,
}

impl NodeRef {
    #[inline]
    pub fn position(&self) -> usize {
        self.position
    }

    #[inline]
    pub fn tape_id(&self) -> u64 {
        self.tape
    }
}

/// A saved tape length, including the per-output adjoint pool.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord)]
pub struct Checkpoint {
    nodes: usize,
    slots: usize,
}

impl Checkpoint {
    pub const START: Checkpoint = Checkpoint { nodes: 0, slots: 0 };

    /// Position of the first node recorded after this checkpoint.
    #[inline]
    pub fn position(&self) -> usize {
        self.nodes
    }
}

/// # Tape
/// Append-only record of operations. Nodes live in fixed-capacity blocks
/// that are never reallocated, so a node stays where it was put until the
/// tape is rewound past it.
#[derive(Debug)]
pub struct Tape {
    id: u64,
    block_size: usize,
    blocks: Vec<Vec<Node>>,
    len: usize,
    pool: Vec<f64>,
    mark: Checkpoint,
    next_stamp: u64,
}

impl Default for Tape {
    fn default() -> Self {
        Tape::new()
    }
}

impl Tape {
    pub fn new() -> Self {
        Tape::with_block_size(DEFAULT_BLOCK_SIZE)
    }

    pub fn with_block_size(block_size: usize) -> Self {
        Tape {
            id: NEXT_TAPE_ID.fetch_add(1, Ordering::Relaxed),
            block_size: block_size.max(1),
            blocks: Vec::new(),
            len: 0,
            pool: Vec::new(),
            mark: Checkpoint::START,
            next_stamp: 0,
        }
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Append a node with room for `arity` arguments. In multi-output mode
    /// the node also gets one zeroed adjoint per configured output.
    pub fn create_node(&mut self, arity: usize) -> NodeRef {
        let mode = output_mode();
        let slots = if mode.is_multi() {
            let offset = self.pool.len();
            self.pool.resize(offset + mode.outputs(), 0.0);
            Some(OutputSlots {
                offset,
                width: mode.outputs(),
            })
        } else {
            None
        };

        let stamp = self.next_stamp;
        self.next_stamp += 1;

        let block = self.len / self.block_size;
        if block == self.blocks.len() {
            self.blocks.push(Vec::with_capacity(self.block_size));
        }
        debug_assert_eq!(self.blocks[block].len(), self.len % self.block_size);
        self.blocks[block].push(Node::new(arity, stamp, slots));

        let position = self.len;
        self.len += 1;
        NodeRef {
            tape: self.id,
            position,
            stamp,
        }
    }

    /// Create a node whose arguments are `(position, partial)` pairs.
    pub fn record(&mut self, args: &[(usize, f64)]) -> NodeRef {
        let r = self.create_node(args.len());
        let node = self.node_at_mut(r.position);
        for (i, &(position, partial)) in args.iter().enumerate() {
            debug_assert!(position < r.position, "argument recorded after its dependent");
            node.set_argument(i, position, partial);
        }
        r
    }

    #[inline]
    pub fn node(&self, position: usize) -> Option<&Node> {
        if position >= self.len {
            return None;
        }
        Some(self.node_at(position))
    }

    #[inline]
    pub fn node_mut(&mut self, position: usize) -> Option<&mut Node> {
        if position >= self.len {
            return None;
        }
        Some(self.node_at_mut(position))
    }

    #[inline]
    fn node_at(&self, position: usize) -> &Node {
        &self.blocks[position / self.block_size][position % self.block_size]
    }

    #[inline]
    fn node_at_mut(&mut self, position: usize) -> &mut Node {
        let bs = self.block_size;
        &mut self.blocks[position / bs][position % bs]
    }

    /// The node `r` refers to, if it is still live on this tape.
    pub fn find(&self, r: NodeRef) -> Option<&Node> {
        if r.tape != self.id {
            return None;
        }
        self.node(r.position).filter(|n| n.stamp() == r.stamp)
    }

    /// Position of `r` on this tape. Validated builds check tape identity and
    /// the creation stamp, others only the bounds.
    pub fn resolve(&self, r: NodeRef) -> Result<usize> {
        if cfg!(any(debug_assertions, feature = "validate")) {
            if r.tape != self.id {
                warn!(expected = self.id, found = r.tape, "handle from another tape");
                return Err(AadError::ForeignNode {
                    expected: self.id,
                    found: r.tape,
                });
            }
            if self.find(r).is_none() {
                warn!(position = r.position, len = self.len, "stale handle");
                return Err(AadError::StaleNode {
                    position: r.position,
                    len: self.len,
                });
            }
        } else if r.position >= self.len {
            return Err(AadError::StaleNode {
                position: r.position,
                len: self.len,
            });
        }
        Ok(r.position)
    }

    /// Current length as a checkpoint, remembered as the tape's mark.
    pub fn mark(&mut self) -> Checkpoint {
        self.mark = self.checkpoint();
        debug!(tape = self.id, position = self.mark.nodes, "mark set");
        self.mark
    }

    /// Current length as a checkpoint, without touching the mark.
    pub fn checkpoint(&self) -> Checkpoint {
        Checkpoint {
            nodes: self.len,
            slots: self.pool.len(),
        }
    }

    pub fn mark_checkpoint(&self) -> Checkpoint {
        self.mark
    }

    /// Drop every node recorded after `checkpoint`. Blocks keep their
    /// capacity for reuse. A checkpoint beyond the current length is a no-op.
    pub fn rewind_to(&mut self, checkpoint: Checkpoint) {
        if checkpoint.nodes >= self.len {
            return;
        }
        let block = checkpoint.nodes / self.block_size;
        let offset = checkpoint.nodes % self.block_size;
        for b in self.blocks.iter_mut().skip(block + 1) {
            b.clear();
        }
        if let Some(b) = self.blocks.get_mut(block) {
            b.truncate(offset);
        }
        self.len = checkpoint.nodes;
        self.pool.truncate(checkpoint.slots);
        if self.mark.nodes > self.len {
            self.mark = checkpoint;
        }
        debug!(tape = self.id, position = self.len, "tape rewound");
    }

    pub fn rewind_to_start(&mut self) {
        self.rewind_to(Checkpoint::START);
        self.mark = Checkpoint::START;
    }

    /// Drop all nodes and release the blocks.
    pub fn clear(&mut self) {
        self.blocks.clear();
        self.pool.clear();
        self.len = 0;
        self.mark = Checkpoint::START;
    }

    /// Zero every adjoint, scalar and per-output.
    pub fn reset_adjoints(&mut self) {
        for n in self.blocks.iter_mut().flatten() {
            *n.adjoint_mut() = 0.0;
        }
        self.pool.fill(0.0);
    }

    /// Nodes from newest to oldest.
    pub fn iter_rev(&self) -> impl Iterator<Item = &Node> {
        self.blocks.iter().flatten().rev()
    }

    /// Nodes from `from` down to `to`, both inclusive, with their positions.
    pub fn range_rev(&self, from: usize, to: usize) -> impl Iterator<Item = (usize, &Node)> {
        let from = from.min(self.len.saturating_sub(1));
        (to..=from)
            .rev()
            .filter(move |_| self.len > 0)
            .map(move |p| (p, self.node_at(p)))
    }

    /// Scalar adjoint of the node `r` refers to.
    pub fn adjoint_of(&self, r: NodeRef) -> Result<f64> {
        let position = self.resolve(r)?;
        Ok(self.node_at(position).adjoint())
    }

    pub fn adjoint_of_mut(&mut self, r: NodeRef) -> Result<&mut f64> {
        let position = self.resolve(r)?;
        Ok(self.node_at_mut(position).adjoint_mut())
    }

    pub fn adjoint_at(&self, position: usize, output: usize) -> Result<f64> {
        let slots = self.slots_for(position, output)?;
        Ok(self.pool[slots.offset + output])
    }

    pub fn adjoint_at_mut(&mut self, position: usize, output: usize) -> Result<&mut f64> {
        let slots = self.slots_for(position, output)?;
        Ok(&mut self.pool[slots.offset + output])
    }

    fn slots_for(&self, position: usize, output: usize) -> Result<OutputSlots> {
        let node = self.node(position).ok_or(AadError::StaleNode {
            position,
            len: self.len,
        })?;
        let slots = node.slots().ok_or(AadError::NoOutputSlots(position))?;
        if output >= slots.width {
            return Err(AadError::OutputOutOfRange {
                output,
                outputs: slots.width,
            });
        }
        Ok(slots)
    }
}

impl AdjointSink for Tape {
    #[inline]
    fn adjoint_mut(&mut self, position: usize) -> &mut f64 {
        self.node_at_mut(position).adjoint_mut()
    }

    #[inline]
    fn output_slots(&self, position: usize) -> Option<OutputSlots> {
        self.node(position).and_then(|n| n.slots())
    }

    #[inline]
    fn output_pool(&self) -> &[f64] {
        &self.pool
    }

    #[inline]
    fn output_pool_mut(&mut self) -> &mut [f64] {
        &mut self.pool
    }
}

/* ═══════════════════════  ACTIVE TAPE  ══════════════════════════════ */

thread_local! {
    static TAPE: RefCell<Tape> = RefCell::new(Tape::new());
}

impl Tape {
    pub fn with_active<R>(f: impl FnOnce(&Tape) -> R) -> R {
        TAPE.with(|t| f(&t.borrow()))
    }

    pub fn with_active_mut<R>(f: impl FnOnce(&mut Tape) -> R) -> R {
        TAPE.with(|t| f(&mut t.borrow_mut()))
    }

    /// Make `tape` the active tape of this thread and hand back the previous one.
    pub fn install(tape: Tape) -> Tape {
        let previous = TAPE.with(|t| std::mem::replace(&mut *t.borrow_mut(), tape));
        debug!(previous = previous.id, "tape installed");
        previous
    }

    /// Make `tape` active until the returned scope ends.
    pub fn activate(tape: Tape) -> TapeScope {
        TapeScope {
            previous: Some(Tape::install(tape)),
        }
    }

    /// Mark the end of the active tape.
    pub fn set_mark() -> Checkpoint {
        Tape::with_active_mut(|t| t.mark())
    }

    pub fn rewind_to_mark() {
        Tape::with_active_mut(|t| {
            let mark = t.mark;
            t.rewind_to(mark)
        })
    }

    pub fn rewind_active_to(checkpoint: Checkpoint) {
        Tape::with_active_mut(|t| t.rewind_to(checkpoint))
    }

    pub fn reset_active_adjoints() {
        Tape::with_active_mut(|t| t.reset_adjoints())
    }

    pub fn clear_active() {
        Tape::with_active_mut(|t| t.clear())
    }

    pub fn active_len() -> usize {
        Tape::with_active(|t| t.len())
    }

    pub fn active_id() -> u64 {
        Tape::with_active(|t| t.id())
    }
}

/// Keeps a tape active; the previously active tape comes back when the
/// scope is dropped or finished.
#[must_use = "the previous tape is restored as soon as the scope is dropped"]
#[derive(Debug)]
pub struct TapeScope {
    previous: Option<Tape>,
}

impl TapeScope {
    /// Restore the previous tape and return the one this scope activated.
    pub fn finish(mut self) -> Tape {
        match self.previous.take() {
            Some(previous) => Tape::install(previous),
            None => Tape::new(),
        }
    }
}

impl Drop for TapeScope {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            Tape::install(previous);
        }
    }
}
