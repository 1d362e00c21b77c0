//! The engine-internal cell representation.

use std::any::Any;
use std::cell::Cell;
use std::rc::Rc;

use smallvec::SmallVec;

use crate::field::ObjectId;
use crate::invalidate::InvalidateStrategy;
use crate::slot::ValueSlot;
use crate::trigger::TriggerPolicy;

/// Engine-internal node identity: an index into the graph arena.
///
/// Indices are never reused; a closed cell leaves a tombstone behind, so a
/// stale handle resolves to nothing instead of aliasing a newer cell.
#[derive(Debug, Copy, Clone, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub(crate) fn new(id: u32) -> Self {
        Self(id)
    }

    pub(crate) fn as_index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    /// User-writable value cell.
    Source,

    /// Immutable value cell.
    Const,

    /// Value recomputed from its dependents by a bound closure.
    Computed,

    /// Closure-only cell: runs a side effect, holds no value.
    Action,

    /// User-writable sub-cell of a reactive aggregate.
    Field,
}

impl CellKind {
    pub fn user_writable(self) -> bool {
        matches!(self, CellKind::Source | CellKind::Field)
    }

    pub fn has_closure(self) -> bool {
        matches!(self, CellKind::Computed | CellKind::Action)
    }
}

/// Recomputation closure. Reads its inputs through handle reads and returns
/// the new value boxed; Action closures return `()` boxed and the result is
/// discarded.
pub(crate) type ComputeFn = dyn Fn() -> Box<dyn Any>;

pub(crate) struct Node {
    pub(crate) kind: CellKind,
    pub(crate) name: Option<String>,
    pub(crate) slot: ValueSlot,
    pub(crate) compute: Option<Rc<ComputeFn>>,
    pub(crate) trigger: TriggerPolicy,
    pub(crate) invalidate: InvalidateStrategy,

    /// Cells this node reads.
    pub(crate) dependents: SmallVec<[NodeId; 4]>,
    /// Cells reading this node, in attach order.
    pub(crate) observers: SmallVec<[NodeId; 4]>,

    /// Observers holding a second path to this node. They are moved into
    /// the pulse's wait set when this node starts notifying and fired only
    /// after its main observer loop.
    pub(crate) repeat_observers: SmallVec<[NodeId; 2]>,
    /// Inputs this node repeat-depends on (cleared on unbind).
    pub(crate) repeat_targets: SmallVec<[NodeId; 2]>,

    /// Outstanding caller handles. The counter is shared with the handles
    /// themselves so clone/drop never need the graph borrow; zero runs the
    /// invalidation strategy.
    pub(crate) weak: Rc<Cell<u32>>,

    /// Enclosing Source cell, for Field sub-cells wrapped by a `var`.
    pub(crate) container: Option<NodeId>,
    /// Aggregate identity currently embedded in this Source cell.
    pub(crate) object: Option<ObjectId>,
    /// Extracts the aggregate identity out of a newly stored value, for
    /// Source cells created over a reactive aggregate.
    pub(crate) host_of: Option<fn(&dyn Any) -> Option<ObjectId>>,
}

impl Node {
    pub(crate) fn new(kind: CellKind, slot: ValueSlot, trigger: TriggerPolicy) -> Self {
        Self {
            kind,
            name: None,
            slot,
            compute: None,
            trigger,
            invalidate: InvalidateStrategy::default(),
            dependents: SmallVec::new(),
            observers: SmallVec::new(),
            repeat_observers: SmallVec::new(),
            repeat_targets: SmallVec::new(),
            weak: Rc::new(Cell::new(1)),
            container: None,
            object: None,
            host_of: None,
        }
    }
}
