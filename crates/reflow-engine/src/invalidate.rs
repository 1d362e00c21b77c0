//! Invalidation strategies: what happens when a cell's last handle dies.

use std::fmt;
use std::rc::Rc;

use crate::node::NodeId;

/// Structural-conformance seam for custom invalidation strategies.
///
/// Invoked outside any engine borrow, so the implementation is free to call
/// back into the public API (close the cell, rebind it, read neighbours).
pub trait OnInvalid {
    fn on_invalid(&self, cell: NodeId);
}

#[derive(Clone, Default)]
pub enum InvalidateStrategy {
    /// Cascade-close the cell and everything that transitively reads it.
    #[default]
    Close,

    /// Leave the cell in the graph; it keeps recomputing and its observers
    /// keep working.
    KeepComputing,

    /// Unbind the cell's inputs and drop its closure; downstream observers
    /// keep reading the last value forever.
    FreezeLastValue,

    /// Detach the sub-cell from the field index, then close it.
    FieldClose,

    Custom(Rc<dyn OnInvalid>),
}

impl fmt::Debug for InvalidateStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvalidateStrategy::Close => f.write_str("Close"),
            InvalidateStrategy::KeepComputing => f.write_str("KeepComputing"),
            InvalidateStrategy::FreezeLastValue => f.write_str("FreezeLastValue"),
            InvalidateStrategy::FieldClose => f.write_str("FieldClose"),
            InvalidateStrategy::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}
