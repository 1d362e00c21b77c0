//! Caller-facing handles.
//!
//! A [`Handle`] is a weak, typed reference to a cell. The graph keeps the
//! only strong ownership; handles count themselves through a counter shared
//! with the cell, and the cell's invalidation strategy runs when the count
//! reaches zero. [`CellRef`] is the non-counting sibling for use inside
//! recomputation closures, where holding a counted handle would keep the
//! cell alive forever.

use std::cell::Cell;
use std::fmt;
use std::marker::PhantomData;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Sub, SubAssign};
use std::rc::Rc;

use reflow_common::{FlowError, FlowErrorKind};

use crate::api;
use crate::capture;
use crate::expr::Expr;
use crate::graph::{self, with_graph, with_graph_ref};
use crate::invalidate::InvalidateStrategy;
use crate::node::NodeId;
use crate::pulse;
use crate::slot::CellValue;
use crate::trigger::TriggerPolicy;

pub struct Handle<T: CellValue> {
    id: NodeId,
    weak: Rc<Cell<u32>>,
    _ty: PhantomData<T>,
}

impl<T: CellValue> Handle<T> {
    pub(crate) fn new(id: NodeId, weak: Rc<Cell<u32>>) -> Self {
        Self {
            id,
            weak,
            _ty: PhantomData,
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    fn closed_error() -> FlowError {
        FlowError::new(FlowErrorKind::NullHandleAccess).with_message("cell was closed")
    }

    /// Plain read, without capture registration.
    fn read(&self) -> Result<T, FlowError> {
        with_graph_ref(|g| g.read_value::<T>(self.id))
    }

    /// Read the current value.
    ///
    /// Registers the read in the active capture sink, when one is
    /// installed. Faults (panics with the typed error) when the cell is
    /// dead or holds no value yet; use [`Handle::try_get`] to observe the
    /// error instead.
    pub fn get(&self) -> T {
        capture::record(self.id);
        match self.read() {
            Ok(v) => v,
            Err(e) => panic!("{e}"),
        }
    }

    pub fn try_get(&self) -> Result<T, FlowError> {
        capture::record(self.id);
        self.read()
    }

    /// Borrowed read. `f` runs under a shared engine borrow: it may read
    /// other cells, but writes inside it will panic.
    pub fn with_value<R>(&self, f: impl FnOnce(&T) -> R) -> Result<R, FlowError> {
        capture::record(self.id);
        with_graph_ref(|g| {
            let node = g.node(self.id).ok_or_else(Self::closed_error)?;
            match node.slot.peek::<T>() {
                Some(v) => Ok(f(v)),
                None => Err(FlowError::new(FlowErrorKind::NullHandleAccess)
                    .with_message("cell holds no value")),
            }
        })
    }

    /// Write a new value. Source and Field cells only; fires one pulse.
    pub fn set(&self, value: T) -> Result<(), FlowError> {
        pulse::write_cell(self.id, Box::new(value))
    }

    /// In-place update of a source value: read, mutate, write, one pulse.
    pub fn update(&self, f: impl FnOnce(&mut T)) -> Result<(), FlowError> {
        let mut value = self.read()?;
        f(&mut value);
        self.set(value)
    }

    /// Re-evaluate the bound closure and store the result without
    /// propagating to observers. A no-op for cells without a closure.
    pub fn recompute(&self) -> Result<(), FlowError> {
        let compute = with_graph_ref(|g| {
            g.node(self.id)
                .map(|n| n.compute.clone())
                .ok_or_else(Self::closed_error)
        })?;
        let Some(f) = compute else { return Ok(()) };
        let value = capture::untracked(|| f());
        with_graph(|g| g.store_value(self.id, value))?;
        graph::drain_graveyard();
        Ok(())
    }

    /// Replace the bound closure, rediscovering dependencies through the
    /// capture sink. On failure the prior binding is kept.
    pub fn rebind(&self, f: impl Fn() -> T + 'static) -> Result<(), FlowError> {
        api::rebind_capture(self.id, f)
    }

    /// Replace the bound closure with explicitly supplied inputs.
    pub fn rebind_with<D: api::DepList>(
        &self,
        f: impl Fn(D::Values) -> T + 'static,
        deps: D,
    ) -> Result<(), FlowError>
    where
        D::Values: 'static,
    {
        api::rebind_args(self.id, f, deps)
    }

    /// Close this cell and everything that transitively reads it.
    pub fn close(&self) {
        pulse::request_close(self.id);
    }

    pub fn is_alive(&self) -> bool {
        with_graph_ref(|g| g.is_alive(self.id))
    }

    pub fn name(&self) -> Option<String> {
        with_graph_ref(|g| g.name_of(self.id))
    }

    /// Attach a debug name; it shows up in errors and log lines.
    pub fn rename(&self, name: impl Into<String>) -> Result<(), FlowError> {
        with_graph(|g| g.set_name(self.id, name.into()))
    }

    pub fn set_trigger(&self, trigger: TriggerPolicy) -> Result<(), FlowError> {
        with_graph(|g| g.set_trigger(self.id, trigger))
    }

    /// Switch to a Threshold trigger with the given predicate.
    pub fn set_threshold(&self, pred: impl Fn() -> bool + 'static) -> Result<(), FlowError> {
        self.set_trigger(TriggerPolicy::threshold(pred))
    }

    pub fn set_invalidate(&self, strategy: InvalidateStrategy) -> Result<(), FlowError> {
        with_graph(|g| g.set_invalidate(self.id, strategy))
    }

    /// Cells this cell currently reads.
    pub fn dependents(&self) -> Vec<NodeId> {
        with_graph_ref(|g| g.dependents_of(self.id)).unwrap_or_default()
    }

    /// Cells currently reading this cell, in attach order.
    pub fn observers(&self) -> Vec<NodeId> {
        with_graph_ref(|g| g.observers_of(self.id)).unwrap_or_default()
    }

    /// Non-counting reader for use inside closures.
    pub fn cell_ref(&self) -> CellRef<T> {
        CellRef {
            id: self.id,
            _ty: PhantomData,
        }
    }

    /// Lift this cell into an expression tree leaf.
    pub fn to_expr(&self) -> Expr<T> {
        Expr::cell(self.cell_ref())
    }
}

impl<T: CellValue> Clone for Handle<T> {
    fn clone(&self) -> Self {
        self.weak.set(self.weak.get() + 1);
        Self {
            id: self.id,
            weak: Rc::clone(&self.weak),
            _ty: PhantomData,
        }
    }
}

impl<T: CellValue> Drop for Handle<T> {
    fn drop(&mut self) {
        let count = self.weak.get();
        self.weak.set(count.saturating_sub(1));
        if count == 1 {
            pulse::report_unreferenced(self.id);
        }
    }
}

impl<T: CellValue> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Handle(#{})", self.id.0)
    }
}

macro_rules! impl_compound_assign {
    ($assign:ident, $assign_method:ident, $op:ident, $op_method:ident) => {
        impl<T> $assign<T> for Handle<T>
        where
            T: CellValue + $op<Output = T>,
        {
            fn $assign_method(&mut self, rhs: T) {
                let current = match self.read() {
                    Ok(v) => v,
                    Err(e) => panic!("{e}"),
                };
                if let Err(e) = self.set(current.$op_method(rhs)) {
                    panic!("{e}");
                }
            }
        }
    };
}

impl_compound_assign!(AddAssign, add_assign, Add, add);
impl_compound_assign!(SubAssign, sub_assign, Sub, sub);
impl_compound_assign!(MulAssign, mul_assign, Mul, mul);
impl_compound_assign!(DivAssign, div_assign, Div, div);

/// Non-counting, `Copy` reference to a cell, for reads inside closures.
///
/// Reads register in the capture sink exactly like handle reads, but the
/// referent's lifetime is unaffected: when the last counted handle dies the
/// cell's invalidation strategy still runs, even if closures keep a
/// `CellRef` to it.
pub struct CellRef<T: CellValue> {
    id: NodeId,
    _ty: PhantomData<fn() -> T>,
}

impl<T: CellValue> CellRef<T> {
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Read the current value; same fault semantics as [`Handle::get`].
    pub fn get(&self) -> T {
        capture::record(self.id);
        match with_graph_ref(|g| g.read_value::<T>(self.id)) {
            Ok(v) => v,
            Err(e) => panic!("{e}"),
        }
    }

    pub fn try_get(&self) -> Result<T, FlowError> {
        capture::record(self.id);
        with_graph_ref(|g| g.read_value::<T>(self.id))
    }

    pub fn is_alive(&self) -> bool {
        with_graph_ref(|g| g.is_alive(self.id))
    }

    pub fn to_expr(&self) -> Expr<T> {
        Expr::cell(*self)
    }
}

impl<T: CellValue> Clone for CellRef<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: CellValue> Copy for CellRef<T> {}

impl<T: CellValue> fmt::Debug for CellRef<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CellRef(#{})", self.id.0)
    }
}
