//! Public cell constructors, thin glue over the graph core.
//!
//! Constructors return handles directly; the only way they can fail is the
//! configured node cap, which faults with `CapacityExceeded`. Bind errors
//! (cycles) can only arise on *re*binding an existing cell, where prior
//! edges exist to collide with, and are returned from `rebind`/`rebind_with`
//! as typed values.

use std::any::Any;
use std::rc::Rc;

use smallvec::{SmallVec, smallvec};

use reflow_common::{FlowError, FlowErrorKind};

use crate::capture;
use crate::expr::{Expr, Numeric};
use crate::field::{Field, FieldHost, HostId, ObjectId};
use crate::graph::{self, with_graph, with_graph_ref};
use crate::handle::Handle;
use crate::invalidate::InvalidateStrategy;
use crate::node::{CellKind, ComputeFn, Node, NodeId};
use crate::pulse;
use crate::slot::{CellValue, ValueSlot};

/// Explicit dependency tuples for argument-style binding: `(&a,)` up to
/// `(&a, &b, &c, &d)`. The bound closure receives the corresponding value
/// tuple on every recomputation.
pub trait DepList {
    type Values;

    fn ids(&self) -> SmallVec<[NodeId; 4]>;

    /// A reader over the dependency ids only; it deliberately does not keep
    /// the handles alive.
    fn reader(&self) -> Box<dyn Fn() -> Self::Values>;
}

macro_rules! impl_dep_list {
    ($(($T:ident, $idx:tt)),+) => {
        impl<'a, $($T: CellValue),+> DepList for ($(&'a Handle<$T>,)+) {
            type Values = ($($T,)+);

            fn ids(&self) -> SmallVec<[NodeId; 4]> {
                smallvec![$(self.$idx.id()),+]
            }

            fn reader(&self) -> Box<dyn Fn() -> Self::Values> {
                let ids = self.ids();
                Box::new(move || ($(graph::read_or_fault::<$T>(ids[$idx]),)+))
            }
        }
    };
}

impl_dep_list!((A, 0));
impl_dep_list!((A, 0), (B, 1));
impl_dep_list!((A, 0), (B, 1), (C, 2));
impl_dep_list!((A, 0), (B, 1), (C, 2), (D, 3));

/* ────────────────────────────── sources ──────────────────────────────── */

/// A Source cell holding `value`.
pub fn var<T: CellValue>(value: T) -> Handle<T> {
    create_value_cell(CellKind::Source, value, InvalidateStrategy::Close, None)
}

/// A Source cell over a reactive aggregate: every Field sub-cell registered
/// under the aggregate's identity is back-pointed to this cell, and writes
/// re-key the registry before observers fire.
pub fn var_host<T: CellValue + FieldHost>(value: T) -> Handle<T> {
    let object = value.host_id();
    let handle = create_value_cell(
        CellKind::Source,
        value,
        InvalidateStrategy::Close,
        Some(host_probe::<T>),
    );
    with_graph(|g| g.adopt(handle.id(), object));
    handle
}

/// An immutable Const cell; writes fail with `NotWritable`.
pub fn const_var<T: CellValue>(value: T) -> Handle<T> {
    create_value_cell(CellKind::Const, value, InvalidateStrategy::Close, None)
}

/// A Field sub-cell of the aggregate identified by `host`.
pub fn field<T: CellValue>(host: &HostId, value: T) -> Field<T> {
    let handle = create_value_cell(CellKind::Field, value, InvalidateStrategy::FieldClose, None);
    with_graph(|g| g.register_field(host.object_id(), handle.id()));
    Field::new(handle)
}

/* ────────────────────────────── computeds ────────────────────────────── */

/// Capture-style Computed cell: the closure runs once immediately, every
/// handle it reads becomes a dependency.
pub fn calc<T: CellValue>(f: impl Fn() -> T + 'static) -> Handle<T> {
    let compute: Rc<ComputeFn> = Rc::new(move || Box::new(f()) as Box<dyn Any>);
    let (value, reads) = capture::capture(|| compute());
    finish_computed::<T>(CellKind::Computed, ValueSlot::typed::<T>(), compute, Some(value), &reads)
}

/// Arguments-style Computed cell: the dependencies are exactly `deps`, and
/// the closure receives their current values on every recomputation.
pub fn calc_with<D, T, F>(f: F, deps: D) -> Handle<T>
where
    D: DepList,
    T: CellValue,
    F: Fn(D::Values) -> T + 'static,
    D::Values: 'static,
{
    let ids = deps.ids();
    let reader = deps.reader();
    let compute: Rc<ComputeFn> = Rc::new(move || Box::new(f(reader())) as Box<dyn Any>);
    let value = compute();
    finish_computed::<T>(CellKind::Computed, ValueSlot::typed::<T>(), compute, Some(value), &ids)
}

/// A Computed cell folding an arithmetic expression tree.
pub fn expr<T: Numeric>(tree: Expr<T>) -> Handle<T> {
    calc(move || tree.eval())
}

/// Capture-style Action cell. The side effect runs once immediately to
/// discover its dependencies, then again on every relevant change.
pub fn action(f: impl Fn() + 'static) -> Handle<()> {
    let compute: Rc<ComputeFn> = Rc::new(move || {
        f();
        Box::new(()) as Box<dyn Any>
    });
    let ((), reads) = capture::capture(|| {
        compute();
    });
    finish_computed::<()>(CellKind::Action, ValueSlot::empty(), compute, None, &reads)
}

/// Arguments-style Action cell; runs once at attach like `action`.
pub fn action_with<D, F>(f: F, deps: D) -> Handle<()>
where
    D: DepList,
    F: Fn(D::Values) + 'static,
    D::Values: 'static,
{
    let ids = deps.ids();
    let reader = deps.reader();
    let compute: Rc<ComputeFn> = Rc::new(move || {
        f(reader());
        Box::new(()) as Box<dyn Any>
    });
    compute();
    finish_computed::<()>(CellKind::Action, ValueSlot::empty(), compute, None, &ids)
}

/* ────────────────────────────── rebinding ────────────────────────────── */

/// Reset-and-rebind with capture-style dependency discovery. All pre-checks
/// complete before any edge moves; on failure the prior binding (and its
/// observer ordering) is untouched.
pub(crate) fn rebind_capture<T: CellValue>(
    id: NodeId,
    f: impl Fn() -> T + 'static,
) -> Result<(), FlowError> {
    ensure_computed(id)?;
    let compute: Rc<ComputeFn> = Rc::new(move || Box::new(f()) as Box<dyn Any>);
    let (value, reads) = capture::capture(|| compute());
    commit_rebind(id, compute, value, &reads)
}

/// Reset-and-rebind with explicit dependencies.
pub(crate) fn rebind_args<D, T, F>(id: NodeId, f: F, deps: D) -> Result<(), FlowError>
where
    D: DepList,
    T: CellValue,
    F: Fn(D::Values) -> T + 'static,
    D::Values: 'static,
{
    ensure_computed(id)?;
    let ids = deps.ids();
    let dead = with_graph_ref(|g| ids.iter().copied().find(|&t| !g.is_alive(t)));
    if dead.is_some() {
        return Err(FlowError::new(FlowErrorKind::NullHandleAccess)
            .with_message("a supplied dependency was closed"));
    }
    let reader = deps.reader();
    let compute: Rc<ComputeFn> = Rc::new(move || Box::new(f(reader())) as Box<dyn Any>);
    let value = compute();
    commit_rebind(id, compute, value, &ids)
}

fn commit_rebind(
    id: NodeId,
    compute: Rc<ComputeFn>,
    value: Box<dyn Any>,
    targets: &[NodeId],
) -> Result<(), FlowError> {
    with_graph(|g| g.check_store_type(id, value.as_ref()))?;
    with_graph(|g| g.bind(id, targets))?;
    with_graph(|g| g.set_compute(id, Some(compute)));
    let changed = with_graph(|g| g.store_value(id, value))?;
    graph::drain_graveyard();
    pulse::run_pulse(id, changed);
    Ok(())
}

fn ensure_computed(id: NodeId) -> Result<(), FlowError> {
    match with_graph_ref(|g| g.kind_of(id)) {
        Some(CellKind::Computed) => Ok(()),
        Some(_) => Err(FlowError::new(FlowErrorKind::NotWritable)
            .with_message("only computed cells rebind")),
        None => Err(FlowError::new(FlowErrorKind::NullHandleAccess).with_message("cell was closed")),
    }
}

/* ────────────────────────────── internals ────────────────────────────── */

fn host_probe<T: FieldHost + 'static>(value: &dyn Any) -> Option<ObjectId> {
    value.downcast_ref::<T>().map(|v| v.host_id())
}

fn create_value_cell<T: CellValue>(
    kind: CellKind,
    value: T,
    invalidate: InvalidateStrategy,
    host_of: Option<fn(&dyn Any) -> Option<ObjectId>>,
) -> Handle<T> {
    let created = with_graph(|g| -> Result<_, FlowError> {
        let mut node = Node::new(kind, ValueSlot::typed::<T>(), g.default_trigger());
        node.invalidate = invalidate;
        node.host_of = host_of;
        let (id, weak) = g.create_node(node)?;
        g.store_value(id, Box::new(value))?;
        Ok((id, weak))
    });
    match created {
        Ok((id, weak)) => Handle::new(id, weak),
        Err(e) => panic!("{e}"),
    }
}

fn finish_computed<T: CellValue>(
    kind: CellKind,
    slot: ValueSlot,
    compute: Rc<ComputeFn>,
    value: Option<Box<dyn Any>>,
    targets: &[NodeId],
) -> Handle<T> {
    let created = with_graph(|g| g.create_node(Node::new(kind, slot, g.default_trigger())));
    let (id, weak) = match created {
        Ok(ok) => ok,
        Err(e) => panic!("{e}"),
    };

    // A freshly created cell has no observers and cannot be reached from
    // its own inputs, so the pre-checks cannot reject it; keep the rollback
    // anyway so a fault never leaves a half-built node behind.
    if let Err(e) = with_graph(|g| g.bind(id, targets)) {
        with_graph(|g| g.discard_node(id));
        graph::drain_graveyard();
        panic!("{e}");
    }

    with_graph(|g| g.set_compute(id, Some(compute)));
    if let Some(value) = value {
        if let Err(e) = with_graph(|g| g.store_value(id, value)) {
            with_graph(|g| g.discard_node(id));
            graph::drain_graveyard();
            panic!("{e}");
        }
    }
    graph::drain_graveyard();
    Handle::new(id, weak)
}
