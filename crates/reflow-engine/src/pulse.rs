//! The propagation protocol.
//!
//! A write to a source or field cell triggers exactly one pulse. The pulse
//! visits each transitively dependent cell at most once, fires observers in
//! insertion order at every node, and defers repeat-marked observers to the
//! tail of the node they repeat-depend on, so a directly repeated input is
//! always settled before its repeat observer recomputes.
//!
//! Closes and invalidations requested while a pulse is in flight are queued
//! and drained when the outermost pulse completes.

use std::any::Any;
use std::cell::RefCell;
use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use reflow_common::FlowError;

use crate::capture;
use crate::graph::{self, with_graph, with_graph_ref};
use crate::invalidate::InvalidateStrategy;
use crate::node::{CellKind, NodeId};

pub(crate) enum DeferredOp {
    /// Explicit close request.
    Close(NodeId),
    /// Weak count reached zero; run the cell's invalidation strategy.
    Unreferenced(NodeId),
}

thread_local! {
    static PENDING: RefCell<VecDeque<DeferredOp>> = const { RefCell::new(VecDeque::new()) };
}

pub(crate) fn request_close(id: NodeId) {
    let _ = PENDING.try_with(|p| p.borrow_mut().push_back(DeferredOp::Close(id)));
    settle();
}

/// Called when the last handle to `id` is dropped.
pub(crate) fn report_unreferenced(id: NodeId) {
    let _ = PENDING.try_with(|p| p.borrow_mut().push_back(DeferredOp::Unreferenced(id)));
    settle();
}

/// Drain queued lifecycle work. A no-op while a pulse is in flight or the
/// graph is otherwise busy; the outermost pulse calls back in when it
/// unwinds.
pub(crate) fn settle() {
    loop {
        if !graph::idle() {
            break;
        }
        let op = PENDING.try_with(|p| p.borrow_mut().pop_front()).ok().flatten();
        let Some(op) = op else { break };
        match op {
            DeferredOp::Close(id) => with_graph(|g| g.close_cascade(id)),
            DeferredOp::Unreferenced(id) => invalidate_now(id),
        }
        graph::drain_graveyard();
    }
    graph::drain_graveyard();
}

fn invalidate_now(id: NodeId) {
    let strategy = with_graph_ref(|g| g.node(id).map(|n| n.invalidate.clone()));
    match strategy {
        None => {}
        Some(InvalidateStrategy::Close) => with_graph(|g| g.close_cascade(id)),
        Some(InvalidateStrategy::KeepComputing) => {}
        Some(InvalidateStrategy::FreezeLastValue) => with_graph(|g| g.freeze(id)),
        Some(InvalidateStrategy::FieldClose) => with_graph(|g| {
            g.detach_field(id);
            g.close_cascade(id);
        }),
        // Custom hooks run outside any borrow and may call back into the API.
        Some(InvalidateStrategy::Custom(hook)) => hook.on_invalid(id),
    }
}

/* ─────────────────────────────── pulses ──────────────────────────────── */

/// Write path for source and field cells: store, consult the cell's own
/// trigger policy, then pulse.
pub(crate) fn write_cell(id: NodeId, value: Box<dyn Any>) -> Result<(), FlowError> {
    let (changed, trigger) = with_graph(|g| g.write_value(id, value))?;
    graph::drain_graveyard();
    if capture::untracked(|| trigger.should_fire(changed)) {
        run_pulse(id, changed);
    } else {
        settle();
    }
    Ok(())
}

/// Run one pulse rooted at `root`, whose new value is already stored.
pub(crate) fn run_pulse(root: NodeId, changed: bool) {
    with_graph(|g| g.pulse_depth += 1);

    let mut visited = FxHashSet::default();
    visited.insert(root);
    let mut waiting: FxHashMap<NodeId, u32> = FxHashMap::default();

    notify(root, changed, &mut visited, &mut waiting);

    // A field write also wakes its enclosing container, after the
    // sub-cell's own observers have fired.
    let container = with_graph_ref(|g| g.node(root).and_then(|n| n.container));
    if let Some(container) = container {
        let trigger = with_graph_ref(|g| g.node(container).map(|n| n.trigger.clone()));
        if let Some(trigger) = trigger {
            if !visited.contains(&container) && capture::untracked(|| trigger.should_fire(true)) {
                visited.insert(container);
                notify(container, true, &mut visited, &mut waiting);
            }
        }
    }

    with_graph(|g| g.pulse_depth -= 1);
    settle();
}

/// The local notify of one node: move its repeat-marked observers into the
/// pulse's wait set, fire the rest in insertion order, then fire the waiters
/// once the main loop is done.
fn notify(
    node: NodeId,
    changed: bool,
    visited: &mut FxHashSet<NodeId>,
    waiting: &mut FxHashMap<NodeId, u32>,
) {
    let (observers, wait_now): (SmallVec<[NodeId; 4]>, SmallVec<[NodeId; 2]>) =
        with_graph_ref(|g| match g.node(node) {
            Some(n) => {
                let wait = n
                    .repeat_observers
                    .iter()
                    .copied()
                    .filter(|o| n.observers.contains(o))
                    .collect();
                (n.observers.clone(), wait)
            }
            None => Default::default(),
        });

    for &o in &wait_now {
        *waiting.entry(o).or_insert(0) += 1;
    }

    for &o in &observers {
        if waiting.get(&o).is_some_and(|&count| count > 0) {
            continue; // fired at the deferring node's tail
        }
        visit(o, changed, visited, waiting);
    }

    for &o in &wait_now {
        let released = match waiting.get_mut(&o) {
            Some(count) => {
                *count -= 1;
                *count == 0
            }
            None => true,
        };
        if released {
            waiting.remove(&o);
            visit(o, changed, visited, waiting);
        }
    }
}

/// Visit one observer: at-most-once guard, trigger policy, recomputation,
/// change detection, recursive propagation.
fn visit(
    id: NodeId,
    changed: bool,
    visited: &mut FxHashSet<NodeId>,
    waiting: &mut FxHashMap<NodeId, u32>,
) {
    if !visited.insert(id) {
        return;
    }

    let Some((kind, trigger, compute)) = with_graph_ref(|g| {
        g.node(id).map(|n| (n.kind, n.trigger.clone(), n.compute.clone()))
    }) else {
        return;
    };

    // Threshold predicates are user closures; the graph stays unborrowed.
    if !capture::untracked(|| trigger.should_fire(changed)) {
        return;
    }

    match kind {
        CellKind::Action => {
            if let Some(f) = compute {
                capture::untracked(|| {
                    f();
                });
            }
        }
        CellKind::Computed => {
            // Frozen cells keep no closure and stop the branch.
            let Some(f) = compute else { return };
            let value = capture::untracked(|| f());
            match with_graph(|g| g.store_value(id, value)) {
                Ok(changed_now) => {
                    graph::drain_graveyard();
                    notify(id, changed_now, visited, waiting);
                }
                Err(_err) => {
                    #[cfg(feature = "tracing")]
                    tracing::error!(
                        cell = %with_graph_ref(|g| g.label(id)),
                        error = %_err,
                        "recomputation result rejected"
                    );
                }
            }
        }
        // Source, Const and Field cells never read anything, so they are
        // never interior pulse visits; keep the hint flowing regardless.
        _ => notify(id, changed, visited, waiting),
    }
}
