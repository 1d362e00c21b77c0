//! The capture sink: thread-local state that records which cells a closure
//! reads during one evaluation. Capture-style binding installs a sink, runs
//! the closure once, and turns the recorded reads into the cell's
//! dependents.

use std::cell::RefCell;

use crate::node::NodeId;

thread_local! {
    static SINK: RefCell<Option<Vec<NodeId>>> = const { RefCell::new(None) };
}

/// Install a fresh sink, run `f`, and return its result together with the
/// recorded reads in first-read order (duplicates collapsed). Nested
/// captures stack: the previous sink is restored afterwards.
pub(crate) fn capture<R>(f: impl FnOnce() -> R) -> (R, Vec<NodeId>) {
    let prev = SINK.with(|s| s.replace(Some(Vec::new())));
    let out = f();
    let reads = SINK.with(|s| s.replace(prev)).unwrap_or_default();
    (out, reads)
}

/// Run `f` with no sink installed, so its reads register nowhere. Pulse
/// recomputation and trigger predicates run under this guard: a nested
/// pulse inside a capture-style bind must not leak its reads into the
/// binding cell's dependency set.
pub(crate) fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let prev = SINK.with(|s| s.replace(None));
    let out = f();
    SINK.with(|s| {
        s.replace(prev);
    });
    out
}

/// Record a handle read into the active sink, if one is installed.
pub(crate) fn record(id: NodeId) {
    SINK.with(|s| {
        if let Some(reads) = s.borrow_mut().as_mut() {
            if !reads.contains(&id) {
                reads.push(id);
            }
        }
    });
}
