//! The dependency graph: a thread-local singleton owning every cell on the
//! current thread.
//!
//! Nodes live in a grow-only arena indexed by [`NodeId`]; closing a cell
//! leaves a tombstone so stale handles resolve to nothing instead of
//! aliasing a newer cell. All three bind pre-checks (self-dependency,
//! staged-edge cycle scan, repeat-dependency marking) complete before any
//! mutation commits; a failed bind leaves no observable change.
//!
//! User-droppable data (displaced values, replaced closures) is never
//! dropped while the graph borrow is held. Mutating methods push it into a
//! graveyard that the calling layer drains once the borrow ends, so user
//! `Drop` impls are free to touch other cells.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use rustc_hash::FxHashSet;
use smallvec::SmallVec;

use reflow_common::{FlowError, FlowErrorKind};

use crate::config::EngineConfig;
use crate::field::{FieldIndex, ObjectId};
use crate::node::{CellKind, ComputeFn, Node, NodeId};
use crate::slot::CellValue;
use crate::trigger::TriggerPolicy;

thread_local! {
    static GRAPH: RefCell<DependencyGraph> = RefCell::new(DependencyGraph::new());
}

/// Run `f` with exclusive access to the current thread's graph.
pub(crate) fn with_graph<R>(f: impl FnOnce(&mut DependencyGraph) -> R) -> R {
    GRAPH.with(|g| f(&mut g.borrow_mut()))
}

/// Run `f` with shared access. Reads nest: a closure running under a shared
/// borrow may read further cells.
pub(crate) fn with_graph_ref<R>(f: impl FnOnce(&DependencyGraph) -> R) -> R {
    GRAPH.with(|g| f(&g.borrow()))
}

/// True when the graph can be mutated right now: not torn down, not
/// borrowed, and no pulse in flight.
pub(crate) fn idle() -> bool {
    GRAPH
        .try_with(|g| match g.try_borrow_mut() {
            Ok(g) => g.pulse_depth == 0,
            Err(_) => false,
        })
        .unwrap_or(false)
}

/// Drop everything the graph detached under its borrow. Safe to call at any
/// depth; a no-op when the graph is busy or already torn down.
pub(crate) fn drain_graveyard() {
    let items = GRAPH
        .try_with(|g| match g.try_borrow_mut() {
            Ok(mut g) => std::mem::take(&mut g.graveyard),
            Err(_) => Vec::new(),
        })
        .unwrap_or_default();
    drop(items);
}

/// Read a cell's current value, faulting on a dead or empty cell. Used by
/// argument-style recomputation closures, which read with the same
/// null-handle fault semantics as `Handle::get`.
pub(crate) fn read_or_fault<T: CellValue>(id: NodeId) -> T {
    match with_graph_ref(|g| g.read_value::<T>(id)) {
        Ok(v) => v,
        Err(e) => panic!("{e}"),
    }
}

/// Number of live cells on the current thread.
pub fn live_cells() -> usize {
    with_graph_ref(|g| g.node_count())
}

pub struct DependencyGraph {
    nodes: Vec<Option<Node>>,
    config: EngineConfig,
    fields: FieldIndex,

    /// Depth of the pulse currently in flight; re-entrant writes nest.
    pub(crate) pulse_depth: u32,

    /// Detached user data awaiting a drop outside the graph borrow.
    pub(crate) graveyard: Vec<Box<dyn Any>>,
}

impl DependencyGraph {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            config: EngineConfig::default(),
            fields: FieldIndex::default(),
            pulse_depth: 0,
            graveyard: Vec::new(),
        }
    }

    pub(crate) fn set_config(&mut self, config: EngineConfig) {
        if config.initial_capacity > self.nodes.len() {
            self.nodes.reserve(config.initial_capacity - self.nodes.len());
        }
        self.config = config;
    }

    pub(crate) fn default_trigger(&self) -> TriggerPolicy {
        self.config.default_trigger.clone()
    }

    /* ─────────────────────────── node access ─────────────────────────── */

    pub(crate) fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.as_index()).and_then(|slot| slot.as_ref())
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.as_index()).and_then(|slot| slot.as_mut())
    }

    pub fn is_alive(&self, id: NodeId) -> bool {
        self.node(id).is_some()
    }

    pub fn node_count(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn kind_of(&self, id: NodeId) -> Option<CellKind> {
        self.node(id).map(|n| n.kind)
    }

    pub fn name_of(&self, id: NodeId) -> Option<String> {
        self.node(id).and_then(|n| n.name.clone())
    }

    pub fn dependents_of(&self, id: NodeId) -> Option<Vec<NodeId>> {
        self.node(id).map(|n| n.dependents.to_vec())
    }

    pub fn observers_of(&self, id: NodeId) -> Option<Vec<NodeId>> {
        self.node(id).map(|n| n.observers.to_vec())
    }

    /// Debug label: the cell's name when set, `#index` otherwise.
    pub(crate) fn label(&self, id: NodeId) -> String {
        match self.node(id).and_then(|n| n.name.as_deref()) {
            Some(name) => name.to_string(),
            None => format!("#{}", id.0),
        }
    }

    fn closed_error(&self) -> FlowError {
        FlowError::new(FlowErrorKind::NullHandleAccess).with_message("cell was closed")
    }

    /* ──────────────────────────── lifecycle ──────────────────────────── */

    /// Register a node, returning its identity and the weak counter shared
    /// with caller handles.
    pub(crate) fn create_node(&mut self, node: Node) -> Result<(NodeId, Rc<Cell<u32>>), FlowError> {
        if let Some(max) = self.config.max_nodes {
            if self.nodes.len() >= max {
                return Err(FlowError::new(FlowErrorKind::CapacityExceeded)
                    .with_message(format!("engine is capped at {max} cells")));
            }
        }
        let weak = Rc::clone(&node.weak);
        let id = NodeId::new(self.nodes.len() as u32);
        self.nodes.push(Some(node));
        Ok((id, weak))
    }

    /// Remove a node that never committed any edges (constructor rollback).
    pub(crate) fn discard_node(&mut self, id: NodeId) {
        if let Some(mut node) = self.nodes.get_mut(id.as_index()).and_then(|slot| slot.take()) {
            if let Some(value) = node.slot.clear() {
                self.graveyard.push(value);
            }
            if let Some(compute) = node.compute.take() {
                self.graveyard.push(Box::new(compute));
            }
        }
    }

    /* ─────────────────────────── edge checks ─────────────────────────── */

    /// Would installing `source → targets` close a loop? Classic DFS over
    /// the staged edge set with a visited set and an in-recursion set; a
    /// back-edge into the recursion stack means a cycle.
    pub(crate) fn would_cycle(&self, source: NodeId, targets: &[NodeId]) -> bool {
        let mut visited = FxHashSet::default();
        let mut on_stack = FxHashSet::default();
        let mut stack: Vec<(NodeId, usize)> = vec![(source, 0)];
        visited.insert(source);
        on_stack.insert(source);

        while let Some(top) = stack.last_mut() {
            let (id, edge) = (top.0, top.1);
            top.1 += 1;

            let child = if id == source {
                targets.get(edge).copied()
            } else {
                self.node(id).and_then(|n| n.dependents.get(edge).copied())
            };

            match child {
                Some(child) => {
                    if on_stack.contains(&child) {
                        return true;
                    }
                    if visited.insert(child) {
                        on_stack.insert(child);
                        stack.push((child, 0));
                    }
                }
                None => {
                    stack.pop();
                    on_stack.remove(&id);
                }
            }
        }
        false
    }

    /// Can `goal` be reached from `from` over committed dependent edges?
    fn reaches(&self, from: NodeId, goal: NodeId) -> bool {
        if from == goal {
            return true;
        }
        let mut visited = FxHashSet::default();
        let mut stack = vec![from];
        visited.insert(from);
        while let Some(id) = stack.pop() {
            if let Some(n) = self.node(id) {
                for &dep in &n.dependents {
                    if dep == goal {
                        return true;
                    }
                    if visited.insert(dep) {
                        stack.push(dep);
                    }
                }
            }
        }
        false
    }

    /// Targets that the binder also reaches through a sibling target: a
    /// second path, so notification of the binder must be deferred until
    /// that target has settled within a pulse.
    fn find_repeats(&self, targets: &[NodeId]) -> SmallVec<[NodeId; 2]> {
        let mut repeats = SmallVec::new();
        for (i, &t) in targets.iter().enumerate() {
            let twice = targets
                .iter()
                .enumerate()
                .any(|(j, &other)| j != i && self.reaches(other, t));
            if twice {
                repeats.push(t);
            }
        }
        repeats
    }

    /* ─────────────────────────── bind / unbind ───────────────────────── */

    /// Install `source → targets` after the pre-checks pass, replacing any
    /// prior edges of `source`. Checks run in order — self-dependency,
    /// staged cycle scan, repeat-dependency marking — and all complete
    /// before the first mutation, so failure leaves the prior binding (and
    /// observer insertion order) untouched.
    pub(crate) fn bind(&mut self, source: NodeId, targets: &[NodeId]) -> Result<(), FlowError> {
        if self.node(source).is_none() {
            return Err(self.closed_error());
        }

        let mut staged: SmallVec<[NodeId; 4]> = SmallVec::new();
        for &t in targets {
            if !staged.contains(&t) {
                staged.push(t);
            }
        }
        for &t in &staged {
            if self.node(t).is_none() {
                return Err(self.closed_error().with_cell(self.label(source)));
            }
        }

        if staged.contains(&source) {
            #[cfg(feature = "tracing")]
            tracing::warn!(cell = %self.label(source), "bind rejected: cell depends on itself");
            return Err(FlowError::new(FlowErrorKind::CycleDependency)
                .with_message("cell depends on itself")
                .with_cell(self.label(source)));
        }

        if self.would_cycle(source, &staged) {
            #[cfg(feature = "tracing")]
            tracing::warn!(cell = %self.label(source), "bind rejected: dependency cycle");
            return Err(FlowError::new(FlowErrorKind::CycleDependency)
                .with_message("bind would create a dependency cycle")
                .with_cell(self.label(source)));
        }

        let repeats = self.find_repeats(&staged);
        #[cfg(feature = "tracing")]
        for &t in &repeats {
            tracing::info!(
                cell = %self.label(source),
                input = %self.label(t),
                "repeat dependency: notification will be deferred"
            );
        }

        self.unbind(source);
        if let Some(n) = self.node_mut(source) {
            n.dependents = staged.clone();
            n.repeat_targets = repeats.clone();
        }
        for &t in &staged {
            if let Some(n) = self.node_mut(t) {
                n.observers.push(source);
            }
        }
        for &t in &repeats {
            if let Some(n) = self.node_mut(t) {
                n.repeat_observers.push(source);
            }
        }
        Ok(())
    }

    /// Remove every edge `source → *`, including repeat marks.
    pub(crate) fn unbind(&mut self, source: NodeId) {
        let (deps, reps) = match self.node_mut(source) {
            Some(n) => (
                std::mem::take(&mut n.dependents),
                std::mem::take(&mut n.repeat_targets),
            ),
            None => return,
        };
        for t in deps {
            if let Some(n) = self.node_mut(t) {
                n.observers.retain(|o| *o != source);
            }
        }
        for t in reps {
            if let Some(n) = self.node_mut(t) {
                n.repeat_observers.retain(|o| *o != source);
            }
        }
    }

    /* ─────────────────────────── close / freeze ──────────────────────── */

    /// Cascade-close: every cell reachable from `root` over observer edges
    /// (the cells that read it, transitively) is unbound and dropped,
    /// `root` included. Nothing else is touched.
    pub(crate) fn close_cascade(&mut self, root: NodeId) {
        if self.node(root).is_none() {
            return;
        }

        let mut doomed: Vec<NodeId> = Vec::new();
        let mut seen = FxHashSet::default();
        let mut stack = vec![root];
        seen.insert(root);
        while let Some(id) = stack.pop() {
            doomed.push(id);
            if let Some(n) = self.node(id) {
                for &o in &n.observers {
                    if seen.insert(o) {
                        stack.push(o);
                    }
                }
            }
        }

        #[cfg(feature = "tracing")]
        tracing::debug!(root = %self.label(root), count = doomed.len(), "cascade close");

        for &id in &doomed {
            self.unbind(id);
            self.fields.detach(id);

            // A dying container orphans its registered sub-cells.
            let object = self.node(id).and_then(|n| n.object);
            if let Some(object) = object {
                for sub in self.fields.sub_cells(object) {
                    if let Some(n) = self.node_mut(sub) {
                        n.container = None;
                    }
                }
            }

            if let Some(mut node) = self.nodes.get_mut(id.as_index()).and_then(|slot| slot.take()) {
                if let Some(value) = node.slot.clear() {
                    self.graveyard.push(value);
                }
                if let Some(compute) = node.compute.take() {
                    self.graveyard.push(Box::new(compute));
                }
            }
        }
    }

    /// FreezeLastValue: cut the cell off from its inputs and drop its
    /// closure. Downstream observers keep reading the last stored value.
    pub(crate) fn freeze(&mut self, id: NodeId) {
        self.unbind(id);
        if let Some(n) = self.node_mut(id) {
            if let Some(compute) = n.compute.take() {
                self.graveyard.push(Box::new(compute));
            }
        }
    }

    /* ─────────────────────────── values ──────────────────────────────── */

    pub(crate) fn read_value<T: CellValue>(&self, id: NodeId) -> Result<T, FlowError> {
        let node = self.node(id).ok_or_else(|| self.closed_error())?;
        node.slot.get::<T>().ok_or_else(|| {
            let err = FlowError::new(FlowErrorKind::NullHandleAccess).with_cell(self.label(id));
            if node.slot.is_empty() {
                err.with_message("cell holds no value")
            } else {
                err.with_message("value type does not match the handle type")
            }
        })
    }

    /// Reject a value whose concrete type differs from the slot's declared
    /// type, without touching the slot.
    pub(crate) fn check_store_type(&self, id: NodeId, value: &dyn Any) -> Result<(), FlowError> {
        let node = self.node(id).ok_or_else(|| self.closed_error())?;
        if node.slot.matches(value) {
            Ok(())
        } else {
            Err(FlowError::new(FlowErrorKind::ReturnTypeMismatch)
                .with_message("closure result does not match the cell's declared value type")
                .with_cell(self.label(id)))
        }
    }

    /// Store a recomputed or written value; returns the changed flag.
    pub(crate) fn store_value(&mut self, id: NodeId, value: Box<dyn Any>) -> Result<bool, FlowError> {
        let label = self.label(id);
        let (changed, displaced) = match self.node_mut(id) {
            Some(n) => n.slot.store(value).map_err(|e| e.with_cell(label))?,
            None => return Err(self.closed_error()),
        };
        if let Some(old) = displaced {
            self.graveyard.push(old);
        }
        Ok(changed)
    }

    /// Source/Field write path: writability check, aggregate re-keying,
    /// store. Returns the changed flag and the cell's trigger policy so the
    /// caller can consult it outside the borrow.
    pub(crate) fn write_value(
        &mut self,
        id: NodeId,
        value: Box<dyn Any>,
    ) -> Result<(bool, TriggerPolicy), FlowError> {
        let (writable, host_of) = match self.node(id) {
            Some(n) => (n.kind.user_writable(), n.host_of),
            None => return Err(self.closed_error()),
        };
        if !writable {
            return Err(FlowError::new(FlowErrorKind::NotWritable)
                .with_message("only source and field cells accept writes")
                .with_cell(self.label(id)));
        }

        // Re-point the field registry before any observer can fire.
        if let Some(host_of) = host_of {
            if let Some(object) = host_of(value.as_ref()) {
                self.adopt(id, object);
            }
        }

        let changed = self.store_value(id, value)?;
        let trigger = self.node(id).map(|n| n.trigger.clone()).unwrap_or_default();
        Ok((changed, trigger))
    }

    pub(crate) fn set_compute(&mut self, id: NodeId, compute: Option<Rc<ComputeFn>>) {
        if let Some(n) = self.node_mut(id) {
            let old = std::mem::replace(&mut n.compute, compute);
            if let Some(old) = old {
                self.graveyard.push(Box::new(old));
            }
        }
    }

    /* ─────────────────────────── policies / names ────────────────────── */

    pub(crate) fn set_trigger(&mut self, id: NodeId, trigger: TriggerPolicy) -> Result<(), FlowError> {
        match self.node_mut(id) {
            Some(n) => {
                n.trigger = trigger;
                Ok(())
            }
            None => Err(self.closed_error()),
        }
    }

    pub(crate) fn set_invalidate(
        &mut self,
        id: NodeId,
        strategy: crate::invalidate::InvalidateStrategy,
    ) -> Result<(), FlowError> {
        match self.node_mut(id) {
            Some(n) => {
                n.invalidate = strategy;
                Ok(())
            }
            None => Err(self.closed_error()),
        }
    }

    pub(crate) fn set_name(&mut self, id: NodeId, name: String) -> Result<(), FlowError> {
        match self.node_mut(id) {
            Some(n) => {
                n.name = Some(name);
                Ok(())
            }
            None => Err(self.closed_error()),
        }
    }

    /* ─────────────────────────── fields ──────────────────────────────── */

    pub(crate) fn register_field(&mut self, object: ObjectId, sub: NodeId) {
        self.fields.register(object, sub);
    }

    pub(crate) fn detach_field(&mut self, sub: NodeId) {
        self.fields.detach(sub);
    }

    /// Bind `container` to the aggregate identity `object`: carry sub-cells
    /// registered under the container's previous identity over to the new
    /// one, then back-point every sub-cell under `object` to the container.
    pub(crate) fn adopt(&mut self, container: NodeId, object: ObjectId) {
        let old = match self.node(container) {
            Some(n) => n.object,
            None => return,
        };
        if old == Some(object) {
            return;
        }
        if let Some(old) = old {
            self.fields.rekey(old, object);
        }
        for sub in self.fields.sub_cells(object) {
            if let Some(n) = self.node_mut(sub) {
                n.container = Some(container);
            }
        }
        if let Some(n) = self.node_mut(container) {
            n.object = Some(object);
        }
    }
}
