//! The field subsystem: reactive sub-cells of user aggregates.
//!
//! An aggregate opts in by embedding a [`HostId`] and registering [`Field`]
//! sub-cells under it. Wrapping the aggregate in a Source cell back-points
//! every registered sub-cell to the container, so a sub-cell write also
//! wakes the container's observers. Reassigning the container's value
//! re-keys the registry to the new aggregate identity before any observers
//! fire.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::handle::Handle;
use crate::node::NodeId;
use crate::slot::CellValue;

static NEXT_OBJECT: AtomicU64 = AtomicU64::new(1);

/// Stable identity of one reactive aggregate.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ObjectId(u64);

impl ObjectId {
    fn fresh() -> Self {
        Self(NEXT_OBJECT.fetch_add(1, Ordering::Relaxed))
    }
}

/// Identity tag embedded in a reactive aggregate.
///
/// Cloning the aggregate clones the tag and keeps the identity: the clone's
/// `Field` members are weak handles to the *same* sub-cells, so the registry
/// key follows them. Storing a genuinely different aggregate into a
/// container re-keys the registry to the new identity before observers fire.
#[derive(Debug, Clone)]
pub struct HostId(ObjectId);

impl HostId {
    pub fn new() -> Self {
        Self(ObjectId::fresh())
    }

    pub fn object_id(&self) -> ObjectId {
        self.0
    }
}

impl Default for HostId {
    fn default() -> Self {
        Self::new()
    }
}

/// Identity never takes part in aggregate value equality; two aggregates
/// with equal field values compare equal regardless of who owns them.
impl PartialEq for HostId {
    fn eq(&self, _other: &Self) -> bool {
        true
    }
}

impl Eq for HostId {}

/// Implemented by aggregates that carry reactive fields.
pub trait FieldHost {
    fn host_id(&self) -> ObjectId;
}

/// Secondary index: aggregate identity → registered sub-cells.
#[derive(Default)]
pub(crate) struct FieldIndex {
    by_object: FxHashMap<ObjectId, SmallVec<[NodeId; 4]>>,
    owner_of: FxHashMap<NodeId, ObjectId>,
}

impl FieldIndex {
    pub(crate) fn register(&mut self, object: ObjectId, sub: NodeId) {
        self.by_object.entry(object).or_default().push(sub);
        self.owner_of.insert(sub, object);
    }

    pub(crate) fn detach(&mut self, sub: NodeId) {
        if let Some(object) = self.owner_of.remove(&sub) {
            if let Some(subs) = self.by_object.get_mut(&object) {
                subs.retain(|s| *s != sub);
                if subs.is_empty() {
                    self.by_object.remove(&object);
                }
            }
        }
    }

    /// Move every sub-cell registered under `old` to `new`, preserving
    /// registration order.
    pub(crate) fn rekey(&mut self, old: ObjectId, new: ObjectId) {
        if old == new {
            return;
        }
        if let Some(moved) = self.by_object.remove(&old) {
            for &sub in &moved {
                self.owner_of.insert(sub, new);
            }
            self.by_object.entry(new).or_default().extend(moved);
        }
    }

    pub(crate) fn sub_cells(&self, object: ObjectId) -> SmallVec<[NodeId; 4]> {
        self.by_object.get(&object).cloned().unwrap_or_default()
    }
}

/// Caller-facing handle to a Field sub-cell. Dereferences to the plain cell
/// handle, so reads and writes look the same as on any other cell.
pub struct Field<T: CellValue> {
    inner: Handle<T>,
}

impl<T: CellValue> Field<T> {
    pub(crate) fn new(inner: Handle<T>) -> Self {
        Self { inner }
    }

    pub fn handle(&self) -> &Handle<T> {
        &self.inner
    }
}

impl<T: CellValue> Deref for Field<T> {
    type Target = Handle<T>;

    fn deref(&self) -> &Handle<T> {
        &self.inner
    }
}

impl<T: CellValue> Clone for Field<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

/// Identity comparison. Field equality must stay independent of the graph:
/// it runs during the container's own change detection, under the engine
/// borrow, where a value read would deadlock.
impl<T: CellValue> PartialEq for Field<T> {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id() == other.inner.id()
    }
}

impl<T: CellValue> Eq for Field<T> {}

impl<T: CellValue> fmt::Debug for Field<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Field({:?})", self.inner.id())
    }
}
