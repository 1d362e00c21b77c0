//! Type-erased storage for one cell value.
//!
//! Every Source, Const, Computed and Field cell owns exactly one `T` through
//! its slot. The slot is empty only in the window between construction and
//! the first evaluation of a Computed cell; Action cells keep it empty for
//! their whole life.

use std::any::{Any, TypeId};

use reflow_common::{FlowError, FlowErrorKind};

/// Bound required of every cell value type.
///
/// `PartialEq` drives change detection; the comparison is monomorphized into
/// a plain fn pointer when the slot is created, so the graph never needs the
/// concrete type again.
pub trait CellValue: Clone + PartialEq + 'static {}

impl<T: Clone + PartialEq + 'static> CellValue for T {}

type EqFn = fn(&dyn Any, &dyn Any) -> bool;

fn eq_values<T: PartialEq + 'static>(a: &dyn Any, b: &dyn Any) -> bool {
    match (a.downcast_ref::<T>(), b.downcast_ref::<T>()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}

pub(crate) struct ValueSlot {
    value: Option<Box<dyn Any>>,
    ty: TypeId,
    eq: Option<EqFn>,
}

impl ValueSlot {
    /// An empty slot declared to hold `T`.
    pub(crate) fn typed<T: CellValue>() -> Self {
        Self {
            value: None,
            ty: TypeId::of::<T>(),
            eq: Some(eq_values::<T>),
        }
    }

    /// The permanently empty slot of an Action cell.
    pub(crate) fn empty() -> Self {
        Self {
            value: None,
            ty: TypeId::of::<()>(),
            eq: None,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.value.is_none()
    }

    pub(crate) fn get<T: CellValue>(&self) -> Option<T> {
        self.value.as_ref()?.downcast_ref::<T>().cloned()
    }

    pub(crate) fn peek<T: CellValue>(&self) -> Option<&T> {
        self.value.as_ref()?.downcast_ref::<T>()
    }

    /// Does `value`'s concrete type match the declared value type?
    pub(crate) fn matches(&self, value: &dyn Any) -> bool {
        value.type_id() == self.ty
    }

    /// Replace the stored value in place.
    ///
    /// Returns whether the value changed (an empty slot always counts as
    /// changed) together with the displaced box, which the caller must drop
    /// outside any graph borrow. Values of the wrong concrete type are
    /// rejected without touching the slot.
    pub(crate) fn store(
        &mut self,
        new: Box<dyn Any>,
    ) -> Result<(bool, Option<Box<dyn Any>>), FlowError> {
        if (*new).type_id() != self.ty {
            return Err(FlowError::new(FlowErrorKind::ReturnTypeMismatch)
                .with_message("stored value does not match the declared value type"));
        }

        let changed = match (&self.value, self.eq) {
            (Some(old), Some(eq)) => !eq(old.as_ref(), new.as_ref()),
            _ => true,
        };
        let displaced = self.value.replace(new);
        Ok((changed, displaced))
    }

    /// Empty the slot, handing the old value back for deferred dropping.
    pub(crate) fn clear(&mut self) -> Option<Box<dyn Any>> {
        self.value.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_reports_change() {
        let mut slot = ValueSlot::typed::<i32>();
        assert!(slot.is_empty());

        let (changed, old) = slot.store(Box::new(1)).unwrap();
        assert!(changed);
        assert!(old.is_none());

        let (changed, old) = slot.store(Box::new(1)).unwrap();
        assert!(!changed);
        assert!(old.is_some());

        let (changed, _) = slot.store(Box::new(2)).unwrap();
        assert!(changed);
        assert_eq!(slot.get::<i32>(), Some(2));
    }

    #[test]
    fn store_rejects_wrong_type() {
        let mut slot = ValueSlot::typed::<i32>();
        slot.store(Box::new(1)).unwrap();

        let err = slot.store(Box::new("nope".to_string())).unwrap_err();
        assert_eq!(err.kind, FlowErrorKind::ReturnTypeMismatch);
        assert_eq!(slot.get::<i32>(), Some(1));
    }

    #[test]
    fn peek_borrows_without_cloning() {
        let mut slot = ValueSlot::typed::<String>();
        slot.store(Box::new("abc".to_string())).unwrap();
        assert_eq!(slot.peek::<String>().map(|s| s.len()), Some(3));
    }
}
