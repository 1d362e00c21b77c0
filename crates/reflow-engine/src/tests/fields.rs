use std::cell::RefCell;
use std::rc::Rc;

use crate::field::{FieldHost, HostId, ObjectId};
use crate::{Field, action, calc_with, field, var_host};

#[derive(Clone, PartialEq)]
struct Temperature {
    id: HostId,
    celsius: Field<f64>,
    label: Field<String>,
}

impl Temperature {
    fn new(celsius: f64, label: &str) -> Self {
        let id = HostId::new();
        Self {
            celsius: field(&id, celsius),
            label: field(&id, label.to_string()),
            id,
        }
    }
}

impl FieldHost for Temperature {
    fn host_id(&self) -> ObjectId {
        self.id.object_id()
    }
}

#[test]
fn field_reads_and_writes_like_a_source() {
    let t = Temperature::new(20.0, "room");
    assert_eq!(t.celsius.get(), 20.0);

    t.celsius.set(21.5).unwrap();
    assert_eq!(t.celsius.get(), 21.5);

    let doubled = calc_with(|(c,): (f64,)| c * 2.0, (t.celsius.handle(),));
    t.celsius.set(10.0).unwrap();
    assert_eq!(doubled.get(), 20.0);
}

#[test]
fn sub_cell_writes_wake_own_observers_then_container_observers() {
    let t = Temperature::new(20.0, "room");
    let celsius = t.celsius.clone();
    let wrapped = var_host(t);

    let log: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

    let cr = celsius.cell_ref();
    let l = log.clone();
    let _field_watch = action(move || {
        let _ = cr.get();
        l.borrow_mut().push("field");
    });

    let wr = wrapped.cell_ref();
    let l = log.clone();
    let _container_watch = action(move || {
        let _ = wr.get();
        l.borrow_mut().push("container");
    });

    log.borrow_mut().clear();
    celsius.set(25.0).unwrap();
    assert_eq!(*log.borrow(), vec!["field", "container"]);
}

#[test]
fn container_writes_do_not_fire_sub_cell_observers() {
    let t = Temperature::new(20.0, "room");
    let celsius = t.celsius.clone();
    let wrapped = var_host(t);

    let log: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));
    let cr = celsius.cell_ref();
    let l = log.clone();
    let _field_watch = action(move || {
        let _ = cr.get();
        l.borrow_mut().push("field");
    });

    log.borrow_mut().clear();
    wrapped.set(Temperature::new(0.0, "swap")).unwrap();
    assert_eq!(*log.borrow(), Vec::<&'static str>::new());
}

#[test]
fn reassigning_the_container_re_points_the_registry() {
    let original = Temperature::new(20.0, "room");
    let wrapped = var_host(original);

    let fired = Rc::new(RefCell::new(0u32));
    let wr = wrapped.cell_ref();
    let counter = fired.clone();
    let _container_watch = action(move || {
        let _ = wr.get();
        *counter.borrow_mut() += 1;
    });
    *fired.borrow_mut() = 0;

    // replace the embedded aggregate wholesale
    let replacement = Temperature::new(30.0, "lab");
    let replacement_celsius = replacement.celsius.clone();
    wrapped.set(replacement).unwrap();
    let after_swap = *fired.borrow();
    assert!(after_swap >= 1);

    // the new aggregate's sub-cells are container-linked from the first write
    replacement_celsius.set(31.0).unwrap();
    assert_eq!(*fired.borrow(), after_swap + 1);
}

#[test]
fn cloned_aggregates_keep_their_sub_cells_wired() {
    let original = Temperature::new(20.0, "room");
    let celsius = original.celsius.clone();
    let wrapped = var_host(original.clone());

    let fired = Rc::new(RefCell::new(0u32));
    let wr = wrapped.cell_ref();
    let counter = fired.clone();
    let _container_watch = action(move || {
        let _ = wr.get();
        *counter.borrow_mut() += 1;
    });
    *fired.borrow_mut() = 0;

    // a clone carries the same sub-cells and the same aggregate identity,
    // so storing it leaves the registry wiring intact
    wrapped.set(original.clone()).unwrap();
    let after_swap = *fired.borrow();

    celsius.set(25.0).unwrap();
    assert_eq!(*fired.borrow(), after_swap + 1);
}

#[test]
fn dropping_every_field_handle_detaches_and_closes() {
    let host = HostId::new();
    let downstream;
    {
        let speed = field(&host, 10i32);
        downstream = calc_with(|(v,): (i32,)| v + 1, (speed.handle(),));
    }
    // FieldClose: the sub-cell left the index and its observers cascaded
    assert!(!downstream.is_alive());
}
