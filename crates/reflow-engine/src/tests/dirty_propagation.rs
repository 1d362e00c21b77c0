use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::trigger::TriggerPolicy;
use crate::{action, action_with, calc_with, var};

#[test]
fn chain_recomputes_in_one_pulse() {
    let a = var(1i32);
    let b = calc_with(|(x,): (i32,)| x * 10, (&a,));
    let c = calc_with(|(x,): (i32,)| x + 1, (&b,));

    a.set(3).unwrap();
    assert_eq!(b.get(), 30);
    assert_eq!(c.get(), 31);
}

#[test]
fn observers_fire_in_attach_order() {
    let a = var(0i32);
    let log: Rc<RefCell<Vec<&'static str>>> = Rc::new(RefCell::new(Vec::new()));

    let ar = a.cell_ref();
    let l = log.clone();
    let _first = action(move || {
        let _ = ar.get();
        l.borrow_mut().push("first");
    });
    let l = log.clone();
    let _second = action(move || {
        let _ = ar.get();
        l.borrow_mut().push("second");
    });
    let l = log.clone();
    let _third = action(move || {
        let _ = ar.get();
        l.borrow_mut().push("third");
    });

    log.borrow_mut().clear(); // drop the attach runs
    a.set(1).unwrap();
    assert_eq!(*log.borrow(), vec!["first", "second", "third"]);
}

#[test]
fn on_change_blocks_unchanged_pulses() {
    let a = var(1i32);
    let evals = Rc::new(Cell::new(0u32));

    let counter = evals.clone();
    let doubled = calc_with(
        move |(x,): (i32,)| {
            counter.set(counter.get() + 1);
            x * 2
        },
        (&a,),
    );
    doubled.set_trigger(TriggerPolicy::OnChange).unwrap();
    assert_eq!(evals.get(), 1); // bind-time evaluation

    a.set(1).unwrap(); // no value change
    assert_eq!(evals.get(), 1);

    a.set(2).unwrap();
    assert_eq!(evals.get(), 2);
    assert_eq!(doubled.get(), 4);
}

#[test]
fn unchanged_result_gates_on_change_observers_only() {
    let a = var(1i32);
    // integer division: 1 → 0 and 5 → 0, the result does not change
    let tens = calc_with(|(x,): (i32,)| x / 10, (&a,));

    let always_runs = Rc::new(Cell::new(0u32));
    let gated_runs = Rc::new(Cell::new(0u32));

    let counter = always_runs.clone();
    let _always = action_with(
        move |(_v,): (i32,)| {
            counter.set(counter.get() + 1);
        },
        (&tens,),
    );
    let counter = gated_runs.clone();
    let gated = action_with(
        move |(_v,): (i32,)| {
            counter.set(counter.get() + 1);
        },
        (&tens,),
    );
    gated.set_trigger(TriggerPolicy::OnChange).unwrap();

    a.set(5).unwrap(); // tens recomputes to 0, unchanged
    assert_eq!(always_runs.get(), 2); // attach + pulse
    assert_eq!(gated_runs.get(), 1); // attach only

    a.set(25).unwrap(); // tens becomes 2
    assert_eq!(always_runs.get(), 3);
    assert_eq!(gated_runs.get(), 2);
}

#[test]
fn nested_writes_run_as_their_own_pulse() {
    let a = var(1i32);
    let b = var(10i32);
    let doubled_b = calc_with(|(x,): (i32,)| x * 2, (&b,));

    // an action on `a` that forwards into `b`
    let ar = a.cell_ref();
    let forward = b.clone();
    let _bridge = action(move || {
        let v = ar.get();
        if v > 1 {
            forward.set(v * 100).unwrap();
        }
    });

    a.set(3).unwrap();
    assert_eq!(b.get(), 300);
    assert_eq!(doubled_b.get(), 600);
}
