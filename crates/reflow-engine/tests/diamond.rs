use std::cell::Cell;
use std::rc::Rc;

use reflow_engine::{calc, calc_with, var};

#[test]
fn indirect_diamond_evaluates_each_cell_once() {
    let a = var(1i32);
    let evals = Rc::new(Cell::new((0u32, 0u32, 0u32)));

    let ar = a.cell_ref();
    let e = evals.clone();
    let branch_a = calc(move || {
        let (x, y, z) = e.get();
        e.set((x + 1, y, z));
        ar.get() + 1
    });
    let e = evals.clone();
    let branch_b = calc(move || {
        let (x, y, z) = e.get();
        e.set((x, y + 1, z));
        ar.get() + 2
    });
    let (ra, rb) = (branch_a.cell_ref(), branch_b.cell_ref());
    let e = evals.clone();
    let ds = calc(move || {
        let (x, y, z) = e.get();
        e.set((x, y, z + 1));
        ra.get() + rb.get() + 5
    });

    assert_eq!(ds.get(), 10);
    evals.set((0, 0, 0));

    a.set(2).unwrap();
    assert_eq!(evals.get(), (1, 1, 1));
    assert_eq!(ds.get(), 11);
}

#[test]
fn direct_repeat_dependency_sees_the_post_pulse_value() {
    let source = var(1i32);
    let branch = calc_with(|(x,): (i32,)| x + 1, (&source,));
    let joined = calc_with(|(s, b): (i32, i32)| s * 100 + b, (&source, &branch));
    assert_eq!(joined.get(), 102);

    source.set(2).unwrap();
    // 203, not 202: `branch` settled before `joined` read it
    assert_eq!(joined.get(), 203);
}
