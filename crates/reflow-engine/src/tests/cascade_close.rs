use crate::{action, calc_with, var};

#[test]
fn close_takes_exactly_the_observer_closure() {
    let a = var(1i32);
    let b = var(2i32);

    let ds_a = calc_with(|(x,): (i32,)| x + 1, (&a,));
    let ds_b = calc_with(|(x,): (i32,)| x + 1, (&ds_a,));
    let side = calc_with(|(x,): (i32,)| x * 2, (&b,));
    let joined = calc_with(|(x, y): (i32, i32)| x + y, (&side, &ds_b));

    ds_a.close();

    assert!(!ds_a.is_alive());
    assert!(!ds_b.is_alive());
    assert!(!joined.is_alive()); // reads ds_b transitively
    assert!(side.is_alive());
    assert!(a.is_alive());
    assert!(b.is_alive());

    // mirrors are clean on the survivors
    assert!(a.observers().is_empty());
    assert!(side.observers().is_empty());

    // survivors keep propagating
    b.set(10).unwrap();
    assert_eq!(side.get(), 20);
}

#[test]
fn closing_a_source_kills_the_whole_fan_out() {
    let a = var(1i32);
    let left = calc_with(|(x,): (i32,)| x + 1, (&a,));
    let right = calc_with(|(x,): (i32,)| x + 2, (&a,));

    a.close();
    assert!(!a.is_alive());
    assert!(!left.is_alive());
    assert!(!right.is_alive());
}

#[test]
fn close_requested_mid_pulse_is_deferred_to_pulse_end() {
    let a = var(1i32);
    let derived = calc_with(|(x,): (i32,)| x + 1, (&a,));

    let target = derived.clone();
    let ar = a.cell_ref();
    let _closer = action(move || {
        if ar.get() > 1 {
            target.close();
        }
    });

    // `derived` fires before the closer in attach order, so the pulse that
    // requests the close still completes normally
    a.set(2).unwrap();
    assert_eq!(a.get(), 2);
    assert!(!derived.is_alive());
}

#[test]
fn double_close_is_harmless() {
    let a = var(1i32);
    a.close();
    a.close();
    assert!(!a.is_alive());
}
