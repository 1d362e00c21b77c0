use reflow_engine::{FlowErrorKind, calc_with, var};

#[test]
fn closing_the_loop_is_rejected_and_prior_bindings_survive() {
    let a = var(1i32);
    let ds_c = calc_with(|(x,): (i32,)| x + 1, (&a,));
    let ds_b = calc_with(|(x,): (i32,)| x + 1, (&ds_c,));
    let ds_a = calc_with(|(x,): (i32,)| x + 1, (&ds_b,));
    assert_eq!(ds_a.get(), 4);

    let err = ds_c
        .rebind_with(|(x,): (i32,)| x + 1, (&ds_a,))
        .unwrap_err();
    assert_eq!(err.kind, FlowErrorKind::CycleDependency);

    // prior bindings preserved end to end
    assert_eq!(ds_c.dependents(), vec![a.id()]);
    a.set(10).unwrap();
    assert_eq!(ds_c.get(), 11);
    assert_eq!(ds_b.get(), 12);
    assert_eq!(ds_a.get(), 13);
}
