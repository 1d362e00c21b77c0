use reflow_engine::{InvalidateStrategy, calc_with, var};

#[test]
fn frozen_input_keeps_its_reader_alive_and_constant() {
    let a = var(1i32);
    let b = calc_with(|(x,): (i32,)| x, (&a,));
    {
        let temp = calc_with(|(x,): (i32,)| x, (&a,));
        temp.set_invalidate(InvalidateStrategy::FreezeLastValue)
            .unwrap();
        b.rebind_with(|(x,): (i32,)| x, (&temp,)).unwrap();
    }

    assert!(b.is_alive());
    assert_eq!(b.get(), 1);

    a.set(2).unwrap();
    assert_eq!(a.get(), 2);
    assert_eq!(b.get(), 1);
}
