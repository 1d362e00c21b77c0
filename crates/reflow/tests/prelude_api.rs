use reflow::prelude::*;

#[test]
fn end_to_end_through_the_prelude() {
    let width = var(4i32);
    let height = var(3i32);
    let area = calc_with(|(w, h): (i32, i32)| w * h, (&width, &height));
    assert_eq!(area.get(), 12);

    width.set(10).unwrap();
    assert_eq!(area.get(), 30);

    let framed = expr(&width + 2);
    assert_eq!(framed.get(), 12);
}

#[test]
fn errors_surface_with_their_kind() {
    let c = const_var(1i32);
    let err = c.set(2).unwrap_err();
    assert_eq!(err.kind, FlowErrorKind::NotWritable);
}
