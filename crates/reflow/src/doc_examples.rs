use crate::{FlowError, calc_with, var};

/// Build a two-cell pipeline, write the source, and return the derived
/// value.
///
/// This helper is intended for documentation examples to avoid repetitive
/// setup.
///
/// # Example
///
/// ```rust
/// # use reflow::doc_examples::fahrenheit_label;
/// let label = fahrenheit_label(25.0)?;
/// assert_eq!(label, "77°F");
/// # Ok::<(), reflow::FlowError>(())
/// ```
pub fn fahrenheit_label(celsius: f64) -> Result<String, FlowError> {
    let c = var(0.0f64);
    let label = calc_with(
        |(c,): (f64,)| format!("{:.0}°F", c * 9.0 / 5.0 + 32.0),
        (&c,),
    );
    c.set(celsius)?;
    Ok(label.get())
}
