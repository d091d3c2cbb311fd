use {
    crate::error::{Error, Result},
    ndarray::{ArrayBase, Data, Dimension},
};

/// Fails with `Error::NonFinite` naming `what` if any element of `x` is NaN or
/// infinite.
pub fn ensure_finite<S, D>(what: &str, x: &ArrayBase<S, D>) -> Result<()>
where
    S: Data<Elem = f64>,
    D: Dimension,
{
    if x.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(Error::NonFinite(what.to_string()))
    }
}

/// Total variation sum_i |u[i+1] - u[i]| of a periodic field.
pub fn total_variation(u: &[f64]) -> f64 {
    match u.len() {
        0 => 0.0,
        n => (0..n).map(|i| (u[(i + 1) % n] - u[i]).abs()).sum(),
    }
}

#[cfg(test)]
pub(crate) fn assert_approx_eq_slice(a: &[f64], b: &[f64], epsilon: f64) {
    assert_eq!(a.len(), b.len());
    for (i, e) in a.iter().enumerate() {
        approx::assert_abs_diff_eq!(*e, b[i], epsilon = epsilon);
    }
}
