//! Coordinate channels appended to a field before lifting.

use ndarray::{concatenate, Array, ArrayD, ArrayView, Axis, Dimension, IxDyn, RemoveAxis};

/// Grid for a field of shape (batch, spatial..., channels): one channel per
/// spatial axis, linearly spaced over [0, 1] along that axis and broadcast
/// over the batch and the remaining axes.
pub fn grid(shape: &[usize]) -> ArrayD<f64> {
    assert!(shape.len() >= 3, "expected (batch, spatial..., channels)");

    let spatial = &shape[1..shape.len() - 1];
    let mut dims = shape.to_vec();
    *dims.last_mut().unwrap() = spatial.len();

    Array::from_shape_fn(IxDyn(&dims), |idx| {
        let c = idx[dims.len() - 1];
        let size = spatial[c];
        if size > 1 {
            idx[c + 1] as f64 / (size - 1) as f64
        } else {
            0.0
        }
    })
}

/// Appends the grid channels of `x` to its last axis.
pub fn with_grid<'a, D>(x: ArrayView<'a, f64, D>) -> Array<f64, D>
where
    D: Dimension + RemoveAxis + 'a,
{
    let grid = grid(x.shape())
        .into_dimensionality::<D>()
        .expect("grid has the rank of its field");
    let last = Axis(x.ndim() - 1);

    let joined = concatenate(last, &[x.view(), grid.view()]).expect("grid matches field shape");
    joined
}
