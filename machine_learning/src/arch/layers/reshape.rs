use ndarray::{Array2, Array3};

use crate::Result;

/// Merges the batch and step axes, `(b, s, c)` -> `(b * s, c)`.
pub(super) fn to_rows(x: Array3<f32>) -> Result<Array2<f32>> {
    let (b, s, c) = x.dim();
    let x = if x.is_standard_layout() {
        x
    } else {
        x.as_standard_layout().into_owned()
    };

    Ok(x.into_shape_with_order((b * s, c))?)
}

/// Splits the rows back into batch and step axes, `(b * s, c)` -> `(b, s, c)`.
pub(super) fn from_rows(x: Array2<f32>, batch: usize, steps: usize) -> Result<Array3<f32>> {
    let c = x.ncols();
    let x = if x.is_standard_layout() {
        x
    } else {
        x.as_standard_layout().into_owned()
    };

    Ok(x.into_shape_with_order((batch, steps, c))?)
}
