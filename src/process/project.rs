use crate::data::model::{Plane, Stack};
use crate::error::PipelineError;

/// Per-pixel sum over all slices.
///
/// Accumulates in `f64` whatever the source depth, so the result never
/// wraps; the projection is a float plane.
pub fn sum_project(stack: &Stack) -> Result<Plane, PipelineError> {
    let (w, h) = stack.dimensions().ok_or(PipelineError::EmptyStack)?;
    let mut acc = vec![0.0f64; w * h];
    for plane in stack.planes() {
        for (a, &v) in acc.iter_mut().zip(plane.pixels()) {
            *a += v as f64;
        }
    }
    Ok(Plane::new(w, h, acc.into_iter().map(|v| v as f32).collect()))
}
