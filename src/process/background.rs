use crate::data::model::{Plane, Stack};
use crate::error::PipelineError;

/// Subtract `background` from every slice of `stack`, clamping at zero.
///
/// `background` is either a single plane (applied to every slice) or a
/// stack with the same slice count (applied slice by slice). Results are
/// quantized to the input stack's depth.
pub fn subtract(stack: &Stack, background: &Stack) -> Result<Stack, PipelineError> {
    let (Some((sw, sh)), Some((bw, bh))) = (stack.dimensions(), background.dimensions()) else {
        return if background.is_empty() {
            Err(PipelineError::SliceCountMismatch {
                stack: stack.len(),
                background: 0,
            })
        } else {
            Ok(stack.clone())
        };
    };

    if (sw, sh) != (bw, bh) {
        return Err(PipelineError::DimensionMismatch {
            stack_w: sw,
            stack_h: sh,
            bg_w: bw,
            bg_h: bh,
        });
    }
    if background.len() != 1 && background.len() != stack.len() {
        return Err(PipelineError::SliceCountMismatch {
            stack: stack.len(),
            background: background.len(),
        });
    }

    let depth = stack.depth();
    let bg_planes = background.planes();
    let mut slice = 0;
    Ok(stack.map_planes(|plane| {
        let bg = &bg_planes[if bg_planes.len() == 1 { 0 } else { slice }];
        slice += 1;
        let pixels = plane
            .pixels()
            .iter()
            .zip(bg.pixels())
            .map(|(&v, &b)| depth.quantize((v - b).max(0.0)))
            .collect();
        Plane::new(plane.width(), plane.height(), pixels)
    }))
}
