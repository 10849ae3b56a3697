use serde::{Deserialize, Serialize};

use crate::data::model::{Plane, Stack};

/// Which side of the local median counts as an outlier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutlierSide {
    Bright,
    Dark,
}

/// Offsets of the circular neighbourhood: `dx² + dy² <= radius² + 1`.
pub fn kernel_offsets(radius: f32) -> Vec<(isize, isize)> {
    let r2 = radius * radius + 1.0;
    let reach = r2.sqrt().floor() as isize;
    let mut offsets = Vec::new();
    for dy in -reach..=reach {
        for dx in -reach..=reach {
            if (dx * dx + dy * dy) as f32 <= r2 {
                offsets.push((dx, dy));
            }
        }
    }
    offsets
}

/// Replace outlier pixels with their neighbourhood median, slice by slice.
///
/// A `Bright` outlier exceeds the median by more than `threshold`; a `Dark`
/// one falls below it by more than `threshold`. Neighbours outside the
/// plane take the nearest edge value.
pub fn remove_outliers(stack: &Stack, radius: f32, threshold: f32, side: OutlierSide) -> Stack {
    let offsets = kernel_offsets(radius);
    let depth = stack.depth();
    stack.map_planes(|plane| {
        let filtered = remove_outliers_plane(plane, &offsets, threshold, side);
        Plane::new(
            plane.width(),
            plane.height(),
            filtered.into_iter().map(|v| depth.quantize(v)).collect(),
        )
    })
}

fn remove_outliers_plane(
    plane: &Plane,
    offsets: &[(isize, isize)],
    threshold: f32,
    side: OutlierSide,
) -> Vec<f32> {
    let (w, h) = (plane.width(), plane.height());
    let mut window = Vec::with_capacity(offsets.len());
    let mut out = Vec::with_capacity(w * h);

    for y in 0..h {
        for x in 0..w {
            let v = plane.get(x, y);
            window.clear();
            window.extend(
                offsets
                    .iter()
                    .map(|&(dx, dy)| plane.get_clamped(x as isize + dx, y as isize + dy)),
            );
            let mid = window.len() / 2;
            let (_, &mut median, _) = window.select_nth_unstable_by(mid, f32::total_cmp);

            let is_outlier = match side {
                OutlierSide::Bright => v - median > threshold,
                OutlierSide::Dark => median - v > threshold,
            };
            out.push(if is_outlier { median } else { v });
        }
    }
    out
}
