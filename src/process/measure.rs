use crate::config::Calibration;
use crate::data::model::{Measurement, Plane, Roi, Stack};

/// Measure every slice of `stack` inside `roi`.
///
/// Slice positions are 1-based. A slice with no finite pixels under the
/// mask produces no record; later slices are still measured.
pub fn measure(stack: &Stack, roi: &Roi, calibration: &Calibration) -> Vec<Measurement> {
    let mut out = Vec::with_capacity(stack.len());
    for (i, plane) in stack.planes().iter().enumerate() {
        let slice = i + 1;
        match measure_plane(plane, roi, calibration, slice) {
            Some(m) => out.push(m),
            None => log::warn!("Slice {slice}: ROI covers no measurable pixels, skipped"),
        }
    }
    out
}

fn measure_plane(
    plane: &Plane,
    roi: &Roi,
    calibration: &Calibration,
    slice: usize,
) -> Option<Measurement> {
    let mut count = 0usize;
    let mut sum = 0.0f64;
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    for (x, y) in roi.points() {
        if x >= plane.width() || y >= plane.height() {
            continue;
        }
        let v = plane.get(x, y);
        if !v.is_finite() {
            continue;
        }
        let v = v as f64;
        count += 1;
        sum += v;
        min = min.min(v);
        max = max.max(v);
    }

    if count == 0 {
        return None;
    }

    let area = count as f64 * calibration.pixel_area();
    let mean = sum / count as f64;
    Some(Measurement {
        area,
        min,
        max,
        integrated_density: area * mean,
        mean,
        raw_integrated_density: sum,
        slice,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::PixelDepth;

    fn square_roi(x: usize, y: usize, side: usize) -> Roi {
        Roi {
            x,
            y,
            width: side,
            height: side,
            mask: vec![true; side * side],
            component_area: side * side,
        }
    }

    fn stack_of(values: &[f32], w: usize, h: usize) -> Stack {
        let planes = values
            .iter()
            .map(|&v| Plane::new(w, h, vec![v; w * h]))
            .collect();
        Stack::new(PixelDepth::F32, planes).unwrap()
    }

    #[test]
    fn one_record_per_slice_in_order() {
        let stack = stack_of(&[1.0, 2.0, 3.0, 4.0], 8, 8);
        let rows = measure(&stack, &square_roi(2, 2, 3), &Calibration::default());
        assert_eq!(rows.len(), 4);
        let slices: Vec<_> = rows.iter().map(|m| m.slice).collect();
        assert_eq!(slices, vec![1, 2, 3, 4]);
        assert_eq!(rows[2].raw_integrated_density, 27.0);
        assert_eq!(rows[2].area, 9.0);
        assert_eq!(rows[2].mean, 3.0);
    }

    #[test]
    fn statistics_use_the_mask_not_the_box() {
        // Box 2x2 with one pixel unmasked; that pixel is very bright.
        let mut pixels = vec![0.0f32; 16];
        pixels[5] = 10.0; // (1,1)
        pixels[6] = 20.0; // (2,1)
        pixels[9] = 30.0; // (1,2)
        pixels[10] = 1000.0; // (2,2) excluded
        let stack = Stack::new(PixelDepth::F32, vec![Plane::new(4, 4, pixels)]).unwrap();
        let roi = Roi {
            x: 1,
            y: 1,
            width: 2,
            height: 2,
            mask: vec![true, true, true, false],
            component_area: 3,
        };

        let m = &measure(&stack, &roi, &Calibration::default())[0];
        assert_eq!(m.area, 3.0);
        assert_eq!(m.min, 10.0);
        assert_eq!(m.max, 30.0);
        assert_eq!(m.raw_integrated_density, 60.0);
        assert!((m.mean - 20.0).abs() < 1e-12);
    }

    #[test]
    fn calibration_scales_area_and_int_den_only() {
        let stack = stack_of(&[5.0], 6, 6);
        let cal = Calibration {
            pixel_width: 0.5,
            pixel_height: 0.25,
            unit: "um".into(),
        };
        let m = &measure(&stack, &square_roi(0, 0, 4), &cal)[0];
        assert!((m.area - 16.0 * 0.125).abs() < 1e-12);
        assert!((m.integrated_density - 2.0 * 5.0).abs() < 1e-12);
        assert_eq!(m.raw_integrated_density, 80.0);
    }

    #[test]
    fn nan_slice_is_skipped_without_stopping() {
        let stack = stack_of(&[1.0, f32::NAN, 3.0], 4, 4);
        let rows = measure(&stack, &square_roi(0, 0, 2), &Calibration::default());
        let slices: Vec<_> = rows.iter().map(|m| m.slice).collect();
        assert_eq!(slices, vec![1, 3]);
    }

    #[test]
    fn zero_pixels_are_measured() {
        let stack = stack_of(&[0.0], 4, 4);
        let rows = measure(&stack, &square_roi(1, 1, 2), &Calibration::default());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].raw_integrated_density, 0.0);
        assert_eq!(rows[0].integrated_density, 0.0);
    }
}
