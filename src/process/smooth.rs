use crate::data::model::{Plane, Stack};

/// Normalised 1-D Gaussian kernel, `2 * radius + 1` taps.
///
/// The radius is `ceil(sigma * sqrt(-2 ln(accuracy))) + 1`, so the dropped
/// tail is bounded by `accuracy` relative to the centre tap.
pub fn gaussian_kernel(sigma: f32, accuracy: f32) -> Vec<f32> {
    let reach = (sigma as f64 * (-2.0 * (accuracy as f64).ln()).sqrt()).ceil() as isize + 1;
    let two_s2 = 2.0 * (sigma as f64) * (sigma as f64);
    let raw: Vec<f64> = (-reach..=reach)
        .map(|x| (-((x * x) as f64) / two_s2).exp())
        .collect();
    let sum: f64 = raw.iter().sum();
    raw.into_iter().map(|k| (k / sum) as f32).collect()
}

/// Separable Gaussian blur of every slice; out-of-plane samples take the
/// nearest edge value. Results are quantized to the stack's depth.
pub fn gaussian_blur(stack: &Stack, sigma: f32, accuracy: f32) -> Stack {
    let kernel = gaussian_kernel(sigma, accuracy);
    let depth = stack.depth();
    stack.map_planes(|plane| {
        let blurred = blur_plane(plane, &kernel);
        Plane::new(
            plane.width(),
            plane.height(),
            blurred.into_iter().map(|v| depth.quantize(v)).collect(),
        )
    })
}

fn blur_plane(plane: &Plane, kernel: &[f32]) -> Vec<f32> {
    let (w, h) = (plane.width(), plane.height());
    let half = (kernel.len() / 2) as isize;

    // Horizontal pass
    let mut temp = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (k, &kv) in kernel.iter().enumerate() {
                acc += kv * plane.get_clamped(x as isize + k as isize - half, y as isize);
            }
            temp[y * w + x] = acc;
        }
    }

    // Vertical pass
    let temp = Plane::new(w, h, temp);
    let mut out = vec![0.0f32; w * h];
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0f32;
            for (k, &kv) in kernel.iter().enumerate() {
                acc += kv * temp.get_clamped(x as isize, y as isize + k as isize - half);
            }
            out[y * w + x] = acc;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::PixelDepth;

    #[test]
    fn kernel_is_normalised_and_symmetric() {
        let k = gaussian_kernel(2.0, 0.01);
        assert_eq!(k.len(), 17);
        let sum: f32 = k.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        for i in 0..k.len() / 2 {
            assert!((k[i] - k[k.len() - 1 - i]).abs() < 1e-7);
        }
        assert!(k[8] > k[7]);
    }

    #[test]
    fn constant_plane_is_unchanged() {
        let stack = Stack::new(PixelDepth::F32, vec![Plane::new(9, 6, vec![42.0; 54])]).unwrap();
        let out = gaussian_blur(&stack, 2.0, 0.01);
        for &v in out.planes()[0].pixels() {
            assert!((v - 42.0).abs() < 1e-3, "got {v}");
        }
    }

    #[test]
    fn blur_preserves_mass_away_from_edges() {
        let mut pixels = vec![0.0f32; 41 * 41];
        pixels[20 * 41 + 20] = 1000.0;
        let stack = Stack::new(PixelDepth::F32, vec![Plane::new(41, 41, pixels)]).unwrap();
        let out = gaussian_blur(&stack, 2.0, 0.01);
        let p = &out.planes()[0];
        let total: f32 = p.pixels().iter().sum();
        assert!((total - 1000.0).abs() < 0.5, "total {total}");
        assert!(p.get(20, 20) < 1000.0);
        assert!((p.get(18, 20) - p.get(22, 20)).abs() < 1e-4);
    }

    #[test]
    fn keeps_slice_count_and_order() {
        let planes = (0..3).map(|i| Plane::new(4, 4, vec![i as f32 * 10.0; 16])).collect();
        let stack = Stack::new(PixelDepth::U16, planes).unwrap();
        let out = gaussian_blur(&stack, 2.0, 0.01);
        let firsts: Vec<f32> = out.planes().iter().map(|p| p.get(0, 0)).collect();
        assert_eq!(firsts, vec![0.0, 10.0, 20.0]);
    }
}
