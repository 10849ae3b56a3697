use crate::config::RunConfig;
use crate::data::model::{Measurement, Stack};
use crate::error::PipelineError;

use super::background::subtract;
use super::denoise::remove_outliers;
use super::measure::measure;
use super::project::sum_project;
use super::segment::{find_largest_region, Segmentation};
use super::smooth::gaussian_blur;

/// Everything one stack produces.
#[derive(Debug, Clone)]
pub struct StackResult {
    /// Background-subtracted, denoised and blurred stack (saved to disk).
    pub processed: Stack,
    pub segmentation: Segmentation,
    /// Empty when no ROI was found.
    pub measurements: Vec<Measurement>,
}

/// Run stages 2 to 7 on one loaded stack.
///
/// Only shape errors are returned as `Err`. A missing ROI still yields the
/// processed stack so the caller can save it.
pub fn process_stack(
    stack: &Stack,
    background: &Stack,
    config: &RunConfig,
) -> Result<StackResult, PipelineError> {
    let subtracted = subtract(stack, background)?;
    let denoised = remove_outliers(
        &subtracted,
        config.denoise.radius,
        config.denoise.threshold,
        config.denoise.which,
    );
    let processed = gaussian_blur(&denoised, config.smooth.sigma, config.smooth.accuracy);

    let projection = sum_project(&processed)?;
    let segmentation = find_largest_region(&projection, &config.segment.params());

    let measurements = match &segmentation.roi {
        Some(roi) => {
            log::debug!(
                "ROI at ({}, {}) {}x{} (box {} px, mask {} px, component {} px)",
                roi.x,
                roi.y,
                roi.width,
                roi.height,
                roi.bbox_area(),
                roi.mask_area(),
                roi.component_area
            );
            measure(&processed, roi, &config.calibration)
        }
        None => {
            log::warn!(
                "No ROI found ({} components, none with area >= {})",
                segmentation.components,
                config.segment.min_area
            );
            Vec::new()
        }
    };

    Ok(StackResult {
        processed,
        segmentation,
        measurements,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{PixelDepth, Plane};
    use crate::process::threshold::{ThresholdChoice, ThresholdRange};

    const SIZE: usize = 64;
    const X0: usize = 22;
    const SIDE: usize = 20;

    fn square_plane(value: f32) -> Plane {
        let mut pixels = vec![0.0f32; SIZE * SIZE];
        for y in X0..X0 + SIDE {
            for x in X0..X0 + SIDE {
                pixels[y * SIZE + x] = value;
            }
        }
        Plane::new(SIZE, SIZE, pixels)
    }

    fn zero_background() -> Stack {
        Stack::new(PixelDepth::U16, vec![Plane::zeros(SIZE, SIZE)]).unwrap()
    }

    #[test]
    fn bright_square_end_to_end() {
        let stack = Stack::new(PixelDepth::U16, vec![square_plane(200.0); 3]).unwrap();
        let result = process_stack(&stack, &zero_background(), &RunConfig::default()).unwrap();

        assert_eq!(result.processed.len(), 3);
        assert_eq!(result.processed.depth(), PixelDepth::U16);

        assert_eq!(
            result.segmentation.threshold,
            ThresholdChoice::Triangle(ThresholdRange {
                lower: 4,
                upper: 255
            })
        );
        let roi = result.segmentation.roi.as_ref().unwrap();
        // Blur widens the 20x20 square by 4 px on each side at this level.
        assert_eq!((roi.x, roi.y, roi.width, roi.height), (18, 18, 28, 28));
        assert_eq!(roi.component_area, 752);

        let slices: Vec<_> = result.measurements.iter().map(|m| m.slice).collect();
        assert_eq!(slices, vec![1, 2, 3]);
        for m in &result.measurements {
            // 200 x 400 less the four corners the outlier filter removes,
            // less the faint blur tail left outside the ROI.
            let raw = m.raw_integrated_density;
            assert!((raw - 78_980.0).abs() < 1.0, "raw = {raw}");
            assert_eq!(m.area, 752.0);
            assert!((m.integrated_density - m.area * m.mean).abs() < 1e-6);
            assert!((m.integrated_density - raw).abs() < 1e-6 * raw);
        }
    }

    #[test]
    fn unblurred_square_gives_exact_box() {
        let mut config = RunConfig::default();
        config.smooth.sigma = 0.01;
        let stack = Stack::new(PixelDepth::U16, vec![square_plane(200.0); 2]).unwrap();
        let result = process_stack(&stack, &zero_background(), &config).unwrap();

        let roi = result.segmentation.roi.unwrap();
        assert_eq!((roi.x, roi.y, roi.width, roi.height), (X0, X0, SIDE, SIDE));
        // Corners were replaced by the neighbourhood median.
        assert_eq!(roi.component_area, SIDE * SIDE - 4);
        assert_eq!(result.measurements.len(), 2);
    }

    #[test]
    fn dark_stack_has_no_roi_but_is_still_processed() {
        let stack = Stack::new(PixelDepth::U16, vec![Plane::zeros(SIZE, SIZE); 2]).unwrap();
        let result = process_stack(&stack, &zero_background(), &RunConfig::default()).unwrap();
        assert!(result.segmentation.threshold.is_fallback());
        assert!(result.segmentation.roi.is_none());
        assert!(result.measurements.is_empty());
        assert_eq!(result.processed.len(), 2);
    }

    #[test]
    fn background_size_mismatch_is_an_error() {
        let stack = Stack::new(PixelDepth::U16, vec![square_plane(200.0)]).unwrap();
        let background = Stack::new(PixelDepth::U16, vec![Plane::zeros(10, 10)]).unwrap();
        let err = process_stack(&stack, &background, &RunConfig::default()).unwrap_err();
        assert!(matches!(err, PipelineError::DimensionMismatch { .. }));
    }
}
