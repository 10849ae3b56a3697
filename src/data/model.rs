use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

// ---------------------------------------------------------------------------
// PixelDepth – sample depth of the source image
// ---------------------------------------------------------------------------

/// Sample depth a stack was decoded from.
///
/// Samples are always held as `f32` in memory; the depth decides how stage
/// results are rounded and clamped, and how the stack is written back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelDepth {
    U8,
    U16,
    F32,
}

impl PixelDepth {
    /// Largest representable sample, `None` for float depth.
    pub fn max_value(self) -> Option<f32> {
        match self {
            PixelDepth::U8 => Some(u8::MAX as f32),
            PixelDepth::U16 => Some(u16::MAX as f32),
            PixelDepth::F32 => None,
        }
    }

    /// Round and clamp `v` into the representable range of this depth.
    pub fn quantize(self, v: f32) -> f32 {
        match self.max_value() {
            Some(max) => v.round().clamp(0.0, max),
            None => v,
        }
    }
}

// ---------------------------------------------------------------------------
// Plane – a single 2-D intensity grid
// ---------------------------------------------------------------------------

/// Row-major grid of intensity samples.
#[derive(Debug, Clone, PartialEq)]
pub struct Plane {
    width: usize,
    height: usize,
    pixels: Vec<f32>,
}

impl Plane {
    /// Wrap row-major samples produced by a stage. `pixels.len()` must equal
    /// `width * height`; decoded data goes through [`Plane::try_new`].
    pub fn new(width: usize, height: usize, pixels: Vec<f32>) -> Self {
        debug_assert_eq!(pixels.len(), width * height, "plane buffer size");
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Wrap row-major samples of unknown provenance.
    pub fn try_new(width: usize, height: usize, pixels: Vec<f32>) -> Result<Self, PipelineError> {
        if pixels.len() != width * height {
            return Err(PipelineError::BufferSize {
                width,
                height,
                got: pixels.len(),
            });
        }
        Ok(Self {
            width,
            height,
            pixels,
        })
    }

    #[cfg(test)]
    pub fn zeros(width: usize, height: usize) -> Self {
        Self::new(width, height, vec![0.0; width * height])
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn pixels(&self) -> &[f32] {
        &self.pixels
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.pixels[y * self.width + x]
    }

    /// Sample with out-of-range coordinates snapped to the nearest edge pixel.
    #[inline]
    pub fn get_clamped(&self, x: isize, y: isize) -> f32 {
        let cx = x.clamp(0, self.width as isize - 1) as usize;
        let cy = y.clamp(0, self.height as isize - 1) as usize;
        self.pixels[cy * self.width + cx]
    }

    pub fn same_size(&self, other: &Plane) -> bool {
        self.width == other.width && self.height == other.height
    }

    /// Smallest and largest finite sample, `None` when there is none.
    pub fn min_max(&self) -> Option<(f32, f32)> {
        self.pixels
            .iter()
            .filter(|v| v.is_finite())
            .fold(None, |acc, &v| match acc {
                None => Some((v, v)),
                Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
            })
    }
}

// ---------------------------------------------------------------------------
// Stack – ordered z-series of planes
// ---------------------------------------------------------------------------

/// Ordered sequence of equally sized planes. Index `i` is slice position `i + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Stack {
    depth: PixelDepth,
    planes: Vec<Plane>,
}

impl Stack {
    /// Build a stack, checking that every plane matches the first one's size.
    pub fn new(depth: PixelDepth, planes: Vec<Plane>) -> Result<Self, PipelineError> {
        if let Some(first) = planes.first() {
            for (index, p) in planes.iter().enumerate().skip(1) {
                if !p.same_size(first) {
                    return Err(PipelineError::InconsistentPlanes {
                        index,
                        got_w: p.width(),
                        got_h: p.height(),
                        want_w: first.width(),
                        want_h: first.height(),
                    });
                }
            }
        }
        Ok(Self { depth, planes })
    }

    pub fn depth(&self) -> PixelDepth {
        self.depth
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    pub fn len(&self) -> usize {
        self.planes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.planes.is_empty()
    }

    /// `(width, height)` of the planes, `None` for an empty stack.
    pub fn dimensions(&self) -> Option<(usize, usize)> {
        self.planes.first().map(|p| (p.width(), p.height()))
    }

    /// Replace every plane with `f(plane)`, keeping slice order and depth.
    pub fn map_planes<F>(&self, f: F) -> Stack
    where
        F: FnMut(&Plane) -> Plane,
    {
        Stack {
            depth: self.depth,
            planes: self.planes.iter().map(f).collect(),
        }
    }
}

// ---------------------------------------------------------------------------
// Roi – one connected region with its bounding box
// ---------------------------------------------------------------------------

/// A connected region of interest.
///
/// `mask` is `width * height` long and addresses the bounding box only, so a
/// pixel `(x, y)` of the image is inside the ROI when it lies in the box and
/// `mask[(y - self.y) * width + (x - self.x)]` is set.
#[derive(Debug, Clone, PartialEq)]
pub struct Roi {
    pub x: usize,
    pub y: usize,
    pub width: usize,
    pub height: usize,
    pub mask: Vec<bool>,
    /// Pixel count of the labelled component itself (interior holes excluded).
    pub component_area: usize,
}

impl Roi {
    pub fn bbox_area(&self) -> usize {
        self.width * self.height
    }

    /// Number of pixels covered by the mask.
    pub fn mask_area(&self) -> usize {
        self.mask.iter().filter(|&&m| m).count()
    }

    #[cfg(test)]
    pub fn contains(&self, x: usize, y: usize) -> bool {
        if x < self.x || y < self.y || x >= self.x + self.width || y >= self.y + self.height {
            return false;
        }
        self.mask[(y - self.y) * self.width + (x - self.x)]
    }

    /// Image coordinates of every masked pixel, in raster order.
    pub fn points(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.mask
            .iter()
            .enumerate()
            .filter(|(_, &m)| m)
            .map(move |(i, _)| (self.x + i % self.width, self.y + i / self.width))
    }
}

// ---------------------------------------------------------------------------
// Measurement – statistics of one slice inside the ROI
// ---------------------------------------------------------------------------

/// One row of a per-file measurement table.
///
/// Field names map onto the fixed CSV header
/// `Area, Min, Max, IntDen, Mean, RawIntDen, Stack Position`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Measurement {
    #[serde(rename = "Area")]
    pub area: f64,
    #[serde(rename = "Min")]
    pub min: f64,
    #[serde(rename = "Max")]
    pub max: f64,
    #[serde(rename = "IntDen")]
    pub integrated_density: f64,
    #[serde(rename = "Mean")]
    pub mean: f64,
    #[serde(rename = "RawIntDen")]
    pub raw_integrated_density: f64,
    #[serde(rename = "Stack Position")]
    pub slice: usize,
}

// ---------------------------------------------------------------------------
// FileTable – all measurements of one source file
// ---------------------------------------------------------------------------

/// Measurement table of one source file, keyed by its file name.
#[derive(Debug, Clone, PartialEq)]
pub struct FileTable {
    pub name: String,
    pub measurements: Vec<Measurement>,
}

impl FileTable {
    pub fn len(&self) -> usize {
        self.measurements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.measurements.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantize_clamps_integer_depths() {
        assert_eq!(PixelDepth::U8.quantize(300.4), 255.0);
        assert_eq!(PixelDepth::U8.quantize(-3.0), 0.0);
        assert_eq!(PixelDepth::U16.quantize(12.6), 13.0);
        assert_eq!(PixelDepth::F32.quantize(-3.25), -3.25);
    }

    #[test]
    fn stack_rejects_mismatched_planes() {
        let err = Stack::new(
            PixelDepth::U8,
            vec![Plane::zeros(4, 4), Plane::zeros(4, 5)],
        )
        .unwrap_err();
        assert!(matches!(err, PipelineError::InconsistentPlanes { index: 1, .. }));
    }

    #[test]
    fn try_new_rejects_short_buffers() {
        let err = Plane::try_new(3, 2, vec![0.0; 5]).unwrap_err();
        assert_eq!(
            err,
            PipelineError::BufferSize {
                width: 3,
                height: 2,
                got: 5
            }
        );
        assert_eq!(Plane::try_new(3, 2, vec![1.0; 6]).unwrap().get(2, 1), 1.0);
    }

    #[test]
    fn roi_contains_respects_mask() {
        let roi = Roi {
            x: 2,
            y: 3,
            width: 2,
            height: 2,
            mask: vec![true, false, true, true],
            component_area: 3,
        };
        assert!(roi.contains(2, 3));
        assert!(!roi.contains(3, 3));
        assert!(roi.contains(3, 4));
        assert!(!roi.contains(0, 0));
        assert_eq!(roi.bbox_area(), 4);
        assert_eq!(roi.mask_area(), 3);
        assert_eq!(roi.points().collect::<Vec<_>>(), vec![(2, 3), (2, 4), (3, 4)]);
    }

    #[test]
    fn min_max_skips_nan() {
        let p = Plane::new(3, 1, vec![f32::NAN, 2.0, -1.0]);
        assert_eq!(p.min_max(), Some((-1.0, 2.0)));
        assert_eq!(Plane::new(1, 1, vec![f32::NAN]).min_max(), None);
    }
}
