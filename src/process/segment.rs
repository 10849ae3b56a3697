use image::{GrayImage, ImageBuffer, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

use super::threshold::{binarize, choose_threshold, to_gray8, ThresholdChoice, ThresholdRange};
use crate::data::model::{Plane, Roi};

/// Label image produced by connected-component labelling; 0 is background.
pub type LabelImage = ImageBuffer<Luma<u32>, Vec<u32>>;

/// Parameters of ROI detection.
#[derive(Debug, Clone, Copy)]
pub struct SegmentParams {
    /// Components with fewer pixels are discarded.
    pub min_area: usize,
    /// Range used when the Triangle method fails.
    pub fallback: ThresholdRange,
}

/// One 8-connected foreground component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Component {
    pub label: u32,
    /// Pixel count of the component.
    pub area: usize,
    pub min_x: usize,
    pub min_y: usize,
    pub max_x: usize,
    pub max_y: usize,
}

impl Component {
    pub fn bbox_width(&self) -> usize {
        self.max_x - self.min_x + 1
    }

    pub fn bbox_height(&self) -> usize {
        self.max_y - self.min_y + 1
    }

    pub fn bbox_area(&self) -> usize {
        self.bbox_width() * self.bbox_height()
    }
}

/// Outcome of ROI detection on a projected plane.
#[derive(Debug, Clone, PartialEq)]
pub struct Segmentation {
    pub threshold: ThresholdChoice,
    /// Components found in the mask before area filtering.
    pub components: usize,
    /// Components that passed the area filter.
    pub candidates: usize,
    pub roi: Option<Roi>,
}

/// Label the 8-connected foreground (non-zero) components of `mask`.
///
/// Components are returned in raster order of their first pixel.
pub fn label_components(mask: &GrayImage) -> (LabelImage, Vec<Component>) {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));
    let max_label = labels.as_raw().iter().copied().max().unwrap_or(0) as usize;

    let mut slot: Vec<Option<usize>> = vec![None; max_label + 1];
    let mut components: Vec<Component> = Vec::new();

    for (x, y, px) in labels.enumerate_pixels() {
        let label = px[0];
        if label == 0 {
            continue;
        }
        let (x, y) = (x as usize, y as usize);
        let idx = *slot[label as usize].get_or_insert_with(|| {
            components.push(Component {
                label,
                area: 0,
                min_x: x,
                min_y: y,
                max_x: x,
                max_y: y,
            });
            components.len() - 1
        });
        let c = &mut components[idx];
        c.area += 1;
        c.min_x = c.min_x.min(x);
        c.min_y = c.min_y.min(y);
        c.max_x = c.max_x.max(x);
        c.max_y = c.max_y.max(y);
    }

    (labels, components)
}

/// Among components with at least `min_area` pixels, pick the one with the
/// largest bounding-box area. Ties go to the earliest component.
pub fn select_largest(components: &[Component], min_area: usize) -> Option<&Component> {
    let mut best: Option<&Component> = None;
    for c in components.iter().filter(|c| c.area >= min_area) {
        if best.map_or(true, |b| c.bbox_area() > b.bbox_area()) {
            best = Some(c);
        }
    }
    best
}

/// ROI covering `component` with its interior holes filled.
pub fn component_roi(labels: &LabelImage, component: &Component) -> Roi {
    let (bw, bh) = (component.bbox_width(), component.bbox_height());
    let inside: Vec<bool> = (0..bw * bh)
        .map(|i| {
            let x = (component.min_x + i % bw) as u32;
            let y = (component.min_y + i / bw) as u32;
            labels.get_pixel(x, y)[0] == component.label
        })
        .collect();

    // Flood the non-component pixels reachable from the box border; whatever
    // stays unreached is enclosed by the component.
    let mut outside = vec![false; bw * bh];
    let mut queue: Vec<usize> = Vec::new();
    for i in 0..bw * bh {
        let (x, y) = (i % bw, i / bw);
        let on_border = x == 0 || y == 0 || x == bw - 1 || y == bh - 1;
        if on_border && !inside[i] {
            outside[i] = true;
            queue.push(i);
        }
    }
    while let Some(i) = queue.pop() {
        let (x, y) = (i % bw, i / bw);
        let mut visit = |j: usize| {
            if !inside[j] && !outside[j] {
                outside[j] = true;
                queue.push(j);
            }
        };
        if x > 0 {
            visit(i - 1);
        }
        if x + 1 < bw {
            visit(i + 1);
        }
        if y > 0 {
            visit(i - bw);
        }
        if y + 1 < bh {
            visit(i + bw);
        }
    }

    Roi {
        x: component.min_x,
        y: component.min_y,
        width: bw,
        height: bh,
        mask: outside.iter().map(|&o| !o).collect(),
        component_area: component.area,
    }
}

/// Detect the ROI of a projected plane.
///
/// Converts to 8-bit, thresholds (Triangle, dark background, with manual
/// fallback), labels 8-connected components, drops those under
/// `params.min_area` pixels and keeps the one with the largest bounding box.
pub fn find_largest_region(plane: &Plane, params: &SegmentParams) -> Segmentation {
    let gray = to_gray8(plane);
    let threshold = choose_threshold(&gray, params.fallback);
    if let ThresholdChoice::Fallback(range) = threshold {
        log::warn!(
            "Triangle threshold failed, using manual range [{}, {}]",
            range.lower,
            range.upper
        );
    }
    let mask = binarize(&gray, threshold.range());
    let (labels, components) = label_components(&mask);

    let candidates = components
        .iter()
        .filter(|c| c.area >= params.min_area)
        .count();
    let roi = select_largest(&components, params.min_area).map(|c| component_roi(&labels, c));

    Segmentation {
        threshold,
        components: components.len(),
        candidates,
        roi,
    }
}
