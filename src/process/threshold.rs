use image::{GrayImage, Luma};
use imageproc::stats::histogram;

use crate::data::model::Plane;

/// Inclusive 8-bit intensity range treated as foreground.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThresholdRange {
    pub lower: u8,
    pub upper: u8,
}

impl ThresholdRange {
    pub fn contains(&self, v: u8) -> bool {
        v >= self.lower && v <= self.upper
    }
}

/// How the foreground range was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdChoice {
    /// Triangle method, dark background.
    Triangle(ThresholdRange),
    /// Triangle failed; the configured manual range was used instead.
    Fallback(ThresholdRange),
}

impl ThresholdChoice {
    pub fn range(&self) -> ThresholdRange {
        match *self {
            ThresholdChoice::Triangle(r) | ThresholdChoice::Fallback(r) => r,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, ThresholdChoice::Fallback(_))
    }
}

/// Linear rescale of `plane` onto `0..=255` using its own finite min/max.
///
/// A plane without contrast (or without finite samples) maps to all zeros;
/// NaN samples map to zero.
pub fn to_gray8(plane: &Plane) -> GrayImage {
    let (w, h) = (plane.width() as u32, plane.height() as u32);
    let Some((min, max)) = plane.min_max().filter(|(lo, hi)| hi > lo) else {
        return GrayImage::new(w, h);
    };
    let scale = 255.0 / (max as f64 - min as f64);
    GrayImage::from_fn(w, h, |x, y| {
        let v = plane.get(x as usize, y as usize);
        if !v.is_finite() {
            return Luma([0]);
        }
        let g = ((v as f64 - min as f64) * scale).round().clamp(0.0, 255.0);
        Luma([g as u8])
    })
}

/// Triangle threshold level of a 256-bin histogram.
///
/// Draws a line from the histogram peak to the far end of the longer tail
/// and returns the bin just before the point of maximum distance below it.
/// Returns `None` when fewer than two bins are occupied, where the method
/// has no tail to work with.
pub fn triangle_level(hist: &[u32; 256]) -> Option<i32> {
    if hist.iter().filter(|&&c| c > 0).count() < 2 {
        return None;
    }

    let n = hist.len();
    let mut data: Vec<f64> = hist.iter().map(|&c| c as f64).collect();

    let mut min = data.iter().position(|&c| c > 0.0).unwrap_or(0);
    if min > 0 {
        min -= 1; // line starts at the empty bin just before the first count
    }
    let mut min2 = (1..n).rev().find(|&i| data[i] > 0.0).unwrap_or(0);
    if min2 < n - 1 {
        min2 += 1;
    }
    let mut max = 0;
    let mut dmax = 0.0;
    for (i, &c) in data.iter().enumerate() {
        if c > dmax {
            max = i;
            dmax = c;
        }
    }

    // Work on the side with the longer tail.
    let inverted = (max - min) < (min2 - max);
    if inverted {
        data.reverse();
        min = n - 1 - min2;
        max = n - 1 - max;
    }
    if min == max {
        return Some(min as i32);
    }

    // Line through (min, data[min]) and (max, data[max]) as nx*x + ny*y = d.
    let mut nx = data[max];
    let mut ny = min as f64 - max as f64;
    let norm = (nx * nx + ny * ny).sqrt();
    nx /= norm;
    ny /= norm;
    let d = nx * min as f64 + ny * data[min];

    let mut split = min;
    let mut split_distance = 0.0;
    for (i, &c) in data.iter().enumerate().take(max + 1).skip(min + 1) {
        let dist = nx * i as f64 + ny * c - d;
        if dist > split_distance {
            split = i;
            split_distance = dist;
        }
    }
    let split = split as i32 - 1;

    Some(if inverted { n as i32 - 1 - split } else { split })
}

/// Pick the foreground range of a gray image whose background is dark.
///
/// The Triangle level `t` gives `[t + 1, 255]`. If the method fails or the
/// range would be empty, `fallback` is used and the choice is marked so the
/// caller can report it.
pub fn choose_threshold(gray: &GrayImage, fallback: ThresholdRange) -> ThresholdChoice {
    let hist = histogram(gray);
    match triangle_level(&hist.channels[0]) {
        Some(t) if t < 255 => ThresholdChoice::Triangle(ThresholdRange {
            lower: (t + 1).max(0) as u8,
            upper: 255,
        }),
        _ => ThresholdChoice::Fallback(fallback),
    }
}

/// Binary mask: 255 where the pixel lies in `range`, 0 elsewhere.
pub fn binarize(gray: &GrayImage, range: ThresholdRange) -> GrayImage {
    GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
        if range.contains(gray.get_pixel(x, y)[0]) {
            Luma([255])
        } else {
            Luma([0])
        }
    })
}
