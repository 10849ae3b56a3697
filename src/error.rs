use std::path::PathBuf;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------
//
// File-level failures are `Err` values of these types and abort only the file
// being processed. Stage-level conditions (threshold fallback, no ROI, empty
// slice) are ordinary return values and never appear here.

/// Failures while decoding an image file into a [`Stack`](crate::data::model::Stack).
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to open '{path}': {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TIFF decode error in '{path}': {source}")]
    Tiff {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },

    #[error("image decode error in '{path}': {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("'{path}': unsupported pixel format {format}")]
    UnsupportedFormat { path: PathBuf, format: String },

    #[error("'{path}': page {page} is {got_w}x{got_h}, expected {want_w}x{want_h}")]
    PageSize {
        path: PathBuf,
        page: usize,
        got_w: u32,
        got_h: u32,
        want_w: u32,
        want_h: u32,
    },

    #[error("'{path}' contains no image data")]
    Empty { path: PathBuf },

    #[error("'{path}': {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: PipelineError,
    },
}

/// Failures inside the per-file processing stages.
#[derive(Debug, Error, PartialEq)]
pub enum PipelineError {
    #[error("plane size mismatch: stack is {stack_w}x{stack_h}, background is {bg_w}x{bg_h}")]
    DimensionMismatch {
        stack_w: usize,
        stack_h: usize,
        bg_w: usize,
        bg_h: usize,
    },

    #[error("background has {background} slices but stack has {stack}")]
    SliceCountMismatch { stack: usize, background: usize },

    #[error("plane {index} is {got_w}x{got_h}, expected {want_w}x{want_h}")]
    InconsistentPlanes {
        index: usize,
        got_w: usize,
        got_h: usize,
        want_w: usize,
        want_h: usize,
    },

    #[error("pixel buffer holds {got} samples, expected {width}x{height}")]
    BufferSize {
        width: usize,
        height: usize,
        got: usize,
    },

    #[error("cannot project an empty stack")]
    EmptyStack,
}

/// Failures while writing processed images or tables.
#[derive(Debug, Error)]
pub enum WriteError {
    #[error("failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TIFF encode error for '{path}': {source}")]
    Tiff {
        path: PathBuf,
        #[source]
        source: tiff::TiffError,
    },

    #[error("CSV error for '{path}': {source}")]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}

/// Rejected configuration values.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}
