/// Data layer: core types, image and table I/O, and file selection.
///
/// Architecture:
/// ```text
///   input dir ──► filter ──► SourceFile (sorted, recursive)
///                               │
///                               ▼
///   .tif / .png  ──► loader ──► Stack (planes of f32 + PixelDepth)
///                               │   processing happens in `process`
///                               ▼
///   Stack ──► loader::save_stack ──► Processed_<stem>.tif
///   FileTable ──► writer ──► <name>_measurements.csv
///   AggregateTable ──► writer ──► compiled_density_data.csv
/// ```

pub mod filter;
pub mod loader;
pub mod model;
pub mod writer;
