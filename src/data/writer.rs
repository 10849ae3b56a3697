//! CSV output: per-file measurement tables and the compiled density table.

use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

use super::model::{FileTable, Measurement};
use crate::aggregate::AggregateTable;
use crate::error::WriteError;

/// Suffix appended to the source file name for its measurement table.
pub const MEASUREMENTS_SUFFIX: &str = "_measurements.csv";

/// File name of the cross-file summary written after a batch.
pub const COMPILED_FILE_NAME: &str = "compiled_density_data.csv";

type Result<T> = std::result::Result<T, WriteError>;

fn ensure_dir(dir: &Path) -> Result<()> {
    if !dir.as_os_str().is_empty() && !dir.exists() {
        fs::create_dir_all(dir).map_err(|source| WriteError::CreateDirectory {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    Ok(())
}

fn create_csv_writer(path: &Path) -> Result<csv::Writer<BufWriter<File>>> {
    let file = File::create(path).map_err(|source| WriteError::CreateFile {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(BufWriter::new(file)))
}

fn csv_err(path: &Path) -> impl Fn(csv::Error) -> WriteError + '_ {
    move |source| WriteError::Csv {
        path: path.to_path_buf(),
        source,
    }
}

/// Path of the measurement table for `file_name` inside `dir`.
pub fn measurements_path(dir: &Path, file_name: &str) -> PathBuf {
    dir.join(format!("{file_name}{MEASUREMENTS_SUFFIX}"))
}

/// Write one file's measurements as `<file_name>_measurements.csv`.
///
/// Returns `Ok(None)` without touching the disk when there are no rows.
pub fn write_measurements(dir: &Path, table: &FileTable) -> Result<Option<PathBuf>> {
    if table.is_empty() {
        return Ok(None);
    }
    ensure_dir(dir)?;
    let path = measurements_path(dir, &table.name);

    // Header comes from the serde field names of `Measurement`.
    let file = File::create(&path).map_err(|source| WriteError::CreateFile {
        path: path.clone(),
        source,
    })?;
    let mut wtr = csv::Writer::from_writer(BufWriter::new(file));
    for m in &table.measurements {
        wtr.serialize(m).map_err(csv_err(&path))?;
    }
    wtr.flush().map_err(|e| csv_err(&path)(e.into()))?;
    Ok(Some(path))
}

/// Write the compiled table; padding cells become empty fields.
pub fn write_aggregate(dir: &Path, table: &AggregateTable) -> Result<PathBuf> {
    ensure_dir(dir)?;
    let path = dir.join(COMPILED_FILE_NAME);
    let mut wtr = create_csv_writer(&path)?;

    wtr.write_record(table.headers()).map_err(csv_err(&path))?;
    for row in table.rows() {
        let fields = row.iter().map(|cell| match cell {
            Some(v) => format_value(*v),
            None => String::new(),
        });
        wtr.write_record(fields).map_err(csv_err(&path))?;
    }
    wtr.flush().map_err(|e| csv_err(&path)(e.into()))?;
    Ok(path)
}

/// Format a value the way the measurement tables store it, so the compiled
/// table reproduces the per-file numbers exactly.
fn format_value(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{v:.1}")
    } else {
        v.to_string()
    }
}

// ---------------------------------------------------------------------------
// Read-back
// ---------------------------------------------------------------------------

/// Read a measurement table previously written by [`write_measurements`].
pub fn read_measurements(path: &Path) -> anyhow::Result<Vec<Measurement>> {
    use anyhow::Context;

    let mut reader = csv::Reader::from_path(path)
        .with_context(|| format!("opening {}", path.display()))?;
    reader
        .deserialize::<Measurement>()
        .enumerate()
        .map(|(row, rec)| rec.with_context(|| format!("{} row {row}", path.display())))
        .collect()
}

/// Load every `*_measurements.csv` in `dir`, sorted by file name.
///
/// The table name is the file name with the suffix stripped, i.e. the
/// original image file name.
pub fn read_measurement_dir(dir: &Path) -> anyhow::Result<Vec<FileTable>> {
    use anyhow::Context;

    let mut names: Vec<String> = fs::read_dir(dir)
        .with_context(|| format!("listing {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name.ends_with(MEASUREMENTS_SUFFIX))
        .collect();
    names.sort();

    names
        .into_iter()
        .map(|file_name| {
            let measurements = read_measurements(&dir.join(&file_name))?;
            let name = file_name
                .strip_suffix(MEASUREMENTS_SUFFIX)
                .unwrap_or(&file_name)
                .to_string();
            Ok(FileTable { name, measurements })
        })
        .collect()
}
