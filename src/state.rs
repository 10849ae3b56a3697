use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::Context;

use crate::aggregate::aggregate;
use crate::config::{CompileMode, RunConfig};
use crate::data::filter::{collect_files, SourceFile};
use crate::data::loader::{load_stack, save_stack};
use crate::data::model::{FileTable, Stack};
use crate::data::writer::{write_aggregate, write_measurements};
use crate::process::pipeline::{process_stack, StackResult};

// ---------------------------------------------------------------------------
// Per-file outcome
// ---------------------------------------------------------------------------

/// What happened to one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// An ROI was found and this many slices were measured.
    Measured { slices: usize },
    /// The file was processed but no ROI survived segmentation.
    NoRoi,
    /// An ROI was found but no slice had measurable pixels inside it.
    Unmeasured,
    /// Loading, processing or writing the table failed.
    Failed { reason: String },
}

impl fmt::Display for FileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileOutcome::Measured { slices } => write!(f, "measured {slices} slices"),
            FileOutcome::NoRoi => write!(f, "no ROI"),
            FileOutcome::Unmeasured => write!(f, "ROI without measurable slices"),
            FileOutcome::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileReport {
    pub source: PathBuf,
    pub outcome: FileOutcome,
    /// Processed image, when it was written.
    pub saved: Option<PathBuf>,
    /// The Triangle threshold failed and the manual range was used.
    pub threshold_fallback: bool,
}

/// Result of a whole batch, in processing order.
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub files: Vec<FileReport>,
    /// Measurement tables of every `Measured` file.
    pub tables: Vec<FileTable>,
}

impl RunSummary {
    pub fn measured(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Measured { .. }))
    }

    pub fn no_roi(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::NoRoi))
    }

    pub fn unmeasured(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Unmeasured))
    }

    pub fn threshold_fallbacks(&self) -> usize {
        self.files.iter().filter(|r| r.threshold_fallback).count()
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed { .. }))
    }

    pub fn saved(&self) -> usize {
        self.files.iter().filter(|r| r.saved.is_some()).count()
    }

    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|r| pred(&r.outcome)).count()
    }
}

// ---------------------------------------------------------------------------
// Batch driver
// ---------------------------------------------------------------------------

/// Fully resolved locations of a run.
#[derive(Debug, Clone)]
pub struct BatchPaths {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub background: PathBuf,
    pub csv_dir: PathBuf,
}

/// Processes every selected file against one shared background.
pub struct BatchRunner {
    config: RunConfig,
    paths: BatchPaths,
    background: Stack,
}

impl BatchRunner {
    /// Load the background once. Failing here aborts the run before any
    /// file is attempted.
    pub fn new(config: RunConfig, paths: BatchPaths) -> anyhow::Result<Self> {
        let background = load_stack(&paths.background).with_context(|| {
            format!("Failed to load background {}", paths.background.display())
        })?;
        log::info!(
            "Background {} ({} slice(s))",
            paths.background.display(),
            background.len()
        );
        let cal = &config.calibration;
        log::info!(
            "Calibration: {} x {} {} per pixel",
            cal.pixel_width,
            cal.pixel_height,
            cal.unit
        );
        Ok(Self {
            config,
            paths,
            background,
        })
    }

    pub fn paths(&self) -> &BatchPaths {
        &self.paths
    }

    /// Process every matching file in order. Per-file failures are recorded
    /// in the summary and never stop the batch.
    pub fn run(&self) -> anyhow::Result<RunSummary> {
        let files = collect_files(&self.paths.input_dir, &self.config.selector())
            .with_context(|| format!("Failed to list {}", self.paths.input_dir.display()))?;
        log::info!("{} file(s) selected", files.len());

        let mut summary = RunSummary::default();
        let mut names = HashSet::new();
        for file in &files {
            let name = unique_table_name(file.table_name(&self.paths.input_dir), &mut names);
            let (report, table) = self.process_file(file, name);
            log::info!("{}: {}", file.name, report.outcome);
            summary.files.push(report);
            summary.tables.extend(table);
        }
        log::info!(
            "Batch finished: {} measured, {} without ROI, {} unmeasured, {} failed, {} saved, {} threshold fallback(s)",
            summary.measured(),
            summary.no_roi(),
            summary.unmeasured(),
            summary.failed(),
            summary.saved(),
            summary.threshold_fallbacks()
        );
        Ok(summary)
    }

    fn process_file(&self, file: &SourceFile, name: String) -> (FileReport, Option<FileTable>) {
        let source = file.path();
        log::info!("Processing file: {}", source.display());

        let failed = |reason: String, saved: Option<PathBuf>| {
            log::error!("{}: {reason}", source.display());
            let report = FileReport {
                source: source.clone(),
                outcome: FileOutcome::Failed { reason },
                saved,
                threshold_fallback: false,
            };
            (report, None)
        };

        let stack = match load_stack(&source) {
            Ok(stack) => stack,
            Err(e) => return failed(e.to_string(), None),
        };
        let result = match process_stack(&stack, &self.background, &self.config) {
            Ok(result) => result,
            Err(e) => return failed(e.to_string(), None),
        };
        drop(stack);

        let out_path = self.processed_path(file);
        let saved = match save_stack(&result.processed, &out_path) {
            Ok(()) => {
                log::info!("Saved {}", out_path.display());
                Some(out_path)
            }
            Err(e) => {
                log::error!("{e}");
                None
            }
        };

        let threshold_fallback = result.segmentation.threshold.is_fallback();
        if let Some(outcome) = unmeasured_outcome(&result) {
            let report = FileReport {
                source,
                outcome,
                saved,
                threshold_fallback,
            };
            return (report, None);
        }

        let table = FileTable {
            name,
            measurements: result.measurements,
        };
        match write_measurements(&self.paths.csv_dir, &table) {
            Ok(path) => {
                if let Some(path) = path {
                    log::debug!("Wrote {}", path.display());
                }
                let report = FileReport {
                    source,
                    outcome: FileOutcome::Measured {
                        slices: table.len(),
                    },
                    saved,
                    threshold_fallback,
                };
                (report, Some(table))
            }
            Err(e) => failed(e.to_string(), saved),
        }
    }

    /// `<output>/[<relative dir>/]Processed_<stem>.tif`
    fn processed_path(&self, file: &SourceFile) -> PathBuf {
        let mut dir = self.paths.output_dir.clone();
        if self.config.selection.keep_directories {
            if let Ok(rel) = file.dir.strip_prefix(&self.paths.input_dir) {
                dir.push(rel);
            }
        }
        let stem = Path::new(&file.name)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(&file.name);
        dir.join(format!("Processed_{stem}.tif"))
    }
}

/// Outcome of a stack that produced no table, `None` when it has rows.
fn unmeasured_outcome(result: &StackResult) -> Option<FileOutcome> {
    match (&result.segmentation.roi, result.measurements.is_empty()) {
        (None, _) => Some(FileOutcome::NoRoi),
        (Some(_), true) => {
            log::warn!("ROI found but every slice was skipped");
            Some(FileOutcome::Unmeasured)
        }
        (Some(_), false) => None,
    }
}

/// Make `name` unique among the tables of this run by appending `_<n>`.
fn unique_table_name(name: String, used: &mut HashSet<String>) -> String {
    if used.insert(name.clone()) {
        return name;
    }
    let mut n = 2;
    loop {
        let candidate = format!("{name}_{n}");
        if used.insert(candidate.clone()) {
            log::warn!("Table name {name} already used, writing {candidate} instead");
            return candidate;
        }
        n += 1;
    }
}

/// Write the compiled table when `mode` (or the `confirm` prompt) allows.
///
/// Returns the written path, or `None` when nothing was written.
pub fn compile_tables(
    tables: &[FileTable],
    csv_dir: &Path,
    mode: CompileMode,
    confirm: impl FnOnce() -> bool,
) -> anyhow::Result<Option<PathBuf>> {
    if tables.is_empty() {
        log::info!("No measurement tables to compile");
        return Ok(None);
    }
    let go = match mode {
        CompileMode::Always => true,
        CompileMode::Never => false,
        CompileMode::Ask => confirm(),
    };
    if !go {
        log::info!("Compiled table skipped");
        return Ok(None);
    }

    let table = aggregate(tables);
    let path = write_aggregate(csv_dir, &table)?;
    log::info!(
        "Compiled {} file(s), {} row(s) into {}",
        tables.len(),
        table.row_count(),
        path.display()
    );
    Ok(Some(path))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::{PixelDepth, Plane, Roi};
    use crate::data::writer::{read_measurement_dir, read_measurements, COMPILED_FILE_NAME};
    use crate::process::segment::Segmentation;
    use crate::process::threshold::{ThresholdChoice, ThresholdRange};
    use std::fs;
    use tempfile::TempDir;

    const SIZE: usize = 48;

    fn square_stack(slices: usize) -> Stack {
        let mut pixels = vec![0.0f32; SIZE * SIZE];
        for y in 14..34 {
            for x in 14..34 {
                pixels[y * SIZE + x] = 200.0;
            }
        }
        Stack::new(PixelDepth::U16, vec![Plane::new(SIZE, SIZE, pixels); slices]).unwrap()
    }

    fn dark_stack(slices: usize) -> Stack {
        Stack::new(PixelDepth::U16, vec![Plane::zeros(SIZE, SIZE); slices]).unwrap()
    }

    struct Fixture {
        _dir: TempDir,
        paths: BatchPaths,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let input = root.join("in");
        fs::create_dir_all(input.join("day2")).unwrap();

        save_stack(&square_stack(3), &input.join("a.tif")).unwrap();
        save_stack(&dark_stack(2), &input.join("b.tif")).unwrap();
        save_stack(&square_stack(2), &input.join("day2/c.tif")).unwrap();
        let small = Stack::new(PixelDepth::U16, vec![Plane::zeros(8, 8)]).unwrap();
        save_stack(&small, &input.join("d_small.tif")).unwrap();
        fs::write(input.join("e_broken.tif"), b"not a tiff").unwrap();
        fs::write(input.join("notes.txt"), b"ignored").unwrap();

        let background = root.join("bg.tif");
        save_stack(&dark_stack(1), &background).unwrap();

        let paths = BatchPaths {
            input_dir: input,
            output_dir: root.join("out"),
            background,
            csv_dir: root.join("csv"),
        };
        Fixture { _dir: dir, paths }
    }

    #[test]
    fn batch_continues_past_failures() {
        let fx = fixture();
        let runner = BatchRunner::new(RunConfig::default(), fx.paths.clone()).unwrap();
        let summary = runner.run().unwrap();

        let names: Vec<_> = summary
            .files
            .iter()
            .map(|r| r.source.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.tif", "b.tif", "d_small.tif", "e_broken.tif", "c.tif"]);

        assert_eq!(summary.files[0].outcome, FileOutcome::Measured { slices: 3 });
        assert_eq!(summary.files[1].outcome, FileOutcome::NoRoi);
        assert!(matches!(summary.files[2].outcome, FileOutcome::Failed { .. }));
        assert!(matches!(summary.files[3].outcome, FileOutcome::Failed { .. }));
        assert_eq!(summary.files[4].outcome, FileOutcome::Measured { slices: 2 });
        assert_eq!((summary.measured(), summary.no_roi(), summary.failed()), (2, 1, 2));
        assert_eq!(summary.unmeasured(), 0);

        // Only the dark stack needed the manual threshold.
        assert!(summary.files[1].threshold_fallback);
        assert_eq!(summary.threshold_fallbacks(), 1);

        let table_names: Vec<_> = summary.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(table_names, vec!["a.tif", "day2_c.tif"]);
    }

    #[test]
    fn outputs_land_where_expected() {
        let fx = fixture();
        let runner = BatchRunner::new(RunConfig::default(), fx.paths.clone()).unwrap();
        let summary = runner.run().unwrap();
        let out = &fx.paths.output_dir;
        let csv = &fx.paths.csv_dir;

        // Images without ROI are still saved.
        assert!(out.join("Processed_a.tif").exists());
        assert!(out.join("Processed_b.tif").exists());
        assert!(out.join("day2/Processed_c.tif").exists());
        assert_eq!(summary.saved(), 3);

        assert!(csv.join("a.tif_measurements.csv").exists());
        assert!(csv.join("day2_c.tif_measurements.csv").exists());
        assert!(!csv.join("b.tif_measurements.csv").exists());

        let reloaded = load_stack(&out.join("Processed_a.tif")).unwrap();
        assert_eq!(reloaded.len(), 3);
        assert_eq!(reloaded.depth(), PixelDepth::U16);
    }

    #[test]
    fn flat_output_ignores_sub_directories() {
        let fx = fixture();
        let mut config = RunConfig::default();
        config.selection.keep_directories = false;
        BatchRunner::new(config, fx.paths.clone()).unwrap().run().unwrap();
        assert!(fx.paths.output_dir.join("Processed_c.tif").exists());
    }

    #[test]
    fn missing_background_aborts_before_any_file() {
        let fx = fixture();
        let mut paths = fx.paths.clone();
        paths.background = paths.input_dir.join("nope.tif");
        assert!(BatchRunner::new(RunConfig::default(), paths).is_err());
        assert!(!fx.paths.output_dir.exists());
    }

    #[test]
    fn compile_respects_mode_and_prompt() {
        let fx = fixture();
        let runner = BatchRunner::new(RunConfig::default(), fx.paths.clone()).unwrap();
        let summary = runner.run().unwrap();
        let csv = &fx.paths.csv_dir;

        let skipped = compile_tables(&summary.tables, csv, CompileMode::Never, || true).unwrap();
        assert!(skipped.is_none());
        let declined = compile_tables(&summary.tables, csv, CompileMode::Ask, || false).unwrap();
        assert!(declined.is_none());
        assert!(!csv.join(COMPILED_FILE_NAME).exists());

        let path = compile_tables(&summary.tables, csv, CompileMode::Ask, || true)
            .unwrap()
            .unwrap();
        let text = fs::read_to_string(path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines[0],
            "IntDen_a.tif,IntDen_day2_c.tif,RawIntDen_a.tif,RawIntDen_day2_c.tif"
        );
        assert_eq!(lines.len(), 4);
        assert!(lines[3].contains(",,"), "row 3 should pad c.tif: {}", lines[3]);
    }

    #[test]
    fn same_file_name_in_two_directories_keeps_both_tables() {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        let input = root.join("in");
        let bright = |value: f32| {
            let mut pixels = vec![0.0f32; SIZE * SIZE];
            for y in 14..34 {
                for x in 14..34 {
                    pixels[y * SIZE + x] = value;
                }
            }
            Stack::new(PixelDepth::U16, vec![Plane::new(SIZE, SIZE, pixels); 2]).unwrap()
        };
        save_stack(&bright(200.0), &input.join("day1/a.tif")).unwrap();
        save_stack(&bright(300.0), &input.join("day2/a.tif")).unwrap();
        save_stack(&dark_stack(1), &root.join("bg.tif")).unwrap();

        let paths = BatchPaths {
            input_dir: input,
            output_dir: root.join("out"),
            background: root.join("bg.tif"),
            csv_dir: root.join("csv"),
        };
        let runner = BatchRunner::new(RunConfig::default(), paths.clone()).unwrap();
        let summary = runner.run().unwrap();
        let names: Vec<_> = summary.tables.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["day1_a.tif", "day2_a.tif"]);

        let day1 = read_measurements(&paths.csv_dir.join("day1_a.tif_measurements.csv")).unwrap();
        let day2 = read_measurements(&paths.csv_dir.join("day2_a.tif_measurements.csv")).unwrap();
        assert_eq!(day1[0].max, 200.0);
        assert_eq!(day2[0].max, 300.0);

        let path = compile_tables(&summary.tables, &paths.csv_dir, CompileMode::Always, || true)
            .unwrap()
            .unwrap();
        let text = fs::read_to_string(path).unwrap();
        assert_eq!(
            text.lines().next().unwrap(),
            "IntDen_day1_a.tif,IntDen_day2_a.tif,RawIntDen_day1_a.tif,RawIntDen_day2_a.tif"
        );

        // Reading the tables back gives the same identifiers.
        let reread: Vec<_> = read_measurement_dir(&paths.csv_dir)
            .unwrap()
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(reread, vec!["day1_a.tif", "day2_a.tif"]);
    }

    #[test]
    fn repeated_table_names_get_a_suffix() {
        let mut used = HashSet::new();
        assert_eq!(unique_table_name("a.tif".into(), &mut used), "a.tif");
        assert_eq!(unique_table_name("a.tif".into(), &mut used), "a.tif_2");
        assert_eq!(unique_table_name("a.tif".into(), &mut used), "a.tif_3");
        assert_eq!(unique_table_name("b.tif".into(), &mut used), "b.tif");
    }

    #[test]
    fn roi_without_rows_is_not_reported_as_missing_roi() {
        let segmentation = |roi: Option<Roi>| Segmentation {
            threshold: ThresholdChoice::Triangle(ThresholdRange {
                lower: 3,
                upper: 255,
            }),
            components: usize::from(roi.is_some()),
            candidates: usize::from(roi.is_some()),
            roi,
        };
        let roi = Roi {
            x: 0,
            y: 0,
            width: 2,
            height: 2,
            mask: vec![true; 4],
            component_area: 4,
        };
        let result = |roi: Option<Roi>| StackResult {
            processed: dark_stack(1),
            segmentation: segmentation(roi),
            measurements: Vec::new(),
        };

        assert_eq!(unmeasured_outcome(&result(None)), Some(FileOutcome::NoRoi));
        assert_eq!(
            unmeasured_outcome(&result(Some(roi))),
            Some(FileOutcome::Unmeasured)
        );
    }

    #[test]
    fn nothing_to_compile_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let out = compile_tables(&[], dir.path(), CompileMode::Always, || true).unwrap();
        assert!(out.is_none());
    }
}
