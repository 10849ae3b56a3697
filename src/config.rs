//! Configuration types for a batch run.

use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::data::filter::FileSelector;
use crate::error::ConfigError;
use crate::process::denoise::OutlierSide;
use crate::process::segment::SegmentParams;
use crate::process::threshold::ThresholdRange;

/// Input and output locations. Missing entries are asked for interactively.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default)]
    pub input_dir: Option<PathBuf>,

    #[serde(default)]
    pub output_dir: Option<PathBuf>,

    /// Background image subtracted from every stack of the batch.
    #[serde(default)]
    pub background: Option<PathBuf>,

    /// Where measurement tables go; `output_dir` when unset.
    #[serde(default)]
    pub csv_output_dir: Option<PathBuf>,
}

/// Which files of the input tree are processed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionConfig {
    #[serde(default = "default_extension")]
    pub extension: String,

    #[serde(default)]
    pub contains: String,

    #[serde(default)]
    pub name_filter: String,

    /// Mirror input sub-directories under the output directory.
    #[serde(default = "default_true")]
    pub keep_directories: bool,
}

fn default_extension() -> String {
    ".tif".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            extension: default_extension(),
            contains: String::new(),
            name_filter: String::new(),
            keep_directories: true,
        }
    }
}

/// Outlier removal parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenoiseConfig {
    #[serde(default = "default_radius")]
    pub radius: f32,

    #[serde(default = "default_outlier_threshold")]
    pub threshold: f32,

    #[serde(default = "default_which")]
    pub which: OutlierSide,
}

fn default_radius() -> f32 {
    2.0
}

fn default_outlier_threshold() -> f32 {
    50.0
}

fn default_which() -> OutlierSide {
    OutlierSide::Bright
}

impl Default for DenoiseConfig {
    fn default() -> Self {
        Self {
            radius: default_radius(),
            threshold: default_outlier_threshold(),
            which: default_which(),
        }
    }
}

/// Gaussian blur parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmoothConfig {
    #[serde(default = "default_sigma")]
    pub sigma: f32,

    /// Kernel truncation: edge weight relative to the centre.
    #[serde(default = "default_accuracy")]
    pub accuracy: f32,
}

fn default_sigma() -> f32 {
    2.0
}

fn default_accuracy() -> f32 {
    0.01
}

impl Default for SmoothConfig {
    fn default() -> Self {
        Self {
            sigma: default_sigma(),
            accuracy: default_accuracy(),
        }
    }
}

/// ROI detection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentConfig {
    #[serde(default = "default_min_area")]
    pub min_area: usize,

    #[serde(default = "default_fallback_lower")]
    pub fallback_lower: u8,

    #[serde(default = "default_fallback_upper")]
    pub fallback_upper: u8,
}

fn default_min_area() -> usize {
    50
}

fn default_fallback_lower() -> u8 {
    50
}

fn default_fallback_upper() -> u8 {
    255
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            min_area: default_min_area(),
            fallback_lower: default_fallback_lower(),
            fallback_upper: default_fallback_upper(),
        }
    }
}

impl SegmentConfig {
    pub fn params(&self) -> SegmentParams {
        SegmentParams {
            min_area: self.min_area,
            fallback: ThresholdRange {
                lower: self.fallback_lower,
                upper: self.fallback_upper,
            },
        }
    }
}

/// Physical pixel size used for `Area` and `IntDen`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    #[serde(default = "default_pixel_size")]
    pub pixel_width: f64,

    #[serde(default = "default_pixel_size")]
    pub pixel_height: f64,

    #[serde(default = "default_unit")]
    pub unit: String,
}

fn default_pixel_size() -> f64 {
    1.0
}

fn default_unit() -> String {
    "pixel".to_string()
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            pixel_width: 1.0,
            pixel_height: 1.0,
            unit: default_unit(),
        }
    }
}

impl Calibration {
    pub fn pixel_area(&self) -> f64 {
        self.pixel_width * self.pixel_height
    }
}

/// Whether the compiled table is written after a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CompileMode {
    /// Ask with a yes/no dialog.
    #[default]
    Ask,
    Always,
    Never,
}

/// Complete configuration of a batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub selection: SelectionConfig,

    #[serde(default)]
    pub denoise: DenoiseConfig,

    #[serde(default)]
    pub smooth: SmoothConfig,

    #[serde(default)]
    pub segment: SegmentConfig,

    #[serde(default)]
    pub calibration: Calibration,

    #[serde(default)]
    pub compile: CompileMode,
}

impl RunConfig {
    /// Load configuration from a JSON file.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config: RunConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        Ok(config)
    }

    pub fn to_json_string(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn selector(&self) -> FileSelector {
        FileSelector {
            extension: self.selection.extension.clone(),
            contains: self.selection.contains.clone(),
            name_filter: self.selection.name_filter.clone(),
        }
    }

    /// Directory for measurement tables and the compiled table.
    pub fn csv_dir(&self) -> Option<&Path> {
        self.paths
            .csv_output_dir
            .as_deref()
            .or(self.paths.output_dir.as_deref())
    }

    /// Reject parameter values the pipeline cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let bad = |field: &'static str, reason: String| Err(ConfigError::Invalid { field, reason });

        if !(self.denoise.radius >= 0.0) {
            return bad("denoise.radius", format!("{} is negative", self.denoise.radius));
        }
        if !(self.denoise.threshold >= 0.0) {
            return bad(
                "denoise.threshold",
                format!("{} is negative", self.denoise.threshold),
            );
        }
        if !(self.smooth.sigma > 0.0) {
            return bad("smooth.sigma", format!("{} is not positive", self.smooth.sigma));
        }
        if !(self.smooth.accuracy > 0.0 && self.smooth.accuracy < 1.0) {
            return bad(
                "smooth.accuracy",
                format!("{} is outside (0, 1)", self.smooth.accuracy),
            );
        }
        if self.segment.fallback_lower > self.segment.fallback_upper {
            return bad(
                "segment.fallback_lower",
                format!(
                    "{} exceeds fallback_upper {}",
                    self.segment.fallback_lower, self.segment.fallback_upper
                ),
            );
        }
        for (field, v) in [
            ("calibration.pixel_width", self.calibration.pixel_width),
            ("calibration.pixel_height", self.calibration.pixel_height),
        ] {
            if !(v > 0.0) {
                return bad(field, format!("{v} is not positive"));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_fixed_pipeline() {
        let config = RunConfig::default();
        assert_eq!(config.denoise.radius, 2.0);
        assert_eq!(config.denoise.threshold, 50.0);
        assert_eq!(config.denoise.which, OutlierSide::Bright);
        assert_eq!(config.smooth.sigma, 2.0);
        assert_eq!(config.smooth.accuracy, 0.01);
        assert_eq!(config.segment.min_area, 50);
        assert_eq!(
            config.segment.params().fallback,
            ThresholdRange {
                lower: 50,
                upper: 255
            }
        );
        assert_eq!(config.selection.extension, ".tif");
        assert!(config.selection.keep_directories);
        assert_eq!(config.compile, CompileMode::Ask);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let json = r#"{
            "paths": { "input_dir": "/data/in", "output_dir": "/data/out" },
            "smooth": { "sigma": 1.5 },
            "compile": "never"
        }"#;
        let config: RunConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.paths.input_dir, Some(PathBuf::from("/data/in")));
        assert_eq!(config.csv_dir(), Some(Path::new("/data/out")));
        assert_eq!(config.smooth.sigma, 1.5);
        assert_eq!(config.smooth.accuracy, 0.01);
        assert_eq!(config.compile, CompileMode::Never);
        assert_eq!(config.calibration.unit, "pixel");
    }

    #[test]
    fn json_round_trip() {
        let mut config = RunConfig::default();
        config.paths.csv_output_dir = Some(PathBuf::from("tables"));
        config.denoise.which = OutlierSide::Dark;
        let text = config.to_json_string().unwrap();
        assert!(text.contains("\"dark\""));
        let back: RunConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.csv_dir(), Some(Path::new("tables")));
        assert_eq!(back.denoise.which, OutlierSide::Dark);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = RunConfig::default();
        config.smooth.accuracy = 1.0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Invalid { field: "smooth.accuracy", .. })
        ));

        let mut config = RunConfig::default();
        config.segment.fallback_lower = 200;
        config.segment.fallback_upper = 100;
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.calibration.pixel_height = 0.0;
        assert!(config.validate().is_err());

        let mut config = RunConfig::default();
        config.smooth.sigma = f32::NAN;
        assert!(config.validate().is_err());
    }
}
