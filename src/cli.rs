//! Command-line interface.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use log::info;

use crate::config::{CompileMode, RunConfig};
use crate::data::writer::{read_measurement_dir, COMPILED_FILE_NAME};
use crate::state::{compile_tables, BatchPaths, BatchRunner, RunSummary};
use crate::ui::dialogs;

#[derive(Parser)]
#[command(name = "roi-density")]
#[command(about = "ROI densitometry over batches of z-stacks", version)]
pub struct Cli {
    /// Path to JSON config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Process every matching stack of a directory (default)
    Run(RunArgs),

    /// Build the compiled table from existing *_measurements.csv files
    Compile {
        /// Directory holding the measurement tables
        csv_dir: PathBuf,
        /// Where to write the compiled table (defaults to CSV_DIR)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration as JSON
    DumpConfig(RunArgs),
}

#[derive(Args, Default)]
struct RunArgs {
    /// Directory searched recursively for stacks
    #[arg(short, long)]
    input: Option<PathBuf>,
    /// Directory for processed images
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Background image subtracted from every stack
    #[arg(short, long)]
    background: Option<PathBuf>,
    /// Directory for measurement tables (defaults to --output)
    #[arg(long)]
    csv_output: Option<PathBuf>,
    /// Required file name ending
    #[arg(long)]
    ext: Option<String>,
    /// Required substring of the file name
    #[arg(long)]
    contains: Option<String>,
    /// Second required substring of the file name
    #[arg(long)]
    filter: Option<String>,
    /// Write every processed image directly into --output
    #[arg(long)]
    flat: bool,
    /// Whether to write the compiled table after the batch
    #[arg(long, value_enum)]
    compile: Option<CompileMode>,
}

impl RunArgs {
    fn apply(self, config: &mut RunConfig) {
        let paths = &mut config.paths;
        paths.input_dir = self.input.or(paths.input_dir.take());
        paths.output_dir = self.output.or(paths.output_dir.take());
        paths.background = self.background.or(paths.background.take());
        paths.csv_output_dir = self.csv_output.or(paths.csv_output_dir.take());

        let selection = &mut config.selection;
        if let Some(ext) = self.ext {
            selection.extension = ext;
        }
        if let Some(contains) = self.contains {
            selection.contains = contains;
        }
        if let Some(filter) = self.filter {
            selection.name_filter = filter;
        }
        if self.flat {
            selection.keep_directories = false;
        }
        if let Some(mode) = self.compile {
            config.compile = mode;
        }
    }
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            let head: String = value.chars().take(36).collect();
            format!("{head}...")
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp_secs()
        .init();
}

fn load_config(path: Option<&Path>) -> anyhow::Result<RunConfig> {
    match path {
        Some(path) => {
            let config = RunConfig::from_json_file(path)?;
            info!("Loaded config from: {}", path.display());
            Ok(config)
        }
        None => Ok(RunConfig::default()),
    }
}

pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let mut config = load_config(cli.config.as_deref())?;

    match cli.command.unwrap_or(Commands::Run(RunArgs::default())) {
        Commands::Run(args) => {
            args.apply(&mut config);
            config.validate()?;
            cmd_run(config)
        }
        Commands::Compile { csv_dir, output } => cmd_compile(&csv_dir, output),
        Commands::DumpConfig(args) => {
            args.apply(&mut config);
            println!("{}", config.to_json_string()?);
            Ok(())
        }
    }
}

/// Fill in missing paths with native pickers.
fn resolve_paths(config: &mut RunConfig) -> anyhow::Result<BatchPaths> {
    let paths = &mut config.paths;
    if paths.input_dir.is_none() {
        paths.input_dir = dialogs::pick_folder("Select input folder");
    }
    if paths.output_dir.is_none() {
        paths.output_dir = dialogs::pick_folder("Select output folder");
    }
    if paths.background.is_none() {
        paths.background = dialogs::pick_background();
    }

    let (Some(input_dir), Some(output_dir), Some(background)) = (
        paths.input_dir.clone(),
        paths.output_dir.clone(),
        paths.background.clone(),
    ) else {
        bail!("input folder, output folder and background image are all required");
    };
    let csv_dir = config
        .csv_dir()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| output_dir.clone());

    if !input_dir.is_dir() {
        bail!("input folder {} does not exist", input_dir.display());
    }
    Ok(BatchPaths {
        input_dir,
        output_dir,
        background,
        csv_dir,
    })
}

fn cmd_run(mut config: RunConfig) -> anyhow::Result<()> {
    let paths = resolve_paths(&mut config)?;
    let mode = config.compile;
    let runner = BatchRunner::new(config, paths)?;
    let summary = runner.run()?;
    print_run_summary(&summary);

    let csv_dir = &runner.paths().csv_dir;
    let compiled = compile_tables(&summary.tables, csv_dir, mode, || {
        dialogs::confirm(
            "Compile results",
            &format!("Compile IntDen and RawIntDen of all files into {COMPILED_FILE_NAME}?"),
        )
    })?;
    if let Some(path) = compiled {
        println!("Compiled table: {}", path.display());
    }
    Ok(())
}

fn print_run_summary(summary: &RunSummary) {
    for report in &summary.files {
        let saved = if report.saved.is_some() { "saved" } else { "not saved" };
        let fallback = if report.threshold_fallback {
            ", manual threshold"
        } else {
            ""
        };
        println!(
            "{} - {} ({saved}{fallback})",
            report.source.display(),
            report.outcome
        );
    }
    print_summary(
        "Batch Complete",
        &[
            ("Files", summary.files.len().to_string()),
            ("Measured", summary.measured().to_string()),
            ("No ROI", summary.no_roi().to_string()),
            ("Unmeasured", summary.unmeasured().to_string()),
            ("Failed", summary.failed().to_string()),
            ("Images saved", summary.saved().to_string()),
            ("Threshold fallbacks", summary.threshold_fallbacks().to_string()),
        ],
    );
}

fn cmd_compile(csv_dir: &Path, output: Option<PathBuf>) -> anyhow::Result<()> {
    let tables = read_measurement_dir(csv_dir)
        .with_context(|| format!("Failed to read tables from {}", csv_dir.display()))?;
    let out_dir = output.unwrap_or_else(|| csv_dir.to_path_buf());
    let path = compile_tables(&tables, &out_dir, CompileMode::Always, || true)?;
    match path {
        Some(path) => print_summary(
            "Compile Complete",
            &[
                ("Tables", tables.len().to_string()),
                ("Output", path.display().to_string()),
            ],
        ),
        None => println!("No *_measurements.csv files in {}", csv_dir.display()),
    }
    Ok(())
}
