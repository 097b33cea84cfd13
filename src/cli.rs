// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Command-line arguments for `demflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "demflow",
    version,
    about = "Preprocess a DEM for hydrological modelling: fetch, warp, fill \
             pits, route flow and extract stream networks.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the AOI vector (any OGR-readable format).
    ///
    /// The AOI's bounding box defines the region fetched from the remote DEM,
    /// and its projection is the default output projection.
    pub aoi: PathBuf,

    /// Alias of the DEM to use, resolved against the DEM registry.
    #[arg(long, value_name = "ALIAS", default_value = "SRTM")]
    pub dem: String,

    /// Range of threshold flow accumulation values, as `start:stop:step`.
    ///
    /// For example `1000:5000:1000` extracts streams for TFA values 1000,
    /// 2000, 3000, 4000 and 5000. If omitted, no streams are extracted and
    /// the pipeline finishes after flow accumulation.
    #[arg(long, value_name = "START:STOP:STEP")]
    pub tfa: Option<String>,

    /// Whether the `stop` value of the TFA range is itself included.
    #[arg(long, value_enum, value_name = "BOUND", default_value_t = TfaBoundArg::Inclusive)]
    pub tfa_bound: TfaBoundArg,

    /// Output workspace directory. Created if it does not exist.
    #[arg(long, value_name = "DIR", default_value = "preprocess-dem-workspace")]
    pub workspace: PathBuf,

    /// Flow routing method: `d8` or `mfd` (case-insensitive).
    #[arg(long, value_name = "METHOD", default_value = "d8")]
    pub routing_method: String,

    /// GDAL resample method used when warping (near, bilinear, cubic, ...).
    #[arg(long, value_name = "NAME", default_value = "near")]
    pub resample_method: String,

    /// Target EPSG code. If omitted, the AOI's projection is used.
    #[arg(long, value_name = "CODE")]
    pub target_epsg: Option<u32>,

    /// Output pixel size as `X,Y` in target projection units.
    ///
    /// Required when the target projection is not in meters. When omitted for
    /// a metric projection, the pixel size is derived from the source DEM's
    /// resolution at the AOI's centre latitude.
    #[arg(long, value_name = "X,Y")]
    pub pixel_size: Option<String>,

    /// Number of parallel workers. Defaults to the number of CPUs.
    #[arg(long, value_name = "N")]
    pub jobs: Option<usize>,

    /// How existing output artifacts are judged up to date.
    #[arg(long, value_enum, value_name = "MODE", default_value_t = CacheModeArg::Existence)]
    pub cache_mode: CacheModeArg,

    /// Seconds between progress reports while the graph is draining.
    #[arg(long, value_name = "SECS", default_value_t = 15)]
    pub report_interval_secs: u64,

    /// Optional TOML file with extra DEM aliases (`[dems]` table).
    #[arg(long, value_name = "PATH")]
    pub dem_registry: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `DEMFLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Plan and print the task graph, but don't execute anything.
    #[arg(long)]
    pub dry_run: bool,
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Inclusive/exclusive stop bound for the TFA range, as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum TfaBoundArg {
    Inclusive,
    Exclusive,
}

impl std::fmt::Display for TfaBoundArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TfaBoundArg::Inclusive => "inclusive",
            TfaBoundArg::Exclusive => "exclusive",
        })
    }
}

/// Artifact cache mode as exposed on the CLI.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum CacheModeArg {
    /// An artifact is up to date if it exists on disk.
    Existence,
    /// An artifact must also match a recorded fingerprint of the task's
    /// parameters.
    Fingerprint,
}

impl std::fmt::Display for CacheModeArg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            CacheModeArg::Existence => "existence",
            CacheModeArg::Fingerprint => "fingerprint",
        })
    }
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
