// src/lib.rs

//! Incremental DEM preprocessing for hydrological modelling.
//!
//! The crate is split into a pure task-graph core and thin IO shells
//! around it:
//!
//! - [`graph`] is the dependency-aware task registry and its state machine.
//! - [`cache`] decides which declared outputs are already up to date.
//! - [`exec`] drains a closed graph through a bounded worker pool.
//! - [`raster`] is the seam to the external geospatial toolchain.
//! - [`pipeline`] wires the DEM stages (fetch, warp, fill pits, route flow,
//!   extract streams) onto a graph.
//! - [`config`], [`cli`], [`logging`] and [`errors`] are the ambient shell.

pub mod cache;
pub mod cli;
pub mod config;
pub mod errors;
pub mod exec;
pub mod graph;
pub mod logging;
pub mod pipeline;
pub mod raster;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::cache::CacheMode;
use crate::cli::{CacheModeArg, CliArgs, TfaBoundArg};
use crate::config::load_registry;
use crate::errors::Result;
use crate::graph::GraphOptions;
use crate::pipeline::{PipelineOptions, StopBound, TfaRange};
use crate::raster::{RasterBackend, RoutingMethod, ToolchainBackend};

/// Translate parsed CLI arguments into validated pipeline options.
pub fn pipeline_options(args: &CliArgs) -> Result<PipelineOptions> {
    let bound = match args.tfa_bound {
        TfaBoundArg::Inclusive => StopBound::Inclusive,
        TfaBoundArg::Exclusive => StopBound::Exclusive,
    };
    let tfa = args
        .tfa
        .as_deref()
        .map(|s| TfaRange::parse(s, bound))
        .transpose()?;
    let pixel_size = args
        .pixel_size
        .as_deref()
        .map(pipeline::parse_pixel_size)
        .transpose()?;
    let routing_method = RoutingMethod::parse(&args.routing_method)?;

    let mut graph = GraphOptions::default();
    if let Some(jobs) = args.jobs {
        graph.jobs = jobs;
    }
    graph.cache_mode = match args.cache_mode {
        CacheModeArg::Existence => CacheMode::ExistenceOnly,
        CacheModeArg::Fingerprint => CacheMode::Fingerprint,
    };
    graph.report_interval = Duration::from_secs(args.report_interval_secs.max(1));

    Ok(PipelineOptions {
        dem: args.dem.clone(),
        aoi: args.aoi.clone(),
        workspace: args.workspace.clone(),
        tfa,
        routing_method,
        resample_method: args.resample_method.clone(),
        target_epsg: args.target_epsg,
        pixel_size,
        graph,
        join_timeout: None,
    })
}

/// Run the CLI: load the registry, plan the pipeline, and either print the
/// plan (`--dry-run`) or drain it.
pub async fn run(args: CliArgs) -> Result<()> {
    let registry = load_registry(args.dem_registry.as_deref())?;
    let opts = pipeline_options(&args)?;
    let backend: Arc<dyn RasterBackend> = Arc::new(ToolchainBackend::new());

    if args.dry_run {
        let graph = pipeline::plan(&backend, &registry, &opts)?;
        println!("{} task(s) planned:", graph.len());
        for task in graph.describe() {
            let deps = if task.deps.is_empty() {
                "(none)".to_string()
            } else {
                task.deps.join(", ")
            };
            let targets = task
                .target_paths
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>()
                .join(", ");
            println!("  {} [after: {deps}] -> {targets}", task.name);
        }
        return Ok(());
    }

    let summary = pipeline::run_pipeline(backend, &registry, opts).await?;
    info!(
        executed = summary.executed.len(),
        skipped = summary.skipped.len(),
        "pipeline finished"
    );
    Ok(())
}
