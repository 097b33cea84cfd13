// src/pipeline/mod.rs

//! The DEM preprocessing pipeline driver.
//!
//! Declares the task graph for one pipeline run:
//!
//! `fetch → warp → fill_pits → flow_direction → flow_accumulation
//!  → { extract_streams_tfa<t> }*`
//!
//! The stream-extraction tasks fan out, one per TFA threshold, and are
//! independent of one another. All raster work is delegated to a
//! [`RasterBackend`]; this module only wires stages, paths and parameters
//! together.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::config::DemRegistry;
use crate::errors::{DemflowError, Result};
use crate::graph::{GraphOptions, JoinSummary, TaskGraph, TaskSpec};
use crate::raster::{RasterBackend, RoutingMethod, WGS84, WarpParams};

pub mod tfa;

pub use tfa::{StopBound, TfaRange};

// Stage task names.
pub const FETCH: &str = "fetch";
pub const WARP: &str = "warp";
pub const FILL_PITS: &str = "fill_pits";
pub const FLOW_DIRECTION: &str = "flow_direction";
pub const FLOW_ACCUMULATION: &str = "flow_accumulation";

/// Name of the stream-extraction task for one threshold.
pub fn extract_streams_task_name(threshold: u64) -> String {
    format!("extract_streams_tfa{threshold}")
}

/// Everything one pipeline run needs, resolved and validated. Replaces the
/// ad-hoc globals of the original field scripts.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// DEM alias, resolved against the registry.
    pub dem: String,
    /// AOI vector path.
    pub aoi: PathBuf,
    /// Output workspace directory.
    pub workspace: PathBuf,
    /// Stream-extraction thresholds; `None` ends the pipeline after flow
    /// accumulation.
    pub tfa: Option<TfaRange>,
    pub routing_method: RoutingMethod,
    /// GDAL resample method name.
    pub resample_method: String,
    /// Target EPSG code; `None` uses the AOI's projection.
    pub target_epsg: Option<u32>,
    /// Output pixel size in target units; `None` derives one for metric
    /// projections.
    pub pixel_size: Option<(f64, f64)>,
    pub graph: GraphOptions,
    /// Optional cap on how long `join` waits.
    pub join_timeout: Option<Duration>,
}

/// Parse a `X,Y` pixel size string.
pub fn parse_pixel_size(s: &str) -> Result<(f64, f64)> {
    let parts: Vec<&str> = s.split(',').collect();
    let [x, y] = parts.as_slice() else {
        return Err(DemflowError::Configuration(format!(
            "pixel size must be X,Y (example: 30,30), got '{s}'"
        )));
    };

    let parse = |v: &str| -> Result<f64> {
        v.trim().parse::<f64>().map_err(|_| {
            DemflowError::Configuration(format!("pixel size component '{v}' is not a number"))
        })
    };

    let (x, y) = (parse(x)?, parse(y)?);
    if x == 0.0 || y == 0.0 {
        return Err(DemflowError::Configuration(
            "pixel size components must be non-zero".to_string(),
        ));
    }
    Ok((x, y))
}

/// Plan the pipeline: resolve metadata, validate configuration and register
/// every task. No stage executes until the returned graph is joined.
pub fn plan(
    backend: &Arc<dyn RasterBackend>,
    registry: &DemRegistry,
    opts: &PipelineOptions,
) -> Result<TaskGraph> {
    let source_url = registry.resolve(&opts.dem)?.to_string();
    std::fs::create_dir_all(&opts.workspace)?;

    let mut graph = TaskGraph::new(&opts.workspace, opts.graph.clone())?;
    info!(workspace = %opts.workspace.display(), "writing output files to workspace");

    let aoi = backend.aoi_info(&opts.aoi)?;

    let (target_srs, meter_units) = match opts.target_epsg {
        Some(code) => {
            info!(epsg = code, "output will use user-defined EPSG code");
            let srs = format!("EPSG:{code}");
            let srs_info = backend.srs_info(&srs)?;
            (srs, srs_info.meter_units)
        }
        None => {
            info!(epsg = ?aoi.epsg, "output will use the AOI vector's projection");
            (aoi.srs.clone(), aoi.meter_units)
        }
    };

    if opts.pixel_size.is_none() && !meter_units {
        return Err(DemflowError::Configuration(
            "target projection units are not meters, so the pixel size must \
             be given explicitly (example: --pixel-size=30,30)"
                .to_string(),
        ));
    }

    info!("transforming the AOI bounding box to WGS84");
    let wgs84_bbox = backend.transform_bbox(aoi.bounding_box, &aoi.srs, WGS84)?;
    info!("transforming the WGS84 bounding box to the target projection");
    let target_bbox = backend.transform_bbox(wgs84_bbox, WGS84, &target_srs)?;

    let dem = &opts.dem;
    let method = opts.routing_method;
    let ws = &opts.workspace;

    let vrt_path = ws.join(format!("wgs84-{dem}.vrt"));
    let warped_path = ws.join(format!("warped-{dem}.tif"));
    let filled_path = ws.join(format!("pitfilled-{dem}.tif"));
    let flow_dir_path = ws.join(format!("flowdir-{method}-{dem}.tif"));
    let flow_accum_path = ws.join(format!("flowaccum-{method}-{dem}.tif"));

    // fetch: VRT over the remote source, clipped to the AOI in WGS84.
    let fetch = {
        let backend = Arc::clone(backend);
        let url = source_url.clone();
        let target = vrt_path.clone();
        graph.add_task(
            TaskSpec::new(FETCH, Box::new(move || backend.build_vrt(&url, wgs84_bbox, &target)))
                .target(vrt_path.clone())
                .fingerprint(format!("build_vrt|url={source_url}|bbox={wgs84_bbox:?}")),
        )?
    };

    // warp: reproject/resample into the target projection. When no pixel
    // size was given, derive one from the source resolution at the AOI's
    // centre latitude; planning already guaranteed the units are meters.
    let warp = {
        let backend = Arc::clone(backend);
        let params = WarpParams {
            source: vrt_path.clone(),
            target: warped_path.clone(),
            pixel_size: opts.pixel_size,
            target_bbox,
            target_srs: target_srs.clone(),
            resample_method: opts.resample_method.clone(),
        };
        let center_lat = wgs84_bbox.center_y();
        let work = Box::new(move || {
            let mut params = params;
            if params.pixel_size.is_none() {
                let (src_x, _src_y) = backend.raster_pixel_size(&params.source)?;
                let side = m2_area_of_wgs84_pixel(src_x, center_lat).sqrt();
                info!(
                    pixel_size = side,
                    "derived metric pixel size from source resolution"
                );
                params.pixel_size = Some((side, -side));
            }
            backend.warp(&params)
        });
        graph.add_task(
            TaskSpec::new(WARP, work)
                .target(warped_path.clone())
                .after(fetch)
                .fingerprint(format!(
                    "warp|bbox={target_bbox:?}|srs={target_srs}|resample={}|pixel={:?}",
                    opts.resample_method, opts.pixel_size
                )),
        )?
    };

    let fill_pits = {
        let backend = Arc::clone(backend);
        let dem_path = warped_path.clone();
        let target = filled_path.clone();
        graph.add_task(
            TaskSpec::new(FILL_PITS, Box::new(move || backend.fill_pits(&dem_path, &target)))
                .target(filled_path.clone())
                .after(warp)
                .fingerprint("fill_pits".to_string()),
        )?
    };

    let flow_direction = {
        let backend = Arc::clone(backend);
        let filled = filled_path.clone();
        let target = flow_dir_path.clone();
        graph.add_task(
            TaskSpec::new(
                FLOW_DIRECTION,
                Box::new(move || backend.flow_direction(method, &filled, &target)),
            )
            .target(flow_dir_path.clone())
            .after(fill_pits)
            .fingerprint(format!("flow_direction|method={method}")),
        )?
    };

    let flow_accumulation = {
        let backend = Arc::clone(backend);
        let flow_dir = flow_dir_path.clone();
        let filled = filled_path.clone();
        let target = flow_accum_path.clone();
        let work = Box::new(move || {
            // The MFD accumulation routes over the DEM itself.
            let filled_arg = match method {
                RoutingMethod::Mfd => Some(filled.as_path()),
                RoutingMethod::D8 => None,
            };
            backend.flow_accumulation(method, &flow_dir, filled_arg, &target)
        });
        graph.add_task(
            TaskSpec::new(FLOW_ACCUMULATION, work)
            .target(flow_accum_path.clone())
            .after(flow_direction.clone())
            .fingerprint(format!("flow_accumulation|method={method}")),
        )?
    };

    match &opts.tfa {
        None => {
            info!(
                "no TFA range supplied; pipeline ends after flow accumulation \
                 (use --tfa=start:stop:step to extract stream networks)"
            );
        }
        Some(range) => {
            let thresholds = range.thresholds();
            info!(
                count = thresholds.len(),
                start = range.start,
                stop = range.stop,
                step = range.step,
                "scheduling stream extraction tasks"
            );

            for threshold in thresholds {
                let target = ws.join(format!("tfa-{dem}-{threshold}.tif"));
                let backend = Arc::clone(backend);
                let accum = flow_accum_path.clone();
                // Only the MFD extraction consumes the direction raster.
                let flow_dir_arg = match method {
                    RoutingMethod::Mfd => Some(flow_dir_path.clone()),
                    RoutingMethod::D8 => None,
                };
                let out = target.clone();
                let work = Box::new(move || {
                    backend.extract_streams(
                        method,
                        &accum,
                        flow_dir_arg.as_deref(),
                        threshold,
                        &out,
                    )
                });

                let mut spec = TaskSpec::new(extract_streams_task_name(threshold), work)
                    .target(target)
                    .after(flow_accumulation.clone())
                    .fingerprint(format!(
                        "extract_streams|method={method}|threshold={threshold}"
                    ));
                if method == RoutingMethod::Mfd {
                    spec = spec.after(flow_direction.clone());
                }
                graph.add_task(spec)?;
            }
        }
    }

    Ok(graph)
}

/// Plan, close and drain the pipeline.
pub async fn run_pipeline(
    backend: Arc<dyn RasterBackend>,
    registry: &DemRegistry,
    opts: PipelineOptions,
) -> Result<JoinSummary> {
    let mut graph = plan(&backend, registry, &opts)?;
    graph.close()?;
    graph.join(opts.join_timeout).await
}

/// Approximate area in m² of a WGS84 pixel of `pixel_size_deg` degrees on a
/// side, centred on `center_lat_deg`. Oblate-spheroid band-area formula.
fn m2_area_of_wgs84_pixel(pixel_size_deg: f64, center_lat_deg: f64) -> f64 {
    const A: f64 = 6_378_137.0;
    const B: f64 = 6_356_752.3142;

    let e = (1.0 - (B / A).powi(2)).sqrt();
    let band_area = |lat_deg: f64| -> f64 {
        let sin_lat = lat_deg.to_radians().sin();
        let zm = 1.0 - e * sin_lat;
        let zp = 1.0 + e * sin_lat;
        std::f64::consts::PI * B.powi(2) * ((zp / zm).ln() / (2.0 * e) + sin_lat / (zp * zm))
    };

    let upper = band_area(center_lat_deg + pixel_size_deg / 2.0);
    let lower = band_area(center_lat_deg - pixel_size_deg / 2.0);
    (pixel_size_deg / 360.0 * (upper - lower)).abs()
}
