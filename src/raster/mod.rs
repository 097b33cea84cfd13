// src/raster/mod.rs

//! Seam to the external geospatial toolchain.
//!
//! Every heavy raster operation (VRT construction, warping, pit filling,
//! flow routing, stream extraction) and every metadata lookup goes through
//! the [`RasterBackend`] trait: opaque, blocking, path-in/path-out. The
//! production implementation in [`toolchain`] shells out to GDAL utilities
//! and WhiteboxTools; tests substitute a fake backend that only touches
//! files.

use std::path::{Path, PathBuf};

use crate::errors::{DemflowError, Result};

pub mod toolchain;

pub use toolchain::ToolchainBackend;

/// Spatial reference string in any form the toolchain accepts,
/// e.g. `EPSG:4326` or a WKT definition.
pub type SrsSpec = String;

pub const WGS84: &str = "EPSG:4326";

/// Flow routing method for the hydrology stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutingMethod {
    /// Single flow direction.
    D8,
    /// Multiple (fractional) flow direction.
    Mfd,
}

impl RoutingMethod {
    /// Parse a user-supplied method name, case-insensitively.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "d8" => Ok(RoutingMethod::D8),
            "mfd" => Ok(RoutingMethod::Mfd),
            other => Err(DemflowError::Configuration(format!(
                "routing method must be either D8 or MFD, not '{other}'"
            ))),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            RoutingMethod::D8 => "d8",
            RoutingMethod::Mfd => "mfd",
        }
    }
}

impl std::fmt::Display for RoutingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An axis-aligned bounding box in some spatial reference.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn center_y(&self) -> f64 {
        (self.min_y + self.max_y) / 2.0
    }
}

/// Metadata of an AOI vector: bounding box and spatial reference.
#[derive(Debug, Clone)]
pub struct AoiInfo {
    /// Extent in the AOI's own spatial reference.
    pub bounding_box: BoundingBox,
    /// The AOI's spatial reference.
    pub srs: SrsSpec,
    /// EPSG code of the spatial reference, when one is identified.
    pub epsg: Option<u32>,
    /// True if the spatial reference's linear unit is the meter.
    pub meter_units: bool,
}

/// Metadata of a spatial reference system.
#[derive(Debug, Clone)]
pub struct SrsInfo {
    pub wkt: String,
    pub meter_units: bool,
}

/// Parameters for the warp/reproject stage.
#[derive(Debug, Clone)]
pub struct WarpParams {
    pub source: PathBuf,
    pub target: PathBuf,
    /// Output pixel size in target units; `None` lets the caller derive one.
    pub pixel_size: Option<(f64, f64)>,
    /// Output extent, in the target spatial reference.
    pub target_bbox: BoundingBox,
    pub target_srs: SrsSpec,
    /// GDAL resample method name (near, bilinear, cubic, ...).
    pub resample_method: String,
}

/// The external geospatial toolchain, as consumed by the pipeline.
///
/// All methods are blocking; the worker pool runs them on blocking threads.
/// Implementations report errors through `anyhow` so they can attach
/// whatever context the underlying tool produced.
pub trait RasterBackend: Send + Sync {
    /// Read the AOI vector's bounding box and spatial reference.
    fn aoi_info(&self, path: &Path) -> anyhow::Result<AoiInfo>;

    /// Describe a spatial reference given as e.g. `EPSG:32610`.
    fn srs_info(&self, srs: &str) -> anyhow::Result<SrsInfo>;

    /// Reproject a bounding box between spatial references.
    fn transform_bbox(
        &self,
        bbox: BoundingBox,
        src_srs: &str,
        dst_srs: &str,
    ) -> anyhow::Result<BoundingBox>;

    /// Pixel size `(x, y)` of a raster; `y` is typically negative.
    fn raster_pixel_size(&self, raster: &Path) -> anyhow::Result<(f64, f64)>;

    /// Build a VRT over a remote raster, clipped to `bbox` (in the source's
    /// spatial reference, WGS84 for the known DEMs).
    fn build_vrt(&self, source_url: &str, bbox: BoundingBox, target: &Path)
    -> anyhow::Result<()>;

    /// Reproject/resample a raster.
    fn warp(&self, params: &WarpParams) -> anyhow::Result<()>;

    /// Fill hydrological sinks in a DEM.
    fn fill_pits(&self, dem: &Path, target: &Path) -> anyhow::Result<()>;

    /// Per-pixel flow direction from a pit-filled DEM.
    fn flow_direction(
        &self,
        method: RoutingMethod,
        filled_dem: &Path,
        target: &Path,
    ) -> anyhow::Result<()>;

    /// Upstream contributing area per pixel. The D8 variant accumulates
    /// over the flow-direction raster; the MFD variant routes over the
    /// pit-filled DEM itself and receives it as `filled_dem`.
    fn flow_accumulation(
        &self,
        method: RoutingMethod,
        flow_dir: &Path,
        filled_dem: Option<&Path>,
        target: &Path,
    ) -> anyhow::Result<()>;

    /// Extract a binary stream network where accumulation exceeds
    /// `threshold`. The MFD variant additionally consumes the
    /// flow-direction raster.
    fn extract_streams(
        &self,
        method: RoutingMethod,
        flow_accum: &Path,
        flow_dir: Option<&Path>,
        threshold: u64,
        target: &Path,
    ) -> anyhow::Result<()>;
}
