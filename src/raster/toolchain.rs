// src/raster/toolchain.rs

//! Production [`RasterBackend`] that shells out to GDAL and WhiteboxTools.
//!
//! Tool binaries are resolved from `PATH`; the WhiteboxTools binary name can
//! be overridden with `WHITEBOX_TOOLS`. Metadata lookups parse the JSON
//! reports of `ogrinfo`/`gdalinfo`; bounding-box reprojection pipes corner
//! coordinates through `gdaltransform`.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::{Context, anyhow, bail};
use serde::Deserialize;
use tracing::debug;

use super::{AoiInfo, BoundingBox, RasterBackend, RoutingMethod, SrsInfo, WarpParams};

#[derive(Debug, Clone)]
pub struct ToolchainBackend {
    whitebox_exe: PathBuf,
}

impl Default for ToolchainBackend {
    fn default() -> Self {
        let whitebox_exe = std::env::var_os("WHITEBOX_TOOLS")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("whitebox_tools"));
        Self { whitebox_exe }
    }
}

impl ToolchainBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific WhiteboxTools binary instead of consulting the
    /// environment.
    pub fn with_whitebox(exe: impl Into<PathBuf>) -> Self {
        Self {
            whitebox_exe: exe.into(),
        }
    }

    fn whitebox(&self, tool: &str) -> Command {
        let mut cmd = Command::new(&self.whitebox_exe);
        cmd.arg(format!("--run={tool}"));
        cmd
    }
}

/// Run a tool to completion, failing with its stderr on a non-zero exit.
fn run_tool(mut cmd: Command, what: &str) -> anyhow::Result<()> {
    run_tool_capture(&mut cmd, what).map(|_| ())
}

/// Run a tool and capture stdout.
fn run_tool_capture(cmd: &mut Command, what: &str) -> anyhow::Result<String> {
    debug!(command = ?cmd, "running external tool");

    let output = cmd
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("spawning {what}"))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        bail!("{what} exited with {}: {}", output.status, stderr.trim());
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

// Minimal models of the JSON reports; everything else is ignored.

#[derive(Debug, Deserialize)]
struct OgrInfoDoc {
    #[serde(default)]
    layers: Vec<OgrLayer>,
}

#[derive(Debug, Deserialize)]
struct OgrLayer {
    #[serde(rename = "geometryFields", default)]
    geometry_fields: Vec<OgrGeometryField>,
}

#[derive(Debug, Deserialize)]
struct OgrGeometryField {
    extent: Option<[f64; 4]>,
    #[serde(rename = "coordinateSystem")]
    coordinate_system: Option<OgrCoordinateSystem>,
}

#[derive(Debug, Deserialize)]
struct OgrCoordinateSystem {
    wkt: String,
}

#[derive(Debug, Deserialize)]
struct GdalInfoDoc {
    #[serde(rename = "geoTransform")]
    geo_transform: Option<[f64; 6]>,
}

impl RasterBackend for ToolchainBackend {
    fn aoi_info(&self, path: &Path) -> anyhow::Result<AoiInfo> {
        let mut cmd = Command::new("ogrinfo");
        cmd.args(["-json", "-so", "-al"]).arg(path);
        let stdout = run_tool_capture(&mut cmd, "ogrinfo")?;

        let doc: OgrInfoDoc =
            serde_json::from_str(&stdout).context("parsing ogrinfo JSON report")?;

        let field = doc
            .layers
            .iter()
            .flat_map(|l| l.geometry_fields.iter())
            .find(|f| f.extent.is_some() && f.coordinate_system.is_some())
            .ok_or_else(|| {
                anyhow!("no layer with an extent and a coordinate system in {path:?}")
            })?;

        let [min_x, min_y, max_x, max_y] =
            field.extent.ok_or_else(|| anyhow!("missing extent"))?;
        let wkt = &field
            .coordinate_system
            .as_ref()
            .ok_or_else(|| anyhow!("missing coordinate system"))?
            .wkt;

        let epsg = epsg_from_wkt(wkt);
        Ok(AoiInfo {
            bounding_box: BoundingBox {
                min_x,
                min_y,
                max_x,
                max_y,
            },
            srs: match epsg {
                Some(code) => format!("EPSG:{code}"),
                None => wkt.clone(),
            },
            epsg,
            meter_units: wkt_is_metric(wkt),
        })
    }

    fn srs_info(&self, srs: &str) -> anyhow::Result<SrsInfo> {
        let mut cmd = Command::new("gdalsrsinfo");
        cmd.args(["-o", "wkt", "--single-line", srs]);
        let wkt = run_tool_capture(&mut cmd, "gdalsrsinfo")?.trim().to_string();

        if wkt.is_empty() {
            bail!("gdalsrsinfo produced no WKT for '{srs}'");
        }

        let meter_units = wkt_is_metric(&wkt);
        Ok(SrsInfo { wkt, meter_units })
    }

    fn transform_bbox(
        &self,
        bbox: BoundingBox,
        src_srs: &str,
        dst_srs: &str,
    ) -> anyhow::Result<BoundingBox> {
        let mut child = Command::new("gdaltransform")
            .args(["-s_srs", src_srs, "-t_srs", dst_srs, "-output_xy"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .context("spawning gdaltransform")?;

        {
            let stdin = child
                .stdin
                .as_mut()
                .ok_or_else(|| anyhow!("gdaltransform stdin unavailable"))?;
            // All four corners: a reprojected box is not axis-aligned, so
            // two corners alone under-cover the extent.
            for (x, y) in [
                (bbox.min_x, bbox.min_y),
                (bbox.min_x, bbox.max_y),
                (bbox.max_x, bbox.min_y),
                (bbox.max_x, bbox.max_y),
            ] {
                writeln!(stdin, "{x} {y}")?;
            }
        }

        let output = child
            .wait_with_output()
            .context("waiting for gdaltransform")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "gdaltransform exited with {}: {}",
                output.status,
                stderr.trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let mut points = Vec::new();
        for line in stdout.lines() {
            let mut parts = line.split_whitespace();
            let (Some(x), Some(y)) = (parts.next(), parts.next()) else {
                continue;
            };
            let x: f64 = x.parse().context("parsing gdaltransform x coordinate")?;
            let y: f64 = y.parse().context("parsing gdaltransform y coordinate")?;
            points.push((x, y));
        }
        if points.len() != 4 {
            bail!(
                "expected 4 transformed corners from gdaltransform, got {}",
                points.len()
            );
        }

        Ok(BoundingBox {
            min_x: points.iter().map(|p| p.0).fold(f64::INFINITY, f64::min),
            min_y: points.iter().map(|p| p.1).fold(f64::INFINITY, f64::min),
            max_x: points.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max),
            max_y: points.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max),
        })
    }

    fn raster_pixel_size(&self, raster: &Path) -> anyhow::Result<(f64, f64)> {
        let mut cmd = Command::new("gdalinfo");
        cmd.arg("-json").arg(raster);
        let stdout = run_tool_capture(&mut cmd, "gdalinfo")?;

        let doc: GdalInfoDoc =
            serde_json::from_str(&stdout).context("parsing gdalinfo JSON report")?;
        let gt = doc
            .geo_transform
            .ok_or_else(|| anyhow!("no geotransform in {raster:?}"))?;
        Ok((gt[1], gt[5]))
    }

    fn build_vrt(
        &self,
        source_url: &str,
        bbox: BoundingBox,
        target: &Path,
    ) -> anyhow::Result<()> {
        let mut cmd = Command::new("gdalbuildvrt");
        cmd.arg("-te")
            .args([
                bbox.min_x.to_string(),
                bbox.min_y.to_string(),
                bbox.max_x.to_string(),
                bbox.max_y.to_string(),
            ])
            .arg(target)
            .arg(format!("/vsicurl/{source_url}"));
        run_tool(cmd, "gdalbuildvrt")
    }

    fn warp(&self, params: &WarpParams) -> anyhow::Result<()> {
        let mut cmd = Command::new("gdalwarp");
        cmd.args(["-t_srs", &params.target_srs])
            .args(["-r", &params.resample_method])
            .arg("-te")
            .args([
                params.target_bbox.min_x.to_string(),
                params.target_bbox.min_y.to_string(),
                params.target_bbox.max_x.to_string(),
                params.target_bbox.max_y.to_string(),
            ]);

        if let Some((x, y)) = params.pixel_size {
            cmd.arg("-tr")
                .args([x.abs().to_string(), y.abs().to_string()]);
        }

        // A previous crashed run may have left a partial file behind.
        cmd.arg("-overwrite").arg(&params.source).arg(&params.target);
        run_tool(cmd, "gdalwarp")
    }

    fn fill_pits(&self, dem: &Path, target: &Path) -> anyhow::Result<()> {
        let mut cmd = self.whitebox("FillDepressions");
        cmd.arg(format!("--dem={}", dem.display()))
            .arg(format!("--output={}", target.display()))
            .arg("--fix_flats");
        run_tool(cmd, "whitebox_tools FillDepressions")
    }

    fn flow_direction(
        &self,
        method: RoutingMethod,
        filled_dem: &Path,
        target: &Path,
    ) -> anyhow::Result<()> {
        let tool = match method {
            RoutingMethod::D8 => "D8Pointer",
            RoutingMethod::Mfd => "FD8Pointer",
        };
        let mut cmd = self.whitebox(tool);
        cmd.arg(format!("--dem={}", filled_dem.display()))
            .arg(format!("--output={}", target.display()));
        run_tool(cmd, tool)
    }

    fn flow_accumulation(
        &self,
        method: RoutingMethod,
        flow_dir: &Path,
        filled_dem: Option<&Path>,
        target: &Path,
    ) -> anyhow::Result<()> {
        match method {
            RoutingMethod::D8 => {
                let mut cmd = self.whitebox("D8FlowAccumulation");
                cmd.arg(format!("--input={}", flow_dir.display()))
                    .arg(format!("--output={}", target.display()))
                    // The input is a pointer raster, not a DEM.
                    .arg("--pntr");
                run_tool(cmd, "D8FlowAccumulation")
            }
            RoutingMethod::Mfd => {
                // FD8FlowAccum has no pointer-raster input: it derives FD8
                // directions internally from the DEM it is given. Feeding it
                // the pointer raster would accumulate flow over pointer
                // codes.
                let dem = filled_dem
                    .ok_or_else(|| anyhow!("FD8FlowAccum requires the pit-filled DEM"))?;
                let mut cmd = self.whitebox("FD8FlowAccum");
                cmd.arg(format!("--dem={}", dem.display()))
                    .arg(format!("--output={}", target.display()));
                run_tool(cmd, "FD8FlowAccum")
            }
        }
    }

    fn extract_streams(
        &self,
        _method: RoutingMethod,
        flow_accum: &Path,
        _flow_dir: Option<&Path>,
        threshold: u64,
        target: &Path,
    ) -> anyhow::Result<()> {
        // WhiteboxTools keys stream extraction on the accumulation grid
        // alone; the direction raster is only needed by backends that thin
        // MFD fractional streams themselves.
        let mut cmd = self.whitebox("ExtractStreams");
        cmd.arg(format!("--flow_accum={}", flow_accum.display()))
            .arg(format!("--threshold={threshold}"))
            .arg(format!("--output={}", target.display()))
            .arg("--zero_background");
        run_tool(cmd, "ExtractStreams")
    }
}

/// Pull an EPSG code out of a WKT definition, if the (last) authority block
/// names one.
fn epsg_from_wkt(wkt: &str) -> Option<u32> {
    // Matches both WKT1 `AUTHORITY["EPSG","32610"]` and WKT2
    // `ID["EPSG",32610]`.
    for marker in ["AUTHORITY[\"EPSG\",", "ID[\"EPSG\","] {
        if let Some(idx) = wkt.rfind(marker) {
            let rest = &wkt[idx + marker.len()..];
            let digits: String = rest
                .chars()
                .skip_while(|c| *c == '"' || c.is_whitespace())
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if let Ok(code) = digits.parse() {
                return Some(code);
            }
        }
    }
    None
}

/// True if the WKT's last linear/angular unit declaration is meters.
fn wkt_is_metric(wkt: &str) -> bool {
    let mut last_unit = None;
    for marker in ["UNIT[\"", "LENGTHUNIT[\"", "ANGLEUNIT[\""] {
        let mut search_from = 0;
        while let Some(idx) = wkt[search_from..].find(marker) {
            let start = search_from + idx + marker.len();
            if let Some(end) = wkt[start..].find('"') {
                let name = wkt[start..start + end].to_lowercase();
                let pos = search_from + idx;
                if last_unit.as_ref().map(|(p, _)| *p < pos).unwrap_or(true) {
                    last_unit = Some((pos, name));
                }
            }
            search_from = start;
        }
    }

    match last_unit {
        Some((_, name)) => {
            matches!(name.as_str(), "m" | "meter" | "metre" | "meters" | "metres")
        }
        None => false,
    }
}
