use std::path::Path;
use std::sync::{Arc, Mutex};

use anyhow::bail;

use demflow::raster::{
    AoiInfo, BoundingBox, RasterBackend, RoutingMethod, SrsInfo, WarpParams,
};

/// A fake geospatial toolchain that:
/// - records every backend call as a readable string
/// - "produces" each stage's output by touching the target file.
///
/// Tests inspect the call log to assert on ordering, parameters and which
/// stages ran at all.
pub struct FakeRasterBackend {
    calls: Arc<Mutex<Vec<String>>>,
    /// Stage name whose call should fail, if any.
    fail_op: Option<String>,
    /// Whether the canned AOI projection reports meter units.
    meter_units: bool,
}

impl FakeRasterBackend {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            fail_op: None,
            meter_units: true,
        }
    }

    /// Fail the named operation (`"fill_pits"`, `"warp"`, ...) when called.
    pub fn failing_on(mut self, op: &str) -> Self {
        self.fail_op = Some(op.to_string());
        self
    }

    /// Report a degree-based AOI projection, forcing the explicit
    /// pixel-size requirement.
    pub fn non_metric(mut self) -> Self {
        self.meter_units = false;
        self
    }

    /// Snapshot of the recorded calls, in call order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Recorded calls whose first word matches `op`.
    pub fn calls_for(&self, op: &str) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.split_whitespace().next() == Some(op))
            .collect()
    }

    fn record(&self, call: String) -> anyhow::Result<()> {
        let op = call.split_whitespace().next().unwrap_or("").to_string();
        self.calls.lock().unwrap().push(call);
        if self.fail_op.as_deref() == Some(op.as_str()) {
            bail!("fake backend: operation '{op}' configured to fail");
        }
        Ok(())
    }

    fn touch(&self, target: &Path) -> anyhow::Result<()> {
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(target, b"fake raster")?;
        Ok(())
    }
}

impl Default for FakeRasterBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterBackend for FakeRasterBackend {
    fn aoi_info(&self, path: &Path) -> anyhow::Result<AoiInfo> {
        self.record(format!("aoi_info {}", path.display()))?;
        Ok(AoiInfo {
            bounding_box: BoundingBox {
                min_x: 500_000.0,
                min_y: 4_000_000.0,
                max_x: 550_000.0,
                max_y: 4_050_000.0,
            },
            srs: "EPSG:32610".to_string(),
            epsg: Some(32610),
            meter_units: self.meter_units,
        })
    }

    fn srs_info(&self, srs: &str) -> anyhow::Result<SrsInfo> {
        self.record(format!("srs_info {srs}"))?;
        Ok(SrsInfo {
            wkt: format!("FAKE_WKT[{srs}]"),
            meter_units: self.meter_units,
        })
    }

    fn transform_bbox(
        &self,
        bbox: BoundingBox,
        src_srs: &str,
        dst_srs: &str,
    ) -> anyhow::Result<BoundingBox> {
        self.record(format!("transform_bbox {src_srs}->{dst_srs}"))?;
        Ok(bbox)
    }

    fn raster_pixel_size(&self, raster: &Path) -> anyhow::Result<(f64, f64)> {
        self.record(format!("raster_pixel_size {}", raster.display()))?;
        // One arc second, the resolution of the known global DEMs.
        Ok((1.0 / 3600.0, -1.0 / 3600.0))
    }

    fn build_vrt(
        &self,
        source_url: &str,
        _bbox: BoundingBox,
        target: &Path,
    ) -> anyhow::Result<()> {
        self.record(format!("build_vrt {source_url} -> {}", target.display()))?;
        self.touch(target)
    }

    fn warp(&self, params: &WarpParams) -> anyhow::Result<()> {
        self.record(format!(
            "warp {} -> {} pixel={:?} resample={}",
            params.source.display(),
            params.target.display(),
            params.pixel_size,
            params.resample_method
        ))?;
        self.touch(&params.target)
    }

    fn fill_pits(&self, dem: &Path, target: &Path) -> anyhow::Result<()> {
        self.record(format!(
            "fill_pits {} -> {}",
            dem.display(),
            target.display()
        ))?;
        self.touch(target)
    }

    fn flow_direction(
        &self,
        method: RoutingMethod,
        filled_dem: &Path,
        target: &Path,
    ) -> anyhow::Result<()> {
        self.record(format!(
            "flow_direction {method} {} -> {}",
            filled_dem.display(),
            target.display()
        ))?;
        self.touch(target)
    }

    fn flow_accumulation(
        &self,
        method: RoutingMethod,
        flow_dir: &Path,
        filled_dem: Option<&Path>,
        target: &Path,
    ) -> anyhow::Result<()> {
        let dem = match filled_dem {
            Some(p) => p.display().to_string(),
            None => "(none)".to_string(),
        };
        self.record(format!(
            "flow_accumulation {method} {} dem={dem} -> {}",
            flow_dir.display(),
            target.display()
        ))?;
        self.touch(target)
    }

    fn extract_streams(
        &self,
        method: RoutingMethod,
        flow_accum: &Path,
        flow_dir: Option<&Path>,
        threshold: u64,
        target: &Path,
    ) -> anyhow::Result<()> {
        let dir = match flow_dir {
            Some(p) => p.display().to_string(),
            None => "(none)".to_string(),
        };
        self.record(format!(
            "extract_streams {method} threshold={threshold} accum={} dir={dir} -> {}",
            flow_accum.display(),
            target.display()
        ))?;
        self.touch(target)
    }
}
