#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use demflow::cache::CacheMode;
use demflow::graph::GraphOptions;
use demflow::pipeline::{PipelineOptions, StopBound, TfaRange};
use demflow::raster::{RasterBackend, RoutingMethod};
use demflow_test_utils::fake_backend::FakeRasterBackend;

pub use demflow_test_utils::{init_tracing, with_timeout};

/// Pipeline options for a fake-backend run in `workspace`: SRTM, D8, near
/// resampling, explicit 30m pixels, two workers.
pub fn base_options(workspace: &Path) -> PipelineOptions {
    PipelineOptions {
        dem: "SRTM".to_string(),
        aoi: workspace.join("aoi.gpkg"),
        workspace: workspace.to_path_buf(),
        tfa: None,
        routing_method: RoutingMethod::D8,
        resample_method: "near".to_string(),
        target_epsg: None,
        pixel_size: Some((30.0, -30.0)),
        graph: GraphOptions {
            jobs: 2,
            cache_mode: CacheMode::ExistenceOnly,
            report_interval: Duration::from_secs(15),
        },
        join_timeout: None,
    }
}

pub fn tfa(spec: &str) -> TfaRange {
    TfaRange::parse(spec, StopBound::Inclusive).expect("valid TFA range")
}

/// A fake backend plus the trait-object handle the pipeline consumes.
pub fn fake_backend() -> (Arc<FakeRasterBackend>, Arc<dyn RasterBackend>) {
    let fake = Arc::new(FakeRasterBackend::new());
    let backend: Arc<dyn RasterBackend> = fake.clone();
    (fake, backend)
}
