// tests/pipeline_run.rs

mod common;
use crate::common::{base_options, fake_backend, init_tracing, tfa, with_timeout};

use std::error::Error;
use std::sync::Arc;

use demflow::config::DemRegistry;
use demflow::errors::DemflowError;
use demflow::pipeline::{self, FETCH, FILL_PITS, FLOW_ACCUMULATION, FLOW_DIRECTION, WARP};
use demflow::raster::RasterBackend;
use demflow_test_utils::fake_backend::FakeRasterBackend;

type TestResult = Result<(), Box<dyn Error>>;

fn position(executed: &[String], name: &str) -> usize {
    executed
        .iter()
        .position(|t| t == name)
        .unwrap_or_else(|| panic!("task '{name}' not in executed list {executed:?}"))
}

#[tokio::test]
async fn full_d8_pipeline_runs_every_stage_in_dependency_order() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempfile::tempdir()?;
        let (fake, backend) = fake_backend();
        let registry = DemRegistry::with_defaults();

        let mut opts = base_options(dir.path());
        opts.tfa = Some(tfa("1000:3000:1000"));

        let summary = pipeline::run_pipeline(backend, &registry, opts).await?;

        // Five fixed stages plus three extraction tasks.
        assert_eq!(summary.executed.len(), 8);
        assert!(summary.skipped.is_empty());

        let executed = &summary.executed;
        assert!(position(executed, FETCH) < position(executed, WARP));
        assert!(position(executed, WARP) < position(executed, FILL_PITS));
        assert!(position(executed, FILL_PITS) < position(executed, FLOW_DIRECTION));
        assert!(position(executed, FLOW_DIRECTION) < position(executed, FLOW_ACCUMULATION));
        for threshold in [1000u64, 2000, 3000] {
            let name = pipeline::extract_streams_task_name(threshold);
            assert!(position(executed, FLOW_ACCUMULATION) < position(executed, &name));
        }

        // Each stage hit the backend exactly once, extraction three times.
        assert_eq!(fake.calls_for("build_vrt").len(), 1);
        assert_eq!(fake.calls_for("warp").len(), 1);
        assert_eq!(fake.calls_for("fill_pits").len(), 1);
        assert_eq!(fake.calls_for("flow_direction").len(), 1);
        assert_eq!(fake.calls_for("flow_accumulation").len(), 1);
        assert_eq!(fake.calls_for("extract_streams").len(), 3);

        // Declared outputs landed in the workspace.
        for file in [
            "wgs84-SRTM.vrt",
            "warped-SRTM.tif",
            "pitfilled-SRTM.tif",
            "flowdir-d8-SRTM.tif",
            "flowaccum-d8-SRTM.tif",
            "tfa-SRTM-1000.tif",
            "tfa-SRTM-2000.tif",
            "tfa-SRTM-3000.tif",
        ] {
            assert!(dir.path().join(file).is_file(), "missing output {file}");
        }

        Ok(())
    })
    .await
}

#[tokio::test]
async fn without_tfa_the_plan_stops_at_flow_accumulation() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempfile::tempdir()?;
        let (_fake, backend) = fake_backend();
        let registry = DemRegistry::with_defaults();

        let graph = pipeline::plan(&backend, &registry, &base_options(dir.path()))?;
        let names: Vec<String> = graph.describe().into_iter().map(|t| t.name).collect();
        assert_eq!(
            names,
            vec![FETCH, WARP, FILL_PITS, FLOW_DIRECTION, FLOW_ACCUMULATION]
        );

        Ok(())
    })
    .await
}

#[tokio::test]
async fn tfa_range_fans_out_one_extraction_task_per_threshold() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempfile::tempdir()?;
        let (_fake, backend) = fake_backend();
        let registry = DemRegistry::with_defaults();

        let mut opts = base_options(dir.path());
        opts.tfa = Some(tfa("1000:5000:1000"));

        let graph = pipeline::plan(&backend, &registry, &opts)?;
        let extractions: Vec<_> = graph
            .describe()
            .into_iter()
            .filter(|t| t.name.starts_with("extract_streams_tfa"))
            .collect();

        assert_eq!(extractions.len(), 5);
        for task in extractions {
            // D8 extraction needs only the accumulation raster.
            assert_eq!(task.deps, vec![FLOW_ACCUMULATION.to_string()]);
        }

        Ok(())
    })
    .await
}

#[tokio::test]
async fn omitted_pixel_size_is_derived_from_the_source_resolution() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempfile::tempdir()?;
        let (fake, backend) = fake_backend();
        let registry = DemRegistry::with_defaults();

        let mut opts = base_options(dir.path());
        opts.pixel_size = None;

        pipeline::run_pipeline(backend, &registry, opts).await?;

        // The warp stage asked the source VRT for its resolution and then
        // warped with a concrete derived pixel size.
        assert_eq!(fake.calls_for("raster_pixel_size").len(), 1);
        let warp_calls = fake.calls_for("warp");
        assert_eq!(warp_calls.len(), 1);
        assert!(
            warp_calls[0].contains("pixel=Some"),
            "warp ran without a pixel size: {}",
            warp_calls[0]
        );

        Ok(())
    })
    .await
}

#[tokio::test]
async fn non_metric_target_without_pixel_size_fails_at_plan_time() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempfile::tempdir()?;
        let fake = Arc::new(FakeRasterBackend::new().non_metric());
        let backend: Arc<dyn RasterBackend> = fake.clone();
        let registry = DemRegistry::with_defaults();

        let mut opts = base_options(dir.path());
        opts.pixel_size = None;

        let err = pipeline::plan(&backend, &registry, &opts).unwrap_err();
        assert!(matches!(err, DemflowError::Configuration(_)));
        // Nothing was executed.
        assert!(fake.calls_for("build_vrt").is_empty());

        Ok(())
    })
    .await
}

#[tokio::test]
async fn unknown_dem_alias_fails_before_any_backend_call() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempfile::tempdir()?;
        let (fake, backend) = fake_backend();
        let registry = DemRegistry::with_defaults();

        let mut opts = base_options(dir.path());
        opts.dem = "NO_SUCH_DEM".to_string();

        let err = pipeline::plan(&backend, &registry, &opts).unwrap_err();
        assert!(matches!(err, DemflowError::Configuration(_)));
        assert!(fake.calls().is_empty());

        Ok(())
    })
    .await
}
