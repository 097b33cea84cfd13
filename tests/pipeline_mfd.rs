// tests/pipeline_mfd.rs

mod common;
use crate::common::{base_options, fake_backend, init_tracing, tfa, with_timeout};

use std::error::Error;

use demflow::config::DemRegistry;
use demflow::pipeline::{self, FLOW_ACCUMULATION, FLOW_DIRECTION};
use demflow::raster::RoutingMethod;

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test]
async fn mfd_extraction_consumes_both_routing_rasters() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempfile::tempdir()?;
        let (fake, backend) = fake_backend();
        let registry = DemRegistry::with_defaults();

        let mut opts = base_options(dir.path());
        opts.routing_method = RoutingMethod::Mfd;
        opts.tfa = Some(tfa("1000:1000:1000"));

        pipeline::run_pipeline(backend, &registry, opts).await?;

        let dir_calls = fake.calls_for("flow_direction");
        assert_eq!(dir_calls.len(), 1);
        assert!(dir_calls[0].starts_with("flow_direction mfd"));

        // MFD accumulation routes over the pit-filled DEM, not the pointer
        // raster.
        let accum_calls = fake.calls_for("flow_accumulation");
        assert_eq!(accum_calls.len(), 1);
        assert!(accum_calls[0].starts_with("flow_accumulation mfd"));
        assert!(
            accum_calls[0].contains("dem=") && accum_calls[0].contains("pitfilled-SRTM.tif"),
            "accumulation call missing the pit-filled DEM: {}",
            accum_calls[0]
        );
        assert!(!accum_calls[0].contains("dem=(none)"));

        // MFD stream extraction is given the direction raster too.
        let extract_calls = fake.calls_for("extract_streams");
        assert_eq!(extract_calls.len(), 1);
        assert!(extract_calls[0].starts_with("extract_streams mfd"));
        assert!(extract_calls[0].contains("flowdir-mfd-SRTM.tif"));
        assert!(!extract_calls[0].contains("dir=(none)"));

        // Output names carry the routing method.
        assert!(dir.path().join("flowdir-mfd-SRTM.tif").is_file());
        assert!(dir.path().join("flowaccum-mfd-SRTM.tif").is_file());

        Ok(())
    })
    .await
}

#[tokio::test]
async fn mfd_extraction_tasks_depend_on_both_routing_stages() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempfile::tempdir()?;
        let (_fake, backend) = fake_backend();
        let registry = DemRegistry::with_defaults();

        let mut opts = base_options(dir.path());
        opts.routing_method = RoutingMethod::Mfd;
        opts.tfa = Some(tfa("1000:2000:1000"));

        let graph = pipeline::plan(&backend, &registry, &opts)?;
        for task in graph.describe() {
            if task.name.starts_with("extract_streams_tfa") {
                assert!(task.deps.contains(&FLOW_ACCUMULATION.to_string()));
                assert!(task.deps.contains(&FLOW_DIRECTION.to_string()));
            }
        }

        Ok(())
    })
    .await
}

#[tokio::test]
async fn d8_extraction_runs_without_the_direction_raster() -> TestResult {
    with_timeout(async {
        init_tracing();

        let dir = tempfile::tempdir()?;
        let (fake, backend) = fake_backend();
        let registry = DemRegistry::with_defaults();

        let mut opts = base_options(dir.path());
        opts.tfa = Some(tfa("1000:1000:1000"));

        pipeline::run_pipeline(backend, &registry, opts).await?;

        let extract_calls = fake.calls_for("extract_streams");
        assert_eq!(extract_calls.len(), 1);
        assert!(extract_calls[0].starts_with("extract_streams d8"));
        assert!(extract_calls[0].contains("dir=(none)"));

        // D8 accumulation needs only the pointer raster.
        let accum_calls = fake.calls_for("flow_accumulation");
        assert_eq!(accum_calls.len(), 1);
        assert!(accum_calls[0].contains("dem=(none)"));

        Ok(())
    })
    .await
}
