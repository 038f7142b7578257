//! Frames through preprocess and the simulated runner, inline and threaded.

use std::path::Path;
use std::time::Duration;

use image::{Rgb, RgbImage};
use tempfile::TempDir;

use edgeflow_core::{ColorOrder, EdgeError, FramePayload};
use edgeflow_device::{SimBackend, SimFault, SimModelSpec, SimOp};
use edgeflow_pipeline::{Pipeline, PipelineConfig, StageEvent, ThreadedPipeline, WorkerOptions};

fn sim_config(dir: &Path) -> PipelineConfig {
    let model_path = dir.join("yolox.json");
    let spec = SimModelSpec::detector(64, 64, &[2, 4, 8]);
    std::fs::write(&model_path, spec.to_json().unwrap()).unwrap();
    PipelineConfig {
        model_path,
        model_width: 64,
        model_height: 64,
        queue_depth: 2,
        ..PipelineConfig::default()
    }
}

fn bgr_frame(width: u32, height: u32, id: u64) -> FramePayload {
    FramePayload::new(
        RgbImage::from_pixel(width, height, Rgb([30, 60, 90])),
        ColorOrder::Bgr,
        id,
    )
}

fn setup() -> (TempDir, PipelineConfig) {
    let dir = tempfile::tempdir().unwrap();
    let config = sim_config(dir.path());
    (dir, config)
}

#[test]
fn hd_frame_runs_end_to_end() {
    let (_dir, config) = setup();
    let mut pipeline = Pipeline::from_config(&config, SimBackend::new()).unwrap();
    assert_eq!(pipeline.stage_names(), vec!["image_preprocess", "device_runner"]);

    let out = pipeline.process_frame(bgr_frame(1920, 1080, 5)).unwrap().unwrap();
    let out = out.as_runner_output().expect("runner output");
    assert_eq!(out.frame_id, 5);
    assert!((out.scale_w - 64.0 / 1920.0).abs() < 1e-6);
    assert!((out.scale_h - 64.0 / 1080.0).abs() < 1e-6);
    assert_eq!(out.spatial_dims(), vec![(2, 2), (4, 4), (8, 8)]);
    // Uniform frame: every input element is 30, 60 or 90, mean 60.
    assert_eq!(out.outputs[0].data[0], 60.0);
}

#[test]
fn construction_failure_leaves_nothing_behind() {
    let (_dir, config) = setup();
    let backend = SimBackend::new().with_fault(SimFault::on_nth(SimOp::Bind, 3));
    let probe = backend.probe();
    assert!(Pipeline::from_config(&config, backend).is_err());
    assert_eq!(probe.live_count(), 0);
}

#[test]
fn threaded_pipeline_delivers_every_frame_in_order() {
    let (_dir, config) = setup();
    let backend = SimBackend::new();
    let probe = backend.probe();
    let pipeline = Pipeline::from_config(&config, backend).unwrap();
    let threaded = ThreadedPipeline::spawn(pipeline, WorkerOptions::from(&config)).unwrap();

    let results = threaded.results().clone();
    let collector = std::thread::spawn(move || {
        let mut ids = Vec::new();
        for event in results.iter() {
            match event {
                StageEvent::Output(payload) => ids.push(payload.frame_id()),
                other => panic!("unexpected event {other:?}"),
            }
        }
        ids
    });

    for id in 0..10 {
        threaded.submit(bgr_frame(128, 96, id)).unwrap();
    }
    threaded.shutdown().unwrap();

    let ids = collector.join().unwrap();
    assert_eq!(ids, (0..10).collect::<Vec<_>>());
    // The runner was dropped on its worker thread.
    assert_eq!(probe.live_count(), 0);
}

#[test]
fn fatal_runner_failure_is_reported() {
    let (_dir, config) = setup();
    let backend = SimBackend::new().with_fault(SimFault::on(SimOp::Execute));
    let probe = backend.probe();
    let pipeline = Pipeline::from_config(&config, backend).unwrap();
    let threaded = ThreadedPipeline::spawn(pipeline, WorkerOptions::default()).unwrap();

    threaded.submit(bgr_frame(64, 64, 1)).unwrap();
    let event = threaded
        .results()
        .recv_timeout(Duration::from_secs(10))
        .unwrap();
    match event {
        StageEvent::Failed { stage, error } => {
            assert_eq!(stage, "device_runner");
            assert!(matches!(error, EdgeError::Device { .. }));
        }
        other => panic!("expected a failure, got {other:?}"),
    }

    threaded.shutdown().unwrap();
    assert_eq!(probe.live_count(), 0);
}

#[test]
fn empty_pipeline_cannot_be_spawned() {
    assert!(matches!(
        ThreadedPipeline::spawn(Pipeline::new(), WorkerOptions::default()),
        Err(EdgeError::Pipeline(_))
    ));
}
