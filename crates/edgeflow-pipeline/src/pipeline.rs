use std::sync::Arc;

use edgeflow_core::{EdgeError, FramePayload, Payload, Result, Stage};
use edgeflow_device::{DeviceBackend, SimBackend};
use edgeflow_preprocess::ImagePreprocess;
use edgeflow_runner::DeviceRunner;

use crate::config::{BackendKind, PipelineConfig};

/// Instantiate the backend selected in the configuration.
pub fn backend_for(kind: BackendKind) -> Result<Box<dyn DeviceBackend>> {
    match kind {
        BackendKind::Sim => Ok(Box::new(SimBackend::new())),
        #[cfg(feature = "acl")]
        BackendKind::Acl => Ok(Box::new(edgeflow_runner::AclBackend::new())),
        #[cfg(feature = "rknn")]
        BackendKind::Rknn => Ok(Box::new(edgeflow_runner::RknnBackend::new())),
        #[allow(unreachable_patterns)]
        other => Err(EdgeError::Config(format!(
            "backend {other:?} is not compiled in, rebuild with its cargo feature"
        ))),
    }
}

/// An ordered chain of single-input stages.
///
/// Each stage consumes the previous stage's output. A stage returning
/// `Ok(None)` ends the chain for that frame.
#[derive(Default)]
pub struct Pipeline {
    stages: Vec<Box<dyn Stage>>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build preprocess → device runner from configuration.
    pub fn from_config<B: DeviceBackend + 'static>(
        config: &PipelineConfig,
        backend: B,
    ) -> Result<Self> {
        config.validate()?;
        let runner = DeviceRunner::new(backend, config.runner_config())?;
        let mut pipeline = Self::new();
        pipeline
            .push_stage(ImagePreprocess::new(config.preprocess_config()))
            .push_stage(runner);
        tracing::info!(stages = ?pipeline.stage_names(), "pipeline built");
        Ok(pipeline)
    }

    pub fn push_stage(&mut self, stage: impl Stage + 'static) -> &mut Self {
        self.stages.push(Box::new(stage));
        self
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    pub(crate) fn into_stages(self) -> Vec<Box<dyn Stage>> {
        self.stages
    }

    /// Push one frame through every stage on the calling thread.
    pub fn process_frame(&mut self, frame: FramePayload) -> Result<Option<Payload>> {
        let frame_id = frame.id;
        let mut current = Arc::new(Payload::Frame(frame));
        for stage in &mut self.stages {
            match stage.process(std::slice::from_ref(&current))? {
                Some(next) => current = Arc::new(next),
                None => {
                    tracing::debug!(stage = stage.name(), frame = frame_id, "frame dropped");
                    return Ok(None);
                }
            }
        }
        Ok(Some(Arc::try_unwrap(current).unwrap_or_else(|shared| (*shared).clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbImage;

    use edgeflow_core::{single_input, ColorOrder};

    /// Passes frames through, counting calls.
    struct Counter {
        calls: usize,
    }

    impl Stage for Counter {
        fn name(&self) -> &str {
            "counter"
        }

        fn process(&mut self, inputs: &[Arc<Payload>]) -> Result<Option<Payload>> {
            self.calls += 1;
            Ok(Some(single_input(inputs)?.clone()))
        }
    }

    struct Reject;

    impl Stage for Reject {
        fn name(&self) -> &str {
            "reject"
        }

        fn process(&mut self, _inputs: &[Arc<Payload>]) -> Result<Option<Payload>> {
            Ok(None)
        }
    }

    fn frame(id: u64) -> FramePayload {
        FramePayload::new(RgbImage::new(4, 4), ColorOrder::Rgb, id)
    }

    #[test]
    fn empty_pipeline_echoes_the_frame() {
        let mut pipeline = Pipeline::new();
        assert!(pipeline.is_empty());
        let out = pipeline.process_frame(frame(9)).unwrap().unwrap();
        assert_eq!(out.frame_id(), 9);
    }

    #[test]
    fn chain_stops_at_first_none() {
        let mut pipeline = Pipeline::new();
        pipeline
            .push_stage(Counter { calls: 0 })
            .push_stage(Reject)
            .push_stage(Counter { calls: 0 });
        assert_eq!(pipeline.stage_names(), vec!["counter", "reject", "counter"]);
        assert!(pipeline.process_frame(frame(1)).unwrap().is_none());
    }

    #[test]
    fn compiled_out_backends_are_config_errors() {
        assert!(backend_for(BackendKind::Sim).is_ok());
        #[cfg(not(feature = "acl"))]
        assert!(matches!(
            backend_for(BackendKind::Acl),
            Err(EdgeError::Config(_))
        ));
        #[cfg(not(feature = "rknn"))]
        assert!(matches!(
            backend_for(BackendKind::Rknn),
            Err(EdgeError::Config(_))
        ));
    }
}
