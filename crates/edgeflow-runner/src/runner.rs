use std::path::PathBuf;
use std::sync::Arc;

use edgeflow_core::{
    single_input, EdgeError, FramePayload, OutputTensor, Payload, Result, RunnerOutputPayload,
    Stage,
};
use edgeflow_device::{DeviceBackend, DeviceBuffer, IoKind, Layout, ModelBlob, ModelIo, RawHandle};

use crate::marshal::{fetch_output, marshal_frame};
use crate::session::DeviceSession;

/// Parameters for one [`DeviceRunner`].
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub model_path: PathBuf,
    pub device_id: u32,
    pub model_width: u32,
    pub model_height: u32,
}

impl RunnerConfig {
    pub fn new(model_path: impl Into<PathBuf>) -> Self {
        Self {
            model_path: model_path.into(),
            device_id: 0,
            model_width: 640,
            model_height: 640,
        }
    }

    pub fn with_device(mut self, device_id: u32) -> Self {
        self.device_id = device_id;
        self
    }

    pub fn with_model_size(mut self, width: u32, height: u32) -> Self {
        self.model_width = width;
        self.model_height = height;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Ready,
    Executing,
    /// A device call failed mid-execution. Every later call fails.
    Poisoned,
}

/// Runs a model on an accelerator, one frame per call.
///
/// All device resources are acquired in [`DeviceRunner::new`] and held until
/// [`DeviceRunner::release`] or drop. Input and output buffers are allocated
/// once and reused by every call.
pub struct DeviceRunner<B: DeviceBackend> {
    config: RunnerConfig,
    session: DeviceSession<B>,
    context: RawHandle,
    stream: RawHandle,
    model: RawHandle,
    io: ModelIo,
    input_buffers: Vec<DeviceBuffer>,
    output_buffers: Vec<DeviceBuffer>,
    state: RunnerState,
    staging: Vec<u8>,
}

impl<B: DeviceBackend> DeviceRunner<B> {
    /// Bring up the device, load the model and bind its buffers.
    ///
    /// On error everything acquired so far has already been released.
    pub fn new(backend: B, config: RunnerConfig) -> Result<Self> {
        if config.model_width == 0 || config.model_height == 0 {
            return Err(EdgeError::Config(format!(
                "model size must be non-zero, got {}x{}",
                config.model_width, config.model_height
            )));
        }

        let mut session = DeviceSession::new(backend);
        let backend_name = session.backend_mut().name();
        tracing::info!(
            backend = backend_name,
            device = config.device_id,
            model = %config.model_path.display(),
            "initializing device runner"
        );

        session.init_runtime()?;
        session.set_device(config.device_id)?;
        let context = session.create_context(config.device_id)?;
        let stream = session.create_stream(context)?;

        let loaded = {
            let blob = ModelBlob::read(&config.model_path)?;
            session.load_model(&blob)?
        };
        let model = loaded.handle;
        let io = loaded.io;

        let mut input_buffers = Vec::with_capacity(io.inputs.len());
        for desc in &io.inputs {
            let buffer = session.alloc(desc.byte_size)?;
            session.bind(model, IoKind::Input, desc.index, &buffer)?;
            input_buffers.push(buffer);
        }
        let mut output_buffers = Vec::with_capacity(io.outputs.len());
        for desc in &io.outputs {
            let buffer = session.alloc(desc.byte_size)?;
            session.bind(model, IoKind::Output, desc.index, &buffer)?;
            output_buffers.push(buffer);
        }

        io.log_summary();
        validate_input(&io, &config)?;

        tracing::info!(
            backend = backend_name,
            inputs = io.inputs.len(),
            outputs = io.outputs.len(),
            quantized = io.is_quantized(),
            "device runner ready"
        );

        Ok(Self {
            config,
            session,
            context,
            stream,
            model,
            io,
            input_buffers,
            output_buffers,
            state: RunnerState::Ready,
            staging: Vec::new(),
        })
    }

    /// Run one frame.
    ///
    /// A frame whose size differs from the model input is skipped with
    /// `Ok(None)` and never reaches the device.
    pub fn run(&mut self, frame: &FramePayload) -> Result<Option<RunnerOutputPayload>> {
        if frame.width() != self.config.model_width || frame.height() != self.config.model_height
        {
            tracing::warn!(
                frame = frame.id,
                width = frame.width(),
                height = frame.height(),
                model_width = self.config.model_width,
                model_height = self.config.model_height,
                "frame size does not match model input, skipping"
            );
            return Ok(None);
        }
        if self.state == RunnerState::Poisoned {
            return Err(EdgeError::RunnerPoisoned);
        }

        self.state = RunnerState::Executing;
        match self.execute(frame) {
            Ok(output) => {
                self.state = RunnerState::Ready;
                Ok(Some(output))
            }
            Err(e) => {
                self.state = RunnerState::Poisoned;
                tracing::error!(frame = frame.id, error = %e, "device execution failed");
                Err(e)
            }
        }
    }

    fn execute(&mut self, frame: &FramePayload) -> Result<RunnerOutputPayload> {
        let input = &self.io.inputs[0];
        marshal_frame(&frame.image, input, &mut self.staging)?;
        let staged = self.staging.len();
        if staged != input.dense_size() || staged > self.input_buffers[0].size() {
            return Err(EdgeError::device("marshal_input", -1));
        }

        // The context is per thread; the runner may have moved since the last call.
        let backend = self.session.backend_mut();
        backend.set_current_context(self.context)?;
        backend.copy_to_device(&self.input_buffers[0], &self.staging)?;
        backend.execute(self.model, self.stream)?;
        backend.synchronize(self.stream)?;

        let mut payload = RunnerOutputPayload::new(frame.id, frame.scale_w, frame.scale_h);
        for (desc, buffer) in self.io.outputs.iter().zip(&self.output_buffers) {
            let data = fetch_output(&mut *backend, buffer, desc)?;
            let (height, width) = desc.spatial_hw();
            payload.push(OutputTensor {
                len: data.len(),
                data,
                height,
                width,
                dtype: desc.dtype,
            });
        }

        tracing::debug!(frame = frame.id, outputs = payload.outputs.len(), "frame executed");
        Ok(payload)
    }

    /// Tear down all device resources, newest first.
    pub fn release(mut self) {
        self.session.release_all();
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn model_io(&self) -> &ModelIo {
        &self.io
    }

    pub fn input_buffers(&self) -> &[DeviceBuffer] {
        &self.input_buffers
    }

    pub fn output_buffers(&self) -> &[DeviceBuffer] {
        &self.output_buffers
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn model_width(&self) -> u32 {
        self.config.model_width
    }

    pub fn model_height(&self) -> u32 {
        self.config.model_height
    }

    pub fn is_quantized(&self) -> bool {
        self.io.is_quantized()
    }
}

/// The first input must be a 3-channel image tensor of the configured size.
fn validate_input(io: &ModelIo, config: &RunnerConfig) -> Result<()> {
    let input = io
        .inputs
        .first()
        .ok_or_else(|| EdgeError::Config("model has no inputs".into()))?;

    if !matches!(input.layout, Layout::Nchw | Layout::Nhwc) || input.shape.rank() != 4 {
        return Err(EdgeError::Config(format!(
            "unsupported input tensor: {}",
            input.describe()
        )));
    }
    if input.channels() != 3 {
        return Err(EdgeError::Config(format!(
            "input tensor has {} channels, expected 3",
            input.channels()
        )));
    }
    let (h, w) = input.spatial_hw();
    if (w, h) != (config.model_width as usize, config.model_height as usize) {
        return Err(EdgeError::Config(format!(
            "model input is {w}x{h}, configured for {}x{}",
            config.model_width, config.model_height
        )));
    }
    Ok(())
}

impl<B: DeviceBackend> Stage for DeviceRunner<B> {
    fn name(&self) -> &str {
        "device_runner"
    }

    fn process(&mut self, inputs: &[Arc<Payload>]) -> Result<Option<Payload>> {
        let payload = match single_input(inputs) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(stage = self.name(), error = %e, "skipping");
                return Ok(None);
            }
        };
        let Some(frame) = payload.as_frame() else {
            tracing::warn!(stage = self.name(), kind = ?payload.kind(), "expected a frame");
            return Ok(None);
        };
        Ok(self.run(frame)?.map(Payload::RunnerOutput))
    }
}
