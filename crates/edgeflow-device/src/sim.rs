//! Host-memory stand-in for an NPU runtime.
//!
//! `SimBackend` behaves like a vendor runtime from the runner's point of view:
//! it hands out handles, keeps "device" memory, checks bindings and runs a
//! deterministic model. Every call is counted and every live resource is
//! tracked through a [`SimProbe`], so tests can assert on leaks and on the
//! exact calls a runner made. Faults can be injected on the n-th call of any
//! operation.
//!
//! Like AscendCL, the current context is a per-thread setting: copies,
//! execution and teardown of streams, models and buffers fail on a thread
//! that has not made a live context current.
//!
//! The model artifact is a JSON manifest ([`SimModelSpec`]).

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use half::f16;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use edgeflow_core::{DType, EdgeError, Result};

use crate::backend::{DeviceBackend, IoKind, LoadedModel, RawHandle, Resource};
use crate::blob::ModelBlob;
use crate::buffer::DeviceBuffer;
use crate::tensor::{Layout, ModelIo, TensorDescriptor};

const FIRST_HANDLE: u64 = 0x1000;
const HANDLE_STRIDE: u64 = 0x100;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SimOp {
    InitRuntime,
    SetDevice,
    CreateContext,
    CreateStream,
    LoadModel,
    Alloc,
    Bind,
    SetCurrentContext,
    CopyToDevice,
    Execute,
    Synchronize,
    CopyToHost,
    Release,
}

impl SimOp {
    pub fn name(self) -> &'static str {
        match self {
            SimOp::InitRuntime => "sim_init_runtime",
            SimOp::SetDevice => "sim_set_device",
            SimOp::CreateContext => "sim_create_context",
            SimOp::CreateStream => "sim_create_stream",
            SimOp::LoadModel => "sim_load_model",
            SimOp::Alloc => "sim_malloc",
            SimOp::Bind => "sim_bind",
            SimOp::SetCurrentContext => "sim_set_current_context",
            SimOp::CopyToDevice => "sim_memcpy_h2d",
            SimOp::Execute => "sim_execute",
            SimOp::Synchronize => "sim_synchronize",
            SimOp::CopyToHost => "sim_memcpy_d2h",
            SimOp::Release => "sim_release",
        }
    }
}

/// Make the `nth` call (1-based) of `op` fail.
#[derive(Clone, Copy, Debug)]
pub struct SimFault {
    pub op: SimOp,
    pub nth: usize,
}

impl SimFault {
    pub fn on(op: SimOp) -> Self {
        Self { op, nth: 1 }
    }

    pub fn on_nth(op: SimOp, nth: usize) -> Self {
        Self { op, nth }
    }
}

#[derive(Debug, Default)]
struct SimState {
    calls: HashMap<SimOp, usize>,
    trace: Vec<SimOp>,
    live: Vec<Resource>,
    released: Vec<Resource>,
    allocations: usize,
}

/// Read-only view on a backend's bookkeeping. Stays valid after the backend
/// has been moved into a runner or dropped.
#[derive(Clone, Debug, Default)]
pub struct SimProbe {
    state: Arc<Mutex<SimState>>,
}

impl SimProbe {
    pub fn calls(&self, op: SimOp) -> usize {
        self.state.lock().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.state.lock().calls.values().sum()
    }

    /// Every call made so far, in call order.
    pub fn trace(&self) -> Vec<SimOp> {
        self.state.lock().trace.clone()
    }

    pub fn live_resources(&self) -> Vec<Resource> {
        self.state.lock().live.clone()
    }

    pub fn live_count(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Number of device allocations made so far.
    pub fn allocations(&self) -> usize {
        self.state.lock().allocations
    }

    /// Released resources, in release order.
    pub fn release_log(&self) -> Vec<Resource> {
        self.state.lock().released.clone()
    }
}

fn default_layout() -> Layout {
    Layout::Nchw
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimTensorSpec {
    pub name: String,
    pub shape: Vec<usize>,
    pub dtype: DType,
    #[serde(default = "default_layout")]
    pub layout: Layout,
}

/// Model manifest understood by [`SimBackend::load_model`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimModelSpec {
    pub inputs: Vec<SimTensorSpec>,
    pub outputs: Vec<SimTensorSpec>,
}

impl SimModelSpec {
    /// A single-input detector: `1x3xHxW` f32 NCHW in, one `1x1xGxG` f32 map
    /// per entry of `grids` out.
    pub fn detector(width: usize, height: usize, grids: &[usize]) -> Self {
        Self {
            inputs: vec![SimTensorSpec {
                name: "images".into(),
                shape: vec![1, 3, height, width],
                dtype: DType::F32,
                layout: Layout::Nchw,
            }],
            outputs: grids
                .iter()
                .enumerate()
                .map(|(i, &g)| SimTensorSpec {
                    name: format!("output{i}"),
                    shape: vec![1, 1, g, g],
                    dtype: DType::F32,
                    layout: Layout::Nchw,
                })
                .collect(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| EdgeError::Config(format!("failed to encode sim model: {e}")))
    }

    pub fn from_json(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data)
            .map_err(|e| EdgeError::Config(format!("invalid sim model manifest: {e}")))
    }

    pub fn model_io(&self) -> Result<ModelIo> {
        let build = |specs: &[SimTensorSpec]| {
            specs
                .iter()
                .enumerate()
                .map(|(i, s)| TensorDescriptor::new(i, &s.name, &s.shape, s.dtype, s.layout, None))
                .collect::<Result<Vec<_>>>()
        };
        Ok(ModelIo {
            inputs: build(&self.inputs)?,
            outputs: build(&self.outputs)?,
        })
    }
}

struct SimModel {
    io: ModelIo,
    bindings: HashMap<(IoKind, usize), DeviceBuffer>,
}

/// Simulated accelerator. See the module docs.
pub struct SimBackend {
    probe: SimProbe,
    fault: Option<SimFault>,
    next_handle: u64,
    runtime_up: bool,
    device: Option<u32>,
    contexts: Vec<RawHandle>,
    streams: Vec<RawHandle>,
    current: HashMap<ThreadId, RawHandle>,
    memory: HashMap<RawHandle, Vec<u8>>,
    models: HashMap<RawHandle, SimModel>,
}

impl SimBackend {
    pub fn new() -> Self {
        Self {
            probe: SimProbe::default(),
            fault: None,
            next_handle: FIRST_HANDLE,
            runtime_up: false,
            device: None,
            contexts: Vec::new(),
            streams: Vec::new(),
            current: HashMap::new(),
            memory: HashMap::new(),
            models: HashMap::new(),
        }
    }

    pub fn with_fault(mut self, fault: SimFault) -> Self {
        self.fault = Some(fault);
        self
    }

    pub fn probe(&self) -> SimProbe {
        self.probe.clone()
    }

    /// Count the call and fail it if a fault is armed for it.
    fn enter(&mut self, op: SimOp) -> Result<()> {
        let count = {
            let mut state = self.probe.state.lock();
            let n = state.calls.entry(op).or_insert(0);
            *n += 1;
            let n = *n;
            state.trace.push(op);
            n
        };
        match self.fault {
            Some(fault) if fault.op == op && fault.nth == count => {
                tracing::debug!(op = op.name(), call = count, "injected fault");
                Err(EdgeError::device(op.name(), -1))
            }
            _ => Ok(()),
        }
    }

    fn track(&self, resource: Resource) {
        self.probe.state.lock().live.push(resource);
    }

    fn fresh_handle(&mut self) -> RawHandle {
        let h = RawHandle(self.next_handle);
        self.next_handle += HANDLE_STRIDE;
        h
    }

    fn fail(op: SimOp, code: i64) -> EdgeError {
        EdgeError::device(op.name(), code)
    }

    fn require_context(&self, op: SimOp) -> Result<()> {
        match self.current.get(&thread::current().id()) {
            Some(ctx) if self.contexts.contains(ctx) => Ok(()),
            _ => Err(Self::fail(op, -8)),
        }
    }

    fn check_buffer(&self, op: SimOp, buffer: &DeviceBuffer, len: usize) -> Result<()> {
        match self.memory.get(&buffer.handle()) {
            Some(mem) if len <= mem.len() => Ok(()),
            Some(_) => Err(Self::fail(op, -4)),
            None => Err(Self::fail(op, -5)),
        }
    }
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceBackend for SimBackend {
    fn name(&self) -> &'static str {
        "sim"
    }

    fn init_runtime(&mut self) -> Result<()> {
        self.enter(SimOp::InitRuntime)?;
        if self.runtime_up {
            return Err(Self::fail(SimOp::InitRuntime, -2));
        }
        self.runtime_up = true;
        self.track(Resource::Runtime);
        Ok(())
    }

    fn set_device(&mut self, device_id: u32) -> Result<()> {
        self.enter(SimOp::SetDevice)?;
        if !self.runtime_up {
            return Err(Self::fail(SimOp::SetDevice, -3));
        }
        self.device = Some(device_id);
        self.track(Resource::Device(device_id));
        Ok(())
    }

    fn create_context(&mut self, device_id: u32) -> Result<RawHandle> {
        self.enter(SimOp::CreateContext)?;
        if self.device != Some(device_id) {
            return Err(Self::fail(SimOp::CreateContext, -3));
        }
        let h = self.fresh_handle();
        self.contexts.push(h);
        self.current.insert(thread::current().id(), h);
        self.track(Resource::Context(h));
        Ok(h)
    }

    fn create_stream(&mut self, context: RawHandle) -> Result<RawHandle> {
        self.enter(SimOp::CreateStream)?;
        if !self.contexts.contains(&context) {
            return Err(Self::fail(SimOp::CreateStream, -5));
        }
        let h = self.fresh_handle();
        self.streams.push(h);
        self.track(Resource::Stream(h));
        Ok(h)
    }

    fn load_model(&mut self, blob: &ModelBlob) -> Result<LoadedModel> {
        self.enter(SimOp::LoadModel)?;
        let spec = SimModelSpec::from_json(blob.as_bytes())?;
        let io = spec.model_io()?;
        let handle = self.fresh_handle();
        self.models.insert(
            handle,
            SimModel {
                io: io.clone(),
                bindings: HashMap::new(),
            },
        );
        self.track(Resource::Model(handle));
        Ok(LoadedModel { handle, io })
    }

    fn alloc(&mut self, size: usize) -> Result<DeviceBuffer> {
        if let Err(e) = self.enter(SimOp::Alloc) {
            return Err(EdgeError::ResourceExhausted {
                requested: size,
                reason: e.to_string(),
            });
        }
        let h = self.fresh_handle();
        self.memory.insert(h, vec![0u8; size]);
        let buffer = DeviceBuffer::new(h, size);
        self.probe.state.lock().allocations += 1;
        self.track(Resource::Buffer(buffer));
        Ok(buffer)
    }

    fn bind(
        &mut self,
        model: RawHandle,
        io: IoKind,
        index: usize,
        buffer: &DeviceBuffer,
    ) -> Result<()> {
        self.enter(SimOp::Bind)?;
        let required = {
            let m = self
                .models
                .get(&model)
                .ok_or_else(|| Self::fail(SimOp::Bind, -5))?;
            let descs = match io {
                IoKind::Input => &m.io.inputs,
                IoKind::Output => &m.io.outputs,
            };
            descs
                .get(index)
                .ok_or_else(|| Self::fail(SimOp::Bind, -6))?
                .byte_size
        };
        self.check_buffer(SimOp::Bind, buffer, required)?;
        if let Some(m) = self.models.get_mut(&model) {
            m.bindings.insert((io, index), *buffer);
        }
        self.track(Resource::Binding { model, io, index });
        Ok(())
    }

    fn set_current_context(&mut self, context: RawHandle) -> Result<()> {
        self.enter(SimOp::SetCurrentContext)?;
        if !self.contexts.contains(&context) {
            return Err(Self::fail(SimOp::SetCurrentContext, -5));
        }
        self.current.insert(thread::current().id(), context);
        Ok(())
    }

    fn copy_to_device(&mut self, dst: &DeviceBuffer, src: &[u8]) -> Result<()> {
        self.enter(SimOp::CopyToDevice)?;
        self.require_context(SimOp::CopyToDevice)?;
        self.check_buffer(SimOp::CopyToDevice, dst, src.len())?;
        if let Some(mem) = self.memory.get_mut(&dst.handle()) {
            mem[..src.len()].copy_from_slice(src);
        }
        Ok(())
    }

    fn execute(&mut self, model: RawHandle, stream: RawHandle) -> Result<()> {
        self.enter(SimOp::Execute)?;
        self.require_context(SimOp::Execute)?;
        if !self.streams.contains(&stream) {
            return Err(Self::fail(SimOp::Execute, -5));
        }
        let m = self
            .models
            .get(&model)
            .ok_or_else(|| Self::fail(SimOp::Execute, -5))?;

        let mut targets = Vec::with_capacity(m.io.outputs.len());
        for desc in &m.io.outputs {
            let buffer = m
                .bindings
                .get(&(IoKind::Output, desc.index))
                .ok_or_else(|| Self::fail(SimOp::Execute, -7))?;
            targets.push((buffer.handle(), desc.dtype, desc.element_count()));
        }

        let base = match m.io.inputs.first() {
            Some(desc) => {
                let buffer = m
                    .bindings
                    .get(&(IoKind::Input, desc.index))
                    .ok_or_else(|| Self::fail(SimOp::Execute, -7))?;
                let bytes = self
                    .memory
                    .get(&buffer.handle())
                    .and_then(|mem| mem.get(..desc.dense_size()))
                    .ok_or_else(|| Self::fail(SimOp::Execute, -5))?;
                mean(&decode(bytes, desc.dtype))
            }
            None => 0.0,
        };

        for (handle, dtype, count) in targets {
            let values: Vec<f32> = (0..count).map(|i| base + (i % 7) as f32).collect();
            let encoded = encode(&values, dtype);
            if let Some(mem) = self.memory.get_mut(&handle) {
                mem[..encoded.len()].copy_from_slice(&encoded);
            }
        }
        Ok(())
    }

    fn synchronize(&mut self, stream: RawHandle) -> Result<()> {
        self.enter(SimOp::Synchronize)?;
        self.require_context(SimOp::Synchronize)?;
        if !self.streams.contains(&stream) {
            return Err(Self::fail(SimOp::Synchronize, -5));
        }
        Ok(())
    }

    fn copy_to_host(&mut self, src: &DeviceBuffer, dst: &mut [u8]) -> Result<()> {
        self.enter(SimOp::CopyToHost)?;
        self.require_context(SimOp::CopyToHost)?;
        let mem = self
            .memory
            .get(&src.handle())
            .and_then(|mem| mem.get(..dst.len()))
            .ok_or_else(|| Self::fail(SimOp::CopyToHost, -4))?;
        dst.copy_from_slice(mem);
        Ok(())
    }

    fn release(&mut self, resource: Resource) -> Result<()> {
        self.enter(SimOp::Release)?;
        if matches!(
            resource,
            Resource::Stream(_) | Resource::Model(_) | Resource::Buffer(_)
        ) {
            self.require_context(SimOp::Release)?;
        }
        {
            let mut state = self.probe.state.lock();
            let pos = state
                .live
                .iter()
                .position(|r| *r == resource)
                .ok_or_else(|| Self::fail(SimOp::Release, -5))?;
            state.live.remove(pos);
            state.released.push(resource);
        }
        match resource {
            Resource::Runtime => self.runtime_up = false,
            Resource::Device(_) => self.device = None,
            Resource::Context(h) => {
                self.contexts.retain(|c| *c != h);
                self.current.retain(|_, c| *c != h);
            }
            Resource::Stream(h) => self.streams.retain(|s| *s != h),
            Resource::Model(h) => {
                self.models.remove(&h);
            }
            Resource::Buffer(b) => {
                self.memory.remove(&b.handle());
            }
            Resource::Binding { model, io, index } => {
                if let Some(m) = self.models.get_mut(&model) {
                    m.bindings.remove(&(io, index));
                }
            }
        }
        Ok(())
    }
}

fn decode(bytes: &[u8], dtype: DType) -> Vec<f32> {
    match dtype {
        DType::F32 => bytes
            .chunks_exact(4)
            .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
            .collect(),
        DType::F16 => bytes
            .chunks_exact(2)
            .map(|b| f16::from_le_bytes([b[0], b[1]]).to_f32())
            .collect(),
        DType::I32 => bytes
            .chunks_exact(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]) as f32)
            .collect(),
        DType::U8 => bytes.iter().map(|&b| b as f32).collect(),
        DType::I8 => bytes.iter().map(|&b| b as i8 as f32).collect(),
    }
}

fn encode(values: &[f32], dtype: DType) -> Vec<u8> {
    match dtype {
        DType::F32 => values.iter().flat_map(|v| v.to_le_bytes()).collect(),
        DType::F16 => values
            .iter()
            .flat_map(|v| f16::from_f32(*v).to_le_bytes())
            .collect(),
        DType::I32 => values
            .iter()
            .flat_map(|v| (v.round() as i32).to_le_bytes())
            .collect(),
        DType::U8 => values
            .iter()
            .map(|v| v.round().clamp(0.0, 255.0) as u8)
            .collect(),
        DType::I8 => values
            .iter()
            .map(|v| v.round().clamp(-128.0, 127.0) as i8 as u8)
            .collect(),
    }
}

fn mean(values: &[f32]) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    (values.iter().map(|&v| v as f64).sum::<f64>() / values.len() as f64) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loaded(backend: &mut SimBackend, spec: &SimModelSpec) -> (RawHandle, RawHandle, LoadedModel) {
        backend.init_runtime().unwrap();
        backend.set_device(0).unwrap();
        let ctx = backend.create_context(0).unwrap();
        let stream = backend.create_stream(ctx).unwrap();
        let blob = ModelBlob::from_bytes(spec.to_json().unwrap().into_bytes());
        let model = backend.load_model(&blob).unwrap();
        (ctx, stream, model)
    }

    #[test]
    fn manifest_round_trips_through_json() {
        let spec = SimModelSpec::detector(640, 640, &[20, 40, 80]);
        let parsed = SimModelSpec::from_json(spec.to_json().unwrap().as_bytes()).unwrap();
        assert_eq!(parsed, spec);
        let io = parsed.model_io().unwrap();
        assert_eq!(io.inputs[0].byte_size, 3 * 640 * 640 * 4);
        assert_eq!(io.outputs.len(), 3);
    }

    #[test]
    fn layout_defaults_to_nchw() {
        let json = br#"{"inputs":[{"name":"x","shape":[1,3,2,2],"dtype":"u8"}],"outputs":[]}"#;
        let spec = SimModelSpec::from_json(json).unwrap();
        assert_eq!(spec.inputs[0].layout, Layout::Nchw);
        assert_eq!(spec.inputs[0].dtype, DType::U8);
    }

    #[test]
    fn garbage_manifest_is_a_config_error() {
        let mut backend = SimBackend::new();
        let err = backend
            .load_model(&ModelBlob::from_bytes(b"\x7fELF".to_vec()))
            .unwrap_err();
        assert!(matches!(err, EdgeError::Config(_)));
    }

    #[test]
    fn tracks_and_releases_resources() {
        let mut backend = SimBackend::new();
        let probe = backend.probe();
        let spec = SimModelSpec::detector(2, 2, &[1]);
        let (ctx, stream, model) = loaded(&mut backend, &spec);
        assert_eq!(probe.live_count(), 5);

        let buf = backend.alloc(16).unwrap();
        assert_eq!(probe.allocations(), 1);
        backend.release(Resource::Buffer(buf)).unwrap();
        backend.release(Resource::Model(model.handle)).unwrap();
        backend.release(Resource::Stream(stream)).unwrap();
        backend.release(Resource::Context(ctx)).unwrap();
        backend.release(Resource::Device(0)).unwrap();
        backend.release(Resource::Runtime).unwrap();
        assert_eq!(probe.live_count(), 0);

        // Double release is reported, not ignored.
        assert!(backend.release(Resource::Runtime).is_err());
    }

    #[test]
    fn execute_fills_outputs_from_input_mean() {
        let mut backend = SimBackend::new();
        let spec = SimModelSpec::detector(2, 2, &[2]);
        let (ctx, stream, model) = loaded(&mut backend, &spec);

        let input = backend.alloc(model.io.inputs[0].byte_size).unwrap();
        let output = backend.alloc(model.io.outputs[0].byte_size).unwrap();
        backend.bind(model.handle, IoKind::Input, 0, &input).unwrap();
        backend.bind(model.handle, IoKind::Output, 0, &output).unwrap();

        let pixels: Vec<u8> = std::iter::repeat(10.0f32)
            .take(12)
            .flat_map(|v| v.to_le_bytes())
            .collect();
        backend.set_current_context(ctx).unwrap();
        backend.copy_to_device(&input, &pixels).unwrap();
        backend.execute(model.handle, stream).unwrap();
        backend.synchronize(stream).unwrap();

        let mut host = vec![0u8; 16];
        backend.copy_to_host(&output, &mut host).unwrap();
        assert_eq!(decode(&host, DType::F32), vec![10.0, 11.0, 12.0, 13.0]);
    }

    #[test]
    fn execute_requires_all_bindings() {
        let mut backend = SimBackend::new();
        let spec = SimModelSpec::detector(2, 2, &[2]);
        let (_ctx, stream, model) = loaded(&mut backend, &spec);
        assert!(matches!(
            backend.execute(model.handle, stream),
            Err(EdgeError::Device { .. })
        ));
    }

    #[test]
    fn context_is_current_per_thread() {
        let mut backend = SimBackend::new();
        let probe = backend.probe();
        let spec = SimModelSpec::detector(2, 2, &[1]);
        let (ctx, stream, model) = loaded(&mut backend, &spec);
        let input = backend.alloc(model.io.inputs[0].byte_size).unwrap();

        let backend = std::thread::spawn(move || {
            let pixels = vec![0u8; input.size()];
            assert!(matches!(
                backend.copy_to_device(&input, &pixels),
                Err(EdgeError::Device { code: -8, .. })
            ));
            assert!(backend.release(Resource::Stream(stream)).is_err());

            backend.set_current_context(ctx).unwrap();
            backend.copy_to_device(&input, &pixels).unwrap();
            backend.release(Resource::Buffer(input)).unwrap();
            backend
        })
        .join()
        .unwrap();
        drop(backend);

        assert!(!probe.live_resources().contains(&Resource::Buffer(input)));
        assert!(probe.live_resources().contains(&Resource::Stream(stream)));
    }

    #[test]
    fn trace_records_call_order() {
        let mut backend = SimBackend::new();
        let probe = backend.probe();
        let spec = SimModelSpec::detector(2, 2, &[1]);
        let (ctx, _stream, _model) = loaded(&mut backend, &spec);
        backend.set_current_context(ctx).unwrap();
        assert_eq!(
            probe.trace(),
            vec![
                SimOp::InitRuntime,
                SimOp::SetDevice,
                SimOp::CreateContext,
                SimOp::CreateStream,
                SimOp::LoadModel,
                SimOp::SetCurrentContext,
            ]
        );
    }

    #[test]
    fn bind_rejects_undersized_buffer() {
        let mut backend = SimBackend::new();
        let spec = SimModelSpec::detector(2, 2, &[2]);
        let (_ctx, _stream, model) = loaded(&mut backend, &spec);
        let small = backend.alloc(4).unwrap();
        assert!(backend.bind(model.handle, IoKind::Input, 0, &small).is_err());
    }

    #[test]
    fn injected_alloc_fault_is_resource_exhaustion() {
        let mut backend = SimBackend::new().with_fault(SimFault::on_nth(SimOp::Alloc, 2));
        let probe = backend.probe();
        assert!(backend.alloc(8).is_ok());
        assert!(matches!(
            backend.alloc(8),
            Err(EdgeError::ResourceExhausted { requested: 8, .. })
        ));
        assert_eq!(probe.calls(SimOp::Alloc), 2);
        assert_eq!(probe.allocations(), 1);
    }

    #[test]
    fn integer_encodings_saturate() {
        assert_eq!(encode(&[300.0, -5.0], DType::U8), vec![255, 0]);
        assert_eq!(encode(&[200.0], DType::I8), vec![127u8]);
        assert_eq!(decode(&[0x80], DType::I8), vec![-128.0]);
    }
}
