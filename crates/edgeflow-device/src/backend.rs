//! The accelerator capability contract.
//!
//! One implementation per accelerator family. The runner is written once
//! against this trait and never sees vendor types.

use edgeflow_core::Result;

use crate::blob::ModelBlob;
use crate::buffer::DeviceBuffer;
use crate::tensor::ModelIo;

/// Opaque handle to a runtime object (context, stream, model, memory).
/// FFI backends store the raw pointer or id value here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RawHandle(pub u64);

impl RawHandle {
    pub const NULL: RawHandle = RawHandle(0);

    pub fn from_ptr<T>(ptr: *mut T) -> Self {
        RawHandle(ptr as u64)
    }

    pub fn as_ptr<T>(self) -> *mut T {
        self.0 as *mut T
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IoKind {
    Input,
    Output,
}

/// Everything a runner can acquire from a backend, and therefore has to give back.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Resource {
    Runtime,
    Device(u32),
    Context(RawHandle),
    Stream(RawHandle),
    Model(RawHandle),
    Buffer(DeviceBuffer),
    Binding {
        model: RawHandle,
        io: IoKind,
        index: usize,
    },
}

impl Resource {
    pub fn kind(&self) -> &'static str {
        match self {
            Resource::Runtime => "runtime",
            Resource::Device(_) => "device",
            Resource::Context(_) => "context",
            Resource::Stream(_) => "stream",
            Resource::Model(_) => "model",
            Resource::Buffer(_) => "buffer",
            Resource::Binding { .. } => "binding",
        }
    }
}

/// A model resident on the accelerator plus its I/O description.
#[derive(Debug)]
pub struct LoadedModel {
    pub handle: RawHandle,
    pub io: ModelIo,
}

/// Accelerator runtime operations used by the device runner.
///
/// Every method that creates something has a matching [`Resource`] the caller
/// hands back to [`release`](Self::release). A non-success status from the
/// vendor runtime is reported as `EdgeError::Device`; a failed allocation as
/// `EdgeError::ResourceExhausted`.
pub trait DeviceBackend: Send {
    fn name(&self) -> &'static str;

    /// Acquire the process-wide runtime.
    fn init_runtime(&mut self) -> Result<()>;

    /// Bind the calling session to one device.
    fn set_device(&mut self, device_id: u32) -> Result<()>;

    fn create_context(&mut self, device_id: u32) -> Result<RawHandle>;

    fn create_stream(&mut self, context: RawHandle) -> Result<RawHandle>;

    /// Load a model from an in-memory blob. The blob may be dropped afterwards.
    fn load_model(&mut self, blob: &ModelBlob) -> Result<LoadedModel>;

    fn alloc(&mut self, size: usize) -> Result<DeviceBuffer>;

    /// Register `buffer` as the model's `io` tensor number `index`.
    fn bind(
        &mut self,
        model: RawHandle,
        io: IoKind,
        index: usize,
        buffer: &DeviceBuffer,
    ) -> Result<()>;

    /// Make `context` current on the calling thread.
    fn set_current_context(&mut self, context: RawHandle) -> Result<()>;

    fn copy_to_device(&mut self, dst: &DeviceBuffer, src: &[u8]) -> Result<()>;

    /// Submit one execution of `model` with its bound buffers.
    fn execute(&mut self, model: RawHandle, stream: RawHandle) -> Result<()>;

    /// Block until all work on `stream` has finished.
    fn synchronize(&mut self, stream: RawHandle) -> Result<()>;

    fn copy_to_host(&mut self, src: &DeviceBuffer, dst: &mut [u8]) -> Result<()>;

    fn release(&mut self, resource: Resource) -> Result<()>;
}

impl<B: DeviceBackend + ?Sized> DeviceBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }
    fn init_runtime(&mut self) -> Result<()> {
        (**self).init_runtime()
    }
    fn set_device(&mut self, device_id: u32) -> Result<()> {
        (**self).set_device(device_id)
    }
    fn create_context(&mut self, device_id: u32) -> Result<RawHandle> {
        (**self).create_context(device_id)
    }
    fn create_stream(&mut self, context: RawHandle) -> Result<RawHandle> {
        (**self).create_stream(context)
    }
    fn load_model(&mut self, blob: &ModelBlob) -> Result<LoadedModel> {
        (**self).load_model(blob)
    }
    fn alloc(&mut self, size: usize) -> Result<DeviceBuffer> {
        (**self).alloc(size)
    }
    fn bind(
        &mut self,
        model: RawHandle,
        io: IoKind,
        index: usize,
        buffer: &DeviceBuffer,
    ) -> Result<()> {
        (**self).bind(model, io, index, buffer)
    }
    fn set_current_context(&mut self, context: RawHandle) -> Result<()> {
        (**self).set_current_context(context)
    }
    fn copy_to_device(&mut self, dst: &DeviceBuffer, src: &[u8]) -> Result<()> {
        (**self).copy_to_device(dst, src)
    }
    fn execute(&mut self, model: RawHandle, stream: RawHandle) -> Result<()> {
        (**self).execute(model, stream)
    }
    fn synchronize(&mut self, stream: RawHandle) -> Result<()> {
        (**self).synchronize(stream)
    }
    fn copy_to_host(&mut self, src: &DeviceBuffer, dst: &mut [u8]) -> Result<()> {
        (**self).copy_to_host(src, dst)
    }
    fn release(&mut self, resource: Resource) -> Result<()> {
        (**self).release(resource)
    }
}
