//! Accelerator-facing building blocks: the backend contract, tensor metadata,
//! model blobs and the simulated backend used by tests and `--backend sim`.

pub mod backend;
pub mod blob;
pub mod buffer;
pub mod sim;
pub mod tensor;

pub use backend::{DeviceBackend, IoKind, LoadedModel, RawHandle, Resource};
pub use blob::ModelBlob;
pub use buffer::DeviceBuffer;
pub use sim::{SimBackend, SimFault, SimModelSpec, SimOp, SimProbe, SimTensorSpec};
pub use tensor::{dump_tensor_attr, Layout, ModelIo, QuantParams, Shape, TensorDescriptor};
