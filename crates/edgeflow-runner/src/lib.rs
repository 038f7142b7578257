pub mod marshal;
pub mod runner;
pub mod session;

#[cfg(feature = "acl")]
pub mod acl;
#[cfg(feature = "rknn")]
pub mod rknn;

pub use runner::{DeviceRunner, RunnerConfig, RunnerState};
pub use session::DeviceSession;

#[cfg(feature = "acl")]
pub use acl::AclBackend;
#[cfg(feature = "rknn")]
pub use rknn::RknnBackend;
