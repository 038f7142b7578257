use crate::backend::RawHandle;

/// Accelerator-resident memory, addressed by an opaque handle.
///
/// This is a description of the allocation, not its owner: the runner's
/// resource ledger frees it. The size never changes after allocation.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceBuffer {
    handle: RawHandle,
    size: usize,
}

impl DeviceBuffer {
    pub fn new(handle: RawHandle, size: usize) -> Self {
        Self { handle, size }
    }

    pub fn handle(&self) -> RawHandle {
        self.handle
    }

    /// Size in bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Handle as a raw device pointer, for FFI backends.
    pub fn as_ptr(&self) -> *mut std::ffi::c_void {
        self.handle.0 as *mut std::ffi::c_void
    }
}

impl std::fmt::Debug for DeviceBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceBuffer")
            .field("size", &self.size)
            .field("handle", &format_args!("0x{:x}", self.handle.0))
            .finish()
    }
}
