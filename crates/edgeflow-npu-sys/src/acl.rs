//! AscendCL (CANN) runtime and model-manager entry points.

use std::os::raw::{c_char, c_void};

pub type aclError = i32;
pub type aclrtContext = *mut c_void;
pub type aclrtStream = *mut c_void;

pub const ACL_SUCCESS: aclError = 0;
pub const ACL_MAX_DIM_CNT: usize = 128;
pub const ACL_MAX_TENSOR_NAME_LEN: usize = 128;

/// `aclrtMemMallocPolicy::ACL_MEM_MALLOC_HUGE_FIRST`
pub const ACL_MEM_MALLOC_HUGE_FIRST: i32 = 0;
/// `aclrtMemcpyKind::ACL_MEMCPY_HOST_TO_DEVICE`
pub const ACL_MEMCPY_HOST_TO_DEVICE: i32 = 1;
/// `aclrtMemcpyKind::ACL_MEMCPY_DEVICE_TO_HOST`
pub const ACL_MEMCPY_DEVICE_TO_HOST: i32 = 2;

#[repr(C)]
pub struct aclmdlDesc {
    _private: [u8; 0],
}

#[repr(C)]
pub struct aclmdlDataset {
    _private: [u8; 0],
}

#[repr(C)]
pub struct aclDataBuffer {
    _private: [u8; 0],
}

#[repr(C)]
pub struct aclmdlIODims {
    pub name: [c_char; ACL_MAX_TENSOR_NAME_LEN],
    pub dimCount: usize,
    pub dims: [i64; ACL_MAX_DIM_CNT],
}

impl Default for aclmdlIODims {
    fn default() -> Self {
        Self {
            name: [0; ACL_MAX_TENSOR_NAME_LEN],
            dimCount: 0,
            dims: [0; ACL_MAX_DIM_CNT],
        }
    }
}

/// `aclDataType` values used by the runner.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclDataType {
    Float = 0,
    Float16 = 1,
    Int8 = 2,
    Int32 = 3,
    Uint8 = 4,
}

impl AclDataType {
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(Self::Float),
            1 => Some(Self::Float16),
            2 => Some(Self::Int8),
            3 => Some(Self::Int32),
            4 => Some(Self::Uint8),
            _ => None,
        }
    }
}

/// `aclFormat` values used by the runner.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclFormat {
    Nchw = 0,
    Nhwc = 1,
    Nd = 2,
    Nc1hwc0 = 3,
}

impl AclFormat {
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(Self::Nchw),
            1 => Some(Self::Nhwc),
            2 => Some(Self::Nd),
            3 => Some(Self::Nc1hwc0),
            _ => None,
        }
    }
}

extern "C" {
    // Runtime lifecycle
    pub fn aclInit(configPath: *const c_char) -> aclError;
    pub fn aclFinalize() -> aclError;
    pub fn aclrtSetDevice(deviceId: i32) -> aclError;
    pub fn aclrtResetDevice(deviceId: i32) -> aclError;

    // Context and stream
    pub fn aclrtCreateContext(context: *mut aclrtContext, deviceId: i32) -> aclError;
    pub fn aclrtDestroyContext(context: aclrtContext) -> aclError;
    pub fn aclrtSetCurrentContext(context: aclrtContext) -> aclError;
    pub fn aclrtCreateStream(stream: *mut aclrtStream) -> aclError;
    pub fn aclrtDestroyStream(stream: aclrtStream) -> aclError;
    pub fn aclrtSynchronizeStream(stream: aclrtStream) -> aclError;

    // Device memory
    pub fn aclrtMalloc(devPtr: *mut *mut c_void, size: usize, policy: i32) -> aclError;
    pub fn aclrtFree(devPtr: *mut c_void) -> aclError;
    pub fn aclrtMemcpy(
        dst: *mut c_void,
        destMax: usize,
        src: *const c_void,
        count: usize,
        kind: i32,
    ) -> aclError;

    // Model lifecycle
    pub fn aclmdlLoadFromMem(model: *const c_void, modelSize: usize, modelId: *mut u32)
        -> aclError;
    pub fn aclmdlUnload(modelId: u32) -> aclError;
    pub fn aclmdlExecute(
        modelId: u32,
        input: *const aclmdlDataset,
        output: *mut aclmdlDataset,
    ) -> aclError;

    // Model description
    pub fn aclmdlCreateDesc() -> *mut aclmdlDesc;
    pub fn aclmdlDestroyDesc(desc: *mut aclmdlDesc) -> aclError;
    pub fn aclmdlGetDesc(desc: *mut aclmdlDesc, modelId: u32) -> aclError;
    pub fn aclmdlGetNumInputs(desc: *mut aclmdlDesc) -> usize;
    pub fn aclmdlGetNumOutputs(desc: *mut aclmdlDesc) -> usize;
    pub fn aclmdlGetInputSizeByIndex(desc: *mut aclmdlDesc, index: usize) -> usize;
    pub fn aclmdlGetOutputSizeByIndex(desc: *mut aclmdlDesc, index: usize) -> usize;
    pub fn aclmdlGetInputDims(
        desc: *const aclmdlDesc,
        index: usize,
        dims: *mut aclmdlIODims,
    ) -> aclError;
    pub fn aclmdlGetOutputDims(
        desc: *const aclmdlDesc,
        index: usize,
        dims: *mut aclmdlIODims,
    ) -> aclError;
    pub fn aclmdlGetInputDataType(desc: *const aclmdlDesc, index: usize) -> i32;
    pub fn aclmdlGetOutputDataType(desc: *const aclmdlDesc, index: usize) -> i32;
    pub fn aclmdlGetInputFormat(desc: *const aclmdlDesc, index: usize) -> i32;
    pub fn aclmdlGetOutputFormat(desc: *const aclmdlDesc, index: usize) -> i32;

    // Datasets
    pub fn aclmdlCreateDataset() -> *mut aclmdlDataset;
    pub fn aclmdlDestroyDataset(dataset: *const aclmdlDataset) -> aclError;
    pub fn aclmdlAddDatasetBuffer(
        dataset: *mut aclmdlDataset,
        dataBuffer: *mut aclDataBuffer,
    ) -> aclError;
    pub fn aclCreateDataBuffer(data: *mut c_void, size: usize) -> *mut aclDataBuffer;
    pub fn aclDestroyDataBuffer(dataBuffer: *const aclDataBuffer) -> aclError;
}
