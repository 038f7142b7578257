//! RKNN runtime (`librknnrt`) entry points for zero-copy inference.

use std::os::raw::{c_char, c_int, c_void};

#[cfg(target_pointer_width = "64")]
pub type rknn_context = u64;
#[cfg(not(target_pointer_width = "64"))]
pub type rknn_context = u32;

pub const RKNN_SUCC: c_int = 0;
pub const RKNN_MAX_DIMS: usize = 16;
pub const RKNN_MAX_NAME_LEN: usize = 256;

pub const RKNN_QUERY_IN_OUT_NUM: c_int = 0;
pub const RKNN_QUERY_INPUT_ATTR: c_int = 1;
pub const RKNN_QUERY_OUTPUT_ATTR: c_int = 2;

/// `rknn_core_mask` values.
pub const RKNN_NPU_CORE_AUTO: c_int = 0;
pub const RKNN_NPU_CORE_0: c_int = 1;
pub const RKNN_NPU_CORE_1: c_int = 2;
pub const RKNN_NPU_CORE_2: c_int = 4;

#[repr(C)]
#[derive(Debug, Default, Clone, Copy)]
pub struct rknn_input_output_num {
    pub n_input: u32,
    pub n_output: u32,
}

#[repr(C)]
#[derive(Clone, Copy)]
pub struct rknn_tensor_attr {
    pub index: u32,
    pub n_dims: u32,
    pub dims: [u32; RKNN_MAX_DIMS],
    pub name: [c_char; RKNN_MAX_NAME_LEN],
    pub n_elems: u32,
    pub size: u32,
    pub fmt: c_int,
    pub type_: c_int,
    pub qnt_type: c_int,
    pub fl: i8,
    pub zp: i32,
    pub scale: f32,
    pub w_stride: u32,
    pub size_with_stride: u32,
    pub pass_through: u8,
    pub h_stride: u32,
}

impl Default for rknn_tensor_attr {
    fn default() -> Self {
        Self {
            index: 0,
            n_dims: 0,
            dims: [0; RKNN_MAX_DIMS],
            name: [0; RKNN_MAX_NAME_LEN],
            n_elems: 0,
            size: 0,
            fmt: 0,
            type_: 0,
            qnt_type: 0,
            fl: 0,
            zp: 0,
            scale: 0.0,
            w_stride: 0,
            size_with_stride: 0,
            pass_through: 0,
            h_stride: 0,
        }
    }
}

#[repr(C)]
pub struct rknn_tensor_mem {
    pub virt_addr: *mut c_void,
    pub phys_addr: u64,
    pub fd: i32,
    pub offset: i32,
    pub size: u32,
    pub flags: u32,
    pub priv_data: *mut c_void,
}

/// `rknn_tensor_type` values.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RknnTensorType {
    Float32 = 0,
    Float16 = 1,
    Int8 = 2,
    Uint8 = 3,
    Int16 = 4,
    Uint16 = 5,
    Int32 = 6,
}

impl RknnTensorType {
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(Self::Float32),
            1 => Some(Self::Float16),
            2 => Some(Self::Int8),
            3 => Some(Self::Uint8),
            4 => Some(Self::Int16),
            5 => Some(Self::Uint16),
            6 => Some(Self::Int32),
            _ => None,
        }
    }
}

/// `rknn_tensor_format` values.
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RknnTensorFormat {
    Nchw = 0,
    Nhwc = 1,
    Nc1hwc2 = 2,
    Undefined = 3,
}

impl RknnTensorFormat {
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(Self::Nchw),
            1 => Some(Self::Nhwc),
            2 => Some(Self::Nc1hwc2),
            3 => Some(Self::Undefined),
            _ => None,
        }
    }
}

extern "C" {
    pub fn rknn_init(
        context: *mut rknn_context,
        model: *mut c_void,
        size: u32,
        flag: u32,
        extend: *mut c_void,
    ) -> c_int;
    pub fn rknn_destroy(context: rknn_context) -> c_int;
    pub fn rknn_set_core_mask(context: rknn_context, core_mask: c_int) -> c_int;
    pub fn rknn_query(context: rknn_context, cmd: c_int, info: *mut c_void, size: u32) -> c_int;
    pub fn rknn_run(context: rknn_context, extend: *mut c_void) -> c_int;

    // Zero-copy memory
    pub fn rknn_create_mem(context: rknn_context, size: u32) -> *mut rknn_tensor_mem;
    pub fn rknn_destroy_mem(context: rknn_context, mem: *mut rknn_tensor_mem) -> c_int;
    pub fn rknn_set_io_mem(
        context: rknn_context,
        mem: *mut rknn_tensor_mem,
        attr: *mut rknn_tensor_attr,
    ) -> c_int;
}
