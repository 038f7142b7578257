//! Rockchip RKNN backend using zero-copy tensor memory.
//!
//! RKNN has no separate runtime, device, context or stream objects: they all
//! live inside the `rknn_context` created by `load_model`. The earlier steps
//! only record the requested NPU core and hand out placeholder handles.
//! Tensor memory is CPU-mapped, so host copies are plain memcpys.

use std::collections::HashMap;
use std::ffi::{c_void, CStr};
use std::mem;
use std::ptr;

use edgeflow_core::{DType, EdgeError, Result};
use edgeflow_device::{
    DeviceBackend, DeviceBuffer, IoKind, Layout, LoadedModel, ModelBlob, ModelIo, QuantParams,
    RawHandle, Resource, TensorDescriptor,
};
use edgeflow_npu_sys::rknn::{self, rknn_context, rknn_tensor_attr, rknn_tensor_mem};
use edgeflow_npu_sys::rknn::{RknnTensorFormat, RknnTensorType};

const PLACEHOLDER: RawHandle = RawHandle(1);
const RKNN_TENSOR_QNT_AFFINE_ASYMMETRIC: i32 = 2;

fn check(op: &str, ret: i32) -> Result<()> {
    if ret == rknn::RKNN_SUCC {
        Ok(())
    } else {
        Err(EdgeError::device(op, ret))
    }
}

fn core_mask(device_id: u32) -> i32 {
    match device_id {
        0 => rknn::RKNN_NPU_CORE_0,
        1 => rknn::RKNN_NPU_CORE_1,
        2 => rknn::RKNN_NPU_CORE_2,
        _ => rknn::RKNN_NPU_CORE_AUTO,
    }
}

/// Rockchip NPU through `librknnrt`.
#[derive(Default)]
pub struct RknnBackend {
    ctx: Option<rknn_context>,
    core_mask: i32,
    attrs: AttrMap,
}

// The rknn context and tensor memories are not tied to the creating thread.
unsafe impl Send for RknnBackend {}

impl RknnBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn context(&self, op: &str) -> Result<rknn_context> {
        self.ctx.ok_or_else(|| EdgeError::device(op, -1))
    }
}

type AttrMap = HashMap<(IoKind, usize), rknn_tensor_attr>;

/// Apply the core mask and read every tensor attribute of a fresh context.
fn describe(ctx: rknn_context, core_mask: i32) -> Result<(ModelIo, AttrMap)> {
    check("rknn_set_core_mask", unsafe {
        rknn::rknn_set_core_mask(ctx, core_mask)
    })?;
    let mut num = rknn::rknn_input_output_num::default();
    check("rknn_query", unsafe {
        rknn::rknn_query(
            ctx,
            rknn::RKNN_QUERY_IN_OUT_NUM,
            &mut num as *mut _ as *mut c_void,
            mem::size_of::<rknn::rknn_input_output_num>() as u32,
        )
    })?;

    let mut attrs = AttrMap::new();
    let mut io = ModelIo::default();
    for i in 0..num.n_input {
        let mut attr = query_attr(ctx, IoKind::Input, i)?;
        // Zero-copy input takes the frame as interleaved u8.
        attr.type_ = RknnTensorType::Uint8 as i32;
        attr.fmt = RknnTensorFormat::Nhwc as i32;
        attr.size = attr.size_with_stride.max(attr.n_elems);
        io.inputs.push(to_descriptor(&attr)?);
        attrs.insert((IoKind::Input, i as usize), attr);
    }
    for i in 0..num.n_output {
        let attr = query_attr(ctx, IoKind::Output, i)?;
        io.outputs.push(to_descriptor(&attr)?);
        attrs.insert((IoKind::Output, i as usize), attr);
    }
    Ok((io, attrs))
}

fn query_attr(ctx: rknn_context, io: IoKind, index: u32) -> Result<rknn_tensor_attr> {
    let mut attr = rknn_tensor_attr {
        index,
        ..Default::default()
    };
    let cmd = match io {
        IoKind::Input => rknn::RKNN_QUERY_INPUT_ATTR,
        IoKind::Output => rknn::RKNN_QUERY_OUTPUT_ATTR,
    };
    check("rknn_query", unsafe {
        rknn::rknn_query(
            ctx,
            cmd,
            &mut attr as *mut _ as *mut c_void,
            mem::size_of::<rknn_tensor_attr>() as u32,
        )
    })?;
    Ok(attr)
}

fn to_descriptor(attr: &rknn_tensor_attr) -> Result<TensorDescriptor> {
    let name = unsafe { CStr::from_ptr(attr.name.as_ptr()) }
        .to_string_lossy()
        .into_owned();
    let dims: Vec<usize> = attr.dims[..(attr.n_dims as usize).min(rknn::RKNN_MAX_DIMS)]
        .iter()
        .map(|&d| d as usize)
        .collect();
    let dtype = match RknnTensorType::from_i32(attr.type_) {
        Some(RknnTensorType::Float32) => DType::F32,
        Some(RknnTensorType::Float16) => DType::F16,
        Some(RknnTensorType::Int8) => DType::I8,
        Some(RknnTensorType::Uint8) => DType::U8,
        Some(RknnTensorType::Int32) => DType::I32,
        _ => {
            return Err(EdgeError::Config(format!(
                "tensor '{name}' has unsupported type {}",
                attr.type_
            )))
        }
    };
    let layout = match RknnTensorFormat::from_i32(attr.fmt) {
        Some(RknnTensorFormat::Nchw) => Layout::Nchw,
        Some(RknnTensorFormat::Nhwc) => Layout::Nhwc,
        Some(RknnTensorFormat::Nc1hwc2) => Layout::Nc1hwc0,
        _ => Layout::Nd,
    };
    let desc = TensorDescriptor::new(
        attr.index as usize,
        name,
        &dims,
        dtype,
        layout,
        Some(attr.size as usize),
    )?;
    Ok(if attr.qnt_type == RKNN_TENSOR_QNT_AFFINE_ASYMMETRIC {
        desc.with_quant(QuantParams {
            zero_point: attr.zp,
            scale: attr.scale,
        })
    } else {
        desc
    })
}

fn tensor_mem(buffer: &DeviceBuffer) -> *mut rknn_tensor_mem {
    buffer.handle().as_ptr()
}

impl DeviceBackend for RknnBackend {
    fn name(&self) -> &'static str {
        "rknn"
    }

    fn init_runtime(&mut self) -> Result<()> {
        Ok(())
    }

    fn set_device(&mut self, device_id: u32) -> Result<()> {
        self.core_mask = core_mask(device_id);
        Ok(())
    }

    fn create_context(&mut self, _device_id: u32) -> Result<RawHandle> {
        Ok(PLACEHOLDER)
    }

    fn create_stream(&mut self, _context: RawHandle) -> Result<RawHandle> {
        Ok(PLACEHOLDER)
    }

    fn load_model(&mut self, blob: &ModelBlob) -> Result<LoadedModel> {
        if self.ctx.is_some() {
            return Err(EdgeError::Config("rknn backend holds one model".into()));
        }
        let bytes = blob.as_bytes();
        let mut ctx: rknn_context = 0;
        // rknn_init only reads the model bytes.
        check("rknn_init", unsafe {
            rknn::rknn_init(
                &mut ctx,
                bytes.as_ptr() as *mut c_void,
                bytes.len() as u32,
                0,
                ptr::null_mut(),
            )
        })?;

        match describe(ctx, self.core_mask) {
            Ok((io, attrs)) => {
                self.ctx = Some(ctx);
                self.attrs = attrs;
                Ok(LoadedModel {
                    handle: RawHandle(ctx as u64),
                    io,
                })
            }
            Err(e) => {
                unsafe { rknn::rknn_destroy(ctx) };
                Err(e)
            }
        }
    }

    fn alloc(&mut self, size: usize) -> Result<DeviceBuffer> {
        let ctx = self.context("rknn_create_mem")?;
        let mem = unsafe { rknn::rknn_create_mem(ctx, size as u32) };
        if mem.is_null() {
            return Err(EdgeError::ResourceExhausted {
                requested: size,
                reason: "rknn_create_mem returned null".into(),
            });
        }
        Ok(DeviceBuffer::new(RawHandle::from_ptr(mem), size))
    }

    fn bind(
        &mut self,
        _model: RawHandle,
        io: IoKind,
        index: usize,
        buffer: &DeviceBuffer,
    ) -> Result<()> {
        let ctx = self.context("rknn_set_io_mem")?;
        let attr = self
            .attrs
            .get_mut(&(io, index))
            .ok_or_else(|| EdgeError::device("rknn_set_io_mem", -1))?;
        check("rknn_set_io_mem", unsafe {
            rknn::rknn_set_io_mem(ctx, tensor_mem(buffer), attr)
        })
    }

    fn set_current_context(&mut self, _context: RawHandle) -> Result<()> {
        Ok(())
    }

    fn copy_to_device(&mut self, dst: &DeviceBuffer, src: &[u8]) -> Result<()> {
        if src.len() > dst.size() {
            return Err(EdgeError::InputMismatch(format!(
                "{} bytes do not fit a {} byte tensor memory",
                src.len(),
                dst.size()
            )));
        }
        unsafe {
            let mem = tensor_mem(dst);
            ptr::copy_nonoverlapping(src.as_ptr(), (*mem).virt_addr as *mut u8, src.len());
        }
        Ok(())
    }

    fn execute(&mut self, _model: RawHandle, _stream: RawHandle) -> Result<()> {
        let ctx = self.context("rknn_run")?;
        check("rknn_run", unsafe { rknn::rknn_run(ctx, ptr::null_mut()) })
    }

    fn synchronize(&mut self, _stream: RawHandle) -> Result<()> {
        // rknn_run blocks until the outputs are written.
        Ok(())
    }

    fn copy_to_host(&mut self, src: &DeviceBuffer, dst: &mut [u8]) -> Result<()> {
        if dst.len() > src.size() {
            return Err(EdgeError::InputMismatch(format!(
                "host buffer of {} bytes exceeds {} byte tensor memory",
                dst.len(),
                src.size()
            )));
        }
        unsafe {
            let mem = tensor_mem(src);
            ptr::copy_nonoverlapping((*mem).virt_addr as *const u8, dst.as_mut_ptr(), dst.len());
        }
        Ok(())
    }

    fn release(&mut self, resource: Resource) -> Result<()> {
        match resource {
            Resource::Buffer(b) => {
                let ctx = self.context("rknn_destroy_mem")?;
                check("rknn_destroy_mem", unsafe {
                    rknn::rknn_destroy_mem(ctx, tensor_mem(&b))
                })
            }
            Resource::Model(_) => {
                let ctx = self.context("rknn_destroy")?;
                self.ctx = None;
                self.attrs.clear();
                check("rknn_destroy", unsafe { rknn::rknn_destroy(ctx) })
            }
            _ => Ok(()),
        }
    }
}
