//! AscendCL backend.

use std::collections::HashMap;
use std::ffi::{c_void, CStr};
use std::ptr;

use edgeflow_core::{DType, EdgeError, Result};
use edgeflow_device::{
    DeviceBackend, DeviceBuffer, IoKind, Layout, LoadedModel, ModelBlob, ModelIo, RawHandle,
    Resource, TensorDescriptor,
};
use edgeflow_npu_sys::acl::{self, aclError, aclmdlDataset, aclmdlDesc, AclDataType, AclFormat};

fn check(op: &str, ret: aclError) -> Result<()> {
    if ret == acl::ACL_SUCCESS {
        Ok(())
    } else {
        Err(EdgeError::device(op, ret))
    }
}

struct AclModel {
    desc: *mut aclmdlDesc,
    inputs: *mut aclmdlDataset,
    outputs: *mut aclmdlDataset,
    data_buffers: HashMap<(IoKind, usize), *mut acl::aclDataBuffer>,
}

impl AclModel {
    /// Destroy leftover data buffers, both datasets and the description, then unload.
    unsafe fn destroy(self, model_id: u32) -> Result<()> {
        for db in self.data_buffers.into_values() {
            acl::aclDestroyDataBuffer(db);
        }
        if !self.inputs.is_null() {
            acl::aclmdlDestroyDataset(self.inputs);
        }
        if !self.outputs.is_null() {
            acl::aclmdlDestroyDataset(self.outputs);
        }
        if !self.desc.is_null() {
            acl::aclmdlDestroyDesc(self.desc);
        }
        check("aclmdlUnload", acl::aclmdlUnload(model_id))
    }
}

/// Huawei Ascend NPU through AscendCL.
///
/// Model handles are AscendCL model ids. Input and output datasets are built
/// from the bindings in index order.
#[derive(Default)]
pub struct AclBackend {
    models: HashMap<u32, AclModel>,
}

// AscendCL handles may be used from any thread once the context is made current.
unsafe impl Send for AclBackend {}

impl AclBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

fn model_id(handle: RawHandle) -> u32 {
    handle.0 as u32
}

fn read_descriptor(desc: *mut aclmdlDesc, io: IoKind, index: usize) -> Result<TensorDescriptor> {
    let mut dims = acl::aclmdlIODims::default();
    let (ret, size, dtype, format) = unsafe {
        match io {
            IoKind::Input => (
                acl::aclmdlGetInputDims(desc, index, &mut dims),
                acl::aclmdlGetInputSizeByIndex(desc, index),
                acl::aclmdlGetInputDataType(desc, index),
                acl::aclmdlGetInputFormat(desc, index),
            ),
            IoKind::Output => (
                acl::aclmdlGetOutputDims(desc, index, &mut dims),
                acl::aclmdlGetOutputSizeByIndex(desc, index),
                acl::aclmdlGetOutputDataType(desc, index),
                acl::aclmdlGetOutputFormat(desc, index),
            ),
        }
    };
    check("aclmdlGetDims", ret)?;

    let name = unsafe { CStr::from_ptr(dims.name.as_ptr()) }
        .to_string_lossy()
        .into_owned();
    let count = dims.dimCount.min(acl::ACL_MAX_DIM_CNT);
    let shape = dims.dims[..count]
        .iter()
        .map(|&d| {
            usize::try_from(d).map_err(|_| {
                EdgeError::Config(format!("tensor '{name}' has dynamic dimension {d}"))
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let dtype = match AclDataType::from_i32(dtype) {
        Some(AclDataType::Float) => DType::F32,
        Some(AclDataType::Float16) => DType::F16,
        Some(AclDataType::Int8) => DType::I8,
        Some(AclDataType::Int32) => DType::I32,
        Some(AclDataType::Uint8) => DType::U8,
        None => {
            return Err(EdgeError::Config(format!(
                "tensor '{name}' has unsupported data type {dtype}"
            )))
        }
    };
    let layout = match AclFormat::from_i32(format) {
        Some(AclFormat::Nchw) => Layout::Nchw,
        Some(AclFormat::Nhwc) => Layout::Nhwc,
        Some(AclFormat::Nc1hwc0) => Layout::Nc1hwc0,
        Some(AclFormat::Nd) | None => Layout::Nd,
    };

    TensorDescriptor::new(index, name, &shape, dtype, layout, Some(size))
}

impl DeviceBackend for AclBackend {
    fn name(&self) -> &'static str {
        "acl"
    }

    fn init_runtime(&mut self) -> Result<()> {
        check("aclInit", unsafe { acl::aclInit(ptr::null()) })
    }

    fn set_device(&mut self, device_id: u32) -> Result<()> {
        check("aclrtSetDevice", unsafe { acl::aclrtSetDevice(device_id as i32) })
    }

    fn create_context(&mut self, device_id: u32) -> Result<RawHandle> {
        let mut ctx: acl::aclrtContext = ptr::null_mut();
        check("aclrtCreateContext", unsafe {
            acl::aclrtCreateContext(&mut ctx, device_id as i32)
        })?;
        Ok(RawHandle::from_ptr(ctx))
    }

    fn create_stream(&mut self, context: RawHandle) -> Result<RawHandle> {
        self.set_current_context(context)?;
        let mut stream: acl::aclrtStream = ptr::null_mut();
        check("aclrtCreateStream", unsafe { acl::aclrtCreateStream(&mut stream) })?;
        Ok(RawHandle::from_ptr(stream))
    }

    fn load_model(&mut self, blob: &ModelBlob) -> Result<LoadedModel> {
        let bytes = blob.as_bytes();
        let mut id = 0u32;
        check("aclmdlLoadFromMem", unsafe {
            acl::aclmdlLoadFromMem(bytes.as_ptr() as *const c_void, bytes.len(), &mut id)
        })?;

        let mut model = AclModel {
            desc: ptr::null_mut(),
            inputs: ptr::null_mut(),
            outputs: ptr::null_mut(),
            data_buffers: HashMap::new(),
        };
        let describe = |model: &mut AclModel| -> Result<ModelIo> {
            model.desc = unsafe { acl::aclmdlCreateDesc() };
            if model.desc.is_null() {
                return Err(EdgeError::device("aclmdlCreateDesc", -1));
            }
            check("aclmdlGetDesc", unsafe { acl::aclmdlGetDesc(model.desc, id) })?;
            model.inputs = unsafe { acl::aclmdlCreateDataset() };
            model.outputs = unsafe { acl::aclmdlCreateDataset() };
            if model.inputs.is_null() || model.outputs.is_null() {
                return Err(EdgeError::device("aclmdlCreateDataset", -1));
            }

            let n_in = unsafe { acl::aclmdlGetNumInputs(model.desc) };
            let n_out = unsafe { acl::aclmdlGetNumOutputs(model.desc) };
            Ok(ModelIo {
                inputs: (0..n_in)
                    .map(|i| read_descriptor(model.desc, IoKind::Input, i))
                    .collect::<Result<_>>()?,
                outputs: (0..n_out)
                    .map(|i| read_descriptor(model.desc, IoKind::Output, i))
                    .collect::<Result<_>>()?,
            })
        };

        match describe(&mut model) {
            Ok(io) => {
                self.models.insert(id, model);
                Ok(LoadedModel {
                    handle: RawHandle(id as u64),
                    io,
                })
            }
            Err(e) => {
                if let Err(cleanup) = unsafe { model.destroy(id) } {
                    tracing::warn!(error = %cleanup, "failed to unload partially described model");
                }
                Err(e)
            }
        }
    }

    fn alloc(&mut self, size: usize) -> Result<DeviceBuffer> {
        let mut ptr: *mut c_void = ptr::null_mut();
        let ret = unsafe { acl::aclrtMalloc(&mut ptr, size, acl::ACL_MEM_MALLOC_HUGE_FIRST) };
        if ret != acl::ACL_SUCCESS || ptr.is_null() {
            return Err(EdgeError::ResourceExhausted {
                requested: size,
                reason: format!("aclrtMalloc returned {ret}"),
            });
        }
        Ok(DeviceBuffer::new(RawHandle::from_ptr(ptr), size))
    }

    fn bind(
        &mut self,
        model: RawHandle,
        io: IoKind,
        index: usize,
        buffer: &DeviceBuffer,
    ) -> Result<()> {
        let m = self
            .models
            .get_mut(&model_id(model))
            .ok_or_else(|| EdgeError::device("aclmdlAddDatasetBuffer", -1))?;
        let db = unsafe { acl::aclCreateDataBuffer(buffer.as_ptr(), buffer.size()) };
        if db.is_null() {
            return Err(EdgeError::device("aclCreateDataBuffer", -1));
        }
        let dataset = match io {
            IoKind::Input => m.inputs,
            IoKind::Output => m.outputs,
        };
        if let Err(e) = check("aclmdlAddDatasetBuffer", unsafe {
            acl::aclmdlAddDatasetBuffer(dataset, db)
        }) {
            unsafe { acl::aclDestroyDataBuffer(db) };
            return Err(e);
        }
        m.data_buffers.insert((io, index), db);
        Ok(())
    }

    fn set_current_context(&mut self, context: RawHandle) -> Result<()> {
        check("aclrtSetCurrentContext", unsafe {
            acl::aclrtSetCurrentContext(context.as_ptr())
        })
    }

    fn copy_to_device(&mut self, dst: &DeviceBuffer, src: &[u8]) -> Result<()> {
        if src.len() > dst.size() {
            return Err(EdgeError::InputMismatch(format!(
                "{} bytes do not fit a {} byte device buffer",
                src.len(),
                dst.size()
            )));
        }
        check("aclrtMemcpy", unsafe {
            acl::aclrtMemcpy(
                dst.as_ptr(),
                dst.size(),
                src.as_ptr() as *const c_void,
                src.len(),
                acl::ACL_MEMCPY_HOST_TO_DEVICE,
            )
        })
    }

    fn execute(&mut self, model: RawHandle, _stream: RawHandle) -> Result<()> {
        let m = self
            .models
            .get(&model_id(model))
            .ok_or_else(|| EdgeError::device("aclmdlExecute", -1))?;
        check("aclmdlExecute", unsafe {
            acl::aclmdlExecute(model_id(model), m.inputs, m.outputs)
        })
    }

    fn synchronize(&mut self, stream: RawHandle) -> Result<()> {
        check("aclrtSynchronizeStream", unsafe {
            acl::aclrtSynchronizeStream(stream.as_ptr())
        })
    }

    fn copy_to_host(&mut self, src: &DeviceBuffer, dst: &mut [u8]) -> Result<()> {
        if dst.len() > src.size() {
            return Err(EdgeError::InputMismatch(format!(
                "host buffer of {} bytes exceeds {} byte device buffer",
                dst.len(),
                src.size()
            )));
        }
        check("aclrtMemcpy", unsafe {
            acl::aclrtMemcpy(
                dst.as_mut_ptr() as *mut c_void,
                dst.len(),
                src.as_ptr(),
                dst.len(),
                acl::ACL_MEMCPY_DEVICE_TO_HOST,
            )
        })
    }

    fn release(&mut self, resource: Resource) -> Result<()> {
        match resource {
            Resource::Runtime => check("aclFinalize", unsafe { acl::aclFinalize() }),
            Resource::Device(id) => {
                check("aclrtResetDevice", unsafe { acl::aclrtResetDevice(id as i32) })
            }
            Resource::Context(h) => {
                check("aclrtDestroyContext", unsafe { acl::aclrtDestroyContext(h.as_ptr()) })
            }
            Resource::Stream(h) => {
                check("aclrtDestroyStream", unsafe { acl::aclrtDestroyStream(h.as_ptr()) })
            }
            Resource::Model(h) => match self.models.remove(&model_id(h)) {
                Some(m) => unsafe { m.destroy(model_id(h)) },
                None => Err(EdgeError::device("aclmdlUnload", -1)),
            },
            Resource::Buffer(b) => check("aclrtFree", unsafe { acl::aclrtFree(b.as_ptr()) }),
            Resource::Binding { model, io, index } => {
                let db = self
                    .models
                    .get_mut(&model_id(model))
                    .and_then(|m| m.data_buffers.remove(&(io, index)));
                match db {
                    Some(db) => check("aclDestroyDataBuffer", unsafe {
                        acl::aclDestroyDataBuffer(db)
                    }),
                    None => Ok(()),
                }
            }
        }
    }
}
