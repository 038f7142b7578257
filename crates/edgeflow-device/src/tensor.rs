use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use edgeflow_core::{DType, EdgeError, Result};

/// Highest tensor rank the runner deals with.
pub const MAX_RANK: usize = 4;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Shape(pub SmallVec<[usize; MAX_RANK]>);

impl Shape {
    pub fn from_slice(d: &[usize]) -> Self {
        Self(d.iter().copied().collect())
    }

    pub fn rank(&self) -> usize {
        self.0.len()
    }

    pub fn numel(&self) -> usize {
        self.0.iter().product::<usize>()
    }

    /// Element count, or `None` if it does not fit in `usize`.
    pub fn checked_numel(&self) -> Option<usize> {
        self.0.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    fn dim_or_one(&self, i: usize) -> usize {
        self.0.get(i).copied().unwrap_or(1)
    }
}

/// Memory layout tag reported by the runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    Nchw,
    Nhwc,
    Nd,
    Nc1hwc0,
}

impl Layout {
    pub fn name(self) -> &'static str {
        match self {
            Layout::Nchw => "NCHW",
            Layout::Nhwc => "NHWC",
            Layout::Nd => "ND",
            Layout::Nc1hwc0 => "NC1HWC0",
        }
    }
}

/// Affine quantization parameters, when the runtime reports them.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct QuantParams {
    pub zero_point: i32,
    pub scale: f32,
}

/// Shape, element type and layout of one model input or output.
#[derive(Clone, Debug)]
pub struct TensorDescriptor {
    pub index: usize,
    pub name: String,
    pub shape: Shape,
    pub dtype: DType,
    pub layout: Layout,
    /// Bytes the runtime wants for this tensor. May exceed the dense size
    /// for padded layouts.
    pub byte_size: usize,
    pub quant: Option<QuantParams>,
}

impl TensorDescriptor {
    /// Validate and build a descriptor. `byte_size` defaults to the dense size.
    pub fn new(
        index: usize,
        name: impl Into<String>,
        dims: &[usize],
        dtype: DType,
        layout: Layout,
        byte_size: Option<usize>,
    ) -> Result<Self> {
        let name = name.into();
        if dims.is_empty() || dims.len() > MAX_RANK {
            return Err(EdgeError::Config(format!(
                "tensor '{name}' has rank {}, expected 1..={MAX_RANK}",
                dims.len()
            )));
        }
        let shape = Shape::from_slice(dims);
        let dense = shape
            .checked_numel()
            .and_then(|n| n.checked_mul(dtype.element_size()))
            .ok_or_else(|| {
                EdgeError::Config(format!("tensor '{name}' shape {dims:?} is too large"))
            })?;
        let byte_size = byte_size.unwrap_or(dense);
        if byte_size < dense {
            return Err(EdgeError::Config(format!(
                "tensor '{name}' reports {byte_size} bytes, shape {dims:?} needs {dense}"
            )));
        }
        Ok(Self {
            index,
            name,
            shape,
            dtype,
            layout,
            byte_size,
            quant: None,
        })
    }

    pub fn with_quant(mut self, quant: QuantParams) -> Self {
        self.quant = Some(quant);
        self
    }

    pub fn element_count(&self) -> usize {
        self.shape.numel()
    }

    /// Dense size in bytes of `element_count()` elements.
    pub fn dense_size(&self) -> usize {
        self.element_count() * self.dtype.element_size()
    }

    /// Declared `(height, width)`; missing dimensions count as 1.
    pub fn spatial_hw(&self) -> (usize, usize) {
        match self.layout {
            Layout::Nhwc => (self.shape.dim_or_one(1), self.shape.dim_or_one(2)),
            _ => (self.shape.dim_or_one(2), self.shape.dim_or_one(3)),
        }
    }

    /// Channel count for image-like inputs.
    pub fn channels(&self) -> usize {
        match self.layout {
            Layout::Nhwc => self.shape.dim_or_one(3),
            _ => self.shape.dim_or_one(1),
        }
    }

    pub fn describe(&self) -> String {
        let d = |i: usize| self.shape.0.get(i).copied().unwrap_or(0);
        format!(
            "index={} name={} dims={} shape=[{},{},{},{}] bytes={} type={} format={}",
            self.index,
            self.name,
            self.shape.rank(),
            d(0),
            d(1),
            d(2),
            d(3),
            self.byte_size,
            self.dtype.name(),
            self.layout.name()
        )
    }
}

/// I/O description of a loaded model, in the model's own index order.
#[derive(Clone, Debug, Default)]
pub struct ModelIo {
    pub inputs: Vec<TensorDescriptor>,
    pub outputs: Vec<TensorDescriptor>,
}

impl ModelIo {
    /// True when any tensor carries an integer element type.
    pub fn is_quantized(&self) -> bool {
        self.inputs
            .iter()
            .chain(self.outputs.iter())
            .any(|t| t.dtype.is_integer())
    }

    pub fn log_summary(&self) {
        tracing::info!(
            inputs = self.inputs.len(),
            outputs = self.outputs.len(),
            quantized = self.is_quantized(),
            "model io"
        );
        for t in &self.inputs {
            dump_tensor_attr("input", t);
        }
        for t in &self.outputs {
            dump_tensor_attr("output", t);
        }
    }
}

pub fn dump_tensor_attr(kind: &str, desc: &TensorDescriptor) {
    tracing::info!(kind, tensor = %desc.describe(), "model tensor");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_bad_rank() {
        assert!(TensorDescriptor::new(0, "x", &[], DType::F32, Layout::Nd, None).is_err());
        assert!(
            TensorDescriptor::new(0, "x", &[1, 1, 1, 1, 1], DType::F32, Layout::Nd, None).is_err()
        );
    }

    #[test]
    fn oversized_shape_is_rejected() {
        let err = TensorDescriptor::new(0, "x", &[1 << 40, 1 << 40, 1, 1], DType::F32, Layout::Nchw, None)
            .unwrap_err();
        assert!(matches!(err, EdgeError::Config(_)));
        // Element count fits, byte size does not.
        let huge = usize::MAX / 2 + 1;
        assert!(TensorDescriptor::new(0, "x", &[huge], DType::F32, Layout::Nd, None).is_err());
    }

    #[test]
    fn byte_size_defaults_to_dense() {
        let t = TensorDescriptor::new(0, "images", &[1, 3, 640, 640], DType::F32, Layout::Nchw, None)
            .unwrap();
        assert_eq!(t.byte_size, 3 * 640 * 640 * 4);
        assert_eq!(t.element_count(), 3 * 640 * 640);
        assert_eq!(t.channels(), 3);
    }

    #[test]
    fn reported_size_smaller_than_shape_is_rejected() {
        let err = TensorDescriptor::new(0, "x", &[1, 4], DType::F32, Layout::Nd, Some(8));
        assert!(err.is_err());
        let padded = TensorDescriptor::new(0, "x", &[1, 4], DType::F32, Layout::Nd, Some(32));
        assert_eq!(padded.unwrap().byte_size, 32);
    }

    #[test]
    fn spatial_dims_follow_layout() {
        let nchw =
            TensorDescriptor::new(0, "o", &[1, 1, 20, 40], DType::F32, Layout::Nchw, None).unwrap();
        assert_eq!(nchw.spatial_hw(), (20, 40));

        let nhwc =
            TensorDescriptor::new(0, "o", &[1, 20, 40, 3], DType::U8, Layout::Nhwc, None).unwrap();
        assert_eq!(nhwc.spatial_hw(), (20, 40));
        assert_eq!(nhwc.channels(), 3);

        let flat = TensorDescriptor::new(0, "o", &[1, 8400], DType::F32, Layout::Nd, None).unwrap();
        assert_eq!(flat.spatial_hw(), (1, 1));
    }

    #[test]
    fn quantized_when_any_integer_tensor() {
        let f = TensorDescriptor::new(0, "i", &[1, 3, 2, 2], DType::F32, Layout::Nchw, None).unwrap();
        let q = TensorDescriptor::new(0, "o", &[1, 4], DType::I8, Layout::Nd, None).unwrap();
        let io = ModelIo {
            inputs: vec![f.clone()],
            outputs: vec![f.clone()],
        };
        assert!(!io.is_quantized());
        let io = ModelIo {
            inputs: vec![f],
            outputs: vec![q],
        };
        assert!(io.is_quantized());
    }

    #[test]
    fn describe_pads_missing_dims() {
        let t = TensorDescriptor::new(2, "o", &[1, 85], DType::F16, Layout::Nd, None).unwrap();
        let text = t.describe();
        assert!(text.contains("shape=[1,85,0,0]"));
        assert!(text.contains("type=FLOAT16"));
        assert!(text.contains("format=ND"));
    }
}
