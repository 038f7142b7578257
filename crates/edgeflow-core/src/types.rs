use image::RgbImage;
use serde::{Deserialize, Serialize};

/// Channel order of an interleaved 3-channel frame.
///
/// Camera and video sources usually hand out BGR; models mostly expect RGB.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorOrder {
    #[default]
    Bgr,
    Rgb,
}

/// Element type of a model tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DType {
    F32,
    F16,
    I8,
    U8,
    I32,
}

impl DType {
    pub fn element_size(self) -> usize {
        match self {
            DType::F32 | DType::I32 => 4,
            DType::F16 => 2,
            DType::I8 | DType::U8 => 1,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, DType::I8 | DType::U8 | DType::I32)
    }

    pub fn name(self) -> &'static str {
        match self {
            DType::F32 => "FLOAT",
            DType::F16 => "FLOAT16",
            DType::I8 => "INT8",
            DType::U8 => "UINT8",
            DType::I32 => "INT32",
        }
    }
}

/// A decoded frame travelling through the pipeline.
///
/// Stages never edit a frame they received; they build a new one.
#[derive(Debug, Clone)]
pub struct FramePayload {
    /// Host-resident interleaved pixels. The buffer type is RGB-shaped, the
    /// actual channel order is given by `color`.
    pub image: RgbImage,
    pub color: ColorOrder,
    pub id: u64,
    /// Model width / source width, 1.0 when no resize happened.
    pub scale_w: f32,
    /// Model height / source height, 1.0 when no resize happened.
    pub scale_h: f32,
}

impl FramePayload {
    pub fn new(image: RgbImage, color: ColorOrder, id: u64) -> Self {
        Self {
            image,
            color,
            id,
            scale_w: 1.0,
            scale_h: 1.0,
        }
    }

    pub fn with_scale(mut self, scale_w: f32, scale_h: f32) -> Self {
        self.scale_w = scale_w;
        self.scale_h = scale_h;
        self
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// One model output copied back to host memory.
#[derive(Debug, Clone)]
pub struct OutputTensor {
    pub data: Vec<f32>,
    /// Element count; equals `data.len()`.
    pub len: usize,
    pub height: usize,
    pub width: usize,
    /// Element type the model produced before widening to f32.
    pub dtype: DType,
}

/// Everything one runner call produced, in model output index order.
#[derive(Debug, Clone)]
pub struct RunnerOutputPayload {
    pub outputs: Vec<OutputTensor>,
    pub frame_id: u64,
    pub scale_w: f32,
    pub scale_h: f32,
}

impl RunnerOutputPayload {
    pub fn new(frame_id: u64, scale_w: f32, scale_h: f32) -> Self {
        Self {
            outputs: Vec::new(),
            frame_id,
            scale_w,
            scale_h,
        }
    }

    pub fn push(&mut self, tensor: OutputTensor) {
        self.outputs.push(tensor);
    }

    /// `(height, width)` of every output, in order.
    pub fn spatial_dims(&self) -> Vec<(usize, usize)> {
        self.outputs.iter().map(|t| (t.height, t.width)).collect()
    }
}

impl Default for RunnerOutputPayload {
    /// No outputs, frame 0, unit scale.
    fn default() -> Self {
        Self::new(0, 1.0, 1.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    Frame,
    RunnerOutput,
}

/// Data passed between stages.
#[derive(Debug, Clone)]
pub enum Payload {
    Frame(FramePayload),
    RunnerOutput(RunnerOutputPayload),
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Frame(_) => PayloadKind::Frame,
            Payload::RunnerOutput(_) => PayloadKind::RunnerOutput,
        }
    }

    pub fn as_frame(&self) -> Option<&FramePayload> {
        match self {
            Payload::Frame(frame) => Some(frame),
            _ => None,
        }
    }

    pub fn as_runner_output(&self) -> Option<&RunnerOutputPayload> {
        match self {
            Payload::RunnerOutput(out) => Some(out),
            _ => None,
        }
    }

    /// Identifier of the frame this payload derives from.
    pub fn frame_id(&self) -> u64 {
        match self {
            Payload::Frame(frame) => frame.id,
            Payload::RunnerOutput(out) => out.frame_id,
        }
    }
}

impl From<FramePayload> for Payload {
    fn from(frame: FramePayload) -> Self {
        Payload::Frame(frame)
    }
}

impl From<RunnerOutputPayload> for Payload {
    fn from(out: RunnerOutputPayload) -> Self {
        Payload::RunnerOutput(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_runner_output_has_unit_scale() {
        let out = RunnerOutputPayload::default();
        assert_eq!((out.scale_w, out.scale_h), (1.0, 1.0));
        assert!(out.outputs.is_empty());
    }

    #[test]
    fn frame_defaults_to_unit_scale() {
        let frame = FramePayload::new(RgbImage::new(4, 2), ColorOrder::Bgr, 7);
        assert_eq!(frame.scale_w, 1.0);
        assert_eq!(frame.scale_h, 1.0);
        assert_eq!((frame.width(), frame.height()), (4, 2));
    }

    #[test]
    fn payload_variant_accessors() {
        let payload = Payload::from(FramePayload::new(RgbImage::new(1, 1), ColorOrder::Rgb, 3));
        assert_eq!(payload.kind(), PayloadKind::Frame);
        assert!(payload.as_frame().is_some());
        assert!(payload.as_runner_output().is_none());
        assert_eq!(payload.frame_id(), 3);

        let out = Payload::from(RunnerOutputPayload::new(9, 0.5, 0.5));
        assert_eq!(out.kind(), PayloadKind::RunnerOutput);
        assert!(out.as_frame().is_none());
        assert_eq!(out.frame_id(), 9);
    }

    #[test]
    fn dtype_sizes() {
        assert_eq!(DType::F32.element_size(), 4);
        assert_eq!(DType::F16.element_size(), 2);
        assert_eq!(DType::U8.element_size(), 1);
        assert!(DType::I8.is_integer());
        assert!(!DType::F16.is_integer());
    }
}
