use std::sync::Arc;

use image::imageops::{self, FilterType};
use serde::{Deserialize, Serialize};

use edgeflow_core::{single_input, ColorOrder, FramePayload, Payload, Result, Stage};

use crate::color::swap_red_blue;

/// Interpolation used when a frame has to be resized.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResizeFilter {
    Nearest,
    #[default]
    Bilinear,
}

impl ResizeFilter {
    fn filter_type(self) -> FilterType {
        match self {
            ResizeFilter::Nearest => FilterType::Nearest,
            ResizeFilter::Bilinear => FilterType::Triangle,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreprocessConfig {
    pub model_width: u32,
    pub model_height: u32,
    pub filter: ResizeFilter,
    /// Channel order the model expects.
    pub output_color: ColorOrder,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            model_width: 640,
            model_height: 640,
            filter: ResizeFilter::default(),
            output_color: ColorOrder::Rgb,
        }
    }
}

/// Converts frames to the model's channel order and input size.
///
/// The output frame keeps the input id and carries the scale factors
/// `model / source` for both axes (1.0 when no resize was needed).
pub struct ImagePreprocess {
    config: PreprocessConfig,
}

impl ImagePreprocess {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    pub fn apply(&self, frame: &FramePayload) -> FramePayload {
        let (model_w, model_h) = (self.config.model_width, self.config.model_height);
        let (src_w, src_h) = (frame.width(), frame.height());

        let converted = if frame.color != self.config.output_color {
            swap_red_blue(&frame.image)
        } else {
            frame.image.clone()
        };

        let (image, scale_w, scale_h) = if (src_w, src_h) != (model_w, model_h) {
            let resized =
                imageops::resize(&converted, model_w, model_h, self.config.filter.filter_type());
            (
                resized,
                model_w as f32 / src_w as f32,
                model_h as f32 / src_h as f32,
            )
        } else {
            (converted, 1.0, 1.0)
        };

        tracing::debug!(
            frame = frame.id,
            src_width = src_w,
            src_height = src_h,
            scale_w,
            scale_h,
            width = image.width(),
            height = image.height(),
            "preprocessed frame"
        );

        FramePayload::new(image, self.config.output_color, frame.id).with_scale(scale_w, scale_h)
    }
}

impl Stage for ImagePreprocess {
    fn name(&self) -> &str {
        "image_preprocess"
    }

    fn process(&mut self, inputs: &[Arc<Payload>]) -> Result<Option<Payload>> {
        let payload = match single_input(inputs) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(stage = self.name(), error = %e, "skipping");
                return Ok(None);
            }
        };
        match payload.as_frame() {
            Some(frame) => Ok(Some(Payload::Frame(self.apply(frame)))),
            None => {
                tracing::warn!(stage = self.name(), kind = ?payload.kind(), "expected a frame");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use edgeflow_core::RunnerOutputPayload;
    use image::{Rgb, RgbImage};

    fn bgr_frame(width: u32, height: u32, id: u64) -> FramePayload {
        FramePayload::new(
            RgbImage::from_pixel(width, height, Rgb([1, 2, 3])),
            ColorOrder::Bgr,
            id,
        )
    }

    fn run(stage: &mut ImagePreprocess, frame: FramePayload) -> FramePayload {
        let out = stage
            .process(&[Arc::new(Payload::Frame(frame))])
            .unwrap()
            .unwrap();
        out.as_frame().unwrap().clone()
    }

    #[test]
    fn hd_frame_is_resized_with_scale_factors() {
        let mut stage = ImagePreprocess::new(PreprocessConfig::default());
        let out = run(&mut stage, bgr_frame(1920, 1080, 17));

        assert_eq!((out.width(), out.height()), (640, 640));
        assert_eq!(out.id, 17);
        assert!((out.scale_w - 0.3333).abs() < 1e-3);
        assert!((out.scale_h - 0.5926).abs() < 1e-3);
        assert_eq!(out.color, ColorOrder::Rgb);
        assert_eq!(out.image.get_pixel(320, 320).0, [3, 2, 1]);
    }

    #[test]
    fn matching_frame_is_not_scaled() {
        let mut stage = ImagePreprocess::new(PreprocessConfig::default());
        let out = run(&mut stage, bgr_frame(640, 640, 3));
        assert_eq!((out.scale_w, out.scale_h), (1.0, 1.0));
        assert_eq!(out.image.get_pixel(0, 0).0, [3, 2, 1]);
    }

    #[test]
    fn scale_is_model_over_source() {
        let config = PreprocessConfig {
            model_width: 100,
            model_height: 50,
            filter: ResizeFilter::Nearest,
            output_color: ColorOrder::Rgb,
        };
        let mut stage = ImagePreprocess::new(config);
        for (w, h) in [(200u32, 25u32), (50, 50), (400, 100)] {
            let out = run(&mut stage, bgr_frame(w, h, 0));
            assert_eq!((out.width(), out.height()), (100, 50));
            assert_eq!(out.scale_w, 100.0 / w as f32);
            assert_eq!(out.scale_h, 50.0 / h as f32);
        }
    }

    #[test]
    fn frames_already_in_model_order_keep_channels() {
        let mut stage = ImagePreprocess::new(PreprocessConfig::default());
        let frame = FramePayload::new(
            RgbImage::from_pixel(640, 640, Rgb([1, 2, 3])),
            ColorOrder::Rgb,
            0,
        );
        assert_eq!(run(&mut stage, frame).image.get_pixel(5, 5).0, [1, 2, 3]);
    }

    #[test]
    fn wrong_inputs_are_skipped() {
        let mut stage = ImagePreprocess::new(PreprocessConfig::default());
        let frame = Arc::new(Payload::Frame(bgr_frame(4, 4, 0)));
        let output = Arc::new(Payload::RunnerOutput(RunnerOutputPayload::default()));

        assert!(stage.process(&[]).unwrap().is_none());
        assert!(stage.process(&[frame.clone(), frame]).unwrap().is_none());
        assert!(stage.process(&[output]).unwrap().is_none());
    }

    #[test]
    fn bilinear_is_the_default_filter() {
        assert!(matches!(ResizeFilter::Nearest.filter_type(), FilterType::Nearest));
        assert!(matches!(ResizeFilter::Bilinear.filter_type(), FilterType::Triangle));
        assert_eq!(ResizeFilter::default(), ResizeFilter::Bilinear);
    }
}
