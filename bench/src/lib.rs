//! Fixtures shared by the benchmarks.

use image::{Rgb, RgbImage};
use tempfile::TempDir;

use edgeflow_core::{ColorOrder, FramePayload};
use edgeflow_device::SimModelSpec;
use edgeflow_pipeline::PipelineConfig;

/// A simulated detector manifest on disk. Deleted on drop.
pub struct SimModel {
    _dir: TempDir,
    pub config: PipelineConfig,
}

impl SimModel {
    pub fn new(width: u32, height: u32, grids: &[usize]) -> std::io::Result<Self> {
        let dir = tempfile::tempdir()?;
        let model_path = dir.path().join("model.json");
        let spec = SimModelSpec::detector(width as usize, height as usize, grids);
        let json = spec
            .to_json()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(&model_path, json)?;
        Ok(Self {
            _dir: dir,
            config: PipelineConfig {
                model_path,
                model_width: width,
                model_height: height,
                ..PipelineConfig::default()
            },
        })
    }
}

/// A BGR test frame with a simple gradient.
pub fn gradient_frame(width: u32, height: u32, id: u64) -> FramePayload {
    let img = RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    });
    FramePayload::new(img, ColorOrder::Bgr, id)
}
