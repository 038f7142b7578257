//! Host-side frame preparation ahead of the device runner.

pub mod color;
pub mod image_preprocess;

pub use color::swap_red_blue;
pub use image_preprocess::{ImagePreprocess, PreprocessConfig, ResizeFilter};
