//! Host-side conversion between frames, device tensors and f32 outputs.

use half::f16;
use image::RgbImage;

use edgeflow_core::{DType, EdgeError, Result};
use edgeflow_device::{DeviceBackend, DeviceBuffer, Layout, TensorDescriptor};

/// Write `image` into `out` in the tensor's layout and element type.
///
/// Pixel values are not normalized: float tensors receive 0..=255.
/// `I8` tensors receive `v - 128`. `out` is cleared first and keeps its
/// capacity across calls.
pub fn marshal_frame(image: &RgbImage, desc: &TensorDescriptor, out: &mut Vec<u8>) -> Result<()> {
    let raw = image.as_raw();
    let planar;
    let values: &[u8] = match desc.layout {
        Layout::Nhwc => raw,
        Layout::Nchw => {
            planar = hwc_to_chw(raw);
            &planar
        }
        other => {
            return Err(EdgeError::Config(format!(
                "cannot feed frames into a {} tensor",
                other.name()
            )))
        }
    };

    out.clear();
    match desc.dtype {
        DType::U8 => out.extend_from_slice(values),
        DType::I8 => out.extend(values.iter().map(|&v| (v as i16 - 128) as i8 as u8)),
        DType::F32 => {
            let floats: Vec<f32> = values.iter().map(|&v| v as f32).collect();
            out.extend_from_slice(bytemuck::cast_slice(&floats));
        }
        DType::F16 => {
            let halves: Vec<f16> = values.iter().map(|&v| f16::from_f32(v as f32)).collect();
            out.extend_from_slice(bytemuck::cast_slice(&halves));
        }
        DType::I32 => {
            let ints: Vec<i32> = values.iter().map(|&v| v as i32).collect();
            out.extend_from_slice(bytemuck::cast_slice(&ints));
        }
    }
    Ok(())
}

/// Interleaved 3-channel pixels to three planes.
pub fn hwc_to_chw(raw: &[u8]) -> Vec<u8> {
    let pixels = raw.len() / 3;
    let mut planar = vec![0u8; pixels * 3];
    let (r, rest) = planar.split_at_mut(pixels);
    let (g, b) = rest.split_at_mut(pixels);
    for (i, px) in raw.chunks_exact(3).enumerate() {
        r[i] = px[0];
        g[i] = px[1];
        b[i] = px[2];
    }
    planar
}

/// Copy one output buffer to a fresh host vector and widen it to f32.
///
/// Integer outputs are converted numerically; quantization parameters are
/// not applied.
pub fn fetch_output<B: DeviceBackend + ?Sized>(
    backend: &mut B,
    buffer: &DeviceBuffer,
    desc: &TensorDescriptor,
) -> Result<Vec<f32>> {
    let n = desc.element_count();
    let data = match desc.dtype {
        DType::F32 => {
            let mut host = vec![0f32; n];
            backend.copy_to_host(buffer, bytemuck::cast_slice_mut(&mut host))?;
            host
        }
        DType::F16 => {
            let mut host = vec![f16::ZERO; n];
            backend.copy_to_host(buffer, bytemuck::cast_slice_mut(&mut host))?;
            host.iter().map(|h| h.to_f32()).collect()
        }
        DType::I32 => {
            let mut host = vec![0i32; n];
            backend.copy_to_host(buffer, bytemuck::cast_slice_mut(&mut host))?;
            host.iter().map(|&v| v as f32).collect()
        }
        DType::I8 => {
            let mut host = vec![0i8; n];
            backend.copy_to_host(buffer, bytemuck::cast_slice_mut(&mut host))?;
            host.iter().map(|&v| v as f32).collect()
        }
        DType::U8 => {
            let mut host = vec![0u8; n];
            backend.copy_to_host(buffer, &mut host)?;
            host.iter().map(|&v| v as f32).collect()
        }
    };
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn desc(dims: &[usize], dtype: DType, layout: Layout) -> TensorDescriptor {
        TensorDescriptor::new(0, "images", dims, dtype, layout, None).unwrap()
    }

    fn two_pixels() -> RgbImage {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(0, 0, Rgb([1, 2, 3]));
        img.put_pixel(1, 0, Rgb([4, 5, 6]));
        img
    }

    #[test]
    fn nchw_is_planar() {
        assert_eq!(hwc_to_chw(&[1, 2, 3, 4, 5, 6]), vec![1, 4, 2, 5, 3, 6]);

        let mut out = Vec::new();
        marshal_frame(&two_pixels(), &desc(&[1, 3, 1, 2], DType::U8, Layout::Nchw), &mut out)
            .unwrap();
        assert_eq!(out, vec![1, 4, 2, 5, 3, 6]);
    }

    #[test]
    fn nhwc_keeps_interleaving() {
        let mut out = Vec::new();
        marshal_frame(&two_pixels(), &desc(&[1, 1, 2, 3], DType::U8, Layout::Nhwc), &mut out)
            .unwrap();
        assert_eq!(out, vec![1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn f32_is_unnormalized_and_dense() {
        let d = desc(&[1, 3, 1, 2], DType::F32, Layout::Nchw);
        let mut out = Vec::new();
        marshal_frame(&two_pixels(), &d, &mut out).unwrap();
        assert_eq!(out.len(), d.dense_size());
        let first = f32::from_ne_bytes([out[0], out[1], out[2], out[3]]);
        assert_eq!(first, 1.0);
    }

    #[test]
    fn i8_is_shifted() {
        let mut img = RgbImage::new(1, 1);
        img.put_pixel(0, 0, Rgb([0, 128, 255]));
        let mut out = Vec::new();
        marshal_frame(&img, &desc(&[1, 1, 1, 3], DType::I8, Layout::Nhwc), &mut out).unwrap();
        assert_eq!(out, vec![0x80, 0, 127]);
    }

    #[test]
    fn unsupported_layout_is_rejected() {
        let mut out = Vec::new();
        let err = marshal_frame(&two_pixels(), &desc(&[6], DType::U8, Layout::Nd), &mut out)
            .unwrap_err();
        assert!(matches!(err, EdgeError::Config(_)));
    }
}
