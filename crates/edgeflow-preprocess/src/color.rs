use image::RgbImage;

/// Swap the first and third channel of every pixel (BGR <-> RGB).
pub fn swap_red_blue(image: &RgbImage) -> RgbImage {
    let mut out = image.clone();
    for px in out.pixels_mut() {
        px.0.swap(0, 2);
    }
    out
}
