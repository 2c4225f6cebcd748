// convert.rs — Conversions between host image formats.
//
//   Image<f32> mask [0, 1]  ↔  Image<u8> mask [0, 255]
//   Image<Rgb>              ↔  packed RGBA8 bytes (camera buffers, GPU upload)
//
// Masks travel as f32 through the device stages and as u8 into contour
// extraction, matching a single-channel 8-bit readback on the GPU side.

use crate::image::{Image, Pixel, Rgb};

/// Convert an f32 mask in [0, 1] to u8 in [0, 255]. Values are clamped
/// and rounded, so a binary 0.0/1.0 mask becomes 0/255.
pub fn mask_f32_to_u8(src: &Image<f32>) -> Image<u8> {
    src.map(|v| u8::from_f32(v * 255.0))
}

/// Write an f32 mask into an existing u8 mask without allocating.
///
/// # Panics
/// Panics if the dimensions differ.
pub fn mask_f32_into_u8(src: &Image<f32>, dst: &mut Image<u8>) {
    assert!(src.same_size(dst), "mask_f32_into_u8: dimension mismatch");
    for (d, &s) in dst.as_mut_slice().iter_mut().zip(src.as_slice()) {
        *d = u8::from_f32(s * 255.0);
    }
}

/// Convert a u8 mask in [0, 255] to f32 in [0, 1].
pub fn mask_u8_to_f32(src: &Image<u8>) -> Image<f32> {
    src.map(|v| v as f32 / 255.0)
}

/// Decode packed RGBA8 bytes (alpha ignored) into an `Image<Rgb>`.
///
/// # Panics
/// Panics if `bytes.len() != width * height * 4`.
pub fn rgba8_to_rgb(width: usize, height: usize, bytes: &[u8]) -> Image<Rgb> {
    assert_eq!(
        bytes.len(),
        width * height * 4,
        "rgba8 buffer length ({}) must equal width * height * 4 ({})",
        bytes.len(),
        width * height * 4,
    );
    let data = bytes
        .chunks_exact(4)
        .map(|px| Rgb::from_u8(px[0], px[1], px[2]))
        .collect();
    Image::from_vec(width, height, data)
}

/// Encode an `Image<Rgb>` as packed RGBA8 with opaque alpha.
pub fn rgb_to_rgba8(src: &Image<Rgb>) -> Vec<u8> {
    let mut out = Vec::with_capacity(src.width() * src.height() * 4);
    for px in src.as_slice() {
        out.push(u8::from_f32(px.r * 255.0));
        out.push(u8::from_f32(px.g * 255.0));
        out.push(u8::from_f32(px.b * 255.0));
        out.push(255);
    }
    out
}
