//! Image normalization to opaque JPEG.
//!
//! # Responsibility
//! - Flatten transparent stickers onto a white background.
//! - Encode every stored image as JPEG, which has no alpha channel.
//! - Derive the two tab icons of a locally authored package.
//!
//! # Invariants
//! - Fully transparent pixels become pure white.
//! - Fully opaque pixels keep their colour.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, ImageResult, Rgb, RgbImage, RgbaImage};

const JPEG_QUALITY: u8 = 75;
const TAB_WIDTH: u32 = 66;
const TAB_HEIGHT: u32 = 55;
const WHITE: Rgb<u8> = Rgb([u8::MAX; 3]);

/// Composites every pixel over white and drops the alpha channel.
///
/// Decoded `RgbaImage` samples are straight (not premultiplied) alpha, so the
/// colour channels are used as-is: `out = a * c + (1 - a) * 1`.
pub fn to_opaque(src: &RgbaImage) -> RgbImage {
    let mut out = RgbImage::new(src.width(), src.height());
    for (x, y, pixel) in src.enumerate_pixels() {
        let [r, g, b, a] = pixel.0;
        let flattened = if a == 0 {
            WHITE
        } else {
            Rgb([over_white(r, a), over_white(g, a), over_white(b, a)])
        };
        out.put_pixel(x, y, flattened);
    }
    out
}

fn over_white(channel: u8, alpha: u8) -> u8 {
    let a = f32::from(alpha) / 255.0;
    let c = f32::from(channel) / 255.0;
    let composited = a * c + (1.0 - a);
    // Clamped to [0, 255] before the cast, so no truncation happens.
    (composited * 255.0).round().clamp(0.0, 255.0) as u8
}

/// Decodes a PNG, flattens it onto white and encodes it as JPEG.
pub fn png_to_jpeg(png: &[u8]) -> ImageResult<Vec<u8>> {
    let decoded = image::load_from_memory_with_format(png, ImageFormat::Png)?;
    encode_jpeg(&DynamicImage::ImageRgb8(to_opaque(&decoded.to_rgba8())))
}

/// Encodes an image as JPEG, flattening transparency first when present.
pub fn encode_jpeg(img: &DynamicImage) -> ImageResult<Vec<u8>> {
    let opaque = if img.color().has_alpha() {
        DynamicImage::ImageRgb8(to_opaque(&img.to_rgba8()))
    } else {
        img.clone()
    };
    let mut buf = Vec::new();
    opaque.write_with_encoder(JpegEncoder::new_with_quality(&mut buf, JPEG_QUALITY))?;
    Ok(buf)
}

/// Builds the `(tab_on, tab_off)` JPEG pair from a sticker image.
///
/// `tab_on` is the resized colour sticker; `tab_off` is its grayscale copy.
pub fn tab_images(sticker: &[u8]) -> ImageResult<(Vec<u8>, Vec<u8>)> {
    let source = image::load_from_memory(sticker)?;
    let tab_on = source.resize_exact(TAB_WIDTH, TAB_HEIGHT, FilterType::Lanczos3);
    let tab_off = tab_on.grayscale();
    Ok((encode_jpeg(&tab_on)?, encode_jpeg(&tab_off)?))
}
