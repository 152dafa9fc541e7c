//! Image decoding and PNG encoding

use image::{ColorType, DynamicImage, ImageOutputFormat, ImageResult, RgbaImage};
use std::io::Cursor;

/// Decode an image of any supported format, sniffed from its content
pub fn decode(bytes: &[u8]) -> ImageResult<DynamicImage> {
    image::load_from_memory(bytes)
}

/// Encode an RGBA bitmap as PNG
pub fn encode_png(image: &RgbaImage) -> ImageResult<Vec<u8>> {
    let mut bytes: Vec<u8> = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageOutputFormat::Png)?;
    Ok(bytes)
}

/// The PIL-style mode name of a decoded image, for logging
pub fn color_mode(image: &DynamicImage) -> &'static str {
    match image.color() {
        ColorType::L8 => "L",
        ColorType::La8 => "LA",
        ColorType::Rgb8 => "RGB",
        ColorType::Rgba8 => "RGBA",
        ColorType::L16 => "I;16",
        ColorType::La16 => "LA;16",
        ColorType::Rgb16 => "RGB;16",
        ColorType::Rgba16 => "RGBA;16",
        ColorType::Rgb32F => "RGB;F",
        ColorType::Rgba32F => "RGBA;F",
        _ => "unknown",
    }
}
