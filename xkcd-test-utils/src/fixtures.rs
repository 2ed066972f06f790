//! Image fixtures generated in-process.

use std::io::Cursor;

use anyhow::Result;
use image::codecs::gif::GifEncoder;
use image::{Delay, Frame, ImageFormat, Rgba, RgbaImage};

/// Magic bytes of a PDF document: a real file type outside the image allow-list.
pub const PDF_BYTES: &[u8] = b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n1 0 obj\n<<>>\nendobj\ntrailer\n<<>>\n%%EOF\n";

fn gradient(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
    })
}

pub fn png_bytes(width: u32, height: u32) -> Result<Vec<u8>> {
    encode(width, height, ImageFormat::Png)
}

pub fn jpeg_bytes(width: u32, height: u32) -> Result<Vec<u8>> {
    let rgb = image::DynamicImage::ImageRgba8(gradient(width, height)).to_rgb8();
    let mut out = Cursor::new(Vec::new());
    rgb.write_to(&mut out, ImageFormat::Jpeg)?;
    Ok(out.into_inner())
}

/// A GIF with `frames` frames; more than one makes it an animation.
pub fn gif_bytes(width: u32, height: u32, frames: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    {
        let mut encoder = GifEncoder::new(&mut out);
        for index in 0..frames {
            let mut image = gradient(width, height);
            image.put_pixel(0, 0, Rgba([index as u8, 0, 0, 255]));
            encoder.encode_frame(Frame::from_parts(
                image,
                0,
                0,
                Delay::from_numer_denom_ms(100, 1),
            ))?;
        }
    }
    Ok(out)
}

/// PNG signature followed by garbage: sniffs as PNG but cannot be decoded.
pub fn truncated_png_bytes() -> Vec<u8> {
    let mut bytes = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    bytes.extend_from_slice(&[0u8; 32]);
    bytes
}

fn encode(width: u32, height: u32, format: ImageFormat) -> Result<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    gradient(width, height).write_to(&mut out, format)?;
    Ok(out.into_inner())
}
