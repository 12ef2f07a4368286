//! QR rendering and decoding.
//!
//! Rendering uses error-correction level M with 8 pixels per module and a
//! 4-module quiet zone. Decoding locates the finder patterns, samples the
//! grid and applies Reed-Solomon correction; damage beyond the correction
//! budget yields [`PortalError::NoCodeFound`].

use crate::error::{PortalError, Result};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use image::{DynamicImage, GrayImage, ImageFormat, Luma};
use qrcode::{Color, EcLevel, QrCode};
use std::io::Cursor;

const MODULE_PIXELS: u32 = 8;
const QUIET_ZONE_MODULES: u32 = 4;
const DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Render `payload` as a PNG QR code.
///
/// # Errors
///
/// [`PortalError::Internal`] if the payload does not fit in a QR code or the
/// PNG cannot be written.
pub fn render_png(payload: &str) -> Result<Vec<u8>> {
    let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::M)
        .map_err(|e| PortalError::Internal(format!("cannot encode pickup payload: {e}")))?;

    let modules = code.width();
    let width = u32::try_from(modules)
        .map_err(|_| PortalError::Internal(format!("QR code too wide: {modules}")))?;
    let side = (width + 2 * QUIET_ZONE_MODULES) * MODULE_PIXELS;
    let mut canvas = GrayImage::from_pixel(side, side, Luma([255]));

    let colors = code.to_colors();
    for (y, row) in (0..width).zip(colors.chunks(modules)) {
        for (x, color) in (0..width).zip(row) {
            if *color == Color::Dark {
                paint_module(&mut canvas, x, y);
            }
        }
    }

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(canvas)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| PortalError::Internal(format!("cannot write QR image: {e}")))?;
    Ok(png)
}

/// Render `payload` as a `data:image/png;base64,…` URL.
///
/// # Errors
///
/// See [`render_png`].
pub fn render_data_url(payload: &str) -> Result<String> {
    let png = render_png(payload)?;
    Ok(format!("{DATA_URL_PREFIX}{}", STANDARD.encode(png)))
}

/// Decode the first readable QR code in a PNG or JPEG image.
///
/// # Errors
///
/// [`PortalError::Validation`] if the bytes are not an image;
/// [`PortalError::NoCodeFound`] if no code can be read.
pub fn decode_image(bytes: &[u8]) -> Result<String> {
    let luma = image::load_from_memory(bytes)
        .map_err(|e| PortalError::validation(format!("unreadable image: {e}")))?
        .to_luma8();

    let width = luma.width() as usize;
    let height = luma.height() as usize;
    let pixels = luma.as_raw();
    let mut prepared =
        rqrr::PreparedImage::prepare_from_greyscale(width, height, |x, y| pixels[y * width + x]);

    let grids = prepared.detect_grids();
    if grids.is_empty() {
        return Err(PortalError::NoCodeFound);
    }

    for grid in grids {
        match grid.decode() {
            Ok((_, content)) => return Ok(content),
            Err(error) => tracing::debug!(error = ?error, "QR grid could not be decoded"),
        }
    }
    Err(PortalError::NoCodeFound)
}

/// Decode a base64 image, with or without a `data:` URL prefix.
///
/// # Errors
///
/// [`PortalError::Validation`] for invalid base64 or a non-image;
/// [`PortalError::NoCodeFound`] if no code can be read.
pub fn decode_data_url(encoded: &str) -> Result<String> {
    decode_image(&data_url_bytes(encoded)?)
}

/// The raw bytes of a base64 image, with or without a `data:` URL prefix.
///
/// # Errors
///
/// [`PortalError::Validation`] for an empty body or invalid base64.
pub fn data_url_bytes(encoded: &str) -> Result<Vec<u8>> {
    let body = match encoded.trim().split_once(";base64,") {
        Some((prefix, body)) if prefix.starts_with("data:") => body,
        _ => encoded.trim(),
    };
    let cleaned: String = body.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    if cleaned.is_empty() {
        return Err(PortalError::validation("Image is required"));
    }
    STANDARD
        .decode(cleaned)
        .map_err(|e| PortalError::validation(format!("image is not valid base64: {e}")))
}

fn paint_module(canvas: &mut GrayImage, x: u32, y: u32) {
    let left = (x + QUIET_ZONE_MODULES) * MODULE_PIXELS;
    let top = (y + QUIET_ZONE_MODULES) * MODULE_PIXELS;
    for dy in 0..MODULE_PIXELS {
        for dx in 0..MODULE_PIXELS {
            canvas.put_pixel(left + dx, top + dy, Luma([0]));
        }
    }
}
