use anyhow::{Context, Result};
use base64::Engine;
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::render::unicode;
use qrcode::QrCode;
use std::io::Cursor;

const MODULE_PIXELS: u32 = 6;

/// Render a pairing code as a `data:image/png;base64,...` URL.
pub fn data_url(code: &str) -> Result<String> {
    let qr = QrCode::new(code.as_bytes()).context("Pairing code does not fit in a QR code")?;
    let img = qr
        .render::<Luma<u8>>()
        .module_dimensions(MODULE_PIXELS, MODULE_PIXELS)
        .quiet_zone(true)
        .build();

    let mut png = Vec::new();
    DynamicImage::ImageLuma8(img)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .context("Failed to encode QR code as PNG")?;

    Ok(format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png)
    ))
}

/// Render a pairing code with half-block characters for a terminal.
pub fn terminal(code: &str) -> Result<String> {
    let qr = QrCode::new(code.as_bytes()).context("Pairing code does not fit in a QR code")?;
    Ok(qr
        .render::<unicode::Dense1x2>()
        .dark_color(unicode::Dense1x2::Light)
        .light_color(unicode::Dense1x2::Dark)
        .build())
}
