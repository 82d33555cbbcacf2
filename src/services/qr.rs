use anyhow::{Context, Result};
use image::{DynamicImage, ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use std::io::Cursor;

use crate::config::AppConfig;

/// Renders strings as black-on-white QR code PNGs.
///
/// The symbol version is the smallest one that fits the data. Output is
/// deterministic for a given input and settings.
#[derive(Debug, Clone)]
pub struct QrRenderer {
    /// Pixels per module
    pub box_size: u32,
    /// Draw the standard 4-module quiet zone
    pub border: bool,
    pub ec_level: EcLevel,
}

impl Default for QrRenderer {
    fn default() -> Self {
        Self {
            box_size: 10,
            border: true,
            ec_level: EcLevel::L,
        }
    }
}

impl QrRenderer {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            box_size: config.qr_box_size.max(1),
            border: config.qr_border,
            ..Self::default()
        }
    }

    /// Rasterizes `data` into a grayscale image buffer
    pub fn render_image(&self, data: &str) -> Result<image::GrayImage> {
        let code = QrCode::with_error_correction_level(data.as_bytes(), self.ec_level)
            .context("Data does not fit in a QR code")?;

        Ok(code
            .render::<Luma<u8>>()
            .quiet_zone(self.border)
            .module_dimensions(self.box_size, self.box_size)
            .dark_color(Luma([0u8]))
            .light_color(Luma([255u8]))
            .build())
    }

    /// Encodes `data` and returns the PNG bytes
    pub fn render_png(&self, data: &str) -> Result<Vec<u8>> {
        let img = self.render_image(data)?;

        let mut bytes = Vec::new();
        DynamicImage::ImageLuma8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .context("Failed to encode QR code as PNG")?;

        Ok(bytes)
    }
}
