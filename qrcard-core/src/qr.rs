//! Scannable-Code Encoder
//!
//! Matrix generation is delegated to the `qrcode` crate. This module owns the
//! options contract and the two output forms: an SVG whose viewBox is in
//! modules (so `size` scales it without resampling) and a PNG painted at
//! exactly `size` pixels. Both are byte-for-byte deterministic.

use std::fmt::Write as _;
use std::io::Cursor;

use image::{ImageFormat, Rgb, RgbImage};
use qrcode::{Color, EcLevel, QrCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::theme::parse_hex_color;

pub const MIN_SIZE: u32 = 64;
pub const MAX_SIZE: u32 = 2048;
/// Quiet zone width in modules when `include_margin` is set.
pub const MARGIN_MODULES: usize = 4;

#[derive(Debug, Error)]
pub enum QrError {
    #[error("Size {0}px is outside 64-2048px")]
    InvalidSize(u32),

    #[error("Invalid color: {0}")]
    InvalidColor(String),

    #[error("Content cannot be encoded: {0}")]
    Encoding(String),

    #[error("Image encoding failed: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCorrection {
    /// ~7% recoverable
    L,
    /// ~15% recoverable
    #[default]
    M,
    /// ~25% recoverable
    Q,
    /// ~30% recoverable
    H,
}

impl ErrorCorrection {
    fn level(self) -> EcLevel {
        match self {
            ErrorCorrection::L => EcLevel::L,
            ErrorCorrection::M => EcLevel::M,
            ErrorCorrection::Q => EcLevel::Q,
            ErrorCorrection::H => EcLevel::H,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_uppercase().as_str() {
            "L" => Some(Self::L),
            "M" => Some(Self::M),
            "Q" => Some(Self::Q),
            "H" => Some(Self::H),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QrOptions {
    pub size: u32,
    pub background_color: String,
    pub foreground_color: String,
    pub error_correction_level: ErrorCorrection,
    pub include_margin: bool,
}

impl Default for QrOptions {
    fn default() -> Self {
        Self {
            size: 256,
            background_color: "#FFFFFF".to_string(),
            foreground_color: "#000000".to_string(),
            error_correction_level: ErrorCorrection::M,
            include_margin: true,
        }
    }
}

impl QrOptions {
    pub fn validate(&self) -> Result<(), QrError> {
        if !(MIN_SIZE..=MAX_SIZE).contains(&self.size) {
            return Err(QrError::InvalidSize(self.size));
        }
        for color in [&self.background_color, &self.foreground_color] {
            if parse_hex_color(color).is_none() {
                return Err(QrError::InvalidColor(color.clone()));
            }
        }
        Ok(())
    }
}

/// An encoded module matrix plus the options it should be drawn with.
#[derive(Debug, Clone)]
pub struct EncodedQr {
    options: QrOptions,
    /// Modules per side, quiet zone included.
    span: usize,
    /// Row-major, `true` for dark.
    dark: Vec<bool>,
}

/// Encode `content` into a scannable code.
pub fn encode(content: &str, options: &QrOptions) -> Result<EncodedQr, QrError> {
    options.validate()?;
    let code = QrCode::with_error_correction_level(content.as_bytes(), options.error_correction_level.level())
        .map_err(|e| QrError::Encoding(e.to_string()))?;

    let width = code.width();
    let margin = if options.include_margin { MARGIN_MODULES } else { 0 };
    let span = width + 2 * margin;
    let colors = code.to_colors();

    let mut dark = vec![false; span * span];
    for y in 0..width {
        for x in 0..width {
            dark[(y + margin) * span + x + margin] = colors[y * width + x] == Color::Dark;
        }
    }

    tracing::debug!(modules = width, ec = ?options.error_correction_level, "encoded scannable code");
    Ok(EncodedQr { options: options.clone(), span, dark })
}

impl EncodedQr {
    pub fn options(&self) -> &QrOptions {
        &self.options
    }

    pub fn modules_per_side(&self) -> usize {
        self.span
    }

    pub fn is_dark(&self, x: usize, y: usize) -> bool {
        self.dark[y * self.span + x]
    }

    /// Vector form. Horizontal runs of dark modules become one path segment.
    pub fn to_svg(&self) -> String {
        let size = self.options.size;
        let span = self.span;
        let mut path = String::new();
        for y in 0..span {
            let mut x = 0;
            while x < span {
                if !self.is_dark(x, y) {
                    x += 1;
                    continue;
                }
                let start = x;
                while x < span && self.is_dark(x, y) {
                    x += 1;
                }
                let _ = write!(path, "M{start} {y}h{}v1h-{}z", x - start, x - start);
            }
        }

        format!(
            concat!(
                r#"<svg xmlns="http://www.w3.org/2000/svg" width="{size}" height="{size}" "#,
                r#"viewBox="0 0 {span} {span}" shape-rendering="crispEdges">"#,
                r#"<rect width="{span}" height="{span}" fill="{bg}"/>"#,
                r#"<path d="{path}" fill="{fg}"/></svg>"#
            ),
            size = size,
            span = span,
            bg = self.options.background_color,
            fg = self.options.foreground_color,
            path = path,
        )
    }

    /// Raster form, exactly `size` x `size` pixels.
    pub fn to_png(&self) -> Result<Vec<u8>, QrError> {
        let image = self.to_image()?;
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
        Ok(bytes)
    }

    pub fn to_image(&self) -> Result<RgbImage, QrError> {
        let parse = |value: &str| {
            parse_hex_color(value)
                .map(|c| Rgb([c.0, c.1, c.2]))
                .ok_or_else(|| QrError::InvalidColor(value.to_string()))
        };
        let fg = parse(&self.options.foreground_color)?;
        let bg = parse(&self.options.background_color)?;

        let size = self.options.size;
        let span = self.span as u64;
        Ok(RgbImage::from_fn(size, size, |px, py| {
            let mx = (u64::from(px) * span / u64::from(size)) as usize;
            let my = (u64::from(py) * span / u64::from(size)) as usize;
            if self.is_dark(mx, my) { fg } else { bg }
        }))
    }
}
