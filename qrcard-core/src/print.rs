//! Print Specification
//!
//! Physical card size and print resolution, shared by the document export
//! and the print view.

use serde::{Deserialize, Serialize};

/// ISO/IEC 7810 ID-1, the standard business card size.
pub const CARD_WIDTH_MM: f32 = 85.6;
pub const CARD_HEIGHT_MM: f32 = 53.98;

const MM_PER_INCH: f32 = 25.4;
const POINTS_PER_INCH: f32 = 72.0;

pub fn mm_to_pt(mm: f32) -> f32 {
    mm / MM_PER_INCH * POINTS_PER_INCH
}

/// Who decided the print parameters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrintAuthority {
    /// Built-in defaults
    #[default]
    System,
    /// User-provided overrides (validated)
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrintSpec {
    pub authority: PrintAuthority,
    pub dpi: u32,
    pub width_mm: f32,
    pub height_mm: f32,
}

impl Default for PrintSpec {
    fn default() -> Self {
        Self {
            authority: PrintAuthority::System,
            dpi: 300,
            width_mm: CARD_WIDTH_MM,
            height_mm: CARD_HEIGHT_MM,
        }
    }
}

impl PrintSpec {
    /// Create from user with validation
    pub fn from_user(dpi: u32) -> Result<Self, &'static str> {
        if !(72..=1200).contains(&dpi) {
            return Err("DPI must be between 72 and 1200");
        }
        Ok(Self { authority: PrintAuthority::User, dpi, ..Self::default() })
    }

    /// Page size in PDF points.
    pub fn page_size_pt(&self) -> (f32, f32) {
        (mm_to_pt(self.width_mm), mm_to_pt(self.height_mm))
    }

    /// Pixels needed across the card width at this DPI.
    pub fn pixel_width(&self) -> u32 {
        (self.width_mm / MM_PER_INCH * self.dpi as f32).ceil() as u32
    }

    /// Page-level CSS for the print view.
    pub fn page_css(&self) -> String {
        format!(
            "@page {{ size: {w}mm {h}mm; margin: 0; }}\n\
             .card {{ width: {w}mm; height: {h}mm; overflow: hidden; page-break-after: always; }}",
            w = self.width_mm,
            h = self.height_mm,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_size_in_points() {
        let (w, h) = PrintSpec::default().page_size_pt();
        assert!((w - 242.646).abs() < 0.01);
        assert!((h - 153.014).abs() < 0.01);
    }

    #[test]
    fn test_user_dpi_bounds() {
        assert!(PrintSpec::from_user(71).is_err());
        assert!(PrintSpec::from_user(1201).is_err());
        let spec = PrintSpec::from_user(600).unwrap();
        assert_eq!(spec.authority, PrintAuthority::User);
        assert_eq!(spec.pixel_width(), 2023);
    }

    #[test]
    fn test_page_css_exact_size() {
        let css = PrintSpec::default().page_css();
        assert!(css.contains("size: 85.6mm 53.98mm"));
        assert!(css.contains("overflow: hidden"));
    }
}
