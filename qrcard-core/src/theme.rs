//! Theme System - Fixed Style Presets
//!
//! `resolve_style` is pure. The live preview and the public page both call it,
//! so one theme id must always produce one style.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Theme identifier carried by a card.
///
/// Unknown ids are preserved verbatim so a stored record round-trips even when
/// it names a theme this build does not know.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Theme {
    Modern,
    Minimal,
    Dark,
    Gradient,
    Professional,
    Other(String),
}

impl Default for Theme {
    fn default() -> Self {
        Self::Modern
    }
}

impl Theme {
    pub const ALL: [Theme; 5] = [
        Theme::Modern,
        Theme::Minimal,
        Theme::Dark,
        Theme::Gradient,
        Theme::Professional,
    ];

    pub fn id(&self) -> &str {
        match self {
            Theme::Modern => "modern",
            Theme::Minimal => "minimal",
            Theme::Dark => "dark",
            Theme::Gradient => "gradient",
            Theme::Professional => "professional",
            Theme::Other(id) => id,
        }
    }

    pub fn display_name(&self) -> &str {
        match self {
            Theme::Modern => "Modern",
            Theme::Minimal => "Minimal",
            Theme::Dark => "Dark",
            Theme::Gradient => "Gradient",
            Theme::Professional => "Professional",
            Theme::Other(id) => id,
        }
    }
}

impl From<String> for Theme {
    fn from(id: String) -> Self {
        match id.as_str() {
            "modern" => Theme::Modern,
            "minimal" => Theme::Minimal,
            "dark" => Theme::Dark,
            "gradient" => Theme::Gradient,
            "professional" => Theme::Professional,
            _ => Theme::Other(id),
        }
    }
}

impl From<&str> for Theme {
    fn from(id: &str) -> Self {
        Theme::from(id.to_string())
    }
}

impl From<Theme> for String {
    fn from(theme: Theme) -> Self {
        theme.id().to_string()
    }
}

impl fmt::Display for Theme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Background {
    Solid { color: String },
    /// CSS-style angle: 0deg points up, 90deg points right.
    LinearGradient { angle_deg: f32, stops: Vec<GradientStop> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientStop {
    pub color: String,
    pub offset: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Border {
    pub width_px: u32,
    pub color: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Style {
    pub background: Background,
    pub foreground: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub border: Option<Border>,
}

fn solid(color: &str) -> Background {
    Background::Solid { color: color.to_string() }
}

fn gradient(angle_deg: f32, from: &str, to: &str) -> Background {
    Background::LinearGradient {
        angle_deg,
        stops: vec![
            GradientStop { color: from.to_string(), offset: 0.0 },
            GradientStop { color: to.to_string(), offset: 1.0 },
        ],
    }
}

fn hairline(color: &str) -> Option<Border> {
    Some(Border { width_px: 1, color: color.to_string() })
}

/// Map a theme to its visual style. Unknown themes fill with `fallback_primary`.
pub fn resolve_style(theme: &Theme, fallback_primary: &str) -> Style {
    match theme {
        Theme::Modern => Style {
            background: gradient(135.0, "#667eea", "#764ba2"),
            foreground: "#ffffff".into(),
            border: None,
        },
        Theme::Minimal => Style {
            background: solid("#ffffff"),
            foreground: "#1f2937".into(),
            border: hairline("#e5e7eb"),
        },
        Theme::Dark => Style {
            background: solid("#1f2937"),
            foreground: "#ffffff".into(),
            border: None,
        },
        Theme::Gradient => Style {
            background: gradient(45.0, "#ff6b6b", "#4ecdc4"),
            foreground: "#ffffff".into(),
            border: None,
        },
        Theme::Professional => Style {
            background: solid("#f8fafc"),
            foreground: "#334155".into(),
            border: hairline("#cbd5e1"),
        },
        Theme::Other(_) => Style {
            background: solid(fallback_primary),
            foreground: "#ffffff".into(),
            border: None,
        },
    }
}

/// Catalogue entry shown by theme pickers.
#[derive(Debug, Clone, Serialize)]
pub struct ThemeInfo {
    pub id: String,
    pub name: String,
    pub preview: String,
}

pub fn catalogue() -> Vec<ThemeInfo> {
    Theme::ALL
        .iter()
        .map(|theme| ThemeInfo {
            id: theme.id().to_string(),
            name: theme.display_name().to_string(),
            preview: css_background(&resolve_style(theme, "#2563eb").background),
        })
        .collect()
}

/// CSS rendition of a background, used by swatches and the print view.
pub fn css_background(background: &Background) -> String {
    match background {
        Background::Solid { color } => color.clone(),
        Background::LinearGradient { angle_deg, stops } => {
            let stops: Vec<String> = stops
                .iter()
                .map(|s| format!("{} {}%", s.color, (s.offset * 100.0).round()))
                .collect();
            format!("linear-gradient({}deg, {})", angle_deg, stops.join(", "))
        }
    }
}

pub const FONTS: [&str; 6] = ["Inter", "Roboto", "Open Sans", "Lato", "Montserrat", "Poppins"];

pub fn is_known_font(font: &str) -> bool {
    FONTS.contains(&font)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// Parse `#rrggbb` or `#rgb`.
pub fn parse_hex_color(value: &str) -> Option<Rgb> {
    let hex = value.trim().strip_prefix('#')?;
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let channel = |s: &str| u8::from_str_radix(s, 16).ok();
    match hex.len() {
        6 => Some(Rgb(channel(&hex[0..2])?, channel(&hex[2..4])?, channel(&hex[4..6])?)),
        3 => {
            let expand = |i: usize| channel(&hex[i..i + 1]).map(|v| v * 17);
            Some(Rgb(expand(0)?, expand(1)?, expand(2)?))
        }
        _ => None,
    }
}
