//! Settings
//!
//! Layered: built-in defaults, then `qrcard.toml` (or an explicit file), then
//! `QRCARD__SECTION__KEY` environment variables.

use std::path::{Path, PathBuf};

use ::config::{Config as RawConfig, Environment, File};
use serde::Deserialize;
use thiserror::Error;

use crate::export::{AssetSource, Exporter, MIN_CAPTURE_SCALE};
use crate::print::PrintSpec;

pub const DEFAULT_CONFIG_FILE: &str = "qrcard.toml";
pub const DEFAULT_ORIGIN: &str = "http://localhost:3000";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load settings: {0}")]
    Load(#[from] ::config::ConfigError),

    #[error("Invalid setting {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub server: ServerSettings,
    pub store: StoreSettings,
    pub export: ExportSettings,
    pub assets: AssetSettings,
    #[serde(default)]
    pub share: ShareSettings,
    #[serde(default)]
    pub session: SessionSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSettings {
    /// Origin used to build public card URLs.
    pub origin: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreSettings {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExportSettings {
    pub dir: PathBuf,
    pub scale: f32,
    pub jpeg_quality: u8,
    pub dpi: u32,
}

/// Uploaded images are stored here and served under `<origin>/assets`.
#[derive(Debug, Clone, Deserialize)]
pub struct AssetSettings {
    pub dir: PathBuf,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ShareSettings {
    pub command: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SessionSettings {
    pub owner: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingSettings {
    pub level: String,
}

impl Settings {
    /// An explicit `file` must exist; the default file is optional.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let source = match file {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };

        let settings: Settings = RawConfig::builder()
            .set_default("server.origin", DEFAULT_ORIGIN)?
            .set_default("store.path", ".qrcard/store.json")?
            .set_default("export.dir", "exports")?
            .set_default("export.scale", f64::from(MIN_CAPTURE_SCALE))?
            .set_default("export.jpeg_quality", 90)?
            .set_default("export.dpi", 300)?
            .set_default("assets.dir", "assets")?
            .set_default("logging.level", "info")?
            .add_source(source)
            .add_source(Environment::with_prefix("QRCARD").separator("__"))
            .build()?
            .try_deserialize()?;

        settings.check()?;
        Ok(settings)
    }

    fn check(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.export.jpeg_quality) {
            return Err(ConfigError::Invalid {
                key: "export.jpeg_quality",
                reason: format!("{} is outside 1-100", self.export.jpeg_quality),
            });
        }
        self.print_spec()?;
        Ok(())
    }

    pub fn print_spec(&self) -> Result<PrintSpec, ConfigError> {
        let system = PrintSpec::default();
        if self.export.dpi == system.dpi {
            return Ok(system);
        }
        PrintSpec::from_user(self.export.dpi)
            .map_err(|reason| ConfigError::Invalid { key: "export.dpi", reason: reason.to_string() })
    }

    /// Public URL prefix of uploaded assets.
    pub fn assets_base_url(&self) -> String {
        format!("{}/assets", self.server.origin.trim_end_matches('/'))
    }

    pub fn exporter(&self) -> Result<Exporter, ConfigError> {
        let assets = AssetSource::new(&self.assets_base_url(), &self.assets.dir);
        Ok(Exporter::new(self.export.scale, self.print_spec()?).with_assets(assets))
    }
}
