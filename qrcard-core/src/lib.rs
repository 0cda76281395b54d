//! QRCard Core - Digital Business Card Engine
//!
//! One card record flows through editing, persistence, rendering, code
//! encoding and export.
//!
//! # Guarantees
//! 1. One Record Type: every component shares `CardRecord`
//! 2. Normalize At The Boundary: stored data is decoded once, anomalies reported
//! 3. Pairs Commit Together: a record and its owner index entry never diverge
//! 4. Inactive Means Hidden: the public path never renders contact details of an inactive card
//! 5. Deterministic Output: same theme, same style; same code input, same bytes
//! 6. Complete Or Nothing: an export exists in full or not at all

pub mod assets;
pub mod card;
pub mod config;
pub mod export;
pub mod hashing;
pub mod normalize;
pub mod pipeline;
pub mod print;
pub mod public;
pub mod qr;
pub mod render;
pub mod session;
pub mod share;
pub mod store;
pub mod theme;
pub mod validation;
pub mod vcard;

pub use card::{CardRecord, CardSummary, CustomField, FieldKind, SocialLinks, SocialPlatform};
pub use crate::config::Settings;
pub use export::{Artifact, ExportFormat, Exporter};
pub use normalize::{normalize, serialize, Diagnostic};
pub use pipeline::{CardPipeline, ExportManifest, ExportRequest, PipelineError};
pub use print::PrintAuthority;
pub use public::PublicView;
pub use qr::{ErrorCorrection, QrOptions};
pub use render::Surface;
pub use session::{SessionContext, User};
pub use store::{CardStore, FileStore, KeyValueStore, MemoryStore};
pub use theme::{resolve_style, Theme};
pub use validation::{ValidationResult, ValidationRule, ValidationViolation, ViolationSeverity};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
