//! Card Pipeline - Single Entry Point
//!
//! Every save goes through normalize then validate. There is no path that
//! persists a caller-supplied shape directly.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assets::{storage_path, AssetError, AssetKind, AssetUploader};
use crate::card::{CardRecord, CardSummary};
use crate::export::{write_all, Artifact, ExportError, ExportedFile, Exporter, RasterFormat};
use crate::hashing::compute_manifest_hash;
use crate::normalize::normalize_record;
use crate::public::{self, PublicView};
use crate::qr::{self, EncodedQr, QrError, QrOptions};
use crate::render::{render, Surface};
use crate::session::SessionContext;
use crate::store::{CardStore, KeyValueStore, LoadedCard, StoreError};
use crate::theme::resolve_style;
use crate::validation::{ValidationResult, Validator};
use crate::ENGINE_VERSION;

#[cfg(feature = "test-hooks")]
use std::sync::atomic::{AtomicU32, Ordering};

#[cfg(feature = "test-hooks")]
static VALIDATION_CALL_COUNT: AtomicU32 = AtomicU32::new(0);

#[cfg(feature = "test-hooks")]
pub fn get_validation_call_count() -> u32 {
    VALIDATION_CALL_COUNT.load(Ordering::SeqCst)
}

#[cfg(feature = "test-hooks")]
pub fn reset_validation_call_count() {
    VALIDATION_CALL_COUNT.store(0, Ordering::SeqCst);
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Sign in required")]
    Unauthenticated,

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    #[error("Card has not been saved yet")]
    Unsaved,

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Qr(#[from] QrError),

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error(transparent)]
    Asset(#[from] AssetError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PipelineError::Store(StoreError::NotFound(_)))
    }
}

/// What to produce from a card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExportRequest {
    Png,
    Jpeg { quality: u8 },
    Pdf,
    QrSvg { options: QrOptions },
    QrPng { options: QrOptions },
    Vcf,
    Print,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedCard {
    pub card: CardRecord,
    pub validation: ValidationResult,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportManifest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub card_id: Option<String>,
    pub engine_version: String,
    pub created_at: DateTime<Utc>,
    pub files: Vec<ExportedFile>,
    pub manifest_hash: String,
}

pub struct CardPipeline<S: KeyValueStore> {
    store: CardStore<S>,
    validator: Validator,
    exporter: Exporter,
    session: SessionContext,
}

impl<S: KeyValueStore> CardPipeline<S> {
    pub fn new(store: CardStore<S>, exporter: Exporter, session: SessionContext) -> Self {
        Self { store, validator: Validator::new(), exporter, session }
    }

    pub fn with_validator(mut self, validator: Validator) -> Self {
        self.validator = validator;
        self
    }

    pub fn session(&self) -> &SessionContext {
        &self.session
    }

    pub fn store(&self) -> &CardStore<S> {
        &self.store
    }

    pub fn exporter(&self) -> &Exporter {
        &self.exporter
    }

    fn owner(&self) -> Result<String, PipelineError> {
        self.session.owner_id().ok_or(PipelineError::Unauthenticated)
    }

    /// The only validation entry point.
    pub fn validate(&self, card: &CardRecord) -> ValidationResult {
        #[cfg(feature = "test-hooks")]
        VALIDATION_CALL_COUNT.fetch_add(1, Ordering::SeqCst);

        self.validator.validate(card)
    }

    /// Normalize, validate, then persist record and index together.
    pub fn save(&mut self, draft: &CardRecord) -> Result<SavedCard, PipelineError> {
        let owner = self.owner()?;
        let card = normalize_record(draft);

        let validation = self.validate(&card);
        if !validation.valid {
            return Err(PipelineError::ValidationFailed(validation.summary()));
        }

        let card = self.store.save(&owner, &card)?;
        tracing::debug!(card_id = card.id.as_deref().unwrap_or_default(), "pipeline save complete");
        Ok(SavedCard { card, validation })
    }

    pub fn load(&self, id: &str) -> Result<LoadedCard, PipelineError> {
        Ok(self.store.load(id)?)
    }

    pub fn delete(&mut self, id: &str) -> Result<(), PipelineError> {
        let owner = self.owner()?;
        Ok(self.store.delete(&owner, id)?)
    }

    /// The signed-in owner's cards, inactive ones included.
    pub fn list(&self) -> Result<Vec<CardSummary>, PipelineError> {
        let owner = self.owner()?;
        Ok(self.store.index(&owner)?)
    }

    pub fn rebuild_index(&mut self) -> Result<Vec<CardSummary>, PipelineError> {
        let owner = self.owner()?;
        Ok(self.store.rebuild_index(&owner)?)
    }

    /// Live preview. Ignores the activation flag; the owner sees everything.
    pub fn preview(&self, card: &CardRecord) -> Surface {
        render(card, &resolve_style(&card.theme, &card.primary_color))
    }

    /// What a visitor of the card's public URL sees.
    pub fn public_view(&self, id: &str) -> Result<PublicView, PipelineError> {
        match self.store.load(id) {
            Ok(loaded) => Ok(public::view(id, Some(loaded.card))),
            Err(StoreError::NotFound(_)) => Ok(public::view(id, None)),
            Err(e) => Err(e.into()),
        }
    }

    /// Public page HTML, with the card's code embedded when it is available.
    pub fn public_page(&self, id: &str, options: &QrOptions) -> Result<(PublicView, String), PipelineError> {
        let view = self.public_view(id)?;
        let qr_svg = match &view {
            PublicView::Available { card, .. } => Some(self.qr(card, options)?.to_svg()),
            _ => None,
        };
        let html = public::page_html(&view, qr_svg.as_deref());
        Ok((view, html))
    }

    /// Scannable code for the card's public URL.
    pub fn qr(&self, card: &CardRecord, options: &QrOptions) -> Result<EncodedQr, PipelineError> {
        let url = card.public_url.as_deref().ok_or(PipelineError::Unsaved)?;
        Ok(qr::encode(url, options)?)
    }

    pub fn export(&self, card: &CardRecord, request: &ExportRequest) -> Result<Artifact, PipelineError> {
        tracing::debug!(?request, "exporting card");
        let name = card.name.as_str();
        let artifact = match request {
            ExportRequest::Png => {
                self.exporter.raster(Some(&self.preview(card)), RasterFormat::Png, name)?
            }
            ExportRequest::Jpeg { quality } => self.exporter.raster(
                Some(&self.preview(card)),
                RasterFormat::Jpeg { quality: *quality },
                name,
            )?,
            ExportRequest::Pdf => self.exporter.document(Some(&self.preview(card)), name)?,
            ExportRequest::QrSvg { options } => self.exporter.qr_vector(&self.qr(card, options)?, name),
            ExportRequest::QrPng { options } => self.exporter.qr_raster(&self.qr(card, options)?, name)?,
            ExportRequest::Vcf => self.exporter.contact(card),
            ExportRequest::Print => self.exporter.print_page(Some(&self.preview(card)), name)?,
        };
        Ok(artifact)
    }

    /// Produce every requested artifact, write them to `dir` and describe
    /// them in a manifest. Nothing is written unless every export succeeds.
    pub fn export_all(
        &self,
        card: &CardRecord,
        requests: &[ExportRequest],
        dir: &Path,
    ) -> Result<(ExportManifest, Vec<PathBuf>), PipelineError> {
        let artifacts = requests
            .iter()
            .map(|request| self.export(card, request))
            .collect::<Result<Vec<_>, _>>()?;

        let paths = write_all(&artifacts, dir)?;

        let mut manifest = ExportManifest {
            card_id: card.id.clone(),
            engine_version: ENGINE_VERSION.to_string(),
            created_at: Utc::now(),
            files: artifacts.iter().map(Artifact::manifest).collect(),
            manifest_hash: String::new(),
        };
        manifest.manifest_hash = compute_manifest_hash(&manifest.files)?;
        Ok((manifest, paths))
    }

    /// Upload a profile image or logo and point the card at it.
    pub fn attach_asset(
        &self,
        uploader: &dyn AssetUploader,
        card: &mut CardRecord,
        kind: AssetKind,
        file_name: &str,
        bytes: &[u8],
    ) -> Result<String, PipelineError> {
        self.owner()?;
        let path = storage_path(kind, file_name)?;
        let url = uploader.upload(bytes, &path)?;
        match kind {
            AssetKind::Profile => card.profile_image_url = url.clone(),
            AssetKind::Logo => card.logo_url = url.clone(),
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::AssetSource;
    use crate::session::User;
    use crate::store::MemoryStore;
    use image::{Rgba, RgbaImage};

    fn pipeline() -> CardPipeline<MemoryStore> {
        let session = SessionContext::new();
        session.login(User { id: "owner-1".into(), email: Some("o@test".into()) });
        CardPipeline::new(
            CardStore::new(MemoryStore::new(), "https://qrcard.app"),
            Exporter::default(),
            session,
        )
    }

    #[test]
    fn test_save_requires_session() {
        let mut pipeline = pipeline();
        pipeline.session().logout();
        let err = pipeline.save(&CardRecord::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Unauthenticated));
    }

    #[test]
    fn test_save_blocks_duplicate_field_ids() {
        let mut pipeline = pipeline();
        let mut card = CardRecord::new();
        card.name = "Jane".into();
        let first = card.add_custom_field();
        card.add_custom_field();
        card.custom_fields[1].id = first;
        assert!(matches!(pipeline.save(&card), Err(PipelineError::ValidationFailed(_))));
        assert!(pipeline.list().unwrap().is_empty());
    }

    #[test]
    fn test_public_view_states() {
        let mut pipeline = pipeline();
        assert!(matches!(pipeline.public_view("nope").unwrap(), PublicView::NotFound { .. }));

        let mut card = CardRecord::new();
        card.name = "Jane".into();
        card.is_active = false;
        let saved = pipeline.save(&card).unwrap().card;
        let id = saved.id.clone().unwrap();
        assert!(matches!(pipeline.public_view(&id).unwrap(), PublicView::Unavailable { .. }));
        assert_eq!(pipeline.list().unwrap().len(), 1);
    }

    #[test]
    fn test_unsaved_card_has_no_code() {
        let pipeline = pipeline();
        let err = pipeline.qr(&CardRecord::new(), &QrOptions::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Unsaved));
    }

    #[test]
    fn test_attach_asset_sets_url() {
        let dir = tempfile::tempdir().unwrap();
        let uploader = crate::assets::LocalUploader::new(dir.path(), "https://cdn.test");
        let pipeline = pipeline();
        let mut card = CardRecord::new();
        let url = pipeline
            .attach_asset(&uploader, &mut card, AssetKind::Logo, "acme.png", b"png")
            .unwrap();
        assert_eq!(card.logo_url, url);
        assert_eq!(url, "https://cdn.test/cards/logo/acme.png");
    }

    #[test]
    fn test_export_paints_uploaded_profile_image() {
        let dir = tempfile::tempdir().unwrap();
        let base_url = "https://qrcard.app/assets";
        let uploader = crate::assets::LocalUploader::new(dir.path(), base_url);
        let exporter = Exporter::default().with_assets(AssetSource::new(base_url, dir.path()));
        let pipeline = CardPipeline::new(
            CardStore::new(MemoryStore::new(), "https://qrcard.app"),
            exporter,
            pipeline().session().clone(),
        );

        let mut red = Vec::new();
        RgbaImage::from_pixel(64, 64, Rgba([255, 0, 0, 255]))
            .write_to(&mut std::io::Cursor::new(&mut red), image::ImageFormat::Png)
            .unwrap();
        let mut card = CardRecord::new();
        card.name = "Jane".into();
        card.theme = crate::theme::Theme::Dark;
        pipeline.attach_asset(&uploader, &mut card, AssetKind::Profile, "me.png", &red).unwrap();

        let artifact = pipeline.export(&card, &ExportRequest::Png).unwrap();
        let image = image::load_from_memory(&artifact.bytes).unwrap().to_rgba8();
        // Avatar center, 160x72 on the surface, captured at 2x.
        assert_eq!(*image.get_pixel(320, 144), Rgba([255, 0, 0, 255]));

        card.logo_url = "https://elsewhere.test/logo.png".into();
        let err = pipeline.export(&card, &ExportRequest::Pdf).unwrap_err();
        assert!(matches!(err, PipelineError::Export(ExportError::Capture(_))));
    }

    #[test]
    fn test_export_all_keeps_nothing_when_a_write_fails() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = pipeline();
        let mut card = CardRecord::new();
        card.name = "Jane".into();
        // The second target is taken by a directory, so moving it into place fails.
        std::fs::create_dir(dir.path().join("Jane.html")).unwrap();

        let requests = [ExportRequest::Vcf, ExportRequest::Print];
        assert!(pipeline.export_all(&card, &requests, dir.path()).is_err());

        let left: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(left, vec!["Jane.html".to_string()]);
    }
}
