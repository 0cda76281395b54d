//! Exporter - Rendered Surface to Files
//!
//! Capture-based exports (raster, document) rasterize the surface's SVG
//! through resvg. The scannable-code vector export serializes the encoder's
//! SVG untouched, and the contact file is built from the record alone.
//!
//! An export either yields a complete `Artifact` or an error. Writing to
//! disk goes through a temp file that is only renamed into place once it is
//! fully written.

use std::io::{Cursor, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::{ImageFormat, Rgb, RgbImage, Rgba, RgbaImage};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use resvg::{tiny_skia, usvg};
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;

use crate::card::CardRecord;
use crate::hashing::sha256_hex;
use crate::print::PrintSpec;
use crate::qr::{EncodedQr, QrError};
use crate::render::{print_view, Surface};
use crate::vcard;

pub const DEFAULT_FILE_STEM: &str = "business-card";
/// Captures are never taken below twice the display resolution.
pub const MIN_CAPTURE_SCALE: f32 = 2.0;
/// JPEG quality used for the image embedded in documents.
const DOCUMENT_JPEG_QUALITY: u8 = 95;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("Card preview not found")]
    SurfaceMissing,

    #[error("Capture failed: {0}")]
    Capture(String),

    #[error("JPEG quality must be 1-100, got {0}")]
    InvalidQuality(u8),

    #[error("Image encoding failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Document assembly failed: {0}")]
    Document(String),

    #[error("Scannable code failed: {0}")]
    Qr(#[from] QrError),

    #[error("Write failed: {0}")]
    Io(#[from] std::io::Error),
}

impl ExportError {
    /// Every export failure leaves the editing session intact and may be retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ExportError::InvalidQuality(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    Png,
    Jpeg,
    Pdf,
    Svg,
    Vcf,
    Html,
}

impl ExportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpeg",
            ExportFormat::Pdf => "pdf",
            ExportFormat::Svg => "svg",
            ExportFormat::Vcf => "vcf",
            ExportFormat::Html => "html",
        }
    }

    pub fn media_type(self) -> &'static str {
        match self {
            ExportFormat::Png => "image/png",
            ExportFormat::Jpeg => "image/jpeg",
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Svg => "image/svg+xml",
            ExportFormat::Vcf => vcard::MEDIA_TYPE,
            ExportFormat::Html => "text/html",
        }
    }
}

/// File stem derived from the card name: whitespace runs become `_`,
/// anything outside letters, digits, `-`, `_` and `.` is dropped.
pub fn sanitize_name(name: &str) -> String {
    let joined = name
        .split_whitespace()
        .map(|word| {
            word.chars()
                .filter(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    let stem = joined.trim_start_matches('.');
    if stem.is_empty() {
        DEFAULT_FILE_STEM.to_string()
    } else {
        stem.to_string()
    }
}

pub fn file_name(name: &str, extension: &str) -> String {
    format!("{}.{}", sanitize_name(name), extension)
}

/// Manifest entry describing a finished export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportedFile {
    pub filename: String,
    pub format: ExportFormat,
    pub media_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<[u32; 2]>,
    pub bytes: usize,
    pub hash: String,
}

/// A complete export held in memory.
#[derive(Debug, Clone)]
pub struct Artifact {
    pub filename: String,
    pub format: ExportFormat,
    pub pixel_size: Option<[u32; 2]>,
    pub bytes: Vec<u8>,
}

impl Artifact {
    fn new(filename: String, format: ExportFormat, bytes: Vec<u8>) -> Self {
        Self { filename, format, pixel_size: None, bytes }
    }

    pub fn media_type(&self) -> &'static str {
        self.format.media_type()
    }

    pub fn manifest(&self) -> ExportedFile {
        ExportedFile {
            filename: self.filename.clone(),
            format: self.format,
            media_type: self.media_type().to_string(),
            size: self.pixel_size,
            bytes: self.bytes.len(),
            hash: sha256_hex(&self.bytes),
        }
    }

    fn stage(&self, dir: &Path) -> Result<NamedTempFile, ExportError> {
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&self.bytes)?;
        tmp.as_file().sync_all()?;
        Ok(tmp)
    }

    /// Write into `dir`. The destination only appears once complete.
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        std::fs::create_dir_all(dir)?;
        let target = dir.join(&self.filename);
        self.stage(dir)?.persist(&target).map_err(|e| ExportError::Io(e.error))?;
        tracing::info!(path = %target.display(), bytes = self.bytes.len(), "wrote export");
        Ok(target)
    }
}

/// Write every artifact into `dir`, or none of them. All contents are
/// staged first; if moving one into place fails, the ones already moved
/// are removed again.
pub fn write_all(artifacts: &[Artifact], dir: &Path) -> Result<Vec<PathBuf>, ExportError> {
    std::fs::create_dir_all(dir)?;
    let mut staged = Vec::with_capacity(artifacts.len());
    for artifact in artifacts {
        staged.push((artifact.stage(dir)?, dir.join(&artifact.filename)));
    }

    let mut written: Vec<PathBuf> = Vec::with_capacity(staged.len());
    for (tmp, target) in staged {
        if let Err(e) = tmp.persist(&target) {
            for path in &written {
                if let Err(cleanup) = std::fs::remove_file(path) {
                    tracing::warn!(path = %path.display(), error = %cleanup, "could not remove partial export");
                }
            }
            tracing::warn!(path = %target.display(), error = %e.error, "export write failed, nothing kept");
            return Err(ExportError::Io(e.error));
        }
        written.push(target);
    }

    for (path, artifact) in written.iter().zip(artifacts) {
        tracing::info!(path = %path.display(), bytes = artifact.bytes.len(), "wrote export");
    }
    Ok(written)
}

/// Maps image links under a public base URL to files in a local directory,
/// so captures can paint uploaded profile images and logos.
#[derive(Debug, Clone)]
pub struct AssetSource {
    base_url: String,
    dir: PathBuf,
}

impl AssetSource {
    pub fn new(base_url: &str, dir: impl Into<PathBuf>) -> Self {
        Self { base_url: base_url.trim_end_matches('/').to_string(), dir: dir.into() }
    }

    /// Local file behind `href`, if it lives under the base URL.
    pub fn path_for(&self, href: &str) -> Option<PathBuf> {
        let rest = href.strip_prefix(self.base_url.as_str())?.strip_prefix('/')?;
        let relative = Path::new(rest.split(['?', '#']).next()?);
        relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
            .then(|| self.dir.join(relative))
    }
}

fn load_image(path: &Path, options: &usvg::Options) -> Option<usvg::ImageKind> {
    let data = Arc::new(std::fs::read(path).ok()?);
    match image::guess_format(&data) {
        Ok(ImageFormat::Png) => Some(usvg::ImageKind::PNG(data)),
        Ok(ImageFormat::Jpeg) => Some(usvg::ImageKind::JPEG(data)),
        Ok(ImageFormat::Gif) => Some(usvg::ImageKind::GIF(data)),
        Ok(ImageFormat::WebP) => Some(usvg::ImageKind::WEBP(data)),
        _ => usvg::Tree::from_data(&data, options).ok().map(usvg::ImageKind::SVG),
    }
}

fn image_resolver(assets: Option<AssetSource>) -> usvg::ImageHrefResolver<'static> {
    usvg::ImageHrefResolver {
        resolve_data: usvg::ImageHrefResolver::default_data_resolver(),
        resolve_string: Box::new(move |href: &str, options: &usvg::Options| {
            let path = assets.as_ref()?.path_for(href)?;
            load_image(&path, options)
        }),
    }
}

fn count_images(group: &usvg::Group) -> usize {
    group
        .children()
        .iter()
        .map(|node| match node {
            usvg::Node::Group(group) => count_images(group),
            usvg::Node::Image(_) => 1,
            _ => 0,
        })
        .sum()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterFormat {
    Png,
    Jpeg { quality: u8 },
}

pub struct Exporter {
    svg_options: usvg::Options<'static>,
    assets: Option<AssetSource>,
    scale: f32,
    print: PrintSpec,
}

impl Exporter {
    /// `scale` is clamped to at least `MIN_CAPTURE_SCALE`.
    pub fn new(scale: f32, print: PrintSpec) -> Self {
        let mut svg_options = usvg::Options::default();
        Arc::make_mut(&mut svg_options.fontdb).load_system_fonts();
        svg_options.image_href_resolver = image_resolver(None);
        Self { svg_options, assets: None, scale: scale.max(MIN_CAPTURE_SCALE), print }
    }

    /// Images outside `assets` (other than `data:` links) fail the capture.
    pub fn with_assets(mut self, assets: AssetSource) -> Self {
        self.svg_options.image_href_resolver = image_resolver(Some(assets.clone()));
        self.assets = Some(assets);
        self
    }

    fn unresolved<'s>(&self, hrefs: &[&'s str]) -> Vec<&'s str> {
        hrefs
            .iter()
            .copied()
            .filter(|href| !href.starts_with("data:"))
            .filter(|href| {
                self.assets
                    .as_ref()
                    .and_then(|assets| assets.path_for(href))
                    .and_then(|path| load_image(&path, &self.svg_options))
                    .is_none()
            })
            .collect()
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn print_spec(&self) -> &PrintSpec {
        &self.print
    }

    /// Rasterize the surface at `scale` times its display size.
    pub fn capture(&self, surface: Option<&Surface>, scale: f32) -> Result<RgbaImage, ExportError> {
        let surface = surface.ok_or(ExportError::SurfaceMissing)?;
        let hrefs = surface.image_hrefs();
        let unresolved = self.unresolved(&hrefs);
        if !unresolved.is_empty() {
            return Err(ExportError::Capture(format!("cannot load image {}", unresolved.join(", "))));
        }
        let tree = usvg::Tree::from_str(surface.svg(), &self.svg_options)
            .map_err(|e| ExportError::Capture(e.to_string()))?;
        let painted = count_images(tree.root());
        if painted != hrefs.len() {
            let expected = hrefs.len();
            return Err(ExportError::Capture(format!("painted {painted} of {expected} images")));
        }

        let width = (surface.width as f32 * scale).round() as u32;
        let height = (surface.height as f32 * scale).round() as u32;
        let mut pixmap = tiny_skia::Pixmap::new(width, height)
            .ok_or_else(|| ExportError::Capture(format!("cannot allocate {width}x{height} canvas")))?;
        resvg::render(&tree, tiny_skia::Transform::from_scale(scale, scale), &mut pixmap.as_mut());

        let mut image = RgbaImage::new(width, height);
        for (dst, src) in image.pixels_mut().zip(pixmap.pixels()) {
            let c = src.demultiply();
            *dst = Rgba([c.red(), c.green(), c.blue(), c.alpha()]);
        }
        tracing::debug!(width, height, scale, "captured surface");
        Ok(image)
    }

    pub fn raster(
        &self,
        surface: Option<&Surface>,
        format: RasterFormat,
        name: &str,
    ) -> Result<Artifact, ExportError> {
        if let RasterFormat::Jpeg { quality } = format {
            check_quality(quality)?;
        }
        let image = self.capture(surface, self.scale)?;
        let size = [image.width(), image.height()];
        let (bytes, format) = match format {
            RasterFormat::Png => (encode_png(&image)?, ExportFormat::Png),
            RasterFormat::Jpeg { quality } => (encode_jpeg(&image, quality)?, ExportFormat::Jpeg),
        };
        let mut artifact = Artifact::new(file_name(name, format.extension()), format, bytes);
        artifact.pixel_size = Some(size);
        Ok(artifact)
    }

    /// One page, exactly the card's physical size, image edge to edge.
    pub fn document(&self, surface: Option<&Surface>, name: &str) -> Result<Artifact, ExportError> {
        let surface = surface.ok_or(ExportError::SurfaceMissing)?;
        let print_scale = self.print.pixel_width() as f32 / surface.width as f32;
        let image = self.capture(Some(surface), self.scale.max(print_scale))?;
        let jpeg = encode_jpeg(&image, DOCUMENT_JPEG_QUALITY)?;
        let bytes = single_page_pdf(&jpeg, image.width(), image.height(), self.print.page_size_pt())?;

        let mut artifact = Artifact::new(file_name(name, "pdf"), ExportFormat::Pdf, bytes);
        artifact.pixel_size = Some([image.width(), image.height()]);
        Ok(artifact)
    }

    pub fn qr_vector(&self, qr: &EncodedQr, name: &str) -> Artifact {
        let filename = format!("{}-qr.svg", sanitize_name(name));
        Artifact::new(filename, ExportFormat::Svg, qr.to_svg().into_bytes())
    }

    pub fn qr_raster(&self, qr: &EncodedQr, name: &str) -> Result<Artifact, ExportError> {
        let filename = format!("{}-qr.png", sanitize_name(name));
        let size = qr.options().size;
        let mut artifact = Artifact::new(filename, ExportFormat::Png, qr.to_png()?);
        artifact.pixel_size = Some([size, size]);
        Ok(artifact)
    }

    pub fn contact(&self, card: &CardRecord) -> Artifact {
        Artifact::new(file_name(&card.name, "vcf"), ExportFormat::Vcf, vcard::build(card).into_bytes())
    }

    pub fn print_page(&self, surface: Option<&Surface>, name: &str) -> Result<Artifact, ExportError> {
        let surface = surface.ok_or(ExportError::SurfaceMissing)?;
        let html = print_view(surface, &self.print);
        Ok(Artifact::new(file_name(name, "html"), ExportFormat::Html, html.into_bytes()))
    }
}

impl Default for Exporter {
    fn default() -> Self {
        Self::new(MIN_CAPTURE_SCALE, PrintSpec::default())
    }
}

fn check_quality(quality: u8) -> Result<(), ExportError> {
    if (1..=100).contains(&quality) {
        Ok(())
    } else {
        Err(ExportError::InvalidQuality(quality))
    }
}

fn encode_png(image: &RgbaImage) -> Result<Vec<u8>, ExportError> {
    let mut bytes = Vec::new();
    image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// JPEG has no alpha; transparent areas come out white.
fn encode_jpeg(image: &RgbaImage, quality: u8) -> Result<Vec<u8>, ExportError> {
    check_quality(quality)?;
    let flattened = RgbImage::from_fn(image.width(), image.height(), |x, y| {
        let Rgba([r, g, b, a]) = *image.get_pixel(x, y);
        let over_white = |c: u8| ((u16::from(c) * u16::from(a) + 255 * (255 - u16::from(a))) / 255) as u8;
        Rgb([over_white(r), over_white(g), over_white(b)])
    });
    let mut bytes = Vec::new();
    JpegEncoder::new_with_quality(&mut bytes, quality).encode_image(&flattened)?;
    Ok(bytes)
}

fn single_page_pdf(jpeg: &[u8], width: u32, height: u32, page: (f32, f32)) -> Result<Vec<u8>, ExportError> {
    let (page_w, page_h) = page;
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => i64::from(width),
            "Height" => i64::from(height),
            "ColorSpace" => "DeviceRGB",
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        jpeg.to_vec(),
    ));

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![Object::Real(page_w), 0.into(), 0.into(), Object::Real(page_h), 0.into(), 0.into()],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_bytes = content.encode().map_err(|e| ExportError::Document(e.to_string()))?;
    let content_id = doc.add_object(Stream::new(dictionary! {}, content_bytes));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
        "MediaBox" => vec![0.into(), 0.into(), Object::Real(page_w), Object::Real(page_h)],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).map_err(|e| ExportError::Document(e.to_string()))?;
    Ok(bytes)
}
