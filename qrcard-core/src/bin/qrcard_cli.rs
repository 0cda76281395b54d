//! QRCard CLI
//!
//! Commands: themes, validate, save, show, list, delete, rebuild-index,
//! render, view, qr, export, share, upload
//! Outputs JSON to stdout, logs to stderr.
//! Exit codes: 1 usage/IO, 2 validation, 3 not found or unavailable.

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

use qrcard_core::assets::{AssetKind, LocalUploader};
use qrcard_core::export::Artifact;
use qrcard_core::pipeline::SavedCard;
use qrcard_core::qr::{self, ErrorCorrection, QrOptions};
use qrcard_core::share::{ShareRequest, ShareStrategy};
use qrcard_core::theme::{catalogue, FONTS};
use qrcard_core::{
    normalize, CardPipeline, CardStore, ExportRequest, FileStore, PipelineError,
    PublicView, SessionContext, Settings, User,
};

const EXIT_FAILURE: u8 = 1;
const EXIT_VALIDATION: u8 = 2;
const EXIT_NOT_FOUND: u8 = 3;

#[derive(Parser)]
#[command(name = "qrcard-cli", version)]
#[command(about = "QRCard CLI - Digital Business Cards")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Settings file (defaults to ./qrcard.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Act as this owner (overrides session.owner)
    #[arg(short, long, global = true)]
    owner: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// List themes and fonts
    Themes,

    /// Validate a card without saving it
    Validate {
        /// Card JSON, or @path to read it from a file
        #[arg(short, long)]
        payload: String,
    },

    /// Create or update a card
    Save {
        /// Card JSON, or @path to read it from a file
        #[arg(short, long)]
        payload: String,
    },

    /// Load a card by id
    Show { id: String },

    /// List the owner's cards
    List,

    /// Delete a card and its index entry
    Delete { id: String },

    /// Re-derive the owner's index from the stored cards
    RebuildIndex,

    /// Render the preview surface of a stored card
    Render {
        id: String,
        /// Write the SVG here instead of embedding it in the output
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Public view of a card
    View {
        id: String,
        /// Write the shareable page here
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Generate a scannable code
    Qr {
        /// Stored card whose public URL is encoded
        #[arg(long, conflicts_with = "content", required_unless_present = "content")]
        id: Option<String>,
        /// Encode this text instead
        #[arg(long)]
        content: Option<String>,
        #[command(flatten)]
        options: QrArgs,
        #[arg(long, value_enum, default_value = "svg")]
        format: QrFormat,
    },

    /// Export a stored card
    Export {
        id: String,
        #[arg(short, long, value_enum, required = true, num_args = 1..)]
        format: Vec<Format>,
        /// JPEG quality (defaults to export.jpeg_quality)
        #[arg(long)]
        quality: Option<u8>,
        #[command(flatten)]
        qr: QrArgs,
    },

    /// Share a card link, or an exported file with --format
    Share {
        id: String,
        #[arg(short, long, value_enum)]
        format: Option<Format>,
    },

    /// Upload a profile image or logo for a card
    Upload {
        id: String,
        #[arg(long, value_enum)]
        kind: Kind,
        file: PathBuf,
    },
}

#[derive(clap::Args)]
struct QrArgs {
    #[arg(long, default_value_t = 256)]
    size: u32,
    #[arg(long, default_value = "#000000")]
    foreground: String,
    #[arg(long, default_value = "#FFFFFF")]
    background: String,
    #[arg(long, default_value = "M")]
    level: String,
    #[arg(long)]
    no_margin: bool,
}

impl QrArgs {
    fn options(&self) -> Result<QrOptions, String> {
        let error_correction_level = ErrorCorrection::parse(&self.level)
            .ok_or_else(|| format!("unknown error correction level '{}'", self.level))?;
        Ok(QrOptions {
            size: self.size,
            background_color: self.background.clone(),
            foreground_color: self.foreground.clone(),
            error_correction_level,
            include_margin: !self.no_margin,
        })
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum QrFormat {
    Svg,
    Png,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    Png,
    Jpeg,
    Pdf,
    QrSvg,
    QrPng,
    Vcf,
    Print,
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Profile,
    Logo,
}

type Pipeline = CardPipeline<FileStore>;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(s) => s,
        Err(e) => return fail(EXIT_FAILURE, &e.to_string()),
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let mut pipeline = match build_pipeline(&settings, cli.owner.as_deref()) {
        Ok(p) => p,
        Err(e) => return fail(EXIT_FAILURE, &e),
    };

    run(cli.command, &settings, &mut pipeline)
}

fn build_pipeline(settings: &Settings, owner: Option<&str>) -> Result<Pipeline, String> {
    let kv = FileStore::open(&settings.store.path).map_err(|e| e.to_string())?;
    let exporter = settings.exporter().map_err(|e| e.to_string())?;

    let session = SessionContext::new();
    if let Some(id) = owner.map(str::to_string).or_else(|| settings.session.owner.clone()) {
        session.login(User { id, email: None });
    }
    Ok(CardPipeline::new(CardStore::new(kv, settings.server.origin.clone()), exporter, session))
}

fn run(command: Commands, settings: &Settings, pipeline: &mut Pipeline) -> ExitCode {
    match command {
        Commands::Themes => emit(&json!({ "themes": catalogue(), "fonts": FONTS })),

        Commands::Validate { payload } => {
            let raw = match read_payload(&payload) {
                Ok(raw) => raw,
                Err(e) => return fail(EXIT_FAILURE, &e),
            };
            let normalized = normalize(&raw);
            let result = pipeline.validate(&normalized.card);
            let code = emit(&json!({ "validation": result, "diagnostics": normalized.diagnostics }));
            if result.valid {
                code
            } else {
                ExitCode::from(EXIT_VALIDATION)
            }
        }

        Commands::Save { payload } => {
            let raw = match read_payload(&payload) {
                Ok(raw) => raw,
                Err(e) => return fail(EXIT_FAILURE, &e),
            };
            let normalized = normalize(&raw);
            match pipeline.save(&normalized.card) {
                Ok(SavedCard { card, validation }) => emit(&json!({
                    "success": true,
                    "card": card,
                    "validation": validation,
                    "diagnostics": normalized.diagnostics,
                })),
                Err(e) => pipeline_failure(&e),
            }
        }

        Commands::Show { id } => match pipeline.load(&id) {
            Ok(loaded) => emit(&json!({ "card": loaded.card, "diagnostics": loaded.diagnostics })),
            Err(e) => pipeline_failure(&e),
        },

        Commands::List => match pipeline.list() {
            Ok(cards) => emit(&cards),
            Err(e) => pipeline_failure(&e),
        },

        Commands::Delete { id } => match pipeline.delete(&id) {
            Ok(()) => emit(&json!({ "success": true, "deleted": id })),
            Err(e) => pipeline_failure(&e),
        },

        Commands::RebuildIndex => match pipeline.rebuild_index() {
            Ok(cards) => emit(&cards),
            Err(e) => pipeline_failure(&e),
        },

        Commands::Render { id, out } => {
            let card = match pipeline.load(&id) {
                Ok(loaded) => loaded.card,
                Err(e) => return pipeline_failure(&e),
            };
            let surface = pipeline.preview(&card);
            let svg = match out {
                Some(path) => match std::fs::write(&path, surface.svg()) {
                    Ok(()) => json!({ "path": path }),
                    Err(e) => return fail(EXIT_FAILURE, &e.to_string()),
                },
                None => Value::String(surface.svg().to_string()),
            };
            emit(&json!({ "surface": surface, "links": surface.links(), "svg": svg }))
        }

        Commands::View { id, out } => {
            let (view, html) = match pipeline.public_page(&id, &QrOptions::default()) {
                Ok(page) => page,
                Err(e) => return pipeline_failure(&e),
            };
            if let Some(path) = out {
                if let Err(e) = std::fs::write(&path, html) {
                    return fail(EXIT_FAILURE, &e.to_string());
                }
            }
            let code = emit(&view);
            match view {
                PublicView::Available { .. } => code,
                _ => ExitCode::from(EXIT_NOT_FOUND),
            }
        }

        Commands::Qr { id, content, options, format } => {
            let options = match options.options() {
                Ok(o) => o,
                Err(e) => return fail(EXIT_FAILURE, &e),
            };
            let artifact = match (id, content) {
                (Some(id), _) => {
                    let request = match format {
                        QrFormat::Svg => ExportRequest::QrSvg { options },
                        QrFormat::Png => ExportRequest::QrPng { options },
                    };
                    pipeline.load(&id).and_then(|loaded| pipeline.export(&loaded.card, &request))
                }
                (None, Some(content)) => qr::encode(&content, &options)
                    .map_err(PipelineError::from)
                    .and_then(|encoded| match format {
                        QrFormat::Svg => Ok(pipeline.exporter().qr_vector(&encoded, "")),
                        QrFormat::Png => Ok(pipeline.exporter().qr_raster(&encoded, "")?),
                    }),
                (None, None) => return fail(EXIT_FAILURE, "either --id or --content is required"),
            };
            match artifact {
                Ok(artifact) => write_artifacts(&[artifact], &settings.export.dir),
                Err(e) => pipeline_failure(&e),
            }
        }

        Commands::Export { id, format, quality, qr } => {
            let options = match qr.options() {
                Ok(o) => o,
                Err(e) => return fail(EXIT_FAILURE, &e),
            };
            let quality = quality.unwrap_or(settings.export.jpeg_quality);
            let requests: Vec<_> =
                format.iter().map(|f| export_request(*f, quality, &options)).collect();

            let result = pipeline
                .load(&id)
                .and_then(|loaded| pipeline.export_all(&loaded.card, &requests, &settings.export.dir));
            match result {
                Ok((manifest, paths)) => emit(&json!({ "success": true, "manifest": manifest, "paths": paths })),
                Err(e) => pipeline_failure(&e),
            }
        }

        Commands::Share { id, format } => {
            let card = match pipeline.load(&id) {
                Ok(loaded) => loaded.card,
                Err(e) => return pipeline_failure(&e),
            };
            let request = match format {
                None => match ShareRequest::link(&card) {
                    Some(request) => request,
                    None => return pipeline_failure(&PipelineError::Unsaved),
                },
                Some(format) => {
                    let export = export_request(format, settings.export.jpeg_quality, &QrOptions::default());
                    let path = pipeline
                        .export(&card, &export)
                        .and_then(|artifact| artifact.write_to(&settings.export.dir).map_err(PipelineError::from));
                    match path {
                        Ok(path) => ShareRequest::file(&card, path),
                        Err(e) => return pipeline_failure(&e),
                    }
                }
            };

            let strategy = ShareStrategy::standard(settings.share.command.as_deref());
            match strategy.share(&request) {
                Ok(outcome) => emit(&json!({ "success": true, "request": request, "result": outcome })),
                Err(e) => fail(EXIT_FAILURE, &e.to_string()),
            }
        }

        Commands::Upload { id, kind, file } => {
            let bytes = match std::fs::read(&file) {
                Ok(b) => b,
                Err(e) => return fail(EXIT_FAILURE, &format!("{}: {e}", file.display())),
            };
            let kind = match kind {
                Kind::Profile => AssetKind::Profile,
                Kind::Logo => AssetKind::Logo,
            };
            let file_name = file.file_name().and_then(|n| n.to_str()).unwrap_or_default().to_string();
            let uploader = LocalUploader::new(&settings.assets.dir, &settings.assets_base_url());

            let result = pipeline.load(&id).and_then(|loaded| {
                let mut card = loaded.card;
                let url = pipeline.attach_asset(&uploader, &mut card, kind, &file_name, &bytes)?;
                pipeline.save(&card).map(|saved| (url, saved))
            });
            match result {
                Ok((url, saved)) => emit(&json!({ "success": true, "url": url, "card": saved.card })),
                Err(e) => pipeline_failure(&e),
            }
        }
    }
}

fn export_request(format: Format, quality: u8, options: &QrOptions) -> ExportRequest {
    match format {
        Format::Png => ExportRequest::Png,
        Format::Jpeg => ExportRequest::Jpeg { quality },
        Format::Pdf => ExportRequest::Pdf,
        Format::QrSvg => ExportRequest::QrSvg { options: options.clone() },
        Format::QrPng => ExportRequest::QrPng { options: options.clone() },
        Format::Vcf => ExportRequest::Vcf,
        Format::Print => ExportRequest::Print,
    }
}

fn write_artifacts(artifacts: &[Artifact], dir: &Path) -> ExitCode {
    let mut files = Vec::new();
    for artifact in artifacts {
        match artifact.write_to(dir) {
            Ok(path) => files.push(json!({ "path": path, "file": artifact.manifest() })),
            Err(e) => return fail(EXIT_FAILURE, &e.to_string()),
        }
    }
    emit(&json!({ "success": true, "files": files }))
}

/// Inline JSON, or `@path` to a JSON file.
fn read_payload(payload: &str) -> Result<Value, String> {
    let text = match payload.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).map_err(|e| format!("{path}: {e}"))?,
        None => payload.to_string(),
    };
    serde_json::from_str(&text).map_err(|e| format!("Invalid payload: {e}"))
}

fn emit<T: Serialize>(value: &T) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => fail(EXIT_FAILURE, &e.to_string()),
    }
}

fn fail(code: u8, error: &str) -> ExitCode {
    println!("{}", json!({ "success": false, "error": error }));
    ExitCode::from(code)
}

fn pipeline_failure(error: &PipelineError) -> ExitCode {
    let code = match error {
        PipelineError::ValidationFailed(_) => EXIT_VALIDATION,
        e if e.is_not_found() => EXIT_NOT_FOUND,
        _ => EXIT_FAILURE,
    };
    tracing::debug!("command failed: {error}");
    fail(code, &error.to_string())
}
