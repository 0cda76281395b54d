//! Contract Invariant Tests
//!
//! These tests verify the non-negotiable guarantees.

use chrono::{TimeZone, Utc};
use proptest::prelude::*;

use qrcard_core::{
    card::{CustomField, FieldKind, SocialLinks},
    normalize::normalize_record,
    pipeline::SavedCard,
    qr::{self, ErrorCorrection, QrOptions},
    render::render,
    store::KeyValueStore,
    theme::{resolve_style, FONTS},
    validation::{FailureMode, Validator},
    CardPipeline, CardRecord, CardStore, Exporter, ExportRequest, FileStore, MemoryStore,
    PipelineError, PublicView, SessionContext, Theme, User,
};

const ORIGIN: &str = "https://qrcard.app";

fn create_session(owner: &str) -> SessionContext {
    let session = SessionContext::new();
    session.login(User { id: owner.to_string(), email: None });
    session
}

fn create_pipeline() -> CardPipeline<MemoryStore> {
    CardPipeline::new(
        CardStore::new(MemoryStore::new(), ORIGIN),
        Exporter::default(),
        create_session("owner-1"),
    )
}

fn create_test_card(name: &str) -> CardRecord {
    let mut card = CardRecord::new();
    card.name = name.to_string();
    card.title = "CTO".to_string();
    card.company = "Acme".to_string();
    card.email = "jane@acme.test".to_string();
    card.phone = "+1 555 0100".to_string();
    card.website = "https://acme.test".to_string();
    card.social_links.linkedin = Some("https://linkedin.com/in/jane".to_string());
    card.custom_fields = vec![CustomField {
        id: "1".to_string(),
        label: "GitHub".to_string(),
        value: "https://github.com/x".to_string(),
        kind: FieldKind::Url,
    }];
    card
}

fn save(pipeline: &mut CardPipeline<MemoryStore>, card: &CardRecord) -> CardRecord {
    let SavedCard { card, .. } = pipeline.save(card).unwrap();
    card
}

#[test]
fn invariant_delete_leaves_no_record_and_no_index_entry() {
    let dir = tempfile::tempdir().unwrap();
    let kv = FileStore::open(dir.path().join("store.json")).unwrap();
    let mut pipeline =
        CardPipeline::new(CardStore::new(kv, ORIGIN), Exporter::default(), create_session("owner-1"));

    let saved = pipeline.save(&create_test_card("Jane Smith")).unwrap().card;
    let id = saved.id.clone().unwrap();
    assert_eq!(pipeline.list().unwrap().len(), 1);

    pipeline.delete(&id).unwrap();

    assert!(pipeline.list().unwrap().is_empty());
    assert!(pipeline.load(&id).unwrap_err().is_not_found());
    assert!(matches!(pipeline.public_view(&id).unwrap(), PublicView::NotFound { .. }));

    // Reopen from disk: the pair was removed together.
    let reopened = FileStore::open(dir.path().join("store.json")).unwrap();
    assert!(reopened.list_by_prefix("card_").unwrap().is_empty());
    assert_eq!(reopened.get("user_cards_owner-1").unwrap().as_deref(), Some("[]"));
}

#[test]
fn invariant_delete_requires_owner() {
    let mut pipeline = create_pipeline();
    let id = save(&mut pipeline, &create_test_card("Jane")).id.unwrap();

    pipeline.session().login(User { id: "intruder".into(), email: None });
    assert!(pipeline.delete(&id).is_err());

    pipeline.session().login(User { id: "owner-1".into(), email: None });
    assert!(pipeline.load(&id).is_ok());
}

#[test]
fn invariant_resave_keeps_id_and_recomputes_url() {
    let mut pipeline = create_pipeline();
    let first = save(&mut pipeline, &create_test_card("Jane"));
    let id = first.id.clone().unwrap();

    let mut edited = first.clone();
    edited.name = "Jane Q. Smith".to_string();
    edited.public_url = Some("https://evil.test/phish".to_string());
    let second = save(&mut pipeline, &edited);

    assert_eq!(second.id.as_deref(), Some(id.as_str()));
    assert_eq!(second.public_url, Some(format!("{ORIGIN}/card/{id}")));
    let index = pipeline.list().unwrap();
    assert_eq!(index.len(), 1);
    assert_eq!(index[0].name, "Jane Q. Smith");
}

#[test_log::test]
fn invariant_malformed_stored_data_is_reported_not_fatal() {
    let mut kv = MemoryStore::new();
    kv.put(
        "card_legacy",
        r#"{"id":"legacy","ownerId":"owner-1","name":"Old","socialLinks":"{broken","customFields":"[]"}"#,
    )
    .unwrap();
    let pipeline = CardPipeline::new(CardStore::new(kv, ORIGIN), Exporter::default(), create_session("owner-1"));

    let loaded = pipeline.load("legacy").unwrap();
    assert_eq!(loaded.card.name, "Old");
    assert_eq!(loaded.card.social_links, SocialLinks::default());
    assert!(loaded.diagnostics.iter().any(|d| d.field == "socialLinks"));
}

#[test]
fn invariant_inactive_public_path_hides_contact_details() {
    let mut pipeline = create_pipeline();
    let mut card = create_test_card("Jane Smith");
    card.is_active = false;
    let id = save(&mut pipeline, &card).id.unwrap();

    let (view, html) = pipeline.public_page(&id, &QrOptions::default()).unwrap();
    assert!(matches!(view, PublicView::Unavailable { .. }));
    let svg = view.surface().unwrap().svg().to_string();
    let json = serde_json::to_string(&view).unwrap();

    for secret in ["jane@acme.test", "+1 555 0100", "linkedin.com/in/jane", "github.com/x", "GitHub"] {
        assert!(!svg.contains(secret), "surface leaked {secret}");
        assert!(!html.contains(secret), "page leaked {secret}");
        assert!(!json.contains(secret), "view leaked {secret}");
    }

    // Still listed for its owner.
    assert_eq!(pipeline.list().unwrap().len(), 1);
    assert!(!pipeline.list().unwrap()[0].is_active);
}

#[test]
fn invariant_custom_field_activation_in_input_order() {
    let mut card = create_test_card("Jane");
    card.custom_fields.push(CustomField {
        id: "2".to_string(),
        label: "Blog".to_string(),
        value: "https://blog.test".to_string(),
        kind: FieldKind::Url,
    });

    let surface = render(&card, &resolve_style(&card.theme, &card.primary_color));
    let links = surface.links();
    let github = links.iter().position(|l| *l == "https://github.com/x").unwrap();
    let blog = links.iter().position(|l| *l == "https://blog.test").unwrap();
    assert!(github < blog);
    assert!(surface.svg().contains(r#"href="https://github.com/x""#));
}

#[test]
fn invariant_public_page_links_only_safe_schemes() {
    let mut card = create_test_card("Jane Smith");
    card.website = "javascript:alert(document.cookie)".to_string();
    card.custom_fields[0].value = "javascript:fetch('//evil')".to_string();

    let mut pipeline = create_pipeline();
    assert!(matches!(pipeline.save(&card), Err(PipelineError::ValidationFailed(_))));
    assert!(pipeline.list().unwrap().is_empty());

    // A relaxed validator lets the card through; the page still carries no script link.
    let mut relaxed = create_pipeline().with_validator(Validator::with_failure_mode(FailureMode::Warn));
    let id = save(&mut relaxed, &card).id.unwrap();
    let (_, html) = relaxed.public_page(&id, &QrOptions::default()).unwrap();
    let html = html.to_ascii_lowercase();
    assert!(html.contains("javascript:alert(document.cookie)"));
    assert!(!html.contains("href=\"javascript"));
    assert!(html.contains(r#"href="https://qrcard.app/card/"#));
}

#[test]
fn invariant_theme_resolution_is_pure() {
    for theme in Theme::ALL.iter().chain([&Theme::from("retro")]) {
        assert_eq!(resolve_style(theme, "#123456"), resolve_style(theme, "#123456"));
    }

    let card = create_test_card("Jane");
    let preview = render(&card, &resolve_style(&card.theme, &card.primary_color));
    let again = render(&card, &resolve_style(&card.theme, &card.primary_color));
    assert_eq!(preview.svg(), again.svg());
}

#[test]
fn invariant_document_is_one_card_sized_page() {
    let mut pipeline = create_pipeline();
    let card = save(&mut pipeline, &create_test_card("Jane Smith"));

    let artifact = pipeline.export(&card, &ExportRequest::Pdf).unwrap();
    assert_eq!(artifact.filename, "Jane_Smith.pdf");
    assert_eq!(artifact.media_type(), "application/pdf");

    let doc = lopdf::Document::load_mem(&artifact.bytes).unwrap();
    let pages = doc.get_pages();
    assert_eq!(pages.len(), 1);

    let page_id = *pages.values().next().unwrap();
    let media_box = doc.get_dictionary(page_id).unwrap().get(b"MediaBox").unwrap().as_array().unwrap();
    let dims: Vec<f32> = media_box.iter().map(|o| o.as_float().unwrap()).collect();
    // 85.6mm x 53.98mm in points
    assert!((dims[2] - dims[0] - 242.646).abs() < 0.01);
    assert!((dims[3] - dims[1] - 153.014).abs() < 0.01);
}

#[test]
fn invariant_empty_name_falls_back_per_format() {
    let mut pipeline = create_pipeline();
    let card = save(&mut pipeline, &create_test_card(""));
    let options = QrOptions::default();

    let expected = [
        (ExportRequest::Png, "business-card.png"),
        (ExportRequest::Jpeg { quality: 90 }, "business-card.jpeg"),
        (ExportRequest::Pdf, "business-card.pdf"),
        (ExportRequest::Vcf, "business-card.vcf"),
        (ExportRequest::Print, "business-card.html"),
        (ExportRequest::QrSvg { options: options.clone() }, "business-card-qr.svg"),
        (ExportRequest::QrPng { options }, "business-card-qr.png"),
    ];
    for (request, filename) in expected {
        assert_eq!(pipeline.export(&card, &request).unwrap().filename, filename);
    }
}

#[test]
fn invariant_export_all_writes_complete_files_with_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = create_pipeline();
    let card = save(&mut pipeline, &create_test_card("Jane Smith"));

    let requests = [ExportRequest::Png, ExportRequest::Vcf];
    let (manifest, paths) = pipeline.export_all(&card, &requests, dir.path()).unwrap();

    assert_eq!(paths.len(), 2);
    for (file, path) in manifest.files.iter().zip(&paths) {
        let bytes = std::fs::read(path).unwrap();
        assert_eq!(bytes.len(), file.bytes);
        assert_eq!(qrcard_core::hashing::sha256_hex(&bytes), file.hash);
    }
    assert_eq!(manifest.card_id, card.id);

    // A failing request means nothing is written.
    let empty = tempfile::tempdir().unwrap();
    let bad = [ExportRequest::Vcf, ExportRequest::Jpeg { quality: 0 }];
    assert!(pipeline.export_all(&card, &bad, empty.path()).is_err());
    assert_eq!(std::fs::read_dir(empty.path()).unwrap().count(), 0);
}

#[test]
fn invariant_code_is_deterministic_and_decodes() {
    let content = format!("{ORIGIN}/card/3f6c2a9e-1d4b-4e8a-9c1f-7a2b5d8e0f11");
    for level in [ErrorCorrection::L, ErrorCorrection::M, ErrorCorrection::Q, ErrorCorrection::H] {
        let options = QrOptions { size: 512, error_correction_level: level, ..QrOptions::default() };

        let first = qr::encode(&content, &options).unwrap();
        let second = qr::encode(&content, &options).unwrap();
        assert_eq!(first.to_png().unwrap(), second.to_png().unwrap());
        assert_eq!(first.to_svg(), second.to_svg());

        let luma = image::load_from_memory(&first.to_png().unwrap()).unwrap().to_luma8();
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            luma.width() as usize,
            luma.height() as usize,
            |x, y| luma.get_pixel(x as u32, y as u32).0[0],
        );
        let grids = prepared.detect_grids();
        assert_eq!(grids.len(), 1);
        let (_, decoded) = grids[0].decode().unwrap();
        assert_eq!(decoded, content);
    }
}

#[cfg(feature = "test-hooks")]
#[test]
fn invariant_save_calls_validate() {
    qrcard_core::pipeline::reset_validation_call_count();
    let mut pipeline = create_pipeline();
    save(&mut pipeline, &create_test_card("Jane"));
    assert_eq!(qrcard_core::pipeline::get_validation_call_count(), 1);
}

fn arb_field() -> impl Strategy<Value = CustomField> {
    (
        "field_[a-z0-9]{1,8}",
        "\\PC{0,16}",
        "\\PC{0,24}",
        prop_oneof![
            Just(FieldKind::Text),
            Just(FieldKind::Url),
            Just(FieldKind::Email),
            Just(FieldKind::Phone)
        ],
    )
        .prop_map(|(id, label, value, kind)| CustomField { id, label, value, kind })
}

fn arb_card() -> impl Strategy<Value = CardRecord> {
    let link = || proptest::option::of("https://[a-z]{1,10}\\.test/[a-z]{0,8}");
    (
        (
            proptest::option::of("[a-z0-9]{1,12}"),
            "\\PC{0,20}",
            "\\PC{0,20}",
            "\\PC{0,40}",
            prop::sample::select(vec!["modern", "minimal", "dark", "gradient", "professional", "retro"]),
            "#[0-9a-f]{6}",
            prop::sample::select(FONTS.to_vec()),
        ),
        (link(), link(), link(), link(), link()),
        prop::collection::vec(arb_field(), 0..5),
        any::<bool>(),
        proptest::option::of(0i64..4_000_000_000),
    )
        .prop_map(|((id, name, company, bio, theme, color, font), links, fields, active, ts)| {
            let mut card = CardRecord::new();
            card.id = id;
            card.name = name;
            card.company = company;
            card.bio = bio;
            card.theme = Theme::from(theme);
            card.primary_color = color;
            card.font_family = font.to_string();
            card.social_links = SocialLinks {
                instagram: links.0,
                linkedin: links.1,
                twitter: links.2,
                facebook: links.3,
                website: links.4,
            };
            card.custom_fields = fields;
            card.is_active = active;
            card.updated_at = ts.and_then(|s| Utc.timestamp_opt(s, 0).single());
            card
        })
}

proptest! {
    #[test]
    fn invariant_store_encoding_round_trips(card in arb_card()) {
        let stored = qrcard_core::serialize(&card).unwrap();
        let restored = qrcard_core::normalize(&stored);
        prop_assert!(restored.is_clean());
        prop_assert_eq!(restored.card, normalize_record(&card));
    }
}
