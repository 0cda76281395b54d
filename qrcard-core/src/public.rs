//! Public View
//!
//! Decides what a visitor of `/card/<id>` sees and renders the standalone
//! shareable page. Inactive cards never reach the full renderer.

use base64::Engine as _;
use quick_xml::escape::escape;
use serde::Serialize;

use crate::card::CardRecord;
use crate::render::{render, render_unavailable, Surface};
use crate::theme::{resolve_style, Theme};
use crate::vcard;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PublicView {
    NotFound { id: String },
    Unavailable { id: String, surface: Surface },
    Available { card: Box<CardRecord>, surface: Surface },
}

impl PublicView {
    pub fn surface(&self) -> Option<&Surface> {
        match self {
            PublicView::NotFound { .. } => None,
            PublicView::Unavailable { surface, .. } | PublicView::Available { surface, .. } => {
                Some(surface)
            }
        }
    }
}

/// Gate a loaded card on its activation flag.
pub fn view(id: &str, card: Option<CardRecord>) -> PublicView {
    match card {
        None => PublicView::NotFound { id: id.to_string() },
        Some(card) if !card.is_active => PublicView::Unavailable {
            id: id.to_string(),
            surface: render_unavailable(&resolve_style(&Theme::Professional, "")),
        },
        Some(card) => {
            let surface = render(&card, &resolve_style(&card.theme, &card.primary_color));
            PublicView::Available { card: Box::new(card), surface }
        }
    }
}

fn page(title: &str, main: &str) -> String {
    format!(
        concat!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n",
            "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1\">\n",
            "<title>{title}</title>\n<style>\n",
            "body {{ margin: 0; background: #f9fafb; font-family: sans-serif; }}\n",
            "main {{ max-width: 42rem; margin: 0 auto; padding: 2rem 1rem; text-align: center; }}\n",
            ".surface svg {{ width: 100%; height: auto; border-radius: 0.75rem; }}\n",
            ".actions a {{ display: inline-block; margin: 1rem 0.5rem; }}\n",
            "</style>\n</head>\n<body>\n<main>\n{main}</main>\n</body>\n</html>\n"
        ),
        title = escape(title),
        main = main,
    )
}

fn message_page(heading: &str, message: &str) -> String {
    page(
        heading,
        &format!(
            "<h2>{}</h2>\n<p>{}</p>\n<p><a href=\"/\">Create Your Own Card</a></p>\n",
            escape(heading),
            escape(message)
        ),
    )
}

/// Self-contained shareable page. `qr_svg` is embedded as-is when given.
pub fn page_html(view: &PublicView, qr_svg: Option<&str>) -> String {
    match view {
        PublicView::NotFound { .. } => message_page(
            "Card Not Found",
            "This business card could not be found or is no longer available.",
        ),
        PublicView::Unavailable { .. } => {
            message_page("Card Unavailable", "This business card is currently inactive.")
        }
        PublicView::Available { card, surface } => {
            let contact = base64::engine::general_purpose::STANDARD.encode(vcard::build(card));
            let mut main = format!("<div class=\"surface\">{}</div>\n", surface.svg());
            main.push_str("<div class=\"actions\">\n");
            if let Some(url) = &card.public_url {
                main.push_str(&format!("<a href=\"{}\">Share</a>\n", escape(url.as_str())));
            }
            main.push_str(&format!(
                "<a download=\"{}\" href=\"data:{};base64,{}\">Save Contact</a>\n</div>\n",
                escape(crate::export::file_name(&card.name, "vcf").as_str()),
                vcard::MEDIA_TYPE,
                contact,
            ));
            if let Some(qr) = qr_svg {
                main.push_str(&format!("<div class=\"qr\">{qr}</div>\n"));
            }
            page(&format!("{} - Digital Business Card", card.display_name()), &main)
        }
    }
}
