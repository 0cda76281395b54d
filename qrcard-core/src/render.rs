//! Renderer - Card Record to Visual Surface
//!
//! The surface is an SVG document plus the ordered list of elements it was
//! laid out from. The live preview, the public page, the print view and
//! every capture-based export all start from the same `Surface`.
//!
//! Element order: profile image, heading, bio, contact lines, social row,
//! custom fields, logo. Empty fields produce nothing.

use std::fmt::Write as _;

use quick_xml::escape::escape;
use serde::Serialize;

use crate::card::{CardRecord, FieldKind, SocialPlatform};
use crate::print::PrintSpec;
use crate::theme::{Background, Style};

pub const SURFACE_WIDTH: u32 = 320;
/// Never shorter than the physical card aspect ratio.
pub const MIN_SURFACE_HEIGHT: u32 = 202;

const PADDING: u32 = 24;
const AVATAR: u32 = 96;
const SOCIAL_ICON: u32 = 24;
const SOCIAL_GAP: u32 = 16;
const LOGO_HEIGHT: u32 = 48;
const LOGO_WIDTH: u32 = 160;
const WRAP_CHARS: usize = 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ContactKind {
    Email,
    Phone,
    Website,
    Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SocialIcon {
    pub platform: SocialPlatform,
    pub href: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldLine {
    pub label: String,
    pub value: String,
    /// Target opened when the line is activated, if any.
    pub href: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "element", rename_all = "snake_case")]
pub enum Element {
    ProfileImage { href: String },
    Heading { name: String, title: Option<String>, company: Option<String> },
    Bio { text: String },
    Contact { kind: ContactKind, text: String, href: Option<String> },
    SocialRow { icons: Vec<SocialIcon> },
    CustomFields { lines: Vec<FieldLine> },
    Logo { href: String },
    Unavailable { title: String, message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct Surface {
    pub width: u32,
    pub height: u32,
    pub font_family: String,
    pub elements: Vec<Element>,
    #[serde(skip)]
    svg: String,
}

impl Surface {
    pub fn svg(&self) -> &str {
        &self.svg
    }

    /// Image links painted on the surface, in document order.
    pub fn image_hrefs(&self) -> Vec<&str> {
        self.elements
            .iter()
            .filter_map(|element| match element {
                Element::ProfileImage { href } | Element::Logo { href } => Some(href.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Every activation target on the surface, in document order.
    pub fn links(&self) -> Vec<&str> {
        let mut links = Vec::new();
        for element in &self.elements {
            match element {
                Element::Contact { href: Some(href), .. } => links.push(href.as_str()),
                Element::SocialRow { icons } => links.extend(icons.iter().map(|i| i.href.as_str())),
                Element::CustomFields { lines } => {
                    links.extend(lines.iter().filter_map(|l| l.href.as_deref()))
                }
                _ => {}
            }
        }
        links
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Schemes a card may link to. Anything else is rendered as plain text.
pub const SAFE_SCHEMES: [&str; 4] = ["http", "https", "mailto", "tel"];

/// Scheme of `value` in lowercase, if it has one.
pub fn link_scheme(value: &str) -> Option<String> {
    let (scheme, _) = value.split_once(':')?;
    let valid = scheme.chars().next().is_some_and(|c| c.is_ascii_alphabetic())
        && scheme.chars().all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    valid.then(|| scheme.to_ascii_lowercase())
}

/// Link target for a user-supplied URL. Scheme-less values get `https://`;
/// values with a scheme outside `SAFE_SCHEMES` or with control characters
/// yield no link.
pub fn safe_href(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() || value.chars().any(char::is_control) {
        return None;
    }
    match link_scheme(value) {
        Some(scheme) => SAFE_SCHEMES.contains(&scheme.as_str()).then(|| value.to_string()),
        None => Some(format!("https://{}", value.trim_start_matches('/'))),
    }
}

fn activation(kind: FieldKind, value: &str) -> Option<String> {
    match kind {
        FieldKind::Url => safe_href(value),
        FieldKind::Email => Some(format!("mailto:{value}")),
        FieldKind::Phone => Some(format!("tel:{value}")),
        FieldKind::Text => None,
    }
}

/// Lay out the record. Activation state is not consulted here; public
/// callers gate on it before rendering.
pub fn layout(card: &CardRecord) -> Vec<Element> {
    let mut elements = Vec::new();

    if let Some(href) = non_empty(&card.profile_image_url) {
        elements.push(Element::ProfileImage { href });
    }

    elements.push(Element::Heading {
        name: card.display_name().to_string(),
        title: non_empty(&card.title),
        company: non_empty(&card.company),
    });

    if let Some(text) = non_empty(&card.bio) {
        elements.push(Element::Bio { text });
    }

    let contacts = [
        (ContactKind::Email, &card.email, FieldKind::Email),
        (ContactKind::Phone, &card.phone, FieldKind::Phone),
        (ContactKind::Website, &card.website, FieldKind::Url),
        (ContactKind::Address, &card.address, FieldKind::Text),
    ];
    for (kind, value, activation_kind) in contacts {
        if let Some(text) = non_empty(value) {
            let href = activation(activation_kind, &text);
            elements.push(Element::Contact { kind, text, href });
        }
    }

    let icons: Vec<_> = SocialPlatform::ICON_ROW
        .iter()
        .filter_map(|p| {
            card.social_links
                .get(*p)
                .and_then(safe_href)
                .map(|href| SocialIcon { platform: *p, href })
        })
        .collect();
    if !icons.is_empty() {
        elements.push(Element::SocialRow { icons });
    }

    if !card.custom_fields.is_empty() {
        let lines = card
            .custom_fields
            .iter()
            .map(|f| FieldLine {
                label: f.label.clone(),
                value: f.value.clone(),
                href: non_empty(&f.value).and_then(|v| activation(f.kind, &v)),
            })
            .collect();
        elements.push(Element::CustomFields { lines });
    }

    if let Some(href) = non_empty(&card.logo_url) {
        elements.push(Element::Logo { href });
    }

    elements
}

/// Paint a record with its resolved style.
pub fn render(card: &CardRecord, style: &Style) -> Surface {
    paint(layout(card), style, &card.font_family)
}

/// Placeholder shown instead of an inactive card.
pub fn render_unavailable(style: &Style) -> Surface {
    paint(
        vec![Element::Unavailable {
            title: "Card Unavailable".to_string(),
            message: "This business card is currently inactive.".to_string(),
        }],
        style,
        crate::card::DEFAULT_FONT,
    )
}

/// Greedy word wrap. Words longer than `max` stay whole.
fn wrap(text: &str, max: usize) -> Vec<String> {
    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut line = String::new();
        for word in paragraph.split_whitespace() {
            if !line.is_empty() && line.chars().count() + 1 + word.chars().count() > max {
                lines.push(std::mem::take(&mut line));
            }
            if !line.is_empty() {
                line.push(' ');
            }
            line.push_str(word);
        }
        if !line.is_empty() {
            lines.push(line);
        }
    }
    lines
}

fn platform_glyph(platform: SocialPlatform) -> &'static str {
    match platform {
        SocialPlatform::Instagram => "IG",
        SocialPlatform::Linkedin => "in",
        SocialPlatform::Twitter => "X",
        SocialPlatform::Facebook => "f",
        SocialPlatform::Website => "www",
    }
}

struct Painter {
    body: String,
    y: u32,
    center: u32,
}

impl Painter {
    fn text(&mut self, size: u32, line_height: u32, weight: u32, opacity: f32, content: &str) {
        self.y += line_height;
        let _ = write!(
            self.body,
            r#"<text x="{}" y="{}" font-size="{size}" font-weight="{weight}" opacity="{opacity}">{}</text>"#,
            self.center,
            self.y - (line_height - size) / 2,
            escape(content),
        );
    }

    fn link_start(&mut self, href: Option<&str>) {
        if let Some(href) = href {
            let _ = write!(self.body, r#"<a href="{}">"#, escape(href));
        }
    }

    fn link_end(&mut self, href: Option<&str>) {
        if href.is_some() {
            self.body.push_str("</a>");
        }
    }

    fn gap(&mut self, amount: u32) {
        self.y += amount;
    }
}

fn paint(elements: Vec<Element>, style: &Style, font_family: &str) -> Surface {
    let width = SURFACE_WIDTH;
    let mut p = Painter { body: String::new(), y: PADDING, center: width / 2 };

    for (index, element) in elements.iter().enumerate() {
        if index > 0 {
            p.gap(16);
        }
        match element {
            Element::ProfileImage { href } => {
                let x = (width - AVATAR) / 2;
                let r = AVATAR / 2;
                let _ = write!(
                    p.body,
                    concat!(
                        r#"<clipPath id="avatar"><circle cx="{cx}" cy="{cy}" r="{r}"/></clipPath>"#,
                        r#"<image href="{href}" x="{x}" y="{y}" width="{s}" height="{s}" "#,
                        r#"preserveAspectRatio="xMidYMid slice" clip-path="url(#avatar)"/>"#,
                        r##"<circle cx="{cx}" cy="{cy}" r="{r}" fill="none" stroke="#ffffff" stroke-opacity="0.2" stroke-width="4"/>"##
                    ),
                    cx = p.center,
                    cy = p.y + r,
                    r = r,
                    x = x,
                    y = p.y,
                    s = AVATAR,
                    href = escape(href.as_str()),
                );
                p.gap(AVATAR);
            }
            Element::Heading { name, title, company } => {
                p.text(24, 32, 700, 1.0, name);
                if let Some(title) = title {
                    p.text(18, 26, 400, 0.9, title);
                }
                if let Some(company) = company {
                    p.text(16, 22, 400, 0.8, company);
                }
            }
            Element::Bio { text } => {
                for line in wrap(text, WRAP_CHARS) {
                    p.text(14, 20, 400, 0.9, &line);
                }
            }
            Element::Contact { text, href, .. } => {
                p.link_start(href.as_deref());
                for line in wrap(text, WRAP_CHARS) {
                    p.text(14, 20, 400, 1.0, &line);
                }
                p.link_end(href.as_deref());
            }
            Element::SocialRow { icons } => {
                let count = icons.len() as u32;
                let row = count * SOCIAL_ICON + count.saturating_sub(1) * SOCIAL_GAP;
                let mut x = (width - row) / 2;
                let r = SOCIAL_ICON / 2;
                for icon in icons {
                    let _ = write!(
                        p.body,
                        concat!(
                            r#"<a href="{href}"><circle cx="{cx}" cy="{cy}" r="{r}" fill="none" "#,
                            r#"stroke="currentColor" stroke-width="1.5" opacity="0.8"/>"#,
                            r#"<text x="{cx}" y="{ty}" font-size="10" font-weight="700">{glyph}</text></a>"#
                        ),
                        href = escape(icon.href.as_str()),
                        cx = x + r,
                        cy = p.y + r,
                        ty = p.y + r + 4,
                        r = r,
                        glyph = platform_glyph(icon.platform),
                    );
                    x += SOCIAL_ICON + SOCIAL_GAP;
                }
                p.gap(SOCIAL_ICON);
            }
            Element::CustomFields { lines } => {
                let _ = write!(
                    p.body,
                    r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="currentColor" stroke-opacity="0.2"/>"#,
                    PADDING,
                    p.y,
                    width - PADDING,
                    p.y,
                );
                p.gap(8);
                for line in lines {
                    p.link_start(line.href.as_deref());
                    p.y += 22;
                    let _ = write!(
                        p.body,
                        r#"<text x="{}" y="{}" font-size="14"><tspan font-weight="600">{}: </tspan><tspan opacity="0.9">{}</tspan></text>"#,
                        p.center,
                        p.y - 4,
                        escape(line.label.as_str()),
                        escape(line.value.as_str()),
                    );
                    p.link_end(line.href.as_deref());
                }
            }
            Element::Logo { href } => {
                let _ = write!(
                    p.body,
                    r#"<image href="{}" x="{}" y="{}" width="{LOGO_WIDTH}" height="{LOGO_HEIGHT}" preserveAspectRatio="xMidYMid meet" opacity="0.8"/>"#,
                    escape(href.as_str()),
                    (width - LOGO_WIDTH) / 2,
                    p.y,
                );
                p.gap(LOGO_HEIGHT);
            }
            Element::Unavailable { title, message } => {
                p.gap(40);
                p.text(20, 28, 600, 1.0, title);
                for line in wrap(message, WRAP_CHARS) {
                    p.text(14, 20, 400, 0.7, &line);
                }
            }
        }
    }

    let height = (p.y + PADDING).max(MIN_SURFACE_HEIGHT);
    let svg = document(width, height, style, font_family, &p.body);
    Surface { width, height, font_family: font_family.to_string(), elements, svg }
}

fn document(width: u32, height: u32, style: &Style, font_family: &str, body: &str) -> String {
    let mut defs = String::new();
    let fill = match &style.background {
        Background::Solid { color } => escape(color.as_str()).into_owned(),
        Background::LinearGradient { angle_deg, stops } => {
            let (sin, cos) = angle_deg.to_radians().sin_cos();
            let _ = write!(
                defs,
                r#"<linearGradient id="bg" x1="{:.4}" y1="{:.4}" x2="{:.4}" y2="{:.4}">"#,
                0.5 - sin / 2.0,
                0.5 + cos / 2.0,
                0.5 + sin / 2.0,
                0.5 - cos / 2.0,
            );
            for stop in stops {
                let _ = write!(
                    defs,
                    r#"<stop offset="{}" stop-color="{}"/>"#,
                    stop.offset,
                    escape(stop.color.as_str()),
                );
            }
            defs.push_str("</linearGradient>");
            "url(#bg)".to_string()
        }
    };
    let border = match &style.border {
        Some(b) => format!(
            r#" stroke="{}" stroke-width="{}""#,
            escape(b.color.as_str()),
            b.width_px
        ),
        None => String::new(),
    };
    let inset = style.border.as_ref().map_or(0.0, |b| b.width_px as f32 / 2.0);

    format!(
        concat!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}" "#,
            r#"font-family="{font}, sans-serif" color="{fg}">"#,
            r#"<defs>{defs}</defs>"#,
            r#"<rect x="{inset}" y="{inset}" width="{rw}" height="{rh}" fill="{fill}"{border}/>"#,
            r#"<g fill="{fg}" text-anchor="middle">{body}</g></svg>"#
        ),
        w = width,
        h = height,
        font = escape(font_family),
        fg = escape(style.foreground.as_str()),
        defs = defs,
        inset = inset,
        rw = width as f32 - 2.0 * inset,
        rh = height as f32 - 2.0 * inset,
        fill = fill,
        border = border,
        body = body,
    )
}

/// Standalone page that prints exactly one card per physical page.
pub fn print_view(surface: &Surface, spec: &PrintSpec) -> String {
    format!(
        concat!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"utf-8\">\n",
            "<title>Print Business Card</title>\n<style>\n",
            "html, body {{ margin: 0; padding: 0; }}\n",
            "body {{ font-family: '{font}', sans-serif; }}\n",
            "{page}\n",
            ".card svg {{ display: block; width: 100%; height: 100%; }}\n",
            "</style>\n</head>\n<body>\n<div class=\"card\">{svg}</div>\n</body>\n</html>\n"
        ),
        font = escape(surface.font_family.as_str()),
        page = spec.page_css(),
        svg = surface.svg(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::CustomField;
    use crate::theme::{resolve_style, Theme};

    fn full_card() -> CardRecord {
        let mut card = CardRecord::new();
        card.name = "Jane Smith".into();
        card.title = "CTO".into();
        card.company = "Acme".into();
        card.bio = "Builds resilient systems & teams that ship.".into();
        card.email = "jane@acme.test".into();
        card.phone = "+1 555 0100".into();
        card.website = "https://acme.test".into();
        card.address = "1 Main St".into();
        card.profile_image_url = "https://cdn.test/p.png".into();
        card.logo_url = "https://cdn.test/l.png".into();
        card.social_links.facebook = Some("https://facebook.com/j".into());
        card.social_links.instagram = Some("https://instagram.com/j".into());
        card.social_links.website = Some("https://j.test".into());
        card.custom_fields = vec![
            CustomField { id: "1".into(), label: "GitHub".into(), value: "https://github.com/x".into(), kind: FieldKind::Url },
            CustomField { id: "2".into(), label: "Desk".into(), value: "4B".into(), kind: FieldKind::Text },
        ];
        card
    }

    fn tag(element: &Element) -> &'static str {
        match element {
            Element::ProfileImage { .. } => "profile",
            Element::Heading { .. } => "heading",
            Element::Bio { .. } => "bio",
            Element::Contact { .. } => "contact",
            Element::SocialRow { .. } => "social",
            Element::CustomFields { .. } => "fields",
            Element::Logo { .. } => "logo",
            Element::Unavailable { .. } => "unavailable",
        }
    }

    #[test]
    fn test_fixed_vertical_order() {
        let card = full_card();
        let surface = render(&card, &resolve_style(&card.theme, &card.primary_color));
        let tags: Vec<_> = surface.elements.iter().map(tag).collect();
        assert_eq!(
            tags,
            vec!["profile", "heading", "bio", "contact", "contact", "contact", "contact", "social", "fields", "logo"]
        );
    }

    #[test]
    fn test_empty_fields_omitted() {
        let mut card = CardRecord::new();
        card.name = "Solo".into();
        let surface = render(&card, &resolve_style(&Theme::Dark, ""));
        assert_eq!(surface.elements.len(), 1);
        assert!(!surface.svg().contains("<image"));
        assert!(!surface.svg().contains("<a "));
        assert_eq!(surface.height, MIN_SURFACE_HEIGHT);
    }

    #[test]
    fn test_social_row_fixed_platform_order() {
        let card = full_card();
        let elements = layout(&card);
        let icons = elements
            .iter()
            .find_map(|e| match e {
                Element::SocialRow { icons } => Some(icons.clone()),
                _ => None,
            })
            .unwrap();
        let platforms: Vec<_> = icons.iter().map(|i| i.platform).collect();
        assert_eq!(platforms, vec![SocialPlatform::Instagram, SocialPlatform::Facebook]);
    }

    #[test]
    fn test_custom_field_activation() {
        let card = full_card();
        let surface = render(&card, &resolve_style(&card.theme, &card.primary_color));
        assert!(surface.svg().contains(r#"<a href="https://github.com/x">"#));
        assert!(surface.links().contains(&"https://github.com/x"));
        assert!(surface.links().contains(&"mailto:jane@acme.test"));
    }

    #[test]
    fn test_safe_href() {
        assert_eq!(safe_href("https://a.test/x").as_deref(), Some("https://a.test/x"));
        assert_eq!(safe_href("github.com/x").as_deref(), Some("https://github.com/x"));
        assert_eq!(safe_href("MAILTO:a@b.test").as_deref(), Some("MAILTO:a@b.test"));
        assert_eq!(safe_href(" javascript:alert(1)"), None);
        assert_eq!(safe_href("JavaScript:alert(1)"), None);
        assert_eq!(safe_href("data:text/html,<script>"), None);
        assert_eq!(safe_href("java\tscript:alert(1)"), None);
        assert_eq!(safe_href("   "), None);
    }

    #[test]
    fn test_unsafe_links_render_as_text() {
        let mut card = full_card();
        card.website = "javascript:alert(document.cookie)".into();
        card.social_links.instagram = Some("JavaScript:alert(1)".into());
        card.custom_fields[0].value = "javascript:fetch('//evil')".into();

        let surface = render(&card, &resolve_style(&card.theme, &card.primary_color));
        let svg = surface.svg().to_ascii_lowercase();
        assert!(!svg.contains("href=\"javascript"));
        assert!(svg.contains("javascript:alert(document.cookie)</text>"));
        assert!(surface.links().iter().all(|l| safe_href(l).as_deref() == Some(*l)));
        assert_eq!(surface.links(), vec!["mailto:jane@acme.test", "tel:+1 555 0100", "https://facebook.com/j"]);
    }

    #[test]
    fn test_text_is_escaped() {
        let card = full_card();
        let surface = render(&card, &resolve_style(&card.theme, &card.primary_color));
        assert!(surface.svg().contains("systems &amp; teams"));
    }

    #[test]
    fn test_placeholder_name() {
        let surface = render(&CardRecord::new(), &resolve_style(&Theme::Minimal, ""));
        assert!(surface.svg().contains(">Your Name</text>"));
    }

    #[test]
    fn test_gradient_and_border() {
        let card = full_card();
        let modern = render(&card, &resolve_style(&Theme::Modern, ""));
        assert!(modern.svg().contains("<linearGradient id=\"bg\""));
        let minimal = render(&card, &resolve_style(&Theme::Minimal, ""));
        assert!(minimal.svg().contains(r##"stroke="#e5e7eb""##));
    }

    #[test]
    fn test_render_deterministic() {
        let card = full_card();
        let style = resolve_style(&card.theme, &card.primary_color);
        assert_eq!(render(&card, &style).svg(), render(&card, &style).svg());
    }

    #[test]
    fn test_print_view_contains_surface() {
        let card = full_card();
        let surface = render(&card, &resolve_style(&card.theme, &card.primary_color));
        let html = print_view(&surface, &PrintSpec::default());
        assert!(html.contains("size: 85.6mm 53.98mm"));
        assert!(html.contains(surface.svg()));
    }

    #[test]
    fn test_wrap() {
        assert_eq!(wrap("aa bb cc", 5), vec!["aa bb", "cc"]);
        assert_eq!(wrap("averyveryverylongword x", 4), vec!["averyveryverylongword", "x"]);
    }
}
