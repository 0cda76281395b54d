//! Card Model - The Single Source of Truth
//!
//! Editor, preview, store and exporter all pass this one type around.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::theme::Theme;

pub type CardId = String;
pub type OwnerId = String;

pub const DEFAULT_PRIMARY_COLOR: &str = "#2563eb";
pub const DEFAULT_SECONDARY_COLOR: &str = "#f59e0b";
pub const DEFAULT_FONT: &str = "Inter";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardRecord {
    /// Assigned at first save, immutable afterwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<CardId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<OwnerId>,

    pub name: String,
    pub title: String,
    pub company: String,
    pub bio: String,

    pub email: String,
    pub phone: String,
    pub website: String,
    pub address: String,

    pub theme: Theme,
    pub primary_color: String,
    pub secondary_color: String,
    pub font_family: String,

    pub profile_image_url: String,
    pub logo_url: String,

    pub social_links: SocialLinks,
    pub custom_fields: Vec<CustomField>,

    pub is_active: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for CardRecord {
    fn default() -> Self {
        Self {
            id: None,
            owner_id: None,
            name: String::new(),
            title: String::new(),
            company: String::new(),
            bio: String::new(),
            email: String::new(),
            phone: String::new(),
            website: String::new(),
            address: String::new(),
            theme: Theme::default(),
            primary_color: DEFAULT_PRIMARY_COLOR.to_string(),
            secondary_color: DEFAULT_SECONDARY_COLOR.to_string(),
            font_family: DEFAULT_FONT.to_string(),
            profile_image_url: String::new(),
            logo_url: String::new(),
            social_links: SocialLinks::default(),
            custom_fields: Vec::new(),
            is_active: true,
            public_url: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SocialPlatform {
    Instagram,
    Linkedin,
    Twitter,
    Facebook,
    Website,
}

impl SocialPlatform {
    /// Platforms shown in the icon row, in display order.
    pub const ICON_ROW: [SocialPlatform; 4] = [
        SocialPlatform::Instagram,
        SocialPlatform::Linkedin,
        SocialPlatform::Twitter,
        SocialPlatform::Facebook,
    ];

    pub fn key(self) -> &'static str {
        match self {
            SocialPlatform::Instagram => "instagram",
            SocialPlatform::Linkedin => "linkedin",
            SocialPlatform::Twitter => "twitter",
            SocialPlatform::Facebook => "facebook",
            SocialPlatform::Website => "website",
        }
    }

    pub fn parse(key: &str) -> Option<Self> {
        match key {
            "instagram" => Some(Self::Instagram),
            "linkedin" => Some(Self::Linkedin),
            "twitter" => Some(Self::Twitter),
            "facebook" => Some(Self::Facebook),
            "website" => Some(Self::Website),
            _ => None,
        }
    }
}

/// Social profile links. An unset link is omitted from the encoded form,
/// never written as an empty string.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialLinks {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instagram: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub linkedin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub twitter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub facebook: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub website: Option<String>,
}

impl SocialLinks {
    pub fn get(&self, platform: SocialPlatform) -> Option<&str> {
        match platform {
            SocialPlatform::Instagram => self.instagram.as_deref(),
            SocialPlatform::Linkedin => self.linkedin.as_deref(),
            SocialPlatform::Twitter => self.twitter.as_deref(),
            SocialPlatform::Facebook => self.facebook.as_deref(),
            SocialPlatform::Website => self.website.as_deref(),
        }
    }

    /// Set or clear a link. Blank values clear it.
    pub fn set(&mut self, platform: SocialPlatform, url: Option<String>) {
        let url = url.map(|u| u.trim().to_string()).filter(|u| !u.is_empty());
        let slot = match platform {
            SocialPlatform::Instagram => &mut self.instagram,
            SocialPlatform::Linkedin => &mut self.linkedin,
            SocialPlatform::Twitter => &mut self.twitter,
            SocialPlatform::Facebook => &mut self.facebook,
            SocialPlatform::Website => &mut self.website,
        };
        *slot = url;
    }

    /// Drop blank entries so `Some("")` never survives into the encoded form.
    pub fn canonical(mut self) -> Self {
        for platform in [
            SocialPlatform::Instagram,
            SocialPlatform::Linkedin,
            SocialPlatform::Twitter,
            SocialPlatform::Facebook,
            SocialPlatform::Website,
        ] {
            let value = self.get(platform).map(str::to_string);
            self.set(platform, value);
        }
        self
    }

    pub fn is_empty(&self) -> bool {
        SocialPlatform::ICON_ROW
            .iter()
            .chain(std::iter::once(&SocialPlatform::Website))
            .all(|p| self.get(*p).is_none())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    #[default]
    Text,
    Url,
    Email,
    Phone,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomField {
    pub id: String,
    pub label: String,
    pub value: String,
    #[serde(rename = "type", default)]
    pub kind: FieldKind,
}

/// Partial update applied by `update_custom_field`.
#[derive(Debug, Clone, Default)]
pub struct CustomFieldPatch {
    pub label: Option<String>,
    pub value: Option<String>,
    pub kind: Option<FieldKind>,
}

/// Lightweight owner-index entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSummary {
    pub id: CardId,
    pub name: String,
    pub title: String,
    pub company: String,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

impl CardRecord {
    /// Fresh editor state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an empty text field with a fresh id and return that id.
    pub fn add_custom_field(&mut self) -> String {
        let id = format!("field_{}", Uuid::new_v4().simple());
        self.custom_fields.push(CustomField {
            id: id.clone(),
            label: String::new(),
            value: String::new(),
            kind: FieldKind::Text,
        });
        id
    }

    pub fn update_custom_field(&mut self, field_id: &str, patch: CustomFieldPatch) -> bool {
        let Some(field) = self.custom_fields.iter_mut().find(|f| f.id == field_id) else {
            return false;
        };
        if let Some(label) = patch.label {
            field.label = label;
        }
        if let Some(value) = patch.value {
            field.value = value;
        }
        if let Some(kind) = patch.kind {
            field.kind = kind;
        }
        true
    }

    pub fn remove_custom_field(&mut self, field_id: &str) -> bool {
        let before = self.custom_fields.len();
        self.custom_fields.retain(|f| f.id != field_id);
        self.custom_fields.len() != before
    }

    pub fn set_social_link(&mut self, platform: SocialPlatform, url: Option<String>) {
        self.social_links.set(platform, url);
    }

    pub fn summary(&self) -> Option<CardSummary> {
        Some(CardSummary {
            id: self.id.clone()?,
            name: self.name.clone(),
            title: self.title.clone(),
            company: self.company.clone(),
            is_active: self.is_active,
            updated_at: self.updated_at?,
        })
    }

    /// Name used in share titles and headings.
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() {
            "Your Name"
        } else {
            self.name.trim()
        }
    }
}

/// `<origin>/card/<id>`
pub fn public_url(origin: &str, id: &str) -> String {
    format!("{}/card/{}", origin.trim_end_matches('/'), id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_editor_defaults() {
        let card = CardRecord::new();
        assert_eq!(card.theme, Theme::Modern);
        assert_eq!(card.primary_color, "#2563eb");
        assert_eq!(card.font_family, "Inter");
        assert!(card.is_active);
        assert!(card.custom_fields.is_empty());
        assert!(card.social_links.is_empty());
    }

    #[test]
    fn test_custom_field_lifecycle() {
        let mut card = CardRecord::new();
        let first = card.add_custom_field();
        let second = card.add_custom_field();
        assert_ne!(first, second);

        assert!(card.update_custom_field(
            &second,
            CustomFieldPatch {
                label: Some("GitHub".into()),
                value: Some("https://github.com/x".into()),
                kind: Some(FieldKind::Url),
            }
        ));
        assert_eq!(card.custom_fields[1].label, "GitHub");
        assert_eq!(card.custom_fields[1].kind, FieldKind::Url);

        assert!(card.remove_custom_field(&first));
        assert!(!card.remove_custom_field(&first));
        assert!(!card.update_custom_field("missing", CustomFieldPatch::default()));
        assert_eq!(card.custom_fields.len(), 1);
        assert_eq!(card.custom_fields[0].id, second);
    }

    #[test]
    fn test_blank_social_link_clears() {
        let mut card = CardRecord::new();
        card.set_social_link(SocialPlatform::Twitter, Some("https://x.com/j".into()));
        assert_eq!(card.social_links.twitter.as_deref(), Some("https://x.com/j"));
        card.set_social_link(SocialPlatform::Twitter, Some("   ".into()));
        assert!(card.social_links.twitter.is_none());
    }

    #[test]
    fn test_social_links_omit_unset() {
        let links = SocialLinks {
            linkedin: Some("https://linkedin.com/in/j".into()),
            facebook: Some(String::new()),
            ..Default::default()
        }
        .canonical();
        let json = serde_json::to_string(&links).unwrap();
        assert_eq!(json, r#"{"linkedin":"https://linkedin.com/in/j"}"#);
    }

    #[test]
    fn test_public_url() {
        assert_eq!(public_url("https://qrcard.app/", "abc"), "https://qrcard.app/card/abc");
    }

    #[test]
    fn test_summary_requires_saved_card() {
        assert!(CardRecord::new().summary().is_none());
    }
}
