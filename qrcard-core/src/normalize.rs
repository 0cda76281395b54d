//! Store Encoding - Normalize at Every Boundary
//!
//! The persisted form keeps `socialLinks` and `customFields` as JSON text.
//! `normalize` accepts either that form or the structured one and never
//! decodes a value twice. Malformed data falls back to the default and is
//! reported as a `Diagnostic`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::card::{CardRecord, CustomField, FieldKind, SocialLinks, SocialPlatform};
use crate::theme::Theme;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub field: String,
    pub message: String,
}

impl Diagnostic {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self { field: field.to_string(), message: message.into() }
    }
}

#[derive(Debug, Clone)]
pub struct Normalized {
    pub card: CardRecord,
    pub diagnostics: Vec<Diagnostic>,
}

impl Normalized {
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }
}

struct Reader<'a> {
    map: &'a Map<String, Value>,
    diagnostics: Vec<Diagnostic>,
}

impl<'a> Reader<'a> {
    /// First present, non-null value among `keys`; the first key is canonical.
    fn value(&self, keys: &[&str]) -> Option<&'a Value> {
        keys.iter().find_map(|k| self.map.get(*k)).filter(|v| !v.is_null())
    }

    fn text(&mut self, key: &str) -> String {
        match self.value(&[key]) {
            None => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(other) => {
                self.diagnostics
                    .push(Diagnostic::new(key, format!("expected text, found {}", kind_of(other))));
                String::new()
            }
        }
    }

    fn text_or(&mut self, key: &str, default: &str) -> String {
        match self.value(&[key]) {
            None => default.to_string(),
            Some(_) => self.text(key),
        }
    }

    fn optional_text(&mut self, keys: &[&str]) -> Option<String> {
        match self.value(keys) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            Some(Value::String(_)) | None => None,
            Some(other) => {
                self.diagnostics.push(Diagnostic::new(
                    keys[0],
                    format!("expected text, found {}", kind_of(other)),
                ));
                None
            }
        }
    }

    fn flag(&mut self, key: &str, default: bool) -> bool {
        match self.value(&[key]) {
            None => default,
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) if s == "true" => true,
            Some(Value::String(s)) if s == "false" => false,
            Some(other) => {
                self.diagnostics
                    .push(Diagnostic::new(key, format!("expected boolean, found {}", kind_of(other))));
                default
            }
        }
    }

    fn timestamp(&mut self, key: &str) -> Option<DateTime<Utc>> {
        let raw = self.optional_text(&[key])?;
        match DateTime::parse_from_rfc3339(&raw) {
            Ok(ts) => Some(ts.with_timezone(&Utc)),
            Err(e) => {
                self.diagnostics.push(Diagnostic::new(key, format!("invalid timestamp: {e}")));
                None
            }
        }
    }

    /// Structured value, or encoded text decoded exactly once.
    fn decoded(&mut self, key: &str) -> Option<Value> {
        match self.value(&[key])? {
            Value::String(text) if text.trim().is_empty() => None,
            Value::String(text) => match serde_json::from_str::<Value>(text) {
                Ok(Value::String(_)) => {
                    self.diagnostics.push(Diagnostic::new(key, "doubly encoded value"));
                    None
                }
                Ok(v) => Some(v),
                Err(e) => {
                    self.diagnostics.push(Diagnostic::new(key, format!("undecodable text: {e}")));
                    None
                }
            },
            other => Some(other.clone()),
        }
    }

    fn social_links(&mut self) -> SocialLinks {
        let mut links = SocialLinks::default();
        let Some(value) = self.decoded("socialLinks") else {
            return links;
        };
        let Value::Object(entries) = value else {
            self.diagnostics.push(Diagnostic::new(
                "socialLinks",
                format!("expected object, found {}", kind_of(&value)),
            ));
            return links;
        };
        for (key, url) in entries {
            match (SocialPlatform::parse(&key), url) {
                (Some(platform), Value::String(url)) => links.set(platform, Some(url)),
                (Some(_), Value::Null) => {}
                (Some(_), other) => self.diagnostics.push(Diagnostic::new(
                    "socialLinks",
                    format!("{key}: expected text, found {}", kind_of(&other)),
                )),
                (None, _) => self
                    .diagnostics
                    .push(Diagnostic::new("socialLinks", format!("unknown platform '{key}' dropped"))),
            }
        }
        links
    }

    fn custom_fields(&mut self) -> Vec<CustomField> {
        let Some(value) = self.decoded("customFields") else {
            return Vec::new();
        };
        let Value::Array(items) = value else {
            self.diagnostics.push(Diagnostic::new(
                "customFields",
                format!("expected list, found {}", kind_of(&value)),
            ));
            return Vec::new();
        };

        let mut fields = Vec::with_capacity(items.len());
        for (index, item) in items.into_iter().enumerate() {
            let Value::Object(map) = item else {
                self.diagnostics
                    .push(Diagnostic::new("customFields", format!("entry {index} is not an object")));
                continue;
            };
            let mut field = Reader { map: &map, diagnostics: Vec::new() };
            let id = field.optional_text(&["id"]).unwrap_or_else(|| {
                field.diagnostics.push(Diagnostic::new("id", "missing id"));
                format!("field_{}", Uuid::new_v4().simple())
            });
            let label = field.text("label");
            let value = field.text("value");
            let kind = match field.value(&["type"]) {
                None => FieldKind::Text,
                Some(raw) => serde_json::from_value::<FieldKind>(raw.clone()).unwrap_or_else(|_| {
                    field.diagnostics.push(Diagnostic::new("type", format!("unknown type {raw}")));
                    FieldKind::Text
                }),
            };
            self.diagnostics.extend(field.diagnostics.into_iter().map(|d| Diagnostic {
                field: format!("customFields[{index}].{}", d.field),
                message: d.message,
            }));
            fields.push(CustomField { id, label, value, kind });
        }
        fields
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "text",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

/// Produce a fully populated record from loosely typed input.
pub fn normalize(raw: &Value) -> Normalized {
    let empty = Map::new();
    let (map, mut diagnostics) = match raw {
        Value::Object(map) => (map, Vec::new()),
        other => (
            &empty,
            vec![Diagnostic::new("", format!("expected object, found {}", kind_of(other)))],
        ),
    };

    let mut reader = Reader { map, diagnostics: Vec::new() };
    let card = CardRecord {
        id: reader.optional_text(&["id"]),
        owner_id: reader.optional_text(&["ownerId", "userId"]),
        name: reader.text("name"),
        title: reader.text("title"),
        company: reader.text("company"),
        bio: reader.text("bio"),
        email: reader.text("email"),
        phone: reader.text("phone"),
        website: reader.text("website"),
        address: reader.text("address"),
        theme: reader
            .optional_text(&["theme"])
            .map(Theme::from)
            .unwrap_or_default(),
        primary_color: reader.text_or("primaryColor", crate::card::DEFAULT_PRIMARY_COLOR),
        secondary_color: reader.text_or("secondaryColor", crate::card::DEFAULT_SECONDARY_COLOR),
        font_family: reader.text_or("fontFamily", crate::card::DEFAULT_FONT),
        profile_image_url: reader.text("profileImageUrl"),
        logo_url: reader.text("logoUrl"),
        social_links: reader.social_links(),
        custom_fields: reader.custom_fields(),
        is_active: reader.flag("isActive", true),
        public_url: reader.optional_text(&["publicUrl"]),
        updated_at: reader.timestamp("updatedAt"),
    };

    diagnostics.extend(reader.diagnostics);
    for diagnostic in &diagnostics {
        tracing::warn!(
            card_id = card.id.as_deref().unwrap_or("<unsaved>"),
            field = %diagnostic.field,
            "recovered malformed card data: {}",
            diagnostic.message
        );
    }

    Normalized { card, diagnostics }
}

/// Normalize an already typed record (canonicalizes blank social links).
pub fn normalize_record(card: &CardRecord) -> CardRecord {
    let mut card = card.clone();
    card.social_links = card.social_links.canonical();
    card
}

/// Encode a record into its persisted form.
pub fn serialize(card: &CardRecord) -> Result<Value, serde_json::Error> {
    let canonical = normalize_record(card);
    let mut value = serde_json::to_value(&canonical)?;
    if let Value::Object(map) = &mut value {
        map.insert(
            "socialLinks".into(),
            Value::String(serde_json::to_string(&canonical.social_links)?),
        );
        map.insert(
            "customFields".into(),
            Value::String(serde_json::to_string(&canonical.custom_fields)?),
        );
    }
    Ok(value)
}
