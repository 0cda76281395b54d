//! Validation System - Rule/Policy Separation
//!
//! Rules produce structured violations.
//! Policy maps violations to actions.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::card::{CardRecord, FieldKind, SocialPlatform};
use crate::render::{link_scheme, safe_href, SAFE_SCHEMES};
use crate::theme::{is_known_font, parse_hex_color};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ViolationSeverity {
    Error,
    Warning,
    Info,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationViolation {
    pub rule: String,
    pub severity: ViolationSeverity,
    pub message: String,
    pub expected: Option<String>,
    pub actual: Option<String>,
    pub remediation: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FailureMode {
    /// Errors reject the card, warnings are kept.
    #[default]
    Block,
    Warn,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationResult {
    pub valid: bool,
    pub violations: Vec<ValidationViolation>,
    pub card_id: Option<String>,
}

impl ValidationResult {
    pub fn has_errors(&self) -> bool {
        self.violations.iter().any(|v| v.severity == ViolationSeverity::Error)
    }

    pub fn summary(&self) -> String {
        self.violations
            .iter()
            .filter(|v| v.severity == ViolationSeverity::Error)
            .map(|v| format!("{}: {}", v.rule, v.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Validation rule trait - produces violations
pub trait ValidationRule {
    fn name(&self) -> &'static str;
    fn validate(&self, card: &CardRecord) -> Vec<ValidationViolation>;
}

// --- Concrete Rules ---

pub struct NameRequiredRule;

impl ValidationRule for NameRequiredRule {
    fn name(&self) -> &'static str { "name_required" }

    fn validate(&self, card: &CardRecord) -> Vec<ValidationViolation> {
        if !card.name.trim().is_empty() {
            return vec![];
        }
        vec![ValidationViolation {
            rule: self.name().to_string(),
            severity: ViolationSeverity::Warning,
            message: "Card has no name; the public page will show a placeholder".to_string(),
            expected: Some("non-empty name".to_string()),
            actual: None,
            remediation: vec!["Fill in the name field before sharing".to_string()],
        }]
    }
}

pub struct UniqueFieldIdsRule;

impl ValidationRule for UniqueFieldIdsRule {
    fn name(&self) -> &'static str { "unique_field_ids" }

    fn validate(&self, card: &CardRecord) -> Vec<ValidationViolation> {
        let mut seen = HashSet::new();
        card.custom_fields
            .iter()
            .filter(|f| !seen.insert(f.id.as_str()))
            .map(|f| ValidationViolation {
                rule: self.name().to_string(),
                severity: ViolationSeverity::Error,
                message: "Duplicate custom field id".to_string(),
                expected: Some("unique id per field".to_string()),
                actual: Some(f.id.clone()),
                remediation: vec!["Remove the field and add it again".to_string()],
            })
            .collect()
    }
}

pub struct ColorFormatRule;

impl ValidationRule for ColorFormatRule {
    fn name(&self) -> &'static str { "color_format" }

    fn validate(&self, card: &CardRecord) -> Vec<ValidationViolation> {
        [("primaryColor", &card.primary_color), ("secondaryColor", &card.secondary_color)]
            .into_iter()
            .filter(|(_, value)| parse_hex_color(value).is_none())
            .map(|(field, value)| ValidationViolation {
                rule: self.name().to_string(),
                severity: ViolationSeverity::Warning,
                message: format!("{field} is not a hex color"),
                expected: Some("#rrggbb".to_string()),
                actual: Some(value.clone()),
                remediation: vec!["Pick a color with the color picker".to_string()],
            })
            .collect()
    }
}

pub struct KnownFontRule;

impl ValidationRule for KnownFontRule {
    fn name(&self) -> &'static str { "known_font" }

    fn validate(&self, card: &CardRecord) -> Vec<ValidationViolation> {
        if is_known_font(&card.font_family) {
            return vec![];
        }
        vec![ValidationViolation {
            rule: self.name().to_string(),
            severity: ViolationSeverity::Info,
            message: "Font is not in the curated list and may fall back".to_string(),
            expected: Some(crate::theme::FONTS.join(", ")),
            actual: Some(card.font_family.clone()),
            remediation: vec![],
        }]
    }
}

pub struct UrlSchemeRule;

impl UrlSchemeRule {
    fn links(card: &CardRecord) -> Vec<(String, &str)> {
        let mut links = vec![("website".to_string(), card.website.as_str())];
        for platform in SocialPlatform::ICON_ROW.iter().chain([&SocialPlatform::Website]) {
            if let Some(url) = card.social_links.get(*platform) {
                links.push((format!("socialLinks.{}", platform.key()), url));
            }
        }
        for field in card.custom_fields.iter().filter(|f| f.kind == FieldKind::Url) {
            links.push((format!("customFields '{}'", field.label), field.value.as_str()));
        }
        links.retain(|(_, url)| !url.trim().is_empty());
        links
    }
}

impl ValidationRule for UrlSchemeRule {
    fn name(&self) -> &'static str { "url_scheme" }

    /// Unsupported schemes block; a missing scheme only warns since it is
    /// linked as `https://`.
    fn validate(&self, card: &CardRecord) -> Vec<ValidationViolation> {
        Self::links(card)
            .into_iter()
            .filter_map(|(field, url)| {
                if safe_href(url).is_none() {
                    Some(ValidationViolation {
                        rule: self.name().to_string(),
                        severity: ViolationSeverity::Error,
                        message: format!("{field} uses an unsupported link scheme"),
                        expected: Some(SAFE_SCHEMES.join(", ")),
                        actual: Some(url.to_string()),
                        remediation: vec!["Use an http(s), mailto or tel link".to_string()],
                    })
                } else if link_scheme(url.trim()).is_none() {
                    Some(ValidationViolation {
                        rule: self.name().to_string(),
                        severity: ViolationSeverity::Warning,
                        message: format!("{field} has no http(s) scheme"),
                        expected: Some("https://...".to_string()),
                        actual: Some(url.to_string()),
                        remediation: vec!["Prefix the link with https://".to_string()],
                    })
                } else {
                    None
                }
            })
            .collect()
    }
}

/// Validator orchestrates rules and applies policy
pub struct Validator {
    rules: Vec<Box<dyn ValidationRule>>,
    failure_mode: FailureMode,
}

impl Validator {
    pub fn new() -> Self {
        Self::with_failure_mode(FailureMode::Block)
    }

    pub fn with_failure_mode(failure_mode: FailureMode) -> Self {
        Self {
            rules: vec![
                Box::new(NameRequiredRule),
                Box::new(UniqueFieldIdsRule),
                Box::new(ColorFormatRule),
                Box::new(KnownFontRule),
                Box::new(UrlSchemeRule),
            ],
            failure_mode,
        }
    }

    pub fn validate(&self, card: &CardRecord) -> ValidationResult {
        let violations: Vec<_> = self.rules.iter().flat_map(|rule| rule.validate(card)).collect();

        let has_errors = violations.iter().any(|v| v.severity == ViolationSeverity::Error);
        let valid = match self.failure_mode {
            FailureMode::Block => !has_errors,
            FailureMode::Warn => true,
        };

        ValidationResult { valid, violations, card_id: card.id.clone() }
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}
