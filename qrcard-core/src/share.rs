//! Share Channels
//!
//! A share request is offered to an ordered list of channels. The first
//! channel that accepts it wins; failures fall through to the next one with a
//! warning. File shares end in a plain download, link shares end in handing
//! the link back to the caller to copy.

use std::path::PathBuf;
use std::process::Command;

use serde::Serialize;
use thiserror::Error;

use crate::card::CardRecord;

#[derive(Debug, Error)]
pub enum ShareError {
    #[error("{channel} cannot share this request")]
    Unsupported { channel: &'static str },

    #[error("{channel} failed: {reason}")]
    Failed { channel: &'static str, reason: String },

    #[error("No share channel accepted the request")]
    Exhausted,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShareRequest {
    pub title: String,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<PathBuf>,
}

impl ShareRequest {
    /// Share an exported file of the card.
    pub fn file(card: &CardRecord, path: PathBuf) -> Self {
        let name = card.name.trim();
        Self {
            title: format!("{name}'s Business Card"),
            text: format!("Check out {name}'s digital business card"),
            url: None,
            file: Some(path),
        }
    }

    /// Share the card's public link. `None` until the card has been saved.
    pub fn link(card: &CardRecord) -> Option<Self> {
        let url = card.public_url.clone()?;
        let name = card.name.trim();
        let mut who = name.to_string();
        if !card.title.trim().is_empty() {
            who.push_str(&format!(", {}", card.title.trim()));
        }
        if !card.company.trim().is_empty() {
            who.push_str(&format!(" at {}", card.company.trim()));
        }
        Some(Self {
            title: format!("{name}'s Digital Business Card"),
            text: format!("Check out {who}'s digital business card"),
            url: Some(url),
            file: None,
        })
    }

    fn target(&self) -> Option<String> {
        self.file
            .as_ref()
            .map(|p| p.display().to_string())
            .or_else(|| self.url.clone())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ShareOutcome {
    Shared { channel: String },
    Downloaded { path: PathBuf },
    LinkReady { url: String },
}

pub trait ShareChannel {
    fn name(&self) -> &'static str;
    fn share(&self, request: &ShareRequest) -> Result<ShareOutcome, ShareError>;
}

/// Hands the request to an external program. The file path or link is the
/// last argument; title and text travel in the environment.
pub struct CommandShare {
    program: String,
    args: Vec<String>,
}

impl CommandShare {
    /// Parse a whitespace-separated command line. `None` if blank.
    pub fn parse(command: &str) -> Option<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next()?;
        Some(Self { program, args: parts.collect() })
    }
}

impl ShareChannel for CommandShare {
    fn name(&self) -> &'static str {
        "command"
    }

    fn share(&self, request: &ShareRequest) -> Result<ShareOutcome, ShareError> {
        let target = request.target().ok_or(ShareError::Unsupported { channel: self.name() })?;
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(&target)
            .env("QRCARD_SHARE_TITLE", &request.title)
            .env("QRCARD_SHARE_TEXT", &request.text)
            .status()
            .map_err(|e| ShareError::Failed { channel: self.name(), reason: e.to_string() })?;

        if status.success() {
            Ok(ShareOutcome::Shared { channel: self.program.clone() })
        } else {
            Err(ShareError::Failed { channel: self.name(), reason: format!("exited with {status}") })
        }
    }
}

/// The exported file stays where it was written.
pub struct Download;

impl ShareChannel for Download {
    fn name(&self) -> &'static str {
        "download"
    }

    fn share(&self, request: &ShareRequest) -> Result<ShareOutcome, ShareError> {
        match &request.file {
            Some(path) if path.is_file() => Ok(ShareOutcome::Downloaded { path: path.clone() }),
            Some(path) => Err(ShareError::Failed {
                channel: self.name(),
                reason: format!("{} does not exist", path.display()),
            }),
            None => Err(ShareError::Unsupported { channel: self.name() }),
        }
    }
}

/// Returns the link for the caller to place on the clipboard.
pub struct CopyLink;

impl ShareChannel for CopyLink {
    fn name(&self) -> &'static str {
        "copy-link"
    }

    fn share(&self, request: &ShareRequest) -> Result<ShareOutcome, ShareError> {
        request
            .url
            .clone()
            .map(|url| ShareOutcome::LinkReady { url })
            .ok_or(ShareError::Unsupported { channel: self.name() })
    }
}

pub struct ShareStrategy {
    channels: Vec<Box<dyn ShareChannel>>,
}

impl ShareStrategy {
    pub fn new(channels: Vec<Box<dyn ShareChannel>>) -> Self {
        Self { channels }
    }

    /// Optional native command first, then download for files or the link for
    /// link shares.
    pub fn standard(command: Option<&str>) -> Self {
        let mut channels: Vec<Box<dyn ShareChannel>> = Vec::new();
        if let Some(native) = command.and_then(CommandShare::parse) {
            channels.push(Box::new(native));
        }
        channels.push(Box::new(Download));
        channels.push(Box::new(CopyLink));
        Self { channels }
    }

    pub fn share(&self, request: &ShareRequest) -> Result<ShareOutcome, ShareError> {
        for channel in &self.channels {
            match channel.share(request) {
                Ok(outcome) => {
                    tracing::info!(channel = channel.name(), "shared card");
                    return Ok(outcome);
                }
                Err(ShareError::Unsupported { .. }) => continue,
                Err(e) => tracing::warn!(channel = channel.name(), "share fell through: {e}"),
            }
        }
        Err(ShareError::Exhausted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Refuses;

    impl ShareChannel for Refuses {
        fn name(&self) -> &'static str {
            "refuses"
        }
        fn share(&self, _request: &ShareRequest) -> Result<ShareOutcome, ShareError> {
            Err(ShareError::Failed { channel: self.name(), reason: "cancelled".into() })
        }
    }

    fn card() -> CardRecord {
        let mut card = CardRecord::new();
        card.name = "Jane Smith".into();
        card.title = "CTO".into();
        card.company = "Acme".into();
        card.public_url = Some("https://qrcard.app/card/abc".into());
        card
    }

    #[test]
    fn test_share_texts() {
        let link = ShareRequest::link(&card()).unwrap();
        assert_eq!(link.title, "Jane Smith's Digital Business Card");
        assert_eq!(link.text, "Check out Jane Smith, CTO at Acme's digital business card");

        let file = ShareRequest::file(&card(), PathBuf::from("Jane_Smith.png"));
        assert_eq!(file.title, "Jane Smith's Business Card");
        assert_eq!(file.text, "Check out Jane Smith's digital business card");
    }

    #[test]
    fn test_unsaved_card_has_no_link() {
        assert!(ShareRequest::link(&CardRecord::new()).is_none());
    }

    #[test_log::test]
    fn test_link_falls_back_to_copy() {
        let strategy = ShareStrategy::new(vec![Box::new(Refuses), Box::new(Download), Box::new(CopyLink)]);
        let outcome = strategy.share(&ShareRequest::link(&card()).unwrap()).unwrap();
        assert_eq!(outcome, ShareOutcome::LinkReady { url: "https://qrcard.app/card/abc".into() });
    }

    #[test_log::test]
    fn test_file_falls_back_to_download() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Jane_Smith.png");
        std::fs::write(&path, b"png").unwrap();

        let strategy = ShareStrategy::new(vec![Box::new(Refuses), Box::new(Download), Box::new(CopyLink)]);
        let outcome = strategy.share(&ShareRequest::file(&card(), path.clone())).unwrap();
        assert_eq!(outcome, ShareOutcome::Downloaded { path });
    }

    #[test]
    fn test_missing_file_exhausts() {
        let strategy = ShareStrategy::standard(None);
        let request = ShareRequest::file(&card(), PathBuf::from("/nonexistent/x.png"));
        assert!(matches!(strategy.share(&request), Err(ShareError::Exhausted)));
    }

    #[test]
    fn test_blank_command_is_skipped() {
        assert!(CommandShare::parse("   ").is_none());
        let native = CommandShare::parse("xdg-open --new").unwrap();
        assert_eq!(native.program, "xdg-open");
        assert_eq!(native.args, vec!["--new"]);
    }
}
