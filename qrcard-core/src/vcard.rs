//! Contact file (vCard 3.0).
//!
//! Built from the record's identity and contact fields only, never from the
//! rendered surface. Property order is fixed for address-book importers.

use crate::card::CardRecord;

pub const MEDIA_TYPE: &str = "text/vcard";

/// Maximum line length in octets before folding.
const MAX_LINE_OCTETS: usize = 75;

/// Escape a text value (backslash, comma, semicolon, newline).
fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            ',' => out.push_str("\\,"),
            ';' => out.push_str("\\;"),
            '\n' => out.push_str("\\n"),
            '\r' => {}
            _ => out.push(c),
        }
    }
    out
}

/// Fold at UTF-8 boundaries with CRLF + space continuations.
fn fold_line(line: &str) -> String {
    if line.len() <= MAX_LINE_OCTETS {
        return line.to_string();
    }

    let mut result = String::with_capacity(line.len() + line.len() / MAX_LINE_OCTETS * 3);
    let mut current_len = 0;

    for c in line.chars() {
        if current_len + c.len_utf8() > MAX_LINE_OCTETS {
            result.push_str("\r\n ");
            // continuation lines start with the space
            current_len = 1;
        }
        result.push(c);
        current_len += c.len_utf8();
    }

    result
}

pub fn build(card: &CardRecord) -> String {
    let lines = [
        "BEGIN:VCARD".to_string(),
        "VERSION:3.0".to_string(),
        format!("FN:{}", escape(card.name.trim())),
        format!("ORG:{}", escape(&card.company)),
        format!("TITLE:{}", escape(&card.title)),
        format!("EMAIL:{}", escape(&card.email)),
        format!("TEL:{}", escape(&card.phone)),
        format!("URL:{}", escape(&card.website)),
        format!("ADR:;;{};;;;", escape(&card.address)),
        format!("NOTE:{}", escape(&card.bio)),
        "END:VCARD".to_string(),
    ];

    let mut out = String::new();
    for line in &lines {
        out.push_str(&fold_line(line));
        out.push_str("\r\n");
    }
    out
}
