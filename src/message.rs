//! Parsed mail messages
//!
//! A [`MailMessage`] is built per fetched message and discarded after
//! classification. Body selection follows the mail convention for
//! verification emails: the plain-text part is preferred, and the HTML
//! part is only used (tag-stripped) when no plain part exists.

use crate::error::{Error, Result};
use chrono::{DateTime, TimeZone, Utc};
use mailparse::{DispositionType, MailHeaderMap, ParsedMail};
use regex::Regex;
use std::sync::LazyLock;

static TAG: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("valid pattern"));

/// One fetched mail message, reduced to what classification needs.
#[derive(Debug, Clone, Default)]
pub struct MailMessage {
    pub subject: String,
    pub plain: Option<String>,
    pub html: Option<String>,
    /// Approximate receive time, from the Date header.
    pub received: Option<DateTime<Utc>>,
}

impl MailMessage {
    /// Parse a raw RFC 2822 message.
    ///
    /// Walks the MIME tree collecting non-attachment text parts;
    /// multiple parts of the same kind are concatenated in document
    /// order.
    ///
    /// # Errors
    ///
    /// Returns an error if the raw bytes are not a parseable message.
    pub fn parse(raw: &[u8]) -> Result<Self> {
        let parsed = mailparse::parse_mail(raw).map_err(|e| Error::Parse(e.to_string()))?;

        let subject = parsed
            .headers
            .get_first_value("Subject")
            .unwrap_or_default();
        let received = parsed
            .headers
            .get_first_value("Date")
            .and_then(|d| mailparse::dateparse(&d).ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single());

        let mut plain = None;
        let mut html = None;
        collect_text_parts(&parsed, &mut plain, &mut html);

        Ok(Self {
            subject,
            plain,
            html,
            received,
        })
    }

    /// The message body as searchable text.
    ///
    /// Plain text wins; HTML is reduced to text by stripping markup
    /// tags. `None` when the message has no text part at all.
    #[must_use]
    pub fn body_text(&self) -> Option<String> {
        if let Some(plain) = &self.plain {
            return Some(plain.clone());
        }
        self.html.as_deref().map(strip_tags)
    }
}

fn collect_text_parts(part: &ParsedMail<'_>, plain: &mut Option<String>, html: &mut Option<String>) {
    if part.subparts.is_empty() {
        if part.get_content_disposition().disposition == DispositionType::Attachment {
            return;
        }
        let target = match part.ctype.mimetype.as_str() {
            "text/plain" => plain,
            "text/html" => html,
            _ => return,
        };
        if let Ok(body) = part.get_body() {
            target.get_or_insert_with(String::new).push_str(&body);
        }
    } else {
        for sub in &part.subparts {
            collect_text_parts(sub, plain, html);
        }
    }
}

/// Remove markup tags, leaving text content.
#[must_use]
pub fn strip_tags(html: &str) -> String {
    TAG.replace_all(html, "").into_owned()
}
