//! Verification message classification and code extraction
//!
//! Subjects are matched against a fixed keyword set; bodies are run
//! through an ordered pattern table. Six-digit codes are the common
//! format for this service and are tried before the broader numeric
//! and keyword-anchored patterns, which keeps incidental numbers
//! (phone numbers, prices) from winning.

use crate::message::MailMessage;
use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

/// Subject keywords that mark a message as a verification email.
/// Matching is case-insensitive substring; the set is fixed.
const SUBJECT_KEYWORDS: &[&str] = &[
    "code",
    "código",
    "codigo",
    "verification",
    "verificação",
    "verificacao",
    "security code",
    "authentication",
    "autenticação",
    "autenticacao",
    "confirm",
    "two-step",
    "2fa",
    "token",
];

/// Ordered body patterns. The first pattern whose first match passes
/// the length gate wins.
static CODE_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"\b(\d{6})\b",
        r"\b(\d{4,8})\b",
        r"(?i)código[:\s]+(\d+)",
        r"(?i)codigo[:\s]+(\d+)",
        r"(?i)code[:\s]+(\d+)",
        r"(?i)token[:\s]+(\d+)",
        r"(?i)verification code[:\s]+(\d+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid pattern"))
    .collect()
});

/// A verification code: 4 to 8 decimal digits, valid by construction.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VerificationCode(String);

impl VerificationCode {
    /// Accept `digits` only if it is 4 to 8 ASCII decimal digits.
    #[must_use]
    pub fn new(digits: impl Into<String>) -> Option<Self> {
        let digits = digits.into();
        let valid = (4..=8).contains(&digits.len()) && digits.bytes().all(|b| b.is_ascii_digit());
        valid.then_some(Self(digits))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VerificationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether `subject` indicates a verification email.
#[must_use]
pub fn is_verification_subject(subject: &str) -> bool {
    let subject = subject.to_lowercase();
    SUBJECT_KEYWORDS
        .iter()
        .any(|keyword| subject.contains(keyword))
}

/// Extract a verification code from body text.
///
/// Patterns are tried in order; for each, only its first match in
/// document order is considered. A match outside the 4-8 digit range
/// is rejected and the next pattern is tried.
#[must_use]
pub fn extract_code(body: &str) -> Option<VerificationCode> {
    for pattern in CODE_PATTERNS.iter() {
        if let Some(captures) = pattern.captures(body) {
            if let Some(code) = VerificationCode::new(&captures[1]) {
                return Some(code);
            }
        }
    }
    None
}

/// Classify one message: a code is returned only when the subject
/// looks like a verification email and the body yields one.
#[must_use]
pub fn code_from_message(message: &MailMessage) -> Option<VerificationCode> {
    if !is_verification_subject(&message.subject) {
        return None;
    }
    extract_code(&message.body_text()?)
}
