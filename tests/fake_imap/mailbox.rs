//! Test data model for the fake IMAP server
//!
//! A single-folder mailbox built fixture-style:
//!
//! ```ignore
//! let mailbox = MailboxBuilder::new()
//!     .email(1, raw_rfc2822_bytes)
//!     .email(2, raw_rfc2822_bytes)
//!     .build();
//! ```
//!
//! The server holds the mailbox behind `Arc<Mutex<..>>`, so tests can
//! push messages while a poll is running to simulate a verification
//! email arriving between attempts.

/// Mailbox state served by the fake server.
#[derive(Debug, Clone)]
pub struct Mailbox {
    /// Name the client must SELECT (the client uses INBOX).
    pub folder_name: String,
    pub emails: Vec<TestEmail>,
    /// When set, LOGIN is answered with NO.
    pub reject_login: bool,
}

impl Mailbox {
    /// Add a message mid-test.
    pub fn push(&mut self, uid: u32, raw: &[u8]) {
        self.emails.push(TestEmail {
            uid,
            raw: raw.to_vec(),
        });
    }
}

/// A test email.
///
/// - `uid`: IMAP UID, unique per folder and stable.
/// - `raw`: the complete RFC 2822 message (headers + body). This is
///   what a FETCH BODY[] response returns, and what the FROM / SINCE
///   search filters inspect.
#[derive(Debug, Clone)]
pub struct TestEmail {
    pub uid: u32,
    pub raw: Vec<u8>,
}

/// Builder for constructing a [`Mailbox`].
pub struct MailboxBuilder {
    mailbox: Mailbox,
}

impl Default for MailboxBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MailboxBuilder {
    pub fn new() -> Self {
        Self {
            mailbox: Mailbox {
                folder_name: "INBOX".to_string(),
                emails: Vec::new(),
                reject_login: false,
            },
        }
    }

    /// Add an email to the folder.
    pub fn email(mut self, uid: u32, raw: &[u8]) -> Self {
        self.mailbox.push(uid, raw);
        self
    }

    /// Make the server reject LOGIN attempts.
    pub fn reject_login(mut self) -> Self {
        self.mailbox.reject_login = true;
        self
    }

    /// Consume the builder and return the finished [`Mailbox`].
    pub fn build(self) -> Mailbox {
        self.mailbox
    }
}
