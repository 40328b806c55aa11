//! Mercado Livre affiliate session automation
//!
//! Automates login to a Mercado Livre account, resolving the
//! email-delivered verification challenge without manual
//! intervention: the challenge is detected on page, code delivery is
//! switched to email, a mailbox is polled over IMAP until the code
//! arrives, and the extracted code is injected back into the session.
//! On top of the authenticated session, the crate batches product
//! URLs through the affiliate link builder and formats offer
//! summaries for an outbound [`MessageSink`].
//!
//! Browser automation is abstracted behind the narrow
//! [`BrowserSession`] trait; [`ChromeSession`] is the bundled
//! DevTools Protocol implementation.

mod affiliate;
mod challenge;
mod chrome;
mod config;
mod connection;
mod dispatch;
mod error;
mod extract;
mod login;
mod mailbox;
mod message;
mod poller;
mod session;

pub use affiliate::{LINK_BUILDER_URL, LinkBuilder};
pub use challenge::{ChallengeDetector, ChallengeResolver, ChallengeState};
pub use chrome::ChromeSession;
pub use config::{Credentials, MailboxConfig};
pub use dispatch::{
    FileOutbox, MessageSink, Offer, QuotaState, format_offer, format_summary, send_batch,
};
pub use error::{Error, Result};
pub use extract::{VerificationCode, code_from_message, extract_code, is_verification_subject};
pub use login::{LOGIN_URL, LoginFailure, LoginFlow, LoginOutcome};
pub use mailbox::{MailboxClient, MailboxSession};
pub use message::MailMessage;
pub use poller::{MailSource, PollSettings, poll_for_code};
pub use session::{BrowserSession, Locator};
