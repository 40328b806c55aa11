//! Time-bounded mailbox polling for verification codes
//!
//! The poller owns the retry loop, not the connection: it drives any
//! [`MailSource`] until a code turns up or attempts run out. Wall
//! clock is bounded by roughly `max_attempts x wait` plus fetch
//! latency, and a cancellation token aborts the loop immediately,
//! including mid-sleep.

use crate::error::Result;
use crate::extract::{self, VerificationCode};
use crate::message::MailMessage;
use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Searchable source of mail messages.
///
/// Implemented by [`crate::MailboxSession`]; tests substitute stubs.
#[async_trait]
pub trait MailSource: Send {
    /// UIDs of candidate messages, newest first.
    async fn search_recent(&mut self, sender_substring: &str, since_minutes: i64)
    -> Result<Vec<u32>>;

    /// Fetch and parse one message.
    async fn fetch(&mut self, uid: u32) -> Result<MailMessage>;
}

/// Settings for one polling run.
#[derive(Debug, Clone)]
pub struct PollSettings {
    pub max_attempts: u32,
    pub wait: Duration,
    pub sender_substring: String,
    pub since_minutes: i64,
}

impl Default for PollSettings {
    /// 12 attempts at 5-second intervals (about a minute), scanning
    /// the last 5 minutes of mail from the service.
    fn default() -> Self {
        Self {
            max_attempts: 12,
            wait: Duration::from_secs(5),
            sender_substring: "mercadolivre".to_string(),
            since_minutes: 5,
        }
    }
}

/// Poll `source` until a verification code is found or attempts are
/// exhausted.
///
/// Per attempt: search; if empty, sleep and retry; otherwise fetch
/// candidates newest-first and classify each until one yields a code,
/// which is returned immediately. A fetch or parse failure on a
/// single message skips that message only; a search failure abandons
/// the whole poll. No sleep happens after the final attempt.
pub async fn poll_for_code<S: MailSource>(
    source: &mut S,
    settings: &PollSettings,
    cancel: &CancellationToken,
) -> Option<VerificationCode> {
    for attempt in 1..=settings.max_attempts {
        if cancel.is_cancelled() {
            info!("Polling cancelled");
            return None;
        }
        debug!("Polling attempt {}/{}", attempt, settings.max_attempts);

        let uids = match source
            .search_recent(&settings.sender_substring, settings.since_minutes)
            .await
        {
            Ok(uids) => uids,
            Err(e) => {
                warn!("Search failed, abandoning poll: {e}");
                return None;
            }
        };

        for uid in uids {
            match source.fetch(uid).await {
                Ok(message) => {
                    if let Some(code) = extract::code_from_message(&message) {
                        info!("Verification code found in message {uid}");
                        return Some(code);
                    }
                }
                Err(e) => {
                    warn!("Skipping message {uid}: {e}");
                }
            }
        }

        if attempt < settings.max_attempts {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("Polling cancelled");
                    return None;
                }
                () = tokio::time::sleep(settings.wait) => {}
            }
        }
    }

    info!(
        "No verification code after {} attempts",
        settings.max_attempts
    );
    None
}
