//! Mailbox client
//!
//! One [`MailboxSession`] is opened per challenge resolution attempt
//! and closed when it finishes; no mailbox state is shared across
//! login attempts.

use crate::config::MailboxConfig;
use crate::connection::{self, ImapSession};
use crate::error::{Error, Result};
use crate::message::MailMessage;
use crate::poller::MailSource;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use futures::StreamExt;
use tracing::{debug, info};

/// Factory for authenticated mailbox sessions.
pub struct MailboxClient {
    config: MailboxConfig,
}

impl MailboxClient {
    #[must_use]
    pub const fn new(config: MailboxConfig) -> Self {
        Self { config }
    }

    /// Connect, authenticate, and select the configured folder.
    ///
    /// # Errors
    ///
    /// `Error::Auth` on rejected credentials, `Error::Connect` /
    /// `Error::Tls` on network failure. Neither is retried here.
    pub async fn connect(&self) -> Result<MailboxSession> {
        let mut session = connection::connect(&self.config).await?;
        connection::select(&mut session, &self.config.folder).await?;
        Ok(MailboxSession { session })
    }
}

/// An authenticated session on one mailbox folder.
pub struct MailboxSession {
    session: ImapSession,
}

impl std::fmt::Debug for MailboxSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MailboxSession").finish_non_exhaustive()
    }
}

impl MailboxSession {
    /// UIDs of messages from a sender matching `sender_substring`
    /// received within the last `since_minutes`, newest first.
    ///
    /// IMAP SINCE is day-granular, so the window is approximate; the
    /// UID ordering stands in for arrival ordering. An empty result
    /// is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the SEARCH command fails.
    pub async fn search_recent(
        &mut self,
        sender_substring: &str,
        since_minutes: i64,
    ) -> Result<Vec<u32>> {
        let since = (Utc::now() - Duration::minutes(since_minutes)).format("%-d-%b-%Y");
        let query = format!("FROM \"{sender_substring}\" SINCE {since}");

        let uids = self
            .session
            .uid_search(&query)
            .await
            .map_err(|e| Error::Imap(format!("Search failed: {e}")))?;

        let mut uid_list: Vec<u32> = uids.into_iter().collect();
        uid_list.sort_unstable_by(|a, b| b.cmp(a));

        debug!("Found {} messages matching '{}'", uid_list.len(), query);
        Ok(uid_list)
    }

    /// Fetch and parse one message by UID.
    ///
    /// # Errors
    ///
    /// `Error::Fetch` when the UID is stale or the body is missing,
    /// `Error::Parse` when the message cannot be parsed.
    pub async fn fetch(&mut self, uid: u32) -> Result<MailMessage> {
        let uid_set = format!("{uid}");
        let mut messages = self
            .session
            .uid_fetch(&uid_set, "(BODY.PEEK[])")
            .await
            .map_err(|e| Error::Fetch(format!("Fetch failed: {e}")))?;

        if let Some(msg_result) = messages.next().await {
            let msg = msg_result.map_err(|e| Error::Fetch(format!("Fetch error: {e}")))?;
            if let Some(body) = msg.body() {
                return MailMessage::parse(body);
            }
        }

        Err(Error::Fetch(format!("No body found for UID {uid}")))
    }

    /// Log out. Best-effort: the session is ending regardless.
    pub async fn disconnect(mut self) {
        self.session.logout().await.ok();
        info!("Disconnected from mailbox");
    }
}

#[async_trait]
impl MailSource for MailboxSession {
    async fn search_recent(&mut self, sender_substring: &str, since_minutes: i64) -> Result<Vec<u32>> {
        Self::search_recent(self, sender_substring, since_minutes).await
    }

    async fn fetch(&mut self, uid: u32) -> Result<MailMessage> {
        Self::fetch(self, uid).await
    }
}
