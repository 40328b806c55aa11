//! Outbound offer messaging
//!
//! Formats offer summaries and hands them to a [`MessageSink`].
//! Scheduling and delivery semantics belong to the sink; this module
//! only owns formatting and the per-run quota, which is explicit
//! state passed in and returned rather than anything process-wide.

use crate::error::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};

/// Per-run send allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaState {
    pub sent: u32,
    pub limit: u32,
}

impl QuotaState {
    #[must_use]
    pub const fn new(limit: u32) -> Self {
        Self { sent: 0, limit }
    }

    #[must_use]
    pub const fn exhausted(&self) -> bool {
        self.sent >= self.limit
    }
}

/// Delivery backend for formatted messages.
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// Deliver `body` to `destination`.
    async fn deliver(&self, destination: &str, body: &str) -> Result<()>;
}

/// One offer as it appears in an outbound message.
#[derive(Debug, Clone, Serialize)]
pub struct Offer {
    pub name: String,
    pub price: String,
    pub discount: String,
    pub link: String,
}

/// Format one offer as a message line block.
#[must_use]
pub fn format_offer(offer: &Offer) -> String {
    format!(
        "🔥 {}\n💰 {} ({})\n🛒 {}",
        offer.name, offer.price, offer.discount, offer.link
    )
}

/// Format a summary message for a batch of offers.
#[must_use]
pub fn format_summary(offers: &[Offer]) -> String {
    let mut body = String::from("🔥 Ofertas do dia!\n");
    for offer in offers {
        body.push('\n');
        body.push_str(&format_offer(offer));
        body.push('\n');
    }
    body
}

/// Deliver `messages` to `destination` until the quota runs out.
///
/// Individual delivery failures are logged and skipped. Returns the
/// number of deliveries made and the updated quota.
pub async fn send_batch(
    sink: &dyn MessageSink,
    destination: &str,
    messages: &[String],
    mut quota: QuotaState,
) -> (usize, QuotaState) {
    let mut delivered = 0;
    for (index, body) in messages.iter().enumerate() {
        if quota.exhausted() {
            warn!("Message quota reached after {} sends", quota.sent);
            break;
        }
        match sink.deliver(destination, body).await {
            Ok(()) => {
                delivered += 1;
                quota.sent += 1;
            }
            Err(e) => warn!("Delivery {} failed: {e}", index + 1),
        }
    }
    info!("Delivered {delivered} of {} messages", messages.len());
    (delivered, quota)
}

/// Sink that appends messages to a local outbox file, one record per
/// delivery. Useful as a dry-run transport and for audits.
pub struct FileOutbox {
    pub path: PathBuf,
}

impl FileOutbox {
    #[must_use]
    pub const fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl MessageSink for FileOutbox {
    async fn deliver(&self, destination: &str, body: &str) -> Result<()> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let record = format!("to={destination}\n{body}\n---\n");
        file.write_all(record.as_bytes()).await?;
        Ok(())
    }
}
