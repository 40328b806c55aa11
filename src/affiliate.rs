//! Affiliate link generation
//!
//! Runs product URLs through the account's link-builder page inside
//! an already-authenticated session. The remote form accepts at most
//! ten URLs per request, so input is chunked and the generated links
//! are read back from the result field batch by batch.

use crate::error::{Error, Result};
use crate::session::{BrowserSession, Locator};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default link-builder page.
pub const LINK_BUILDER_URL: &str = "https://www.mercadolivre.com.br/afiliados/linkbuilder#hub";

const URL_FIELD: &str = r#"textarea[id^="url-"]"#;
const RESULT_FIELD: &str = r#"textarea[id^="textfield-copyLink"]"#;

pub struct LinkBuilder {
    pub builder_url: String,
    /// Remote form limit per request.
    pub batch_size: usize,
    pub result_timeout: Duration,
}

impl Default for LinkBuilder {
    fn default() -> Self {
        Self {
            builder_url: LINK_BUILDER_URL.to_string(),
            batch_size: 10,
            result_timeout: Duration::from_secs(10),
        }
    }
}

impl LinkBuilder {
    /// Generate affiliate links for `product_urls`.
    ///
    /// A batch whose result never appears is logged and skipped; the
    /// remaining batches still run.
    ///
    /// # Errors
    ///
    /// Returns an error when the page cannot be reached or the URL
    /// field is missing entirely.
    pub async fn generate(
        &self,
        session: &dyn BrowserSession,
        product_urls: &[String],
    ) -> Result<Vec<String>> {
        let mut links = Vec::new();
        if product_urls.is_empty() {
            return Ok(links);
        }

        session.navigate(&self.builder_url).await?;
        let url_field = Locator::css(URL_FIELD);
        if !session.wait_for(&url_field, Duration::from_secs(15)).await? {
            return Err(Error::Session("link builder URL field not found".into()));
        }

        let batches = product_urls.chunks(self.batch_size);
        let batch_count = batches.len();
        for (index, batch) in batches.enumerate() {
            debug!("Processing batch {} ({} URLs)", index + 1, batch.len());

            session.type_into(&url_field, &batch.join("\n")).await?;

            let result_field = Locator::css(RESULT_FIELD);
            if !session.wait_for(&result_field, self.result_timeout).await? {
                warn!("No generated links for batch {}", index + 1);
                continue;
            }
            if let Some(value) = session.read_value(&result_field).await? {
                let generated = value
                    .lines()
                    .map(str::trim)
                    .filter(|line| !line.is_empty())
                    .map(String::from);
                links.extend(generated);
            }

            // Pace the remote service between batches.
            if index + 1 < batch_count {
                tokio::time::sleep(Duration::from_secs(2)).await;
            }
        }

        info!(
            "Generated {} affiliate links from {} product URLs",
            links.len(),
            product_urls.len()
        );
        Ok(links)
    }
}
