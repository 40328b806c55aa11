//! Challenge detection and resolution
//!
//! Detection is best-effort observation of remote UI state: there is
//! no authoritative signal that a verification step is on screen, so
//! a fixed indicator list is probed and a miss may be a false
//! negative. Both the indicator set and the timeout are caller
//! configurable for that reason.
//!
//! Resolution drives the ordered affordance lists: request email
//! delivery, poll the mailbox, inject the code. Every list is plain
//! data feeding one attempt-or-skip primitive, so first success wins
//! and a missing candidate just means trying the next.

use crate::error::{Error, Result};
use crate::extract::VerificationCode;
use crate::poller::{self, MailSource, PollSettings};
use crate::session::{BrowserSession, Locator};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Where one login attempt stands with its verification challenge.
///
/// Transitions are one-directional: `None -> Presented -> Resolving ->
/// Resolved | Failed`. A `Failed` resolution still leaves room for a
/// manual fallback, which the login flow owns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChallengeState {
    None,
    Presented,
    Resolving,
    Resolved,
    Failed,
}

/// Probes the session for signs of a verification step.
pub struct ChallengeDetector {
    pub indicators: Vec<Locator>,
    pub timeout: Duration,
}

impl Default for ChallengeDetector {
    fn default() -> Self {
        Self {
            indicators: default_indicators(),
            timeout: Duration::from_secs(5),
        }
    }
}

impl ChallengeDetector {
    #[must_use]
    pub const fn new(indicators: Vec<Locator>, timeout: Duration) -> Self {
        Self {
            indicators,
            timeout,
        }
    }

    /// Whether a verification challenge appears to be on screen.
    ///
    /// True on the first indicator found; false when none appear
    /// within the overall timeout. Advisory only: an unknown
    /// challenge UI produces a false negative.
    pub async fn is_presented(&self, session: &dyn BrowserSession) -> bool {
        if self.indicators.is_empty() {
            return false;
        }
        let per_probe = self.timeout / u32::try_from(self.indicators.len()).unwrap_or(1);

        for locator in &self.indicators {
            match session.wait_for(locator, per_probe).await {
                Ok(true) => {
                    debug!("Challenge indicator found: {locator}");
                    return true;
                }
                Ok(false) => {}
                Err(e) => warn!("Indicator probe failed for {locator}: {e}"),
            }
        }
        false
    }
}

/// Requests email delivery, polls the mailbox, and injects the code.
pub struct ChallengeResolver {
    pub delivery_options: Vec<Locator>,
    pub code_fields: Vec<Locator>,
    pub submit_controls: Vec<Locator>,
    pub poll: PollSettings,
}

impl Default for ChallengeResolver {
    fn default() -> Self {
        Self {
            delivery_options: default_delivery_options(),
            code_fields: default_code_fields(),
            submit_controls: default_submit_controls(),
            poll: PollSettings::default(),
        }
    }
}

impl ChallengeResolver {
    /// Resolve a presented challenge inside the existing session.
    ///
    /// # Errors
    ///
    /// `Error::CodeNotFound` when polling exhausts its attempts,
    /// `Error::Injection` when no code field or no submit control
    /// matches, `Error::Session` when the session itself breaks.
    pub async fn resolve<S: MailSource>(
        &self,
        session: &dyn BrowserSession,
        mail: &mut S,
        cancel: &CancellationToken,
    ) -> Result<()> {
        self.request_email_delivery(session).await;

        let Some(code) = poller::poll_for_code(mail, &self.poll, cancel).await else {
            return Err(Error::CodeNotFound(format!(
                "no code after {} attempts",
                self.poll.max_attempts
            )));
        };

        self.inject_code(session, &code).await
    }

    /// Try to select the email delivery option. Absence of every
    /// candidate is fine: delivery may already default to email.
    async fn request_email_delivery(&self, session: &dyn BrowserSession) {
        for locator in &self.delivery_options {
            match session.click(locator).await {
                Ok(true) => {
                    info!("Requested code delivery via {locator}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                    return;
                }
                Ok(false) => {}
                Err(e) => warn!("Delivery option probe failed for {locator}: {e}"),
            }
        }
        debug!("No email delivery option found; assuming email is already selected");
    }

    async fn inject_code(
        &self,
        session: &dyn BrowserSession,
        code: &VerificationCode,
    ) -> Result<()> {
        for field in &self.code_fields {
            match session.type_into(field, code.as_str()).await {
                Ok(true) => {
                    info!("Code entered into {field}");
                    return self.submit(session).await;
                }
                Ok(false) => {}
                Err(e) => warn!("Code field probe failed for {field}: {e}"),
            }
        }
        Err(Error::Injection("no code input field matched".into()))
    }

    async fn submit(&self, session: &dyn BrowserSession) -> Result<()> {
        for control in &self.submit_controls {
            match session.click(control).await {
                Ok(true) => {
                    info!("Code submitted via {control}");
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) => warn!("Submit probe failed for {control}: {e}"),
            }
        }
        Err(Error::Injection("no submit control matched".into()))
    }
}

/// Page indicators that a verification step has been presented.
fn default_indicators() -> Vec<Locator> {
    vec![
        Locator::id("verification-code"),
        Locator::id("code"),
        Locator::name("code"),
        Locator::css(r#"input[placeholder*="código"]"#),
        Locator::css(r#"input[placeholder*="codigo"]"#),
        Locator::css(r#"input[placeholder*="verification"]"#),
        Locator::text("código de verificação"),
        Locator::text("codigo de verificacao"),
    ]
}

/// Affordances that switch code delivery to email.
fn default_delivery_options() -> Vec<Locator> {
    vec![
        Locator::text("Enviar código por e-mail"),
        Locator::text("Enviar por e-mail"),
        Locator::text("E-mail"),
        Locator::text("Email"),
        Locator::text("Receber por e-mail"),
    ]
}

/// Input fields the code may belong in, most specific first.
fn default_code_fields() -> Vec<Locator> {
    vec![
        Locator::id("verification-code"),
        Locator::id("code"),
        Locator::name("code"),
        Locator::css(r#"input[type="tel"]"#),
        Locator::css(r#"input[type="text"][maxlength="6"]"#),
        Locator::css(r#"input[placeholder*="código"]"#),
        Locator::css(r#"input[placeholder*="codigo"]"#),
        Locator::css(r#"input[type="text"], input[type="tel"]"#),
    ]
}

/// Controls that confirm the entered code.
fn default_submit_controls() -> Vec<Locator> {
    vec![
        Locator::css(r#"button[type="submit"]"#),
        Locator::text("Confirmar"),
        Locator::text("Verificar"),
        Locator::text("Continuar"),
        Locator::id("submit-button"),
        Locator::css("button.andes-button--large"),
    ]
}
