//! Login orchestration
//!
//! Drives one login attempt end to end: identifier, password,
//! challenge detection, and resolution. The challenge state is owned
//! here; the resolver only reports how its part went. When automatic
//! resolution is unavailable or fails, a bounded manual-entry window
//! gives an operator the chance to finish the challenge in the same
//! session before the attempt is declared failed.

use crate::challenge::{ChallengeDetector, ChallengeResolver, ChallengeState};
use crate::config::{Credentials, MailboxConfig};
use crate::error::Result;
use crate::mailbox::MailboxClient;
use crate::session::{BrowserSession, Locator};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Default login entry page.
pub const LOGIN_URL: &str = "https://www.mercadolivre.com.br/";

/// Why a login attempt failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginFailure {
    /// The identifier or password was not accepted.
    CredentialsRejected(String),
    /// A challenge was presented and neither automatic resolution nor
    /// the manual window cleared it.
    ChallengeUnresolved,
    /// Navigation or session breakage.
    Session(String),
}

/// Consolidated outcome of one login attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Succeeded,
    Failed(LoginFailure),
}

/// One configured login flow.
pub struct LoginFlow {
    credentials: Credentials,
    detector: ChallengeDetector,
    resolver: ChallengeResolver,
    manual_entry_window: Duration,
    login_url: String,
    mailbox_override: Option<MailboxConfig>,
}

impl LoginFlow {
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self {
            credentials,
            detector: ChallengeDetector::default(),
            resolver: ChallengeResolver::default(),
            manual_entry_window: Duration::from_secs(60),
            login_url: LOGIN_URL.to_string(),
            mailbox_override: None,
        }
    }

    #[must_use]
    pub fn with_detector(mut self, detector: ChallengeDetector) -> Self {
        self.detector = detector;
        self
    }

    #[must_use]
    pub fn with_resolver(mut self, resolver: ChallengeResolver) -> Self {
        self.resolver = resolver;
        self
    }

    #[must_use]
    pub const fn with_manual_entry_window(mut self, window: Duration) -> Self {
        self.manual_entry_window = window;
        self
    }

    #[must_use]
    pub fn with_login_url(mut self, url: impl Into<String>) -> Self {
        self.login_url = url.into();
        self
    }

    /// Use this mailbox configuration instead of the one derived from
    /// the credentials (custom IMAP hosts, test servers).
    #[must_use]
    pub fn with_mailbox(mut self, config: MailboxConfig) -> Self {
        self.mailbox_override = Some(config);
        self
    }

    /// Run one login attempt. Always returns a definite outcome.
    pub async fn run(&self, session: &dyn BrowserSession, cancel: &CancellationToken) -> LoginOutcome {
        match self.drive(session, cancel).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("Login attempt aborted: {e}");
                LoginOutcome::Failed(LoginFailure::Session(e.to_string()))
            }
        }
    }

    async fn drive(
        &self,
        session: &dyn BrowserSession,
        cancel: &CancellationToken,
    ) -> Result<LoginOutcome> {
        info!("Opening login page");
        session.navigate(&self.login_url).await?;

        if session
            .click(&Locator::css(r#"a[data-link-id="login"]"#))
            .await?
        {
            debug!("Login entry link clicked");
        }

        info!("Submitting identifier");
        if !session
            .wait_for(&Locator::id("user_id"), Duration::from_secs(10))
            .await?
        {
            return Ok(LoginOutcome::Failed(LoginFailure::Session(
                "login form did not appear".into(),
            )));
        }
        session
            .type_into(&Locator::id("user_id"), &self.credentials.login)
            .await?;
        if !session.click(&Locator::id("continue_button")).await? {
            debug!("No continue button; identifier form may submit on its own");
        }

        info!("Submitting password");
        if !session
            .wait_for(&Locator::id("password"), Duration::from_secs(10))
            .await?
        {
            return Ok(LoginOutcome::Failed(LoginFailure::CredentialsRejected(
                "password prompt never appeared".into(),
            )));
        }
        session
            .type_into(&Locator::id("password"), &self.credentials.password)
            .await?;
        session
            .click(&Locator::css(r#"button[type="submit"]"#))
            .await?;

        let mut state = ChallengeState::None;
        if self.detector.is_presented(session).await {
            transition(&mut state, ChallengeState::Presented);
            info!("Verification challenge presented");
        }

        if state == ChallengeState::Presented {
            if let Some(config) = self.mailbox_config() {
                transition(&mut state, ChallengeState::Resolving);
                let resolved = self.resolve_via_mailbox(session, config, cancel).await;
                transition(
                    &mut state,
                    if resolved {
                        ChallengeState::Resolved
                    } else {
                        ChallengeState::Failed
                    },
                );
            } else {
                info!("Mail credentials not configured; automatic resolution disabled");
                transition(&mut state, ChallengeState::Failed);
            }

            if state == ChallengeState::Failed {
                let cleared = self.manual_fallback(session, cancel).await;
                if cleared {
                    transition(&mut state, ChallengeState::Resolved);
                }
            }
        }

        if state == ChallengeState::Failed {
            return Ok(LoginOutcome::Failed(LoginFailure::ChallengeUnresolved));
        }
        info!("Login complete");
        Ok(LoginOutcome::Succeeded)
    }

    fn mailbox_config(&self) -> Option<MailboxConfig> {
        self.mailbox_override
            .clone()
            .or_else(|| self.credentials.mailbox_config())
    }

    /// One mailbox session per resolution attempt, closed before
    /// returning.
    async fn resolve_via_mailbox(
        &self,
        session: &dyn BrowserSession,
        config: MailboxConfig,
        cancel: &CancellationToken,
    ) -> bool {
        let client = MailboxClient::new(config);
        let mut mail = match client.connect().await {
            Ok(mail) => mail,
            Err(e) => {
                warn!("Mailbox connection failed: {e}");
                return false;
            }
        };

        let result = self.resolver.resolve(session, &mut mail, cancel).await;
        mail.disconnect().await;

        match result {
            Ok(()) => true,
            Err(e) => {
                warn!("Challenge resolution failed: {e}");
                false
            }
        }
    }

    /// Wait for an operator to enter the code by hand, then re-probe.
    /// The challenge disappearing means someone finished it.
    async fn manual_fallback(
        &self,
        session: &dyn BrowserSession,
        cancel: &CancellationToken,
    ) -> bool {
        if !self.manual_entry_window.is_zero() {
            info!(
                "Waiting {}s for manual code entry",
                self.manual_entry_window.as_secs()
            );
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("Manual entry window cancelled");
                    return false;
                }
                () = tokio::time::sleep(self.manual_entry_window) => {}
            }
        }
        !self.detector.is_presented(session).await
    }
}

fn transition(state: &mut ChallengeState, next: ChallengeState) {
    debug!("Challenge state {state:?} -> {next:?}");
    *state = next;
}
