//! Account credentials and mailbox endpoint configuration
//!
//! Credentials come from a key=value text file (the `account.txt`
//! format) or from environment variables. The mail address and mail
//! password are optional: leaving them out is a valid configuration
//! that disables automatic challenge resolution.

use crate::error::{Error, Result};
use std::env;
use std::path::Path;

/// Login credentials for one account, loaded once and immutable for
/// the process lifetime.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub login: String,
    pub password: String,
    pub mail_address: Option<String>,
    pub mail_password: Option<String>,
}

impl Credentials {
    /// Load credentials from a key=value text file.
    ///
    /// Recognized keys: `login`, `password`, `email`,
    /// `email_password`. Lines without `=` are ignored. Empty `email`
    /// or `email_password` values are treated as absent.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or if `login` or
    /// `password` is missing or empty.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {e}", path.display())))?;

        let mut login = String::new();
        let mut password = String::new();
        let mut mail_address = None;
        let mut mail_password = None;

        for line in contents.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim();
            match key.trim() {
                "login" => login = value.to_string(),
                "password" => password = value.to_string(),
                "email" => mail_address = non_empty(value),
                "email_password" => mail_password = non_empty(value),
                _ => {}
            }
        }

        if login.is_empty() || password.is_empty() {
            return Err(Error::Config(format!(
                "{} must set both login and password",
                path.display()
            )));
        }

        Ok(Self {
            login,
            password,
            mail_address,
            mail_password,
        })
    }

    /// Load credentials from environment variables.
    ///
    /// Reads from `.env` if present. Required: `MELI_LOGIN`,
    /// `MELI_PASSWORD`. Optional: `MELI_EMAIL`, `MELI_EMAIL_PASSWORD`.
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is not set.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            login: env::var("MELI_LOGIN")
                .map_err(|_| Error::Config("MELI_LOGIN not set".into()))?,
            password: env::var("MELI_PASSWORD")
                .map_err(|_| Error::Config("MELI_PASSWORD not set".into()))?,
            mail_address: env::var("MELI_EMAIL").ok().as_deref().and_then(non_empty),
            mail_password: env::var("MELI_EMAIL_PASSWORD")
                .ok()
                .as_deref()
                .and_then(non_empty),
        })
    }

    /// Load from `path` when it exists, falling back to the
    /// environment otherwise.
    ///
    /// # Errors
    ///
    /// Propagates the underlying loader's error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        if path.as_ref().exists() {
            Self::from_file(path)
        } else {
            Self::from_env()
        }
    }

    /// Whether both mail address and mail password are configured.
    #[must_use]
    pub const fn mail_enabled(&self) -> bool {
        self.mail_address.is_some() && self.mail_password.is_some()
    }

    /// Mailbox configuration derived from the mail credentials, or
    /// `None` when automatic challenge resolution is disabled.
    #[must_use]
    pub fn mailbox_config(&self) -> Option<MailboxConfig> {
        match (&self.mail_address, &self.mail_password) {
            (Some(address), Some(password)) => Some(MailboxConfig::for_address(address, password)),
            _ => None,
        }
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// IMAP connection configuration for one mailbox.
#[derive(Debug, Clone)]
pub struct MailboxConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub folder: String,
    /// Skip certificate verification. Only the test harness should
    /// enable this.
    pub accept_invalid_certs: bool,
}

impl MailboxConfig {
    /// Build a configuration for `address`, resolving the IMAP host
    /// from the address domain via the built-in provider map.
    /// Unrecognized domains fall back to the gmail endpoint.
    #[must_use]
    pub fn for_address(address: &str, password: &str) -> Self {
        let domain = address.rsplit_once('@').map_or("", |(_, d)| d);
        Self {
            host: host_for_domain(domain).to_string(),
            port: 993,
            username: address.to_string(),
            password: password.to_string(),
            folder: "INBOX".to_string(),
            accept_invalid_certs: false,
        }
    }
}

/// Provider map: mail domain to IMAP endpoint host.
fn host_for_domain(domain: &str) -> &'static str {
    match domain.to_ascii_lowercase().as_str() {
        "outlook.com" | "hotmail.com" | "live.com" => "outlook.office365.com",
        "yahoo.com" | "yahoo.com.br" => "imap.mail.yahoo.com",
        // gmail.com, googlemail.com, and anything unrecognized
        _ => "imap.gmail.com",
    }
}
