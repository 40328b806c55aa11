//! Error types for meli-affiliate

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Mailbox authentication failed: {0}")]
    Auth(String),

    #[error("Connection error: {0}")]
    Connect(String),

    #[error("Message fetch error: {0}")]
    Fetch(String),

    #[error("IMAP error: {0}")]
    Imap(String),

    #[error("Mail parsing error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Browser session error: {0}")]
    Session(String),

    #[error("Verification code not found: {0}")]
    CodeNotFound(String),

    #[error("Code injection failed: {0}")]
    Injection(String),
}

pub type Result<T> = std::result::Result<T, Error>;
