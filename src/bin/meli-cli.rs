#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for the Mercado Livre affiliate automation

use clap::{Parser, Subcommand};
use meli_affiliate::{
    ChromeSession, Credentials, FileOutbox, LinkBuilder, LoginFlow, LoginOutcome, MailMessage,
    MailboxClient, Offer, PollSettings, QuotaState, code_from_message, format_summary,
    poll_for_code, send_batch,
};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "meli-cli")]
#[command(about = "Mercado Livre affiliate automation with email-verified login")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Credentials file (falls back to MELI_* environment variables)
    #[arg(long, global = true, default_value = "account.txt")]
    credentials: PathBuf,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Log in, resolving a verification challenge if one appears
    Login {
        /// Run the browser without a visible window
        #[arg(long)]
        headless: bool,

        /// Seconds to wait for manual code entry when automatic
        /// resolution is unavailable or fails
        #[arg(long, default_value = "60")]
        manual_window: u64,
    },

    /// Poll the configured mailbox for a verification code
    PollCode {
        /// Maximum polling attempts
        #[arg(long, default_value = "12")]
        attempts: u32,

        /// Seconds between attempts
        #[arg(long, default_value = "5")]
        wait: u64,

        /// Sender substring to filter by
        #[arg(long, default_value = "mercadolivre")]
        sender: String,

        /// Recency window in minutes
        #[arg(long, default_value = "5")]
        since_minutes: i64,

        /// Override the IMAP host resolved from the mail address
        #[arg(long)]
        imap_host: Option<String>,

        /// Override the IMAP port
        #[arg(long)]
        imap_port: Option<u16>,

        /// Skip certificate verification (test servers only)
        #[arg(long)]
        accept_invalid_certs: bool,
    },

    /// Log in and generate affiliate links for a list of product URLs
    Links {
        /// File with one product URL per line
        input: PathBuf,

        /// Run the browser without a visible window
        #[arg(long)]
        headless: bool,

        /// Append an offer summary to this outbox file
        #[arg(long)]
        outbox: Option<PathBuf>,

        /// Destination identifier recorded with the summary
        #[arg(long, default_value = "offers")]
        destination: String,
    },

    /// Classify a raw email file and print any extracted code
    Extract {
        /// Path to a raw RFC 2822 message
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    match &args.command {
        Command::Login {
            headless,
            manual_window,
        } => cmd_login(&args, *headless, *manual_window, &cancel).await?,
        Command::PollCode {
            attempts,
            wait,
            sender,
            since_minutes,
            imap_host,
            imap_port,
            accept_invalid_certs,
        } => {
            let overrides = ImapOverrides {
                host: imap_host.clone(),
                port: *imap_port,
                accept_invalid_certs: *accept_invalid_certs,
            };
            cmd_poll_code(
                &args,
                *attempts,
                *wait,
                sender,
                *since_minutes,
                &overrides,
                &cancel,
            )
            .await?;
        }
        Command::Links {
            input,
            headless,
            outbox,
            destination,
        } => {
            cmd_links(
                &args,
                input,
                *headless,
                outbox.as_deref(),
                destination,
                &cancel,
            )
            .await?;
        }
        Command::Extract { file } => cmd_extract(&args, file)?,
    }

    Ok(())
}

async fn cmd_login(
    args: &Args,
    headless: bool,
    manual_window: u64,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let credentials = Credentials::load(&args.credentials)?;
    let flow = LoginFlow::new(credentials)
        .with_manual_entry_window(Duration::from_secs(manual_window));

    let session = ChromeSession::launch(headless).await?;
    let outcome = flow.run(&session, cancel).await;
    session.close().await;

    report_outcome(args, &outcome);
    if matches!(outcome, LoginOutcome::Failed(_)) {
        std::process::exit(1);
    }
    Ok(())
}

struct ImapOverrides {
    host: Option<String>,
    port: Option<u16>,
    accept_invalid_certs: bool,
}

async fn cmd_poll_code(
    args: &Args,
    attempts: u32,
    wait: u64,
    sender: &str,
    since_minutes: i64,
    overrides: &ImapOverrides,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let credentials = Credentials::load(&args.credentials)?;
    let Some(mut config) = credentials.mailbox_config() else {
        anyhow::bail!("email and email_password must be configured to poll the mailbox");
    };
    if let Some(host) = &overrides.host {
        config.host = host.clone();
    }
    if let Some(port) = overrides.port {
        config.port = port;
    }
    config.accept_invalid_certs |= overrides.accept_invalid_certs;

    let settings = PollSettings {
        max_attempts: attempts,
        wait: Duration::from_secs(wait),
        sender_substring: sender.to_string(),
        since_minutes,
    };

    let mut mail = MailboxClient::new(config).connect().await?;
    let code = poll_for_code(&mut mail, &settings, cancel).await;
    mail.disconnect().await;

    match code {
        Some(code) => {
            if args.json {
                println!("{}", serde_json::json!({ "code": code.as_str() }));
            } else {
                println!("Verification code: {code}");
            }
            Ok(())
        }
        None => anyhow::bail!("no verification code found"),
    }
}

async fn cmd_links(
    args: &Args,
    input: &Path,
    headless: bool,
    outbox: Option<&Path>,
    destination: &str,
    cancel: &CancellationToken,
) -> anyhow::Result<()> {
    let urls: Vec<String> = std::fs::read_to_string(input)?
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect();
    if urls.is_empty() {
        anyhow::bail!("{} contains no URLs", input.display());
    }

    let credentials = Credentials::load(&args.credentials)?;
    let flow = LoginFlow::new(credentials);

    let session = ChromeSession::launch(headless).await?;
    let outcome = flow.run(&session, cancel).await;
    if let LoginOutcome::Failed(reason) = &outcome {
        session.close().await;
        anyhow::bail!("login failed: {reason:?}");
    }

    let links = LinkBuilder::default().generate(&session, &urls).await?;
    session.close().await;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&links)?);
    } else {
        for link in &links {
            println!("{link}");
        }
        println!("\n{} link(s)", links.len());
    }

    if let Some(path) = outbox {
        let offers: Vec<Offer> = links
            .iter()
            .map(|link| Offer {
                name: "Oferta".to_string(),
                price: "-".to_string(),
                discount: "-".to_string(),
                link: link.clone(),
            })
            .collect();
        let sink = FileOutbox::new(path.to_path_buf());
        let summary = format_summary(&offers);
        let (delivered, _) = send_batch(&sink, destination, &[summary], QuotaState::new(1)).await;
        println!("{delivered} summary message(s) written to {}", path.display());
    }

    Ok(())
}

fn cmd_extract(args: &Args, file: &Path) -> anyhow::Result<()> {
    let raw = std::fs::read(file)?;
    let message = MailMessage::parse(&raw)?;
    let code = code_from_message(&message);

    if args.json {
        println!(
            "{}",
            serde_json::json!({
                "subject": message.subject,
                "code": code.as_ref().map(meli_affiliate::VerificationCode::as_str),
            })
        );
    } else {
        println!("Subject: {}", message.subject);
        match code {
            Some(code) => println!("Code:    {code}"),
            None => println!("Code:    (none found)"),
        }
    }
    Ok(())
}

fn report_outcome(args: &Args, outcome: &LoginOutcome) {
    if args.json {
        let (status, reason) = match outcome {
            LoginOutcome::Succeeded => ("succeeded", None),
            LoginOutcome::Failed(reason) => ("failed", Some(format!("{reason:?}"))),
        };
        println!(
            "{}",
            serde_json::json!({ "login": status, "reason": reason })
        );
    } else {
        match outcome {
            LoginOutcome::Succeeded => println!("Login succeeded"),
            LoginOutcome::Failed(reason) => println!("Login failed: {reason:?}"),
        }
    }
}
