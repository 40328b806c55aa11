//! IMAP command handlers for the fake server.
//!
//! Each handler processes a single command and writes its responses
//! to the stream. The search handler is the interesting one: it
//! implements the FROM and SINCE criteria the mailbox client relies
//! on, matched against the raw RFC 2822 headers of each stored email.

use super::mailbox::{Mailbox, TestEmail};
use chrono::NaiveDate;
use imap_codec::imap_types::search::SearchKey;
use imap_codec::imap_types::sequence::{SeqOrUid, Sequence, SequenceSet};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};

/// Write a string to the stream and flush.
pub async fn write_line<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufReader<S>,
    line: &str,
) -> std::io::Result<()> {
    stream.get_mut().write_all(line.as_bytes()).await?;
    stream.get_mut().flush().await
}

/// Write raw bytes to the stream and flush.
pub async fn write_bytes<S: AsyncRead + AsyncWrite + Unpin>(
    stream: &mut BufReader<S>,
    data: &[u8],
) -> std::io::Result<()> {
    stream.get_mut().write_all(data).await?;
    stream.get_mut().flush().await
}

/// Handle CAPABILITY (RFC 3501 Section 6.1.1).
pub async fn handle_capability<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    stream: &mut BufReader<S>,
) {
    let _ = write_line(stream, "* CAPABILITY IMAP4rev1\r\n").await;
    let resp = format!("{tag} OK CAPABILITY completed\r\n");
    let _ = write_line(stream, &resp).await;
}

/// Handle NOOP.
pub async fn handle_noop<S: AsyncRead + AsyncWrite + Unpin>(tag: &str, stream: &mut BufReader<S>) {
    let resp = format!("{tag} OK NOOP completed\r\n");
    let _ = write_line(stream, &resp).await;
}

/// Handle LOGIN. Accepts any credentials unless the mailbox is
/// configured to reject them. Returns false when the connection
/// should be dropped.
pub async fn handle_login<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    reject: bool,
    stream: &mut BufReader<S>,
) -> bool {
    let resp = if reject {
        format!("{tag} NO LOGIN failed\r\n")
    } else {
        format!("{tag} OK LOGIN completed\r\n")
    };
    write_line(stream, &resp).await.is_ok()
}

/// Handle SELECT. Returns the selected folder name on success.
pub async fn handle_select<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    folder_name: &str,
    mailbox: &Mailbox,
    stream: &mut BufReader<S>,
) -> Option<String> {
    if folder_name != mailbox.folder_name {
        let resp = format!("{tag} NO Folder not found\r\n");
        let _ = write_line(stream, &resp).await;
        return None;
    }

    // RFC 3501 Section 6.3.1: required untagged responses.
    let _ = write_line(
        stream,
        "* FLAGS (\\Seen \\Answered \\Flagged \\Deleted \\Draft)\r\n",
    )
    .await;
    let exists = format!("* {} EXISTS\r\n", mailbox.emails.len());
    let _ = write_line(stream, &exists).await;
    let _ = write_line(stream, "* 0 RECENT\r\n").await;
    let _ = write_line(stream, "* OK [UIDVALIDITY 1]\r\n").await;

    let uidnext = mailbox
        .emails
        .iter()
        .map(|e| e.uid)
        .max()
        .map_or(1, |max| max + 1);
    let _ = write_line(stream, &format!("* OK [UIDNEXT {uidnext}]\r\n")).await;

    let resp = format!("{tag} OK [READ-WRITE] SELECT completed\r\n");
    let _ = write_line(stream, &resp).await;
    Some(folder_name.to_string())
}

/// Handle UID SEARCH. Matches the parsed criteria against the stored
/// emails and returns the matching UIDs.
pub async fn handle_uid_search<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    criteria: &[SearchKey<'_>],
    mailbox: &Mailbox,
    selected_folder: Option<&str>,
    stream: &mut BufReader<S>,
) {
    if selected_folder.is_none() {
        let resp = format!("{tag} BAD No folder selected\r\n");
        let _ = write_line(stream, &resp).await;
        return;
    }

    let uids: Vec<u32> = mailbox
        .emails
        .iter()
        .filter(|e| criteria.iter().all(|key| matches_key(e, key)))
        .map(|e| e.uid)
        .collect();

    // "* SEARCH uid1 uid2\r\n" -- an empty result set still sends
    // "* SEARCH\r\n".
    let uid_str: Vec<String> = uids.iter().map(ToString::to_string).collect();
    let search_line = format!("* SEARCH {}\r\n", uid_str.join(" "));
    let _ = write_line(stream, &search_line).await;
    let resp = format!("{tag} OK SEARCH completed\r\n");
    let _ = write_line(stream, &resp).await;
}

/// Check if a test email matches a single `SearchKey`.
fn matches_key(email: &TestEmail, key: &SearchKey<'_>) -> bool {
    match key {
        SearchKey::All => true,
        SearchKey::From(sender) => {
            let needle = String::from_utf8_lossy(sender.as_ref()).to_lowercase();
            header_value(&email.raw, "From:")
                .map(|from| from.to_lowercase().contains(&needle))
                .unwrap_or(false)
        }
        SearchKey::Since(date) => {
            parse_email_date(&email.raw).is_some_and(|d| d >= *date.as_ref())
        }
        SearchKey::Before(date) => {
            parse_email_date(&email.raw).is_some_and(|d| d < *date.as_ref())
        }
        SearchKey::And(keys) => keys.as_ref().iter().all(|k| matches_key(email, k)),
        SearchKey::Or(a, b) => matches_key(email, a) || matches_key(email, b),
        SearchKey::Not(k) => !matches_key(email, k),
        // Unknown criteria match everything, mirroring a permissive
        // server.
        _ => true,
    }
}

/// Handle UID FETCH. Returns each email body as an IMAP counted
/// literal:
///
/// ```text
/// * <seq> FETCH (UID <uid> BODY[] {<length>}
/// <exactly length bytes of raw RFC 2822 message>
/// )
/// ```
pub async fn handle_uid_fetch<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    sequence_set: &SequenceSet,
    mailbox: &Mailbox,
    selected_folder: Option<&str>,
    stream: &mut BufReader<S>,
) {
    if selected_folder.is_none() {
        let resp = format!("{tag} BAD No folder selected\r\n");
        let _ = write_line(stream, &resp).await;
        return;
    }

    for uid in extract_uids(sequence_set) {
        if let Some((idx, email)) = mailbox
            .emails
            .iter()
            .enumerate()
            .find(|(_, e)| e.uid == uid)
        {
            let seq = idx + 1; // 1-based sequence number
            let body_len = email.raw.len();

            let header = format!("* {seq} FETCH (UID {uid} BODY[] {{{body_len}}}\r\n");
            if write_line(stream, &header).await.is_err() {
                return;
            }
            if write_bytes(stream, &email.raw).await.is_err() {
                return;
            }
            if write_line(stream, ")\r\n").await.is_err() {
                return;
            }
        }
    }

    let resp = format!("{tag} OK FETCH completed\r\n");
    let _ = write_line(stream, &resp).await;
}

/// Handle LOGOUT. Sends BYE + tagged OK.
pub async fn handle_logout<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    stream: &mut BufReader<S>,
) {
    let _ = write_line(stream, "* BYE\r\n").await;
    let resp = format!("{tag} OK LOGOUT completed\r\n");
    let _ = write_line(stream, &resp).await;
}

/// Extract UIDs from a `SequenceSet`. Only single values are needed;
/// the client fetches one UID at a time.
fn extract_uids(seq_set: &SequenceSet) -> Vec<u32> {
    seq_set
        .0
        .as_ref()
        .iter()
        .filter_map(|seq| match seq {
            Sequence::Single(SeqOrUid::Value(v)) => Some(v.get()),
            _ => None,
        })
        .collect()
}

/// First header line with the given prefix, from raw RFC 2822 bytes.
fn header_value(raw: &[u8], prefix: &str) -> Option<String> {
    let text = std::str::from_utf8(raw).ok()?;
    text.lines()
        .take_while(|line| !line.trim().is_empty())
        .find_map(|line| line.trim().strip_prefix(prefix))
        .map(|value| value.trim().to_string())
}

/// The `Date:` header parsed into a `NaiveDate`.
fn parse_email_date(raw: &[u8]) -> Option<NaiveDate> {
    let value = header_value(raw, "Date:")?;
    chrono::DateTime::parse_from_rfc2822(&value)
        .ok()
        .map(|dt| dt.date_naive())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::mailbox::MailboxBuilder;
    use imap_codec::imap_types::core::AString;
    use imap_codec::imap_types::datetime::NaiveDate as ImapDate;
    use std::num::NonZeroU32;

    fn make_email(from: &str, date: &str) -> Vec<u8> {
        format!(
            "From: {from}\r\n\
             Date: {date}\r\n\
             Subject: Test\r\n\
             \r\n\
             Body"
        )
        .into_bytes()
    }

    async fn run_search(
        criteria: &[SearchKey<'_>],
        mailbox: &Mailbox,
        selected: Option<&str>,
    ) -> String {
        let (client, server) = tokio::io::duplex(4096);
        let mut stream = BufReader::new(server);

        handle_uid_search("A1", criteria, mailbox, selected, &mut stream).await;
        drop(stream);

        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut BufReader::new(client), &mut buf)
            .await
            .unwrap();
        String::from_utf8(buf).unwrap()
    }

    fn from_key(needle: &str) -> SearchKey<'static> {
        SearchKey::From(AString::try_from(needle.to_string()).unwrap())
    }

    fn date(y: i32, m: u32, d: u32) -> ImapDate {
        ImapDate::unvalidated(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    #[tokio::test]
    async fn from_matches_sender_substring() {
        let ml = make_email(
            "Mercado Livre <noreply@mercadolivre.com.br>",
            "Mon, 01 Jan 2024 10:00:00 +0000",
        );
        let other = make_email("billing@example.com", "Mon, 01 Jan 2024 11:00:00 +0000");

        let mailbox = MailboxBuilder::new().email(1, &ml).email(2, &other).build();

        let output = run_search(&[from_key("mercadolivre")], &mailbox, Some("INBOX")).await;

        assert!(output.contains("* SEARCH 1\r\n"));
        assert!(output.contains("A1 OK SEARCH completed"));
    }

    #[tokio::test]
    async fn from_is_case_insensitive() {
        let ml = make_email(
            "NOREPLY@MERCADOLIVRE.COM.BR",
            "Mon, 01 Jan 2024 10:00:00 +0000",
        );
        let mailbox = MailboxBuilder::new().email(4, &ml).build();

        let output = run_search(&[from_key("mercadolivre")], &mailbox, Some("INBOX")).await;

        assert!(output.contains("* SEARCH 4\r\n"));
    }

    #[tokio::test]
    async fn since_excludes_older_emails() {
        let old = make_email("a@b.com", "Mon, 01 Jan 2024 10:00:00 +0000");
        let new = make_email("a@b.com", "Mon, 15 Jan 2024 10:00:00 +0000");

        let mailbox = MailboxBuilder::new().email(1, &old).email(2, &new).build();

        let output = run_search(&[SearchKey::Since(date(2024, 1, 10))], &mailbox, Some("INBOX"))
            .await;

        assert!(output.contains("* SEARCH 2\r\n"));
    }

    #[tokio::test]
    async fn from_and_since_combine() {
        let ml_old = make_email("noreply@mercadolivre.com.br", "Mon, 01 Jan 2024 10:00:00 +0000");
        let ml_new = make_email("noreply@mercadolivre.com.br", "Mon, 15 Jan 2024 10:00:00 +0000");
        let other_new = make_email("spam@example.com", "Mon, 15 Jan 2024 11:00:00 +0000");

        let mailbox = MailboxBuilder::new()
            .email(1, &ml_old)
            .email(2, &ml_new)
            .email(3, &other_new)
            .build();

        let output = run_search(
            &[from_key("mercadolivre"), SearchKey::Since(date(2024, 1, 10))],
            &mailbox,
            Some("INBOX"),
        )
        .await;

        assert!(output.contains("* SEARCH 2\r\n"));
    }

    #[tokio::test]
    async fn empty_result_still_sends_search_line() {
        let mailbox = MailboxBuilder::new().build();

        let output = run_search(&[from_key("mercadolivre")], &mailbox, Some("INBOX")).await;

        assert!(output.contains("* SEARCH \r\n"));
        assert!(output.contains("A1 OK SEARCH completed"));
    }

    #[tokio::test]
    async fn search_without_selected_folder_is_bad() {
        let mailbox = MailboxBuilder::new().build();

        let output = run_search(&[SearchKey::All], &mailbox, None).await;

        assert!(output.contains("A1 BAD No folder selected"));
    }

    #[tokio::test]
    async fn fetch_returns_counted_literal() {
        let raw = make_email("a@b.com", "Mon, 01 Jan 2024 10:00:00 +0000");
        let expected_len = raw.len();
        let mailbox = MailboxBuilder::new().email(42, &raw).build();

        let seq_set = SequenceSet(
            vec![Sequence::Single(SeqOrUid::Value(
                NonZeroU32::new(42).unwrap(),
            ))]
            .try_into()
            .unwrap(),
        );

        let (client, server) = tokio::io::duplex(4096);
        let mut stream = BufReader::new(server);
        handle_uid_fetch("A1", &seq_set, &mailbox, Some("INBOX"), &mut stream).await;
        drop(stream);

        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut BufReader::new(client), &mut buf)
            .await
            .unwrap();
        let output = String::from_utf8(buf).unwrap();

        assert!(output.contains("* 1 FETCH (UID 42 BODY[]"));
        assert!(output.contains(&format!("{{{expected_len}}}")));
        assert!(output.contains("A1 OK FETCH completed"));
    }

    #[tokio::test]
    async fn login_rejection_sends_no() {
        let (client, server) = tokio::io::duplex(1024);
        let mut stream = BufReader::new(server);
        let keep_going = handle_login("A1", true, &mut stream).await;
        drop(stream);

        let mut buf = Vec::new();
        tokio::io::AsyncReadExt::read_to_end(&mut BufReader::new(client), &mut buf)
            .await
            .unwrap();
        let output = String::from_utf8(buf).unwrap();

        assert!(keep_going);
        assert_eq!(output, "A1 NO LOGIN failed\r\n");
    }

    #[test]
    fn header_value_stops_at_body() {
        let raw = b"From: a@b.com\r\nSubject: x\r\n\r\nFrom: fake-in-body\r\n";
        assert_eq!(header_value(raw, "From:").unwrap(), "a@b.com");
    }
}
