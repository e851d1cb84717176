use std::io::Write;
use std::process::{Command, Stdio};

use uuid::Uuid;

use crate::commit::CommitRecord;
use crate::config::{format_size, MailerConfig};
use crate::error::mailer_error::TransportSnafu;
use crate::error::Result;
use crate::push::{short_reference, PushInfo};
use crate::render::html::HtmlRenderer;
use crate::render::text::TextRenderer;

/// A fully composed message plus its delivery envelope.
#[derive(Debug, Clone)]
pub struct ComposedMail {
    pub envelope_from: String,
    pub recipients: Vec<String>,
    pub message: String,
}

/// The mail-sending collaborator. The mailer only hands over fully formed
/// messages; how they reach an MTA is this boundary's concern.
pub trait MailTransport {
    fn deliver(&self, mail: &ComposedMail) -> Result<()>;
}

/// Delivery through a sendmail-compatible command.
pub struct SendmailTransport {
    pub sendmail_path: String,
}

impl MailTransport for SendmailTransport {
    fn deliver(&self, mail: &ComposedMail) -> Result<()> {
        let mut command = Command::new(&self.sendmail_path);
        command.arg("-f").arg(&mail.envelope_from);
        command.args(&mail.recipients);
        let mut child = command
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                TransportSnafu {
                    message: format!("failed to run {}: {e}", self.sendmail_path),
                }
                .build()
            })?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(mail.message.as_bytes()).map_err(|e| {
                TransportSnafu {
                    message: format!("failed to write to {}: {e}", self.sendmail_path),
                }
                .build()
            })?;
        }
        let status = child.wait().map_err(|e| {
            TransportSnafu {
                message: format!("failed to wait for {}: {e}", self.sendmail_path),
            }
            .build()
        })?;
        if !status.success() {
            return TransportSnafu {
                message: format!("{} exited with {status}", self.sendmail_path),
            }
            .fail();
        }
        tracing::info!(
            "sent mail to {} via {}",
            mail.recipients.join(", "),
            self.sendmail_path
        );
        Ok(())
    }
}

/// Prints messages instead of sending them (`--dry-run`).
pub struct StdoutTransport;

impl MailTransport for StdoutTransport {
    fn deliver(&self, mail: &ComposedMail) -> Result<()> {
        println!(
            "-- mail from {} to {} --\n{}",
            mail.envelope_from,
            mail.recipients.join(", "),
            mail.message
        );
        Ok(())
    }
}

/// Builds RFC-shaped messages out of push and commit info.
pub struct MailComposer<'a> {
    pub config: &'a MailerConfig,
}

impl MailComposer<'_> {
    pub fn compose_push(&self, info: &PushInfo, to: &[String]) -> ComposedMail {
        let text = TextRenderer {
            config: self.config,
        }
        .render_push(info);
        let html = self.config.add_html.then(|| {
            HtmlRenderer {
                config: self.config,
            }
            .render_push(info)
        });

        let extra_headers = vec![
            format!("X-Git-OldRev: {}", info.old_revision),
            format!("X-Git-NewRev: {}", info.new_revision),
            format!("X-Git-Refname: {}", info.reference),
            format!("X-Git-Reftype: {}", info.reference_type.label()),
            format!("Message-ID: {}", info.message_id(&self.config.host_name)),
        ];

        self.assemble(
            extra_headers,
            info.short_revision(),
            &info.subject(),
            &info.author_name,
            &info.author_email,
            &info.date.to_rfc2822(),
            to,
            text,
            html,
        )
    }

    pub fn compose_commit(&self, record: &CommitRecord, to: &[String]) -> ComposedMail {
        let text = TextRenderer {
            config: self.config,
        }
        .render_commit(record);
        let html = self.config.add_html.then(|| {
            HtmlRenderer {
                config: self.config,
            }
            .render_commit(record)
        });

        let mut extra_headers = vec![
            format!("X-Git-Author: {}", record.author_name),
            format!("X-Git-Revision: {}", record.revision),
            format!("X-Git-Repository: {}", self.config.repository_name()),
            format!("X-Git-Commit-Id: {}", record.revision),
            format!("Message-ID: {}", self.commit_message_id(record)),
        ];
        for source in &record.merge_sources {
            let merge_message_id = format!("<{}@{}>", source.revision, self.config.host_name);
            extra_headers.push(format!("References: {merge_message_id}"));
            extra_headers.push(format!("In-Reply-To: {merge_message_id}"));
        }

        self.assemble(
            extra_headers,
            record.short_revision(),
            &self.commit_subject(record),
            &record.author_name,
            &record.author_email,
            &record.date.to_rfc2822(),
            to,
            text,
            html,
        )
    }

    /// A failure report sent to the `--error-to` addresses.
    pub fn compose_error(&self, reference: &str, error: &str, to: &[String]) -> ComposedMail {
        let name = self.config.repository_name();
        let address = format!("git-commit-mailer@{}", self.config.host_name);
        let headers = [
            format!("From: {address}"),
            format!("To: {}", to.join(", ")),
            format!("Subject: [{name}] failed to mail {reference}"),
            "MIME-Version: 1.0".to_string(),
            "Content-Type: text/plain; charset=utf-8".to_string(),
        ];
        let body = format!("Processing {reference} failed:\n\n{error}\n");
        ComposedMail {
            envelope_from: address,
            recipients: to.to_vec(),
            message: format!("{}\n\n{body}", headers.join("\n")),
        }
    }

    fn commit_message_id(&self, record: &CommitRecord) -> String {
        match record.first_parent() {
            Some(first_parent) if record.is_merge() => format!(
                "<merge.{}.{}@{}>",
                first_parent, record.revision, self.config.host_name
            ),
            _ => format!("<{}@{}>", record.revision, self.config.host_name),
        }
    }

    fn commit_subject(&self, record: &CommitRecord) -> String {
        let mut path_info = String::new();
        if self.config.show_path {
            let paths = record.affected_paths();
            if !paths.is_empty() {
                path_info = format!(" ({})", paths.join(","));
            }
        }
        format!(
            "[{}{}] {}",
            short_reference(&record.reference),
            path_info,
            record.subject
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        extra_headers: Vec<String>,
        short_revision: &str,
        subject_tail: &str,
        author_name: &str,
        author_email: &str,
        date_rfc2822: &str,
        to: &[String],
        body_text: String,
        body_html: Option<String>,
    ) -> ComposedMail {
        let mut multipart = false;
        let mut html = None;
        if let Some(candidate) = body_html {
            multipart = match self.config.max_size {
                Some(max) => ((body_text.len() + candidate.len()) as u64) < max,
                None => true,
            };
            if multipart {
                html = Some(candidate);
            }
        }
        let text = if multipart {
            body_text
        } else {
            truncate_body(body_text, self.config.max_size)
        };

        let (from_display, from_address) = self.from_parts(author_name, author_email);
        let subject = format!(
            "{}@{} {}",
            self.config.repository_name(),
            short_revision,
            subject_tail
        );
        let boundary = Uuid::new_v4().simple().to_string();

        let mut headers = extra_headers;
        headers.push(format!(
            "X-Mailer: git-commit-mailer {}",
            env!("CARGO_PKG_VERSION")
        ));
        headers.push("MIME-Version: 1.0".to_string());
        if multipart {
            headers.push("Content-Type: multipart/alternative;".to_string());
            headers.push(format!(" boundary={boundary}"));
        } else {
            headers.push("Content-Type: text/plain; charset=utf-8".to_string());
            headers.push("Content-Transfer-Encoding: 8bit".to_string());
        }
        headers.push(format!("From: {from_display}"));
        headers.push(format!("To: {}", to.join(", ")));
        headers.push(format!("Subject: {subject}"));
        headers.push(format!("Date: {date_rfc2822}"));
        if let Some(sender) = &self.config.sender {
            headers.push(format!("Sender: {sender}"));
        }
        headers.retain(|header| !header.trim().is_empty());

        let body = match html {
            Some(html) => format!(
                "--{boundary}\n\
                 Content-Type: text/plain; charset=utf-8\n\
                 Content-Transfer-Encoding: 8bit\n\
                 \n\
                 {text}\n\
                 --{boundary}\n\
                 Content-Type: text/html; charset=utf-8\n\
                 Content-Transfer-Encoding: 8bit\n\
                 \n\
                 {html}\n\
                 --{boundary}--\n"
            ),
            None => text,
        };

        ComposedMail {
            envelope_from: self
                .config
                .sender
                .clone()
                .unwrap_or(from_address),
            recipients: to.to_vec(),
            message: format!("{}\n\n{body}", headers.join("\n")),
        }
    }

    /// The From: display value and the bare address inside it. An explicit
    /// `--from` wins; `--from-domain` rewrites the author's address onto the
    /// given domain; otherwise the author is used directly.
    fn from_parts(&self, author_name: &str, author_email: &str) -> (String, String) {
        if let Some(from) = &self.config.from {
            if is_bare_address(from) {
                return (from.clone(), from.clone());
            }
            return (
                format!("{} <{}>", format_name(author_name), from),
                from.clone(),
            );
        }
        if let Some(domain) = &self.config.from_domain {
            let local = author_email
                .split('@')
                .next()
                .filter(|local| !local.is_empty())
                .unwrap_or("git");
            let address = format!("{local}@{domain}");
            return (
                format!("{} <{}>", format_name(author_name), address),
                address,
            );
        }
        (
            format!("{} <{}>", format_name(author_name), author_email),
            author_email.to_string(),
        )
    }
}

fn is_bare_address(value: &str) -> bool {
    value.contains('@') && !value.contains(' ') && !value.contains('<')
}

/// Quote a display name when it contains RFC 5322 specials.
pub fn format_name(name: &str) -> String {
    if name.contains(',') || name.contains('"') || name.contains('\\') {
        let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{escaped}\"")
    } else {
        name.to_string()
    }
}

/// Cut an overlong body at a line boundary and note how much was kept.
pub fn truncate_body(body: String, max_size: Option<u64>) -> String {
    let Some(max) = max_size else {
        return body;
    };
    let max = max as usize;
    if body.len() < max {
        return body;
    }

    let mut cut = max.min(body.len());
    while cut > 0 && !body.is_char_boundary(cut) {
        cut -= 1;
    }
    let truncated = &body[..cut];
    let marker = format!("... truncated to {}\n", format_size(Some(max as u64)));

    let mut search_end = truncated.len();
    loop {
        match truncated[..search_end].rfind('\n') {
            Some(newline) => {
                if newline + 1 + marker.len() < max {
                    return format!("{}\n{marker}", &truncated[..newline]);
                }
                if newline == 0 {
                    break;
                }
                search_end = newline;
            }
            None => break,
        }
    }
    truncated.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::text::tests::sample_record;

    #[test]
    fn test_format_name_quoting() {
        assert_eq!(format_name("Alice"), "Alice");
        assert_eq!(format_name("Lastname, First"), "\"Lastname, First\"");
        assert_eq!(format_name("Al \"Ace\" Ice"), "\"Al \\\"Ace\\\" Ice\"");
    }

    #[test]
    fn test_is_bare_address() {
        assert!(is_bare_address("git@example.com"));
        assert!(!is_bare_address("Git Mailer <git@example.com>"));
        assert!(!is_bare_address("no-at-sign"));
    }

    #[test]
    fn test_truncate_body_cuts_at_line_boundary() {
        let body = "line one\nline two\nline three\n".repeat(10);
        let truncated = truncate_body(body.clone(), Some(100));
        assert!(truncated.len() <= 100);
        assert!(truncated.contains("... truncated to 100B"));
        // Always cut right after a full line.
        let marker_at = truncated.find("... truncated").unwrap();
        assert_eq!(&truncated[marker_at - 1..marker_at], "\n");
    }

    #[test]
    fn test_truncate_body_no_limit() {
        let body = "x".repeat(1000);
        assert_eq!(truncate_body(body.clone(), None), body);
    }

    #[test]
    fn test_commit_mail_headers() {
        let config = MailerConfig {
            name: Some("project".to_string()),
            host_name: "git.example.com".to_string(),
            ..MailerConfig::default()
        };
        let composer = MailComposer { config: &config };
        let record = sample_record();
        let mail = composer.compose_commit(&record, &["commits@example.com".to_string()]);

        assert!(mail
            .message
            .contains(&format!("Message-ID: <{}@git.example.com>", record.revision)));
        assert!(mail.message.contains("X-Git-Author: Alice\n"));
        assert!(mail
            .message
            .contains("X-Git-Repository: project\n"));
        assert!(mail.message.contains(&format!(
            "Subject: project@{} [main] Fix off-by-one in counter",
            record.short_revision()
        )));
        assert!(mail.message.contains("From: Alice <alice@example.com>"));
        assert!(mail.message.contains("To: commits@example.com"));
        assert_eq!(mail.envelope_from, "alice@example.com");
    }

    #[test]
    fn test_merge_commit_gets_thread_headers() {
        let config = MailerConfig {
            host_name: "git.example.com".to_string(),
            ..MailerConfig::default()
        };
        let composer = MailComposer { config: &config };
        let mut record = sample_record();
        let merge = "0123456789abcdef0123456789abcdef01234567";
        record.add_merge_source(merge, "Merge branch 'topic'");
        let mail = composer.compose_commit(&record, &["commits@example.com".to_string()]);

        assert!(mail
            .message
            .contains(&format!("References: <{merge}@git.example.com>")));
        assert!(mail
            .message
            .contains(&format!("In-Reply-To: <{merge}@git.example.com>")));
    }

    #[test]
    fn test_merge_commit_message_id() {
        let config = MailerConfig {
            host_name: "git.example.com".to_string(),
            ..MailerConfig::default()
        };
        let composer = MailComposer { config: &config };
        let mut record = sample_record();
        record.parents.push("e".repeat(40));
        let mail = composer.compose_commit(&record, &["commits@example.com".to_string()]);
        assert!(mail.message.contains(&format!(
            "Message-ID: <merge.{}.{}@git.example.com>",
            record.parents[0], record.revision
        )));
    }

    #[test]
    fn test_multipart_mail_when_html_fits() {
        let config = MailerConfig {
            add_html: true,
            ..MailerConfig::default()
        };
        let composer = MailComposer { config: &config };
        let record = sample_record();
        let mail = composer.compose_commit(&record, &["commits@example.com".to_string()]);

        assert!(mail.message.contains("Content-Type: multipart/alternative;"));
        assert!(mail.message.contains("Content-Type: text/plain; charset=utf-8"));
        assert!(mail.message.contains("Content-Type: text/html; charset=utf-8"));
    }

    #[test]
    fn test_forced_from_address() {
        let config = MailerConfig {
            from: Some("noreply@example.com".to_string()),
            ..MailerConfig::default()
        };
        let composer = MailComposer { config: &config };
        let record = sample_record();
        let mail = composer.compose_commit(&record, &["commits@example.com".to_string()]);
        assert!(mail.message.contains("From: noreply@example.com\n"));
        assert_eq!(mail.envelope_from, "noreply@example.com");
    }

    #[test]
    fn test_from_domain_rewrites_author() {
        let config = MailerConfig {
            from_domain: Some("example.org".to_string()),
            ..MailerConfig::default()
        };
        let composer = MailComposer { config: &config };
        let record = sample_record();
        let mail = composer.compose_commit(&record, &["commits@example.com".to_string()]);
        assert!(mail.message.contains("From: Alice <alice@example.org>\n"));
        assert_eq!(mail.envelope_from, "alice@example.org");
    }

    #[test]
    fn test_sender_becomes_envelope_from() {
        let config = MailerConfig {
            sender: Some("git@example.com".to_string()),
            ..MailerConfig::default()
        };
        let composer = MailComposer { config: &config };
        let record = sample_record();
        let mail = composer.compose_commit(&record, &["commits@example.com".to_string()]);
        assert_eq!(mail.envelope_from, "git@example.com");
        assert!(mail.message.contains("Sender: git@example.com\n"));
    }
}
