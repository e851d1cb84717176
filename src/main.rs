use std::io::BufRead;

use clap::Parser;

use commit_mailer::cli::Cli;
use commit_mailer::config::MailerConfig;
use commit_mailer::error::Result;
use commit_mailer::git::CliOps;
use commit_mailer::mail::{MailComposer, MailTransport, SendmailTransport, StdoutTransport};
use commit_mailer::push::{parse_receive_line, RevisionRange};
use commit_mailer::remote;
use commit_mailer::session::PushSession;

fn main() {
    let cli = Cli::parse();
    if cli.verbose {
        tracing_subscriber::fmt()
            .with_max_level(tracing::Level::DEBUG)
            .init();
    } else {
        tracing_subscriber::fmt::init();
    }

    if let Err(e) = run(cli) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = MailerConfig::resolve(cli)?;
    let git = CliOps::new(config.repository.clone()).with_git_bin(config.git_bin_path.clone());
    let transport: Box<dyn MailTransport> = if config.dry_run {
        Box::new(StdoutTransport)
    } else {
        Box::new(SendmailTransport {
            sendmail_path: config.sendmail_path.clone(),
        })
    };

    let ranges = if config.track_remote {
        remote::fetch_updated_references(&git)?
    } else {
        read_receive_lines()
    };

    let session = PushSession::new(&config, &git);
    for range in &ranges {
        if let Err(error) = process_range(&session, &config, transport.as_ref(), range) {
            report_failure(&config, transport.as_ref(), range, &error);
            return Err(error);
        }
    }
    Ok(())
}

/// Post-receive protocol: one `old new ref` triple per stdin line.
fn read_receive_lines() -> Vec<RevisionRange> {
    let stdin = std::io::stdin();
    let mut ranges = Vec::new();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(line) => line,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        match parse_receive_line(&line) {
            Some(range) => ranges.push(range),
            None => tracing::warn!("ignoring malformed input line: {line}"),
        }
    }
    ranges
}

fn process_range(
    session: &PushSession,
    config: &MailerConfig,
    transport: &dyn MailTransport,
    range: &RevisionRange,
) -> Result<()> {
    let Some(mails) = session.process(range)? else {
        return Ok(());
    };

    if config.send_push_mail {
        for mail in &mails.push_mails {
            deliver(config, transport, mail)?;
        }
    }
    for mail in &mails.commit_mails {
        deliver(config, transport, mail)?;
    }
    Ok(())
}

fn deliver(
    config: &MailerConfig,
    transport: &dyn MailTransport,
    mail: &commit_mailer::mail::ComposedMail,
) -> Result<()> {
    transport.deliver(mail)?;
    if let Some(seconds) = config.sleep_per_mail {
        if seconds > 0.0 {
            std::thread::sleep(std::time::Duration::from_secs_f64(seconds));
        }
    }
    Ok(())
}

/// Best-effort failure report to the --error-to addresses.
fn report_failure(
    config: &MailerConfig,
    transport: &dyn MailTransport,
    range: &RevisionRange,
    error: &commit_mailer::error::MailerError,
) {
    tracing::warn!("failed to process {}: {error}", range.reference);
    if config.error_to.is_empty() {
        return;
    }
    let composer = MailComposer { config };
    let mail = composer.compose_error(&range.reference, &error.to_string(), &config.error_to);
    if let Err(report_error) = transport.deliver(&mail) {
        tracing::warn!("failed to deliver the failure report: {report_error}");
    }
}
