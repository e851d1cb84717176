pub mod user_config;

use std::path::PathBuf;
use std::process::Command;

use chrono::{DateTime, Local};

use crate::cli::{BrowserKind, Cli};
use crate::config::user_config::UserConfig;
use crate::error::mailer_error::ConfigSnafu;
use crate::error::{MailerError, Result};

const KILO_SIZE: u64 = 1000;
pub const DEFAULT_MAX_SIZE: &str = "100M";

/// Which repository browser link style to generate, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryBrowser {
    Github,
    GithubWiki,
    Gitlab,
}

/// Mailer configuration, assembled from defaults, the optional user config
/// file and the command line (command line wins).
#[derive(Debug, Clone)]
pub struct MailerConfig {
    pub repository: PathBuf,
    pub to: Vec<String>,
    pub error_to: Vec<String>,
    pub send_per_to: bool,
    pub from: Option<String>,
    pub from_domain: Option<String>,
    pub sender: Option<String>,
    pub add_diff: bool,
    pub add_html: bool,
    pub show_path: bool,
    pub send_push_mail: bool,
    pub max_size: Option<u64>,
    pub max_diff_size: Option<u64>,
    pub repository_uri: Option<String>,
    pub name: Option<String>,
    pub date: Option<DateTime<Local>>,
    pub git_bin_path: String,
    pub track_remote: bool,
    pub sleep_per_mail: Option<f64>,
    /// Host name used in Message-ID headers, resolved once at startup.
    pub host_name: String,
    pub sendmail_path: String,
    pub dry_run: bool,
    pub verbose: bool,
    pub browser: Option<RepositoryBrowser>,
    pub github_base_url: String,
    pub github_user: Option<String>,
    pub github_repository: Option<String>,
    pub gitlab_project_uri: Option<String>,
}

impl MailerConfig {
    /// Merge the user config file and the parsed command line into the final
    /// configuration.
    pub fn resolve(cli: Cli) -> Result<Self> {
        let user = UserConfig::load()?.unwrap_or_default();

        let mut to = user.to.clone();
        to.extend(cli.recipients.iter().cloned());
        to.extend(cli.to.iter().cloned());
        to.retain(|address| !address.is_empty());

        let mut error_to = user.error_to.clone();
        error_to.extend(cli.error_to.iter().cloned());

        let max_size = if cli.no_limit_size {
            None
        } else {
            let raw = cli
                .max_size
                .clone()
                .or_else(|| user.max_size.clone())
                .unwrap_or_else(|| DEFAULT_MAX_SIZE.to_string());
            Some(parse_size(&raw)?)
        };
        let max_diff_size = {
            let raw = cli
                .max_diff_size
                .clone()
                .or_else(|| user.max_diff_size.clone())
                .unwrap_or_else(|| DEFAULT_MAX_SIZE.to_string());
            Some(parse_size(&raw)?)
        };

        let date = match &cli.date {
            Some(raw) => Some(parse_date(raw)?),
            None => None,
        };

        let browser = match (cli.repository_browser, user.repository_browser.as_deref()) {
            (Some(kind), _) => Some(kind.into()),
            (None, Some(raw)) => Some(parse_browser(raw)?),
            (None, None) => None,
        };

        let host_name = cli
            .host_name
            .clone()
            .or_else(|| user.host_name.clone())
            .unwrap_or_else(local_host_name);

        let git_bin_path = std::env::var("GIT_BIN_PATH").unwrap_or(cli.git_bin_path);

        Ok(MailerConfig {
            repository: cli.repository,
            to,
            error_to,
            send_per_to: cli.send_per_to,
            from: cli.from.or(user.from),
            from_domain: cli.from_domain,
            sender: cli.sender.or(user.sender),
            add_diff: !cli.no_diff,
            add_html: cli.add_html || user.add_html.unwrap_or(false),
            show_path: cli.show_path,
            send_push_mail: cli.send_push_mail || user.send_push_mail.unwrap_or(false),
            max_size,
            max_diff_size,
            repository_uri: cli.repository_uri,
            name: cli.name,
            date,
            git_bin_path,
            track_remote: cli.track_remote,
            sleep_per_mail: cli.sleep_per_mail,
            host_name,
            sendmail_path: cli
                .sendmail_path
                .or(user.sendmail_path)
                .unwrap_or_else(|| "/usr/sbin/sendmail".to_string()),
            dry_run: cli.dry_run,
            verbose: cli.verbose,
            browser,
            github_base_url: cli
                .github_base_url
                .or(user.github_base_url)
                .unwrap_or_else(|| "https://github.com".to_string()),
            github_user: cli.github_user.or(user.github_user),
            github_repository: cli.github_repository.or(user.github_repository),
            gitlab_project_uri: cli.gitlab_project_uri.or(user.gitlab_project_uri),
        })
    }

    /// Repository name used in mail subjects: the explicit `--name`, or the
    /// repository directory name with a trailing `.git` stripped (walking up
    /// past a bare `.git` directory).
    pub fn repository_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        let mut path = self.repository.as_path();
        loop {
            match path.file_name().and_then(|n| n.to_str()) {
                Some(".git") | None => match path.parent() {
                    Some(parent) => path = parent,
                    None => return "repository".to_string(),
                },
                Some(name) => {
                    return name.strip_suffix(".git").unwrap_or(name).to_string();
                }
            }
        }
    }
}

impl Default for MailerConfig {
    fn default() -> Self {
        Self {
            repository: PathBuf::from(".git"),
            to: Vec::new(),
            error_to: Vec::new(),
            send_per_to: false,
            from: None,
            from_domain: None,
            sender: None,
            add_diff: true,
            add_html: false,
            show_path: false,
            send_push_mail: false,
            max_size: Some(100_000_000),
            max_diff_size: Some(100_000_000),
            repository_uri: None,
            name: None,
            date: None,
            git_bin_path: "git".to_string(),
            track_remote: false,
            sleep_per_mail: None,
            host_name: "localhost".to_string(),
            sendmail_path: "/usr/sbin/sendmail".to_string(),
            dry_run: false,
            verbose: false,
            browser: None,
            github_base_url: "https://github.com".to_string(),
            github_user: None,
            github_repository: None,
            gitlab_project_uri: None,
        }
    }
}

impl From<BrowserKind> for RepositoryBrowser {
    fn from(kind: BrowserKind) -> Self {
        match kind {
            BrowserKind::Github => RepositoryBrowser::Github,
            BrowserKind::GithubWiki => RepositoryBrowser::GithubWiki,
            BrowserKind::Gitlab => RepositoryBrowser::Gitlab,
        }
    }
}

fn parse_browser(raw: &str) -> Result<RepositoryBrowser> {
    match raw {
        "github" => Ok(RepositoryBrowser::Github),
        "github-wiki" => Ok(RepositoryBrowser::GithubWiki),
        "gitlab" => Ok(RepositoryBrowser::Gitlab),
        _ => ConfigSnafu {
            message: format!("unknown repository browser: {raw}"),
        }
        .fail(),
    }
}

/// Parse a human size like `100M`, `1.5GB` or `2048` into bytes
/// (kilo = 1000).
pub fn parse_size(size: &str) -> Result<u64> {
    let upper = size.trim().to_ascii_uppercase();
    let (number, factor) = if let Some(n) = upper.strip_suffix("GB") {
        (n, KILO_SIZE.pow(3))
    } else if let Some(n) = upper.strip_suffix('G') {
        (n, KILO_SIZE.pow(3))
    } else if let Some(n) = upper.strip_suffix("MB") {
        (n, KILO_SIZE.pow(2))
    } else if let Some(n) = upper.strip_suffix('M') {
        (n, KILO_SIZE.pow(2))
    } else if let Some(n) = upper.strip_suffix("KB") {
        (n, KILO_SIZE)
    } else if let Some(n) = upper.strip_suffix('K') {
        (n, KILO_SIZE)
    } else if let Some(n) = upper.strip_suffix('B') {
        (n, 1)
    } else {
        (upper.as_str(), 1)
    };

    let value: f64 = number.trim().parse().map_err(|_| {
        ConfigSnafu {
            message: format!("invalid size: {size}"),
        }
        .build()
    })?;
    if value < 0.0 {
        return ConfigSnafu {
            message: format!("invalid size: {size}"),
        }
        .fail();
    }
    Ok((value * factor as f64) as u64)
}

/// Human form of a byte count, for truncation markers.
pub fn format_size(size: Option<u64>) -> String {
    let Some(size) = size else {
        return "no limit".to_string();
    };
    if size < KILO_SIZE {
        return format!("{size}B");
    }
    let mut value = size as f64 / KILO_SIZE as f64;
    if value < KILO_SIZE as f64 {
        return format!("{value}KB");
    }
    value /= KILO_SIZE as f64;
    if value < KILO_SIZE as f64 {
        return format!("{value}MB");
    }
    value /= KILO_SIZE as f64;
    format!("{value}GB")
}

fn parse_date(raw: &str) -> Result<DateTime<Local>, MailerError> {
    if let Ok(date) = DateTime::parse_from_rfc2822(raw) {
        return Ok(date.with_timezone(&Local));
    }
    if let Ok(date) = DateTime::parse_from_rfc3339(raw) {
        return Ok(date.with_timezone(&Local));
    }
    ConfigSnafu {
        message: format!("unparseable date (use RFC 2822 or RFC 3339): {raw}"),
    }
    .fail()
}

/// Host name for Message-ID generation, resolved once at startup.
fn local_host_name() -> String {
    Command::new("hostname")
        .output()
        .ok()
        .filter(|output| output.status.success())
        .and_then(|output| String::from_utf8(output.stdout).ok())
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_size_units() {
        assert_eq!(parse_size("512").unwrap(), 512);
        assert_eq!(parse_size("512B").unwrap(), 512);
        assert_eq!(parse_size("2K").unwrap(), 2_000);
        assert_eq!(parse_size("2KB").unwrap(), 2_000);
        assert_eq!(parse_size("100M").unwrap(), 100_000_000);
        assert_eq!(parse_size("1.5M").unwrap(), 1_500_000);
        assert_eq!(parse_size("1g").unwrap(), 1_000_000_000);
    }

    #[test]
    fn test_parse_size_rejects_garbage() {
        assert!(parse_size("lots").is_err());
        assert!(parse_size("-3M").is_err());
    }

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(None), "no limit");
        assert_eq!(format_size(Some(512)), "512B");
        assert_eq!(format_size(Some(2_000)), "2KB");
        assert_eq!(format_size(Some(100_000_000)), "100MB");
        assert_eq!(format_size(Some(1_500_000)), "1.5MB");
    }

    #[test]
    fn test_repository_name() {
        let mut config = MailerConfig {
            repository: PathBuf::from("/srv/git/project.git"),
            ..MailerConfig::default()
        };
        assert_eq!(config.repository_name(), "project");

        config.repository = PathBuf::from("/home/alice/project/.git");
        assert_eq!(config.repository_name(), "project");

        config.name = Some("custom".to_string());
        assert_eq!(config.repository_name(), "custom");
    }

    #[test]
    fn test_parse_date() {
        assert!(parse_date("2024-03-01T12:00:00+09:00").is_ok());
        assert!(parse_date("Fri, 1 Mar 2024 12:00:00 +0900").is_ok());
        assert!(parse_date("yesterday-ish").is_err());
    }
}
