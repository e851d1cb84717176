use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Post-receive hook mailer: reads `old-revision new-revision reference`
/// lines from standard input and mails a push summary plus one message per
/// new commit.
#[derive(Debug, Parser)]
#[command(
    name = "git-commit-mailer",
    version,
    about = "Mail git push and commit notifications from a post-receive hook"
)]
pub struct Cli {
    /// Recipient addresses
    #[arg(value_name = "TO")]
    pub recipients: Vec<String>,

    /// Use PATH as the target git repository
    #[arg(long, value_name = "PATH", default_value = ".git")]
    pub repository: PathBuf,

    /// Generate commit links for this repository browser
    #[arg(long, value_enum, value_name = "SOFTWARE")]
    pub repository_browser: Option<BrowserKind>,

    /// Base URL of GitHub
    #[arg(long, value_name = "URL")]
    pub github_base_url: Option<String>,

    /// GitHub user owning the repository
    #[arg(long, value_name = "USER")]
    pub github_user: Option<String>,

    /// GitHub repository name
    #[arg(long, value_name = "REPOSITORY")]
    pub github_repository: Option<String>,

    /// GitLab project URI
    #[arg(long, value_name = "URI")]
    pub gitlab_project_uri: Option<String>,

    /// Add TO to the To: addresses
    #[arg(short = 't', long = "to", value_name = "TO")]
    pub to: Vec<String>,

    /// Send one mail per To: address instead of one mail for all of them
    #[arg(long)]
    pub send_per_to: bool,

    /// Add TO to the To: addresses of failure reports
    #[arg(short = 'e', long = "error-to", value_name = "TO")]
    pub error_to: Vec<String>,

    /// Use FROM as the from address
    #[arg(short = 'f', long, value_name = "FROM", conflicts_with = "from_domain")]
    pub from: Option<String>,

    /// Use author@DOMAIN as the from address
    #[arg(long, value_name = "DOMAIN")]
    pub from_domain: Option<String>,

    /// Use SENDER as the envelope sender address
    #[arg(long, value_name = "SENDER")]
    pub sender: Option<String>,

    /// Don't add diffs to commit mails, only a git command to view them
    #[arg(short = 'n', long = "no-diff")]
    pub no_diff: bool,

    /// Add an HTML alternative to mail bodies
    #[arg(long)]
    pub add_html: bool,

    /// Limit mail body size (B/K/KB/M/MB/G/GB units)
    #[arg(long, value_name = "SIZE")]
    pub max_size: Option<String>,

    /// Don't limit mail body size
    #[arg(long)]
    pub no_limit_size: bool,

    /// Limit diff size per commit (B/K/KB/M/MB/G/GB units)
    #[arg(long, value_name = "SIZE")]
    pub max_diff_size: Option<String>,

    /// Use NAME as the repository name in subjects
    #[arg(long, value_name = "NAME")]
    pub name: Option<String>,

    /// Show affected paths in commit mail subjects
    #[arg(long)]
    pub show_path: bool,

    /// Send the push summary mail as well as per-commit mails
    #[arg(long)]
    pub send_push_mail: bool,

    /// Public URI of the repository
    #[arg(long, value_name = "URI")]
    pub repository_uri: Option<String>,

    /// Use DATE for push mail Date: headers (RFC 2822 or RFC 3339)
    #[arg(long, value_name = "DATE")]
    pub date: Option<String>,

    /// Use GIT instead of "git" (the GIT_BIN_PATH environment variable
    /// overrides both)
    #[arg(long, value_name = "GIT", default_value = "git")]
    pub git_bin_path: String,

    /// Fetch new commits from the repository's origin and mail them
    #[arg(long)]
    pub track_remote: bool,

    /// Sleep SECONDS after each mail sent
    #[arg(long, value_name = "SECONDS")]
    pub sleep_per_mail: Option<f64>,

    /// Host name used in Message-ID headers
    #[arg(long, value_name = "HOST")]
    pub host_name: Option<String>,

    /// Sendmail-compatible command used for delivery
    #[arg(long, value_name = "COMMAND")]
    pub sendmail_path: Option<String>,

    /// Print mails to standard output instead of sending them
    #[arg(long)]
    pub dry_run: bool,

    /// Be verbose
    #[arg(long)]
    pub verbose: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BrowserKind {
    Github,
    #[value(name = "github-wiki")]
    GithubWiki,
    Gitlab,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_recipients_and_flags() {
        let cli = Cli::parse_from([
            "git-commit-mailer",
            "--repository=/srv/git/project.git",
            "--send-push-mail",
            "--max-diff-size=1M",
            "-t",
            "extra@example.com",
            "commits@example.com",
        ]);
        assert_eq!(cli.recipients, vec!["commits@example.com"]);
        assert_eq!(cli.to, vec!["extra@example.com"]);
        assert!(cli.send_push_mail);
        assert_eq!(cli.max_diff_size.as_deref(), Some("1M"));
        assert_eq!(cli.repository, PathBuf::from("/srv/git/project.git"));
    }

    #[test]
    fn test_from_conflicts_with_from_domain() {
        let result = Cli::try_parse_from([
            "git-commit-mailer",
            "--from=a@example.com",
            "--from-domain=example.com",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_browser_kind_values() {
        let cli = Cli::parse_from(["git-commit-mailer", "--repository-browser=github-wiki"]);
        assert_eq!(cli.repository_browser, Some(BrowserKind::GithubWiki));
    }
}
