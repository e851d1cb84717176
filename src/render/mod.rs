pub mod html;
pub mod text;
pub mod word_diff;

use chrono::{DateTime, Local};

use crate::commit::CommitRecord;
use crate::config::{MailerConfig, RepositoryBrowser};

/// Timestamp format used in mail bodies.
pub fn format_time(time: &DateTime<Local>) -> String {
    time.format("%Y-%m-%d %H:%M:%S %z (%a, %d %b %Y)").to_string()
}

/// Shorter timestamp used in diff content headers.
pub fn format_diff_time(time: &DateTime<Local>) -> String {
    time.format("%Y-%m-%d %H:%M:%S %z").to_string()
}

/// Which side of a diff a line number belongs to, for line anchors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    From,
    To,
}

/// Browser URL of one commit, when a repository browser is configured.
pub fn commit_url(config: &MailerConfig, record: &CommitRecord) -> Option<String> {
    match config.browser {
        Some(RepositoryBrowser::Github) => {
            let user = config.github_user.as_ref()?;
            let repository = config.github_repository.as_ref()?;
            Some(format!(
                "{}/{}/{}/commit/{}",
                config.github_base_url, user, repository, record.revision
            ))
        }
        Some(RepositoryBrowser::GithubWiki) => {
            let file = record
                .updated_files
                .iter()
                .chain(record.added_files.iter())
                .next()?;
            github_wiki_page_url(config, record, file)
        }
        Some(RepositoryBrowser::Gitlab) => {
            let project_uri = config.gitlab_project_uri.as_ref()?;
            Some(format!("{}/commit/{}", project_uri, record.revision))
        }
        None => None,
    }
}

/// Browser URL of one file within a commit, anchored by its stable file
/// index.
pub fn commit_file_url(
    config: &MailerConfig,
    record: &CommitRecord,
    file: &str,
) -> Option<String> {
    match config.browser {
        Some(RepositoryBrowser::Github) => {
            let base = commit_url(config, record)?;
            let index = record.file_index(file)?;
            Some(format!("{base}#diff-{index}"))
        }
        Some(RepositoryBrowser::GithubWiki) => github_wiki_page_url(config, record, file),
        _ => None,
    }
}

/// Browser URL of one line of one file within a commit.
pub fn commit_file_line_url(
    config: &MailerConfig,
    record: &CommitRecord,
    file: &str,
    direction: Direction,
    line_number: u32,
) -> Option<String> {
    if config.browser != Some(RepositoryBrowser::Github) {
        return None;
    }
    let base = commit_url(config, record)?;
    let index = record.file_index(file)?;
    let side = match direction {
        Direction::From => 'L',
        Direction::To => 'R',
    };
    Some(format!("{base}#diff-{index}{side}{line_number}"))
}

fn github_wiki_page_url(
    config: &MailerConfig,
    record: &CommitRecord,
    file: &str,
) -> Option<String> {
    let user = config.github_user.as_ref()?;
    let repository = config.github_repository.as_ref()?;
    let page_name = match file.rfind('.') {
        Some(dot) if dot > 0 => &file[..dot],
        _ => file,
    };
    Some(format!(
        "{}/{}/{}/wiki/{}/{}",
        config.github_base_url,
        user,
        repository,
        url_encode(page_name),
        record.revision
    ))
}

/// Percent-encode everything outside the URL-safe unreserved set.
fn url_encode(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' => {
                out.push(byte as char)
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn github_config() -> MailerConfig {
        MailerConfig {
            browser: Some(RepositoryBrowser::Github),
            github_user: Some("example".to_string()),
            github_repository: Some("project".to_string()),
            ..MailerConfig::default()
        }
    }

    fn record_with_files(files: &[&str]) -> CommitRecord {
        let mut record = crate::render::text::tests::sample_record();
        record.files = files.iter().map(|f| f.to_string()).collect();
        record
    }

    #[test]
    fn test_commit_url_github() {
        let config = github_config();
        let record = record_with_files(&[]);
        let url = commit_url(&config, &record).unwrap();
        assert_eq!(
            url,
            format!(
                "https://github.com/example/project/commit/{}",
                record.revision
            )
        );
    }

    #[test]
    fn test_commit_url_requires_browser() {
        let config = MailerConfig::default();
        let record = record_with_files(&[]);
        assert!(commit_url(&config, &record).is_none());
    }

    #[test]
    fn test_file_and_line_urls_use_stable_index() {
        let config = github_config();
        let record = record_with_files(&["README.md", "src/lib.rs"]);
        let url = commit_file_url(&config, &record, "src/lib.rs").unwrap();
        assert!(url.ends_with("#diff-1"));

        let line_url =
            commit_file_line_url(&config, &record, "src/lib.rs", Direction::To, 12).unwrap();
        assert!(line_url.ends_with("#diff-1R12"));

        let from_url =
            commit_file_line_url(&config, &record, "README.md", Direction::From, 3).unwrap();
        assert!(from_url.ends_with("#diff-0L3"));
    }

    #[test]
    fn test_url_encode() {
        assert_eq!(url_encode("Page Name"), "Page%20Name");
        assert_eq!(url_encode("plain-name_1.2~x"), "plain-name_1.2~x");
    }
}
