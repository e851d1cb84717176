use crate::commit::CommitRecord;
use crate::config::MailerConfig;
use crate::diff::{ChangeKind, FileChange};
use crate::git::short_revision;
use crate::push::PushInfo;
use crate::render::{commit_url, format_diff_time, format_time};

/// Plain-text mail bodies.
pub struct TextRenderer<'a> {
    pub config: &'a MailerConfig,
}

impl TextRenderer<'_> {
    pub fn render_push(&self, info: &PushInfo) -> String {
        let mut body = format!(
            "{}\t{}\n\nNew Push:\n\n  Message:\n",
            info.author_name,
            format_time(&info.date)
        );
        for line in info.log.trim_end().lines() {
            body.push_str("    ");
            body.push_str(line);
            body.push('\n');
        }
        body.push('\n');
        body
    }

    pub fn render_commit(&self, record: &CommitRecord) -> String {
        let mut body = format!(
            "{}\t{}\n\n\n  New Revision: {}\n",
            record.author_name,
            format_time(&record.date),
            record.revision
        );
        if let Some(url) = commit_url(self.config, record) {
            body.push_str(&format!("  {url}\n"));
        }
        body.push('\n');

        if !record.merge_sources.is_empty() {
            for source in &record.merge_sources {
                body.push_str(&format!("  {}\n", source.message()));
            }
            body.push('\n');
        }

        body.push_str("  Message:\n");
        for line in record.message.trim_end().lines() {
            body.push_str(&format!("    {}\n", line.trim_end()));
        }
        body.push('\n');

        body.push_str(&format_file_list("Added", &record.added_files));
        body.push_str(&format_file_pair_list("Copied", &record.copied_files));
        body.push_str(&format_file_list("Removed", &record.deleted_files));
        body.push_str(&format_file_list("Modified", &record.updated_files));
        body.push_str(&format_file_pair_list("Renamed", &record.renamed_files));
        body.push_str(&format_file_list("Type Changed", &record.type_changed_files));
        body.push('\n');

        let diffs: Vec<String> = record
            .diffs
            .iter()
            .map(|change| self.format_file_diff(record, change))
            .collect();
        body.push_str(&diffs.join("\n"));

        if record.diff_truncated {
            body.push_str(&format!(
                "\n  (diffs were truncated at {})\n",
                crate::config::format_size(self.config.max_diff_size)
            ));
        }

        let trimmed = body.trim_end_matches('\n');
        format!("{trimmed}\n")
    }

    fn format_file_diff(&self, record: &CommitRecord, change: &FileChange) -> String {
        let mut out = format_diff_header(change);
        if self.config.add_diff {
            out.push_str(&content_headers(record, change));
            for line in &change.lines {
                out.push_str(line.text());
                out.push('\n');
            }
        } else {
            out.push_str(&view_command(record, change));
        }
        out
    }
}

/// `  <Kind>: <path> (+A -D)[ mode][ N%]`, the optional mode-change line,
/// and the separator rule.
pub fn format_diff_header(change: &FileChange) -> String {
    let mut header = format!(
        "  {}: {} (+{} -{})",
        change.kind.label(),
        change.to_path,
        change.added_count,
        change.deleted_count
    );
    match change.kind {
        ChangeKind::Added => {
            if let Some(mode) = &change.new_file_mode {
                header.push_str(&format!(" {mode}"));
            }
        }
        ChangeKind::Deleted => {
            if let Some(mode) = &change.deleted_file_mode {
                header.push_str(&format!(" {mode}"));
            }
        }
        _ => {}
    }
    if matches!(change.kind, ChangeKind::Renamed | ChangeKind::Copied) {
        if let Some(similarity) = change.similarity_index {
            header.push_str(&format!(" {similarity}%"));
        }
    }
    header.push('\n');
    if change.is_mode_changed {
        header.push_str(&format!(
            "  Mode: {} -> {}\n",
            change.old_mode.as_deref().unwrap_or(""),
            change.new_mode.as_deref().unwrap_or("")
        ));
    }
    header.push_str(&"=".repeat(67));
    header.push('\n');
    header
}

fn content_headers(record: &CommitRecord, change: &FileChange) -> String {
    if change.is_binary {
        return "(Binary files differ)\n".to_string();
    }
    if change.suppresses_content_headers() {
        return String::new();
    }
    let from = from_header(record, change);
    let to = to_header(record, change);
    match change.kind {
        ChangeKind::Added => format!("--- /dev/null\n{to}"),
        ChangeKind::Deleted => format!("{from}+++ /dev/null\n"),
        _ => format!("{from}{to}"),
    }
}

fn from_header(record: &CommitRecord, change: &FileChange) -> String {
    let date = record
        .parent_date
        .as_ref()
        .map(format_diff_time)
        .unwrap_or_default();
    format!(
        "--- {}    {}{}\n",
        change.from_path,
        date,
        format_blob(change.old_blob.as_deref())
    )
}

fn to_header(record: &CommitRecord, change: &FileChange) -> String {
    format!(
        "+++ {}    {}{}\n",
        change.to_path,
        format_diff_time(&record.date),
        format_blob(change.new_blob.as_deref())
    )
}

fn format_blob(blob: Option<&str>) -> String {
    match blob {
        Some(blob) => format!(" ({blob})"),
        None => String::new(),
    }
}

/// The `% git ...` pointer shown instead of the diff body when diffs are
/// disabled.
fn view_command(record: &CommitRecord, change: &FileChange) -> String {
    let old = record
        .first_parent()
        .map(short_revision)
        .unwrap_or("0000000");
    let new = record.short_revision();
    let command = match change.kind {
        ChangeKind::Added => format!("show {}:{}", new, change.to_path),
        ChangeKind::Deleted => format!("show {}:{}", old, change.to_path),
        ChangeKind::Renamed => format!(
            "diff -C --diff-filter=R {} {} -- {} {}",
            old, new, change.from_path, change.to_path
        ),
        ChangeKind::Copied => format!(
            "diff -C --diff-filter=C {} {} -- {} {}",
            old, new, change.from_path, change.to_path
        ),
        ChangeKind::Modified | ChangeKind::TypeChanged => {
            format!("diff {} {} -- {}", old, new, change.to_path)
        }
    };
    format!("    % git {command}\n")
}

fn format_file_list(title: &str, files: &[String]) -> String {
    if files.is_empty() {
        return String::new();
    }
    let mut out = format!("  {title} files:\n");
    for file in files {
        out.push_str(&format!("    {file}\n"));
    }
    out
}

fn format_file_pair_list(title: &str, files: &[(String, String)]) -> String {
    if files.is_empty() {
        return String::new();
    }
    let mut out = format!("  {title} files:\n");
    for (from, to) in files {
        out.push_str(&format!("    {to}\n      (from {from})\n"));
    }
    out
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::{Local, TimeZone};

    pub(crate) fn sample_record() -> CommitRecord {
        let date = Local.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let parent_date = Local.with_ymd_and_hms(2024, 2, 28, 9, 30, 0).unwrap();
        let section: Vec<String> = vec![
            "diff --git a/src/lib.rs b/src/lib.rs",
            "index 1111111..2222222 100644",
            "--- a/src/lib.rs",
            "+++ b/src/lib.rs",
            "@@ -1,3 +1,3 @@",
            " fn main() {",
            "-    let value = 1;",
            "+    let value = 2;",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        let mut change = crate::diff::parse_file_section(&section).unwrap();
        change.index = Some(0);

        CommitRecord {
            revision: "c7a543db1b4ba2c2193eda1750e354e88015a404".to_string(),
            reference: "refs/heads/main".to_string(),
            parents: vec!["9f2c1d804a1b59d62d1f4ab9a0f54f4a8e1b2c3d".to_string()],
            author_name: "Alice".to_string(),
            author_email: "alice@example.com".to_string(),
            date,
            parent_date: Some(parent_date),
            subject: "Fix off-by-one in counter".to_string(),
            message: "Fix off-by-one in counter\n\nThe loop stopped early.\n".to_string(),
            added_files: Vec::new(),
            copied_files: Vec::new(),
            deleted_files: Vec::new(),
            updated_files: vec!["src/lib.rs".to_string()],
            renamed_files: Vec::new(),
            type_changed_files: Vec::new(),
            files: vec!["src/lib.rs".to_string()],
            diffs: vec![change],
            diff_truncated: false,
            merge_sources: Vec::new(),
        }
    }

    #[test]
    fn test_render_commit_layout() {
        let config = MailerConfig::default();
        let renderer = TextRenderer { config: &config };
        let record = sample_record();
        let body = renderer.render_commit(&record);

        assert!(body.starts_with("Alice\t"));
        assert!(body.contains("  New Revision: c7a543db1b4ba2c2193eda1750e354e88015a404\n"));
        assert!(body.contains("  Message:\n    Fix off-by-one in counter\n"));
        assert!(body.contains("  Modified files:\n    src/lib.rs\n"));
        assert!(body.contains("  Modified: src/lib.rs (+1 -1)\n"));
        assert!(body.contains(&"=".repeat(67)));
        assert!(body.ends_with("\n"));
        assert!(!body.ends_with("\n\n"));
    }

    #[test]
    fn test_diff_body_round_trips() {
        let config = MailerConfig::default();
        let renderer = TextRenderer { config: &config };
        let record = sample_record();
        let body = renderer.render_commit(&record);

        let raw: String = record.diffs[0]
            .lines
            .iter()
            .map(|line| format!("{}\n", line.text()))
            .collect();
        assert!(body.contains(&raw));
    }

    #[test]
    fn test_merge_provenance_block() {
        let config = MailerConfig::default();
        let renderer = TextRenderer { config: &config };
        let mut record = sample_record();
        record.add_merge_source(
            "0123456789abcdef0123456789abcdef01234567",
            "Merge branch 'topic'",
        );
        let body = renderer.render_commit(&record);
        assert!(body.contains("  Merged 0123456: Merge branch 'topic'\n"));
    }

    #[test]
    fn test_no_diff_mode_emits_view_command() {
        let config = MailerConfig {
            add_diff: false,
            ..MailerConfig::default()
        };
        let renderer = TextRenderer { config: &config };
        let record = sample_record();
        let body = renderer.render_commit(&record);
        assert!(body.contains("    % git diff 9f2c1d8 c7a543d -- src/lib.rs\n"));
        assert!(!body.contains("@@ -1,3 +1,3 @@"));
    }

    #[test]
    fn test_render_push_indents_log() {
        let config = MailerConfig::default();
        let renderer = TextRenderer { config: &config };
        let info = PushInfo {
            old_revision: "a".repeat(40),
            new_revision: "b".repeat(40),
            reference: "refs/heads/main".to_string(),
            reference_type: crate::push::ReferenceType::Branch,
            change_type: crate::push::ChangeType::Update,
            log: "Branch (refs/heads/main) is updated.\n\n     via  abcdef0 subject\n"
                .to_string(),
            commits: Vec::new(),
            author_name: "Alice".to_string(),
            author_email: "alice@example.com".to_string(),
            date: Local.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
        };
        let body = renderer.render_push(&info);
        assert!(body.starts_with("Alice\t"));
        assert!(body.contains("\nNew Push:\n\n  Message:\n"));
        assert!(body.contains("    Branch (refs/heads/main) is updated.\n"));
        assert!(body.contains("         via  abcdef0 subject\n"));
    }

    #[test]
    fn test_truncated_diffs_are_reflected() {
        let config = MailerConfig::default();
        let renderer = TextRenderer { config: &config };
        let mut record = sample_record();
        record.diff_truncated = true;
        let body = renderer.render_commit(&record);
        assert!(body.contains("(diffs were truncated at 100MB)"));
    }
}
