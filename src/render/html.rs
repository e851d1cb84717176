use crate::commit::CommitRecord;
use crate::config::{MailerConfig, RepositoryBrowser};
use crate::diff::{DiffLine, FileChange};
use crate::push::PushInfo;
use crate::render::text::{format_diff_header, TextRenderer};
use crate::render::word_diff::{align_pair, Segment};
use crate::render::{
    commit_file_line_url, commit_file_url, commit_url, format_time, Direction,
};

const DL_STYLE: &str = "margin-left: 2em; line-height: 1.5";
const DT_STYLE: &str = "clear: both; float: left; width: 8em; font-weight: bold";
const DD_STYLE: &str = "margin-left: 8.5em";
const PRE_STYLE: &str = "font-family: Consolas, Menlo, \"Liberation Mono\", Courier, monospace; \
                         line-height: 1.2; padding: 0.5em; width: auto; border: 1px solid #aaa";
const PRE_COLUMN_STYLE: &str =
    "font-family: Consolas, Menlo, \"Liberation Mono\", Courier, monospace; \
     line-height: 1.2; padding: 0.5em; width: auto; white-space: normal; margin: 0; border: 0";
const TABLE_STYLE: &str = "border: 1px solid #aaa; border-collapse: collapse";
const BORDER_STYLE: &str = "border: 1px solid #aaa";

const SPAN_LINE_STYLE: &str = "display: block; white-space: pre";
const SPAN_LINE_ADDED_STYLE: &str =
    "display: block; white-space: pre; background-color: #aaffaa; color: #000000";
const SPAN_LINE_DELETED_STYLE: &str =
    "display: block; white-space: pre; background-color: #ffaaaa; color: #000000";
const SPAN_METADATA_STYLE: &str =
    "display: block; white-space: pre; background-color: #eaf2f5; color: #999999";
const SPAN_CONTEXT_STYLE: &str = "background-color: #ffffaa; color: #000000";
const WORD_ADDED_STYLE: &str = "background-color: #88ff88";
const WORD_DELETED_STYLE: &str = "background-color: #ff8888";

pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(ch),
        }
    }
    out
}

/// HTML mail bodies: a definition list with the commit metadata, then one
/// three-column table per file (from-line numbers, to-line numbers,
/// content).
pub struct HtmlRenderer<'a> {
    pub config: &'a MailerConfig,
}

impl HtmlRenderer<'_> {
    pub fn render_push(&self, info: &PushInfo) -> String {
        let text = TextRenderer {
            config: self.config,
        }
        .render_push(info);
        format!("<pre>{}</pre>\n", escape_html(&text))
    }

    pub fn render_commit(&self, record: &CommitRecord) -> String {
        let mut body = String::from(
            "<!DOCTYPE html>\n<html>\n  <head>\n  </head>\n  <body>\n",
        );

        body.push_str(&format!("    <dl style=\"{DL_STYLE}\">\n"));
        body.push_str(&dt_dd(
            "Author",
            &escape_html(&format!(
                "{} <{}>",
                record.author_name, record.author_email
            )),
        ));
        body.push_str(&dt_dd("Date", &escape_html(&format_time(&record.date))));
        body.push_str(&dt_dd("New Revision", &self.format_revision(record)));

        if !record.merge_sources.is_empty() {
            body.push_str(&format!("      <dt style=\"{DT_STYLE}\">Merge</dt>\n"));
            body.push_str(&format!("      <dd style=\"{DD_STYLE}\">\n        <ul>\n"));
            for source in &record.merge_sources {
                body.push_str(&format!(
                    "          <li>{}</li>\n",
                    escape_html(&source.message())
                ));
            }
            body.push_str("        </ul>\n      </dd>\n");
        }

        body.push_str(&dt_dd("Message", &self.format_message(record)));

        body.push_str(&self.format_file_list(record, "Added", &as_pairs(&record.added_files)));
        body.push_str(&self.format_file_list(record, "Copied", &record.copied_files));
        body.push_str(&self.format_file_list(record, "Removed", &as_pairs(&record.deleted_files)));
        body.push_str(&self.format_file_list(record, "Modified", &as_pairs(&record.updated_files)));
        body.push_str(&self.format_file_list(record, "Renamed", &record.renamed_files));
        body.push_str(&self.format_file_list(
            record,
            "Type Changed",
            &as_pairs(&record.type_changed_files),
        ));
        body.push_str("    </dl>\n");

        if !record.diffs.is_empty() {
            body.push_str("    <div class=\"diff-section\" style=\"clear: both\">\n");
            for change in &record.diffs {
                body.push_str(&self.format_diff_table(record, change));
            }
            body.push_str("    </div>\n");
        }
        if record.diff_truncated {
            body.push_str(&format!(
                "    <p>(diffs were truncated at {})</p>\n",
                crate::config::format_size(self.config.max_diff_size)
            ));
        }

        body.push_str("  </body>\n</html>\n");
        body
    }

    fn format_revision(&self, record: &CommitRecord) -> String {
        let escaped = escape_html(&record.revision);
        match commit_url(self.config, record) {
            Some(url) => format!("<a href=\"{}\">{}</a>", escape_html(&url), escaped),
            None => escaped,
        }
    }

    /// The commit message, with issue references linkified for the github
    /// browser.
    fn format_message(&self, record: &CommitRecord) -> String {
        let escaped = escape_html(record.message.trim_end());
        let linked = match self.config.browser {
            Some(RepositoryBrowser::Github) => self.linkify_issues(&escaped),
            _ => escaped,
        };
        format!("<pre style=\"{PRE_STYLE}\">{linked}</pre>")
    }

    fn linkify_issues(&self, escaped: &str) -> String {
        let (user, repository) = match (&self.config.github_user, &self.config.github_repository)
        {
            (Some(user), Some(repository)) => (user, repository),
            _ => return escaped.to_string(),
        };
        let mut out = String::with_capacity(escaped.len());
        let mut rest = escaped;
        while let Some(pos) = rest.find('#') {
            let (before, after_hash) = rest.split_at(pos);
            out.push_str(before);
            let digits: String = after_hash[1..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if digits.is_empty() {
                out.push('#');
                rest = &after_hash[1..];
            } else {
                out.push_str(&format!(
                    "<a href=\"{}/{}/{}/issues/{}\">#{}</a>",
                    self.config.github_base_url, user, repository, digits, digits
                ));
                rest = &after_hash[1 + digits.len()..];
            }
        }
        out.push_str(rest);
        out
    }

    fn format_file_list(
        &self,
        record: &CommitRecord,
        title: &str,
        files: &[(String, String)],
    ) -> String {
        if files.is_empty() {
            return String::new();
        }
        let mut out = format!("      <dt style=\"{DT_STYLE}\">{title} files</dt>\n");
        out.push_str(&format!("      <dd style=\"{DD_STYLE}\">\n        <ul>\n"));
        for (from, to) in files {
            let linked = match commit_file_url(self.config, record, to) {
                Some(url) => format!(
                    "<a href=\"{}\">{}</a>",
                    escape_html(&url),
                    escape_html(to)
                ),
                None => escape_html(to),
            };
            if from == to {
                out.push_str(&format!("          <li>{linked}</li>\n"));
            } else {
                out.push_str(&format!(
                    "          <li>{}<br>(from {})</li>\n",
                    linked,
                    escape_html(from)
                ));
            }
        }
        out.push_str("        </ul>\n      </dd>\n");
        out
    }

    fn format_diff_table(&self, record: &CommitRecord, change: &FileChange) -> String {
        let header_column = format_header_column(change);
        let (from_column, to_column, content_column) = self.format_body_columns(record, change);

        let mut out = format!("      <table style=\"{TABLE_STYLE}\">\n");
        out.push_str("        <thead>\n");
        out.push_str(&format!(
            "          <tr class=\"diff-header\" style=\"{BORDER_STYLE}\">\n"
        ));
        out.push_str("            <td colspan=\"3\">\n");
        out.push_str(&format!(
            "              <pre style=\"{PRE_COLUMN_STYLE}\">{header_column}</pre>\n"
        ));
        out.push_str("            </td>\n          </tr>\n        </thead>\n");
        out.push_str("        <tbody>\n          <tr>\n");
        out.push_str(&format!(
            "            <th class=\"diff-line-number\" style=\"{BORDER_STYLE}\"><pre style=\"{PRE_COLUMN_STYLE}\">{from_column}</pre></th>\n"
        ));
        out.push_str(&format!(
            "            <th class=\"diff-line-number\" style=\"{BORDER_STYLE}\"><pre style=\"{PRE_COLUMN_STYLE}\">{to_column}</pre></th>\n"
        ));
        out.push_str(&format!(
            "            <td class=\"diff-content\" style=\"{BORDER_STYLE}\"><pre style=\"{PRE_COLUMN_STYLE}\">{content_column}</pre></td>\n"
        ));
        out.push_str("          </tr>\n        </tbody>\n      </table>\n");
        out
    }

    fn format_body_columns(
        &self,
        record: &CommitRecord,
        change: &FileChange,
    ) -> (String, String, String) {
        let mut from_column = String::new();
        let mut to_column = String::new();
        let mut content_column = String::new();
        let content_html = self.content_line_html(change);
        let file_path = change.path();

        for (line, content) in change.lines.iter().zip(content_html) {
            match line {
                DiffLine::HunkHeader {
                    from_line, to_line, ..
                } => {
                    from_column.push_str(&self.hunk_header_number(
                        record, file_path, Direction::From, *from_line,
                    ));
                    to_column.push_str(&self.hunk_header_number(
                        record, file_path, Direction::To, *to_line,
                    ));
                    content_column.push_str(&span(
                        "diff-hunk-header",
                        SPAN_METADATA_STYLE,
                        &content,
                    ));
                }
                DiffLine::Added { to_line, .. } => {
                    from_column.push_str(&span(
                        "diff-line-number-nothing",
                        SPAN_LINE_STYLE,
                        "&nbsp;",
                    ));
                    to_column.push_str(&span(
                        "diff-line-number-added",
                        SPAN_LINE_ADDED_STYLE,
                        &self.line_number(record, file_path, Direction::To, *to_line),
                    ));
                    content_column.push_str(&span("diff-added", SPAN_LINE_ADDED_STYLE, &content));
                }
                DiffLine::Deleted { from_line, .. } => {
                    from_column.push_str(&span(
                        "diff-line-number-deleted",
                        SPAN_LINE_DELETED_STYLE,
                        &self.line_number(record, file_path, Direction::From, *from_line),
                    ));
                    to_column.push_str(&span(
                        "diff-line-number-nothing",
                        SPAN_LINE_STYLE,
                        "&nbsp;",
                    ));
                    content_column.push_str(&span(
                        "diff-deleted",
                        SPAN_LINE_DELETED_STYLE,
                        &content,
                    ));
                }
                DiffLine::Unchanged {
                    from_line, to_line, ..
                } => {
                    from_column.push_str(&span(
                        "diff-line-number-not-changed",
                        SPAN_LINE_STYLE,
                        &self.line_number(record, file_path, Direction::From, *from_line),
                    ));
                    to_column.push_str(&span(
                        "diff-line-number-not-changed",
                        SPAN_LINE_STYLE,
                        &self.line_number(record, file_path, Direction::To, *to_line),
                    ));
                    content_column.push_str(&span(
                        "diff-not-changed",
                        SPAN_LINE_STYLE,
                        &content,
                    ));
                }
            }
            from_column.push('\n');
            to_column.push('\n');
            content_column.push('\n');
        }

        (from_column, to_column, content_column)
    }

    /// Inner HTML for every content cell, with word-level highlighting where
    /// a run of deleted lines is immediately followed by an equal-length run
    /// of added lines. Unpaired runs keep whole-line highlighting.
    fn content_line_html(&self, change: &FileChange) -> Vec<String> {
        let lines = &change.lines;
        let mut html: Vec<Option<String>> = vec![None; lines.len()];

        let mut i = 0;
        while i < lines.len() {
            if !matches!(lines[i], DiffLine::Deleted { .. }) {
                i += 1;
                continue;
            }
            let deleted_start = i;
            while i < lines.len() && matches!(lines[i], DiffLine::Deleted { .. }) {
                i += 1;
            }
            let added_start = i;
            let mut j = i;
            while j < lines.len() && matches!(lines[j], DiffLine::Added { .. }) {
                j += 1;
            }
            if j > added_start && j - added_start == added_start - deleted_start {
                for offset in 0..(added_start - deleted_start) {
                    let old_text = lines[deleted_start + offset].text();
                    let new_text = lines[added_start + offset].text();
                    if let Some((old_segments, new_segments)) =
                        align_pair(&old_text[1..], &new_text[1..])
                    {
                        html[deleted_start + offset] =
                            Some(segments_html("-", &old_segments, "diff-deleted-word", WORD_DELETED_STYLE));
                        html[added_start + offset] =
                            Some(segments_html("+", &new_segments, "diff-added-word", WORD_ADDED_STYLE));
                    }
                }
                i = j;
            }
        }

        lines
            .iter()
            .zip(html)
            .map(|(line, html)| match line {
                DiffLine::HunkHeader { text, .. } => hunk_header_html(text),
                _ => html.unwrap_or_else(|| escape_html(line.text())),
            })
            .collect()
    }

    fn hunk_header_number(
        &self,
        record: &CommitRecord,
        file_path: &str,
        direction: Direction,
        offset: u32,
    ) -> String {
        // The anchor points one line before the hunk start so the context
        // above the change is visible; a non-positive target gets no anchor.
        let content = if offset > 1 {
            match commit_file_line_url(self.config, record, file_path, direction, offset - 1) {
                Some(url) => format!("<a href=\"{}\">...</a>", escape_html(&url)),
                None => "...".to_string(),
            }
        } else {
            "...".to_string()
        };
        span("diff-line-number-hunk-header", SPAN_LINE_STYLE, &content)
    }

    fn line_number(
        &self,
        record: &CommitRecord,
        file_path: &str,
        direction: Direction,
        line_number: u32,
    ) -> String {
        match commit_file_line_url(self.config, record, file_path, direction, line_number) {
            Some(url) => format!("<a href=\"{}\">{}</a>", escape_html(&url), line_number),
            None => line_number.to_string(),
        }
    }
}

fn dt_dd(title: &str, content: &str) -> String {
    format!(
        "      <dt style=\"{DT_STYLE}\">{title}</dt>\n      <dd style=\"{DD_STYLE}\">{content}</dd>\n"
    )
}

fn as_pairs(files: &[String]) -> Vec<(String, String)> {
    files.iter().map(|f| (f.clone(), f.clone())).collect()
}

fn span(class: &str, style: &str, content: &str) -> String {
    format!("<span class=\"{class}\" style=\"{style}\">{content}</span>")
}

/// One paired line with its changed runs wrapped in word-highlight spans.
fn segments_html(marker: &str, segments: &[Segment], class: &str, style: &str) -> String {
    let mut out = String::from(marker);
    for segment in segments {
        match segment {
            Segment::Common(text) => out.push_str(&escape_html(text)),
            Segment::Changed(text) => out.push_str(&span(class, style, &escape_html(text))),
        }
    }
    out
}

/// Header block above each table: the text diff header with the rule line in
/// its own span.
fn format_header_column(change: &FileChange) -> String {
    let mut out = String::new();
    for line in format_diff_header(change).lines() {
        let class = if line.starts_with('=') {
            "diff-header-mark"
        } else {
            "diff-header"
        };
        out.push_str(&span(class, SPAN_METADATA_STYLE, &escape_html(line)));
        out.push('\n');
    }
    out
}

/// `@@ ... @@ context` keeps the hunk info dim and highlights the trailing
/// context function name.
fn hunk_header_html(text: &str) -> String {
    match split_hunk_context(text) {
        Some((info, context)) => format!(
            "{}{}",
            escape_html(info),
            span("diff-context", SPAN_CONTEXT_STYLE, &escape_html(context))
        ),
        None => escape_html(text),
    }
}

fn split_hunk_context(text: &str) -> Option<(&str, &str)> {
    let interior = text.strip_prefix("@@")?;
    let close = interior.find("@@")?;
    let range_ok = interior[..close]
        .chars()
        .all(|c| c.is_ascii_digit() || c.is_whitespace() || matches!(c, '-' | '+' | ','));
    if !range_ok {
        return None;
    }
    let boundary = 2 + close + 2;
    let context = text[boundary..].trim_start();
    if context.is_empty() {
        return None;
    }
    let info_end = text.len() - context.len();
    Some((&text[..info_end], context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::text::tests::sample_record;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html("<a href=\"x\">&'</a>"),
            "&lt;a href=&quot;x&quot;&gt;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_render_commit_structure() {
        let config = MailerConfig::default();
        let renderer = HtmlRenderer { config: &config };
        let record = sample_record();
        let body = renderer.render_commit(&record);

        assert!(body.starts_with("<!DOCTYPE html>"));
        assert!(body.contains(">Author</dt>"));
        assert!(body.contains("Alice &lt;alice@example.com&gt;"));
        assert!(body.contains(">Modified files</dt>"));
        assert!(body.contains("class=\"diff-section\""));
        assert!(body.contains("class=\"diff-line-number\""));
        assert!(body.contains("class=\"diff-content\""));
        assert!(body.ends_with("</html>\n"));
    }

    #[test]
    fn test_word_level_highlight_marks_only_difference() {
        let config = MailerConfig::default();
        let renderer = HtmlRenderer { config: &config };
        let record = sample_record();
        // sample_record diffs "-    let value = 1;" against "+    let value = 2;"
        let body = renderer.render_commit(&record);

        assert!(body.contains(&span(
            "diff-deleted-word",
            WORD_DELETED_STYLE,
            "1"
        )));
        assert!(body.contains(&span("diff-added-word", WORD_ADDED_STYLE, "2")));
        // The shared prefix stays outside the word spans.
        assert!(!body.contains(&span(
            "diff-deleted-word",
            WORD_DELETED_STYLE,
            "    let value = 1;"
        )));
    }

    #[test]
    fn test_unequal_runs_fall_back_to_whole_line() {
        let config = MailerConfig::default();
        let renderer = HtmlRenderer { config: &config };
        let mut record = sample_record();
        let section: Vec<String> = vec![
            "diff --git a/x b/x",
            "index 1111111..2222222 100644",
            "--- a/x",
            "+++ b/x",
            "@@ -1,2 +1,1 @@",
            "-first removed",
            "-second removed",
            "+only addition",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        record.diffs = vec![crate::diff::parse_file_section(&section).unwrap()];
        let body = renderer.render_commit(&record);

        assert!(!body.contains("diff-deleted-word"));
        assert!(!body.contains("diff-added-word"));
        assert!(body.contains("-first removed"));
    }

    #[test]
    fn test_hunk_header_anchor_omitted_for_first_line() {
        let config = MailerConfig {
            browser: Some(crate::config::RepositoryBrowser::Github),
            github_user: Some("example".to_string()),
            github_repository: Some("project".to_string()),
            ..MailerConfig::default()
        };
        let renderer = HtmlRenderer { config: &config };
        let mut record = sample_record();
        let section: Vec<String> = vec![
            "diff --git a/src/lib.rs b/src/lib.rs",
            "index 1111111..2222222 100644",
            "--- a/src/lib.rs",
            "+++ b/src/lib.rs",
            "@@ -1,2 +1,2 @@",
            " context",
            "-old",
            "+new",
        ]
        .into_iter()
        .map(String::from)
        .collect();
        let mut change = crate::diff::parse_file_section(&section).unwrap();
        change.index = Some(0);
        record.diffs = vec![change];
        let body = renderer.render_commit(&record);

        // Hunk starts at line 1: anchor would point at line 0, so none.
        let hunk_cell = span(
            "diff-line-number-hunk-header",
            SPAN_LINE_STYLE,
            "...",
        );
        assert!(body.contains(&hunk_cell));
        // Ordinary line numbers do get anchors.
        assert!(body.contains("#diff-0L1"));
        assert!(body.contains("#diff-0R2"));
    }

    #[test]
    fn test_issue_references_linkified_for_github() {
        let config = MailerConfig {
            browser: Some(crate::config::RepositoryBrowser::Github),
            github_user: Some("example".to_string()),
            github_repository: Some("project".to_string()),
            ..MailerConfig::default()
        };
        let renderer = HtmlRenderer { config: &config };
        let mut record = sample_record();
        record.message = "Fix crash\n\nCloses #42 and #7.\n".to_string();
        let body = renderer.render_commit(&record);
        assert!(body.contains(
            "<a href=\"https://github.com/example/project/issues/42\">#42</a>"
        ));
        assert!(body.contains(
            "<a href=\"https://github.com/example/project/issues/7\">#7</a>"
        ));
    }

    #[test]
    fn test_push_body_is_preformatted_text() {
        let config = MailerConfig::default();
        let renderer = HtmlRenderer { config: &config };
        let record = sample_record();
        let info = PushInfo {
            old_revision: "a".repeat(40),
            new_revision: record.revision.clone(),
            reference: "refs/heads/main".to_string(),
            reference_type: crate::push::ReferenceType::Branch,
            change_type: crate::push::ChangeType::Update,
            log: "Branch (refs/heads/main) is updated.\n".to_string(),
            commits: vec![record.revision.clone()],
            author_name: "Alice".to_string(),
            author_email: "alice@example.com".to_string(),
            date: record.date,
        };
        let body = renderer.render_push(&info);
        assert!(body.starts_with("<pre>"));
        assert!(body.contains("Branch (refs/heads/main) is updated."));
    }
}
