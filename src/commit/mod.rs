use chrono::{DateTime, Local};

use crate::diff::{self, FileChange};
use crate::error::diff_error::UnsupportedStatusLineSnafu;
use crate::error::mailer_error::{DiffSnafu, GitSnafu};
use crate::error::{DiffError, Result};
use crate::git::{short_revision, GitOps};
use snafu::ResultExt;

/// A merge commit that pulled this commit in from a side branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeSource {
    pub revision: String,
    pub subject: String,
}

impl MergeSource {
    pub fn message(&self) -> String {
        format!("Merged {}: {}", short_revision(&self.revision), self.subject)
    }
}

/// Everything known about one commit being reported: metadata, the
/// name-status file lists, the parsed per-file diffs, and any merge
/// provenance added later by the topology walk. Identity is the revision
/// hash; the session keeps one record per revision and only ever appends
/// merge sources after creation.
#[derive(Debug, Clone)]
pub struct CommitRecord {
    pub revision: String,
    pub reference: String,
    pub parents: Vec<String>,
    pub author_name: String,
    pub author_email: String,
    pub date: DateTime<Local>,
    pub parent_date: Option<DateTime<Local>>,
    pub subject: String,
    pub message: String,
    pub added_files: Vec<String>,
    pub copied_files: Vec<(String, String)>,
    pub deleted_files: Vec<String>,
    pub updated_files: Vec<String>,
    pub renamed_files: Vec<(String, String)>,
    pub type_changed_files: Vec<String>,
    /// All touched paths in name-status order; positions become the stable
    /// per-file anchor indexes.
    pub files: Vec<String>,
    pub diffs: Vec<FileChange>,
    pub diff_truncated: bool,
    pub merge_sources: Vec<MergeSource>,
}

impl CommitRecord {
    /// Populate a record with the fixed query sequence: one combined
    /// metadata query, one message query, one name-status query, and one
    /// patch query streamed under `max_diff_size`. A parent-date lookup is
    /// added for the diff content headers when the commit has a parent.
    pub fn fetch(
        git: &dyn GitOps,
        reference: &str,
        revision: &str,
        max_diff_size: Option<u64>,
    ) -> Result<Self> {
        let meta = git.commit_meta(revision).context(GitSnafu)?;
        let date = epoch_to_local(meta.author_epoch);
        let parent_date = match git.parent_commit(revision).context(GitSnafu)? {
            Some(parent) => Some(epoch_to_local(
                git.author_epoch(&parent).context(GitSnafu)?,
            )),
            None => None,
        };
        let message = git.commit_message(revision).context(GitSnafu)?;

        let mut record = CommitRecord {
            revision: revision.to_string(),
            reference: reference.to_string(),
            parents: meta.parents,
            author_name: meta.author_name,
            author_email: meta.author_email,
            date,
            parent_date,
            subject: meta.subject,
            message,
            added_files: Vec::new(),
            copied_files: Vec::new(),
            deleted_files: Vec::new(),
            updated_files: Vec::new(),
            renamed_files: Vec::new(),
            type_changed_files: Vec::new(),
            files: Vec::new(),
            diffs: Vec::new(),
            diff_truncated: false,
            merge_sources: Vec::new(),
        };

        let name_status = git.name_status(revision).context(GitSnafu)?;
        record.parse_name_status(&name_status).context(DiffSnafu)?;

        let patch = git
            .commit_patch(revision, max_diff_size)
            .context(GitSnafu)?;
        record.diff_truncated = patch.truncated;
        for section in split_patch_sections(patch.lines) {
            let mut change = diff::parse_file_section(&section).context(DiffSnafu)?;
            change.index = record.files.iter().position(|f| f == change.path());
            record.diffs.push(change);
        }

        Ok(record)
    }

    pub fn first_parent(&self) -> Option<&str> {
        self.parents.first().map(String::as_str)
    }

    pub fn other_parents(&self) -> &[String] {
        if self.parents.len() > 1 {
            &self.parents[1..]
        } else {
            &[]
        }
    }

    pub fn is_merge(&self) -> bool {
        self.parents.len() >= 2
    }

    pub fn short_revision(&self) -> &str {
        short_revision(&self.revision)
    }

    pub fn file_index(&self, path: &str) -> Option<usize> {
        self.files.iter().position(|f| f == path)
    }

    /// Top-level path components touched by the diffs, for subject lines.
    pub fn affected_paths(&self) -> Vec<String> {
        let mut paths = Vec::new();
        for change in &self.diffs {
            let top = change.path().split('/').next().unwrap_or_default();
            if !top.is_empty() && !paths.iter().any(|p| p == top) {
                paths.push(top.to_string());
            }
        }
        paths
    }

    /// Append merge provenance, once per merge commit. Returns whether the
    /// source was new, so repeated walks stay idempotent.
    pub fn add_merge_source(&mut self, revision: &str, subject: &str) -> bool {
        if self.merge_sources.iter().any(|s| s.revision == revision) {
            return false;
        }
        self.merge_sources.push(MergeSource {
            revision: revision.to_string(),
            subject: subject.to_string(),
        });
        true
    }

    fn parse_name_status(&mut self, text: &str) -> Result<(), DiffError> {
        for line in text.lines() {
            let line = line.trim_end();
            if line.is_empty() {
                continue;
            }
            let fields: Vec<&str> = line.split('\t').collect();
            match fields.as_slice() {
                [status, path] => {
                    let path = diff::unescape_path(path);
                    match status.chars().next() {
                        Some('A') => self.added_files.push(path.clone()),
                        Some('M') => self.updated_files.push(path.clone()),
                        Some('D') => self.deleted_files.push(path.clone()),
                        Some('T') => self.type_changed_files.push(path.clone()),
                        _ => return Err(UnsupportedStatusLineSnafu { line }.build()),
                    }
                    self.files.push(path);
                }
                [status, from, to] => {
                    let from = diff::unescape_path(from);
                    let to = diff::unescape_path(to);
                    match status.chars().next() {
                        Some('R') => self.renamed_files.push((from, to.clone())),
                        Some('C') => self.copied_files.push((from, to.clone())),
                        _ => return Err(UnsupportedStatusLineSnafu { line }.build()),
                    }
                    self.files.push(to);
                }
                _ => return Err(UnsupportedStatusLineSnafu { line }.build()),
            }
        }
        Ok(())
    }
}

fn epoch_to_local(epoch: i64) -> DateTime<Local> {
    DateTime::from_timestamp(epoch, 0)
        .unwrap_or(DateTime::UNIX_EPOCH)
        .with_timezone(&Local)
}

/// Split patch lines into per-file sections on `diff --git` boundaries.
/// Anything before the first header (normally just the blank line the empty
/// pretty format leaves behind) is dropped.
fn split_patch_sections(lines: Vec<String>) -> Vec<Vec<String>> {
    let mut sections: Vec<Vec<String>> = Vec::new();
    for line in lines {
        if line.starts_with("diff --git") {
            sections.push(vec![line]);
        } else if let Some(current) = sections.last_mut() {
            current.push(line);
        }
    }
    sections
}
