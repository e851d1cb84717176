pub mod cli_ops;

pub use cli_ops::CliOps;

use std::collections::BTreeMap;

use crate::error::GitError;

/// The all-zero revision git uses for "this reference did not exist".
pub const NULL_REVISION: &str = "0000000000000000000000000000000000000000";

pub fn is_null_revision(revision: &str) -> bool {
    !revision.is_empty() && revision.bytes().all(|b| b == b'0')
}

/// Abbreviated form of a revision hash, as shown in message bodies.
pub fn short_revision(revision: &str) -> &str {
    &revision[..revision.len().min(7)]
}

/// Commit metadata fetched in one query.
#[derive(Debug, Clone)]
pub struct CommitMeta {
    pub author_name: String,
    pub author_email: String,
    pub author_epoch: i64,
    pub subject: String,
    pub parents: Vec<String>,
}

/// Patch text read line by line under a byte ceiling. Lines that are not
/// valid UTF-8 are replaced with a placeholder so one binary-ish line cannot
/// abort the rest of the diff.
#[derive(Debug, Clone)]
pub struct PatchText {
    pub lines: Vec<String>,
    pub truncated: bool,
}

/// Abstraction over git queries issued while processing one push. CliOps
/// shells out to the `git` binary against a bare or non-bare repository.
pub trait GitOps {
    /// Resolve a revision specifier to a full hash.
    fn rev_parse(&self, spec: &str) -> Result<String, GitError>;

    /// `cat-file -t`: the object type ("commit", "tag", ...).
    fn object_type(&self, object: &str) -> Result<String, GitError>;

    /// `rev-list` with arbitrary specifiers, newest first.
    fn rev_list(&self, args: &[String]) -> Result<Vec<String>, GitError>;

    /// Nearest common ancestor of two revisions.
    fn merge_base(&self, a: &str, b: &str) -> Result<String, GitError>;

    /// First parent of a revision; None for a root commit.
    fn parent_commit(&self, revision: &str) -> Result<Option<String>, GitError>;

    /// Author, date, subject and parent list in one query.
    fn commit_meta(&self, revision: &str) -> Result<CommitMeta, GitError>;

    /// Author date as epoch seconds.
    fn author_epoch(&self, revision: &str) -> Result<i64, GitError>;

    /// Subject line only.
    fn subject(&self, revision: &str) -> Result<String, GitError>;

    /// Full commit message (subject, blank line, body).
    fn commit_message(&self, revision: &str) -> Result<String, GitError>;

    /// Raw `--name-status` output (with rename/copy detection) for one commit.
    fn name_status(&self, revision: &str) -> Result<String, GitError>;

    /// Patch for one commit (with rename/copy detection), consumed
    /// incrementally so `max_bytes` can stop the read mid-stream.
    fn commit_patch(&self, revision: &str, max_bytes: Option<u64>)
        -> Result<PatchText, GitError>;

    /// `rev-parse --not --branches --remotes`: exclusion specifiers for every
    /// existing branch and remote tip.
    fn not_reachable_args(&self) -> Result<Vec<String>, GitError>;

    /// `show -s --pretty=oneline`.
    fn show_oneline(&self, revision: &str) -> Result<String, GitError>;

    /// `show --no-color --root -s --pretty=short`.
    fn show_short(&self, revision: &str) -> Result<String, GitError>;

    /// Condensed per-author log for a revision specifier.
    fn short_log(&self, revision_specifier: &str) -> Result<String, GitError>;

    /// Nearest tag reachable from a revision, if any.
    fn previous_tag(&self, revision: &str) -> Result<Option<String>, GitError>;

    /// One `for-each-ref` format field for a reference.
    fn ref_field(&self, reference: &str, field: &str) -> Result<String, GitError>;

    /// Raw tag object content (`cat-file tag`).
    fn tag_object(&self, revision: &str) -> Result<String, GitError>;

    /// Object size in bytes (`cat-file -s`).
    fn object_size(&self, object: &str) -> Result<u64, GitError>;

    /// Tips of all tags plus `origin` remote-tracking branches.
    fn remote_reference_tips(&self) -> Result<BTreeMap<String, String>, GitError>;

    /// Drop local tags and re-fetch everything from the default remote.
    fn refresh_remote(&self) -> Result<(), GitError>;
}
