pub mod walker;

use chrono::{DateTime, Local};

use crate::error::mailer_error::{GitSnafu, InvalidRevisionRangeSnafu, UnknownReferenceUpdateSnafu};
use crate::error::Result;
use crate::git::{is_null_revision, short_revision, GitOps};
use snafu::ResultExt;

/// One reference update delivered to the post-receive hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevisionRange {
    pub old_revision: String,
    pub new_revision: String,
    pub reference: String,
}

/// Parse one `old-sha new-sha refname` line from post-receive stdin.
pub fn parse_receive_line(line: &str) -> Option<RevisionRange> {
    let mut parts = line.split_whitespace();
    let old_revision = parts.next()?.to_string();
    let new_revision = parts.next()?.to_string();
    let reference = parts.next()?.to_string();
    Some(RevisionRange {
        old_revision,
        new_revision,
        reference,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeType {
    Create,
    Update,
    Delete,
}

impl ChangeType {
    pub fn verbed(&self) -> &'static str {
        match self {
            ChangeType::Create => "created",
            ChangeType::Update => "updated",
            ChangeType::Delete => "deleted",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferenceType {
    Branch,
    AnnotatedTag,
    UnannotatedTag,
}

impl ReferenceType {
    pub fn label(&self) -> &'static str {
        match self {
            ReferenceType::Branch => "branch",
            ReferenceType::AnnotatedTag => "annotated tag",
            ReferenceType::UnannotatedTag => "unannotated tag",
        }
    }
}

/// Everything the push-level mail needs: the headline message, the ordered
/// list of revisions that get their own commit mail (oldest first), and the
/// fast-forward flag for branch updates.
#[derive(Debug, Clone)]
pub struct PushSummary {
    pub change_type: ChangeType,
    pub reference_type: ReferenceType,
    pub message: String,
    pub commits: Vec<String>,
    pub fast_forward: bool,
}

/// Push-level metadata handed to the renderers and mail composer.
#[derive(Debug, Clone)]
pub struct PushInfo {
    pub old_revision: String,
    pub new_revision: String,
    pub reference: String,
    pub reference_type: ReferenceType,
    pub change_type: ChangeType,
    pub log: String,
    pub commits: Vec<String>,
    pub author_name: String,
    pub author_email: String,
    pub date: DateTime<Local>,
}

impl PushInfo {
    /// Revision used for author and subject lookups. The new revision wins
    /// unless the push deleted the reference, in which case only the old
    /// revision still names an object (see DESIGN.md on this asymmetry).
    pub fn revision(&self) -> &str {
        if !is_null_revision(&self.new_revision) {
            &self.new_revision
        } else {
            &self.old_revision
        }
    }

    pub fn short_revision(&self) -> &str {
        short_revision(self.revision())
    }

    pub fn message_id(&self, host_name: &str) -> String {
        format!(
            "<push.{}.{}@{}>",
            self.old_revision, self.new_revision, host_name
        )
    }

    pub fn branch_changed(&self) -> bool {
        !self.commits.is_empty()
    }

    pub fn subject(&self) -> String {
        format!(
            "(push) {} ({}) is {}.",
            self.reference_type.label(),
            short_reference(&self.reference),
            self.change_type.verbed()
        )
    }
}

/// Last path component of a fully qualified reference name
/// (`refs/heads/main` -> `main`).
pub fn short_reference(reference: &str) -> &str {
    if reference.matches('/').count() >= 2 {
        reference.rsplit('/').next().unwrap_or(reference)
    } else {
        reference
    }
}

pub fn detect_change_type(
    old_revision: &str,
    new_revision: &str,
    reference: &str,
) -> Result<ChangeType> {
    match (is_null_revision(old_revision), is_null_revision(new_revision)) {
        (true, true) => InvalidRevisionRangeSnafu { reference }.fail(),
        (false, false) => Ok(ChangeType::Update),
        (true, false) => Ok(ChangeType::Create),
        (false, true) => Ok(ChangeType::Delete),
    }
}

/// Resolve the reference type from the reference name pattern and the git
/// object type of the relevant endpoint. `None` means a tracking-branch
/// update that gets no email at all.
pub fn detect_reference_type(
    reference: &str,
    revision_type: &str,
) -> Result<Option<ReferenceType>> {
    let is_tag = reference.starts_with("refs/tags/");
    if is_tag && revision_type == "commit" {
        return Ok(Some(ReferenceType::UnannotatedTag));
    }
    if is_tag && revision_type == "tag" {
        return Ok(Some(ReferenceType::AnnotatedTag));
    }
    if revision_type == "commit"
        && (reference.starts_with("refs/heads/") || reference.starts_with("refs/remotes/origin/"))
    {
        return Ok(Some(ReferenceType::Branch));
    }
    if revision_type == "commit" && reference.starts_with("refs/remotes/") {
        // Push update of a non-origin tracking branch: deliberately silent.
        return Ok(None);
    }
    UnknownReferenceUpdateSnafu {
        reference,
        revision_type,
    }
    .fail()
}

/// Classifies one reference update and builds the push summary message.
/// Owns the per-push excluded-revisions memo (revisions already reachable
/// from other refs), computed once and reused by every pass that needs it.
pub struct PushClassifier<'a> {
    git: &'a dyn GitOps,
    old_revision: &'a str,
    new_revision: &'a str,
    reference: &'a str,
    excluded: Option<Vec<String>>,
}

impl<'a> PushClassifier<'a> {
    pub fn new(
        git: &'a dyn GitOps,
        old_revision: &'a str,
        new_revision: &'a str,
        reference: &'a str,
    ) -> Self {
        Self {
            git,
            old_revision,
            new_revision,
            reference,
            excluded: None,
        }
    }

    /// Classify and build the push summary; `None` means the update is
    /// suppressed (no email).
    pub fn summarize(&mut self) -> Result<Option<PushSummary>> {
        let change_type =
            detect_change_type(self.old_revision, self.new_revision, self.reference)?;
        let revision_type = match change_type {
            ChangeType::Create | ChangeType::Update => {
                self.git.object_type(self.new_revision).context(GitSnafu)?
            }
            ChangeType::Delete => self.git.object_type(self.old_revision).context(GitSnafu)?,
        };
        let reference_type = match detect_reference_type(self.reference, &revision_type)? {
            Some(reference_type) => reference_type,
            None => return Ok(None),
        };

        let (message, commits, fast_forward) = match (change_type, reference_type) {
            (ChangeType::Create, ReferenceType::Branch) => self.create_branch()?,
            (ChangeType::Update, ReferenceType::Branch) => self.update_branch()?,
            (ChangeType::Delete, ReferenceType::Branch) => (self.delete_branch()?, vec![], false),
            (ChangeType::Create, ReferenceType::AnnotatedTag) => {
                (self.create_annotated_tag()?, vec![], false)
            }
            (ChangeType::Update, ReferenceType::AnnotatedTag) => {
                (self.update_annotated_tag()?, vec![], false)
            }
            (ChangeType::Delete, ReferenceType::AnnotatedTag) => {
                (self.delete_annotated_tag()?, vec![], false)
            }
            (ChangeType::Create, ReferenceType::UnannotatedTag) => {
                (self.create_unannotated_tag()?, vec![], false)
            }
            (ChangeType::Update, ReferenceType::UnannotatedTag) => {
                (self.update_unannotated_tag()?, vec![], false)
            }
            (ChangeType::Delete, ReferenceType::UnannotatedTag) => {
                (self.delete_unannotated_tag()?, vec![], false)
            }
        };

        Ok(Some(PushSummary {
            change_type,
            reference_type,
            message,
            commits,
            fast_forward,
        }))
    }

    /// Exclusion specifiers for revisions already reachable from any other
    /// branch or remote tip, minus the tip of the reference being pushed.
    fn excluded_revisions(&mut self) -> Result<Vec<String>> {
        if self.excluded.is_none() {
            let current = self.git.rev_parse(self.reference).context(GitSnafu)?;
            let excluded: Vec<String> = self
                .git
                .not_reachable_args()
                .context(GitSnafu)?
                .into_iter()
                .filter(|line| !line.contains(&current))
                .collect();
            self.excluded = Some(excluded);
        }
        Ok(self.excluded.clone().unwrap_or_default())
    }

    fn subject_of(&self, revision: &str) -> Result<String> {
        self.git.subject(revision).context(GitSnafu)
    }

    fn create_branch(&mut self) -> Result<(String, Vec<String>, bool)> {
        let mut message = format!("Branch ({}) is created.\n", self.reference);
        let mut commits = Vec::new();
        let mut commit_list = Vec::new();

        let mut args = vec![self.new_revision.to_string()];
        args.extend(self.excluded_revisions()?);
        for revision in self.git.rev_list(&args).context(GitSnafu)?.iter().rev() {
            commits.push(revision.clone());
            let subject = self.subject_of(revision)?;
            commit_list.push(format!(
                "     via  {} {}\n",
                short_revision(revision),
                subject
            ));
        }
        if let Some(last) = commit_list.last_mut() {
            *last = last.replacen("     via  ", "     at   ", 1);
        }
        message.push_str(&commit_list.concat());

        Ok((message, commits, false))
    }

    fn update_branch(&mut self) -> Result<(String, Vec<String>, bool)> {
        let mut message = format!("Branch ({}) is updated.\n", self.reference);

        // Backward pass: revisions the update discarded. Empty means the old
        // tip is an ancestor of the new tip, a fast-forward.
        let discards = self
            .git
            .rev_list(&[format!("{}..{}", self.new_revision, self.old_revision)])
            .context(GitSnafu)?;
        let fast_forward = discards.is_empty();

        let mut commits_summary = Vec::new();
        for revision in &discards {
            commits_summary.push(format!(
                "discards  {} {}\n",
                short_revision(revision),
                self.subject_of(revision)?
            ));
        }
        if fast_forward {
            commits_summary.push(format!(
                "    from  {} {}\n",
                short_revision(self.old_revision),
                self.subject_of(self.old_revision)?
            ));
        }

        // Forward pass, reversed to chronological order.
        let forward = self
            .git
            .rev_list(&[format!("{}..{}", self.old_revision, self.new_revision)])
            .context(GitSnafu)?;
        for revision in forward.iter().rev() {
            commits_summary.push(format!(
                "     via  {} {}\n",
                short_revision(revision),
                self.subject_of(revision)?
            ));
        }

        let mut rewind_only = false;
        if !fast_forward {
            let base = self
                .git
                .merge_base(self.old_revision, self.new_revision)
                .context(GitSnafu)?;
            if base == self.new_revision {
                message.push_str(&self.explain_rewind());
                rewind_only = true;
            } else {
                message.push_str(&self.explain_rewind_and_new_commits());
            }
        }

        message.push('\n');
        message.push_str(&commits_summary.concat());

        let new_commits = if rewind_only {
            Vec::new()
        } else {
            self.collect_new_commits()?
        };
        if rewind_only || new_commits.is_empty() {
            message.push_str("\nNo new revisions were added by this update.\n");
        }

        Ok((message, new_commits, fast_forward))
    }

    fn explain_rewind(&self) -> String {
        format!(
            "This update discarded existing revisions and left the branch pointing at
a previous point in the repository history.

 * -- * -- N ({})
            \\
             O <- O <- O ({})

The removed revisions are not necessarilly gone - if another reference
still refers to them they will stay in the repository.
",
            short_revision(self.new_revision),
            short_revision(self.old_revision)
        )
    }

    fn explain_rewind_and_new_commits(&self) -> String {
        format!(
            "This update added new revisions after undoing existing revisions.  That is
to say, the old revision is not a strict subset of the new revision.  This
situation occurs when you --force push a change and generate a repository
containing something like this:

 * -- * -- B <- O <- O <- O ({})
            \\
             N -> N -> N ({})

When this happens we assume that you've already had alert emails for all
of the O revisions, and so we here report only the revisions in the N
branch from the common base, B.
",
            short_revision(self.old_revision),
            short_revision(self.new_revision)
        )
    }

    /// Revisions introduced by this update that are not reachable from any
    /// other ref, oldest first. These are the ones that get commit mail.
    fn collect_new_commits(&mut self) -> Result<Vec<String>> {
        let mut args = vec![format!("{}..{}", self.old_revision, self.new_revision)];
        args.extend(self.excluded_revisions()?);
        let mut commits = self.git.rev_list(&args).context(GitSnafu)?;
        commits.reverse();
        Ok(commits)
    }

    fn delete_branch(&self) -> Result<String> {
        Ok(format!(
            "Branch ({}) is deleted.\n       was  {}\n\n{}",
            self.reference,
            self.old_revision,
            self.git.show_oneline(self.old_revision).context(GitSnafu)?
        ))
    }

    fn create_annotated_tag(&self) -> Result<String> {
        Ok(format!(
            "Annotated tag ({}) is created.\n        at  {} (tag)\n{}",
            self.reference,
            self.new_revision,
            self.annotated_tag_summary()?
        ))
    }

    fn update_annotated_tag(&self) -> Result<String> {
        Ok(format!(
            "Annotated tag ({}) is updated.\n        to  {} (tag)\n      from  {} (which is now obsolete)\n{}",
            self.reference,
            self.new_revision,
            self.old_revision,
            self.annotated_tag_summary()?
        ))
    }

    fn delete_annotated_tag(&self) -> Result<String> {
        let shown = self.git.show_oneline(self.old_revision).context(GitSnafu)?;
        Ok(format!(
            "Annotated tag ({}) is deleted.\n       was  {}\n\n{}",
            self.reference,
            self.old_revision,
            strip_tagger_lines(&shown)
        ))
    }

    /// Tagging target, tagger, tag message and (for release-style tags on
    /// commits) a condensed shortlog since the previous tag.
    fn annotated_tag_summary(&self) -> Result<String> {
        let tag_object = self
            .git
            .ref_field(self.reference, "*objectname")
            .context(GitSnafu)?;
        let tag_type = self
            .git
            .ref_field(self.reference, "*objecttype")
            .context(GitSnafu)?;

        let mut message = format!("   tagging  {tag_object} ({tag_type})\n");
        if tag_type == "commit" {
            // A tag on a commit is assumed to be a release: name the tag it
            // replaces and summarize the changes since then. A missing
            // previous tag is not an error.
            let previous = match self.git.parent_commit(self.new_revision).context(GitSnafu)? {
                Some(parent) => self.git.previous_tag(&parent).context(GitSnafu)?,
                None => None,
            };
            if let Some(previous_tag) = &previous {
                message.push_str(&format!("  replaces  {previous_tag}\n"));
            }
            message.push_str(&self.annotated_tag_content()?);
            let specifier = match &previous {
                Some(previous_tag) => format!("{previous_tag}..{}", self.new_revision),
                None => self.new_revision.to_string(),
            };
            message.push_str(&self.git.short_log(&specifier).context(GitSnafu)?);
        } else {
            let size = self.git.object_size(&tag_object).context(GitSnafu)?;
            message.push_str(&format!("    length  {size} bytes\n"));
            message.push_str(&self.annotated_tag_content()?);
        }

        Ok(message)
    }

    fn annotated_tag_content(&self) -> Result<String> {
        let tagger = self
            .git
            .ref_field(self.reference, "taggername")
            .context(GitSnafu)?;
        let tagged = self
            .git
            .ref_field(self.reference, "taggerdate:rfc2822")
            .context(GitSnafu)?;
        let tagged_display = match DateTime::parse_from_rfc2822(&tagged) {
            Ok(time) => crate::render::format_time(&time.with_timezone(&Local)),
            Err(_) => tagged.clone(),
        };

        let mut message = format!(" tagged by  {tagger}\n        on  {tagged_display}\n\n");

        // The tag message may hold release notes, so it is worth showing.
        let tag_body = self.git.tag_object(self.new_revision).context(GitSnafu)?;
        let mut lines = tag_body.lines();
        for line in lines.by_ref() {
            if line.is_empty() {
                break;
            }
        }
        let body: Vec<&str> = lines.collect();
        message.push_str(&body.join("\n"));
        message.push('\n');
        Ok(message)
    }

    fn create_unannotated_tag(&self) -> Result<String> {
        Ok(format!(
            "Unannotated tag ({}) is created.\n        at  {} (commit)\n\n{}",
            self.reference,
            self.new_revision,
            self.git.show_short(self.new_revision).context(GitSnafu)?
        ))
    }

    fn update_unannotated_tag(&self) -> Result<String> {
        Ok(format!(
            "Unannotated tag ({}) is updated.\n        to  {} (commit)\n      from  {} (commit)\n\n{}",
            self.reference,
            self.new_revision,
            self.old_revision,
            self.git.show_short(self.new_revision).context(GitSnafu)?
        ))
    }

    fn delete_unannotated_tag(&self) -> Result<String> {
        Ok(format!(
            "Unannotated tag ({}) is deleted.\n       was  {} (commit)\n\n{}",
            self.reference,
            self.old_revision,
            self.git.show_short(self.old_revision).context(GitSnafu)?
        ))
    }
}

/// Remove the Tagger/Date lines a deleted annotated tag still shows and
/// squeeze the blank lines they leave behind.
fn strip_tagger_lines(text: &str) -> String {
    let mut out = String::new();
    let mut previous_blank = false;
    for line in text.lines() {
        if line.starts_with("Tagger") || line.starts_with("Date") {
            continue;
        }
        let blank = line.is_empty();
        if blank && previous_blank {
            continue;
        }
        previous_blank = blank;
        out.push_str(line);
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::NULL_REVISION;

    #[test]
    fn test_parse_receive_line() {
        let range = parse_receive_line(&format!(
            "{} {} refs/heads/main",
            "a".repeat(40),
            "b".repeat(40)
        ))
        .unwrap();
        assert_eq!(range.old_revision, "a".repeat(40));
        assert_eq!(range.new_revision, "b".repeat(40));
        assert_eq!(range.reference, "refs/heads/main");

        assert!(parse_receive_line("just two fields").is_none());
        assert!(parse_receive_line("").is_none());
    }

    #[test]
    fn test_detect_change_type() {
        let sha = "a".repeat(40);
        assert_eq!(
            detect_change_type(NULL_REVISION, &sha, "refs/heads/main").unwrap(),
            ChangeType::Create
        );
        assert_eq!(
            detect_change_type(&sha, NULL_REVISION, "refs/heads/main").unwrap(),
            ChangeType::Delete
        );
        assert_eq!(
            detect_change_type(&sha, &sha, "refs/heads/main").unwrap(),
            ChangeType::Update
        );
        assert!(detect_change_type(NULL_REVISION, NULL_REVISION, "refs/heads/main").is_err());
    }

    #[test]
    fn test_detect_reference_type() {
        assert_eq!(
            detect_reference_type("refs/heads/main", "commit").unwrap(),
            Some(ReferenceType::Branch)
        );
        assert_eq!(
            detect_reference_type("refs/remotes/origin/main", "commit").unwrap(),
            Some(ReferenceType::Branch)
        );
        assert_eq!(
            detect_reference_type("refs/tags/v1.0", "commit").unwrap(),
            Some(ReferenceType::UnannotatedTag)
        );
        assert_eq!(
            detect_reference_type("refs/tags/v1.0", "tag").unwrap(),
            Some(ReferenceType::AnnotatedTag)
        );
        // Tracking branch of another remote: suppressed, not an error.
        assert_eq!(
            detect_reference_type("refs/remotes/upstream/main", "commit").unwrap(),
            None
        );
        assert!(detect_reference_type("refs/notes/commits", "blob").is_err());
    }

    #[test]
    fn test_short_reference() {
        assert_eq!(short_reference("refs/heads/main"), "main");
        assert_eq!(short_reference("refs/heads/feature/x"), "x");
        assert_eq!(short_reference("refs/remotes/origin/main"), "main");
        assert_eq!(short_reference("refs/x"), "refs/x");
    }

    #[test]
    fn test_push_info_revision_prefers_new() {
        let info = PushInfo {
            old_revision: "a".repeat(40),
            new_revision: "b".repeat(40),
            reference: "refs/heads/main".to_string(),
            reference_type: ReferenceType::Branch,
            change_type: ChangeType::Update,
            log: String::new(),
            commits: Vec::new(),
            author_name: String::new(),
            author_email: String::new(),
            date: Local::now(),
        };
        assert_eq!(info.revision(), "b".repeat(40));

        let deleted = PushInfo {
            new_revision: NULL_REVISION.to_string(),
            change_type: ChangeType::Delete,
            ..info
        };
        assert_eq!(deleted.revision(), "a".repeat(40));
    }

    #[test]
    fn test_push_subject() {
        let info = PushInfo {
            old_revision: "a".repeat(40),
            new_revision: "b".repeat(40),
            reference: "refs/heads/main".to_string(),
            reference_type: ReferenceType::Branch,
            change_type: ChangeType::Update,
            log: String::new(),
            commits: Vec::new(),
            author_name: String::new(),
            author_email: String::new(),
            date: Local::now(),
        };
        assert_eq!(info.subject(), "(push) branch (main) is updated.");
    }

    #[test]
    fn test_strip_tagger_lines() {
        let text = "tag v1.0\nTagger: Alice <a@example.com>\nDate:   Mon Jan 1 00:00:00 2024\n\nrelease notes\n";
        assert_eq!(strip_tagger_lines(text), "tag v1.0\n\nrelease notes\n");
    }
}
