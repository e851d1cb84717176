//! `--track-remote` support: refresh from origin and report every reference
//! whose tip moved, as synthetic push events.

use crate::error::mailer_error::GitSnafu;
use crate::error::Result;
use crate::git::{GitOps, NULL_REVISION};
use crate::push::RevisionRange;
use snafu::ResultExt;

/// Compare tag and origin tracking tips before and after a forced fetch.
/// References absent on one side use the null revision, so a new tag shows
/// up as a create and a removed one as a delete.
pub fn fetch_updated_references(git: &dyn GitOps) -> Result<Vec<RevisionRange>> {
    let old_tips = git.remote_reference_tips().context(GitSnafu)?;
    git.refresh_remote().context(GitSnafu)?;
    let new_tips = git.remote_reference_tips().context(GitSnafu)?;

    let mut updated: Vec<RevisionRange> = Vec::new();
    let mut push_change = |reference: &String, old: String, new: String| {
        let range = RevisionRange {
            old_revision: old,
            new_revision: new,
            reference: reference.clone(),
        };
        if !updated.contains(&range) {
            updated.push(range);
        }
    };

    for (reference, revision) in &old_tips {
        if new_tips.get(reference) != Some(revision) {
            push_change(
                reference,
                revision.clone(),
                new_tips
                    .get(reference)
                    .cloned()
                    .unwrap_or_else(|| NULL_REVISION.to_string()),
            );
        }
    }
    for (reference, revision) in &new_tips {
        if old_tips.get(reference) != Some(revision) {
            push_change(
                reference,
                old_tips
                    .get(reference)
                    .cloned()
                    .unwrap_or_else(|| NULL_REVISION.to_string()),
                revision.clone(),
            );
        }
    }

    updated.sort_by(|a, b| a.reference.cmp(&b.reference));
    tracing::info!("{} remote reference(s) changed", updated.len());
    Ok(updated)
}
