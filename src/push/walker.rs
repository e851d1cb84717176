use std::collections::{HashMap, VecDeque};

use crate::commit::CommitRecord;
use crate::error::mailer_error::GitSnafu;
use crate::error::Result;
use crate::git::GitOps;
use snafu::ResultExt;

/// Expands the ordered commit list with the side-branch history of every
/// merge commit in it, annotating each visited commit with the merge that
/// pulled it in. The walk is driven by an explicit frame stack instead of
/// recursion so a pathological merge history cannot exhaust the call stack.
pub struct MergeTopologyWalker<'a> {
    git: &'a dyn GitOps,
    reference: &'a str,
    old_revision: &'a str,
    max_diff_size: Option<u64>,
}

/// One merge commit being expanded: its parents still waiting to be walked
/// and the walk currently in progress.
struct Frame {
    merge_revision: String,
    merge_subject: String,
    first_grandparent: Option<String>,
    pending_parents: VecDeque<(String, bool)>,
    walk: Option<Walk>,
}

/// A backward walk along first-parent links from one parent of a merge,
/// ending when it reaches a known base revision.
struct Walk {
    revision: String,
    descendant: String,
    bases: Vec<String>,
    first_parent_walk: bool,
}

impl<'a> MergeTopologyWalker<'a> {
    pub fn new(
        git: &'a dyn GitOps,
        reference: &'a str,
        old_revision: &'a str,
        max_diff_size: Option<u64>,
    ) -> Self {
        Self {
            git,
            reference,
            old_revision,
            max_diff_size,
        }
    }

    /// Walk every merge commit currently in `order`, newest first, growing
    /// `order` and `records` in place. Safe to run repeatedly: records and
    /// annotations are never duplicated.
    pub fn expand(
        &self,
        order: &mut Vec<String>,
        records: &mut HashMap<String, CommitRecord>,
    ) -> Result<()> {
        let snapshot: Vec<String> = order.clone();
        for revision in snapshot.iter().rev() {
            let is_merge = records.get(revision).map(CommitRecord::is_merge);
            if is_merge == Some(true) {
                self.walk_merge(revision, order, records)?;
            }
        }
        Ok(())
    }

    fn walk_merge(
        &self,
        merge_revision: &str,
        order: &mut Vec<String>,
        records: &mut HashMap<String, CommitRecord>,
    ) -> Result<()> {
        let mut stack = Vec::new();
        if let Some(frame) = self.frame_for(merge_revision, records)? {
            stack.push(frame);
        }

        while let Some(frame) = stack.last_mut() {
            let mut walk = match frame.walk.take() {
                Some(walk) => walk,
                None => match frame.pending_parents.pop_front() {
                    Some((parent, first_parent_walk)) => {
                        let mut bases = vec![self.old_revision.to_string()];
                        match &frame.first_grandparent {
                            Some(grandparent) => {
                                bases.push(
                                    self.git
                                        .merge_base(grandparent, &parent)
                                        .context(GitSnafu)?,
                                );
                            }
                            // Merge directly on top of a root commit: only
                            // the push's old revision bounds the walk.
                            None => {}
                        }
                        frame.walk = Some(Walk {
                            revision: parent,
                            descendant: frame.merge_revision.clone(),
                            bases,
                            first_parent_walk,
                        });
                        continue;
                    }
                    None => {
                        stack.pop();
                        continue;
                    }
                },
            };

            if walk.bases.iter().any(|b| b == &walk.revision) {
                continue; // walk finished; frame moves to its next parent
            }

            if !records.contains_key(&walk.revision) {
                let record = CommitRecord::fetch(
                    self.git,
                    self.reference,
                    &walk.revision,
                    self.max_diff_size,
                )?;
                let position = order
                    .iter()
                    .position(|r| r == &walk.descendant)
                    .unwrap_or(order.len());
                order.insert(position, walk.revision.clone());
                records.insert(walk.revision.clone(), record);
            }

            let (record_is_merge, record_first_parent) = match records.get_mut(&walk.revision) {
                Some(record) => {
                    record.reference = self.reference.to_string();
                    if !walk.first_parent_walk {
                        record.add_merge_source(&frame.merge_revision, &frame.merge_subject);
                    }
                    (
                        record.is_merge(),
                        record.first_parent().map(str::to_string),
                    )
                }
                None => (false, None),
            };

            let mut sub_frame = None;
            if record_is_merge {
                if let (Some(grandparent), Some(first_parent)) =
                    (&frame.first_grandparent, &record_first_parent)
                {
                    let base = self
                        .git
                        .merge_base(grandparent, first_parent)
                        .context(GitSnafu)?;
                    if !walk.bases.iter().any(|b| b == &base) {
                        walk.bases.push(base);
                    }
                }
                sub_frame = self.frame_for(&walk.revision, records)?;
            }

            match record_first_parent {
                Some(first_parent) => {
                    walk.descendant = std::mem::replace(&mut walk.revision, first_parent);
                    frame.walk = Some(walk);
                }
                // Root commit: nothing further back to visit on this walk.
                None => {}
            }

            if let Some(sub_frame) = sub_frame {
                stack.push(sub_frame);
            }
        }

        Ok(())
    }

    fn frame_for(
        &self,
        merge_revision: &str,
        records: &HashMap<String, CommitRecord>,
    ) -> Result<Option<Frame>> {
        let record = match records.get(merge_revision) {
            Some(record) => record,
            None => return Ok(None),
        };
        let first_parent = match record.first_parent() {
            Some(first_parent) => first_parent.to_string(),
            None => return Ok(None),
        };
        let first_grandparent = self.git.parent_commit(&first_parent).context(GitSnafu)?;

        let mut pending_parents = VecDeque::new();
        pending_parents.push_back((first_parent, true));
        for parent in record.other_parents() {
            pending_parents.push_back((parent.clone(), false));
        }

        Ok(Some(Frame {
            merge_revision: record.revision.clone(),
            merge_subject: record.subject.clone(),
            first_grandparent,
            pending_parents,
            walk: None,
        }))
    }
}
