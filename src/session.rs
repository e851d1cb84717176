use std::collections::HashMap;

use chrono::Local;

use crate::commit::CommitRecord;
use crate::config::MailerConfig;
use crate::error::mailer_error::GitSnafu;
use crate::error::Result;
use crate::git::{is_null_revision, short_revision, GitOps};
use crate::mail::{ComposedMail, MailComposer};
use crate::push::walker::MergeTopologyWalker;
use crate::push::{PushClassifier, PushInfo, RevisionRange};
use snafu::ResultExt;

/// All mails produced for one reference update.
#[derive(Debug)]
pub struct PushMails {
    pub push_mails: Vec<ComposedMail>,
    pub commit_mails: Vec<ComposedMail>,
}

/// One push event end to end: classify the update, fetch a record per new
/// commit, expand merge topology, and compose the mails. The session is the
/// single owner of the per-push record map and commit ordering; renderers
/// and the composer only borrow the finished records.
pub struct PushSession<'a> {
    config: &'a MailerConfig,
    git: &'a dyn GitOps,
}

impl<'a> PushSession<'a> {
    pub fn new(config: &'a MailerConfig, git: &'a dyn GitOps) -> Self {
        Self { config, git }
    }

    /// Returns None when the update is suppressed (tracking-branch no-op).
    pub fn process(&self, range: &RevisionRange) -> Result<Option<PushMails>> {
        tracing::info!(
            "processing {}: {} -> {}",
            range.reference,
            short_revision(&range.old_revision),
            short_revision(&range.new_revision)
        );

        let mut classifier = PushClassifier::new(
            self.git,
            &range.old_revision,
            &range.new_revision,
            &range.reference,
        );
        let summary = match classifier.summarize()? {
            Some(summary) => summary,
            None => {
                tracing::info!("tracking-branch update of {}, no email", range.reference);
                return Ok(None);
            }
        };

        // Author lookup must name an object that still exists; on a delete
        // only the old revision does.
        let lookup = if !is_null_revision(&range.new_revision) {
            &range.new_revision
        } else {
            &range.old_revision
        };
        let meta = self.git.commit_meta(lookup).context(GitSnafu)?;

        let push_info = PushInfo {
            old_revision: range.old_revision.clone(),
            new_revision: range.new_revision.clone(),
            reference: range.reference.clone(),
            reference_type: summary.reference_type,
            change_type: summary.change_type,
            log: summary.message.clone(),
            commits: summary.commits.clone(),
            author_name: meta.author_name,
            author_email: meta.author_email,
            date: self.config.date.unwrap_or_else(Local::now),
        };

        let mut order: Vec<String> = Vec::new();
        let mut records: HashMap<String, CommitRecord> = HashMap::new();
        if push_info.branch_changed() {
            for revision in &summary.commits {
                let record = CommitRecord::fetch(
                    self.git,
                    &range.reference,
                    revision,
                    self.config.max_diff_size,
                )?;
                order.push(revision.clone());
                records.insert(revision.clone(), record);
            }
        }

        MergeTopologyWalker::new(
            self.git,
            &range.reference,
            &range.old_revision,
            self.config.max_diff_size,
        )
        .expand(&mut order, &mut records)?;

        let composer = MailComposer {
            config: self.config,
        };
        let push_mails = self.fan_out(|to| composer.compose_push(&push_info, to));

        let mut commit_mails = Vec::new();
        for revision in &order {
            if let Some(record) = records.get(revision) {
                commit_mails.extend(self.fan_out(|to| composer.compose_commit(record, to)));
            }
        }

        tracing::info!(
            "{}: {} commit mail(s) prepared",
            range.reference,
            commit_mails.len()
        );
        Ok(Some(PushMails {
            push_mails,
            commit_mails,
        }))
    }

    /// One mail for all recipients, or one mail per recipient with
    /// `--send-per-to`.
    fn fan_out(&self, compose: impl Fn(&[String]) -> ComposedMail) -> Vec<ComposedMail> {
        if self.config.send_per_to {
            self.config
                .to
                .iter()
                .map(|to| compose(std::slice::from_ref(to)))
                .collect()
        } else {
            vec![compose(&self.config.to)]
        }
    }
}
