use std::collections::HashMap;
use std::path::Path;
use std::process::Command;

use commit_mailer::commit::CommitRecord;
use commit_mailer::config::MailerConfig;
use commit_mailer::diff::ChangeKind;
use commit_mailer::git::{short_revision, CliOps, NULL_REVISION};
use commit_mailer::push::walker::MergeTopologyWalker;
use commit_mailer::push::{PushClassifier, RevisionRange};
use commit_mailer::session::PushSession;

fn git(dir: &Path, args: &[&str]) -> String {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).trim().to_string()
}

fn create_temp_repo() -> (tempfile::TempDir, CliOps) {
    let dir = tempfile::tempdir().unwrap();
    git(dir.path(), &["init", "--quiet"]);
    git(dir.path(), &["symbolic-ref", "HEAD", "refs/heads/main"]);
    git(dir.path(), &["config", "user.email", "test@example.com"]);
    git(dir.path(), &["config", "user.name", "Test"]);
    let ops = CliOps::new(dir.path().join(".git"));
    (dir, ops)
}

fn add_and_commit(dir: &Path, filename: &str, content: &str, message: &str) -> String {
    if let Some(parent) = Path::new(filename).parent() {
        std::fs::create_dir_all(dir.join(parent)).unwrap();
    }
    std::fs::write(dir.join(filename), content).unwrap();
    git(dir, &["add", filename]);
    git(dir, &["commit", "-q", "-m", message]);
    git(dir, &["rev-parse", "HEAD"])
}

fn test_config() -> MailerConfig {
    MailerConfig {
        to: vec!["commits@example.com".to_string()],
        name: Some("proj".to_string()),
        host_name: "test.invalid".to_string(),
        ..MailerConfig::default()
    }
}

#[test]
fn test_create_branch_push() {
    let (dir, ops) = create_temp_repo();
    let c1 = add_and_commit(dir.path(), "a.txt", "one\n", "first commit");
    let c2 = add_and_commit(dir.path(), "a.txt", "two\n", "second commit");

    let null = NULL_REVISION.to_string();
    let mut classifier = PushClassifier::new(&ops, &null, &c2, "refs/heads/main");
    let summary = classifier.summarize().unwrap().unwrap();

    assert!(summary
        .message
        .starts_with("Branch (refs/heads/main) is created.\n"));
    assert!(summary
        .message
        .contains(&format!("     via  {} first commit\n", short_revision(&c1))));
    assert!(summary
        .message
        .contains(&format!("     at   {} second commit\n", short_revision(&c2))));
    assert_eq!(summary.commits, vec![c1, c2]);
    assert!(!summary.fast_forward);
}

#[test]
fn test_fast_forward_update() {
    let (dir, ops) = create_temp_repo();
    let c1 = add_and_commit(dir.path(), "a.txt", "one\n", "first commit");
    let c2 = add_and_commit(dir.path(), "a.txt", "two\n", "second commit");

    let mut classifier = PushClassifier::new(&ops, &c1, &c2, "refs/heads/main");
    let summary = classifier.summarize().unwrap().unwrap();

    assert!(summary.fast_forward);
    assert!(summary
        .message
        .contains(&format!("    from  {} first commit\n", short_revision(&c1))));
    assert!(!summary.message.contains("discards"));
    assert!(!summary.message.contains("This update discarded"));
    assert_eq!(summary.commits, vec![c2]);
    assert!(!summary.message.contains("No new revisions"));
}

#[test]
fn test_rewind_update() {
    let (dir, ops) = create_temp_repo();
    let _c1 = add_and_commit(dir.path(), "a.txt", "one\n", "first commit");
    let c2 = add_and_commit(dir.path(), "a.txt", "two\n", "second commit");
    let c1 = git(dir.path(), &["rev-parse", "HEAD^"]);

    // Old tip c2, new tip its ancestor c1: a pure rewind.
    let mut classifier = PushClassifier::new(&ops, &c2, &c1, "refs/heads/main");
    let summary = classifier.summarize().unwrap().unwrap();

    assert!(!summary.fast_forward);
    assert!(summary
        .message
        .contains(&format!("discards  {} second commit\n", short_revision(&c2))));
    assert!(summary
        .message
        .contains("This update discarded existing revisions"));
    assert!(summary
        .message
        .contains("No new revisions were added by this update.\n"));
    assert!(summary.commits.is_empty());
}

#[test]
fn test_delete_branch() {
    let (dir, ops) = create_temp_repo();
    let _c1 = add_and_commit(dir.path(), "a.txt", "one\n", "first commit");
    let c2 = add_and_commit(dir.path(), "a.txt", "two\n", "second commit");

    let null = NULL_REVISION.to_string();
    let mut classifier = PushClassifier::new(&ops, &c2, &null, "refs/heads/main");
    let summary = classifier.summarize().unwrap().unwrap();

    assert!(summary
        .message
        .starts_with("Branch (refs/heads/main) is deleted.\n"));
    assert!(summary.message.contains(&format!("       was  {c2}\n")));
    assert!(summary.message.contains("second commit"));
    assert!(summary.commits.is_empty());
}

#[test]
fn test_unannotated_tag_create() {
    let (dir, ops) = create_temp_repo();
    let _c1 = add_and_commit(dir.path(), "a.txt", "one\n", "first commit");
    let c2 = add_and_commit(dir.path(), "a.txt", "two\n", "second commit");
    git(dir.path(), &["tag", "v1.0"]);

    let null = NULL_REVISION.to_string();
    let mut classifier = PushClassifier::new(&ops, &null, &c2, "refs/tags/v1.0");
    let summary = classifier.summarize().unwrap().unwrap();

    assert!(summary
        .message
        .starts_with("Unannotated tag (refs/tags/v1.0) is created.\n"));
    assert!(summary
        .message
        .contains(&format!("        at  {c2} (commit)\n")));
    assert!(summary.message.contains("second commit"));
    assert!(summary.commits.is_empty());
}

#[test]
fn test_annotated_tag_create() {
    let (dir, ops) = create_temp_repo();
    let c1 = add_and_commit(dir.path(), "a.txt", "one\n", "first commit");
    let _c2 = add_and_commit(dir.path(), "a.txt", "two\n", "second commit");
    git(dir.path(), &["tag", "-a", "v1", "-m", "release v1", &c1]);
    git(dir.path(), &["tag", "-a", "v2", "-m", "release v2"]);
    let tag_revision = git(dir.path(), &["rev-parse", "refs/tags/v2"]);

    let null = NULL_REVISION.to_string();
    let mut classifier = PushClassifier::new(&ops, &null, &tag_revision, "refs/tags/v2");
    let summary = classifier.summarize().unwrap().unwrap();

    assert!(summary
        .message
        .starts_with("Annotated tag (refs/tags/v2) is created.\n"));
    assert!(summary
        .message
        .contains(&format!("        at  {tag_revision} (tag)\n")));
    assert!(summary.message.contains("   tagging  "));
    assert!(summary.message.contains("  replaces  v1\n"));
    assert!(summary.message.contains(" tagged by  Test"));
    assert!(summary.message.contains("release v2"));
    // Shortlog since the previous tag names the author.
    assert!(summary.message.contains("Test ("));
}

#[test]
fn test_commit_record_fetch() {
    let (dir, ops) = create_temp_repo();
    let c1 = add_and_commit(dir.path(), "src/lib.rs", "fn a() {}\n", "add lib");
    let c2 = add_and_commit(dir.path(), "src/lib.rs", "fn b() {}\n", "rename function");

    let record = CommitRecord::fetch(&ops, "refs/heads/main", &c2, None).unwrap();
    assert_eq!(record.author_name, "Test");
    assert_eq!(record.author_email, "test@example.com");
    assert_eq!(record.subject, "rename function");
    assert_eq!(record.parents, vec![c1.clone()]);
    assert_eq!(record.updated_files, vec!["src/lib.rs"]);
    assert_eq!(record.files, vec!["src/lib.rs"]);
    assert_eq!(record.diffs.len(), 1);
    assert_eq!(record.diffs[0].kind, ChangeKind::Modified);
    assert_eq!(record.diffs[0].added_count, 1);
    assert_eq!(record.diffs[0].deleted_count, 1);
    assert_eq!(record.diffs[0].index, Some(0));
    assert!(record.parent_date.is_some());
    assert!(!record.diff_truncated);

    let root = CommitRecord::fetch(&ops, "refs/heads/main", &c1, None).unwrap();
    assert_eq!(root.added_files, vec!["src/lib.rs"]);
    assert_eq!(root.diffs[0].kind, ChangeKind::Added);
    assert!(root.parent_date.is_none());
}

#[test]
fn test_diff_byte_ceiling_truncates_without_failing() {
    let (dir, ops) = create_temp_repo();
    let big: String = (0..200).map(|i| format!("line number {i}\n")).collect();
    let c1 = add_and_commit(dir.path(), "big.txt", &big, "add big file");

    let record = CommitRecord::fetch(&ops, "refs/heads/main", &c1, Some(10)).unwrap();
    assert!(record.diff_truncated);
    assert!(record.diffs.is_empty());
    // The name-status lists are unaffected by the patch ceiling.
    assert_eq!(record.added_files, vec!["big.txt"]);
}

#[test]
fn test_merge_walker_annotates_side_branch() {
    let (dir, ops) = create_temp_repo();
    let c1 = add_and_commit(dir.path(), "a.txt", "one\n", "first commit");
    git(dir.path(), &["checkout", "-q", "-b", "topic"]);
    let t1 = add_and_commit(dir.path(), "t.txt", "topic\n", "topic work");
    git(dir.path(), &["checkout", "-q", "main"]);
    let m1 = add_and_commit(dir.path(), "a.txt", "two\n", "main work");
    git(
        dir.path(),
        &["merge", "-q", "--no-ff", "-m", "Merge branch 'topic'", "topic"],
    );
    let merge = git(dir.path(), &["rev-parse", "HEAD"]);

    // The push reports main: t1 is reachable from the topic branch, so it is
    // excluded from the primary commit list and only found by the walker.
    let mut classifier = PushClassifier::new(&ops, &c1, &merge, "refs/heads/main");
    let summary = classifier.summarize().unwrap().unwrap();
    assert_eq!(summary.commits, vec![m1.clone(), merge.clone()]);

    let mut order = summary.commits.clone();
    let mut records: HashMap<String, CommitRecord> = HashMap::new();
    for revision in &order {
        records.insert(
            revision.clone(),
            CommitRecord::fetch(&ops, "refs/heads/main", revision, None).unwrap(),
        );
    }

    let walker = MergeTopologyWalker::new(&ops, "refs/heads/main", &c1, None);
    walker.expand(&mut order, &mut records).unwrap();

    assert_eq!(order, vec![m1.clone(), t1.clone(), merge.clone()]);
    let topic_record = &records[&t1];
    assert_eq!(topic_record.merge_sources.len(), 1);
    assert_eq!(topic_record.merge_sources[0].revision, merge);
    assert_eq!(
        topic_record.merge_sources[0].message(),
        format!("Merged {}: Merge branch 'topic'", short_revision(&merge))
    );
    // The merge commit itself carries no provenance.
    assert!(records[&merge].merge_sources.is_empty());

    // Running the walk again must not duplicate entries or annotations.
    walker.expand(&mut order, &mut records).unwrap();
    assert_eq!(order.len(), 3);
    assert_eq!(records[&t1].merge_sources.len(), 1);
}

#[test]
fn test_session_end_to_end() {
    let (dir, ops) = create_temp_repo();
    let c1 = add_and_commit(dir.path(), "a.txt", "one\n", "first commit");
    let c2 = add_and_commit(dir.path(), "a.txt", "two\n", "second commit");

    let config = test_config();
    let session = PushSession::new(&config, &ops);
    let mails = session
        .process(&RevisionRange {
            old_revision: c1,
            new_revision: c2.clone(),
            reference: "refs/heads/main".to_string(),
        })
        .unwrap()
        .unwrap();

    assert_eq!(mails.push_mails.len(), 1);
    let push_mail = &mails.push_mails[0].message;
    assert!(push_mail.contains("(push) branch (main) is updated."));
    assert!(push_mail.contains("X-Git-Refname: refs/heads/main\n"));
    assert!(push_mail.contains("X-Git-Reftype: branch\n"));
    assert!(push_mail.contains(&format!("X-Git-NewRev: {c2}\n")));

    assert_eq!(mails.commit_mails.len(), 1);
    let commit_mail = &mails.commit_mails[0].message;
    assert!(commit_mail.contains(&format!("  New Revision: {c2}\n")));
    assert!(commit_mail.contains(&format!("Message-ID: <{c2}@test.invalid>")));
    assert!(commit_mail.contains("Subject: proj@"));
    assert!(commit_mail.contains("[main] second commit"));
    assert!(commit_mail.contains("  Modified files:\n    a.txt\n"));
    assert_eq!(
        mails.commit_mails[0].recipients,
        vec!["commits@example.com"]
    );
}

#[test]
fn test_session_suppresses_foreign_tracking_ref() {
    let (dir, ops) = create_temp_repo();
    let c1 = add_and_commit(dir.path(), "a.txt", "one\n", "first commit");
    let c2 = add_and_commit(dir.path(), "a.txt", "two\n", "second commit");
    git(
        dir.path(),
        &["update-ref", "refs/remotes/upstream/main", &c2],
    );

    let config = test_config();
    let session = PushSession::new(&config, &ops);
    let outcome = session
        .process(&RevisionRange {
            old_revision: c1,
            new_revision: c2,
            reference: "refs/remotes/upstream/main".to_string(),
        })
        .unwrap();
    assert!(outcome.is_none());
}

#[test]
fn test_send_per_to_fans_out() {
    let (dir, ops) = create_temp_repo();
    let c1 = add_and_commit(dir.path(), "a.txt", "one\n", "first commit");
    let c2 = add_and_commit(dir.path(), "a.txt", "two\n", "second commit");

    let config = MailerConfig {
        to: vec![
            "one@example.com".to_string(),
            "two@example.com".to_string(),
        ],
        send_per_to: true,
        ..test_config()
    };
    let session = PushSession::new(&config, &ops);
    let mails = session
        .process(&RevisionRange {
            old_revision: c1,
            new_revision: c2,
            reference: "refs/heads/main".to_string(),
        })
        .unwrap()
        .unwrap();

    assert_eq!(mails.push_mails.len(), 2);
    assert_eq!(mails.commit_mails.len(), 2);
    assert_eq!(mails.commit_mails[0].recipients, vec!["one@example.com"]);
    assert_eq!(mails.commit_mails[1].recipients, vec!["two@example.com"]);
}
