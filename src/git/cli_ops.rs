use std::collections::BTreeMap;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;
use std::process::{Command, Stdio};

use crate::error::git_error::{CommandFailedSnafu, IoSnafu, UnexpectedOutputSnafu};
use crate::error::GitError;
use crate::git::{CommitMeta, GitOps, PatchText};
use snafu::ResultExt;

/// Git operations implemented by shelling out to the `git` CLI with an
/// explicit `--git-dir`, the way a post-receive hook runs.
pub struct CliOps {
    pub git_dir: PathBuf,
    pub git_bin: String,
}

impl CliOps {
    pub fn new(git_dir: PathBuf) -> Self {
        Self {
            git_dir,
            git_bin: "git".to_string(),
        }
    }

    pub fn with_git_bin(mut self, git_bin: String) -> Self {
        self.git_bin = git_bin;
        self
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut command = Command::new(&self.git_bin);
        command.arg(format!("--git-dir={}", self.git_dir.display()));
        command.args(args);
        command
    }

    /// Run a git command and return stdout on success, or an error carrying
    /// the command line and stderr for operator diagnosis.
    fn run_git(&self, args: &[&str]) -> Result<String, GitError> {
        tracing::debug!("git {}", args.join(" "));
        let output = self.command(args).output().map_err(|e| {
            CommandFailedSnafu {
                message: format!("failed to run {}: {e}", self.git_bin),
            }
            .build()
        })?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).to_string();
            Err(CommandFailedSnafu {
                message: format!("git {}: {}", args.join(" "), stderr.trim()),
            }
            .build())
        }
    }

    /// Run git and return (success, stdout) without failing on non-zero exit.
    fn run_git_raw(&self, args: &[&str]) -> Result<(bool, String), GitError> {
        tracing::debug!("git {}", args.join(" "));
        let output = self
            .command(args)
            .stderr(Stdio::null())
            .output()
            .map_err(|e| {
                CommandFailedSnafu {
                    message: format!("failed to run {}: {e}", self.git_bin),
                }
                .build()
            })?;
        Ok((
            output.status.success(),
            String::from_utf8_lossy(&output.stdout).to_string(),
        ))
    }

    /// Run a git command feeding `input` on stdin and return stdout.
    fn run_git_with_input(&self, args: &[&str], input: &str) -> Result<String, GitError> {
        let mut child = self
            .command(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .context(IoSnafu)?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(input.as_bytes()).context(IoSnafu)?;
        }
        let output = child.wait_with_output().context(IoSnafu)?;
        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).to_string())
        } else {
            Err(CommandFailedSnafu {
                message: format!("git {} failed", args.join(" ")),
            }
            .build())
        }
    }
}

impl GitOps for CliOps {
    fn rev_parse(&self, spec: &str) -> Result<String, GitError> {
        Ok(self.run_git(&["rev-parse", spec])?.trim().to_string())
    }

    fn object_type(&self, object: &str) -> Result<String, GitError> {
        Ok(self.run_git(&["cat-file", "-t", object])?.trim().to_string())
    }

    fn rev_list(&self, args: &[String]) -> Result<Vec<String>, GitError> {
        let mut full: Vec<&str> = vec!["rev-list"];
        full.extend(args.iter().map(String::as_str));
        Ok(self
            .run_git(&full)?
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    fn merge_base(&self, a: &str, b: &str) -> Result<String, GitError> {
        Ok(self.run_git(&["merge-base", a, b])?.trim().to_string())
    }

    fn parent_commit(&self, revision: &str) -> Result<Option<String>, GitError> {
        let spec = format!("{revision}^");
        let (success, stdout) = self.run_git_raw(&["rev-parse", &spec])?;
        if success {
            Ok(Some(stdout.trim().to_string()))
        } else {
            Ok(None)
        }
    }

    fn commit_meta(&self, revision: &str) -> Result<CommitMeta, GitError> {
        let stdout = self.run_git(&[
            "log",
            "-n",
            "1",
            "--pretty=format:%an%n%ae%n%at%n%s%n%P",
            revision,
        ])?;
        let lines: Vec<&str> = stdout.lines().collect();
        if lines.len() < 4 {
            return Err(UnexpectedOutputSnafu {
                revision,
                message: "commit metadata query returned too few lines".to_string(),
            }
            .build());
        }
        let author_epoch = lines[2].trim().parse::<i64>().map_err(|_| {
            UnexpectedOutputSnafu {
                revision,
                message: format!("bad author date: {}", lines[2]),
            }
            .build()
        })?;
        let parents = lines
            .get(4)
            .map(|l| {
                l.split_whitespace()
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Ok(CommitMeta {
            author_name: lines[0].to_string(),
            author_email: lines[1].to_string(),
            author_epoch,
            subject: lines[3].to_string(),
            parents,
        })
    }

    fn author_epoch(&self, revision: &str) -> Result<i64, GitError> {
        let stdout = self.run_git(&["log", "-n", "1", "--pretty=format:%at", revision])?;
        stdout.trim().parse::<i64>().map_err(|_| {
            UnexpectedOutputSnafu {
                revision,
                message: format!("bad author date: {}", stdout.trim()),
            }
            .build()
        })
    }

    fn subject(&self, revision: &str) -> Result<String, GitError> {
        Ok(self
            .run_git(&["log", "-n", "1", "--pretty=format:%s", revision])?
            .trim()
            .to_string())
    }

    fn commit_message(&self, revision: &str) -> Result<String, GitError> {
        self.run_git(&["log", "-n", "1", "--pretty=format:%s%n%n%b", revision])
    }

    fn name_status(&self, revision: &str) -> Result<String, GitError> {
        self.run_git(&[
            "log",
            "-n",
            "1",
            "--pretty=format:",
            "-C",
            "--name-status",
            revision,
        ])
    }

    fn commit_patch(
        &self,
        revision: &str,
        max_bytes: Option<u64>,
    ) -> Result<PatchText, GitError> {
        let mut child = self
            .command(&[
                "log",
                "-n",
                "1",
                "--pretty=format:",
                "-C",
                "-p",
                revision,
            ])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .context(IoSnafu)?;

        let stdout = match child.stdout.take() {
            Some(stdout) => stdout,
            None => {
                return Err(CommandFailedSnafu {
                    message: "failed to capture git log output".to_string(),
                }
                .build())
            }
        };

        let mut reader = BufReader::new(stdout);
        let mut lines = Vec::new();
        let mut buf = Vec::new();
        let mut total: u64 = 0;
        let mut truncated = false;

        loop {
            buf.clear();
            let n = reader.read_until(b'\n', &mut buf).context(IoSnafu)?;
            if n == 0 {
                break;
            }
            total += n as u64;
            if let Some(max) = max_bytes {
                if total > max {
                    truncated = true;
                    break;
                }
            }
            if buf.last() == Some(&b'\n') {
                buf.pop();
                if buf.last() == Some(&b'\r') {
                    buf.pop();
                }
            }
            lines.push(match std::str::from_utf8(&buf) {
                Ok(s) => s.to_string(),
                Err(_) => "(binary line)".to_string(),
            });
        }

        if truncated {
            tracing::info!("diff for {revision} exceeded the byte ceiling, truncating");
            let _ = child.kill();
            let _ = child.wait();
        } else {
            let status = child.wait().context(IoSnafu)?;
            if !status.success() {
                return Err(CommandFailedSnafu {
                    message: format!("git log -p failed for {revision}"),
                }
                .build());
            }
        }

        Ok(PatchText { lines, truncated })
    }

    fn not_reachable_args(&self) -> Result<Vec<String>, GitError> {
        Ok(self
            .run_git(&["rev-parse", "--not", "--branches", "--remotes"])?
            .lines()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect())
    }

    fn show_oneline(&self, revision: &str) -> Result<String, GitError> {
        self.run_git(&["show", "-s", "--pretty=oneline", revision])
    }

    fn show_short(&self, revision: &str) -> Result<String, GitError> {
        self.run_git(&["show", "--no-color", "--root", "-s", "--pretty=short", revision])
    }

    fn short_log(&self, revision_specifier: &str) -> Result<String, GitError> {
        let log = self.run_git(&["rev-list", "--pretty=short", revision_specifier])?;
        self.run_git_with_input(&["shortlog"], &log)
    }

    fn previous_tag(&self, revision: &str) -> Result<Option<String>, GitError> {
        let (success, stdout) = self.run_git_raw(&["describe", "--abbrev=0", revision])?;
        if success {
            let tag = stdout.trim().to_string();
            Ok(if tag.is_empty() { None } else { Some(tag) })
        } else {
            Ok(None)
        }
    }

    fn ref_field(&self, reference: &str, field: &str) -> Result<String, GitError> {
        let format = format!("--format=%({field})");
        Ok(self
            .run_git(&["for-each-ref", &format, reference])?
            .trim()
            .to_string())
    }

    fn tag_object(&self, revision: &str) -> Result<String, GitError> {
        self.run_git(&["cat-file", "tag", revision])
    }

    fn object_size(&self, object: &str) -> Result<u64, GitError> {
        let stdout = self.run_git(&["cat-file", "-s", object])?;
        stdout.trim().parse::<u64>().map_err(|_| {
            UnexpectedOutputSnafu {
                revision: object,
                message: format!("bad object size: {}", stdout.trim()),
            }
            .build()
        })
    }

    fn remote_reference_tips(&self) -> Result<BTreeMap<String, String>, GitError> {
        let mut tips = BTreeMap::new();
        let refs = self.run_git(&[
            "rev-parse",
            "--symbolic-full-name",
            "--tags",
            "--remotes",
        ])?;
        for reference in refs.lines().map(str::trim).filter(|l| !l.is_empty()) {
            if reference.starts_with("refs/remotes/")
                && !reference.starts_with("refs/remotes/origin/")
            {
                continue;
            }
            let revision = self.rev_parse(reference)?;
            tips.insert(reference.to_string(), revision);
        }
        Ok(tips)
    }

    fn refresh_remote(&self) -> Result<(), GitError> {
        // Tags are recreated from the remote so moved tags are picked up.
        let tags = self.run_git(&["rev-parse", "--symbolic", "--tags"])?;
        for tag in tags.lines().map(str::trim).filter(|l| !l.is_empty()) {
            let name = tag.strip_prefix("refs/tags/").unwrap_or(tag);
            self.run_git(&["tag", "-d", name])?;
        }
        self.run_git(&["fetch", "--force", "--tags"])?;
        self.run_git(&["fetch", "--force"])?;
        Ok(())
    }
}
