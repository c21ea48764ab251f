//! Commit, pull and push a report repository
//!
//! `git` failures (auth prompts, rejected pushes, network drops) come back as
//! [`M365Error::CommandFailed`] with git's stderr, which the retry classifier
//! sees like any other error message.

use super::run_command;
use crate::error::{M365Error, Result};
use crate::retry::RetryExecutor;
use chrono::Utc;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct GitSyncOptions {
    pub repo: PathBuf,
    pub remote: String,
    pub branch: String,
    /// Commit message prefix; a UTC timestamp is appended
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOutcome {
    pub committed: bool,
    pub pulled: bool,
    pub pushed: bool,
}

pub fn commit_message(prefix: &str, now: chrono::DateTime<Utc>) -> String {
    format!("{} {}", prefix.trim(), now.format("%Y-%m-%d %H:%M:%S UTC"))
}

/// `git status --porcelain` output lists at least one change
pub fn has_changes(porcelain: &str) -> bool {
    porcelain.lines().any(|line| !line.trim().is_empty())
}

async fn git(repo: &Path, args: &[&str]) -> Result<String> {
    Ok(run_command("git", args, Some(repo), None).await?.stdout)
}

async fn git_retried(retry: &RetryExecutor, repo: &Path, args: &[&str]) -> Result<String> {
    let operation = format!("git {}", args.first().copied().unwrap_or_default());
    retry
        .run(&operation, move |_| async move { git(repo, args).await })
        .await
        .into_result()
}

/// An unfinished rebase, merge or cherry-pick in the work tree, by name
async fn operation_in_progress(repo: &Path) -> Result<Option<&'static str>> {
    let git_dir = PathBuf::from(git(repo, &["rev-parse", "--git-dir"]).await?.trim());
    let git_dir = if git_dir.is_absolute() {
        git_dir
    } else {
        repo.join(git_dir)
    };

    let markers = [
        ("rebase-merge", "rebase"),
        ("rebase-apply", "rebase"),
        ("MERGE_HEAD", "merge"),
        ("CHERRY_PICK_HEAD", "cherry-pick"),
    ];
    Ok(markers
        .iter()
        .find(|(marker, _)| git_dir.join(marker).exists())
        .map(|(_, name)| *name))
}

/// `pull --rebase`, aborting the rebase when it stops on a conflict so the
/// work tree is back on the local commits.
async fn pull_rebase(repo: &Path, remote: &str, branch: &str) -> Result<String> {
    match git(repo, &["pull", "--rebase", remote, branch]).await {
        Ok(out) => Ok(out),
        Err(e) => {
            if operation_in_progress(repo).await? == Some("rebase") {
                warn!(repo = %repo.display(), "Pull stopped mid-rebase, aborting it");
                if let Err(abort) = git(repo, &["rebase", "--abort"]).await {
                    warn!("git rebase --abort failed: {}", abort);
                }
            }
            Err(e)
        }
    }
}

/// Commits ahead of `remote/branch`, or None when that can't be determined
/// (e.g. the branch doesn't exist on the remote yet)
async fn commits_ahead(opts: &GitSyncOptions) -> Option<u64> {
    let range = format!("{}/{}..HEAD", opts.remote, opts.branch);
    match git(&opts.repo, &["rev-list", "--count", &range]).await {
        Ok(out) => out.trim().parse().ok(),
        Err(e) => {
            debug!("Could not count commits ahead of {}: {}", range, e);
            None
        }
    }
}

/// One pass: commit local changes, rebase onto the remote, push if ahead
pub async fn sync_once(opts: &GitSyncOptions, retry: &RetryExecutor) -> Result<SyncOutcome> {
    let inside = git(&opts.repo, &["rev-parse", "--is-inside-work-tree"])
        .await
        .map_err(|_| {
            M365Error::ConfigError(format!("{} is not a git repository", opts.repo.display()))
        })?;
    if inside.trim() != "true" {
        return Err(M365Error::ConfigError(format!(
            "{} is not inside a git work tree",
            opts.repo.display()
        )));
    }

    if let Some(operation) = operation_in_progress(&opts.repo).await? {
        return Err(M365Error::ConfigError(format!(
            "A {} is in progress in {}; finish or abort it before syncing",
            operation,
            opts.repo.display()
        )));
    }

    let mut outcome = SyncOutcome::default();

    let status = git(&opts.repo, &["status", "--porcelain"]).await?;
    if has_changes(&status) {
        let message = commit_message(&opts.message, Utc::now());
        git(&opts.repo, &["add", "-A"]).await?;
        git(&opts.repo, &["commit", "-m", &message]).await?;
        info!(repo = %opts.repo.display(), "Committed local changes");
        outcome.committed = true;
    }

    let (repo, remote, branch) = (opts.repo.as_path(), opts.remote.as_str(), opts.branch.as_str());
    retry
        .run("git pull", move |_| async move {
            pull_rebase(repo, remote, branch).await
        })
        .await
        .into_result()?;
    outcome.pulled = true;

    let ahead = commits_ahead(opts).await;
    if ahead.is_none_or(|n| n > 0) {
        let refspec = format!("HEAD:{}", opts.branch);
        git_retried(retry, &opts.repo, &["push", &opts.remote, &refspec]).await?;
        info!(remote = %opts.remote, branch = %opts.branch, "Pushed");
        outcome.pushed = true;
    }

    Ok(outcome)
}

/// Repeat [`sync_once`] every `interval` until Ctrl-C. Failed passes are
/// logged and the loop keeps going.
pub async fn watch<F>(
    opts: &GitSyncOptions,
    retry: &RetryExecutor,
    interval: Duration,
    mut on_pass: F,
) -> Result<()>
where
    F: FnMut(&Result<SyncOutcome>),
{
    loop {
        let result = sync_once(opts, retry).await;
        if let Err(e) = &result {
            warn!(repo = %opts.repo.display(), "Git sync pass failed: {}", e);
        }
        on_pass(&result);

        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = tokio::signal::ctrl_c() => {
                info!("Git sync watch stopped");
                return Ok(());
            }
        }
    }
}
