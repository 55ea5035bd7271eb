//! Worktree primitives. Git itself is treated as a black box (out of
//! scope): every operation here shells out to the `git` binary rather than
//! linking a Git library, so this module is a thin path-resolution +
//! subprocess wrapper, not a Git implementation. Branch naming and
//! worktree-base layout are grounded on the teacher's `worktree/manager.rs`
//! (`WorktreeInfo`, `claw/<id>-<slug>` naming), adapted from git2 calls to
//! `std::process::Command`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tracing::info;

use crate::errors::{KdError, KdResult};
use crate::layout::Layout;
use crate::slug::slugify;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorktreeInfo {
    pub task_id: String,
    pub path: PathBuf,
    pub branch: String,
}

/// Feature branch name for a task's worktree: `kd/<task-id>-<slug>`.
pub fn branch_name(task_id: &str, task_title: &str) -> String {
    let slug = slugify(task_title);
    let short: String = slug.chars().take(24).collect();
    format!("kd/{task_id}-{short}")
}

async fn run_git(repo: &Path, args: &[&str]) -> KdResult<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .await
        .map_err(|e| KdError::io(repo, e))?;
    if !output.status.success() {
        return Err(KdError::AgentFailed {
            backend: "git".to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

/// Create a worktree for a task, branching from the current HEAD of
/// `repo_root`. Hand-mode tasks never call this — they run directly in
/// `repo_root` (spec §4.4: "worktree = base repo checkout").
pub async fn create(layout: &Layout, repo_root: &Path, task_id: &str, task_title: &str) -> KdResult<WorktreeInfo> {
    let path = layout.worktree_path(task_id);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| KdError::io(parent, e))?;
    }
    let branch = branch_name(task_id, task_title);

    run_git(
        repo_root,
        &["worktree", "add", "-b", &branch, &path.to_string_lossy(), "HEAD"],
    )
    .await?;

    info!(task_id, branch = %branch, path = %path.display(), "worktree created");
    Ok(WorktreeInfo { task_id: task_id.to_string(), path, branch })
}

/// Remove a task's worktree. `force` discards uncommitted changes, used on
/// `--reject` cleanup; a plain remove refuses if the tree isn't clean.
pub async fn remove(repo_root: &Path, path: &Path, force: bool) -> KdResult<()> {
    let path_str = path.to_string_lossy().to_string();
    let mut args = vec!["worktree", "remove"];
    if force {
        args.push("--force");
    }
    args.push(&path_str);
    run_git(repo_root, &args).await?;
    Ok(())
}

/// Resolve the diff range for a council review (spec §4.4 step 3): hand-mode
/// uses a two-dot diff against the peasant's start commit; worktree mode
/// uses the three-dot merge-base form against the feature branch.
pub fn diff_range(hand_mode: bool, start_sha_or_branch: &str) -> String {
    if hand_mode {
        format!("{start_sha_or_branch}..HEAD")
    } else {
        format!("{start_sha_or_branch}...HEAD")
    }
}

pub async fn diff(repo_root: &Path, range: &str) -> KdResult<String> {
    run_git(repo_root, &["diff", range]).await
}

pub async fn current_head(repo_root: &Path) -> KdResult<String> {
    run_git(repo_root, &["rev-parse", "HEAD"]).await
}

/// Current branch of `repo_root` (`git rev-parse --abbrev-ref HEAD`), used by
/// the `accept` path to hard-fail on a branch mismatch rather than merging
/// into whatever happens to be checked out (spec §7: "Wrong git branch on
/// accept ... does not auto-switch").
pub async fn current_branch(repo_root: &Path) -> KdResult<String> {
    run_git(repo_root, &["rev-parse", "--abbrev-ref", "HEAD"]).await
}

/// Merge a task's feature branch into whatever is currently checked out.
/// Callers must have already verified the expected branch is checked out
/// (spec §4.4 hand-mode note: "`--accept` skips the merge step").
pub async fn merge(repo_root: &Path, feature_branch: &str) -> KdResult<()> {
    run_git(repo_root, &["merge", "--no-ff", feature_branch]).await?;
    Ok(())
}

/// Stage all changes and commit. Returns `Ok(false)` (not an error) when
/// there is nothing to commit — the harness logs that as a worklog entry
/// rather than failing the iteration (spec §4.4 step 5).
pub async fn stage_and_commit(repo_root: &Path, message: &str) -> KdResult<bool> {
    run_git(repo_root, &["add", "-A"]).await?;
    let status = run_git(repo_root, &["status", "--porcelain"]).await?;
    if status.is_empty() {
        return Ok(false);
    }
    run_git(repo_root, &["commit", "-m", message]).await?;
    Ok(true)
}
