//! Stale-resource janitor (SPEC_FULL.md supplemental feature, grounded on
//! the teacher's `worktree/cleanup.rs`). Read-only by default: reports what
//! it would remove. A caller-supplied `prune` flag makes it act.
//!
//! Kingdom has no daemon, so this is not a background sweep — it runs once
//! per invocation (`kd doctor`), inspecting session records and worktree
//! directories across every branch.

use std::path::PathBuf;

use serde::Serialize;
use tracing::{info, warn};

use crate::errors::KdResult;
use crate::layout::Layout;
use crate::session::{pid_is_alive, SessionStore};

#[derive(Debug, Clone, Serialize)]
pub struct StaleSession {
    pub branch: String,
    pub agent: String,
    pub pid: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StaleWorktree {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct DoctorReport {
    pub stale_sessions: Vec<StaleSession>,
    pub stale_worktrees: Vec<StaleWorktree>,
    pub pruned: bool,
}

fn list_branch_names(layout: &Layout) -> KdResult<Vec<String>> {
    let dir = layout.branches_dir();
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut names = Vec::new();
    for entry in std::fs::read_dir(&dir).map_err(|e| crate::errors::KdError::io(&dir, e))? {
        let entry = entry.map_err(|e| crate::errors::KdError::io(&dir, e))?;
        if entry.path().is_dir() {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
    }
    names.sort();
    Ok(names)
}

/// Scan for session records whose `status=working`-like state no longer has
/// a live pid behind it, and for worktree directories with no session
/// referencing them. When `prune` is set, dead session records are reset to
/// `stopped` in place (never deleted — they stay as history) and orphaned
/// worktree directories are removed via `git worktree remove --force`.
pub async fn run(layout: &Layout, repo_root: &std::path::Path, prune: bool) -> KdResult<DoctorReport> {
    let mut report = DoctorReport { pruned: prune, ..Default::default() };
    let session_store = SessionStore::new(layout);

    let mut claimed_worktrees = std::collections::HashSet::new();

    for branch in list_branch_names(layout)? {
        let dir = layout.sessions_dir(&branch);
        if !dir.exists() {
            continue;
        }
        for entry in std::fs::read_dir(&dir).map_err(|e| crate::errors::KdError::io(&dir, e))? {
            let entry = entry.map_err(|e| crate::errors::KdError::io(&dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(agent) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let Some(session) = session_store.get(&branch, agent)? else {
                continue;
            };
            if let Some(task_id) = &session.ticket_id {
                claimed_worktrees.insert(layout.worktree_path(task_id));
            }
            if !session.is_active_candidate() {
                continue;
            }
            let alive = session.pid.map(pid_is_alive).unwrap_or(false);
            if !alive {
                report.stale_sessions.push(StaleSession {
                    branch: branch.clone(),
                    agent: agent.to_string(),
                    pid: session.pid,
                });
                if prune {
                    session_store.update(&branch, agent, |s| s.status = crate::session::SessionStatus::Stopped)?;
                }
            }
        }
    }

    let worktrees_dir = layout.worktrees_dir();
    if worktrees_dir.exists() {
        for entry in std::fs::read_dir(&worktrees_dir).map_err(|e| crate::errors::KdError::io(&worktrees_dir, e))? {
            let entry = entry.map_err(|e| crate::errors::KdError::io(&worktrees_dir, e))?;
            let path = entry.path();
            if !path.is_dir() || claimed_worktrees.contains(&path) {
                continue;
            }
            report.stale_worktrees.push(StaleWorktree { path: path.clone() });
            if prune {
                match crate::worktree::remove(repo_root, &path, true).await {
                    Ok(()) => info!(path = %path.display(), "pruned orphaned worktree"),
                    Err(e) => warn!(path = %path.display(), error = %e, "failed to prune worktree"),
                }
            }
        }
    }

    Ok(report)
}
