//! Session Store (spec §4.5) — per-agent JSON runtime records, single
//! writer per file, no locking. Also owns `state.json` (spec §3, Entity:
//! BranchState) since the current-thread pointer is branch-scoped, not
//! agent-scoped.

use std::path::Path;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::errors::{KdError, KdResult};
use crate::layout::Layout;

use super::model::{pid_is_alive, AgentSession, SessionStatus};

/// `state.json` — current thread pointer and branch-level flags.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BranchState {
    pub current_thread: Option<String>,
    #[serde(default)]
    pub design_approved: bool,
    #[serde(default)]
    pub done: bool,
}

pub struct SessionStore<'a> {
    layout: &'a Layout,
}

impl<'a> SessionStore<'a> {
    pub fn new(layout: &'a Layout) -> Self {
        Self { layout }
    }

    pub fn get(&self, branch: &str, agent: &str) -> KdResult<Option<AgentSession>> {
        let path = self.layout.session_path(branch, agent);
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| KdError::io(&path, e))?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub fn set(&self, branch: &str, agent: &str, session: &AgentSession) -> KdResult<()> {
        let path = self.layout.session_path(branch, agent);
        write_json(&path, session)
    }

    /// Read-modify-write: apply `mutate` to the existing record (or a fresh
    /// one if none exists), bumping `last_activity`, and persist it.
    pub fn update<F>(&self, branch: &str, agent: &str, mutate: F) -> KdResult<AgentSession>
    where
        F: FnOnce(&mut AgentSession),
    {
        let mut session = self.get(branch, agent)?.unwrap_or_else(|| AgentSession::new(agent));
        mutate(&mut session);
        session.last_activity = Utc::now();
        self.set(branch, agent, &session)?;
        Ok(session)
    }

    /// Sessions whose status is not idle/done/failed/stopped AND whose pid
    /// is confirmed alive. Stale records are filtered out here, not
    /// mutated — they linger on disk until the next write (spec §4.5).
    pub fn list_active(&self, branch: &str) -> KdResult<Vec<(String, AgentSession)>> {
        let dir = self.layout.sessions_dir(branch);
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(|e| KdError::io(&dir, e))? {
            let entry = entry.map_err(|e| KdError::io(&dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let raw = std::fs::read_to_string(&path).map_err(|e| KdError::io(&path, e))?;
            let session: AgentSession = serde_json::from_str(&raw)?;
            if !session.is_active_candidate() {
                continue;
            }
            let alive = match session.pid {
                Some(pid) => pid_is_alive(pid),
                None => false,
            };
            if alive {
                out.push((name.to_string(), session));
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }

    /// Refuse-to-start guard (spec §3 invariant #5): is there already a
    /// live session holding this task?
    pub fn task_already_claimed(&self, branch: &str, task_id: &str) -> KdResult<Option<(String, u32)>> {
        for (name, session) in self.list_active(branch)? {
            if session.ticket_id.as_deref() == Some(task_id) {
                if let Some(pid) = session.pid {
                    return Ok(Some((name, pid)));
                }
            }
        }
        Ok(None)
    }

    /// Hand-mode collision guard: is any other hand-mode session alive
    /// anywhere under this branch?
    pub fn hand_mode_collision(&self, branch: &str) -> KdResult<Option<String>> {
        for (name, session) in self.list_active(branch)? {
            if session.hand_mode {
                return Ok(Some(name));
            }
        }
        Ok(None)
    }

    // ─── BranchState ──────────────────────────────────────────────────────

    pub fn get_branch_state(&self, branch: &str) -> KdResult<BranchState> {
        let path = self.layout.state_path(branch);
        if !path.exists() {
            return Ok(BranchState::default());
        }
        let raw = std::fs::read_to_string(&path).map_err(|e| KdError::io(&path, e))?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn set_branch_state(&self, branch: &str, state: &BranchState) -> KdResult<()> {
        let path = self.layout.state_path(branch);
        write_json(&path, state)
    }

    pub fn get_current_thread(&self, branch: &str) -> KdResult<Option<String>> {
        Ok(self.get_branch_state(branch)?.current_thread)
    }

    pub fn set_current_thread(&self, branch: &str, thread: &str) -> KdResult<()> {
        let mut state = self.get_branch_state(branch)?;
        state.current_thread = Some(thread.to_string());
        self.set_branch_state(branch, &state)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> KdResult<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| KdError::io(parent, e))?;
    }
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).map_err(|e| KdError::io(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn update_preserves_other_fields() {
        let tmp = tempdir().unwrap();
        let layout = Layout::new(tmp.path());
        let store = SessionStore::new(&layout);

        store
            .update("b", "claude", |s| {
                s.ticket_id = Some("0a1f".into());
                s.status = SessionStatus::Working;
            })
            .unwrap();

        store
            .update("b", "claude", |s| {
                s.pid = Some(1234);
            })
            .unwrap();

        let session = store.get("b", "claude").unwrap().unwrap();
        assert_eq!(session.ticket_id.as_deref(), Some("0a1f"));
        assert_eq!(session.status, SessionStatus::Working);
        assert_eq!(session.pid, Some(1234));
    }

    #[test]
    fn list_active_filters_idle_and_dead_pids() {
        let tmp = tempdir().unwrap();
        let layout = Layout::new(tmp.path());
        let store = SessionStore::new(&layout);

        store
            .update("b", "idle-agent", |s| {
                s.status = SessionStatus::Idle;
                s.pid = Some(std::process::id());
            })
            .unwrap();
        store
            .update("b", "dead-agent", |s| {
                s.status = SessionStatus::Working;
                s.pid = Some(999_999);
            })
            .unwrap();
        store
            .update("b", "live-agent", |s| {
                s.status = SessionStatus::Working;
                s.pid = Some(std::process::id());
            })
            .unwrap();

        let active = store.list_active("b").unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].0, "live-agent");
    }

    #[test]
    fn task_already_claimed_detects_live_owner() {
        let tmp = tempdir().unwrap();
        let layout = Layout::new(tmp.path());
        let store = SessionStore::new(&layout);
        store
            .update("b", "claude", |s| {
                s.status = SessionStatus::Working;
                s.pid = Some(std::process::id());
                s.ticket_id = Some("0a1f".into());
            })
            .unwrap();

        let claimed = store.task_already_claimed("b", "0a1f").unwrap();
        assert!(claimed.is_some());
        assert!(store.task_already_claimed("b", "ffff").unwrap().is_none());
    }

    #[test]
    fn current_thread_round_trips() {
        let tmp = tempdir().unwrap();
        let layout = Layout::new(tmp.path());
        let store = SessionStore::new(&layout);
        assert_eq!(store.get_current_thread("b").unwrap(), None);
        store.set_current_thread("b", "design").unwrap();
        assert_eq!(store.get_current_thread("b").unwrap(), Some("design".to_string()));
    }
}
