//! Per-agent runtime record (spec §3, Entity: AgentSession) and the
//! process-liveness helper used to keep §3 invariant #2 honest: a
//! `status = working` record is only trustworthy after a signal-0 probe.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Working,
    AwaitingCouncil,
    NeedsKingReview,
    Blocked,
    Done,
    Failed,
    Stopped,
}

impl SessionStatus {
    /// Sessions in these states are not candidates for `ListActiveAgents`
    /// even before the pid liveness check runs (spec §4.5).
    pub fn is_terminal_or_idle(&self) -> bool {
        matches!(
            self,
            SessionStatus::Idle | SessionStatus::Done | SessionStatus::Failed | SessionStatus::Stopped
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentSession {
    /// Opaque token the agent CLI uses to resume a conversation.
    pub resume_id: Option<String>,
    pub status: SessionStatus,
    pub pid: Option<u32>,
    pub ticket_id: Option<String>,
    pub thread_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Git commit the peasant started from (hand-mode diff base).
    pub start_sha: Option<String>,
    pub review_bounce_count: u32,
    pub hand_mode: bool,
    /// Agent backend name (e.g. "claude", "codex", "cursor").
    pub agent: String,
    /// Highest work-thread sequence number the harness has already folded
    /// into a prompt; new king directives are messages past this mark.
    #[serde(default)]
    pub last_seen_seqno: u32,
}

impl AgentSession {
    pub fn new(agent: &str) -> Self {
        let now = Utc::now();
        Self {
            resume_id: None,
            status: SessionStatus::Idle,
            pid: None,
            ticket_id: None,
            thread_id: None,
            started_at: now,
            last_activity: now,
            start_sha: None,
            review_bounce_count: 0,
            hand_mode: false,
            agent: agent.to_string(),
            last_seen_seqno: 0,
        }
    }

    /// Whether this record is a candidate for `ListActiveAgents` (still
    /// needs the caller to verify `pid` is actually alive).
    pub fn is_active_candidate(&self) -> bool {
        !self.status.is_terminal_or_idle()
    }
}

/// True if a process with the given pid is alive, probed via `kill(pid, 0)`
/// on Unix (sends no signal, just checks existence/permission).
#[cfg(unix)]
pub fn pid_is_alive(pid: u32) -> bool {
    // SAFETY: signal 0 performs no action beyond existence/permission checks.
    unsafe { libc::kill(pid as i32, 0) == 0 }
}

#[cfg(not(unix))]
pub fn pid_is_alive(_pid: u32) -> bool {
    // No portable liveness probe on non-Unix; treat as unknown-but-alive so
    // callers don't spuriously reap active sessions.
    true
}
