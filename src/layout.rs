//! Repository layout — resolves on-disk paths for branches, tasks, threads,
//! sessions, and worktrees. Pure naming; never touches git itself.
//!
//! Canonical layout (see spec §6):
//!
//! ```text
//! <repo>/.kd/
//!   config.json
//!   branches/<slug>/
//!     design.md
//!     tickets/<id>.md
//!     threads/<slug>/
//!       thread.json
//!       NNNN-<sender>.md
//!       .stream-<m>.jsonl
//!     sessions/<name>.json
//!     logs/…
//!     state.json
//!   backlog/tickets/<id>.md
//!   archive/…
//!   worktrees/<id>/
//! ```

use std::path::{Path, PathBuf};

use crate::slug::slugify;

/// Resolves every path the rest of the crate needs, rooted at a repository
/// checkout. Cheap to construct; holds no state beyond the root path.
#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    /// `repo_root` is the top of the git checkout (the directory containing `.git`).
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            root: repo_root.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn kd_dir(&self) -> PathBuf {
        self.root.join(".kd")
    }

    pub fn config_path(&self) -> PathBuf {
        self.kd_dir().join("config.json")
    }

    pub fn branches_dir(&self) -> PathBuf {
        self.kd_dir().join("branches")
    }

    /// Branch directory for a human-chosen branch name. Normalizes to a slug.
    pub fn branch_dir(&self, branch_name: &str) -> PathBuf {
        self.branches_dir().join(slugify(branch_name))
    }

    pub fn design_path(&self, branch_name: &str) -> PathBuf {
        self.branch_dir(branch_name).join("design.md")
    }

    pub fn tickets_dir(&self, branch_name: &str) -> PathBuf {
        self.branch_dir(branch_name).join("tickets")
    }

    pub fn ticket_path(&self, branch_name: &str, task_id: &str) -> PathBuf {
        self.tickets_dir(branch_name).join(format!("{task_id}.md"))
    }

    pub fn backlog_dir(&self) -> PathBuf {
        self.kd_dir().join("backlog")
    }

    pub fn backlog_tickets_dir(&self) -> PathBuf {
        self.backlog_dir().join("tickets")
    }

    pub fn backlog_ticket_path(&self, task_id: &str) -> PathBuf {
        self.backlog_tickets_dir().join(format!("{task_id}.md"))
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.kd_dir().join("archive")
    }

    pub fn archive_backlog_ticket_path(&self, task_id: &str) -> PathBuf {
        self.archive_dir()
            .join("backlog")
            .join("tickets")
            .join(format!("{task_id}.md"))
    }

    pub fn archive_branch_ticket_path(&self, branch_name: &str, task_id: &str) -> PathBuf {
        self.archive_dir()
            .join("branches")
            .join(slugify(branch_name))
            .join("tickets")
            .join(format!("{task_id}.md"))
    }

    pub fn threads_dir(&self, branch_name: &str) -> PathBuf {
        self.branch_dir(branch_name).join("threads")
    }

    pub fn thread_dir(&self, branch_name: &str, thread_name: &str) -> PathBuf {
        self.threads_dir(branch_name).join(slugify(thread_name))
    }

    pub fn thread_meta_path(&self, branch_name: &str, thread_name: &str) -> PathBuf {
        self.thread_dir(branch_name, thread_name).join("thread.json")
    }

    pub fn stream_path(&self, branch_name: &str, thread_name: &str, member: &str) -> PathBuf {
        self.thread_dir(branch_name, thread_name)
            .join(format!(".stream-{}.jsonl", slugify(member)))
    }

    pub fn sessions_dir(&self, branch_name: &str) -> PathBuf {
        self.branch_dir(branch_name).join("sessions")
    }

    pub fn session_path(&self, branch_name: &str, agent_name: &str) -> PathBuf {
        self.sessions_dir(branch_name)
            .join(format!("{agent_name}.json"))
    }

    pub fn logs_dir(&self, branch_name: &str) -> PathBuf {
        self.branch_dir(branch_name).join("logs")
    }

    pub fn iteration_log_path(&self, branch_name: &str, task_id: &str, iteration: u32) -> PathBuf {
        self.logs_dir(branch_name)
            .join(format!("{task_id}-iter-{iteration:04}.log"))
    }

    pub fn state_path(&self, branch_name: &str) -> PathBuf {
        self.branch_dir(branch_name).join("state.json")
    }

    pub fn worktrees_dir(&self) -> PathBuf {
        self.kd_dir().join("worktrees")
    }

    pub fn worktree_path(&self, task_id: &str) -> PathBuf {
        self.worktrees_dir().join(task_id)
    }
}
