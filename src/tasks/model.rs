//! Task data model (spec §3, Entity: Task) and its status state machine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Open,
    InProgress,
    InReview,
    Closed,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Open => "open",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::InReview => "in_review",
            TaskStatus::Closed => "closed",
        }
    }

    /// Is `self -> next` a legal transition per spec §3?
    ///
    /// open -> in_progress (start)
    /// in_progress -> in_review (harness DONE + gates pass)
    /// in_review -> in_progress (reviewer/human reject)
    /// in_review -> closed (human accept)
    /// in_progress -> closed (direct close)
    /// closed -> open (reopen)
    pub fn can_transition_to(&self, next: TaskStatus) -> bool {
        use TaskStatus::*;
        matches!(
            (self, next),
            (Open, InProgress)
                | (InProgress, InReview)
                | (InReview, InProgress)
                | (InReview, Closed)
                | (InProgress, Closed)
                | (Closed, Open)
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// YAML frontmatter of a task markdown file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskFrontmatter {
    pub id: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub deps: Vec<String>,
    #[serde(default)]
    pub links: Vec<String>,
    pub created: DateTime<Utc>,
    #[serde(rename = "type")]
    pub task_type: String,
    pub priority: String,
    #[serde(default)]
    pub assignee: Option<String>,
    #[serde(default)]
    pub hand_mode: Option<bool>,
}

/// A single `- [ ]` / `- [x]` acceptance-criteria line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcceptanceItem {
    pub text: String,
    pub checked: bool,
}

/// Full in-memory representation of a task: frontmatter + structured body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub frontmatter: TaskFrontmatter,
    pub title: String,
    pub description: String,
    pub acceptance_criteria: Vec<AcceptanceItem>,
    pub worklog: Vec<String>,
}

impl Task {
    pub fn id(&self) -> &str {
        &self.frontmatter.id
    }

    pub fn status(&self) -> TaskStatus {
        self.frontmatter.status
    }

    /// Validate and apply a status transition in place.
    pub fn transition(&mut self, next: TaskStatus) -> Result<(), (TaskStatus, TaskStatus)> {
        if !self.frontmatter.status.can_transition_to(next) {
            return Err((self.frontmatter.status, next));
        }
        self.frontmatter.status = next;
        Ok(())
    }
}

/// Generate a fresh 4-hex-character task ID from a random source.
/// Callers must check for collisions against existing IDs before accepting one.
pub fn random_task_id() -> String {
    let bytes: [u8; 2] = uuid::Uuid::new_v4().as_bytes()[..2].try_into().unwrap();
    format!("{:02x}{:02x}", bytes[0], bytes[1])
}
