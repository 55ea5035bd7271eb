//! Task Store — CRUD and lifecycle of tasks (markdown + frontmatter), with
//! the status state machine from `model.rs` and the backlog/archive move
//! rule from spec §3 ("When a backlog task closes, it moves to the archive
//! mirror; when it reopens, it returns to the backlog").

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::errors::{KdError, KdResult};
use crate::layout::Layout;
use crate::markdown;

use super::markdown_generator::{append_worklog_entry, render_body};
use super::markdown_parser::parse_body;
use super::model::{random_task_id, Task, TaskFrontmatter, TaskStatus};

/// Where a task currently lives on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskHome {
    Branch(String),
    Backlog,
    ArchiveBacklog,
    ArchiveBranch(String),
}

pub struct TaskStore<'a> {
    layout: &'a Layout,
}

impl<'a> TaskStore<'a> {
    pub fn new(layout: &'a Layout) -> Self {
        Self { layout }
    }

    fn path_for(&self, home: &TaskHome, id: &str) -> PathBuf {
        match home {
            TaskHome::Branch(b) => self.layout.ticket_path(b, id),
            TaskHome::Backlog => self.layout.backlog_ticket_path(id),
            TaskHome::ArchiveBacklog => self.layout.archive_backlog_ticket_path(id),
            TaskHome::ArchiveBranch(b) => self.layout.archive_branch_ticket_path(b, id),
        }
    }

    /// Create a new task. `home` is `TaskHome::Branch(_)` or `TaskHome::Backlog`.
    /// Refuses a duplicate 4-hex-char ID within that home.
    pub fn create(
        &self,
        home: TaskHome,
        title: &str,
        description: &str,
        task_type: &str,
        priority: &str,
        assignee: Option<String>,
        hand_mode: Option<bool>,
    ) -> KdResult<Task> {
        let id = loop {
            let candidate = random_task_id();
            if !self.path_for(&home, &candidate).exists() {
                break candidate;
            }
        };

        let task = Task {
            frontmatter: TaskFrontmatter {
                id: id.clone(),
                status: TaskStatus::Open,
                deps: vec![],
                links: vec![],
                created: Utc::now(),
                task_type: task_type.to_string(),
                priority: priority.to_string(),
                assignee,
                hand_mode,
            },
            title: title.to_string(),
            description: description.to_string(),
            acceptance_criteria: vec![],
            worklog: vec![],
        };

        self.write(&home, &task)?;
        Ok(task)
    }

    fn write(&self, home: &TaskHome, task: &Task) -> KdResult<()> {
        let path = self.path_for(home, task.id());
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| KdError::io(parent, e))?;
        }
        let body = render_body(task);
        let doc = markdown::compose(&task.frontmatter, &body)?;
        std::fs::write(&path, doc).map_err(|e| KdError::io(&path, e))
    }

    pub fn read(&self, home: &TaskHome, id: &str) -> KdResult<Task> {
        let path = self.path_for(home, id);
        self.read_path(&path)
    }

    fn read_path(&self, path: &Path) -> KdResult<Task> {
        if !path.exists() {
            return Err(KdError::TaskNotFound(
                path.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default(),
            ));
        }
        let raw = std::fs::read_to_string(path).map_err(|e| KdError::io(path, e))?;
        let (frontmatter, body): (TaskFrontmatter, String) = markdown::parse(&raw)?;
        let parsed = parse_body(&body);
        Ok(Task {
            frontmatter,
            title: parsed.title,
            description: parsed.description,
            acceptance_criteria: parsed.acceptance_criteria,
            worklog: parsed.worklog,
        })
    }

    /// List every task under one home (branch tickets dir or backlog).
    pub fn list(&self, home: &TaskHome) -> KdResult<Vec<Task>> {
        let dir = match home {
            TaskHome::Branch(b) => self.layout.tickets_dir(b),
            TaskHome::Backlog => self.layout.backlog_tickets_dir(),
            TaskHome::ArchiveBacklog => self.layout.archive_dir().join("backlog").join("tickets"),
            TaskHome::ArchiveBranch(b) => self
                .layout
                .archive_dir()
                .join("branches")
                .join(crate::slug::slugify(b))
                .join("tickets"),
        };
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut tasks = Vec::new();
        for entry in std::fs::read_dir(&dir).map_err(|e| KdError::io(&dir, e))? {
            let entry = entry.map_err(|e| KdError::io(&dir, e))?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) == Some("md") {
                tasks.push(self.read_path(&path)?);
            }
        }
        tasks.sort_by(|a, b| a.id().cmp(b.id()));
        Ok(tasks)
    }

    /// Search a task's ID across branch, backlog, and archive homes (used by
    /// resolvers that don't know where a given ID lives up front; spec §7
    /// notes the not-found error should hint at a backlog auto-pull).
    pub fn find_any(&self, id: &str, branch_hint: Option<&str>) -> KdResult<(TaskHome, Task)> {
        if let Some(b) = branch_hint {
            let home = TaskHome::Branch(b.to_string());
            if let Ok(task) = self.read(&home, id) {
                return Ok((home, task));
            }
        }
        let home = TaskHome::Backlog;
        if let Ok(task) = self.read(&home, id) {
            return Ok((home, task));
        }
        Err(KdError::TaskNotFound(id.to_string()))
    }

    /// Apply a status transition, persist it, and append a worklog entry
    /// noting the transition. Moves backlog tasks to/from the archive
    /// mirror on close/reopen (spec §3).
    pub fn transition(
        &self,
        home: TaskHome,
        id: &str,
        next: TaskStatus,
        note: Option<&str>,
    ) -> KdResult<(TaskHome, Task)> {
        let mut task = self.read(&home, id)?;
        task.transition(next).map_err(|(from, to)| KdError::IllegalTaskTransition {
            from: from.to_string(),
            to: to.to_string(),
        })?;

        if let Some(note) = note {
            self.append_worklog(&mut task, note);
        }

        // Only the global backlog mirrors into the archive tree on
        // close/reopen (spec §3); branch tickets stay under their branch.
        let new_home = match (&home, next) {
            (TaskHome::Backlog, TaskStatus::Closed) => TaskHome::ArchiveBacklog,
            (TaskHome::ArchiveBacklog, TaskStatus::Open) => TaskHome::Backlog,
            _ => home.clone(),
        };

        self.write(&new_home, &task)?;
        if new_home != home {
            let old_path = self.path_for(&home, id);
            if old_path.exists() {
                std::fs::remove_file(&old_path).map_err(|e| KdError::io(&old_path, e))?;
            }
        }

        Ok((new_home, task))
    }

    fn append_worklog(&self, task: &mut Task, note: &str) {
        task.worklog.push(note.to_string());
    }

    /// Append a worklog entry without a status transition (harness
    /// per-iteration bookkeeping, spec §4.4 step 6).
    pub fn append_worklog_only(&self, home: &TaskHome, id: &str, entry: &str) -> KdResult<Task> {
        let mut task = self.read(home, id)?;
        task.worklog.push(entry.to_string());
        self.write(home, &task)?;
        Ok(task)
    }
}

/// Stand-alone helper used by callers that already hold raw markdown text
/// (e.g. reconstructing an edited file) and want the worklog-insertion rule
/// applied without round-tripping through `Task`.
pub fn append_worklog_raw(doc: &str, entry: &str) -> KdResult<String> {
    let (yaml, body) = crate::markdown::split_frontmatter(doc);
    let updated_body = append_worklog_entry(body, entry);
    Ok(format!("---\n{}\n---\n{}", yaml.trim_end(), updated_body))
}
