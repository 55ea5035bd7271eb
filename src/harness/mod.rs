//! Peasant Harness (spec §4.4) — an iterative prompt→invoke→parse→commit→
//! gate→review loop that drives one subprocess-backed agent to complete one
//! task, bouncing off council review before handing control back to the
//! human (King).

pub mod gates;
pub mod parsing;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::council;
use crate::errors::{KdError, KdResult};
use crate::layout::Layout;
use crate::session::{AgentSession, SessionStatus, SessionStore};
use crate::tasks::{Task, TaskHome, TaskStatus, TaskStore};
use crate::threads::ThreadStore;
use crate::worktree;

use gates::run_gates;
use parsing::{extract_last_tag, first_paragraph};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalStatus {
    Stopped,
    Blocked,
    Failed,
    NeedsKingReview,
}

pub struct HarnessContext {
    pub layout: Arc<Layout>,
    pub config: Arc<Config>,
    pub branch: String,
    pub task_home: TaskHome,
    pub task_id: String,
    pub agent: String,
    pub worktree_path: PathBuf,
    pub hand_mode: bool,
    /// Diff base for council review: a commit sha in hand-mode, the base
    /// branch name in worktree mode (spec §4.4 step 3).
    pub diff_base: String,
    pub thread: String,
}

/// Run the harness loop to completion. `cancel` is checked between
/// iterations and immediately after the blocking agent call returns (spec
/// §4.4: "Cancellation").
pub async fn run(ctx: HarnessContext, cancel: Arc<AtomicBool>) -> KdResult<FinalStatus> {
    let session_store = SessionStore::new(&ctx.layout);
    let task_store = TaskStore::new(&ctx.layout);
    let thread_store = ThreadStore::new(&ctx.layout);

    if ctx.hand_mode {
        if let Some(other) = session_store.hand_mode_collision(&ctx.branch)? {
            return Err(KdError::HandModeCollision { session: other });
        }
    }

    let agent_name = ctx.agent.clone();
    session_store.update(&ctx.branch, &agent_name, |s| {
        s.status = SessionStatus::Working;
        s.pid = None;
        s.ticket_id = Some(ctx.task_id.clone());
        s.thread_id = Some(ctx.thread.clone());
        s.hand_mode = ctx.hand_mode;
        if s.start_sha.is_none() {
            s.start_sha = Some(ctx.diff_base.clone());
        }
    })?;

    let mut iteration: u32 = 0;

    loop {
        if cancel.load(Ordering::SeqCst) {
            session_store.update(&ctx.branch, &agent_name, |s| s.status = SessionStatus::Stopped)?;
            return Ok(FinalStatus::Stopped);
        }

        iteration += 1;
        if iteration > ctx.config.max_iterations {
            session_store.update(&ctx.branch, &agent_name, |s| s.status = SessionStatus::Failed)?;
            return Ok(FinalStatus::Failed);
        }

        let task = task_store.read(&ctx.task_home, &ctx.task_id)?;
        let session = session_store
            .get(&ctx.branch, &agent_name)?
            .unwrap_or_else(|| AgentSession::new(&agent_name));

        let all_messages = thread_store.list_messages(&ctx.branch, &ctx.thread)?;
        let directives: Vec<_> = all_messages
            .iter()
            .filter(|m| m.seqno > session.last_seen_seqno && m.message.from == "king")
            .collect();
        let new_high_water = all_messages.iter().map(|m| m.seqno).max().unwrap_or(session.last_seen_seqno);

        let prompt = compose_prompt(&task, iteration, &directives.iter().map(|m| m.message.body.clone()).collect::<Vec<_>>());

        let profile = ctx
            .config
            .agents
            .get(&agent_name)
            .cloned()
            .ok_or_else(|| KdError::AgentMissing(agent_name.clone()))?;

        let stream_path = ctx.layout.stream_path(&ctx.branch, &ctx.thread, &agent_name);
        let log_path = ctx.layout.iteration_log_path(&ctx.branch, &ctx.task_id, iteration);
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| KdError::io(parent, e))?;
        }

        let query = crate::invoker::AgentQuery {
            agent: agent_name.clone(),
            prompt,
            cwd: ctx.worktree_path.clone(),
            timeout: std::time::Duration::from_secs(ctx.config.council.timeout),
            resume: session.resume_id.clone(),
            stream_path: Some(stream_path),
        };
        let response = crate::invoker::invoke(&profile, query).await?;
        std::fs::write(&log_path, &response.text).map_err(|e| KdError::io(&log_path, e))?;

        if cancel.load(Ordering::SeqCst) {
            session_store.update(&ctx.branch, &agent_name, |s| s.status = SessionStatus::Stopped)?;
            return Ok(FinalStatus::Stopped);
        }

        let status_tag = extract_last_tag(&response.text, "STATUS").unwrap_or_else(|| "CONTINUE".to_string());

        let commit_message = format!("[{}] iteration {}: {}", ctx.task_id, iteration, task.title);
        match worktree::stage_and_commit(&ctx.worktree_path, &commit_message).await {
            Ok(false) => {}
            Ok(true) => {}
            Err(e) => {
                task_store.append_worklog_only(&ctx.task_home, &ctx.task_id, &format!("commit failed: {e}"))?;
            }
        }

        let worklog_line = first_paragraph(&response.text);
        if !worklog_line.is_empty() {
            task_store.append_worklog_only(&ctx.task_home, &ctx.task_id, &worklog_line)?;
        }
        thread_store.append_message(&ctx.branch, &ctx.thread, &agent_name, None, &response.text, None)?;

        session_store.update(&ctx.branch, &agent_name, |s| {
            s.last_seen_seqno = new_high_water;
            s.resume_id = response.session_id.clone().or_else(|| s.resume_id.clone());
        })?;

        match status_tag.as_str() {
            "BLOCKED" => {
                session_store.update(&ctx.branch, &agent_name, |s| s.status = SessionStatus::Blocked)?;
                return Ok(FinalStatus::Blocked);
            }
            "DONE" => {
                if let Some(final_status) = run_termination_gate(&ctx, &task_store, &thread_store, &session_store, &agent_name).await? {
                    return Ok(final_status);
                }
                // Bounced: loop continues with task back in_progress.
            }
            _ => {
                // CONTINUE (or an unparseable tag, which the harness treats
                // as CONTINUE rather than guessing at completion).
            }
        }
    }
}

fn compose_prompt(task: &Task, iteration: u32, directives: &[String]) -> String {
    let mut out = String::new();
    out.push_str(&format!("# {}\n\n{}\n\n", task.title, task.description));
    out.push_str("## Acceptance Criteria\n");
    for item in &task.acceptance_criteria {
        out.push_str(&format!("- [{}] {}\n", if item.checked { "x" } else { " " }, item.text));
    }
    out.push_str(&format!("\nIteration: {iteration}\n\n"));
    if let Some(tail) = task.worklog.last() {
        out.push_str(&format!("## Most recent worklog entry\n{tail}\n\n"));
    }
    if !directives.is_empty() {
        out.push_str("## New directives from the King\n");
        for d in directives {
            out.push_str(&format!("- {d}\n"));
        }
        out.push('\n');
    }
    out.push_str(
        "End your response with a trailing line of exactly the form:\n\
         STATUS: DONE|BLOCKED|CONTINUE\n",
    );
    out
}

/// Runs gates, dispatches council review, and applies the bounce/approve
/// decision (spec §4.4 termination gate). Returns `Some(status)` when the
/// harness should exit, `None` when it should loop back to step 1.
async fn run_termination_gate(
    ctx: &HarnessContext,
    task_store: &TaskStore<'_>,
    thread_store: &ThreadStore<'_>,
    session_store: &SessionStore<'_>,
    agent_name: &str,
) -> KdResult<Option<FinalStatus>> {
    let gate_outcome = run_gates(&ctx.worktree_path, &ctx.config.gates).await;
    if !gate_outcome.passed {
        task_store.append_worklog_only(
            &ctx.task_home,
            &ctx.task_id,
            &format!("quality gate `{}` failed", gate_outcome.failed_command.unwrap_or_default()),
        )?;
        thread_store.append_message(&ctx.branch, &ctx.thread, agent_name, None, &gate_outcome.output, None)?;
        return Ok(None);
    }

    task_store.transition(ctx.task_home.clone(), &ctx.task_id, TaskStatus::InReview, Some("gates passed"))?;
    session_store.update(&ctx.branch, agent_name, |s| s.status = SessionStatus::AwaitingCouncil)?;

    let diff_range = worktree::diff_range(ctx.hand_mode, &ctx.diff_base);
    let diff_text = worktree::diff(&ctx.worktree_path, &diff_range).await.unwrap_or_default();
    let task = task_store.read(&ctx.task_home, &ctx.task_id)?;
    let review_prompt = format!(
        "Review this change for task {}: {}\n\nWorklog:\n{}\n\nDiff:\n{}\n\n\
         Respond with free-form review followed by a trailing line of exactly the form:\n\
         VERDICT: APPROVED|BLOCKING",
        ctx.task_id,
        task.title,
        task.worklog.join("\n"),
        diff_text
    );

    let replies = council::query_to_thread(&ctx.layout, &ctx.config, &ctx.branch, &ctx.thread, &review_prompt, None).await?;

    let mut blocking = Vec::new();
    for reply in &replies {
        let verdict = extract_last_tag(&reply.response.text, "VERDICT").unwrap_or_else(|| {
            warn!(member = %reply.member, "council reply missing VERDICT line, treating as APPROVED");
            "APPROVED".to_string()
        });
        if verdict == "BLOCKING" {
            blocking.push((reply.member.clone(), reply.response.text.clone()));
        }
    }

    let session = session_store.get(&ctx.branch, agent_name)?.unwrap_or_else(|| AgentSession::new(agent_name));

    if !blocking.is_empty() && session.review_bounce_count < ctx.config.bounce_cap {
        session_store.update(&ctx.branch, agent_name, |s| {
            s.review_bounce_count += 1;
            s.status = SessionStatus::Working;
        })?;
        task_store.transition(ctx.task_home.clone(), &ctx.task_id, TaskStatus::InProgress, Some("bounced by council review"))?;
        for (member, feedback) in &blocking {
            thread_store.append_message(
                &ctx.branch,
                &ctx.thread,
                "king",
                None,
                &format!("(relayed from {member})\n\n{feedback}"),
                None,
            )?;
        }
        info!(bounces = session.review_bounce_count + 1, "council bounced review, re-entering loop");
        return Ok(None);
    }

    session_store.update(&ctx.branch, agent_name, |s| s.status = SessionStatus::NeedsKingReview)?;
    Ok(Some(FinalStatus::NeedsKingReview))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compose_prompt_includes_status_instruction_and_directives() {
        let task = Task {
            frontmatter: crate::tasks::model::TaskFrontmatter {
                id: "0a1f".into(),
                status: TaskStatus::InProgress,
                deps: vec![],
                links: vec![],
                created: chrono::Utc::now(),
                task_type: "feature".into(),
                priority: "low".into(),
                assignee: None,
                hand_mode: None,
            },
            title: "Add retries".into(),
            description: "Retry flaky network calls.".into(),
            acceptance_criteria: vec![],
            worklog: vec!["looked at call sites".into()],
        };
        let prompt = compose_prompt(&task, 2, &["focus on the client, not the server".to_string()]);
        assert!(prompt.contains("STATUS: DONE|BLOCKED|CONTINUE"));
        assert!(prompt.contains("Iteration: 2"));
        assert!(prompt.contains("focus on the client"));
        assert!(prompt.contains("looked at call sites"));
    }
}
