use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use kingdom::config::Config;
use kingdom::council;
use kingdom::doctor;
use kingdom::harness::{self, HarnessContext};
use kingdom::layout::Layout;
use kingdom::session::{AgentSession, SessionStore};
use kingdom::tasks::{TaskHome, TaskStatus, TaskStore};
use kingdom::telemetry::CouncilTelemetry;
use kingdom::threads::{ThreadPattern, ThreadStore};
use kingdom::tui::ChatApp;
use kingdom::worktree;

#[derive(Parser)]
#[command(name = "kd", about = "Kingdom — a workflow orchestrator for multi-agent development", version)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Repository root. Defaults to the current git checkout's top level.
    #[arg(long, global = true)]
    repo: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "KD_LOG", default_value = "info")]
    log: String,
}

#[derive(Subcommand)]
enum Command {
    /// Create a task on a branch (or in the backlog with `--backlog`).
    Create {
        title: String,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long)]
        backlog: bool,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long, default_value = "feature")]
        task_type: String,
        #[arg(long, default_value = "medium")]
        priority: String,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long)]
        hand: bool,
    },
    /// Start the peasant harness on an existing task.
    Start {
        task_id: String,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long, default_value = "claude")]
        agent: String,
        #[arg(long)]
        hand: bool,
    },
    /// Accept a task that's awaiting king review: merge its feature branch
    /// (worktree mode) or leave it in place (hand-mode), then close it.
    Accept {
        task_id: String,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long, default_value = "claude")]
        agent: String,
    },
    /// Reject a task awaiting king review: reset the bounce count and
    /// relaunch the harness directly in the base checkout, not a worktree.
    Reject {
        task_id: String,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long, default_value = "claude")]
        agent: String,
    },
    /// Query the council (one or all configured advisors) and append replies
    /// to a thread.
    Council {
        prompt: String,
        #[arg(long)]
        branch: Option<String>,
        #[arg(long, default_value = "council")]
        thread: String,
        #[arg(long, value_delimiter = ',')]
        targets: Option<Vec<String>>,
    },
    /// Open the interactive group chat TUI on a thread.
    Chat {
        #[arg(long)]
        branch: Option<String>,
        #[arg(long, default_value = "council")]
        thread: String,
    },
    /// Report (and optionally prune) stale sessions and orphaned worktrees.
    Doctor {
        #[arg(long)]
        prune: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt().with_env_filter(args.log.clone()).compact().init();

    let repo_root = match args.repo {
        Some(p) => p,
        None => git_repo_root().await.context("not inside a git checkout; pass --repo")?,
    };
    let layout = Layout::new(repo_root.clone());
    let config = Config::load(&layout)?;

    match args.command {
        Command::Create { title, branch, backlog, description, task_type, priority, assignee, hand } => {
            run_create(&layout, title, branch, backlog, description, task_type, priority, assignee, hand)?;
        }
        Command::Start { task_id, branch, agent, hand } => {
            run_start(&layout, &config, &repo_root, task_id, branch, agent, hand).await?;
        }
        Command::Accept { task_id, branch, agent } => {
            run_accept(&layout, &repo_root, task_id, branch, agent).await?;
        }
        Command::Reject { task_id, branch, agent } => {
            run_reject(&layout, &config, &repo_root, task_id, branch, agent).await?;
        }
        Command::Council { prompt, branch, thread, targets } => {
            run_council(&layout, &config, branch, thread, prompt, targets).await?;
        }
        Command::Chat { branch, thread } => {
            run_chat(layout, config, branch, thread).await?;
        }
        Command::Doctor { prune } => {
            let report = doctor::run(&layout, &repo_root, prune).await?;
            print_doctor_report(&report);
        }
    }

    Ok(())
}

async fn git_repo_root() -> Result<PathBuf> {
    let output = tokio::process::Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .output()
        .await
        .context("failed to run git")?;
    if !output.status.success() {
        bail!("git rev-parse --show-toplevel failed: {}", String::from_utf8_lossy(&output.stderr));
    }
    Ok(PathBuf::from(String::from_utf8_lossy(&output.stdout).trim()))
}

async fn git_current_branch() -> Result<String> {
    let output = tokio::process::Command::new("git")
        .args(["rev-parse", "--abbrev-ref", "HEAD"])
        .output()
        .await
        .context("failed to run git")?;
    if !output.status.success() {
        bail!("git rev-parse --abbrev-ref HEAD failed: {}", String::from_utf8_lossy(&output.stderr));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn run_create(
    layout: &Layout,
    title: String,
    branch: Option<String>,
    backlog: bool,
    description: String,
    task_type: String,
    priority: String,
    assignee: Option<String>,
    hand: bool,
) -> Result<()> {
    let store = TaskStore::new(layout);
    let home = if backlog {
        TaskHome::Backlog
    } else {
        let branch = branch.context("--branch is required unless --backlog is set")?;
        TaskHome::Branch(branch)
    };
    let task = store.create(home.clone(), &title, &description, &task_type, &priority, assignee, Some(hand))?;
    let path = match &home {
        TaskHome::Branch(b) => layout.ticket_path(b, task.id()),
        TaskHome::Backlog => layout.backlog_ticket_path(task.id()),
        TaskHome::ArchiveBacklog | TaskHome::ArchiveBranch(_) => unreachable!("create never targets an archive home"),
    };
    println!("{}", path.display());
    Ok(())
}

async fn run_start(
    layout: &Layout,
    config: &Config,
    repo_root: &std::path::Path,
    task_id: String,
    branch: Option<String>,
    agent: String,
    hand: bool,
) -> Result<()> {
    let branch = match branch {
        Some(b) => b,
        None => git_current_branch().await?,
    };

    let task_store = TaskStore::new(layout);
    let (home, _) = task_store.find_any(&task_id, Some(&branch))?;
    let (home, task) = task_store.transition(home, &task_id, TaskStatus::InProgress, Some("started by king"))?;

    let worktree_path = if hand {
        repo_root.to_path_buf()
    } else {
        worktree::create(layout, repo_root, &task_id, &task.title).await?.path
    };
    let diff_base = if hand {
        worktree::current_head(repo_root).await?
    } else {
        branch.clone()
    };

    let thread_store = ThreadStore::new(layout);
    let thread_name = format!("task-{task_id}");
    if thread_store.read_thread_meta(&branch, &thread_name).is_err() {
        thread_store.create_thread(&branch, &thread_name, vec![agent.clone()], ThreadPattern::Work)?;
    }

    let session_store = SessionStore::new(layout);
    session_store.update(&branch, &agent, |s: &mut AgentSession| {
        s.ticket_id = Some(task_id.clone());
        s.hand_mode = hand;
        s.start_sha = Some(diff_base.clone());
    })?;

    let ctx = HarnessContext {
        layout: Arc::new(layout.clone()),
        config: Arc::new(config.clone()),
        branch,
        task_home: home,
        task_id,
        agent,
        worktree_path,
        hand_mode: hand,
        diff_base,
        thread: thread_name,
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let final_status = harness::run(ctx, cancel).await?;
    println!("{final_status:?}");
    Ok(())
}

/// `kd accept` — the human (King) approval step that closes a task sitting
/// in `in_review`. Worktree-mode tasks merge their feature branch into the
/// checked-out branch first; hand-mode tasks have no separate branch to
/// merge, since the peasant already worked directly on it.
async fn run_accept(layout: &Layout, repo_root: &std::path::Path, task_id: String, branch: Option<String>, agent: String) -> Result<()> {
    let branch = match branch {
        Some(b) => b,
        None => git_current_branch().await?,
    };

    let task_store = TaskStore::new(layout);
    let (home, task) = task_store.find_any(&task_id, Some(&branch))?;
    let hand_mode = task.frontmatter.hand_mode.unwrap_or(false);

    if !hand_mode {
        let actual = worktree::current_branch(repo_root).await?;
        if actual != branch {
            bail!(kingdom::errors::KdError::WrongBranch { expected: branch.clone(), actual });
        }
        let feature_branch = worktree::branch_name(&task_id, &task.title);
        worktree::merge(repo_root, &feature_branch).await?;
        let path = layout.worktree_path(&task_id);
        if path.exists() {
            let _ = worktree::remove(repo_root, &path, false).await;
        }
    }

    task_store.transition(home, &task_id, TaskStatus::Closed, Some("accepted by king"))?;
    let session_store = SessionStore::new(layout);
    session_store.update(&branch, &agent, |s: &mut AgentSession| {
        s.status = kingdom::session::SessionStatus::Done;
    })?;
    println!("task {task_id} accepted and closed");
    Ok(())
}

/// `kd reject` — sends a task in `in_review` back to `in_progress`, resets
/// the bounce count (spec §3 invariant #4), and relaunches the harness in
/// the base checkout rather than a (new or existing) worktree.
async fn run_reject(
    layout: &Layout,
    config: &Config,
    repo_root: &std::path::Path,
    task_id: String,
    branch: Option<String>,
    agent: String,
) -> Result<()> {
    let branch = match branch {
        Some(b) => b,
        None => git_current_branch().await?,
    };

    let task_store = TaskStore::new(layout);
    let (home, _) = task_store.find_any(&task_id, Some(&branch))?;
    let (home, _) = task_store.transition(home, &task_id, TaskStatus::InProgress, Some("rejected by king, relaunching"))?;

    let path = layout.worktree_path(&task_id);
    if path.exists() {
        let _ = worktree::remove(repo_root, &path, true).await;
    }

    let diff_base = worktree::current_head(repo_root).await?;
    let session_store = SessionStore::new(layout);
    session_store.update(&branch, &agent, |s: &mut AgentSession| {
        s.review_bounce_count = 0;
        s.hand_mode = true;
        s.start_sha = Some(diff_base.clone());
    })?;

    let thread_store = ThreadStore::new(layout);
    let thread_name = format!("task-{task_id}");
    if thread_store.read_thread_meta(&branch, &thread_name).is_err() {
        thread_store.create_thread(&branch, &thread_name, vec![agent.clone()], ThreadPattern::Work)?;
    }

    let ctx = HarnessContext {
        layout: Arc::new(layout.clone()),
        config: Arc::new(config.clone()),
        branch,
        task_home: home,
        task_id,
        agent,
        worktree_path: repo_root.to_path_buf(),
        hand_mode: true,
        diff_base,
        thread: thread_name,
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let final_status = harness::run(ctx, cancel).await?;
    println!("{final_status:?}");
    Ok(())
}

async fn run_council(
    layout: &Layout,
    config: &Config,
    branch: Option<String>,
    thread: String,
    prompt: String,
    targets: Option<Vec<String>>,
) -> Result<()> {
    let branch = match branch {
        Some(b) => b,
        None => git_current_branch().await?,
    };
    let thread_store = ThreadStore::new(layout);
    if thread_store.read_thread_meta(&branch, &thread).is_err() {
        thread_store.create_thread(&branch, &thread, config.council.members.clone(), ThreadPattern::Council)?;
    }
    let replies = council::query_to_thread(layout, config, &branch, &thread, &prompt, targets.as_deref()).await?;

    let mut telemetry = CouncilTelemetry::new();
    telemetry.record(&replies);

    for reply in replies {
        let body = reply.response.error.unwrap_or(reply.response.text);
        println!("--- {} ---\n{}\n", reply.member, body);
    }
    println!("--- council telemetry ---\n{}", telemetry.summary());
    Ok(())
}

async fn run_chat(layout: Layout, config: Config, branch: Option<String>, thread: String) -> Result<()> {
    let branch = match branch {
        Some(b) => b,
        None => git_current_branch().await?,
    };
    let thread_store = ThreadStore::new(&layout);
    if thread_store.read_thread_meta(&branch, &thread).is_err() {
        thread_store.create_thread(&branch, &thread, config.council.members.clone(), ThreadPattern::Council)?;
    }

    let mut app = ChatApp::new(layout, config, branch, thread);
    let mut terminal = ratatui::init();
    let result = app.run(&mut terminal).await;
    ratatui::restore();
    result.map_err(Into::into)
}

fn print_doctor_report(report: &doctor::DoctorReport) {
    if report.stale_sessions.is_empty() && report.stale_worktrees.is_empty() {
        println!("nothing to report");
        return;
    }
    for s in &report.stale_sessions {
        println!("stale session: {}/{} (pid {:?}){}", s.branch, s.agent, s.pid, if report.pruned { " — pruned" } else { "" });
    }
    for w in &report.stale_worktrees {
        println!("orphaned worktree: {}{}", w.path.display(), if report.pruned { " — removed" } else { "" });
    }
}
