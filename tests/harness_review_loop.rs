//! Scenario 4 from spec §8: a peasant that immediately declares itself done,
//! reviewed by a council that always blocks, bounces up to the configured
//! cap and then escalates to the King rather than looping forever.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use kingdom::config::{AgentProfile, Config};
use kingdom::harness::{self, FinalStatus, HarnessContext};
use kingdom::layout::Layout;
use kingdom::session::{SessionStatus, SessionStore};
use kingdom::tasks::{TaskHome, TaskStatus, TaskStore};
use kingdom::threads::{ThreadPattern, ThreadStore};
use tempfile::tempdir;

fn write_script(dir: &std::path::Path, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(body.as_bytes()).unwrap();
    let mut perms = file.metadata().unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

#[tokio::test]
async fn three_blocking_council_rounds_escalate_to_king_review() {
    let tmp = tempdir().unwrap();
    let layout = Layout::new(tmp.path());

    // The peasant (claude) reports DONE on every single turn. Using
    // `printf '%s\n'` rather than `echo` keeps the embedded `\n` inside the
    // JSON string literal (shell `echo` escape handling isn't portable).
    let peasant = write_script(
        tmp.path(),
        "fake-claude.sh",
        "#!/bin/sh\nprintf '%s\\n' '{\"type\":\"result\",\"result\":\"Implemented it.\\nSTATUS: DONE\"}'\n",
    );
    // Both council reviewers (codex, cursor) block every round.
    let reviewer_codex = write_script(
        tmp.path(),
        "fake-codex.sh",
        "#!/bin/sh\nprintf '%s\\n' '{\"type\":\"item_completed\",\"item\":{\"type\":\"assistant_message\",\"text\":\"Not good enough.\\nVERDICT: BLOCKING\"}}'\n",
    );
    let reviewer_cursor = write_script(
        tmp.path(),
        "fake-cursor.sh",
        "#!/bin/sh\nprintf '%s\\n' '{\"type\":\"assistant\",\"text\":\"Needs more tests.\\nVERDICT: BLOCKING\"}'\n",
    );

    let mut config = Config::default();
    config.gates = vec![];
    config.bounce_cap = 3;
    config.max_iterations = 20;
    config.council.members = vec!["codex".to_string(), "cursor".to_string()];
    config.agents.insert(
        "claude".to_string(),
        AgentProfile { binary: peasant.to_string_lossy().to_string(), base_args: vec![], supports_resume: false, supports_stream_format: true },
    );
    config.agents.insert(
        "codex".to_string(),
        AgentProfile { binary: reviewer_codex.to_string_lossy().to_string(), base_args: vec![], supports_resume: false, supports_stream_format: true },
    );
    config.agents.insert(
        "cursor".to_string(),
        AgentProfile { binary: reviewer_cursor.to_string_lossy().to_string(), base_args: vec![], supports_resume: false, supports_stream_format: true },
    );

    let task_store = TaskStore::new(&layout);
    let task = task_store
        .create(TaskHome::Branch("feat-retry".into()), "Add retry", "desc", "feature", "medium", None, None)
        .unwrap();
    task_store.transition(TaskHome::Branch("feat-retry".into()), task.id(), TaskStatus::InProgress, None).unwrap();

    let thread_store = ThreadStore::new(&layout);
    thread_store.create_thread("feat-retry", "task-thread", vec!["claude".into(), "codex".into(), "cursor".into()], ThreadPattern::Work).unwrap();

    let ctx = HarnessContext {
        layout: Arc::new(layout.clone()),
        config: Arc::new(config),
        branch: "feat-retry".to_string(),
        task_home: TaskHome::Branch("feat-retry".into()),
        task_id: task.id().to_string(),
        agent: "claude".to_string(),
        // Not a real git repo: `stage_and_commit`/`diff` fail and are logged,
        // which is fine — this test only exercises the review/bounce logic.
        worktree_path: tmp.path().to_path_buf(),
        hand_mode: true,
        diff_base: "0000000000000000000000000000000000000000".to_string(),
        thread: "task-thread".to_string(),
    };

    let cancel = Arc::new(AtomicBool::new(false));
    let final_status = harness::run(ctx, cancel).await.unwrap();

    assert_eq!(final_status, FinalStatus::NeedsKingReview);

    let session_store = SessionStore::new(&layout);
    let session = session_store.get("feat-retry", "claude").unwrap().unwrap();
    assert_eq!(session.review_bounce_count, 3);
    assert_eq!(session.status, SessionStatus::NeedsKingReview);

    let task = task_store.read(&TaskHome::Branch("feat-retry".into()), task.id()).unwrap();
    assert_eq!(task.status(), TaskStatus::InReview);
}
