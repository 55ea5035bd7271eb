//! Scenario 1 and scenario 6 from spec §8: task create/start transitions and
//! the backlog close/reopen archive round-trip.

use kingdom::layout::Layout;
use kingdom::tasks::{TaskHome, TaskStatus, TaskStore};
use tempfile::tempdir;

#[test]
fn create_then_start_moves_task_to_in_progress() {
    let tmp = tempdir().unwrap();
    let layout = Layout::new(tmp.path());
    let store = TaskStore::new(&layout);

    let task = store
        .create(TaskHome::Branch("feat-retry".into()), "Add retry", "", "feature", "medium", None, None)
        .unwrap();
    assert_eq!(task.status(), TaskStatus::Open);

    let path = layout.ticket_path("feat-retry", task.id());
    assert!(path.exists());

    let (home, started) = store
        .transition(TaskHome::Branch("feat-retry".into()), task.id(), TaskStatus::InProgress, Some("started by king"))
        .unwrap();
    assert_eq!(home, TaskHome::Branch("feat-retry".into()));
    assert_eq!(started.status(), TaskStatus::InProgress);
}

#[test]
fn backlog_task_round_trips_through_archive_on_close_and_reopen() {
    let tmp = tempdir().unwrap();
    let layout = Layout::new(tmp.path());
    let store = TaskStore::new(&layout);

    let task = store.create(TaskHome::Backlog, "Triage crash reports", "", "bug", "high", None, None).unwrap();
    let id = task.id().to_string();
    assert!(layout.backlog_ticket_path(&id).exists());

    // open -> in_progress -> closed: lands in the archive mirror.
    let (home, _) = store.transition(TaskHome::Backlog, &id, TaskStatus::InProgress, None).unwrap();
    let (home, closed) = store.transition(home, &id, TaskStatus::Closed, Some("fixed")).unwrap();
    assert_eq!(home, TaskHome::ArchiveBacklog);
    assert_eq!(closed.status(), TaskStatus::Closed);
    assert!(layout.archive_backlog_ticket_path(&id).exists());
    assert!(!layout.backlog_ticket_path(&id).exists());

    // reopen: back to the live backlog.
    let (home, reopened) = store.transition(home, &id, TaskStatus::Open, Some("reopened")).unwrap();
    assert_eq!(home, TaskHome::Backlog);
    assert_eq!(reopened.status(), TaskStatus::Open);
    assert!(layout.backlog_ticket_path(&id).exists());
    assert!(!layout.archive_backlog_ticket_path(&id).exists());
}
