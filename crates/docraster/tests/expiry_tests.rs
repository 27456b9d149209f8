//! Retention: expiry markers and the sweep triggered on status reads.

mod common;

use std::time::Duration;

use chrono::Utc;
use common::{TestHarness, ALICE};
use docraster::storage::{epoch_seconds, WorkspaceStore, EXPIRY_MARKER};
use docraster::TaskState;

fn backdate(workspace: &std::path::Path) {
    let past = epoch_seconds(Utc::now() - chrono::Duration::hours(1));
    std::fs::write(workspace.join(EXPIRY_MARKER), past.to_string()).unwrap();
}

#[test]
fn status_read_sweeps_expired_workspaces() {
    let harness = TestHarness::new();
    let old = harness.submit_files(ALICE, vec![TestHarness::pdf("old.pdf")]);
    let done = harness.wait_for(ALICE, &old[0].task_id, Duration::from_secs(10));
    assert_eq!(done.state, TaskState::Completed);

    let workspace = harness.result_dir().join("1").join("old");
    assert!(workspace.is_dir());
    backdate(&workspace);

    let fresh = harness.submit_files(ALICE, vec![TestHarness::pdf("fresh.pdf")]);
    harness.wait_for(ALICE, &fresh[0].task_id, Duration::from_secs(10));

    assert!(!workspace.exists());
    assert!(harness.result_dir().join("1").join("fresh").is_dir());

    let alice = harness.principal(ALICE);
    let err = harness.service.download(&alice, &old[0].task_id).unwrap_err();
    assert_eq!(err.kind(), docraster::service::ErrorKind::NotFound);
}

#[test]
fn sweep_is_idempotent() {
    let harness = TestHarness::new();
    let views = harness.submit_files(ALICE, vec![TestHarness::pdf("gone.pdf")]);
    harness.wait_for(ALICE, &views[0].task_id, Duration::from_secs(10));

    let workspace = harness.result_dir().join("1").join("gone");
    backdate(&workspace);

    let store = WorkspaceStore::new(harness.result_dir());
    let first = store.sweep_expired(Utc::now());
    let second = harness.service.sweep();

    assert!(first.removed.contains(&workspace));
    assert_eq!(second.removed_count(), 0);
    assert!(!workspace.exists());
}

#[test]
fn unexpired_workspaces_survive() {
    let harness = TestHarness::new();
    let views = harness.submit_files(ALICE, vec![TestHarness::pdf("keep.pdf")]);
    harness.wait_for(ALICE, &views[0].task_id, Duration::from_secs(10));

    let report = harness.service.sweep();
    assert_eq!(report.removed_count(), 0);
    assert!(harness.result_dir().join("1").join("keep").is_dir());
}
