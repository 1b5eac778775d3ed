//! Integration tests for the config directory watcher.
//!
//! Most tests feed synthetic notify events through the same bounded channel
//! the real watcher uses; one test exercises a real directory.

mod common;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use barman_exporter::metrics::CheckStatus;
use barman_exporter::poller::Trigger;
use barman_exporter::watcher::{event_queue, run_event_loop, ConfigWatcher, WatchEvent};
use common::{harness, wait_until};
use notify::event::{CreateKind, DataChange, MetadataKind, ModifyKind, RemoveKind};
use notify::{Event, EventKind};
use tokio_util::sync::CancellationToken;

fn event(kind: EventKind) -> WatchEvent {
    Ok(Event::new(kind).add_path(PathBuf::from("/etc/barman.d/main.conf")))
}

/// Forwards `events` through a queue of `size`, closes it and runs the loop until it drains.
async fn drive_with_queue(h: &common::Harness, size: usize, events: Vec<WatchEvent>) {
    let (sender, queue) = event_queue(size);
    for e in events {
        sender.forward(e);
    }
    drop(sender);
    run_event_loop(queue, h.poller.clone(), CancellationToken::new()).await;
}

async fn drive(h: &common::Harness, events: Vec<WatchEvent>) {
    drive_with_queue(h, 16, events).await;
}

#[tokio::test]
async fn test_structural_event_resets_before_refresh() {
    let h = harness("main\nreplica\n", false);
    h.poller.run_cycle(Trigger::Interval).await;
    h.registry.set("removed", CheckStatus::Failed);

    h.runner.clear_calls();
    h.runner.observe(h.registry.clone());
    drive(&h, vec![event(EventKind::Create(CreateKind::File))]).await;

    // The first check of the refresh saw an empty registry.
    assert_eq!(h.runner.observed().first(), Some(&0));
    assert_eq!(h.runner.checked(), vec!["main", "replica"]);
    assert!(!h.registry.snapshot().contains_key("removed"));
    assert_eq!(h.registry.len(), 2);
}

#[tokio::test]
async fn test_metadata_only_event_is_ignored() {
    let h = harness("main\n", false);
    h.registry.set("stale", CheckStatus::Failed);

    drive(
        &h,
        vec![
            event(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions))),
            event(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Ownership))),
        ],
    )
    .await;

    assert!(h.runner.calls().is_empty());
    assert_eq!(h.registry.snapshot()["stale"], CheckStatus::Failed);
    assert!(h.stats.last_cycle().is_none());
}

#[tokio::test]
async fn test_watch_errors_do_not_stop_the_loop() {
    let h = harness("main\n", false);

    drive(
        &h,
        vec![
            Err(notify::Error::generic("inotify queue overflow")),
            event(EventKind::Remove(RemoveKind::File)),
        ],
    )
    .await;

    assert_eq!(h.runner.checked(), vec!["main"]);
}

#[tokio::test]
async fn test_queued_events_coalesce_into_one_refresh() {
    let h = harness("main\n", false);

    drive(
        &h,
        vec![
            event(EventKind::Create(CreateKind::File)),
            event(EventKind::Modify(ModifyKind::Data(DataChange::Content))),
            event(EventKind::Modify(ModifyKind::Data(DataChange::Content))),
        ],
    )
    .await;

    assert_eq!(h.runner.checked(), vec!["main"]);
    assert_eq!(
        h.stats
            .config_refreshes_total
            .load(std::sync::atomic::Ordering::Relaxed),
        1
    );
}

#[tokio::test]
async fn test_metadata_events_cannot_crowd_out_a_removal() {
    let h = harness("main\n", false);
    h.registry.set("old", CheckStatus::Failed);

    let mut events: Vec<WatchEvent> = (0..8)
        .map(|_| event(EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions))))
        .collect();
    events.push(event(EventKind::Remove(RemoveKind::File)));
    drive_with_queue(&h, 1, events).await;

    assert!(!h.registry.snapshot().contains_key("old"));
    assert_eq!(h.runner.checked(), vec!["main"]);
}

#[tokio::test]
async fn test_full_queue_still_refreshes() {
    let h = harness("main\n", false);
    h.registry.set("old", CheckStatus::Failed);

    // The error fills the only slot; the removal behind it overflows.
    drive_with_queue(
        &h,
        1,
        vec![
            Err(notify::Error::generic("inotify queue overflow")),
            event(EventKind::Remove(RemoveKind::File)),
        ],
    )
    .await;

    assert!(!h.registry.snapshot().contains_key("old"));
    assert_eq!(h.runner.checked(), vec!["main"]);
}

#[tokio::test]
async fn test_end_to_end_reset_and_repopulate() {
    let h = harness("target1\ntarget2\n", false);
    h.runner.fail_check("target2");

    h.poller.run_cycle(Trigger::Interval).await;
    let before: BTreeMap<String, CheckStatus> = h.registry.snapshot();
    assert_eq!(before["target1"], CheckStatus::Ok);
    assert_eq!(before["target2"], CheckStatus::Failed);
    assert_eq!(before.len(), 2);

    h.runner.clear_calls();
    h.runner.observe(h.registry.clone());
    drive(&h, vec![event(EventKind::Remove(RemoveKind::File))]).await;

    // Transiently empty, then repopulated with the same entries.
    assert_eq!(h.runner.observed(), vec![0, 1]);
    assert_eq!(h.registry.snapshot(), before);
}

#[tokio::test]
async fn test_loop_stops_on_cancel() {
    let h = harness("main\n", false);
    let (_sender, queue) = event_queue(4);
    let cancel = CancellationToken::new();

    let task = tokio::spawn(run_event_loop(queue, h.poller.clone(), cancel.clone()));
    cancel.cancel();

    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("watcher did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_real_directory_change_triggers_refresh() {
    let dir = tempfile::tempdir().unwrap();
    let h = harness("main\n", false);
    h.registry.set("gone", CheckStatus::Failed);

    let watcher = ConfigWatcher::new(dir.path(), 16).unwrap();
    assert_eq!(watcher.dir(), dir.path());

    let cancel = CancellationToken::new();
    let task = tokio::spawn(watcher.run(h.poller.clone(), cancel.clone()));

    std::fs::write(dir.path().join("main.conf"), "[main]\n").unwrap();

    let registry = h.registry.clone();
    let refreshed = wait_until(Duration::from_secs(10), || {
        let snapshot = registry.snapshot();
        !snapshot.contains_key("gone") && snapshot.get("main") == Some(&CheckStatus::Ok)
    })
    .await;
    assert!(refreshed, "registry was not refreshed: {:?}", h.registry.snapshot());

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("watcher did not stop")
        .unwrap();
}

#[tokio::test]
async fn test_removal_after_chmod_is_seen_with_minimal_queue() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let old = dir.path().join("old.conf");
    std::fs::write(&old, "[old]\n").unwrap();

    let h = harness("main\n", false);
    h.registry.set("old", CheckStatus::Failed);

    // Events arrive before the consumer starts.
    let watcher = ConfigWatcher::new(dir.path(), 1).unwrap();
    std::fs::set_permissions(&old, std::fs::Permissions::from_mode(0o600)).unwrap();
    std::fs::remove_file(&old).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;

    let cancel = CancellationToken::new();
    let task = tokio::spawn(watcher.run(h.poller.clone(), cancel.clone()));

    let registry = h.registry.clone();
    let refreshed = wait_until(Duration::from_secs(10), || {
        let snapshot = registry.snapshot();
        !snapshot.contains_key("old") && snapshot.get("main") == Some(&CheckStatus::Ok)
    })
    .await;
    assert!(refreshed, "registry was not refreshed: {:?}", h.registry.snapshot());

    cancel.cancel();
    tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .expect("watcher did not stop")
        .unwrap();
}
