//! Orchestrator behaviour against in-memory collaborators

use pretty_assertions::assert_eq;
use savesync_core::{ErrorKind, Operation, RemoteFile, SyncError, TransferError, WorldState};
use savesync_manifest::WorldName;
use savesync_test_utils::{files, GatedBackend, Harness, TEST_BUCKET, TEST_EPOCH};
use std::time::Duration;
use tokio::time::timeout;

const WAIT: Duration = Duration::from_secs(5);

#[tokio::test]
async fn second_request_for_busy_world_is_rejected_without_backend_calls() {
    let h = Harness::with_backend(GatedBackend::new()).await;
    h.scanner.set_world("Alpha", files(&[("save.dat", 100)]));

    let orch = h.orchestrator.clone();
    let first = tokio::spawn(async move { orch.run_upload("Alpha").await });
    timeout(WAIT, h.backend.wait_entered()).await.unwrap();
    assert_eq!(h.orchestrator.world_state("Alpha"), WorldState::Uploading);

    let upload = h.orchestrator.run_upload("Alpha").await.unwrap_err();
    assert_eq!(
        upload,
        SyncError::Busy {
            world: "Alpha".into(),
            active: Operation::Upload
        }
    );
    let download = h.orchestrator.run_download("Alpha").await.unwrap_err();
    assert_eq!(download.kind(), ErrorKind::Busy);

    assert_eq!(h.backend.entered_count(), 1);
    assert_eq!(h.backend.recorder().call_count(), 0);
    assert_eq!(h.scanner.scan_count(), 1);

    h.backend.release();
    let report = timeout(WAIT, first).await.unwrap().unwrap().unwrap();
    assert_eq!(report.files_transferred, 1);
    assert_eq!(h.backend.entered_count(), 1);
    assert_eq!(h.backend.recorder().call_count(), 1);
    assert_eq!(h.orchestrator.world_state("Alpha"), WorldState::Idle);
}

#[tokio::test]
async fn upload_while_download_in_flight_is_rejected() {
    let h = Harness::with_backend(GatedBackend::new()).await;
    h.scanner.set_world("Alpha", files(&[("save.dat", 100)]));
    h.backend
        .recorder()
        .set_remote("Alpha", vec![RemoteFile::new("save.dat", 120)]);

    let orch = h.orchestrator.clone();
    let download = tokio::spawn(async move { orch.run_download("Alpha").await });
    timeout(WAIT, h.backend.wait_entered()).await.unwrap();
    assert_eq!(h.orchestrator.world_state("Alpha"), WorldState::Downloading);

    let err = h.orchestrator.run_upload("Alpha").await.unwrap_err();
    assert_eq!(
        err,
        SyncError::Busy {
            world: "Alpha".into(),
            active: Operation::Download
        }
    );
    assert_eq!(h.backend.entered_count(), 1);
    assert_eq!(h.scanner.scan_count(), 0);

    h.backend.release();
    let report = timeout(WAIT, download).await.unwrap().unwrap().unwrap();
    assert_eq!(report.tracked_files, 1);
    assert_eq!(h.backend.recorder().push_count(), 0);
    assert_eq!(h.backend.recorder().pull_count(), 1);
    assert_eq!(h.orchestrator.world_state("Alpha"), WorldState::Idle);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn observers_see_whole_entries_only() {
    let h = Harness::with_backend(GatedBackend::new()).await;
    h.scanner.set_world(
        "Alpha",
        files(&[("a.dat", 10), ("b.dat", 10), ("c.dat", 10)]),
    );
    let orch = h.orchestrator.clone();
    let seed = tokio::spawn(async move { orch.run_upload("Alpha").await });
    timeout(WAIT, h.backend.wait_entered()).await.unwrap();
    h.backend.release();
    timeout(WAIT, seed).await.unwrap().unwrap().unwrap();
    let old = h.orchestrator.get_manifest_info().get_world("Alpha").cloned().unwrap();

    h.scanner.set_world(
        "Alpha",
        files(&[("a.dat", 20), ("b.dat", 20), ("d.dat", 20)]),
    );
    let orch = h.orchestrator.clone();
    let replace = tokio::spawn(async move { orch.run_upload("Alpha").await });
    timeout(WAIT, h.backend.wait_entered()).await.unwrap();

    let sample = |h: &Harness<GatedBackend>| {
        let info = h.orchestrator.get_manifest_info().get_world("Alpha").cloned();
        let seen = h.orchestrator.subscribe().current().snapshot.get_world("Alpha").cloned();
        (info, seen)
    };

    for _ in 0..20 {
        let (info, seen) = sample(&h);
        assert_eq!(info.as_ref(), Some(&old));
        assert_eq!(seen.as_ref(), Some(&old));
        tokio::task::yield_now().await;
    }

    h.backend.release();
    let mut samples = Vec::new();
    while !replace.is_finished() {
        samples.push(sample(&h));
        tokio::task::yield_now().await;
    }
    timeout(WAIT, replace).await.unwrap().unwrap().unwrap();
    samples.push(sample(&h));

    let new = h.orchestrator.get_manifest_info().get_world("Alpha").cloned().unwrap();
    assert_eq!(new.len(), 3);
    assert_eq!(new.total_bytes(), 60);
    assert!(new.get("c.dat").is_none());
    for (info, seen) in &samples {
        for entry in [info, seen] {
            let entry = entry.as_ref().unwrap();
            assert!(entry == &old || entry == &new, "torn entry: {entry:?}");
        }
    }
    let (info, seen) = samples.last().unwrap();
    assert_eq!(info.as_ref(), Some(&new));
    assert_eq!(seen.as_ref(), Some(&new));
}

#[tokio::test]
async fn immediate_reupload_transfers_nothing_but_updates_last_opened() {
    let h = Harness::new().await;
    h.scanner
        .set_world("Alpha", files(&[("save.dat", 1000), ("icon.png", 200)]));

    h.orchestrator.run_upload("Alpha").await.unwrap();
    h.clock.advance(60);
    let second = h.orchestrator.run_upload("Alpha").await.unwrap();

    assert!(second.was_noop());
    assert_eq!(h.backend.push_count(), 1);
    assert_eq!(second.last_opened, TEST_EPOCH + 60);
    assert_eq!(h.orchestrator.get_manifest_info().last_opened, TEST_EPOCH + 60);
}

#[tokio::test]
async fn removed_files_are_pushed_and_untracked() {
    let h = Harness::new().await;
    h.scanner
        .set_world("Alpha", files(&[("save.dat", 1000), ("backup.dat", 50)]));
    h.orchestrator.run_upload("Alpha").await.unwrap();

    h.scanner.set_world("Alpha", files(&[("save.dat", 1200)]));
    let report = h.orchestrator.run_upload("Alpha").await.unwrap();

    let changes = report.changes.unwrap();
    assert!(changes.modified.contains("save.dat"));
    assert!(changes.removed.contains("backup.dat"));
    assert_eq!(h.backend.pushes()[1].changes, changes);

    let manifest = h.orchestrator.get_manifest_info();
    let entry = manifest.get_world("Alpha").unwrap();
    assert_eq!(entry.len(), 1);
    assert_eq!(entry.get("save.dat").unwrap().file_size_bytes, Some(1200));
    assert_eq!(manifest.current_used_bucket, TEST_BUCKET);
}

#[tokio::test]
async fn transfer_failure_leaves_manifest_untouched() {
    let h = Harness::new().await;
    h.scanner.set_world("Alpha", files(&[("save.dat", 1000)]));
    h.orchestrator.run_upload("Alpha").await.unwrap();
    let before = h.store.persisted().unwrap();

    h.scanner.set_world("Alpha", files(&[("save.dat", 1001)]));
    h.backend
        .fail_with(TransferError::Failed("connection reset".into()));
    let err = h.orchestrator.run_upload("Alpha").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::TransferFailure);
    assert!(err.is_retryable());
    assert_eq!(h.store.persisted().unwrap(), before);
    assert_eq!(*h.orchestrator.get_manifest_info(), before);
    assert_eq!(
        h.orchestrator.world_state("Alpha"),
        WorldState::Failed {
            operation: Operation::Upload,
            message: err.to_string()
        }
    );

    h.backend.heal();
    let retry = h.orchestrator.run_upload("Alpha").await.unwrap();
    assert_eq!(retry.files_transferred, 1);
    assert_eq!(h.orchestrator.world_state("Alpha"), WorldState::Idle);
}

#[tokio::test]
async fn invalid_names_are_rejected_before_any_io() {
    let h = Harness::new().await;
    for bad in ["", "   ", "../escape", "a/b"] {
        let err = h.orchestrator.run_upload(bad).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument, "{bad:?}");
    }
    assert_eq!(h.scanner.scan_count(), 0);
    assert_eq!(h.backend.call_count(), 0);
}

#[tokio::test]
async fn missing_local_world_is_not_found() {
    let h = Harness::new().await;
    let err = h.orchestrator.run_upload("Ghost").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert_eq!(h.backend.call_count(), 0);
    assert!(h.orchestrator.world_state("Ghost").error().is_some());
}

#[tokio::test]
async fn download_of_unknown_remote_world_fails_and_can_be_acknowledged() {
    let h = Harness::new().await;
    let err = h.orchestrator.run_download("Nowhere").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(h.store.persisted().is_none());

    assert!(h.orchestrator.acknowledge("Nowhere"));
    assert!(!h.orchestrator.acknowledge("Nowhere"));
    assert_eq!(h.orchestrator.world_state("Nowhere"), WorldState::Idle);
}

#[tokio::test]
async fn download_replaces_world_entry_with_remote_listing() {
    let h = Harness::new().await;
    h.scanner
        .set_world("Alpha", files(&[("save.dat", 10), ("local-only.dat", 5)]));
    h.orchestrator.run_upload("Alpha").await.unwrap();

    h.backend.set_remote(
        "Alpha",
        vec![savesync_core::RemoteFile::new("save.dat", 20)],
    );
    let report = h.orchestrator.run_download("Alpha").await.unwrap();
    assert_eq!(report.files_transferred, 1);
    assert_eq!(report.bytes_transferred, 20);

    let manifest = h.orchestrator.get_manifest_info();
    let entry = manifest.get_world("Alpha").unwrap();
    assert_eq!(entry.len(), 1);
    assert_eq!(entry.get("save.dat").unwrap().file_size_bytes, Some(20));
}

#[tokio::test]
async fn persistence_failure_keeps_pending_snapshot_until_retry() {
    let h = Harness::new().await;
    h.scanner.set_world("Alpha", files(&[("save.dat", 1000)]));
    h.store.set_failing(true);

    let err = h.orchestrator.run_upload("Alpha").await.unwrap_err();
    assert_eq!(
        err,
        SyncError::PersistenceFailure {
            world: Some("Alpha".into()),
            message: "manifest i/o failed at memory://manifest: disk full".into()
        }
    );
    assert!(err.requires_save_retry());
    assert_eq!(h.backend.push_count(), 1);
    assert!(h.orchestrator.get_manifest_info().get_world("Alpha").is_none());
    assert!(h.orchestrator.has_pending_save().await);

    let again = h.orchestrator.retry_save().await.unwrap_err();
    assert!(again.requires_save_retry());

    h.store.set_failing(false);
    assert!(h.orchestrator.retry_save().await.unwrap());
    assert!(!h.orchestrator.has_pending_save().await);
    assert_eq!(h.store.save_count(), 1);
    assert_eq!(h.store.save_attempts(), 3);

    let manifest = h.orchestrator.get_manifest_info();
    assert_eq!(manifest.get_world("Alpha").unwrap().total_bytes(), 1000);
}

#[tokio::test]
async fn upload_after_persistence_failure_diffs_against_pending() {
    let h = Harness::new().await;
    h.scanner.set_world("Alpha", files(&[("save.dat", 1000)]));
    h.store.set_failing(true);
    h.orchestrator.run_upload("Alpha").await.unwrap_err();

    h.store.set_failing(false);
    let report = h.orchestrator.run_upload("Alpha").await.unwrap();

    assert!(report.was_noop());
    assert_eq!(h.backend.push_count(), 1);
    assert!(!h.orchestrator.has_pending_save().await);
    assert!(h.store.persisted().unwrap().contains_world("Alpha"));
}

#[tokio::test]
async fn dropped_caller_does_not_cancel_operation() {
    let h = Harness::with_backend(GatedBackend::new()).await;
    h.scanner.set_world("Alpha", files(&[("save.dat", 100)]));
    let mut refresh = h.orchestrator.subscribe();

    let orch = h.orchestrator.clone();
    let caller = tokio::spawn(async move { orch.run_upload("Alpha").await });
    timeout(WAIT, h.backend.wait_entered()).await.unwrap();
    caller.abort();

    h.backend.release();
    let update = timeout(WAIT, refresh.changed()).await.unwrap().unwrap();
    assert_eq!(update.generation, 1);
    assert!(update.snapshot.contains_world("Alpha"));
    assert_eq!(h.store.save_count(), 1);
    assert_eq!(h.orchestrator.world_state("Alpha"), WorldState::Idle);
}

#[tokio::test]
async fn worlds_are_independent() {
    let h = Harness::new().await;
    let names = ["Alpha", "Beta", "Gamma", "Delta"];
    for (i, name) in names.iter().enumerate() {
        h.scanner.set_world(name, files(&[("save.dat", i as u64 + 1)]));
    }

    let results =
        futures::future::join_all(names.iter().map(|name| h.orchestrator.run_upload(name))).await;
    assert!(results.iter().all(Result::is_ok));

    let manifest = h.orchestrator.get_manifest_info();
    let tracked: Vec<&WorldName> = manifest.list_worlds();
    assert_eq!(tracked.len(), names.len());
    assert_eq!(manifest.total_bytes(), 1 + 2 + 3 + 4);
    assert_eq!(h.store.persisted().unwrap(), *manifest);
}
