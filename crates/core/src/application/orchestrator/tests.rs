//! Orchestrator lifecycle tests over mock ports

use super::*;
use crate::port::command_executor::mocks::MockCommandExecutor;
use crate::port::id_provider::mocks::SequentialIdProvider;
use crate::port::mapping_store::mocks::InMemoryMappingStore;
use crate::port::time_provider::SystemTimeProvider;

const TOOL_ID: &str = "4d6ac2a4-3d3a-11e8-9e5c-0242ac110002";
const BACKUP: &str = "backy2 backup";
const LIST: &str = "backy2 -m ls";
const REMOVE: &str = "backy2 rm";

struct Harness {
    orchestrator: Arc<Orchestrator>,
    executor: Arc<MockCommandExecutor>,
    store: Arc<InMemoryMappingStore>,
}

fn harness(config: OrchestratorConfig) -> Harness {
    let executor = Arc::new(MockCommandExecutor::new());
    let store = Arc::new(InMemoryMappingStore::new());
    let (orchestrator, worker) = Orchestrator::new(
        config,
        executor.clone(),
        store.clone(),
        Arc::new(SequentialIdProvider::default()),
        Arc::new(SystemTimeProvider),
    );
    tokio::spawn(worker.run());
    Harness {
        orchestrator: Arc::new(orchestrator),
        executor,
        store,
    }
}

fn config() -> OrchestratorConfig {
    OrchestratorConfig::new("file:///src").with_fast_path_window(Duration::from_millis(500))
}

fn backup_output(tool_id: &str) -> String {
    format!(
        "INFO: Backed up 1/1 blocks (100.0%)\nINFO: New version: {} (Tags: [b_daily])\nINFO: Backy complete.",
        tool_id
    )
}

fn listing(rows: &[(&str, &str, &str)]) -> String {
    let mut out =
        String::from("type|date|name|snapshot_name|size|size_bytes|uid|valid|protected|tags|expire\n");
    for (uid, size_bytes, valid) in rows {
        out.push_str(&format!(
            "version|2018-04-11 12:00:00|file:///src||1|{}|{}|{}|0||\n",
            size_bytes, uid, valid
        ));
    }
    out
}

async fn wait_idle(orchestrator: &Orchestrator) {
    for _ in 0..200 {
        if orchestrator.running_backup_id().is_none() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("backup never settled");
}

#[tokio::test]
async fn test_fast_backup_settles_available_and_persists_mapping() {
    let h = harness(config());
    h.executor.script(BACKUP, backup_output(TOOL_ID), 0);

    let job = h.orchestrator.create_backup().await.unwrap();

    assert_eq!(job.id, "backup-1");
    assert_eq!(job.status, BackupStatus::Available);
    assert_eq!(job.tool_id.as_deref(), Some(TOOL_ID));
    assert_eq!(h.store.get("backup-1").await.unwrap().as_deref(), Some(TOOL_ID));
    assert!(h.orchestrator.running_backup_id().is_none());
    assert_eq!(
        h.executor.calls(),
        vec!["backy2 backup file:///src file:///src".to_string()]
    );
}

#[tokio::test]
async fn test_slow_backup_returns_running_then_resolves_via_listing() {
    let h = harness(config().with_fast_path_window(Duration::from_millis(20)));
    h.executor
        .script_delayed(BACKUP, backup_output(TOOL_ID), 0, Duration::from_millis(200));
    h.executor.script(LIST, listing(&[(TOOL_ID, "2097152", "1")]), 0);

    let job = h.orchestrator.create_backup().await.unwrap();
    assert_eq!(job.status, BackupStatus::Running);
    assert!(job.message.contains(NOT_FINISHED_MESSAGE));

    // While running the query never touches the store or the tool
    let running = h.orchestrator.get_backup(&job.id).await.unwrap();
    assert_eq!(running.status, BackupStatus::Running);
    assert!(!h.executor.calls().iter().any(|c| c.starts_with(LIST)));

    wait_idle(&h.orchestrator).await;

    let resolved = h.orchestrator.get_backup(&job.id).await.unwrap();
    assert_eq!(resolved.status, BackupStatus::Available);
    assert_eq!(resolved.size_bytes, 2_097_152);
    assert_eq!(resolved.tool_id.as_deref(), Some(TOOL_ID));
}

#[tokio::test]
async fn test_second_create_while_running_conflicts() {
    let h = harness(config().with_fast_path_window(Duration::from_millis(20)));
    h.executor
        .script_delayed(BACKUP, backup_output(TOOL_ID), 0, Duration::from_millis(300));

    let first = h.orchestrator.create_backup().await.unwrap();
    assert_eq!(first.status, BackupStatus::Running);

    let err = h.orchestrator.create_backup().await.unwrap_err();
    assert!(matches!(err, AppError::Conflict(ref msg) if msg.contains(&first.id)));

    wait_idle(&h.orchestrator).await;
    assert_eq!(h.executor.call_count(), 1, "rejected request must not be queued");
}

#[tokio::test]
async fn test_concurrent_creates_admit_exactly_one() {
    let h = harness(config().with_fast_path_window(Duration::from_millis(20)));
    h.executor
        .script_delayed(BACKUP, backup_output(TOOL_ID), 0, Duration::from_millis(300));

    let mut handles = vec![];
    for _ in 0..10 {
        let orchestrator = h.orchestrator.clone();
        handles.push(tokio::spawn(async move { orchestrator.create_backup().await }));
    }

    let mut accepted = 0;
    let mut conflicts = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(AppError::Conflict(_)) => conflicts += 1,
            Err(e) => panic!("unexpected error: {}", e),
        }
    }

    assert_eq!(accepted, 1);
    assert_eq!(conflicts, 9);
    wait_idle(&h.orchestrator).await;
    assert_eq!(h.executor.call_count(), 1);
}

#[tokio::test]
async fn test_pre_command_failure_skips_backup() {
    let h = harness(config().with_pre_backup_command("fsfreeze --freeze /data"));
    h.executor.script("fsfreeze", "device busy", 1);
    h.executor.script(BACKUP, backup_output(TOOL_ID), 0);

    let job = h.orchestrator.create_backup().await.unwrap();

    assert_eq!(job.status, BackupStatus::Failed);
    assert!(job.message.contains("pre-backup command"));
    assert!(!h.executor.calls().iter().any(|c| c.starts_with(BACKUP)));
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_failed_backup_is_never_resolvable() {
    let h = harness(config());
    h.executor.script(BACKUP, "ERROR: source unreadable", 2);

    let job = h.orchestrator.create_backup().await.unwrap();
    assert_eq!(job.status, BackupStatus::Failed);
    assert!(job.message.contains("exit=2"));

    let err = h.orchestrator.get_backup(&job.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_missing_completion_marker_fails() {
    let h = harness(config());
    h.executor.script(
        BACKUP,
        format!("INFO: New version: {} (Tags: [])", TOOL_ID),
        0,
    );

    let job = h.orchestrator.create_backup().await.unwrap();

    assert_eq!(job.status, BackupStatus::Failed);
    assert!(job.message.contains("Backy complete"));
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_timeout_fails_job() {
    let h = harness(config().with_max_running_time(Duration::from_millis(50)));
    h.executor
        .script_delayed(BACKUP, backup_output(TOOL_ID), 0, Duration::from_secs(30));

    let job = h.orchestrator.create_backup().await.unwrap();

    assert_eq!(job.status, BackupStatus::Failed);
    assert!(job.message.contains("timed out"));
    assert!(h.store.is_empty());
}

#[tokio::test]
async fn test_post_command_failure_demotes_but_keeps_mapping() {
    let h = harness(config().with_post_backup_command("fsfreeze --unfreeze /data"));
    h.executor.script(BACKUP, backup_output(TOOL_ID), 0);
    h.executor.script("fsfreeze", "not frozen", 1);

    let job = h.orchestrator.create_backup().await.unwrap();

    assert_eq!(job.status, BackupStatus::Failed);
    assert!(job.message.contains("post-backup command"));
    assert_eq!(h.store.get(&job.id).await.unwrap().as_deref(), Some(TOOL_ID));
    assert_eq!(
        h.executor.calls().last().map(String::as_str),
        Some("fsfreeze --unfreeze /data")
    );
}

#[test]
fn test_blank_hooks_are_disabled() {
    let config = config()
        .with_pre_backup_command("   ")
        .with_post_backup_command("");
    assert!(config.pre_backup_command.is_none());
    assert!(config.post_backup_command.is_none());
}

#[tokio::test]
async fn test_delete_running_backup_cancels_it() {
    let h = harness(config().with_fast_path_window(Duration::from_millis(20)));
    h.executor
        .script_delayed(BACKUP, backup_output(TOOL_ID), 0, Duration::from_secs(30));

    let job = h.orchestrator.create_backup().await.unwrap();
    assert_eq!(job.status, BackupStatus::Running);

    let cancelled = h.orchestrator.delete_backup(&job.id).await.unwrap();

    assert_eq!(cancelled.status, BackupStatus::Cancelled);
    assert!(h.orchestrator.running_backup_id().is_none());
    assert!(h.store.is_empty());

    // The slot is free again
    h.executor.script(BACKUP, backup_output(TOOL_ID), 0);
    let next = h.orchestrator.create_backup().await.unwrap();
    assert_eq!(next.status, BackupStatus::Available);
}

#[tokio::test]
async fn test_delete_during_post_command_cancels_and_keeps_mapping() {
    let h = harness(
        config()
            .with_fast_path_window(Duration::from_millis(20))
            .with_post_backup_command("sync-post"),
    );
    h.executor.script(BACKUP, backup_output(TOOL_ID), 0);
    h.executor
        .script_delayed("sync-post", "", 0, Duration::from_secs(30));

    let job = h.orchestrator.create_backup().await.unwrap();
    assert_eq!(job.status, BackupStatus::Running);
    tokio::time::sleep(Duration::from_millis(50)).await;

    let cancelled = h.orchestrator.delete_backup(&job.id).await.unwrap();

    assert_eq!(cancelled.status, BackupStatus::Cancelled);
    assert_eq!(cancelled.tool_id.as_deref(), Some(TOOL_ID));
    assert!(h.orchestrator.running_backup_id().is_none());
    assert_eq!(h.store.get(&job.id).await.unwrap().as_deref(), Some(TOOL_ID));
}

#[tokio::test]
async fn test_delete_removes_backup_and_mapping() {
    let h = harness(config());
    h.store.put("ext-1", TOOL_ID).await.unwrap();
    h.executor.script(LIST, listing(&[(TOOL_ID, "1024", "1")]), 0);
    h.executor.script(
        REMOVE,
        format!("INFO: Removed backup version {} with 3 blocks.", TOOL_ID),
        0,
    );

    let deleted = h.orchestrator.delete_backup("ext-1").await.unwrap();

    assert_eq!(deleted.status, BackupStatus::Deleted);
    assert!(h.store.get("ext-1").await.unwrap().is_none());
    assert!(h
        .executor
        .calls()
        .contains(&format!("backy2 rm {}", TOOL_ID)));

    let err = h.orchestrator.get_backup("ext-1").await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_delete_mismatched_confirmation_is_consistency_error() {
    let h = harness(config());
    h.store.put("ext-1", TOOL_ID).await.unwrap();
    h.executor.script(LIST, listing(&[(TOOL_ID, "1024", "1")]), 0);
    h.executor.script(
        REMOVE,
        "INFO: Removed backup version ffff0000-0000 with 3 blocks.",
        0,
    );

    let err = h.orchestrator.delete_backup("ext-1").await.unwrap_err();

    assert!(matches!(err, AppError::Consistency(_)));
    assert_eq!(h.store.get("ext-1").await.unwrap().as_deref(), Some(TOOL_ID));
}

#[tokio::test]
async fn test_delete_without_confirmation_marker_is_consistency_error() {
    let h = harness(config());
    h.store.put("ext-1", TOOL_ID).await.unwrap();
    h.executor.script(LIST, listing(&[(TOOL_ID, "1024", "1")]), 0);
    h.executor.script(REMOVE, "INFO: done", 0);

    let err = h.orchestrator.delete_backup("ext-1").await.unwrap_err();
    assert!(matches!(err, AppError::Consistency(ref msg) if msg.contains("remove info")));
}

#[tokio::test]
async fn test_delete_protected_backup() {
    let h = harness(config());
    h.store.put("ext-1", TOOL_ID).await.unwrap();
    h.executor.script(LIST, listing(&[(TOOL_ID, "1024", "1")]), 0);
    h.executor.script(REMOVE, "ERROR: version is too young", 100);

    let err = h.orchestrator.delete_backup("ext-1").await.unwrap_err();

    assert!(matches!(err, AppError::Protected(ref msg) if msg == PROTECTED_MESSAGE));
    assert!(h.store.get("ext-1").await.unwrap().is_some());
}

#[tokio::test]
async fn test_unknown_ids_are_not_found() {
    let h = harness(config());
    h.executor.script(LIST, listing(&[]), 0);

    assert!(matches!(
        h.orchestrator.get_backup("nope").await.unwrap_err(),
        AppError::NotFound(_)
    ));
    assert!(matches!(
        h.orchestrator.delete_backup("nope").await.unwrap_err(),
        AppError::NotFound(_)
    ));

    // Mapped, but the tool no longer lists it
    h.store.put("ext-1", TOOL_ID).await.unwrap();
    assert!(matches!(
        h.orchestrator.get_backup("ext-1").await.unwrap_err(),
        AppError::NotFound(_)
    ));
}

#[tokio::test]
async fn test_storage_failure_is_distinct_from_not_found() {
    let h = harness(config());
    h.store.set_broken(true);

    let err = h.orchestrator.get_backup("ext-1").await.unwrap_err();
    assert!(matches!(err, AppError::Storage(_)));
}

#[tokio::test]
async fn test_mapping_write_failure_fails_job() {
    let h = harness(config());
    h.executor.script(BACKUP, backup_output(TOOL_ID), 0);
    h.store.set_broken(true);

    let job = h.orchestrator.create_backup().await.unwrap();

    assert_eq!(job.status, BackupStatus::Failed);
    assert!(job.message.contains(TOOL_ID));
}

#[tokio::test]
async fn test_listing_nonzero_exit_with_rows_is_tolerated() {
    let h = harness(config());
    h.store.put("ext-1", TOOL_ID).await.unwrap();
    h.executor.script(LIST, listing(&[(TOOL_ID, "1024", "0")]), 1);

    let job = h.orchestrator.get_backup("ext-1").await.unwrap();
    assert_eq!(job.status, BackupStatus::Running);

    h.executor.script(LIST, "ERROR: database locked", 1);
    let err = h.orchestrator.get_backup("ext-1").await.unwrap_err();
    assert!(matches!(err, AppError::CommandFailed(_)));
}

#[tokio::test]
async fn test_list_backups_joins_external_ids() {
    let h = harness(config());
    h.store.put("ext-1", TOOL_ID).await.unwrap();
    h.executor.script(
        LIST,
        listing(&[(TOOL_ID, "1024", "1"), ("unmapped-0001", "x", "1")]),
        0,
    );

    let listing = h.orchestrator.list_backups().await.unwrap();

    assert!(listing.raw.starts_with("type|date"));
    assert_eq!(listing.backups.len(), 2);
    assert_eq!(listing.backups[0].id.as_deref(), Some("ext-1"));
    assert_eq!(listing.backups[1].id, None);
    assert_eq!(listing.backups[1].size_bytes, UNKNOWN_SIZE);
}

#[tokio::test]
async fn test_ensure_repository_initializes_when_probe_fails() {
    let h = harness(config());
    h.executor.script("backy2 ls", "ERROR: no such table", 1);
    h.executor.script("backy2 initdb", "INFO: initialized", 0);

    h.orchestrator.ensure_repository().await.unwrap();
    assert_eq!(
        h.executor.calls(),
        vec!["backy2 ls".to_string(), "backy2 initdb".to_string()]
    );

    h.executor.script("backy2 initdb", "ERROR: read-only", 1);
    let err = h.orchestrator.ensure_repository().await.unwrap_err();
    assert!(matches!(err, AppError::CommandFailed(_)));
}

#[tokio::test]
async fn test_shutdown_cancels_running_backup() {
    let h = harness(config().with_fast_path_window(Duration::from_millis(20)));
    h.executor
        .script_delayed(BACKUP, backup_output(TOOL_ID), 0, Duration::from_secs(30));

    let job = h.orchestrator.create_backup().await.unwrap();
    assert_eq!(job.status, BackupStatus::Running);

    h.orchestrator.shutdown();
    wait_idle(&h.orchestrator).await;
    assert!(h.store.is_empty());
}
