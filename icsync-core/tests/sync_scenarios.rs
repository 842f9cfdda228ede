mod common;

use chrono::Duration;
use common::{Harness, config, event_on, now, vevent};
use icsync_core::SyncError;
use icsync_core::error::{FeedError, FetchError, StoreError};
use icsync_core::fetch::StaticFeed;
use icsync_core::marker;
use icsync_core::state::{RunStatus, StateStore, SyncLock};
use icsync_core::store::MemoryCalendarStore;
use icsync_core::sync::{
    ActionKind, META_FEED_URL, META_LAST_SYNC_AT, SyncEngine, SyncOptions, UpdateReason,
};

fn live() -> SyncOptions {
    SyncOptions::default()
}

#[tokio::test]
async fn second_run_changes_nothing() {
    let h = Harness::new(&[event_on("a", "Standup", 3), event_on("b", "Planning", 4)]);

    let first = h.engine.run_at(now(), live()).await.unwrap();
    assert_eq!(first.counts.created, 2);
    assert_eq!(first.status, RunStatus::Success);

    let second = h.engine.run_at(now(), live()).await.unwrap();
    assert_eq!(second.counts.created, 0);
    assert_eq!(second.counts.updated, 0);
    assert_eq!(second.counts.deleted, 0);
    assert_eq!(second.counts.unchanged, 2);
    assert_eq!(h.store.write_count(), 2);
    assert_eq!(h.store.entries().len(), 2);

    let runs = h.engine.state().recent_runs(10).unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.status == RunStatus::Success && r.completed_at.is_some()));
}

#[tokio::test]
async fn summary_change_updates_entry_and_ledger() {
    let h = Harness::new(&[event_on("a", "Standup", 3)]);
    h.engine.run_at(now(), live()).await.unwrap();
    let before = h.engine.state().record("a").unwrap().unwrap();

    h.set_events(&[vevent(
        "a",
        "Daily standup",
        "20240603T090000Z",
        "20240603T100000Z",
        &["SEQUENCE:1"],
    )]);
    let result = h.engine.run_at(now(), live()).await.unwrap();
    assert_eq!(result.counts.updated, 1);
    assert_eq!(result.actions[0].reason, Some(UpdateReason::ContentChanged));

    let after = h.engine.state().record("a").unwrap().unwrap();
    assert_ne!(after.content_hash, before.content_hash);
    assert_eq!(after.sequence, 1);
    assert_eq!(after.store_item_id, before.store_item_id);
    assert!(after.raw_source_data.contains("SUMMARY:Daily standup"));

    let entry = h.store.entry(&after.store_item_id).unwrap();
    assert_eq!(entry.title, "Daily standup");
}

#[tokio::test]
async fn removed_event_is_deleted() {
    let h = Harness::new(&[event_on("a", "Standup", 3), event_on("b", "Planning", 4)]);
    h.engine.run_at(now(), live()).await.unwrap();

    h.set_events(&[event_on("a", "Standup", 3)]);
    let result = h.engine.run_at(now(), live()).await.unwrap();
    assert_eq!(result.counts.deleted, 1);
    assert_eq!(result.counts.unchanged, 1);

    assert!(h.store.entries_titled("Planning").is_empty());
    assert!(h.engine.state().record("b").unwrap().is_none());
    assert_eq!(h.engine.state().record_count().unwrap(), 1);
}

#[tokio::test]
async fn removed_event_is_kept_when_orphan_deletion_is_off() {
    let mut cfg = config();
    cfg.delete_orphans = false;
    let h = Harness::with_config(cfg, &[event_on("a", "Standup", 3), event_on("b", "Planning", 4)]);
    h.engine.run_at(now(), live()).await.unwrap();

    h.set_events(&[event_on("a", "Standup", 3)]);
    let result = h.engine.run_at(now(), live()).await.unwrap();
    assert_eq!(result.counts.deleted, 0);
    assert_eq!(result.counts.unchanged, 2);

    assert_eq!(h.store.entries_titled("Planning").len(), 1);
    assert!(h.engine.state().record("b").unwrap().is_some());
}

#[tokio::test]
async fn orphan_already_gone_from_store_still_leaves_ledger() {
    let h = Harness::new(&[event_on("a", "Standup", 3)]);
    h.engine.run_at(now(), live()).await.unwrap();

    let record = h.engine.state().record("a").unwrap().unwrap();
    h.store.remove(&record.store_item_id);
    h.set_events(&[]);

    let result = h.engine.run_at(now(), live()).await.unwrap();
    assert_eq!(result.counts.deleted, 1);
    assert!(result.errors.is_empty());
    assert_eq!(h.engine.state().record_count().unwrap(), 0);
}

#[tokio::test]
async fn failed_orphan_delete_still_drops_ledger_row() {
    let h = Harness::new(&[event_on("a", "Standup", 3)]);
    h.engine.run_at(now(), live()).await.unwrap();

    h.store.fail_deletes(true);
    h.set_events(&[]);

    let result = h.engine.run_at(now(), live()).await.unwrap();
    assert_eq!(result.status, RunStatus::Partial);
    assert_eq!(result.counts.deleted, 0);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].uid, "a");
    assert_eq!(result.errors[0].operation, ActionKind::Delete);
    assert_eq!(h.engine.state().record_count().unwrap(), 0);

    // Nothing left to retry
    h.store.fail_deletes(false);
    let next = h.engine.run_at(now(), live()).await.unwrap();
    assert_eq!(next.status, RunStatus::Success);
    assert_eq!(next.counts.total(), 0);
}

#[tokio::test]
async fn duplicate_uids_keep_highest_sequence() {
    let h = Harness::new(&[
        vevent("a", "Old", "20240603T090000Z", "20240603T100000Z", &["SEQUENCE:0"]),
        vevent("a", "New", "20240603T090000Z", "20240603T100000Z", &["SEQUENCE:2"]),
    ]);

    let result = h.engine.run_at(now(), live()).await.unwrap();
    assert_eq!(result.counts.created, 1);
    assert_eq!(h.store.entries().len(), 1);
    assert_eq!(h.store.entries()[0].title, "New");
    assert_eq!(h.engine.state().record("a").unwrap().unwrap().sequence, 2);
}

#[tokio::test]
async fn moved_entry_is_found_by_marker_and_restamped() {
    let h = Harness::new(&[event_on("a", "Standup", 3)]);
    h.engine.run_at(now(), live()).await.unwrap();

    let record = h.engine.state().record("a").unwrap().unwrap();
    let (new_stable, new_local) = h.store.rekey(&record.store_item_id).unwrap();

    let result = h.engine.run_at(now(), live()).await.unwrap();
    assert_eq!(result.counts.unchanged, 1);
    assert_eq!(h.store.write_count(), 1);

    let restamped = h.engine.state().record("a").unwrap().unwrap();
    assert_eq!(restamped.store_item_id, new_stable);
    assert_eq!(restamped.store_local_id.as_deref(), Some(new_local.as_str()));
    assert_eq!(restamped.content_hash, record.content_hash);

    // Now found directly; nothing left to re-stamp.
    let again = h.engine.run_at(now(), live()).await.unwrap();
    assert_eq!(again.counts.unchanged, 1);
    assert_eq!(h.engine.state().record("a").unwrap().unwrap(), restamped);
}

#[tokio::test]
async fn entry_marked_for_another_uid_is_never_taken() {
    let h = Harness::new(&[event_on("a", "Standup", 3)]);
    let calendar = h.store.add_calendar(common::CALENDAR, true);

    // Same title and time, but it belongs to some other feed event.
    let other = h.store.insert(
        icsync_core::store::EntryDraft {
            notes: Some(marker::embed(None, "z")),
            ..draft_like("Standup", 3)
        },
        &calendar,
    );

    let result = h.engine.run_at(now(), live()).await.unwrap();
    assert_eq!(result.counts.created, 1);
    assert_eq!(h.store.entries_titled("Standup").len(), 2);
    assert_eq!(h.store.entry(&other.stable_id).unwrap(), other);
}

#[tokio::test]
async fn unmarked_legacy_entry_is_adopted() {
    let h = Harness::new(&[event_on("a", "Standup", 3)]);
    let calendar = h.store.add_calendar(common::CALENDAR, true);
    let legacy = h.store.insert(draft_like("standup", 3), &calendar);

    let result = h.engine.run_at(now(), live()).await.unwrap();
    assert_eq!(result.counts.updated, 1);
    assert_eq!(result.actions[0].reason, Some(UpdateReason::Adopted));
    assert_eq!(h.store.entries().len(), 1);

    let adopted = h.store.entry(&legacy.stable_id).unwrap();
    assert!(adopted.has_marker_for("a"));
    assert_eq!(
        h.engine.state().record("a").unwrap().unwrap().store_item_id,
        legacy.stable_id
    );
}

#[tokio::test]
async fn ledger_reset_adopts_instead_of_duplicating() {
    let h = Harness::new(&[event_on("a", "Standup", 3), event_on("b", "Planning", 4)]);
    h.engine.run_at(now(), live()).await.unwrap();

    h.engine.state().reset().unwrap();
    assert_eq!(h.engine.state().record_count().unwrap(), 0);
    assert!(h.engine.state().recent_runs(10).unwrap().is_empty());

    let result = h.engine.run_at(now(), live()).await.unwrap();
    assert_eq!(result.counts.updated, 2);
    assert!(
        result
            .actions
            .iter()
            .all(|a| a.reason == Some(UpdateReason::Adopted))
    );
    assert_eq!(h.store.entries().len(), 2);
    assert_eq!(h.engine.state().record_count().unwrap(), 2);
}

#[tokio::test]
async fn full_resync_ignores_ledger() {
    let h = Harness::new(&[event_on("a", "Standup", 3)]);
    h.engine.run_at(now(), live()).await.unwrap();

    let options = SyncOptions {
        full_resync: true,
        ..Default::default()
    };
    let result = h.engine.run_at(now(), options).await.unwrap();
    assert_eq!(result.counts.updated, 1);
    assert_eq!(result.counts.created, 0);
    assert_eq!(h.store.entries().len(), 1);
}

#[tokio::test]
async fn hand_edited_notes_get_marker_back() {
    let h = Harness::new(&[event_on("a", "Standup", 3)]);
    h.engine.run_at(now(), live()).await.unwrap();

    let record = h.engine.state().record("a").unwrap().unwrap();
    h.store.set_notes(&record.store_item_id, Some("my own notes"));

    let result = h.engine.run_at(now(), live()).await.unwrap();
    assert_eq!(result.counts.updated, 1);
    assert_eq!(result.actions[0].reason, Some(UpdateReason::MarkerMigration));
    assert!(h.store.entry(&record.store_item_id).unwrap().has_marker_for("a"));

    let settled = h.engine.run_at(now(), live()).await.unwrap();
    assert_eq!(settled.counts.unchanged, 1);
}

#[tokio::test]
async fn vanished_entry_is_recreated_only_on_change() {
    let h = Harness::new(&[event_on("a", "Standup", 3)]);
    h.engine.run_at(now(), live()).await.unwrap();

    let record = h.engine.state().record("a").unwrap().unwrap();
    h.store.remove(&record.store_item_id);

    let quiet = h.engine.run_at(now(), live()).await.unwrap();
    assert_eq!(quiet.counts.unchanged, 1);
    assert!(h.store.entries().is_empty());

    h.set_events(&[event_on("a", "Standup moved", 5)]);
    let changed = h.engine.run_at(now(), live()).await.unwrap();
    assert_eq!(changed.counts.created, 1);
    assert_eq!(h.store.entries_titled("Standup moved").len(), 1);
    assert_ne!(
        h.engine.state().record("a").unwrap().unwrap().store_item_id,
        record.store_item_id
    );
}

#[tokio::test]
async fn window_keeps_boundary_and_recurring_events() {
    let mut cfg = config();
    cfg.window_days_past = Some(30);
    cfg.window_days_future = Some(365);

    let h = Harness::with_config(
        cfg,
        &[
            // Ends exactly at the window start.
            vevent("edge-past", "Edge past", "20240502T110000Z", "20240502T120000Z", &[]),
            vevent("too-old", "Too old", "20240502T105900Z", "20240502T115900Z", &[]),
            // Starts exactly at the window end.
            vevent("edge-future", "Edge future", "20250601T120000Z", "20250601T130000Z", &[]),
            vevent("too-far", "Too far", "20250601T120100Z", "20250601T130100Z", &[]),
            vevent(
                "weekly",
                "Weekly sync",
                "20220103T090000Z",
                "20220103T100000Z",
                &["RRULE:FREQ=WEEKLY;BYDAY=MO"],
            ),
            vevent(
                "finished",
                "Finished series",
                "20220103T090000Z",
                "20220103T100000Z",
                &["RRULE:FREQ=WEEKLY;COUNT=3"],
            ),
        ],
    );

    let result = h.engine.run_at(now(), live()).await.unwrap();
    let mut created: Vec<_> = result
        .actions_of(ActionKind::Create)
        .map(|a| a.uid.as_str())
        .collect();
    created.sort_unstable();
    assert_eq!(created, vec!["edge-future", "edge-past", "weekly"]);
}

#[tokio::test]
async fn out_of_window_rows_are_kept_unless_pruning() {
    let mut cfg = config();
    cfg.window_days_past = Some(30);
    cfg.window_days_future = Some(30);
    let events = [event_on("a", "Standup", 3)];

    let h = Harness::with_config(cfg.clone(), &events);
    h.engine.run_at(now(), live()).await.unwrap();
    let later = now() + Duration::days(90);
    let result = h.engine.run_at(later, live()).await.unwrap();
    assert_eq!(result.counts.deleted, 0);
    assert_eq!(h.store.entries().len(), 1);

    cfg.prune_out_of_window = true;
    let pruning = Harness::with_config(cfg, &events);
    pruning.engine.run_at(now(), live()).await.unwrap();
    let result = pruning.engine.run_at(later, live()).await.unwrap();
    assert_eq!(result.counts.deleted, 1);
    assert!(pruning.store.entries().is_empty());
}

#[tokio::test]
async fn dry_run_writes_nothing() {
    let h = Harness::new(&[event_on("a", "Standup", 3), event_on("b", "Planning", 4)]);
    let options = SyncOptions {
        dry_run: true,
        ..Default::default()
    };

    let result = h.engine.run_at(now(), options).await.unwrap();
    assert!(result.dry_run);
    assert_eq!(result.run_id, None);
    assert_eq!(result.counts.created, 2);
    assert_eq!(result.actions.len(), 2);

    assert_eq!(h.store.write_count(), 0);
    assert!(h.store.entries().is_empty());
    assert_eq!(h.engine.state().record_count().unwrap(), 0);
    assert!(h.engine.state().recent_runs(10).unwrap().is_empty());
    assert!(h.engine.state().metadata(META_LAST_SYNC_AT).unwrap().is_none());

    // A dry run after a real one reports the pending change only.
    h.engine.run_at(now(), live()).await.unwrap();
    h.set_events(&[event_on("a", "Standup", 3)]);
    let preview = h.engine.run_at(now(), options).await.unwrap();
    assert_eq!(preview.counts.deleted, 1);
    assert_eq!(h.store.entries().len(), 2);
    assert_eq!(h.engine.state().record_count().unwrap(), 2);
}

#[tokio::test]
async fn per_event_failure_makes_run_partial() {
    let h = Harness::new(&[event_on("a", "Good", 3), event_on("b", "Broken", 4)]);
    h.store.fail_writes_titled(Some("Broken"));

    let result = h.engine.run_at(now(), live()).await.unwrap();
    assert_eq!(result.status, RunStatus::Partial);
    assert_eq!(result.counts.created, 1);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].uid, "b");
    assert_eq!(result.errors[0].operation, ActionKind::Create);
    assert!(h.engine.state().record("b").unwrap().is_none());

    let run = &h.engine.state().recent_runs(1).unwrap()[0];
    assert_eq!(run.status, RunStatus::Partial);
    assert!(run.error_message.as_deref().unwrap().contains("Broken"));

    h.store.fail_writes_titled(None);
    let retry = h.engine.run_at(now(), live()).await.unwrap();
    assert_eq!(retry.status, RunStatus::Success);
    assert_eq!(retry.counts.created, 1);
    assert_eq!(retry.counts.unchanged, 1);
}

#[tokio::test]
async fn lookup_failure_is_reported_against_planned_operation() {
    let h = Harness::new(&[event_on("a", "Standup", 3)]);
    h.store.fail_scans(true);

    let result = h.engine.run_at(now(), live()).await.unwrap();
    assert_eq!(result.status, RunStatus::Partial);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].operation, ActionKind::Create);
    assert!(h.store.entries().is_empty());

    h.store.fail_scans(false);
    h.engine.run_at(now(), live()).await.unwrap();

    // Recorded events are found by stable id without scanning
    h.store.fail_scans(true);
    let rerun = h.engine.run_at(now(), live()).await.unwrap();
    assert!(rerun.errors.is_empty());
    assert_eq!(rerun.counts.unchanged, 1);
}

#[tokio::test]
async fn revoked_access_fails_the_run() {
    let h = Harness::new(&[event_on("a", "Standup", 3)]);
    h.engine.run_at(now(), live()).await.unwrap();
    h.store.deny_access(true);

    let err = h.engine.run_at(now(), live()).await.unwrap_err();
    assert!(matches!(err, SyncError::Store(StoreError::AccessDenied(_))));

    let run = &h.engine.state().recent_runs(1).unwrap()[0];
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.completed_at.is_some());
    assert!(run.error_message.is_some());
    assert_eq!(h.engine.state().last_successful_run().unwrap().unwrap().id, 1);
}

#[tokio::test]
async fn read_only_calendar_fails_the_run() {
    let h = Harness::new(&[event_on("a", "Standup", 3)]);
    h.store.add_calendar(common::CALENDAR, false);

    let err = h.engine.run_at(now(), live()).await.unwrap_err();
    assert!(matches!(err, SyncError::Store(StoreError::NoWritableCalendar(_))));
}

#[tokio::test]
async fn fetch_and_feed_errors_fail_the_run() {
    let h = Harness::new(&[event_on("a", "Standup", 3)]);

    h.feed.remove();
    let err = h.engine.run_at(now(), live()).await.unwrap_err();
    assert!(matches!(err, SyncError::Fetch(FetchError::NotFound)));

    h.feed.set("<html><body>Service unavailable</body></html>");
    let err = h.engine.run_at(now(), live()).await.unwrap_err();
    assert!(matches!(err, SyncError::Feed(FeedError::NotICalendar)));

    let runs = h.engine.state().recent_runs(10).unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|r| r.status == RunStatus::Failed));
    assert!(h.store.entries().is_empty());
}

#[tokio::test]
async fn malformed_events_are_skipped_not_fatal() {
    let h = Harness::new(&[
        event_on("a", "Standup", 3),
        "BEGIN:VEVENT\r\nSUMMARY:No uid\r\nDTSTART:20240604T090000Z\r\nEND:VEVENT".to_string(),
        "BEGIN:VEVENT\r\nUID:no-start\r\nSUMMARY:No start\r\nEND:VEVENT".to_string(),
    ]);

    let result = h.engine.run_at(now(), live()).await.unwrap();
    assert_eq!(result.counts.created, 1);
    assert_eq!(result.skipped, 2);
    assert_eq!(result.status, RunStatus::Success);
}

#[test]
fn oversized_window_is_a_config_error() {
    let mut cfg = config();
    cfg.window_days_past = Some(u32::MAX);
    let engine = SyncEngine::new(
        cfg,
        StaticFeed::new(String::new()),
        MemoryCalendarStore::new(),
        StateStore::open_in_memory().unwrap(),
    );
    assert!(matches!(engine, Err(SyncError::Config(_))));
}

#[tokio::test]
async fn concurrent_run_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let ledger = dir.path().join("work.db");

    let h = Harness::new(&[event_on("a", "Standup", 3)]);
    let engine = h.engine.with_lock(&ledger);

    let held = SyncLock::acquire(&ledger).unwrap();
    let err = engine.run_at(now(), live()).await.unwrap_err();
    assert!(matches!(err, SyncError::AlreadyRunning(_)));
    assert!(engine.state().recent_runs(10).unwrap().is_empty());

    drop(held);
    assert!(engine.run_at(now(), live()).await.is_ok());
}

#[tokio::test]
async fn completed_run_records_metadata() {
    let h = Harness::new(&[event_on("a", "Standup", 3)]);
    h.engine.run_at(now(), live()).await.unwrap();

    let state = h.engine.state();
    assert_eq!(
        state.metadata(META_FEED_URL).unwrap().as_deref(),
        Some("https://example.com/feed.ics")
    );
    let last_sync = state.metadata(META_LAST_SYNC_AT).unwrap().unwrap();
    assert!(last_sync.starts_with("2024-06-01T12:00:"));
}

fn draft_like(title: &str, day: u32) -> icsync_core::store::EntryDraft {
    use chrono::TimeZone;
    let start = chrono::Utc.with_ymd_and_hms(2024, 6, day, 9, 0, 0).unwrap();
    icsync_core::store::EntryDraft {
        title: title.to_string(),
        notes: None,
        location: None,
        url: None,
        start,
        end: start + Duration::hours(1),
        is_all_day: false,
        alarms: Vec::new(),
        recurrence: None,
        exception_dates: Default::default(),
    }
}
