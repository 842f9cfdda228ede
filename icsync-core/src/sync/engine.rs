use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::config::SyncConfig;
use crate::error::{StoreError, SyncError, SyncResult};
use crate::event::CalendarEvent;
use crate::fetch::{FeedSource, HttpFeed};
use crate::fingerprint::fingerprint;
use crate::ics::FeedParser;
use crate::recurrence::occurs_within;
use crate::resolve::{EventResolver, Resolution};
use crate::state::{RunStatus, StateStore, SyncLock, SyncedEventRecord, format_timestamp};
use crate::store::{CalendarRef, CalendarStore, EntryDraft, LocalCalendarStore, StoreEntry};
use crate::sync::plan::{ActionKind, Plan, plan_recorded, plan_unrecorded};
use crate::sync::result::{RunResult, SyncOptions};

pub const META_LAST_SYNC_AT: &str = "last_sync_at";
pub const META_LAST_RUN_STATUS: &str = "last_run_status";
pub const META_FEED_URL: &str = "feed_url";

/// One feed mirrored into one calendar.
pub struct SyncEngine<F: FeedSource, S: CalendarStore> {
    config: SyncConfig,
    feed: F,
    store: S,
    state: StateStore,
    parser: FeedParser,
    /// Ledger file guarded by the run lock; None skips locking
    lock_path: Option<PathBuf>,
}

impl SyncEngine<HttpFeed, LocalCalendarStore> {
    /// The engine the CLI runs: HTTP feed, `.ics` directory, on-disk ledger.
    pub fn from_config(config: SyncConfig) -> SyncResult<Self> {
        let feed = HttpFeed::from_config(&config)?;
        let store = LocalCalendarStore::new(config.calendar_path());
        let ledger = config.ledger_path()?;
        let state = StateStore::open(&ledger)?;

        Ok(SyncEngine::new(config, feed, store, state)?.with_lock(ledger))
    }
}

impl<F: FeedSource, S: CalendarStore> SyncEngine<F, S> {
    pub fn new(config: SyncConfig, feed: F, store: S, state: StateStore) -> SyncResult<Self> {
        config.validate()?;
        let parser = FeedParser::new(config.timezone()?);
        Ok(SyncEngine {
            config,
            feed,
            store,
            state,
            parser,
            lock_path: None,
        })
    }

    /// Hold the advisory lock for `ledger_path` while running.
    pub fn with_lock(mut self, ledger_path: impl Into<PathBuf>) -> Self {
        self.lock_path = Some(ledger_path.into());
        self
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn state(&self) -> &StateStore {
        &self.state
    }

    pub async fn run(&self, options: SyncOptions) -> SyncResult<RunResult> {
        self.run_at(Utc::now(), options).await
    }

    /// One delta pass, with `now` anchoring the window and history timestamps.
    #[tracing::instrument(
        skip(self),
        fields(feed = %self.config.source_url, calendar = %self.config.calendar_name)
    )]
    pub async fn run_at(&self, now: DateTime<Utc>, options: SyncOptions) -> SyncResult<RunResult> {
        let _lock = match &self.lock_path {
            Some(path) => Some(SyncLock::acquire(path)?),
            None => None,
        };

        let clock = Instant::now();
        let run_id = if options.dry_run {
            None
        } else {
            Some(self.state.begin_run(now)?)
        };

        let mut result = RunResult::new(run_id, options.dry_run);
        let outcome = self.execute(now, options, &mut result).await;
        let completed_at = now + chrono::Duration::from_std(clock.elapsed()).unwrap_or_default();

        match outcome {
            Ok(()) => {
                result.finish();
                if let Some(run_id) = run_id {
                    self.state.complete_run(
                        run_id,
                        completed_at,
                        result.status,
                        &result.counts,
                        result.first_error().as_deref(),
                    )?;
                    self.state.set_metadata(META_LAST_SYNC_AT, &format_timestamp(&completed_at))?;
                    self.state.set_metadata(META_LAST_RUN_STATUS, result.status.as_str())?;
                    self.state.set_metadata(META_FEED_URL, &self.config.source_url)?;
                }

                tracing::info!(
                    status = %result.status,
                    created = result.counts.created,
                    updated = result.counts.updated,
                    deleted = result.counts.deleted,
                    unchanged = result.counts.unchanged,
                    errors = result.errors.len(),
                    dry_run = options.dry_run,
                    "Sync finished"
                );
                Ok(result)
            }
            Err(error) => {
                if let Some(run_id) = run_id {
                    self.close_failed_run(run_id, completed_at, &result, &error);
                }
                tracing::error!(%error, "Sync failed");
                Err(error)
            }
        }
    }

    fn close_failed_run(
        &self,
        run_id: i64,
        completed_at: DateTime<Utc>,
        result: &RunResult,
        error: &SyncError,
    ) {
        let message = error.to_string();
        let closed = self
            .state
            .complete_run(run_id, completed_at, RunStatus::Failed, &result.counts, Some(&message))
            .and_then(|()| {
                self.state
                    .set_metadata(META_LAST_RUN_STATUS, RunStatus::Failed.as_str())
            });
        if let Err(e) = closed {
            tracing::warn!(run_id, error = %e, "Could not record failed run");
        }
    }

    async fn execute(
        &self,
        now: DateTime<Utc>,
        options: SyncOptions,
        result: &mut RunResult,
    ) -> SyncResult<()> {
        let body = self.feed.fetch().await?;
        let feed = self.parser.parse(&body)?;
        result.skipped = feed.skipped.len();

        let window = self.config.window(now);
        let feed_uids: HashSet<String> = feed.events.iter().map(|e| e.uid.clone()).collect();
        let total = feed.events.len();

        let in_window: Vec<CalendarEvent> = feed
            .events
            .into_iter()
            .filter(|event| occurs_within(event, &window))
            .collect();
        let events = dedup_by_uid(in_window);

        tracing::debug!(
            total,
            in_window = events.len(),
            skipped = result.skipped,
            "Feed parsed"
        );

        let calendar = self.calendar(options.dry_run)?;

        let ledger: HashMap<String, SyncedEventRecord> = if options.full_resync {
            HashMap::new()
        } else {
            self.state
                .all_records()?
                .into_iter()
                .map(|record| (record.source_uid.clone(), record))
                .collect()
        };

        for event in &events {
            self.sync_event(
                event,
                ledger.get(&event.uid),
                calendar.as_ref(),
                now,
                options.dry_run,
                result,
            )?;
        }

        // A ledger row is orphaned when its uid left the feed. Rows for events
        // still in the feed but outside the window only count when pruning.
        let keep: HashSet<&str> = if self.config.prune_out_of_window {
            events.iter().map(|e| e.uid.as_str()).collect()
        } else {
            feed_uids.iter().map(String::as_str).collect()
        };

        let mut orphans: Vec<&SyncedEventRecord> = ledger
            .values()
            .filter(|record| !keep.contains(record.source_uid.as_str()))
            .collect();
        orphans.sort_by(|a, b| a.source_uid.cmp(&b.source_uid));

        for record in orphans {
            self.remove_orphan(record, calendar.as_ref(), options.dry_run, result)?;
        }

        Ok(())
    }

    /// The destination calendar. A dry run never creates it, so it may be None.
    fn calendar(&self, dry_run: bool) -> SyncResult<Option<CalendarRef>> {
        let name = &self.config.calendar_name;
        let create = self.config.create_calendar_if_missing;

        if !dry_run {
            return Ok(Some(self.store.resolve_or_create_calendar(name, create)?));
        }

        match self.store.resolve_or_create_calendar(name, false) {
            Ok(calendar) => Ok(Some(calendar)),
            Err(StoreError::CalendarNotFound(_)) if create => {
                tracing::info!(calendar = %name, "Calendar would be created");
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn sync_event(
        &self,
        event: &CalendarEvent,
        record: Option<&SyncedEventRecord>,
        calendar: Option<&CalendarRef>,
        now: DateTime<Utc>,
        dry_run: bool,
        result: &mut RunResult,
    ) -> SyncResult<()> {
        let content_hash = fingerprint(event);

        let plan = match self.plan(event, &content_hash, record, calendar) {
            Ok(plan) => plan,
            Err(e) => {
                let operation = match record {
                    Some(_) => ActionKind::Update,
                    None => ActionKind::Create,
                };
                return absorb(result, &event.uid, operation, e);
            }
        };

        tracing::debug!(uid = %event.uid, action = %plan.kind(), reason = ?plan.reason(), "Planned");

        let kind = plan.kind();
        let reason = plan.reason();

        if !dry_run {
            let applied = match plan {
                Plan::Create => match calendar {
                    Some(calendar) => self
                        .store
                        .create(&self.draft(event), calendar)
                        .map(Some),
                    None => Ok(None),
                },
                Plan::Update { entry, .. } => {
                    self.store.update(&entry.stable_id, &self.draft(event)).map(Some)
                }
                Plan::Unchanged { restamp } => {
                    if let Some(entry) = restamp {
                        tracing::debug!(uid = %event.uid, stable_id = %entry.stable_id, "Re-stamping identifiers");
                        self.state.update_identifiers(
                            &event.uid,
                            &entry.stable_id,
                            entry.local_id.as_deref(),
                        )?;
                    }
                    Ok(None)
                }
            };

            match applied {
                Ok(Some(stored)) => {
                    self.state
                        .upsert_record(&ledger_record(event, &content_hash, &stored, now))?;
                }
                Ok(None) => {}
                Err(e) => return absorb(result, &event.uid, kind, e),
            }
        }

        result.record(&event.uid, event.summary.as_deref(), kind, reason);
        Ok(())
    }

    fn plan(
        &self,
        event: &CalendarEvent,
        content_hash: &str,
        record: Option<&SyncedEventRecord>,
        calendar: Option<&CalendarRef>,
    ) -> Result<Plan, StoreError> {
        let Some(calendar) = calendar else {
            return Ok(match record {
                Some(record) => plan_recorded(event, content_hash, record, None),
                None => Plan::Create,
            });
        };

        let resolver = EventResolver::new(&self.store);
        let plan = match record {
            Some(record) => {
                let resolution = resolver.resolve(event, record, calendar)?;
                log_resolution(&event.uid, resolution.as_ref());
                plan_recorded(event, content_hash, record, resolution)
            }
            None => {
                let resolution = resolver.locate_unrecorded(event, calendar)?;
                log_resolution(&event.uid, resolution.as_ref());
                plan_unrecorded(resolution)
            }
        };
        Ok(plan)
    }

    fn remove_orphan(
        &self,
        record: &SyncedEventRecord,
        calendar: Option<&CalendarRef>,
        dry_run: bool,
        result: &mut RunResult,
    ) -> SyncResult<()> {
        let uid = record.source_uid.as_str();

        if !self.config.delete_orphans {
            tracing::debug!(uid, "Keeping entry for event removed from feed");
            result.record(uid, None, ActionKind::Unchanged, None);
            return Ok(());
        }

        let located = match calendar {
            Some(calendar) => EventResolver::new(&self.store).locate_orphan(record, calendar),
            None => Ok(None),
        };
        let entry = match located {
            Ok(resolution) => resolution.map(|r| r.entry),
            Err(e) => return absorb(result, uid, ActionKind::Delete, e),
        };
        let summary = entry.as_ref().map(|e| e.title.clone());

        if dry_run {
            result.record(uid, summary.as_deref(), ActionKind::Delete, None);
            return Ok(());
        }

        let deleted = match &entry {
            Some(entry) => match self.store.delete(&entry.stable_id) {
                Ok(()) | Err(StoreError::NotFound(_)) => Ok(()),
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => Err(e),
            },
            None => {
                tracing::debug!(uid, "Entry for removed event already gone");
                Ok(())
            }
        };

        // The event left the feed either way; the row goes too
        self.state.delete_record(uid)?;

        match deleted {
            Ok(()) => result.record(uid, summary.as_deref(), ActionKind::Delete, None),
            Err(e) => result.fail(uid, ActionKind::Delete, &e),
        }
        Ok(())
    }

    fn draft(&self, event: &CalendarEvent) -> EntryDraft {
        EntryDraft::from_event(event, self.config.sync_alarms)
    }
}

/// Per-event store failures are recorded and the run continues; fatal ones
/// end it.
fn absorb(result: &mut RunResult, uid: &str, operation: ActionKind, error: StoreError) -> SyncResult<()> {
    if error.is_fatal() {
        return Err(error.into());
    }
    result.fail(uid, operation, &error);
    Ok(())
}

fn log_resolution(uid: &str, resolution: Option<&Resolution>) {
    match resolution {
        Some(found) => {
            tracing::debug!(uid, tier = %found.tier, stable_id = %found.entry.stable_id, "Resolved entry");
        }
        None => tracing::debug!(uid, "No existing entry"),
    }
}

fn ledger_record(
    event: &CalendarEvent,
    content_hash: &str,
    stored: &StoreEntry,
    now: DateTime<Utc>,
) -> SyncedEventRecord {
    SyncedEventRecord {
        source_uid: event.uid.clone(),
        store_item_id: stored.stable_id.clone(),
        store_local_id: stored.local_id.clone(),
        content_hash: content_hash.to_string(),
        sequence: event.sequence,
        last_modified: event.last_modified,
        synced_at: now,
        raw_source_data: event.raw_text.clone(),
    }
}

/// One event per uid, in first-seen order. A later copy replaces an earlier
/// one unless its sequence is lower.
pub fn dedup_by_uid(events: Vec<CalendarEvent>) -> Vec<CalendarEvent> {
    let mut positions: HashMap<String, usize> = HashMap::new();
    let mut unique: Vec<CalendarEvent> = Vec::with_capacity(events.len());

    for event in events {
        match positions.get(&event.uid) {
            Some(&index) => {
                if event.sequence >= unique[index].sequence {
                    unique[index] = event;
                }
            }
            None => {
                positions.insert(event.uid.clone(), unique.len());
                unique.push(event);
            }
        }
    }

    unique
}
