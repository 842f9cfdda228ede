use serde::Serialize;

use crate::error::StoreError;
use crate::state::{RunCounts, RunStatus};
use crate::sync::plan::{ActionKind, UpdateReason};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Decide everything, write nothing
    pub dry_run: bool,
    /// Ignore the ledger and treat every event as unseen
    pub full_resync: bool,
}

/// What happened (or would happen, in a dry run) to one uid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncAction {
    pub uid: String,
    pub summary: Option<String>,
    pub kind: ActionKind,
    pub reason: Option<UpdateReason>,
}

/// A per-event failure. The run carries on without it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventError {
    pub uid: String,
    pub operation: ActionKind,
    pub message: String,
}

impl std::fmt::Display for EventError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}: {}", self.operation, self.uid, self.message)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    /// History row id; None for dry runs
    pub run_id: Option<i64>,
    pub status: RunStatus,
    pub counts: RunCounts,
    pub errors: Vec<EventError>,
    pub actions: Vec<SyncAction>,
    /// Feed events dropped by the parser
    pub skipped: usize,
    pub dry_run: bool,
}

impl RunResult {
    pub(crate) fn new(run_id: Option<i64>, dry_run: bool) -> Self {
        RunResult {
            run_id,
            status: RunStatus::Failed,
            counts: RunCounts::default(),
            errors: Vec::new(),
            actions: Vec::new(),
            skipped: 0,
            dry_run,
        }
    }

    pub(crate) fn record(
        &mut self,
        uid: &str,
        summary: Option<&str>,
        kind: ActionKind,
        reason: Option<UpdateReason>,
    ) {
        match kind {
            ActionKind::Create => self.counts.created += 1,
            ActionKind::Update => self.counts.updated += 1,
            ActionKind::Delete => self.counts.deleted += 1,
            ActionKind::Unchanged => self.counts.unchanged += 1,
        }
        self.actions.push(SyncAction {
            uid: uid.to_string(),
            summary: summary.map(str::to_string),
            kind,
            reason,
        });
    }

    pub(crate) fn fail(&mut self, uid: &str, operation: ActionKind, error: &StoreError) {
        tracing::warn!(uid, %operation, %error, "Event sync failed");
        self.errors.push(EventError {
            uid: uid.to_string(),
            operation,
            message: error.to_string(),
        });
    }

    /// Status once every event has been attempted.
    pub(crate) fn finish(&mut self) {
        self.status = if self.errors.is_empty() {
            RunStatus::Success
        } else {
            RunStatus::Partial
        };
    }

    /// Summary of the first failure, for the history row.
    pub fn first_error(&self) -> Option<String> {
        self.errors.first().map(ToString::to_string)
    }

    /// Actions of one kind, in the order they were taken.
    pub fn actions_of(&self, kind: ActionKind) -> impl Iterator<Item = &SyncAction> {
        self.actions.iter().filter(move |a| a.kind == kind)
    }

    pub fn has_changes(&self) -> bool {
        self.counts.created + self.counts.updated + self.counts.deleted > 0
    }
}
