//! Deciding what to do with one feed event.

use serde::Serialize;

use crate::event::CalendarEvent;
use crate::resolve::{Resolution, ResolutionTier};
use crate::state::SyncedEventRecord;
use crate::store::StoreEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Create,
    Update,
    Delete,
    Unchanged,
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ActionKind::Create => "create",
            ActionKind::Update => "update",
            ActionKind::Delete => "delete",
            ActionKind::Unchanged => "unchanged",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdateReason {
    /// The feed event's content or sequence moved on
    ContentChanged,
    /// Content is current but the entry lacks this uid's marker
    MarkerMigration,
    /// An entry found without a ledger row is taken over
    Adopted,
}

impl std::fmt::Display for UpdateReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            UpdateReason::ContentChanged => "content changed",
            UpdateReason::MarkerMigration => "marker migration",
            UpdateReason::Adopted => "adopted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Plan {
    Create,
    Update {
        entry: StoreEntry,
        reason: UpdateReason,
    },
    /// Nothing to write to the store. `restamp` carries the entry when the
    /// ledger's identifiers no longer match it.
    Unchanged { restamp: Option<StoreEntry> },
}

impl Plan {
    pub fn kind(&self) -> ActionKind {
        match self {
            Plan::Create => ActionKind::Create,
            Plan::Update { .. } => ActionKind::Update,
            Plan::Unchanged { .. } => ActionKind::Unchanged,
        }
    }

    pub fn reason(&self) -> Option<UpdateReason> {
        match self {
            Plan::Update { reason, .. } => Some(*reason),
            _ => None,
        }
    }
}

/// Whether the event differs from what was last written.
pub fn has_changed(event: &CalendarEvent, content_hash: &str, record: &SyncedEventRecord) -> bool {
    content_hash != record.content_hash || event.sequence > record.sequence
}

/// Plan for an event the ledger already knows.
pub fn plan_recorded(
    event: &CalendarEvent,
    content_hash: &str,
    record: &SyncedEventRecord,
    resolution: Option<Resolution>,
) -> Plan {
    let changed = has_changed(event, content_hash, record);

    let Some(Resolution { entry, tier }) = resolution else {
        if changed {
            return Plan::Create;
        }
        tracing::warn!(
            uid = %event.uid,
            "Synced entry could not be located; leaving it alone until the event changes"
        );
        return Plan::Unchanged { restamp: None };
    };

    if changed {
        return Plan::Update {
            entry,
            reason: UpdateReason::ContentChanged,
        };
    }

    if !entry.has_marker_for(&event.uid) {
        return Plan::Update {
            entry,
            reason: UpdateReason::MarkerMigration,
        };
    }

    let stale = tier != ResolutionTier::StableId
        || entry.stable_id != record.store_item_id
        || entry.local_id != record.store_local_id;
    Plan::Unchanged {
        restamp: stale.then_some(entry),
    }
}

/// Plan for an event with no ledger row.
pub fn plan_unrecorded(resolution: Option<Resolution>) -> Plan {
    match resolution {
        Some(Resolution { entry, .. }) => Plan::Update {
            entry,
            reason: UpdateReason::Adopted,
        },
        None => Plan::Create,
    }
}
