//! Destination calendar stores.
//!
//! The engine only talks to a store through `CalendarStore`. Two backends
//! ship with the crate: a directory of `.ics` files and an in-memory store.

mod local;
mod memory;

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::date_range::DateRange;
use crate::error::StoreResult;
use crate::event::{Alarm, CalendarEvent};
use crate::marker;
use crate::recurrence::{RecurrenceRule, parse_rule};

pub use local::LocalCalendarStore;
pub use memory::MemoryCalendarStore;

/// A calendar inside a store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalendarRef {
    pub id: String,
    pub name: String,
}

/// An entry as the store sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreEntry {
    /// Identifier meant to survive for the entry's lifetime
    pub stable_id: String,
    /// Identifier that may change when the store reorganizes
    pub local_id: Option<String>,
    pub calendar: CalendarRef,
    pub title: String,
    /// Free text; carries the sync marker
    pub notes: Option<String>,
    pub location: Option<String>,
    pub url: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub is_all_day: bool,
    pub alarms: Vec<Alarm>,
    pub recurrence: Option<RecurrenceRule>,
    pub exception_dates: BTreeSet<DateTime<Utc>>,
}

impl StoreEntry {
    /// The uid in this entry's marker, if it has one.
    pub fn marker_uid(&self) -> Option<String> {
        self.notes.as_deref().and_then(marker::extract)
    }

    pub fn has_marker_for(&self, uid: &str) -> bool {
        marker::has_marker(self.notes.as_deref(), uid)
    }

    /// Marked for some uid other than `uid`.
    pub fn has_foreign_marker(&self, uid: &str) -> bool {
        marker::has_foreign_marker(self.notes.as_deref(), uid)
    }

    pub fn is_unmarked(&self) -> bool {
        self.marker_uid().is_none()
    }
}

/// The content written on create/update. Identifiers are assigned by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryDraft {
    pub title: String,
    pub notes: Option<String>,
    pub location: Option<String>,
    pub url: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub is_all_day: bool,
    pub alarms: Vec<Alarm>,
    pub recurrence: Option<RecurrenceRule>,
    pub exception_dates: BTreeSet<DateTime<Utc>>,
}

impl EntryDraft {
    /// Builds the draft for a feed event, embedding its marker in the notes.
    pub fn from_event(event: &CalendarEvent, sync_alarms: bool) -> Self {
        EntryDraft {
            title: event.title().to_string(),
            notes: Some(marker::embed(event.description.as_deref(), &event.uid)),
            location: event.location.clone(),
            url: event.url.clone(),
            start: event.start,
            end: event.end,
            is_all_day: event.is_all_day,
            alarms: if sync_alarms {
                event.alarms.clone()
            } else {
                Vec::new()
            },
            recurrence: event
                .recurrence_rule
                .as_deref()
                .and_then(|rule| parse_rule(rule, event.start)),
            exception_dates: event.exception_dates.clone(),
        }
    }

    /// The entry this draft becomes once a store assigns identifiers.
    pub fn into_entry(
        self,
        stable_id: String,
        local_id: Option<String>,
        calendar: CalendarRef,
    ) -> StoreEntry {
        StoreEntry {
            stable_id,
            local_id,
            calendar,
            title: self.title,
            notes: self.notes,
            location: self.location,
            url: self.url,
            start: self.start,
            end: self.end,
            is_all_day: self.is_all_day,
            alarms: self.alarms,
            recurrence: self.recurrence,
            exception_dates: self.exception_dates,
        }
    }
}

/// Capabilities the sync engine needs from a destination calendar.
///
/// Create and update return the entry as stored, with whatever identifiers
/// the store assigned.
pub trait CalendarStore {
    /// Find the writable calendar called `name`, creating it if allowed.
    fn resolve_or_create_calendar(
        &self,
        name: &str,
        create_if_missing: bool,
    ) -> StoreResult<CalendarRef>;

    fn create(&self, draft: &EntryDraft, calendar: &CalendarRef) -> StoreResult<StoreEntry>;

    fn update(&self, stable_id: &str, draft: &EntryDraft) -> StoreResult<StoreEntry>;

    fn delete(&self, stable_id: &str) -> StoreResult<()>;

    fn find_by_stable_id(&self, stable_id: &str) -> StoreResult<Option<StoreEntry>>;

    fn find_by_local_id(&self, local_id: &str) -> StoreResult<Option<StoreEntry>>;

    /// Scans the whole calendar for an entry marked with `uid`.
    fn find_by_marker(&self, uid: &str, calendar: &CalendarRef) -> StoreResult<Option<StoreEntry>>;

    /// Entries of `calendar` overlapping `range`.
    fn search(&self, calendar: &CalendarRef, range: &DateRange) -> StoreResult<Vec<StoreEntry>>;
}
