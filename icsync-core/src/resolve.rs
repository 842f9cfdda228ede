//! Finding the live calendar entry for a feed event.
//!
//! Stores lose or reassign identifiers (server moves, export/import, another
//! client rewriting entries), so a ledger row is not proof of where the
//! entry lives now. Lookups fall back through progressively weaker evidence.

use chrono::Duration;

use crate::date_range::DateRange;
use crate::error::StoreResult;
use crate::event::CalendarEvent;
use crate::state::SyncedEventRecord;
use crate::store::{CalendarRef, CalendarStore, StoreEntry};

/// Days either side of the event start searched by the fuzzy tier.
const FUZZY_WINDOW_DAYS: i64 = 2;

/// Start and end may each drift this far for a fuzzy match.
const FUZZY_TOLERANCE_MINUTES: i64 = 5;

/// How an entry was found, strongest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ResolutionTier {
    StableId,
    LocalId,
    Marker,
    Fuzzy,
}

impl std::fmt::Display for ResolutionTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResolutionTier::StableId => "stable id",
            ResolutionTier::LocalId => "local id",
            ResolutionTier::Marker => "marker",
            ResolutionTier::Fuzzy => "fuzzy match",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub entry: StoreEntry,
    pub tier: ResolutionTier,
}

/// Locates entries in one store. Reads only; never writes.
pub struct EventResolver<'a, S: CalendarStore> {
    store: &'a S,
}

impl<'a, S: CalendarStore> EventResolver<'a, S> {
    pub fn new(store: &'a S) -> Self {
        EventResolver { store }
    }

    /// All four tiers, for an event the ledger already knows.
    pub fn resolve(
        &self,
        event: &CalendarEvent,
        record: &SyncedEventRecord,
        calendar: &CalendarRef,
    ) -> StoreResult<Option<Resolution>> {
        if let Some(found) = self.by_identifiers(&event.uid, record)? {
            return Ok(Some(found));
        }
        self.locate_unrecorded(event, calendar)
    }

    /// Marker and fuzzy tiers, for an event with no ledger row.
    pub fn locate_unrecorded(
        &self,
        event: &CalendarEvent,
        calendar: &CalendarRef,
    ) -> StoreResult<Option<Resolution>> {
        if let Some(entry) = self.store.find_by_marker(&event.uid, calendar)? {
            return Ok(Some(Resolution {
                entry,
                tier: ResolutionTier::Marker,
            }));
        }

        Ok(self.fuzzy(event, calendar)?.map(|entry| Resolution {
            entry,
            tier: ResolutionTier::Fuzzy,
        }))
    }

    /// Identifier and marker tiers only. Used to find entries to delete, where
    /// a fuzzy guess could remove something the user made by hand.
    pub fn locate_orphan(
        &self,
        record: &SyncedEventRecord,
        calendar: &CalendarRef,
    ) -> StoreResult<Option<Resolution>> {
        if let Some(found) = self.by_identifiers(&record.source_uid, record)? {
            return Ok(Some(found));
        }

        Ok(self
            .store
            .find_by_marker(&record.source_uid, calendar)?
            .map(|entry| Resolution {
                entry,
                tier: ResolutionTier::Marker,
            }))
    }

    fn by_identifiers(
        &self,
        uid: &str,
        record: &SyncedEventRecord,
    ) -> StoreResult<Option<Resolution>> {
        if let Some(entry) = self.store.find_by_stable_id(&record.store_item_id)? {
            if entry.has_foreign_marker(uid) {
                tracing::debug!(uid, stable_id = %entry.stable_id, "Stable id now belongs to another event");
            } else {
                return Ok(Some(Resolution {
                    entry,
                    tier: ResolutionTier::StableId,
                }));
            }
        }

        let Some(local_id) = record.store_local_id.as_deref() else {
            return Ok(None);
        };
        if let Some(entry) = self.store.find_by_local_id(local_id)? {
            if entry.has_foreign_marker(uid) {
                tracing::debug!(uid, local_id, "Local id now belongs to another event");
            } else {
                return Ok(Some(Resolution {
                    entry,
                    tier: ResolutionTier::LocalId,
                }));
            }
        }

        Ok(None)
    }

    fn fuzzy(&self, event: &CalendarEvent, calendar: &CalendarRef) -> StoreResult<Option<StoreEntry>> {
        let range = DateRange::around(event.start, FUZZY_WINDOW_DAYS);
        let candidates = self.store.search(calendar, &range)?;
        Ok(candidates.into_iter().find(|entry| is_fuzzy_match(event, entry)))
    }
}

/// Same title (either containing the other), near-identical times, and not
/// already claimed by another uid.
pub fn is_fuzzy_match(event: &CalendarEvent, entry: &StoreEntry) -> bool {
    if entry.has_foreign_marker(&event.uid) {
        return false;
    }
    if entry.is_all_day != event.is_all_day {
        return false;
    }

    let tolerance = Duration::minutes(FUZZY_TOLERANCE_MINUTES);
    if (entry.start - event.start).abs() > tolerance || (entry.end - event.end).abs() > tolerance {
        return false;
    }

    let title = event.title().to_lowercase();
    let other = entry.title.to_lowercase();
    if title.is_empty() || other.is_empty() {
        return title == other;
    }
    title.contains(&other) || other.contains(&title)
}
