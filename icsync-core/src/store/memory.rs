//! In-memory calendar store.
//!
//! Behaves like a real backend, including identifier churn on demand, so sync
//! behavior can be exercised without touching disk. Clones share state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::date_range::DateRange;
use crate::error::{StoreError, StoreResult};
use crate::store::{CalendarRef, CalendarStore, EntryDraft, StoreEntry};

#[derive(Debug, Clone, Default)]
pub struct MemoryCalendarStore {
    inner: Arc<Mutex<MemoryState>>,
}

#[derive(Debug, Default)]
struct MemoryState {
    calendars: Vec<MemoryCalendar>,
    entries: Vec<StoreEntry>,
    next_id: u64,
    access_denied: bool,
    /// Writes of entries with this title fail
    failing_title: Option<String>,
    failing_deletes: bool,
    failing_scans: bool,
    writes: usize,
}

#[derive(Debug)]
struct MemoryCalendar {
    calendar: CalendarRef,
    writable: bool,
}

impl MemoryState {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}-{}", self.next_id)
    }

    fn check_access(&self) -> StoreResult<()> {
        if self.access_denied {
            return Err(StoreError::AccessDenied("calendar access revoked".into()));
        }
        Ok(())
    }

    fn check_write(&self, draft: &EntryDraft) -> StoreResult<()> {
        self.check_access()?;
        if self.failing_title.as_deref() == Some(draft.title.as_str()) {
            return Err(StoreError::Io(std::io::Error::other(format!(
                "write rejected for '{}'",
                draft.title
            ))));
        }
        Ok(())
    }

    fn check_scan(&self) -> StoreResult<()> {
        self.check_access()?;
        if self.failing_scans {
            return Err(StoreError::Io(std::io::Error::other("calendar scan failed")));
        }
        Ok(())
    }
}

impl MemoryCalendarStore {
    pub fn new() -> Self {
        MemoryCalendarStore::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_calendar(&self, name: &str, writable: bool) -> CalendarRef {
        let mut state = self.state();
        let calendar = CalendarRef {
            id: state.next_id("cal"),
            name: name.to_string(),
        };
        state.calendars.push(MemoryCalendar {
            calendar: calendar.clone(),
            writable,
        });
        calendar
    }

    /// Inserts an entry as-is, e.g. one created before syncing began.
    pub fn insert(&self, draft: EntryDraft, calendar: &CalendarRef) -> StoreEntry {
        let mut state = self.state();
        let stable_id = state.next_id("item");
        let local_id = state.next_id("local");
        let entry = draft.into_entry(stable_id, Some(local_id), calendar.clone());
        state.entries.push(entry.clone());
        entry
    }

    pub fn entries(&self) -> Vec<StoreEntry> {
        self.state().entries.clone()
    }

    pub fn entry(&self, stable_id: &str) -> Option<StoreEntry> {
        self.state()
            .entries
            .iter()
            .find(|e| e.stable_id == stable_id)
            .cloned()
    }

    /// Entries whose title equals `title`.
    pub fn entries_titled(&self, title: &str) -> Vec<StoreEntry> {
        self.state()
            .entries
            .iter()
            .filter(|e| e.title == title)
            .cloned()
            .collect()
    }

    /// Number of create/update/delete calls that reached the store.
    pub fn write_count(&self) -> usize {
        self.state().writes
    }

    /// Gives the entry a new local id, as a server reorganizing storage would.
    pub fn rekey_local(&self, stable_id: &str) -> Option<String> {
        let mut state = self.state();
        let new_id = state.next_id("local");
        let entry = state.entries.iter_mut().find(|e| e.stable_id == stable_id)?;
        entry.local_id = Some(new_id.clone());
        Some(new_id)
    }

    /// Replaces both identifiers, as an export/import round trip would.
    pub fn rekey(&self, stable_id: &str) -> Option<(String, String)> {
        let mut state = self.state();
        let new_stable = state.next_id("item");
        let new_local = state.next_id("local");
        let entry = state.entries.iter_mut().find(|e| e.stable_id == stable_id)?;
        entry.stable_id = new_stable.clone();
        entry.local_id = Some(new_local.clone());
        Some((new_stable, new_local))
    }

    /// Overwrites an entry's notes directly.
    pub fn set_notes(&self, stable_id: &str, notes: Option<&str>) {
        let mut state = self.state();
        if let Some(entry) = state.entries.iter_mut().find(|e| e.stable_id == stable_id) {
            entry.notes = notes.map(str::to_string);
        }
    }

    /// Removes an entry without going through the sync engine.
    pub fn remove(&self, stable_id: &str) {
        self.state().entries.retain(|e| e.stable_id != stable_id);
    }

    pub fn deny_access(&self, denied: bool) {
        self.state().access_denied = denied;
    }

    pub fn fail_writes_titled(&self, title: Option<&str>) {
        self.state().failing_title = title.map(str::to_string);
    }

    /// Makes every delete fail with an I/O error.
    pub fn fail_deletes(&self, failing: bool) {
        self.state().failing_deletes = failing;
    }

    /// Makes marker and date-range scans fail with an I/O error.
    pub fn fail_scans(&self, failing: bool) {
        self.state().failing_scans = failing;
    }
}

impl CalendarStore for MemoryCalendarStore {
    fn resolve_or_create_calendar(
        &self,
        name: &str,
        create_if_missing: bool,
    ) -> StoreResult<CalendarRef> {
        let mut state = self.state();
        state.check_access()?;

        if let Some(found) = state.calendars.iter().find(|c| c.calendar.name == name) {
            if !found.writable {
                return Err(StoreError::NoWritableCalendar(name.to_string()));
            }
            return Ok(found.calendar.clone());
        }

        if !create_if_missing {
            return Err(StoreError::CalendarNotFound(name.to_string()));
        }

        let calendar = CalendarRef {
            id: state.next_id("cal"),
            name: name.to_string(),
        };
        state.calendars.push(MemoryCalendar {
            calendar: calendar.clone(),
            writable: true,
        });
        tracing::info!(calendar = name, "Created calendar");
        Ok(calendar)
    }

    fn create(&self, draft: &EntryDraft, calendar: &CalendarRef) -> StoreResult<StoreEntry> {
        let mut state = self.state();
        state.check_write(draft)?;

        if !state.calendars.iter().any(|c| c.calendar.id == calendar.id) {
            return Err(StoreError::CalendarNotFound(calendar.name.clone()));
        }

        let stable_id = state.next_id("item");
        let local_id = state.next_id("local");
        let entry = draft
            .clone()
            .into_entry(stable_id, Some(local_id), calendar.clone());
        state.entries.push(entry.clone());
        state.writes += 1;
        Ok(entry)
    }

    fn update(&self, stable_id: &str, draft: &EntryDraft) -> StoreResult<StoreEntry> {
        let mut state = self.state();
        state.check_write(draft)?;

        let entry = state
            .entries
            .iter_mut()
            .find(|e| e.stable_id == stable_id)
            .ok_or_else(|| StoreError::NotFound(stable_id.to_string()))?;

        let updated = draft.clone().into_entry(
            entry.stable_id.clone(),
            entry.local_id.clone(),
            entry.calendar.clone(),
        );
        *entry = updated.clone();
        state.writes += 1;
        Ok(updated)
    }

    fn delete(&self, stable_id: &str) -> StoreResult<()> {
        let mut state = self.state();
        state.check_access()?;
        if state.failing_deletes {
            return Err(StoreError::Io(std::io::Error::other(format!(
                "delete rejected for '{stable_id}'"
            ))));
        }

        let before = state.entries.len();
        state.entries.retain(|e| e.stable_id != stable_id);
        if state.entries.len() == before {
            return Err(StoreError::NotFound(stable_id.to_string()));
        }
        state.writes += 1;
        Ok(())
    }

    fn find_by_stable_id(&self, stable_id: &str) -> StoreResult<Option<StoreEntry>> {
        let state = self.state();
        state.check_access()?;
        Ok(state
            .entries
            .iter()
            .find(|e| e.stable_id == stable_id)
            .cloned())
    }

    fn find_by_local_id(&self, local_id: &str) -> StoreResult<Option<StoreEntry>> {
        let state = self.state();
        state.check_access()?;
        Ok(state
            .entries
            .iter()
            .find(|e| e.local_id.as_deref() == Some(local_id))
            .cloned())
    }

    fn find_by_marker(&self, uid: &str, calendar: &CalendarRef) -> StoreResult<Option<StoreEntry>> {
        let state = self.state();
        state.check_scan()?;
        Ok(state
            .entries
            .iter()
            .find(|e| e.calendar.id == calendar.id && e.has_marker_for(uid))
            .cloned())
    }

    fn search(&self, calendar: &CalendarRef, range: &DateRange) -> StoreResult<Vec<StoreEntry>> {
        let state = self.state();
        state.check_scan()?;
        Ok(state
            .entries
            .iter()
            .filter(|e| e.calendar.id == calendar.id && range.overlaps(e.start, e.end))
            .cloned()
            .collect())
    }
}
