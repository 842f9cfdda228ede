//! Content fingerprints for change detection.
//!
//! The digest covers what a user would notice in their calendar. Revision
//! bookkeeping (SEQUENCE, LAST-MODIFIED, DTSTAMP) and the raw text are left
//! out so that feeds regenerating those on every request do not look changed.

use sha2::{Digest, Sha256};

use crate::event::{Alarm, CalendarEvent};
use crate::ics::values::format_ics_utc;

const SEPARATOR: u8 = 0x1F;

/// Lower-case SHA-256 hex digest of the event's semantic fields.
#[must_use]
pub fn fingerprint(event: &CalendarEvent) -> String {
    let mut hasher = FieldHasher::default();

    hasher.field(&event.uid);
    hasher.optional(event.summary.as_deref());
    hasher.optional(event.description.as_deref());
    hasher.optional(event.location.as_deref());
    hasher.optional(event.url.as_deref());
    hasher.field(&format_ics_utc(&event.start));
    hasher.field(&format_ics_utc(&event.end));
    hasher.field(if event.is_all_day { "1" } else { "0" });
    hasher.optional(event.time_zone.as_deref());
    hasher.optional(event.recurrence_rule.as_deref());

    // BTreeSet iteration is already sorted
    hasher.list(event.exception_dates.iter().map(format_ics_utc));
    hasher.list(event.additional_dates.iter().map(format_ics_utc));

    hasher.optional(event.status.as_ref().map(|s| s.as_ics_str()));
    hasher.optional(event.transparency.as_ref().map(|t| t.as_ics_str()));
    hasher.optional(event.priority.map(|p| p.to_string()).as_deref());

    let mut alarms: Vec<&Alarm> = event.alarms.iter().collect();
    alarms.sort_by(|a, b| {
        a.trigger
            .cmp(&b.trigger)
            .then_with(|| a.action.as_ics_str().cmp(b.action.as_ics_str()))
            .then_with(|| a.relation.as_ics_str().cmp(b.relation.as_ics_str()))
            .then_with(|| a.description.cmp(&b.description))
    });
    hasher.list(alarms.iter().map(|alarm| {
        format!(
            "{}:{}:{}:{}",
            alarm.action.as_ics_str(),
            alarm.trigger,
            alarm.relation.as_ics_str(),
            alarm.description.as_deref().unwrap_or_default()
        )
    }));

    hasher.list(event.categories.iter().cloned());

    hasher.optional(event.organizer.as_ref().map(|o| o.email.as_str()));
    hasher.optional(event.organizer.as_ref().and_then(|o| o.name.as_deref()));

    let mut attendees: Vec<_> = event.attendees.iter().collect();
    attendees.sort_by(|a, b| {
        a.email
            .to_ascii_lowercase()
            .cmp(&b.email.to_ascii_lowercase())
            .then_with(|| a.name.cmp(&b.name))
    });
    hasher.list(attendees.iter().map(|a| {
        format!(
            "{}:{}:{}:{}",
            a.email,
            a.name.as_deref().unwrap_or_default(),
            a.role.as_deref().unwrap_or_default(),
            a.participation.as_deref().unwrap_or_default()
        )
    }));

    hasher.finish()
}

#[derive(Default)]
struct FieldHasher {
    inner: Sha256,
}

impl FieldHasher {
    fn field(&mut self, value: &str) {
        self.inner.update(value.as_bytes());
        self.inner.update([SEPARATOR]);
    }

    fn optional(&mut self, value: Option<&str>) {
        self.field(value.unwrap_or_default());
    }

    /// Length prefix, then each item separated, so `["a,b"]` and `["a", "b"]` differ.
    fn list<I, S>(&mut self, items: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let items: Vec<S> = items.into_iter().collect();
        self.field(&items.len().to_string());
        for item in &items {
            self.field(item.as_ref());
        }
    }

    fn finish(self) -> String {
        hex::encode(self.inner.finalize())
    }
}
