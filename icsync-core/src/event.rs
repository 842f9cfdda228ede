//! Feed event types.
//!
//! A `CalendarEvent` is one VEVENT as read from the feed. All instants are
//! normalized to UTC by the parser; the original TZID is kept in `time_zone`.

use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A calendar event read from the feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEvent {
    pub uid: String,
    pub summary: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
    pub url: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub is_all_day: bool,

    // Revision tracking
    /// Source-supplied revision counter (SEQUENCE), 0 when absent
    pub sequence: u32,
    /// LAST-MODIFIED
    pub last_modified: Option<DateTime<Utc>>,
    /// DTSTAMP
    pub date_stamp: Option<DateTime<Utc>>,

    // Recurrence
    /// RRULE value exactly as written in the feed
    pub recurrence_rule: Option<String>,
    pub exception_dates: BTreeSet<DateTime<Utc>>,
    pub additional_dates: BTreeSet<DateTime<Utc>>,

    pub alarms: Vec<Alarm>,
    pub status: Option<EventStatus>,
    pub transparency: Option<Transparency>,

    // Meeting data
    pub organizer: Option<Organizer>,
    pub attendees: Vec<Attendee>,

    pub categories: BTreeSet<String>,
    /// 1 (highest) to 9 (lowest)
    pub priority: Option<u8>,
    /// TZID of DTSTART, as written in the feed
    pub time_zone: Option<String>,

    /// The verbatim VEVENT block, kept for diagnostics
    pub raw_text: String,
}

impl CalendarEvent {
    /// A minimal timed event, mostly useful for building fixtures.
    pub fn new(uid: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        CalendarEvent {
            uid: uid.into(),
            summary: None,
            description: None,
            location: None,
            url: None,
            start,
            end,
            is_all_day: false,
            sequence: 0,
            last_modified: None,
            date_stamp: None,
            recurrence_rule: None,
            exception_dates: BTreeSet::new(),
            additional_dates: BTreeSet::new(),
            alarms: Vec::new(),
            status: None,
            transparency: None,
            organizer: None,
            attendees: Vec::new(),
            categories: BTreeSet::new(),
            priority: None,
            time_zone: None,
            raw_text: String::new(),
        }
    }

    pub fn title(&self) -> &str {
        self.summary.as_deref().unwrap_or("(No title)")
    }

    pub fn is_recurring(&self) -> bool {
        self.recurrence_rule.is_some()
    }
}

impl fmt::Display for CalendarEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_all_day {
            write!(f, "{} ({})", self.title(), self.start.format("%Y-%m-%d"))
        } else {
            write!(f, "{} ({})", self.title(), self.start.format("%Y-%m-%d %H:%M UTC"))
        }
    }
}

/// A VALARM attached to an event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    pub action: AlarmAction,
    /// Signed offset in seconds; negative fires before the anchor
    pub trigger: i64,
    pub relation: TriggerRelation,
    pub description: Option<String>,
}

impl Alarm {
    /// Display alarm `minutes` before the event starts.
    pub fn minutes_before(minutes: i64) -> Self {
        Alarm {
            action: AlarmAction::Display,
            trigger: -minutes * 60,
            relation: TriggerRelation::Start,
            description: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlarmAction {
    Display,
    Audio,
    Email,
}

impl AlarmAction {
    pub fn from_ics_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "DISPLAY" => Some(AlarmAction::Display),
            "AUDIO" => Some(AlarmAction::Audio),
            "EMAIL" => Some(AlarmAction::Email),
            _ => None,
        }
    }

    pub fn as_ics_str(&self) -> &'static str {
        match self {
            AlarmAction::Display => "DISPLAY",
            AlarmAction::Audio => "AUDIO",
            AlarmAction::Email => "EMAIL",
        }
    }
}

/// What an alarm trigger offset is measured from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriggerRelation {
    Start,
    End,
}

impl TriggerRelation {
    pub fn as_ics_str(&self) -> &'static str {
        match self {
            TriggerRelation::Start => "START",
            TriggerRelation::End => "END",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventStatus {
    Tentative,
    Confirmed,
    Cancelled,
}

impl EventStatus {
    pub fn from_ics_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "TENTATIVE" => Some(EventStatus::Tentative),
            "CONFIRMED" => Some(EventStatus::Confirmed),
            "CANCELLED" => Some(EventStatus::Cancelled),
            _ => None,
        }
    }

    pub fn as_ics_str(&self) -> &'static str {
        match self {
            EventStatus::Tentative => "TENTATIVE",
            EventStatus::Confirmed => "CONFIRMED",
            EventStatus::Cancelled => "CANCELLED",
        }
    }
}

/// Event transparency (busy/free status)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Transparency {
    /// Event blocks time on calendar
    Opaque,
    /// Event does not block time (shows as free)
    Transparent,
}

impl Transparency {
    pub fn from_ics_str(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "OPAQUE" => Some(Transparency::Opaque),
            "TRANSPARENT" => Some(Transparency::Transparent),
            _ => None,
        }
    }

    pub fn as_ics_str(&self) -> &'static str {
        match self {
            Transparency::Opaque => "OPAQUE",
            Transparency::Transparent => "TRANSPARENT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Organizer {
    pub name: Option<String>,
    pub email: String,
}

/// An event attendee
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attendee {
    /// Display name (CN)
    pub name: Option<String>,
    pub email: String,
    /// ROLE, e.g. "REQ-PARTICIPANT"
    pub role: Option<String>,
    /// PARTSTAT, e.g. "ACCEPTED"
    pub participation: Option<String>,
}
