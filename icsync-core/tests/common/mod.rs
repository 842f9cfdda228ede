#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use icsync_core::SyncConfig;
use icsync_core::fetch::StaticFeed;
use icsync_core::state::StateStore;
use icsync_core::store::MemoryCalendarStore;
use icsync_core::sync::SyncEngine;

pub const CALENDAR: &str = "Work";

/// The clock every scenario runs at.
pub fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

/// A VEVENT block, with extra property lines inserted before END:VEVENT.
pub fn vevent(uid: &str, summary: &str, start: &str, end: &str, extra: &[&str]) -> String {
    let mut lines = vec![
        "BEGIN:VEVENT".to_string(),
        format!("UID:{uid}"),
        "DTSTAMP:20240501T000000Z".to_string(),
        format!("SUMMARY:{summary}"),
        format!("DTSTART:{start}"),
        format!("DTEND:{end}"),
    ];
    lines.extend(extra.iter().map(|l| l.to_string()));
    lines.push("END:VEVENT".to_string());
    lines.join("\r\n")
}

/// A simple one-hour event on 2024-06-`day` at 09:00 UTC.
pub fn event_on(uid: &str, summary: &str, day: u32) -> String {
    vevent(
        uid,
        summary,
        &format!("202406{day:02}T090000Z"),
        &format!("202406{day:02}T100000Z"),
        &[],
    )
}

pub fn calendar(events: &[String]) -> String {
    let mut text = String::from("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Test//Feed//EN\r\n");
    for event in events {
        text.push_str(event);
        text.push_str("\r\n");
    }
    text.push_str("END:VCALENDAR\r\n");
    text
}

pub fn config() -> SyncConfig {
    SyncConfig::new("https://example.com/feed.ics", CALENDAR)
}

/// An engine over in-memory collaborators, plus handles to them.
pub struct Harness {
    pub feed: StaticFeed,
    pub store: MemoryCalendarStore,
    pub engine: SyncEngine<StaticFeed, MemoryCalendarStore>,
}

impl Harness {
    pub fn new(events: &[String]) -> Self {
        Harness::with_config(config(), events)
    }

    pub fn with_config(config: SyncConfig, events: &[String]) -> Self {
        let feed = StaticFeed::new(calendar(events));
        let store = MemoryCalendarStore::new();
        let state = StateStore::open_in_memory().unwrap();
        let engine = SyncEngine::new(config, feed.clone(), store.clone(), state).unwrap();
        Harness { feed, store, engine }
    }

    pub fn set_events(&self, events: &[String]) {
        self.feed.set(calendar(events));
    }
}
