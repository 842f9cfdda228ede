//! Entry files: one VEVENT per `.ics` file.

use chrono::{DateTime, Utc};
use icalendar::{Calendar, Component, EventLike, Property, Trigger, ValueType};

use crate::error::{StoreError, StoreResult};
use crate::event::TriggerRelation;
use crate::ics::FeedParser;
use crate::ics::values::{format_duration, format_ics_utc};
use crate::recurrence::{parse_rule, to_rule_text};
use crate::store::{CalendarRef, StoreEntry};

/// Generate .ics content for a stored entry. The entry's stable id is the file's UID.
pub fn generate_entry_ics(entry: &StoreEntry) -> String {
    let mut cal = Calendar::new();

    let mut ics_event = icalendar::Event::new();
    ics_event.uid(&entry.stable_id);
    ics_event.summary(&entry.title);

    let dtstamp = format_ics_utc(&Utc::now());
    ics_event.add_property("DTSTAMP", &dtstamp);

    add_time_property(&mut ics_event, "DTSTART", &entry.start, entry.is_all_day);
    add_time_property(&mut ics_event, "DTEND", &entry.end, entry.is_all_day);

    if let Some(ref notes) = entry.notes {
        ics_event.description(notes);
    }

    if let Some(ref location) = entry.location {
        ics_event.location(location);
    }

    if let Some(ref url) = entry.url {
        ics_event.add_property("URL", url);
    }

    if let Some(ref rule) = entry.recurrence {
        ics_event.add_property("RRULE", to_rule_text(rule));
        for exdate in &entry.exception_dates {
            let prop = if entry.is_all_day {
                let mut prop = Property::new("EXDATE", exdate.format("%Y%m%d").to_string());
                prop.append_parameter(ValueType::Date);
                prop
            } else {
                Property::new("EXDATE", format_ics_utc(exdate))
            };
            ics_event.append_multi_property(prop);
        }
    }

    // The crate's constructors only cover display alarms before the start,
    // so ACTION and TRIGGER are overwritten afterwards.
    for alarm in &entry.alarms {
        let description = alarm.description.as_deref().unwrap_or("Reminder");
        let mut valarm = icalendar::Alarm::display(
            description,
            Trigger::before_start(chrono::Duration::zero()),
        );
        valarm.add_property("ACTION", alarm.action.as_ics_str());

        let mut trigger = Property::new("TRIGGER", format_duration(alarm.trigger));
        if alarm.relation == TriggerRelation::End {
            trigger.add_parameter("RELATED", "END");
        }
        valarm.append_property(trigger);

        ics_event.alarm(valarm);
    }

    let ics_event = ics_event.done();
    cal.push(ics_event);
    let cal = cal.done();

    strip_ics_bloat(&cal.to_string())
}

/// Read an entry file back. `local_id` is the file stem.
pub fn read_entry_ics(content: &str, calendar: &CalendarRef, local_id: &str) -> StoreResult<StoreEntry> {
    let feed = FeedParser::default()
        .parse(content)
        .map_err(|_| StoreError::Corrupt(local_id.to_string()))?;

    let event = feed
        .events
        .into_iter()
        .next()
        .ok_or_else(|| StoreError::Corrupt(local_id.to_string()))?;

    let recurrence = event
        .recurrence_rule
        .as_deref()
        .and_then(|rule| parse_rule(rule, event.start));

    Ok(StoreEntry {
        stable_id: event.uid,
        local_id: Some(local_id.to_string()),
        calendar: calendar.clone(),
        title: event.summary.unwrap_or_default(),
        notes: event.description,
        location: event.location,
        url: event.url,
        start: event.start,
        end: event.end,
        is_all_day: event.is_all_day,
        alarms: event.alarms,
        recurrence,
        exception_dates: event.exception_dates,
    })
}

/// Clean up ICS output from the icalendar crate
/// - Replace PRODID with ICSYNC
/// - Remove CALSCALE:GREGORIAN (it's the default)
/// - Remove DTSTAMP and UID inside VALARM sections (not required by RFC 5545)
fn strip_ics_bloat(ics: &str) -> String {
    let mut result = String::with_capacity(ics.len());
    let mut in_valarm = false;

    for line in ics.lines() {
        if line.starts_with("PRODID:") {
            result.push_str("PRODID:ICSYNC\r\n");
            continue;
        }

        if line == "CALSCALE:GREGORIAN" {
            continue;
        }

        if line == "BEGIN:VALARM" {
            in_valarm = true;
        } else if line == "END:VALARM" {
            in_valarm = false;
        }

        if in_valarm && (line.starts_with("DTSTAMP:") || line.starts_with("UID:")) {
            continue;
        }

        result.push_str(line);
        result.push_str("\r\n");
    }

    result
}

fn add_time_property(ics_event: &mut icalendar::Event, name: &str, time: &DateTime<Utc>, is_date: bool) {
    if is_date {
        let mut prop = Property::new(name, time.format("%Y%m%d").to_string());
        prop.append_parameter(ValueType::Date);
        ics_event.append_property(prop);
    } else {
        ics_event.add_property(name, format_ics_utc(time));
    }
}
