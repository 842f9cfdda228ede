//! Tolerant feed parsing.
//!
//! A broken VEVENT is skipped and reported; only text that is not a calendar
//! at all fails the whole feed.

use std::collections::BTreeSet;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;

use crate::error::{FeedError, ParseError, ParseErrorKind};
use crate::event::{
    Alarm, AlarmAction, Attendee, CalendarEvent, EventStatus, Organizer, Transparency,
    TriggerRelation,
};
use crate::ics::lexer::{ContentLine, LogicalLine, parse_content_line, physical_lines, unfold};
use crate::ics::values::{parse_date_time, parse_duration, split_text_list, unescape_text};

/// Result of parsing a feed: the usable events plus what had to be skipped.
#[derive(Debug, Default)]
pub struct ParsedFeed {
    pub events: Vec<CalendarEvent>,
    pub skipped: Vec<ParseError>,
}

/// Parses feed text into events.
#[derive(Debug, Clone)]
pub struct FeedParser {
    /// Zone for floating times and unknown TZIDs
    default_tz: Tz,
}

impl Default for FeedParser {
    fn default() -> Self {
        FeedParser { default_tz: Tz::UTC }
    }
}

/// The logical lines between one BEGIN:VEVENT and its END.
struct EventBlock<'a> {
    begin: &'a LogicalLine,
    end: &'a LogicalLine,
    lines: Vec<&'a LogicalLine>,
}

impl FeedParser {
    pub fn new(default_tz: Tz) -> Self {
        FeedParser { default_tz }
    }

    #[tracing::instrument(skip(self, text), fields(bytes = text.len()))]
    pub fn parse(&self, text: &str) -> Result<ParsedFeed, FeedError> {
        let physical = physical_lines(text);
        let logical = unfold(&physical);

        if !logical.iter().any(|l| is_marker(&l.text, "BEGIN", "VCALENDAR")) {
            return Err(FeedError::NotICalendar);
        }

        let mut feed = ParsedFeed::default();
        let mut current: Option<(&LogicalLine, Vec<&LogicalLine>)> = None;
        let mut depth = 0usize;

        for line in &logical {
            match current.as_mut() {
                None => {
                    if is_marker(&line.text, "BEGIN", "VEVENT") {
                        current = Some((line, Vec::new()));
                        depth = 0;
                    }
                }
                Some((begin, lines)) => {
                    if depth == 0 && is_marker(&line.text, "END", "VEVENT") {
                        let block = EventBlock {
                            begin: *begin,
                            end: line,
                            lines: std::mem::take(lines),
                        };
                        self.finish_event(block, &physical, &mut feed);
                        current = None;
                    } else if depth == 0
                        && (is_marker(&line.text, "BEGIN", "VEVENT")
                            || is_marker(&line.text, "END", "VCALENDAR"))
                    {
                        // A sibling VEVENT or the calendar end before END:VEVENT
                        let uid = find_uid(lines);
                        feed.skip(ParseErrorKind::UnterminatedEvent, uid, begin.first_line);
                        current = if is_marker(&line.text, "BEGIN", "VEVENT") {
                            Some((line, Vec::new()))
                        } else {
                            None
                        };
                    } else {
                        if line.text.trim_start().to_ascii_uppercase().starts_with("BEGIN:") {
                            depth += 1;
                        } else if line.text.trim_start().to_ascii_uppercase().starts_with("END:") {
                            depth = depth.saturating_sub(1);
                        }
                        lines.push(line);
                    }
                }
            }
        }

        if let Some((begin, lines)) = current {
            let uid = find_uid(&lines);
            feed.skip(ParseErrorKind::UnterminatedEvent, uid, begin.first_line);
        }

        tracing::debug!(
            events = feed.events.len(),
            skipped = feed.skipped.len(),
            "Parsed feed"
        );

        Ok(feed)
    }

    fn finish_event(&self, block: EventBlock<'_>, physical: &[&str], feed: &mut ParsedFeed) {
        let raw_text = physical[block.begin.first_line - 1..block.end.last_line].join("\r\n");

        match self.parse_event(&block.lines, block.begin.first_line) {
            Ok(mut event) => {
                event.raw_text = raw_text;
                feed.events.push(event);
            }
            Err((kind, line)) => {
                let uid = find_uid(&block.lines);
                feed.skip(kind, uid, line);
            }
        }
    }

    fn parse_event(
        &self,
        lines: &[&LogicalLine],
        begin_line: usize,
    ) -> Result<CalendarEvent, (ParseErrorKind, usize)> {
        let mut properties: Vec<ContentLine> = Vec::new();
        let mut alarm_blocks: Vec<Vec<ContentLine>> = Vec::new();

        // Depth > 0 means inside a nested component. Only VALARM is kept.
        let mut nested: Vec<String> = Vec::new();

        for line in lines {
            let content = match parse_content_line(&line.text, line.first_line) {
                Ok(content) => content,
                Err(kind) => {
                    let upper = line.text.trim_start().to_ascii_uppercase();
                    if nested.is_empty() && (upper.starts_with("UID") || upper.starts_with("DTSTART"))
                    {
                        return Err((kind, line.first_line));
                    }
                    tracing::warn!(line = line.first_line, "Ignoring malformed content line");
                    continue;
                }
            };

            match content.name.as_str() {
                "BEGIN" => {
                    let component = content.value.trim().to_ascii_uppercase();
                    if nested.is_empty() && component == "VALARM" {
                        alarm_blocks.push(Vec::new());
                    }
                    nested.push(component);
                }
                "END" => {
                    nested.pop();
                }
                _ if nested.is_empty() => properties.push(content),
                _ if nested.len() == 1 && nested[0] == "VALARM" => {
                    if let Some(alarm) = alarm_blocks.last_mut() {
                        alarm.push(content);
                    }
                }
                _ => {}
            }
        }

        let props = Properties(&properties);

        let uid = props
            .first("UID")
            .map(|p| p.value.trim())
            .filter(|v| !v.is_empty())
            .ok_or((ParseErrorKind::MissingUid, begin_line))?
            .to_string();

        let dtstart = props
            .first("DTSTART")
            .ok_or((ParseErrorKind::MissingStart, begin_line))?;
        let (start, is_all_day) = self
            .parse_time(dtstart)
            .ok_or_else(|| {
                (
                    ParseErrorKind::InvalidStart(dtstart.value.trim().to_string()),
                    dtstart.line,
                )
            })?;

        let end = self.derive_end(&props, start, is_all_day)?;

        let alarms = alarm_blocks
            .iter()
            .filter_map(|block| parse_alarm(block, start, &uid))
            .collect();

        let mut event = CalendarEvent::new(uid, start, end.max(start));
        event.is_all_day = is_all_day;
        event.time_zone = dtstart.param("TZID").map(str::to_string);
        event.summary = props.text("SUMMARY");
        event.description = props.text("DESCRIPTION");
        event.location = props.text("LOCATION");
        event.url = props
            .first("URL")
            .map(|p| p.value.trim().to_string())
            .filter(|v| !v.is_empty());
        event.sequence = props
            .first("SEQUENCE")
            .and_then(|p| p.value.trim().parse().ok())
            .unwrap_or(0);
        event.last_modified = props.first("LAST-MODIFIED").and_then(|p| self.instant(p));
        event.date_stamp = props.first("DTSTAMP").and_then(|p| self.instant(p));
        event.recurrence_rule = props
            .first("RRULE")
            .map(|p| p.value.trim().to_string())
            .filter(|v| !v.is_empty());
        event.exception_dates = self.date_list(&props, "EXDATE");
        event.additional_dates = self.date_list(&props, "RDATE");
        event.alarms = alarms;
        event.status = props
            .first("STATUS")
            .and_then(|p| EventStatus::from_ics_str(p.value.trim()));
        event.transparency = props
            .first("TRANSP")
            .and_then(|p| Transparency::from_ics_str(p.value.trim()));
        event.organizer = props.first("ORGANIZER").and_then(|p| {
            let (name, email) = parse_person(p)?;
            Some(Organizer { name, email })
        });
        event.attendees = props
            .all("ATTENDEE")
            .filter_map(|p| {
                let (name, email) = parse_person(p)?;
                Some(Attendee {
                    name,
                    email,
                    role: p.param("ROLE").map(str::to_string),
                    participation: p.param("PARTSTAT").map(str::to_string),
                })
            })
            .collect();
        event.categories = props
            .all("CATEGORIES")
            .flat_map(|p| split_text_list(&p.value))
            .collect();
        event.priority = props
            .first("PRIORITY")
            .and_then(|p| p.value.trim().parse::<u8>().ok())
            .filter(|p| (1..=9).contains(p));

        Ok(event)
    }

    /// Returns the instant and whether it was a DATE value.
    fn parse_time(&self, prop: &ContentLine) -> Option<(DateTime<Utc>, bool)> {
        parse_date_time(
            &prop.value,
            prop.is_date_value(),
            prop.param("TZID"),
            self.default_tz,
        )
        .map(|parsed| (parsed.instant, parsed.is_date))
    }

    fn instant(&self, prop: &ContentLine) -> Option<DateTime<Utc>> {
        self.parse_time(prop).map(|(instant, _)| instant)
    }

    /// DTEND, else DURATION from start, else one day for all-day events,
    /// else a zero-length event.
    fn derive_end(
        &self,
        props: &Properties<'_>,
        start: DateTime<Utc>,
        is_all_day: bool,
    ) -> Result<DateTime<Utc>, (ParseErrorKind, usize)> {
        if let Some(end) = props.first("DTEND").and_then(|p| self.instant(p)) {
            return Ok(end);
        }
        if let Some(prop) = props.first("DURATION") {
            if let Some(duration) = parse_duration(&prop.value) {
                return start.checked_add_signed(duration).ok_or_else(|| {
                    (
                        ParseErrorKind::EndOutOfRange(prop.value.trim().to_string()),
                        prop.line,
                    )
                });
            }
        }
        if is_all_day {
            return Ok(start + Duration::days(1));
        }
        Ok(start)
    }

    fn date_list(&self, props: &Properties<'_>, name: &str) -> BTreeSet<DateTime<Utc>> {
        props
            .all(name)
            .flat_map(|prop| {
                let is_period = prop
                    .param("VALUE")
                    .is_some_and(|v| v.eq_ignore_ascii_case("PERIOD"));
                prop.value
                    .split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .filter_map(move |item| {
                        // PERIOD values are "start/end" or "start/duration"
                        let item = if is_period {
                            item.split('/').next().unwrap_or(item)
                        } else {
                            item
                        };
                        parse_date_time(
                            item,
                            prop.is_date_value(),
                            prop.param("TZID"),
                            self.default_tz,
                        )
                        .map(|parsed| parsed.instant)
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

impl ParsedFeed {
    fn skip(&mut self, kind: ParseErrorKind, uid: Option<String>, line: usize) {
        let error = ParseError { kind, uid, line };
        tracing::warn!("{}", error);
        self.skipped.push(error);
    }
}

/// Property lookup over one component's content lines.
struct Properties<'a>(&'a [ContentLine]);

impl<'a> Properties<'a> {
    fn first(&self, name: &str) -> Option<&'a ContentLine> {
        self.0.iter().find(|p| p.name == name)
    }

    fn all(&self, name: &str) -> impl Iterator<Item = &'a ContentLine> {
        self.0.iter().filter(move |p| p.name == name)
    }

    fn text(&self, name: &str) -> Option<String> {
        self.first(name)
            .map(|p| unescape_text(&p.value))
            .filter(|v| !v.trim().is_empty())
    }
}

/// Case-insensitive `BEGIN:X` / `END:X` check.
fn is_marker(line: &str, keyword: &str, component: &str) -> bool {
    line.trim()
        .split_once(':')
        .is_some_and(|(k, v)| k.eq_ignore_ascii_case(keyword) && v.trim().eq_ignore_ascii_case(component))
}

/// Best-effort UID lookup for error reporting.
fn find_uid(lines: &[&LogicalLine]) -> Option<String> {
    lines.iter().find_map(|line| {
        let content = parse_content_line(&line.text, line.first_line).ok()?;
        (content.name == "UID" && !content.value.trim().is_empty())
            .then(|| content.value.trim().to_string())
    })
}

/// Extracts (CN, email) from an ORGANIZER or ATTENDEE line.
fn parse_person(prop: &ContentLine) -> Option<(Option<String>, String)> {
    let value = prop.value.trim();
    let email = match value.get(..7) {
        Some(scheme) if scheme.eq_ignore_ascii_case("mailto:") => &value[7..],
        _ => value,
    };
    if email.is_empty() {
        return None;
    }
    let name = prop
        .param("CN")
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string);
    Some((name, email.to_string()))
}

fn parse_alarm(lines: &[ContentLine], event_start: DateTime<Utc>, uid: &str) -> Option<Alarm> {
    let props = Properties(lines);

    let action = props
        .first("ACTION")
        .and_then(|p| AlarmAction::from_ics_str(p.value.trim()))
        .unwrap_or(AlarmAction::Display);

    let Some(trigger) = props.first("TRIGGER") else {
        tracing::warn!(uid, "Ignoring VALARM without TRIGGER");
        return None;
    };

    let absolute = trigger
        .param("VALUE")
        .is_some_and(|v| v.eq_ignore_ascii_case("DATE-TIME"))
        || !trigger.value.trim_start_matches(['+', '-']).starts_with(['P', 'p']);

    let (offset, relation) = if absolute {
        let at = parse_date_time(&trigger.value, false, trigger.param("TZID"), Tz::UTC)?;
        ((at.instant - event_start).num_seconds(), TriggerRelation::Start)
    } else {
        let Some(duration) = parse_duration(&trigger.value) else {
            tracing::warn!(uid, trigger = %trigger.value, "Ignoring VALARM with unparseable TRIGGER");
            return None;
        };
        let relation = match trigger.param("RELATED") {
            Some(r) if r.eq_ignore_ascii_case("END") => TriggerRelation::End,
            _ => TriggerRelation::Start,
        };
        (duration.num_seconds(), relation)
    };

    Some(Alarm {
        action,
        trigger: offset,
        relation,
        description: props.text("DESCRIPTION"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn wrap(body: &str) -> String {
        format!("BEGIN:VCALENDAR\r\nVERSION:2.0\r\nPRODID:-//Test//EN\r\n{body}END:VCALENDAR\r\n")
    }

    fn parse(body: &str) -> ParsedFeed {
        FeedParser::default().parse(&wrap(body)).unwrap()
    }

    #[test]
    fn parses_basic_event() {
        let feed = parse(
            "BEGIN:VEVENT\r\n\
             UID:abc-123\r\n\
             SUMMARY:Team Meeting\r\n\
             DTSTART:20240115T090000Z\r\n\
             DTEND:20240115T100000Z\r\n\
             LOCATION:Room 1\\, East\r\n\
             SEQUENCE:2\r\n\
             END:VEVENT\r\n",
        );

        assert!(feed.skipped.is_empty());
        assert_eq!(feed.events.len(), 1);
        let event = &feed.events[0];
        assert_eq!(event.uid, "abc-123");
        assert_eq!(event.summary.as_deref(), Some("Team Meeting"));
        assert_eq!(event.location.as_deref(), Some("Room 1, East"));
        assert_eq!(event.start, Utc.with_ymd_and_hms(2024, 1, 15, 9, 0, 0).unwrap());
        assert_eq!(event.end, Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap());
        assert_eq!(event.sequence, 2);
        assert!(!event.is_all_day);
        assert!(event.raw_text.starts_with("BEGIN:VEVENT"));
        assert!(event.raw_text.ends_with("END:VEVENT"));
    }

    #[test]
    fn rejects_non_calendar_text() {
        let result = FeedParser::default().parse("<html><body>Not found</body></html>");
        assert_eq!(result.unwrap_err(), FeedError::NotICalendar);
    }

    #[test]
    fn skips_event_without_uid_and_keeps_others() {
        let feed = parse(
            "BEGIN:VEVENT\r\n\
             DTSTART:20240115T090000Z\r\n\
             END:VEVENT\r\n\
             BEGIN:VEVENT\r\n\
             UID:ok\r\n\
             DTSTART:20240116T090000Z\r\n\
             END:VEVENT\r\n",
        );

        assert_eq!(feed.events.len(), 1);
        assert_eq!(feed.events[0].uid, "ok");
        assert_eq!(feed.skipped.len(), 1);
        assert_eq!(feed.skipped[0].kind, ParseErrorKind::MissingUid);
    }

    #[test]
    fn skips_event_with_bad_start() {
        let feed = parse(
            "BEGIN:VEVENT\r\n\
             UID:bad\r\n\
             DTSTART:tomorrow\r\n\
             END:VEVENT\r\n",
        );

        assert!(feed.events.is_empty());
        assert_eq!(feed.skipped[0].uid.as_deref(), Some("bad"));
        assert!(matches!(feed.skipped[0].kind, ParseErrorKind::InvalidStart(_)));
    }

    #[test]
    fn oversized_duration_skips_only_that_event() {
        let feed = parse(
            "BEGIN:VEVENT\r\n\
             UID:forever\r\n\
             DTSTART:20240115T090000Z\r\n\
             DURATION:P4000000Y\r\n\
             END:VEVENT\r\n\
             BEGIN:VEVENT\r\n\
             UID:ok\r\n\
             DTSTART:20240116T090000Z\r\n\
             DURATION:PT30M\r\n\
             END:VEVENT\r\n",
        );

        assert_eq!(feed.events.len(), 1);
        assert_eq!(feed.events[0].uid, "ok");
        assert_eq!(feed.events[0].end - feed.events[0].start, Duration::minutes(30));
        assert_eq!(feed.skipped.len(), 1);
        assert_eq!(feed.skipped[0].uid.as_deref(), Some("forever"));
        assert_eq!(
            feed.skipped[0].kind,
            ParseErrorKind::EndOutOfRange("P4000000Y".to_string())
        );
    }

    #[test]
    fn missing_start_is_reported() {
        let feed = parse("BEGIN:VEVENT\r\nUID:nostart\r\nEND:VEVENT\r\n");
        assert_eq!(feed.skipped[0].kind, ParseErrorKind::MissingStart);
    }

    #[test]
    fn unterminated_event_is_skipped() {
        let text = "BEGIN:VCALENDAR\r\nBEGIN:VEVENT\r\nUID:open\r\nDTSTART:20240115T090000Z\r\n";
        let feed = FeedParser::default().parse(text).unwrap();
        assert!(feed.events.is_empty());
        assert_eq!(feed.skipped[0].kind, ParseErrorKind::UnterminatedEvent);
        assert_eq!(feed.skipped[0].uid.as_deref(), Some("open"));
    }

    #[test]
    fn sibling_begin_closes_unterminated_event() {
        let feed = parse(
            "BEGIN:VEVENT\r\n\
             UID:first\r\n\
             DTSTART:20240115T090000Z\r\n\
             BEGIN:VEVENT\r\n\
             UID:second\r\n\
             DTSTART:20240116T090000Z\r\n\
             END:VEVENT\r\n",
        );
        assert_eq!(feed.events.len(), 1);
        assert_eq!(feed.events[0].uid, "second");
        assert_eq!(feed.skipped[0].uid.as_deref(), Some("first"));
    }

    #[test]
    fn malformed_line_is_ignored_unless_required() {
        let feed = parse(
            "BEGIN:VEVENT\r\n\
             UID:tolerant\r\n\
             DTSTART:20240115T090000Z\r\n\
             GARBAGE WITHOUT COLON\r\n\
             END:VEVENT\r\n",
        );
        assert_eq!(feed.events.len(), 1);
        assert!(feed.skipped.is_empty());
    }

    #[test]
    fn all_day_event_defaults_to_one_day() {
        let feed = parse(
            "BEGIN:VEVENT\r\n\
             UID:holiday\r\n\
             DTSTART;VALUE=DATE:20240704\r\n\
             END:VEVENT\r\n",
        );
        let event = &feed.events[0];
        assert!(event.is_all_day);
        assert_eq!(event.start, Utc.with_ymd_and_hms(2024, 7, 4, 0, 0, 0).unwrap());
        assert_eq!(event.end, Utc.with_ymd_and_hms(2024, 7, 5, 0, 0, 0).unwrap());
    }

    #[test]
    fn end_from_duration_and_clamped() {
        let feed = parse(
            "BEGIN:VEVENT\r\n\
             UID:dur\r\n\
             DTSTART:20240115T090000Z\r\n\
             DURATION:PT45M\r\n\
             END:VEVENT\r\n\
             BEGIN:VEVENT\r\n\
             UID:backwards\r\n\
             DTSTART:20240115T090000Z\r\n\
             DTEND:20240115T080000Z\r\n\
             END:VEVENT\r\n",
        );
        assert_eq!(feed.events[0].end - feed.events[0].start, Duration::minutes(45));
        assert_eq!(feed.events[1].end, feed.events[1].start);
    }

    #[test]
    fn zoned_start_keeps_tzid() {
        let feed = parse(
            "BEGIN:VEVENT\r\n\
             UID:tz\r\n\
             DTSTART;TZID=Europe/Berlin:20240115T090000\r\n\
             DTEND;TZID=Europe/Berlin:20240115T100000\r\n\
             END:VEVENT\r\n",
        );
        let event = &feed.events[0];
        assert_eq!(event.time_zone.as_deref(), Some("Europe/Berlin"));
        assert_eq!(event.start, Utc.with_ymd_and_hms(2024, 1, 15, 8, 0, 0).unwrap());
    }

    #[test]
    fn floating_time_uses_configured_zone() {
        let parser = FeedParser::new(chrono_tz::America::New_York);
        let feed = parser
            .parse(&wrap(
                "BEGIN:VEVENT\r\nUID:float\r\nDTSTART:20240115T090000\r\nEND:VEVENT\r\n",
            ))
            .unwrap();
        assert_eq!(
            feed.events[0].start,
            Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap()
        );
    }

    #[test]
    fn parses_recurrence_and_date_lists() {
        let feed = parse(
            "BEGIN:VEVENT\r\n\
             UID:weekly\r\n\
             DTSTART:20240101T100000Z\r\n\
             RRULE:FREQ=WEEKLY;BYDAY=MO\r\n\
             EXDATE:20240108T100000Z,20240115T100000Z\r\n\
             EXDATE:20240122T100000Z\r\n\
             RDATE;VALUE=PERIOD:20240201T100000Z/PT1H\r\n\
             END:VEVENT\r\n",
        );
        let event = &feed.events[0];
        assert_eq!(event.recurrence_rule.as_deref(), Some("FREQ=WEEKLY;BYDAY=MO"));
        assert_eq!(event.exception_dates.len(), 3);
        assert!(event
            .additional_dates
            .contains(&Utc.with_ymd_and_hms(2024, 2, 1, 10, 0, 0).unwrap()));
    }

    #[test]
    fn parses_alarms() {
        let feed = parse(
            "BEGIN:VEVENT\r\n\
             UID:alarmed\r\n\
             DTSTART:20240115T090000Z\r\n\
             DTEND:20240115T100000Z\r\n\
             BEGIN:VALARM\r\n\
             ACTION:DISPLAY\r\n\
             TRIGGER:-PT15M\r\n\
             DESCRIPTION:Soon\r\n\
             END:VALARM\r\n\
             BEGIN:VALARM\r\n\
             ACTION:AUDIO\r\n\
             TRIGGER;RELATED=END:PT5M\r\n\
             END:VALARM\r\n\
             BEGIN:VALARM\r\n\
             ACTION:EMAIL\r\n\
             TRIGGER;VALUE=DATE-TIME:20240115T080000Z\r\n\
             END:VALARM\r\n\
             END:VEVENT\r\n",
        );
        let alarms = &feed.events[0].alarms;
        assert_eq!(alarms.len(), 3);
        assert_eq!(alarms[0].trigger, -900);
        assert_eq!(alarms[0].description.as_deref(), Some("Soon"));
        assert_eq!(alarms[1].action, AlarmAction::Audio);
        assert_eq!(alarms[1].relation, TriggerRelation::End);
        assert_eq!(alarms[1].trigger, 300);
        assert_eq!(alarms[2].action, AlarmAction::Email);
        assert_eq!(alarms[2].trigger, -3600);
    }

    #[test]
    fn skips_other_nested_components() {
        let feed = parse(
            "BEGIN:VEVENT\r\n\
             UID:nested\r\n\
             DTSTART:20240115T090000Z\r\n\
             BEGIN:X-CUSTOM\r\n\
             SUMMARY:Not the event summary\r\n\
             END:X-CUSTOM\r\n\
             SUMMARY:Real\r\n\
             END:VEVENT\r\n",
        );
        assert_eq!(feed.events[0].summary.as_deref(), Some("Real"));
    }

    #[test]
    fn parses_people_and_misc_fields() {
        let feed = parse(
            "BEGIN:VEVENT\r\n\
             UID:people\r\n\
             DTSTART:20240115T090000Z\r\n\
             ORGANIZER;CN=\"Boss, The\":MAILTO:boss@example.com\r\n\
             ATTENDEE;CN=Ann;ROLE=REQ-PARTICIPANT;PARTSTAT=ACCEPTED:mailto:ann@example.com\r\n\
             ATTENDEE:mailto:bob@example.com\r\n\
             CATEGORIES:Work,Planning\r\n\
             CATEGORIES:Work\r\n\
             PRIORITY:0\r\n\
             SEQUENCE:banana\r\n\
             STATUS:CONFIRMED\r\n\
             TRANSP:TRANSPARENT\r\n\
             END:VEVENT\r\n",
        );
        let event = &feed.events[0];
        let organizer = event.organizer.as_ref().unwrap();
        assert_eq!(organizer.email, "boss@example.com");
        assert_eq!(organizer.name.as_deref(), Some("Boss, The"));
        assert_eq!(event.attendees.len(), 2);
        assert_eq!(event.attendees[0].participation.as_deref(), Some("ACCEPTED"));
        assert_eq!(event.categories.len(), 2);
        assert_eq!(event.priority, None);
        assert_eq!(event.sequence, 0);
        assert_eq!(event.status, Some(EventStatus::Confirmed));
        assert_eq!(event.transparency, Some(Transparency::Transparent));
    }

    #[test]
    fn folded_lines_and_bare_newlines() {
        let text = "BEGIN:VCALENDAR\nBEGIN:VEVENT\nUID:folded\nDTSTART:20240115T090000Z\nDESCRIPTION:Line one\\n\n  continues\nEND:VEVENT\nEND:VCALENDAR\n";
        let feed = FeedParser::default().parse(text).unwrap();
        assert_eq!(
            feed.events[0].description.as_deref(),
            Some("Line one\n continues")
        );
    }
}
