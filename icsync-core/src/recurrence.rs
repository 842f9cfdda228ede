//! RRULE translation and occurrence checks for recurring events.
//!
//! `parse_rule` turns feed RRULE text into a structured rule the store can
//! hold; `to_rule_text` goes back. The inverse is lossy: BYYEARDAY, BYWEEKNO
//! and any unmodeled qualifier are dropped.

use chrono::{DateTime, Duration, NaiveTime, Utc, Weekday};
use rrule::RRuleSet;
use serde::{Deserialize, Serialize};

use crate::date_range::DateRange;
use crate::event::CalendarEvent;
use crate::ics::values::{format_ics_utc, parse_date, parse_naive_datetime};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Frequency {
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    pub fn as_ics_str(&self) -> &'static str {
        match self {
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Yearly => "YEARLY",
        }
    }
}

/// A BYDAY entry such as `MO`, `2TU` or `-1FR`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WeekdayRule {
    pub weekday: Weekday,
    /// Nth occurrence within the month/year; negative counts from the end
    pub ordinal: Option<i8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecurrenceEnd {
    Never,
    Count(u32),
    Until(DateTime<Utc>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecurrenceRule {
    pub frequency: Frequency,
    pub interval: u32,
    pub by_day: Vec<WeekdayRule>,
    pub by_month_day: Vec<i8>,
    pub by_month: Vec<u8>,
    pub by_set_pos: Vec<i16>,
    pub by_year_day: Vec<i16>,
    pub by_week_no: Vec<i8>,
    pub end: RecurrenceEnd,
}

impl RecurrenceRule {
    pub fn new(frequency: Frequency) -> Self {
        RecurrenceRule {
            frequency,
            interval: 1,
            by_day: Vec::new(),
            by_month_day: Vec::new(),
            by_month: Vec::new(),
            by_set_pos: Vec::new(),
            by_year_day: Vec::new(),
            by_week_no: Vec::new(),
            end: RecurrenceEnd::Never,
        }
    }
}

/// Parses RRULE text (without the `RRULE:` prefix).
///
/// Returns `None` for a missing or unsupported FREQ; the event is then
/// treated as non-recurring. Unknown parts and unparseable list items are
/// ignored. A date-only UNTIL takes the time of day of `event_start`.
pub fn parse_rule(text: &str, event_start: DateTime<Utc>) -> Option<RecurrenceRule> {
    let text = strip_rule_prefix(text);

    let parts: Vec<(String, &str)> = text
        .split(';')
        .filter_map(|part| part.split_once('='))
        .map(|(key, value)| (key.trim().to_ascii_uppercase(), value.trim()))
        .collect();

    let get = |key: &str| parts.iter().find(|(k, _)| k == key).map(|(_, v)| *v);

    let frequency = match get("FREQ").map(str::to_ascii_uppercase).as_deref() {
        Some("DAILY") => Frequency::Daily,
        Some("WEEKLY") => Frequency::Weekly,
        Some("MONTHLY") => Frequency::Monthly,
        Some("YEARLY") => Frequency::Yearly,
        other => {
            tracing::warn!(freq = ?other, rule = text, "Unsupported recurrence frequency, ignoring rule");
            return None;
        }
    };

    let mut rule = RecurrenceRule::new(frequency);

    rule.interval = get("INTERVAL")
        .and_then(|v| v.parse::<u32>().ok())
        .filter(|i| *i > 0)
        .unwrap_or(1);

    rule.by_day = get("BYDAY")
        .map(|v| v.split(',').filter_map(parse_weekday_rule).collect())
        .unwrap_or_default();
    rule.by_month_day = number_list(get("BYMONTHDAY"), -31, 31);
    rule.by_month = number_list::<i16>(get("BYMONTH"), 1, 12)
        .into_iter()
        .filter_map(|m| u8::try_from(m).ok())
        .collect();
    rule.by_set_pos = number_list(get("BYSETPOS"), -366, 366);
    rule.by_year_day = number_list(get("BYYEARDAY"), -366, 366);
    rule.by_week_no = number_list(get("BYWEEKNO"), -53, 53);

    let count = get("COUNT").and_then(|v| v.parse::<u32>().ok());
    let until = get("UNTIL").and_then(|v| parse_until(v, event_start));
    rule.end = match (count, until) {
        (Some(count), _) => RecurrenceEnd::Count(count),
        (None, Some(until)) => RecurrenceEnd::Until(until),
        (None, None) => RecurrenceEnd::Never,
    };

    Some(rule)
}

/// Renders a rule back to RRULE text.
pub fn to_rule_text(rule: &RecurrenceRule) -> String {
    let mut parts = vec![format!("FREQ={}", rule.frequency.as_ics_str())];

    if rule.interval > 1 {
        parts.push(format!("INTERVAL={}", rule.interval));
    }
    if !rule.by_day.is_empty() {
        let days: Vec<String> = rule.by_day.iter().map(format_weekday_rule).collect();
        parts.push(format!("BYDAY={}", days.join(",")));
    }
    push_list(&mut parts, "BYMONTHDAY", &rule.by_month_day);
    push_list(&mut parts, "BYMONTH", &rule.by_month);
    push_list(&mut parts, "BYSETPOS", &rule.by_set_pos);

    match rule.end {
        RecurrenceEnd::Never => {}
        RecurrenceEnd::Count(count) => parts.push(format!("COUNT={count}")),
        RecurrenceEnd::Until(until) => parts.push(format!("UNTIL={}", format_ics_utc(&until))),
    }

    parts.join(";")
}

/// Whether any occurrence of `event` overlaps `range`.
///
/// Non-recurring events are checked directly. Recurring events are expanded
/// with the `rrule` crate, honoring EXDATEs, and RDATEs are checked on top.
pub fn occurs_within(event: &CalendarEvent, range: &DateRange) -> bool {
    if range.overlaps(event.start, event.end) {
        return true;
    }

    let duration = event.end - event.start;

    if event
        .additional_dates
        .iter()
        .any(|date| {
            let end = date.checked_add_signed(duration).unwrap_or(DateTime::<Utc>::MAX_UTC);
            range.overlaps(*date, end)
        })
    {
        return true;
    }

    let Some(rule_text) = event.recurrence_rule.as_deref() else {
        return false;
    };

    let Some(rule) = parse_rule(rule_text, event.start) else {
        return false;
    };

    // Occurrences start at or after the master start
    if range.to.is_some_and(|to| event.start > to) {
        return false;
    }

    let rrule_str = build_rrule_string(event, rule_text, &rule);
    let rrule_set: RRuleSet = match rrule_str.parse() {
        Ok(set) => set,
        Err(e) => {
            tracing::warn!(uid = %event.uid, error = %e, "Could not expand recurrence, keeping event");
            return true;
        }
    };

    // An occurrence overlaps when it starts in [from - duration, to].
    // after/before are exclusive, hence the one-second padding.
    let tz: rrule::Tz = Utc.into();
    let mut query = rrule_set;
    let earliest = range.from.and_then(|from| {
        from.checked_sub_signed(duration)?
            .checked_sub_signed(Duration::seconds(1))
    });
    if let Some(earliest) = earliest {
        query = query.after(earliest.with_timezone(&tz));
    }
    if let Some(latest) = range.to.and_then(|to| to.checked_add_signed(Duration::seconds(1))) {
        query = query.before(latest.with_timezone(&tz));
    }

    !query.all(1).dates.is_empty()
}

/// Build an iCalendar-format rule set for the rrule crate parser.
///
/// The feed's rule is used as written so qualifiers the structured rule
/// drops still narrow the expansion. Only UNTIL is rewritten, in UTC, to
/// agree with the UTC DTSTART.
fn build_rrule_string(event: &CalendarEvent, rule_text: &str, rule: &RecurrenceRule) -> String {
    let mut parts: Vec<String> = strip_rule_prefix(rule_text)
        .split(';')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .filter(|part| {
            let key = part.split_once('=').map_or(*part, |(key, _)| key);
            !key.trim().eq_ignore_ascii_case("UNTIL")
        })
        .map(str::to_string)
        .collect();
    if let RecurrenceEnd::Until(until) = rule.end {
        parts.push(format!("UNTIL={}", format_ics_utc(&until)));
    }

    let mut lines = vec![
        format!("DTSTART:{}", format_ics_utc(&event.start)),
        format!("RRULE:{}", parts.join(";")),
    ];
    for exdate in &event.exception_dates {
        lines.push(format!("EXDATE:{}", format_ics_utc(exdate)));
    }
    lines.join("\n")
}

fn strip_rule_prefix(text: &str) -> &str {
    let text = text.trim();
    text.strip_prefix("RRULE:")
        .or_else(|| text.strip_prefix("rrule:"))
        .unwrap_or(text)
}

fn parse_until(value: &str, event_start: DateTime<Utc>) -> Option<DateTime<Utc>> {
    if let Some(date) = parse_date(value) {
        let time: NaiveTime = event_start.time();
        return Some(date.and_time(time).and_utc());
    }
    // Floating UNTIL values are read as UTC
    parse_naive_datetime(value).map(|(naive, _)| naive.and_utc())
}

fn parse_weekday_rule(item: &str) -> Option<WeekdayRule> {
    let item = item.trim().to_ascii_uppercase();
    if item.len() < 2 || !item.is_char_boundary(item.len() - 2) {
        return None;
    }
    let (ordinal, day) = item.split_at(item.len() - 2);

    let weekday = match day {
        "MO" => Weekday::Mon,
        "TU" => Weekday::Tue,
        "WE" => Weekday::Wed,
        "TH" => Weekday::Thu,
        "FR" => Weekday::Fri,
        "SA" => Weekday::Sat,
        "SU" => Weekday::Sun,
        _ => return None,
    };

    let ordinal = match ordinal {
        "" => None,
        n => {
            let n = n.trim_start_matches('+').parse::<i8>().ok()?;
            if n == 0 || !(-53..=53).contains(&n) {
                return None;
            }
            Some(n)
        }
    };

    Some(WeekdayRule { weekday, ordinal })
}

fn format_weekday_rule(rule: &WeekdayRule) -> String {
    let day = match rule.weekday {
        Weekday::Mon => "MO",
        Weekday::Tue => "TU",
        Weekday::Wed => "WE",
        Weekday::Thu => "TH",
        Weekday::Fri => "FR",
        Weekday::Sat => "SA",
        Weekday::Sun => "SU",
    };
    match rule.ordinal {
        Some(n) => format!("{n}{day}"),
        None => day.to_string(),
    }
}

/// Parses a comma list of non-zero integers within `[min, max]`, dropping bad items.
fn number_list<T>(value: Option<&str>, min: i16, max: i16) -> Vec<T>
where
    T: TryFrom<i16>,
{
    value
        .map(|v| {
            v.split(',')
                .filter_map(|item| item.trim().trim_start_matches('+').parse::<i16>().ok())
                .filter(|n| *n != 0 && (min..=max).contains(n))
                .filter_map(|n| T::try_from(n).ok())
                .collect()
        })
        .unwrap_or_default()
}

fn push_list<T: ToString>(parts: &mut Vec<String>, key: &str, values: &[T]) {
    if values.is_empty() {
        return;
    }
    let joined: Vec<String> = values.iter().map(ToString::to_string).collect();
    parts.push(format!("{key}={}", joined.join(",")));
}
