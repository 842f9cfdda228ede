//! Value parsers (RFC 5545 §3.3): dates, date-times, durations and text.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Legacy zone names seen in the wild, mostly from Exchange/Outlook feeds.
const TZ_ALIASES: &[(&str, &str)] = &[
    ("Eastern Standard Time", "America/New_York"),
    ("Central Standard Time", "America/Chicago"),
    ("Mountain Standard Time", "America/Denver"),
    ("US Mountain Standard Time", "America/Phoenix"),
    ("Pacific Standard Time", "America/Los_Angeles"),
    ("Alaskan Standard Time", "America/Anchorage"),
    ("Hawaiian Standard Time", "Pacific/Honolulu"),
    ("Atlantic Standard Time", "America/Halifax"),
    ("GMT Standard Time", "Europe/London"),
    ("Greenwich Standard Time", "Atlantic/Reykjavik"),
    ("W. Europe Standard Time", "Europe/Berlin"),
    ("Romance Standard Time", "Europe/Paris"),
    ("Central Europe Standard Time", "Europe/Budapest"),
    ("Central European Standard Time", "Europe/Warsaw"),
    ("E. Europe Standard Time", "Europe/Chisinau"),
    ("FLE Standard Time", "Europe/Kiev"),
    ("GTB Standard Time", "Europe/Bucharest"),
    ("Russian Standard Time", "Europe/Moscow"),
    ("India Standard Time", "Asia/Kolkata"),
    ("China Standard Time", "Asia/Shanghai"),
    ("Tokyo Standard Time", "Asia/Tokyo"),
    ("Korea Standard Time", "Asia/Seoul"),
    ("Singapore Standard Time", "Asia/Singapore"),
    ("AUS Eastern Standard Time", "Australia/Sydney"),
    ("E. Australia Standard Time", "Australia/Brisbane"),
    ("New Zealand Standard Time", "Pacific/Auckland"),
    ("UTC", "UTC"),
    ("Coordinated Universal Time", "UTC"),
    ("GMT", "UTC"),
    ("Z", "UTC"),
    ("US/Eastern", "America/New_York"),
    ("US/Central", "America/Chicago"),
    ("US/Mountain", "America/Denver"),
    ("US/Pacific", "America/Los_Angeles"),
];

const MONTH_DAYS: i64 = 30;
const YEAR_DAYS: i64 = 365;

/// A parsed DATE or DATE-TIME value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParsedTime {
    pub instant: DateTime<Utc>,
    pub is_date: bool,
}

/// Resolves a TZID parameter to a zone.
///
/// Accepts IANA names, the legacy aliases above, `/mozilla.org/...` style
/// prefixed names and Outlook labels such as `(UTC-05:00) Eastern Time (US & Canada)`.
pub fn resolve_timezone(tzid: &str) -> Option<Tz> {
    let tzid = tzid.trim().trim_matches('"');

    if let Ok(tz) = tzid.parse::<Tz>() {
        return Some(tz);
    }

    if let Some((_, iana)) = TZ_ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(tzid))
    {
        return iana.parse::<Tz>().ok();
    }

    // "/mozilla.org/20050126_1/America/New_York", "/America/New_York"
    let segments: Vec<&str> = tzid.split('/').filter(|s| !s.is_empty()).collect();
    for take in [3usize, 2] {
        if segments.len() >= take {
            let candidate = segments[segments.len() - take..].join("/");
            if let Ok(tz) = candidate.parse::<Tz>() {
                return Some(tz);
            }
        }
    }

    // "(UTC-05:00) Eastern Time (US & Canada)"
    if tzid.starts_with('(') {
        let label = tzid
            .split_once(')')
            .map(|(_, rest)| rest.trim())
            .unwrap_or_default();
        return outlook_label_zone(label);
    }

    None
}

fn outlook_label_zone(label: &str) -> Option<Tz> {
    let iana = match label {
        l if l.starts_with("Eastern Time") => "America/New_York",
        l if l.starts_with("Central Time") => "America/Chicago",
        l if l.starts_with("Mountain Time") => "America/Denver",
        l if l.starts_with("Pacific Time") => "America/Los_Angeles",
        l if l.starts_with("Amsterdam, Berlin") => "Europe/Berlin",
        l if l.starts_with("Brussels, Copenhagen") => "Europe/Paris",
        l if l.starts_with("Dublin, Edinburgh") => "Europe/London",
        l if l.starts_with("Coordinated Universal Time") => "UTC",
        _ => return None,
    };
    iana.parse::<Tz>().ok()
}

/// Parses a DATE (`YYYYMMDD`) value.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.len() != 8 || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(s, "%Y%m%d").ok()
}

/// Parses a DATE-TIME (`YYYYMMDDTHHMMSS[Z]`) value without zone resolution.
///
/// Returns the naive value and whether it carried the UTC designator.
pub fn parse_naive_datetime(s: &str) -> Option<(NaiveDateTime, bool)> {
    let s = s.trim();
    let (body, is_utc) = match s.strip_suffix(['Z', 'z']) {
        Some(stripped) => (stripped, true),
        None => (s, false),
    };
    let (date_part, time_part) = body.split_once(['T', 't'])?;
    let date = parse_date(date_part)?;

    // Some producers omit seconds ("20240115T0900")
    let time = match time_part.len() {
        6 => NaiveTime::parse_from_str(time_part, "%H%M%S").ok()?,
        4 => NaiveTime::parse_from_str(time_part, "%H%M").ok()?,
        _ => return None,
    };

    Some((date.and_time(time), is_utc))
}

/// Interprets a local wall-clock time in `tz`.
///
/// Times inside a DST gap are shifted forward an hour; ambiguous times take
/// the earlier instant.
pub fn localize(naive: NaiveDateTime, tz: Tz) -> Option<DateTime<Utc>> {
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(earliest, _) => Some(earliest.with_timezone(&Utc)),
        LocalResult::None => tz
            .from_local_datetime(&(naive + Duration::hours(1)))
            .earliest()
            .map(|dt| dt.with_timezone(&Utc)),
    }
}

/// Parses a DATE or DATE-TIME property value into a UTC instant.
///
/// - `is_date_param`: the property carried `VALUE=DATE`
/// - `tzid`: the TZID parameter, if any
/// - `default_tz`: zone for floating times and unknown TZIDs
pub fn parse_date_time(
    value: &str,
    is_date_param: bool,
    tzid: Option<&str>,
    default_tz: Tz,
) -> Option<ParsedTime> {
    let value = value.trim();

    if is_date_param || (value.len() == 8 && !value.contains(['T', 't'])) {
        let date = parse_date(value)?;
        return Some(ParsedTime {
            instant: date.and_time(NaiveTime::MIN).and_utc(),
            is_date: true,
        });
    }

    let (naive, is_utc) = parse_naive_datetime(value)?;

    let instant = if is_utc {
        naive.and_utc()
    } else {
        let tz = match tzid {
            Some(id) => resolve_timezone(id).unwrap_or_else(|| {
                tracing::warn!(tzid = id, "Unknown TZID, using default timezone");
                default_tz
            }),
            None => default_tz,
        };
        localize(naive, tz)?
    };

    Some(ParsedTime {
        instant,
        is_date: false,
    })
}

/// Parses a DURATION value: `[+|-]P[nW]` or `[+|-]P[nY][nM][nD][T[nH][nM][nS]]`.
///
/// Months count as 30 days and years as 365; without a calendar anchor an
/// exact length cannot be known.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    let (negative, body) = match s.as_bytes().first()? {
        b'-' => (true, &s[1..]),
        b'+' => (false, &s[1..]),
        _ => (false, s),
    };

    if !body.starts_with(['P', 'p']) {
        return None;
    }

    // Values past TimeDelta's range are treated as unparseable
    let parsed = iso8601::duration(&body.to_ascii_uppercase()).ok()?;
    let duration = match parsed {
        iso8601::Duration::Weeks(w) => Duration::try_weeks(i64::from(w))?,
        iso8601::Duration::YMDHMS {
            year,
            month,
            day,
            hour,
            minute,
            second,
            millisecond,
        } => {
            let days = i64::from(year) * YEAR_DAYS + i64::from(month) * MONTH_DAYS + i64::from(day);
            Duration::try_days(days)?
                .checked_add(&Duration::try_hours(i64::from(hour))?)?
                .checked_add(&Duration::try_minutes(i64::from(minute))?)?
                .checked_add(&Duration::try_seconds(i64::from(second))?)?
                .checked_add(&Duration::try_milliseconds(i64::from(millisecond))?)?
        }
    };

    Some(if negative { -duration } else { duration })
}

/// Formats a signed offset in seconds as a DURATION value, e.g. `-PT15M`.
pub fn format_duration(seconds: i64) -> String {
    let sign = if seconds < 0 { "-" } else { "" };
    let mut rest = seconds.unsigned_abs();

    let days = rest / 86_400;
    rest %= 86_400;
    let hours = rest / 3_600;
    rest %= 3_600;
    let minutes = rest / 60;
    let secs = rest % 60;

    let mut out = format!("{sign}P");
    if days > 0 {
        out.push_str(&format!("{days}D"));
    }
    if hours > 0 || minutes > 0 || secs > 0 || days == 0 {
        out.push('T');
        if hours > 0 {
            out.push_str(&format!("{hours}H"));
        }
        if minutes > 0 {
            out.push_str(&format!("{minutes}M"));
        }
        if secs > 0 || (hours == 0 && minutes == 0) {
            out.push_str(&format!("{secs}S"));
        }
    }
    out
}

/// Unescapes a TEXT value (`\n`, `\N`, `\,`, `\;`, `\\`).
pub fn unescape_text(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            result.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some('n' | 'N') => result.push('\n'),
            // `\:` is not in RFC 5545 but Outlook writes it
            Some(escaped @ (',' | ';' | ':' | '\\')) => result.push(escaped),
            // Unknown escapes keep their backslash
            _ => {
                result.push(c);
                continue;
            }
        }
        chars.next();
    }

    result
}

/// Splits a TEXT list on unescaped commas, unescaping each item.
pub fn split_text_list(s: &str) -> Vec<String> {
    let mut items = Vec::new();
    let mut current = String::new();
    let mut escaped = false;

    for c in s.chars() {
        if escaped {
            current.push('\\');
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == ',' {
            items.push(unescape_text(&current));
            current.clear();
        } else {
            current.push(c);
        }
    }
    if escaped {
        current.push('\\');
    }
    items.push(unescape_text(&current));

    items
        .into_iter()
        .map(|item| item.trim().to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Formats an instant the way the fingerprint and the store files expect.
pub fn format_ics_utc(dt: &DateTime<Utc>) -> String {
    dt.format("%Y%m%dT%H%M%SZ").to_string()
}
