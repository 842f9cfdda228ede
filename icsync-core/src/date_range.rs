//! Date range for filtering events.

use chrono::{DateTime, Duration, Utc};

/// Date range for filtering events.
/// None values mean unbounded in that direction. Both ends are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateRange {
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        DateRange {
            from: Some(from),
            to: Some(to),
        }
    }

    /// No bound on either side.
    pub fn unbounded() -> Self {
        DateRange::default()
    }

    /// The sync window around `now`. A missing day count leaves that side
    /// open, as does one reaching past the representable range.
    pub fn window(now: DateTime<Utc>, days_past: Option<u32>, days_future: Option<u32>) -> Self {
        let span = |days: u32| Duration::try_days(i64::from(days));
        DateRange {
            from: days_past.and_then(|days| now.checked_sub_signed(span(days)?)),
            to: days_future.and_then(|days| now.checked_add_signed(span(days)?)),
        }
    }

    /// `days` either side of `center`, clamped to the representable range.
    pub fn around(center: DateTime<Utc>, days: i64) -> Self {
        let span = Duration::try_days(days).unwrap_or(Duration::MAX);
        DateRange::new(
            center.checked_sub_signed(span).unwrap_or(DateTime::<Utc>::MIN_UTC),
            center.checked_add_signed(span).unwrap_or(DateTime::<Utc>::MAX_UTC),
        )
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    /// Whether `[start, end]` touches this range.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.from.is_none_or(|from| end >= from) && self.to.is_none_or(|to| start <= to)
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        self.overlaps(instant, instant)
    }
}
