//! Calendar event model: time points, template events and materialized
//! occurrences.
//!
//! An [`Event`] is the template every concrete occurrence derives from; a
//! displayed entry is an [`Occurrence`] carrying the template's uid rather
//! than a reference, so edits triggered from an occurrence always resolve
//! back through the owning calendar by uid lookup.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use tracing::warn;
use uuid::Uuid;

use crate::error::CalResult;
use crate::recurrence::Recurrence;

/// A point in calendar time, kept as specific as the source made it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTime {
    /// Pure calendar date (all-day semantics).
    Date(NaiveDate),
    /// Absolute instant.
    Utc(DateTime<Utc>),
    /// Wall-clock time the source left without a zone.
    Floating(NaiveDateTime),
    /// Wall-clock time pinned to an IANA zone.
    Zoned { datetime: NaiveDateTime, tzid: String },
}

impl EventTime {
    /// Normalize into the reference zone used for all occurrence arithmetic.
    ///
    /// Dates become midnight; floating times are read as already being in
    /// the reference zone, which makes zone-stripped comparisons against
    /// them come out right without a separate code path.
    pub fn to_utc(&self) -> DateTime<Utc> {
        match self {
            EventTime::Date(d) => d.and_time(NaiveTime::MIN).and_utc(),
            EventTime::Utc(dt) => *dt,
            EventTime::Floating(dt) => dt.and_utc(),
            EventTime::Zoned { datetime, tzid } => match tzid.parse::<chrono_tz::Tz>() {
                Ok(tz) => tz
                    .from_local_datetime(datetime)
                    .earliest()
                    // times skipped by a DST jump fall back to the naive reading
                    .map_or_else(|| datetime.and_utc(), |dt| dt.with_timezone(&Utc)),
                Err(_) => datetime.and_utc(),
            },
        }
    }

    /// Shift by a duration, preserving the variant. Dates move by whole days.
    pub fn plus(&self, delta: Duration) -> EventTime {
        match self {
            EventTime::Date(d) => EventTime::Date(*d + Duration::days(delta.num_days())),
            EventTime::Utc(dt) => EventTime::Utc(*dt + delta),
            EventTime::Floating(dt) => EventTime::Floating(*dt + delta),
            EventTime::Zoned { datetime, tzid } => EventTime::Zoned {
                datetime: *datetime + delta,
                tzid: tzid.clone(),
            },
        }
    }

    /// Map a normalized instant back onto the variant of `like`, so derived
    /// occurrences keep the representation of their template.
    pub fn from_instant(instant: DateTime<Utc>, like: &EventTime) -> EventTime {
        match like {
            EventTime::Date(_) => EventTime::Date(instant.date_naive()),
            EventTime::Utc(_) => EventTime::Utc(instant),
            EventTime::Floating(_) => EventTime::Floating(instant.naive_utc()),
            EventTime::Zoned { tzid, .. } => match tzid.parse::<chrono_tz::Tz>() {
                Ok(tz) => EventTime::Zoned {
                    datetime: instant.with_timezone(&tz).naive_local(),
                    tzid: tzid.clone(),
                },
                Err(_) => EventTime::Zoned {
                    datetime: instant.naive_utc(),
                    tzid: tzid.clone(),
                },
            },
        }
    }

    pub fn is_all_day(&self) -> bool {
        matches!(self, EventTime::Date(_))
    }

    /// Whether the source pinned this time to a concrete zone.
    pub fn has_zone(&self) -> bool {
        !matches!(self, EventTime::Floating(_))
    }
}

impl fmt::Display for EventTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventTime::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
            EventTime::Utc(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S UTC")),
            EventTime::Floating(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S")),
            EventTime::Zoned { datetime, tzid } => {
                write!(f, "{} ({})", datetime.format("%Y-%m-%d %H:%M:%S"), tzid)
            }
        }
    }
}

/// One logical calendar entry: the template occurrence plus its recurrence.
#[derive(Debug, Clone)]
pub struct Event {
    pub uid: String,
    pub summary: String,
    pub description: String,
    /// Tag list in source order; duplicates are allowed.
    pub categories: Vec<String>,
    pub start: EventTime,
    /// Exclusive end bound. Always lies after `start`.
    pub end: EventTime,
    pub recurrence: Recurrence,
    pub mod_stamp: DateTime<Utc>,
}

impl Event {
    /// Build a fresh non-repeating event with a generated uid. A missing end
    /// falls back to one day for all-day starts and one second otherwise.
    pub fn new(
        start: EventTime,
        end: Option<EventTime>,
        summary: impl Into<String>,
        description: impl Into<String>,
        categories: Vec<String>,
    ) -> CalResult<Self> {
        let end = Self::resolve_end(&start, end);
        Ok(Event {
            uid: Uuid::new_v4().to_string(),
            summary: summary.into(),
            description: description.into(),
            categories,
            recurrence: Recurrence::single(start.clone())?,
            start,
            end,
            mod_stamp: Utc::now(),
        })
    }

    /// End fallback rules: an explicit end wins when it lies after the
    /// start, anything else gets the default.
    pub(crate) fn resolve_end(start: &EventTime, end: Option<EventTime>) -> EventTime {
        match end {
            Some(end) if end.to_utc() > start.to_utc() => end,
            Some(end) => {
                warn!(%start, %end, "event end does not lie after its start; using the default");
                Self::default_end(start)
            }
            None => Self::default_end(start),
        }
    }

    fn default_end(start: &EventTime) -> EventTime {
        match start {
            EventTime::Date(d) => EventTime::Date(*d + Duration::days(1)),
            timed => timed.plus(Duration::seconds(1)),
        }
    }

    /// Constant occurrence length. Always derived from the template bounds so
    /// derived occurrences cannot drift.
    pub fn duration(&self) -> Duration {
        self.end.to_utc() - self.start.to_utc()
    }

    /// Replace the recurrence, refreshing the modification stamp.
    pub fn with_recurrence(&self, recurrence: Recurrence) -> Event {
        Event {
            recurrence,
            mod_stamp: Utc::now(),
            ..self.clone()
        }
    }

    /// Materialize the occurrence of this event starting at `start`.
    pub fn occurrence_at(&self, start: EventTime) -> Occurrence {
        let end = start.plus(self.duration());
        Occurrence {
            template_uid: self.uid.clone(),
            start,
            end,
            summary: self.summary.clone(),
            categories: self.categories.clone(),
        }
    }

    /// Every occurrence whose displayed interval intersects
    /// `[window_start, window_end)`.
    ///
    /// The recurrence query is widened on the left by the event duration so
    /// occurrences that start before the window but still reach into it are
    /// found; the displayed interval is inclusive of its last second, hence
    /// the strict overlap test.
    pub fn occurrences_within(
        &self,
        window_start: DateTime<Utc>,
        window_end: DateTime<Utc>,
    ) -> Vec<Occurrence> {
        let duration = self.duration();
        self.recurrence
            .occurrences_between(window_start - duration, window_end)
            .into_iter()
            .filter(|start| *start + duration > window_start)
            .map(|start| self.occurrence_at(EventTime::from_instant(start, &self.start)))
            .collect()
    }
}

/// A single concrete occurrence of a template event, as handed to display
/// layers. Short-lived and value-only: it names its template by uid, never by
/// reference, so it cannot dangle after the template is replaced or deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct Occurrence {
    pub template_uid: String,
    pub start: EventTime,
    pub end: EventTime,
    pub summary: String,
    pub categories: Vec<String>,
}

impl Occurrence {
    pub fn duration(&self) -> Duration {
        self.end.to_utc() - self.start.to_utc()
    }

    pub fn is_all_day(&self) -> bool {
        self.start.is_all_day()
    }
}
