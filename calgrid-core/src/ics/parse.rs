//! Event construction from parsed iCalendar components.

use chrono::Utc;
use icalendar::parser::{Component, Property};
use icalendar::DatePerhapsTime;
use tracing::warn;
use uuid::Uuid;

use crate::error::{CalError, CalResult};
use crate::event::{Event, EventTime};
use crate::recurrence::{Recurrence, RuleSpec};

/// Build an [`Event`] from a parsed VEVENT component.
///
/// A missing DTSTART is fatal for the record. A missing DTEND/DURATION falls
/// back to the all-day / minimal-duration defaults; a missing UID or DTSTAMP
/// is tolerated with generated values.
pub fn event_from_component(vevent: &Component) -> CalResult<Event> {
    let start = vevent
        .find_prop("DTSTART")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(to_event_time)
        .ok_or(CalError::MissingStart)?;

    let end = match vevent
        .find_prop("DTEND")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
    {
        Some(dpt) => Some(to_event_time(dpt)),
        None => duration_prop(vevent).map(|d| start.plus(d)),
    };

    let uid = match vevent.find_prop("UID") {
        Some(p) => p.val.to_string(),
        None => {
            let uid = Uuid::new_v4().to_string();
            warn!(%uid, "VEVENT without UID; generated one");
            uid
        }
    };

    let mod_stamp = vevent
        .find_prop("DTSTAMP")
        .and_then(|p| DatePerhapsTime::try_from(p).ok())
        .map(|dpt| to_event_time(dpt).to_utc())
        .unwrap_or_else(Utc::now);

    let summary = vevent
        .find_prop("SUMMARY")
        .map(|p| p.val.to_string())
        .unwrap_or_default();
    let description = vevent
        .find_prop("DESCRIPTION")
        .map(|p| p.val.to_string())
        .unwrap_or_default();

    // CATEGORIES may repeat, each line carrying a comma-separated group;
    // flatten them into one ordered list
    let categories: Vec<String> = vevent
        .properties
        .iter()
        .filter(|p| p.name == "CATEGORIES")
        .flat_map(|p| p.val.as_ref().split(','))
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();

    let mut rules = Vec::new();
    for prop in vevent.properties.iter().filter(|p| p.name == "RRULE") {
        rules.push(RuleSpec::parse(prop.val.as_ref())?);
    }

    let recurrence = Recurrence::new(
        start.clone(),
        rules,
        date_list(vevent, "RDATE"),
        date_list(vevent, "EXDATE"),
    )?;

    let end = Event::resolve_end(&start, end);
    Ok(Event {
        uid,
        summary,
        description,
        categories,
        start,
        end,
        recurrence,
        mod_stamp,
    })
}

/// Convert the crate's DatePerhapsTime to our EventTime, preserving zone info.
fn to_event_time(dpt: DatePerhapsTime) -> EventTime {
    match dpt {
        DatePerhapsTime::Date(d) => EventTime::Date(d),
        DatePerhapsTime::DateTime(cal_dt) => match cal_dt {
            icalendar::CalendarDateTime::Utc(dt) => EventTime::Utc(dt),
            icalendar::CalendarDateTime::Floating(naive) => EventTime::Floating(naive),
            icalendar::CalendarDateTime::WithTimezone { date_time, tzid } => EventTime::Zoned {
                datetime: date_time,
                tzid,
            },
        },
    }
}

/// Collect every value of a date-list property (RDATE or EXDATE).
fn date_list(vevent: &Component, key: &str) -> Vec<EventTime> {
    vevent
        .properties
        .iter()
        .filter(|p| p.name == key)
        .flat_map(date_prop_values)
        .collect()
}

/// Parse one RDATE/EXDATE property into a list of EventTime values.
///
/// Handles:
/// - TZID parameter: `EXDATE;TZID=America/New_York:20240108T100000`
/// - VALUE=DATE: `EXDATE;VALUE=DATE:20240108`
/// - UTC: `EXDATE:20240108T100000Z`
/// - Floating: `EXDATE:20240108T100000`
/// - Comma-separated values: `EXDATE;TZID=...:20240108T100000,20240115T100000`
fn date_prop_values(prop: &Property) -> Vec<EventTime> {
    let tzid = prop
        .params
        .iter()
        .find(|p| p.key == "TZID")
        .and_then(|p| p.val.as_ref().map(|v| v.to_string()));

    let is_date = prop
        .params
        .iter()
        .any(|p| p.key == "VALUE" && p.val.as_ref().map(|v| v.as_ref()) == Some("DATE"));

    let val_str = prop.val.as_ref();
    val_str
        .split(',')
        .filter_map(|s| {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            if is_date {
                chrono::NaiveDate::parse_from_str(s, "%Y%m%d")
                    .ok()
                    .map(EventTime::Date)
            } else if let Some(ref tz) = tzid {
                chrono::NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(|dt| EventTime::Zoned {
                        datetime: dt,
                        tzid: tz.clone(),
                    })
            } else if let Some(naive) = s.strip_suffix('Z') {
                chrono::NaiveDateTime::parse_from_str(naive, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(|dt| EventTime::Utc(dt.and_utc()))
            } else {
                chrono::NaiveDateTime::parse_from_str(s, "%Y%m%dT%H%M%S")
                    .ok()
                    .map(EventTime::Floating)
            }
        })
        .collect()
}

/// DURATION property as a chrono duration, when present and well-formed.
fn duration_prop(vevent: &Component) -> Option<chrono::Duration> {
    let raw = vevent.find_prop("DURATION")?;
    let parsed = iso8601::duration(raw.val.as_ref()).ok()?;
    let std: std::time::Duration = parsed.into();
    chrono::Duration::from_std(std).ok()
}
