//! Serialization of events back to iCalendar components.

use icalendar::{Component, EventLike, Property, ValueType};

use crate::event::{Event, EventTime};

/// Serialize an [`Event`] into a VEVENT component.
///
/// RRULE lines are re-derived from the rule list (UNTIL always in absolute
/// UTC form), start/end keep the zone stripped for floating times and are
/// truncated to a date for all-day ones, and summary/description are only
/// emitted when non-empty. UID and DTSTAMP are always emitted.
pub fn component_from_event(event: &Event) -> icalendar::Event {
    let mut out = icalendar::Event::new();
    out.uid(&event.uid);

    for rule in event.recurrence.rules() {
        out.append_multi_property(Property::new("RRULE", rule.to_string()));
    }
    for instant in event.recurrence.inc_dates() {
        out.append_multi_property(date_property("RDATE", instant));
    }
    for instant in event.recurrence.ex_dates() {
        out.append_multi_property(date_property("EXDATE", instant));
    }

    out.append_property(date_property("DTSTART", &event.start));
    out.append_property(date_property("DTEND", &event.end));

    if !event.summary.is_empty() {
        out.summary(&event.summary);
    }
    if !event.description.is_empty() {
        out.description(&event.description);
    }
    if !event.categories.is_empty() {
        out.add_property("CATEGORIES", event.categories.join(","));
    }
    out.add_property(
        "DTSTAMP",
        event.mod_stamp.format("%Y%m%dT%H%M%SZ").to_string(),
    );

    out.done()
}

/// Format a time property per variant: dates as VALUE=DATE, floating times
/// with the zone stripped, zoned times with their TZID parameter.
fn date_property(name: &str, time: &EventTime) -> Property {
    match time {
        EventTime::Date(d) => {
            let mut prop = Property::new(name, d.format("%Y%m%d").to_string());
            prop.append_parameter(ValueType::Date);
            prop
        }
        EventTime::Utc(dt) => Property::new(name, dt.format("%Y%m%dT%H%M%SZ").to_string()),
        EventTime::Floating(dt) => Property::new(name, dt.format("%Y%m%dT%H%M%S").to_string()),
        EventTime::Zoned { datetime, tzid } => {
            let mut prop = Property::new(name, datetime.format("%Y%m%dT%H%M%S").to_string());
            prop.add_parameter("TZID", tzid);
            prop
        }
    }
}
