//! Persisted calendar store: one iCalendar file, events keyed by uid.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use icalendar::parser::{read_calendar, unfold};
use tracing::{debug, error, warn};

use crate::error::{CalError, CalResult};
use crate::event::{Event, EventTime};
use crate::ics;

/// One backing file's worth of events, plus every non-event component kept
/// verbatim for round-tripping.
///
/// All mutations are in-memory until [`write`](Calendar::write) is called;
/// a failed write leaves the loaded state untouched.
pub struct Calendar {
    path: PathBuf,
    events: BTreeMap<String, Event>,
    passthrough: Vec<String>,
}

impl Calendar {
    /// Load a calendar file, keying every VEVENT by uid. Records that fail
    /// construction are dropped with an error; a file that does not parse is
    /// an error for the whole source.
    pub fn load(path: impl Into<PathBuf>) -> CalResult<Self> {
        let path = path.into();
        let content = std::fs::read_to_string(&path)?;
        Self::from_ics(path, &content)
    }

    pub(crate) fn from_ics(path: PathBuf, content: &str) -> CalResult<Self> {
        let unfolded = unfold(content);
        let parsed = read_calendar(&unfolded).map_err(|e| CalError::Parse(e.to_string()))?;

        let mut events = BTreeMap::new();
        for component in &parsed.components {
            if component.name != "VEVENT" {
                continue;
            }
            match ics::event_from_component(component) {
                Ok(event) => {
                    if let Some(prev) = events.insert(event.uid.clone(), event) {
                        warn!(uid = %prev.uid, "duplicate uid in calendar file; keeping the last record");
                    }
                }
                Err(err) => {
                    error!(path = %path.display(), %err, "dropping unreadable event record");
                }
            }
        }

        let passthrough = passthrough_blocks(content);
        debug!(
            path = %path.display(),
            events = events.len(),
            other = passthrough.len(),
            "calendar loaded"
        );
        Ok(Calendar {
            path,
            events,
            passthrough,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, uid: &str) -> Option<&Event> {
        self.events.get(uid)
    }

    pub fn contains(&self, uid: &str) -> bool {
        self.events.contains_key(uid)
    }

    pub fn events(&self) -> impl Iterator<Item = &Event> {
        self.events.values()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Insert a new event. Fails if the uid is already present; use
    /// [`replace`](Calendar::replace) to update an existing entry.
    pub fn add(&mut self, event: Event) -> CalResult<()> {
        if self.events.contains_key(&event.uid) {
            return Err(CalError::DuplicateUid(event.uid));
        }
        self.events.insert(event.uid.clone(), event);
        Ok(())
    }

    /// Store an event unconditionally, overwriting any prior state.
    pub fn replace(&mut self, event: Event) {
        self.events.insert(event.uid.clone(), event);
    }

    /// Remove an event. An unknown uid is a consistency error: nothing is
    /// changed and the caller is expected to surface it.
    pub fn delete(&mut self, uid: &str) -> CalResult<Event> {
        self.events
            .remove(uid)
            .ok_or_else(|| CalError::UnknownUid(uid.to_string()))
    }

    /// Route an occurrence-level exclusion back to its template: append the
    /// instant to the template's exclusion dates and refresh its mod stamp.
    pub fn exclude_occurrence(&mut self, uid: &str, instant: EventTime) -> CalResult<()> {
        let template = self
            .events
            .get(uid)
            .ok_or_else(|| CalError::UnknownUid(uid.to_string()))?;
        let updated = template.with_recurrence(template.recurrence.with_exclusion(instant)?);
        self.events.insert(uid.to_string(), updated);
        Ok(())
    }

    /// Serialize every event plus the untouched pass-through components and
    /// replace the file's contents. Never retried; in-memory state is
    /// unchanged on failure.
    pub fn write(&self) -> CalResult<()> {
        let content = self.to_ics();
        std::fs::write(&self.path, content)?;
        debug!(path = %self.path.display(), events = self.events.len(), "calendar written");
        Ok(())
    }

    pub(crate) fn to_ics(&self) -> String {
        let mut cal = icalendar::Calendar::new();
        for event in self.events.values() {
            cal.push(ics::component_from_event(event));
        }
        let cal = cal.done();
        splice_passthrough(&cal.to_string(), &self.passthrough)
    }
}

/// Capture every non-VEVENT component inside VCALENDAR as its verbatim lines.
/// These components are opaque to us; they only have to survive a rewrite.
fn passthrough_blocks(content: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut block: Vec<&str> = Vec::new();
    let mut keep_depth = 0usize;
    let mut skip_depth = 0usize;

    for raw in content.lines() {
        let line = raw.trim_end_matches('\r');
        if keep_depth > 0 {
            block.push(line);
            if line.starts_with("BEGIN:") {
                keep_depth += 1;
            } else if line.starts_with("END:") {
                keep_depth -= 1;
                if keep_depth == 0 {
                    blocks.push(block.join("\r\n"));
                    block.clear();
                }
            }
        } else if skip_depth > 0 {
            if line.starts_with("BEGIN:") {
                skip_depth += 1;
            } else if line.starts_with("END:") {
                skip_depth -= 1;
            }
        } else if let Some(name) = line.strip_prefix("BEGIN:") {
            match name {
                "VCALENDAR" => {}
                "VEVENT" => skip_depth = 1,
                _ => {
                    keep_depth = 1;
                    block.push(line);
                }
            }
        }
    }
    blocks
}

/// Re-insert the pass-through components ahead of the generated events,
/// keeping their original relative order. Also claims the PRODID line.
fn splice_passthrough(generated: &str, blocks: &[String]) -> String {
    let mut out = String::with_capacity(generated.len() + blocks.iter().map(String::len).sum::<usize>());
    let mut inserted = blocks.is_empty();

    for line in generated.lines() {
        let line = line.trim_end_matches('\r');
        if line.starts_with("PRODID:") {
            out.push_str("PRODID:-//calgrid//EN\r\n");
            continue;
        }
        if !inserted && (line == "BEGIN:VEVENT" || line == "END:VCALENDAR") {
            for block in blocks {
                out.push_str(block);
                out.push_str("\r\n");
            }
            inserted = true;
        }
        out.push_str(line);
        out.push_str("\r\n");
    }
    out
}

/// The calendars visible to one session: at most one writable file plus any
/// number of read-only sources, merged with first-wins uid shadowing.
pub struct CalendarSet {
    calendars: Vec<Calendar>,
    writable: bool,
}

impl CalendarSet {
    /// Open the writable calendar (fatal when it cannot be loaded) followed
    /// by the read-only sources (skipped, with an error, when unreadable).
    pub fn open(writable: Option<PathBuf>, read_only: Vec<PathBuf>) -> CalResult<Self> {
        let mut calendars = Vec::new();
        let has_writable = writable.is_some();
        if let Some(path) = writable {
            calendars.push(Calendar::load(path)?);
        }
        for path in read_only {
            match Calendar::load(&path) {
                Ok(calendar) => calendars.push(calendar),
                Err(err) => error!(path = %path.display(), %err, "skipping unreadable calendar"),
            }
        }
        Ok(CalendarSet {
            calendars,
            writable: has_writable,
        })
    }

    pub fn calendars(&self) -> &[Calendar] {
        &self.calendars
    }

    /// Events from every source; an earlier calendar shadows later ones
    /// carrying the same uid.
    pub fn merged_events(&self) -> Vec<&Event> {
        let mut seen = HashSet::new();
        let mut merged = Vec::new();
        for calendar in &self.calendars {
            for event in calendar.events() {
                if seen.insert(event.uid.as_str()) {
                    merged.push(event);
                }
            }
        }
        merged
    }

    fn writable_calendar(&mut self) -> CalResult<&mut Calendar> {
        if !self.writable {
            return Err(CalError::NoWritable);
        }
        self.calendars.first_mut().ok_or(CalError::NoWritable)
    }

    pub fn add(&mut self, event: Event) -> CalResult<()> {
        self.writable_calendar()?.add(event)
    }

    pub fn replace(&mut self, event: Event) -> CalResult<()> {
        self.writable_calendar()?.replace(event);
        Ok(())
    }

    /// Delete from the writable calendar, warning when a read-only source
    /// still carries the same uid (the entry will stay visible).
    pub fn delete(&mut self, uid: &str) -> CalResult<Event> {
        let removed = self.writable_calendar()?.delete(uid)?;
        if self.calendars[1..].iter().any(|c| c.contains(uid)) {
            warn!(uid, "event is still visible from a read-only calendar");
        }
        Ok(removed)
    }

    pub fn exclude_occurrence(&mut self, uid: &str, instant: EventTime) -> CalResult<()> {
        self.writable_calendar()?.exclude_occurrence(uid, instant)
    }

    /// Persist the writable calendar. Failures are reported to the caller
    /// and never retried.
    pub fn save(&self) -> CalResult<()> {
        if !self.writable {
            return Err(CalError::NoWritable);
        }
        match self.calendars.first() {
            Some(calendar) => calendar.write(),
            None => Err(CalError::NoWritable),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    const SAMPLE: &str = "BEGIN:VCALENDAR\r\n\
VERSION:2.0\r\n\
PRODID:TEST\r\n\
BEGIN:VTIMEZONE\r\n\
TZID:Europe/Berlin\r\n\
BEGIN:STANDARD\r\n\
DTSTART:19961027T030000\r\n\
TZOFFSETFROM:+0200\r\n\
TZOFFSETTO:+0100\r\n\
END:STANDARD\r\n\
END:VTIMEZONE\r\n\
BEGIN:VEVENT\r\n\
UID:first\r\n\
DTSTAMP:20240101T000000Z\r\n\
DTSTART:20240320T150000Z\r\n\
DTEND:20240320T160000Z\r\n\
SUMMARY:First\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:second\r\n\
DTSTAMP:20240101T000000Z\r\n\
DTSTART;VALUE=DATE:20240321\r\n\
SUMMARY:Second\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";

    fn sample_calendar() -> Calendar {
        Calendar::from_ics(PathBuf::from("/tmp/sample.ics"), SAMPLE).unwrap()
    }

    fn sample_event(uid: &str) -> Event {
        let mut event = Event::new(
            EventTime::Utc(Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()),
            None,
            "Fresh",
            "",
            vec![],
        )
        .unwrap();
        event.uid = uid.to_string();
        event
    }

    #[test]
    fn test_load_keys_events_by_uid() {
        let calendar = sample_calendar();
        assert_eq!(calendar.len(), 2);
        assert!(calendar.contains("first"));
        assert_eq!(calendar.get("second").unwrap().summary, "Second");
    }

    #[test]
    fn test_unparseable_content_is_an_error() {
        assert!(Calendar::from_ics(PathBuf::from("/tmp/x.ics"), "BEGIN:VCALENDAR").is_err());
    }

    #[test]
    fn test_broken_record_is_dropped_but_load_continues() {
        let ics = "BEGIN:VCALENDAR\r\n\
BEGIN:VEVENT\r\n\
UID:no-start\r\n\
SUMMARY:Broken\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:ok\r\n\
DTSTART:20240320T150000Z\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n";
        let calendar = Calendar::from_ics(PathBuf::from("/tmp/x.ics"), ics).unwrap();
        assert_eq!(calendar.len(), 1);
        assert!(calendar.contains("ok"));
    }

    #[test]
    fn test_add_rejects_duplicate_uid() {
        let mut calendar = sample_calendar();
        let event = sample_event("first");
        assert!(matches!(
            calendar.add(event),
            Err(CalError::DuplicateUid(_))
        ));
    }

    #[test]
    fn test_add_after_delete_succeeds() {
        let mut calendar = sample_calendar();
        calendar.delete("first").unwrap();
        assert!(!calendar.contains("first"));
        calendar.add(sample_event("first")).unwrap();
        assert_eq!(calendar.get("first").unwrap().summary, "Fresh");
    }

    #[test]
    fn test_delete_unknown_uid_is_an_error() {
        let mut calendar = sample_calendar();
        assert!(matches!(
            calendar.delete("missing"),
            Err(CalError::UnknownUid(_))
        ));
        assert_eq!(calendar.len(), 2);
    }

    #[test]
    fn test_replace_is_visible_in_output() {
        let mut calendar = sample_calendar();
        let mut event = sample_event("first");
        event.summary = "Renamed".to_string();
        calendar.replace(event);
        assert!(calendar.to_ics().contains("SUMMARY:Renamed"));
    }

    #[test]
    fn test_passthrough_components_survive_a_rewrite() {
        let calendar = sample_calendar();
        let output = calendar.to_ics();
        assert!(output.contains("BEGIN:VTIMEZONE"));
        assert!(output.contains("TZID:Europe/Berlin"));
        assert!(output.contains("TZOFFSETFROM:+0200"));
        // the timezone block comes before the generated events
        assert!(output.find("BEGIN:VTIMEZONE").unwrap() < output.find("BEGIN:VEVENT").unwrap());
    }

    #[test]
    fn test_exclude_occurrence_updates_the_template() {
        let mut calendar = sample_calendar();
        let before = calendar.get("first").unwrap().mod_stamp;
        calendar
            .exclude_occurrence(
                "first",
                EventTime::Utc(Utc.with_ymd_and_hms(2024, 3, 20, 15, 0, 0).unwrap()),
            )
            .unwrap();
        let event = calendar.get("first").unwrap();
        assert_eq!(event.recurrence.ex_dates().len(), 1);
        assert!(event.mod_stamp >= before);

        let hits = event.recurrence.occurrences_between(
            Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap(),
        );
        assert!(hits.is_empty());
    }

    #[test]
    fn test_exclude_on_unknown_uid_is_an_error() {
        let mut calendar = sample_calendar();
        let result = calendar.exclude_occurrence(
            "missing",
            EventTime::Utc(Utc.with_ymd_and_hms(2024, 3, 20, 15, 0, 0).unwrap()),
        );
        assert!(matches!(result, Err(CalError::UnknownUid(_))));
    }

    #[test]
    fn test_write_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cal.ics");
        std::fs::write(&path, SAMPLE).unwrap();

        let mut calendar = Calendar::load(&path).unwrap();
        calendar.delete("second").unwrap();
        calendar.write().unwrap();

        let reloaded = Calendar::load(&path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.contains("first"));
        assert_eq!(reloaded.passthrough.len(), 1);
    }

    #[test]
    fn test_event_round_trip_preserves_semantics() {
        use crate::recurrence::{Frequency, Recurrence, RuleSpec};

        let start = EventTime::Utc(Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap());
        let mut event = Event::new(
            start.clone(),
            Some(EventTime::Utc(
                Utc.with_ymd_and_hms(2024, 1, 1, 11, 30, 0).unwrap(),
            )),
            "Weekly sync",
            "Notes in the wiki",
            vec!["work".to_string(), "sync".to_string()],
        )
        .unwrap();
        event.uid = "roundtrip".to_string();
        event = event.with_recurrence(
            Recurrence::new(
                start,
                vec![RuleSpec::every(Frequency::Weekly, 2)
                    .until(Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap())],
                vec![],
                vec![EventTime::Utc(
                    Utc.with_ymd_and_hms(2024, 1, 29, 10, 0, 0).unwrap(),
                )],
            )
            .unwrap(),
        );

        let mut calendar = Calendar::from_ics(PathBuf::from("/tmp/rt.ics"), SAMPLE).unwrap();
        calendar.replace(event.clone());
        let output = calendar.to_ics();

        let reloaded = Calendar::from_ics(PathBuf::from("/tmp/rt.ics"), &output).unwrap();
        let reparsed = reloaded.get("roundtrip").expect("event should survive");

        assert_eq!(reparsed.start, event.start);
        assert_eq!(reparsed.end, event.end);
        assert_eq!(reparsed.summary, event.summary);
        assert_eq!(reparsed.description, event.description);
        assert_eq!(reparsed.categories, event.categories);

        let window_start = Utc.with_ymd_and_hms(2023, 12, 1, 0, 0, 0).unwrap();
        let window_end = Utc.with_ymd_and_hms(2024, 12, 1, 0, 0, 0).unwrap();
        assert_eq!(
            reparsed
                .recurrence
                .occurrences_between(window_start, window_end),
            event
                .recurrence
                .occurrences_between(window_start, window_end)
        );
    }

    #[test]
    fn test_all_day_round_trip_keeps_date_form() {
        let calendar = sample_calendar();
        let output = calendar.to_ics();
        let reloaded = Calendar::from_ics(PathBuf::from("/tmp/rt2.ics"), &output).unwrap();
        let second = reloaded.get("second").unwrap();
        assert!(second.start.is_all_day());
        assert_eq!(
            second.end,
            EventTime::Date(chrono::NaiveDate::from_ymd_opt(2024, 3, 22).unwrap())
        );
    }

    #[test]
    fn test_calendar_set_shadows_by_uid() {
        let dir = tempfile::tempdir().unwrap();
        let writable = dir.path().join("writable.ics");
        let readonly = dir.path().join("readonly.ics");
        std::fs::write(&writable, SAMPLE).unwrap();
        std::fs::write(
            &readonly,
            "BEGIN:VCALENDAR\r\n\
BEGIN:VEVENT\r\n\
UID:first\r\n\
DTSTART:20240101T000000Z\r\n\
SUMMARY:Shadowed\r\n\
END:VEVENT\r\n\
BEGIN:VEVENT\r\n\
UID:third\r\n\
DTSTART:20240102T000000Z\r\n\
SUMMARY:Third\r\n\
END:VEVENT\r\n\
END:VCALENDAR\r\n",
        )
        .unwrap();

        let set = CalendarSet::open(Some(writable), vec![readonly]).unwrap();
        let merged = set.merged_events();
        assert_eq!(merged.len(), 3);
        let first = merged.iter().find(|e| e.uid == "first").unwrap();
        assert_eq!(first.summary, "First");
    }

    #[test]
    fn test_calendar_set_skips_unreadable_read_only_sources() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.ics");
        std::fs::write(&good, SAMPLE).unwrap();
        let missing = dir.path().join("missing.ics");

        let set = CalendarSet::open(None, vec![good, missing]).unwrap();
        assert_eq!(set.calendars().len(), 1);
    }

    #[test]
    fn test_calendar_set_fails_on_unreadable_writable() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.ics");
        assert!(CalendarSet::open(Some(missing), vec![]).is_err());
    }

    #[test]
    fn test_edits_without_a_writable_calendar_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("good.ics");
        std::fs::write(&good, SAMPLE).unwrap();

        let mut set = CalendarSet::open(None, vec![good]).unwrap();
        assert!(matches!(set.delete("first"), Err(CalError::NoWritable)));
        assert!(matches!(set.save(), Err(CalError::NoWritable)));
    }
}
