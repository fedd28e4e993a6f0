//! Agenda listing for the configured window.

use anyhow::{bail, Result};
use calgrid_core::{expand_events, CalendarSet, Config, EventTime, Occurrence};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};

/// Print every occurrence in the window around `anchor`, grouped by day.
/// Occurrences sort by start, with later-ending (longer) entries first at
/// the same start so spanning events lead their day.
pub fn print_window(set: &CalendarSet, config: &Config, anchor: NaiveDate) -> Result<()> {
    let window_start = (anchor - Duration::days(config.window.past_days))
        .and_time(NaiveTime::MIN)
        .and_utc();
    let window_end = (anchor + Duration::days(config.window.future_days + 1))
        .and_time(NaiveTime::MIN)
        .and_utc();

    let merged = set.merged_events();
    let mut occurrences: Vec<Occurrence> =
        expand_events(merged, window_start, window_end).collect();
    occurrences.sort_by(|a, b| {
        a.start
            .to_utc()
            .cmp(&b.start.to_utc())
            .then(b.end.to_utc().cmp(&a.end.to_utc()))
    });

    if occurrences.is_empty() {
        println!(
            "No events between {} and {}",
            window_start.date_naive(),
            window_end.date_naive()
        );
        return Ok(());
    }

    let mut current_day: Option<NaiveDate> = None;
    for occurrence in &occurrences {
        let day = occurrence.start.to_utc().date_naive();
        if current_day != Some(day) {
            if current_day.is_some() {
                println!();
            }
            println!("{}", day.format("%A %Y-%m-%d"));
            current_day = Some(day);
        }

        let time = if occurrence.is_all_day() {
            "all day".to_string()
        } else {
            occurrence
                .start
                .to_utc()
                .format(&config.time_format)
                .to_string()
        };
        let tags = if occurrence.categories.is_empty() {
            String::new()
        } else {
            format!("  [{}]", occurrence.categories.join(", "))
        };
        println!("  {:>8}  {}{}", time, occurrence.summary, tags);
    }
    Ok(())
}

/// Parse a user-supplied occurrence start: a date, a naive date-time, or an
/// absolute instant with a `Z` suffix.
pub fn parse_event_time(s: &str) -> Result<EventTime> {
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return Ok(EventTime::Date(date));
    }
    for format in ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"] {
        if let Some(naive) = s.strip_suffix('Z') {
            if let Ok(dt) = NaiveDateTime::parse_from_str(naive, format) {
                return Ok(EventTime::Utc(dt.and_utc()));
            }
        }
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(EventTime::Floating(dt));
        }
    }
    bail!("invalid date/time '{s}'; expected YYYY-MM-DD or YYYY-MM-DDTHH:MM[:SS][Z]")
}
