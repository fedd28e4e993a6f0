//! Recurrence rules and occurrence enumeration.
//!
//! Evaluation is delegated to the `rrule` crate: the rule set is rendered to
//! its iCalendar text form (DTSTART/RRULE/RDATE/EXDATE) and parsed into an
//! [`RRuleSet`]. That derived set is rebuilt whenever the rules or date lists
//! change, and each window query runs against a fresh clone of it, so
//! enumeration is restartable and never holds a cursor.

use std::fmt;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rrule::RRuleSet;
use tracing::warn;

use crate::error::{CalError, CalResult};
use crate::event::EventTime;

/// Hard cap on occurrences returned by a single window query.
const EXPANSION_LIMIT: u16 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frequency {
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Yearly,
}

impl Frequency {
    fn as_ical(self) -> &'static str {
        match self {
            Frequency::Hourly => "HOURLY",
            Frequency::Daily => "DAILY",
            Frequency::Weekly => "WEEKLY",
            Frequency::Monthly => "MONTHLY",
            Frequency::Yearly => "YEARLY",
        }
    }

    fn parse(s: &str) -> Option<Frequency> {
        match s.to_ascii_uppercase().as_str() {
            "HOURLY" => Some(Frequency::Hourly),
            "DAILY" => Some(Frequency::Daily),
            "WEEKLY" => Some(Frequency::Weekly),
            "MONTHLY" => Some(Frequency::Monthly),
            "YEARLY" => Some(Frequency::Yearly),
            _ => None,
        }
    }
}

/// How a repeating rule terminates. At most one terminator is ever active;
/// setting one replaces the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleEnd {
    Never,
    /// Absolute cutoff, held in UTC so comparisons are independent of the
    /// anchor's own zone representation.
    Until(DateTime<Utc>),
    Count(u32),
}

/// One recurrence rule: frequency, interval and terminator, plus any
/// auxiliary RRULE parts (BYDAY and friends) carried through verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleSpec {
    pub freq: Frequency,
    pub interval: u32,
    pub end: RuleEnd,
    pub extra: Vec<(String, String)>,
}

impl RuleSpec {
    pub fn new(freq: Frequency) -> Self {
        RuleSpec {
            freq,
            interval: 1,
            end: RuleEnd::Never,
            extra: Vec::new(),
        }
    }

    pub fn every(freq: Frequency, interval: u32) -> Self {
        RuleSpec {
            interval,
            ..Self::new(freq)
        }
    }

    pub fn until(mut self, cutoff: DateTime<Utc>) -> Self {
        self.end = RuleEnd::Until(cutoff);
        self
    }

    pub fn count(mut self, times: u32) -> Self {
        self.end = RuleEnd::Count(times);
        self
    }

    /// Parse an RRULE property value like `FREQ=WEEKLY;INTERVAL=2;COUNT=5`.
    pub fn parse(value: &str) -> CalResult<RuleSpec> {
        let mut freq = None;
        let mut interval = 1u32;
        let mut end = RuleEnd::Never;
        let mut extra = Vec::new();

        for part in value.split(';').filter(|p| !p.is_empty()) {
            let (key, val) = part
                .split_once('=')
                .ok_or_else(|| CalError::Recurrence(format!("malformed rule part '{part}'")))?;
            match key.to_ascii_uppercase().as_str() {
                "FREQ" => {
                    freq = Some(Frequency::parse(val).ok_or_else(|| {
                        CalError::Recurrence(format!("unsupported frequency '{val}'"))
                    })?);
                }
                "INTERVAL" => {
                    interval = val
                        .parse()
                        .map_err(|_| CalError::Recurrence(format!("invalid interval '{val}'")))?;
                    if interval == 0 {
                        return Err(CalError::Recurrence("interval must be positive".into()));
                    }
                }
                "UNTIL" => end = RuleEnd::Until(parse_until(val)?),
                "COUNT" => {
                    end = RuleEnd::Count(
                        val.parse()
                            .map_err(|_| CalError::Recurrence(format!("invalid count '{val}'")))?,
                    );
                }
                _ => extra.push((key.to_ascii_uppercase(), val.to_string())),
            }
        }

        let freq = freq.ok_or_else(|| CalError::Recurrence("rule without FREQ".into()))?;
        Ok(RuleSpec {
            freq,
            interval,
            end,
            extra,
        })
    }
}

/// Renders as the RRULE wire value. UNTIL is always emitted in its absolute
/// UTC (`Z`) form regardless of the anchor's zone.
impl fmt::Display for RuleSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FREQ={};INTERVAL={}", self.freq.as_ical(), self.interval)?;
        match &self.end {
            RuleEnd::Never => {}
            RuleEnd::Until(cutoff) => write!(f, ";UNTIL={}", cutoff.format("%Y%m%dT%H%M%SZ"))?,
            RuleEnd::Count(times) => write!(f, ";COUNT={times}")?,
        }
        for (key, val) in &self.extra {
            write!(f, ";{key}={val}")?;
        }
        Ok(())
    }
}

fn parse_until(val: &str) -> CalResult<DateTime<Utc>> {
    let naive = val.strip_suffix('Z').unwrap_or(val);
    if let Ok(dt) = NaiveDateTime::parse_from_str(naive, "%Y%m%dT%H%M%S") {
        return Ok(dt.and_utc());
    }
    if let Ok(d) = NaiveDate::parse_from_str(naive, "%Y%m%d") {
        return Ok(d.and_time(NaiveTime::MIN).and_utc());
    }
    Err(CalError::Recurrence(format!("invalid UNTIL '{val}'")))
}

/// An event's full recurrence specification: base rules plus explicit
/// inclusion and exclusion instants, anchored at the event's start.
///
/// Values are immutable; the `with_*` constructors return updated copies.
#[derive(Debug, Clone)]
pub struct Recurrence {
    anchor: EventTime,
    rules: Vec<RuleSpec>,
    inc_dates: Vec<EventTime>,
    ex_dates: Vec<EventTime>,
    set: RRuleSet,
}

impl Recurrence {
    pub fn new(
        anchor: EventTime,
        rules: Vec<RuleSpec>,
        inc_dates: Vec<EventTime>,
        ex_dates: Vec<EventTime>,
    ) -> CalResult<Self> {
        let set = build_ruleset(&anchor, &rules, &inc_dates, &ex_dates)?;
        Ok(Recurrence {
            anchor,
            rules,
            inc_dates,
            ex_dates,
            set,
        })
    }

    /// A rule set whose only occurrence is the anchor itself.
    pub fn single(anchor: EventTime) -> CalResult<Self> {
        Self::new(anchor, Vec::new(), Vec::new(), Vec::new())
    }

    pub fn anchor(&self) -> &EventTime {
        &self.anchor
    }

    pub fn rules(&self) -> &[RuleSpec] {
        &self.rules
    }

    pub fn inc_dates(&self) -> &[EventTime] {
        &self.inc_dates
    }

    pub fn ex_dates(&self) -> &[EventTime] {
        &self.ex_dates
    }

    /// Replace the whole rule list with a single rule.
    pub fn with_rule(&self, rule: RuleSpec) -> CalResult<Self> {
        if self.rules.len() > 1 {
            warn!(
                discarded = self.rules.len(),
                "replacing multiple recurrence rules with a single one"
            );
        }
        Self::new(
            self.anchor.clone(),
            vec![rule],
            self.inc_dates.clone(),
            self.ex_dates.clone(),
        )
    }

    pub fn with_inclusion(&self, instant: EventTime) -> CalResult<Self> {
        let mut inc_dates = self.inc_dates.clone();
        inc_dates.push(instant);
        Self::new(
            self.anchor.clone(),
            self.rules.clone(),
            inc_dates,
            self.ex_dates.clone(),
        )
    }

    pub fn with_exclusion(&self, instant: EventTime) -> CalResult<Self> {
        let mut ex_dates = self.ex_dates.clone();
        ex_dates.push(instant);
        Self::new(
            self.anchor.clone(),
            self.rules.clone(),
            self.inc_dates.clone(),
            ex_dates,
        )
    }

    /// Occurrence start times in `[start, end)`, sorted and deduplicated.
    /// Exclusion dates win over both generated and included occurrences.
    pub fn occurrences_between(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<DateTime<Utc>> {
        // The crate's after/before bounds are exclusive; widen to the left
        // and apply the exact half-open window ourselves.
        let after = (start - Duration::seconds(1)).with_timezone(&rrule::Tz::UTC);
        let before = end.with_timezone(&rrule::Tz::UTC);

        let result = self
            .set
            .clone()
            .after(after)
            .before(before)
            .all(EXPANSION_LIMIT);
        if result.limited {
            warn!(limit = EXPANSION_LIMIT, "occurrence expansion truncated");
        }

        let mut dates: Vec<DateTime<Utc>> = result
            .dates
            .into_iter()
            .map(|dt| dt.with_timezone(&Utc))
            .filter(|t| *t >= start && *t < end)
            .collect();
        dates.sort_unstable();
        dates.dedup();
        dates
    }
}

fn dt_line(key: &str, time: &EventTime) -> String {
    match time {
        EventTime::Date(d) => format!("{key}:{}T000000Z", d.format("%Y%m%d")),
        EventTime::Utc(dt) => format!("{key}:{}", dt.format("%Y%m%dT%H%M%SZ")),
        EventTime::Floating(dt) => format!("{key}:{}Z", dt.format("%Y%m%dT%H%M%S")),
        EventTime::Zoned { datetime, tzid } => {
            format!("{key};TZID={tzid}:{}", datetime.format("%Y%m%dT%H%M%S"))
        }
    }
}

fn build_ruleset(
    anchor: &EventTime,
    rules: &[RuleSpec],
    inc_dates: &[EventTime],
    ex_dates: &[EventTime],
) -> CalResult<RRuleSet> {
    let mut lines = vec![dt_line("DTSTART", anchor)];
    for rule in rules {
        lines.push(format!("RRULE:{rule}"));
    }
    for instant in inc_dates {
        lines.push(dt_line("RDATE", instant));
    }
    if rules.is_empty() && inc_dates.is_empty() {
        // a non-repeating event still has exactly one occurrence: its anchor
        lines.push(dt_line("RDATE", anchor));
    }
    for instant in ex_dates {
        lines.push(dt_line("EXDATE", instant));
    }

    lines
        .join("\n")
        .parse()
        .map_err(|e: rrule::RRuleError| CalError::Recurrence(e.to_string()))
}
