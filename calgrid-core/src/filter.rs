//! Windowed expansion of event collections into concrete occurrences.

use chrono::{DateTime, Utc};

use crate::event::{Event, Occurrence};

/// Expand `events` into every occurrence whose displayed interval intersects
/// `[window_start, window_end)`.
///
/// Lazy across events and freely restartable: each call evaluates the window
/// from scratch, so the same collection can be queried repeatedly with
/// different windows. Events without zone information are evaluated in the
/// zone-stripped frame (their wall-clock values compare directly against the
/// window's), zone-aware events as absolute instants.
///
/// Output order is unspecified; callers sort for display.
pub fn expand_events<'a, I>(
    events: I,
    window_start: DateTime<Utc>,
    window_end: DateTime<Utc>,
) -> impl Iterator<Item = Occurrence> + 'a
where
    I: IntoIterator<Item = &'a Event>,
    I::IntoIter: 'a,
{
    events
        .into_iter()
        .flat_map(move |event| event.occurrences_within(window_start, window_end))
}
