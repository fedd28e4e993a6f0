//! Core library for calgrid, an iCalendar viewer/editor.
//!
//! This crate owns everything between the raw calendar file and the display
//! layer: the event model, recurrence expansion, windowed occurrence
//! filtering and the per-file event store. Rendering, widgets and entrypoint
//! wiring live in the host binary.

pub mod calendar;
pub mod config;
pub mod error;
pub mod event;
pub mod filter;
pub mod ics;
pub mod recurrence;

pub use calendar::{Calendar, CalendarSet};
pub use config::Config;
pub use error::{CalError, CalResult};
pub use event::{Event, EventTime, Occurrence};
pub use filter::expand_events;
pub use recurrence::{Frequency, Recurrence, RuleEnd, RuleSpec};
