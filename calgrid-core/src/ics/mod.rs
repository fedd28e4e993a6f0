//! iCalendar codec boundary.
//!
//! Parsing is delegated to the `icalendar` crate; this module only maps
//! between its structured components and [`Event`](crate::event::Event).

mod generate;
mod parse;

pub use generate::component_from_event;
pub use parse::event_from_component;
