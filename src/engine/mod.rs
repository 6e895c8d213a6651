//! Template filling over zip-packaged office documents.
//!
//! Everything here is a pure function over owned buffers: the input container
//! is never modified and the same input always yields the same bytes.

pub mod calendar;
pub mod dialect;
pub mod package;
pub mod placeholder;
pub mod rows;
pub mod schedule;
mod sheet;
pub mod substitute;
pub mod xml;

pub use placeholder::{PlaceholderMap, Token, UnresolvedTokens};
pub use rows::{expand_rows, expand_rows_with, fill_rows, RowSpec};
pub use schedule::{build_schedule, build_schedule_with, service_code, ScheduleEntry, ScheduleLayout};
pub use substitute::{extract_text, substitute, substitute_with};
