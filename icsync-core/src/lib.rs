//! Delta sync from a remote iCalendar feed into a calendar store.
//!
//! - `ics` parses feed text into `CalendarEvent`s
//! - `fingerprint` decides whether an event really changed
//! - `resolve` finds the calendar entry written for an event, even after its identifiers moved
//! - `state` keeps the ledger and run history in SQLite
//! - `sync` ties it together into one run

pub mod config;
pub mod date_range;
pub mod error;
pub mod event;
pub mod fetch;
pub mod fingerprint;
pub mod ics;
pub mod marker;
pub mod recurrence;
pub mod resolve;
pub mod state;
pub mod store;
pub mod sync;

pub use config::SyncConfig;
pub use error::{SyncError, SyncResult};
pub use event::CalendarEvent;
pub use sync::{RunResult, SyncEngine, SyncOptions};
