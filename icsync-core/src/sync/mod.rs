//! The delta-sync pass: fetch, parse, reconcile against the ledger, apply.

mod engine;
pub mod plan;
mod result;

pub use engine::{META_FEED_URL, META_LAST_RUN_STATUS, META_LAST_SYNC_AT, SyncEngine, dedup_by_uid};
pub use plan::{ActionKind, Plan, UpdateReason};
pub use result::{EventError, RunResult, SyncAction, SyncOptions};
