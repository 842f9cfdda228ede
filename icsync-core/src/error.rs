//! Error types for icsync.

use std::path::PathBuf;

use thiserror::Error;

/// Failures while retrieving the feed.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Feed request timed out after {0}s")]
    Timeout(u64),

    #[error("Feed requires authentication (HTTP {0})")]
    AuthRequired(u16),

    #[error("Feed not found (HTTP 404)")]
    NotFound,

    #[error("Feed returned HTTP {0}")]
    BadStatus(u16),

    #[error("Invalid feed URL '{0}'")]
    InvalidUrl(String),

    #[error("Could not decode feed body: {0}")]
    Decode(String),
}

impl FetchError {
    /// Whether another attempt could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FetchError::Network(_) | FetchError::Timeout(_) | FetchError::BadStatus(500..=599)
        )
    }
}

/// The feed text is not a calendar at all. Fails the run.
#[derive(Error, Debug, PartialEq)]
pub enum FeedError {
    #[error("Feed is not an iCalendar document (no BEGIN:VCALENDAR)")]
    NotICalendar,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    #[error("missing UID")]
    MissingUid,

    #[error("missing DTSTART")]
    MissingStart,

    #[error("unparseable DTSTART '{0}'")]
    InvalidStart(String),

    #[error("DURATION '{0}' puts the end out of range")]
    EndOutOfRange(String),

    #[error("malformed content line '{0}'")]
    MalformedLine(String),

    #[error("END:VEVENT never reached")]
    UnterminatedEvent,
}

/// A single VEVENT that could not be turned into an event. Never fatal.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Skipped event {} at line {line}: {kind}", .uid.as_deref().unwrap_or("<unknown>"))]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub uid: Option<String>,
    pub line: usize,
}

/// Failures reported by a calendar store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Access to the calendar store was denied: {0}")]
    AccessDenied(String),

    #[error("No writable calendar named '{0}'")]
    NoWritableCalendar(String),

    #[error("Calendar '{0}' does not exist")]
    CalendarNotFound(String),

    #[error("Calendar entry '{0}' not found")]
    NotFound(String),

    #[error("Calendar entry '{0}' could not be read")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// Errors after which nothing else can be written, so the run must stop.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            StoreError::AccessDenied(_)
                | StoreError::NoWritableCalendar(_)
                | StoreError::CalendarNotFound(_)
        )
    }
}

/// Failures of the ledger database.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Could not prepare state directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ledger integrity check failed: {0}")]
    Integrity(String),

    #[error("Invalid timestamp '{0}' in ledger")]
    Timestamp(String),
}

/// Top-level errors of a sync run.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Feed(#[from] FeedError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error("Sync already in progress (lock held on {})", .0.display())]
    AlreadyRunning(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SyncResult<T> = Result<T, SyncError>;
pub type StoreResult<T> = Result<T, StoreError>;
pub type StateResult<T> = Result<T, StateError>;
