use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the ledger remembers about one synced feed event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncedEventRecord {
    pub source_uid: String,
    /// Stable id of the calendar entry last written for this uid
    pub store_item_id: String,
    pub store_local_id: Option<String>,
    pub content_hash: String,
    pub sequence: u32,
    pub last_modified: Option<DateTime<Utc>>,
    pub synced_at: DateTime<Utc>,
    /// The VEVENT block as it appeared in the feed
    pub raw_source_data: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Partial,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Success => "success",
            RunStatus::Partial => "partial",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "success" => Some(RunStatus::Success),
            "partial" => Some(RunStatus::Partial),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-run action counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounts {
    pub created: u32,
    pub updated: u32,
    pub deleted: u32,
    pub unchanged: u32,
}

impl RunCounts {
    pub fn total(&self) -> u32 {
        self.created + self.updated + self.deleted + self.unchanged
    }
}

/// One row of run history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRunRecord {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    /// None while the run is still in flight (or crashed)
    pub completed_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub counts: RunCounts,
    pub error_message: Option<String>,
}

impl SyncRunRecord {
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|done| done - self.started_at)
    }
}
