//! Sync configuration.
//!
//! Read from `~/.config/icsync/config.toml`, with `ICSYNC_*` environment
//! variables taking precedence over the file.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use crate::date_range::DateRange;
use crate::error::{SyncError, SyncResult};
use crate::ics::values::resolve_timezone;

static DEFAULT_CALENDAR_DIR: &str = "~/calendar";

fn default_calendar_dir() -> PathBuf {
    PathBuf::from(DEFAULT_CALENDAR_DIR)
}

/// Upper bound for either window side, roughly 270 years.
const MAX_WINDOW_DAYS: u32 = 100_000;

fn default_true() -> bool {
    true
}

fn default_fetch_timeout_secs() -> u64 {
    30
}

fn default_fetch_retries() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    500
}

/// How to authenticate against the feed server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FeedAuth {
    Bearer {
        token: String,
    },
    Basic {
        username: String,
        password: String,
    },
    /// Token read from an environment variable at fetch time
    Env {
        variable: String,
        #[serde(default)]
        scheme: AuthScheme,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    #[default]
    Bearer,
    /// Token is sent as the raw Authorization header value
    Raw,
}

/// Settings for one feed → calendar pairing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    pub source_url: String,
    pub calendar_name: String,

    #[serde(default = "default_true")]
    pub create_calendar_if_missing: bool,

    #[serde(default = "default_true")]
    pub delete_orphans: bool,

    /// Treat ledger rows that fell out of the window as orphans too
    #[serde(default)]
    pub prune_out_of_window: bool,

    pub window_days_past: Option<u32>,
    pub window_days_future: Option<u32>,

    #[serde(default = "default_true")]
    pub sync_alarms: bool,

    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,

    #[serde(default = "default_fetch_retries")]
    pub fetch_retries: u32,

    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Zone for floating times, UTC when unset
    pub default_timezone: Option<String>,

    pub auth: Option<FeedAuth>,

    /// Ledger database; defaults to the data directory
    pub state_path: Option<PathBuf>,

    #[serde(default = "default_calendar_dir")]
    pub calendar_dir: PathBuf,
}

impl SyncConfig {
    /// A config with every optional setting at its default.
    pub fn new(source_url: impl Into<String>, calendar_name: impl Into<String>) -> Self {
        SyncConfig {
            source_url: source_url.into(),
            calendar_name: calendar_name.into(),
            create_calendar_if_missing: true,
            delete_orphans: true,
            prune_out_of_window: false,
            window_days_past: None,
            window_days_future: None,
            sync_alarms: true,
            fetch_timeout_secs: default_fetch_timeout_secs(),
            fetch_retries: default_fetch_retries(),
            retry_backoff_ms: default_retry_backoff_ms(),
            default_timezone: None,
            auth: None,
            state_path: None,
            calendar_dir: default_calendar_dir(),
        }
    }

    pub fn config_path() -> SyncResult<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| SyncError::Config("Could not determine config directory".into()))?
            .join("icsync");

        Ok(config_dir.join("config.toml"))
    }

    /// Load from `path`, applying `ICSYNC_*` environment overrides, and validate.
    pub fn load(path: &Path) -> SyncResult<Self> {
        if !path.exists() {
            return Err(SyncError::Config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }

        let config: SyncConfig = Config::builder()
            .add_source(File::from(path).required(true))
            .add_source(Environment::with_prefix("ICSYNC").try_parsing(true))
            .build()
            .map_err(|e| SyncError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| SyncError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    /// Parse TOML text without consulting the environment.
    pub fn from_toml_str(text: &str) -> SyncResult<Self> {
        let config: SyncConfig = Config::builder()
            .add_source(File::from_str(text, FileFormat::Toml))
            .build()
            .map_err(|e| SyncError::Config(e.to_string()))?
            .try_deserialize()
            .map_err(|e| SyncError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> SyncResult<()> {
        let url = self.source_url.trim();
        if url.is_empty() {
            return Err(SyncError::Config("source_url must not be empty".into()));
        }

        let scheme = url.split_once("://").map(|(s, _)| s.to_ascii_lowercase());
        if !matches!(scheme.as_deref(), Some("http" | "https" | "webcal")) {
            return Err(SyncError::Config(format!(
                "source_url must use http, https or webcal: '{url}'"
            )));
        }

        if self.calendar_name.trim().is_empty() {
            return Err(SyncError::Config("calendar_name must not be empty".into()));
        }

        for (key, days) in [
            ("window_days_past", self.window_days_past),
            ("window_days_future", self.window_days_future),
        ] {
            if days.is_some_and(|d| d > MAX_WINDOW_DAYS) {
                return Err(SyncError::Config(format!(
                    "{key} must be at most {MAX_WINDOW_DAYS}"
                )));
            }
        }

        self.timezone()?;

        Ok(())
    }

    /// The zone used for floating times.
    pub fn timezone(&self) -> SyncResult<Tz> {
        match self.default_timezone.as_deref() {
            None => Ok(Tz::UTC),
            Some(name) => resolve_timezone(name).ok_or_else(|| {
                SyncError::Config(format!("Unknown default_timezone '{name}'"))
            }),
        }
    }

    /// The sync window around `now`.
    pub fn window(&self, now: DateTime<Utc>) -> DateRange {
        DateRange::window(now, self.window_days_past, self.window_days_future)
    }

    pub fn calendar_path(&self) -> PathBuf {
        expand(&self.calendar_dir)
    }

    /// The ledger location: `state_path` if set, otherwise
    /// `<data dir>/icsync/<calendar slug>.db`.
    pub fn ledger_path(&self) -> SyncResult<PathBuf> {
        if let Some(path) = &self.state_path {
            return Ok(expand(path));
        }

        let data_dir = dirs::data_dir()
            .ok_or_else(|| SyncError::Config("Could not determine data directory".into()))?;

        Ok(data_dir
            .join("icsync")
            .join(format!("{}.db", slug::slugify(&self.calendar_name))))
    }

    /// Create a template config file with the required keys left blank.
    pub fn create_template(path: &Path) -> SyncResult<()> {
        let contents = format!(
            "\
# icsync configuration

# The feed to mirror (http, https or webcal):
source_url = \"\"

# Calendar that receives the events:
calendar_name = \"\"

# Where calendars live:
# calendar_dir = \"{DEFAULT_CALENDAR_DIR}\"

# Only sync events near today:
# window_days_past = 30
# window_days_future = 365

# Remove calendar entries whose events left the feed:
# delete_orphans = true

# Zone for times without one:
# default_timezone = \"Europe/Berlin\"

# [auth]
# type = \"bearer\"
# token = \"...\"
"
        );

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                SyncError::Config(format!("Could not create config directory: {e}"))
            })?;
        }

        std::fs::write(path, contents)
            .map_err(|e| SyncError::Config(format!("Could not write config file: {e}")))?;

        Ok(())
    }
}

fn expand(path: &Path) -> PathBuf {
    PathBuf::from(shellexpand::tilde(&path.to_string_lossy()).into_owned())
}
