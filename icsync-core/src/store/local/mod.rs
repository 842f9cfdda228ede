//! Calendars as directories of `.ics` files.
//!
//! Layout: `<root>/<calendar slug>/<entry slug>.ics`, with the calendar's
//! display name in `<calendar slug>/.icsync/calendar.toml`. The file stem is
//! the entry's local id and changes when the entry is renamed or moved; the
//! UID inside the file is its stable id.

mod ics;

use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::date_range::DateRange;
use crate::error::{StoreError, StoreResult};
use crate::store::{CalendarRef, CalendarStore, EntryDraft, StoreEntry};

use ics::{generate_entry_ics, read_entry_ics};

const META_DIR: &str = ".icsync";
const META_FILE: &str = "calendar.toml";

/// Per-calendar settings stored next to the entries
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CalendarMeta {
    name: String,
    #[serde(default)]
    read_only: bool,
}

impl CalendarMeta {
    fn load(calendar_dir: &Path) -> Option<Self> {
        let content = std::fs::read_to_string(calendar_dir.join(META_DIR).join(META_FILE)).ok()?;
        toml::from_str(&content).ok()
    }

    fn save(&self, calendar_dir: &Path) -> StoreResult<()> {
        let dir = calendar_dir.join(META_DIR);
        std::fs::create_dir_all(&dir).map_err(|e| io_error(e, &dir))?;

        let content =
            toml::to_string_pretty(self).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let path = dir.join(META_FILE);
        std::fs::write(&path, content).map_err(|e| io_error(e, &path))?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct LocalCalendarStore {
    root: PathBuf,
}

impl LocalCalendarStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalCalendarStore { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn calendar_dir(&self, calendar: &CalendarRef) -> PathBuf {
        self.root.join(&calendar.id)
    }

    /// All calendar directories under the root.
    fn calendars(&self) -> StoreResult<Vec<(CalendarRef, Option<CalendarMeta>)>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(io_error(e, &self.root)),
        };

        let mut calendars: Vec<(CalendarRef, Option<CalendarMeta>)> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_dir())
            .filter_map(|path| {
                let id = path.file_name()?.to_str()?.to_string();
                if id.starts_with('.') {
                    return None;
                }
                let meta = CalendarMeta::load(&path);
                let name = meta.as_ref().map_or_else(|| id.clone(), |m| m.name.clone());
                Some((CalendarRef { id, name }, meta))
            })
            .collect();

        calendars.sort_by(|a, b| a.0.id.cmp(&b.0.id));
        Ok(calendars)
    }

    /// `.ics` files of one calendar, sorted by name.
    fn entry_files(&self, calendar: &CalendarRef) -> StoreResult<Vec<PathBuf>> {
        let dir = self.calendar_dir(calendar);
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(StoreError::CalendarNotFound(calendar.name.clone()));
            }
            Err(e) => return Err(io_error(e, &dir)),
        };

        let mut files: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.extension().is_some_and(|e| e == "ics"))
            .collect();
        files.sort();
        Ok(files)
    }

    fn read_file(&self, path: &Path, calendar: &CalendarRef) -> StoreResult<StoreEntry> {
        let local_id = file_stem(path)?;
        let content = std::fs::read_to_string(path).map_err(|e| io_error(e, path))?;
        read_entry_ics(&content, calendar, &local_id)
    }

    /// Every readable entry of `calendar`. Unreadable files are skipped.
    fn entries(&self, calendar: &CalendarRef) -> StoreResult<Vec<StoreEntry>> {
        let mut entries = Vec::new();
        for path in self.entry_files(calendar)? {
            match self.read_file(&path, calendar) {
                Ok(entry) => entries.push(entry),
                Err(StoreError::Corrupt(id)) => {
                    tracing::warn!(file = %path.display(), id, "Skipping unreadable calendar entry");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(entries)
    }

    /// Finds an entry anywhere in the store, returning its file path too.
    fn locate(&self, stable_id: &str) -> StoreResult<Option<(StoreEntry, PathBuf)>> {
        for (calendar, _) in self.calendars()? {
            for path in self.entry_files(&calendar)? {
                let Ok(entry) = self.read_file(&path, &calendar) else {
                    continue;
                };
                if entry.stable_id == stable_id {
                    return Ok(Some((entry, path)));
                }
            }
        }
        Ok(None)
    }

    fn write_entry(&self, entry: &StoreEntry, path: &Path) -> StoreResult<()> {
        let content = generate_entry_ics(entry);
        write_atomic(path, &content)
    }
}

impl CalendarStore for LocalCalendarStore {
    fn resolve_or_create_calendar(
        &self,
        name: &str,
        create_if_missing: bool,
    ) -> StoreResult<CalendarRef> {
        let slug = slug_or(name, "calendar");
        let existing = self
            .calendars()?
            .into_iter()
            .find(|(calendar, _)| calendar.name == name || calendar.id == slug);

        if let Some((calendar, meta)) = existing {
            let dir = self.calendar_dir(&calendar);
            let read_only = meta.is_some_and(|m| m.read_only)
                || std::fs::metadata(&dir)
                    .map(|m| m.permissions().readonly())
                    .unwrap_or(false);
            if read_only {
                return Err(StoreError::NoWritableCalendar(name.to_string()));
            }
            return Ok(CalendarRef {
                id: calendar.id,
                name: name.to_string(),
            });
        }

        if !create_if_missing {
            return Err(StoreError::CalendarNotFound(name.to_string()));
        }

        let dir = self.root.join(&slug);
        std::fs::create_dir_all(&dir).map_err(|e| io_error(e, &dir))?;
        CalendarMeta {
            name: name.to_string(),
            read_only: false,
        }
        .save(&dir)?;

        tracing::info!(calendar = name, path = %dir.display(), "Created calendar");

        Ok(CalendarRef {
            id: slug,
            name: name.to_string(),
        })
    }

    fn create(&self, draft: &EntryDraft, calendar: &CalendarRef) -> StoreResult<StoreEntry> {
        let dir = self.calendar_dir(calendar);
        if !dir.is_dir() {
            return Err(StoreError::CalendarNotFound(calendar.name.clone()));
        }

        let local_id = unique_slug(&dir, &base_slug_for(draft))?;
        let stable_id = uuid::Uuid::new_v4().to_string();
        let entry = draft
            .clone()
            .into_entry(stable_id, Some(local_id.clone()), calendar.clone());

        self.write_entry(&entry, &dir.join(format!("{local_id}.ics")))?;
        Ok(entry)
    }

    /// Rewrites the entry, renaming the file when the title or date moved.
    fn update(&self, stable_id: &str, draft: &EntryDraft) -> StoreResult<StoreEntry> {
        let (current, path) = self
            .locate(stable_id)?
            .ok_or_else(|| StoreError::NotFound(stable_id.to_string()))?;

        let dir = self.calendar_dir(&current.calendar);
        let base = base_slug_for(draft);
        let current_stem = file_stem(&path)?;

        let local_id = if slug_matches_base(&current_stem, &base) {
            current_stem
        } else {
            unique_slug(&dir, &base)?
        };

        let entry = draft
            .clone()
            .into_entry(current.stable_id, Some(local_id.clone()), current.calendar);

        let new_path = dir.join(format!("{local_id}.ics"));
        self.write_entry(&entry, &new_path)?;
        if new_path != path {
            std::fs::remove_file(&path).map_err(|e| io_error(e, &path))?;
        }

        Ok(entry)
    }

    fn delete(&self, stable_id: &str) -> StoreResult<()> {
        let (_, path) = self
            .locate(stable_id)?
            .ok_or_else(|| StoreError::NotFound(stable_id.to_string()))?;
        std::fs::remove_file(&path).map_err(|e| io_error(e, &path))
    }

    fn find_by_stable_id(&self, stable_id: &str) -> StoreResult<Option<StoreEntry>> {
        Ok(self.locate(stable_id)?.map(|(entry, _)| entry))
    }

    fn find_by_local_id(&self, local_id: &str) -> StoreResult<Option<StoreEntry>> {
        for (calendar, _) in self.calendars()? {
            let path = self.calendar_dir(&calendar).join(format!("{local_id}.ics"));
            if path.is_file() {
                return match self.read_file(&path, &calendar) {
                    Ok(entry) => Ok(Some(entry)),
                    Err(StoreError::Corrupt(_)) => Ok(None),
                    Err(e) => Err(e),
                };
            }
        }
        Ok(None)
    }

    fn find_by_marker(&self, uid: &str, calendar: &CalendarRef) -> StoreResult<Option<StoreEntry>> {
        Ok(self
            .entries(calendar)?
            .into_iter()
            .find(|entry| entry.has_marker_for(uid)))
    }

    fn search(&self, calendar: &CalendarRef, range: &DateRange) -> StoreResult<Vec<StoreEntry>> {
        Ok(self
            .entries(calendar)?
            .into_iter()
            .filter(|entry| range.overlaps(entry.start, entry.end))
            .collect())
    }
}

/// Generate the base slug for an entry.
/// Timed entries: `YYYY-MM-DDTHHMM__slug`
/// All-day entries: `YYYY-MM-DD__slug`
/// Recurring entries: `_recurring__slug`
fn base_slug_for(draft: &EntryDraft) -> String {
    let slug = slug_or(&draft.title, "event");

    if draft.recurrence.is_some() {
        return format!("_recurring__{slug}");
    }

    let date = if draft.is_all_day {
        draft.start.format("%Y-%m-%d").to_string()
    } else {
        draft.start.format("%Y-%m-%dT%H%M").to_string()
    };

    format!("{date}__{slug}")
}

fn slug_or(text: &str, fallback: &str) -> String {
    let slug: String = slug::slugify(text).chars().take(50).collect();
    let slug = slug.trim_end_matches('-').to_string();
    if slug.is_empty() {
        fallback.to_string()
    } else {
        slug
    }
}

/// `stem` is `base` or `base-N`.
fn slug_matches_base(stem: &str, base: &str) -> bool {
    match stem.strip_prefix(base) {
        Some("") => true,
        Some(rest) => rest
            .strip_prefix('-')
            .is_some_and(|n| !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit())),
        None => false,
    }
}

/// Generate a unique slug that doesn't conflict with existing files.
/// If the base slug exists, tries slug-2, slug-3, etc.
fn unique_slug(dir: &Path, base: &str) -> StoreResult<String> {
    if !dir.join(format!("{base}.ics")).exists() {
        return Ok(base.to_string());
    }

    for n in 2..=1000 {
        let suffixed = format!("{base}-{n}");
        if !dir.join(format!("{suffixed}.ics")).exists() {
            return Ok(suffixed);
        }
    }

    Err(StoreError::Io(io::Error::other(format!(
        "Too many entry name collisions for '{base}'"
    ))))
}

fn file_stem(path: &Path) -> StoreResult<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| StoreError::Corrupt(path.display().to_string()))
}

/// Write to a temp file in the same directory, then rename over the target.
fn write_atomic(path: &Path, content: &str) -> StoreResult<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StoreError::Corrupt(path.display().to_string()))?;
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    std::fs::write(&tmp, content).map_err(|e| io_error(e, &tmp))?;
    std::fs::rename(&tmp, path).map_err(|e| io_error(e, path))?;
    Ok(())
}

fn io_error(error: io::Error, path: &Path) -> StoreError {
    if error.kind() == io::ErrorKind::PermissionDenied {
        StoreError::AccessDenied(path.display().to_string())
    } else {
        StoreError::Io(error)
    }
}
