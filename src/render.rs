//! Colored terminal rendering for icsync-core types.

use icsync_core::state::{RunStatus, SyncRunRecord};
use icsync_core::sync::{ActionKind, EventError, RunResult, SyncAction};
use owo_colors::OwoColorize;

use crate::utils::tui::pluralize;

pub trait Render {
    fn render(&self) -> String;
}

fn symbol(kind: ActionKind) -> &'static str {
    match kind {
        ActionKind::Create => "+",
        ActionKind::Update => "~",
        ActionKind::Delete => "-",
        ActionKind::Unchanged => "=",
    }
}

fn colorize(kind: ActionKind, text: &str) -> String {
    match kind {
        ActionKind::Create => text.green().to_string(),
        ActionKind::Update => text.yellow().to_string(),
        ActionKind::Delete => text.red().to_string(),
        ActionKind::Unchanged => text.dimmed().to_string(),
    }
}

impl Render for SyncAction {
    fn render(&self) -> String {
        let title = self.summary.as_deref().unwrap_or(&self.uid);
        let line = format!("{} {}", symbol(self.kind), title);
        match self.reason {
            Some(reason) => format!("{} {}", colorize(self.kind, &line), format!("({reason})").dimmed()),
            None => colorize(self.kind, &line),
        }
    }
}

impl Render for EventError {
    fn render(&self) -> String {
        format!("{} {}", "!".red(), self.to_string().red())
    }
}

impl Render for RunStatus {
    fn render(&self) -> String {
        match self {
            RunStatus::Success => self.as_str().green().to_string(),
            RunStatus::Partial => self.as_str().yellow().to_string(),
            RunStatus::Failed => self.as_str().red().to_string(),
        }
    }
}

impl Render for RunResult {
    fn render(&self) -> String {
        let counts = &self.counts;
        let mut parts = Vec::new();
        if counts.created > 0 {
            parts.push(format!("{} created", counts.created).green().to_string());
        }
        if counts.updated > 0 {
            parts.push(format!("{} updated", counts.updated).yellow().to_string());
        }
        if counts.deleted > 0 {
            parts.push(format!("{} deleted", counts.deleted).red().to_string());
        }
        if counts.unchanged > 0 {
            parts.push(format!("{} unchanged", counts.unchanged).dimmed().to_string());
        }

        let summary = if parts.is_empty() {
            "No events".dimmed().to_string()
        } else {
            parts.join(", ")
        };

        let prefix = if self.dry_run { "Would sync" } else { "Synced" };
        let mut line = format!("{prefix}: {summary}");
        if !self.errors.is_empty() {
            let failed = pluralize("error", self.errors.len() as u32);
            line.push_str(&format!(" ({})", failed.red()));
        }
        if self.skipped > 0 {
            let skipped = pluralize("malformed event", self.skipped as u32);
            line.push_str(&format!(" ({} skipped)", skipped).dimmed().to_string());
        }
        line
    }
}

impl Render for SyncRunRecord {
    fn render(&self) -> String {
        let when = self.started_at.format("%Y-%m-%d %H:%M:%S");
        let counts = &self.counts;
        let mut line = format!(
            "#{} {} {} +{} ~{} -{} ={}",
            self.id,
            when,
            self.status.render(),
            counts.created,
            counts.updated,
            counts.deleted,
            counts.unchanged,
        );
        if let Some(duration) = self.duration().and_then(|d| d.to_std().ok()) {
            let rounded = std::time::Duration::from_millis(duration.as_millis() as u64);
            line.push_str(&format!(" in {}", humantime::format_duration(rounded)).dimmed().to_string());
        }
        if let Some(error) = &self.error_message {
            line.push_str(&format!("\n      {}", error.red()));
        }
        line
    }
}
