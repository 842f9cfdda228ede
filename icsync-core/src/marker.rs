//! The `[SYNC-UID:<uid>]` marker embedded in entry notes.
//!
//! Store identifiers can change behind our back; the marker lets a synced
//! entry be found again by scanning its notes.

const PREFIX: &str = "[SYNC-UID:";
const SUFFIX: char = ']';
const ESCAPE: char = '\\';

/// The marker text for `uid`. `]` and `\` in the uid are backslash-escaped.
pub fn marker_for(uid: &str) -> String {
    let mut marker = String::with_capacity(PREFIX.len() + uid.len() + 1);
    marker.push_str(PREFIX);
    for c in uid.chars() {
        if c == SUFFIX || c == ESCAPE {
            marker.push(ESCAPE);
        }
        marker.push(c);
    }
    marker.push(SUFFIX);
    marker
}

/// The uid of the first marker in `notes`, if any.
pub fn extract(notes: &str) -> Option<String> {
    markers(notes).next().map(|found| found.uid)
}

/// Whether `notes` carries a marker for exactly `uid`.
pub fn has_marker(notes: Option<&str>, uid: &str) -> bool {
    notes.is_some_and(|n| markers(n).any(|found| found.uid == uid))
}

/// Whether `notes` carries a marker for some other uid.
pub fn has_foreign_marker(notes: Option<&str>, uid: &str) -> bool {
    notes.is_some_and(|n| markers(n).any(|found| found.uid != uid))
}

/// Removes every marker, along with the blank lines left behind.
pub fn strip(notes: &str) -> String {
    let mut result = String::with_capacity(notes.len());
    let mut copied = 0;

    for found in markers(notes) {
        result.push_str(&notes[copied..found.begin]);
        copied = found.end;
    }
    result.push_str(&notes[copied..]);

    result.trim_end().to_string()
}

/// Strips any existing markers and appends one for `uid`.
///
/// Applying this twice gives the same text as applying it once.
pub fn embed(notes: Option<&str>, uid: &str) -> String {
    let body = notes.map(strip).unwrap_or_default();
    if body.is_empty() {
        marker_for(uid)
    } else {
        format!("{body}\n\n{}", marker_for(uid))
    }
}

struct Found {
    /// Byte span of the whole marker in the notes
    begin: usize,
    end: usize,
    uid: String,
}

/// Markers in order of appearance. Scanning stops at an unterminated one.
fn markers(notes: &str) -> impl Iterator<Item = Found> + '_ {
    let mut offset = 0;
    std::iter::from_fn(move || {
        let found = find_marker(notes, offset)?;
        offset = found.end;
        Some(found)
    })
}

fn find_marker(notes: &str, from: usize) -> Option<Found> {
    let begin = from + notes[from..].find(PREFIX)?;
    let body_start = begin + PREFIX.len();
    let mut uid = String::new();
    let mut chars = notes[body_start..].char_indices();

    while let Some((i, c)) = chars.next() {
        match c {
            ESCAPE => {
                let (_, escaped) = chars.next()?;
                uid.push(escaped);
            }
            SUFFIX => {
                return Some(Found {
                    begin,
                    end: body_start + i + SUFFIX.len_utf8(),
                    uid,
                });
            }
            c => uid.push(c),
        }
    }
    None
}
