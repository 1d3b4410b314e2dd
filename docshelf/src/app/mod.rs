//! Event dispatch
//!
//! User actions arrive as [`Event`]s. [`dispatch`] is pure: it takes the
//! current [`AppState`] and an event and returns the next state plus the
//! [`Effect`]s to perform. The [`Shell`] performs them against the store,
//! the view directories and the outside world.

mod shell;

pub use shell::{Outcome, Shell, Views};

use crate::store::{DocumentRecord, ReadingState};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;

/// Descriptive fields set by a metadata edit
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataFields {
    pub title: String,
    pub author: String,
    pub venue: String,
    pub year: String,
    pub tag: String,
    pub abstract_text: String,
    pub doi: String,
    pub url: String,
}

impl MetadataFields {
    /// Overwrite the descriptive fields of `record`, leaving status alone.
    pub fn apply(&self, record: &mut DocumentRecord) {
        record.title = self.title.trim().to_string();
        record.author = self.author.trim().to_string();
        record.venue = self.venue.trim().to_string();
        record.year = self.year.trim().to_string();
        record.tag = self.tag.trim().to_string();
        record.abstract_text = self.abstract_text.trim().to_string();
        record.doi = self.doi.trim().to_string();
        record.url = self.url.trim().to_string();
    }
}

/// A change to status flags; `None` leaves the flag as it was
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlagChange {
    pub favorite: Option<bool>,
    pub to_read: Option<bool>,
    pub reading_state: Option<ReadingState>,
}

impl FlagChange {
    pub fn apply(&self, record: &mut DocumentRecord) {
        if let Some(favorite) = self.favorite {
            record.favorite = favorite;
        }
        if let Some(to_read) = self.to_read {
            record.to_read = to_read;
        }
        if let Some(state) = self.reading_state {
            record.reading_state = state;
        }
    }

    fn touches_collections(&self) -> bool {
        self.favorite.is_some() || self.to_read.is_some()
    }
}

/// Partial edit of one record, merged against what is stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Patch {
    Metadata(MetadataFields),
    Flags(FlagChange),
}

impl Patch {
    pub fn apply(&self, record: &mut DocumentRecord) {
        match self {
            Patch::Metadata(fields) => fields.apply(record),
            Patch::Flags(change) => change.apply(record),
        }
    }
}

/// Something the user (or a timer) did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A document was opened for reading
    Opened { path: PathBuf, at: DateTime<Utc> },
    /// Descriptive metadata edited by hand
    MetadataEdited { path: PathBuf, fields: MetadataFields },
    /// Favorite / to-read / reading-state toggled
    FlagsChanged { path: PathBuf, change: FlagChange },
    /// A complete record fetched from elsewhere, stored as-is
    Imported(DocumentRecord),
    /// A file or directory was renamed or moved on disk
    Renamed { from: PathBuf, to: PathBuf, is_dir: bool },
    /// A file or directory was deleted on disk
    Deleted { path: PathBuf, is_dir: bool },
    /// Periodic wake-up
    Tick { now: DateTime<Utc> },
    /// Explicit request to rebuild every view
    ResyncRequested { now: DateTime<Utc> },
}

/// Work for the shell to perform, in order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    RecordOpened { path: PathBuf, at: DateTime<Utc> },
    Upsert(DocumentRecord),
    Patch { path: PathBuf, patch: Patch },
    MovePath { from: PathBuf, to: PathBuf },
    MoveTree { from: PathBuf, to: PathBuf },
    DeletePath(PathBuf),
    DeleteTree(PathBuf),
    SyncCollections,
    SyncRecentlyAdded,
    SyncRecentlyOpened,
    LaunchViewer(PathBuf),
}

/// State threaded through [`dispatch`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppState {
    /// Minimum time between unforced recently-added resyncs
    pub recently_added_interval: Duration,
    /// When the recently-added view was last scheduled for a resync
    pub last_recently_added_sync: Option<DateTime<Utc>>,
    /// Whether opened documents are handed to the viewer
    pub launch_viewer: bool,
}

impl AppState {
    pub fn new(recently_added_interval: Duration) -> Self {
        AppState {
            recently_added_interval,
            last_recently_added_sync: None,
            launch_viewer: false,
        }
    }

    /// Whether an unforced recently-added resync may run at `now`
    pub fn recently_added_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_recently_added_sync {
            None => true,
            Some(last) => {
                let elapsed = now.signed_duration_since(last);
                elapsed.to_std().map_or(false, |e| e >= self.recently_added_interval)
            }
        }
    }
}

/// Compute the next state and the effects for one event.
pub fn dispatch(state: AppState, event: Event) -> (AppState, Vec<Effect>) {
    let mut state = state;
    let mut effects = Vec::new();

    match event {
        Event::Opened { path, at } => {
            effects.push(Effect::RecordOpened {
                path: path.clone(),
                at,
            });
            effects.push(Effect::SyncRecentlyOpened);
            if state.launch_viewer {
                effects.push(Effect::LaunchViewer(path));
            }
        }
        Event::MetadataEdited { path, fields } => {
            effects.push(Effect::Patch {
                path,
                patch: Patch::Metadata(fields),
            });
            // Titles and years feed link names in every view
            effects.extend(all_view_syncs());
        }
        Event::FlagsChanged { path, change } => {
            let touches = change.touches_collections();
            effects.push(Effect::Patch {
                path,
                patch: Patch::Flags(change),
            });
            if touches {
                effects.push(Effect::SyncCollections);
            }
        }
        Event::Imported(record) => {
            effects.push(Effect::Upsert(record));
            effects.extend(all_view_syncs());
        }
        Event::Renamed { from, to, is_dir } => {
            if is_dir {
                effects.push(Effect::MoveTree {
                    from: from.clone(),
                    to: to.clone(),
                });
            }
            effects.push(Effect::MovePath { from, to });
            effects.extend(all_view_syncs());
        }
        Event::Deleted { path, is_dir } => {
            if is_dir {
                effects.push(Effect::DeleteTree(path.clone()));
            }
            effects.push(Effect::DeletePath(path));
            effects.extend(all_view_syncs());
        }
        Event::Tick { now } => {
            if state.recently_added_due(now) {
                state.last_recently_added_sync = Some(now);
                effects.push(Effect::SyncRecentlyAdded);
            }
        }
        Event::ResyncRequested { now } => {
            state.last_recently_added_sync = Some(now);
            effects.extend(all_view_syncs());
        }
    }

    (state, effects)
}

fn all_view_syncs() -> [Effect; 3] {
    [
        Effect::SyncCollections,
        Effect::SyncRecentlyAdded,
        Effect::SyncRecentlyOpened,
    ]
}
