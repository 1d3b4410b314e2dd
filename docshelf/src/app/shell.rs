//! Effect execution
//!
//! The shell owns the store and the view directories and runs effects one
//! at a time on the calling thread. `Store` is not `Sync`, so a shell can
//! never be driven from two threads at once; that is what keeps passes
//! over the same view directory from overlapping.

use super::{dispatch, AppState, Effect, Event};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::recency::RecencyCache;
use crate::scanner::Scanner;
use crate::store::Store;
use crate::view::{FlagFilter, FlagSource, LinkDir, LinkSource, RecentlyAddedSource, View};
use std::process::{Command, Stdio};

/// The view directories a shell keeps in sync. Any may be disabled.
#[derive(Debug, Clone, Default)]
pub struct Views {
    pub favorites: Option<LinkDir>,
    pub to_read: Option<LinkDir>,
    pub recently_added: Option<(LinkDir, RecentlyAddedSource)>,
    pub recently_opened: Option<RecencyCache>,
}

impl Views {
    /// Every view enabled, laid out as the config says
    pub fn from_config(config: &Config) -> Result<Self> {
        let patterns: Vec<&str> = config.patterns.iter().map(|s| s.as_str()).collect();
        let mut scanner = Scanner::new(&config.watch_dir, &patterns)?;
        for dir in config.view_dirs() {
            scanner = scanner.skip_dir(dir);
        }

        Ok(Views {
            favorites: Some(LinkDir::new(&config.favorites_dir)),
            to_read: Some(LinkDir::new(&config.to_read_dir)),
            recently_added: Some((
                LinkDir::new(&config.recently_added_dir),
                RecentlyAddedSource::new(scanner, config.recently_added_max_age()),
            )),
            recently_opened: Some(RecencyCache::new(
                &config.recently_opened_dir,
                config.recently_opened_limit,
            )),
        })
    }
}

/// Result of one effect, phrased for a status line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Done(String),
    Failed(String),
}

impl Outcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Outcome::Done(m) | Outcome::Failed(m) => m,
        }
    }
}

/// Performs effects against the store, the views and the viewer program
pub struct Shell {
    store: Store,
    views: Views,
    viewer: Option<String>,
}

impl Shell {
    pub fn new(store: Store, views: Views) -> Self {
        Shell {
            store,
            views,
            viewer: None,
        }
    }

    /// Program that `LaunchViewer` effects hand documents to
    pub fn with_viewer(mut self, viewer: impl Into<String>) -> Self {
        self.viewer = Some(viewer.into());
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn views(&self) -> &Views {
        &self.views
    }

    /// Dispatch an event and perform its effects.
    pub fn handle(&self, state: AppState, event: Event) -> (AppState, Vec<Outcome>) {
        let (state, effects) = dispatch(state, event);
        (state, self.execute(&effects))
    }

    /// Run effects in order. A failure is reported and the next effect
    /// still runs.
    pub fn execute(&self, effects: &[Effect]) -> Vec<Outcome> {
        effects
            .iter()
            .filter_map(|effect| match self.run(effect) {
                Ok(Some(message)) => Some(Outcome::Done(message)),
                Ok(None) => None,
                Err(e) => {
                    let message = format!("{} failed: {}", describe(effect), e);
                    tracing::warn!("{}", message);
                    Some(Outcome::Failed(message))
                }
            })
            .collect()
    }

    fn run(&self, effect: &Effect) -> Result<Option<String>> {
        match effect {
            Effect::RecordOpened { path, at } => {
                self.store.record_opened(path, *at)?;
                Ok(None)
            }
            Effect::Upsert(record) => {
                self.store.upsert(record)?;
                Ok(Some("Metadata saved".to_string()))
            }
            Effect::Patch { path, patch } => {
                self.store.update(path, |record| patch.apply(record))?;
                Ok(Some("Metadata saved".to_string()))
            }
            Effect::MovePath { from, to } => {
                self.store.move_path(from, to)?;
                Ok(None)
            }
            Effect::MoveTree { from, to } => {
                let moved = self.store.move_tree(from, to)?;
                Ok((moved > 0).then(|| format!("Moved metadata for {} file(s)", moved)))
            }
            Effect::DeletePath(path) => {
                self.store.delete_path(path)?;
                Ok(None)
            }
            Effect::DeleteTree(path) => {
                let deleted = self.store.delete_tree(path)?;
                Ok((deleted > 0).then(|| format!("Dropped metadata for {} file(s)", deleted)))
            }
            Effect::SyncCollections => {
                // Each view is attempted even when the other fails
                let mut errors = Vec::new();
                for (dir, filter) in [
                    (&self.views.favorites, FlagFilter::Favorite),
                    (&self.views.to_read, FlagFilter::ToRead),
                ] {
                    let Some(dir) = dir else { continue };
                    if let Err(e) = sync_view(dir, &FlagSource(filter), &self.store) {
                        errors.push(e);
                    }
                }
                match Error::combine(errors) {
                    Some(e) => Err(e),
                    None => Ok(None),
                }
            }
            Effect::SyncRecentlyAdded => {
                if let Some((dir, source)) = &self.views.recently_added {
                    sync_view(dir, source, &self.store)?;
                }
                Ok(None)
            }
            Effect::SyncRecentlyOpened => {
                if let Some(cache) = &self.views.recently_opened {
                    let report = cache.sync(&self.store)?;
                    if report.evicted > 0 {
                        tracing::debug!("Evicted {} recently opened link(s)", report.evicted);
                    }
                }
                Ok(None)
            }
            Effect::LaunchViewer(path) => {
                let Some(viewer) = &self.viewer else {
                    return Ok(None);
                };
                Command::new(viewer)
                    .arg(path)
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .spawn()?;
                Ok(Some(format!("Opened {}", path.display())))
            }
        }
    }
}

fn sync_view(view: &LinkDir, source: &dyn LinkSource, store: &Store) -> Result<()> {
    let desired = source.desired(store)?;
    let report = view.reconcile(&desired)?;
    if report.mutations() > 0 || !report.failed_removals.is_empty() {
        tracing::info!(
            "Synced {}: {} created, {} removed, {} unchanged, {} removal failure(s)",
            view.dir().display(),
            report.created,
            report.removed,
            report.unchanged,
            report.failed_removals.len()
        );
    }
    Ok(())
}

fn describe(effect: &Effect) -> &'static str {
    match effect {
        Effect::RecordOpened { .. } => "Recently read update",
        Effect::Upsert(_) | Effect::Patch { .. } => "Saving metadata",
        Effect::MovePath { .. } | Effect::MoveTree { .. } => "Metadata move",
        Effect::DeletePath(_) | Effect::DeleteTree(_) => "Metadata delete",
        Effect::SyncCollections => "Collection sync",
        Effect::SyncRecentlyAdded => "Recently added sync",
        Effect::SyncRecentlyOpened => "Recently read directory sync",
        Effect::LaunchViewer(_) => "Opening viewer",
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::app::{FlagChange, MetadataFields};
    use chrono::{TimeZone, Utc};
    use std::path::PathBuf;
    use std::time::Duration;
    use tempfile::tempdir;

    struct Fixture {
        _tmp: tempfile::TempDir,
        root: PathBuf,
        config: Config,
    }

    impl Fixture {
        fn new() -> Self {
            let tmp = tempdir().unwrap();
            let root = std::fs::canonicalize(tmp.path()).unwrap();
            let mut config = Config {
                watch_dir: root.join("library"),
                meta_dir: root.join("meta"),
                recently_opened_limit: 2,
                ..Default::default()
            };
            config.ensure_defaults();
            std::fs::create_dir_all(&config.watch_dir).unwrap();
            Fixture {
                _tmp: tmp,
                root,
                config,
            }
        }

        fn shell(&self) -> Shell {
            Shell::new(
                Store::open(self.config.db_path()).unwrap(),
                Views::from_config(&self.config).unwrap(),
            )
        }

        fn paper(&self, name: &str) -> PathBuf {
            let path = self.config.watch_dir.join(name);
            std::fs::write(&path, b"%PDF").unwrap();
            path
        }

        fn links(&self, dir: &std::path::Path) -> Vec<String> {
            LinkDir::new(dir).existing_links().unwrap().into_keys().collect()
        }
    }

    fn state() -> AppState {
        AppState::new(Duration::from_secs(60))
    }

    #[test]
    fn test_favorite_toggle_materializes_link() {
        let fx = Fixture::new();
        let shell = fx.shell();
        let paper = fx.paper("a.pdf");

        let (_, outcomes) = shell.handle(
            state(),
            Event::FlagsChanged {
                path: paper.clone(),
                change: FlagChange {
                    favorite: Some(true),
                    ..Default::default()
                },
            },
        );
        assert!(outcomes.iter().all(|o| !o.is_failure()));
        assert_eq!(fx.links(&fx.config.favorites_dir), vec!["a.pdf"]);

        shell.handle(
            state(),
            Event::FlagsChanged {
                path: paper,
                change: FlagChange {
                    favorite: Some(false),
                    ..Default::default()
                },
            },
        );
        assert!(fx.links(&fx.config.favorites_dir).is_empty());
    }

    #[test]
    fn test_metadata_edit_renames_links_and_keeps_flags() {
        let fx = Fixture::new();
        let shell = fx.shell();
        let paper = fx.paper("a.pdf");
        shell.store().update(&paper, |r| r.to_read = true).unwrap();

        shell.handle(
            state(),
            Event::MetadataEdited {
                path: paper.clone(),
                fields: MetadataFields {
                    title: "Attention".to_string(),
                    year: "2017".to_string(),
                    ..Default::default()
                },
            },
        );

        assert!(shell.store().get(&paper).unwrap().unwrap().to_read);
        assert_eq!(fx.links(&fx.config.to_read_dir), vec!["[2017][Attention].pdf"]);
        assert_eq!(
            fx.links(&fx.config.recently_added_dir),
            vec!["[2017][Attention].pdf"]
        );
    }

    #[test]
    fn test_rename_carries_metadata_and_relinks() {
        let fx = Fixture::new();
        let shell = fx.shell();
        let old = fx.paper("old.pdf");
        shell.store().update(&old, |r| r.favorite = true).unwrap();

        let new = fx.config.watch_dir.join("new.pdf");
        std::fs::rename(&old, &new).unwrap();
        let (_, outcomes) = shell.handle(
            state(),
            Event::Renamed {
                from: old.clone(),
                to: new.clone(),
                is_dir: false,
            },
        );

        assert!(outcomes.iter().all(|o| !o.is_failure()));
        assert!(shell.store().get(&old).unwrap().is_none());
        assert!(shell.store().get(&new).unwrap().unwrap().favorite);
        let favorites = LinkDir::new(&fx.config.favorites_dir).existing_links().unwrap();
        assert_eq!(favorites.get("new.pdf"), Some(&new));
        assert_eq!(favorites.len(), 1);
    }

    #[test]
    fn test_open_respects_capacity() {
        let fx = Fixture::new();
        let shell = fx.shell();
        let mut s = state();
        for (i, name) in ["a.pdf", "b.pdf", "c.pdf"].iter().enumerate() {
            let path = fx.paper(name);
            let (next, _) = shell.handle(
                s,
                Event::Opened {
                    path,
                    at: Utc.timestamp_opt(1_000 + i as i64, 0).unwrap(),
                },
            );
            s = next;
        }

        let links = fx.links(&fx.config.recently_opened_dir);
        assert_eq!(links.len(), 2);
        assert!(links.iter().all(|n| !n.ends_with("-a.pdf")));
    }

    #[test]
    fn test_failed_view_reported_without_stopping() {
        let fx = Fixture::new();
        let blocker = fx.root.join("blocker");
        std::fs::write(&blocker, b"file").unwrap();

        let mut views = Views::from_config(&fx.config).unwrap();
        views.favorites = Some(LinkDir::new(blocker.join("fav")));
        let shell = Shell::new(Store::open_memory().unwrap(), views);
        let paper = fx.paper("a.pdf");

        let outcomes = shell.execute(&[
            Effect::Patch {
                path: paper.clone(),
                patch: crate::app::Patch::Flags(FlagChange {
                    favorite: Some(true),
                    to_read: Some(true),
                    reading_state: None,
                }),
            },
            Effect::SyncCollections,
            Effect::SyncRecentlyOpened,
        ]);

        assert!(outcomes.iter().any(|o| o.is_failure()
            && o.message().starts_with("Collection sync failed")));
        assert!(shell.store().get(&paper).unwrap().unwrap().favorite);
        assert_eq!(fx.links(&fx.config.to_read_dir), vec!["a.pdf"]);
    }

    #[test]
    fn test_both_collection_failures_reported() {
        let fx = Fixture::new();
        let blocker = fx.root.join("blocker");
        std::fs::write(&blocker, b"file").unwrap();

        let mut views = Views::from_config(&fx.config).unwrap();
        views.favorites = Some(LinkDir::new(blocker.join("fav")));
        views.to_read = Some(LinkDir::new(blocker.join("later")));
        let shell = Shell::new(Store::open_memory().unwrap(), views);

        let outcomes = shell.execute(&[Effect::SyncCollections]);

        assert_eq!(outcomes.len(), 1);
        let message = outcomes[0].message();
        assert!(message.contains("fav"));
        assert!(message.contains("later"));
    }
}
