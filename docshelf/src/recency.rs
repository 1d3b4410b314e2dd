//! Bounded "recently opened" view
//!
//! Link names carry a sortable UTC prefix, `YYYYMMDDThhmmss.fffffffffZ-`,
//! taken from the record's last-opened time. Ordering therefore lives in
//! the name itself and survives copies, coarse mtimes and bind mounts.
//! Reopening a document changes its name, so the old link is removed and a
//! fresh one created on the next pass.

use crate::error::Result;
use crate::namer::link_name;
use crate::paths::canonical_path;
use crate::store::Store;
use crate::view::{link_names, DesiredLinks, LinkDir, ReconcileReport, View};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::collections::HashSet;
use std::ffi::OsString;
use std::path::Path;

/// Format of the timestamp prefix
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.9fZ";

/// Length of a formatted prefix, without the `-` separator
const TIMESTAMP_LEN: usize = 26;

/// Result of a recency sync
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecencyReport {
    pub reconcile: ReconcileReport,
    /// Links deleted by the eviction pass
    pub evicted: usize,
}

/// Recently opened documents, capped at `capacity` links
#[derive(Debug, Clone)]
pub struct RecencyCache {
    view: LinkDir,
    capacity: usize,
}

impl RecencyCache {
    pub fn new<P: AsRef<Path>>(dir: P, capacity: usize) -> Self {
        RecencyCache {
            view: LinkDir::new(dir),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn dir(&self) -> &Path {
        self.view.dir()
    }

    /// Record that `path` was opened at `at`, then resync the view.
    pub fn record_open<P: AsRef<Path>>(
        &self,
        store: &Store,
        path: P,
        at: DateTime<Utc>,
    ) -> Result<RecencyReport> {
        store.record_opened(path, at)?;
        self.sync(store)
    }

    /// The capacity-bounded desired mapping for the current store state.
    pub fn desired(&self, store: &Store) -> Result<DesiredLinks> {
        let mut desired = DesiredLinks::new();
        let mut used = HashSet::new();

        for record in store.list_recently_opened(self.capacity)? {
            let Some(opened) = record.last_opened_at else {
                continue;
            };
            let target = canonical_path(record.path.trim());
            if !target.is_file() {
                tracing::debug!("Skipping missing recent document {}", target.display());
                continue;
            }
            let base = target
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let core = link_name(&base, record.title.trim(), record.year.trim(), &used);
            used.insert(core.clone());
            desired.insert(timestamped_name(opened, &core), &target);
        }

        Ok(desired)
    }

    /// Reconcile against the store, then evict down to capacity.
    pub fn sync(&self, store: &Store) -> Result<RecencyReport> {
        let desired = self.desired(store)?;
        let reconcile = self.view.reconcile(&desired)?;
        let evicted = self.evict()?;
        Ok(RecencyReport { reconcile, evicted })
    }

    /// Delete the oldest links until at most `capacity` remain.
    ///
    /// Age comes from the name prefix only; links without a parseable
    /// prefix, including names that are not UTF-8, count as oldest.
    /// Returns the number of links deleted.
    pub fn evict(&self) -> Result<usize> {
        let dir = self.view.prepare()?;
        let names = link_names(&dir)?;
        if names.len() <= self.capacity {
            return Ok(0);
        }

        let mut by_age: Vec<(Option<DateTime<Utc>>, OsString)> = names
            .into_iter()
            .map(|name| (name.to_str().and_then(parse_timestamp_prefix), name))
            .collect();
        by_age.sort();

        let excess = by_age.len() - self.capacity;
        let mut evicted = 0;
        for (_, name) in by_age.into_iter().take(excess) {
            let link = dir.join(&name);
            match std::fs::remove_file(&link) {
                Ok(()) => {
                    evicted += 1;
                    tracing::debug!("Evicted {}", link.display());
                }
                Err(e) => tracing::warn!("Failed to evict {}: {}", link.display(), e),
            }
        }
        Ok(evicted)
    }
}

/// `<timestamp>-<name>`
pub fn timestamped_name(at: DateTime<Utc>, name: &str) -> String {
    format!("{}-{}", at.format(TIMESTAMP_FORMAT), name)
}

/// Parse the timestamp prefix of a recency link name.
pub fn parse_timestamp_prefix(name: &str) -> Option<DateTime<Utc>> {
    let stamp = name.get(..TIMESTAMP_LEN - 1)?;
    if name.get(TIMESTAMP_LEN - 1..TIMESTAMP_LEN + 1)? != "Z-" {
        return None;
    }
    NaiveDateTime::parse_from_str(stamp, "%Y%m%dT%H%M%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}
