//! Queries that produce the desired link set for a view

use super::DesiredLinks;
use crate::error::Result;
use crate::scanner::Scanner;
use crate::store::Store;
use std::time::{Duration, SystemTime};

/// Computes the desired contents of a view from the store or the disk
pub trait LinkSource {
    fn desired(&self, store: &Store) -> Result<DesiredLinks>;
}

/// Which status flag a [`FlagSource`] selects on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagFilter {
    Favorite,
    ToRead,
}

/// Every record with a given flag set
#[derive(Debug, Clone, Copy)]
pub struct FlagSource(pub FlagFilter);

impl LinkSource for FlagSource {
    fn desired(&self, store: &Store) -> Result<DesiredLinks> {
        let records = match self.0 {
            FlagFilter::Favorite => store.list_favorites()?,
            FlagFilter::ToRead => store.list_to_read()?,
        };

        let mut desired = DesiredLinks::new();
        for record in &records {
            desired.insert_record(record);
        }
        Ok(desired)
    }
}

/// Documents under the watch directory modified within `max_age`
#[derive(Debug, Clone)]
pub struct RecentlyAddedSource {
    scanner: Scanner,
    max_age: Duration,
}

impl RecentlyAddedSource {
    pub fn new(scanner: Scanner, max_age: Duration) -> Self {
        RecentlyAddedSource { scanner, max_age }
    }

    /// Desired links as of `now`
    pub fn desired_at(&self, store: &Store, now: SystemTime) -> Result<DesiredLinks> {
        let cutoff = now.checked_sub(self.max_age).unwrap_or(SystemTime::UNIX_EPOCH);

        let mut found: Vec<_> = self.scanner.scan_since(cutoff).collect();
        // Sorted so collision suffixes land on the same files every pass
        found.sort_by(|a, b| a.path.cmp(&b.path));

        let mut desired = DesiredLinks::new();
        for doc in found {
            let (title, year) = match store.get(&doc.path) {
                Ok(Some(record)) => (record.title, record.year),
                Ok(None) => (String::new(), String::new()),
                Err(e) => {
                    tracing::warn!("Metadata lookup failed for {}: {}", doc.path.display(), e);
                    (String::new(), String::new())
                }
            };
            desired.insert_named(&doc.path, title.trim(), year.trim());
        }
        Ok(desired)
    }
}

impl LinkSource for RecentlyAddedSource {
    fn desired(&self, store: &Store) -> Result<DesiredLinks> {
        self.desired_at(store, SystemTime::now())
    }
}
