//! # Docshelf
//!
//! Metadata for a personal document collection, keyed by canonical file
//! path, plus "virtual collections": directories of symlinks generated
//! from metadata queries.
//!
//! Docshelf provides:
//! - **Metadata store** in SQLite that follows files through renames,
//!   directory moves and deletes
//! - **Link naming** that turns titles and years into readable,
//!   collision-free link names
//! - **View reconciliation** that converges a symlink directory to a
//!   desired set without touching links that are already right
//! - **Recently opened** view with a hard cap and timestamp-ordered eviction
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use docshelf::{RecencyCache, Store};
//!
//! let store = Store::open("~/.local/share/docshelf/metadata.sqlite").unwrap();
//! let recent = RecencyCache::new("~/Papers/_recently_opened", 20);
//!
//! recent
//!     .record_open(&store, "~/Papers/attention.pdf", chrono::Utc::now())
//!     .unwrap();
//! ```

pub mod app;
pub mod config;
pub mod error;
pub mod namer;
pub mod paths;
pub mod recency;
pub mod scanner;
pub mod store;
pub mod view;

// Re-exports for convenience
pub use app::{dispatch, AppState, Effect, Event, Outcome, Shell, Views};
pub use config::Config;
pub use error::{Error, Result};
pub use namer::link_name;
pub use paths::canonical_path;
pub use recency::{RecencyCache, RecencyReport};
pub use store::{DocumentRecord, ReadingState, Store};
pub use view::{DesiredLinks, LinkDir, ReconcileReport, View};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
