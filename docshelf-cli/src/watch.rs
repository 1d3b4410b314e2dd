//! Long-running watch mode
//!
//! Filesystem notifications and a periodic timeout both become `Tick`
//! events; throttling happens in `dispatch`, so bursts of changes cost one
//! recently-added pass per interval. Everything runs on this thread.

use anyhow::Result;
use chrono::Utc;
use docshelf::{AppState, Config, Event, Outcome, Shell};
use notify::{RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};

pub fn run(config: &Config, shell: &Shell, state: AppState) -> Result<()> {
    std::fs::create_dir_all(&config.watch_dir)?;
    let watch_dir = std::fs::canonicalize(&config.watch_dir)?;
    let view_dirs: Vec<PathBuf> = config
        .view_dirs()
        .iter()
        .map(|dir| docshelf::canonical_path(dir))
        .collect();

    let (tx, rx) = mpsc::channel();
    let mut watcher = notify::recommended_watcher(tx)?;
    watcher.watch(&watch_dir, RecursiveMode::Recursive)?;

    tracing::info!("Watching {}", watch_dir.display());
    println!("Watching {} (Ctrl-C to stop)", watch_dir.display());

    let interval = state.recently_added_interval;
    let (mut state, outcomes) = shell.handle(state, Event::ResyncRequested { now: Utc::now() });
    log_outcomes(&outcomes);

    loop {
        match rx.recv_timeout(interval) {
            Ok(Ok(event)) => {
                if !touches_library(&event.paths, &view_dirs) {
                    continue;
                }
                tracing::debug!("Change: {:?} {:?}", event.kind, event.paths);
            }
            Ok(Err(e)) => {
                tracing::warn!("Watch error: {}", e);
                continue;
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let (next, outcomes) = shell.handle(state, Event::Tick { now: Utc::now() });
        state = next;
        log_outcomes(&outcomes);
    }

    Ok(())
}

/// Whether any changed path lies outside the view directories.
/// Our own link writes must not retrigger a pass.
fn touches_library(paths: &[PathBuf], view_dirs: &[PathBuf]) -> bool {
    paths
        .iter()
        .any(|path| !view_dirs.iter().any(|dir| inside(path, dir)))
}

fn inside(path: &Path, dir: &Path) -> bool {
    path.starts_with(dir)
}

fn log_outcomes(outcomes: &[Outcome]) {
    for outcome in outcomes {
        match outcome {
            Outcome::Done(message) => tracing::info!("{}", message),
            Outcome::Failed(message) => tracing::error!("{}", message),
        }
    }
}
