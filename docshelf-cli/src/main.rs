//! Docshelf CLI - document metadata and symlink collection views

mod watch;

use anyhow::Result;
use chrono::Utc;
use clap::{Parser, Subcommand};
use docshelf::app::{FlagChange, MetadataFields};
use docshelf::{AppState, Config, DocumentRecord, Event, Outcome, ReadingState, Shell, Store, Views};
use std::path::{Path, PathBuf};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "docshelf")]
#[command(
    author,
    version,
    about = "Docshelf - document metadata with symlink collection views"
)]
#[command(propagate_version = true)]
struct Cli {
    /// Config file path (default: ~/.config/docshelf/config.json)
    #[arg(long, short = 'c', env = "DOCSHELF_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the config file, database and view directories
    Init,

    /// Print the active configuration
    Config,

    /// Show the metadata stored for a document
    Show {
        /// Document path
        path: PathBuf,

        /// Output format (text, json)
        #[arg(long, short = 'o', default_value = "text")]
        format: String,
    },

    /// Edit descriptive metadata; fields not given keep their value
    Edit {
        /// Document path
        path: PathBuf,

        #[arg(long)]
        title: Option<String>,

        #[arg(long)]
        author: Option<String>,

        #[arg(long)]
        venue: Option<String>,

        #[arg(long)]
        year: Option<String>,

        #[arg(long)]
        tag: Option<String>,

        #[arg(long = "abstract")]
        abstract_text: Option<String>,

        #[arg(long)]
        doi: Option<String>,

        #[arg(long)]
        url: Option<String>,
    },

    /// Mark a document as favorite
    Favorite {
        /// Document path
        path: PathBuf,

        /// Clear the flag instead
        #[arg(long)]
        off: bool,
    },

    /// Mark a document as to-read
    ToRead {
        /// Document path
        path: PathBuf,

        /// Clear the flag instead
        #[arg(long)]
        off: bool,
    },

    /// Set the reading state (unread, reading, read)
    State {
        /// Document path
        path: PathBuf,

        /// New reading state
        state: String,
    },

    /// Open a document and record it as recently opened
    Open {
        /// Document path
        path: PathBuf,

        /// Only record the open, do not launch the viewer
        #[arg(long)]
        no_viewer: bool,
    },

    /// Rename or move a file or directory, carrying its metadata along
    Mv {
        /// Existing path
        from: PathBuf,

        /// New path
        to: PathBuf,
    },

    /// Delete a file or directory together with its metadata
    Rm {
        /// Path to delete
        path: PathBuf,
    },

    /// List recently opened documents
    Recent {
        /// Maximum number of entries
        #[arg(long, short = 'n')]
        limit: Option<usize>,

        /// Output format (text, json)
        #[arg(long, short = 'o', default_value = "text")]
        format: String,
    },

    /// Rebuild every view directory
    Sync,

    /// Keep the recently added view fresh while files change
    Watch,
}

/// Loaded config plus a shell over the store and views
struct Context {
    config: Config,
    shell: Shell,
}

impl Context {
    fn load(config_path: &Path) -> Result<Self> {
        let (config, changed) = Config::load_or_init(config_path)?;
        if changed {
            tracing::info!("Config written to {}", config_path.display());
        }
        let store = Store::open(config.db_path())?;
        let views = Views::from_config(&config)?;
        let shell = Shell::new(store, views).with_viewer(config.viewer.clone());
        Ok(Context { config, shell })
    }

    fn state(&self) -> AppState {
        AppState::new(self.config.recently_added_sync_interval())
    }

    /// Dispatch one event and print what happened
    fn handle(&self, state: AppState, event: Event) -> Result<AppState> {
        let (state, outcomes) = self.shell.handle(state, event);
        report(&outcomes)?;
        Ok(state)
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config_path = cli.config.unwrap_or_else(docshelf::config::default_config_path);

    match cli.command {
        Commands::Init => cmd_init(&config_path),
        Commands::Config => cmd_config(&config_path),
        Commands::Show { path, format } => cmd_show(&config_path, &path, &format),
        Commands::Edit {
            path,
            title,
            author,
            venue,
            year,
            tag,
            abstract_text,
            doi,
            url,
        } => {
            let edits = FieldEdits {
                title,
                author,
                venue,
                year,
                tag,
                abstract_text,
                doi,
                url,
            };
            cmd_edit(&config_path, &path, edits)
        }
        Commands::Favorite { path, off } => cmd_flags(
            &config_path,
            &path,
            FlagChange {
                favorite: Some(!off),
                ..Default::default()
            },
        ),
        Commands::ToRead { path, off } => cmd_flags(
            &config_path,
            &path,
            FlagChange {
                to_read: Some(!off),
                ..Default::default()
            },
        ),
        Commands::State { path, state } => {
            let state: ReadingState = state.parse()?;
            cmd_flags(
                &config_path,
                &path,
                FlagChange {
                    reading_state: Some(state),
                    ..Default::default()
                },
            )
        }
        Commands::Open { path, no_viewer } => cmd_open(&config_path, &path, no_viewer),
        Commands::Mv { from, to } => cmd_mv(&config_path, &from, &to),
        Commands::Rm { path } => cmd_rm(&config_path, &path),
        Commands::Recent { limit, format } => cmd_recent(&config_path, limit, &format),
        Commands::Sync => cmd_sync(&config_path),
        Commands::Watch => {
            let ctx = Context::load(&config_path)?;
            watch::run(&ctx.config, &ctx.shell, ctx.state())
        }
    }
}

/// Print outcomes; fail if any effect failed
fn report(outcomes: &[Outcome]) -> Result<()> {
    let mut failures = 0;
    for outcome in outcomes {
        match outcome {
            Outcome::Done(message) => println!("{}", message),
            Outcome::Failed(message) => {
                eprintln!("{}", message);
                failures += 1;
            }
        }
    }
    if failures > 0 {
        anyhow::bail!("{} operation(s) failed", failures);
    }
    Ok(())
}

/// The document must exist; returns its canonical path
fn existing_document(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        anyhow::bail!("No such file: {}", path.display());
    }
    Ok(docshelf::canonical_path(path))
}

fn cmd_init(config_path: &Path) -> Result<()> {
    let ctx = Context::load(config_path)?;
    println!("Config:   {}", config_path.display());
    println!("Database: {}", ctx.config.db_path().display());
    for dir in ctx.config.view_dirs() {
        std::fs::create_dir_all(dir)?;
        println!("View:     {}", dir.display());
    }
    println!("Edit {} to change these paths.", config_path.display());
    Ok(())
}

fn cmd_config(config_path: &Path) -> Result<()> {
    let (config, _) = Config::load_or_init(config_path)?;
    println!("# {}", config_path.display());
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn print_record(record: &DocumentRecord, format: &str) -> Result<()> {
    if format == "json" {
        println!("{}", serde_json::to_string_pretty(record)?);
        return Ok(());
    }

    let or_dash = |s: &str| if s.is_empty() { "-".to_string() } else { s.to_string() };
    println!("{}", record.path);
    println!("  Title   : {}", or_dash(&record.title));
    println!("  Author  : {}", or_dash(&record.author));
    println!("  Venue   : {}", or_dash(&record.venue));
    println!("  Year    : {}", or_dash(&record.year));
    println!("  Tag     : {}", or_dash(&record.tag));
    println!("  DOI     : {}", or_dash(&record.doi));
    println!("  URL     : {}", or_dash(&record.url));
    println!("  Favorite: {}", if record.favorite { "yes" } else { "no" });
    println!("  To read : {}", if record.to_read { "yes" } else { "no" });
    println!("  Reading : {}", record.reading_state);
    if let Some(opened) = record.last_opened_at {
        println!("  Opened  : {}", opened.to_rfc3339());
    }
    if !record.abstract_text.is_empty() {
        println!("\n{}", record.abstract_text);
    }
    Ok(())
}

fn cmd_show(config_path: &Path, path: &Path, format: &str) -> Result<()> {
    let ctx = Context::load(config_path)?;
    match ctx.shell.store().get(path)? {
        Some(record) => print_record(&record, format),
        None => {
            println!("No metadata for {}", docshelf::canonical_path(path).display());
            Ok(())
        }
    }
}

/// Edited fields from the command line; `None` keeps the stored value
struct FieldEdits {
    title: Option<String>,
    author: Option<String>,
    venue: Option<String>,
    year: Option<String>,
    tag: Option<String>,
    abstract_text: Option<String>,
    doi: Option<String>,
    url: Option<String>,
}

impl FieldEdits {
    fn over(self, prior: DocumentRecord) -> MetadataFields {
        MetadataFields {
            title: self.title.unwrap_or(prior.title),
            author: self.author.unwrap_or(prior.author),
            venue: self.venue.unwrap_or(prior.venue),
            year: self.year.unwrap_or(prior.year),
            tag: self.tag.unwrap_or(prior.tag),
            abstract_text: self.abstract_text.unwrap_or(prior.abstract_text),
            doi: self.doi.unwrap_or(prior.doi),
            url: self.url.unwrap_or(prior.url),
        }
    }
}

fn cmd_edit(config_path: &Path, path: &Path, edits: FieldEdits) -> Result<()> {
    let ctx = Context::load(config_path)?;
    let path = existing_document(path)?;
    let prior = ctx
        .shell
        .store()
        .get(&path)?
        .unwrap_or_else(|| DocumentRecord::new(path.to_string_lossy()));

    let fields = edits.over(prior);
    ctx.handle(ctx.state(), Event::MetadataEdited { path, fields })?;
    Ok(())
}

fn cmd_flags(config_path: &Path, path: &Path, change: FlagChange) -> Result<()> {
    let ctx = Context::load(config_path)?;
    let path = existing_document(path)?;
    ctx.handle(ctx.state(), Event::FlagsChanged { path, change })?;
    Ok(())
}

fn cmd_open(config_path: &Path, path: &Path, no_viewer: bool) -> Result<()> {
    let ctx = Context::load(config_path)?;
    let path = existing_document(path)?;
    let mut state = ctx.state();
    state.launch_viewer = !no_viewer;
    ctx.handle(state, Event::Opened { path, at: Utc::now() })?;
    Ok(())
}

fn cmd_mv(config_path: &Path, from: &Path, to: &Path) -> Result<()> {
    let ctx = Context::load(config_path)?;
    let metadata = std::fs::symlink_metadata(from)
        .map_err(|e| anyhow::anyhow!("Cannot move {}: {}", from.display(), e))?;

    let to = if to.is_dir() {
        match from.file_name() {
            Some(name) => to.join(name),
            None => anyhow::bail!("Cannot move {}", from.display()),
        }
    } else {
        to.to_path_buf()
    };
    if to.exists() {
        anyhow::bail!("Target already exists: {}", to.display());
    }

    // Resolve the old path while it still exists
    let from_canonical = docshelf::canonical_path(from);
    std::fs::rename(from, &to)?;
    println!("Moved {} -> {}", from.display(), to.display());

    ctx.handle(
        ctx.state(),
        Event::Renamed {
            from: from_canonical,
            to: docshelf::canonical_path(&to),
            is_dir: metadata.is_dir(),
        },
    )?;
    Ok(())
}

fn cmd_rm(config_path: &Path, path: &Path) -> Result<()> {
    let ctx = Context::load(config_path)?;
    let metadata = std::fs::symlink_metadata(path)
        .map_err(|e| anyhow::anyhow!("Cannot delete {}: {}", path.display(), e))?;

    let canonical = docshelf::canonical_path(path);
    if metadata.is_dir() {
        std::fs::remove_dir_all(path)?;
    } else {
        std::fs::remove_file(path)?;
    }
    println!("Deleted {}", path.display());

    ctx.handle(
        ctx.state(),
        Event::Deleted {
            path: canonical,
            is_dir: metadata.is_dir(),
        },
    )?;
    Ok(())
}

fn cmd_recent(config_path: &Path, limit: Option<usize>, format: &str) -> Result<()> {
    let ctx = Context::load(config_path)?;
    let limit = limit.unwrap_or(ctx.config.recently_opened_limit);
    let records = ctx.shell.store().list_recently_opened(limit)?;

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }

    if records.is_empty() {
        println!("Nothing opened yet.");
        return Ok(());
    }

    for record in records {
        let opened = record
            .last_opened_at
            .map(|t| t.with_timezone(&chrono::Local).format("%b %d %H:%M").to_string())
            .unwrap_or_default();
        let label = if record.title.is_empty() {
            record.path.clone()
        } else {
            format!("{}  ({})", record.title, record.path)
        };
        println!("{}  {}", opened, label);
    }
    Ok(())
}

fn cmd_sync(config_path: &Path) -> Result<()> {
    let ctx = Context::load(config_path)?;
    ctx.handle(ctx.state(), Event::ResyncRequested { now: Utc::now() })?;
    println!("Views synced.");
    Ok(())
}
