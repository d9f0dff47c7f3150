//! # reelname-watch
//!
//! Watches a directory tree for media files and renames them into a
//! canonical form that media-server scrapers can match:
//!
//! - movies: `Title(Year) - Resolution.ext`
//! - episodes: `Title(Year) - S01E02 - Resolution.ext`
//!
//! The interesting part is the event-to-rename pipeline. Raw `notify` events
//! are filtered, folded per path by a debouncer actor until the file stops
//! changing, and handed to a bounded pool of workers that parse the name,
//! optionally ask an inference service, and rename the file without ever
//! overwriting anything.
//!
//! ```no_run
//! use reelname_watch::{Orchestrator, WatchConfig};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = WatchConfig::new("/srv/downloads").with_scan_existing(true);
//! let mut pipeline = Orchestrator::new(config)?;
//! let mut outcomes = pipeline.take_outcomes().expect("first call");
//! pipeline.start().await?;
//!
//! while let Some(outcome) = outcomes.recv().await {
//!     println!("{outcome}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`config`]: TOML configuration and validation
//! - [`logging`]: subscriber setup, optional rotating log file
//! - [`pipeline::filter`]: which paths are in scope
//! - [`pipeline::debouncer`]: the stability debouncer and dedup queue
//! - [`pipeline::rename_engine`]: canonical names, collisions, the move itself
//! - [`pipeline::orchestrator`]: worker pool and wiring
//! - [`pipeline::watcher`]: the `notify` adapter

pub mod config;
pub mod logging;
pub mod pipeline;

pub use config::{ConfigError, WatchConfig};
pub use pipeline::debouncer::{
    Completion, DebouncerHandle, DebouncerStats, EventKind, FileSnapshot, RawEvent, ReadyFile,
};
pub use pipeline::filter::PathFilter;
pub use pipeline::orchestrator::{Orchestrator, ProcessingStats};
pub use pipeline::outcome::{FileOutcome, Outcome, SkipReason};
pub use pipeline::rename_engine::{
    RenameEngine, RenameError, RenamePlan, RenameStrategy, canonical_stem, read_listing,
};
