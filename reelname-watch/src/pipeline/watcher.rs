use super::debouncer::{DebouncerHandle, EventKind, RawEvent};
use super::filter::PathFilter;
use anyhow::Result;
use notify::event::{ModifyKind, RenameMode};
use notify::{Event, RecursiveMode, Watcher};
use std::sync::Arc;
use tracing::{debug, warn};

/// Translate one `notify` event into the debouncer's vocabulary.
///
/// A rename source is reported as a deletion since nothing is left at that
/// path; the destination is reported as a move.
pub fn translate(event: &Event) -> Vec<RawEvent> {
    let kind = match event.kind {
        notify::EventKind::Access(_) => return Vec::new(),
        notify::EventKind::Create(_) => EventKind::Created,
        notify::EventKind::Remove(_) => EventKind::Deleted,
        notify::EventKind::Modify(ModifyKind::Name(RenameMode::From)) => EventKind::Deleted,
        notify::EventKind::Modify(ModifyKind::Name(RenameMode::To)) => EventKind::Moved,
        notify::EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            let mut events = Vec::with_capacity(2);
            if let Some(from) = event.paths.first() {
                events.push(RawEvent::deleted(from));
            }
            if let Some(to) = event.paths.get(1) {
                events.push(RawEvent::moved(to));
            }
            return events;
        }
        _ => EventKind::Modified,
    };
    event
        .paths
        .iter()
        .map(|path| RawEvent::new(path, kind))
        .collect()
}

/// Keeps a `notify` watcher alive and feeds filtered events to the debouncer.
/// Dropping it stops the watch.
pub struct FsWatcher {
    _watcher: notify::RecommendedWatcher,
}

impl FsWatcher {
    pub fn start(filter: Arc<PathFilter>, debouncer: DebouncerHandle) -> Result<Self> {
        let root = filter.root().to_path_buf();
        let mode = if filter.is_recursive() {
            RecursiveMode::Recursive
        } else {
            RecursiveMode::NonRecursive
        };

        // Runs on notify's own thread
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    warn!("Filesystem watcher error: {}", e);
                    return;
                }
            };
            for raw in translate(&event) {
                let accepted = match raw.kind {
                    EventKind::Deleted => filter.matches_path(&raw.path),
                    _ => filter.accept(&raw.path),
                };
                if accepted {
                    debouncer.submit(raw);
                }
            }
        })?;
        watcher.watch(&root, mode)?;
        debug!("Watching {} ({:?})", root.display(), mode);

        Ok(Self { _watcher: watcher })
    }
}
