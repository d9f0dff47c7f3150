//! Stability debouncer and dedup queue.
//!
//! Filesystem events arrive in bursts: a single download produces a create,
//! dozens of modifies, maybe a rename from a `.part` name. The debouncer
//! folds all of that into one [`ReadyFile`] per physical file, emitted only
//! after the file's size and mtime stayed unchanged for the quiet interval.
//!
//! All state lives in one actor task. Callers hold a cloneable
//! [`DebouncerHandle`] and talk to the actor over a channel:
//!
//! ```text
//!            submit(RawEvent)                 next_ready()
//! watcher ──────────────────▶ ┌─────────┐ ◀────────────────── worker
//!                             │  actor  │ ──── ReadyFile ───▶
//!                             └─────────┘ ◀── complete(path) ─
//! ```
//!
//! Per path the state machine is
//! `Unseen → Pending → Stable → InFlight → (Unseen | Pending)`. An event
//! while `Pending` pushes the deadline out, an event while `Stable` sends the
//! path back to `Pending`, and an event while `InFlight` is remembered and
//! re-arms the path once the worker completes. `Deleted` drops the path in
//! every state except `InFlight`, where the worker's result decides.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, trace};

/// Kinds of raw filesystem events the debouncer understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Created,
    Modified,
    /// A file arrived under this path by rename
    Moved,
    Deleted,
}

/// One filesystem event, not assumed to be deduplicated or ordered
#[derive(Debug, Clone)]
pub struct RawEvent {
    pub path: PathBuf,
    pub kind: EventKind,
    pub observed_at: Instant,
}

impl RawEvent {
    pub fn new(path: impl Into<PathBuf>, kind: EventKind) -> Self {
        Self {
            path: path.into(),
            kind,
            observed_at: Instant::now(),
        }
    }

    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self::new(path, EventKind::Created)
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self::new(path, EventKind::Modified)
    }

    pub fn moved(path: impl Into<PathBuf>) -> Self {
        Self::new(path, EventKind::Moved)
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self::new(path, EventKind::Deleted)
    }
}

/// Size and modification time of a file at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSnapshot {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl FileSnapshot {
    /// Stat `path`; `None` if it is missing or not a regular file
    pub async fn capture(path: &Path) -> Option<Self> {
        let metadata = tokio::fs::metadata(path).await.ok()?;
        if !metadata.is_file() {
            return None;
        }
        Some(Self {
            len: metadata.len(),
            modified: metadata.modified().ok(),
        })
    }
}

/// A file that stayed unchanged for the quiet interval, handed to exactly
/// one worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadyFile {
    pub path: PathBuf,
    /// What the file looked like when it became stable
    pub snapshot: FileSnapshot,
    pub stable_since: Instant,
}

/// How a worker finished with a [`ReadyFile`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    /// The attempt reached a terminal outcome
    Done,
    /// The file changed under the worker; wait for it to settle again
    Rearm,
}

/// Point-in-time counts of the actor's state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebouncerStats {
    pub tracked: usize,
    pub pending: usize,
    pub queued: usize,
    pub in_flight: usize,
    pub waiting_workers: usize,
    /// Ready signals handed out since start
    pub dispatched: u64,
}

#[derive(Debug)]
enum Command {
    Event(RawEvent),
    Next(oneshot::Sender<ReadyFile>),
    Complete {
        path: PathBuf,
        completion: Completion,
    },
    Stats(oneshot::Sender<DebouncerStats>),
    Shutdown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileState {
    Pending { deadline: Instant, generation: u64 },
    Stable,
    InFlight { dirty: bool, deleted: bool },
}

#[derive(Debug)]
struct PendingFile {
    state: FileState,
    last_event_at: Instant,
    last_known: Option<FileSnapshot>,
    stable_since: Option<Instant>,
}

/// Cloneable handle to the debouncer actor
#[derive(Debug, Clone)]
pub struct DebouncerHandle {
    commands: mpsc::UnboundedSender<Command>,
}

impl DebouncerHandle {
    /// Spawn the actor on the current runtime
    pub fn spawn(quiet: Duration) -> (Self, JoinHandle<()>) {
        let (commands, receiver) = mpsc::unbounded_channel();
        let actor = Debouncer::new(quiet);
        let task = tokio::spawn(actor.run(receiver));
        (Self { commands }, task)
    }

    /// Feed one raw event. Never blocks and never fails; events sent after
    /// shutdown are dropped.
    pub fn submit(&self, event: RawEvent) {
        if self.commands.send(Command::Event(event)).is_err() {
            trace!("Debouncer stopped, dropping event");
        }
    }

    /// Wait for the next stable file.
    ///
    /// Returns `None` once the debouncer has shut down. The future should be
    /// driven to completion: dropping it after the actor answered leaves the
    /// path in flight.
    pub async fn next_ready(&self) -> Option<ReadyFile> {
        let (reply, answer) = oneshot::channel();
        self.commands.send(Command::Next(reply)).ok()?;
        answer.await.ok()
    }

    /// Report that a worker is finished with `path`
    pub fn complete(&self, path: PathBuf, completion: Completion) {
        if self
            .commands
            .send(Command::Complete { path, completion })
            .is_err()
        {
            trace!("Debouncer stopped, dropping completion");
        }
    }

    pub async fn stats(&self) -> Option<DebouncerStats> {
        let (reply, answer) = oneshot::channel();
        self.commands.send(Command::Stats(reply)).ok()?;
        answer.await.ok()
    }

    /// Stop the actor. Pending paths are dropped and waiting workers see `None`.
    pub fn shutdown(&self) {
        let _ = self.commands.send(Command::Shutdown);
    }
}

struct Debouncer {
    quiet: Duration,
    files: HashMap<PathBuf, PendingFile>,
    /// Min-heap of quiet deadlines; entries whose generation no longer
    /// matches the file's state are stale and skipped
    timers: BinaryHeap<Reverse<(Instant, u64, PathBuf)>>,
    /// Stable paths in the order they became stable
    ready: VecDeque<PathBuf>,
    waiting: VecDeque<oneshot::Sender<ReadyFile>>,
    next_generation: u64,
    dispatched: u64,
}

impl Debouncer {
    fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            files: HashMap::new(),
            timers: BinaryHeap::new(),
            ready: VecDeque::new(),
            waiting: VecDeque::new(),
            next_generation: 0,
            dispatched: 0,
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        debug!("Debouncer started with quiet interval {:?}", self.quiet);
        loop {
            let next_deadline = self.next_deadline();
            tokio::select! {
                command = commands.recv() => match command {
                    Some(Command::Shutdown) | None => break,
                    Some(command) => self.handle(command).await,
                },
                _ = sleep_until(next_deadline.unwrap_or_else(Instant::now)), if next_deadline.is_some() => {
                    self.fire_due(Instant::now()).await;
                }
            }
            self.dispatch();
        }
        debug!(
            "Debouncer stopped with {} tracked paths",
            self.files.len()
        );
    }

    async fn handle(&mut self, command: Command) {
        match command {
            Command::Event(event) => self.on_event(event).await,
            Command::Next(reply) => self.waiting.push_back(reply),
            Command::Complete { path, completion } => self.on_complete(path, completion).await,
            Command::Stats(reply) => {
                let _ = reply.send(self.stats());
            }
            Command::Shutdown => {}
        }
    }

    async fn on_event(&mut self, event: RawEvent) {
        trace!("{:?} {}", event.kind, event.path.display());
        if event.kind == EventKind::Deleted {
            self.forget(&event.path);
            return;
        }

        let snapshot = FileSnapshot::capture(&event.path).await;
        let Some(file) = self.files.get_mut(&event.path) else {
            self.files.insert(
                event.path.clone(),
                PendingFile {
                    state: FileState::Stable,
                    last_event_at: event.observed_at,
                    last_known: snapshot,
                    stable_since: None,
                },
            );
            self.arm(event.path);
            return;
        };

        file.last_event_at = file.last_event_at.max(event.observed_at);
        file.last_known = snapshot;
        match file.state {
            FileState::InFlight { .. } => {
                file.state = FileState::InFlight {
                    dirty: true,
                    deleted: false,
                };
            }
            FileState::Stable => {
                debug!("{} changed while queued", event.path.display());
                self.ready.retain(|p| p != &event.path);
                self.arm(event.path);
            }
            FileState::Pending { .. } => self.arm(event.path),
        }
    }

    /// Put `path` into `Pending` with a fresh deadline of last event + quiet
    fn arm(&mut self, path: PathBuf) {
        let generation = self.next_generation;
        self.next_generation += 1;
        if let Some(file) = self.files.get_mut(&path) {
            let deadline = file.last_event_at + self.quiet;
            file.state = FileState::Pending {
                deadline,
                generation,
            };
            file.stable_since = None;
            self.timers.push(Reverse((deadline, generation, path)));
        }
    }

    fn forget(&mut self, path: &Path) {
        let Some(file) = self.files.get_mut(path) else {
            return;
        };
        if let FileState::InFlight { dirty, .. } = file.state {
            file.state = FileState::InFlight {
                dirty,
                deleted: true,
            };
            return;
        }
        debug!("{} deleted, dropping", path.display());
        self.files.remove(path);
        self.ready.retain(|p| p != path);
    }

    async fn on_complete(&mut self, path: PathBuf, completion: Completion) {
        let Some(file) = self.files.get_mut(&path) else {
            debug!("Completion for untracked path {}", path.display());
            return;
        };
        let FileState::InFlight { dirty, deleted } = file.state else {
            debug!("Completion for {} which is not in flight", path.display());
            return;
        };

        if deleted || !(dirty || completion == Completion::Rearm) {
            self.files.remove(&path);
            return;
        }

        if completion == Completion::Rearm {
            file.last_event_at = file.last_event_at.max(Instant::now());
        }
        let snapshot = FileSnapshot::capture(&path).await;
        let Some(file) = self.files.get_mut(&path) else {
            return;
        };
        file.last_known = snapshot;
        debug!("{} re-armed after processing", path.display());
        self.arm(path);
    }

    /// The earliest live deadline, discarding stale heap entries on the way
    fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse((deadline, generation, path))) = self.timers.peek() {
            if self.is_live(path, *generation) {
                return Some(*deadline);
            }
            self.timers.pop();
        }
        None
    }

    fn is_live(&self, path: &Path, generation: u64) -> bool {
        matches!(
            self.files.get(path).map(|f| f.state),
            Some(FileState::Pending { generation: g, .. }) if g == generation
        )
    }

    async fn fire_due(&mut self, now: Instant) {
        while let Some(Reverse((deadline, generation, _))) = self.timers.peek() {
            if *deadline > now {
                break;
            }
            let generation = *generation;
            let Some(Reverse((_, _, path))) = self.timers.pop() else {
                break;
            };
            if self.is_live(&path, generation) {
                self.settle(path, now).await;
            }
        }
    }

    /// The quiet deadline passed: re-stat and either queue or re-arm
    async fn settle(&mut self, path: PathBuf, now: Instant) {
        let current = FileSnapshot::capture(&path).await;
        let Some(file) = self.files.get_mut(&path) else {
            return;
        };

        match current {
            None => {
                debug!("{} vanished before settling", path.display());
                self.files.remove(&path);
            }
            Some(snapshot) if file.last_known != Some(snapshot) => {
                debug!("{} still changing", path.display());
                file.last_known = Some(snapshot);
                file.last_event_at = now;
                self.arm(path);
            }
            Some(_) => {
                debug!("{} is stable", path.display());
                file.state = FileState::Stable;
                file.stable_since = Some(now);
                self.ready.push_back(path);
            }
        }
    }

    /// Pair queued stable paths with waiting workers
    fn dispatch(&mut self) {
        while !self.waiting.is_empty() {
            let Some(path) = self.ready.pop_front() else {
                break;
            };
            let Some(file) = self.files.get_mut(&path) else {
                continue;
            };
            if file.state != FileState::Stable {
                continue;
            }
            let (Some(snapshot), Some(stable_since)) = (file.last_known, file.stable_since) else {
                continue;
            };

            let mut ready = ReadyFile {
                path: path.clone(),
                snapshot,
                stable_since,
            };
            let mut delivered = false;
            while let Some(worker) = self.waiting.pop_front() {
                match worker.send(ready) {
                    Ok(()) => {
                        delivered = true;
                        break;
                    }
                    // That worker gave up waiting
                    Err(returned) => ready = returned,
                }
            }

            if delivered {
                file.state = FileState::InFlight {
                    dirty: false,
                    deleted: false,
                };
                self.dispatched += 1;
            } else {
                self.ready.push_front(path);
            }
        }
    }

    fn stats(&self) -> DebouncerStats {
        let mut stats = DebouncerStats {
            tracked: self.files.len(),
            queued: self.ready.len(),
            waiting_workers: self.waiting.iter().filter(|w| !w.is_closed()).count(),
            dispatched: self.dispatched,
            ..DebouncerStats::default()
        };
        for file in self.files.values() {
            match file.state {
                FileState::Pending { .. } => stats.pending += 1,
                FileState::InFlight { .. } => stats.in_flight += 1,
                FileState::Stable => {}
            }
        }
        stats
    }
}
