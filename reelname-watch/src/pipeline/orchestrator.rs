//! Wires the pipeline together and owns the worker pool.
//!
//! ```text
//! notify ─▶ PathFilter ─▶ Debouncer ─▶ worker ─▶ parse ─▶ (improve) ─▶ RenameEngine
//!                              ▲          │                                │
//!                              └ complete ┘                     FileOutcome channel
//! ```
//!
//! Each worker pulls one stable file at a time, so stable paths wait in the
//! debouncer's queue while every worker is busy. A worker re-checks the
//! file's size and mtime before doing anything; if the file moved on since
//! it settled, the path goes back to `Pending` instead of being renamed.

use super::debouncer::{
    Completion, DebouncerHandle, DebouncerStats, EventKind, FileSnapshot, RawEvent, ReadyFile,
};
use super::filter::PathFilter;
use super::outcome::{FileOutcome, Outcome, SkipReason};
use super::rename_engine::{RenameEngine, RenameError, RenameStrategy};
use super::watcher::FsWatcher;
use crate::config::WatchConfig;
use anyhow::{Context, Result};
use ignore::WalkBuilder;
use reelname_infer::{ConfidenceImprover, improver_from_config};
use reelname_parse::{MediaDescriptor, parse_with_context};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{RwLock, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Running totals of terminal outcomes
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessingStats {
    pub renamed: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Files that changed between settling and processing
    pub rearmed: usize,
    pub inference_attempts: usize,
}

/// State shared by every worker
struct Worker {
    debouncer: DebouncerHandle,
    engine: Arc<RenameEngine>,
    improver: Arc<dyn ConfidenceImprover>,
    root: PathBuf,
    threshold: f32,
    stats: Arc<RwLock<ProcessingStats>>,
    outcomes: mpsc::UnboundedSender<FileOutcome>,
}

impl Worker {
    async fn run(self: Arc<Self>, id: usize) {
        debug!("Rename worker {} started", id);
        while let Some(ready) = self.debouncer.next_ready().await {
            let path = ready.path.clone();
            let completion = self.process(ready).await;
            self.debouncer.complete(path, completion);
        }
        debug!("Rename worker {} stopped", id);
    }

    async fn process(&self, ready: ReadyFile) -> Completion {
        let path = ready.path;
        match FileSnapshot::capture(&path).await {
            None => {
                self.report(
                    path,
                    Outcome::Skipped {
                        reason: SkipReason::SourceVanished,
                    },
                    None,
                )
                .await;
                return Completion::Done;
            }
            Some(current) if current != ready.snapshot => {
                debug!("{} changed after settling, re-queueing", path.display());
                self.stats.write().await.rearmed += 1;
                return Completion::Rearm;
            }
            Some(_) => {}
        }

        let descriptor = self.describe(&path).await;
        let outcome = match self.engine.rename(path.clone(), descriptor.clone()).await {
            Ok(plan) if plan.strategy == RenameStrategy::Skip => Outcome::Skipped {
                reason: SkipReason::UnrecognizedName,
            },
            Ok(plan) if plan.is_noop() => Outcome::Skipped {
                reason: SkipReason::AlreadyNamed,
            },
            Ok(plan) => Outcome::Renamed {
                target: plan.target,
                strategy: plan.strategy,
            },
            Err(RenameError::TargetMissing { .. }) if !path.exists() => Outcome::Skipped {
                reason: SkipReason::SourceVanished,
            },
            Err(e) => Outcome::Failed {
                reason: e.to_string(),
            },
        };
        self.report(path, outcome, Some(descriptor)).await;
        Completion::Done
    }

    /// Rules first, then the improver if the rules were not sure enough
    async fn describe(&self, path: &Path) -> MediaDescriptor {
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        // The root's own name says nothing about the files in it
        let parent_dir = path
            .parent()
            .filter(|parent| *parent != self.root)
            .and_then(|parent| parent.file_name())
            .map(|n| n.to_string_lossy().into_owned());

        let baseline = parse_with_context(&filename, parent_dir.as_deref());
        if baseline.is_confident(self.threshold) || !self.improver.is_enabled() {
            return baseline;
        }

        debug!(
            "Low confidence {:.2} for {}, asking the inference fallback",
            baseline.confidence, filename
        );
        self.stats.write().await.inference_attempts += 1;
        self.improver
            .improve(&filename, parent_dir.as_deref(), baseline)
            .await
    }

    async fn report(&self, path: PathBuf, outcome: Outcome, descriptor: Option<MediaDescriptor>) {
        {
            let mut stats = self.stats.write().await;
            match &outcome {
                Outcome::Renamed { .. } => stats.renamed += 1,
                Outcome::Skipped { .. } => stats.skipped += 1,
                Outcome::Failed { .. } => stats.failed += 1,
            }
        }

        match &outcome {
            Outcome::Renamed { target, .. } => {
                info!("Renamed {} -> {}", path.display(), target.display())
            }
            Outcome::Skipped { reason } => info!("Skipped {}: {}", path.display(), reason),
            Outcome::Failed { reason } => error!("Failed to rename {}: {}", path.display(), reason),
        }

        if let Err(e) = self
            .outcomes
            .send(FileOutcome::new(path, outcome, descriptor))
        {
            debug!("No outcome receiver, dropping outcome for {}", e.0.path.display());
        }
    }
}

/// Submit every accepted file under the root as a `Created` event
fn scan_existing(filter: &PathFilter, debouncer: &DebouncerHandle) -> usize {
    let mut walker = WalkBuilder::new(filter.root());
    walker.standard_filters(false).follow_links(false);
    if !filter.is_recursive() {
        walker.max_depth(Some(1));
    }

    let mut submitted = 0;
    for entry in walker.build() {
        match entry {
            Ok(entry) => {
                let is_file = entry.file_type().is_some_and(|t| t.is_file());
                if is_file && filter.accept(entry.path()) {
                    debouncer.submit(RawEvent::created(entry.path()));
                    submitted += 1;
                }
            }
            Err(e) => warn!("Initial scan error: {}", e),
        }
    }
    submitted
}

/// The running pipeline
pub struct Orchestrator {
    config: WatchConfig,
    filter: Arc<PathFilter>,
    engine: Arc<RenameEngine>,
    improver: Arc<dyn ConfidenceImprover>,
    stats: Arc<RwLock<ProcessingStats>>,
    outcomes_tx: mpsc::UnboundedSender<FileOutcome>,
    outcomes_rx: Option<mpsc::UnboundedReceiver<FileOutcome>>,
    debouncer: Option<(DebouncerHandle, JoinHandle<()>)>,
    workers: Vec<JoinHandle<()>>,
    watcher: Option<FsWatcher>,
}

impl Orchestrator {
    /// Validate `config` and build the improver it describes.
    ///
    /// Nothing runs until [`start`](Self::start) is called.
    pub fn new(config: WatchConfig) -> Result<Self> {
        let improver = improver_from_config(&config.inference)?;
        Self::with_improver(config, improver)
    }

    /// Like [`new`](Self::new) but with a caller-supplied improver
    pub fn with_improver(
        mut config: WatchConfig,
        improver: Arc<dyn ConfidenceImprover>,
    ) -> Result<Self> {
        config.validate()?;
        config.monitor_path = config.monitor_path.canonicalize().with_context(|| {
            format!("Failed to resolve {}", config.monitor_path.display())
        })?;

        let filter = Arc::new(PathFilter::from_config(&config.monitor_path, &config));
        let engine = Arc::new(RenameEngine::new(config.max_collision_attempts));
        let (outcomes_tx, outcomes_rx) = mpsc::unbounded_channel();

        Ok(Self {
            config,
            filter,
            engine,
            improver,
            stats: Arc::new(RwLock::new(ProcessingStats::default())),
            outcomes_tx,
            outcomes_rx: Some(outcomes_rx),
            debouncer: None,
            workers: Vec::new(),
            watcher: None,
        })
    }

    /// The canonical monitored root
    pub fn root(&self) -> &Path {
        &self.config.monitor_path
    }

    pub fn config(&self) -> &WatchConfig {
        &self.config
    }

    /// Take the receiving end of the outcome channel. Only the first call
    /// gets it.
    pub fn take_outcomes(&mut self) -> Option<mpsc::UnboundedReceiver<FileOutcome>> {
        self.outcomes_rx.take()
    }

    /// Spawn the debouncer and workers, start watching, and optionally
    /// submit the files already present.
    pub async fn start(&mut self) -> Result<()> {
        if self.debouncer.is_some() {
            return Ok(());
        }

        let (debouncer, debouncer_task) = DebouncerHandle::spawn(self.config.quiet_interval());
        let worker = Arc::new(Worker {
            debouncer: debouncer.clone(),
            engine: Arc::clone(&self.engine),
            improver: Arc::clone(&self.improver),
            root: self.config.monitor_path.clone(),
            threshold: self.config.confidence_threshold,
            stats: Arc::clone(&self.stats),
            outcomes: self.outcomes_tx.clone(),
        });
        for id in 0..self.config.max_workers {
            self.workers.push(tokio::spawn(Arc::clone(&worker).run(id)));
        }
        self.debouncer = Some((debouncer.clone(), debouncer_task));

        self.watcher = Some(FsWatcher::start(Arc::clone(&self.filter), debouncer.clone())?);
        info!(
            "Watching {} with {} workers (quiet interval {:?})",
            self.root().display(),
            self.config.max_workers,
            self.config.quiet_interval()
        );

        if self.config.scan_existing {
            let filter = Arc::clone(&self.filter);
            let submitted =
                tokio::task::spawn_blocking(move || scan_existing(&filter, &debouncer)).await?;
            info!("Initial scan submitted {} files", submitted);
        }
        Ok(())
    }

    /// Feed an event through the filter into the debouncer.
    ///
    /// Returns whether the event was accepted. Events before
    /// [`start`](Self::start) are dropped.
    pub fn submit(&self, event: RawEvent) -> bool {
        let Some((debouncer, _)) = &self.debouncer else {
            return false;
        };
        let accepted = match event.kind {
            EventKind::Deleted => self.filter.matches_path(&event.path),
            _ => self.filter.accept(&event.path),
        };
        if accepted {
            debouncer.submit(event);
        }
        accepted
    }

    pub async fn stats(&self) -> ProcessingStats {
        self.stats.read().await.clone()
    }

    pub async fn debouncer_stats(&self) -> Option<DebouncerStats> {
        match &self.debouncer {
            Some((debouncer, _)) => debouncer.stats().await,
            None => None,
        }
    }

    /// Stop watching, stop the debouncer and wait for the workers.
    ///
    /// Files being processed finish; files still settling are dropped.
    pub async fn shutdown(&mut self) -> Result<()> {
        info!("Shutting down pipeline for {}", self.root().display());
        self.watcher = None;

        if let Some((debouncer, task)) = self.debouncer.take() {
            debouncer.shutdown();
            if let Err(e) = task.await {
                warn!("Debouncer task ended abnormally: {}", e);
            }
        }

        for result in futures::future::join_all(self.workers.drain(..)).await {
            if let Err(e) = result {
                warn!("Rename worker ended abnormally: {}", e);
            }
        }

        info!("Pipeline shutdown complete");
        Ok(())
    }
}
