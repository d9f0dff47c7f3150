//! Canonical naming, collision resolution and the rename itself.
//!
//! Naming and collision handling are pure: [`RenameEngine::plan`] takes the
//! descriptor and a snapshot of the directory listing and returns a
//! [`RenamePlan`]. [`RenameEngine::execute`] re-reads the listing, plans,
//! and moves the file by linking the new name and unlinking the old one, so
//! an existing file is never replaced.

use reelname_parse::{MediaDescriptor, MediaKind};
use serde::Serialize;
use std::collections::HashSet;
use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Default number of ` (n)` suffixes tried before giving up
pub const DEFAULT_COLLISION_ATTEMPTS: u32 = 99;

/// Times a move is re-planned when its target appears between planning and
/// the rename
const OCCUPIED_RETRIES: u32 = 3;

/// `EXDEV` on Linux and macOS
const EXDEV: i32 = 18;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RenameStrategy {
    /// The canonical name itself, or the file already has its final name
    Direct,
    /// The canonical name with a ` (n)` suffix
    Suffixed,
    /// Nothing to rename to
    Skip,
}

/// Where a file should go. Computed fresh for every attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenamePlan {
    pub source: PathBuf,
    pub target: PathBuf,
    pub strategy: RenameStrategy,
}

impl RenamePlan {
    /// Whether executing this plan leaves the filesystem untouched
    pub fn is_noop(&self) -> bool {
        self.strategy == RenameStrategy::Skip || self.source == self.target
    }
}

#[derive(Debug, thiserror::Error)]
pub enum RenameError {
    #[error("No free name for {} after {attempts} attempts", target.display())]
    CollisionUnresolvable { target: PathBuf, attempts: u32 },

    #[error("Permission denied moving to {}: {source}", path.display())]
    FilesystemPermission {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot move {} across filesystems", path.display())]
    CrossDevice { path: PathBuf },

    #[error("{} no longer exists", path.display())]
    TargetMissing { path: PathBuf },

    #[error("I/O error moving {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl RenameError {
    fn from_io(path: &Path, source: io::Error) -> Self {
        let path = path.to_path_buf();
        if source.kind() == io::ErrorKind::CrossesDevices || source.raw_os_error() == Some(EXDEV) {
            return Self::CrossDevice { path };
        }
        match source.kind() {
            io::ErrorKind::PermissionDenied => Self::FilesystemPermission { path, source },
            io::ErrorKind::NotFound => Self::TargetMissing { path },
            _ => Self::Io { path, source },
        }
    }
}

fn sanitize(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|'))
        .filter(|c| !c.is_control())
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// The canonical file stem for a descriptor, without extension.
///
/// `Title(Year) - S01E02 - 1080p` for episodes and `Title(Year) - 1080p`
/// for movies, leaving out whatever is unknown. Episodes without a season
/// and episode number are named like movies. `None` when there is nothing
/// to name the file after.
pub fn canonical_stem(descriptor: &MediaDescriptor) -> Option<String> {
    if descriptor.kind == MediaKind::Unknown {
        return None;
    }
    let title = sanitize(&descriptor.title);
    if title.is_empty() {
        return None;
    }

    let mut stem = title;
    if let Some(year) = descriptor.year {
        stem.push_str(&format!("({year})"));
    }
    if let (MediaKind::TvEpisode, Some(season), Some(episode)) =
        (descriptor.kind, descriptor.season, descriptor.episode)
    {
        stem.push_str(&format!(" - S{season:02}E{episode:02}"));
    }
    if let Some(resolution) = descriptor.resolution.as_deref().map(sanitize) {
        if !resolution.is_empty() {
            stem.push_str(" - ");
            stem.push_str(&resolution);
        }
    }
    Some(stem)
}

fn candidate_name(stem: &str, attempt: u32, extension: Option<&OsStr>) -> OsString {
    let mut name = OsString::from(stem);
    if attempt > 1 {
        name.push(format!(" ({attempt})"));
    }
    if let Some(extension) = extension {
        name.push(".");
        name.push(extension);
    }
    name
}

/// Names of the entries in `dir`
pub fn read_listing(dir: &Path) -> Result<HashSet<OsString>, RenameError> {
    let entries = std::fs::read_dir(dir).map_err(|e| RenameError::from_io(dir, e))?;
    let mut names = HashSet::new();
    for entry in entries {
        let entry = entry.map_err(|e| RenameError::from_io(dir, e))?;
        names.insert(entry.file_name());
    }
    Ok(names)
}

/// Plans and performs renames
#[derive(Debug)]
pub struct RenameEngine {
    max_collision_attempts: u32,
    /// Targets chosen by a move that has not finished yet
    reserved: Mutex<HashSet<PathBuf>>,
}

impl Default for RenameEngine {
    fn default() -> Self {
        Self::new(DEFAULT_COLLISION_ATTEMPTS)
    }
}

impl RenameEngine {
    pub fn new(max_collision_attempts: u32) -> Self {
        Self {
            max_collision_attempts,
            reserved: Mutex::new(HashSet::new()),
        }
    }

    /// Compute where `source` should go, given the names already present in
    /// its directory. Does not touch the filesystem.
    pub fn plan(
        &self,
        source: &Path,
        descriptor: &MediaDescriptor,
        listing: &HashSet<OsString>,
    ) -> Result<RenamePlan, RenameError> {
        let skip = || RenamePlan {
            source: source.to_path_buf(),
            target: source.to_path_buf(),
            strategy: RenameStrategy::Skip,
        };
        let (Some(stem), Some(file_name)) = (canonical_stem(descriptor), source.file_name())
        else {
            return Ok(skip());
        };

        let dir = source.parent().unwrap_or_else(|| Path::new(""));
        let extension = source.extension();
        let last_attempt = self.max_collision_attempts.saturating_add(1);

        for attempt in 1..=last_attempt {
            let name = candidate_name(&stem, attempt, extension);
            if name == file_name {
                // Already carries this name; re-evaluating must not move it
                return Ok(RenamePlan {
                    source: source.to_path_buf(),
                    target: source.to_path_buf(),
                    strategy: RenameStrategy::Direct,
                });
            }
            if !listing.contains(&name) {
                return Ok(RenamePlan {
                    source: source.to_path_buf(),
                    target: dir.join(name),
                    strategy: if attempt == 1 {
                        RenameStrategy::Direct
                    } else {
                        RenameStrategy::Suffixed
                    },
                });
            }
        }

        Err(RenameError::CollisionUnresolvable {
            target: dir.join(candidate_name(&stem, 1, extension)),
            attempts: self.max_collision_attempts,
        })
    }

    /// Plan against a fresh listing and move the file.
    ///
    /// Blocking; use [`RenameEngine::rename`] from async code. The source is
    /// untouched unless the returned plan is a real move.
    pub fn execute(
        &self,
        source: &Path,
        descriptor: &MediaDescriptor,
    ) -> Result<RenamePlan, RenameError> {
        let dir = source.parent().ok_or_else(|| RenameError::TargetMissing {
            path: source.to_path_buf(),
        })?;

        let mut retries = 0;
        loop {
            let plan = {
                let mut reserved = self.reserved.lock().unwrap_or_else(|e| e.into_inner());
                let mut listing = read_listing(dir)?;
                listing.extend(
                    reserved
                        .iter()
                        .filter(|target| target.parent() == Some(dir))
                        .filter_map(|target| target.file_name().map(OsStr::to_os_string)),
                );
                let plan = self.plan(source, descriptor, &listing)?;
                if plan.is_noop() {
                    return Ok(plan);
                }
                reserved.insert(plan.target.clone());
                plan
            };

            let moved = move_no_clobber(&plan.source, &plan.target);
            self.reserved
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .remove(&plan.target);

            match moved {
                Ok(()) => return Ok(plan),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                    if retries >= OCCUPIED_RETRIES {
                        return Err(RenameError::CollisionUnresolvable {
                            target: plan.target,
                            attempts: self.max_collision_attempts,
                        });
                    }
                    debug!("{} appeared before the move, re-planning", plan.target.display());
                    retries += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound && !source.exists() => {
                    return Err(RenameError::TargetMissing {
                        path: source.to_path_buf(),
                    });
                }
                Err(e) => return Err(RenameError::from_io(&plan.target, e)),
            }
        }
    }

    /// [`RenameEngine::execute`] on the blocking pool
    pub async fn rename(
        self: &Arc<Self>,
        source: PathBuf,
        descriptor: MediaDescriptor,
    ) -> Result<RenamePlan, RenameError> {
        let engine = Arc::clone(self);
        let path = source.clone();
        tokio::task::spawn_blocking(move || engine.execute(&source, &descriptor))
            .await
            .map_err(|e| RenameError::Io {
                path,
                source: io::Error::other(e),
            })?
    }
}

/// Move `source` to `target`, failing with `AlreadyExists` rather than
/// replacing anything.
///
/// Linking the new name first makes the existence check and the move one
/// atomic step. Filesystems without hard links fall back to a checked
/// `rename`.
fn move_no_clobber(source: &Path, target: &Path) -> io::Result<()> {
    match std::fs::hard_link(source, target) {
        Ok(()) => {
            if let Err(e) = std::fs::remove_file(source) {
                // Leave the source as it was
                let _ = std::fs::remove_file(target);
                return Err(e);
            }
            Ok(())
        }
        Err(e) if matches!(e.kind(), io::ErrorKind::AlreadyExists | io::ErrorKind::NotFound) => {
            Err(e)
        }
        Err(e) => {
            debug!("Hard link to {} failed ({}), using rename", target.display(), e);
            if std::fs::symlink_metadata(target).is_ok() {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    "target already exists",
                ));
            }
            std::fs::rename(source, target)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelname_parse::parse;
    use tempfile::tempdir;

    fn listing(names: &[&str]) -> HashSet<OsString> {
        names.iter().map(OsString::from).collect()
    }

    fn movie(title: &str, year: u16, resolution: &str) -> MediaDescriptor {
        MediaDescriptor::movie(title, Some(year)).with_resolution(Some(resolution.to_string()))
    }

    #[test]
    fn test_canonical_stems() {
        let d = parse("the.matrix.1999.1080p.BluRay.x264-GROUP.mkv");
        assert_eq!(canonical_stem(&d).as_deref(), Some("the matrix(1999) - 1080p"));

        let d = parse("Game.of.Thrones.S01E01.1080p.mp4");
        assert_eq!(
            canonical_stem(&d).as_deref(),
            Some("Game of Thrones - S01E01 - 1080p")
        );

        let d = MediaDescriptor::episode("Show", 2, 13).with_year(Some(2019));
        assert_eq!(canonical_stem(&d).as_deref(), Some("Show(2019) - S02E13"));

        let d = MediaDescriptor::movie("Heat", None);
        assert_eq!(canonical_stem(&d).as_deref(), Some("Heat"));
    }

    #[test]
    fn test_episode_without_numbers_is_named_like_a_movie() {
        let mut d = MediaDescriptor::episode("Show", 1, 1).with_year(Some(2020));
        d.episode = None;
        assert_eq!(canonical_stem(&d).as_deref(), Some("Show(2020)"));
    }

    #[test]
    fn test_unknown_and_unusable_titles_skip() {
        assert_eq!(canonical_stem(&parse("asdkjasd.mkv")), None);
        assert_eq!(canonical_stem(&MediaDescriptor::movie("???", Some(2000))), None);
        assert_eq!(
            canonical_stem(&MediaDescriptor::movie("AC/DC: Live*", Some(1991))).as_deref(),
            Some("ACDC Live(1991)")
        );
    }

    #[test]
    fn test_plan_direct() {
        let engine = RenameEngine::default();
        let source = Path::new("/in/the.matrix.1999.1080p.BluRay.x264-GROUP.mkv");
        let d = parse("the.matrix.1999.1080p.BluRay.x264-GROUP.mkv");

        let plan = engine
            .plan(source, &d, &listing(&["the.matrix.1999.1080p.BluRay.x264-GROUP.mkv"]))
            .unwrap();
        assert_eq!(plan.strategy, RenameStrategy::Direct);
        assert_eq!(plan.target, Path::new("/in/the matrix(1999) - 1080p.mkv"));
        assert!(!plan.is_noop());
    }

    #[test]
    fn test_plan_collision_suffix() {
        let engine = RenameEngine::default();
        let source = Path::new("/in/Movie.2000.1080p.mkv");
        let d = movie("Movie", 2000, "1080p");

        let plan = engine
            .plan(
                source,
                &d,
                &listing(&["Movie.2000.1080p.mkv", "Movie(2000) - 1080p.mkv"]),
            )
            .unwrap();
        assert_eq!(plan.strategy, RenameStrategy::Suffixed);
        assert_eq!(plan.target, Path::new("/in/Movie(2000) - 1080p (2).mkv"));
    }

    #[test]
    fn test_plan_collision_cap() {
        let engine = RenameEngine::new(2);
        let source = Path::new("/in/Movie.2000.1080p.mkv");
        let d = movie("Movie", 2000, "1080p");
        let taken = listing(&[
            "Movie(2000) - 1080p.mkv",
            "Movie(2000) - 1080p (2).mkv",
            "Movie(2000) - 1080p (3).mkv",
        ]);

        let err = engine.plan(source, &d, &taken).unwrap_err();
        assert!(matches!(
            err,
            RenameError::CollisionUnresolvable { attempts: 2, .. }
        ));
    }

    #[test]
    fn test_plan_is_idempotent_for_canonical_names() {
        let engine = RenameEngine::default();
        for name in [
            "the matrix(1999) - 1080p.mkv",
            "Game of Thrones - S01E01 - 1080p.mp4",
        ] {
            let source = PathBuf::from("/in").join(name);
            let plan = engine.plan(&source, &parse(name), &listing(&[name])).unwrap();
            assert_eq!(plan.strategy, RenameStrategy::Direct, "{name}");
            assert!(plan.is_noop(), "{name}");
        }

        // A suffixed copy stays where it is while the plain name is taken
        let source = Path::new("/in/Movie(2000) - 1080p (2).mkv");
        let plan = engine
            .plan(
                source,
                &movie("Movie", 2000, "1080p"),
                &listing(&["Movie(2000) - 1080p.mkv", "Movie(2000) - 1080p (2).mkv"]),
            )
            .unwrap();
        assert!(plan.is_noop());
    }

    #[test]
    fn test_plan_keeps_extension_as_found() {
        let engine = RenameEngine::default();
        let plan = engine
            .plan(
                Path::new("/in/heat.1995.MKV"),
                &MediaDescriptor::movie("heat", Some(1995)),
                &listing(&[]),
            )
            .unwrap();
        assert_eq!(plan.target, Path::new("/in/heat(1995).MKV"));
    }

    #[test]
    fn test_plan_skip() {
        let engine = RenameEngine::default();
        let source = Path::new("/in/asdkjasd.mkv");
        let plan = engine.plan(source, &parse("asdkjasd.mkv"), &listing(&[])).unwrap();
        assert_eq!(plan.strategy, RenameStrategy::Skip);
        assert_eq!(plan.target, source);
    }

    #[test]
    fn test_execute_moves_file() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let source = dir.path().join("the.matrix.1999.1080p.BluRay.x264-GROUP.mkv");
        std::fs::write(&source, b"frames")?;

        let engine = RenameEngine::default();
        let plan = engine.execute(&source, &parse("the.matrix.1999.1080p.BluRay.x264-GROUP.mkv"))?;

        assert_eq!(plan.target, dir.path().join("the matrix(1999) - 1080p.mkv"));
        assert!(!source.exists());
        assert_eq!(std::fs::read(&plan.target)?, b"frames");
        Ok(())
    }

    #[test]
    fn test_execute_never_overwrites() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let occupied = dir.path().join("Movie(2000) - 1080p.mkv");
        std::fs::write(&occupied, b"original")?;
        let source = dir.path().join("Movie.2000.1080p.WEB-DL.mkv");
        std::fs::write(&source, b"newcomer")?;

        let plan = RenameEngine::default().execute(&source, &movie("Movie", 2000, "1080p"))?;

        assert_eq!(plan.strategy, RenameStrategy::Suffixed);
        assert_eq!(std::fs::read(&occupied)?, b"original");
        assert_eq!(
            std::fs::read(dir.path().join("Movie(2000) - 1080p (2).mkv"))?,
            b"newcomer"
        );
        Ok(())
    }

    #[test]
    fn test_move_no_clobber_refuses_existing_target() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let source = dir.path().join("a.mkv");
        let target = dir.path().join("b.mkv");
        std::fs::write(&source, b"source")?;
        std::fs::write(&target, b"someone else")?;

        let err = move_no_clobber(&source, &target).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read(&source)?, b"source");
        assert_eq!(std::fs::read(&target)?, b"someone else");

        std::fs::remove_file(&target)?;
        move_no_clobber(&source, &target)?;
        assert!(!source.exists());
        assert_eq!(std::fs::read(&target)?, b"source");
        Ok(())
    }

    #[test]
    fn test_execute_missing_source() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let source = dir.path().join("Heat.1995.mkv");

        let err = RenameEngine::default()
            .execute(&source, &MediaDescriptor::movie("Heat", Some(1995)))
            .unwrap_err();
        assert!(matches!(err, RenameError::TargetMissing { .. }));
        Ok(())
    }

    #[test]
    fn test_concurrent_moves_pick_distinct_names() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let engine = Arc::new(RenameEngine::default());
        let d = movie("Movie", 2000, "1080p");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let source = dir.path().join(format!("copy{i}.mkv"));
                std::fs::write(&source, format!("{i}")).unwrap();
                let engine = Arc::clone(&engine);
                let d = d.clone();
                std::thread::spawn(move || engine.execute(&source, &d))
            })
            .collect();

        let mut targets = HashSet::new();
        for handle in handles {
            let plan = handle.join().unwrap()?;
            assert!(targets.insert(plan.target));
        }
        assert_eq!(targets.len(), 8);
        assert_eq!(std::fs::read_dir(dir.path())?.count(), 8);
        Ok(())
    }

    #[test]
    fn test_io_error_mapping() {
        let path = Path::new("/in/x.mkv");
        let denied = io::Error::from(io::ErrorKind::PermissionDenied);
        assert!(matches!(
            RenameError::from_io(path, denied),
            RenameError::FilesystemPermission { .. }
        ));
        let exdev = io::Error::from_raw_os_error(EXDEV);
        assert!(matches!(
            RenameError::from_io(path, exdev),
            RenameError::CrossDevice { .. }
        ));
    }

    #[tokio::test]
    async fn test_async_rename() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let source = dir.path().join("Game.of.Thrones.S01E01.1080p.mp4");
        std::fs::write(&source, b"frames")?;

        let engine = Arc::new(RenameEngine::default());
        let plan = engine
            .rename(source, parse("Game.of.Thrones.S01E01.1080p.mp4"))
            .await?;
        assert_eq!(
            plan.target,
            dir.path().join("Game of Thrones - S01E01 - 1080p.mp4")
        );
        assert!(plan.target.exists());
        Ok(())
    }
}
