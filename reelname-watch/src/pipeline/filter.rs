use crate::config::WatchConfig;
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

/// Directory names created by NAS and desktop systems that never hold media
pub const SYSTEM_ENTRIES: &[&str] = &[
    "$recycle.bin",
    "system volume information",
    "@eadir",
    "#recycle",
    "lost+found",
];

/// Decides whether a path is an in-scope media file
#[derive(Debug, Clone)]
pub struct PathFilter {
    root: PathBuf,
    extensions: HashSet<String>,
    exclude_dirs: HashSet<String>,
    recursive: bool,
}

impl PathFilter {
    pub fn new<S: AsRef<str>>(
        root: impl Into<PathBuf>,
        extensions: &[S],
        exclude_dirs: &[S],
        recursive: bool,
    ) -> Self {
        let extensions = extensions
            .iter()
            .map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        let exclude_dirs = exclude_dirs
            .iter()
            .map(|d| d.as_ref().trim().to_lowercase())
            .filter(|d| !d.is_empty())
            .collect();
        Self {
            root: root.into(),
            extensions,
            exclude_dirs,
            recursive,
        }
    }

    /// Build a filter for `root`, which should be the canonical form of
    /// `config.monitor_path`
    pub fn from_config(root: impl Into<PathBuf>, config: &WatchConfig) -> Self {
        Self::new(
            root,
            &config.media_extensions,
            &config.exclude_dirs,
            config.recursive,
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_recursive(&self) -> bool {
        self.recursive
    }

    /// Check everything that can be decided from the path alone.
    ///
    /// Used directly for deletions, where the path no longer exists.
    pub fn matches_path(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.root) else {
            return false;
        };

        let mut names = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(name) => match name.to_str() {
                    Some(name) => names.push(name),
                    None => return false,
                },
                Component::CurDir => {}
                _ => return false,
            }
        }

        let Some((file_name, dirs)) = names.split_last() else {
            return false;
        };
        if !self.recursive && !dirs.is_empty() {
            return false;
        }
        if names.iter().any(|name| is_hidden_or_system(name)) {
            return false;
        }
        if dirs
            .iter()
            .any(|dir| self.exclude_dirs.contains(&dir.to_lowercase()))
        {
            return false;
        }

        Path::new(file_name)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext.to_lowercase()))
    }

    /// Whether `path` is a media file the pipeline should handle
    pub fn accept(&self, path: &Path) -> bool {
        self.matches_path(path) && !path.is_dir()
    }
}

fn is_hidden_or_system(name: &str) -> bool {
    name.starts_with('.') || SYSTEM_ENTRIES.contains(&name.to_lowercase().as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn filter(recursive: bool) -> PathFilter {
        PathFilter::new(
            "/media/in",
            &["mkv", ".MP4", " avi "],
            &["Incomplete"],
            recursive,
        )
    }

    #[test]
    fn test_extension_allow_list() {
        let f = filter(true);
        assert!(f.matches_path(Path::new("/media/in/Heat.1995.mkv")));
        assert!(f.matches_path(Path::new("/media/in/Heat.1995.MKV")));
        assert!(f.matches_path(Path::new("/media/in/Heat.1995.mp4")));
        assert!(f.matches_path(Path::new("/media/in/Heat.1995.avi")));
        assert!(!f.matches_path(Path::new("/media/in/Heat.1995.nfo")));
        assert!(!f.matches_path(Path::new("/media/in/Heat.1995.mkv.part")));
        assert!(!f.matches_path(Path::new("/media/in/README")));
    }

    #[test]
    fn test_hidden_and_system_entries() {
        let f = filter(true);
        assert!(!f.matches_path(Path::new("/media/in/.Heat.mkv")));
        assert!(!f.matches_path(Path::new("/media/in/.cache/Heat.mkv")));
        assert!(!f.matches_path(Path::new("/media/in/@eaDir/Heat.mkv")));
        assert!(!f.matches_path(Path::new("/media/in/$RECYCLE.BIN/Heat.mkv")));
        assert!(!f.matches_path(Path::new("/media/in/incomplete/Heat.mkv")));
        // Hidden directories above the root do not count
        let f = PathFilter::new("/home/me/.local/media", &["mkv"], &[] as &[&str], true);
        assert!(f.matches_path(Path::new("/home/me/.local/media/Heat.mkv")));
    }

    #[test]
    fn test_recursion_flag() {
        assert!(filter(true).matches_path(Path::new("/media/in/Heat (1995)/Heat.mkv")));
        assert!(!filter(false).matches_path(Path::new("/media/in/Heat (1995)/Heat.mkv")));
        assert!(filter(false).matches_path(Path::new("/media/in/Heat.mkv")));
    }

    #[test]
    fn test_paths_outside_root_or_malformed() {
        let f = filter(true);
        assert!(!f.matches_path(Path::new("/media/other/Heat.mkv")));
        assert!(!f.matches_path(Path::new("/media/in/../other/Heat.mkv")));
        assert!(!f.matches_path(Path::new("/media/in")));
        assert!(!f.matches_path(Path::new("Heat.mkv")));
    }

    #[test]
    fn test_directories_are_rejected() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let f = PathFilter::new(dir.path(), &["mkv"], &[] as &[&str], true);

        let folder = dir.path().join("Season.mkv");
        std::fs::create_dir(&folder)?;
        let file = dir.path().join("Heat.mkv");
        std::fs::write(&file, b"x")?;

        assert!(!f.accept(&folder));
        assert!(f.accept(&file));
        // Deleted paths can still be matched by name
        assert!(f.matches_path(&dir.path().join("gone.mkv")));
        Ok(())
    }

    #[test]
    fn test_from_config() {
        let config = WatchConfig::new("/media/in")
            .with_recursive(false)
            .with_exclude_dirs(["tmp"]);
        let f = PathFilter::from_config("/media/in", &config);
        assert!(f.matches_path(Path::new("/media/in/a.webm")));
        assert!(!f.matches_path(Path::new("/media/in/tmp/a.webm")));
    }
}
