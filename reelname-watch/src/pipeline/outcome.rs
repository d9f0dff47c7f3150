use super::rename_engine::RenameStrategy;
use chrono::{DateTime, Utc};
use reelname_parse::MediaDescriptor;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Why a file was left alone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Neither the rules nor the fallback recognised the name
    UnrecognizedName,
    /// The file already has its canonical name
    AlreadyNamed,
    /// The file was deleted or moved away before it could be renamed
    SourceVanished,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::UnrecognizedName => "unrecognized name",
            Self::AlreadyNamed => "already named",
            Self::SourceVanished => "source vanished",
        })
    }
}

/// Terminal result of processing one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    Renamed {
        target: PathBuf,
        strategy: RenameStrategy,
    },
    Skipped {
        reason: SkipReason,
    },
    Failed {
        reason: String,
    },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Renamed { target, .. } => write!(f, "renamed to {}", target.display()),
            Self::Skipped { reason } => write!(f, "skipped ({reason})"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
        }
    }
}

/// What happened to one file, as reported to the outcome channel
#[derive(Debug, Clone, Serialize)]
pub struct FileOutcome {
    pub path: PathBuf,
    pub outcome: Outcome,
    /// The descriptor the decision was based on, if parsing got that far
    pub descriptor: Option<MediaDescriptor>,
    pub finished_at: DateTime<Utc>,
}

impl FileOutcome {
    pub fn new(path: PathBuf, outcome: Outcome, descriptor: Option<MediaDescriptor>) -> Self {
        Self {
            path,
            outcome,
            descriptor,
            finished_at: Utc::now(),
        }
    }

    pub fn is_renamed(&self) -> bool {
        matches!(self.outcome, Outcome::Renamed { .. })
    }
}

impl fmt::Display for FileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.outcome)
    }
}
