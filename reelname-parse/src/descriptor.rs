use serde::{Deserialize, Serialize};

/// Confidence assigned when a TV marker, season, episode and title are all present.
pub const TV_FULL_CONFIDENCE: f32 = 0.9;
/// Confidence for a TV marker with a missing title or an inferred season.
pub const TV_PARTIAL_CONFIDENCE: f32 = 0.6;
/// Confidence for a movie with both year and title.
pub const MOVIE_FULL_CONFIDENCE: f32 = 0.8;
/// Confidence for a movie with only one of year or title.
pub const MOVIE_PARTIAL_CONFIDENCE: f32 = 0.5;
/// Confidence when no structure was recognized at all.
pub const UNKNOWN_CONFIDENCE: f32 = 0.1;

/// What kind of media a filename describes
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    /// A feature film
    Movie,
    /// A single episode of a series
    TvEpisode,
    /// Nothing recognizable
    #[default]
    Unknown,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Movie => write!(f, "movie"),
            MediaKind::TvEpisode => write!(f, "tv_episode"),
            MediaKind::Unknown => write!(f, "unknown"),
        }
    }
}

impl std::str::FromStr for MediaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "movie" | "film" => Ok(MediaKind::Movie),
            "tv" | "tv_episode" | "tv-episode" | "episode" | "series" | "show" => {
                Ok(MediaKind::TvEpisode)
            }
            "unknown" | "" => Ok(MediaKind::Unknown),
            _ => Err(format!(
                "Invalid media kind: '{s}'. Valid values are: movie, tv, unknown"
            )),
        }
    }
}

/// Structured metadata extracted from a filename.
///
/// Descriptors are plain values: once produced they are never mutated in
/// place, only rebuilt through the `with_*` methods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaDescriptor {
    pub kind: MediaKind,
    pub title: String,
    pub year: Option<u16>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub resolution: Option<String>,
    /// Always within `[0, 1]`
    pub confidence: f32,
}

impl MediaDescriptor {
    /// A descriptor for a filename with no recognizable structure
    pub fn unknown(title: impl Into<String>) -> Self {
        Self {
            kind: MediaKind::Unknown,
            title: title.into(),
            year: None,
            season: None,
            episode: None,
            resolution: None,
            confidence: UNKNOWN_CONFIDENCE,
        }
    }

    pub fn movie(title: impl Into<String>, year: Option<u16>) -> Self {
        let title = title.into();
        let confidence = if year.is_some() && !title.is_empty() {
            MOVIE_FULL_CONFIDENCE
        } else {
            MOVIE_PARTIAL_CONFIDENCE
        };
        Self {
            kind: MediaKind::Movie,
            title,
            year,
            season: None,
            episode: None,
            resolution: None,
            confidence,
        }
    }

    pub fn episode(title: impl Into<String>, season: u32, episode: u32) -> Self {
        let title = title.into();
        let confidence = if title.is_empty() {
            TV_PARTIAL_CONFIDENCE
        } else {
            TV_FULL_CONFIDENCE
        };
        Self {
            kind: MediaKind::TvEpisode,
            title,
            year: None,
            season: Some(season),
            episode: Some(episode),
            resolution: None,
            confidence,
        }
    }

    pub fn with_year(mut self, year: Option<u16>) -> Self {
        self.year = year;
        self
    }

    pub fn with_resolution(mut self, resolution: Option<String>) -> Self {
        self.resolution = resolution;
        self
    }

    /// Replace the confidence, clamping into `[0, 1]`. NaN becomes 0.
    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = if confidence.is_nan() {
            0.0
        } else {
            confidence.clamp(0.0, 1.0)
        };
        self
    }

    /// Whether this descriptor clears the given confidence threshold
    pub fn is_confident(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }

    /// Whether the descriptor carries enough to build an episode name
    pub fn has_episode_marker(&self) -> bool {
        self.kind == MediaKind::TvEpisode && self.season.is_some() && self.episode.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_assign_confidence() {
        assert_eq!(
            MediaDescriptor::movie("Heat", Some(1995)).confidence,
            MOVIE_FULL_CONFIDENCE
        );
        assert_eq!(
            MediaDescriptor::movie("Heat", None).confidence,
            MOVIE_PARTIAL_CONFIDENCE
        );
        assert_eq!(
            MediaDescriptor::episode("Lost", 1, 2).confidence,
            TV_FULL_CONFIDENCE
        );
        assert_eq!(
            MediaDescriptor::episode("", 1, 2).confidence,
            TV_PARTIAL_CONFIDENCE
        );
        assert_eq!(MediaDescriptor::unknown("x").confidence, UNKNOWN_CONFIDENCE);
    }

    #[test]
    fn test_with_confidence_clamps() {
        let d = MediaDescriptor::unknown("x").with_confidence(3.5);
        assert_eq!(d.confidence, 1.0);
        let d = MediaDescriptor::unknown("x").with_confidence(-1.0);
        assert_eq!(d.confidence, 0.0);
        let d = MediaDescriptor::unknown("x").with_confidence(f32::NAN);
        assert_eq!(d.confidence, 0.0);
    }

    #[test]
    fn test_kind_from_str() {
        assert_eq!("Movie".parse::<MediaKind>().unwrap(), MediaKind::Movie);
        assert_eq!("tv".parse::<MediaKind>().unwrap(), MediaKind::TvEpisode);
        assert_eq!("SERIES".parse::<MediaKind>().unwrap(), MediaKind::TvEpisode);
        assert_eq!("".parse::<MediaKind>().unwrap(), MediaKind::Unknown);
        assert!("documentary".parse::<MediaKind>().is_err());
    }

    #[test]
    fn test_default_kind_is_unknown() {
        assert_eq!(MediaKind::default(), MediaKind::Unknown);
    }

    #[test]
    fn test_serialized_kind_names() {
        let json = serde_json::to_string(&MediaKind::TvEpisode).unwrap();
        assert_eq!(json, "\"tv_episode\"");
    }
}
