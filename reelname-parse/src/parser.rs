//! Rule reducer and title cleaning.

use crate::descriptor::{MediaDescriptor, MediaKind, TV_FULL_CONFIDENCE, TV_PARTIAL_CONFIDENCE};
use crate::rules::{PartialMatch, Rule, RuleClass};
use crate::tokens::find_resolution;
use regex::Regex;
use std::sync::LazyLock;

/// Extensions stripped by [`parse`] before the stem is examined
pub const KNOWN_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "mov", "wmv", "flv", "webm", "m4v", "ts", "m2ts", "rmvb", "rm", "mpg",
    "mpeg", "iso", "vob", "3gp", "srt", "ass", "ssa", "sub", "nfo",
];

static BRACKETED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[[^\]]*\]|\([^)]*\)|\{[^}]*\}|【[^】]*】").expect("bracket pattern")
});

static SEPARATOR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[._\-\[\](){}【】《》\s]+").expect("separator pattern"));

static CONTEXT_EPISODE_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)(?:^|[^0-9a-z])ep?[ ._-]?(\d{1,3})(?:[^0-9a-z]|$)",
        r"第\s*(\d{1,4})\s*[集话話]",
        r"[\[(（](\d{1,3})[\])）]",
        r"(?:^|[^0-9])(\d{2,3})$",
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("episode context pattern"))
    .collect()
});

/// Strip a trailing media or subtitle extension, if there is one
pub fn strip_media_extension(filename: &str) -> &str {
    match filename.rsplit_once('.') {
        Some((stem, ext))
            if !stem.is_empty()
                && KNOWN_EXTENSIONS
                    .iter()
                    .any(|known| known.eq_ignore_ascii_case(ext)) =>
        {
            stem
        }
        _ => filename,
    }
}

/// Normalize a raw title fragment.
///
/// Bracketed and parenthesized groups are removed, separator characters
/// collapse to single spaces, and the result is trimmed. Casing is kept. When
/// removing bracketed groups would leave nothing, the brackets are treated as
/// plain separators instead so `[Movie]` still yields `Movie`.
pub fn clean_title(raw: &str) -> String {
    let stripped = BRACKETED_RE.replace_all(raw, " ");
    let cleaned = collapse_separators(&stripped);
    if cleaned.is_empty() {
        collapse_separators(raw)
    } else {
        cleaned
    }
}

fn collapse_separators(text: &str) -> String {
    SEPARATOR_RE.replace_all(text, " ").trim().to_string()
}

/// Parse a filename (extension optional) into a descriptor. Never fails.
pub fn parse(filename: &str) -> MediaDescriptor {
    parse_stem(strip_media_extension(filename))
}

/// Parse a name that has no extension, such as a directory name
pub fn parse_stem(stem: &str) -> MediaDescriptor {
    let resolution = find_resolution(stem).map(|t| t.value);
    let descriptor = Rule::CASCADE
        .iter()
        .find_map(|rule| rule.apply(stem))
        .map(reduce)
        .unwrap_or_else(|| MediaDescriptor::unknown(clean_title(stem)));
    descriptor.with_resolution(resolution)
}

/// Turn the committed rule's match into a scored descriptor
fn reduce(found: PartialMatch) -> MediaDescriptor {
    match found.rule.class() {
        RuleClass::Tv => {
            let confidence = if !found.title.is_empty()
                && found.season.is_some()
                && found.episode.is_some()
                && !found.season_inferred
            {
                TV_FULL_CONFIDENCE
            } else {
                TV_PARTIAL_CONFIDENCE
            };
            MediaDescriptor {
                kind: MediaKind::TvEpisode,
                title: found.title,
                year: found.year,
                season: found.season,
                episode: found.episode,
                resolution: None,
                confidence,
            }
        }
        RuleClass::Movie => MediaDescriptor::movie(found.title, found.year),
    }
}

/// Parse a filename using its parent directory name as a second source.
///
/// Release folders often carry the title and year while the files inside are
/// named `01.mkv` or `[03].mp4`. When the filename alone is unknown, or
/// yields no title, the directory name is parsed and any episode number in
/// the filename is carried over. Results borrowed from the directory never
/// score above the partial TV confidence.
pub fn parse_with_context(filename: &str, parent_dir: Option<&str>) -> MediaDescriptor {
    let own = parse(filename);
    let needs_context = own.kind == MediaKind::Unknown || own.title.is_empty();
    let Some(dir_name) = parent_dir.filter(|_| needs_context) else {
        return own;
    };

    let from_dir = parse_stem(dir_name);
    if from_dir.title.is_empty() {
        return own;
    }

    let resolution = own.resolution.clone().or(from_dir.resolution.clone());

    if own.kind == MediaKind::TvEpisode {
        // Marker came from the file, title from the folder
        return MediaDescriptor {
            title: from_dir.title,
            year: own.year.or(from_dir.year),
            resolution,
            ..own
        };
    }
    if from_dir.kind == MediaKind::Unknown {
        return own;
    }

    let capped = from_dir.confidence.min(TV_PARTIAL_CONFIDENCE);

    let stem = strip_media_extension(filename);
    match episode_from_context(stem) {
        Some(episode) => MediaDescriptor {
            kind: MediaKind::TvEpisode,
            season: from_dir.season.or(Some(1)),
            episode: Some(episode),
            resolution,
            confidence: capped,
            ..from_dir
        },
        None => MediaDescriptor {
            resolution,
            confidence: capped,
            ..from_dir
        },
    }
}

fn episode_from_context(stem: &str) -> Option<u32> {
    CONTEXT_EPISODE_RES
        .iter()
        .find_map(|re| re.captures(stem)?.get(1)?.as_str().parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_movie_scenario() {
        let d = parse("the.matrix.1999.1080p.BluRay.x264-GROUP.mkv");
        assert_eq!(d.kind, MediaKind::Movie);
        assert_eq!(d.title, "the matrix");
        assert_eq!(d.year, Some(1999));
        assert_eq!(d.resolution.as_deref(), Some("1080p"));
        assert_eq!(d.confidence, 0.8);
    }

    #[test]
    fn test_tv_scenario() {
        let d = parse("Game.of.Thrones.S01E01.1080p.mp4");
        assert_eq!(d.kind, MediaKind::TvEpisode);
        assert_eq!(d.title, "Game of Thrones");
        assert_eq!(d.season, Some(1));
        assert_eq!(d.episode, Some(1));
        assert_eq!(d.year, None);
        assert_eq!(d.resolution.as_deref(), Some("1080p"));
        assert_eq!(d.confidence, 0.9);
    }

    #[test]
    fn test_unknown_scenario() {
        let d = parse("asdkjasd.mkv");
        assert_eq!(d.kind, MediaKind::Unknown);
        assert_eq!(d.title, "asdkjasd");
        assert_eq!(d.confidence, 0.1);
    }

    #[test]
    fn test_tv_marker_beats_year() {
        let d = parse("Show.2019.S02E03.mkv");
        assert_eq!(d.kind, MediaKind::TvEpisode);
        assert_eq!(d.title, "Show");
        assert_eq!(d.year, Some(2019));
        assert_eq!((d.season, d.episode), (Some(2), Some(3)));
    }

    #[test]
    fn test_tv_markers_survive_noise() {
        let names = [
            ("[SubGroup] Show Name - S03E12 [1080p][HEVC].mkv", 3, 12),
            ("Show_Name_s03e12_x265-grp.mkv", 3, 12),
            ("Show.Name.3x12.HDTV.mp4", 3, 12),
            ("(2020) Show Name S3E12 WEB-DL.mkv", 3, 12),
            ("Show Name Season 3 Episode 12.avi", 3, 12),
        ];
        for (name, season, episode) in names {
            let d = parse(name);
            assert_eq!(d.kind, MediaKind::TvEpisode, "{name}");
            assert_eq!(d.season, Some(season), "{name}");
            assert_eq!(d.episode, Some(episode), "{name}");
            assert_eq!(d.title, "Show Name", "{name}");
        }
    }

    #[test]
    fn test_tv_without_title_is_partial() {
        let d = parse("S01E05.mkv");
        assert_eq!(d.kind, MediaKind::TvEpisode);
        assert_eq!(d.title, "");
        assert_eq!(d.confidence, 0.6);
    }

    #[test]
    fn test_no_year_and_no_marker_is_unknown() {
        let names = [
            "Some.Movie.720p.WEB-DL.mkv",
            "[Group] Show - 07 [1080p].mkv",
            "Show.Name.S01.1080p.mkv",
        ];
        for name in names {
            let d = parse(name);
            assert_eq!(d.kind, MediaKind::Unknown, "{name}");
            assert_eq!(d.confidence, 0.1, "{name}");
        }
        assert_eq!(
            parse("Some.Movie.720p.WEB-DL.mkv").resolution.as_deref(),
            Some("720p")
        );
    }

    #[test]
    fn test_year_only_movie_is_partial() {
        let d = parse("2001.mkv");
        assert_eq!(d.kind, MediaKind::Movie);
        assert_eq!(d.year, Some(2001));
        assert_eq!(d.confidence, 0.5);
    }

    #[test]
    fn test_codec_noise_is_not_an_episode() {
        let d = parse("Movie.2001.x264.DTS-E3.mkv");
        assert_eq!(d.kind, MediaKind::Movie);
        assert_eq!(d.title, "Movie");
        assert_eq!(d.year, Some(2001));
        assert_eq!(d.season, None);

        let d = parse("Ep 5 of something.mkv");
        assert_ne!(d.kind, MediaKind::TvEpisode);
    }

    #[test]
    fn test_canonical_names_reparse_to_themselves() {
        let d = parse("the matrix(1999) - 1080p.mkv");
        assert_eq!(d.title, "the matrix");
        assert_eq!(d.year, Some(1999));
        assert_eq!(d.resolution.as_deref(), Some("1080p"));

        let d = parse("Game of Thrones - S01E01 - 1080p.mp4");
        assert_eq!(d.title, "Game of Thrones");
        assert_eq!((d.season, d.episode), (Some(1), Some(1)));
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("[Grp] The_Movie.Name - "), "The Movie Name");
        assert_eq!(clean_title("Title (Director's Cut) "), "Title");
        assert_eq!(clean_title("[Only Brackets]"), "Only Brackets");
        assert_eq!(clean_title("《流浪地球》"), "流浪地球");
        assert_eq!(clean_title(""), "");
    }

    #[test]
    fn test_strip_media_extension() {
        assert_eq!(strip_media_extension("a.b.MKV"), "a.b");
        assert_eq!(strip_media_extension("Show.S01"), "Show.S01");
        assert_eq!(strip_media_extension(".mkv"), ".mkv");
    }

    #[test]
    fn test_parse_never_panics_and_confidence_in_range() {
        let inputs = [
            "",
            ".",
            "...",
            "[]",
            "(((",
            "第季第集",
            "S99E999999",
            "2000",
            "🎬.mkv",
            "a.b.c.d.e.f.g.h.i.j",
            "ep",
            "x264-",
        ];
        for input in inputs {
            let d = parse(input);
            assert!((0.0..=1.0).contains(&d.confidence), "{input}");
        }
    }

    #[test]
    fn test_context_from_parent_directory() {
        let d = parse_with_context("[03].mkv", Some("Some.Show.2021.1080p"));
        assert_eq!(d.kind, MediaKind::TvEpisode);
        assert_eq!(d.title, "Some Show");
        assert_eq!(d.year, Some(2021));
        assert_eq!(d.episode, Some(3));
        assert_eq!(d.season, Some(1));
        assert!(d.confidence <= 0.6);
    }

    #[test]
    fn test_context_supplies_missing_title() {
        let d = parse_with_context("S02E04.mkv", Some("Great Show"));
        assert_eq!(d.kind, MediaKind::TvEpisode);
        assert_eq!(d.title, "Great Show");
        assert_eq!((d.season, d.episode), (Some(2), Some(4)));
    }

    #[test]
    fn test_context_ignored_when_filename_is_enough() {
        let d = parse_with_context("Heat.1995.mkv", Some("Other.Movie.2001"));
        assert_eq!(d.title, "Heat");
        assert_eq!(d.confidence, 0.8);
    }
}
