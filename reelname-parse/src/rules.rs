//! The ordered rule cascade.
//!
//! Each [`Rule`] is an independent, pure matcher over a filename stem. The
//! reducer in [`crate::parser`] walks [`Rule::CASCADE`] in order and commits
//! to the first rule that produces a [`PartialMatch`]. TV rules precede movie
//! rules, so a season/episode marker always beats a bare year.

use crate::parser::clean_title;
use crate::tokens::{first_noise_start, year_tokens};
use regex::{Captures, Regex};
use std::sync::LazyLock;

static SEASON_EPISODE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^0-9a-z])(s(\d{1,2})[ ._-]?e(\d{1,3}))(?:[^0-9]|$)")
        .expect("season/episode pattern")
});

static CROSS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^0-9a-z])((\d{1,2})x(\d{2,3}))(?:[^0-9a-z]|$)").expect("cross pattern")
});

static VERBOSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^0-9a-z])(season[ ._-]*(\d{1,2})[ ._-]*episode[ ._-]*(\d{1,3}))(?:[^0-9]|$)")
        .expect("verbose pattern")
});

static CJK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(第\s*(\d{1,3})\s*季.*?第\s*(\d{1,4})\s*[集话話])").expect("cjk pattern")
});

static SEASON_SEPARATED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^0-9a-z])(s(\d{1,2})[ ._-]{1,3}(\d{1,3}))(?:[^0-9a-z]|$)")
        .expect("season separated pattern")
});

static EPISODE_ONLY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^0-9a-z])(ep?[ ._-]?(\d{1,3}))(?:[^0-9a-z]|$)").expect("episode pattern")
});

static CJK_EPISODE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(第\s*(\d{1,4})\s*[集话話])").expect("cjk episode pattern"));

/// Which family a rule belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleClass {
    Tv,
    Movie,
}

/// A single pattern variant in the cascade
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// `S01E02`, `s1.e2`
    SeasonEpisode,
    /// `1x02`
    CrossNotation,
    /// `Season 1 Episode 2`
    VerboseSeasonEpisode,
    /// `第1季第2集`
    CjkSeasonEpisode,
    /// `S01.02`, `S01 - 02`
    SeasonSeparatedEpisode,
    /// `E02`, `EP02`, `第2集`; season is assumed to be 1
    EpisodeOnly,
    /// A year with the title in front of it
    YearAnchored,
}

/// What a rule extracted, before confidence is assigned
#[derive(Debug, Clone, PartialEq)]
pub struct PartialMatch {
    pub rule: Rule,
    pub title: String,
    pub year: Option<u16>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    /// The season was not written in the filename
    pub season_inferred: bool,
}

impl Rule {
    /// Rules in the order they are tried
    pub const CASCADE: [Rule; 7] = [
        Rule::SeasonEpisode,
        Rule::CrossNotation,
        Rule::VerboseSeasonEpisode,
        Rule::CjkSeasonEpisode,
        Rule::SeasonSeparatedEpisode,
        Rule::EpisodeOnly,
        Rule::YearAnchored,
    ];

    pub fn class(self) -> RuleClass {
        match self {
            Rule::YearAnchored => RuleClass::Movie,
            _ => RuleClass::Tv,
        }
    }

    /// Try this rule against a stem (a filename without its extension)
    pub fn apply(self, stem: &str) -> Option<PartialMatch> {
        match self {
            Rule::SeasonEpisode => tv_marker(self, stem, &SEASON_EPISODE_RE, false),
            Rule::CrossNotation => tv_marker(self, stem, &CROSS_RE, false),
            Rule::VerboseSeasonEpisode => tv_marker(self, stem, &VERBOSE_RE, false),
            Rule::CjkSeasonEpisode => tv_marker(self, stem, &CJK_RE, false),
            Rule::SeasonSeparatedEpisode => tv_marker(self, stem, &SEASON_SEPARATED_RE, false),
            Rule::EpisodeOnly => episode_only(stem),
            Rule::YearAnchored => year_anchored(stem),
        }
    }
}

/// Shared shape of every TV rule: group 1 is the whole marker; for
/// two-number markers group 2 is the season and group 3 the episode, for
/// episode-only markers group 2 is the episode.
fn tv_marker(rule: Rule, stem: &str, re: &Regex, episode_only: bool) -> Option<PartialMatch> {
    let caps = re.captures(stem)?;
    let marker = caps.get(1)?;
    if episode_only && marker.start() >= episode_cutoff(stem) {
        return None;
    }
    let (season, episode) = if episode_only {
        (1, number(&caps, 2)?)
    } else {
        (number(&caps, 2)?, number(&caps, 3)?)
    };

    let (title, year) = title_and_year(&stem[..marker.start()]);
    Some(PartialMatch {
        rule,
        title,
        year,
        season: Some(season),
        episode: Some(episode),
        season_inferred: episode_only,
    })
}

/// A bare `E3` after the year or the release noise is codec or audio
/// noise (`DTS-E3`), not an episode
fn episode_cutoff(stem: &str) -> usize {
    let first_year = year_tokens(stem).first().map(|year| year.span.start);
    [first_year, first_noise_start(stem)]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(stem.len())
}

fn episode_only(stem: &str) -> Option<PartialMatch> {
    [&*EPISODE_ONLY_RE, &*CJK_EPISODE_RE]
        .into_iter()
        .find_map(|re| tv_marker(Rule::EpisodeOnly, stem, re, true))
        .filter(|found| !found.title.is_empty())
}

fn number(caps: &Captures<'_>, group: usize) -> Option<u32> {
    caps.get(group)?.as_str().parse().ok()
}

/// Split a title prefix into cleaned title and the last year found in it.
/// A prefix that is nothing but a year keeps it as the title (`1923.S01E01`).
fn title_and_year(prefix: &str) -> (String, Option<u16>) {
    let Some(year) = year_tokens(prefix).pop() else {
        return (clean_title(prefix), None);
    };
    let without_year = format!("{}{}", &prefix[..year.span.start], &prefix[year.span.end..]);
    let title = clean_title(&without_year);
    if title.is_empty() {
        (clean_title(prefix), None)
    } else {
        (title, Some(year.value))
    }
}

fn year_anchored(stem: &str) -> Option<PartialMatch> {
    let years = year_tokens(stem);
    let anchored = years.iter().rev().find_map(|year| {
        let title = clean_title(&stem[..year.span.start]);
        (!title.is_empty()).then(|| (title, year.value))
    });

    let (title, year) = match anchored {
        Some(found) => found,
        None => {
            // Leading year with the title after it: "1999 - Some Title"
            let year = years.first()?;
            let rest = &stem[year.span.end..];
            let rest = &rest[..first_noise_start(rest).unwrap_or(rest.len())];
            (clean_title(rest), year.value)
        }
    };

    Some(PartialMatch {
        rule: Rule::YearAnchored,
        title,
        year: Some(year),
        season: None,
        episode: None,
        season_inferred: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(rule: Rule, stem: &str) -> Option<(String, Option<u32>, Option<u32>)> {
        rule.apply(stem).map(|m| (m.title, m.season, m.episode))
    }

    #[test]
    fn test_season_episode_rule() {
        assert_eq!(
            apply(Rule::SeasonEpisode, "Show.Name.S02E10.720p"),
            Some(("Show Name".to_string(), Some(2), Some(10)))
        );
        assert_eq!(
            apply(Rule::SeasonEpisode, "show name s1.e5"),
            Some(("show name".to_string(), Some(1), Some(5)))
        );
        assert_eq!(apply(Rule::SeasonEpisode, "Boss01E02"), None);
    }

    #[test]
    fn test_cross_notation_rule() {
        assert_eq!(
            apply(Rule::CrossNotation, "Show - 3x07 - Title"),
            Some(("Show".to_string(), Some(3), Some(7)))
        );
        assert_eq!(apply(Rule::CrossNotation, "Movie.1920x1080"), None);
    }

    #[test]
    fn test_verbose_rule() {
        assert_eq!(
            apply(Rule::VerboseSeasonEpisode, "Show Season 2 Episode 3"),
            Some(("Show".to_string(), Some(2), Some(3)))
        );
    }

    #[test]
    fn test_cjk_rule() {
        assert_eq!(
            apply(Rule::CjkSeasonEpisode, "庆余年 第2季 第05集"),
            Some(("庆余年".to_string(), Some(2), Some(5)))
        );
    }

    #[test]
    fn test_season_separated_rule() {
        assert_eq!(
            apply(Rule::SeasonSeparatedEpisode, "Show.S01.02.mkv"),
            Some(("Show".to_string(), Some(1), Some(2)))
        );
        assert_eq!(apply(Rule::SeasonSeparatedEpisode, "Show.S01.1080p"), None);
    }

    #[test]
    fn test_episode_only_rule_infers_season() {
        let m = Rule::EpisodeOnly.apply("Some Show - EP07").unwrap();
        assert_eq!(m.title, "Some Show");
        assert_eq!(m.season, Some(1));
        assert_eq!(m.episode, Some(7));
        assert!(m.season_inferred);

        let m = Rule::EpisodeOnly.apply("某剧 第12集").unwrap();
        assert_eq!(m.episode, Some(12));
    }

    #[test]
    fn test_tv_prefix_year_is_split_from_title() {
        let m = Rule::SeasonEpisode.apply("Doctor.Who.2005.S03E01").unwrap();
        assert_eq!(m.title, "Doctor Who");
        assert_eq!(m.year, Some(2005));

        let m = Rule::SeasonEpisode.apply("1923.S01E01").unwrap();
        assert_eq!(m.title, "1923");
        assert_eq!(m.year, None);
    }

    #[test]
    fn test_year_anchored_prefers_last_year_with_title() {
        let m = Rule::YearAnchored.apply("Blade.Runner.2049.2017.1080p").unwrap();
        assert_eq!(m.title, "Blade Runner 2049");
        assert_eq!(m.year, Some(2017));

        let m = Rule::YearAnchored.apply("1999 - Party Movie 720p").unwrap();
        assert_eq!(m.title, "Party Movie");
        assert_eq!(m.year, Some(1999));
    }

    #[test]
    fn test_episode_only_ignores_noise_after_year() {
        assert_eq!(Rule::EpisodeOnly.apply("Movie.2001.x264.DTS-E3"), None);
        assert_eq!(Rule::EpisodeOnly.apply("Show.720p.E05"), None);
        assert_eq!(
            apply(Rule::EpisodeOnly, "Show - E05 - 1080p"),
            Some(("Show".to_string(), Some(1), Some(5)))
        );
    }

    #[test]
    fn test_episode_only_requires_title() {
        assert_eq!(Rule::EpisodeOnly.apply("Ep 5 of something"), None);
        assert_eq!(Rule::EpisodeOnly.apply("第3集"), None);
    }

    #[test]
    fn test_classes() {
        assert_eq!(Rule::SeasonEpisode.class(), RuleClass::Tv);
        assert_eq!(Rule::EpisodeOnly.class(), RuleClass::Tv);
        assert_eq!(Rule::YearAnchored.class(), RuleClass::Movie);
    }
}
