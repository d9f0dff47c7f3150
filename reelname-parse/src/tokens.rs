//! Token scanners shared by the parsing rules.
//!
//! Every scanner reports byte ranges into the input so rules can slice the
//! text in front of a token to recover the title. A token only counts when
//! it is not glued to surrounding letters or digits: `1999` inside
//! `x1999p` is not a year.

use regex::Regex;
use std::ops::Range;
use std::sync::LazyLock;

static YEAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:19|20)\d{2}").expect("year pattern"));

static RESOLUTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:480|576|720|1080|1440|2160|4320)[pi]|[48]k|uhd").expect("resolution pattern")
});

static NOISE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)blu-?ray|bdrip|brrip|web-?dl|webrip|hdtv|hdrip|dvdrip|remux|x26[45]|h\.?26[45]|hevc|avc|10bit|aac|dts|ac3|hdr",
    )
    .expect("noise pattern")
});

/// A token found in a filename stem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token<T> {
    pub span: Range<usize>,
    pub value: T,
}

/// True when the bytes around `span` are not ASCII letters or digits
pub fn is_isolated(text: &str, span: &Range<usize>) -> bool {
    let before = text[..span.start].chars().next_back();
    let after = text[span.end..].chars().next();
    !before.is_some_and(|c| c.is_ascii_alphanumeric())
        && !after.is_some_and(|c| c.is_ascii_alphanumeric())
}

/// All isolated four-digit years between 1900 and 2099, in order
pub fn year_tokens(text: &str) -> Vec<Token<u16>> {
    YEAR_RE
        .find_iter(text)
        .filter(|m| is_isolated(text, &m.range()))
        .filter_map(|m| {
            m.as_str().parse::<u16>().ok().map(|value| Token {
                span: m.range(),
                value,
            })
        })
        .collect()
}

/// The first isolated resolution token, normalized (`1080P` → `1080p`, `4k` → `4K`)
pub fn find_resolution(text: &str) -> Option<Token<String>> {
    RESOLUTION_RE
        .find_iter(text)
        .find(|m| is_isolated(text, &m.range()))
        .map(|m| Token {
            span: m.range(),
            value: normalize_resolution(m.as_str()),
        })
}

fn normalize_resolution(raw: &str) -> String {
    let lower = raw.to_ascii_lowercase();
    match lower.as_str() {
        "4k" | "8k" | "uhd" => lower.to_ascii_uppercase(),
        _ => lower,
    }
}

/// Start of the earliest release-noise token (resolution, source, codec)
pub fn first_noise_start(text: &str) -> Option<usize> {
    let resolution = find_resolution(text).map(|t| t.span.start);
    let noise = NOISE_RE
        .find_iter(text)
        .find(|m| is_isolated(text, &m.range()))
        .map(|m| m.start());
    match (resolution, noise) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}
