//! Filename parsing for media files.
//!
//! Turns arbitrary, inconsistently named media filenames into a structured
//! [`MediaDescriptor`]: title, year, season/episode and resolution, plus a
//! confidence score that callers use to decide whether a rename is safe or
//! whether a smarter (and slower) source of truth should be consulted.
//!
//! Parsing is an ordered cascade of independent [`rules::Rule`] variants.
//! TV markers are tried first, then year-anchored movie patterns, then
//! release-noise anchored titles; the first rule that matches commits.
//!
//! ```
//! use reelname_parse::{MediaKind, parse};
//!
//! let descriptor = parse("the.matrix.1999.1080p.BluRay.x264-GROUP.mkv");
//! assert_eq!(descriptor.kind, MediaKind::Movie);
//! assert_eq!(descriptor.title, "the matrix");
//! assert_eq!(descriptor.year, Some(1999));
//! assert_eq!(descriptor.resolution.as_deref(), Some("1080p"));
//! ```

pub mod descriptor;
pub mod parser;
pub mod rules;
pub mod tokens;

pub use descriptor::{MediaDescriptor, MediaKind};
pub use parser::{clean_title, parse, parse_stem, parse_with_context, strip_media_extension};
