//! Mapping of the service's free-form answer onto a [`MediaDescriptor`].
//!
//! Models are asked for bare JSON but regularly wrap it in a Markdown code
//! fence, quote numbers, or write `"unknown"` for a missing year. Everything
//! here is lenient about the shape and strict about the result: a title and
//! a kind are required, other fields are best effort.

use crate::error::{InferError, Result};
use reelname_parse::{MediaDescriptor, MediaKind};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Default, Deserialize)]
struct InferredFields {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    year: Option<Value>,
    #[serde(default)]
    season: Option<Value>,
    #[serde(default)]
    episode: Option<Value>,
    #[serde(default)]
    resolution: Option<Value>,
    #[serde(default)]
    confidence: Option<Value>,
}

/// Remove a surrounding Markdown code fence, with or without a language tag
pub fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the info string ("json") up to the first newline
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    body.trim_end().trim_end_matches("```").trim()
}

fn as_number(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_fraction(value: &Value) -> Option<f32> {
    let fraction = match value {
        Value::Number(n) => n.as_f64().map(|f| f as f32),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    };
    fraction.filter(|f| f.is_finite())
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Decode a chat completion's message content into a descriptor.
///
/// # Arguments
/// * `content` - The raw message text returned by the model
/// * `default_confidence` - Used when the answer carries no `confidence` field
///
/// # Errors
/// [`InferError::Malformed`] when the content is not a JSON object.
pub fn descriptor_from_content(content: &str, default_confidence: f32) -> Result<MediaDescriptor> {
    let json = strip_code_fence(content);
    let fields: InferredFields = serde_json::from_str(json)
        .map_err(|e| InferError::malformed(format!("{e}: {json}")))?;

    let kind = fields
        .kind
        .as_deref()
        .and_then(|k| k.parse::<MediaKind>().ok())
        .unwrap_or(MediaKind::Unknown);

    let year = fields
        .year
        .as_ref()
        .and_then(as_number)
        .and_then(|y| u16::try_from(y).ok())
        .filter(|y| (1900..=2099).contains(y));
    let mut season = fields
        .season
        .as_ref()
        .and_then(as_number)
        .and_then(|n| u32::try_from(n).ok());
    let episode = fields
        .episode
        .as_ref()
        .and_then(as_number)
        .and_then(|n| u32::try_from(n).ok());
    if kind == MediaKind::TvEpisode && season.is_none() && episode.is_some() {
        season = Some(1);
    }

    let descriptor = MediaDescriptor {
        kind,
        title: fields.title.unwrap_or_default().trim().to_string(),
        year,
        season: season.filter(|_| kind == MediaKind::TvEpisode),
        episode: episode.filter(|_| kind == MediaKind::TvEpisode),
        resolution: fields.resolution.as_ref().and_then(as_text),
        confidence: 0.0,
    };
    let confidence = fields
        .confidence
        .as_ref()
        .and_then(as_fraction)
        .unwrap_or(default_confidence);
    Ok(descriptor.with_confidence(confidence))
}
