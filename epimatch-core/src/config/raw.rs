//! Strict and lenient JSON parsing of the on-disk configuration shape.

use std::collections::HashMap;

use serde::Deserialize;
use serde_json::Value;
use tracing::warn;

use crate::error::{Error, Result};
use crate::types::{
    Configuration, FilenamePatterns, MatchingStrategy, SubtitleSourceFormat, TextRankFiltering,
    Thresholds,
};

/// Strip `//` line comments and `/* */` block comments that occur outside
/// string literals, and drop trailing commas before `}`/`]`. This is the
/// syntax leniency the strict parser is specified to tolerate; the shape
/// itself is still validated strictly against [`RawConfig`].
fn strip_comments_and_trailing_commas(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;
    let mut escaped = false;

    while let Some(c) = chars.next() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                for c in chars.by_ref() {
                    if c == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                let mut prev = ' ';
                for c in chars.by_ref() {
                    if prev == '*' && c == '/' {
                        break;
                    }
                    prev = c;
                }
            }
            _ => out.push(c),
        }
    }

    strip_trailing_commas(&out)
}

fn strip_trailing_commas(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut in_string = false;
    let mut escaped = false;
    let chars: Vec<char> = input.chars().collect();

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        if c == '"' {
            in_string = true;
            out.push(c);
            continue;
        }
        if c == ',' {
            let rest = &chars[i + 1..];
            let next_significant = rest.iter().find(|c| !c.is_whitespace());
            if matches!(next_significant, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

/// Recursively lowercase every object key, implementing the strict parser's
/// case-insensitivity without needing per-field `#[serde(alias)]` sprawl.
fn lowercase_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k.to_lowercase(), lowercase_keys(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(lowercase_keys).collect()),
        other => other,
    }
}

#[derive(Debug, Deserialize)]
struct RawThresholds {
    #[serde(rename = "matchconfidence")]
    match_confidence: f64,
    #[serde(rename = "renameconfidence")]
    rename_confidence: f64,
    #[serde(rename = "fuzzyhashsimilarity")]
    fuzzy_hash_similarity: f64,
    #[serde(rename = "embedsimilarity", default)]
    embed_similarity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RawFilenamePatternsObject {
    #[serde(rename = "primarypattern")]
    primary_pattern: String,
    #[serde(rename = "fallbackpatterns", default)]
    fallback_patterns: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawFilenamePatterns {
    Object(RawFilenamePatternsObject),
    Array(Vec<String>),
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawVersion {
    Str(String),
    Num(f64),
}

#[derive(Debug, Deserialize)]
struct RawTextRankFiltering {
    #[serde(default)]
    enabled: bool,
    #[serde(default = "default_percentage")]
    percentage: f64,
    #[serde(rename = "minsentences", default = "default_min_sentences")]
    min_sentences: usize,
    #[serde(rename = "minpercentage", default = "default_min_percentage")]
    min_percentage: f64,
}

fn default_percentage() -> f64 {
    30.0
}
fn default_min_sentences() -> usize {
    5
}
fn default_min_percentage() -> f64 {
    10.0
}

/// Shape accepted by the strict parser: types are fixed, but key casing is
/// normalized before deserializing into this struct (see
/// [`lowercase_keys`]), and comments/trailing commas are stripped from the
/// source text first.
#[derive(Debug, Deserialize)]
struct RawConfig {
    version: RawVersion,
    #[serde(rename = "matchingstrategy")]
    matching_strategy: String,
    #[serde(rename = "matchingthresholds")]
    matching_thresholds: HashMap<String, RawThresholds>,
    #[serde(rename = "embeddingthresholds", default)]
    embedding_thresholds: HashMap<String, RawThresholds>,
    #[serde(rename = "maxconcurrency")]
    max_concurrency: i64,
    #[serde(rename = "textrankfiltering", default)]
    text_rank_filtering: Option<RawTextRankFiltering>,
    #[serde(rename = "filenamepatterns")]
    filename_patterns: RawFilenamePatterns,
}

fn parse_source_format(key: &str) -> Option<SubtitleSourceFormat> {
    match key.to_lowercase().as_str() {
        "text" => Some(SubtitleSourceFormat::Text),
        "pgs" => Some(SubtitleSourceFormat::Pgs),
        "vobsub" => Some(SubtitleSourceFormat::VobSub),
        _ => None,
    }
}

fn parse_matching_strategy(raw: &str) -> MatchingStrategy {
    match raw.to_lowercase().as_str() {
        "embedding" => MatchingStrategy::Embedding,
        "fuzzy" => MatchingStrategy::Fuzzy,
        "hybrid" => MatchingStrategy::Hybrid,
        other => {
            warn!(value = other, "unrecognized matchingStrategy, defaulting to embedding");
            MatchingStrategy::Embedding
        }
    }
}

/// Out-of-range `maxConcurrency` handling for initial load / lenient parse:
/// values outside `[1, 100]` default to 1. Used unconditionally by the
/// lenient parser; the strict parser instead returns the raw value
/// unclamped (see [`raw_max_concurrency_unclamped`]) so `ConfigurationEngine`
/// can apply this same clamp only on an initial load and leave an
/// out-of-range reload value for validation to reject (§4.4).
fn clamp_max_concurrency_lenient(value: i64) -> usize {
    if (1..=100).contains(&value) {
        value as usize
    } else {
        1
    }
}

/// The strict parser's raw `maxConcurrency`, cast without clamping
/// (negative values floor at 0, which validation then rejects).
fn raw_max_concurrency_unclamped(value: i64) -> usize {
    usize::try_from(value).unwrap_or(0)
}

fn thresholds_from_raw(raw: &RawThresholds, default_embed_similarity: f64) -> Thresholds {
    Thresholds {
        match_confidence: raw.match_confidence,
        rename_confidence: raw.rename_confidence,
        fuzzy_hash_similarity: raw.fuzzy_hash_similarity,
        embed_similarity: raw.embed_similarity.unwrap_or(default_embed_similarity),
    }
}

fn merge_thresholds(
    matching: &HashMap<String, RawThresholds>,
    embedding: &HashMap<String, RawThresholds>,
) -> HashMap<SubtitleSourceFormat, Thresholds> {
    let mut out = HashMap::new();
    for (key, raw) in matching {
        let Some(format) = parse_source_format(key) else {
            continue;
        };
        let embed_similarity = embedding
            .get(key)
            .and_then(|e| e.embed_similarity)
            .unwrap_or(0.75);
        out.insert(format, thresholds_from_raw(raw, embed_similarity));
    }
    out
}

fn filename_patterns_from_raw(raw: RawFilenamePatterns) -> FilenamePatterns {
    match raw {
        RawFilenamePatterns::Object(obj) => FilenamePatterns {
            primary_pattern: obj.primary_pattern,
            fallback_patterns: obj.fallback_patterns,
        },
        RawFilenamePatterns::Array(mut items) => {
            if items.is_empty() {
                FilenamePatterns {
                    primary_pattern: String::new(),
                    fallback_patterns: Vec::new(),
                }
            } else {
                let primary = items.remove(0);
                FilenamePatterns {
                    primary_pattern: primary,
                    fallback_patterns: items,
                }
            }
        }
    }
}

fn text_rank_from_raw(raw: Option<RawTextRankFiltering>) -> Option<TextRankFiltering> {
    raw.map(|r| TextRankFiltering {
        enabled: r.enabled,
        percentage: r.percentage,
        min_sentences: r.min_sentences,
        min_percentage: r.min_percentage,
    })
}

/// Strict parse: the config text must deserialize into [`RawConfig`] after
/// comment/trailing-comma stripping and key lowercasing. Field names,
/// casing aside, are fixed; unknown threshold formats are silently
/// skipped rather than erroring, since §3 only requires the formats that
/// are actually used.
///
/// `maxConcurrency` is returned unclamped here — §4.4 only defaults an
/// out-of-range value to 1 on an initial load or a lenient parse, and
/// leaves it as-is on a strict reload after a prior successful load so
/// validation can reject it. That distinction depends on caller state this
/// function doesn't have, so `ConfigurationEngine` applies the initial-load
/// clamp itself after calling this.
///
/// # Errors
///
/// Returns `Err(Error::Serialization)` if the text does not parse as JSON,
/// or `Err(Error::ConfigurationError)` if it parses but doesn't match the
/// expected shape.
pub fn parse_strict(text: &str) -> Result<Configuration> {
    let cleaned = strip_comments_and_trailing_commas(text);
    let value: Value = serde_json::from_str(&cleaned)?;
    let lowered = lowercase_keys(value);
    let raw: RawConfig = serde_json::from_value(lowered)
        .map_err(|e| Error::ConfigurationError(format!("strict config shape mismatch: {e}")))?;

    let version = match raw.version {
        RawVersion::Str(s) => s,
        RawVersion::Num(n) => format!("{n:.1}"),
    };

    Ok(Configuration {
        version,
        matching_strategy: parse_matching_strategy(&raw.matching_strategy),
        thresholds: merge_thresholds(&raw.matching_thresholds, &raw.embedding_thresholds),
        text_rank_filtering: text_rank_from_raw(raw.text_rank_filtering),
        max_concurrency: raw_max_concurrency_unclamped(raw.max_concurrency),
        filename_patterns: filename_patterns_from_raw(raw.filename_patterns),
    })
}

/// Lenient parse: invoked only after [`parse_strict`] fails. Accepts legacy
/// shapes the strict parser does not: a numeric `version` (handled the same
/// as strict, kept here for legacy callers that only ever exercise this
/// path), a flat `MatchThreshold` field in place of `matchingThresholds`
/// (scaled from percent to ratio when its value is `> 1`), and array-form
/// `filenamePatterns`.
///
/// # Errors
///
/// Returns `Err(Error::ConfigurationError)` if the text is not even valid
/// JSON, or is missing fields with no reasonable legacy default.
pub fn parse_lenient(text: &str) -> Result<Configuration> {
    let cleaned = strip_comments_and_trailing_commas(text);
    let value: Value = serde_json::from_str(&cleaned)
        .map_err(|e| Error::ConfigurationError(format!("not valid JSON: {e}")))?;
    let value = lowercase_keys(value);
    let obj = value
        .as_object()
        .ok_or_else(|| Error::ConfigurationError("config root is not a JSON object".to_string()))?;

    let version = match obj.get("version") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => format!("{:.1}", n.as_f64().unwrap_or(1.0)),
        _ => "1.0".to_string(),
    };

    let matching_strategy = obj
        .get("matchingstrategy")
        .and_then(Value::as_str)
        .map_or(MatchingStrategy::Embedding, parse_matching_strategy);

    let max_concurrency = obj
        .get("maxconcurrency")
        .and_then(Value::as_i64)
        .map_or(1, clamp_max_concurrency_lenient);

    let thresholds = if let Some(Value::Object(map)) = obj.get("matchingthresholds") {
        let raw_map: HashMap<String, RawThresholds> = map
            .iter()
            .filter_map(|(k, v)| serde_json::from_value(v.clone()).ok().map(|r| (k.clone(), r)))
            .collect();
        let embedding_map: HashMap<String, RawThresholds> = obj
            .get("embeddingthresholds")
            .and_then(Value::as_object)
            .map(|m| {
                m.iter()
                    .filter_map(|(k, v)| serde_json::from_value(v.clone()).ok().map(|r| (k.clone(), r)))
                    .collect()
            })
            .unwrap_or_default();
        merge_thresholds(&raw_map, &embedding_map)
    } else {
        // Legacy flat shape: a single `MatchThreshold` applied to `Text`.
        let legacy_match = obj
            .get("matchthreshold")
            .and_then(Value::as_f64)
            .map(|v| if v > 1.0 { v / 100.0 } else { v })
            .unwrap_or(0.75);
        let mut map = HashMap::new();
        map.insert(
            SubtitleSourceFormat::Text,
            Thresholds {
                match_confidence: legacy_match,
                rename_confidence: (legacy_match + 0.10).min(1.0),
                fuzzy_hash_similarity: 70.0,
                embed_similarity: 0.75,
            },
        );
        map
    };

    let filename_patterns = match obj.get("filenamepatterns") {
        Some(Value::Array(items)) => {
            let mut strings: Vec<String> =
                items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect();
            if strings.is_empty() {
                FilenamePatterns {
                    primary_pattern: String::new(),
                    fallback_patterns: Vec::new(),
                }
            } else {
                let primary = strings.remove(0);
                FilenamePatterns { primary_pattern: primary, fallback_patterns: strings }
            }
        }
        Some(Value::Object(map)) => FilenamePatterns {
            primary_pattern: map
                .get("primarypattern")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            fallback_patterns: map
                .get("fallbackpatterns")
                .and_then(Value::as_array)
                .map(|a| a.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                .unwrap_or_default(),
        },
        _ => FilenamePatterns { primary_pattern: String::new(), fallback_patterns: Vec::new() },
    };

    let text_rank_filtering = obj.get("textrankfiltering").and_then(|v| {
        serde_json::from_value::<RawTextRankFiltering>(v.clone())
            .ok()
            .map(|r| TextRankFiltering {
                enabled: r.enabled,
                percentage: r.percentage,
                min_sentences: r.min_sentences,
                min_percentage: r.min_percentage,
            })
    });

    Ok(Configuration {
        version,
        matching_strategy,
        thresholds,
        text_rank_filtering,
        max_concurrency,
        filename_patterns,
    })
}
