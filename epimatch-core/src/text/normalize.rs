//! Deterministic subtitle text cleaning.
//!
//! Produces the "clean" text used as canonical input for both CTPH hashing
//! and embedding generation: markup tags, timecodes, and cue indices are
//! stripped, and whitespace is collapsed.

use std::sync::OnceLock;

use regex::Regex;

fn html_tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").expect("static regex is valid"))
}

fn timecode_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\d{1,2}:\d{2}:\d{2}[,.]\d{1,3}\s*-->\s*\d{1,2}:\d{2}:\d{2}[,.]\d{1,3}")
            .expect("static regex is valid")
    })
}

fn cue_index_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?m)^\s*\d+\s*$").expect("static regex is valid"))
}

fn ass_override_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{[^}]*\}").expect("static regex is valid"))
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex is valid"))
}

/// Strip markup, timecodes, and cue indices from raw subtitle text, then
/// collapse whitespace and trim.
///
/// Deterministic: the same input always produces the same output, which is
/// required because `clean_text` feeds both CTPH hashing and embedding
/// generation, and the index is searched against exactly this text.
///
/// # Examples
///
/// ```
/// use epimatch_core::text::normalize::clean_text;
///
/// let srt = "1\n00:00:01,000 --> 00:00:04,000\n<i>Hello, world.</i>\n\n2\n00:00:05,000 --> 00:00:07,000\nGoodbye.\n";
/// assert_eq!(clean_text(srt), "Hello, world. Goodbye.");
/// ```
#[must_use]
pub fn clean_text(raw: &str) -> String {
    let without_tags = html_tag_re().replace_all(raw, " ");
    let without_overrides = ass_override_re().replace_all(&without_tags, " ");
    let without_timecodes = timecode_re().replace_all(&without_overrides, " ");
    let without_cues = cue_index_re().replace_all(&without_timecodes, " ");
    whitespace_re()
        .replace_all(without_cues.trim(), " ")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_srt_structure() {
        let srt = "1\n00:00:01,000 --> 00:00:04,000\nHello there.\n\n2\n00:00:05,000 --> 00:00:07,500\nGeneral Kenobi.\n";
        assert_eq!(clean_text(srt), "Hello there. General Kenobi.");
    }

    #[test]
    fn strips_html_and_ass_markup() {
        let input = "<b>{\\an8}Bold text</b> and {i}normal{/i}";
        let cleaned = clean_text(input);
        assert!(!cleaned.contains('<'));
        assert!(!cleaned.contains('{'));
        assert!(cleaned.contains("Bold text"));
    }

    #[test]
    fn collapses_whitespace() {
        assert_eq!(clean_text("Hello   \n\n  world"), "Hello world");
    }

    #[test]
    fn empty_input_yields_empty_output() {
        assert_eq!(clean_text(""), "");
        assert_eq!(clean_text("   \n\n  "), "");
    }

    #[test]
    fn is_deterministic() {
        let input = "1\n00:00:01,000 --> 00:00:02,000\n<i>Same</i> every time\n";
        assert_eq!(clean_text(input), clean_text(input));
    }
}
