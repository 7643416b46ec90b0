//! Renders a canonical filename from a matched episode and a
//! [`FilenamePatterns`] template. Sanitization and the actual rename side
//! effect belong to the external rename collaborator; this only proposes a
//! name.

use crate::types::{FilenamePatterns, MatchedEpisode};

/// Substitute `{series}`, `{season:02}`, `{episode:02}`, `{season}`,
/// `{episode}`, and `{episodeName}` placeholders with values from `episode`.
/// Tries `patterns.primary_pattern` first, then each fallback in order,
/// skipping any pattern that still contains an unresolved placeholder after
/// substitution (e.g. `{episodeName}` with no episode name available).
#[must_use]
pub fn suggest_filename(episode: &MatchedEpisode, patterns: &FilenamePatterns, extension: &str) -> Option<String> {
    std::iter::once(&patterns.primary_pattern)
        .chain(patterns.fallback_patterns.iter())
        .find_map(|pattern| render(pattern, episode, extension))
}

fn render(pattern: &str, episode: &MatchedEpisode, extension: &str) -> Option<String> {
    let rendered = pattern
        .replace("{series}", &episode.series)
        .replace("{season:02}", &format!("{:02}", episode.season))
        .replace("{episode:02}", &format!("{:02}", episode.episode))
        .replace("{season}", &episode.season.to_string())
        .replace("{episode}", &episode.episode.to_string())
        .replace(
            "{episodeName}",
            episode.episode_name.as_deref().unwrap_or(""),
        );

    if rendered.contains('{') {
        return None;
    }
    if episode.episode_name.is_none() && pattern.contains("{episodeName}") {
        return None;
    }

    let ext = extension.trim_start_matches('.');
    Some(if ext.is_empty() {
        rendered
    } else {
        format!("{rendered}.{ext}")
    })
}
