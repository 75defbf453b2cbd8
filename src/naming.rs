//! Canonical filename rendering and naming-convention compliance (spec
//! §1/§4.9): the single place that turns a parsed title into the
//! `Title (Year) - SxxEyy.ext` on-disk form, and the inverse check used by
//! the Compliance plan generator.
//!
//! The folder/filename split mirrors a plan-item `TargetInfo` shape seen
//! elsewhere in this domain, adapted to this crate's naming rules rather
//! than copied verbatim.

use crate::parse::{ParsedKind, ParsedName};
use std::path::Path;

/// Resolved on-disk location a title's files should live under: a series
/// or movie folder name, and the filename within it. Kept distinct so a
/// caller can join either against any library root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamingTarget {
    pub folder: String,
    pub filename: String,
}

/// `Title (Year)`, or bare `Title` when no year is known.
pub fn title_year(title: &str, year: Option<u16>) -> String {
    match year {
        Some(y) => format!("{title} ({y})"),
        None => title.to_string(),
    }
}

/// `S01E01`, zero-padded to two digits.
pub fn episode_code(season: u32, episode: u32) -> String {
    format!("S{season:02}E{episode:02}")
}

/// The canonical filename for a parsed title, e.g. `Dracula (2020) - S01E01.mkv`
/// or `Dracula (2020).mkv` for a movie.
pub fn expected_filename(parsed: &ParsedName, ext: &str) -> String {
    let base = title_year(&parsed.title, parsed.year);
    match parsed.kind {
        ParsedKind::Movie => format!("{base}.{ext}"),
        ParsedKind::Episode => match (parsed.season, parsed.primary_episode()) {
            (Some(season), Some(episode)) => {
                format!("{base} - {}.{ext}", episode_code(season, episode))
            }
            // Season pack or otherwise unresolved episode identifier: the
            // title/year form is the best we can assert without guessing.
            _ => format!("{base}.{ext}"),
        },
    }
}

/// `Title (Year)` series/movie folder, and `Season NN` subfolder for
/// episodes.
pub fn expected_target(parsed: &ParsedName, ext: &str) -> NamingTarget {
    let folder = match (parsed.kind, parsed.season) {
        (ParsedKind::Episode, Some(season)) => {
            format!("{}/Season {season:02}", title_year(&parsed.title, parsed.year))
        }
        _ => title_year(&parsed.title, parsed.year),
    };
    NamingTarget {
        folder,
        filename: expected_filename(parsed, ext),
    }
}

/// Whether `path`'s filename already matches the canonical rendering for
/// `parsed`.
pub fn is_compliant(path: &Path, parsed: &ParsedName) -> bool {
    compliance_issues(path, parsed).is_empty()
}

/// All naming-convention defects found in `path`'s filename relative to
/// `parsed`, empty when compliant. Used by the Compliance generator to
/// decide `safe` vs `risky` fixes.
pub fn compliance_issues(path: &Path, parsed: &ParsedName) -> Vec<String> {
    let mut issues = Vec::new();

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let actual = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name,
        None => {
            issues.push("filename is not valid UTF-8".to_string());
            return issues;
        }
    };
    let expected = expected_filename(parsed, ext);

    if parsed.release_group.is_some() {
        issues.push("filename retains a release-group tag".to_string());
    }
    if parsed.year.is_none() {
        issues.push("title is missing a release year".to_string());
    }
    if parsed.kind == ParsedKind::Episode
        && (parsed.season.is_none() || parsed.primary_episode().is_none())
    {
        issues.push("episode is missing a season/episode identifier".to_string());
    }
    if actual != expected {
        issues.push(format!("filename does not match expected `{expected}`"));
    }

    issues
}

/// The canonical filename a non-compliant file should be renamed to.
pub fn expected_name(path: &Path, parsed: &ParsedName) -> String {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    expected_filename(parsed, ext)
}

/// Lowercased, punctuation-stripped equality key for title comparison —
/// never for display. Shared by the Index's `normalized_title` column and
/// the Library Selector's directory-name matching.
pub fn normalize_title(title: &str) -> String {
    let mut out = String::with_capacity(title.len());
    let mut last_was_space = false;
    for ch in title.chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            last_was_space = false;
        } else if !last_was_space {
            out.push(' ');
            last_was_space = true;
        }
    }
    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::ParsedKind;

    fn episode(title: &str, year: Option<u16>, season: Option<u32>, episode: Option<u32>) -> ParsedName {
        ParsedName {
            kind: ParsedKind::Episode,
            title: title.to_string(),
            year,
            season,
            episodes: episode.into_iter().collect(),
            absolute_episode: None,
            air_date: None,
            resolution: None,
            source: None,
            codec: None,
            audio: None,
            release_group: None,
        }
    }

    #[test]
    fn renders_canonical_episode_name() {
        let parsed = episode("Dracula", Some(2020), Some(1), Some(1));
        assert_eq!(expected_filename(&parsed, "mkv"), "Dracula (2020) - S01E01.mkv");
    }

    #[test]
    fn renders_canonical_movie_name() {
        let parsed = ParsedName {
            kind: ParsedKind::Movie,
            title: "Dracula".to_string(),
            year: Some(2020),
            season: None,
            episodes: vec![],
            absolute_episode: None,
            air_date: None,
            resolution: None,
            source: None,
            codec: None,
            audio: None,
            release_group: None,
        };
        assert_eq!(expected_filename(&parsed, "mkv"), "Dracula (2020).mkv");
    }

    #[test]
    fn compliant_file_has_no_issues() {
        let parsed = episode("Dracula", Some(2020), Some(1), Some(1));
        let path = Path::new("/lib/Dracula (2020)/Season 01/Dracula (2020) - S01E01.mkv");
        assert!(is_compliant(path, &parsed));
    }

    #[test]
    fn release_group_tag_flagged() {
        let mut parsed = episode("Dracula", Some(2020), Some(1), Some(1));
        parsed.release_group = Some("SPARKS".to_string());
        let path = Path::new("/lib/Dracula (2020) - S01E01.mkv");
        let issues = compliance_issues(path, &parsed);
        assert!(issues.iter().any(|i| i.contains("release-group")));
    }

    #[test]
    fn mismatched_filename_flagged() {
        let parsed = episode("Dracula", Some(2020), Some(1), Some(1));
        let path = Path::new("/lib/Drcla.S01E01.1080p.mkv");
        let issues = compliance_issues(path, &parsed);
        assert!(issues.iter().any(|i| i.contains("does not match")));
    }

    #[test]
    fn normalize_title_strips_punctuation_and_case() {
        assert_eq!(normalize_title("The Wire: Season One!"), "the wire season one");
        assert_eq!(normalize_title("Dracula"), normalize_title("DRACULA"));
    }

    #[test]
    fn normalize_title_is_idempotent() {
        let once = normalize_title("Mr. Robot");
        assert_eq!(normalize_title(&once), once);
    }
}
