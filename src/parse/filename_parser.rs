//! Layered, pattern-based filename parser (spec §4.2). No AI here — this is
//! the regex stage the Integrator falls back to and compares against.

use super::confidence;
use super::models::{LibraryHint, ParsedKind, ParsedName};
use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::Path;

const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "ts",
];

static EXT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    let exts = VIDEO_EXTENSIONS.join("|");
    Regex::new(&format!(r"(?i)\.({exts})$")).unwrap()
});

/// Whether `ext` (without the leading dot) is a recognized video container.
/// Shared with cleanup's video-file safety guard (spec §4.9) so the two
/// never drift apart.
pub fn is_video_extension(ext: &str) -> bool {
    VIDEO_EXTENSIONS.iter().any(|known| known.eq_ignore_ascii_case(ext))
}

// Episode patterns, checked in this order so multi-episode forms win over
// their single-episode prefixes (spec §4.2 tie-break).
static MULTI_EP_DASH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[Ss](\d{1,2})[Ee](\d{1,3})-[Ee]?(\d{1,3})").unwrap());
static MULTI_EP_CONCAT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)[Ss](\d{1,2})[Ee](\d{1,3})[Ee](\d{1,3})").unwrap());
static STANDARD_EP: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)[Ss](\d{1,2})[Ee](\d{1,3})").unwrap());
static X_EP: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|\D)(\d{1,2})[xX](\d{1,3})(?:\D|$)").unwrap());
static SEASON_PACK: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)season\s*(\d{1,2})").unwrap());
static DATE_YMD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d{4})[\-\.](\d{1,2})[\-\.](\d{1,2})").unwrap());
static ABSOLUTE_EP: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?:^|\D)[Ee](\d{2,4})(?:\D|$)").unwrap());

static YEAR_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:^|[^\d])(19\d{2}|20\d{2})(?:[^\d]|$)").unwrap());
static YEAR_GROUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\((\d{4})\)").unwrap());

const RESOLUTIONS: &[&str] = &["2160p", "4K", "UHD", "1080p", "720p", "480p", "576p", "360p"];
const SOURCES: &[&str] = &[
    "REMUX", "BluRay", "Bluray", "BDRip", "BRRip", "WEB-DL", "WEBRip", "WebDl", "HDTV", "SDTV",
    "DVDRip", "DVD", "CAM", "TS", "HC", "HDCAM", "HDRip",
];
const CODECS: &[&str] = &["x265", "x264", "HEVC", "H.265", "H.264", "H265", "H264"];
const AUDIO_FORMATS: &[&str] = &[
    "DTS-HD", "TrueHD", "DTS", "DDP5.1", "DD5.1", "AAC", "AC3", "FLAC", "Atmos",
];

static RELEASE_GROUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"-(\w+)(?:\.\w+)?$").unwrap());

/// Parse `filename` (a path component, not a full path) using `hint` to
/// break movie/episode ambiguity. Never infers the hint itself.
pub fn parse(filename: &str, hint: LibraryHint) -> Option<ParsedName> {
    let stem = strip_extension(filename);

    let episode = try_parse_episode(&stem, filename);
    let movie = try_parse_movie(&stem, filename);

    match hint {
        LibraryHint::TvShows => episode.or(movie),
        LibraryHint::Movies => movie.or(episode),
        LibraryHint::Unknown => episode.or(movie),
    }
}

fn strip_extension(filename: &str) -> String {
    EXT_PATTERN.replace(filename, "").to_string()
}

fn try_parse_episode(stem: &str, original_filename: &str) -> Option<ParsedName> {
    let (season, episodes, absolute_episode, air_date) = extract_episode_markers(stem)?;

    let title_end = earliest_marker_start(stem);
    let raw_title = &stem[..title_end.min(stem.len())];
    let title = clean_series_title(raw_title);
    if title.is_empty() {
        return None;
    }

    Some(ParsedName {
        kind: ParsedKind::Episode,
        title,
        year: extract_year(original_filename),
        season,
        episodes,
        absolute_episode,
        air_date,
        resolution: extract_marker(original_filename, RESOLUTIONS),
        source: extract_marker(original_filename, SOURCES),
        codec: extract_marker(original_filename, CODECS),
        audio: extract_marker(original_filename, AUDIO_FORMATS),
        release_group: extract_release_group(original_filename),
    })
}

/// Returns `(season, episodes, absolute_episode, air_date)`. At most one of
/// `episodes`/`absolute_episode`/`air_date` is populated per the tie-break
/// rule: `SxxEyy` beats bare `Eddd`.
fn extract_episode_markers(
    stem: &str,
) -> Option<(Option<u32>, Vec<u32>, Option<u32>, Option<NaiveDate>)> {
    if let Some(c) = MULTI_EP_DASH.captures(stem) {
        let season = c[1].parse().ok()?;
        let start: u32 = c[2].parse().ok()?;
        let end: u32 = c[3].parse().ok()?;
        return Some((Some(season), (start..=end).collect(), None, None));
    }
    if let Some(c) = MULTI_EP_CONCAT.captures(stem) {
        let season = c[1].parse().ok()?;
        let start: u32 = c[2].parse().ok()?;
        let end: u32 = c[3].parse().ok()?;
        return Some((Some(season), vec![start, end], None, None));
    }
    if let Some(c) = STANDARD_EP.captures(stem) {
        let season = c[1].parse().ok()?;
        let ep: u32 = c[2].parse().ok()?;
        return Some((Some(season), vec![ep], None, None));
    }
    if let Some(c) = X_EP.captures(stem) {
        let season = c[1].parse().ok()?;
        let ep: u32 = c[2].parse().ok()?;
        return Some((Some(season), vec![ep], None, None));
    }
    if let Some(c) = DATE_YMD.captures(stem) {
        let year: i32 = c[1].parse().ok()?;
        let month: u32 = c[2].parse().ok()?;
        let day: u32 = c[3].parse().ok()?;
        if let Some(date) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some((None, Vec::new(), None, Some(date)));
        }
    }
    if let Some(c) = SEASON_PACK.captures(stem) {
        let season: u32 = c[1].parse().ok()?;
        return Some((Some(season), Vec::new(), None, None));
    }
    // Bare absolute episode number, the lowest-priority pattern.
    if let Some(c) = ABSOLUTE_EP.captures(stem) {
        let ep: u32 = c[1].parse().ok()?;
        if ep > 0 && ep < 10000 {
            return Some((None, Vec::new(), Some(ep), None));
        }
    }
    None
}

fn earliest_marker_start(stem: &str) -> usize {
    let mut cutoff = stem.len();
    for pattern in [
        &*MULTI_EP_DASH,
        &*MULTI_EP_CONCAT,
        &*STANDARD_EP,
        &*X_EP,
        &*SEASON_PACK,
        &*DATE_YMD,
        &*ABSOLUTE_EP,
        &*YEAR_PATTERN,
    ] {
        if let Some(m) = pattern.find(stem) {
            cutoff = cutoff.min(m.start());
        }
    }
    for marker_list in [RESOLUTIONS, SOURCES] {
        for marker in marker_list {
            if let Some(pos) = stem.find(marker) {
                cutoff = cutoff.min(pos);
            }
        }
    }
    cutoff
}

fn clean_series_title(raw: &str) -> String {
    let name = raw.replace(['.', '_'], " ");
    normalize_title_casing(name.trim().trim_matches(|c: char| c == '-' || c == '_'))
}

fn try_parse_movie(stem: &str, original_filename: &str) -> Option<ParsedName> {
    if extract_episode_markers(stem).is_some() {
        return None;
    }

    let year = extract_year(original_filename);
    let mut title_part = stem.to_string();

    if let Some(y) = year {
        for pat in [
            format!(" {y}"),
            format!("({y})"),
            format!(".{y}"),
            format!("_{y}"),
        ] {
            title_part = title_part.replacen(&pat, "", 1);
        }
    }

    let title = clean_movie_title(&title_part);
    if title.is_empty() {
        return None;
    }

    Some(ParsedName {
        kind: ParsedKind::Movie,
        title,
        year,
        season: None,
        episodes: Vec::new(),
        absolute_episode: None,
        air_date: None,
        resolution: extract_marker(original_filename, RESOLUTIONS),
        source: extract_marker(original_filename, SOURCES),
        codec: extract_marker(original_filename, CODECS),
        audio: extract_marker(original_filename, AUDIO_FORMATS),
        release_group: extract_release_group(original_filename),
    })
}

fn clean_movie_title(raw: &str) -> String {
    let mut cleaned = raw.to_string();

    cleaned = Regex::new(r"\[.*?\]").unwrap().replace_all(&cleaned, " ").to_string();

    let quality_cutoff = Regex::new(
        r"(?i)\s*[\(\[]?\s*(bluray|bdrip|brrip|webrip|web-dl|webdl|sdtv|hdtv|dvdrip|cam|hdcam|hdrip|xvid|divx|x264|x265|h264|h265|hevc|10bit|hdr|hdr10|dv|ac3|aac|dts|flac|remux|1080p|720p|480p|2160p|4k|uhd|\d{3,4}p).*$",
    )
    .unwrap();
    cleaned = quality_cutoff.replace(&cleaned, "").to_string();

    let edition = Regex::new(
        r"(?i)[\s\-]*(unrated|extended|director'?s?\s*cut|theatrical|special\s*edition|ultimate\s*edition|final\s*cut|remastered|uncut)\b.*$",
    )
    .unwrap();
    cleaned = edition.replace(&cleaned, "").to_string();

    loop {
        let before = cleaned.clone();
        cleaned = Regex::new(r"\([^()]*\)").unwrap().replace_all(&cleaned, " ").to_string();
        cleaned = cleaned.replace(['(', ')'], " ");
        if cleaned == before {
            break;
        }
    }

    cleaned = cleaned.replace(['.', '_'], " ");
    cleaned = Regex::new(r"\b(19|20)\d{2}\b").unwrap().replace_all(&cleaned, "").to_string();
    cleaned = RELEASE_GROUP.replace(&cleaned, "").to_string();

    cleaned = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    normalize_title_casing(cleaned.trim_matches(|c: char| c.is_whitespace() || c == '-' || c == '.'))
}

/// Conventional title-case: articles/conjunctions/short prepositions lower
/// unless they start the title.
fn normalize_title_casing(s: &str) -> String {
    const LOWER_WORDS: &[&str] = &[
        "a", "an", "the", "and", "or", "but", "nor", "of", "in", "on", "at", "to", "for", "with",
    ];
    let words: Vec<&str> = s.split_whitespace().collect();
    words
        .iter()
        .enumerate()
        .map(|(i, w)| {
            let lower = w.to_lowercase();
            if i != 0 && LOWER_WORDS.contains(&lower.as_str()) {
                lower
            } else {
                capitalize(w)
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

/// Extract year, preferring the earliest of two when both appear (release
/// year vs. a quality-marker year like `...2160p...` is rare but spec §4.2
/// names this tie-break explicitly).
pub fn extract_year(filename: &str) -> Option<u16> {
    let mut years: Vec<u16> = Vec::new();
    for caps in YEAR_PATTERN.captures_iter(filename) {
        if let Ok(year) = caps[1].parse::<u16>() {
            if (1900..=2100).contains(&year) {
                years.push(year);
            }
        }
    }
    years.into_iter().min()
}

fn extract_marker(filename: &str, markers: &[&str]) -> Option<String> {
    for marker in markers {
        if filename.to_lowercase().contains(&marker.to_lowercase()) {
            return Some(marker.to_string());
        }
    }
    None
}

pub fn extract_release_group(filename: &str) -> Option<String> {
    let stem = strip_extension(filename);
    RELEASE_GROUP
        .captures(&stem)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// Confidence for a parsed result, per the Confidence Calculator.
pub fn parse_confidence(parsed: &ParsedName, filename: &str) -> f32 {
    confidence::confidence(&parsed.title, filename)
}

/// Determine a `LibraryHint` from a path's directory structure, for callers
/// that have a path but no explicit library configuration at hand. Prefer
/// an explicit library-type configuration over this whenever one exists.
pub fn infer_hint_from_path(path: &Path) -> LibraryHint {
    let filename = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
    if extract_episode_markers(filename).is_some() {
        LibraryHint::TvShows
    } else {
        LibraryHint::Unknown
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_year_prefers_earlier_of_two() {
        assert_eq!(extract_year("Movie.1999.Extended.2160p.2015.mkv"), Some(1999));
        assert_eq!(extract_year("Movie.2023.1080p.mkv"), Some(2023));
        assert_eq!(extract_year("Movie.mkv"), None);
    }

    #[test]
    fn extract_resolution_picks_first_match() {
        assert_eq!(
            extract_marker("Movie.1080p.BluRay.mkv", RESOLUTIONS),
            Some("1080p".to_string())
        );
    }

    #[test]
    fn parses_standard_episode() {
        let parsed = parse(
            "Breaking.Bad.S01E01.Pilot.1080p.BluRay.x264-GROUP.mkv",
            LibraryHint::TvShows,
        )
        .unwrap();
        assert_eq!(parsed.kind, ParsedKind::Episode);
        assert_eq!(parsed.title, "Breaking Bad");
        assert_eq!(parsed.season, Some(1));
        assert_eq!(parsed.episodes, vec![1]);
        assert_eq!(parsed.release_group, Some("GROUP".to_string()));
    }

    #[test]
    fn multi_episode_dash_beats_single_prefix() {
        let parsed = parse("Show.S01E01-E03.mkv", LibraryHint::TvShows).unwrap();
        assert_eq!(parsed.episodes, vec![1, 2, 3]);
    }

    #[test]
    fn sxxeyy_preferred_over_bare_absolute() {
        let markers = extract_episode_markers("Show.S01E05.103.mkv").unwrap();
        assert_eq!(markers.0, Some(1));
        assert_eq!(markers.1, vec![5]);
    }

    #[test]
    fn parses_movie_with_year() {
        let parsed = parse("The.Dark.Knight.2008.1080p.BluRay.x264-GROUP.mkv", LibraryHint::Movies)
            .unwrap();
        assert_eq!(parsed.kind, ParsedKind::Movie);
        assert_eq!(parsed.title, "The Dark Knight");
        assert_eq!(parsed.year, Some(2008));
        assert_eq!(parsed.resolution, Some("1080p".to_string()));
    }

    #[test]
    fn prop_canonical_filename_round_trips() {
        let parsed = parse("The Matrix (1999) - S01E02.mkv", LibraryHint::TvShows).unwrap();
        assert_eq!(parsed.title, "The Matrix");
        assert_eq!(parsed.year, Some(1999));
        assert_eq!(parsed.season, Some(1));
        assert_eq!(parsed.episodes, vec![2]);
    }
}
