//! Confidence Calculator (spec §4.2): scores a parsed title against
//! release-group/known-title lexicons and structural heuristics.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

const BASELINE: f32 = 1.0;
const PENALTY_RELEASE_GROUP_TAG: f32 = -0.8;
const PENALTY_CODEC_SOURCE_PATTERN: f32 = -0.7;
const PENALTY_TOO_SHORT: f32 = -0.5;
const PENALTY_ALL_CAPS: f32 = -0.4;
const PENALTY_GARBAGE_PREFIX: f32 = -0.6;
const PENALTY_SINGLE_UNKNOWN_WORD: f32 = -0.15;
const BONUS_HAS_YEAR_GROUP: f32 = 0.1;

/// Release-group tags frequently mistaken for titles by naive parsing.
static KNOWN_RELEASE_GROUPS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "yify", "rarbg", "ettv", "eztv", "sparks", "drones", "ntg", "flux", "ggez", "ggwp",
        "tgx", "fgt", "cmrg", "killers", "amzn", "nf", "ion10", "successfulcrab",
    ]
    .into_iter()
    .collect()
});

static CODEC_OR_SOURCE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(x264|x265|hevc|h264|h265|aac|ac3|dts|flac|bluray|web-?dl|webrip|hdtv|dvdrip|remux)$").unwrap()
});

static GARBAGE_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^(www\.|http|\[|1080|720|x264)").unwrap());

/// A short allowlist of common English words; a single-token title made of
/// one of these (or shorter) carries almost no identifying information.
static COMMON_SHORT_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    ["the", "it", "up", "down", "her", "him", "us", "go"]
        .into_iter()
        .collect()
});

/// `true` when `filename` contains an explicit `(YYYY)` group — used for the
/// `+0.1` bonus and for the monotonicity property in spec §8.
pub fn has_year_group(filename: &str) -> bool {
    static YEAR_GROUP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\((\d{4})\)").unwrap());
    YEAR_GROUP.is_match(filename)
}

/// Score a candidate title extracted from `filename`. Clamped to `[0, 1]`.
pub fn confidence(title: &str, filename: &str) -> f32 {
    let mut score = BASELINE;
    let trimmed = title.trim();
    let lower = trimmed.to_lowercase();

    if KNOWN_RELEASE_GROUPS.contains(lower.as_str()) {
        score += PENALTY_RELEASE_GROUP_TAG;
    }

    if CODEC_OR_SOURCE_PATTERN.is_match(trimmed) {
        score += PENALTY_CODEC_SOURCE_PATTERN;
    }

    if trimmed.chars().filter(|c| !c.is_whitespace()).count() < 3 {
        score += PENALTY_TOO_SHORT;
    }

    if trimmed.len() > 4 && trimmed.chars().all(|c| !c.is_alphabetic() || c.is_uppercase()) {
        score += PENALTY_ALL_CAPS;
    }

    if GARBAGE_PREFIX.is_match(trimmed) {
        score += PENALTY_GARBAGE_PREFIX;
    }

    let words: Vec<&str> = trimmed.split_whitespace().collect();
    if words.len() == 1 && (words[0].len() <= 4 || COMMON_SHORT_WORDS.contains(lower.as_str())) {
        score += PENALTY_SINGLE_UNKNOWN_WORD;
    }

    if has_year_group(filename) {
        score += BONUS_HAS_YEAR_GROUP;
    }

    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn release_group_as_title_is_heavily_penalized() {
        let score = confidence("YIFY", "YIFY.mkv");
        assert!(score < 0.3);
    }

    #[test]
    fn garbage_prefix_is_penalized() {
        let score = confidence("www.example.com", "www.example.com.mkv");
        assert!(score < BASELINE);
    }

    #[test]
    fn prop_adding_year_group_never_decreases_confidence() {
        let cases = ["Dracula", "The Matrix", "Somefilm"];
        for title in cases {
            let without = confidence(title, &format!("{title}.mkv"));
            let with = confidence(title, &format!("{title} (2020).mkv"));
            assert!(with >= without, "title={title}");
        }
    }

    #[test]
    fn prop_release_group_suffix_never_increases_confidence() {
        let bare = confidence("Dracula", "Dracula.mkv");
        let suffixed = confidence("Dracula", "Dracula-YIFY.mkv");
        assert!(suffixed <= bare);
    }
}
