//! Output shape of the layered filename parser (spec §4.2).

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParsedKind {
    Movie,
    Episode,
}

/// Hint about whether the containing path is a TV or movie root, passed
/// explicitly by the caller — never inferred from the working directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryHint {
    TvShows,
    Movies,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedName {
    pub kind: ParsedKind,
    pub title: String,
    pub year: Option<u16>,
    pub season: Option<u32>,
    /// For multi-episode files (`S01E01-E02`, `S01E01E02`): all matched
    /// episode numbers in order.
    pub episodes: Vec<u32>,
    pub absolute_episode: Option<u32>,
    pub air_date: Option<NaiveDate>,
    pub resolution: Option<String>,
    pub source: Option<String>,
    pub codec: Option<String>,
    pub audio: Option<String>,
    pub release_group: Option<String>,
}

impl ParsedName {
    pub fn primary_episode(&self) -> Option<u32> {
        self.episodes.first().copied().or(self.absolute_episode)
    }
}
