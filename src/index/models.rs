//! Row types and derived views for the Media Index (spec §3).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Episode,
}

impl MediaKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Movie => "movie",
            MediaKind::Episode => "episode",
        }
    }

    pub fn from_parsed_kind(kind: crate::parse::ParsedKind) -> Self {
        match kind {
            crate::parse::ParsedKind::Movie => MediaKind::Movie,
            crate::parse::ParsedKind::Episode => MediaKind::Episode,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "kebab-case")]
#[serde(rename_all = "kebab-case")]
pub enum FileSource {
    Filesystem,
    SonarrEquivalent,
    RadarrEquivalent,
    Consolidate,
}

impl FileSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileSource::Filesystem => "filesystem",
            FileSource::SonarrEquivalent => "sonarr-equivalent",
            FileSource::RadarrEquivalent => "radarr-equivalent",
            FileSource::Consolidate => "consolidate",
        }
    }

    /// Higher wins when the same path is reported by two sources.
    pub fn priority(&self) -> i32 {
        match self {
            FileSource::Consolidate => 30,
            FileSource::SonarrEquivalent | FileSource::RadarrEquivalent => 20,
            FileSource::Filesystem => 10,
        }
    }
}

/// One row per physical file on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaFile {
    pub id: Uuid,
    pub path: PathBuf,
    pub size: u64,
    pub modified_at: DateTime<Utc>,
    pub kind: MediaKind,
    pub movie_id: Option<Uuid>,
    pub series_id: Option<Uuid>,
    pub episode_id: Option<Uuid>,
    pub normalized_title: String,
    pub year: Option<u16>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub resolution: Option<String>,
    pub source_type: Option<String>,
    pub codec: Option<String>,
    pub audio_format: Option<String>,
    pub quality_score: i64,
    pub is_compliant: bool,
    pub compliance_issues: Vec<String>,
    pub source: FileSource,
    pub source_priority: i32,
    pub library_root: PathBuf,
    pub confidence: f32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MediaFile {
    /// Rebuilds a `ParsedName` from this row's already-resolved fields.
    /// Used by the plan generators that need to re-render a canonical
    /// filename/target for a file the Index already knows about, without
    /// re-parsing its on-disk name.
    pub fn to_parsed_name(&self) -> crate::parse::ParsedName {
        crate::parse::ParsedName {
            kind: match self.kind {
                MediaKind::Movie => crate::parse::ParsedKind::Movie,
                MediaKind::Episode => crate::parse::ParsedKind::Episode,
            },
            title: self.normalized_title.clone(),
            year: self.year,
            season: self.season,
            episodes: self.episode.into_iter().collect(),
            absolute_episode: None,
            air_date: None,
            resolution: self.resolution.clone(),
            source: self.source_type.clone(),
            codec: self.codec.clone(),
            audio: self.audio_format.clone(),
            release_group: None,
        }
    }
}

/// One row per logical title (movie or series).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Title {
    pub id: Uuid,
    pub kind: MediaKind,
    pub normalized_title: String,
    pub year: Option<u16>,
    pub canonical_path: PathBuf,
    pub source: FileSource,
    pub total_files: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Derived view: files sharing `(normalized_title, year, season?, episode?)`
/// with more than one member.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateGroup {
    pub normalized_title: String,
    pub year: Option<u16>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub kind: MediaKind,
    /// Ordered by `quality_score DESC`, tie-broken by size desc then
    /// `updated_at` desc. Head is `best`.
    pub files: Vec<MediaFile>,
}

impl DuplicateGroup {
    pub fn best(&self) -> &MediaFile {
        &self.files[0]
    }

    pub fn space_reclaimable(&self) -> u64 {
        self.files[1..].iter().map(|f| f.size).sum()
    }
}

/// Derived view: a `(normalized_title, year, kind)` whose files span two or
/// more distinct library roots.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScatteredConflict {
    pub id: Uuid,
    pub normalized_title: String,
    pub year: Option<u16>,
    pub kind: MediaKind,
    pub library_roots: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum QueueStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::Processing => "processing",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
        }
    }
}

/// Persistent background-enhancement queue item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AiImprovement {
    pub request_id: String,
    pub filename: String,
    pub user_title: String,
    pub user_type: MediaKind,
    pub user_year: Option<u16>,
    pub ai_title: Option<String>,
    pub ai_type: Option<MediaKind>,
    pub ai_year: Option<u16>,
    pub ai_confidence: Option<f32>,
    pub status: QueueStatus,
    pub attempts: u32,
    pub error: Option<String>,
    pub model: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SkippedStatus {
    Open,
    Resolved,
    Ignored,
}

/// A file that failed to parse or resolve.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkippedItem {
    pub id: Uuid,
    pub path: PathBuf,
    pub reason: String,
    pub error_details: Option<String>,
    pub ai_attempted: bool,
    pub ai_result: Option<String>,
    pub attempts: u32,
    pub status: SkippedStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// `(normalized_input, kind, model) -> ParsedName + confidence`, scored by
/// usage and recency.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParseCacheEntry {
    pub normalized_input: String,
    pub kind: MediaKind,
    pub model: String,
    pub title: String,
    pub year: Option<u16>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub confidence: f32,
    pub latency_ms: u32,
    pub usage_count: u32,
    pub last_used_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Append-only audit trail row (`LogOperation`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationLogEntry {
    pub id: Uuid,
    pub kind: String,
    pub source_path: Option<PathBuf>,
    pub target_path: Option<PathBuf>,
    pub reason: Option<String>,
    pub bytes_from: Option<u64>,
    pub bytes_to: Option<u64>,
    pub duration_ms: Option<u64>,
    pub origin: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsolidationStats {
    pub total_media_files: u64,
    pub total_movies: u64,
    pub total_series: u64,
    pub duplicate_groups: u64,
    pub space_reclaimable_bytes: u64,
    pub non_compliant_files: u64,
    pub scattered_conflicts: u64,
}
