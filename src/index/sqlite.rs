//! SQLite-backed Media Index. Owns the only handle to `media.db`; every
//! other component reaches the database through the operations here.
//!
//! This tool is a single-user, single-box curator, so the backend here is
//! SQLite opened against one file under the user's config directory
//! (spec §6), rather than the multi-tenant Postgres instance a server
//! deployment would use. Pool sizing and the migrate-on-open pattern carry
//! over regardless of backend.

use crate::error::{CuratorError, Result};
use crate::index::models::*;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};
use uuid::Uuid;

/// Embedded migration set, run once (idempotently) at open.
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[derive(Debug, Clone)]
pub struct PoolStats {
    pub size: u32,
    pub idle: u32,
    pub max_size: u32,
    pub min_idle: u32,
}

/// Serializes mutations and multi-statement operations via SQLite's own
/// single-writer model: a bounded pool plus an explicit mutex around
/// multi-row invariant writes (rename, upsert-with-title-link) that must
/// not interleave.
#[derive(Clone)]
pub struct MediaIndex {
    pool: SqlitePool,
    max_connections: u32,
    min_connections: u32,
    write_lock: std::sync::Arc<tokio::sync::Mutex<()>>,
}

impl std::fmt::Debug for MediaIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaIndex")
            .field("pool_size", &self.pool.size())
            .field("idle_connections", &self.pool.num_idle())
            .field("max_connections", &self.max_connections)
            .field("min_connections", &self.min_connections)
            .finish()
    }
}

impl MediaIndex {
    /// Open (creating if absent) the database file at `db_path`.
    pub async fn open(db_path: &Path) -> Result<Self> {
        let max_connections = std::env::var("DB_MAX_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or_else(|| num_cpus::get() as u32);
        let min_connections = std::env::var("DB_MIN_CONNECTIONS")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(1);

        let options = SqliteConnectOptions::from_str(&format!(
            "sqlite://{}",
            db_path.display()
        ))
        .map_err(|e| CuratorError::Internal(format!("invalid database path: {e}")))?
        .create_if_missing(true)
        .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections.min(max_connections))
            .acquire_timeout(std::time::Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|e| CuratorError::Internal(format!("database connection failed: {e}")))?;

        info!(
            max_connections,
            min_connections, "media index pool initialized"
        );

        let index = Self {
            pool,
            max_connections,
            min_connections,
            write_lock: std::sync::Arc::new(tokio::sync::Mutex::new(())),
        };
        index.initialize_schema().await?;
        Ok(index)
    }

    /// For tests: wrap an already-migrated pool.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self {
            pool,
            max_connections: 5,
            min_connections: 1,
            write_lock: std::sync::Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: self.pool.num_idle() as u32,
            max_size: self.max_connections,
            min_idle: self.min_connections,
        }
    }

    async fn initialize_schema(&self) -> Result<()> {
        MIGRATOR.run(&self.pool).await?;
        Ok(())
    }

    // ---- MediaFile operations (spec §4.5) ----------------------------

    /// Insert-or-update by `path`; recomputes `quality_score`.
    pub async fn upsert_media_file(&self, mut file: MediaFile) -> Result<MediaFile> {
        let _guard = self.write_lock.lock().await;

        file.quality_score = crate::quality::quality_score(crate::quality::QualityInputs {
            resolution: file.resolution.as_deref(),
            source: file.source_type.as_deref(),
            size_bytes: file.size,
            kind: file.kind,
        });

        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let existing: Option<(String,)> =
            sqlx::query_as("SELECT id FROM media_files WHERE path = ?")
                .bind(path_key(&file.path))
                .fetch_optional(&mut *tx)
                .await?;

        if let Some((id,)) = existing {
            file.id = Uuid::parse_str(&id)
                .map_err(|e| CuratorError::Internal(format!("corrupt id in row: {e}")))?;
            file.updated_at = now;
            sqlx::query(
                r#"UPDATE media_files SET
                    size = ?, modified_at = ?, kind = ?, movie_id = ?, series_id = ?, episode_id = ?,
                    normalized_title = ?, year = ?, season = ?, episode = ?, resolution = ?,
                    source_type = ?, codec = ?, audio_format = ?, quality_score = ?, is_compliant = ?,
                    compliance_issues = ?, source = ?, source_priority = ?, library_root = ?,
                    confidence = ?, updated_at = ?
                   WHERE path = ?"#,
            )
            .bind(file.size as i64)
            .bind(file.modified_at.to_rfc3339())
            .bind(file.kind.as_str())
            .bind(file.movie_id.map(|u| u.to_string()))
            .bind(file.series_id.map(|u| u.to_string()))
            .bind(file.episode_id.map(|u| u.to_string()))
            .bind(&file.normalized_title)
            .bind(file.year.map(|y| y as i64))
            .bind(file.season.map(|s| s as i64))
            .bind(file.episode.map(|e| e as i64))
            .bind(&file.resolution)
            .bind(&file.source_type)
            .bind(&file.codec)
            .bind(&file.audio_format)
            .bind(file.quality_score)
            .bind(file.is_compliant)
            .bind(serde_json::to_string(&file.compliance_issues)?)
            .bind(file.source.as_str())
            .bind(file.source_priority)
            .bind(path_key(&file.library_root))
            .bind(file.confidence)
            .bind(now.to_rfc3339())
            .bind(path_key(&file.path))
            .execute(&mut *tx)
            .await?;
        } else {
            file.created_at = now;
            file.updated_at = now;
            sqlx::query(
                r#"INSERT INTO media_files (
                    id, path, size, modified_at, kind, movie_id, series_id, episode_id,
                    normalized_title, year, season, episode, resolution, source_type, codec,
                    audio_format, quality_score, is_compliant, compliance_issues, source,
                    source_priority, library_root, confidence, created_at, updated_at
                ) VALUES (?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?,?)"#,
            )
            .bind(file.id.to_string())
            .bind(path_key(&file.path))
            .bind(file.size as i64)
            .bind(file.modified_at.to_rfc3339())
            .bind(file.kind.as_str())
            .bind(file.movie_id.map(|u| u.to_string()))
            .bind(file.series_id.map(|u| u.to_string()))
            .bind(file.episode_id.map(|u| u.to_string()))
            .bind(&file.normalized_title)
            .bind(file.year.map(|y| y as i64))
            .bind(file.season.map(|s| s as i64))
            .bind(file.episode.map(|e| e as i64))
            .bind(&file.resolution)
            .bind(&file.source_type)
            .bind(&file.codec)
            .bind(&file.audio_format)
            .bind(file.quality_score)
            .bind(file.is_compliant)
            .bind(serde_json::to_string(&file.compliance_issues)?)
            .bind(file.source.as_str())
            .bind(file.source_priority)
            .bind(path_key(&file.library_root))
            .bind(file.confidence)
            .bind(file.created_at.to_rfc3339())
            .bind(file.updated_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!(path = %file.path.display(), score = file.quality_score, "upserted media file");
        Ok(file)
    }

    pub async fn get_media_file(&self, path: &Path) -> Result<Option<MediaFile>> {
        let row = sqlx::query("SELECT * FROM media_files WHERE path = ?")
            .bind(path_key(path))
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_media_file).transpose()
    }

    pub async fn get_media_file_by_id(&self, id: Uuid) -> Result<Option<MediaFile>> {
        let row = sqlx::query("SELECT * FROM media_files WHERE id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;
        row.map(row_to_media_file).transpose()
    }

    pub async fn delete_media_file(&self, path: &Path) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        sqlx::query("DELETE FROM media_files WHERE path = ?")
            .bind(path_key(path))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Atomic rename in the row; preserves id and parent links.
    pub async fn update_media_file_path(&self, old: &Path, new: &Path) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("UPDATE media_files SET path = ?, updated_at = ? WHERE path = ?")
            .bind(path_key(new))
            .bind(Utc::now().to_rfc3339())
            .bind(path_key(old))
            .execute(&mut *tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(CuratorError::NotFound(format!(
                "no media file at {}",
                old.display()
            )));
        }
        tx.commit().await?;
        Ok(())
    }

    /// Like `update_media_file_path`, but also updates `library_root` —
    /// needed when the move crosses into a different configured library
    /// root (the Consolidator, spec §4.7, always does).
    pub async fn update_media_file_path_and_root(
        &self,
        old: &Path,
        new: &Path,
        new_library_root: &Path,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "UPDATE media_files SET path = ?, library_root = ?, updated_at = ? WHERE path = ?",
        )
        .bind(path_key(new))
        .bind(path_key(new_library_root))
        .bind(Utc::now().to_rfc3339())
        .bind(path_key(old))
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(CuratorError::NotFound(format!(
                "no media file at {}",
                old.display()
            )));
        }
        tx.commit().await?;
        Ok(())
    }

    /// Grouped by `(normalized_title, year, season, episode)`; ordered by
    /// `quality_score DESC`. Null years group together unless
    /// `group_null_year_together` is false.
    pub async fn find_duplicate_movies(
        &self,
        group_null_year_together: bool,
    ) -> Result<Vec<DuplicateGroup>> {
        self.find_duplicates(MediaKind::Movie, group_null_year_together)
            .await
    }

    pub async fn find_duplicate_episodes(
        &self,
        group_null_year_together: bool,
    ) -> Result<Vec<DuplicateGroup>> {
        self.find_duplicates(MediaKind::Episode, group_null_year_together)
            .await
    }

    async fn find_duplicates(
        &self,
        kind: MediaKind,
        group_null_year_together: bool,
    ) -> Result<Vec<DuplicateGroup>> {
        let rows = sqlx::query("SELECT * FROM media_files WHERE kind = ? ORDER BY quality_score DESC, size DESC, updated_at DESC")
            .bind(kind.as_str())
            .fetch_all(&self.pool)
            .await?;

        let mut files = Vec::with_capacity(rows.len());
        for row in rows {
            files.push(row_to_media_file(row)?);
        }

        use std::collections::BTreeMap;
        // The trailing `Option<Uuid>` is a singleton marker, not part of the
        // logical grouping key: when `group_null_year_together` is false, a
        // null-year file gets its own id here so it can never share a key
        // with another null-year file (each becomes its own group of one,
        // filtered out below rather than ever counted a duplicate).
        let mut groups: BTreeMap<(String, Option<u16>, Option<u32>, Option<u32>, Option<Uuid>), Vec<MediaFile>> =
            BTreeMap::new();
        for file in files {
            if !crate::quality::meets_minimum_size(file.size, file.kind) {
                continue;
            }
            let singleton_marker = if file.year.is_none() && !group_null_year_together {
                Some(file.id)
            } else {
                None
            };
            let key = (
                file.normalized_title.clone(),
                file.year,
                file.season,
                file.episode,
                singleton_marker,
            );
            groups.entry(key).or_default().push(file);
        }

        Ok(groups
            .into_iter()
            .filter(|(_, files)| files.len() > 1)
            .map(|((title, year, season, episode, _singleton), files)| DuplicateGroup {
                normalized_title: title,
                year,
                season,
                episode,
                kind,
                files,
            })
            .collect())
    }

    pub async fn find_non_compliant_files(&self) -> Result<Vec<MediaFile>> {
        let rows = sqlx::query("SELECT * FROM media_files WHERE is_compliant = 0")
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(row_to_media_file).collect()
    }

    /// Files whose regex-derived `confidence` falls below `threshold`,
    /// lowest confidence first, capped to `limit`. Feeds the Audit generator
    /// (spec §4.7).
    pub async fn find_low_confidence_files(&self, threshold: f32, limit: u32) -> Result<Vec<MediaFile>> {
        let rows = sqlx::query(
            "SELECT * FROM media_files WHERE confidence < ? ORDER BY confidence ASC LIMIT ?",
        )
        .bind(threshold)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_media_file).collect()
    }

    /// `ScatteredConflict`s with ≥2 distinct `library_root`.
    pub async fn get_unresolved_conflicts(&self) -> Result<Vec<ScatteredConflict>> {
        let rows = sqlx::query(
            r#"SELECT normalized_title, year, kind, GROUP_CONCAT(DISTINCT library_root) AS roots
               FROM media_files
               GROUP BY normalized_title, year, kind
               HAVING COUNT(DISTINCT library_root) >= 2"#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut conflicts = Vec::new();
        for row in rows {
            let title: String = row.try_get("normalized_title")?;
            let year: Option<i64> = row.try_get("year")?;
            let kind: String = row.try_get("kind")?;
            let roots: String = row.try_get("roots")?;
            conflicts.push(ScatteredConflict {
                id: Uuid::new_v4(),
                normalized_title: title,
                year: year.map(|y| y as u16),
                kind: if kind == "movie" {
                    MediaKind::Movie
                } else {
                    MediaKind::Episode
                },
                library_roots: roots.split(',').map(PathBuf::from).collect(),
            });
        }
        Ok(conflicts)
    }

    /// Library roots already holding at least one file for `title`/`year` of
    /// `kind` (spec §4.6 steps 3/4). Generalized over kind so the Library
    /// Selector can run the same existing-locations logic for movies and
    /// episodes alike.
    pub async fn find_title_locations(
        &self,
        title: &str,
        year: Option<u16>,
        kind: MediaKind,
    ) -> Result<Vec<PathBuf>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT library_root FROM media_files WHERE normalized_title = ? AND (year = ? OR (? IS NULL AND year IS NULL)) AND kind = ?",
        )
        .bind(title)
        .bind(year.map(|y| y as i64))
        .bind(year.map(|y| y as i64))
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|(r,)| PathBuf::from(r)).collect())
    }

    /// How many distinct items for `title`/`year` of `kind` already live
    /// under `root` — episode count for TV, file count for movies (a movie
    /// title has at most a handful of cuts/editions, never seasons). Used to
    /// break ties between libraries that both already hold the title (spec
    /// §4.6 step 4).
    pub async fn count_title_in_library(
        &self,
        root: &Path,
        title: &str,
        year: Option<u16>,
        kind: MediaKind,
    ) -> Result<u32> {
        let row: (i64,) = match kind {
            MediaKind::Episode => {
                sqlx::query_as(
                    "SELECT COUNT(DISTINCT season || '-' || episode) FROM media_files
                     WHERE library_root = ? AND normalized_title = ? AND (year = ? OR (? IS NULL AND year IS NULL)) AND kind = 'episode'",
                )
                .bind(path_key(root))
                .bind(title)
                .bind(year.map(|y| y as i64))
                .bind(year.map(|y| y as i64))
                .fetch_one(&self.pool)
                .await?
            }
            MediaKind::Movie => {
                sqlx::query_as(
                    "SELECT COUNT(*) FROM media_files
                     WHERE library_root = ? AND normalized_title = ? AND (year = ? OR (? IS NULL AND year IS NULL)) AND kind = 'movie'",
                )
                .bind(path_key(root))
                .bind(title)
                .bind(year.map(|y| y as i64))
                .bind(year.map(|y| y as i64))
                .fetch_one(&self.pool)
                .await?
            }
        };
        Ok(row.0 as u32)
    }

    pub async fn get_best_movie_file(&self, title: &str, year: Option<u16>) -> Result<Option<MediaFile>> {
        let row = sqlx::query(
            "SELECT * FROM media_files WHERE normalized_title = ? AND (year = ? OR (? IS NULL AND year IS NULL)) AND kind = 'movie' ORDER BY quality_score DESC LIMIT 1",
        )
        .bind(title)
        .bind(year.map(|y| y as i64))
        .bind(year.map(|y| y as i64))
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_media_file).transpose()
    }

    /// All files for a title regardless of library root, ordered by path for
    /// determinism. Used by the Consolidator (spec §4.7) to enumerate every
    /// file a `ScatteredConflict` covers.
    pub async fn find_media_files_by_title(
        &self,
        title: &str,
        year: Option<u16>,
        kind: MediaKind,
    ) -> Result<Vec<MediaFile>> {
        let rows = sqlx::query(
            "SELECT * FROM media_files WHERE normalized_title = ? AND (year = ? OR (? IS NULL AND year IS NULL)) AND kind = ? ORDER BY path ASC",
        )
        .bind(title)
        .bind(year.map(|y| y as i64))
        .bind(year.map(|y| y as i64))
        .bind(kind.as_str())
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_media_file).collect()
    }

    pub async fn get_series_by_title(&self, title: &str, year: Option<u16>) -> Result<Option<Title>> {
        self.get_title(title, year, MediaKind::Episode).await
    }

    pub async fn get_movie_by_title(&self, title: &str, year: Option<u16>) -> Result<Option<Title>> {
        self.get_title(title, year, MediaKind::Movie).await
    }

    async fn get_title(&self, title: &str, year: Option<u16>, kind: MediaKind) -> Result<Option<Title>> {
        let row = sqlx::query(
            "SELECT * FROM titles WHERE normalized_title = ? AND (year = ? OR (? IS NULL AND year IS NULL)) AND kind = ?",
        )
        .bind(title)
        .bind(year.map(|y| y as i64))
        .bind(year.map(|y| y as i64))
        .bind(kind.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_title).transpose()
    }

    pub async fn upsert_title(&self, mut title: Title) -> Result<Title> {
        let _guard = self.write_lock.lock().await;
        let now = Utc::now();
        let existing: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM titles WHERE normalized_title = ? AND (year = ? OR (? IS NULL AND year IS NULL)) AND kind = ?",
        )
        .bind(&title.normalized_title)
        .bind(title.year.map(|y| y as i64))
        .bind(title.year.map(|y| y as i64))
        .bind(title.kind.as_str())
        .fetch_optional(&self.pool)
        .await?;

        if let Some((id,)) = existing {
            title.id = Uuid::parse_str(&id).map_err(|e| CuratorError::Internal(e.to_string()))?;
            title.updated_at = now;
            sqlx::query(
                "UPDATE titles SET canonical_path = ?, source = ?, total_files = ?, updated_at = ? WHERE id = ?",
            )
            .bind(path_key(&title.canonical_path))
            .bind(title.source.as_str())
            .bind(title.total_files as i64)
            .bind(now.to_rfc3339())
            .bind(title.id.to_string())
            .execute(&self.pool)
            .await?;
        } else {
            title.created_at = now;
            title.updated_at = now;
            sqlx::query(
                "INSERT INTO titles (id, kind, normalized_title, year, canonical_path, source, total_files, created_at, updated_at) VALUES (?,?,?,?,?,?,?,?,?)",
            )
            .bind(title.id.to_string())
            .bind(title.kind.as_str())
            .bind(&title.normalized_title)
            .bind(title.year.map(|y| y as i64))
            .bind(path_key(&title.canonical_path))
            .bind(title.source.as_str())
            .bind(title.total_files as i64)
            .bind(title.created_at.to_rfc3339())
            .bind(title.updated_at.to_rfc3339())
            .execute(&self.pool)
            .await?;
        }
        Ok(title)
    }

    pub async fn count_media_files(&self) -> Result<u64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM media_files")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0 as u64)
    }

    pub async fn get_consolidation_stats(&self, group_null_year_together: bool) -> Result<ConsolidationStats> {
        let total_media_files = self.count_media_files().await?;
        let total_movies: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM titles WHERE kind = 'movie'")
            .fetch_one(&self.pool)
            .await?;
        let total_series: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM titles WHERE kind = 'episode'")
            .fetch_one(&self.pool)
            .await?;
        let non_compliant: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM media_files WHERE is_compliant = 0")
            .fetch_one(&self.pool)
            .await?;

        let dup_movies = self.find_duplicate_movies(group_null_year_together).await?;
        let dup_episodes = self.find_duplicate_episodes(group_null_year_together).await?;
        let duplicate_groups = (dup_movies.len() + dup_episodes.len()) as u64;
        let space_reclaimable_bytes = dup_movies
            .iter()
            .chain(dup_episodes.iter())
            .map(|g| g.space_reclaimable())
            .sum();

        let conflicts = self.get_unresolved_conflicts().await?;

        Ok(ConsolidationStats {
            total_media_files,
            total_movies: total_movies.0 as u64,
            total_series: total_series.0 as u64,
            duplicate_groups,
            space_reclaimable_bytes,
            non_compliant_files: non_compliant.0 as u64,
            scattered_conflicts: conflicts.len() as u64,
        })
    }

    pub async fn log_operation(&self, entry: OperationLogEntry) -> Result<()> {
        sqlx::query(
            "INSERT INTO operation_log (id, kind, source_path, target_path, reason, bytes_from, bytes_to, duration_ms, origin, created_at) VALUES (?,?,?,?,?,?,?,?,?,?)",
        )
        .bind(entry.id.to_string())
        .bind(&entry.kind)
        .bind(entry.source_path.as_ref().map(|p| path_key(p)))
        .bind(entry.target_path.as_ref().map(|p| path_key(p)))
        .bind(&entry.reason)
        .bind(entry.bytes_from.map(|b| b as i64))
        .bind(entry.bytes_to.map(|b| b as i64))
        .bind(entry.duration_ms.map(|d| d as i64))
        .bind(&entry.origin)
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- Parse cache (spec §3 ParseCacheEntry, §4.4 step 4/10) -------

    pub async fn get_cache_entry(
        &self,
        normalized_input: &str,
        kind: MediaKind,
        model: &str,
    ) -> Result<Option<ParseCacheEntry>> {
        let row = sqlx::query(
            "SELECT * FROM parse_cache WHERE normalized_input = ? AND kind = ? AND model = ?",
        )
        .bind(normalized_input)
        .bind(kind.as_str())
        .bind(model)
        .fetch_optional(&self.pool)
        .await?;
        row.map(row_to_cache_entry).transpose()
    }

    pub async fn put_cache_entry(&self, entry: &ParseCacheEntry) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO parse_cache (normalized_input, kind, model, title, year, season, episode, confidence, latency_ms, usage_count, last_used_at, created_at)
               VALUES (?,?,?,?,?,?,?,?,?,?,?,?)
               ON CONFLICT(normalized_input, kind, model) DO UPDATE SET
                 title = excluded.title, year = excluded.year, season = excluded.season,
                 episode = excluded.episode, confidence = excluded.confidence,
                 latency_ms = excluded.latency_ms, last_used_at = excluded.last_used_at"#,
        )
        .bind(&entry.normalized_input)
        .bind(entry.kind.as_str())
        .bind(&entry.model)
        .bind(&entry.title)
        .bind(entry.year.map(|y| y as i64))
        .bind(entry.season.map(|s| s as i64))
        .bind(entry.episode.map(|e| e as i64))
        .bind(entry.confidence)
        .bind(entry.latency_ms as i64)
        .bind(entry.usage_count as i64)
        .bind(entry.last_used_at.to_rfc3339())
        .bind(entry.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Monotonic usage-count bump. Best-effort: callers never propagate
    /// failures from this (spec §4.4 step 4).
    pub async fn bump_cache_usage(&self, normalized_input: &str, kind: MediaKind, model: &str) -> Result<()> {
        sqlx::query(
            "UPDATE parse_cache SET usage_count = usage_count + 1, last_used_at = ? WHERE normalized_input = ? AND kind = ? AND model = ?",
        )
        .bind(Utc::now().to_rfc3339())
        .bind(normalized_input)
        .bind(kind.as_str())
        .bind(model)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Evicts entries older than 90 days with `usage_count < 5`.
    pub async fn gc_cache(&self) -> Result<u64> {
        let cutoff = (Utc::now() - chrono::Duration::days(90)).to_rfc3339();
        let result = sqlx::query(
            "DELETE FROM parse_cache WHERE usage_count < 5 AND created_at < ?",
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    // ---- Skipped items -------------------------------------------------

    pub async fn record_skipped_item(&self, item: &SkippedItem) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO skipped_items (id, path, reason, error_details, ai_attempted, ai_result, attempts, status, created_at, updated_at)
               VALUES (?,?,?,?,?,?,?,?,?,?)
               ON CONFLICT(path) DO UPDATE SET
                 reason = excluded.reason, error_details = excluded.error_details,
                 ai_attempted = excluded.ai_attempted, ai_result = excluded.ai_result,
                 attempts = excluded.attempts, status = excluded.status, updated_at = excluded.updated_at"#,
        )
        .bind(item.id.to_string())
        .bind(path_key(&item.path))
        .bind(&item.reason)
        .bind(&item.error_details)
        .bind(item.ai_attempted)
        .bind(&item.ai_result)
        .bind(item.attempts as i64)
        .bind(format!("{:?}", item.status).to_lowercase())
        .bind(item.created_at.to_rfc3339())
        .bind(item.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ---- Background enhancement queue (AIImprovement, spec §4.4.2) --

    pub async fn enqueue_improvement(&self, item: &AiImprovement) -> Result<()> {
        sqlx::query(
            r#"INSERT INTO ai_improvements (request_id, filename, user_title, user_type, user_year, status, attempts, model, created_at, updated_at)
               VALUES (?,?,?,?,?,?,?,?,?,?)"#,
        )
        .bind(&item.request_id)
        .bind(&item.filename)
        .bind(&item.user_title)
        .bind(item.user_type.as_str())
        .bind(item.user_year.map(|y| y as i64))
        .bind(item.status.as_str())
        .bind(item.attempts as i64)
        .bind(&item.model)
        .bind(item.created_at.to_rfc3339())
        .bind(item.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn dequeue_improvement(&self) -> Result<Option<AiImprovement>> {
        let _guard = self.write_lock.lock().await;
        let row = sqlx::query("SELECT * FROM ai_improvements WHERE status = 'pending' ORDER BY created_at ASC LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        let Some(row) = row else { return Ok(None) };
        let mut item = row_to_improvement(row)?;
        item.status = QueueStatus::Processing;
        item.attempts += 1;
        item.updated_at = Utc::now();
        sqlx::query("UPDATE ai_improvements SET status = 'processing', attempts = ?, updated_at = ? WHERE request_id = ?")
            .bind(item.attempts as i64)
            .bind(item.updated_at.to_rfc3339())
            .bind(&item.request_id)
            .execute(&self.pool)
            .await?;
        Ok(Some(item))
    }

    pub async fn complete_improvement(
        &self,
        request_id: &str,
        ai_title: &str,
        ai_type: MediaKind,
        ai_year: Option<u16>,
        ai_confidence: f32,
    ) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            "UPDATE ai_improvements SET status = 'completed', ai_title = ?, ai_type = ?, ai_year = ?, ai_confidence = ?, completed_at = ?, updated_at = ? WHERE request_id = ?",
        )
        .bind(ai_title)
        .bind(ai_type.as_str())
        .bind(ai_year.map(|y| y as i64))
        .bind(ai_confidence)
        .bind(now.to_rfc3339())
        .bind(now.to_rfc3339())
        .bind(request_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn fail_improvement(&self, request_id: &str, error: &str) -> Result<()> {
        sqlx::query(
            "UPDATE ai_improvements SET status = 'failed', error = ?, updated_at = ? WHERE request_id = ?",
        )
        .bind(error)
        .bind(Utc::now().to_rfc3339())
        .bind(request_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn requeue_improvement(&self, request_id: &str) -> Result<()> {
        sqlx::query("UPDATE ai_improvements SET status = 'pending', updated_at = ? WHERE request_id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(request_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn queue_depth_by_status(&self) -> Result<std::collections::HashMap<String, u64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM ai_improvements GROUP BY status")
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|(s, c)| (s, c as u64)).collect())
    }
}

fn path_key(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn row_to_media_file(row: sqlx::sqlite::SqliteRow) -> Result<MediaFile> {
    let id: String = row.try_get("id")?;
    let kind: String = row.try_get("kind")?;
    let source: String = row.try_get("source")?;
    let compliance_issues: String = row.try_get("compliance_issues")?;
    let modified_at: String = row.try_get("modified_at")?;
    let created_at: String = row.try_get("created_at")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(MediaFile {
        id: Uuid::parse_str(&id).map_err(|e| CuratorError::Internal(e.to_string()))?,
        path: PathBuf::from(row.try_get::<String, _>("path")?),
        size: row.try_get::<i64, _>("size")? as u64,
        modified_at: parse_dt(&modified_at)?,
        kind: if kind == "movie" { MediaKind::Movie } else { MediaKind::Episode },
        movie_id: row
            .try_get::<Option<String>, _>("movie_id")?
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .map_err(|e| CuratorError::Internal(e.to_string()))?,
        series_id: row
            .try_get::<Option<String>, _>("series_id")?
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .map_err(|e| CuratorError::Internal(e.to_string()))?,
        episode_id: row
            .try_get::<Option<String>, _>("episode_id")?
            .map(|s| Uuid::parse_str(&s))
            .transpose()
            .map_err(|e| CuratorError::Internal(e.to_string()))?,
        normalized_title: row.try_get("normalized_title")?,
        year: row.try_get::<Option<i64>, _>("year")?.map(|y| y as u16),
        season: row.try_get::<Option<i64>, _>("season")?.map(|s| s as u32),
        episode: row.try_get::<Option<i64>, _>("episode")?.map(|e| e as u32),
        resolution: row.try_get("resolution")?,
        source_type: row.try_get("source_type")?,
        codec: row.try_get("codec")?,
        audio_format: row.try_get("audio_format")?,
        quality_score: row.try_get("quality_score")?,
        is_compliant: row.try_get("is_compliant")?,
        compliance_issues: serde_json::from_str(&compliance_issues).unwrap_or_default(),
        source: match source.as_str() {
            "sonarr-equivalent" => FileSource::SonarrEquivalent,
            "radarr-equivalent" => FileSource::RadarrEquivalent,
            "consolidate" => FileSource::Consolidate,
            _ => FileSource::Filesystem,
        },
        source_priority: row.try_get("source_priority")?,
        library_root: PathBuf::from(row.try_get::<String, _>("library_root")?),
        confidence: row.try_get("confidence")?,
        created_at: parse_dt(&created_at)?,
        updated_at: parse_dt(&updated_at)?,
    })
}

fn row_to_title(row: sqlx::sqlite::SqliteRow) -> Result<Title> {
    let id: String = row.try_get("id")?;
    let kind: String = row.try_get("kind")?;
    let source: String = row.try_get("source")?;
    Ok(Title {
        id: Uuid::parse_str(&id).map_err(|e| CuratorError::Internal(e.to_string()))?,
        kind: if kind == "movie" { MediaKind::Movie } else { MediaKind::Episode },
        normalized_title: row.try_get("normalized_title")?,
        year: row.try_get::<Option<i64>, _>("year")?.map(|y| y as u16),
        canonical_path: PathBuf::from(row.try_get::<String, _>("canonical_path")?),
        source: match source.as_str() {
            "sonarr-equivalent" => FileSource::SonarrEquivalent,
            "radarr-equivalent" => FileSource::RadarrEquivalent,
            "consolidate" => FileSource::Consolidate,
            _ => FileSource::Filesystem,
        },
        total_files: row.try_get::<i64, _>("total_files")? as u32,
        created_at: parse_dt(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_dt(&row.try_get::<String, _>("updated_at")?)?,
    })
}

fn row_to_cache_entry(row: sqlx::sqlite::SqliteRow) -> Result<ParseCacheEntry> {
    let kind: String = row.try_get("kind")?;
    Ok(ParseCacheEntry {
        normalized_input: row.try_get("normalized_input")?,
        kind: if kind == "movie" { MediaKind::Movie } else { MediaKind::Episode },
        model: row.try_get("model")?,
        title: row.try_get("title")?,
        year: row.try_get::<Option<i64>, _>("year")?.map(|y| y as u16),
        season: row.try_get::<Option<i64>, _>("season")?.map(|s| s as u32),
        episode: row.try_get::<Option<i64>, _>("episode")?.map(|e| e as u32),
        confidence: row.try_get("confidence")?,
        latency_ms: row.try_get::<i64, _>("latency_ms")? as u32,
        usage_count: row.try_get::<i64, _>("usage_count")? as u32,
        last_used_at: parse_dt(&row.try_get::<String, _>("last_used_at")?)?,
        created_at: parse_dt(&row.try_get::<String, _>("created_at")?)?,
    })
}

fn row_to_improvement(row: sqlx::sqlite::SqliteRow) -> Result<AiImprovement> {
    let user_type: String = row.try_get("user_type")?;
    let status: String = row.try_get("status")?;
    let ai_type: Option<String> = row.try_get("ai_type")?;
    Ok(AiImprovement {
        request_id: row.try_get("request_id")?,
        filename: row.try_get("filename")?,
        user_title: row.try_get("user_title")?,
        user_type: if user_type == "movie" { MediaKind::Movie } else { MediaKind::Episode },
        user_year: row.try_get::<Option<i64>, _>("user_year")?.map(|y| y as u16),
        ai_title: row.try_get("ai_title")?,
        ai_type: ai_type.map(|t| if t == "movie" { MediaKind::Movie } else { MediaKind::Episode }),
        ai_year: row.try_get::<Option<i64>, _>("ai_year")?.map(|y| y as u16),
        ai_confidence: row.try_get("ai_confidence")?,
        status: match status.as_str() {
            "processing" => QueueStatus::Processing,
            "completed" => QueueStatus::Completed,
            "failed" => QueueStatus::Failed,
            _ => QueueStatus::Pending,
        },
        attempts: row.try_get::<i64, _>("attempts")? as u32,
        error: row.try_get("error")?,
        model: row.try_get("model")?,
        created_at: parse_dt(&row.try_get::<String, _>("created_at")?)?,
        updated_at: parse_dt(&row.try_get::<String, _>("updated_at")?)?,
        completed_at: row
            .try_get::<Option<String>, _>("completed_at")?
            .map(|s| parse_dt(&s))
            .transpose()?,
    })
}

fn parse_dt(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| CuratorError::Internal(format!("corrupt timestamp '{s}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_file(path: &str, title: &str, resolution: &str, size_gb: u64) -> MediaFile {
        let now = Utc::now();
        MediaFile {
            id: Uuid::new_v4(),
            path: PathBuf::from(path),
            size: size_gb * 1024 * 1024 * 1024,
            modified_at: now,
            kind: MediaKind::Episode,
            movie_id: None,
            series_id: None,
            episode_id: None,
            normalized_title: title.to_string(),
            year: Some(2020),
            season: Some(1),
            episode: Some(1),
            resolution: Some(resolution.to_string()),
            source_type: Some("BluRay".to_string()),
            codec: None,
            audio_format: None,
            quality_score: 0,
            is_compliant: true,
            compliance_issues: vec![],
            source: FileSource::Filesystem,
            source_priority: FileSource::Filesystem.priority(),
            library_root: PathBuf::from("/lib"),
            confidence: 1.0,
            created_at: now,
            updated_at: now,
        }
    }

    #[sqlx::test(migrator = "MIGRATOR")]
    async fn upsert_then_fetch_roundtrips(pool: sqlx::SqlitePool) {
        let index = MediaIndex::from_pool(pool);
        let file = sample_file("/lib/Show (2020)/S01E01 1080p BluRay.mkv", "show", "1080p", 2);
        let saved = index.upsert_media_file(file.clone()).await.unwrap();
        assert!(saved.quality_score > 0);

        let fetched = index.get_media_file(&file.path).await.unwrap().unwrap();
        assert_eq!(fetched.normalized_title, "show");
    }

    #[sqlx::test(migrator = "MIGRATOR")]
    async fn duplicate_group_orders_best_first(pool: sqlx::SqlitePool) {
        let index = MediaIndex::from_pool(pool);
        let hi = sample_file("/a/Show (2020)/S01E01 1080p BluRay.mkv", "show", "1080p", 8);
        let lo = sample_file("/b/Show (2020)/S01E01 720p WEB-DL.mkv", "show", "720p", 1);
        index.upsert_media_file(hi.clone()).await.unwrap();
        index.upsert_media_file(lo.clone()).await.unwrap();

        let groups = index.find_duplicate_episodes(true).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].best().path, hi.path);
    }

    #[sqlx::test(migrator = "MIGRATOR")]
    async fn null_year_duplicates_group_together_when_enabled(pool: sqlx::SqlitePool) {
        let index = MediaIndex::from_pool(pool);
        let mut hi = sample_file("/a/Show/S01E01 1080p BluRay.mkv", "show", "1080p", 8);
        hi.year = None;
        let mut lo = sample_file("/b/Show/S01E01 720p WEB-DL.mkv", "show", "720p", 1);
        lo.year = None;
        index.upsert_media_file(hi.clone()).await.unwrap();
        index.upsert_media_file(lo.clone()).await.unwrap();

        let groups = index.find_duplicate_episodes(true).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].files.len(), 2);
    }

    #[sqlx::test(migrator = "MIGRATOR")]
    async fn null_year_files_are_singletons_when_grouping_disabled(pool: sqlx::SqlitePool) {
        let index = MediaIndex::from_pool(pool);
        let mut hi = sample_file("/a/Show/S01E01 1080p BluRay.mkv", "show", "1080p", 8);
        hi.year = None;
        let mut lo = sample_file("/b/Show/S01E01 720p WEB-DL.mkv", "show", "720p", 1);
        lo.year = None;
        index.upsert_media_file(hi).await.unwrap();
        index.upsert_media_file(lo).await.unwrap();

        // With grouping disabled, two otherwise-identical null-year files
        // never merge into one duplicate group — each gets a unique
        // singleton marker, so neither is ever reported as a duplicate.
        let groups = index.find_duplicate_episodes(false).await.unwrap();
        assert!(groups.is_empty());
    }

    #[sqlx::test(migrator = "MIGRATOR")]
    async fn rename_preserves_id(pool: sqlx::SqlitePool) {
        let index = MediaIndex::from_pool(pool);
        let file = sample_file("/lib/Show (2020)/S01E01.mkv", "show", "1080p", 2);
        let saved = index.upsert_media_file(file.clone()).await.unwrap();

        let new_path = PathBuf::from("/lib/Show (2020)/Season 01/S01E01.mkv");
        index.update_media_file_path(&file.path, &new_path).await.unwrap();

        let moved = index.get_media_file(&new_path).await.unwrap().unwrap();
        assert_eq!(moved.id, saved.id);
    }
}
