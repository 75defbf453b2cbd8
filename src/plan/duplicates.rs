//! Duplicates plan generator (spec §4.7): one `{keep, delete}` pair per
//! `DuplicateGroup`, keep always the highest-`quality_score` file. Never
//! emits more than one deletion per group per invocation — a group with
//! three copies takes two runs of `duplicates --execute` to fully collapse.

use super::documents::{DuplicateItem, DuplicatePlan, DuplicateSummary, FileRef, PlanState};
use crate::index::MediaIndex;
use tracing::info;

pub async fn generate(
    index: &MediaIndex,
    group_null_year_together: bool,
) -> crate::error::Result<DuplicatePlan> {
    let mut movie_groups = index.find_duplicate_movies(group_null_year_together).await?;
    let mut episode_groups = index.find_duplicate_episodes(group_null_year_together).await?;
    movie_groups.append(&mut episode_groups);

    let mut items = Vec::new();
    let mut space_reclaimable_bytes = 0u64;

    for group in &movie_groups {
        if group.files.len() < 2 {
            continue;
        }
        let best = group.best();
        // Worst-ranked file in the group (list is quality_score DESC, size
        // DESC, updated_at DESC); a rerun after this deletion clears the
        // next one.
        let worst = group.files.last().expect("checked len >= 2 above");

        space_reclaimable_bytes += worst.size;
        items.push(DuplicateItem {
            group_id: format!(
                "{}:{}:{}:{}",
                group.normalized_title,
                group.year.map(|y| y.to_string()).unwrap_or_default(),
                group.season.map(|s| s.to_string()).unwrap_or_default(),
                group.episode.map(|e| e.to_string()).unwrap_or_default(),
            ),
            kind: group.kind,
            title: group.normalized_title.clone(),
            year: group.year,
            season: group.season,
            episode: group.episode,
            keep: FileRef {
                path: best.path.clone(),
                size: best.size,
            },
            delete: FileRef {
                path: worst.path.clone(),
                size: worst.size,
            },
        });
    }

    info!(
        groups = items.len(),
        space_reclaimable_bytes, "duplicate plan generated"
    );

    Ok(DuplicatePlan {
        summary: DuplicateSummary {
            items: items.len(),
            space_reclaimable_bytes,
        },
        items,
        state: PlanState::Draft,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::{FileSource, MediaFile, MediaKind};
    use chrono::Utc;
    use sqlx::sqlite::SqlitePoolOptions;
    use std::path::PathBuf;
    use uuid::Uuid;

    async fn test_index() -> MediaIndex {
        let pool = SqlitePoolOptions::new()
            .connect("sqlite::memory:")
            .await
            .unwrap();
        crate::index::sqlite::MIGRATOR.run(&pool).await.unwrap();
        MediaIndex::from_pool(pool)
    }

    fn movie_file(path: &str, size: u64, resolution: &str) -> MediaFile {
        let now = Utc::now();
        MediaFile {
            id: Uuid::new_v4(),
            path: PathBuf::from(path),
            size,
            modified_at: now,
            kind: MediaKind::Movie,
            movie_id: None,
            series_id: None,
            episode_id: None,
            normalized_title: "dracula".to_string(),
            year: Some(2020),
            season: None,
            episode: None,
            resolution: Some(resolution.to_string()),
            source_type: Some("BluRay".to_string()),
            codec: None,
            audio_format: None,
            quality_score: 0,
            is_compliant: true,
            compliance_issues: vec![],
            source: FileSource::Filesystem,
            source_priority: 10,
            library_root: PathBuf::from("/mnt/a"),
            confidence: 0.9,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn keeps_highest_quality_deletes_lowest() {
        let index = test_index().await;
        index
            .upsert_media_file(movie_file("/a/Dracula (2020).mkv", 8 * 1024 * 1024 * 1024, "1080p"))
            .await
            .unwrap();
        index
            .upsert_media_file(movie_file("/b/Dracula (2020).mkv", 1 * 1024 * 1024 * 1024, "720p"))
            .await
            .unwrap();

        let plan = generate(&index, true).await.unwrap();
        assert_eq!(plan.items.len(), 1);
        let item = &plan.items[0];
        assert_eq!(item.keep.path, PathBuf::from("/a/Dracula (2020).mkv"));
        assert_eq!(item.delete.path, PathBuf::from("/b/Dracula (2020).mkv"));
        assert_eq!(plan.summary.space_reclaimable_bytes, item.delete.size);
    }

    #[tokio::test]
    async fn no_duplicates_yields_empty_plan() {
        let index = test_index().await;
        index
            .upsert_media_file(movie_file("/a/Dracula (2020).mkv", 8 * 1024 * 1024 * 1024, "1080p"))
            .await
            .unwrap();

        let plan = generate(&index, true).await.unwrap();
        assert!(plan.items.is_empty());
    }
}
