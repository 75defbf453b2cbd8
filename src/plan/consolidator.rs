//! Consolidator plan generator (spec §4.7): for each `ScatteredConflict`,
//! picks a target library root via the Library Selector (§4.6) and builds
//! `move` operations for every file not already under the target's title
//! directory. Drops operations whose source has disappeared since the last
//! index sync; marks a group `skipped` when no candidate root has space.

use super::documents::{ConsolidateAction, ConsolidateGroup, ConsolidateOperation, ConsolidatePlan, ConsolidateSummary, PlanState};
use crate::external::ExternalIndexingService;
use crate::index::{MediaFile, MediaIndex, MediaKind};
use crate::library::LibrarySelector;
use crate::naming;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub async fn generate(
    index: &MediaIndex,
    candidate_roots: &[PathBuf],
    external: Option<&dyn ExternalIndexingService>,
) -> crate::error::Result<ConsolidatePlan> {
    let conflicts = index.get_unresolved_conflicts().await?;
    let selector = LibrarySelector::new(index);

    let mut groups = Vec::with_capacity(conflicts.len());
    let mut reasons = Vec::new();
    let mut total_operations = 0usize;
    let mut total_bytes = 0u64;
    let mut skipped_groups = 0usize;

    for conflict in &conflicts {
        let files = index
            .find_media_files_by_title(&conflict.normalized_title, conflict.year, conflict.kind)
            .await?;
        if files.is_empty() {
            continue;
        }
        let total_size: u64 = files.iter().map(|f| f.size).sum();

        let external_path = lookup_external_path(external, &conflict.normalized_title, conflict.kind).await;

        let selection = selector
            .pick_target(
                &conflict.normalized_title,
                conflict.year,
                conflict.kind,
                total_size,
                external_path.as_deref(),
                candidate_roots,
            )
            .await?;

        let Some(selection) = selection else {
            let reason = format!(
                "no candidate library root has space for '{}' ({} bytes)",
                conflict.normalized_title, total_size
            );
            warn!(title = %conflict.normalized_title, "consolidator: skipping group, {reason}");
            reasons.push(reason.clone());
            skipped_groups += 1;
            groups.push(ConsolidateGroup {
                conflict_id: conflict.id.to_string(),
                title: conflict.normalized_title.clone(),
                year: conflict.year,
                kind: conflict.kind,
                target_root: PathBuf::new(),
                operations: vec![],
                skipped_reason: Some(reason),
            });
            continue;
        };

        let mut operations = Vec::new();
        for file in &files {
            if let Some(op) = build_operation(file, &selection.root).await {
                total_bytes += op.size;
                operations.push(op);
            }
        }
        total_operations += operations.len();

        info!(
            title = %conflict.normalized_title,
            target = %selection.root.display(),
            operations = operations.len(),
            "consolidator: group planned"
        );

        groups.push(ConsolidateGroup {
            conflict_id: conflict.id.to_string(),
            title: conflict.normalized_title.clone(),
            year: conflict.year,
            kind: conflict.kind,
            target_root: selection.root,
            operations,
            skipped_reason: None,
        });
    }

    Ok(ConsolidatePlan {
        can_proceed: skipped_groups < groups.len() || groups.is_empty(),
        reasons,
        summary: ConsolidateSummary {
            groups: groups.len(),
            operations: total_operations,
            total_bytes,
            skipped_groups,
        },
        groups,
        state: PlanState::Draft,
    })
}

async fn lookup_external_path(
    external: Option<&dyn ExternalIndexingService>,
    title: &str,
    kind: MediaKind,
) -> Option<PathBuf> {
    let service = external?;
    let result = match kind {
        MediaKind::Episode => service.find_series_by_title(title).await,
        MediaKind::Movie => service.lookup_movie(title).await,
    };
    match result {
        Ok(matches) if matches.len() == 1 => Some(matches[0].path.clone()),
        Ok(_) => None,
        Err(e) => {
            warn!(title, error = %e, "consolidator: external service lookup failed, ignoring");
            None
        }
    }
}

/// Builds the move operation for `file` under `target_root`, or `None` when
/// the file already lives under its canonical title directory there, or its
/// source has disappeared since the last sync (spec §4.7 "drop operations
/// whose source no longer exists").
async fn build_operation(file: &MediaFile, target_root: &Path) -> Option<ConsolidateOperation> {
    if tokio::fs::metadata(&file.path).await.is_err() {
        warn!(path = %file.path.display(), "consolidator: source no longer exists, dropping operation");
        return None;
    }

    let ext = file
        .path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or_default();
    let parsed = file.to_parsed_name();
    let target_info = naming::expected_target(&parsed, ext);
    let target_path = target_root.join(&target_info.folder).join(&target_info.filename);

    if super::documents::clean_path(&target_path) == super::documents::clean_path(&file.path) {
        return None;
    }

    Some(ConsolidateOperation {
        action: ConsolidateAction::Move,
        source_path: file.path.clone(),
        target_path,
        size: file.size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::FileSource;
    use chrono::Utc;
    use uuid::Uuid;

    fn episode_file(path: &str, root: &str, season: u32, episode: u32) -> MediaFile {
        let now = Utc::now();
        MediaFile {
            id: Uuid::new_v4(),
            path: PathBuf::from(path),
            size: 2 * 1024 * 1024 * 1024,
            modified_at: now,
            kind: MediaKind::Episode,
            movie_id: None,
            series_id: None,
            episode_id: None,
            normalized_title: "silo".to_string(),
            year: Some(2023),
            season: Some(season),
            episode: Some(episode),
            resolution: Some("1080p".to_string()),
            source_type: Some("WEB-DL".to_string()),
            codec: None,
            audio_format: None,
            quality_score: 300,
            is_compliant: true,
            compliance_issues: vec![],
            source: FileSource::Filesystem,
            source_priority: 10,
            library_root: PathBuf::from(root),
            confidence: 0.9,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn build_operation_none_when_source_missing() {
        let file = episode_file("/mnt/B/nonexistent/S01E02.mkv", "/mnt/B", 1, 2);
        let op = build_operation(&file, Path::new("/mnt/A")).await;
        assert!(op.is_none());
    }

    #[tokio::test]
    async fn build_operation_targets_canonical_season_folder() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let mut file = episode_file(tmp.path().to_str().unwrap(), "/mnt/B", 1, 2);
        file.path = tmp.path().to_path_buf();
        let op = build_operation(&file, Path::new("/mnt/A")).await.unwrap();
        assert!(op.target_path.to_string_lossy().contains("Season 01"));
        assert!(op.target_path.starts_with("/mnt/A"));
    }
}
