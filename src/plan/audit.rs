//! Audit plan generator (spec §4.7): pulls the lowest-confidence MediaFiles,
//! runs each through the AI Integrator, and proposes a rename when the
//! result is trustworthy enough. Kind-agreement validation is the one part
//! of this generator with real judgment calls — see `validate_kind` below.

use super::documents::{AuditAction, AuditActionKind, AuditItem, AuditPlan, AuditSummary, PlanState};
use crate::ai::{AiIntegrator, EnhancementOutcome};
use crate::external::ExternalIndexingService;
use crate::index::{MediaIndex, MediaKind, SkippedItem, SkippedStatus};
use crate::naming;
use crate::parse::LibraryHint;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Proposed renames below this confidence are skipped (spec §4.7).
pub const CONFIDENCE_THRESHOLD: f32 = 0.6;

pub struct AuditOptions<'a> {
    pub limit: u32,
    pub confidence_threshold: f32,
    pub libraries_tv: &'a [PathBuf],
    pub libraries_movies: &'a [PathBuf],
    pub strict_kind_agreement: bool,
    pub tv_service: Option<&'a dyn ExternalIndexingService>,
    pub movie_service: Option<&'a dyn ExternalIndexingService>,
}

pub async fn generate(
    index: &MediaIndex,
    integrator: &AiIntegrator,
    opts: AuditOptions<'_>,
) -> crate::error::Result<AuditPlan> {
    let candidates = index
        .find_low_confidence_files(opts.confidence_threshold, opts.limit)
        .await?;

    let mut items = Vec::with_capacity(candidates.len());
    let mut actions = Vec::new();
    let mut skipped = 0usize;

    for file in &candidates {
        let hint = library_hint(&file.library_root, opts.libraries_tv, opts.libraries_movies);
        items.push(AuditItem {
            path: file.path.clone(),
            regex_title: file.normalized_title.clone(),
            regex_confidence: file.confidence,
            library_kind: file.kind,
        });

        let filename = match file.path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => {
                skipped += 1;
                record_skip(index, &file.path, "filename has no valid utf-8 component", false, None).await;
                continue;
            }
        };

        let outcome = integrator.enhance_filename(filename, hint).await?;
        let ai_attempted = !matches!(outcome, EnhancementOutcome::FastPath(_));
        let (parsed, confidence) = match outcome {
            EnhancementOutcome::AiEnhanced(parsed, confidence) => (parsed, confidence),
            EnhancementOutcome::CacheHit(parsed, confidence) => (parsed, confidence),
            // Fast path / queued-for-retry never went through AI; nothing new
            // to propose.
            EnhancementOutcome::FastPath(_) => {
                skipped += 1;
                continue;
            }
            EnhancementOutcome::QueuedForRetry(_) => {
                skipped += 1;
                record_skip(index, &file.path, "ai unavailable, enhancement queued for retry", true, None).await;
                continue;
            }
        };

        let ai_kind = MediaKind::from_parsed_kind(parsed.kind);
        if ai_kind != file.kind
            && !validate_kind(
                ai_kind,
                file.kind,
                &parsed.title,
                opts.strict_kind_agreement,
                opts.tv_service,
                opts.movie_service,
            )
            .await
        {
            debug!(path = %file.path.display(), "audit: kind disagreement unresolved, skipping");
            skipped += 1;
            record_skip(
                index,
                &file.path,
                "ai kind disagrees with library and external services",
                ai_attempted,
                Some(parsed.title.clone()),
            )
            .await;
            continue;
        }

        if confidence < CONFIDENCE_THRESHOLD || parsed.title == file.normalized_title {
            skipped += 1;
            let reason = if confidence < CONFIDENCE_THRESHOLD {
                "ai confidence below threshold"
            } else {
                "ai title matches existing regex title, nothing to propose"
            };
            record_skip(index, &file.path, reason, ai_attempted, Some(parsed.title.clone())).await;
            continue;
        }

        let new_path = file
            .path
            .parent()
            .map(|dir| dir.join(naming::expected_name(&file.path, &parsed)));

        actions.push(AuditAction {
            source_path: file.path.clone(),
            action: AuditActionKind::Rename,
            new_title: parsed.title.clone(),
            new_year: parsed.year,
            new_season: parsed.season,
            new_episode: parsed.primary_episode(),
            new_path,
            reasoning: format!("ai proposed '{}' over regex title '{}'", parsed.title, file.normalized_title),
            confidence,
        });
    }

    info!(items = items.len(), proposed = actions.len(), skipped, "audit plan generated");

    Ok(AuditPlan {
        summary: AuditSummary {
            items: items.len(),
            proposed_renames: actions.len(),
            skipped,
        },
        items,
        actions,
        state: PlanState::Draft,
    })
}

/// Records a `SkippedItem` row (spec §3) for a candidate the audit pass
/// declined to act on. Best-effort: a failure here never interrupts plan
/// generation.
async fn record_skip(
    index: &MediaIndex,
    path: &Path,
    reason: &str,
    ai_attempted: bool,
    ai_result: Option<String>,
) {
    let now = Utc::now();
    let item = SkippedItem {
        id: Uuid::new_v4(),
        path: path.to_path_buf(),
        reason: reason.to_string(),
        error_details: None,
        ai_attempted,
        ai_result,
        attempts: 1,
        status: SkippedStatus::Open,
        created_at: now,
        updated_at: now,
    };
    if let Err(e) = index.record_skipped_item(&item).await {
        warn!(path = %path.display(), error = %e, "failed to record skipped item");
    }
}

fn library_hint(library_root: &std::path::Path, tv: &[PathBuf], movies: &[PathBuf]) -> LibraryHint {
    if tv.iter().any(|r| library_root == r) {
        LibraryHint::TvShows
    } else if movies.iter().any(|r| library_root == r) {
        LibraryHint::Movies
    } else {
        LibraryHint::Unknown
    }
}

/// The AI result's kind disagreed with the library-root hint. Secondary
/// validation: consult both external services by title; reject only when
/// both agree against the AI's claim (spec §4.7). With no service configured
/// or an ambiguous double-match, `strict_kind_agreement` decides whether to
/// trust the AI anyway (lenient, default) or refuse (strict).
async fn validate_kind(
    ai_kind: MediaKind,
    _library_kind: MediaKind,
    title: &str,
    strict: bool,
    tv_service: Option<&dyn ExternalIndexingService>,
    movie_service: Option<&dyn ExternalIndexingService>,
) -> bool {
    let tv_found = match tv_service {
        Some(svc) => svc.find_series_by_title(title).await.map(|m| !m.is_empty()).unwrap_or(false),
        None => false,
    };
    let movie_found = match movie_service {
        Some(svc) => svc.lookup_movie(title).await.map(|m| !m.is_empty()).unwrap_or(false),
        None => false,
    };

    match (tv_found, movie_found) {
        (true, true) => {
            warn!(title, "audit: both external services claim this title, ambiguous");
            false
        }
        // Exactly one service confirms a match: accept the AI's claim only
        // when that service's domain (TV or movie) is the one AI picked.
        (true, false) => ai_kind == MediaKind::Episode,
        (false, true) => ai_kind == MediaKind::Movie,
        (false, false) => !strict,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn library_hint_matches_configured_root() {
        let tv = vec![PathBuf::from("/mnt/tv")];
        let movies = vec![PathBuf::from("/mnt/movies")];
        assert_eq!(library_hint(&PathBuf::from("/mnt/tv"), &tv, &movies), LibraryHint::TvShows);
        assert_eq!(library_hint(&PathBuf::from("/mnt/movies"), &tv, &movies), LibraryHint::Movies);
        assert_eq!(library_hint(&PathBuf::from("/mnt/other"), &tv, &movies), LibraryHint::Unknown);
    }

    #[tokio::test]
    async fn validate_kind_lenient_accepts_with_no_services_configured() {
        let accepted = validate_kind(MediaKind::Episode, MediaKind::Movie, "Dracula", false, None, None).await;
        assert!(accepted);
    }

    #[tokio::test]
    async fn validate_kind_strict_rejects_with_no_services_configured() {
        let accepted = validate_kind(MediaKind::Episode, MediaKind::Movie, "Dracula", true, None, None).await;
        assert!(!accepted);
    }
}
