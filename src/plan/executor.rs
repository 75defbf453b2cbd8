//! Plan Executor (spec §4.8): applies a generated plan document to disk and
//! the Index. Shared semantics across all four plan kinds: `dry_run` never
//! touches disk or the Index; every operation is preflighted, transferred,
//! reconciled, and logged; a source directory is handed to Cleanup once its
//! group of operations lands; partial failure archives the plan file
//! instead of deleting it.

use super::documents::{
    AuditAction, AuditActionKind, AuditPlan, ComplianceAction, ComplianceClass, CompliancePlan,
    ConsolidateOperation, ConsolidatePlan, DuplicateItem, DuplicatePlan, PlanState, PlanStore,
};
use crate::cleanup;
use crate::external::ExternalIndexingService;
use crate::index::{MediaIndex, OperationLogEntry};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

/// Audit renames below this confidence never execute, even if the plan
/// proposed them (spec §4.8 "Confidence gate").
pub const AUDIT_EXECUTION_CONFIDENCE_GATE: f32 = 0.8;

/// Outcome of applying a single plan operation (spec §7's per-item outcome
/// triad: `{succeeded, failed, already_gone}`).
enum ApplyOutcome {
    Applied,
    AlreadyGone,
}

#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub attempted: usize,
    pub applied: usize,
    pub already_gone: usize,
    pub failed: usize,
    pub errors: Vec<String>,
}

impl ExecutionReport {
    fn record_success(&mut self) {
        self.attempted += 1;
        self.applied += 1;
    }

    fn record_already_gone(&mut self) {
        self.attempted += 1;
        self.already_gone += 1;
    }

    fn record_outcome(&mut self, outcome: ApplyOutcome) {
        match outcome {
            ApplyOutcome::Applied => self.record_success(),
            ApplyOutcome::AlreadyGone => self.record_already_gone(),
        }
    }

    fn record_failure(&mut self, context: impl Into<String>) {
        self.attempted += 1;
        self.failed += 1;
        self.errors.push(context.into());
    }

    fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}

/// Finalizes a plan's on-disk lifecycle: deleted on full success, archived
/// (`<name>.json.old`) otherwise (spec §4.8).
async fn finalize(store: &PlanStore, name: &str, report: &ExecutionReport) -> crate::error::Result<()> {
    if report.all_succeeded() {
        store.delete(name).await
    } else {
        store.archive(name).await.map(|_| ())
    }
}

/// `rename` preferred; falls back to copy+verify+unlink on `EXDEV`
/// (cross-device rename, e.g. moving between mounts).
async fn transfer_file(source: &Path, target: &Path) -> crate::error::Result<()> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    match tokio::fs::rename(source, target).await {
        Ok(()) => Ok(()),
        Err(e) if e.raw_os_error() == Some(libc_exdev()) => {
            tokio::fs::copy(source, target).await?;
            let src_len = tokio::fs::metadata(source).await?.len();
            let dst_len = tokio::fs::metadata(target).await?.len();
            if src_len != dst_len {
                let _ = tokio::fs::remove_file(target).await;
                return Err(crate::error::CuratorError::Internal(format!(
                    "copy verification failed for {}: size mismatch ({src_len} != {dst_len})",
                    target.display()
                )));
            }
            tokio::fs::remove_file(source).await?;
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// `EXDEV` is 18 on Linux and most other unix targets; this crate only
/// ships Linux deployments (spec: self-hosted streaming server).
fn libc_exdev() -> i32 {
    18
}

/// Target-disk space was already checked by the Library Selector when the
/// plan was generated (spec §4.6); this preflight only re-confirms the
/// source still exists, since the window between `generate` and `execute`
/// can be arbitrarily long.
async fn preflight(source: &Path, _size: u64) -> crate::error::Result<()> {
    if tokio::fs::metadata(source).await.is_err() {
        return Err(crate::error::CuratorError::NotFound(source.display().to_string()));
    }
    Ok(())
}

/// A missing source is only a `plan_conflict`/`permanent_io` non-event
/// (spec §7) when the move it describes already happened — i.e. the target
/// is already in place. Anything else (source gone, target also absent) is
/// a real failure, not idempotent replay.
async fn already_applied(source: &Path, target: &Path) -> bool {
    tokio::fs::metadata(source).await.is_err() && tokio::fs::metadata(target).await.is_ok()
}

/// Re-running `update_media_file_path` against a row the first execution
/// already reconciled hits zero matching rows, not an error — the row now
/// lives at `new`. Only a genuinely missing row (neither at `old` nor at
/// `new`) is worth a warning.
async fn reconcile_moved_path_idempotent(index: &MediaIndex, old: &Path, new: &Path) -> crate::error::Result<()> {
    match index.update_media_file_path(old, new).await {
        Ok(()) => Ok(()),
        Err(crate::error::CuratorError::NotFound(_)) => {
            if index.get_media_file(new).await?.is_none() {
                warn!(old = %old.display(), new = %new.display(), "executor: no index row at old or new path on replay");
            }
            Ok(())
        }
        Err(e) => Err(e),
    }
}

async fn log_move(index: &MediaIndex, source: &Path, target: &Path, size: u64, started: Instant) {
    let entry = OperationLogEntry {
        id: Uuid::new_v4(),
        kind: "move".to_string(),
        source_path: Some(source.to_path_buf()),
        target_path: Some(target.to_path_buf()),
        reason: None,
        bytes_from: Some(size),
        bytes_to: Some(size),
        duration_ms: Some(started.elapsed().as_millis() as u64),
        origin: "executor".to_string(),
        created_at: chrono::Utc::now(),
    };
    if let Err(e) = index.log_operation(entry).await {
        warn!(error = %e, "executor: failed to append operation log entry");
    }
}

async fn log_delete(index: &MediaIndex, path: &Path, reason: &str, size: u64, started: Instant) {
    let entry = OperationLogEntry {
        id: Uuid::new_v4(),
        kind: "delete".to_string(),
        source_path: Some(path.to_path_buf()),
        target_path: None,
        reason: Some(reason.to_string()),
        bytes_from: Some(size),
        bytes_to: None,
        duration_ms: Some(started.elapsed().as_millis() as u64),
        origin: "executor".to_string(),
        created_at: chrono::Utc::now(),
    };
    if let Err(e) = index.log_operation(entry).await {
        warn!(error = %e, "executor: failed to append operation log entry");
    }
}

/// Runs `cleanup_source_dir` once per distinct parent directory touched by
/// a group of operations (spec §4.8 "after a group of operations on a
/// source directory: invoke Cleanup").
async fn sweep_source_dirs(dirs: BTreeSet<PathBuf>, library_roots: &[PathBuf]) {
    for dir in dirs {
        if let Err(e) = cleanup::cleanup_source_dir(&dir, library_roots).await {
            warn!(dir = %dir.display(), error = %e, "executor: cleanup sweep failed");
        }
    }
}

async fn notify_external(external: Option<&dyn ExternalIndexingService>, path: &Path) {
    let Some(service) = external else { return };
    if let Err(e) = service.trigger_downloaded_scan(path).await {
        warn!(path = %path.display(), error = %e, "executor: external service notify failed");
    }
}

pub async fn execute_consolidate(
    index: &MediaIndex,
    store: &PlanStore,
    name: &str,
    mut plan: ConsolidatePlan,
    library_roots: &[PathBuf],
    external: Option<&dyn ExternalIndexingService>,
    dry_run: bool,
) -> crate::error::Result<(ConsolidatePlan, ExecutionReport)> {
    let mut report = ExecutionReport::default();
    let mut touched_dirs = BTreeSet::new();

    if !dry_run {
        plan.state = PlanState::Executing;
        store.save(name, &plan).await?;
    }

    for group in &plan.groups {
        for op in &group.operations {
            if dry_run {
                info!(source = %op.source_path.display(), target = %op.target_path.display(), "consolidate (dry run)");
                report.record_success();
                continue;
            }

            match apply_consolidate_operation(index, op, &group.target_root).await {
                Ok(outcome) => {
                    report.record_outcome(outcome);
                    if let Some(parent) = op.source_path.parent() {
                        touched_dirs.insert(parent.to_path_buf());
                    }
                    notify_external(external, &op.target_path).await;
                }
                Err(e) => {
                    warn!(source = %op.source_path.display(), error = %e, "consolidate operation failed");
                    report.record_failure(format!("{}: {e}", op.source_path.display()));
                }
            }
        }
    }

    if !dry_run {
        sweep_source_dirs(touched_dirs, library_roots).await;
        plan.state = if report.all_succeeded() { PlanState::Done } else { PlanState::Archived };
        finalize(store, name, &report).await?;
    }

    Ok((plan, report))
}

async fn apply_consolidate_operation(
    index: &MediaIndex,
    op: &ConsolidateOperation,
    target_root: &Path,
) -> crate::error::Result<ApplyOutcome> {
    if already_applied(&op.source_path, &op.target_path).await {
        match index
            .update_media_file_path_and_root(&op.source_path, &op.target_path, target_root)
            .await
        {
            Ok(()) => {}
            Err(crate::error::CuratorError::NotFound(_)) => {
                if index.get_media_file(&op.target_path).await?.is_none() {
                    warn!(
                        old = %op.source_path.display(),
                        new = %op.target_path.display(),
                        "executor: no index row at old or new path on replay"
                    );
                }
            }
            Err(e) => return Err(e),
        }
        return Ok(ApplyOutcome::AlreadyGone);
    }

    let started = Instant::now();
    preflight(&op.source_path, op.size).await?;
    transfer_file(&op.source_path, &op.target_path).await?;
    index
        .update_media_file_path_and_root(&op.source_path, &op.target_path, target_root)
        .await?;
    log_move(index, &op.source_path, &op.target_path, op.size, started).await;
    Ok(ApplyOutcome::Applied)
}

pub async fn execute_duplicates(
    index: &MediaIndex,
    store: &PlanStore,
    name: &str,
    mut plan: DuplicatePlan,
    library_roots: &[PathBuf],
    dry_run: bool,
) -> crate::error::Result<(DuplicatePlan, ExecutionReport)> {
    let mut report = ExecutionReport::default();
    let mut touched_dirs = BTreeSet::new();

    if !dry_run {
        plan.state = PlanState::Executing;
        store.save(name, &plan).await?;
    }

    for item in &plan.items {
        if dry_run {
            info!(path = %item.delete.path.display(), "duplicate delete (dry run)");
            report.record_success();
            continue;
        }

        match apply_duplicate_deletion(index, item).await {
            Ok(outcome) => {
                report.record_outcome(outcome);
                if let Some(parent) = item.delete.path.parent() {
                    touched_dirs.insert(parent.to_path_buf());
                }
            }
            Err(e) => {
                warn!(path = %item.delete.path.display(), error = %e, "duplicate deletion failed");
                report.record_failure(format!("{}: {e}", item.delete.path.display()));
            }
        }
    }

    if !dry_run {
        sweep_source_dirs(touched_dirs, library_roots).await;
        plan.state = if report.all_succeeded() { PlanState::Done } else { PlanState::Archived };
        finalize(store, name, &report).await?;
    }

    Ok((plan, report))
}

async fn apply_duplicate_deletion(index: &MediaIndex, item: &DuplicateItem) -> crate::error::Result<ApplyOutcome> {
    let started = Instant::now();
    if tokio::fs::metadata(&item.delete.path).await.is_err() {
        // Already gone since the plan was generated; still reconcile the
        // Index so a stale row doesn't linger. `delete_media_file` is a
        // plain `DELETE ... WHERE path = ?` with no row-count check, so a
        // second run against an already-deleted row is a harmless no-op.
        index.delete_media_file(&item.delete.path).await?;
        return Ok(ApplyOutcome::AlreadyGone);
    }
    tokio::fs::remove_file(&item.delete.path).await?;
    index.delete_media_file(&item.delete.path).await?;
    log_delete(index, &item.delete.path, "duplicate", item.delete.size, started).await;
    Ok(ApplyOutcome::Applied)
}

pub async fn execute_audit(
    index: &MediaIndex,
    store: &PlanStore,
    name: &str,
    mut plan: AuditPlan,
    library_roots: &[PathBuf],
    external: Option<&dyn ExternalIndexingService>,
    dry_run: bool,
) -> crate::error::Result<(AuditPlan, ExecutionReport)> {
    let mut report = ExecutionReport::default();
    let mut touched_dirs = BTreeSet::new();

    if !dry_run {
        plan.state = PlanState::Executing;
        store.save(name, &plan).await?;
    }

    for action in &plan.actions {
        if action.action != AuditActionKind::Rename {
            continue;
        }
        if action.confidence < AUDIT_EXECUTION_CONFIDENCE_GATE {
            info!(path = %action.source_path.display(), confidence = action.confidence, "audit: below execution confidence gate, skipping");
            continue;
        }
        let Some(new_path) = &action.new_path else {
            continue;
        };

        if dry_run {
            info!(source = %action.source_path.display(), target = %new_path.display(), "audit rename (dry run)");
            report.record_success();
            continue;
        }

        match apply_audit_rename(index, action, new_path).await {
            Ok(outcome) => {
                report.record_outcome(outcome);
                if let Some(parent) = action.source_path.parent() {
                    touched_dirs.insert(parent.to_path_buf());
                }
                notify_external(external, new_path).await;
            }
            Err(e) => {
                warn!(path = %action.source_path.display(), error = %e, "audit rename failed");
                report.record_failure(format!("{}: {e}", action.source_path.display()));
            }
        }
    }

    if !dry_run {
        sweep_source_dirs(touched_dirs, library_roots).await;
        plan.state = if report.all_succeeded() { PlanState::Done } else { PlanState::Archived };
        finalize(store, name, &report).await?;
    }

    Ok((plan, report))
}

async fn apply_audit_rename(index: &MediaIndex, action: &AuditAction, new_path: &Path) -> crate::error::Result<ApplyOutcome> {
    if already_applied(&action.source_path, new_path).await {
        reconcile_moved_path_idempotent(index, &action.source_path, new_path).await?;
        return Ok(ApplyOutcome::AlreadyGone);
    }

    let started = Instant::now();
    let size = tokio::fs::metadata(&action.source_path).await?.len();
    preflight(&action.source_path, size).await?;
    transfer_file(&action.source_path, new_path).await?;
    index.update_media_file_path(&action.source_path, new_path).await?;
    log_move(index, &action.source_path, new_path, size, started).await;
    Ok(ApplyOutcome::Applied)
}

pub async fn execute_compliance(
    index: &MediaIndex,
    store: &PlanStore,
    name: &str,
    mut plan: CompliancePlan,
    library_roots: &[PathBuf],
    include_risky: bool,
    dry_run: bool,
) -> crate::error::Result<(CompliancePlan, ExecutionReport)> {
    let mut report = ExecutionReport::default();
    let mut touched_dirs = BTreeSet::new();

    if !dry_run {
        plan.state = PlanState::Executing;
        store.save(name, &plan).await?;
    }

    for action in &plan.actions {
        if action.classification == ComplianceClass::Risky && !include_risky {
            continue;
        }

        if dry_run {
            info!(source = %action.source_path.display(), target = %action.new_path.display(), "compliance rename (dry run)");
            report.record_success();
            continue;
        }

        match apply_compliance_rename(index, action).await {
            Ok(outcome) => {
                report.record_outcome(outcome);
                if let Some(parent) = action.source_path.parent() {
                    touched_dirs.insert(parent.to_path_buf());
                }
            }
            Err(e) => {
                warn!(path = %action.source_path.display(), error = %e, "compliance rename failed");
                report.record_failure(format!("{}: {e}", action.source_path.display()));
            }
        }
    }

    if !dry_run {
        sweep_source_dirs(touched_dirs, library_roots).await;
        plan.state = if report.all_succeeded() { PlanState::Done } else { PlanState::Archived };
        finalize(store, name, &report).await?;
    }

    Ok((plan, report))
}

async fn apply_compliance_rename(index: &MediaIndex, action: &ComplianceAction) -> crate::error::Result<ApplyOutcome> {
    if already_applied(&action.source_path, &action.new_path).await {
        reconcile_moved_path_idempotent(index, &action.source_path, &action.new_path).await?;
        return Ok(ApplyOutcome::AlreadyGone);
    }

    let started = Instant::now();
    let size = tokio::fs::metadata(&action.source_path).await?.len();
    preflight(&action.source_path, size).await?;
    transfer_file(&action.source_path, &action.new_path).await?;
    index.update_media_file_path(&action.source_path, &action.new_path).await?;
    log_move(index, &action.source_path, &action.new_path, size, started).await;
    Ok(ApplyOutcome::Applied)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transfer_file_renames_within_same_filesystem() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("a.mkv");
        let target = tmp.path().join("nested").join("b.mkv");
        tokio::fs::write(&source, b"hello").await.unwrap();

        transfer_file(&source, &target).await.unwrap();

        assert!(!source.exists());
        assert_eq!(tokio::fs::read(&target).await.unwrap(), b"hello");
    }

    #[test]
    fn execution_report_tracks_success_and_failure() {
        let mut report = ExecutionReport::default();
        report.record_success();
        report.record_failure("boom");
        assert_eq!(report.attempted, 2);
        assert_eq!(report.applied, 1);
        assert_eq!(report.failed, 1);
        assert!(!report.all_succeeded());
    }

    #[test]
    fn execution_report_tracks_already_gone_separately() {
        let mut report = ExecutionReport::default();
        report.record_outcome(ApplyOutcome::Applied);
        report.record_outcome(ApplyOutcome::AlreadyGone);
        assert_eq!(report.attempted, 2);
        assert_eq!(report.applied, 1);
        assert_eq!(report.already_gone, 1);
        assert!(report.all_succeeded());
    }

    #[tokio::test]
    async fn already_applied_true_only_when_source_gone_and_target_present() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("source.mkv");
        let target = tmp.path().join("target.mkv");

        // Neither exists yet: not a replay, just unstarted work.
        assert!(!already_applied(&source, &target).await);

        tokio::fs::write(&source, b"x").await.unwrap();
        // Source still present: first run hasn't happened.
        assert!(!already_applied(&source, &target).await);

        tokio::fs::rename(&source, &target).await.unwrap();
        // Source gone, target in place: this is a replay of a completed move.
        assert!(already_applied(&source, &target).await);
    }

    #[tokio::test]
    async fn already_applied_false_when_both_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let source = tmp.path().join("source.mkv");
        let target = tmp.path().join("target.mkv");
        assert!(!already_applied(&source, &target).await);
    }
}
