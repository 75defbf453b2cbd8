//! Plan document schemas and persistence (spec §3 "Plan documents", §4.7,
//! §4.8, §6). A plan is a JSON document a generator produces and an
//! executor consumes; it lives from `generate` to `execute` (deleted on
//! full success) or to archive (renamed `<name>.old` on partial failure).
//!
//! Shape patterned on a `Plan`/`PlanItem`/`Operation` struct split seen
//! elsewhere in this domain, adapted to this crate's four plan kinds
//! instead of one generic one.

use crate::index::MediaKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Where a plan document sits in its lifecycle (spec §4.8). `Draft` only
/// ever exists in memory; everything from `Saved` on has a file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanState {
    Draft,
    Saved,
    Executing,
    Done,
    Archived,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRef {
    pub path: PathBuf,
    pub size: u64,
}

// ---- Consolidator (spec §4.7) -----------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsolidateAction {
    Move,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidateOperation {
    pub action: ConsolidateAction,
    pub source_path: PathBuf,
    pub target_path: PathBuf,
    pub size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidateGroup {
    pub conflict_id: String,
    pub title: String,
    pub year: Option<u16>,
    pub kind: MediaKind,
    pub target_root: PathBuf,
    pub operations: Vec<ConsolidateOperation>,
    /// Set when the group could not be reached or lacked space; the group
    /// still appears in the plan (spec §4.7) but contributes no operations.
    pub skipped_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConsolidateSummary {
    pub groups: usize,
    pub operations: usize,
    pub total_bytes: u64,
    pub skipped_groups: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsolidatePlan {
    pub can_proceed: bool,
    pub reasons: Vec<String>,
    pub groups: Vec<ConsolidateGroup>,
    pub summary: ConsolidateSummary,
    #[serde(default = "default_draft")]
    pub state: PlanState,
}

// ---- Duplicates (spec §4.7) --------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicateItem {
    pub group_id: String,
    pub kind: MediaKind,
    pub title: String,
    pub year: Option<u16>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub keep: FileRef,
    pub delete: FileRef,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DuplicateSummary {
    pub items: usize,
    pub space_reclaimable_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DuplicatePlan {
    pub items: Vec<DuplicateItem>,
    pub summary: DuplicateSummary,
    #[serde(default = "default_draft")]
    pub state: PlanState,
}

// ---- Audit (spec §4.7) --------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditItem {
    pub path: PathBuf,
    pub regex_title: String,
    pub regex_confidence: f32,
    pub library_kind: MediaKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditActionKind {
    Rename,
    Skip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditAction {
    pub source_path: PathBuf,
    pub action: AuditActionKind,
    pub new_title: String,
    pub new_year: Option<u16>,
    pub new_season: Option<u32>,
    pub new_episode: Option<u32>,
    pub new_path: Option<PathBuf>,
    pub reasoning: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditSummary {
    pub items: usize,
    pub proposed_renames: usize,
    pub skipped: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditPlan {
    pub items: Vec<AuditItem>,
    pub actions: Vec<AuditAction>,
    pub summary: AuditSummary,
    #[serde(default = "default_draft")]
    pub state: PlanState,
}

// ---- Compliance (spec §4.7) ---------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplianceClass {
    Safe,
    Risky,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceAction {
    pub source_path: PathBuf,
    pub new_path: PathBuf,
    pub classification: ComplianceClass,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComplianceSummary {
    pub safe: usize,
    pub risky: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompliancePlan {
    pub actions: Vec<ComplianceAction>,
    pub summary: ComplianceSummary,
    #[serde(default = "default_draft")]
    pub state: PlanState,
}

fn default_draft() -> PlanState {
    PlanState::Draft
}

/// Saves/loads/archives plan documents under `<config_dir>/plans/`. Every
/// plan kind shares the same on-disk conventions (spec §6): a fixed
/// filename per kind, `.old` archival, delete-on-success.
pub struct PlanStore {
    dir: PathBuf,
}

impl PlanStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    pub async fn save<T: Serialize>(&self, name: &str, plan: &T) -> crate::error::Result<PathBuf> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(name);
        let json = serde_json::to_string_pretty(plan)?;
        fs::write(&path, json).await?;
        Ok(path)
    }

    pub async fn load<T: for<'de> Deserialize<'de>>(&self, name: &str) -> crate::error::Result<Option<T>> {
        let path = self.path_for(name);
        match fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Full success: the plan file is deleted (spec §4.8).
    pub async fn delete(&self, name: &str) -> crate::error::Result<()> {
        let path = self.path_for(name);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Partial failure: the plan file is archived to `<name>.json.old`, not
    /// deleted, and is never resurrected from archive without user intent
    /// (spec §4.8).
    pub async fn archive(&self, name: &str) -> crate::error::Result<PathBuf> {
        let path = self.path_for(name);
        let archived = self.dir.join(format!("{name}.json.old"));
        fs::rename(&path, &archived).await?;
        Ok(archived)
    }

    pub fn plan_path(&self, name: &str) -> PathBuf {
        self.path_for(name)
    }
}

/// Containment check shared by executor and cleanup (spec §9 "Path
/// safety"): `path`, after `Clean`-style normalization, must fall strictly
/// under one of `roots`.
pub fn is_contained_in(path: &Path, roots: &[PathBuf]) -> bool {
    let cleaned = clean_path(path);
    roots.iter().any(|r| cleaned.starts_with(clean_path(r)))
}

pub fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            std::path::Component::CurDir => {}
            std::path::Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn save_then_load_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PlanStore::new(tmp.path());
        let plan = DuplicatePlan {
            items: vec![],
            summary: DuplicateSummary::default(),
            state: PlanState::Saved,
        };
        store.save("duplicate", &plan).await.unwrap();
        let loaded: DuplicatePlan = store.load("duplicate").await.unwrap().unwrap();
        assert_eq!(loaded.state, PlanState::Saved);
    }

    #[tokio::test]
    async fn load_missing_plan_returns_none() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PlanStore::new(tmp.path());
        let loaded: Option<DuplicatePlan> = store.load("duplicate").await.unwrap();
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn delete_on_success_removes_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PlanStore::new(tmp.path());
        let plan = AuditPlan {
            items: vec![],
            actions: vec![],
            summary: AuditSummary::default(),
            state: PlanState::Saved,
        };
        let path = store.save("audit", &plan).await.unwrap();
        assert!(path.exists());
        store.delete("audit").await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn archive_on_partial_failure_renames_to_old() {
        let tmp = tempfile::tempdir().unwrap();
        let store = PlanStore::new(tmp.path());
        let plan = ConsolidatePlan {
            can_proceed: true,
            reasons: vec![],
            groups: vec![],
            summary: ConsolidateSummary::default(),
            state: PlanState::Executing,
        };
        store.save("consolidate", &plan).await.unwrap();
        let archived = store.archive("consolidate").await.unwrap();
        assert!(archived.exists());
        assert_eq!(archived.file_name().unwrap(), "consolidate.json.old");
        let loaded: Option<ConsolidatePlan> = store.load("consolidate").await.unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn is_contained_in_checks_prefix() {
        let roots = vec![PathBuf::from("/mnt/tv")];
        assert!(is_contained_in(Path::new("/mnt/tv/Show (2020)"), &roots));
        assert!(!is_contained_in(Path::new("/mnt/movies/Show (2020)"), &roots));
    }
}
