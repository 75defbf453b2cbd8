//! Library Selector (spec §4.6): chooses which configured library root a
//! title's files should live under, preferring the Index's canonical path,
//! then an external-service-reported path, then best-fit among libraries
//! already holding the title, then the library with the most free space.

use crate::index::{MediaIndex, MediaKind};
use std::path::{Component, Path, PathBuf};
use sysinfo::Disks;
use tracing::debug;

/// Why `pick_target` chose the root it did — surfaced for logging and for
/// the Consolidator's plan summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionReason {
    CanonicalPath,
    ExternalServicePath,
    ExistingSingleLibrary,
    ExistingMultipleLibraries,
    MostFreeSpace,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub root: PathBuf,
    pub reason: SelectionReason,
}

pub struct LibrarySelector<'a> {
    index: &'a MediaIndex,
}

impl<'a> LibrarySelector<'a> {
    pub fn new(index: &'a MediaIndex) -> Self {
        Self { index }
    }

    /// Runs the full §4.6 order. `candidate_roots` is the set of configured
    /// library roots for `kind`; `external_path`, when present, is the path
    /// an external indexing service reports for the title. Returns `None`
    /// when no candidate root has enough free space.
    pub async fn pick_target(
        &self,
        title: &str,
        year: Option<u16>,
        kind: MediaKind,
        size: u64,
        external_path: Option<&Path>,
        candidate_roots: &[PathBuf],
    ) -> crate::error::Result<Option<Selection>> {
        if let Some(existing) = match kind {
            MediaKind::Episode => self.index.get_series_by_title(title, year).await?,
            MediaKind::Movie => self.index.get_movie_by_title(title, year).await?,
        } {
            if let Some(root) = containing_root(&existing.canonical_path, candidate_roots) {
                if has_space(&root, size) {
                    debug!(title, "library selector: canonical path");
                    return Ok(Some(Selection {
                        root,
                        reason: SelectionReason::CanonicalPath,
                    }));
                }
            }
        }

        if let Some(ext_path) = external_path {
            if let Some(root) = containing_root(ext_path, candidate_roots) {
                if has_space(&root, size) {
                    debug!(title, "library selector: external service path");
                    return Ok(Some(Selection {
                        root,
                        reason: SelectionReason::ExternalServicePath,
                    }));
                }
            }
        }

        if let Some(selection) = self
            .pick_by_existing_locations(title, year, kind, size, candidate_roots)
            .await?
        {
            return Ok(Some(selection));
        }

        Ok(pick_most_free_space(candidate_roots, size))
    }

    /// Steps 3/4: prefer a library root already holding this title, movie or
    /// episode alike; among several, the one with the most of it already
    /// (episode count for TV, file count for movies) wins, ties broken
    /// lexicographically.
    async fn pick_by_existing_locations(
        &self,
        title: &str,
        year: Option<u16>,
        kind: MediaKind,
        size: u64,
        candidate_roots: &[PathBuf],
    ) -> crate::error::Result<Option<Selection>> {
        let locations = self.index.find_title_locations(title, year, kind).await?;
        let matching: Vec<PathBuf> = locations
            .into_iter()
            .filter(|loc| candidate_roots.iter().any(|r| same_path(r, loc)))
            .collect();

        match matching.len() {
            0 => Ok(None),
            1 => {
                let root = matching.into_iter().next().unwrap();
                if has_space(&root, size) {
                    Ok(Some(Selection {
                        root,
                        reason: SelectionReason::ExistingSingleLibrary,
                    }))
                } else {
                    Ok(None)
                }
            }
            _ => {
                let mut scored = Vec::with_capacity(matching.len());
                for root in &matching {
                    let count = self.index.count_title_in_library(root, title, year, kind).await?;
                    scored.push((root.clone(), count));
                }
                // Highest count wins; lexicographic root order breaks ties
                // deterministically (spec §9 open question 3).
                scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                for (root, _) in scored {
                    if has_space(&root, size) {
                        return Ok(Some(Selection {
                            root,
                            reason: SelectionReason::ExistingMultipleLibraries,
                        }));
                    }
                }
                Ok(None)
            }
        }
    }
}

fn pick_most_free_space(candidate_roots: &[PathBuf], size: u64) -> Option<Selection> {
    let mut scored: Vec<(PathBuf, u64)> = candidate_roots
        .iter()
        .map(|r| (r.clone(), free_space_bytes(r)))
        .collect();
    scored.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    scored
        .into_iter()
        .find(|(_, free)| *free >= size)
        .map(|(root, _)| Selection {
            root,
            reason: SelectionReason::MostFreeSpace,
        })
}

/// The configured root containing `path`, if any, after `Clean`-style
/// normalization (spec §9: absolute-path comparisons after clean with
/// trailing-separator normalization).
fn containing_root(path: &Path, roots: &[PathBuf]) -> Option<PathBuf> {
    let cleaned = clean_path(path);
    roots
        .iter()
        .filter(|r| cleaned.starts_with(clean_path(r)))
        .max_by_key(|r| clean_path(r).as_os_str().len())
        .cloned()
}

fn same_path(a: &Path, b: &Path) -> bool {
    clean_path(a) == clean_path(b)
}

/// `statfs.Bavail * Bsize >= size`, resolved via the disk whose mount point
/// is the longest prefix of `root`.
fn has_space(root: &Path, size: u64) -> bool {
    free_space_bytes(root) >= size
}

fn free_space_bytes(root: &Path) -> u64 {
    let disks = Disks::new_with_refreshed_list();
    let cleaned = clean_path(root);
    disks
        .iter()
        .filter(|d| cleaned.starts_with(clean_path(d.mount_point())))
        .max_by_key(|d| d.mount_point().as_os_str().len())
        .map(|d| d.available_space())
        .unwrap_or(0)
}

/// `filepath.Clean`-equivalent: collapses `.`/repeated separators without
/// touching the filesystem (no symlink resolution, no existence check).
fn clean_path(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
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

    #[test]
    fn containing_root_picks_longest_matching_prefix() {
        let roots = vec![PathBuf::from("/mnt"), PathBuf::from("/mnt/tv")];
        let found = containing_root(Path::new("/mnt/tv/Show (2020)/S01E01.mkv"), &roots);
        assert_eq!(found, Some(PathBuf::from("/mnt/tv")));
    }

    #[test]
    fn containing_root_none_when_outside_all_roots() {
        let roots = vec![PathBuf::from("/mnt/tv")];
        assert_eq!(containing_root(Path::new("/other/Show"), &roots), None);
    }

    #[test]
    fn same_path_ignores_trailing_separator_and_dot() {
        assert!(same_path(Path::new("/mnt/tv/"), Path::new("/mnt/tv")));
        assert!(same_path(Path::new("/mnt/./tv"), Path::new("/mnt/tv")));
    }

    #[test]
    fn most_free_space_breaks_ties_lexicographically() {
        // Without real disks mounted, free_space_bytes resolves to 0 for
        // both, so the deterministic lexicographic tiebreak is exercised.
        let roots = vec![PathBuf::from("/z/tv"), PathBuf::from("/a/tv")];
        let picked = pick_most_free_space(&roots, 0);
        assert_eq!(picked.unwrap().root, PathBuf::from("/a/tv"));
    }
}
