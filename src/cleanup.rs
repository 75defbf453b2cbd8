//! Cleanup / Validation (spec §4.9): collapses empty directories left
//! behind by a move, removes non-media cruft under a video-file safety
//! guard, and validates filename compliance.
//!
//! Recursive directory traversal uses `walkdir`; the upward walk here is
//! plain `Path::parent()` since it only ever climbs toward a known library
//! root.

use crate::parse::filename_parser::is_video_extension;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Extensions treated as disposable cruft by `cleanup --cruft` (spec §4.9).
pub const CRUFT_EXTENSIONS: &[&str] = &["nfo", "txt", "jpg", "png", "srt", "sub", "idx", "sfv", "md5", "url"];

/// Sample videos under this size, with "sample" in the filename, are cruft
/// rather than real media.
pub const SAMPLE_MAX_BYTES: u64 = 50 * 1024 * 1024;

#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    pub files_removed: Vec<PathBuf>,
    pub dirs_removed: Vec<PathBuf>,
}

/// A file this crate will never delete on its own: an unrecognized
/// extension, or a video large enough it isn't a throwaway sample.
fn is_real_video(path: &Path, size: u64) -> bool {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    if !is_video_extension(ext) {
        return false;
    }
    let is_sample = size < SAMPLE_MAX_BYTES
        && path
            .file_stem()
            .and_then(|s| s.to_str())
            .map(|s| s.to_ascii_lowercase().contains("sample"))
            .unwrap_or(false);
    !is_sample
}

fn file_size(path: &Path) -> u64 {
    std::fs::metadata(path).map(|m| m.len()).unwrap_or(0)
}

/// Walks upward from `dir` toward the nearest configured library root,
/// deleting cruft and empty directories as it goes. Stops (without error)
/// the moment it reaches a directory holding a real video file, reaches a
/// library root itself, or steps outside every configured root.
pub async fn cleanup_source_dir(dir: &Path, library_roots: &[PathBuf]) -> crate::error::Result<CleanupReport> {
    let mut report = CleanupReport::default();
    let mut current = dir.to_path_buf();

    loop {
        if !crate::plan::is_contained_in(&current, library_roots) {
            debug!(dir = %current.display(), "cleanup: outside all library roots, stopping");
            break;
        }
        if library_roots.iter().any(|r| crate::plan::clean_path(r) == crate::plan::clean_path(&current)) {
            debug!(dir = %current.display(), "cleanup: reached library root, stopping");
            break;
        }

        match clean_one_dir(&current).await {
            Ok(Some(removed)) => report.files_removed.extend(removed),
            Ok(None) => {
                debug!(dir = %current.display(), "cleanup: real video remains, aborting upward walk");
                break;
            }
            Err(e) => {
                warn!(dir = %current.display(), error = %e, "cleanup: failed to clean directory");
                break;
            }
        }

        match tokio::fs::remove_dir(&current).await {
            Ok(()) => {
                info!(dir = %current.display(), "cleanup: removed empty directory");
                report.dirs_removed.push(current.clone());
            }
            Err(_) => {
                // Not empty (rmdir's atomic check is the final safety net) —
                // stop climbing, nothing above this level should be touched.
                break;
            }
        }

        match current.parent() {
            Some(parent) => current = parent.to_path_buf(),
            None => break,
        }
    }

    Ok(report)
}

/// Removes cruft from one directory, recursing into sub-directories first.
/// Returns `None` without deleting anything if a real video remains
/// anywhere under `dir`.
fn clean_one_dir<'a>(
    dir: &'a Path,
) -> std::pin::Pin<Box<dyn std::future::Future<Output = crate::error::Result<Option<Vec<PathBuf>>>> + Send + 'a>> {
    Box::pin(async move {
        let mut entries = tokio::fs::read_dir(dir).await?;
        let mut sub_dirs = Vec::new();
        let mut files = Vec::new();

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let file_type = entry.file_type().await?;
            if file_type.is_dir() {
                sub_dirs.push(path);
            } else {
                files.push(path);
            }
        }

        for file in &files {
            if is_real_video(file, file_size(file)) {
                return Ok(None);
            }
        }

        let mut removed = Vec::new();
        for sub_dir in sub_dirs {
            match clean_one_dir(&sub_dir).await? {
                Some(mut nested) => removed.append(&mut nested),
                None => return Ok(None),
            }
            if tokio::fs::remove_dir(&sub_dir).await.is_ok() {
                removed.push(sub_dir);
            }
        }

        for file in files {
            tokio::fs::remove_file(&file).await?;
            removed.push(file);
        }

        Ok(Some(removed))
    })
}

/// `cleanup --cruft`: deletes cruft-extension files and tiny sample videos
/// across `roots`, but only in directories holding no other real video
/// (spec §4.9 example 5). Unlike `cleanup_source_dir`, this walks downward
/// and does not remove directories.
pub async fn remove_cruft(roots: &[PathBuf]) -> crate::error::Result<CleanupReport> {
    let mut report = CleanupReport::default();

    for root in roots {
        let mut by_dir: std::collections::HashMap<PathBuf, Vec<PathBuf>> = std::collections::HashMap::new();
        for entry in WalkDir::new(root).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let parent = entry.path().parent().unwrap_or(root).to_path_buf();
            by_dir.entry(parent).or_default().push(entry.path().to_path_buf());
        }

        for (_dir, files) in by_dir {
            let has_real_video = files.iter().any(|f| is_real_video(f, file_size(f)));
            if has_real_video {
                continue;
            }
            for file in files {
                if is_cruft(&file) {
                    if tokio::fs::remove_file(&file).await.is_ok() {
                        report.files_removed.push(file);
                    }
                }
            }
        }
    }

    info!(removed = report.files_removed.len(), "cruft sweep complete");
    Ok(report)
}

fn is_cruft(path: &Path) -> bool {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or_default();
    if CRUFT_EXTENSIONS.iter().any(|c| c.eq_ignore_ascii_case(ext)) {
        return true;
    }
    is_video_extension(ext) && !is_real_video(path, file_size(path))
}

/// The result of validating a path's filename against its canonical form
/// (spec §4.9 "Validation").
#[derive(Debug, Clone)]
pub struct ValidationReport {
    pub valid: bool,
    pub issues: Vec<String>,
    pub expected_name: String,
}

pub fn validate(path: &Path, parsed: &crate::parse::ParsedName) -> ValidationReport {
    let issues = crate::naming::compliance_issues(path, parsed);
    ValidationReport {
        valid: issues.is_empty(),
        expected_name: crate::naming::expected_name(path, parsed),
        issues,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_real_video_rejects_small_sample() {
        assert!(!is_real_video(Path::new("/lib/sample.mkv"), 40 * 1024 * 1024));
    }

    #[test]
    fn is_real_video_accepts_large_file() {
        assert!(is_real_video(Path::new("/lib/S01E01.mkv"), 2 * 1024 * 1024 * 1024));
    }

    #[test]
    fn is_real_video_rejects_non_video_extension() {
        assert!(!is_real_video(Path::new("/lib/show.nfo"), 10));
    }

    #[test]
    fn is_cruft_matches_known_extensions() {
        assert!(is_cruft(Path::new("/lib/show.nfo")));
        assert!(!is_cruft(Path::new("/lib/show.mkv")));
    }

    #[tokio::test]
    async fn cleanup_source_dir_removes_sample_and_empty_dirs() {
        let tmp = tempfile::tempdir().unwrap();
        let library_root = tmp.path().to_path_buf();
        let show_dir = library_root.join("Show (2020)").join("Season 01");
        tokio::fs::create_dir_all(&show_dir).await.unwrap();
        tokio::fs::write(show_dir.join("sample.mkv"), vec![0u8; 1024]).await.unwrap();

        let report = cleanup_source_dir(&show_dir, &[library_root.clone()]).await.unwrap();

        assert!(report.files_removed.contains(&show_dir.join("sample.mkv")));
        assert!(!show_dir.exists());
        assert!(!library_root.join("Show (2020)").exists());
        assert!(library_root.exists());
    }

    #[tokio::test]
    async fn cleanup_source_dir_stops_when_real_video_remains() {
        let tmp = tempfile::tempdir().unwrap();
        let library_root = tmp.path().to_path_buf();
        let show_dir = library_root.join("Show (2020)").join("Season 01");
        tokio::fs::create_dir_all(&show_dir).await.unwrap();
        tokio::fs::write(show_dir.join("S01E01.mkv"), vec![0u8; 2048]).await.unwrap();

        let report = cleanup_source_dir(&show_dir, &[library_root.clone()]).await.unwrap();

        assert!(report.files_removed.is_empty());
        assert!(show_dir.exists());
    }

    #[tokio::test]
    async fn cleanup_source_dir_refuses_outside_library_roots() {
        let tmp = tempfile::tempdir().unwrap();
        let outside = tmp.path().join("not-a-library");
        tokio::fs::create_dir_all(&outside).await.unwrap();

        let report = cleanup_source_dir(&outside, &[tmp.path().join("lib")]).await.unwrap();
        assert!(report.files_removed.is_empty());
        assert!(outside.exists());
    }
}
