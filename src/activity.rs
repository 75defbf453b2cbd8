//! Activity log: one JSON object per line under
//! `activity/activity-YYYY-MM-DD.jsonl`, rotated by UTC date. A filesystem
//! counterpart to `OperationLogEntry`/`LogOperation`, since this component
//! explicitly excludes owning a server-side log sink.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParseMethod {
    Regex,
    Ai,
    Cache,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub timestamp: DateTime<Utc>,
    pub source: String,
    pub success: bool,
    pub parse_method: ParseMethod,
    pub bytes: u64,
    pub duration_ms: u64,
    pub sonarr_notified: bool,
    pub radarr_notified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Appends one line per call to `activity/activity-<date>.jsonl` under the
/// configured directory.
pub struct ActivityLog {
    dir: PathBuf,
}

impl ActivityLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub async fn append(&self, entry: &ActivityEntry) -> crate::error::Result<()> {
        fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(entry.timestamp);
        let mut line = serde_json::to_string(entry)?;
        line.push('\n');

        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        Ok(())
    }

    fn path_for(&self, timestamp: DateTime<Utc>) -> PathBuf {
        self.dir
            .join(format!("activity-{}.jsonl", timestamp.format("%Y-%m-%d")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn append_writes_one_json_line_per_call() {
        let tmp = tempfile::tempdir().unwrap();
        let log = ActivityLog::new(tmp.path().join("activity"));
        let ts = Utc.with_ymd_and_hms(2026, 1, 15, 12, 0, 0).unwrap();

        log.append(&ActivityEntry {
            timestamp: ts,
            source: "/lib/Show.mkv".to_string(),
            success: true,
            parse_method: ParseMethod::Regex,
            bytes: 1024,
            duration_ms: 5,
            sonarr_notified: false,
            radarr_notified: false,
            error: None,
        })
        .await
        .unwrap();
        log.append(&ActivityEntry {
            timestamp: ts,
            source: "/lib/Other.mkv".to_string(),
            success: false,
            parse_method: ParseMethod::Ai,
            bytes: 0,
            duration_ms: 12,
            sonarr_notified: false,
            radarr_notified: false,
            error: Some("ai provider unavailable".to_string()),
        })
        .await
        .unwrap();

        let contents = tokio::fs::read_to_string(tmp.path().join("activity/activity-2026-01-15.jsonl"))
            .await
            .unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);
        let first: ActivityEntry = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(first.source, "/lib/Show.mkv");
    }

    #[tokio::test]
    async fn different_days_rotate_to_different_files() {
        let tmp = tempfile::tempdir().unwrap();
        let log = ActivityLog::new(tmp.path());
        let day1 = Utc.with_ymd_and_hms(2026, 1, 15, 0, 0, 0).unwrap();
        let day2 = Utc.with_ymd_and_hms(2026, 1, 16, 0, 0, 0).unwrap();

        for ts in [day1, day2] {
            log.append(&ActivityEntry {
                timestamp: ts,
                source: "x".to_string(),
                success: true,
                parse_method: ParseMethod::Cache,
                bytes: 0,
                duration_ms: 0,
                sonarr_notified: false,
                radarr_notified: false,
                error: None,
            })
            .await
            .unwrap();
        }

        assert!(tmp.path().join("activity-2026-01-15.jsonl").exists());
        assert!(tmp.path().join("activity-2026-01-16.jsonl").exists());
    }
}
