//! `ExternalIndexingService` (spec §6): `GetSystemStatus`, `GetQueue`,
//! `RemoveFromQueue`, `TriggerDownloadedScan`, `WaitForCommand`,
//! `FindSeriesByTitle`/`LookupMovie`, `UpdateSeriesPath`/`UpdateMoviePath`.
//!
//! `reqwest::Client` plus a per-call error enum, generalized from a single
//! fixed read-only catalog API to the generic Sonarr/Radarr-shaped
//! read/write automation API this crate actually talks to. Auth is a
//! header, `X-Api-Key`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ExternalServiceError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("http error: status {0}")]
    Http(reqwest::StatusCode),

    #[error("not found")]
    NotFound,

    #[error("response could not be decoded: {0}")]
    Decode(String),

    #[error("command {0} timed out waiting for completion")]
    CommandTimeout(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub healthy: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueItem {
    pub id: u64,
    pub title: String,
    pub status: String,
}

/// A title match reported by the external service, used by the Audit
/// generator's secondary-validation step (spec §4.7) and by the Library
/// Selector (spec §4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeriesLookup {
    pub id: u64,
    pub title: String,
    pub year: Option<u16>,
    pub path: PathBuf,
}

/// The narrow automation-API surface the core consults for identity
/// confirmation and informs of path changes. One implementation per
/// service (Sonarr-equivalent, Radarr-equivalent); the core never knows
/// which is behind the trait object it holds.
#[async_trait]
pub trait ExternalIndexingService: Send + Sync {
    async fn get_system_status(&self) -> Result<SystemStatus, ExternalServiceError>;
    async fn get_queue(&self) -> Result<Vec<QueueItem>, ExternalServiceError>;
    async fn remove_from_queue(&self, id: u64) -> Result<(), ExternalServiceError>;
    async fn trigger_downloaded_scan(&self, path: &Path) -> Result<(), ExternalServiceError>;
    async fn wait_for_command(
        &self,
        command_id: u64,
        timeout: Duration,
    ) -> Result<(), ExternalServiceError>;
    async fn find_series_by_title(
        &self,
        title: &str,
    ) -> Result<Vec<SeriesLookup>, ExternalServiceError>;
    async fn lookup_movie(&self, title: &str) -> Result<Vec<SeriesLookup>, ExternalServiceError>;
    async fn update_series_path(&self, id: u64, new_path: &Path) -> Result<(), ExternalServiceError>;
    async fn update_movie_path(&self, id: u64, new_path: &Path) -> Result<(), ExternalServiceError>;
}

/// `reqwest`-based implementation, shared by both the Sonarr-equivalent and
/// Radarr-equivalent deployments — the wire shape (`X-Api-Key`, JSON,
/// `/api/v3`-style command endpoints) is the same; only `base_url` differs.
pub struct ReqwestIndexingService {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ReqwestIndexingService {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("reqwest client configuration is always valid");
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path.trim_start_matches('/'))
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
    ) -> Result<T, ExternalServiceError> {
        let response = self
            .client
            .get(self.url(path))
            .header("X-Api-Key", &self.api_key)
            .send()
            .await?;
        check_status(&response)?;
        response
            .json::<T>()
            .await
            .map_err(|e| ExternalServiceError::Decode(e.to_string()))
    }

    async fn post_json<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(), ExternalServiceError> {
        let response = self
            .client
            .post(self.url(path))
            .header("X-Api-Key", &self.api_key)
            .json(body)
            .send()
            .await?;
        check_status(&response)
    }
}

fn check_status(response: &reqwest::Response) -> Result<(), ExternalServiceError> {
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(ExternalServiceError::NotFound);
    }
    if !response.status().is_success() {
        return Err(ExternalServiceError::Http(response.status()));
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ScanCommand<'a> {
    name: &'a str,
    path: &'a Path,
}

#[derive(Debug, Serialize)]
struct PathUpdate<'a> {
    path: &'a Path,
}

#[async_trait]
impl ExternalIndexingService for ReqwestIndexingService {
    async fn get_system_status(&self) -> Result<SystemStatus, ExternalServiceError> {
        self.get_json("api/v3/system/status").await
    }

    async fn get_queue(&self) -> Result<Vec<QueueItem>, ExternalServiceError> {
        self.get_json("api/v3/queue").await
    }

    async fn remove_from_queue(&self, id: u64) -> Result<(), ExternalServiceError> {
        let response = self
            .client
            .delete(self.url(&format!("api/v3/queue/{id}")))
            .header("X-Api-Key", &self.api_key)
            .send()
            .await?;
        check_status(&response)
    }

    async fn trigger_downloaded_scan(&self, path: &Path) -> Result<(), ExternalServiceError> {
        self.post_json(
            "api/v3/command",
            &ScanCommand {
                name: "DownloadedScan",
                path,
            },
        )
        .await
    }

    async fn wait_for_command(
        &self,
        command_id: u64,
        timeout: Duration,
    ) -> Result<(), ExternalServiceError> {
        let deadline = std::time::Instant::now() + timeout;
        loop {
            let status: CommandStatus = self
                .get_json(&format!("api/v3/command/{command_id}"))
                .await?;
            if status.state == "completed" {
                return Ok(());
            }
            if std::time::Instant::now() >= deadline {
                return Err(ExternalServiceError::CommandTimeout(command_id.to_string()));
            }
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    async fn find_series_by_title(
        &self,
        title: &str,
    ) -> Result<Vec<SeriesLookup>, ExternalServiceError> {
        self.get_json(&format!("api/v3/series/lookup?term={}", urlencode(title)))
            .await
    }

    async fn lookup_movie(&self, title: &str) -> Result<Vec<SeriesLookup>, ExternalServiceError> {
        self.get_json(&format!("api/v3/movie/lookup?term={}", urlencode(title)))
            .await
    }

    async fn update_series_path(&self, id: u64, new_path: &Path) -> Result<(), ExternalServiceError> {
        self.post_json(&format!("api/v3/series/{id}/editpath"), &PathUpdate { path: new_path })
            .await
    }

    async fn update_movie_path(&self, id: u64, new_path: &Path) -> Result<(), ExternalServiceError> {
        self.post_json(&format!("api/v3/movie/{id}/editpath"), &PathUpdate { path: new_path })
            .await
    }
}

#[derive(Debug, Deserialize)]
struct CommandStatus {
    state: String,
}

fn urlencode(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.' {
                c.to_string()
            } else {
                format!("%{:02X}", c as u32)
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urlencode_leaves_alphanumerics_untouched() {
        assert_eq!(urlencode("Dracula"), "Dracula");
    }

    #[test]
    fn urlencode_escapes_spaces() {
        assert_eq!(urlencode("The Wire"), "The%20Wire");
    }

    #[test]
    fn url_joins_base_and_path_regardless_of_slashes() {
        let svc = ReqwestIndexingService::new("http://sonarr:8989/", "key", Duration::from_secs(5));
        assert_eq!(svc.url("/api/v3/queue"), "http://sonarr:8989/api/v3/queue");
        assert_eq!(svc.url("api/v3/queue"), "http://sonarr:8989/api/v3/queue");
    }
}
