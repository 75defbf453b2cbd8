//! Configuration surface consumed by the core.
//!
//! These are plain value structs only — loading and parsing `config.toml` is
//! a collaborator's job, not this crate's. A caller builds a `CuratorConfig`
//! however it likes (TOML, env, defaults) and hands it to the components
//! below.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct WatchConfig {
    pub tv: Vec<PathBuf>,
    pub movies: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct LibrariesConfig {
    pub tv: Vec<PathBuf>,
    pub movies: Vec<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub enabled: bool,
    pub scan_frequency_minutes: u32,
    pub health_addr: Option<String>,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            scan_frequency_minutes: 60,
            health_addr: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct OptionsConfig {
    pub dry_run: bool,
    pub verify_checksums: bool,
    pub delete_source: bool,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            verify_checksums: false,
            delete_source: true,
        }
    }
}

/// One of `sonarr`/`radarr`: the narrow automation-API contract the core
/// consumes (see `external::contracts`).
#[derive(Debug, Clone)]
pub struct ExternalServiceConfig {
    pub enabled: bool,
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub notify_on_import: bool,
    /// When the library-root keyword inference and this service disagree on
    /// kind, reject the AI result instead of trusting it. Default lenient.
    pub strict_kind_agreement: bool,
    pub timeout_seconds: u64,
}

impl Default for ExternalServiceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            url: None,
            api_key: None,
            notify_on_import: true,
            strict_kind_agreement: false,
            timeout_seconds: 15,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub failure_window_seconds: u64,
    pub cooldown_seconds: u64,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window_seconds: 120,
            cooldown_seconds: 30,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeepaliveConfig {
    pub enabled: bool,
    pub interval_seconds: u64,
    pub idle_timeout_seconds: u64,
}

impl Default for KeepaliveConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_seconds: 300,
            idle_timeout_seconds: 60,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AiConfig {
    pub enabled: bool,
    pub ollama_endpoint: String,
    pub model: String,
    pub cloud_model: Option<String>,
    pub confidence_threshold: f32,
    pub auto_trigger_threshold: f32,
    pub timeout_seconds: u64,
    pub cache_enabled: bool,
    pub circuit_breaker: CircuitBreakerConfig,
    pub keepalive: KeepaliveConfig,
    pub retry_delay_min_ms: u64,
    pub retry_delay_max_ms: u64,
    pub max_retries: u32,
    pub max_concurrent_calls: usize,
    pub max_concurrent_cache_warms: usize,
    pub queue_workers: usize,
    pub queue_capacity: usize,
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            ollama_endpoint: "http://localhost:11434".to_string(),
            model: "llama3".to_string(),
            cloud_model: None,
            confidence_threshold: 0.6,
            auto_trigger_threshold: 0.6,
            timeout_seconds: 30,
            cache_enabled: true,
            circuit_breaker: CircuitBreakerConfig::default(),
            keepalive: KeepaliveConfig::default(),
            retry_delay_min_ms: 100,
            retry_delay_max_ms: 500,
            max_retries: 3,
            max_concurrent_calls: 4,
            max_concurrent_cache_warms: 8,
            queue_workers: 2,
            queue_capacity: 256,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PermissionsConfig {
    pub user: Option<String>,
    pub group: Option<String>,
    pub file_mode: u32,
    pub dir_mode: u32,
}

impl Default for PermissionsConfig {
    fn default() -> Self {
        Self {
            user: None,
            group: None,
            file_mode: 0o644,
            dir_mode: 0o755,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub file: Option<PathBuf>,
    pub max_size_mb: u64,
    pub max_backups: u32,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            max_size_mb: 50,
            max_backups: 5,
        }
    }
}

/// Top-level configuration handed to the core. A collaborator owns reading
/// this out of `config.toml`; the core only reads fields off it.
#[derive(Debug, Clone)]
pub struct CuratorConfig {
    pub watch: WatchConfig,
    pub libraries: LibrariesConfig,
    pub daemon: DaemonConfig,
    pub options: OptionsConfig,
    pub sonarr: ExternalServiceConfig,
    pub radarr: ExternalServiceConfig,
    pub ai: AiConfig,
    pub permissions: PermissionsConfig,
    pub logging: LoggingConfig,
    /// Group `MediaFile`s with a null year together when forming duplicate
    /// groups, rather than treating each as a singleton. Default `true`.
    pub group_null_year_together: bool,
}

impl Default for CuratorConfig {
    fn default() -> Self {
        Self {
            watch: WatchConfig {
                tv: Vec::new(),
                movies: Vec::new(),
            },
            libraries: LibrariesConfig {
                tv: Vec::new(),
                movies: Vec::new(),
            },
            daemon: DaemonConfig::default(),
            options: OptionsConfig::default(),
            sonarr: ExternalServiceConfig::default(),
            radarr: ExternalServiceConfig::default(),
            ai: AiConfig::default(),
            permissions: PermissionsConfig::default(),
            logging: LoggingConfig::default(),
            group_null_year_together: true,
        }
    }
}
