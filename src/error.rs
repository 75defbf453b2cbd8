use thiserror::Error;

/// Crate-wide error type. Variants line up with the failure kinds the core
/// recognizes: some are retryable at the operation level, some are fatal to
/// the current item, and some are fatal to the whole run. See each plan
/// generator/executor for how a variant is actually handled.
#[derive(Error, Debug)]
pub enum CuratorError {
    #[error("transient io error: {0}")]
    TransientIo(#[source] std::io::Error),

    #[error("io error: {0}")]
    PermanentIo(#[from] std::io::Error),

    #[error("database constraint violated: {0}")]
    DbViolation(String),

    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("filename could not be resolved: {0}")]
    ParseUnresolved(String),

    #[error("ai provider unavailable: {0}")]
    AiProviderUnavailable(String),

    #[error("ai result failed validation: {0}")]
    AiValidationFailed(String),

    #[error("plan conflict: {0}")]
    PlanConflict(String),

    #[error("external service error: {0}")]
    ExternalService(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid media: {0}")]
    InvalidMedia(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl CuratorError {
    /// `true` for error kinds that never abort a run; callers fall back and
    /// continue with the next item.
    pub fn is_item_level(&self) -> bool {
        matches!(
            self,
            CuratorError::AiProviderUnavailable(_)
                | CuratorError::AiValidationFailed(_)
                | CuratorError::PlanConflict(_)
                | CuratorError::ExternalService(_)
                | CuratorError::ParseUnresolved(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CuratorError>;
