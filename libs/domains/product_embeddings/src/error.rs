use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Error)]
pub enum SyncError {
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid embedding: {0}")]
    InvalidEmbedding(String),

    #[error("Embedding provider error: {0}")]
    Provider(String),

    #[error("Embedding already exists for product {0}")]
    AlreadyExists(Uuid),

    #[error("Vector store error: {0}")]
    Store(String),

    #[error("Catalog error: {0}")]
    Catalog(String),

    #[error("Operation not supported by this backend: {0}")]
    Unsupported(&'static str),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Run cancelled before the product was processed")]
    Cancelled,

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type SyncResult<T> = Result<T, SyncError>;

impl SyncError {
    /// Transient failures that are worth another attempt after backing off.
    ///
    /// A malformed vector is a contract violation of the provider and the input
    /// text is deterministic, so `InvalidEmbedding` is never retried.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Provider(_) | SyncError::Store(_) | SyncError::Internal(_)
        )
    }

    /// Short machine-readable label, used for metrics and report entries.
    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Validation(_) => "validation",
            SyncError::NotFound(_) => "not_found",
            SyncError::InvalidEmbedding(_) => "invalid_embedding",
            SyncError::Provider(_) => "provider",
            SyncError::AlreadyExists(_) => "already_exists",
            SyncError::Store(_) => "store",
            SyncError::Catalog(_) => "catalog",
            SyncError::Unsupported(_) => "unsupported",
            SyncError::Config(_) => "config",
            SyncError::Cancelled => "cancelled",
            SyncError::Internal(_) => "internal",
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::Provider(err.to_string())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Internal(format!("JSON error: {}", err))
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Store(format!("I/O error: {}", err))
    }
}

impl From<validator::ValidationErrors> for SyncError {
    fn from(err: validator::ValidationErrors) -> Self {
        SyncError::Validation(err.to_string())
    }
}

impl From<core_config::ConfigError> for SyncError {
    fn from(err: core_config::ConfigError) -> Self {
        SyncError::Config(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::Provider("timeout".into()).is_retryable());
        assert!(SyncError::Store("connection reset".into()).is_retryable());
        assert!(SyncError::Internal("boom".into()).is_retryable());

        assert!(!SyncError::InvalidEmbedding("NaN".into()).is_retryable());
        assert!(!SyncError::Validation("empty".into()).is_retryable());
        assert!(!SyncError::AlreadyExists(Uuid::nil()).is_retryable());
        assert!(!SyncError::Cancelled.is_retryable());
    }

    #[test]
    fn test_already_exists_message_names_product() {
        let id = Uuid::new_v4();
        let err = SyncError::AlreadyExists(id);
        assert!(err.to_string().contains(&id.to_string()));
        assert_eq!(err.kind(), "already_exists");
    }
}
