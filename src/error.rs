pub mod context;
pub mod retry;

pub use context::ErrorContext;
pub use retry::{RetryExecutor, RetryPolicy, Sleeper, TokioSleeper};

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("External service error ({status}): {message}")]
    ExternalServiceError { status: u16, message: String },

    #[error("Operation failed for {resource}: {code}: {message}")]
    OperationFailed {
        resource: String,
        code: String,
        message: String,
    },

    #[error("Operation still in progress for {resource} (last status: {status})")]
    OperationInProgress { resource: String, status: String },

    #[error("{operation} failed after {attempts} attempts: {source}")]
    RetryExhausted {
        operation: String,
        attempts: u32,
        #[source]
        source: Box<AppError>,
    },

    #[error("Consistency error: {0}")]
    ConsistencyError(String),

    #[error(
        "Could not resolve solution version on target {target} for template version {solution_template_version_id}"
    )]
    SolutionVersionUnresolved {
        target: String,
        solution_template_version_id: String,
    },

    #[error("Authentication error: {0}")]
    AuthenticationError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    #[error("HTTP transport error: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        AppError::Transport(err.to_string())
    }
}

impl From<url::ParseError> for AppError {
    fn from(err: url::ParseError) -> Self {
        AppError::ConfigurationError(format!("Invalid URL: {}", err))
    }
}

impl AppError {
    /// True for the "resource is still provisioning" class of failure.
    ///
    /// The management plane reports this either by never reaching a terminal
    /// state within the poll budget, or by failing the operation with an
    /// `InProgress` code.
    pub fn is_in_progress(&self) -> bool {
        match self {
            AppError::OperationInProgress { .. } => true,
            AppError::OperationFailed { code, message, .. } => {
                code.contains("InProgress") || message.contains("InProgress")
            }
            AppError::ExternalServiceError { message, .. } => message.contains("InProgress"),
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            AppError::NotFound(_) | AppError::ExternalServiceError { status: 404, .. }
        )
    }

    pub fn external(status: u16, message: impl Into<String>) -> Self {
        AppError::ExternalServiceError {
            status,
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_in_progress_classification() {
        let pending = AppError::OperationInProgress {
            resource: "target".to_string(),
            status: "Provisioning".to_string(),
        };
        assert!(pending.is_in_progress());

        let coded = AppError::OperationFailed {
            resource: "target".to_string(),
            code: "ResourceOperationInProgress".to_string(),
            message: "another operation is running".to_string(),
        };
        assert!(coded.is_in_progress());

        let terminal = AppError::OperationFailed {
            resource: "target".to_string(),
            code: "BadRequest".to_string(),
            message: "invalid capability".to_string(),
        };
        assert!(!terminal.is_in_progress());
        assert!(!AppError::NotFound("x".to_string()).is_in_progress());
    }

    #[test]
    fn test_not_found_classification() {
        assert!(AppError::NotFound("context".to_string()).is_not_found());
        assert!(AppError::external(404, "ResourceNotFound").is_not_found());
        assert!(!AppError::external(500, "boom").is_not_found());
    }

    #[test]
    fn test_retry_exhausted_keeps_last_error() {
        let err = AppError::RetryExhausted {
            operation: "create target".to_string(),
            attempts: 5,
            source: Box::new(AppError::external(409, "Conflict")),
        };
        let text = err.to_string();
        assert!(text.contains("create target"));
        assert!(text.contains("5 attempts"));
        assert!(text.contains("Conflict"));
    }
}
