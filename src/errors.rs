use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use std::fmt;

/// Application-specific error types.
///
/// Soft errors (`EnrichmentProvider`) degrade gracefully inside a lead's run
/// and are recorded in the structured result. Hard errors (`Database`,
/// `Configuration`) abort the current lead's run and surface to the caller.
/// Verification provider failures never become errors at all; they are data
/// (`MailboxFailure`) inside the cascade result.
#[derive(Debug)]
pub enum PipelineError {
    /// Database-related errors. Hard: aborts the current lead's run.
    Database(sqlx::Error),
    /// Invalid or missing pipeline configuration. Hard: aborts before any stage runs.
    Configuration(String),
    /// Enrichment provider call failed. Soft: enrichment marked failed, run continues.
    EnrichmentProvider(String),
    /// Bad request error (invalid input).
    BadRequest(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<PipelineError>,
        /// Additional context message.
        context: String,
    },
}

impl PipelineError {
    /// Whether this error aborts a lead's run instead of degrading.
    pub fn is_hard(&self) -> bool {
        match self {
            PipelineError::Database(_) | PipelineError::Configuration(_) => true,
            PipelineError::WithContext { source, .. } => source.is_hard(),
            _ => false,
        }
    }
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::Database(e) => write!(f, "Database error: {}", e),
            PipelineError::Configuration(msg) => write!(f, "Configuration error: {}", msg),
            PipelineError::EnrichmentProvider(msg) => {
                write!(f, "Enrichment provider error: {}", msg)
            }
            PipelineError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            PipelineError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for PipelineError {}

impl IntoResponse for PipelineError {
    /// Converts the error into an HTTP response.
    ///
    /// Maps each error variant to an appropriate HTTP status code and JSON body.
    fn into_response(self) -> Response {
        let (status, error_message) = match &self {
            PipelineError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Database error".to_string(),
                )
            }
            PipelineError::Configuration(msg) => {
                tracing::error!("Configuration error: {}", msg);
                (StatusCode::UNPROCESSABLE_ENTITY, msg.clone())
            }
            PipelineError::EnrichmentProvider(msg) => {
                tracing::error!("External provider error: {}", msg);
                (
                    StatusCode::BAD_GATEWAY,
                    "External provider error".to_string(),
                )
            }
            PipelineError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            PipelineError::WithContext { source, context } => {
                tracing::error!("Error with context: {} -> {}", context, source);
                return source.clone_for_response().into_response();
            }
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

impl PipelineError {
    /// Clones the error for response delegation.
    ///
    /// Note: `sqlx::Error` is not cloneable, so `Database` is simplified to
    /// `RowNotFound` during cloning.
    fn clone_for_response(&self) -> Self {
        match self {
            PipelineError::Database(_) => PipelineError::Database(sqlx::Error::RowNotFound),
            PipelineError::Configuration(msg) => PipelineError::Configuration(msg.clone()),
            PipelineError::EnrichmentProvider(msg) => {
                PipelineError::EnrichmentProvider(msg.clone())
            }
            PipelineError::BadRequest(msg) => PipelineError::BadRequest(msg.clone()),
            PipelineError::WithContext { source, context } => PipelineError::WithContext {
                source: Box::new(source.clone_for_response()),
                context: context.clone(),
            },
        }
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(err: sqlx::Error) -> Self {
        PipelineError::Database(err)
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        PipelineError::EnrichmentProvider(err.to_string())
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `PipelineError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, PipelineError>;

    /// Add context lazily (only evaluated on error).
    #[allow(dead_code)]
    fn with_context<F>(self, f: F) -> Result<T, PipelineError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, PipelineError> {
    fn context(self, context: impl Into<String>) -> Result<T, PipelineError> {
        self.map_err(|e| PipelineError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, PipelineError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| PipelineError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, PipelineError> {
        self.map_err(|e| PipelineError::WithContext {
            source: Box::new(PipelineError::Database(e)),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, PipelineError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| PipelineError::WithContext {
            source: Box::new(PipelineError::Database(e)),
            context: f(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hardness_follows_the_context_chain() {
        assert!(PipelineError::Database(sqlx::Error::RowNotFound).is_hard());
        assert!(PipelineError::Configuration("missing ICP".to_string()).is_hard());
        assert!(!PipelineError::EnrichmentProvider("timeout".to_string()).is_hard());
        assert!(!PipelineError::BadRequest("bad email".to_string()).is_hard());

        let wrapped: Result<(), _> = Err(PipelineError::Database(sqlx::Error::RowNotFound));
        assert!(wrapped.context("persisting score").unwrap_err().is_hard());
    }

    #[test]
    fn context_prefixes_the_message() {
        let err: Result<(), _> = Err(PipelineError::BadRequest("bad email".to_string()));
        let err = err.context("parsing input").unwrap_err();
        assert_eq!(err.to_string(), "parsing input: Bad request: bad email");
    }
}
