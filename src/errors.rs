use crate::api::ApiResponse;
use crate::output_parser::RecordKind;
use axum::{http::StatusCode, response::Json};
use tracing::{error, info, warn};

/// Failures of the prompt → generate → parse pipeline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// Input to the prompt builder is unusable; the caller can fix it.
    #[error("{0}")]
    Validation(String),

    /// The generation collaborator failed or produced nothing.
    #[error("upstream generation failed: {0}")]
    Upstream(String),

    /// Parsing succeeded but no block was usable.
    #[error("generated output contained no usable {task} records")]
    EmptyYield { task: RecordKind },
}

impl GenerationError {
    pub fn empty_generation() -> Self {
        GenerationError::Upstream("empty generation".to_string())
    }
}

/// Centralized error types for consistent API error handling
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Database error: {0}")]
    DatabaseError(#[from] anyhow::Error),

    #[error("LLM service error: {0}")]
    LLMError(String),

    #[error("Generation already in progress: {0}")]
    GenerationInProgress(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Payload too large: {0}")]
    PayloadTooLarge(String),

    #[error("Internal server error: {0}")]
    InternalError(String),
}

impl From<GenerationError> for ApiError {
    fn from(err: GenerationError) -> Self {
        match err {
            GenerationError::Validation(message) => ApiError::ValidationError(message),
            GenerationError::Upstream(_) | GenerationError::EmptyYield { .. } => {
                ApiError::LLMError(err.to_string())
            }
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::DatabaseError(anyhow::Error::from(err))
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

/// Error context for structured logging
#[derive(Debug)]
pub struct ErrorContext {
    pub operation: String,
    pub resource_id: Option<String>,
    pub resource_type: String,
}

impl ErrorContext {
    pub fn new(operation: &str, resource_type: &str) -> Self {
        Self {
            operation: operation.to_string(),
            resource_id: None,
            resource_type: resource_type.to_string(),
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }
}

pub type ErrorResponse = (StatusCode, Json<ApiResponse<()>>);

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::ValidationError(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::GenerationInProgress(_) => StatusCode::CONFLICT,
            ApiError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::LLMError(_) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::DatabaseError(_) | ApiError::InternalError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Convert API error to HTTP response with consistent structure and logging
    pub fn to_response_with_context(self, context: ErrorContext) -> ErrorResponse {
        let status = self.status_code();
        let message = match &self {
            ApiError::NotFound(_) => {
                info!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Resource not found"
                );
                format!("{} not found", context.resource_type)
            }
            ApiError::ValidationError(_)
            | ApiError::BadRequest(_)
            | ApiError::Unauthorized(_)
            | ApiError::GenerationInProgress(_)
            | ApiError::PayloadTooLarge(_) => {
                warn!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Request rejected"
                );
                self.to_string()
            }
            ApiError::LLMError(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "LLM service error"
                );
                "AI service temporarily unavailable. Please try again.".to_string()
            }
            ApiError::DatabaseError(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Database error"
                );
                "Database operation failed. Please try again.".to_string()
            }
            ApiError::InternalError(_) => {
                error!(
                    operation = %context.operation,
                    resource_type = %context.resource_type,
                    resource_id = ?context.resource_id,
                    error = %self,
                    "Internal server error"
                );
                "An internal error occurred. Please try again.".to_string()
            }
        };

        (status, Json(ApiResponse::error(message)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_context_creation() {
        let context = ErrorContext::new("generate_quiz", "quiz")
            .with_id("123");

        assert_eq!(context.operation, "generate_quiz");
        assert_eq!(context.resource_type, "quiz");
        assert_eq!(context.resource_id, Some("123".to_string()));
    }

    #[test]
    fn test_generation_error_mapping() {
        let validation: ApiError = GenerationError::Validation("text too short".into()).into();
        assert_eq!(validation.status_code(), StatusCode::BAD_REQUEST);

        let upstream: ApiError = GenerationError::empty_generation().into();
        assert_eq!(upstream.status_code(), StatusCode::SERVICE_UNAVAILABLE);

        let empty: ApiError = GenerationError::EmptyYield {
            task: RecordKind::Flashcard,
        }
        .into();
        assert_eq!(empty.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_api_error_responses() {
        let context = ErrorContext::new("get_document", "document").with_id("123");
        let (status, Json(body)) =
            ApiError::NotFound("missing".into()).to_response_with_context(context);
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body.error.as_deref(), Some("document not found"));

        let context = ErrorContext::new("chat", "chat");
        let (status, Json(body)) =
            ApiError::LLMError("quota exceeded".into()).to_response_with_context(context);
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(!body.error.unwrap().contains("quota"));

        let context = ErrorContext::new("generate_flashcards", "flashcard_set");
        let (status, _) = ApiError::GenerationInProgress("busy".into())
            .to_response_with_context(context);
        assert_eq!(status, StatusCode::CONFLICT);
    }
}
