use axum::{
    response::{IntoResponse, Response},
    Json,
};
use http::StatusCode;
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Storage-layer failures. Never shown to clients verbatim.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("query error: {0}")]
    Query(String),

    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match &e {
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                StoreError::Conflict(db.message().to_string())
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                StoreError::Connection(e.to_string())
            }
            _ => StoreError::Query(e.to_string()),
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("user {0} is not allowed to perform this action")]
    RoleViolation(Uuid),

    #[error("already enrolled")]
    AlreadyEnrolled,

    #[error("not enrolled")]
    NotEnrolled,

    #[error("attempt {0} was already submitted")]
    AlreadySubmitted(Uuid),

    #[error("prerequisite level not met for course {0}")]
    PrerequisiteNotMet(Uuid),

    #[error("pathway {0} has no beginner-level course")]
    NoEntryCourse(Uuid),

    #[error("more than one answer for question {0}")]
    DuplicateAnswer(Uuid),

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("enrolment {enrolment_id} does not belong to the course of quiz {quiz_id}")]
    EnrolmentMismatch { enrolment_id: Uuid, quiz_id: Uuid },

    #[error("validation error: {0}")]
    Validation(String),

    #[error("internal error")]
    Internal(#[from] StoreError),
}

impl EngineError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        EngineError::NotFound { entity, id }
    }

    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            EngineError::NotFound { .. } => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            EngineError::RoleViolation(_) => (StatusCode::FORBIDDEN, "ROLE_VIOLATION"),
            EngineError::AlreadyEnrolled => (StatusCode::CONFLICT, "ALREADY_ENROLLED"),
            EngineError::NotEnrolled => (StatusCode::CONFLICT, "NOT_ENROLLED"),
            EngineError::AlreadySubmitted(_) => (StatusCode::CONFLICT, "ALREADY_SUBMITTED"),
            EngineError::PrerequisiteNotMet(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "PREREQUISITE_NOT_MET")
            }
            EngineError::NoEntryCourse(_) => (StatusCode::UNPROCESSABLE_ENTITY, "NO_ENTRY_COURSE"),
            EngineError::DuplicateAnswer(_) => (StatusCode::BAD_REQUEST, "DUPLICATE_ANSWER"),
            EngineError::InvalidReference(_) => (StatusCode::BAD_REQUEST, "INVALID_REFERENCE"),
            EngineError::EnrolmentMismatch { .. } => {
                (StatusCode::BAD_REQUEST, "ENROLMENT_MISMATCH")
            }
            EngineError::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            EngineError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if let EngineError::Internal(cause) = &self {
            tracing::error!(error = %cause, "internal error");
        }
        // Display for Internal is a fixed string, so storage detail stays in the log.
        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
