// HTTP API Error Types
use axum::{response::IntoResponse, http::StatusCode, Json};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::database::manager::DatabaseError;
use crate::filter::FilterError;
use crate::tenancy::{ResolutionFailure, ResourceKind, TenancyError};

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>
    },
    TenantRequired(String),

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),
    TenantInactive(String),
    FeatureDisabled(String),
    LimitExceeded {
        resource: ResourceKind,
        current: u64,
        max: u64,
    },

    // 404 Not Found
    NotFound(String),
    TenantNotFound(String),

    // 409 Conflict
    Conflict(String),

    // 500 Internal Server Error
    InternalServerError(String),
    IsolationViolation,

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    /// Get HTTP status code
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::ValidationError { .. } => 400,
            ApiError::TenantRequired(_) => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::TenantInactive(_) => 403,
            ApiError::FeatureDisabled(_) => 403,
            ApiError::LimitExceeded { .. } => 403,
            ApiError::NotFound(_) => 404,
            ApiError::TenantNotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::InternalServerError(_) => 500,
            ApiError::IsolationViolation => 500,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::ValidationError { message, .. } => message,
            ApiError::TenantRequired(msg) => msg,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::TenantInactive(msg) => msg,
            ApiError::FeatureDisabled(msg) => msg,
            ApiError::LimitExceeded { .. } => "limit exceeded",
            ApiError::NotFound(msg) => msg,
            ApiError::TenantNotFound(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::IsolationViolation => "An error occurred while processing your request",
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    /// Convert to JSON response body
    pub fn to_json(&self) -> Value {
        match self {
            ApiError::ValidationError { message, field_errors } => {
                let mut response = json!({
                    "error": true,
                    "message": message,
                    "code": "VALIDATION_ERROR"
                });

                if let Some(field_errors) = field_errors {
                    response["field_errors"] = json!(field_errors);
                }

                response
            }
            ApiError::LimitExceeded { resource, current, max } => {
                json!({
                    "error": true,
                    "message": self.message(),
                    "code": self.error_code(),
                    "resource": resource,
                    "current": current,
                    "max": max
                })
            }
            _ => {
                json!({
                    "error": true,
                    "message": self.message(),
                    "code": self.error_code()
                })
            }
        }
    }

    /// Get error code for client handling
    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::TenantRequired(_) => "TENANT_REQUIRED",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::TenantInactive(_) => "TENANT_INACTIVE",
            ApiError::FeatureDisabled(_) => "FEATURE_DISABLED",
            ApiError::LimitExceeded { .. } => "LIMIT_EXCEEDED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::TenantNotFound(_) => "TENANT_NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::IsolationViolation => "ISOLATION_VIOLATION",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

// Static constructor methods
impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(
        message: impl Into<String>,
        field_errors: Option<HashMap<String, String>>
    ) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

// Convert other error types to ApiError
impl From<TenancyError> for ApiError {
    fn from(err: TenancyError) -> Self {
        match err {
            TenancyError::Resolution(ResolutionFailure::Missing) => ApiError::TenantRequired(
                "Tenant could not be determined from header, host, or path".to_string(),
            ),
            TenancyError::Resolution(ResolutionFailure::UnknownTenant { origin, value }) => {
                ApiError::TenantNotFound(format!("Unknown tenant '{}' (from {})", value, origin))
            }
            TenancyError::TenantInactive { slug, status } => {
                ApiError::TenantInactive(format!("Tenant '{}' is {}", slug, status))
            }
            TenancyError::FeatureDisabled { slug, feature } => ApiError::FeatureDisabled(format!(
                "Feature '{}' is not enabled for tenant '{}'",
                feature, slug
            )),
            // Already logged on the security target; the client learns nothing more
            TenancyError::IsolationViolation(_) => ApiError::IsolationViolation,
            TenancyError::LimitExceeded { resource, current, max } => {
                ApiError::LimitExceeded { resource, current, max }
            }
            TenancyError::Validation(msg) => ApiError::validation_error(msg, None),
            TenancyError::NotFound(msg) => ApiError::not_found(msg),
            TenancyError::Conflict(msg) => ApiError::conflict(msg),
            TenancyError::Store(msg) => {
                tracing::error!("Tenant store error: {}", msg);
                ApiError::service_unavailable("Tenant store temporarily unavailable")
            }
        }
    }
}

impl From<FilterError> for ApiError {
    fn from(err: FilterError) -> Self {
        ApiError::bad_request(err.to_string())
    }
}

impl From<DatabaseError> for ApiError {
    fn from(err: DatabaseError) -> Self {
        match err {
            DatabaseError::NotFound(msg) => ApiError::not_found(msg),
            DatabaseError::Conflict(msg) => ApiError::conflict(msg),
            DatabaseError::Filter(e) => e.into(),
            DatabaseError::Tenancy(e) => e.into(),
            DatabaseError::ConfigMissing(_) | DatabaseError::InvalidDatabaseUrl => {
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            DatabaseError::QueryError(msg) => {
                // Don't expose internal SQL errors to clients
                tracing::error!("Database query error: {}", msg);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
            DatabaseError::Sqlx(sqlx_err) => {
                // Log the real error but return generic message
                tracing::error!("SQLx error: {}", sqlx_err);
                ApiError::internal_server_error("Database error occurred")
            }
        }
    }
}

// Standard error trait implementations
impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tenancy::ResolvedFrom;

    #[test]
    fn limit_exceeded_body_carries_counts() {
        let err: ApiError = TenancyError::LimitExceeded {
            resource: ResourceKind::Jobs,
            current: 5,
            max: 5,
        }
        .into();

        assert_eq!(err.status_code(), 403);
        let body = err.to_json();
        assert_eq!(body["code"], "LIMIT_EXCEEDED");
        assert_eq!(body["message"], "limit exceeded");
        assert_eq!(body["resource"], "jobs");
        assert_eq!(body["current"], 5);
        assert_eq!(body["max"], 5);
    }

    #[test]
    fn resolution_failures_map_to_distinct_codes() {
        let missing: ApiError = TenancyError::missing_tenant().into();
        assert_eq!((missing.status_code(), missing.error_code()), (400, "TENANT_REQUIRED"));

        let unknown: ApiError = TenancyError::unknown_tenant(ResolvedFrom::Header, "nope").into();
        assert_eq!((unknown.status_code(), unknown.error_code()), (404, "TENANT_NOT_FOUND"));
    }

    #[test]
    fn isolation_violation_hides_detail() {
        let err: ApiError =
            DatabaseError::Tenancy(TenancyError::IsolationViolation("row from tenant x".into())).into();
        assert_eq!(err.status_code(), 500);
        assert!(!err.message().contains("tenant x"));
    }
}
