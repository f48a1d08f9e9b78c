use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use std::fmt;

/// Application-specific error types.
#[derive(Debug, Clone)]
pub enum AppError {
    /// The OAuth authority refused or failed the password-grant exchange.
    AuthFailure(String),
    /// Missing or invalid client input, raised before any outbound call.
    Validation(String),
    /// Expected absence of a record.
    NotFound(String),
    /// The provider reported a duplicate consult but no record could be located.
    DuplicateUnresolved {
        /// Document number the duplicate was reported for.
        document_number: String,
    },
    /// Upstream failure from the consignment API.
    Provider {
        /// HTTP status returned by the provider, if a response arrived at all.
        upstream_status: Option<u16>,
        /// Structured error body returned by the provider, if any.
        body: Option<Value>,
        /// Human-readable description for logs.
        message: String,
    },
    /// Internal server error.
    InternalError(String),
    /// Error with context chain for better debugging.
    WithContext {
        /// The underlying source of the error.
        source: Box<AppError>,
        /// Additional context message.
        context: String,
    },
}

impl AppError {
    /// Provider error built from a transport failure (no response received).
    pub fn transport(message: impl Into<String>) -> Self {
        AppError::Provider {
            upstream_status: None,
            body: None,
            message: message.into(),
        }
    }

    /// The `type` field of the provider's structured error payload.
    pub fn provider_error_type(&self) -> Option<&str> {
        match self {
            AppError::Provider { body: Some(body), .. } => body.get("type")?.as_str(),
            AppError::WithContext { source, .. } => source.provider_error_type(),
            _ => None,
        }
    }

    /// Strips context wrappers, returning the innermost error.
    pub fn root(&self) -> &AppError {
        match self {
            AppError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Converts the error into a response, using `failure_status` for upstream
    /// failures (provider errors and token acquisition failures).
    ///
    /// Each proxied endpoint has its own failure status: 400 for most, 500 for
    /// the simulation configs.
    pub fn into_response_with(self, failure_status: StatusCode) -> Response {
        match self {
            AppError::Provider {
                upstream_status,
                body,
                message,
            } => {
                tracing::error!(
                    "Provider error (upstream status {:?}): {}",
                    upstream_status,
                    message
                );
                // Structured provider payloads are forwarded verbatim
                let body = body.unwrap_or_else(|| json!({ "erro": true }));
                (failure_status, Json(body)).into_response()
            }
            AppError::AuthFailure(msg) => {
                tracing::error!("Token acquisition failed: {}", msg);
                (
                    failure_status,
                    Json(json!({
                        "erro": true,
                        "message": "failed to authenticate with provider",
                    })),
                )
                    .into_response()
            }
            AppError::WithContext { source, context } => {
                tracing::error!("Error with context: {} -> {}", context, source);
                source.into_response_with(failure_status)
            }
            other => other.into_response(),
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::AuthFailure(msg) => write!(f, "Auth failure: {}", msg),
            AppError::Validation(msg) => write!(f, "Validation error: {}", msg),
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::DuplicateUnresolved { document_number } => write!(
                f,
                "Consult already exists for document {} but could not be located",
                document_number
            ),
            AppError::Provider {
                upstream_status: Some(status),
                message,
                ..
            } => write!(f, "Provider error ({}): {}", status, message),
            AppError::Provider { message, .. } => write!(f, "Provider error: {}", message),
            AppError::InternalError(msg) => write!(f, "Internal error: {}", msg),
            AppError::WithContext { source, context } => {
                write!(f, "{}: {}", context, source)
            }
        }
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    /// Maps each error variant to an HTTP status code and the `{erro: true}`
    /// envelope clients of this service expect.
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "erro": true, "message": msg }),
            ),
            AppError::NotFound(msg) => {
                tracing::warn!("Not found: {}", msg);
                (
                    StatusCode::NOT_FOUND,
                    json!({ "erro": true, "message": msg }),
                )
            }
            AppError::DuplicateUnresolved { document_number } => {
                tracing::error!(
                    "Duplicate consult reported for {} but no record was found",
                    document_number
                );
                (
                    StatusCode::CONFLICT,
                    json!({
                        "erro": true,
                        "type": "consult_exists_but_not_found",
                        "message": "consult already exists for this document but could not be located",
                    }),
                )
            }
            AppError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "erro": true, "message": "internal server error" }),
                )
            }
            upstream => return upstream.into_response_with(StatusCode::BAD_REQUEST),
        };

        (status, Json(body)).into_response()
    }
}

/// Malformed or mistyped request bodies answer with the same 400 envelope as
/// any other validation failure.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `AppError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T, AppError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, AppError> {
    fn context(self, context: impl Into<String>) -> Result<T, AppError> {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, AppError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| AppError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}
