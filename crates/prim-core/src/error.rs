//! Canonical error envelopes shared by every prim route.
//!
//! Handlers build errors only through the [`ApiError`] constructors so clients can
//! dispatch on [`ErrorCode`] instead of parsing messages. Each constructor pins the
//! `(code, status)` pair.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::allowlist::StoreError;
use crate::metrics::ENVELOPES_RENDERED;

/// Message returned for every `unknown` fault. The cause goes to the log only.
pub const INTERNAL_ERROR_MESSAGE: &str = "An internal error occurred";

/// Machine-readable error class. The only field clients should branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidRequest,
    Forbidden,
    Unauthorized,
    NotConfigured,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::NotConfigured => "not_configured",
            ErrorCode::Unknown => "unknown",
        }
    }

    /// Default HTTP status for the class.
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::NotConfigured => StatusCode::NOT_IMPLEMENTED,
            ErrorCode::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire shape of an error, before the feedback channel is merged in.
///
/// Rendered responses carry a copy of the envelope in their extensions so the
/// response augmenter can recognise taxonomy errors without re-parsing the body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorEnvelope {
    pub code: ErrorCode,
    pub message: String,
    pub status: StatusCode,
}

impl ErrorEnvelope {
    /// JSON body: `{"error": {"code", "message"}}`, plus `feedback_url` when given.
    pub fn to_body(&self, feedback_url: Option<&str>) -> serde_json::Value {
        let mut body = serde_json::json!({
            "error": {
                "code": self.code,
                "message": self.message,
            }
        });
        if let Some(url) = feedback_url {
            body["feedback_url"] = serde_json::json!(url);
        }
        body
    }
}

/// Error returned by route handlers and pipeline stages.
#[derive(Debug)]
pub struct ApiError {
    envelope: ErrorEnvelope,
    /// Internal detail, logged on render and never sent to the client.
    cause: Option<String>,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            envelope: ErrorEnvelope {
                code,
                message: message.into(),
                status: code.status(),
            },
            cause: None,
        }
    }

    /// 400: caller input missing or malformed.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// 404: the addressed resource does not exist. Classed as caller input.
    pub fn not_found(message: impl Into<String>) -> Self {
        let mut err = Self::new(ErrorCode::InvalidRequest, message);
        err.envelope.status = StatusCode::NOT_FOUND;
        err
    }

    /// 403: a required identity is absent.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Forbidden, message)
    }

    /// 401: identity present but lacking permission.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Unauthorized, message)
    }

    /// 501: the service was deployed without a required secret or setting.
    pub fn not_configured(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotConfigured, message)
    }

    /// 500: unexpected fault. The client sees a generic message.
    pub fn unknown(cause: impl fmt::Display) -> Self {
        let mut err = Self::new(ErrorCode::Unknown, INTERNAL_ERROR_MESSAGE);
        err.cause = Some(cause.to_string());
        err
    }

    pub fn code(&self) -> ErrorCode {
        self.envelope.code
    }

    pub fn message(&self) -> &str {
        &self.envelope.message
    }

    pub fn envelope(&self) -> &ErrorEnvelope {
        &self.envelope
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.cause {
            Some(ref cause) => write!(f, "{}: {}", self.envelope.code, cause),
            None => write!(f, "{}: {}", self.envelope.code, self.envelope.message),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        ApiError::unknown(format!("allowlist store: {}", e))
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        self.envelope.status
    }

    fn error_response(&self) -> HttpResponse {
        if let Some(ref cause) = self.cause {
            tracing::error!(code = %self.envelope.code, error = %cause, "Internal error");
        }
        ENVELOPES_RENDERED
            .with_label_values(&[self.envelope.code.as_str()])
            .inc();

        let mut res = HttpResponse::build(self.envelope.status).json(self.envelope.to_body(None));
        res.extensions_mut().insert(self.envelope.clone());
        res
    }
}
