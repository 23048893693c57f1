use std::error::Error as StdError;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use feedcache_api_types::ErrorBody;

use crate::application::error::ErrorReport;
use crate::application::repos::{CacheError, QueryError};
use crate::application::sampling::SamplingError;
use crate::config::HttpSettings;
use crate::domain::error::ParameterError;

/// Stable error classification carried in every error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parameter,
    Query,
    CacheUnavailable,
    Cache,
    Serialization,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Parameter => "parameter",
            ErrorKind::Query => "query",
            ErrorKind::CacheUnavailable => "cache_unavailable",
            ErrorKind::Cache => "cache",
            ErrorKind::Serialization => "serialization",
        }
    }
}

/// How error kinds become HTTP statuses.
///
/// `Uniform` answers 500 for everything, which is what existing clients
/// expect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorStatusPolicy {
    #[default]
    Uniform,
    Typed,
}

impl ErrorStatusPolicy {
    pub fn status(self, kind: ErrorKind) -> StatusCode {
        match self {
            ErrorStatusPolicy::Uniform => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorStatusPolicy::Typed => match kind {
                ErrorKind::Parameter => StatusCode::BAD_REQUEST,
                ErrorKind::Query | ErrorKind::CacheUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::Cache | ErrorKind::Serialization => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl From<&HttpSettings> for ErrorStatusPolicy {
    fn from(settings: &HttpSettings) -> Self {
        if settings.typed_error_status {
            ErrorStatusPolicy::Typed
        } else {
            ErrorStatusPolicy::Uniform
        }
    }
}

#[derive(Debug)]
pub struct ApiError {
    kind: ErrorKind,
    error: Box<dyn StdError + Send + Sync>,
}

impl ApiError {
    pub fn new(kind: ErrorKind, error: impl StdError + Send + Sync + 'static) -> Self {
        Self {
            kind,
            error: Box::new(error),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Render the JSON body and attach the diagnostic for the logging layer.
    pub fn respond(self, source: &'static str, policy: ErrorStatusPolicy) -> Response {
        let status = policy.status(self.kind);
        let body = ErrorBody {
            error: self.error.to_string(),
            kind: self.kind.as_str().to_string(),
        };
        let mut response = (status, Json(body)).into_response();
        ErrorReport::from_error(source, status, &*self.error).attach(&mut response);
        response
    }
}

impl From<ParameterError> for ApiError {
    fn from(err: ParameterError) -> Self {
        Self::new(ErrorKind::Parameter, err)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(err: JsonRejection) -> Self {
        Self::new(ErrorKind::Parameter, err)
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        Self::new(ErrorKind::Query, err)
    }
}

impl From<CacheError> for ApiError {
    fn from(err: CacheError) -> Self {
        let kind = match err {
            CacheError::Unavailable(_) => ErrorKind::CacheUnavailable,
            CacheError::Command(_) => ErrorKind::Cache,
        };
        Self::new(kind, err)
    }
}

impl From<SamplingError> for ApiError {
    fn from(err: SamplingError) -> Self {
        match err {
            SamplingError::Query(err) => err.into(),
            SamplingError::Cache(err) => err.into(),
            err @ SamplingError::Serialization { .. } => Self::new(ErrorKind::Serialization, err),
        }
    }
}
