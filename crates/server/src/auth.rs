use axum::{
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::{error, warn};
use uuid::Uuid;

use woms_core::errors::{ApplicationError, InterfaceError};
use woms_core::session::Session;

use crate::api::AppState;

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Reuses the caller's `x-request-id` when it is a sane token, otherwise mints one.
pub fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| {
            !value.is_empty()
                && value.len() <= 128
                && value.chars().all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
        })
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string())
}

/// A verified bearer session for the current HTTP request.
pub struct Authenticated(pub Session);

impl FromRequestParts<AppState> for Authenticated {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let correlation_id = correlation_id(&parts.headers);
        let header = parts.headers.get(header::AUTHORIZATION).and_then(|value| value.to_str().ok());

        match state.tokens.verify_header(header) {
            Ok(actor) => Ok(Self(Session::new(actor, correlation_id))),
            Err(rejection) => {
                warn!(
                    event_name = "auth.token_rejected",
                    correlation_id = %correlation_id,
                    error = %rejection,
                    "bearer token rejected"
                );
                Err(ApiError(InterfaceError::unauthorized(rejection.to_string(), correlation_id)))
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: &'static str,
    pub detail: String,
    pub correlation_id: String,
}

/// HTTP face of [`InterfaceError`].
#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl ApiError {
    pub fn from_app(error: ApplicationError, correlation_id: &str) -> Self {
        Self(error.into_interface(correlation_id))
    }

    pub fn bad_request(message: impl Into<String>, correlation_id: &str) -> Self {
        Self(InterfaceError::BadRequest {
            message: message.into(),
            correlation_id: correlation_id.to_string(),
        })
    }

    pub fn status(&self) -> StatusCode {
        match self.0 {
            InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
            InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
            InterfaceError::Forbidden { .. } => StatusCode::FORBIDDEN,
            InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
            InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
            InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
            InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let interface = self.0;
        if status.is_server_error() {
            error!(
                event_name = "api.request_failed",
                correlation_id = %interface.correlation_id(),
                error_class = interface.error_class(),
                error = %interface,
                "request failed"
            );
        }

        // Internal details never leave the process.
        let detail = match interface {
            InterfaceError::Internal { .. } => String::new(),
            _ => interface.message().to_string(),
        };
        let body = ErrorBody {
            error: interface.error_class(),
            message: interface.user_message(),
            detail,
            correlation_id: interface.correlation_id().to_string(),
        };

        let mut response = (status, Json(body)).into_response();
        if let Ok(value) = HeaderValue::from_str(interface.correlation_id()) {
            response.headers_mut().insert(REQUEST_ID_HEADER, value);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use axum::http::{HeaderMap, HeaderValue, StatusCode};
    use woms_core::errors::ApplicationError;

    use super::{correlation_id, ApiError};

    #[test]
    fn correlation_id_prefers_well_formed_header() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", HeaderValue::from_static("req-42"));
        assert_eq!(correlation_id(&headers), "req-42");

        headers.insert("x-request-id", HeaderValue::from_static("bad id with spaces"));
        assert_ne!(correlation_id(&headers), "bad id with spaces");
    }

    #[test]
    fn application_errors_map_to_http_status() {
        let cases = [
            (ApplicationError::validation("empty"), StatusCode::BAD_REQUEST),
            (ApplicationError::Forbidden("no".into()), StatusCode::FORBIDDEN),
            (ApplicationError::NotFound("gone".into()), StatusCode::NOT_FOUND),
            (ApplicationError::Conflict("race".into()), StatusCode::CONFLICT),
            (ApplicationError::RenderUnavailable("slow".into()), StatusCode::SERVICE_UNAVAILABLE),
            (ApplicationError::Persistence("disk".into()), StatusCode::SERVICE_UNAVAILABLE),
            (ApplicationError::Configuration("bad".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, expected) in cases {
            assert_eq!(ApiError::from_app(error, "cid").status(), expected);
        }
    }
}
