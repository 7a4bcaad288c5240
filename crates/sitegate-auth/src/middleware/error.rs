//! Error response handling.
//!
//! Every error becomes a JSON body `{"code": "<RESPONSE_CODE>"}`. Denials are
//! 401 with a `WWW-Authenticate` challenge, technical failures 500, and
//! domain validation failures 400. Only technical failures are logged with
//! their cause.

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::{AuthError, ResponseCode};

// =============================================================================
// IntoResponse Implementation
// =============================================================================

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let code = self.response_code();

        if self.is_server_error() {
            tracing::error!(error = %self, category = %self.category(), "Request failed");
        } else {
            tracing::debug!(error = %self, category = %self.category(), "Request rejected");
        }

        code_response(code, status_for(code), serde_json::Value::Null)
    }
}

/// HTTP status for a response code.
#[must_use]
pub fn status_for(code: ResponseCode) -> StatusCode {
    match code {
        ResponseCode::Auth | ResponseCode::AuthOob => StatusCode::UNAUTHORIZED,
        ResponseCode::Technical => StatusCode::INTERNAL_SERVER_ERROR,
        ResponseCode::LoginCompleted
        | ResponseCode::LogoutSuccess
        | ResponseCode::ActivationCompleted => StatusCode::OK,
        _ => StatusCode::BAD_REQUEST,
    }
}

/// Builds a `{"code": ...}` response, with `meta` attached when it is not
/// null.
#[must_use]
pub fn code_response(code: ResponseCode, status: StatusCode, meta: serde_json::Value) -> Response {
    let body = if meta.is_null() {
        json!({ "code": code })
    } else {
        json!({ "code": code, "meta": meta })
    };

    let mut response = (status, Json(body)).into_response();
    if status == StatusCode::UNAUTHORIZED {
        response.headers_mut().insert(
            header::WWW_AUTHENTICATE,
            HeaderValue::from_static("Bearer realm=\"sitegate\""),
        );
    }
    response
}

// =============================================================================
// Tests
// =============================================================================
