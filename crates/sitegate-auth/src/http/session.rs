//! Login, logout and explicit refresh.

use axum::{
    Form, Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use serde_json::json;

use crate::broker::state::login_audience;
use crate::error::{AuthError, ResponseCode};
use crate::login::{LookupKind, UserInfo};
use crate::middleware::auth::with_cookie;
use crate::middleware::{AuthContext, AuthState, code_response, status_for};
use crate::token::{Audience, Issued};

/// Password login form.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub uname: String,
    pub pw: String,
    /// `app` (default) or `cookie`.
    pub aud: Option<String>,
}

/// `POST /account/login`
pub async fn login_handler(State(state): State<AuthState>, Form(form): Form<LoginForm>) -> Response {
    let audience = match form.aud.as_deref() {
        None | Some("") => Audience::App,
        Some(value) => match login_audience(value) {
            Ok(audience) => audience,
            Err(err) => return err.into_response(),
        },
    };

    match state
        .login
        .login(&form.uname, &form.pw, audience, LookupKind::Password)
        .await
    {
        Ok(outcome) => login_response(&state, &outcome.issued, json!({})),
        Err(failure) => {
            let code = failure.error.response_code();
            if failure.error.is_server_error() {
                tracing::error!(error = %failure.error, "Login failed");
            } else {
                tracing::debug!(error = %failure.error, "Login rejected");
            }
            let meta = failure
                .account
                .as_ref()
                .map(|account| json!(UserInfo::from(account)))
                .unwrap_or_default();
            code_response(code, status_for(code), meta)
        }
    }
}

/// `POST /account/logout`
pub async fn logout_handler(State(state): State<AuthState>, ctx: AuthContext) -> Response {
    if let Some(self_id) = ctx.self_id() {
        if let Err(err) = state.lifecycle.revoke(self_id).await {
            return err.into_response();
        }
        tracing::info!(self_id, "Logged out");
    }

    let response = code_response(
        ResponseCode::LogoutSuccess,
        StatusCode::OK,
        serde_json::Value::Null,
    );
    with_cookie(response, &state.config.cookie.clear())
}

/// `POST /account/login-token-refresh`
///
/// Hands back the credential in force, refreshed by the guard if it had
/// expired.
pub async fn refresh_handler(ctx: AuthContext) -> Response {
    match ctx.credential {
        Some(credential) => Json(json!({ "jwt": credential })).into_response(),
        None => AuthError::invalid_token("no credential").into_response(),
    }
}

/// A `LOGIN_COMPLETED` response for a freshly issued login credential.
///
/// `body` is extended with `code` and `jwt`. COOKIE credentials also get
/// the cookie and the session id the client must echo in its CSRF header.
pub(crate) fn login_response(
    state: &AuthState,
    issued: &Issued,
    mut body: serde_json::Value,
) -> Response {
    if let Some(map) = body.as_object_mut() {
        map.insert("code".into(), json!(ResponseCode::LoginCompleted));
        map.insert("jwt".into(), json!(issued.credential));
        if issued.claims.audience == Audience::Cookie {
            map.insert("sid".into(), json!(issued.claims.session_id));
        }
    }

    let response = Json(body).into_response();
    if issued.claims.audience == Audience::Cookie {
        with_cookie(response, &state.credential_cookie(&issued.credential))
    } else {
        response
    }
}
