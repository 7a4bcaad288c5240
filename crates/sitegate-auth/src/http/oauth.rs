//! OAuth broker endpoints.

use axum::{
    Form, Json,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use serde_json::json;

use super::session::login_response;
use crate::broker::BrokerRequest;
use crate::error::AuthError;
use crate::login::UserInfo;
use crate::middleware::{AuthContext, AuthState, code_response, status_for};

/// Query of the provider's redirect back to us.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ProviderRedirect {
    pub state: String,
    pub code: String,
}

/// Body of an action request.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ActionForm {
    pub action: String,
}

/// `GET|POST /account/oauth-request`
pub async fn oauth_request_handler(
    State(state): State<AuthState>,
    Form(request): Form<BrokerRequest>,
) -> Response {
    match state.broker.start(request).await {
        Ok(url) => Json(json!({ "url": url })).into_response(),
        Err(err) => err.into_response(),
    }
}

/// `GET /account/oauth-response/`
pub async fn oauth_response_handler(
    State(state): State<AuthState>,
    Query(redirect): Query<ProviderRedirect>,
) -> Redirect {
    let target = state.broker.capture(&redirect.state, &redirect.code).await;
    Redirect::temporary(&target)
}

/// `POST /account/oauth-action`
pub async fn oauth_action_handler(
    State(state): State<AuthState>,
    ctx: AuthContext,
    Form(form): Form<ActionForm>,
) -> Response {
    let Some(claims) = ctx.claims.as_ref() else {
        return AuthError::invalid_token("no state credential").into_response();
    };

    match state.broker.act(claims, &form.action).await {
        Ok(outcome) => {
            let mut body = json!({ "userInfo": UserInfo::from(&outcome.account) });
            if !outcome.meta.is_null() {
                body["meta"] = outcome.meta;
            }
            login_response(&state, &outcome.issued, body)
        }
        Err(failure) => {
            let code = failure.error.response_code();
            if failure.error.is_server_error() {
                tracing::error!(error = %failure.error, "OAuth action failed");
            } else {
                tracing::debug!(error = %failure.error, "OAuth action rejected");
            }
            code_response(code, status_for(code), failure.meta)
        }
    }
}
