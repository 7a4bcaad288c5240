use axum::{Form, Json, http::StatusCode, response::IntoResponse};
use serde::Deserialize;
use serde_json::json;
use sitegate_auth::AuthContext;

/// `GET /ping`: proves the credential is good, refreshing it if needed.
pub async fn ping(ctx: AuthContext) -> impl IntoResponse {
    Json(json!({
        "pong": true,
        "uid": ctx.claims.as_ref().map(|claims| claims.subject_id),
    }))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct MailingListSync {
    pub account_id: i64,
}

/// `POST /webhooks/mailing-list`: task runner callback for queued
/// newsletter subscriptions.
pub async fn mailing_list_webhook(Form(sync): Form<MailingListSync>) -> StatusCode {
    tracing::info!(account_id = sync.account_id, "Mailing list sync acknowledged");
    StatusCode::NO_CONTENT
}
