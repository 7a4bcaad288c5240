//! Account activation through an emailed out-of-band credential.

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::error::{AuthError, ResponseCode};
use crate::middleware::{AuthContext, AuthState, code_response};
use crate::storage::{AccountStore, Task, TaskQueue};

/// `POST /account/activate`
///
/// The route is single-use, so the guard revokes the credential once the
/// account is activated. An already active account leaves it intact.
pub async fn activate_handler(State(state): State<AuthState>, ctx: AuthContext) -> Response {
    let Some(account) = ctx.account() else {
        return AuthError::out_of_band_required("activation needs an account credential")
            .into_response();
    };
    if account.active {
        return code_response(
            ResponseCode::ActivationExists,
            StatusCode::BAD_REQUEST,
            serde_json::Value::Null,
        );
    }

    let mut account = account.clone();
    account.active = true;
    if let Err(err) = state.accounts.save(&account).await {
        return err.into_response();
    }
    tracing::info!(account_id = account.id, "Account activated");

    let task = Task::MailingListSync {
        account_id: account.id,
    };
    if let Err(err) = state.tasks.enqueue(task).await {
        tracing::warn!(account_id = account.id, error = %err, "Failed to enqueue mailing list sync");
    }

    code_response(
        ResponseCode::ActivationCompleted,
        StatusCode::OK,
        serde_json::Value::Null,
    )
}
