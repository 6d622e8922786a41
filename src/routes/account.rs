use crate::{
    auth::{RollcallSession, backend::RollcallAuthCredentials},
    error::RollcallResult,
    mail::verify_account,
    state::RollcallState,
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use serde_json::json;

#[derive(Deserialize)]
pub struct LoginForm {
    email: String,
    password: SecretString,
}

#[derive(Serialize)]
pub struct LoggedIn {
    id: i32,
    name: String,
}

pub async fn post_login(
    mut session: RollcallSession,
    Json(LoginForm { email, password }): Json<LoginForm>,
) -> RollcallResult<Response> {
    let Some(user) = session
        .authenticate(RollcallAuthCredentials::EmailPassword { email, password })
        .await?
    else {
        // avoid giving extra details for security reasons :)
        return Ok((
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Email/Password not found or password incorrect" })),
        )
            .into_response());
    };

    session.login(&user).await?;
    info!(id = user.id, email = %user.email, "Logged in");

    Ok(Json(LoggedIn {
        id: user.id,
        name: user.name,
    })
    .into_response())
}

pub async fn post_logout(mut session: RollcallSession) -> RollcallResult<StatusCode> {
    session.logout().await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_verify_account(
    State(state): State<RollcallState>,
    Path(token): Path<String>,
) -> RollcallResult<Json<serde_json::Value>> {
    let user_id = verify_account(&state, &token).await?;
    info!(user_id, "Verified account email");
    Ok(Json(json!({ "message": "Email verified successfully." })))
}
