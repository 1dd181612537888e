use crate::error::{ServerError, ServerResult};
use crate::extract::{ADMIN_COOKIE, ClientInfo, set_cookie};
use crate::middleware::safe_return_path;
use crate::state::AppState;
use axum::{
    Form, Json,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;
use serde_json::{Value, json};

/// Operator cookie lifetime.
const ADMIN_COOKIE_MAX_AGE_SECS: i64 = 24 * 60 * 60;

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    #[serde(default)]
    go: String,
}

pub async fn login_form(
    State(state): State<AppState>,
    Query(query): Query<LoginQuery>,
) -> Json<Value> {
    Json(json!({
        "site_key": state.config.turnstile.site_key,
        "redirect": safe_return_path(&query.go),
    }))
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    password: String,
    #[serde(default)]
    redirect: String,
    #[serde(rename = "cf-turnstile-response", default)]
    verification: String,
}

pub async fn submit_login(
    State(state): State<AppState>,
    client: ClientInfo,
    Form(form): Form<LoginForm>,
) -> ServerResult<Response> {
    state.verifier.verify(&form.verification, &client.ip).await?;

    if !state.is_admin_token(&form.password) {
        tracing::warn!(ip = %client.ip, "operator login failed");
        return Err(ServerError::LoginFailed);
    }
    tracing::info!(ip = %client.ip, "operator logged in");

    let cookie = set_cookie(
        ADMIN_COOKIE,
        state.admin_token(),
        ADMIN_COOKIE_MAX_AGE_SECS,
        state.config.secure_cookies,
    );
    Ok((
        [(header::SET_COOKIE, cookie)],
        Redirect::to(safe_return_path(&form.redirect)),
    )
        .into_response())
}
