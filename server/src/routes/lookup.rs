use crate::error::ServerResult;
use crate::extract::{ClientInfo, SessionToken, TOKEN_COOKIE, set_cookie};
use crate::state::AppState;
use axum::{
    Form, Json,
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Redirect, Response},
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{Value, json};

/// What the lookup form needs: the key and the public widget key.
pub async fn lookup_form(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Json<Value> {
    Json(json!({
        "key": key,
        "site_key": state.config.turnstile.site_key,
    }))
}

#[derive(Debug, Deserialize)]
pub struct LookupForm {
    #[serde(rename = "keyID")]
    key: String,
    #[serde(rename = "formPassword", default)]
    credential: String,
    #[serde(rename = "cf-turnstile-response", default)]
    verification: String,
}

/// `POST /lookup`: verify the human, check the credential, extend the session token.
pub async fn submit_lookup(
    State(state): State<AppState>,
    client: ClientInfo,
    token: SessionToken,
    Form(form): Form<LookupForm>,
) -> ServerResult<Response> {
    state.verifier.verify(&form.verification, &client.ip).await?;

    let LookupForm { key, credential, .. } = form;
    let prior = token.0;
    let now = Utc::now();
    let lookup_key = key.clone();
    let grant = state
        .run(move |core| core.lookup(&lookup_key, &credential, prior.as_deref(), now))
        .await?;

    let max_age = state.core.limits().token_ttl().num_seconds();
    let cookie = set_cookie(
        TOKEN_COOKIE,
        &grant.token,
        max_age,
        state.config.secure_cookies,
    );
    tracing::debug!(key = %key, keys = grant.claims.allowed_keys.len(), "session token issued");

    Ok((
        [(header::SET_COOKIE, cookie)],
        Redirect::to(&format!("/view/{key}")),
    )
        .into_response())
}
