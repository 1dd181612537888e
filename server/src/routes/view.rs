use crate::error::ServerResult;
use crate::extract::{ClientInfo, Operator, SessionToken};
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State},
};
use chrono::Utc;
use mailtrack_core::core::EntryView;

pub async fn view_entry(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Operator(operator): Operator,
    client: ClientInfo,
    SessionToken(token): SessionToken,
) -> ServerResult<Json<EntryView>> {
    let visitor = client.visitor();
    let now = Utc::now();
    let view = state
        .run(move |core| core.view(&key, token.as_deref(), operator, &visitor, now))
        .await?;
    Ok(Json(view))
}
