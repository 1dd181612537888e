use crate::error::ServerResult;
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    response::Redirect,
};
use mailtrack_core::core::auth::Route;

/// Entry point printed on the mail piece: `/s/{key}`.
pub async fn route_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ServerResult<Redirect> {
    let route = state.run(move |core| Ok(core.route(&key))).await?;
    let target = match route {
        Route::Landing => "/".to_string(),
        Route::AwaitingCreation(key) => format!("/create/{key}"),
        Route::AwaitingLookup(key) => format!("/lookup/{key}"),
    };
    Ok(Redirect::to(&target))
}
