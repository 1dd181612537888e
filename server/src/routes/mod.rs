use crate::middleware::{identify_operator, require_operator};
use crate::state::AppState;
use axum::{
    Router,
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

mod admin;
mod entry;
mod health;
mod images;
mod login;
mod lookup;
mod route;
mod view;

/// Room for the non-file form fields of an entry upload.
const FORM_OVERHEAD_BYTES: u64 = 1024 * 1024;

pub fn router(state: AppState) -> Router {
    let limits = state.core.limits();
    let upload_limit = limits
        .max_upload_bytes
        .saturating_mul(limits.max_images as u64)
        .saturating_add(FORM_OVERHEAD_BYTES);
    let upload_limit = usize::try_from(upload_limit).unwrap_or(usize::MAX);

    let operator_only = Router::new()
        .route("/create/{key}", get(entry::create_form))
        .route(
            "/entry",
            post(entry::create_entry).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/admin/keys", get(admin::list_keys))
        .route("/admin/keys/generate", post(admin::generate_keys))
        .route("/admin/keys/status/{key}", get(admin::key_status))
        .route("/admin/visits/{key}", get(admin::visits))
        .route_layer(axum_middleware::from_fn(require_operator));

    let public = Router::new()
        .route("/", get(health::index))
        .route("/health", get(health::health_check))
        .route("/s/{key}", get(route::route_key))
        .route("/lookup/{key}", get(lookup::lookup_form))
        .route("/lookup", post(lookup::submit_lookup))
        .route("/login", get(login::login_form).post(login::submit_login))
        .route("/view/{key}", get(view::view_entry))
        .route("/img/{key}/{name}", get(images::serve_image));

    Router::new()
        .merge(operator_only)
        .merge(public)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            identify_operator,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
