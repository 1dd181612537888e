use crate::extract::{ADMIN_COOKIE, Operator, cookie};
use crate::state::AppState;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};

/// Marks every request with whether it carries the operator cookie.
pub async fn identify_operator(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let operator = cookie(request.headers(), ADMIN_COOKIE)
        .is_some_and(|presented| state.is_admin_token(presented));
    request.extensions_mut().insert(Operator(operator));
    next.run(request).await
}

/// Sends anyone but the operator to the login page.
pub async fn require_operator(request: Request, next: Next) -> Response {
    let operator = request
        .extensions()
        .get::<Operator>()
        .is_some_and(|Operator(is)| *is);
    if operator {
        return next.run(request).await;
    }

    tracing::debug!(path = %request.uri().path(), "operator route without login");
    login_redirect(request.uri().path()).into_response()
}

/// Redirect to `/login`, remembering an on-site path to return to.
fn login_redirect(path: &str) -> Redirect {
    Redirect::to(&format!("/login?go={}", safe_return_path(path)))
}

/// Only plain on-site paths of visible ASCII survive; anything else returns to `/`.
pub(crate) fn safe_return_path(path: &str) -> &str {
    let on_site = path.starts_with('/') && !path.starts_with("//");
    let visible = path.bytes().all(|b| b.is_ascii_graphic());
    let plain = !path.contains(['?', '#', '&', '\\']);
    if on_site && visible && plain { path } else { "/" }
}
