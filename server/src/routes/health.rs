use crate::extract::Operator;
use axum::Json;
use serde_json::{Value, json};

pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Landing page. Unknown keys are sent here.
pub async fn index(Operator(operator): Operator) -> Json<Value> {
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "authenticated": operator,
    }))
}
