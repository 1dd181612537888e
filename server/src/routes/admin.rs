use crate::error::ServerResult;
use crate::geo::{GeoInfo, locate_str};
use crate::state::AppState;
use axum::{
    Form, Json,
    extract::{Path, State},
};
use chrono::Utc;
use mailtrack_core::types::{AuditRecord, KeyRecord, KeyStatus, KeyUsage};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
pub struct GenerateForm {
    quantity: usize,
    length: usize,
    #[serde(default)]
    comment: String,
}

pub async fn generate_keys(
    State(state): State<AppState>,
    Form(form): Form<GenerateForm>,
) -> ServerResult<Json<Vec<KeyRecord>>> {
    let now = Utc::now();
    let created = state
        .run(move |core| core.generate_keys(form.quantity, form.length, &form.comment, now))
        .await?;
    Ok(Json(created))
}

pub async fn list_keys(State(state): State<AppState>) -> ServerResult<Json<Vec<KeyUsage>>> {
    let keys = state.run(|core| Ok(core.list_with_usage())).await?;
    Ok(Json(keys))
}

#[derive(Debug, Serialize)]
pub struct KeyStatusResponse {
    key: String,
    #[serde(flatten)]
    status: KeyStatus,
}

pub async fn key_status(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ServerResult<Json<KeyStatusResponse>> {
    let (key, status) = state
        .run(move |core| core.key_status(&key).map(|status| (key, status)))
        .await?;
    Ok(Json(KeyStatusResponse { key, status }))
}

/// A logged visit with optional geolocation of its address.
#[derive(Debug, Serialize)]
pub struct VisitResponse {
    #[serde(flatten)]
    record: AuditRecord,
    geo: Option<GeoInfo>,
}

pub async fn visits(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ServerResult<Json<Vec<VisitResponse>>> {
    let records = state.run(move |core| core.visits(&key)).await?;
    let visits = records
        .into_iter()
        .map(|record| {
            let geo = locate_str(state.geo.as_ref(), &record.client_ip);
            VisitResponse { record, geo }
        })
        .collect();
    Ok(Json(visits))
}
