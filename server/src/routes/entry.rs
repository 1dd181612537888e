use crate::error::{ServerError, ServerResult};
use crate::state::AppState;
use axum::{
    Json,
    extract::{
        Multipart, Path, State,
        multipart::{Field, MultipartError},
    },
    http::StatusCode,
    response::Redirect,
};
use chrono::{DateTime, NaiveDateTime, Utc};
use mailtrack_core::ValidationError;
use mailtrack_core::core::ImageUpload;
use mailtrack_core::types::{AccessControl, AccessMethod, EntryPayload, LookupLimit, MethodKind};
use serde_json::{Value, json};
use std::io::Cursor;

/// Multipart field holding image files. May repeat.
const FILES_FIELD: &str = "files";

/// What the operator's create form needs to know about a key.
pub async fn create_form(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> ServerResult<Json<Value>> {
    let limits = state.core.limits().clone();
    let (key, status) = state
        .run(move |core| core.key_status(&key).map(|status| (key, status)))
        .await?;
    Ok(Json(json!({
        "key": key,
        "status": status,
        "max_images": limits.max_images,
        "max_upload_bytes": limits.max_upload_bytes,
    })))
}

/// Text fields of the entry form, as submitted.
#[derive(Debug, Default)]
struct EntryForm {
    entry_id: String,
    recipient_name: String,
    remarks: String,
    origin_location: String,
    post_date: String,
    access_method: String,
    access_secret: Option<String>,
    limit_kind: String,
    available_after: String,
    available_before: String,
}

impl EntryForm {
    fn set(&mut self, name: &str, value: String) {
        match name {
            "entryId" => self.entry_id = value,
            "recipientName" => self.recipient_name = value,
            "remarks" => self.remarks = value,
            "originLocation" => self.origin_location = value,
            "postDate" => self.post_date = value,
            "accessMethod" => self.access_method = value,
            "accessSecret" => self.access_secret = Some(value),
            "limitKind" => self.limit_kind = value,
            "availableAfter" => self.available_after = value,
            "availableBefore" => self.available_before = value,
            other => tracing::debug!(field = other, "ignoring unknown entry field"),
        }
    }

    fn into_payload(self) -> ServerResult<EntryPayload> {
        let method = parse_method(&self.access_method, self.access_secret)?;
        let limit = parse_limit(
            &self.limit_kind,
            &self.available_after,
            &self.available_before,
        )?;
        Ok(EntryPayload {
            recipient_name: self.recipient_name,
            remarks: self.remarks,
            origin_location: self.origin_location,
            post_date: self.post_date,
            images: Vec::new(),
            access: AccessControl { method, limit },
        })
    }
}

fn parse_method(kind: &str, secret: Option<String>) -> ServerResult<Option<AccessMethod>> {
    let kind = match kind.trim() {
        "" => return Ok(None),
        "none" => MethodKind::None,
        "recipient" => MethodKind::Recipient,
        "password" => MethodKind::Password,
        other => {
            return Err(ServerError::BadRequest(format!(
                "unknown access method: {other}"
            )));
        }
    };
    let secret = if kind == MethodKind::Password {
        secret
    } else {
        None
    };
    Ok(Some(AccessMethod { kind, secret }))
}

fn parse_limit(kind: &str, after: &str, before: &str) -> ServerResult<Option<LookupLimit>> {
    let kind = kind.trim();
    let available_after = parse_time(after)?;
    let available_before = parse_time(before)?;
    if kind.is_empty() && available_after.is_none() && available_before.is_none() {
        return Ok(None);
    }
    if let (Some(a), Some(b)) = (available_after, available_before)
        && a > b
    {
        return Err(ServerError::BadRequest(
            "availableAfter must not be later than availableBefore".into(),
        ));
    }
    Ok(Some(LookupLimit {
        kind: kind.to_string(),
        available_after,
        available_before,
    }))
}

/// RFC 3339, or the `datetime-local` form `YYYY-MM-DDTHH:MM` read as UTC.
fn parse_time(raw: &str) -> ServerResult<Option<DateTime<Utc>>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Ok(Some(t.with_timezone(&Utc)));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M")
        .map(|t| Some(t.and_utc()))
        .map_err(|_| ServerError::BadRequest(format!("invalid time: {raw:?}")))
}

fn multipart_error(e: MultipartError) -> ServerError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ServerError::PayloadTooLarge(e.body_text())
    } else {
        ServerError::BadRequest(e.body_text())
    }
}

async fn read_limited(mut field: Field<'_>, max: u64) -> ServerResult<Vec<u8>> {
    let mut buf = Vec::new();
    while let Some(chunk) = field.chunk().await.map_err(multipart_error)? {
        if (buf.len() + chunk.len()) as u64 > max {
            return Err(ServerError::PayloadTooLarge(format!(
                "Upload exceeds {max} bytes"
            )));
        }
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}

/// `POST /entry`: the operator fills in the entry for an issued key.
///
/// Only the first `max_images` files are buffered; extra parts are counted so the
/// rejection can report the real number.
pub async fn create_entry(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> ServerResult<Redirect> {
    let limits = state.core.limits();
    let (max_images, max_bytes) = (limits.max_images, limits.max_upload_bytes);

    let mut form = EntryForm::default();
    let mut uploads: Vec<ImageUpload<Cursor<Vec<u8>>>> = Vec::new();
    let mut file_count = 0usize;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        if name == FILES_FIELD {
            let filename = field.file_name().unwrap_or_default().to_string();
            file_count += 1;
            if file_count > max_images {
                continue;
            }
            let bytes = read_limited(field, max_bytes).await?;
            if filename.is_empty() && bytes.is_empty() {
                // A file input left blank still submits an empty part.
                file_count -= 1;
                continue;
            }
            uploads.push(ImageUpload {
                filename,
                source: Cursor::new(bytes),
            });
        } else {
            let value = field.text().await.map_err(multipart_error)?;
            form.set(&name, value);
        }
    }

    if file_count > max_images {
        return Err(mailtrack_core::Error::from(ValidationError::TooManyImages {
            count: file_count,
            max: max_images,
        })
        .into());
    }

    let key = form.entry_id.trim().to_string();
    let payload = form.into_payload()?;
    tracing::info!(key = %key, images = uploads.len(), "creating entry");

    let now = Utc::now();
    let target = format!("/view/{key}");
    state
        .run(move |core| core.create_entry(&key, payload, uploads, now))
        .await?;
    Ok(Redirect::to(&target))
}
