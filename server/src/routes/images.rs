use crate::error::{ServerError, ServerResult};
use crate::extract::{Operator, SessionToken};
use crate::state::AppState;
use axum::{
    extract::{Path, State},
    http::header,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use mailtrack_core::core::entries::error::EntryStoreError;

fn content_type(name: &str) -> &'static str {
    let ext = name.rsplit_once('.').map(|(_, ext)| ext.to_ascii_lowercase());
    match ext.as_deref() {
        Some("webp") => "image/webp",
        Some("heic") => "image/heic",
        Some("heif") => "image/heif",
        Some("avif") => "image/avif",
        _ => "application/octet-stream",
    }
}

/// Stored image bytes, readable by anyone who may view the entry.
pub async fn serve_image(
    State(state): State<AppState>,
    Path((key, name)): Path<(String, String)>,
    Operator(operator): Operator,
    SessionToken(token): SessionToken,
) -> ServerResult<Response> {
    let now = Utc::now();
    let lookup_name = name.clone();
    let path = state
        .run(move |core| core.image_path(&key, &lookup_name, token.as_deref(), operator, now))
        .await?;

    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(mailtrack_core::Error::from(EntryStoreError::NotFound).into());
        }
        Err(e) => return Err(ServerError::Internal(format!("reading {}: {e}", path.display()))),
    };

    Ok((
        [
            (header::CONTENT_TYPE, content_type(&name)),
            (header::CACHE_CONTROL, "private, max-age=3600"),
        ],
        bytes,
    )
        .into_response())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_by_extension() {
        assert_eq!(content_type("a1b2.webp"), "image/webp");
        assert_eq!(content_type("a1b2.HEIC"), "image/heic");
        assert_eq!(content_type("a1b2.avif"), "image/avif");
        assert_eq!(content_type("noext"), "application/octet-stream");
    }
}
