//! Media upload backends for post photos.

mod memory;
mod r2;

use chrono::Utc;
use uuid::Uuid;

use crate::error::{Result, ValidationError};
use crate::models::{DraftId, MediaRef};
use crate::util::sanitize_token;

pub use memory::InMemoryMediaUploader;
pub(crate) use r2::parse_config as parse_r2_config;
pub use r2::{R2Config, R2MediaUploader};

/// Object storage for uploaded images.
#[allow(async_fn_in_trait)]
pub trait MediaUploader {
    /// Store `bytes` under `object_key` (see [`build_media_key`]) and return
    /// a publicly resolvable reference.
    async fn upload(
        &self,
        object_key: &str,
        bytes: &[u8],
        suggested_name: &str,
    ) -> Result<MediaRef>;

    /// Reference an object under `object_key` resolves to, whether or not
    /// its upload has completed.
    fn media_ref(&self, object_key: &str) -> MediaRef;

    /// Best-effort removal; failures are logged, never returned.
    async fn delete(&self, media: &MediaRef);
}

/// Reject empty payloads before they reach a backend.
pub(crate) fn ensure_payload(bytes: &[u8]) -> Result<()> {
    let mut error = ValidationError::default();
    if bytes.is_empty() {
        error.push("image", "must not be empty");
    }
    error.into_result().map_err(Into::into)
}

/// `posts/{draft}/{unix-ms}-{uuid}-{name}`
pub fn build_media_key(draft_id: &DraftId, suggested_name: &str) -> String {
    let ts = Utc::now().timestamp_millis();
    let id = Uuid::now_v7();
    let name = sanitize_file_name(suggested_name);
    format!("posts/{draft_id}/{ts}-{id}-{name}")
}

/// MIME type for common image extensions.
pub fn content_type_for(file_name: &str) -> Option<&'static str> {
    let (_, ext) = file_name.trim().rsplit_once('.')?;
    match ext.to_ascii_lowercase().as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "gif" => Some("image/gif"),
        "webp" => Some("image/webp"),
        "heic" => Some("image/heic"),
        _ => None,
    }
}

fn sanitize_file_name(file_name: &str) -> String {
    let trimmed = file_name.trim().trim_matches('/');
    let trimmed = trimmed.rsplit('/').next().unwrap_or(trimmed);
    if trimmed.is_empty() {
        return "image".to_string();
    }

    let (stem, ext) = trimmed
        .rsplit_once('.')
        .map_or((trimmed, ""), |parts| parts);
    let stem = sanitize_token(stem);
    let stem = if stem.is_empty() {
        "image".to_string()
    } else {
        stem
    };
    let ext = sanitize_token(ext);

    if ext.is_empty() {
        stem
    } else {
        format!("{stem}.{ext}")
    }
}
