use anyhow::Context;
use bytes::Bytes;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{error::AppError, storage::StorageClient, users::repo_types::DEFAULT_PHOTO};

pub struct UploadItem {
    pub body: Bytes,
    pub content_type: String,
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpeg"),
        "image/png" => Some("png"),
        "image/webp" => Some("webp"),
        "image/gif" => Some("gif"),
        "image/heic" => Some("heic"),
        _ => None,
    }
}

/// `user-<id>-<unix_ms>.<ext>`
fn avatar_key(user_id: Uuid, now: OffsetDateTime, ext: &str) -> String {
    let millis = now.unix_timestamp_nanos() / 1_000_000;
    format!("user-{}-{}.{}", user_id, millis, ext)
}

/// Stores an avatar and returns its object key. Only `image/*` is accepted.
pub async fn store_avatar(
    storage: &dyn StorageClient,
    user_id: Uuid,
    item: UploadItem,
) -> Result<String, AppError> {
    if !item.content_type.starts_with("image/") {
        return Err(AppError::Validation(
            "Only images is allowed to be uploaded".into(),
        ));
    }
    if item.body.is_empty() {
        return Err(AppError::Validation("Uploaded photo is empty".into()));
    }
    let ext = ext_from_mime(&item.content_type).unwrap_or("img");
    let key = avatar_key(user_id, OffsetDateTime::now_utc(), ext);
    storage
        .put_object(&key, item.body, &item.content_type)
        .await
        .with_context(|| format!("put_object {}", key))?;
    info!(user_id = %user_id, key = %key, "avatar stored");
    Ok(key)
}

/// Best-effort removal of a replaced avatar; the shared default is kept.
pub async fn remove_avatar(storage: &dyn StorageClient, key: &str) {
    if key == DEFAULT_PHOTO {
        return;
    }
    if let Err(e) = storage.delete_object(key).await {
        warn!(error = %e, key = %key, "old avatar not removed");
    }
}
