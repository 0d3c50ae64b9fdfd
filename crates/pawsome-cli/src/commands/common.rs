use std::path::{Path, PathBuf};

use chrono::Utc;
use pawsome_core::remote::FirestoreRemoteStore;
use pawsome_core::storage::R2MediaUploader;
use pawsome_core::{
    CommentRecord, Error, LocalStore, MediaRef, MediaUploader, PawsomeConfig, PostId,
    PostRecord, SyncCoordinator,
};
use serde::Serialize;

use crate::error::CliError;

pub type Coordinator = SyncCoordinator<FirestoreRemoteStore, CliMediaUploader>;

/// Media backend chosen from configuration.
///
/// Posting without R2 settings still works as long as no image is attached.
#[derive(Debug, Clone)]
pub enum CliMediaUploader {
    R2(R2MediaUploader),
    Unconfigured,
}

impl MediaUploader for CliMediaUploader {
    async fn upload(
        &self,
        object_key: &str,
        bytes: &[u8],
        suggested_name: &str,
    ) -> pawsome_core::Result<MediaRef> {
        match self {
            Self::R2(uploader) => uploader.upload(object_key, bytes, suggested_name).await,
            Self::Unconfigured => Err(Error::InvalidConfig(
                "R2 media storage is not configured; set R2_ACCOUNT_ID, R2_BUCKET, \
                 R2_ACCESS_KEY_ID, R2_SECRET_ACCESS_KEY and R2_PUBLIC_BASE_URL"
                    .to_string(),
            )),
        }
    }

    fn media_ref(&self, object_key: &str) -> MediaRef {
        match self {
            Self::R2(uploader) => uploader.media_ref(object_key),
            Self::Unconfigured => MediaRef::new(object_key),
        }
    }

    async fn delete(&self, media: &MediaRef) {
        if let Self::R2(uploader) = self {
            uploader.delete(media).await;
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PostListItem {
    pub id: Option<String>,
    pub username: String,
    pub cat_name: String,
    pub cat_breed: Option<String>,
    pub cat_age: Option<i64>,
    pub location: Option<String>,
    pub post_description: Option<String>,
    pub image_ref: Option<String>,
    pub likes: u64,
    pub comment_count: usize,
    pub timestamp: i64,
    pub relative_time: String,
    pub sync_state: String,
}

#[derive(Debug, Serialize)]
pub struct CommentListItem {
    pub id: String,
    pub username: String,
    pub text: String,
    pub timestamp: i64,
    pub relative_time: String,
}

pub fn load_config() -> Result<PawsomeConfig, CliError> {
    Ok(PawsomeConfig::from_env()?)
}

/// `--db-path` wins over `PAWSOME_DB_PATH`, which wins over the platform
/// data directory.
pub fn resolve_db_path(
    cli_db_path: Option<PathBuf>,
    config: &PawsomeConfig,
) -> Result<PathBuf, CliError> {
    match cli_db_path.or_else(|| config.db_path.clone()) {
        Some(path) => Ok(path),
        None => default_db_path(),
    }
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("pawsome").join("pawsome.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

pub fn open_local_store(db_path: &Path) -> Result<LocalStore, CliError> {
    Ok(LocalStore::open_path(db_path)?)
}

pub fn build_media_uploader(config: &PawsomeConfig) -> CliMediaUploader {
    config
        .r2
        .clone()
        .map_or(CliMediaUploader::Unconfigured, |r2| {
            CliMediaUploader::R2(R2MediaUploader::new(r2))
        })
}

pub fn open_coordinator(config: &PawsomeConfig, db_path: &Path) -> Result<Coordinator, CliError> {
    let firestore = config
        .firestore
        .clone()
        .ok_or(CliError::RemoteNotConfigured)?;
    let remote = FirestoreRemoteStore::new(firestore)?;
    let local = open_local_store(db_path)?;
    tracing::debug!("Opened local cache at {}", db_path.display());
    Ok(SyncCoordinator::new(
        local,
        remote,
        build_media_uploader(config),
        config.sync_options(),
    ))
}

pub fn normalize_post_id(id: &str) -> Result<PostId, CliError> {
    if id.trim().is_empty() {
        return Err(CliError::EmptyPostId);
    }
    id.parse::<PostId>().map_err(CliError::InvalidPostId)
}

pub fn post_to_list_item(post: &PostRecord) -> PostListItem {
    let now_ms = Utc::now().timestamp_millis();
    PostListItem {
        id: post.id.as_ref().map(|id| id.as_str().to_string()),
        username: post.username.clone(),
        cat_name: post.cat_name.clone(),
        cat_breed: post.cat_breed.clone(),
        cat_age: post.cat_age,
        location: post.location.clone(),
        post_description: post.post_description.clone(),
        image_ref: post.image_ref.as_ref().map(|media| media.as_str().to_string()),
        likes: post.likes,
        comment_count: post.comments.len(),
        timestamp: post.timestamp,
        relative_time: format_relative_time(post.timestamp, now_ms),
        sync_state: post.sync_state.to_string(),
    }
}

pub fn comment_to_list_item(comment: &CommentRecord) -> CommentListItem {
    let now_ms = Utc::now().timestamp_millis();
    CommentListItem {
        id: comment.id.as_str().to_string(),
        username: comment.username.clone(),
        text: comment.text.clone(),
        timestamp: comment.timestamp,
        relative_time: format_relative_time(comment.timestamp, now_ms),
    }
}

pub fn format_post_lines(posts: &[PostRecord]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    posts
        .iter()
        .map(|post| {
            let id = post.id.as_ref().map_or("-", PostId::as_str);
            let short_id = id.chars().take(20).collect::<String>();
            let cat = describe_cat(post);
            let relative_time = format_relative_time(post.timestamp, now_ms);
            let mut line = format!(
                "{short_id:<20}  {cat:<32}  @{:<12}  {:>4} likes  {relative_time}",
                post.username, post.likes
            );
            if post.sync_state.is_local_only() {
                line.push_str(&format!("  [{}]", post.sync_state));
            }
            line
        })
        .collect()
}

pub fn format_comment_line(comment: &CommentRecord, now_ms: i64) -> String {
    format!(
        "{:<10}  @{}: {}",
        format_relative_time(comment.timestamp, now_ms),
        comment.username,
        comment.text
    )
}

/// "Mittens (Tabby, 3y)" style label.
pub fn describe_cat(post: &PostRecord) -> String {
    let details = [
        post.cat_breed.clone(),
        post.cat_age.map(|age| format!("{age}y")),
    ]
    .into_iter()
    .flatten()
    .collect::<Vec<_>>();

    if details.is_empty() {
        post.cat_name.clone()
    } else {
        format!("{} ({})", post.cat_name, details.join(", "))
    }
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}
