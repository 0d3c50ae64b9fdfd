use std::path::PathBuf;

use pawsome_core::{
    CommentRecord, DraftId, Error, MediaUploader, PawsomeConfig, PostId, PostRecord,
    SyncState,
};
use pawsome_core::storage::build_media_key;
use pretty_assertions::assert_eq;

use crate::cli::ClearableField;
use crate::commands::common::{
    build_media_uploader, comment_to_list_item, describe_cat, format_post_lines,
    format_relative_time, normalize_post_id, open_coordinator, open_local_store,
    post_to_list_item, resolve_db_path, CliMediaUploader,
};
use crate::commands::edit::{build_edit, EditArgs};
use crate::commands::post::{build_draft, read_image, PostArgs};
use crate::error::CliError;

fn mittens() -> PostRecord {
    let mut post = PostRecord::new("alice", "Mittens").unwrap();
    post.timestamp = 1_700_000_000_000;
    post.cat_breed = Some("Tabby".to_string());
    post.cat_age = Some(3);
    post.with_id(PostId::new("abc123"))
}

#[test]
fn normalize_post_id_trims_and_rejects_empty() {
    assert_eq!(normalize_post_id("  abc  ").unwrap(), PostId::new("abc"));
    assert!(matches!(normalize_post_id(" \t "), Err(CliError::EmptyPostId)));
}

#[test]
fn normalize_post_id_rejects_path_separators() {
    assert!(matches!(
        normalize_post_id("abc/../def"),
        Err(CliError::InvalidPostId(ref message)) if message.contains('/')
    ));
}

#[test]
fn resolve_db_path_prefers_flag_over_config() {
    let config = PawsomeConfig {
        db_path: Some(PathBuf::from("/tmp/from-env.db")),
        ..PawsomeConfig::default()
    };
    assert_eq!(
        resolve_db_path(Some(PathBuf::from("/tmp/flag.db")), &config).unwrap(),
        PathBuf::from("/tmp/flag.db")
    );
    assert_eq!(
        resolve_db_path(None, &config).unwrap(),
        PathBuf::from("/tmp/from-env.db")
    );
}

#[test]
fn format_relative_time_buckets() {
    let now = 1_700_000_000_000;
    assert_eq!(format_relative_time(now - 5_000, now), "just now");
    assert_eq!(format_relative_time(now - 5 * 60_000, now), "5m ago");
    assert_eq!(format_relative_time(now - 3 * 3_600_000, now), "3h ago");
    assert_eq!(format_relative_time(now - 2 * 86_400_000, now), "2d ago");
    assert_eq!(format_relative_time(now + 10_000, now), "just now");
}

#[test]
fn describe_cat_includes_known_details() {
    let mut post = mittens();
    assert_eq!(describe_cat(&post), "Mittens (Tabby, 3y)");
    post.cat_breed = None;
    post.cat_age = None;
    assert_eq!(describe_cat(&post), "Mittens");
}

#[test]
fn format_post_lines_marks_unsynced_posts() {
    let synced = mittens();
    let mut pending = PostRecord::new("bob", "Tom").unwrap();
    pending.sync_state = SyncState::Pending;

    let lines = format_post_lines(&[synced, pending]);
    assert!(lines[0].starts_with("abc123"));
    assert!(!lines[0].contains('['));
    assert!(lines[1].starts_with('-'));
    assert!(lines[1].ends_with("[pending]"));
}

#[test]
fn post_list_item_serializes_feed_fields() {
    let mut post = mittens();
    post.likes = 4;
    post.comments
        .push(CommentRecord::new(PostId::new("abc123"), "bob", "cute").unwrap());

    let item = post_to_list_item(&post);
    let json = serde_json::to_value(&item).unwrap();
    assert_eq!(json["id"], "abc123");
    assert_eq!(json["cat_name"], "Mittens");
    assert_eq!(json["likes"], 4);
    assert_eq!(json["comment_count"], 1);
    assert_eq!(json["sync_state"], "synced");
    assert!(json["image_ref"].is_null());
}

#[test]
fn comment_list_item_keeps_id_and_text() {
    let comment = CommentRecord::new(PostId::new("abc123"), "bob", " so fluffy ").unwrap();
    let item = comment_to_list_item(&comment);
    assert_eq!(item.id, comment.id.as_str());
    assert_eq!(item.username, "bob");
    assert_eq!(item.text, "so fluffy");
}

#[test]
fn build_draft_copies_optional_fields() {
    let args = PostArgs {
        cat_name: "Mittens".to_string(),
        breed: Some("Tabby".to_string()),
        age: Some(3),
        ..PostArgs::default()
    };
    let draft = build_draft(&args);
    assert_eq!(draft.cat_name, "Mittens");
    assert_eq!(draft.cat_breed.as_deref(), Some("Tabby"));
    assert_eq!(draft.cat_age, Some(3));
    assert_eq!(draft.location, None);
}

#[test]
fn read_image_uses_file_name() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("mittens.png");
    std::fs::write(&path, [0x89, b'P', b'N', b'G']).unwrap();

    let image = read_image(&path).unwrap();
    assert_eq!(image.suggested_name, "mittens.png");
    assert_eq!(image.bytes.len(), 4);

    assert!(matches!(
        read_image(&dir.path().join("missing.png")),
        Err(CliError::Io(_))
    ));
}

#[test]
fn build_edit_sets_and_clears_fields() {
    let args = EditArgs {
        cat_name: Some("Mittens II".to_string()),
        likes: Some(10),
        clear: vec![ClearableField::Breed, ClearableField::Age],
        ..EditArgs::default()
    };
    let edit = build_edit(&args).unwrap();
    assert_eq!(edit.cat_name.as_deref(), Some("Mittens II"));
    assert_eq!(edit.cat_breed, Some(None));
    assert_eq!(edit.cat_age, Some(None));
    assert_eq!(edit.location, None);
    assert_eq!(edit.likes, Some(10));
}

#[test]
fn build_edit_rejects_empty_and_conflicting_flags() {
    assert!(matches!(
        build_edit(&EditArgs::default()),
        Err(CliError::EmptyEdit)
    ));

    let conflicting = EditArgs {
        location: Some("Oslo".to_string()),
        clear: vec![ClearableField::Location],
        ..EditArgs::default()
    };
    assert!(matches!(
        build_edit(&conflicting),
        Err(CliError::ConflictingEdit("location"))
    ));
}

#[test]
fn open_coordinator_requires_remote_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let result = open_coordinator(&PawsomeConfig::default(), &dir.path().join("pawsome.db"));
    assert!(matches!(result, Err(CliError::RemoteNotConfigured)));
}

#[test]
fn open_local_store_creates_parent_directories() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("nested").join("pawsome.db");
    let store = open_local_store(&db_path).unwrap();
    assert!(store.fetch_all().to_vec().unwrap().is_empty());
    assert!(db_path.exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn unconfigured_media_uploader_reports_missing_settings() {
    let uploader = build_media_uploader(&PawsomeConfig::default());
    assert!(matches!(uploader, CliMediaUploader::Unconfigured));

    let error = uploader
        .upload(&build_media_key(&DraftId::new(), "cat.png"), b"png", "cat.png")
        .await
        .unwrap_err();
    assert!(matches!(error, Error::InvalidConfig(ref message) if message.contains("R2_BUCKET")));
}
