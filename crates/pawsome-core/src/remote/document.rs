//! Firestore typed-value encoding for post and comment documents.
//!
//! Field names match the remote document layout (`catName`, `imageRef`, ...).
//! Missing fields decode to their defaults so documents written by older
//! clients stay readable.

use chrono::{DateTime, SecondsFormat};
use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::{Error, Result};
use crate::models::{CommentId, CommentRecord, MediaRef, PostId, PostRecord, SyncState};

pub type Fields = Map<String, Value>;

/// A Firestore document as returned by the REST API.
#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub name: String,
    #[serde(default)]
    pub fields: Fields,
}

impl Document {
    /// Last path segment of the document name.
    pub fn id(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or_default()
    }

    /// Id of the parent document for sub-collection entries.
    fn parent_id(&self) -> Option<&str> {
        let mut segments = self.name.rsplit('/');
        segments.next()?;
        segments.next()?;
        segments.next()
    }
}

fn string_value(value: &str) -> Value {
    json!({ "stringValue": value })
}

fn optional_string(value: Option<&str>) -> Value {
    value.map_or_else(null_value, string_value)
}

fn integer_value(value: i64) -> Value {
    json!({ "integerValue": value.to_string() })
}

fn null_value() -> Value {
    json!({ "nullValue": null })
}

fn timestamp_value(timestamp_ms: i64) -> Value {
    DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || integer_value(timestamp_ms),
        |time| json!({ "timestampValue": time.to_rfc3339_opts(SecondsFormat::Millis, true) }),
    )
}

/// Encode the remote-owned fields of a post. Comments and local bookkeeping
/// are not part of the post document.
pub fn encode_post(record: &PostRecord) -> Result<Fields> {
    let likes = i64::try_from(record.likes)
        .map_err(|_| Error::RemoteRejected(format!("likes counter too large: {}", record.likes)))?;

    let mut fields = Fields::new();
    fields.insert("username".into(), string_value(&record.username));
    fields.insert("catName".into(), string_value(&record.cat_name));
    fields.insert(
        "catBreed".into(),
        optional_string(record.cat_breed.as_deref()),
    );
    fields.insert(
        "catAge".into(),
        record.cat_age.map_or_else(null_value, integer_value),
    );
    fields.insert("location".into(), optional_string(record.location.as_deref()));
    fields.insert(
        "postDescription".into(),
        optional_string(record.post_description.as_deref()),
    );
    fields.insert(
        "imageRef".into(),
        optional_string(record.image_ref.as_ref().map(MediaRef::as_str)),
    );
    fields.insert("likes".into(), integer_value(likes));
    fields.insert("timestamp".into(), timestamp_value(record.timestamp));
    Ok(fields)
}

/// Encode only the named fields, for partial updates.
pub fn encode_post_fields(record: &PostRecord, field_paths: &[&str]) -> Result<Fields> {
    let mut all = encode_post(record)?;
    Ok(field_paths
        .iter()
        .filter_map(|path| all.remove(*path).map(|value| ((*path).to_string(), value)))
        .collect())
}

pub fn encode_comment(comment: &CommentRecord) -> Fields {
    let mut fields = Fields::new();
    fields.insert("postId".into(), string_value(comment.post_id.as_str()));
    fields.insert("username".into(), string_value(&comment.username));
    fields.insert("text".into(), string_value(&comment.text));
    fields.insert(
        "profileImageRef".into(),
        optional_string(comment.profile_image_ref.as_ref().map(MediaRef::as_str)),
    );
    fields.insert("timestamp".into(), timestamp_value(comment.timestamp));
    fields
}

/// Decode and validate a post document. Comments are attached separately.
pub fn decode_post(document: &Document) -> std::result::Result<PostRecord, String> {
    let fields = &document.fields;
    let username =
        read_string(fields, "username").ok_or_else(|| "missing username".to_string())?;
    let cat_name = read_string(fields, "catName").ok_or_else(|| "missing catName".to_string())?;
    let likes = read_integer(fields, "likes").unwrap_or_default();
    let likes =
        u64::try_from(likes).map_err(|_| format!("likes must not be negative, got {likes}"))?;

    let post = PostRecord {
        id: Some(PostId::new(document.id())),
        username,
        cat_name,
        cat_breed: read_string(fields, "catBreed"),
        cat_age: read_integer(fields, "catAge"),
        location: read_string(fields, "location"),
        post_description: read_string(fields, "postDescription"),
        image_ref: read_string(fields, "imageRef").map(MediaRef::new),
        likes,
        timestamp: read_timestamp(fields, "timestamp").unwrap_or_default(),
        comments: Vec::new(),
        sync_state: SyncState::Synced,
    };
    post.validate().map_err(|error| error.to_string())?;
    Ok(post)
}

pub fn decode_comment(document: &Document) -> std::result::Result<CommentRecord, String> {
    let fields = &document.fields;
    let post_id = read_string(fields, "postId")
        .or_else(|| document.parent_id().map(ToOwned::to_owned))
        .ok_or_else(|| "missing postId".to_string())?;

    let comment = CommentRecord {
        id: CommentId::new(document.id()),
        post_id: PostId::new(post_id),
        username: read_string(fields, "username")
            .ok_or_else(|| "missing username".to_string())?,
        text: read_string(fields, "text").ok_or_else(|| "missing text".to_string())?,
        profile_image_ref: read_string(fields, "profileImageRef").map(MediaRef::new),
        timestamp: read_timestamp(fields, "timestamp").unwrap_or_default(),
    };
    comment.validate().map_err(|error| error.to_string())?;
    Ok(comment)
}

/// Decode a bare typed value holding an integer (e.g. a transform result).
pub fn integer_from_value(value: &Value) -> Option<i64> {
    if let Some(raw) = value.get("integerValue") {
        return match raw {
            Value::String(text) => text.parse().ok(),
            other => other.as_i64(),
        };
    }
    #[allow(clippy::cast_possible_truncation)]
    value
        .get("doubleValue")
        .and_then(Value::as_f64)
        .map(|double| double.trunc() as i64)
}

fn read_string(fields: &Fields, key: &str) -> Option<String> {
    fields
        .get(key)?
        .get("stringValue")?
        .as_str()
        .map(ToOwned::to_owned)
}

fn read_integer(fields: &Fields, key: &str) -> Option<i64> {
    integer_from_value(fields.get(key)?)
}

fn read_timestamp(fields: &Fields, key: &str) -> Option<i64> {
    let value = fields.get(key)?;
    if let Some(text) = value.get("timestampValue").and_then(Value::as_str) {
        return DateTime::parse_from_rfc3339(text)
            .ok()
            .map(|time| time.timestamp_millis());
    }
    // Legacy documents stored Unix milliseconds as plain integers
    integer_from_value(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn document(name: &str, fields: Value) -> Document {
        serde_json::from_value(json!({ "name": name, "fields": fields })).unwrap()
    }

    #[test]
    fn encode_post_uses_typed_values() {
        let mut post = PostRecord::new("alice", "Mittens").unwrap();
        post.cat_age = Some(3);
        post.timestamp = 1_700_000_000_123;

        let fields = encode_post(&post).unwrap();
        assert_eq!(fields["catName"], json!({ "stringValue": "Mittens" }));
        assert_eq!(fields["catAge"], json!({ "integerValue": "3" }));
        assert_eq!(fields["catBreed"], json!({ "nullValue": null }));
        assert_eq!(fields["likes"], json!({ "integerValue": "0" }));
        assert_eq!(
            fields["timestamp"],
            json!({ "timestampValue": "2023-11-14T22:13:20.123Z" })
        );
    }

    #[test]
    fn decode_post_reads_all_fields() {
        let doc = document(
            "projects/demo/databases/(default)/documents/posts/abc123",
            json!({
                "username": { "stringValue": "alice" },
                "catName": { "stringValue": "Mittens" },
                "catBreed": { "stringValue": "Tabby" },
                "catAge": { "integerValue": "3" },
                "location": { "nullValue": null },
                "imageRef": { "stringValue": "https://cdn.example.com/a.png" },
                "likes": { "integerValue": "7" },
                "timestamp": { "timestampValue": "2023-11-14T22:13:20.123456Z" }
            }),
        );

        let post = decode_post(&doc).unwrap();
        assert_eq!(post.id, Some(PostId::new("abc123")));
        assert_eq!(post.cat_breed.as_deref(), Some("Tabby"));
        assert_eq!(post.cat_age, Some(3));
        assert_eq!(post.location, None);
        assert_eq!(post.likes, 7);
        assert_eq!(post.timestamp, 1_700_000_000_123);
    }

    #[test]
    fn decode_post_defaults_missing_optional_fields() {
        let doc = document(
            "projects/demo/databases/(default)/documents/posts/old",
            json!({
                "username": { "stringValue": "bob" },
                "catName": { "stringValue": "Tom" },
                "likes": { "doubleValue": 2.0 },
                "timestamp": { "integerValue": "42" }
            }),
        );

        let post = decode_post(&doc).unwrap();
        assert_eq!(post.likes, 2);
        assert_eq!(post.timestamp, 42);
        assert_eq!(post.image_ref, None);
    }

    #[test]
    fn decode_post_requires_cat_name() {
        let doc = document(
            "projects/demo/databases/(default)/documents/posts/bad",
            json!({ "username": { "stringValue": "bob" } }),
        );
        assert!(decode_post(&doc).unwrap_err().contains("catName"));
    }

    #[test]
    fn decode_post_rejects_invalid_fields() {
        let doc = document(
            "projects/demo/databases/(default)/documents/posts/bad",
            json!({
                "username": { "stringValue": "" },
                "catName": { "stringValue": "   " },
                "catAge": { "integerValue": "-4" }
            }),
        );
        let reason = decode_post(&doc).unwrap_err();
        assert!(reason.contains("username"), "{reason}");
        assert!(reason.contains("catName"), "{reason}");
        assert!(reason.contains("catAge"), "{reason}");
    }

    #[test]
    fn decode_post_rejects_negative_likes() {
        let doc = document(
            "projects/demo/databases/(default)/documents/posts/neg",
            json!({
                "username": { "stringValue": "bob" },
                "catName": { "stringValue": "Tom" },
                "likes": { "integerValue": "-3" }
            }),
        );
        assert!(decode_post(&doc).unwrap_err().contains("likes"));
    }

    #[test]
    fn decode_comment_falls_back_to_parent_path() {
        let doc = document(
            "projects/demo/databases/(default)/documents/posts/p1/comments/c1",
            json!({
                "username": { "stringValue": "bob" },
                "text": { "stringValue": "cute" },
                "timestamp": { "timestampValue": "1970-01-01T00:00:01Z" }
            }),
        );

        let comment = decode_comment(&doc).unwrap();
        assert_eq!(comment.id.as_str(), "c1");
        assert_eq!(comment.post_id.as_str(), "p1");
        assert_eq!(comment.timestamp, 1000);
    }

    #[test]
    fn encode_post_fields_keeps_only_requested() {
        let post = PostRecord::new("alice", "Mittens").unwrap();
        let fields = encode_post_fields(&post, &["catBreed", "likes"]).unwrap();
        assert_eq!(fields.len(), 2);
        assert!(fields.contains_key("catBreed"));
        assert!(fields.contains_key("likes"));
    }
}
