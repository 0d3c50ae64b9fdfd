//! Post model

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::comment::CommentRecord;
use super::sync_state::SyncState;
use crate::error::ValidationError;
use crate::util::{normalize_text_option, unix_millis_now};

/// Prefix for ids handed out by the local store before the remote store
/// has assigned a canonical one.
pub const LOCAL_ID_PREFIX: &str = "local-";

/// Opaque post identifier.
///
/// Canonical ids come from the remote store; ids starting with
/// [`LOCAL_ID_PREFIX`] are temporary and only exist on this device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PostId(String);

impl PostId {
    /// Wrap an id issued by a store.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Create a local-only temporary id (UUID v7, time-sortable)
    #[must_use]
    pub fn local() -> Self {
        Self(format!("{LOCAL_ID_PREFIX}{}", Uuid::now_v7()))
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        self.0.starts_with(LOCAL_ID_PREFIX)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PostId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("post id cannot be empty".to_string());
        }
        if trimmed.contains('/') {
            return Err(format!("post id '{trimmed}' must not contain '/'"));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// Identifies one authoring attempt so it can't be submitted twice concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DraftId(Uuid);

impl DraftId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for DraftId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DraftId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Publicly resolvable reference to uploaded media.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaRef(String);

impl MediaRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Signed-in identity supplied by the authentication collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub username: String,
    pub profile_image_ref: Option<MediaRef>,
}

impl Author {
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            profile_image_ref: None,
        }
    }

    #[must_use]
    pub fn with_profile_image(mut self, profile_image_ref: MediaRef) -> Self {
        self.profile_image_ref = Some(profile_image_ref);
        self
    }
}

/// Raw image bytes picked by the user.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub bytes: Vec<u8>,
    pub suggested_name: String,
}

impl ImageAttachment {
    pub fn new(bytes: Vec<u8>, suggested_name: impl Into<String>) -> Self {
        Self {
            bytes,
            suggested_name: suggested_name.into(),
        }
    }
}

impl fmt::Debug for ImageAttachment {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ImageAttachment")
            .field("bytes", &self.bytes.len())
            .field("suggested_name", &self.suggested_name)
            .finish()
    }
}

/// Fields entered by the author before a post exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostDraft {
    pub draft_id: DraftId,
    pub cat_name: String,
    pub cat_breed: Option<String>,
    pub cat_age: Option<i64>,
    pub location: Option<String>,
    pub post_description: Option<String>,
}

impl PostDraft {
    pub fn new(cat_name: impl Into<String>) -> Self {
        Self {
            draft_id: DraftId::new(),
            cat_name: cat_name.into(),
            cat_breed: None,
            cat_age: None,
            location: None,
            post_description: None,
        }
    }

    #[must_use]
    pub fn with_breed(mut self, breed: impl Into<String>) -> Self {
        self.cat_breed = Some(breed.into());
        self
    }

    #[must_use]
    pub const fn with_age(mut self, age: i64) -> Self {
        self.cat_age = Some(age);
        self
    }

    #[must_use]
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.post_description = Some(description.into());
        self
    }
}

/// A cat post
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostRecord {
    /// Store-assigned identifier, absent before creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<PostId>,
    /// Author identifier
    pub username: String,
    pub cat_name: String,
    #[serde(default)]
    pub cat_breed: Option<String>,
    #[serde(default)]
    pub cat_age: Option<i64>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub post_description: Option<String>,
    /// Uploaded photo, if any
    #[serde(default)]
    pub image_ref: Option<MediaRef>,
    #[serde(default)]
    pub likes: u64,
    /// Creation timestamp (Unix ms), never mutated
    pub timestamp: i64,
    /// Chronological comments
    #[serde(default)]
    pub comments: Vec<CommentRecord>,
    /// Local cache bookkeeping; never sent to the remote store
    #[serde(default)]
    pub sync_state: SyncState,
}

impl PostRecord {
    /// Create a validated post with only the required fields.
    pub fn new(
        username: impl Into<String>,
        cat_name: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let record = Self {
            id: None,
            username: username.into().trim().to_string(),
            cat_name: cat_name.into().trim().to_string(),
            cat_breed: None,
            cat_age: None,
            location: None,
            post_description: None,
            image_ref: None,
            likes: 0,
            timestamp: unix_millis_now(),
            comments: Vec::new(),
            sync_state: SyncState::Synced,
        };
        record.validate()?;
        Ok(record)
    }

    /// Build the record an authoring flow submits, after any upload finished.
    pub fn from_draft(
        draft: &PostDraft,
        author: &Author,
        image_ref: Option<MediaRef>,
    ) -> Result<Self, ValidationError> {
        let record = Self {
            id: None,
            username: author.username.trim().to_string(),
            cat_name: draft.cat_name.trim().to_string(),
            cat_breed: normalize_text_option(draft.cat_breed.clone()),
            cat_age: draft.cat_age,
            location: normalize_text_option(draft.location.clone()),
            post_description: normalize_text_option(draft.post_description.clone()),
            image_ref,
            likes: 0,
            timestamp: unix_millis_now(),
            comments: Vec::new(),
            sync_state: SyncState::Synced,
        };
        record.validate()?;
        Ok(record)
    }

    /// Check every field and report all violations at once.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut error = ValidationError::default();
        if self.username.trim().is_empty() {
            error.push("username", "must not be empty");
        }
        if self.cat_name.trim().is_empty() {
            error.push("catName", "must not be empty");
        }
        if self.cat_age.is_some_and(|age| age < 0) {
            error.push("catAge", "must not be negative");
        }
        error.into_result()
    }

    #[must_use]
    pub fn with_id(mut self, id: PostId) -> Self {
        self.id = Some(id);
        self
    }

    /// Restore chronological order (timestamp, then id for ties).
    pub fn sort_comments(&mut self) {
        self.comments.sort_by(|a, b| {
            a.timestamp
                .cmp(&b.timestamp)
                .then_with(|| a.id.as_str().cmp(b.id.as_str()))
        });
    }

    /// Compare everything the remote store owns, ignoring local bookkeeping.
    #[must_use]
    pub fn same_remote_fields(&self, other: &Self) -> bool {
        self.id == other.id
            && self.username == other.username
            && self.cat_name == other.cat_name
            && self.cat_breed == other.cat_breed
            && self.cat_age == other.cat_age
            && self.location == other.location
            && self.post_description == other.post_description
            && self.image_ref == other.image_ref
            && self.likes == other.likes
            && self.timestamp == other.timestamp
            && self.comments == other.comments
    }
}

/// Moderator edit of a post's descriptive fields.
///
/// `None` leaves a field alone; `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostEdit {
    pub cat_name: Option<String>,
    pub cat_breed: Option<Option<String>>,
    pub cat_age: Option<Option<i64>>,
    pub location: Option<Option<String>>,
    pub post_description: Option<Option<String>>,
    /// Moderation override of the like counter
    pub likes: Option<u64>,
}

impl PostEdit {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changed_fields().is_empty()
    }

    /// Document field names touched by this edit.
    #[must_use]
    pub fn changed_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.cat_name.is_some() {
            fields.push("catName");
        }
        if self.cat_breed.is_some() {
            fields.push("catBreed");
        }
        if self.cat_age.is_some() {
            fields.push("catAge");
        }
        if self.location.is_some() {
            fields.push("location");
        }
        if self.post_description.is_some() {
            fields.push("postDescription");
        }
        if self.likes.is_some() {
            fields.push("likes");
        }
        fields
    }

    /// Apply the edit; on validation failure `post` is left untouched.
    pub fn apply(&self, post: &mut PostRecord) -> Result<(), ValidationError> {
        let mut edited = post.clone();
        if let Some(cat_name) = &self.cat_name {
            edited.cat_name = cat_name.trim().to_string();
        }
        if let Some(cat_breed) = &self.cat_breed {
            edited.cat_breed = normalize_text_option(cat_breed.clone());
        }
        if let Some(cat_age) = self.cat_age {
            edited.cat_age = cat_age;
        }
        if let Some(location) = &self.location {
            edited.location = normalize_text_option(location.clone());
        }
        if let Some(post_description) = &self.post_description {
            edited.post_description = normalize_text_option(post_description.clone());
        }
        if let Some(likes) = self.likes {
            edited.likes = likes;
        }
        edited.validate()?;
        *post = edited;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CommentId;

    #[test]
    fn test_local_post_id() {
        let id = PostId::local();
        assert!(id.is_local());
        assert!(id.as_str().starts_with("local-"));
        assert_ne!(PostId::local(), PostId::local());
        assert!(!PostId::new("Xk3kd93").is_local());
    }

    #[test]
    fn test_post_id_parse() {
        assert_eq!("  abc ".parse::<PostId>().unwrap().as_str(), "abc");
        assert!("".parse::<PostId>().is_err());
        assert!("posts/abc".parse::<PostId>().is_err());
    }

    #[test]
    fn test_post_new_defaults() {
        let post = PostRecord::new("alice", "Mittens").unwrap();
        assert!(post.id.is_none());
        assert_eq!(post.likes, 0);
        assert!(post.image_ref.is_none());
        assert!(post.comments.is_empty());
        assert!(post.timestamp > 0);
    }

    #[test]
    fn test_validation_reports_all_fields() {
        let draft = PostDraft::new("   ").with_age(-1);
        let error = PostRecord::from_draft(&draft, &Author::new(" "), None).unwrap_err();
        assert_eq!(error.fields(), vec!["username", "catName", "catAge"]);
    }

    #[test]
    fn test_from_draft_normalizes_optionals() {
        let draft = PostDraft::new(" Mittens ")
            .with_breed("  ")
            .with_location(" Oslo ")
            .with_age(0);
        let post = PostRecord::from_draft(&draft, &Author::new("alice"), None).unwrap();
        assert_eq!(post.cat_name, "Mittens");
        assert_eq!(post.cat_breed, None);
        assert_eq!(post.location.as_deref(), Some("Oslo"));
        assert_eq!(post.cat_age, Some(0));
    }

    #[test]
    fn test_sort_comments_is_chronological() {
        let mut post = PostRecord::new("alice", "Mittens").unwrap();
        let post_id = PostId::new("p1");
        let mut late = CommentRecord::new(post_id.clone(), "bob", "second").unwrap();
        late.timestamp = 200;
        let mut early = CommentRecord::new(post_id, "carol", "first").unwrap();
        early.timestamp = 100;
        post.comments = vec![late, early];

        post.sort_comments();
        assert_eq!(post.comments[0].text, "first");
        assert_eq!(post.comments[1].text, "second");
    }

    #[test]
    fn test_sort_comments_breaks_ties_by_id() {
        let mut post = PostRecord::new("alice", "Mittens").unwrap();
        let post_id = PostId::new("p1");
        let mut b = CommentRecord::new(post_id.clone(), "bob", "b").unwrap();
        b.id = CommentId::new("b");
        b.timestamp = 5;
        let mut a = CommentRecord::new(post_id, "bob", "a").unwrap();
        a.id = CommentId::new("a");
        a.timestamp = 5;
        post.comments = vec![b, a];

        post.sort_comments();
        assert_eq!(post.comments[0].text, "a");
    }

    #[test]
    fn test_edit_apply_and_clear() {
        let mut post = PostRecord::new("alice", "Mittens").unwrap();
        post.cat_breed = Some("Tabby".to_string());
        let edit = PostEdit {
            cat_breed: Some(None),
            cat_age: Some(Some(4)),
            ..PostEdit::default()
        };

        edit.apply(&mut post).unwrap();
        assert_eq!(post.cat_breed, None);
        assert_eq!(post.cat_age, Some(4));
        assert_eq!(edit.changed_fields(), vec!["catBreed", "catAge"]);
    }

    #[test]
    fn test_invalid_edit_leaves_post_untouched() {
        let mut post = PostRecord::new("alice", "Mittens").unwrap();
        let before = post.clone();
        let edit = PostEdit {
            cat_name: Some("  ".to_string()),
            ..PostEdit::default()
        };

        assert!(edit.apply(&mut post).is_err());
        assert_eq!(post, before);
    }

    #[test]
    fn test_empty_edit() {
        assert!(PostEdit::default().is_empty());
    }

    #[test]
    fn test_same_remote_fields_ignores_sync_state() {
        let post = PostRecord::new("alice", "Mittens").unwrap();
        let mut pending = post.clone();
        pending.sync_state = SyncState::Pending;
        assert!(post.same_remote_fields(&pending));

        pending.cat_breed = Some("Siamese".to_string());
        assert!(!post.same_remote_fields(&pending));
    }
}
