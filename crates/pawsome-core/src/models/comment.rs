//! Comment model

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::post::{MediaRef, PostId};
use crate::error::ValidationError;
use crate::util::unix_millis_now;

/// Opaque comment identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommentId(String);

impl CommentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh, time-sortable id.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CommentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A comment on a post. Owned by its post: deleting the post deletes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRecord {
    pub id: CommentId,
    /// Back-reference to the owning post
    pub post_id: PostId,
    pub username: String,
    pub text: String,
    #[serde(default)]
    pub profile_image_ref: Option<MediaRef>,
    /// Creation timestamp (Unix ms)
    pub timestamp: i64,
}

impl CommentRecord {
    pub fn new(
        post_id: PostId,
        username: impl Into<String>,
        text: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let comment = Self {
            id: CommentId::generate(),
            post_id,
            username: username.into().trim().to_string(),
            text: text.into().trim().to_string(),
            profile_image_ref: None,
            timestamp: unix_millis_now(),
        };
        comment.validate()?;
        Ok(comment)
    }

    #[must_use]
    pub fn with_profile_image(mut self, profile_image_ref: Option<MediaRef>) -> Self {
        self.profile_image_ref = profile_image_ref;
        self
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut error = ValidationError::default();
        if self.username.trim().is_empty() {
            error.push("username", "must not be empty");
        }
        if self.text.trim().is_empty() {
            error.push("text", "must not be empty");
        }
        error.into_result()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_comment_new() {
        let comment = CommentRecord::new(PostId::new("p1"), " bob ", " cute! ").unwrap();
        assert_eq!(comment.username, "bob");
        assert_eq!(comment.text, "cute!");
        assert_eq!(comment.post_id.as_str(), "p1");
        assert!(comment.timestamp > 0);
    }

    #[test]
    fn test_comment_validation() {
        let error = CommentRecord::new(PostId::new("p1"), "", "  ").unwrap_err();
        assert_eq!(error.fields(), vec!["username", "text"]);
    }

    #[test]
    fn test_comment_ids_unique() {
        assert_ne!(CommentId::generate(), CommentId::generate());
    }
}
