//! Data models for Pawsome

mod comment;
mod post;
mod sync_state;

pub use comment::{CommentId, CommentRecord};
pub use post::{
    Author, DraftId, ImageAttachment, MediaRef, PostDraft, PostEdit, PostId, PostRecord,
    LOCAL_ID_PREFIX,
};
pub use sync_state::SyncState;
