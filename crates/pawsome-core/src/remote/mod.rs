//! Cloud document store holding the authoritative copy of every post.

mod document;
mod firestore;
mod memory;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::models::{CommentId, CommentRecord, PostEdit, PostId, PostRecord};

pub use firestore::{
    FirestoreConfig, FirestoreRemoteStore, DEFAULT_FIRESTORE_BASE_URL, DEFAULT_REMOTE_TIMEOUT,
};
pub use memory::{InMemoryRemoteStore, RemoteFault, RemoteOp};

/// Remote collection of posts, one document per post with a `comments`
/// sub-collection.
///
/// Implementations never retry internally; retry policy belongs to the caller.
#[allow(async_fn_in_trait)]
pub trait RemoteStore {
    /// Store a new post; the remote store assigns its canonical id.
    async fn create(&self, record: &PostRecord) -> Result<PostId>;

    /// Every post, newest first, with comments. Issues a fresh query each time.
    async fn fetch_all(&self) -> Result<Vec<PostRecord>>;

    async fn get(&self, id: &PostId) -> Result<Option<PostRecord>>;

    /// Remove a post and its comments. Absent posts succeed silently.
    async fn delete(&self, id: &PostId) -> Result<()>;

    /// Atomically add to the like counter, returning the new value.
    async fn increment_likes(&self, id: &PostId, by: u64) -> Result<u64>;

    /// Moderator edit of descriptive fields, returning the updated post.
    async fn update_fields(&self, id: &PostId, edit: &PostEdit) -> Result<PostRecord>;

    /// Attach a comment to an existing post.
    async fn append_comment(&self, comment: &CommentRecord) -> Result<CommentId>;

    /// Live feed of comments appended to `post_id` after this call.
    fn subscribe(&self, post_id: &PostId) -> CommentSubscription;
}

/// Receiving end of a comment subscription. Dropping it stops delivery.
pub struct CommentSubscription {
    receiver: mpsc::UnboundedReceiver<CommentRecord>,
    task: Option<JoinHandle<()>>,
}

impl CommentSubscription {
    pub(crate) const fn new(
        receiver: mpsc::UnboundedReceiver<CommentRecord>,
        task: Option<JoinHandle<()>>,
    ) -> Self {
        Self { receiver, task }
    }

    /// Wait for the next appended comment; `None` once the channel closes.
    pub async fn next(&mut self) -> Option<CommentRecord> {
        self.receiver.recv().await
    }

    /// Comments already delivered and waiting, without blocking.
    pub fn drain_ready(&mut self) -> Vec<CommentRecord> {
        let mut ready = Vec::new();
        while let Ok(comment) = self.receiver.try_recv() {
            ready.push(comment);
        }
        ready
    }
}

impl Drop for CommentSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
