//! Process-local remote store with failure injection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use uuid::Uuid;

use super::{CommentSubscription, RemoteStore};
use crate::error::{Error, Result};
use crate::models::{CommentId, CommentRecord, PostEdit, PostId, PostRecord, SyncState};

/// Kind of failure to inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteFault {
    /// Connectivity loss; surfaces as [`Error::Network`]
    Network,
    /// Permission or schema refusal; surfaces as [`Error::RemoteRejected`]
    Rejected,
}

/// Remote operation a fault can be attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemoteOp {
    Create,
    FetchAll,
    Get,
    Delete,
    IncrementLikes,
    UpdateFields,
    AppendComment,
}

#[derive(Debug, Clone, Copy)]
struct InjectedFault {
    fault: RemoteFault,
    /// `None` keeps failing until cleared
    remaining: Option<usize>,
}

#[derive(Default)]
struct State {
    posts: HashMap<PostId, PostRecord>,
    faults: HashMap<RemoteOp, InjectedFault>,
    subscribers: Vec<(PostId, mpsc::UnboundedSender<CommentRecord>)>,
    latency: Duration,
    create_calls: usize,
}

/// [`RemoteStore`] holding documents in memory. Clones share the same data.
#[derive(Clone, Default)]
pub struct InMemoryRemoteStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryRemoteStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| Error::Persistence("in-memory remote lock poisoned".to_string()))
    }

    /// Fail every call to `op` until [`Self::clear_faults`].
    pub fn inject(&self, op: RemoteOp, fault: RemoteFault) {
        if let Ok(mut state) = self.lock() {
            state.faults.insert(
                op,
                InjectedFault {
                    fault,
                    remaining: None,
                },
            );
        }
    }

    /// Fail only the next call to `op`.
    pub fn inject_once(&self, op: RemoteOp, fault: RemoteFault) {
        if let Ok(mut state) = self.lock() {
            state.faults.insert(
                op,
                InjectedFault {
                    fault,
                    remaining: Some(1),
                },
            );
        }
    }

    pub fn clear_faults(&self) {
        if let Ok(mut state) = self.lock() {
            state.faults.clear();
        }
    }

    /// Delay applied before every operation.
    pub fn set_latency(&self, latency: Duration) {
        if let Ok(mut state) = self.lock() {
            state.latency = latency;
        }
    }

    /// Number of `create` calls that reached the store, failed ones included.
    #[must_use]
    pub fn create_calls(&self) -> usize {
        self.lock().map_or(0, |state| state.create_calls)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().map_or(0, |state| state.posts.len())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Change a stored document directly, as another client would.
    pub fn edit_remote<F>(&self, id: &PostId, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut PostRecord),
    {
        let mut state = self.lock()?;
        let post = state
            .posts
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("post {id}")))?;
        mutate(post);
        Ok(())
    }

    async fn enter(&self, op: RemoteOp) -> Result<()> {
        let latency = self.lock()?.latency;
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock()?;
        if op == RemoteOp::Create {
            state.create_calls += 1;
        }
        let Some(injected) = state.faults.get_mut(&op) else {
            return Ok(());
        };
        let fault = injected.fault;
        let exhausted = injected.remaining.as_mut().is_some_and(|remaining| {
            *remaining = remaining.saturating_sub(1);
            *remaining == 0
        });
        if exhausted {
            state.faults.remove(&op);
        }

        tracing::debug!("Injected {:?} failure for {:?}", fault, op);
        Err(match fault {
            RemoteFault::Network => Error::Network(format!("simulated connectivity loss ({op:?})")),
            RemoteFault::Rejected => {
                Error::RemoteRejected(format!("simulated permission denied ({op:?})"))
            }
        })
    }
}

impl RemoteStore for InMemoryRemoteStore {
    async fn create(&self, record: &PostRecord) -> Result<PostId> {
        self.enter(RemoteOp::Create).await?;
        record.validate()?;

        let id = PostId::new(Uuid::now_v7().simple().to_string());
        let mut stored = record.clone().with_id(id.clone());
        stored.comments.clear();
        stored.sync_state = SyncState::Synced;
        self.lock()?.posts.insert(id.clone(), stored);
        Ok(id)
    }

    async fn fetch_all(&self) -> Result<Vec<PostRecord>> {
        self.enter(RemoteOp::FetchAll).await?;
        let mut posts: Vec<PostRecord> = self.lock()?.posts.values().cloned().collect();
        posts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));
        Ok(posts)
    }

    async fn get(&self, id: &PostId) -> Result<Option<PostRecord>> {
        self.enter(RemoteOp::Get).await?;
        Ok(self.lock()?.posts.get(id).cloned())
    }

    async fn delete(&self, id: &PostId) -> Result<()> {
        self.enter(RemoteOp::Delete).await?;
        self.lock()?.posts.remove(id);
        Ok(())
    }

    async fn increment_likes(&self, id: &PostId, by: u64) -> Result<u64> {
        self.enter(RemoteOp::IncrementLikes).await?;
        let mut state = self.lock()?;
        let post = state
            .posts
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("post {id}")))?;
        post.likes = post.likes.saturating_add(by);
        Ok(post.likes)
    }

    async fn update_fields(&self, id: &PostId, edit: &PostEdit) -> Result<PostRecord> {
        self.enter(RemoteOp::UpdateFields).await?;
        let mut state = self.lock()?;
        let post = state
            .posts
            .get_mut(id)
            .ok_or_else(|| Error::NotFound(format!("post {id}")))?;
        edit.apply(post)?;
        Ok(post.clone())
    }

    async fn append_comment(&self, comment: &CommentRecord) -> Result<CommentId> {
        self.enter(RemoteOp::AppendComment).await?;
        comment.validate()?;

        let mut state = self.lock()?;
        let post = state
            .posts
            .get_mut(&comment.post_id)
            .ok_or_else(|| Error::NotFound(format!("post {}", comment.post_id)))?;
        if post.comments.iter().any(|existing| existing.id == comment.id) {
            return Ok(comment.id.clone());
        }
        post.comments.push(comment.clone());
        post.sort_comments();

        state
            .subscribers
            .retain(|(post_id, sender)| post_id != &comment.post_id || sender.send(comment.clone()).is_ok());
        Ok(comment.id.clone())
    }

    fn subscribe(&self, post_id: &PostId) -> CommentSubscription {
        let (sender, receiver) = mpsc::unbounded_channel();
        if let Ok(mut state) = self.lock() {
            state.subscribers.retain(|(_, existing)| !existing.is_closed());
            state.subscribers.push((post_id.clone(), sender));
        }
        CommentSubscription::new(receiver, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn mittens() -> PostRecord {
        let mut post = PostRecord::new("alice", "Mittens").unwrap();
        post.cat_age = Some(3);
        post
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn create_assigns_canonical_id() {
        let remote = InMemoryRemoteStore::new();
        let id = remote.create(&mittens()).await.unwrap();
        assert!(!id.is_local());

        let stored = remote.get(&id).await.unwrap().unwrap();
        assert_eq!(stored.id, Some(id));
        assert_eq!(stored.cat_age, Some(3));
        assert_eq!(remote.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn fetch_all_is_newest_first() {
        let remote = InMemoryRemoteStore::new();
        let mut older = mittens();
        older.timestamp = 10;
        let mut newer = PostRecord::new("bob", "Tom").unwrap();
        newer.timestamp = 20;
        remote.create(&older).await.unwrap();
        remote.create(&newer).await.unwrap();

        let names: Vec<_> = remote
            .fetch_all()
            .await
            .unwrap()
            .into_iter()
            .map(|post| post.cat_name)
            .collect();
        assert_eq!(names, vec!["Tom", "Mittens"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn injected_faults_map_to_errors() {
        let remote = InMemoryRemoteStore::new();
        remote.inject_once(RemoteOp::Create, RemoteFault::Network);
        assert!(matches!(
            remote.create(&mittens()).await,
            Err(Error::Network(_))
        ));
        assert!(remote.create(&mittens()).await.is_ok());

        remote.inject(RemoteOp::FetchAll, RemoteFault::Rejected);
        assert!(matches!(
            remote.fetch_all().await,
            Err(Error::RemoteRejected(_))
        ));
        assert!(remote.fetch_all().await.is_err());
        remote.clear_faults();
        assert_eq!(remote.fetch_all().await.unwrap().len(), 1);
        assert_eq!(remote.create_calls(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn delete_removes_comments_and_is_idempotent() {
        let remote = InMemoryRemoteStore::new();
        let id = remote.create(&mittens()).await.unwrap();
        let comment = CommentRecord::new(id.clone(), "bob", "cute").unwrap();
        remote.append_comment(&comment).await.unwrap();

        remote.delete(&id).await.unwrap();
        remote.delete(&id).await.unwrap();
        assert!(remote.get(&id).await.unwrap().is_none());
        assert!(matches!(
            remote.append_comment(&comment).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn increment_missing_post_is_not_found() {
        let remote = InMemoryRemoteStore::new();
        let error = remote
            .increment_likes(&PostId::new("nope"), 1)
            .await
            .unwrap_err();
        assert!(matches!(error, Error::NotFound(_)));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn subscribers_receive_appended_comments_in_order() {
        let remote = InMemoryRemoteStore::new();
        let id = remote.create(&mittens()).await.unwrap();
        let other = remote.create(&mittens()).await.unwrap();
        let mut subscription = remote.subscribe(&id);

        let mut first = CommentRecord::new(id.clone(), "bob", "first").unwrap();
        first.timestamp = 1;
        let mut second = CommentRecord::new(id.clone(), "carol", "second").unwrap();
        second.timestamp = 2;
        remote.append_comment(&first).await.unwrap();
        remote
            .append_comment(&CommentRecord::new(other, "dave", "elsewhere").unwrap())
            .await
            .unwrap();
        remote.append_comment(&second).await.unwrap();

        let texts: Vec<_> = subscription
            .drain_ready()
            .into_iter()
            .map(|comment| comment.text)
            .collect();
        assert_eq!(texts, vec!["first", "second"]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_fields_validates() {
        let remote = InMemoryRemoteStore::new();
        let id = remote.create(&mittens()).await.unwrap();
        let edit = PostEdit {
            cat_name: Some(String::new()),
            ..PostEdit::default()
        };

        assert!(matches!(
            remote.update_fields(&id, &edit).await,
            Err(Error::Validation(_))
        ));
        assert_eq!(remote.get(&id).await.unwrap().unwrap().cat_name, "Mittens");
    }
}
