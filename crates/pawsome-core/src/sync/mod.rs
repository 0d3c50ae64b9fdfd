//! Coordination between the local cache, the remote store and media uploads.
//!
//! The remote store is authoritative. The local cache mirrors it for fast
//! reads and offline use, and optionally holds posts that could not be
//! submitted yet.

mod cancel;
mod state;

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};

use tokio::sync::Mutex as AsyncMutex;

use crate::error::{Error, Result};
use crate::models::{
    Author, CommentRecord, DraftId, ImageAttachment, MediaRef, PostDraft, PostEdit, PostId,
    PostRecord, SyncState,
};
use crate::remote::{CommentSubscription, RemoteStore};
use crate::services::LocalStore;
use crate::storage::{build_media_key, MediaUploader};

pub use cancel::CancelToken;
pub use state::CreateState;

/// Behavior switches for [`SyncCoordinator`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncOptions {
    /// Keep posts that failed to submit for lack of connectivity in the
    /// local cache and retry them on the next feed refresh
    pub queue_offline: bool,
}

/// Result of one [`SyncCoordinator::create_post`] attempt.
#[derive(Debug)]
pub struct CreateOutcome {
    /// Every state visited, in order; the last one is terminal
    pub states: Vec<CreateState>,
    pub result: Result<PostRecord>,
    /// Local id the post was queued under after a connectivity failure
    pub queued_id: Option<PostId>,
    /// An earlier attempt for the same draft had already committed
    pub reused: bool,
}

impl CreateOutcome {
    #[must_use]
    pub fn state(&self) -> CreateState {
        self.states.last().copied().unwrap_or(CreateState::Pending)
    }

    #[must_use]
    pub fn is_committed(&self) -> bool {
        self.state() == CreateState::Committed
    }

    #[must_use]
    pub fn record(&self) -> Option<&PostRecord> {
        self.result.as_ref().ok()
    }

    #[must_use]
    pub fn error(&self) -> Option<&Error> {
        self.result.as_ref().err()
    }

    #[must_use]
    pub fn visited(&self, state: CreateState) -> bool {
        self.states.contains(&state)
    }

    pub fn into_result(self) -> Result<PostRecord> {
        self.result
    }
}

/// What the pending-post retry pass achieved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: usize,
    pub failed: usize,
    pub still_pending: usize,
}

/// Newest-first feed as served to the presentation layer.
#[derive(Debug, Clone, Default)]
pub struct FeedSnapshot {
    /// Each post carries its own [`SyncState`]
    pub posts: Vec<PostRecord>,
    /// Served from the local cache because the remote store was unreachable
    pub stale: bool,
    pub report: SyncReport,
}

impl FeedSnapshot {
    #[must_use]
    pub fn len(&self) -> usize {
        self.posts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.posts.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PostRecord> {
        self.posts.iter()
    }

    #[must_use]
    pub fn get(&self, id: &PostId) -> Option<&PostRecord> {
        self.posts.iter().find(|post| post.id.as_ref() == Some(id))
    }

    /// Posts not yet accepted by the remote store.
    pub fn unsynced(&self) -> impl Iterator<Item = &PostRecord> {
        self.posts
            .iter()
            .filter(|post| post.sync_state.is_local_only())
    }
}

/// Committed drafts remembered for same-draft retries.
const COMMITTED_DRAFT_MEMO: usize = 256;

type DraftSlot = Arc<AsyncMutex<()>>;

/// Recently committed drafts, oldest evicted first.
#[derive(Default)]
struct CommittedDrafts {
    records: HashMap<DraftId, PostRecord>,
    order: VecDeque<DraftId>,
}

impl CommittedDrafts {
    fn get(&self, draft_id: &DraftId) -> Option<&PostRecord> {
        self.records.get(draft_id)
    }

    fn insert(&mut self, draft_id: DraftId, record: PostRecord) {
        if self.records.insert(draft_id, record).is_none() {
            self.order.push_back(draft_id);
        }
        while self.order.len() > COMMITTED_DRAFT_MEMO {
            if let Some(oldest) = self.order.pop_front() {
                self.records.remove(&oldest);
            }
        }
    }
}

/// Drives post creation and keeps the local cache consistent with the
/// remote store.
pub struct SyncCoordinator<R, M> {
    local: LocalStore,
    remote: R,
    uploader: M,
    options: SyncOptions,
    /// In-flight attempts; an entry lives only while someone holds its slot
    drafts: Mutex<HashMap<DraftId, DraftSlot>>,
    committed: Mutex<CommittedDrafts>,
    /// Held for a whole pending-post retry pass
    sync_lock: AsyncMutex<()>,
}

/// Ordered record of the states one attempt passes through.
struct Transitions {
    draft_id: DraftId,
    states: Vec<CreateState>,
}

impl Transitions {
    fn start(draft_id: DraftId) -> Self {
        tracing::debug!("Draft {} entered {}", draft_id, CreateState::Pending);
        Self {
            draft_id,
            states: vec![CreateState::Pending],
        }
    }

    fn current(&self) -> CreateState {
        self.states.last().copied().unwrap_or(CreateState::Pending)
    }

    fn enter(&mut self, next: CreateState) {
        let current = self.current();
        debug_assert!(
            current.can_transition_to(next),
            "illegal transition {current} -> {next}"
        );
        tracing::debug!("Draft {} {} -> {}", self.draft_id, current, next);
        self.states.push(next);
    }

    fn fail(mut self, error: Error, queued_id: Option<PostId>) -> CreateOutcome {
        tracing::warn!(
            "Draft {} failed during {}: {}",
            self.draft_id,
            self.current(),
            error
        );
        self.enter(CreateState::Failed);
        CreateOutcome {
            states: self.states,
            result: Err(error),
            queued_id,
            reused: false,
        }
    }

    fn commit(mut self, record: PostRecord) -> CreateOutcome {
        self.enter(CreateState::Committed);
        CreateOutcome {
            states: self.states,
            result: Ok(record),
            queued_id: None,
            reused: false,
        }
    }
}

impl<R: RemoteStore, M: MediaUploader> SyncCoordinator<R, M> {
    pub fn new(local: LocalStore, remote: R, uploader: M, options: SyncOptions) -> Self {
        Self {
            local,
            remote,
            uploader,
            options,
            drafts: Mutex::new(HashMap::new()),
            committed: Mutex::new(CommittedDrafts::default()),
            sync_lock: AsyncMutex::new(()),
        }
    }

    pub const fn local(&self) -> &LocalStore {
        &self.local
    }

    pub const fn remote(&self) -> &R {
        &self.remote
    }

    pub const fn options(&self) -> SyncOptions {
        self.options
    }

    /// Create a post, uploading its image first when one is attached.
    pub async fn create_post(
        &self,
        draft: &PostDraft,
        author: &Author,
        image: Option<&ImageAttachment>,
    ) -> CreateOutcome {
        self.create_post_with_cancel(draft, author, image, &CancelToken::new())
            .await
    }

    /// Like [`Self::create_post`], abandoning the attempt if `cancel` fires
    /// before submission starts.
    pub async fn create_post_with_cancel(
        &self,
        draft: &PostDraft,
        author: &Author,
        image: Option<&ImageAttachment>,
        cancel: &CancelToken,
    ) -> CreateOutcome {
        let slot = match self.draft_slot(draft.draft_id) {
            Ok(slot) => slot,
            Err(error) => return Transitions::start(draft.draft_id).fail(error, None),
        };
        let outcome = self.create_in_slot(&slot, draft, author, image, cancel).await;
        self.release_draft_slot(draft.draft_id, &slot);
        outcome
    }

    async fn create_in_slot(
        &self,
        slot: &DraftSlot,
        draft: &PostDraft,
        author: &Author,
        image: Option<&ImageAttachment>,
        cancel: &CancelToken,
    ) -> CreateOutcome {
        // Later attempts for the same draft queue up here
        let _attempt = slot.lock().await;
        if let Some(record) = self.committed_record(&draft.draft_id) {
            tracing::debug!("Draft {} already committed, reusing result", draft.draft_id);
            return CreateOutcome {
                states: vec![CreateState::Committed],
                result: Ok(record),
                queued_id: None,
                reused: true,
            };
        }

        let outcome = self.run_create(draft, author, image, cancel).await;
        if let Some(record) = outcome.record() {
            self.remember_committed(draft.draft_id, record.clone());
        }
        outcome
    }

    fn draft_slot(&self, draft_id: DraftId) -> Result<DraftSlot> {
        let mut drafts = self
            .drafts
            .lock()
            .map_err(|_| Error::Persistence("draft registry lock poisoned".to_string()))?;
        Ok(Arc::clone(drafts.entry(draft_id).or_default()))
    }

    /// Drop the registry entry once no other attempt is waiting on it.
    fn release_draft_slot(&self, draft_id: DraftId, slot: &DraftSlot) {
        let Ok(mut drafts) = self.drafts.lock() else {
            tracing::warn!("Draft registry lock poisoned, keeping slot for {}", draft_id);
            return;
        };
        // One reference is the registry's, one is ours
        if Arc::strong_count(slot) <= 2 {
            drafts.remove(&draft_id);
        }
    }

    fn committed_record(&self, draft_id: &DraftId) -> Option<PostRecord> {
        self.committed
            .lock()
            .ok()
            .and_then(|committed| committed.get(draft_id).cloned())
    }

    fn remember_committed(&self, draft_id: DraftId, record: PostRecord) {
        match self.committed.lock() {
            Ok(mut committed) => committed.insert(draft_id, record),
            Err(_) => tracing::warn!("Committed draft memo poisoned, not remembering {}", draft_id),
        }
    }

    #[cfg(test)]
    fn tracked_drafts(&self) -> usize {
        self.drafts.lock().map_or(0, |drafts| drafts.len())
    }

    async fn run_create(
        &self,
        draft: &PostDraft,
        author: &Author,
        image: Option<&ImageAttachment>,
        cancel: &CancelToken,
    ) -> CreateOutcome {
        let mut transitions = Transitions::start(draft.draft_id);

        // Reject bad input before any bytes leave the device
        if let Err(error) = PostRecord::from_draft(draft, author, None) {
            return transitions.fail(error.into(), None);
        }
        if cancel.is_cancelled() {
            return transitions.fail(Error::Cancelled, None);
        }

        let mut image_ref = None;
        if let Some(image) = image {
            transitions.enter(CreateState::MediaUploading);
            match self.upload_image(draft, image, cancel).await {
                Ok(media) => {
                    transitions.enter(CreateState::MediaUploaded);
                    if cancel.is_cancelled() {
                        self.uploader.delete(&media).await;
                        return transitions.fail(Error::Cancelled, None);
                    }
                    image_ref = Some(media);
                }
                Err(error) => return transitions.fail(error, None),
            }
        }

        transitions.enter(CreateState::Submitting);
        let record = match PostRecord::from_draft(draft, author, image_ref) {
            Ok(record) => record,
            Err(error) => return transitions.fail(error.into(), None),
        };

        match self.remote.create(&record).await {
            Ok(id) => {
                let committed = record.with_id(id);
                if let Err(error) = self.local.upsert(&committed) {
                    tracing::warn!(
                        "Committed post {} could not be mirrored locally: {}",
                        committed.id.as_ref().map_or("?", PostId::as_str),
                        error
                    );
                }
                tracing::info!(
                    "Draft {} committed as post {}",
                    draft.draft_id,
                    committed.id.as_ref().map_or("?", PostId::as_str)
                );
                transitions.commit(committed)
            }
            Err(Error::Network(message)) if self.options.queue_offline => {
                let queued_id = match self.local.create(&record) {
                    Ok(id) => {
                        tracing::info!("Draft {} queued offline as {}", draft.draft_id, id);
                        Some(id)
                    }
                    Err(error) => {
                        tracing::warn!("Draft {} could not be queued: {}", draft.draft_id, error);
                        None
                    }
                };
                transitions.fail(Error::Network(message), queued_id)
            }
            Err(error) => transitions.fail(error, None),
        }
    }

    async fn upload_image(
        &self,
        draft: &PostDraft,
        image: &ImageAttachment,
        cancel: &CancelToken,
    ) -> Result<MediaRef> {
        let object_key = build_media_key(&draft.draft_id, &image.suggested_name);
        let upload = self
            .uploader
            .upload(&object_key, &image.bytes, &image.suggested_name);
        tokio::select! {
            biased;
            () = cancel.cancelled() => {
                // The bytes may have landed even though the upload never returned
                self.uploader.delete(&self.uploader.media_ref(&object_key)).await;
                Err(Error::Cancelled)
            }
            result = upload => result,
        }
    }

    /// Submit posts queued while offline.
    ///
    /// Stops at the first connectivity failure; the rest stay pending.
    pub async fn sync_pending(&self) -> Result<SyncReport> {
        // Overlapping passes would submit the same queued post twice
        let _pass = self.sync_lock.lock().await;
        let mut report = SyncReport::default();
        let pending = self.local.pending()?;
        let mut remaining = pending.len();

        for queued in pending {
            let Some(local_id) = queued.id.clone() else {
                continue;
            };
            remaining -= 1;
            let post = match self.local.get(&local_id)? {
                Some(post) if post.sync_state == SyncState::Pending => post,
                _ => {
                    tracing::debug!("Queued post {} no longer pending, skipping", local_id);
                    continue;
                }
            };

            match self.remote.create(&post).await {
                Ok(remote_id) => {
                    match self.local.rekey(&local_id, &remote_id) {
                        Ok(()) => {}
                        Err(Error::NotFound(_)) => {
                            tracing::debug!("Queued post {} was already rekeyed", local_id);
                        }
                        Err(error) => return Err(error),
                    }
                    tracing::info!("Queued post {} synced as {}", local_id, remote_id);
                    report.synced += 1;
                }
                Err(Error::Network(message)) => {
                    tracing::debug!("Remote unreachable while syncing {}: {}", local_id, message);
                    report.still_pending = remaining + 1;
                    break;
                }
                Err(error @ (Error::RemoteRejected(_) | Error::Validation(_))) => {
                    tracing::warn!("Queued post {} rejected: {}", local_id, error);
                    self.local.mark_sync_state(&local_id, SyncState::Failed)?;
                    report.failed += 1;
                }
                Err(error) => return Err(error),
            }
        }
        Ok(report)
    }

    /// Refresh the feed from the remote store, falling back to the local
    /// cache when offline.
    pub async fn fetch_all(&self) -> Result<FeedSnapshot> {
        let report = self.sync_pending().await?;

        let remote_posts = match self.remote.fetch_all().await {
            Ok(posts) => posts,
            Err(Error::Network(message)) => {
                tracing::warn!("Serving cached feed, remote unreachable: {}", message);
                return Ok(FeedSnapshot {
                    posts: self.local.fetch_all().to_vec()?,
                    stale: true,
                    report,
                });
            }
            Err(error) => return Err(error),
        };

        let remote_ids: HashSet<&PostId> =
            remote_posts.iter().filter_map(|post| post.id.as_ref()).collect();
        for post in &remote_posts {
            self.reconcile(post);
        }
        for cached in self.local.list_by_state(SyncState::Synced)? {
            if let Some(id) = cached.id.as_ref().filter(|id| !remote_ids.contains(id)) {
                tracing::debug!("Post {} was deleted remotely", id);
                self.local.delete(id)?;
            }
        }

        let mut posts = remote_posts;
        posts.extend(self.local.list_by_state(SyncState::Pending)?);
        posts.extend(self.local.list_by_state(SyncState::Failed)?);
        posts.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then_with(|| b.id.cmp(&a.id)));

        Ok(FeedSnapshot {
            posts,
            stale: false,
            report,
        })
    }

    /// Overwrite the cached copy with the remote one when they differ.
    fn reconcile(&self, remote: &PostRecord) {
        let Some(id) = remote.id.as_ref() else {
            return;
        };
        let cached = match self.local.get(id) {
            Ok(cached) => cached,
            Err(error) => {
                tracing::warn!("Could not read cached post {}: {}", id, error);
                None
            }
        };
        if cached.is_some_and(|cached| {
            cached.same_remote_fields(remote) && cached.sync_state == SyncState::Synced
        }) {
            return;
        }
        if let Err(error) = self.local.upsert(remote) {
            tracing::warn!("Could not cache remote post {}: {}", id, error);
        }
    }

    /// One post, preferring the remote copy and falling back to the cache.
    pub async fn get_post(&self, id: &PostId) -> Result<Option<PostRecord>> {
        if id.is_local() {
            return self.local.get(id);
        }
        match self.remote.get(id).await {
            Ok(Some(post)) => {
                self.reconcile(&post);
                Ok(Some(post))
            }
            Ok(None) => {
                self.local.delete(id)?;
                Ok(None)
            }
            Err(Error::Network(message)) => {
                tracing::warn!("Serving cached post {}, remote unreachable: {}", id, message);
                self.local.get(id)
            }
            Err(error) => Err(error),
        }
    }

    /// Delete a post everywhere. The uploaded image, if any, is left behind.
    pub async fn delete_post(&self, id: &PostId) -> Result<()> {
        if !id.is_local() {
            self.remote.delete(id).await?;
        }
        self.local.delete(id)?;
        tracing::info!("Deleted post {}", id);
        Ok(())
    }

    pub async fn add_comment(
        &self,
        post_id: &PostId,
        author: &Author,
        text: &str,
    ) -> Result<CommentRecord> {
        let comment = CommentRecord::new(post_id.clone(), author.username.as_str(), text)?
            .with_profile_image(author.profile_image_ref.clone());
        if post_id.is_local() {
            return Err(Error::NotFound(format!(
                "post {post_id} has not reached the remote store yet"
            )));
        }

        self.remote.append_comment(&comment).await?;
        match self.local.append_comment(&comment) {
            Ok(()) => {}
            Err(Error::NotFound(_)) => {
                tracing::debug!("Post {} not cached, comment not mirrored", post_id);
            }
            Err(error) => tracing::warn!("Could not cache comment {}: {}", comment.id, error),
        }
        Ok(comment)
    }

    /// Add one like. The cached counter never moves backwards.
    pub async fn increment_likes(&self, id: &PostId) -> Result<u64> {
        let likes = self.remote.increment_likes(id, 1).await?;
        match self.local.update(id, |post| post.likes = post.likes.max(likes)) {
            Ok(_) => {}
            Err(Error::NotFound(_)) => tracing::debug!("Post {} not cached", id),
            Err(error) => tracing::warn!("Could not cache like count for {}: {}", id, error),
        }
        Ok(likes)
    }

    /// Moderator edit. Posts still queued locally are edited in place.
    pub async fn edit_post(&self, id: &PostId, edit: &PostEdit) -> Result<PostRecord> {
        if id.is_local() {
            let mut post = self
                .local
                .get(id)?
                .ok_or_else(|| Error::NotFound(format!("post {id}")))?;
            edit.apply(&mut post)?;
            self.local.upsert(&post)?;
            return Ok(post);
        }

        let updated = self.remote.update_fields(id, edit).await?;
        if let Err(error) = self.local.upsert(&updated) {
            tracing::warn!("Could not cache edited post {}: {}", id, error);
        }
        tracing::info!("Edited post {} ({:?})", id, edit.changed_fields());
        Ok(updated)
    }

    /// Live comments for one post, straight from the remote store.
    pub fn subscribe_comments(&self, post_id: &PostId) -> CommentSubscription {
        self.remote.subscribe(post_id)
    }
}
