//! On-device post cache shared by the sync coordinator and client shells.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::db::{Database, FeedCursor, PostRepository, SqlitePostRepository};
use crate::error::{Error, Result};
use crate::models::{CommentRecord, PostId, PostRecord, SyncState};

/// Rows fetched per round trip when iterating the feed.
pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Thread-safe handle over the local `SQLite` cache.
///
/// All access goes through one connection, so writes to the same post are
/// serialized and every read-modify-write runs inside a single transaction.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl LocalStore {
    /// Open the cache at the given filesystem path.
    pub fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Self::open_database_with_recovery(&db_path)?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory cache (primarily for tests).
    pub fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn open_database_with_recovery(db_path: &Path) -> Result<Database> {
        match Database::open(db_path) {
            Ok(db) => Ok(db),
            Err(error) if Self::is_corrupted_db_error(&error) => {
                // The cache is never authoritative; a fresh one refills from the remote store
                tracing::warn!(
                    "Local cache at {} is unreadable: {}. Starting with an empty cache.",
                    db_path.display(),
                    error
                );
                Self::quarantine_corrupted_db_files(db_path)?;
                Database::open(db_path)
            }
            Err(error) => Err(error),
        }
    }

    fn is_corrupted_db_error(error: &Error) -> bool {
        let message = error.to_string().to_ascii_lowercase();
        message.contains("file is not a database") || message.contains("malformed")
    }

    fn quarantine_corrupted_db_files(db_path: &Path) -> Result<()> {
        let Some(base_name) = db_path.file_name().and_then(|name| name.to_str()) else {
            return Ok(());
        };

        if db_path.exists() {
            let timestamp = chrono::Utc::now().timestamp_millis();
            let backup_path = db_path.with_file_name(format!("{base_name}.corrupt-{timestamp}"));

            std::fs::rename(db_path, &backup_path)?;
            tracing::warn!(
                "Moved corrupted local cache from {} to {}",
                db_path.display(),
                backup_path.display()
            );
        }

        let Some(parent) = db_path.parent() else {
            return Ok(());
        };
        let sidecar_prefix = format!("{base_name}-");

        for entry in std::fs::read_dir(parent)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            if file_name.to_string_lossy().starts_with(&sidecar_prefix) {
                let path = entry.path();
                std::fs::remove_file(&path)?;
                tracing::warn!("Removed stale cache sidecar {}", path.display());
            }
        }

        Ok(())
    }

    fn with_repo<T>(&self, op: impl FnOnce(&SqlitePostRepository<'_>) -> Result<T>) -> Result<T> {
        let db = self
            .db
            .lock()
            .map_err(|_| Error::Persistence("local cache lock poisoned".to_string()))?;
        let repo = SqlitePostRepository::new(db.connection());
        op(&repo)
    }

    /// Persist a new post; posts without an id get a local-only one and are
    /// marked pending.
    pub fn create(&self, record: &PostRecord) -> Result<PostId> {
        let id = self.with_repo(|repo| repo.create(record))?;
        tracing::debug!("Cached post {id}");
        Ok(id)
    }

    /// Insert or fully replace a post that already has an id.
    pub fn upsert(&self, record: &PostRecord) -> Result<()> {
        self.with_repo(|repo| repo.upsert(record))
    }

    pub fn get(&self, id: &PostId) -> Result<Option<PostRecord>> {
        self.with_repo(|repo| repo.get(id))
    }

    /// Newest-first view over every cached post, read lazily page by page.
    pub const fn fetch_all(&self) -> LocalFeed<'_> {
        self.fetch_all_with_page_size(DEFAULT_PAGE_SIZE)
    }

    pub const fn fetch_all_with_page_size(&self, page_size: usize) -> LocalFeed<'_> {
        LocalFeed {
            store: self,
            page_size: if page_size == 0 { 1 } else { page_size },
        }
    }

    /// Apply a field-level mutation; `NotFound` if the post is absent.
    pub fn update<F>(&self, id: &PostId, mutator: F) -> Result<PostRecord>
    where
        F: FnOnce(&mut PostRecord),
    {
        self.with_repo(|repo| repo.update(id, mutator))
    }

    /// Remove a post and its comments. Deleting an absent post is a no-op.
    pub fn delete(&self, id: &PostId) -> Result<()> {
        let existed = self.with_repo(|repo| repo.delete(id))?;
        if !existed {
            tracing::debug!("Post {id} already absent from local cache");
        }
        Ok(())
    }

    pub fn append_comment(&self, comment: &CommentRecord) -> Result<()> {
        self.with_repo(|repo| repo.append_comment(comment))
    }

    /// Posts stored locally but not yet accepted by the remote store.
    pub fn pending(&self) -> Result<Vec<PostRecord>> {
        self.list_by_state(SyncState::Pending)
    }

    pub fn list_by_state(&self, state: SyncState) -> Result<Vec<PostRecord>> {
        self.with_repo(|repo| repo.list_by_state(state))
    }

    pub fn mark_sync_state(&self, id: &PostId, state: SyncState) -> Result<()> {
        self.with_repo(|repo| repo.set_sync_state(id, state))
    }

    /// Swap a temporary id for the canonical remote one.
    pub fn rekey(&self, from: &PostId, to: &PostId) -> Result<()> {
        self.with_repo(|repo| repo.rekey(from, to))
    }

    fn page(&self, cursor: Option<&FeedCursor>, limit: usize) -> Result<Vec<PostRecord>> {
        self.with_repo(|repo| repo.page(cursor, limit))
    }
}

/// Restartable, newest-first sequence of cached posts.
///
/// Every call to [`LocalFeed::iter`] starts again from the newest post.
#[derive(Clone, Copy)]
pub struct LocalFeed<'a> {
    store: &'a LocalStore,
    page_size: usize,
}

impl<'a> LocalFeed<'a> {
    pub fn iter(&self) -> LocalFeedIter<'a> {
        LocalFeedIter {
            store: self.store,
            page_size: self.page_size,
            buffer: VecDeque::new(),
            cursor: None,
            exhausted: false,
        }
    }

    /// Drain the whole feed into memory.
    pub fn to_vec(&self) -> Result<Vec<PostRecord>> {
        self.iter().collect()
    }
}

impl<'a> IntoIterator for &LocalFeed<'a> {
    type Item = Result<PostRecord>;
    type IntoIter = LocalFeedIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator that fetches one page of posts whenever its buffer runs dry.
pub struct LocalFeedIter<'a> {
    store: &'a LocalStore,
    page_size: usize,
    buffer: VecDeque<PostRecord>,
    cursor: Option<FeedCursor>,
    exhausted: bool,
}

impl Iterator for LocalFeedIter<'_> {
    type Item = Result<PostRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            match self.store.page(self.cursor.as_ref(), self.page_size) {
                Ok(page) => {
                    if page.len() < self.page_size {
                        self.exhausted = true;
                    }
                    self.cursor = page.last().and_then(FeedCursor::after);
                    self.buffer.extend(page);
                }
                Err(error) => {
                    self.exhausted = true;
                    return Some(Err(error));
                }
            }
        }

        self.buffer.pop_front().map(Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn post_at(cat_name: &str, timestamp: i64) -> PostRecord {
        let mut post = PostRecord::new("alice", cat_name).unwrap();
        post.timestamp = timestamp;
        post
    }

    #[test]
    fn create_then_fetch_all_newest_first() {
        let store = LocalStore::open_in_memory().unwrap();
        for (name, ts) in [("old", 1), ("new", 3), ("mid", 2)] {
            store.create(&post_at(name, ts)).unwrap();
        }

        let names: Vec<_> = store
            .fetch_all()
            .to_vec()
            .unwrap()
            .into_iter()
            .map(|p| p.cat_name)
            .collect();
        assert_eq!(names, vec!["new", "mid", "old"]);
    }

    #[test]
    fn feed_is_lazy_and_restartable_across_pages() {
        let store = LocalStore::open_in_memory().unwrap();
        for ts in 0..7 {
            store.create(&post_at(&format!("cat-{ts}"), ts)).unwrap();
        }

        let feed = store.fetch_all_with_page_size(3);
        let first_two: Vec<_> = feed.iter().take(2).map(|p| p.unwrap().cat_name).collect();
        assert_eq!(first_two, vec!["cat-6", "cat-5"]);

        // A fresh pass starts over and walks every page
        let all: Vec<_> = feed.iter().map(|p| p.unwrap().timestamp).collect();
        assert_eq!(all, vec![6, 5, 4, 3, 2, 1, 0]);

        let mut count = 0;
        for post in &feed {
            post.unwrap();
            count += 1;
        }
        assert_eq!(count, 7);
    }

    #[test]
    fn feed_sees_posts_written_between_passes() {
        let store = LocalStore::open_in_memory().unwrap();
        let feed = store.fetch_all();
        assert_eq!(feed.iter().count(), 0);

        store.create(&post_at("late", 5)).unwrap();
        assert_eq!(feed.iter().count(), 1);
    }

    #[test]
    fn delete_is_idempotent() {
        let store = LocalStore::open_in_memory().unwrap();
        let id = store.create(&post_at("Mittens", 1)).unwrap();

        store.delete(&id).unwrap();
        store.delete(&id).unwrap();
        assert!(store.get(&id).unwrap().is_none());
    }

    #[test]
    fn update_missing_post_fails() {
        let store = LocalStore::open_in_memory().unwrap();
        let result = store.update(&PostId::new("nope"), |post| post.likes += 1);
        assert!(matches!(result, Err(Error::NotFound(_))));
    }

    #[test]
    fn concurrent_updates_are_not_lost() {
        let store = LocalStore::open_in_memory().unwrap();
        let id = store.create(&post_at("Mittens", 1)).unwrap();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    for _ in 0..5 {
                        store.update(&id, |post| post.likes += 1).unwrap();
                    }
                });
            }
        });

        assert_eq!(store.get(&id).unwrap().unwrap().likes, 40);
    }

    #[test]
    fn pending_lists_local_only_posts() {
        let store = LocalStore::open_in_memory().unwrap();
        let local = store.create(&post_at("queued", 1)).unwrap();
        store
            .create(&post_at("synced", 2).with_id(PostId::new("r1")))
            .unwrap();

        let pending = store.pending().unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id.as_ref(), Some(&local));
    }

    #[test]
    fn persists_across_reopen() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("cache").join("pawsome.db");

        let id = {
            let store = LocalStore::open_path(&db_path).unwrap();
            store.create(&post_at("Mittens", 1)).unwrap()
        };

        let reopened = LocalStore::open_path(&db_path).unwrap();
        assert_eq!(reopened.get(&id).unwrap().unwrap().cat_name, "Mittens");
    }

    #[test]
    fn corrupted_cache_is_quarantined_and_recreated() {
        let tmp = tempdir().unwrap();
        let db_path = tmp.path().join("pawsome.db");
        std::fs::write(&db_path, b"definitely not sqlite, just some bytes padding it out").unwrap();
        std::fs::write(tmp.path().join("pawsome.db-wal"), b"wal").unwrap();

        let store = LocalStore::open_path(&db_path).unwrap();
        assert_eq!(store.fetch_all().iter().count(), 0);

        let backups = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(std::result::Result::ok)
            .filter(|entry| {
                entry
                    .file_name()
                    .to_string_lossy()
                    .starts_with("pawsome.db.corrupt-")
            })
            .count();
        assert_eq!(backups, 1);
    }

    #[test]
    fn detects_corruption_messages() {
        assert!(LocalStore::is_corrupted_db_error(&Error::Persistence(
            "file is not a database".to_string()
        )));
        assert!(!LocalStore::is_corrupted_db_error(&Error::NotFound(
            "post".to_string()
        )));
    }
}
