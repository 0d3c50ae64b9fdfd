//! Post repository implementation

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::error::{Error, Result, ValidationError};
use crate::models::{
    CommentId, CommentRecord, MediaRef, PostId, PostRecord, SyncState,
};

const POST_COLUMNS: &str = "id, username, cat_name, cat_breed, cat_age, location, \
     post_description, image_ref, likes, timestamp, sync_state";

/// Position after the last post of a feed page, newest first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedCursor {
    pub timestamp: i64,
    pub id: PostId,
}

impl FeedCursor {
    /// Cursor pointing just past `post`; `None` if the post has no id yet.
    pub fn after(post: &PostRecord) -> Option<Self> {
        post.id.clone().map(|id| Self {
            timestamp: post.timestamp,
            id,
        })
    }
}

/// Trait for post storage operations
pub trait PostRepository {
    /// Insert a new post, assigning a local-only id when none is set
    fn create(&self, record: &PostRecord) -> Result<PostId>;

    /// Insert or fully replace a post and its comments
    fn upsert(&self, record: &PostRecord) -> Result<()>;

    /// Get a post (with comments) by ID
    fn get(&self, id: &PostId) -> Result<Option<PostRecord>>;

    /// One feed page ordered by timestamp desc, starting after `cursor`
    fn page(&self, cursor: Option<&FeedCursor>, limit: usize) -> Result<Vec<PostRecord>>;

    /// Apply a mutation to a stored post in one transaction
    fn update<F>(&self, id: &PostId, mutator: F) -> Result<PostRecord>
    where
        F: FnOnce(&mut PostRecord);

    /// Delete a post and its comments, returns whether a row existed
    fn delete(&self, id: &PostId) -> Result<bool>;

    /// Attach a comment to an existing post
    fn append_comment(&self, comment: &CommentRecord) -> Result<()>;

    /// Posts in the given sync state, oldest first
    fn list_by_state(&self, state: SyncState) -> Result<Vec<PostRecord>>;

    /// Change the sync bookkeeping of one post
    fn set_sync_state(&self, id: &PostId, state: SyncState) -> Result<()>;

    /// Replace a temporary id with the canonical one
    fn rekey(&self, from: &PostId, to: &PostId) -> Result<()>;
}

/// `SQLite` implementation of `PostRepository`
pub struct SqlitePostRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqlitePostRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Parse a post from a database row (comments loaded separately)
    fn parse_post(row: &Row<'_>) -> rusqlite::Result<PostRecord> {
        let likes: i64 = row.get(8)?;
        let sync_state: String = row.get(10)?;
        Ok(PostRecord {
            id: Some(PostId::new(row.get::<_, String>(0)?)),
            username: row.get(1)?,
            cat_name: row.get(2)?,
            cat_breed: row.get(3)?,
            cat_age: row.get(4)?,
            location: row.get(5)?,
            post_description: row.get(6)?,
            image_ref: row.get::<_, Option<String>>(7)?.map(MediaRef::new),
            likes: u64::try_from(likes).unwrap_or_default(),
            timestamp: row.get(9)?,
            comments: Vec::new(),
            sync_state: sync_state.parse().unwrap_or_default(),
        })
    }

    fn parse_comment(row: &Row<'_>) -> rusqlite::Result<CommentRecord> {
        Ok(CommentRecord {
            id: CommentId::new(row.get::<_, String>(0)?),
            post_id: PostId::new(row.get::<_, String>(1)?),
            username: row.get(2)?,
            text: row.get(3)?,
            profile_image_ref: row.get::<_, Option<String>>(4)?.map(MediaRef::new),
            timestamp: row.get(5)?,
        })
    }

    fn load_comments(&self, post_id: &PostId) -> Result<Vec<CommentRecord>> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, post_id, username, text, profile_image_ref, timestamp
             FROM comments
             WHERE post_id = ?
             ORDER BY timestamp ASC, id ASC",
        )?;

        let comments = stmt
            .query_map(params![post_id.as_str()], Self::parse_comment)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(comments)
    }

    fn with_comments(&self, mut posts: Vec<PostRecord>) -> Result<Vec<PostRecord>> {
        for post in &mut posts {
            if let Some(id) = post.id.clone() {
                post.comments = self.load_comments(&id)?;
            }
        }
        Ok(posts)
    }

    fn insert_comment(&self, comment: &CommentRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO comments (id, post_id, username, text, profile_image_ref, timestamp)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO NOTHING",
            params![
                comment.id.as_str(),
                comment.post_id.as_str(),
                comment.username,
                comment.text,
                comment.profile_image_ref.as_ref().map(MediaRef::as_str),
                comment.timestamp,
            ],
        )?;
        Ok(())
    }

    fn replace_comments(&self, id: &PostId, comments: &[CommentRecord]) -> Result<()> {
        self.conn
            .execute("DELETE FROM comments WHERE post_id = ?", params![id.as_str()])?;
        for comment in comments {
            let mut owned = comment.clone();
            owned.post_id = id.clone();
            self.insert_comment(&owned)?;
        }
        Ok(())
    }

    fn exists(&self, id: &PostId) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM posts WHERE id = ?",
                params![id.as_str()],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    fn write_post(&self, id: &PostId, record: &PostRecord) -> Result<()> {
        self.conn.execute(
            "INSERT INTO posts (id, username, cat_name, cat_breed, cat_age, location,
                                post_description, image_ref, likes, timestamp, sync_state)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                username = excluded.username,
                cat_name = excluded.cat_name,
                cat_breed = excluded.cat_breed,
                cat_age = excluded.cat_age,
                location = excluded.location,
                post_description = excluded.post_description,
                image_ref = excluded.image_ref,
                likes = excluded.likes,
                timestamp = excluded.timestamp,
                sync_state = excluded.sync_state",
            params![
                id.as_str(),
                record.username,
                record.cat_name,
                record.cat_breed,
                record.cat_age,
                record.location,
                record.post_description,
                record.image_ref.as_ref().map(MediaRef::as_str),
                likes_to_sql(record.likes)?,
                record.timestamp,
                record.sync_state.as_str(),
            ],
        )?;
        Ok(())
    }
}

fn likes_to_sql(likes: u64) -> Result<i64> {
    i64::try_from(likes).map_err(|_| Error::Persistence(format!("likes counter overflow: {likes}")))
}

fn limit_to_sql(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

impl PostRepository for SqlitePostRepository<'_> {
    fn create(&self, record: &PostRecord) -> Result<PostId> {
        record.validate()?;

        let mut stored = record.clone();
        let id = if let Some(id) = record.id.clone() {
            id
        } else {
            stored.sync_state = SyncState::Pending;
            PostId::local()
        };

        let tx = self.conn.unchecked_transaction()?;
        if self.exists(&id)? {
            return Err(Error::Persistence(format!("post {id} already exists")));
        }
        self.write_post(&id, &stored)?;
        self.replace_comments(&id, &stored.comments)?;
        tx.commit()?;

        Ok(id)
    }

    fn upsert(&self, record: &PostRecord) -> Result<()> {
        record.validate()?;
        let id = record
            .id
            .clone()
            .ok_or_else(|| Error::NotFound("cannot upsert a post without an id".into()))?;

        let tx = self.conn.unchecked_transaction()?;
        self.write_post(&id, record)?;
        self.replace_comments(&id, &record.comments)?;
        tx.commit()?;
        Ok(())
    }

    fn get(&self, id: &PostId) -> Result<Option<PostRecord>> {
        let post = self
            .conn
            .query_row(
                &format!("SELECT {POST_COLUMNS} FROM posts WHERE id = ?"),
                params![id.as_str()],
                Self::parse_post,
            )
            .optional()?;

        match post {
            Some(mut post) => {
                post.comments = self.load_comments(id)?;
                Ok(Some(post))
            }
            None => Ok(None),
        }
    }

    fn page(&self, cursor: Option<&FeedCursor>, limit: usize) -> Result<Vec<PostRecord>> {
        let posts = if let Some(cursor) = cursor {
            let mut stmt = self.conn.prepare_cached(&format!(
                "SELECT {POST_COLUMNS} FROM posts
                 WHERE timestamp < ?1 OR (timestamp = ?1 AND id < ?2)
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?3"
            ))?;
            let rows = stmt.query_map(
                params![cursor.timestamp, cursor.id.as_str(), limit_to_sql(limit)],
                Self::parse_post,
            )?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        } else {
            let mut stmt = self.conn.prepare_cached(&format!(
                "SELECT {POST_COLUMNS} FROM posts
                 ORDER BY timestamp DESC, id DESC
                 LIMIT ?1"
            ))?;
            let rows = stmt.query_map(params![limit_to_sql(limit)], Self::parse_post)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };

        self.with_comments(posts)
    }

    fn update<F>(&self, id: &PostId, mutator: F) -> Result<PostRecord>
    where
        F: FnOnce(&mut PostRecord),
    {
        let tx = self.conn.unchecked_transaction()?;
        let current = self
            .get(id)?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        let mut updated = current.clone();
        mutator(&mut updated);

        let mut immutable = ValidationError::default();
        if updated.id != current.id {
            immutable.push("id", "cannot be changed");
        }
        if updated.timestamp != current.timestamp {
            immutable.push("timestamp", "cannot be changed");
        }
        immutable.into_result()?;
        updated.validate()?;
        updated.sort_comments();

        self.write_post(id, &updated)?;
        if updated.comments != current.comments {
            self.replace_comments(id, &updated.comments)?;
        }
        tx.commit()?;

        Ok(updated)
    }

    fn delete(&self, id: &PostId) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        self.conn
            .execute("DELETE FROM comments WHERE post_id = ?", params![id.as_str()])?;
        let rows = self
            .conn
            .execute("DELETE FROM posts WHERE id = ?", params![id.as_str()])?;
        tx.commit()?;
        Ok(rows > 0)
    }

    fn append_comment(&self, comment: &CommentRecord) -> Result<()> {
        comment.validate()?;
        let tx = self.conn.unchecked_transaction()?;
        if !self.exists(&comment.post_id)? {
            return Err(Error::NotFound(comment.post_id.to_string()));
        }
        self.insert_comment(comment)?;
        tx.commit()?;
        Ok(())
    }

    fn list_by_state(&self, state: SyncState) -> Result<Vec<PostRecord>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT {POST_COLUMNS} FROM posts
             WHERE sync_state = ?
             ORDER BY timestamp ASC, id ASC"
        ))?;
        let posts = stmt
            .query_map(params![state.as_str()], Self::parse_post)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        self.with_comments(posts)
    }

    fn set_sync_state(&self, id: &PostId, state: SyncState) -> Result<()> {
        let rows = self.conn.execute(
            "UPDATE posts SET sync_state = ? WHERE id = ?",
            params![state.as_str(), id.as_str()],
        )?;
        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    fn rekey(&self, from: &PostId, to: &PostId) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        if !self.exists(from)? {
            return Err(Error::NotFound(from.to_string()));
        }
        if self.exists(to)? {
            // The canonical copy already arrived through reconciliation
            self.conn
                .execute("DELETE FROM comments WHERE post_id = ?", params![from.as_str()])?;
            self.conn
                .execute("DELETE FROM posts WHERE id = ?", params![from.as_str()])?;
        } else {
            self.conn.execute(
                "UPDATE posts SET id = ?, sync_state = ? WHERE id = ?",
                params![to.as_str(), SyncState::Synced.as_str(), from.as_str()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}
