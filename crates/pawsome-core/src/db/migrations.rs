//! Database migrations
//!
//! Schema changes are additive: new columns always carry a default so rows
//! written by older app versions stay readable.

use crate::error::Result;
use rusqlite::Connection;

/// Current schema version
pub const CURRENT_VERSION: i32 = 2;

/// Run all pending migrations
pub fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn)?;

    if version < 1 {
        migrate_v1(conn)?;
    }
    if version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version
pub fn get_version(conn: &Connection) -> Result<i32> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
        [],
        |row| row.get(0),
    )?;

    if !exists {
        return Ok(0);
    }

    let version = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )?;

    Ok(version)
}

/// Apply one migration atomically
fn apply(conn: &Connection, version: i32, sql: &str) -> Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(sql)?;
    tx.execute(
        "INSERT INTO schema_version (version) VALUES (?)",
        [version],
    )?;
    tx.commit()?;

    tracing::info!("Migrated local cache to version {version}");
    Ok(())
}

/// Migration to version 1: posts and their comments
fn migrate_v1(conn: &Connection) -> Result<()> {
    apply(
        conn,
        1,
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        );
        CREATE TABLE IF NOT EXISTS posts (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL,
            cat_name TEXT NOT NULL,
            cat_breed TEXT,
            cat_age INTEGER CHECK (cat_age IS NULL OR cat_age >= 0),
            location TEXT,
            post_description TEXT,
            image_ref TEXT,
            likes INTEGER NOT NULL DEFAULT 0 CHECK (likes >= 0),
            timestamp INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_posts_feed ON posts(timestamp DESC, id DESC);
        CREATE TABLE IF NOT EXISTS comments (
            id TEXT PRIMARY KEY,
            post_id TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE ON UPDATE CASCADE,
            username TEXT NOT NULL,
            text TEXT NOT NULL,
            profile_image_ref TEXT,
            timestamp INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_comments_post ON comments(post_id, timestamp);",
    )
}

/// Migration to version 2: offline queue bookkeeping
fn migrate_v2(conn: &Connection) -> Result<()> {
    apply(
        conn,
        2,
        "ALTER TABLE posts ADD COLUMN sync_state TEXT NOT NULL DEFAULT 'synced';
        CREATE INDEX IF NOT EXISTS idx_posts_sync_state ON posts(sync_state);",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup() -> Connection {
        Connection::open_in_memory().unwrap()
    }

    #[test]
    fn test_migrations() {
        let conn = setup();
        run(&conn).unwrap();

        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_migrations_idempotent() {
        let conn = setup();
        run(&conn).unwrap();
        run(&conn).unwrap(); // Should not fail

        assert_eq!(get_version(&conn).unwrap(), CURRENT_VERSION);
    }

    #[test]
    fn test_v2_defaults_rows_written_by_v1() {
        let conn = setup();
        migrate_v1(&conn).unwrap();
        conn.execute(
            "INSERT INTO posts (id, username, cat_name, timestamp) VALUES ('old', 'alice', 'Tom', 1)",
            [],
        )
        .unwrap();

        run(&conn).unwrap();

        let (state, likes): (String, i64) = conn
            .query_row(
                "SELECT sync_state, likes FROM posts WHERE id = 'old'",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(state, "synced");
        assert_eq!(likes, 0);
    }

    #[test]
    fn test_negative_likes_rejected_by_schema() {
        let conn = setup();
        run(&conn).unwrap();

        let result = conn.execute(
            "INSERT INTO posts (id, username, cat_name, likes, timestamp) VALUES ('p', 'a', 'b', -1, 1)",
            [],
        );
        assert!(result.is_err());
    }
}
