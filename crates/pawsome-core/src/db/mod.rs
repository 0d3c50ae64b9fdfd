//! Database layer for the on-device post cache

mod connection;
mod migrations;
mod repository;

pub use connection::Database;
pub use migrations::CURRENT_VERSION;
pub use repository::{FeedCursor, PostRepository, SqlitePostRepository};
