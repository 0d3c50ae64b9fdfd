//! Shared service wrappers used across clients.

mod local_store;

pub use local_store::{LocalFeed, LocalFeedIter, LocalStore, DEFAULT_PAGE_SIZE};
