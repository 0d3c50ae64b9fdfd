//! pawsome-core - Core library for Pawsome
//!
//! This crate contains the post models, the on-device cache, the cloud
//! document store client, media upload, and the coordinator that keeps them
//! consistent. Every Pawsome client shell (desktop, mobile, CLI) builds on it.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;
pub mod storage;
pub mod sync;
pub mod util;

pub use config::PawsomeConfig;
pub use error::{Error, Result, ValidationError};
pub use models::{
    Author, CommentId, CommentRecord, DraftId, ImageAttachment, MediaRef, PostDraft, PostEdit,
    PostId, PostRecord, SyncState,
};
pub use remote::{CommentSubscription, RemoteStore};
pub use services::LocalStore;
pub use storage::MediaUploader;
pub use sync::{
    CancelToken, CreateOutcome, CreateState, FeedSnapshot, SyncCoordinator, SyncOptions,
    SyncReport,
};
