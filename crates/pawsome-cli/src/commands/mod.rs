pub mod comment;
pub mod common;
pub mod delete;
pub mod edit;
pub mod feed;
pub mod like;
pub mod post;
pub mod sync;
