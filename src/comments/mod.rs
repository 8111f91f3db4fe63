//! Threaded comments: persistence behind [`CommentStore`], the operations the
//! HTTP layer calls in [`service`], and the thread shaping in [`tree`].

#[cfg(test)]
pub mod memory;
pub mod mysql;
pub mod service;
pub mod subtree;
pub mod tree;

use std::{collections::HashSet, future::Future};

use chrono::{DateTime, Utc};

use crate::models::{Comment, CommentFilter, NewComment};

pub use mysql::MySqlCommentStore;

/// Outcome of a like or unlike attempt. The store applies the like row and the
/// cached counter together or not at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LikeChange {
    Applied { like_count: i64 },
    /// The comment does not exist or is not active.
    CommentUnavailable,
    AlreadyLiked,
    NotLiked,
}

pub trait CommentStore: Send + Sync {
    fn find(&self, id: &str) -> impl Future<Output = Result<Option<Comment>, sqlx::Error>> + Send;

    /// Active comments matching `filter`, newest first.
    fn list(
        &self,
        filter: &CommentFilter,
    ) -> impl Future<Output = Result<Vec<Comment>, sqlx::Error>> + Send;

    fn insert(
        &self,
        comment: &NewComment,
    ) -> impl Future<Output = Result<Comment, sqlx::Error>> + Send;

    fn update_content(
        &self,
        id: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<Option<Comment>, sqlx::Error>> + Send;

    /// Removes the comment, its whole reply subtree and every like on them in
    /// one unit. Returns the removed ids leaves first; empty when `root_id`
    /// no longer exists.
    fn delete_subtree(
        &self,
        root_id: &str,
    ) -> impl Future<Output = Result<Vec<String>, sqlx::Error>> + Send;

    fn add_like(
        &self,
        comment_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<LikeChange, sqlx::Error>> + Send;

    fn remove_like(
        &self,
        comment_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> impl Future<Output = Result<LikeChange, sqlx::Error>> + Send;

    fn has_liked(
        &self,
        comment_id: &str,
        user_id: &str,
    ) -> impl Future<Output = Result<bool, sqlx::Error>> + Send;

    /// The subset of `comment_ids` the user has liked.
    fn liked_among(
        &self,
        user_id: &str,
        comment_ids: &[String],
    ) -> impl Future<Output = Result<HashSet<String>, sqlx::Error>> + Send;
}
