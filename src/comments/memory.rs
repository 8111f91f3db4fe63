//! In-process [`CommentStore`] used by the unit tests.

use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
};

use chrono::{DateTime, Utc};

use super::{CommentStore, LikeChange, subtree::SubtreeWalk};
use crate::models::{Comment, CommentFilter, CommentStatus, NewComment, ParentFilter};

#[derive(Default)]
struct Inner {
    comments: Vec<Comment>,
    likes: HashSet<(String, String)>,
    usernames: HashMap<String, String>,
}

#[derive(Default)]
pub struct MemoryCommentStore {
    inner: Mutex<Inner>,
}

impl MemoryCommentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, id: &str, username: &str) -> Self {
        self.lock()
            .usernames
            .insert(id.to_string(), username.to_string());
        self
    }

    /// Stores a row as-is, bypassing validation.
    pub fn put_raw(&self, comment: Comment) {
        self.lock().comments.push(comment);
    }

    pub fn comment_count(&self) -> usize {
        self.lock().comments.len()
    }

    pub fn like_rows(&self, comment_id: &str) -> usize {
        self.lock()
            .likes
            .iter()
            .filter(|(liked, _)| liked == comment_id)
            .count()
    }

    pub fn total_like_rows(&self) -> usize {
        self.lock().likes.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Inner {
    fn get(&self, id: &str) -> Option<Comment> {
        self.comments.iter().find(|c| c.id == id).cloned().map(|mut c| {
            c.user_name = self.usernames.get(&c.user_id).cloned();
            c
        })
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut Comment> {
        self.comments.iter_mut().find(|c| c.id == id)
    }

    fn active(&self, id: &str) -> bool {
        self.comments.iter().any(|c| c.id == id && c.is_active())
    }
}

impl CommentStore for MemoryCommentStore {
    async fn find(&self, id: &str) -> Result<Option<Comment>, sqlx::Error> {
        Ok(self.lock().get(id))
    }

    async fn list(&self, filter: &CommentFilter) -> Result<Vec<Comment>, sqlx::Error> {
        let inner = self.lock();
        let mut found: Vec<Comment> = inner
            .comments
            .iter()
            .filter(|c| c.is_active())
            .filter(|c| filter.post_type.as_ref().is_none_or(|t| &c.post_type == t))
            .filter(|c| filter.post_id.as_ref().is_none_or(|p| &c.post_id == p))
            .filter(|c| match &filter.parent {
                ParentFilter::Any => true,
                ParentFilter::Roots => c.parent_id.is_none(),
                ParentFilter::ChildrenOf(parent) => c.parent_id.as_ref() == Some(parent),
            })
            .filter_map(|c| inner.get(&c.id))
            .collect();

        found.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(found)
    }

    async fn insert(&self, comment: &NewComment) -> Result<Comment, sqlx::Error> {
        let mut inner = self.lock();
        inner.comments.push(Comment {
            id: comment.id.clone(),
            user_id: comment.user_id.clone(),
            user_name: None,
            content: comment.content.clone(),
            parent_id: comment.parent_id.clone(),
            post_type: comment.post_type.clone(),
            post_id: comment.post_id.clone(),
            like_count: 0,
            status: CommentStatus::Active.as_str().to_string(),
            created_at: comment.created_at,
            updated_at: comment.created_at,
        });
        inner.get(&comment.id).ok_or(sqlx::Error::RowNotFound)
    }

    async fn update_content(
        &self,
        id: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Comment>, sqlx::Error> {
        let mut inner = self.lock();
        if let Some(comment) = inner.get_mut(id) {
            comment.content = content.to_string();
            comment.updated_at = now;
        }
        Ok(inner.get(id))
    }

    async fn delete_subtree(&self, root_id: &str) -> Result<Vec<String>, sqlx::Error> {
        let mut inner = self.lock();
        if inner.get(root_id).is_none() {
            return Ok(Vec::new());
        }

        let mut walk = SubtreeWalk::new(root_id);
        loop {
            let frontier: HashSet<&String> = walk.frontier().iter().collect();
            let children: Vec<String> = inner
                .comments
                .iter()
                .filter(|c| c.parent_id.as_ref().is_some_and(|p| frontier.contains(p)))
                .map(|c| c.id.clone())
                .collect();
            if !walk.push_level(children) {
                break;
            }
        }

        let removed: Vec<String> = walk.into_levels_deepest_first().into_iter().flatten().collect();
        let doomed: HashSet<&String> = removed.iter().collect();
        inner.comments.retain(|c| !doomed.contains(&c.id));
        inner.likes.retain(|(comment_id, _)| !doomed.contains(comment_id));

        Ok(removed)
    }

    async fn add_like(
        &self,
        comment_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<LikeChange, sqlx::Error> {
        let mut inner = self.lock();
        if !inner.active(comment_id) {
            return Ok(LikeChange::CommentUnavailable);
        }
        if !inner
            .likes
            .insert((comment_id.to_string(), user_id.to_string()))
        {
            return Ok(LikeChange::AlreadyLiked);
        }

        let Some(comment) = inner.get_mut(comment_id) else {
            return Ok(LikeChange::CommentUnavailable);
        };
        comment.like_count += 1;
        comment.updated_at = now;
        Ok(LikeChange::Applied {
            like_count: comment.like_count,
        })
    }

    async fn remove_like(
        &self,
        comment_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<LikeChange, sqlx::Error> {
        let mut inner = self.lock();
        if !inner.active(comment_id) {
            return Ok(LikeChange::CommentUnavailable);
        }
        if !inner
            .likes
            .remove(&(comment_id.to_string(), user_id.to_string()))
        {
            return Ok(LikeChange::NotLiked);
        }

        let Some(comment) = inner.get_mut(comment_id) else {
            return Ok(LikeChange::CommentUnavailable);
        };
        comment.like_count = (comment.like_count - 1).max(0);
        comment.updated_at = now;
        Ok(LikeChange::Applied {
            like_count: comment.like_count,
        })
    }

    async fn has_liked(&self, comment_id: &str, user_id: &str) -> Result<bool, sqlx::Error> {
        Ok(self
            .lock()
            .likes
            .contains(&(comment_id.to_string(), user_id.to_string())))
    }

    async fn liked_among(
        &self,
        user_id: &str,
        comment_ids: &[String],
    ) -> Result<HashSet<String>, sqlx::Error> {
        let inner = self.lock();
        Ok(comment_ids
            .iter()
            .filter(|id| inner.likes.contains(&((*id).clone(), user_id.to_string())))
            .cloned()
            .collect())
    }
}
