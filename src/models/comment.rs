use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const MAX_COMMENT_CHARS: usize = 1000;
pub const MAX_POST_TYPE_CHARS: usize = 32;
pub const MAX_POST_ID_CHARS: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommentStatus {
    Active,
    /// Present in the schema for compatibility; deletes remove rows instead.
    Deleted,
}

impl CommentStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Deleted => "deleted",
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub user_id: String,
    pub user_name: Option<String>,
    pub content: String,
    pub parent_id: Option<String>,
    pub post_type: String,
    pub post_id: String,
    pub like_count: i64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Comment {
    pub fn is_active(&self) -> bool {
        self.status == CommentStatus::Active.as_str()
    }
}

/// Row to insert; the author name is resolved on read.
#[derive(Debug, Clone)]
pub struct NewComment {
    pub id: String,
    pub user_id: String,
    pub content: String,
    pub parent_id: Option<String>,
    pub post_type: String,
    pub post_id: String,
    pub created_at: DateTime<Utc>,
}

/// Which parent the listing is restricted to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParentFilter {
    Any,
    Roots,
    ChildrenOf(String),
}

#[derive(Debug, Clone)]
pub struct CommentFilter {
    pub post_type: Option<String>,
    pub post_id: Option<String>,
    pub parent: ParentFilter,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentQuery {
    pub post_type: Option<String>,
    pub post_id: Option<String>,
    pub parent_id: Option<String>,
    /// Only the literal `true` lists every level; other values mean false.
    pub include_all: Option<String>,
}

impl From<CommentQuery> for CommentFilter {
    fn from(query: CommentQuery) -> Self {
        let parent = if query.include_all.as_deref() == Some("true") {
            ParentFilter::Any
        } else {
            match non_blank(query.parent_id) {
                Some(parent_id) => ParentFilter::ChildrenOf(parent_id),
                None => ParentFilter::Roots,
            }
        };

        Self {
            post_type: non_blank(query.post_type),
            post_id: non_blank(query.post_id),
            parent,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadQuery {
    pub post_type: Option<String>,
    pub post_id: Option<String>,
}

impl From<ThreadQuery> for CommentFilter {
    fn from(query: ThreadQuery) -> Self {
        Self {
            post_type: non_blank(query.post_type),
            post_id: non_blank(query.post_id),
            parent: ParentFilter::Any,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateComment {
    pub content: Option<String>,
    pub parent_id: Option<String>,
    pub post_type: Option<String>,
    pub post_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateComment {
    pub content: Option<String>,
}

/// A listed comment; `liked` is present only when the viewer is known.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentEntry {
    #[serde(flatten)]
    pub comment: Comment,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liked: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadReply {
    #[serde(flatten)]
    pub comment: Comment,
    pub liked: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadRoot {
    #[serde(flatten)]
    pub comment: Comment,
    pub liked: bool,
    pub replies: Vec<ThreadReply>,
}

#[derive(Debug, Serialize)]
pub struct CommentResponse {
    pub comment: Comment,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LikeResponse {
    pub ok: bool,
    pub liked: bool,
    pub like_count: i64,
}

#[derive(Debug, Serialize)]
pub struct LikeStatusResponse {
    pub liked: bool,
}

#[derive(Debug, Serialize)]
pub struct DeleteCommentResponse {
    pub ok: bool,
    pub deleted: usize,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
