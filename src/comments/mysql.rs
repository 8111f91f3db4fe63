use std::collections::HashSet;

use chrono::{DateTime, Utc};
use sqlx::{MySql, MySqlConnection, MySqlPool, QueryBuilder};

use super::{CommentStore, LikeChange, subtree::SubtreeWalk};
use crate::error::is_unique_violation;
use crate::models::{Comment, CommentFilter, CommentStatus, NewComment, ParentFilter, new_id};

const COMMENT_SELECT: &str = r#"
    SELECT
        c.id,
        c.user_id,
        u.username AS user_name,
        c.content,
        c.parent_id,
        c.post_type,
        c.post_id,
        c.like_count,
        c.status,
        c.created_at,
        c.updated_at
    FROM comments c
    LEFT JOIN users u ON u.id = c.user_id
"#;

/// Upper bound on ids bound into a single `IN (...)` list.
const ID_CHUNK: usize = 500;

#[derive(Debug, Clone)]
pub struct MySqlCommentStore {
    pool: MySqlPool,
}

impl MySqlCommentStore {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

impl CommentStore for MySqlCommentStore {
    async fn find(&self, id: &str) -> Result<Option<Comment>, sqlx::Error> {
        sqlx::query_as::<_, Comment>(&format!("{COMMENT_SELECT} WHERE c.id = ? LIMIT 1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn list(&self, filter: &CommentFilter) -> Result<Vec<Comment>, sqlx::Error> {
        let mut qb = QueryBuilder::<MySql>::new(COMMENT_SELECT);
        qb.push(" WHERE c.status = ");
        qb.push_bind(CommentStatus::Active.as_str());

        if let Some(post_type) = &filter.post_type {
            qb.push(" AND c.post_type = ");
            qb.push_bind(post_type.as_str());
        }
        if let Some(post_id) = &filter.post_id {
            qb.push(" AND c.post_id = ");
            qb.push_bind(post_id.as_str());
        }
        match &filter.parent {
            ParentFilter::Any => {}
            ParentFilter::Roots => {
                qb.push(" AND c.parent_id IS NULL");
            }
            ParentFilter::ChildrenOf(parent_id) => {
                qb.push(" AND c.parent_id = ");
                qb.push_bind(parent_id.as_str());
            }
        }

        qb.push(" ORDER BY c.created_at DESC, c.id DESC");
        qb.build_query_as::<Comment>().fetch_all(&self.pool).await
    }

    async fn insert(&self, comment: &NewComment) -> Result<Comment, sqlx::Error> {
        sqlx::query(
            r#"INSERT INTO comments
                   (id, user_id, content, parent_id, post_type, post_id, like_count, status, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, 0, ?, ?, ?)"#,
        )
        .bind(&comment.id)
        .bind(&comment.user_id)
        .bind(&comment.content)
        .bind(&comment.parent_id)
        .bind(&comment.post_type)
        .bind(&comment.post_id)
        .bind(CommentStatus::Active.as_str())
        .bind(comment.created_at)
        .bind(comment.created_at)
        .execute(&self.pool)
        .await?;

        self.find(&comment.id)
            .await?
            .ok_or(sqlx::Error::RowNotFound)
    }

    async fn update_content(
        &self,
        id: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Comment>, sqlx::Error> {
        sqlx::query("UPDATE comments SET content = ?, updated_at = ? WHERE id = ?")
            .bind(content)
            .bind(now)
            .bind(id)
            .execute(&self.pool)
            .await?;

        self.find(id).await
    }

    async fn delete_subtree(&self, root_id: &str) -> Result<Vec<String>, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let root: Option<(String,)> =
            sqlx::query_as("SELECT id FROM comments WHERE id = ? FOR UPDATE")
                .bind(root_id)
                .fetch_optional(&mut *tx)
                .await?;
        if root.is_none() {
            return Ok(Vec::new());
        }

        let mut walk = SubtreeWalk::new(root_id);
        loop {
            let frontier = walk.frontier().to_vec();
            let mut children = Vec::new();
            for chunk in frontier.chunks(ID_CHUNK) {
                let mut qb = QueryBuilder::<MySql>::new("SELECT id FROM comments WHERE parent_id IN ");
                push_id_list(&mut qb, chunk);
                qb.push(" FOR UPDATE");
                let rows: Vec<(String,)> = qb.build_query_as().fetch_all(&mut *tx).await?;
                children.extend(rows.into_iter().map(|(id,)| id));
            }
            if !walk.push_level(children) {
                break;
            }
        }

        let levels = walk.into_levels_deepest_first();
        for level in &levels {
            for chunk in level.chunks(ID_CHUNK) {
                let mut likes_qb =
                    QueryBuilder::<MySql>::new("DELETE FROM comment_likes WHERE comment_id IN ");
                push_id_list(&mut likes_qb, chunk);
                likes_qb.build().execute(&mut *tx).await?;

                let mut comments_qb = QueryBuilder::<MySql>::new("DELETE FROM comments WHERE id IN ");
                push_id_list(&mut comments_qb, chunk);
                comments_qb.build().execute(&mut *tx).await?;
            }
        }

        tx.commit().await?;

        let removed: Vec<String> = levels.into_iter().flatten().collect();
        tracing::debug!(root_id, collected = removed.len(), "comment subtree removed");
        Ok(removed)
    }

    async fn add_like(
        &self,
        comment_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<LikeChange, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        if !lock_active_comment(&mut tx, comment_id).await? {
            return Ok(LikeChange::CommentUnavailable);
        }

        let existing: Option<(String,)> = sqlx::query_as(
            "SELECT id FROM comment_likes WHERE comment_id = ? AND user_id = ? LIMIT 1",
        )
        .bind(comment_id)
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await?;
        if existing.is_some() {
            return Ok(LikeChange::AlreadyLiked);
        }

        let inserted = sqlx::query(
            "INSERT INTO comment_likes (id, comment_id, user_id, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(new_id())
        .bind(comment_id)
        .bind(user_id)
        .bind(now)
        .execute(&mut *tx)
        .await;
        match inserted {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => return Ok(LikeChange::AlreadyLiked),
            Err(e) => return Err(e),
        }

        sqlx::query("UPDATE comments SET like_count = like_count + 1, updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(comment_id)
            .execute(&mut *tx)
            .await?;

        let like_count = current_like_count(&mut tx, comment_id).await?;
        tx.commit().await?;

        Ok(LikeChange::Applied { like_count })
    }

    async fn remove_like(
        &self,
        comment_id: &str,
        user_id: &str,
        now: DateTime<Utc>,
    ) -> Result<LikeChange, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        if !lock_active_comment(&mut tx, comment_id).await? {
            return Ok(LikeChange::CommentUnavailable);
        }

        let removed = sqlx::query("DELETE FROM comment_likes WHERE comment_id = ? AND user_id = ?")
            .bind(comment_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;
        if removed.rows_affected() == 0 {
            return Ok(LikeChange::NotLiked);
        }

        sqlx::query(
            "UPDATE comments SET like_count = GREATEST(like_count - 1, 0), updated_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(comment_id)
        .execute(&mut *tx)
        .await?;

        let like_count = current_like_count(&mut tx, comment_id).await?;
        tx.commit().await?;

        Ok(LikeChange::Applied { like_count })
    }

    async fn has_liked(&self, comment_id: &str, user_id: &str) -> Result<bool, sqlx::Error> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM comment_likes WHERE comment_id = ? AND user_id = ?",
        )
        .bind(comment_id)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(count > 0)
    }

    async fn liked_among(
        &self,
        user_id: &str,
        comment_ids: &[String],
    ) -> Result<HashSet<String>, sqlx::Error> {
        let mut liked = HashSet::new();
        for chunk in comment_ids.chunks(ID_CHUNK) {
            let mut qb = QueryBuilder::<MySql>::new(
                "SELECT comment_id FROM comment_likes WHERE user_id = ",
            );
            qb.push_bind(user_id);
            qb.push(" AND comment_id IN ");
            push_id_list(&mut qb, chunk);

            let rows: Vec<(String,)> = qb.build_query_as().fetch_all(&self.pool).await?;
            liked.extend(rows.into_iter().map(|(id,)| id));
        }
        Ok(liked)
    }
}

/// Takes the row lock on the comment; `false` when it is missing or inactive.
async fn lock_active_comment(conn: &mut MySqlConnection, id: &str) -> Result<bool, sqlx::Error> {
    let row: Option<(String,)> = sqlx::query_as("SELECT status FROM comments WHERE id = ? FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(matches!(row, Some((status,)) if status == CommentStatus::Active.as_str()))
}

async fn current_like_count(conn: &mut MySqlConnection, id: &str) -> Result<i64, sqlx::Error> {
    let (like_count,): (i64,) = sqlx::query_as("SELECT like_count FROM comments WHERE id = ?")
        .bind(id)
        .fetch_one(&mut *conn)
        .await?;
    Ok(like_count)
}

fn push_id_list<'args>(qb: &mut QueryBuilder<'args, MySql>, ids: &'args [String]) {
    qb.push("(");
    {
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(id.as_str());
        }
    }
    qb.push(")");
}
