//! Comment operations with their validation and permission rules, generic over
//! the store so they run the same against MySQL and in tests.

use chrono::{DateTime, Utc};

use super::{CommentStore, LikeChange, tree::build_thread};
use crate::{
    error::{ApiResult, AppError, ensure_max_chars},
    models::{
        Comment, CommentEntry, CommentFilter, CreateComment, MAX_COMMENT_CHARS, MAX_POST_ID_CHARS,
        MAX_POST_TYPE_CHARS, NewComment, ThreadRoot, User, new_id,
    },
};

pub async fn list_comments<S: CommentStore>(
    store: &S,
    viewer: Option<&User>,
    filter: &CommentFilter,
) -> ApiResult<Vec<CommentEntry>> {
    let comments = store.list(filter).await?;

    let liked = match viewer {
        Some(user) => {
            let ids: Vec<String> = comments.iter().map(|c| c.id.clone()).collect();
            Some(store.liked_among(&user.id, &ids).await?)
        }
        None => None,
    };

    Ok(comments
        .into_iter()
        .map(|comment| CommentEntry {
            liked: liked.as_ref().map(|set| set.contains(&comment.id)),
            comment,
        })
        .collect())
}

pub async fn comment_thread<S: CommentStore>(
    store: &S,
    viewer: Option<&User>,
    filter: &CommentFilter,
) -> ApiResult<Vec<ThreadRoot>> {
    let comments = store.list(filter).await?;

    let liked = match viewer {
        Some(user) => {
            let ids: Vec<String> = comments.iter().map(|c| c.id.clone()).collect();
            store.liked_among(&user.id, &ids).await?
        }
        None => Default::default(),
    };

    Ok(build_thread(comments, &liked))
}

pub async fn create_comment<S: CommentStore>(
    store: &S,
    author: &User,
    input: CreateComment,
    now: DateTime<Utc>,
) -> ApiResult<Comment> {
    let (Some(raw_content), Some(post_type), Some(post_id)) = (
        input.content,
        required(input.post_type),
        required(input.post_id),
    ) else {
        return Err(AppError::bad_request(
            "content, postType and postId are required",
        ));
    };
    let content = validate_content(&raw_content)?;
    ensure_max_chars("postType", &post_type, MAX_POST_TYPE_CHARS)?;
    ensure_max_chars("postId", &post_id, MAX_POST_ID_CHARS)?;

    let parent_id = required(input.parent_id);
    if let Some(parent_id) = &parent_id {
        let parent = store
            .find(parent_id)
            .await?
            .filter(Comment::is_active)
            .ok_or_else(|| AppError::bad_request("Parent comment does not exist or was deleted"))?;

        if parent.post_type != post_type || parent.post_id != post_id {
            return Err(AppError::bad_request(
                "Parent comment belongs to a different post",
            ));
        }
    }

    let comment = store
        .insert(&NewComment {
            id: new_id(),
            user_id: author.id.clone(),
            content,
            parent_id,
            post_type,
            post_id,
            created_at: now,
        })
        .await?;

    tracing::debug!(comment_id = %comment.id, author = %author.id, "comment created");
    Ok(comment)
}

pub async fn update_comment<S: CommentStore>(
    store: &S,
    actor: &User,
    id: &str,
    content: Option<String>,
    now: DateTime<Utc>,
) -> ApiResult<Comment> {
    let content = validate_content(content.as_deref().unwrap_or_default())?;

    let comment = store
        .find(id)
        .await?
        .ok_or_else(|| AppError::not_found("Comment not found"))?;
    if !comment.is_active() {
        return Err(AppError::bad_request(
            "Comment was deleted and can no longer be edited",
        ));
    }
    ensure_can_modify(actor, &comment, "edit")?;

    store
        .update_content(id, &content, now)
        .await?
        .ok_or_else(|| AppError::not_found("Comment not found"))
}

/// Deletes the comment with its whole reply subtree; returns how many comments
/// were removed.
pub async fn delete_comment<S: CommentStore>(store: &S, actor: &User, id: &str) -> ApiResult<usize> {
    let comment = store
        .find(id)
        .await?
        .ok_or_else(|| AppError::not_found("Comment not found"))?;
    ensure_can_modify(actor, &comment, "delete")?;

    let removed = store.delete_subtree(id).await?;
    if removed.is_empty() {
        // lost a race with another delete
        return Err(AppError::not_found("Comment not found"));
    }

    tracing::info!(
        comment_id = id,
        removed = removed.len(),
        actor = %actor.id,
        "comment thread deleted"
    );
    Ok(removed.len())
}

pub async fn like_comment<S: CommentStore>(
    store: &S,
    actor: &User,
    id: &str,
    now: DateTime<Utc>,
) -> ApiResult<i64> {
    match store.add_like(id, &actor.id, now).await? {
        LikeChange::Applied { like_count } => Ok(like_count),
        LikeChange::CommentUnavailable => Err(unavailable()),
        LikeChange::AlreadyLiked | LikeChange::NotLiked => {
            Err(AppError::bad_request("You have already liked this comment"))
        }
    }
}

pub async fn unlike_comment<S: CommentStore>(
    store: &S,
    actor: &User,
    id: &str,
    now: DateTime<Utc>,
) -> ApiResult<i64> {
    match store.remove_like(id, &actor.id, now).await? {
        LikeChange::Applied { like_count } => Ok(like_count),
        LikeChange::CommentUnavailable => Err(unavailable()),
        LikeChange::NotLiked | LikeChange::AlreadyLiked => {
            Err(AppError::bad_request("You have not liked this comment"))
        }
    }
}

pub async fn like_status<S: CommentStore>(store: &S, actor: &User, id: &str) -> ApiResult<bool> {
    Ok(store.has_liked(id, &actor.id).await?)
}

/// Trims the content and enforces the length limit on what the client sent.
pub fn validate_content(raw: &str) -> ApiResult<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::bad_request("Comment content is required"));
    }
    if raw.chars().count() > MAX_COMMENT_CHARS {
        return Err(AppError::bad_request(format!(
            "Comment content must be at most {MAX_COMMENT_CHARS} characters"
        )));
    }
    Ok(trimmed.to_string())
}

fn ensure_can_modify(actor: &User, comment: &Comment, action: &str) -> ApiResult<()> {
    if actor.is_admin() || comment.user_id == actor.id {
        Ok(())
    } else {
        Err(AppError::forbidden(format!(
            "You are not allowed to {action} this comment"
        )))
    }
}

fn unavailable() -> AppError {
    AppError::not_found("Comment does not exist or was deleted")
}

fn required(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::http::StatusCode;
    use chrono::TimeDelta;
    use rstest::rstest;
    use tokio::task::JoinSet;

    use super::*;
    use crate::comments::memory::MemoryCommentStore;
    use crate::models::{CommentStatus, ParentFilter, Role};

    fn user(id: &str, role: Role) -> User {
        User {
            id: id.to_string(),
            username: format!("{id}-name"),
            email: None,
            phone: None,
            password_hash: String::new(),
            role: role.as_str().to_string(),
            created_at: Utc::now(),
        }
    }

    fn store() -> MemoryCommentStore {
        MemoryCommentStore::new()
            .with_user("alice", "alice-name")
            .with_user("bob", "bob-name")
    }

    fn input(content: &str, parent_id: Option<&str>) -> CreateComment {
        CreateComment {
            content: Some(content.to_string()),
            parent_id: parent_id.map(str::to_string),
            post_type: Some("notice".to_string()),
            post_id: Some("n1".to_string()),
        }
    }

    fn thread_filter() -> CommentFilter {
        CommentFilter {
            post_type: Some("notice".to_string()),
            post_id: Some("n1".to_string()),
            parent: ParentFilter::Any,
        }
    }

    async fn post(store: &MemoryCommentStore, author: &User, parent: Option<&str>, at: i64) -> Comment {
        let now = Utc::now() + TimeDelta::seconds(at);
        create_comment(store, author, input("hello", parent), now)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn new_comment_starts_active_with_no_likes() {
        let store = store();
        let alice = user("alice", Role::User);

        let comment = create_comment(&store, &alice, input("  sort glass  ", None), Utc::now())
            .await
            .unwrap();

        assert_eq!(comment.content, "sort glass");
        assert_eq!(comment.like_count, 0);
        assert_eq!(comment.status, CommentStatus::Active.as_str());
        assert_eq!(comment.user_name.as_deref(), Some("alice-name"));
        assert_eq!(comment.id.len(), 32);
    }

    #[rstest]
    #[case::too_long("x".repeat(MAX_COMMENT_CHARS + 1), "notice".to_string(), "n1".to_string())]
    #[case::blank("   ".to_string(), "notice".to_string(), "n1".to_string())]
    #[case::empty(String::new(), "notice".to_string(), "n1".to_string())]
    #[case::post_type_too_long(
        "hello".to_string(),
        "t".repeat(MAX_POST_TYPE_CHARS + 1),
        "n1".to_string()
    )]
    #[case::post_id_too_long(
        "hello".to_string(),
        "notice".to_string(),
        "p".repeat(MAX_POST_ID_CHARS + 1)
    )]
    #[tokio::test]
    async fn invalid_input_is_rejected_without_a_row(
        #[case] content: String,
        #[case] post_type: String,
        #[case] post_id: String,
    ) {
        let store = store();
        let alice = user("alice", Role::User);
        let body = CreateComment {
            content: Some(content),
            parent_id: None,
            post_type: Some(post_type),
            post_id: Some(post_id),
        };

        let err = create_comment(&store, &alice, body, Utc::now())
            .await
            .unwrap_err();

        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.comment_count(), 0);
    }

    #[tokio::test]
    async fn target_fields_up_to_their_column_width_are_accepted() {
        let store = store();
        let alice = user("alice", Role::User);
        let body = CreateComment {
            content: Some("hello".to_string()),
            parent_id: None,
            post_type: Some("t".repeat(MAX_POST_TYPE_CHARS)),
            post_id: Some("p".repeat(MAX_POST_ID_CHARS)),
        };

        let comment = create_comment(&store, &alice, body, Utc::now())
            .await
            .unwrap();

        assert_eq!(comment.post_type.len(), MAX_POST_TYPE_CHARS);
        assert_eq!(comment.post_id.len(), MAX_POST_ID_CHARS);
    }

    #[tokio::test]
    async fn limit_counts_characters_not_bytes() {
        let store = store();
        let alice = user("alice", Role::User);
        let content = "垃".repeat(MAX_COMMENT_CHARS);

        let comment = create_comment(&store, &alice, input(&content, None), Utc::now())
            .await
            .unwrap();

        assert_eq!(comment.content.chars().count(), MAX_COMMENT_CHARS);
    }

    #[tokio::test]
    async fn missing_target_fields_are_rejected() {
        let store = store();
        let alice = user("alice", Role::User);
        let mut body = input("hello", None);
        body.post_id = Some(" ".to_string());

        let err = create_comment(&store, &alice, body, Utc::now())
            .await
            .unwrap_err();

        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn reply_needs_a_live_parent_on_the_same_post() {
        let store = store();
        let alice = user("alice", Role::User);
        let root = post(&store, &alice, None, 0).await;

        let missing = create_comment(&store, &alice, input("hi", Some("nope")), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(missing.status(), StatusCode::BAD_REQUEST);

        let mut elsewhere = input("hi", Some(&root.id));
        elsewhere.post_id = Some("n2".to_string());
        let err = create_comment(&store, &alice, elsewhere, Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let reply = create_comment(&store, &alice, input("hi", Some(&root.id)), Utc::now())
            .await
            .unwrap();
        assert_eq!(reply.parent_id.as_deref(), Some(root.id.as_str()));
    }

    #[tokio::test]
    async fn only_author_or_admin_may_edit() {
        let store = store();
        let alice = user("alice", Role::User);
        let bob = user("bob", Role::User);
        let admin = user("root", Role::Admin);
        let comment = post(&store, &alice, None, 0).await;

        let err = update_comment(&store, &bob, &comment.id, Some("hijack".into()), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(store.find(&comment.id).await.unwrap().unwrap().content, "hello");

        let edited = update_comment(&store, &alice, &comment.id, Some("mine".into()), Utc::now())
            .await
            .unwrap();
        assert_eq!(edited.content, "mine");

        let moderated = update_comment(&store, &admin, &comment.id, Some("tidy".into()), Utc::now())
            .await
            .unwrap();
        assert_eq!(moderated.content, "tidy");
    }

    #[tokio::test]
    async fn editing_checks_existence_status_and_length() {
        let store = store();
        let alice = user("alice", Role::User);

        let err = update_comment(&store, &alice, "nope", Some("x".into()), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);

        let mut hidden = post(&store, &alice, None, 0).await;
        hidden.id = "hidden".to_string();
        hidden.status = CommentStatus::Deleted.as_str().to_string();
        store.put_raw(hidden);
        let err = update_comment(&store, &alice, "hidden", Some("x".into()), Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let comment = post(&store, &alice, None, 1).await;
        let err = update_comment(
            &store,
            &alice,
            &comment.id,
            Some("y".repeat(MAX_COMMENT_CHARS + 1)),
            Utc::now(),
        )
        .await
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn deleting_a_root_removes_every_reply_and_like() {
        let store = store();
        let alice = user("alice", Role::User);
        let bob = user("bob", Role::User);
        let root = post(&store, &alice, None, 0).await;
        let first = post(&store, &bob, Some(&root.id), 1).await;
        let nested = post(&store, &alice, Some(&first.id), 2).await;
        post(&store, &bob, Some(&root.id), 3).await;
        let unrelated = post(&store, &bob, None, 4).await;

        like_comment(&store, &bob, &nested.id, Utc::now()).await.unwrap();
        like_comment(&store, &alice, &root.id, Utc::now()).await.unwrap();
        like_comment(&store, &alice, &unrelated.id, Utc::now()).await.unwrap();

        let removed = delete_comment(&store, &alice, &root.id).await.unwrap();

        assert_eq!(removed, 4);
        assert_eq!(store.comment_count(), 1);
        assert_eq!(store.total_like_rows(), 1);
        assert!(store.find(&unrelated.id).await.unwrap().is_some());

        let err = like_comment(&store, &bob, &nested.id, Utc::now())
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_permissions_and_missing_comment() {
        let store = store();
        let alice = user("alice", Role::User);
        let bob = user("bob", Role::User);
        let admin = user("root", Role::Admin);
        let comment = post(&store, &alice, None, 0).await;

        let err = delete_comment(&store, &bob, &comment.id).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
        assert_eq!(store.comment_count(), 1);

        assert_eq!(delete_comment(&store, &admin, &comment.id).await.unwrap(), 1);

        let err = delete_comment(&store, &admin, &comment.id).await.unwrap_err();
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn liking_twice_fails_and_leaves_the_count() {
        let store = store();
        let alice = user("alice", Role::User);
        let bob = user("bob", Role::User);
        let comment = post(&store, &alice, None, 0).await;

        assert_eq!(like_comment(&store, &bob, &comment.id, Utc::now()).await.unwrap(), 1);
        let err = like_comment(&store, &bob, &comment.id, Utc::now())
            .await
            .unwrap_err();

        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.find(&comment.id).await.unwrap().unwrap().like_count, 1);
        assert_eq!(store.like_rows(&comment.id), 1);
        assert!(like_status(&store, &bob, &comment.id).await.unwrap());
        assert!(!like_status(&store, &alice, &comment.id).await.unwrap());
    }

    #[tokio::test]
    async fn unliking_without_a_like_fails() {
        let store = store();
        let alice = user("alice", Role::User);
        let comment = post(&store, &alice, None, 0).await;

        let err = unlike_comment(&store, &alice, &comment.id, Utc::now())
            .await
            .unwrap_err();

        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(store.find(&comment.id).await.unwrap().unwrap().like_count, 0);
    }

    #[tokio::test]
    async fn like_count_tracks_like_rows() {
        let store = store();
        let alice = user("alice", Role::User);
        let comment = post(&store, &alice, None, 0).await;
        let voters: Vec<User> = (0..5).map(|i| user(&format!("v{i}"), Role::User)).collect();

        for voter in &voters {
            like_comment(&store, voter, &comment.id, Utc::now()).await.unwrap();
        }
        for voter in voters.iter().step_by(2) {
            unlike_comment(&store, voter, &comment.id, Utc::now()).await.unwrap();
        }
        let _ = unlike_comment(&store, &voters[0], &comment.id, Utc::now()).await;
        let _ = like_comment(&store, &voters[1], &comment.id, Utc::now()).await;

        let stored = store.find(&comment.id).await.unwrap().unwrap();
        assert_eq!(stored.like_count, 2);
        assert_eq!(stored.like_count as usize, store.like_rows(&comment.id));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_likes_from_different_users_all_count() {
        const VOTERS: usize = 16;

        let store = Arc::new(store());
        let alice = user("alice", Role::User);
        let comment = post(&store, &alice, None, 0).await;

        let mut likes = JoinSet::new();
        for i in 0..VOTERS {
            let store = Arc::clone(&store);
            let comment_id = comment.id.clone();
            likes.spawn(async move {
                let voter = user(&format!("voter{i}"), Role::User);
                like_comment(&*store, &voter, &comment_id, Utc::now()).await
            });
        }
        while let Some(joined) = likes.join_next().await {
            joined.unwrap().unwrap();
        }

        let stored = store.find(&comment.id).await.unwrap().unwrap();
        assert_eq!(stored.like_count as usize, VOTERS);
        assert_eq!(store.like_rows(&comment.id), VOTERS);
    }

    #[tokio::test]
    async fn viewer_like_state_is_attached_to_listings() {
        let store = store();
        let alice = user("alice", Role::User);
        let bob = user("bob", Role::User);
        let older = post(&store, &alice, None, 0).await;
        let newer = post(&store, &alice, None, 1).await;
        like_comment(&store, &bob, &older.id, Utc::now()).await.unwrap();

        let filter = CommentFilter {
            parent: ParentFilter::Roots,
            ..thread_filter()
        };
        let anonymous = list_comments(&store, None, &filter).await.unwrap();
        assert!(anonymous.iter().all(|entry| entry.liked.is_none()));

        let listed = list_comments(&store, Some(&bob), &filter).await.unwrap();
        assert_eq!(listed[0].comment.id, newer.id);
        assert_eq!(listed[0].liked, Some(false));
        assert_eq!(listed[1].liked, Some(true));
    }

    #[tokio::test]
    async fn thread_nests_replies_under_roots() {
        let store = store();
        let alice = user("alice", Role::User);
        let a = post(&store, &alice, None, 1).await;
        let b = post(&store, &alice, None, 2).await;
        let c = post(&store, &alice, Some(&a.id), 3).await;

        let thread = comment_thread(&store, Some(&alice), &thread_filter())
            .await
            .unwrap();

        let roots: Vec<&str> = thread.iter().map(|r| r.comment.id.as_str()).collect();
        assert_eq!(roots, vec![b.id.as_str(), a.id.as_str()]);
        assert_eq!(thread[1].replies.len(), 1);
        assert_eq!(thread[1].replies[0].comment.id, c.id);
    }
}
