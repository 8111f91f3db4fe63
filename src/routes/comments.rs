use axum::{
    Json, Router,
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post, put},
};
use chrono::Utc;

use crate::{
    comments::service,
    error::{ApiJson, ApiQuery, ApiResult},
    models::{
        CommentEntry, CommentFilter, CommentQuery, CommentResponse, CreateComment,
        DeleteCommentResponse, LikeResponse, LikeStatusResponse, ListResponse, ThreadQuery,
        ThreadRoot, UpdateComment,
    },
    routes::auth::{extract_current_user, extract_optional_user},
    state::AppState,
};

pub fn comments_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_comments).post(create_comment))
        .route("/thread", get(comment_thread))
        .route("/{id}", put(update_comment).delete(delete_comment))
        .route("/{id}/like", post(like_comment).delete(unlike_comment))
        .route("/{id}/like/status", get(like_status))
}

async fn list_comments(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<CommentQuery>,
) -> ApiResult<Json<ListResponse<CommentEntry>>> {
    let viewer = extract_optional_user(&state, &headers).await?;
    let filter = CommentFilter::from(query);

    let list = service::list_comments(&state.comments(), viewer.as_ref(), &filter).await?;
    Ok(Json(ListResponse { list }))
}

async fn comment_thread(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<ThreadQuery>,
) -> ApiResult<Json<ListResponse<ThreadRoot>>> {
    let viewer = extract_optional_user(&state, &headers).await?;
    let filter = CommentFilter::from(query);

    let list = service::comment_thread(&state.comments(), viewer.as_ref(), &filter).await?;
    Ok(Json(ListResponse { list }))
}

async fn create_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(input): ApiJson<CreateComment>,
) -> ApiResult<Json<CommentResponse>> {
    let author = extract_current_user(&state, &headers).await?;

    let comment = service::create_comment(&state.comments(), &author, input, Utc::now()).await?;
    Ok(Json(CommentResponse { comment }))
}

async fn update_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<UpdateComment>,
) -> ApiResult<Json<CommentResponse>> {
    let actor = extract_current_user(&state, &headers).await?;

    let comment =
        service::update_comment(&state.comments(), &actor, &id, input.content, Utc::now()).await?;
    Ok(Json(CommentResponse { comment }))
}

async fn delete_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<DeleteCommentResponse>> {
    let actor = extract_current_user(&state, &headers).await?;

    let deleted = service::delete_comment(&state.comments(), &actor, &id).await?;
    Ok(Json(DeleteCommentResponse { ok: true, deleted }))
}

async fn like_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<LikeResponse>> {
    let actor = extract_current_user(&state, &headers).await?;

    let like_count = service::like_comment(&state.comments(), &actor, &id, Utc::now()).await?;
    Ok(Json(LikeResponse {
        ok: true,
        liked: true,
        like_count,
    }))
}

async fn unlike_comment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<LikeResponse>> {
    let actor = extract_current_user(&state, &headers).await?;

    let like_count = service::unlike_comment(&state.comments(), &actor, &id, Utc::now()).await?;
    Ok(Json(LikeResponse {
        ok: true,
        liked: false,
        like_count,
    }))
}

async fn like_status(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<LikeStatusResponse>> {
    let actor = extract_current_user(&state, &headers).await?;

    let liked = service::like_status(&state.comments(), &actor, &id).await?;
    Ok(Json(LikeStatusResponse { liked }))
}
