use axum::{
    Json, Router,
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, put},
};
use chrono::Utc;

use crate::{
    error::{ApiJson, ApiResult, AppError},
    models::{
        CreateNotice, DEFAULT_NOTICE_TYPE, ItemResponse, ListResponse, Notice, OkResponse,
        UpdateNotice, new_id,
    },
    routes::auth::{extract_current_user, non_blank},
    state::AppState,
};

const NOTICE_SELECT: &str =
    "SELECT id, title, content, type, is_urgent, created_by, created_at FROM notices";

pub fn notices_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_notices).post(create_notice))
        .route("/{id}", put(update_notice).delete(delete_notice))
}

async fn list_notices(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<ListResponse<Notice>>> {
    extract_current_user(&state, &headers).await?;

    let list = sqlx::query_as::<_, Notice>(&format!(
        "{NOTICE_SELECT} ORDER BY created_at DESC, id DESC"
    ))
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(ListResponse { list }))
}

async fn create_notice(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(input): ApiJson<CreateNotice>,
) -> ApiResult<Json<ItemResponse<Notice>>> {
    let actor = extract_current_user(&state, &headers).await?;

    let title = non_blank(input.title).ok_or_else(|| AppError::bad_request("title is required"))?;
    let notice = Notice {
        id: new_id(),
        title,
        content: input.content.unwrap_or_default(),
        notice_type: non_blank(input.notice_type)
            .unwrap_or_else(|| DEFAULT_NOTICE_TYPE.to_string()),
        is_urgent: input.is_urgent.unwrap_or(false),
        created_by: actor.username,
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"INSERT INTO notices (id, title, content, type, is_urgent, created_by, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&notice.id)
    .bind(&notice.title)
    .bind(&notice.content)
    .bind(&notice.notice_type)
    .bind(notice.is_urgent)
    .bind(&notice.created_by)
    .bind(notice.created_at)
    .execute(&state.pool)
    .await?;

    Ok(Json(ItemResponse { item: notice }))
}

async fn update_notice(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<UpdateNotice>,
) -> ApiResult<Json<ItemResponse<Notice>>> {
    extract_current_user(&state, &headers).await?;

    let existing = sqlx::query_as::<_, Notice>(&format!("{NOTICE_SELECT} WHERE id = ? LIMIT 1"))
        .bind(&id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Notice not found"))?;

    let notice = Notice {
        title: non_blank(input.title).unwrap_or(existing.title),
        content: input.content.unwrap_or(existing.content),
        notice_type: non_blank(input.notice_type).unwrap_or(existing.notice_type),
        is_urgent: input.is_urgent.unwrap_or(existing.is_urgent),
        ..existing
    };

    sqlx::query("UPDATE notices SET title = ?, content = ?, type = ?, is_urgent = ? WHERE id = ?")
        .bind(&notice.title)
        .bind(&notice.content)
        .bind(&notice.notice_type)
        .bind(notice.is_urgent)
        .bind(&notice.id)
        .execute(&state.pool)
        .await?;

    Ok(Json(ItemResponse { item: notice }))
}

async fn delete_notice(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<OkResponse>> {
    extract_current_user(&state, &headers).await?;

    let result = sqlx::query("DELETE FROM notices WHERE id = ?")
        .bind(&id)
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Notice not found"));
    }

    Ok(Json(OkResponse::ok()))
}
