use axum::{
    Json, Router,
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, put},
};
use chrono::Utc;
use sqlx::MySqlPool;

use crate::{
    error::{ApiJson, ApiResult, AppError, is_foreign_key_violation},
    models::{Category, CreateCategory, ItemResponse, ListResponse, OkResponse, UpdateCategory, new_id},
    routes::auth::{extract_current_user, non_blank},
    state::AppState,
};

pub fn categories_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_categories).post(create_category))
        .route("/{id}", put(update_category).delete(delete_category))
}

async fn list_categories(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<ListResponse<Category>>> {
    extract_current_user(&state, &headers).await?;

    let list = sqlx::query_as::<_, Category>(
        "SELECT id, name, description, created_at FROM categories ORDER BY created_at DESC, id DESC",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(ListResponse { list }))
}

async fn create_category(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(input): ApiJson<CreateCategory>,
) -> ApiResult<Json<ItemResponse<Category>>> {
    extract_current_user(&state, &headers).await?;

    let name = non_blank(input.name).ok_or_else(|| AppError::bad_request("name is required"))?;
    let category = Category {
        id: new_id(),
        name,
        description: input.description.unwrap_or_default(),
        created_at: Utc::now(),
    };

    sqlx::query("INSERT INTO categories (id, name, description, created_at) VALUES (?, ?, ?, ?)")
        .bind(&category.id)
        .bind(&category.name)
        .bind(&category.description)
        .bind(category.created_at)
        .execute(&state.pool)
        .await?;

    Ok(Json(ItemResponse { item: category }))
}

async fn update_category(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<UpdateCategory>,
) -> ApiResult<Json<ItemResponse<Category>>> {
    extract_current_user(&state, &headers).await?;

    let existing = sqlx::query_as::<_, Category>(
        "SELECT id, name, description, created_at FROM categories WHERE id = ? LIMIT 1",
    )
    .bind(&id)
    .fetch_optional(&state.pool)
    .await?
    .ok_or_else(|| AppError::not_found("Category not found"))?;

    let category = Category {
        name: non_blank(input.name).unwrap_or(existing.name),
        description: input.description.unwrap_or(existing.description),
        ..existing
    };

    sqlx::query("UPDATE categories SET name = ?, description = ? WHERE id = ?")
        .bind(&category.name)
        .bind(&category.description)
        .bind(&category.id)
        .execute(&state.pool)
        .await?;

    Ok(Json(ItemResponse { item: category }))
}

async fn delete_category(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<OkResponse>> {
    let actor = extract_current_user(&state, &headers).await?;

    let result = sqlx::query("DELETE FROM categories WHERE id = ?")
        .bind(&id)
        .execute(&state.pool)
        .await
        .map_err(|e| {
            if is_foreign_key_violation(&e) {
                AppError::conflict("Category still has drop-off records")
            } else {
                e.into()
            }
        })?;

    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Category not found"));
    }

    tracing::info!(category_id = %id, actor = %actor.id, "category deleted");
    Ok(Json(OkResponse::ok()))
}

/// 400 unless the category exists; items and records reference categories.
pub async fn ensure_category_exists(pool: &MySqlPool, id: &str) -> ApiResult<()> {
    let found: Option<(String,)> = sqlx::query_as("SELECT id FROM categories WHERE id = ? LIMIT 1")
        .bind(id)
        .fetch_optional(pool)
        .await?;

    found
        .map(|_| ())
        .ok_or_else(|| AppError::bad_request("Unknown categoryId"))
}
