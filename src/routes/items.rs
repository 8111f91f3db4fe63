use axum::{
    Json, Router,
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, put},
};
use chrono::Utc;
use sqlx::{MySql, QueryBuilder};

use crate::{
    db::push_condition,
    error::{ApiJson, ApiQuery, ApiResult, AppError},
    models::{
        CreateItem, Item, ItemQuery, ItemResponse, ItemRow, ListResponse, OkResponse, UpdateItem,
        keywords_to_json, new_id, parse_keywords_json,
    },
    routes::{
        auth::{extract_current_user, non_blank},
        categories::ensure_category_exists,
    },
    state::AppState,
};

const ITEM_SELECT: &str = "SELECT id, name, category_id, keywords_json, created_at FROM items";

pub fn items_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_items).post(create_item))
        .route("/{id}", put(update_item).delete(delete_item))
}

async fn list_items(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<ItemQuery>,
) -> ApiResult<Json<ListResponse<Item>>> {
    extract_current_user(&state, &headers).await?;

    let mut qb = QueryBuilder::<MySql>::new(ITEM_SELECT);
    let mut has_where = false;

    if let Some(category_id) = non_blank(query.category_id) {
        push_condition(&mut qb, &mut has_where);
        qb.push("category_id = ");
        qb.push_bind(category_id);
    }
    if let Some(q) = non_blank(query.q) {
        push_condition(&mut qb, &mut has_where);
        qb.push("LOWER(name) LIKE ");
        qb.push_bind(contains_pattern(&q.to_lowercase()));
    }

    qb.push(" ORDER BY created_at DESC, id DESC");
    let rows = qb.build_query_as::<ItemRow>().fetch_all(&state.pool).await?;

    Ok(Json(ListResponse {
        list: rows.into_iter().map(Item::from).collect(),
    }))
}

async fn create_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(input): ApiJson<CreateItem>,
) -> ApiResult<Json<ItemResponse<Item>>> {
    extract_current_user(&state, &headers).await?;

    let (Some(name), Some(category_id)) = (non_blank(input.name), non_blank(input.category_id))
    else {
        return Err(AppError::bad_request("name and categoryId are required"));
    };
    ensure_category_exists(&state.pool, &category_id).await?;

    let item = Item {
        id: new_id(),
        name,
        category_id,
        keywords: input.keywords.map(|k| k.normalize()).unwrap_or_default(),
        created_at: Utc::now(),
    };

    sqlx::query(
        "INSERT INTO items (id, name, category_id, keywords_json, created_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&item.id)
    .bind(&item.name)
    .bind(&item.category_id)
    .bind(keywords_to_json(&item.keywords))
    .bind(item.created_at)
    .execute(&state.pool)
    .await?;

    Ok(Json(ItemResponse { item }))
}

async fn update_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    ApiJson(input): ApiJson<UpdateItem>,
) -> ApiResult<Json<ItemResponse<Item>>> {
    extract_current_user(&state, &headers).await?;

    let existing = sqlx::query_as::<_, ItemRow>(&format!("{ITEM_SELECT} WHERE id = ? LIMIT 1"))
        .bind(&id)
        .fetch_optional(&state.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Item not found"))?;

    let category_id = match non_blank(input.category_id) {
        Some(category_id) => {
            ensure_category_exists(&state.pool, &category_id).await?;
            category_id
        }
        None => existing.category_id,
    };

    let item = Item {
        id: existing.id,
        name: non_blank(input.name).unwrap_or(existing.name),
        category_id,
        keywords: match input.keywords {
            Some(keywords) => keywords.normalize(),
            None => parse_keywords_json(&existing.keywords_json),
        },
        created_at: existing.created_at,
    };

    sqlx::query("UPDATE items SET name = ?, category_id = ?, keywords_json = ? WHERE id = ?")
        .bind(&item.name)
        .bind(&item.category_id)
        .bind(keywords_to_json(&item.keywords))
        .bind(&item.id)
        .execute(&state.pool)
        .await?;

    Ok(Json(ItemResponse { item }))
}

async fn delete_item(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<OkResponse>> {
    extract_current_user(&state, &headers).await?;

    let result = sqlx::query("DELETE FROM items WHERE id = ?")
        .bind(&id)
        .execute(&state.pool)
        .await?;
    if result.rows_affected() == 0 {
        return Err(AppError::not_found("Item not found"));
    }

    Ok(Json(OkResponse::ok()))
}

/// `LIKE` pattern matching `needle` anywhere, with wildcards in it escaped.
fn contains_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(ch);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_text_is_matched_literally() {
        assert_eq!(contains_pattern("bottle"), "%bottle%");
        assert_eq!(contains_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(contains_pattern(r"a\b"), r"%a\\b%");
    }
}
