use axum::{
    Json, Router,
    extract::{Path, State},
    http::HeaderMap,
    routing::{delete, get},
};
use chrono::Utc;
use sqlx::{MySql, QueryBuilder};

use crate::{
    db::push_condition,
    error::{ApiJson, ApiQuery, ApiResult, AppError},
    models::{CreateRecord, ItemResponse, ListResponse, OkResponse, Record, RecordQuery, new_id},
    routes::{
        auth::{extract_current_user, non_blank},
        categories::ensure_category_exists,
    },
    state::AppState,
};

const RECORD_SELECT: &str =
    "SELECT id, user_id, item_name, category_id, weight_kg, location, created_at FROM records";

pub fn records_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_records).post(create_record))
        .route("/{id}", delete(delete_record))
}

async fn list_records(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiQuery(query): ApiQuery<RecordQuery>,
) -> ApiResult<Json<ListResponse<Record>>> {
    extract_current_user(&state, &headers).await?;

    let mut qb = QueryBuilder::<MySql>::new(RECORD_SELECT);
    let mut has_where = false;

    if let Some(user_id) = non_blank(query.user_id) {
        push_condition(&mut qb, &mut has_where);
        qb.push("user_id = ");
        qb.push_bind(user_id);
    }

    qb.push(" ORDER BY created_at DESC, id DESC");
    let list = qb.build_query_as::<Record>().fetch_all(&state.pool).await?;

    Ok(Json(ListResponse { list }))
}

async fn create_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(input): ApiJson<CreateRecord>,
) -> ApiResult<Json<ItemResponse<Record>>> {
    let actor = extract_current_user(&state, &headers).await?;

    let (Some(item_name), Some(category_id)) =
        (non_blank(input.item_name), non_blank(input.category_id))
    else {
        return Err(AppError::bad_request("itemName and categoryId are required"));
    };
    let weight_kg = match &input.weight_kg {
        Some(weight) => weight
            .kilograms()
            .ok_or_else(|| AppError::bad_request("weightKg must be a non-negative number"))?,
        None => 0.0,
    };
    ensure_category_exists(&state.pool, &category_id).await?;

    let record = Record {
        id: new_id(),
        user_id: actor.id,
        item_name,
        category_id,
        weight_kg,
        location: input.location.unwrap_or_default(),
        created_at: Utc::now(),
    };

    sqlx::query(
        r#"INSERT INTO records (id, user_id, item_name, category_id, weight_kg, location, created_at)
           VALUES (?, ?, ?, ?, ?, ?, ?)"#,
    )
    .bind(&record.id)
    .bind(&record.user_id)
    .bind(&record.item_name)
    .bind(&record.category_id)
    .bind(record.weight_kg)
    .bind(&record.location)
    .bind(record.created_at)
    .execute(&state.pool)
    .await?;

    Ok(Json(ItemResponse { item: record }))
}

async fn delete_record(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Json<OkResponse>> {
    let actor = extract_current_user(&state, &headers).await?;

    let (owner_id,): (String,) =
        sqlx::query_as("SELECT user_id FROM records WHERE id = ? LIMIT 1")
            .bind(&id)
            .fetch_optional(&state.pool)
            .await?
            .ok_or_else(|| AppError::not_found("Record not found"))?;

    if !actor.is_admin() && owner_id != actor.id {
        return Err(AppError::forbidden("You can only delete your own records"));
    }

    sqlx::query("DELETE FROM records WHERE id = ?")
        .bind(&id)
        .execute(&state.pool)
        .await?;

    Ok(Json(OkResponse::ok()))
}
