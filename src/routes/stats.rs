use axum::{Json, Router, extract::State, http::HeaderMap, routing::get};
use sqlx::MySqlPool;

use crate::{
    error::ApiResult,
    models::{CategoryRecordCount, StatsResponse, Totals},
    routes::auth::extract_current_user,
    state::AppState,
};

pub fn stats_routes() -> Router<AppState> {
    Router::new().route("/", get(get_stats))
}

async fn get_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<StatsResponse>> {
    extract_current_user(&state, &headers).await?;

    let totals = Totals {
        category_count: count_rows(&state.pool, "categories").await?,
        item_count: count_rows(&state.pool, "items").await?,
        record_count: count_rows(&state.pool, "records").await?,
        user_count: count_rows(&state.pool, "users").await?,
    };

    let records_by_category = sqlx::query_as::<_, CategoryRecordCount>(
        r#"
        SELECT c.id AS category_id, c.name AS category_name, COUNT(r.id) AS count
        FROM categories c
        LEFT JOIN records r ON r.category_id = c.id
        GROUP BY c.id, c.name, c.created_at
        ORDER BY c.created_at DESC, c.id DESC
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(StatsResponse {
        totals,
        records_by_category,
    }))
}

async fn count_rows(pool: &MySqlPool, table: &'static str) -> Result<i64, sqlx::Error> {
    let (count,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
        .fetch_one(pool)
        .await?;
    Ok(count)
}
