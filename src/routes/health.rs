use axum::{Json, Router, routing::get};
use serde_json::{Value, json};

use crate::state::AppState;

pub fn health_routes() -> Router<AppState> {
    Router::new().route("/", get(health_check))
}

async fn health_check() -> Json<Value> {
    Json(json!({"status": "ok"}))
}
