//! REST API of the waste-sorting platform: accounts and login captchas,
//! sorting categories and the item knowledge base, drop-off records, notices,
//! statistics and threaded comments, all stored in MySQL.

pub mod captcha;
pub mod comments;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod state;

use std::any::Any;

use axum::{
    Json, Router,
    extract::State,
    http::{StatusCode, Uri},
    response::{Html, IntoResponse, Response},
};
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{self, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};

use routes::{
    auth_routes, categories_routes, comments_routes, health_routes, items_routes, notices_routes,
    records_routes, stats_routes, users_routes,
};
use state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(cors::Any)
        .allow_methods(cors::Any)
        .allow_headers(cors::Any);

    let api_routes = Router::new()
        .nest("/api/health", health_routes())
        .nest("/api/auth", auth_routes())
        .nest("/api/categories", categories_routes())
        .nest("/api/items", items_routes())
        .nest("/api/records", records_routes())
        .nest("/api/notices", notices_routes())
        .nest("/api/users", users_routes())
        .nest("/api/stats", stats_routes())
        .nest("/api/comments", comments_routes());

    let mut app = Router::new().merge(api_routes);
    if let Some(static_dir) = &state.config.static_dir {
        app = app.nest_service("/assets", ServeDir::new(static_dir.join("assets")));
    }

    app.fallback(serve_spa)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Unknown API paths get a JSON 404; everything else is a client-side route
/// of the frontend.
async fn serve_spa(State(state): State<AppState>, uri: Uri) -> Response {
    if uri.path().starts_with("/api/") {
        return (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({"message": "Not found"})),
        )
            .into_response();
    }

    let index = match &state.config.static_dir {
        Some(dir) => tokio::fs::read_to_string(dir.join("index.html")).await.ok(),
        None => None,
    };

    match index {
        Some(html) => Html(html).into_response(),
        None => Json(serde_json::json!({
            "message": "Waste sorting platform API",
            "health": "/api/health"
        }))
        .into_response(),
    }
}

fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s
    } else {
        "unknown panic"
    };
    tracing::error!(panic = detail, "handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({"message": "Internal server error"})),
    )
        .into_response()
}
