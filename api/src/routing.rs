//! 路由

use std::sync::Arc;

use anybiz_config::AppConfig;
use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{Html, IntoResponse},
    routing::get,
};

/// 首页与健康检查路由
pub fn index_routes(config: Arc<AppConfig>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/ping", get(ping))
        .route("/alive", get(alive))
        .route("/ready", get(ready))
        .fallback(not_found)
        .with_state(config)
}

async fn index(State(config): State<Arc<AppConfig>>) -> Html<String> {
    Html(format!("Welcome to {} V{}", config.app_name, config.app_version))
}

async fn ping() -> Html<&'static str> {
    Html("pong")
}

/// 存活检查
async fn alive() -> Html<&'static str> {
    Html("OK")
}

/// 就绪检查
async fn ready() -> Html<&'static str> {
    Html("OK")
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, "404 page not found")
}
