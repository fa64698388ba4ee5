//! anybiz-api - HTTP 路由与中间件

mod cors;
mod error;
mod middleware;
mod proxy;
mod routing;

use std::sync::Arc;

use anybiz_bootstrap::apply_limits;
use anybiz_config::AppConfig;
use axum::Router;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;

pub use cors::cors_layer;
pub use error::RouterError;
pub use middleware::{ClientIp, access_log, handle_panic};
pub use proxy::TrustedProxies;
pub use routing::index_routes;

/// 构建完整路由
///
/// 中间件由外到内：trace、访问日志、panic 恢复、CORS、请求体上限与读写超时。
pub fn configure_router(config: Arc<AppConfig>) -> Result<Router, RouterError> {
    let proxies = Arc::new(TrustedProxies::parse(&config.server.trusted_proxies)?);
    let cors = cors_layer(&config)?;
    let routes = apply_limits(index_routes(Arc::clone(&config)), &config.server);

    Ok(routes
        .layer(cors)
        .layer(CatchPanicLayer::custom(handle_panic))
        .layer(axum::middleware::from_fn_with_state(proxies, access_log))
        .layer(TraceLayer::new_for_http()))
}
