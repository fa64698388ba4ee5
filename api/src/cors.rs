//! CORS 策略
//!
//! 非生产环境允许任意来源，生产环境只允许 `APP_CORS_ALLOWED_ORIGINS` 中的来源。

use std::time::Duration;

use anybiz_config::AppConfig;
use axum::http::{HeaderValue, Method, header};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::error::RouterError;

const MAX_AGE: Duration = Duration::from_secs(12 * 60 * 60);

pub fn cors_layer(config: &AppConfig) -> Result<CorsLayer, RouterError> {
    let allow_origin: AllowOrigin = if config.is_production() {
        let origins = config
            .server
            .cors_allowed_origins
            .iter()
            .map(|origin| {
                HeaderValue::from_str(origin).map_err(|_| RouterError::InvalidOrigin {
                    origin: origin.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        AllowOrigin::list(origins)
    } else {
        Any.into()
    };

    Ok(CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::ORIGIN, header::CONTENT_TYPE, header::AUTHORIZATION])
        .expose_headers([header::CONTENT_LENGTH])
        .allow_credentials(false)
        .max_age(MAX_AGE))
}
