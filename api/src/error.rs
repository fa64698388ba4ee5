//! 路由配置错误

use anybiz_errors::AppError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Error setting trusted proxies, invalid entry '{entry}'")]
    InvalidTrustedProxy { entry: String },

    #[error("Invalid CORS origin '{origin}'")]
    InvalidOrigin { origin: String },
}

impl From<RouterError> for AppError {
    fn from(err: RouterError) -> Self {
        AppError::router(err.to_string())
    }
}
