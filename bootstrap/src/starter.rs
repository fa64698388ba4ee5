//! 服务启动器
//!
//! 提供统一的服务启动模式

use std::sync::Arc;

use anybiz_config::AppConfig;
use anybiz_errors::{AppError, AppResult};
use axum::Router;
use tracing::info;

use crate::runtime::{RuntimeConfig, init_runtime};
use crate::server::{HttpServer, ServeOutcome};
use crate::shutdown::{ShutdownController, SignalListener};

/// 运行 HTTP 服务
///
/// 这是服务的统一入口点。它负责：
/// 1. 加载 `.env` 与配置
/// 2. 初始化日志
/// 3. 调用用户提供的闭包构建路由
/// 4. 注册关闭信号并启动服务器
/// 5. 等待关闭并刷新日志
///
/// 前三步的错误是致命的，直接返回 `Err`；服务器运行阶段的结果通过 [`ServeOutcome`] 返回。
///
/// # 示例
///
/// ```ignore
/// use anybiz_bootstrap::{RuntimeConfig, run};
///
/// #[tokio::main]
/// async fn main() {
///     let outcome = run(&RuntimeConfig::default(), |config| {
///         Ok(Router::new().route("/ping", get(|| async { "pong" })))
///     })
///     .await;
/// }
/// ```
pub async fn run<F, E>(runtime: &RuntimeConfig, router_builder: F) -> AppResult<ServeOutcome>
where
    F: FnOnce(Arc<AppConfig>) -> Result<Router, E>,
    E: Into<AppError>,
{
    // 1-2. 配置与日志
    let runtime = init_runtime(runtime)?;
    let config = runtime.config();

    info!("Starting {} service", config.app_name);

    // 3. 构建路由
    let app = router_builder(Arc::clone(&config)).map_err(Into::into)?;

    // 4. 信号与服务器
    let shutdown = ShutdownController::new();
    let signals = SignalListener::install()?.spawn(shutdown.clone());

    let outcome = HttpServer::new(&config, app).run(shutdown).await;

    // 5. 清理
    signals.abort();
    info!(outcome = ?outcome, "Service stopped");
    runtime.flush_logs();

    Ok(outcome)
}
