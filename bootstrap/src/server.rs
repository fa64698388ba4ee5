//! HTTP 服务器
//!
//! 监听任务通过 oneshot 回报一次结果，主流程在关闭信号与该结果之间竞争：
//! 先收到关闭信号走优雅关闭，先收到结果说明监听已经失败或停止。

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use anybiz_config::{AppConfig, ServerConfig, ServerTimeouts};
use anybiz_errors::AppError;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum_server::Handle;
use hyper_util::rt::TokioTimer;
use tokio::sync::{oneshot, watch};
use tokio::time::timeout;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::{RequestBodyTimeoutLayer, TimeoutLayer};
use tracing::{error, info, warn};

use crate::idle::IdleTimeoutAcceptor;
use crate::shutdown::ShutdownController;

/// 强制关闭后等待监听任务退出的时间
const FORCE_CLOSE_WAIT: Duration = Duration::from_secs(1);

/// 服务器生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    NotStarted,
    Starting,
    Serving,
    ShuttingDown,
    Stopped,
}

/// 服务结束方式
#[derive(Debug)]
pub enum ServeOutcome {
    /// 宽限期内处理完全部请求
    Graceful,
    /// 宽限期耗尽或再次收到信号，连接被强制关闭
    Forced,
    /// 监听在收到关闭信号前自行停止
    Stopped,
    /// 绑定或运行失败
    Failed(AppError),
}

impl ServeOutcome {
    pub fn is_graceful(&self) -> bool {
        matches!(self, Self::Graceful)
    }
}

/// 为路由加上请求体上限与读写超时
///
/// 需要放在访问日志与 CORS 之内，413、408 响应才会被记录并带上跨域头。
pub fn apply_limits(app: Router, server: &ServerConfig) -> Router {
    #[allow(deprecated)]
    let write_timeout = TimeoutLayer::new(server.timeouts.write);

    app.layer(DefaultBodyLimit::max(server.max_body_bytes))
        .layer(write_timeout)
        .layer(RequestBodyTimeoutLayer::new(server.timeouts.read))
        .layer(RequestBodyLimitLayer::new(server.max_body_bytes))
}

/// 运行中服务器的观察句柄
#[derive(Clone)]
pub struct ServerHandle {
    handle: Handle,
    state: watch::Receiver<ServerState>,
}

impl ServerHandle {
    /// 等待监听成功并返回实际地址；绑定失败时返回 `None`
    pub async fn listening(&self) -> Option<SocketAddr> {
        self.handle.listening().await
    }

    pub fn state(&self) -> ServerState {
        *self.state.borrow()
    }

    /// 等待进入指定状态
    pub async fn wait_for(&mut self, state: ServerState) -> bool {
        self.state.wait_for(|current| *current == state).await.is_ok()
    }

    pub fn connection_count(&self) -> usize {
        self.handle.connection_count()
    }

    /// 直接停止监听，不经过关闭流程
    pub fn close(&self) {
        self.handle.shutdown();
    }
}

/// HTTP 服务器
pub struct HttpServer {
    label: String,
    addr: SocketAddr,
    app: Router,
    timeouts: ServerTimeouts,
    grace: Duration,
    handle: Handle,
    state: watch::Sender<ServerState>,
}

impl HttpServer {
    /// 按配置创建；路由应已通过 [`apply_limits`] 加上请求体上限与读写超时
    pub fn new(config: &AppConfig, app: Router) -> Self {
        let (state, _) = watch::channel(ServerState::NotStarted);

        Self {
            label: config.service_label(),
            addr: config.bind_addr(),
            app,
            timeouts: config.server.timeouts.clone(),
            grace: config.server.shutdown_grace,
            handle: Handle::new(),
            state,
        }
    }

    /// 覆盖监听地址
    pub fn with_addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    /// 覆盖宽限期
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    pub fn handle(&self) -> ServerHandle {
        ServerHandle {
            handle: self.handle.clone(),
            state: self.state.subscribe(),
        }
    }

    /// 运行直到关闭或失败
    pub async fn run(self, shutdown: ShutdownController) -> ServeOutcome {
        let Self {
            label,
            addr,
            app,
            timeouts,
            grace,
            handle,
            state,
        } = self;

        state.send_replace(ServerState::Starting);
        info!(service = %label, %addr, "Server starting...");

        let mut server = axum_server::bind(addr)
            .acceptor(IdleTimeoutAcceptor::new(timeouts.idle))
            .handle(handle.clone());
        server
            .http_builder()
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(timeouts.header_read)
            .keep_alive(true);

        let (outcome_tx, mut outcome_rx) = oneshot::channel::<io::Result<()>>();
        let listener = tokio::spawn(async move {
            let result = server
                .serve(app.into_make_service_with_connect_info::<SocketAddr>())
                .await;
            let _ = outcome_tx.send(result);
        });

        let listening = handle.listening();
        tokio::pin!(listening);
        let mut listening_done = false;

        let finished = loop {
            tokio::select! {
                local = &mut listening, if !listening_done => {
                    listening_done = true;
                    if let Some(local) = local {
                        state.send_replace(ServerState::Serving);
                        info!(service = %label, addr = %local, "Server started");
                    }
                }
                _ = shutdown.wait() => break None,
                result = &mut outcome_rx => break Some(result),
            }
        };

        if let Some(result) = finished {
            state.send_replace(ServerState::Stopped);
            return match result {
                Ok(Ok(())) => {
                    info!(service = %label, "Server stopped serving");
                    ServeOutcome::Stopped
                }
                Ok(Err(e)) => {
                    error!(service = %label, error = %e, "Server failed");
                    ServeOutcome::Failed(AppError::server(e.to_string()))
                }
                Err(_) => {
                    error!(service = %label, "Server task exited without reporting");
                    ServeOutcome::Failed(AppError::server("listener task exited without reporting"))
                }
            };
        }

        state.send_replace(ServerState::ShuttingDown);
        info!(service = %label, ?grace, "Shutting down gracefully");
        handle.graceful_shutdown(None);

        let drained = tokio::select! {
            result = timeout(grace, &mut outcome_rx) => match result {
                Ok(Ok(Err(e))) => {
                    warn!(service = %label, error = %e, "Server error during shutdown");
                    true
                }
                Ok(_) => true,
                Err(_) => false,
            },
            _ = shutdown.wait_forced() => false,
        };

        let outcome = if drained {
            info!(service = %label, "Server Shutdown, cleaning up resources");
            ServeOutcome::Graceful
        } else {
            let err = if shutdown.is_forced() {
                AppError::shutdown_timeout("forced by a second signal")
            } else {
                AppError::shutdown_timeout(format!("grace period of {grace:?} exceeded"))
            };
            warn!(
                service = %label,
                error = %err,
                connections = handle.connection_count(),
                "Server forced to shutdown"
            );
            handle.shutdown();
            if timeout(FORCE_CLOSE_WAIT, &mut outcome_rx).await.is_err() {
                listener.abort();
            }
            ServeOutcome::Forced
        };

        state.send_replace(ServerState::Stopped);
        info!(service = %label, "Server exiting");
        outcome
    }
}
