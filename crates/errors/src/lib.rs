//! errors - 统一错误处理
//!
//! 进程级错误分类：致命错误终止进程，其余错误只记录日志。

use thiserror::Error;

/// 错误类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 立即终止进程
    Fatal,
    /// 监听器绑定或运行失败，记录后正常退出
    Startup,
    /// 宽限期耗尽，强制关闭后正常退出
    ShutdownTimeout,
    /// 可以忽略
    Benign,
}

/// 应用错误类型
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Logger error: {0}")]
    Logger(String),

    #[error("Router configuration error: {0}")]
    Router(String),

    #[error("Signal handler error: {0}")]
    Signal(String),

    #[error("Server error: {0}")]
    Server(String),

    #[error("Shutdown timed out: {0}")]
    ShutdownTimeout(String),

    #[error("Log flush error: {0}")]
    Flush(String),
}

impl AppError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn logger(msg: impl Into<String>) -> Self {
        Self::Logger(msg.into())
    }

    pub fn router(msg: impl Into<String>) -> Self {
        Self::Router(msg.into())
    }

    pub fn signal(msg: impl Into<String>) -> Self {
        Self::Signal(msg.into())
    }

    pub fn server(msg: impl Into<String>) -> Self {
        Self::Server(msg.into())
    }

    pub fn shutdown_timeout(msg: impl Into<String>) -> Self {
        Self::ShutdownTimeout(msg.into())
    }

    pub fn flush(msg: impl Into<String>) -> Self {
        Self::Flush(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::Logger(_) | Self::Router(_) | Self::Signal(_) => ErrorKind::Fatal,
            Self::Server(_) => ErrorKind::Startup,
            Self::ShutdownTimeout(_) => ErrorKind::ShutdownTimeout,
            Self::Flush(_) => ErrorKind::Benign,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Fatal
    }

    /// 进程退出码
    pub fn exit_code(&self) -> u8 {
        if self.is_fatal() { 1 } else { 0 }
    }
}

/// Result 类型别名
pub type AppResult<T> = Result<T, AppError>;
