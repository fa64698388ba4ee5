//! Graceful Shutdown
//!
//! 第一次信号进入优雅关闭，宽限期内再次收到信号则立即强制关闭。

use std::fmt;

use anybiz_errors::AppError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Shutdown 控制器
#[derive(Debug, Clone, Default)]
pub struct ShutdownController {
    graceful: CancellationToken,
    force: CancellationToken,
}

impl ShutdownController {
    pub fn new() -> Self {
        Self::default()
    }

    /// 触发关闭；已经在关闭中时升级为强制关闭
    pub fn shutdown(&self) {
        if self.graceful.is_cancelled() {
            warn!("Shutdown already in progress, forcing close");
            self.force.cancel();
        } else {
            info!("Triggering shutdown");
            self.graceful.cancel();
        }
    }

    /// 跳过宽限期，立即强制关闭
    pub fn force(&self) {
        self.graceful.cancel();
        self.force.cancel();
    }

    pub fn is_shutdown(&self) -> bool {
        self.graceful.is_cancelled()
    }

    pub fn is_forced(&self) -> bool {
        self.force.is_cancelled()
    }

    /// 等待关闭信号
    pub async fn wait(&self) {
        self.graceful.cancelled().await;
    }

    /// 等待强制关闭信号
    pub async fn wait_forced(&self) {
        self.force.cancelled().await;
    }

    /// 关闭 token，可以交给其他任务监听
    pub fn token(&self) -> CancellationToken {
        self.graceful.clone()
    }
}

/// 触发关闭的进程信号
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownSignal {
    Interrupt,
    Terminate,
    Hangup,
    Quit,
}

impl fmt::Display for ShutdownSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Interrupt => "SIGINT",
            Self::Terminate => "SIGTERM",
            Self::Hangup => "SIGHUP",
            Self::Quit => "SIGQUIT",
        };
        f.write_str(name)
    }
}

/// 信号监听器
///
/// 创建时即注册全部信号，注册失败属于致命错误。
#[derive(Debug)]
pub struct SignalListener {
    #[cfg(unix)]
    interrupt: tokio::signal::unix::Signal,
    #[cfg(unix)]
    terminate: tokio::signal::unix::Signal,
    #[cfg(unix)]
    hangup: tokio::signal::unix::Signal,
    #[cfg(unix)]
    quit: tokio::signal::unix::Signal,
}

impl SignalListener {
    #[cfg(unix)]
    pub fn install() -> Result<Self, AppError> {
        use tokio::signal::unix::{SignalKind, signal};

        let register = |kind: SignalKind, name: ShutdownSignal| {
            signal(kind).map_err(|e| AppError::signal(format!("failed to install {name} handler: {e}")))
        };

        Ok(Self {
            interrupt: register(SignalKind::interrupt(), ShutdownSignal::Interrupt)?,
            terminate: register(SignalKind::terminate(), ShutdownSignal::Terminate)?,
            hangup: register(SignalKind::hangup(), ShutdownSignal::Hangup)?,
            quit: register(SignalKind::quit(), ShutdownSignal::Quit)?,
        })
    }

    #[cfg(not(unix))]
    pub fn install() -> Result<Self, AppError> {
        Ok(Self {})
    }

    /// 等待下一个信号；信号流关闭时返回 `None`
    #[cfg(unix)]
    pub async fn recv(&mut self) -> Option<ShutdownSignal> {
        tokio::select! {
            Some(()) = self.interrupt.recv() => Some(ShutdownSignal::Interrupt),
            Some(()) = self.terminate.recv() => Some(ShutdownSignal::Terminate),
            Some(()) = self.hangup.recv() => Some(ShutdownSignal::Hangup),
            Some(()) = self.quit.recv() => Some(ShutdownSignal::Quit),
            else => None,
        }
    }

    #[cfg(not(unix))]
    pub async fn recv(&mut self) -> Option<ShutdownSignal> {
        tokio::signal::ctrl_c()
            .await
            .ok()
            .map(|()| ShutdownSignal::Interrupt)
    }

    /// 在后台转发信号：第一次优雅关闭，第二次强制关闭
    pub fn spawn(mut self, controller: ShutdownController) -> JoinHandle<()> {
        tokio::spawn(async move {
            let Some(signal) = self.recv().await else {
                return;
            };
            info!(%signal, "Shutdown signal received");
            controller.shutdown();

            let Some(signal) = self.recv().await else {
                return;
            };
            warn!(%signal, "Second shutdown signal received");
            controller.force();
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_shutdown_wakes_waiters() {
        let controller = ShutdownController::new();
        let waiter = controller.clone();
        let handle = tokio::spawn(async move { waiter.wait().await });

        controller.shutdown();

        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake")
            .unwrap();
        assert!(controller.is_shutdown());
        assert!(!controller.is_forced());
    }

    #[tokio::test]
    async fn test_wait_after_shutdown_returns_immediately() {
        let controller = ShutdownController::new();
        controller.shutdown();

        tokio::time::timeout(Duration::from_millis(100), controller.wait())
            .await
            .expect("already cancelled");
    }

    #[tokio::test]
    async fn test_second_shutdown_forces() {
        let controller = ShutdownController::new();
        controller.shutdown();
        controller.shutdown();

        assert!(controller.is_forced());
        tokio::time::timeout(Duration::from_millis(100), controller.wait_forced())
            .await
            .expect("force token cancelled");
    }

    #[test]
    fn test_force_implies_shutdown() {
        let controller = ShutdownController::new();
        controller.force();

        assert!(controller.is_shutdown());
        assert!(controller.token().is_cancelled());
    }

    #[test]
    fn test_signal_names() {
        assert_eq!(ShutdownSignal::Interrupt.to_string(), "SIGINT");
        assert_eq!(ShutdownSignal::Terminate.to_string(), "SIGTERM");
        assert_eq!(ShutdownSignal::Hangup.to_string(), "SIGHUP");
        assert_eq!(ShutdownSignal::Quit.to_string(), "SIGQUIT");
    }

    #[cfg(unix)]
    fn send_signal(signal: &str) {
        let status = std::process::Command::new("kill")
            .args([signal, &std::process::id().to_string()])
            .status()
            .unwrap();
        assert!(status.success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_os_signals_drive_shutdown() {
        let controller = ShutdownController::new();
        let listener = SignalListener::install().unwrap().spawn(controller.clone());

        send_signal("-HUP");
        tokio::time::timeout(Duration::from_secs(5), controller.wait())
            .await
            .expect("SIGHUP should start graceful shutdown");
        assert!(!controller.is_forced());

        send_signal("-QUIT");
        tokio::time::timeout(Duration::from_secs(5), controller.wait_forced())
            .await
            .expect("SIGQUIT should force shutdown");

        tokio::time::timeout(Duration::from_secs(1), listener)
            .await
            .expect("listener should finish after the second signal")
            .unwrap();
    }

    #[tokio::test]
    async fn test_install_signal_listener() {
        let listener = SignalListener::install().unwrap();
        let handle = listener.spawn(ShutdownController::new());
        handle.abort();
    }
}
