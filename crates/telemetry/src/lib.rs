//! telemetry - 可观测性库
//!
//! testing / development 使用可读格式，staging / production 使用 JSON。
//! 日志统一输出到 stderr，`RUST_LOG`（进程环境或 `.env`）可以覆盖配置中的级别。

use std::io::{self, Write};
use std::sync::Arc;

use anybiz_common::{DEFAULT_NAME, Registry, RegistryError};
use anybiz_config::{LogFormat, LogLevel, TelemetryConfig};
use anybiz_errors::AppError;
use thiserror::Error;
use tracing::Dispatch;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt};

#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("Failed to install global logger: {0}")]
    Install(#[from] tracing::dispatcher::SetGlobalDefaultError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("Error syncing logger: {0}")]
    Flush(#[source] io::Error),
}

impl From<TelemetryError> for AppError {
    fn from(err: TelemetryError) -> Self {
        match err {
            TelemetryError::Flush(_) => AppError::flush(err.to_string()),
            _ => AppError::logger(err.to_string()),
        }
    }
}

/// 日志构建器
#[derive(Debug, Clone)]
pub struct LoggerBuilder {
    level: LogLevel,
    format: LogFormat,
    directives: Option<String>,
    ansi: bool,
}

impl LoggerBuilder {
    pub fn new(config: &TelemetryConfig) -> Self {
        Self {
            level: config.log_level,
            format: config.log_format,
            directives: config.directives.clone(),
            ansi: true,
        }
    }

    /// 覆盖过滤指令，`None` 表示只使用配置中的级别
    pub fn directives(mut self, directives: Option<String>) -> Self {
        self.directives = directives;
        self
    }

    /// 可读格式下是否输出颜色
    pub fn ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    /// 过滤指令无法解析时的错误信息，此时回退到配置中的级别
    pub fn directive_error(&self) -> Option<String> {
        let directives = self.directives.as_deref()?;
        EnvFilter::try_new(directives).err().map(|e| e.to_string())
    }

    /// 记录无效的过滤指令；需要在日志安装之后调用
    pub fn report_invalid_directives(&self) {
        if let (Some(directives), Some(error)) = (self.directives.as_deref(), self.directive_error()) {
            tracing::warn!(
                directives,
                error = %error,
                fallback = self.level.as_directive(),
                "Invalid RUST_LOG directives, using configured log level"
            );
        }
    }

    fn filter(&self) -> EnvFilter {
        match &self.directives {
            Some(directives) => EnvFilter::try_new(directives)
                .unwrap_or_else(|_| EnvFilter::new(self.level.as_directive())),
            None => EnvFilter::new(self.level.as_directive()),
        }
    }

    /// 输出到 stderr
    pub fn build(self) -> Dispatch {
        self.build_with_writer(io::stderr)
    }

    pub fn build_with_writer<W>(self, writer: W) -> Dispatch
    where
        W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
    {
        let filter = self.filter();

        let (pretty, json) = match self.format {
            LogFormat::Pretty => (
                Some(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(self.ansi)
                        .with_file(true)
                        .with_line_number(true),
                ),
                None,
            ),
            LogFormat::Json => (
                None,
                Some(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(writer)
                        .with_current_span(true),
                ),
            ),
        };

        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(pretty)
            .with(json);

        Dispatch::new(subscriber)
    }
}

/// 按名称注册的日志表
#[derive(Debug)]
pub struct LoggerRegistry {
    inner: Registry<Dispatch>,
}

impl LoggerRegistry {
    pub fn new() -> Self {
        Self {
            inner: Registry::new("Logger"),
        }
    }

    /// 按配置构建并注册
    pub fn create(&self, name: &str, config: &TelemetryConfig) -> Result<Arc<Dispatch>, TelemetryError> {
        self.register(name, LoggerBuilder::new(config).build())
    }

    pub fn register(&self, name: &str, dispatch: Dispatch) -> Result<Arc<Dispatch>, TelemetryError> {
        Ok(self.inner.insert(name, dispatch)?)
    }

    pub fn get(&self, name: &str) -> Result<Arc<Dispatch>, TelemetryError> {
        Ok(self.inner.get(name)?)
    }

    pub fn get_default(&self) -> Result<Arc<Dispatch>, TelemetryError> {
        self.get(DEFAULT_NAME)
    }
}

impl Default for LoggerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// 设置为全局默认日志；只能成功一次
pub fn install(dispatch: &Dispatch) -> Result<(), TelemetryError> {
    tracing::dispatcher::set_global_default(dispatch.clone())?;
    Ok(())
}

/// 初始化 tracing：构建、注册为默认名称并设置为全局日志
pub fn init_tracing(
    registry: &LoggerRegistry,
    config: &TelemetryConfig,
) -> Result<Arc<Dispatch>, TelemetryError> {
    let builder = LoggerBuilder::new(config);
    let dispatch = registry.register(DEFAULT_NAME, builder.clone().build())?;
    install(&dispatch)?;
    builder.report_invalid_directives();
    Ok(dispatch)
}

/// 刷新日志输出
///
/// stderr 不是普通文件时（终端、管道）刷新可能返回 EINVAL 或 ENOTTY，这类错误直接忽略。
pub fn flush() -> Result<(), TelemetryError> {
    match io::stderr().flush() {
        Ok(()) => Ok(()),
        Err(e) if is_benign_flush_error(&e) => Ok(()),
        Err(e) => Err(TelemetryError::Flush(e)),
    }
}

/// 非文件输出上的已知无害错误
pub fn is_benign_flush_error(err: &io::Error) -> bool {
    const ENOTTY: i32 = 25;

    matches!(
        err.kind(),
        io::ErrorKind::InvalidInput | io::ErrorKind::Unsupported
    ) || (cfg!(unix) && err.raw_os_error() == Some(ENOTTY))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn telemetry(level: LogLevel, format: LogFormat) -> TelemetryConfig {
        TelemetryConfig {
            log_level: level,
            log_format: format,
            directives: None,
        }
    }

    fn build(config: &TelemetryConfig, captured: &Captured) -> Dispatch {
        let writer = captured.clone();
        LoggerBuilder::new(config)
            .directives(None)
            .ansi(false)
            .build_with_writer(move || writer.clone())
    }

    #[test]
    fn test_json_format_for_production_profile() {
        let captured = Captured::default();
        let dispatch = build(&telemetry(LogLevel::Info, LogFormat::Json), &captured);

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::warn!(service = "anybiz", "Server forced to shutdown");
        });

        let output = captured.contents();
        assert!(output.contains("\"level\":\"WARN\""), "{output}");
        assert!(output.contains("Server forced to shutdown"), "{output}");
        assert!(output.contains("\"service\":\"anybiz\""), "{output}");
    }

    #[test]
    fn test_pretty_format_for_development_profile() {
        let captured = Captured::default();
        let dispatch = build(&telemetry(LogLevel::Debug, LogFormat::Pretty), &captured);

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::debug!("Server starting...");
        });

        let output = captured.contents();
        assert!(output.contains("DEBUG"), "{output}");
        assert!(output.contains("Server starting..."), "{output}");
        assert!(!output.starts_with('{'), "{output}");
    }

    #[test]
    fn test_level_filter() {
        let captured = Captured::default();
        let dispatch = build(&telemetry(LogLevel::Warn, LogFormat::Json), &captured);

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::info!("filtered out");
            tracing::error!("kept");
        });

        let output = captured.contents();
        assert!(!output.contains("filtered out"));
        assert!(output.contains("kept"));
    }

    #[test]
    fn test_fatal_level_still_logs_errors() {
        let captured = Captured::default();
        let dispatch = build(&telemetry(LogLevel::Fatal, LogFormat::Json), &captured);

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::warn!("below threshold");
            tracing::error!("at threshold");
        });

        let output = captured.contents();
        assert!(!output.contains("below threshold"));
        assert!(output.contains("at threshold"));
    }

    #[test]
    fn test_directives_override_level() {
        let captured = Captured::default();
        let writer = captured.clone();
        let dispatch = LoggerBuilder::new(&telemetry(LogLevel::Error, LogFormat::Json))
            .directives(Some("debug".to_string()))
            .build_with_writer(move || writer.clone());

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::debug!("visible");
        });

        assert!(captured.contents().contains("visible"));
    }

    #[test]
    fn test_directives_come_from_config() {
        let mut config = telemetry(LogLevel::Error, LogFormat::Json);
        config.directives = Some("debug".to_string());

        let captured = Captured::default();
        let writer = captured.clone();
        let dispatch = LoggerBuilder::new(&config).build_with_writer(move || writer.clone());

        tracing::dispatcher::with_default(&dispatch, || {
            tracing::debug!("from config directives");
        });

        assert!(captured.contents().contains("from config directives"));
    }

    #[test]
    fn test_invalid_directives_fall_back_and_warn() {
        let mut config = telemetry(LogLevel::Warn, LogFormat::Json);
        config.directives = Some("anybiz=bogus".to_string());
        let builder = LoggerBuilder::new(&config);
        assert!(builder.directive_error().is_some());

        let captured = Captured::default();
        let writer = captured.clone();
        let dispatch = builder.clone().build_with_writer(move || writer.clone());

        tracing::dispatcher::with_default(&dispatch, || {
            builder.report_invalid_directives();
            tracing::info!("below configured level");
        });

        let output = captured.contents();
        assert!(output.contains("Invalid RUST_LOG directives"), "{output}");
        assert!(output.contains("anybiz=bogus"), "{output}");
        assert!(!output.contains("below configured level"), "{output}");
    }

    #[test]
    fn test_valid_directives_have_no_error() {
        let mut config = telemetry(LogLevel::Info, LogFormat::Pretty);
        config.directives = Some("info,anybiz_bootstrap=debug".to_string());
        assert_eq!(LoggerBuilder::new(&config).directive_error(), None);
        assert_eq!(LoggerBuilder::new(&telemetry(LogLevel::Info, LogFormat::Pretty)).directive_error(), None);
    }

    #[test]
    fn test_registry_rejects_duplicate_logger() {
        let registry = LoggerRegistry::new();
        let config = telemetry(LogLevel::Info, LogFormat::Pretty);

        registry.create("default", &config).unwrap();
        let err = registry.create("default", &config).unwrap_err();

        assert!(matches!(err, TelemetryError::Registry(RegistryError::AlreadyExists { .. })));
        assert!(registry.get_default().is_ok());
        assert!(AppError::from(err).is_fatal());
    }

    #[test]
    fn test_benign_flush_errors() {
        assert!(is_benign_flush_error(&io::Error::from(io::ErrorKind::InvalidInput)));
        assert!(is_benign_flush_error(&io::Error::from(io::ErrorKind::Unsupported)));
        assert!(!is_benign_flush_error(&io::Error::from(io::ErrorKind::BrokenPipe)));

        let err: AppError = TelemetryError::Flush(io::Error::from(io::ErrorKind::BrokenPipe)).into();
        assert!(!err.is_fatal());
    }
}
