//! 服务运行时
//!
//! 依次加载 `.env`、配置与日志。任何一步失败都是致命错误，此时还没有任何网络活动。

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anybiz_common::{EnvError, EnvSource, LayeredEnv, ProcessEnv, load_env_file};
use anybiz_config::{AppConfig, ConfigRegistry};
use anybiz_errors::{AppError, AppResult};
use anybiz_telemetry::{LoggerRegistry, init_tracing};
use tracing::{debug, info};

/// 服务运行时配置
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// dotenv 文件路径，文件不存在时跳过
    pub env_file: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            env_file: ".env".to_string(),
        }
    }
}

/// 已初始化的运行时
#[derive(Debug)]
pub struct Runtime {
    configs: ConfigRegistry,
    loggers: LoggerRegistry,
    config: Arc<AppConfig>,
}

impl Runtime {
    /// 默认名称下的配置
    pub fn config(&self) -> Arc<AppConfig> {
        Arc::clone(&self.config)
    }

    pub fn configs(&self) -> &ConfigRegistry {
        &self.configs
    }

    pub fn loggers(&self) -> &LoggerRegistry {
        &self.loggers
    }

    /// 退出前刷新日志，失败时只能写到 stderr
    pub fn flush_logs(&self) {
        if let Err(e) = anybiz_telemetry::flush() {
            let err = AppError::from(e);
            eprintln!("{err}");
        }
    }
}

/// 读取 dotenv 文件；文件不存在返回空表，其余错误返回 `Err`
pub fn load_dotenv(path: impl AsRef<Path>) -> AppResult<HashMap<String, String>> {
    match load_env_file(path.as_ref()) {
        Ok(vars) => Ok(vars),
        Err(EnvError::File(e)) if e.not_found() => Ok(HashMap::new()),
        Err(e) => Err(AppError::config(format!(
            "Error loading {}: {e}",
            path.as_ref().display()
        ))),
    }
}

/// 初始化服务运行时
///
/// 进程环境优先于 dotenv 文件。
pub fn init_runtime(runtime: &RuntimeConfig) -> AppResult<Runtime> {
    let file_vars = load_dotenv(&runtime.env_file)?;
    let initialized = init_runtime_with(&LayeredEnv::new(ProcessEnv, &file_vars))?;

    debug!(
        env_file = %runtime.env_file,
        variables = file_vars.len(),
        "Env file loaded"
    );
    Ok(initialized)
}

/// 从任意环境变量来源初始化
pub fn init_runtime_with(env: &impl EnvSource) -> AppResult<Runtime> {
    let configs = ConfigRegistry::new();
    let config = configs.create_default(env)?;

    let loggers = LoggerRegistry::new();
    init_tracing(&loggers, &config.telemetry)?;

    info!(
        app_name = %config.app_name,
        app_env = %config.app_env,
        log_level = %config.telemetry.log_level,
        "Runtime initialized"
    );

    Ok(Runtime {
        configs,
        loggers,
        config,
    })
}
