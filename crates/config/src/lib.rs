//! config - 配置加载库
//!
//! 配置只来自环境变量，按名称注册到 [`ConfigRegistry`]，创建后不可修改。

mod environment;

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anybiz_common::{
    DEFAULT_NAME, EnvError, EnvSource, ProcessEnv, Registry, RegistryError, get_env_int,
    get_env_string, get_env_string_slice,
};
use anybiz_errors::AppError;
use thiserror::Error;

pub use environment::{Environment, LogFormat, LogLevel, UnknownEnvironment};

pub const ENV_HOST: &str = "APP_HOST";
pub const ENV_PORT: &str = "APP_PORT";
pub const ENV_NAME: &str = "APP_NAME";
pub const ENV_VERSION: &str = "APP_VERSION";
pub const ENV_LOG_LEVEL: &str = "APP_LOG_LEVEL";
pub const ENV_ENVIRONMENT: &str = "APP_ENVIRONMENT";
pub const ENV_NETWORKING_PROXIES: &str = "APP_NETWORKING_PROXIES";
pub const ENV_CORS_ALLOWED_ORIGINS: &str = "APP_CORS_ALLOWED_ORIGINS";
pub const ENV_MAX_BODY_BYTES: &str = "APP_MAX_BODY_BYTES";
pub const ENV_SHUTDOWN_GRACE_SECS: &str = "APP_SHUTDOWN_GRACE_SECS";
pub const ENV_RUST_LOG: &str = "RUST_LOG";

const DEFAULT_HOST: &str = "http://localhost";
const DEFAULT_PORT: u16 = 8001;
const DEFAULT_APP_META: &str = "unknown";
const DEFAULT_MAX_BODY_BYTES: usize = 8 << 20;
const DEFAULT_SHUTDOWN_GRACE_SECS: u64 = 10;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid environment: '{value}', supported envs are {supported}")]
    InvalidEnvironment { value: String, supported: String },

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::config(err.to_string())
    }
}

/// HTTP 各阶段超时
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTimeouts {
    /// 读取请求头
    pub header_read: Duration,
    /// 读取完整请求（含 body）
    pub read: Duration,
    /// 生成并写出响应
    pub write: Duration,
    /// keep-alive 连接空闲
    pub idle: Duration,
}

impl Default for ServerTimeouts {
    fn default() -> Self {
        Self {
            header_read: Duration::from_secs(5),
            read: Duration::from_secs(15),
            write: Duration::from_secs(30),
            idle: Duration::from_secs(120),
        }
    }
}

/// 服务器配置
#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 允许设置转发头的代理（IP 或 CIDR）
    pub trusted_proxies: Vec<String>,
    /// 生产环境允许的跨域来源
    pub cors_allowed_origins: Vec<String>,
    pub max_body_bytes: usize,
    pub timeouts: ServerTimeouts,
    pub shutdown_grace: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            trusted_proxies: Vec::new(),
            cors_allowed_origins: Vec::new(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            timeouts: ServerTimeouts::default(),
            shutdown_grace: Duration::from_secs(DEFAULT_SHUTDOWN_GRACE_SECS),
        }
    }
}

/// 遥测配置
#[derive(Debug, Clone, PartialEq)]
pub struct TelemetryConfig {
    pub log_level: LogLevel,
    pub log_format: LogFormat,
    /// `RUST_LOG` 过滤指令，设置时覆盖 `log_level`
    pub directives: Option<String>,
}

/// 应用配置
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub app_name: String,
    pub app_version: String,
    pub app_env: Environment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self::for_environment(Environment::Development)
    }
}

impl AppConfig {
    /// 从进程环境变量加载配置
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(&ProcessEnv)
    }

    /// 从任意环境变量来源加载配置
    pub fn from_source(env: &impl EnvSource) -> Result<Self, ConfigError> {
        let raw_env = get_env_string(env, ENV_ENVIRONMENT, Environment::Development.as_str());
        let app_env: Environment =
            raw_env
                .parse()
                .map_err(|UnknownEnvironment(value)| ConfigError::InvalidEnvironment {
                    value,
                    supported: Environment::supported(),
                })?;

        let server = ServerConfig {
            host: get_env_string(env, ENV_HOST, DEFAULT_HOST),
            port: get_env_int(env, ENV_PORT, DEFAULT_PORT)?,
            trusted_proxies: get_env_string_slice(env, ENV_NETWORKING_PROXIES, &[]),
            cors_allowed_origins: get_env_string_slice(env, ENV_CORS_ALLOWED_ORIGINS, &[]),
            max_body_bytes: get_env_int(env, ENV_MAX_BODY_BYTES, DEFAULT_MAX_BODY_BYTES)?,
            timeouts: ServerTimeouts::default(),
            shutdown_grace: Duration::from_secs(get_env_int(
                env,
                ENV_SHUTDOWN_GRACE_SECS,
                DEFAULT_SHUTDOWN_GRACE_SECS,
            )?),
        };

        Ok(Self {
            app_name: get_env_string(env, ENV_NAME, DEFAULT_APP_META),
            app_version: get_env_string(env, ENV_VERSION, DEFAULT_APP_META),
            app_env,
            server,
            telemetry: TelemetryConfig {
                log_level: LogLevel::parse(&get_env_string(env, ENV_LOG_LEVEL, "INFO")),
                log_format: app_env.log_format(),
                directives: Some(get_env_string(env, ENV_RUST_LOG, "")).filter(|d| !d.is_empty()),
            },
        })
    }

    /// 指定环境的默认配置
    pub fn for_environment(app_env: Environment) -> Self {
        Self {
            app_name: DEFAULT_APP_META.to_string(),
            app_version: DEFAULT_APP_META.to_string(),
            app_env,
            server: ServerConfig::default(),
            telemetry: TelemetryConfig {
                log_level: LogLevel::default(),
                log_format: app_env.log_format(),
                directives: None,
            },
        }
    }

    /// 监听地址，形如 `:8001`
    pub fn addr(&self) -> String {
        format!(":{}", self.server.port)
    }

    /// 对外访问地址，形如 `http://localhost:8001`
    pub fn url(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 绑定到所有网卡的 socket 地址
    pub fn bind_addr(&self) -> SocketAddr {
        SocketAddr::from((Ipv4Addr::UNSPECIFIED, self.server.port))
    }

    /// 日志中使用的服务标识
    pub fn service_label(&self) -> String {
        format!("Service {}-V{} ({})", self.app_name, self.app_version, self.addr())
    }

    /// 是否为生产环境
    pub fn is_production(&self) -> bool {
        self.app_env == Environment::Production
    }

    /// 是否为开发环境
    pub fn is_development(&self) -> bool {
        self.app_env == Environment::Development
    }
}

/// 按名称注册的配置表
#[derive(Debug)]
pub struct ConfigRegistry {
    inner: Registry<AppConfig>,
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self {
            inner: Registry::new("Config"),
        }
    }

    /// 从环境变量加载并注册；名称重复时不会读取环境变量
    pub fn create(&self, name: &str, env: &impl EnvSource) -> Result<Arc<AppConfig>, ConfigError> {
        self.inner.create_with(name, || AppConfig::from_source(env))
    }

    /// 使用默认名称加载并注册
    pub fn create_default(&self, env: &impl EnvSource) -> Result<Arc<AppConfig>, ConfigError> {
        self.create(DEFAULT_NAME, env)
    }

    /// 注册一个已构建的配置
    pub fn register(&self, name: &str, config: AppConfig) -> Result<Arc<AppConfig>, ConfigError> {
        Ok(self.inner.insert(name, config)?)
    }

    pub fn get(&self, name: &str) -> Result<Arc<AppConfig>, ConfigError> {
        Ok(self.inner.get(name)?)
    }

    pub fn get_default(&self) -> Result<Arc<AppConfig>, ConfigError> {
        self.get(DEFAULT_NAME)
    }
}

impl Default for ConfigRegistry {
    fn default() -> Self {
        Self::new()
    }
}
