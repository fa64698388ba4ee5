//! 运行环境与日志级别

use std::fmt;
use std::str::FromStr;

/// 运行环境
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Environment {
    Testing,
    Development,
    Staging,
    Production,
}

impl Environment {
    /// 支持的全部环境
    pub const ALL: [Environment; 4] = [
        Environment::Testing,
        Environment::Development,
        Environment::Staging,
        Environment::Production,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Testing => "testing",
            Self::Development => "development",
            Self::Staging => "staging",
            Self::Production => "production",
        }
    }

    /// testing 与 development 使用开发日志格式，其余使用 JSON
    pub fn log_format(&self) -> LogFormat {
        match self {
            Self::Testing | Self::Development => LogFormat::Pretty,
            Self::Staging | Self::Production => LogFormat::Json,
        }
    }

    pub(crate) fn supported() -> String {
        let names: Vec<&str> = Self::ALL.iter().map(Environment::as_str).collect();
        format!("[{}]", names.join(" "))
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 不在支持列表中的环境名
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEnvironment(pub String);

impl FromStr for Environment {
    type Err = UnknownEnvironment;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|env| env.as_str() == s)
            .ok_or_else(|| UnknownEnvironment(s.to_string()))
    }
}

/// 日志输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// 日志级别
///
/// DPANIC、PANIC、FATAL 沿用常见的级别名称，过滤时都按 error 处理。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    DPanic,
    Panic,
    Fatal,
}

impl LogLevel {
    /// 宽松解析：忽略大小写与首尾空白，无法识别时返回 INFO
    pub fn parse(s: &str) -> Self {
        match s.trim().to_uppercase().as_str() {
            "DEBUG" => Self::Debug,
            "INFO" => Self::Info,
            "WARN" | "WARNING" => Self::Warn,
            "ERROR" => Self::Error,
            "DPANIC" => Self::DPanic,
            "PANIC" => Self::Panic,
            "FATAL" => Self::Fatal,
            _ => Self::Info,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "DEBUG",
            Self::Info => "INFO",
            Self::Warn => "WARN",
            Self::Error => "ERROR",
            Self::DPanic => "DPANIC",
            Self::Panic => "PANIC",
            Self::Fatal => "FATAL",
        }
    }

    /// 对应的 tracing 过滤指令
    pub fn as_directive(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error | Self::DPanic | Self::Panic | Self::Fatal => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
